//! Labeled source positions for diagnostic messages.

use std::sync::Arc;

use corgi_core::{Source, Span};

/// A labeled span in source code.
///
/// Labels attach messages to specific locations, helping users understand
/// where problems occurred and why.
///
/// # Primary vs Secondary Labels
///
/// - **Primary labels** mark the main location of an error or warning.
///   There should typically be one primary label per diagnostic.
/// - **Secondary labels** provide additional context, such as "first declared
///   here" or "mixin defined here".
///
/// A label without a source of its own points into the source of its
/// diagnostic. Labels pointing into another file, such as the definition of a
/// mixin called with a wrong argument, carry that file's source.
#[derive(Debug, Clone)]
pub struct Label {
    span: Span,
    message: String,
    is_primary: bool,
    source: Option<Arc<Source>>,
}

impl Label {
    /// Create a new primary label.
    pub fn primary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            is_primary: true,
            source: None,
        }
    }

    /// Create a new secondary label.
    pub fn secondary(span: Span, message: impl Into<String>) -> Self {
        Self {
            span,
            message: message.into(),
            is_primary: false,
            source: None,
        }
    }

    /// Point the label into `source` instead of the diagnostic's source.
    pub fn in_source(mut self, source: Arc<Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// Get the span this label applies to.
    pub fn span(&self) -> Span {
        self.span
    }

    /// Get the label message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The label's own source, if it points into another file.
    pub fn source(&self) -> Option<&Arc<Source>> {
        self.source.as_ref()
    }

    /// Check if this is a primary label.
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Check if this is a secondary label.
    pub fn is_secondary(&self) -> bool {
        !self.is_primary
    }
}
