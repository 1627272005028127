//! The core diagnostic type for the corgi error system.
//!
//! A [`Diagnostic`] represents a single error or warning with an optional
//! error code, labeled positions and help text.

use std::{fmt, sync::Arc};

use corgi_core::{Source, Span};

use crate::error::{ErrorCode, Label, Severity};

/// A rich diagnostic message with source location information.
///
/// Besides labels and help text a diagnostic may show the form a construct
/// should have (`should_be`), an example of correct usage, and any number of
/// [`Suggestion`]s.
///
/// # Example
///
/// ```text
/// error[E205]: unknown mixin `Buton`
///   --> pages/index.corgi:7:5
///    |
///  7 |     +Buton(label="Save")
///    |     ^^^^^^ not found
///    |
///    = help: did you mean `Button`?
/// ```
#[derive(Debug, Clone)]
pub struct Diagnostic {
    severity: Severity,
    code: Option<ErrorCode>,
    message: String,
    source: Option<Arc<Source>>,
    labels: Vec<Label>,
    help: Option<String>,
    should_be: Option<String>,
    example: Option<String>,
    suggestions: Vec<Suggestion>,
}

/// A proposed fix for a diagnostic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Suggestion {
    pub message: String,
    pub example: Option<String>,
    pub should_be: Option<String>,
    /// Replacement code, if the fix is mechanical.
    pub code: Option<String>,
}

impl Suggestion {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            example: None,
            should_be: None,
            code: None,
        }
    }

    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

impl Diagnostic {
    /// Create an error diagnostic.
    ///
    /// # Example
    ///
    /// ```
    /// # use corgi_parser::error::{Diagnostic, ErrorCode};
    /// # use corgi_core::{Position, Span};
    ///
    /// let diag = Diagnostic::error("unknown mixin `Buton`")
    ///     .with_code(ErrorCode::E205)
    ///     .with_label(Span::at(Position::new(7, 5), 6), "not found")
    ///     .with_help("did you mean `Button`?");
    /// ```
    pub fn error(message: impl Into<String>) -> Self {
        Self::new(Severity::Error, message)
    }

    /// Create a warning diagnostic.
    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(Severity::Warning, message)
    }

    /// Get the severity of this diagnostic.
    pub fn severity(&self) -> Severity {
        self.severity
    }

    /// Get the error code, if any.
    pub fn code(&self) -> Option<ErrorCode> {
        self.code
    }

    /// Get the primary message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The source the diagnostic's labels point into by default.
    pub fn source(&self) -> Option<&Arc<Source>> {
        self.source.as_ref()
    }

    /// Get all labels attached to this diagnostic.
    pub fn labels(&self) -> &[Label] {
        &self.labels
    }

    /// The first primary label, if any.
    pub fn primary_label(&self) -> Option<&Label> {
        self.labels.iter().find(|label| label.is_primary())
    }

    /// Get the help text, if any.
    pub fn help(&self) -> Option<&str> {
        self.help.as_deref()
    }

    /// The form the offending construct should have, if known.
    pub fn should_be(&self) -> Option<&str> {
        self.should_be.as_deref()
    }

    /// An example of correct usage, if any.
    pub fn example(&self) -> Option<&str> {
        self.example.as_deref()
    }

    pub fn suggestions(&self) -> &[Suggestion] {
        &self.suggestions
    }

    /// Set the error code.
    pub fn with_code(mut self, code: ErrorCode) -> Self {
        self.code = Some(code);
        self
    }

    /// Set the source the labels point into.
    pub fn with_source(mut self, source: Arc<Source>) -> Self {
        self.source = Some(source);
        self
    }

    /// Set the source unless one is already set.
    pub fn or_source(mut self, source: &Arc<Source>) -> Self {
        if self.source.is_none() {
            self.source = Some(Arc::clone(source));
        }
        self
    }

    /// Add a primary label to this diagnostic.
    pub fn with_label(mut self, span: impl Into<Span>, message: impl Into<String>) -> Self {
        self.labels.push(Label::primary(span.into(), message));
        self
    }

    /// Add a secondary label to this diagnostic.
    pub fn with_secondary_label(
        mut self,
        span: impl Into<Span>,
        message: impl Into<String>,
    ) -> Self {
        self.labels.push(Label::secondary(span.into(), message));
        self
    }

    /// Add a secondary label pointing into another source.
    pub fn with_secondary_label_in(
        mut self,
        source: &Arc<Source>,
        span: impl Into<Span>,
        message: impl Into<String>,
    ) -> Self {
        let label = Label::secondary(span.into(), message).in_source(Arc::clone(source));
        self.labels.push(label);
        self
    }

    /// Set the help text.
    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Set the expected form of the construct.
    pub fn with_should_be(mut self, should_be: impl Into<String>) -> Self {
        self.should_be = Some(should_be.into());
        self
    }

    /// Set an example of correct usage.
    pub fn with_example(mut self, example: impl Into<String>) -> Self {
        self.example = Some(example.into());
        self
    }

    /// Add a suggestion.
    pub fn with_suggestion(mut self, suggestion: Suggestion) -> Self {
        self.suggestions.push(suggestion);
        self
    }

    /// Create a new diagnostic with the given severity and message.
    fn new(severity: Severity, message: impl Into<String>) -> Self {
        Self {
            severity,
            code: None,
            message: message.into(),
            source: None,
            labels: Vec::new(),
            help: None,
            should_be: None,
            example: None,
            suggestions: Vec::new(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Format: "error[E001]: message" or "error: message"
        write!(f, "{}", self.severity)?;
        if let Some(code) = self.code {
            write!(f, "[{}]", code)?;
        }
        write!(f, ": {}", self.message)
    }
}

impl std::error::Error for Diagnostic {}

#[cfg(test)]
mod tests {
    use corgi_core::Position;

    use super::*;

    fn span(line: usize, col: usize, len: usize) -> Span {
        Span::at(Position::new(line, col), len)
    }

    #[test]
    fn test_diagnostic_new() {
        let diag = Diagnostic::error("test error");

        assert!(diag.severity().is_error());
        assert_eq!(diag.message(), "test error");
        assert!(diag.code().is_none());
        assert!(diag.labels().is_empty());
        assert!(diag.help().is_none());
        assert!(diag.source().is_none());
    }

    #[test]
    fn test_diagnostic_display_with_code() {
        let diag = Diagnostic::error("unknown mixin `Card`").with_code(ErrorCode::E205);

        assert_eq!(diag.to_string(), "error[E205]: unknown mixin `Card`");
    }

    #[test]
    fn test_diagnostic_display_without_code() {
        let diag = Diagnostic::warning("library exports no mixins");

        assert_eq!(diag.to_string(), "warning: library exports no mixins");
    }

    #[test]
    fn test_primary_label() {
        let diag = Diagnostic::error("mixin `Card` is declared twice")
            .with_secondary_label(span(1, 1, 10), "first declared here")
            .with_label(span(9, 1, 10), "redeclared here");

        assert_eq!(diag.labels().len(), 2);
        assert_eq!(
            diag.primary_label().map(Label::message),
            Some("redeclared here")
        );
    }

    #[test]
    fn test_or_source_keeps_existing() {
        let a = Arc::new(Source::new("a.corgi", ""));
        let b = Arc::new(Source::new("b.corgi", ""));

        let diag = Diagnostic::error("x").with_source(Arc::clone(&a)).or_source(&b);
        assert_eq!(diag.source().map(|s| s.name()), Some("a.corgi"));

        let diag = Diagnostic::error("x").or_source(&b);
        assert_eq!(diag.source().map(|s| s.name()), Some("b.corgi"));
    }

    #[test]
    fn test_builder_chain() {
        let lib = Arc::new(Source::new("ui/card.corgil", "mixin Card(title string)"));
        let diag = Diagnostic::error("missing parameter `title`")
            .with_code(ErrorCode::E304)
            .with_label(span(4, 3, 5), "missing `title`")
            .with_secondary_label_in(&lib, span(1, 12, 5), "parameter declared here")
            .with_should_be("+Card(title=...)")
            .with_example("+Card(title=\"Hello\")")
            .with_suggestion(Suggestion::new("pass a title").with_code("title=\"\""));

        assert_eq!(diag.code(), Some(ErrorCode::E304));
        assert_eq!(diag.should_be(), Some("+Card(title=...)"));
        assert_eq!(diag.example(), Some("+Card(title=\"Hello\")"));
        assert_eq!(diag.suggestions().len(), 1);
        assert_eq!(
            diag.labels()[1].source().map(|s| s.name()),
            Some("ui/card.corgil")
        );
    }
}
