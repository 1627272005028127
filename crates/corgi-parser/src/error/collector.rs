//! Collector for accumulating diagnostics during a processing phase.
//!
//! The [`DiagnosticCollector`] allows phases to report multiple errors and
//! warnings instead of failing on the first error encountered. Concurrent
//! linking may discover the same root cause along several paths, so the
//! collector drops repeated diagnostics and orders the rest by location.

use std::collections::HashSet;

use corgi_core::Span;

use crate::error::{Diagnostic, DiagnosticError};

/// A collector for accumulating diagnostics during a processing phase.
///
/// # Example
///
/// ```
/// # use corgi_parser::error::{Diagnostic, DiagnosticCollector, ErrorCode};
/// # use corgi_core::{Position, Span};
///
/// let mut collector = DiagnosticCollector::new();
///
/// collector.emit(
///     Diagnostic::error("unknown mixin `Card`")
///         .with_code(ErrorCode::E205)
///         .with_label(Span::at(Position::new(4, 3), 5), "not found"),
/// );
///
/// assert!(collector.finish().is_err());
/// ```
#[derive(Debug, Default)]
pub struct DiagnosticCollector {
    diagnostics: Vec<Diagnostic>,
    has_errors: bool,
}

impl DiagnosticCollector {
    /// Create a new empty collector.
    pub fn new() -> Self {
        Self::default()
    }

    /// Emit a diagnostic to this collector.
    pub fn emit(&mut self, diagnostic: Diagnostic) {
        if diagnostic.severity().is_error() {
            self.has_errors = true;
        }
        self.diagnostics.push(diagnostic);
    }

    /// Emit every diagnostic of a failed stage.
    pub fn emit_all(&mut self, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        for diagnostic in diagnostics {
            self.emit(diagnostic);
        }
    }

    /// Returns `true` if an error was emitted.
    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Finish collection.
    ///
    /// Diagnostics are de-duplicated by source, primary span and message, then
    /// ordered by source name and position.
    ///
    /// - If there are errors, returns `Err(DiagnosticError)` with all
    ///   diagnostics, warnings included.
    /// - Otherwise returns the warnings.
    pub fn finish(self) -> Result<Vec<Diagnostic>, DiagnosticError> {
        let diagnostics = normalize(self.diagnostics);
        if self.has_errors {
            Err(DiagnosticError::new(diagnostics))
        } else {
            Ok(diagnostics)
        }
    }
}

fn primary_span(diagnostic: &Diagnostic) -> Span {
    diagnostic
        .primary_label()
        .map(|label| label.span())
        .unwrap_or_default()
}

fn source_name(diagnostic: &Diagnostic) -> String {
    diagnostic
        .source()
        .map(|source| source.name().to_string())
        .unwrap_or_default()
}

fn normalize(diagnostics: Vec<Diagnostic>) -> Vec<Diagnostic> {
    let mut seen = HashSet::new();
    let mut unique: Vec<Diagnostic> = diagnostics
        .into_iter()
        .filter(|diagnostic| {
            seen.insert((
                source_name(diagnostic),
                primary_span(diagnostic),
                diagnostic.message().to_string(),
            ))
        })
        .collect();

    unique.sort_by_cached_key(|diagnostic| {
        (source_name(diagnostic), primary_span(diagnostic).start())
    });
    unique
}
