//! Error adapter for converting CorgiError to miette diagnostics.
//!
//! This module provides the bridge between the library's error types and
//! miette's rich diagnostic formatting used in the CLI.
//!
//! # Multi-Error Support
//!
//! A failed stage reports every diagnostic it found; each one is rendered
//! independently. Labels pointing into another file than the diagnostic's
//! own, such as the definition of a mixin called with a wrong argument, are
//! rendered as related diagnostics carrying that file's source.

use std::{fmt, sync::Arc};

use miette::{
    Diagnostic as MietteDiagnostic, GraphicalReportHandler, LabeledSpan, NamedSource, SourceCode,
    SourceSpan,
};

use corgi::{CorgiError, Diagnostic, Severity, Source, Span};
use corgi_parser::error::Label;

/// Adapter for a single corgi diagnostic.
///
/// This adapter wraps a single [`Diagnostic`] and implements
/// [`MietteDiagnostic`] to enable rich error formatting in the CLI.
pub struct DiagnosticAdapter<'a> {
    /// The wrapped diagnostic
    diag: &'a Diagnostic,
    /// Source code for displaying snippets
    src: Option<NamedSource<String>>,
    /// Help text, including the expected form and suggestions
    help: Option<String>,
    /// Labels pointing into other files
    related: Vec<HintAdapter<'a>>,
}

impl<'a> DiagnosticAdapter<'a> {
    /// Create a new diagnostic adapter.
    pub fn new(diag: &'a Diagnostic) -> Self {
        let own = diag.source();
        let related = diag
            .labels()
            .iter()
            .filter_map(|label| match label.source() {
                Some(source) if !is_same_source(own, source) => {
                    Some(HintAdapter::new(label, source))
                }
                _ => None,
            })
            .collect();

        Self {
            diag,
            src: own.map(|source| named_source(source)),
            help: help_text(diag),
            related,
        }
    }

    /// Labels pointing into the diagnostic's own source.
    fn own_labels(&self) -> impl Iterator<Item = &'a Label> + '_ {
        let own = self.diag.source();
        self.diag
            .labels()
            .iter()
            .filter(move |label| label.source().is_none_or(|source| is_same_source(own, source)))
    }
}

impl fmt::Debug for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiagnosticAdapter")
            .field("diag", &self.diag)
            .finish()
    }
}

impl fmt::Display for DiagnosticAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.diag.message())
    }
}

impl std::error::Error for DiagnosticAdapter<'_> {}

impl MietteDiagnostic for DiagnosticAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.diag
            .code()
            .map(|c| Box::new(c) as Box<dyn fmt::Display>)
    }

    fn severity(&self) -> Option<miette::Severity> {
        Some(match self.diag.severity() {
            Severity::Error => miette::Severity::Error,
            Severity::Warning => miette::Severity::Warning,
        })
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        self.help
            .as_ref()
            .map(|h| Box::new(h) as Box<dyn fmt::Display>)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        self.src.as_ref().map(|src| src as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let source = self.diag.source()?;
        let mut labels = self.own_labels().peekable();
        labels.peek()?;

        Some(Box::new(labels.filter_map(move |label| {
            let span = span_to_miette(source, label.span())?;
            let message = Some(label.message().to_string());
            Some(if label.is_primary() {
                LabeledSpan::new_primary_with_span(message, span)
            } else {
                LabeledSpan::new_with_span(message, span)
            })
        })))
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn MietteDiagnostic> + 'a>> {
        if self.related.is_empty() {
            return None;
        }
        Some(Box::new(
            self.related
                .iter()
                .map(|hint| hint as &dyn MietteDiagnostic),
        ))
    }
}

/// A label of a diagnostic pointing into another file.
pub struct HintAdapter<'a> {
    label: &'a Label,
    source: &'a Source,
    src: NamedSource<String>,
}

impl<'a> HintAdapter<'a> {
    fn new(label: &'a Label, source: &'a Arc<Source>) -> Self {
        Self {
            label,
            source,
            src: named_source(source),
        }
    }
}

impl fmt::Debug for HintAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HintAdapter")
            .field("label", &self.label)
            .finish()
    }
}

impl fmt::Display for HintAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.label.message())
    }
}

impl std::error::Error for HintAdapter<'_> {}

impl MietteDiagnostic for HintAdapter<'_> {
    fn severity(&self) -> Option<miette::Severity> {
        Some(miette::Severity::Advice)
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        Some(&self.src as &dyn SourceCode)
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        let span = span_to_miette(self.source, self.label.span())?;
        Some(Box::new(std::iter::once(LabeledSpan::new_with_span(
            None, span,
        ))))
    }
}

/// Adapter for non-diagnostic [`CorgiError`] variants.
///
/// This adapter handles errors that don't have rich diagnostic information,
/// such as I/O errors, missing inputs and manifest errors.
pub struct ErrorAdapter<'a>(pub &'a CorgiError);

impl fmt::Debug for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl fmt::Display for ErrorAdapter<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl std::error::Error for ErrorAdapter<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.0.source()
    }
}

impl MietteDiagnostic for ErrorAdapter<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        let code = match &self.0 {
            CorgiError::Io(_) => "corgi::io",
            CorgiError::Load(_) => "corgi::load",
            CorgiError::NotFound(_) => "corgi::not_found",
            CorgiError::Diagnostics(_) => return None,
            CorgiError::Manifest(_) => "corgi::manifest",
        };
        Some(Box::new(code))
    }
}

/// A reportable error that can be rendered by miette.
///
/// This enum wraps either a single diagnostic or a non-diagnostic error,
/// providing a uniform interface for error rendering.
#[derive(Debug)]
pub enum Reportable<'a> {
    /// A rich diagnostic with source location information.
    Diagnostic(DiagnosticAdapter<'a>),
    /// A simple error without source location.
    Error(ErrorAdapter<'a>),
}

impl fmt::Display for Reportable<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Reportable::Diagnostic(d) => fmt::Display::fmt(d, f),
            Reportable::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}

impl std::error::Error for Reportable<'_> {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Reportable::Diagnostic(_) => None,
            Reportable::Error(e) => e.source(),
        }
    }
}

impl MietteDiagnostic for Reportable<'_> {
    fn code<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.code(),
            Reportable::Error(e) => e.code(),
        }
    }

    fn severity(&self) -> Option<miette::Severity> {
        match self {
            Reportable::Diagnostic(d) => d.severity(),
            Reportable::Error(e) => e.severity(),
        }
    }

    fn help<'a>(&'a self) -> Option<Box<dyn fmt::Display + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.help(),
            Reportable::Error(e) => e.help(),
        }
    }

    fn source_code(&self) -> Option<&dyn SourceCode> {
        match self {
            Reportable::Diagnostic(d) => d.source_code(),
            Reportable::Error(e) => e.source_code(),
        }
    }

    fn labels(&self) -> Option<Box<dyn Iterator<Item = LabeledSpan> + '_>> {
        match self {
            Reportable::Diagnostic(d) => d.labels(),
            Reportable::Error(e) => e.labels(),
        }
    }

    fn related<'a>(&'a self) -> Option<Box<dyn Iterator<Item = &'a dyn MietteDiagnostic> + 'a>> {
        match self {
            Reportable::Diagnostic(d) => d.related(),
            Reportable::Error(e) => e.related(),
        }
    }
}

/// Convert a corgi [`Span`] in `source` to a miette [`SourceSpan`].
///
/// Returns `None` for spans at invalid positions.
fn span_to_miette(source: &Source, span: Span) -> Option<SourceSpan> {
    let start = source.offset(span.start())?;
    let end = source.offset(span.end()).unwrap_or(start).max(start);
    Some(SourceSpan::new(start.into(), end - start))
}

fn named_source(source: &Source) -> NamedSource<String> {
    NamedSource::new(source.name(), source.text().to_string())
}

fn is_same_source(own: Option<&Arc<Source>>, other: &Arc<Source>) -> bool {
    own.is_some_and(|own| Arc::ptr_eq(own, other) || own.name() == other.name())
}

/// Combine the help text, the expected form and the suggestions.
fn help_text(diag: &Diagnostic) -> Option<String> {
    let mut lines: Vec<String> = diag.help().map(str::to_string).into_iter().collect();
    if let Some(should_be) = diag.should_be() {
        lines.push(format!("should be: {should_be}"));
    }
    if let Some(example) = diag.example() {
        lines.push(format!("example: {example}"));
    }
    for suggestion in diag.suggestions() {
        let mut line = suggestion.message.clone();
        if let Some(code) = suggestion.code.as_ref().or(suggestion.should_be.as_ref()) {
            line.push_str(&format!(": `{code}`"));
        }
        if let Some(example) = &suggestion.example {
            line.push_str(&format!(" (e.g. {example})"));
        }
        lines.push(line);
    }
    (!lines.is_empty()).then(|| lines.join("\n"))
}

/// Convert a [`CorgiError`] into a list of reportable errors.
///
/// For [`CorgiError::Diagnostics`], this returns one [`Reportable`] for
/// each diagnostic in the error. For other error variants, this returns a
/// single [`Reportable`].
pub fn to_reportables(err: &CorgiError) -> Vec<Reportable<'_>> {
    match err {
        CorgiError::Diagnostics(err) => err
            .diagnostics()
            .iter()
            .map(|d| Reportable::Diagnostic(DiagnosticAdapter::new(d)))
            .collect(),
        _ => vec![Reportable::Error(ErrorAdapter(err))],
    }
}

/// Render a reportable to a string with miette's graphical handler.
pub fn render(reportable: &Reportable<'_>) -> String {
    let mut writer = String::new();
    if GraphicalReportHandler::new()
        .render_report(&mut writer, reportable)
        .is_err()
    {
        return reportable.to_string();
    }
    writer
}

#[cfg(test)]
mod tests {
    use corgi::{DiagnosticError, ErrorCode, Position};
    use corgi_parser::error::Suggestion;

    use super::*;

    fn span(line: usize, col: usize, len: usize) -> Span {
        Span::at(Position::new(line, col), len)
    }

    fn source(name: &str, text: &str) -> Arc<Source> {
        Arc::new(Source::new(name, text))
    }

    #[test]
    fn test_single_diagnostic() {
        let diag = Diagnostic::error("test error")
            .with_code(ErrorCode::E205)
            .with_label(span(1, 1, 5), "here")
            .with_help("try this")
            .with_source(source("index.corgi", "hello"));
        let err = CorgiError::Diagnostics(DiagnosticError::new(vec![diag]));

        let reportables = to_reportables(&err);
        assert_eq!(reportables.len(), 1);

        match &reportables[0] {
            Reportable::Diagnostic(d) => {
                assert_eq!(d.to_string(), "test error");
                assert_eq!(d.code().unwrap().to_string(), "E205");
                assert_eq!(d.help().unwrap().to_string(), "try this");
            }
            Reportable::Error(_) => panic!("Expected Diagnostic"),
        }
    }

    #[test]
    fn test_multiple_diagnostics() {
        let src = source("index.corgi", "source code here...");
        let diags = vec![
            Diagnostic::error("first error").with_label(span(1, 1, 5), "first"),
            Diagnostic::error("second error").with_label(span(1, 8, 4), "second"),
            Diagnostic::error("third error").with_label(span(1, 13, 4), "third"),
        ]
        .into_iter()
        .map(|diag| diag.with_source(Arc::clone(&src)))
        .collect();
        let err = CorgiError::Diagnostics(DiagnosticError::new(diags));

        let reportables = to_reportables(&err);

        assert_eq!(reportables.len(), 3);
        assert_eq!(reportables[0].to_string(), "first error");
        assert_eq!(reportables[1].to_string(), "second error");
        assert_eq!(reportables[2].to_string(), "third error");
    }

    #[test]
    fn test_non_diagnostic_error() {
        let err = CorgiError::NotFound("index.corgi".to_string());

        let reportables = to_reportables(&err);

        assert_eq!(reportables.len(), 1);
        match &reportables[0] {
            Reportable::Error(e) => {
                assert_eq!(e.to_string(), "not found: index.corgi");
                assert_eq!(e.code().unwrap().to_string(), "corgi::not_found");
            }
            Reportable::Diagnostic(_) => panic!("Expected Error"),
        }
    }

    #[test]
    fn test_labels_use_byte_offsets() {
        let diag = Diagnostic::error("unknown mixin")
            .with_label(span(2, 3, 4), "primary label")
            .with_secondary_label(span(1, 1, 2), "secondary label")
            .with_source(source("index.corgi", "ab\ncdefgh\n"));

        let adapter = DiagnosticAdapter::new(&diag);

        let labels: Vec<_> = adapter.labels().unwrap().collect();
        assert_eq!(labels.len(), 2);
        assert_eq!(labels[0].label(), Some("primary label"));
        assert!(labels[0].primary());
        assert_eq!(labels[0].offset(), 5);
        assert_eq!(labels[0].len(), 4);
        assert_eq!(labels[1].label(), Some("secondary label"));
        assert!(!labels[1].primary());
        assert_eq!(labels[1].offset(), 0);
    }

    #[test]
    fn test_labels_in_other_files_are_related() {
        let button = source("ui/button.corgil", "mixin Button(label string)\n  button= label\n");
        let diag = Diagnostic::error("missing argument `label`")
            .with_code(ErrorCode::E304)
            .with_label(span(1, 1, 7), "called here")
            .with_secondary_label_in(&button, span(1, 14, 5), "declared here")
            .with_source(source("index.corgi", "+ui.Button()\n"));

        let adapter = DiagnosticAdapter::new(&diag);

        let labels: Vec<_> = adapter.labels().unwrap().collect();
        assert_eq!(labels.len(), 1);

        let related: Vec<_> = adapter.related().unwrap().collect();
        assert_eq!(related.len(), 1);
        assert_eq!(related[0].to_string(), "declared here");
        assert_eq!(related[0].severity(), Some(miette::Severity::Advice));
        let hint: Vec<_> = related[0].labels().unwrap().collect();
        assert_eq!(hint[0].offset(), 13);
    }

    #[test]
    fn test_help_collects_suggestions() {
        let diag = Diagnostic::error("unknown mixin `Buton`")
            .with_help("no such mixin in scope")
            .with_should_be("+Name(args)")
            .with_suggestion(Suggestion::new("did you mean").with_code("Button"));

        let adapter = DiagnosticAdapter::new(&diag);

        assert_eq!(
            adapter.help().unwrap().to_string(),
            "no such mixin in scope\nshould be: +Name(args)\ndid you mean: `Button`"
        );
        assert!(adapter.source_code().is_none());
        assert!(adapter.labels().is_none());
    }

    #[test]
    fn test_render_warning() {
        let diag = Diagnostic::warning("library `ui` exports no mixins")
            .with_label(span(1, 1, 8), "used here")
            .with_source(source("index.corgi", "use \"ui\"\n"));
        let reportable = Reportable::Diagnostic(DiagnosticAdapter::new(&diag));

        assert_eq!(reportable.severity(), Some(miette::Severity::Warning));
        let rendered = render(&reportable);
        assert!(rendered.contains("library `ui` exports no mixins"));
        assert!(rendered.contains("used here"));
    }
}
