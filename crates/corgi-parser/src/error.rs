//! Error and diagnostic system for corgi.
//!
//! This module provides an error handling system with:
//! - Error codes for documentation and searchability
//! - Multiple labeled positions, possibly in different files
//! - Help text, expected forms and suggestions
//! - A collector that de-duplicates and orders diagnostics
//!
//! # Overview
//!
//! The error system is built around the [`Diagnostic`] type, which represents
//! a single error or warning with an optional error code, labeled source
//! locations and help text. The lexer and parser stop at the first error of a
//! file and return it wrapped in a [`DiagnosticError`]. Later stages (linking,
//! analysis, validation) report every independent problem, accumulated in a
//! [`DiagnosticCollector`].
//!
//! # Example
//!
//! ```
//! # use corgi_parser::error::{Diagnostic, ErrorCode};
//! # use corgi_core::{Position, Span};
//!
//! let call = Span::at(Position::new(12, 5), 9);
//! let definition = Span::at(Position::new(3, 1), 11);
//!
//! let diag = Diagnostic::error("unknown parameter `size` for mixin `Button`")
//!     .with_code(ErrorCode::E302)
//!     .with_label(call, "no such parameter")
//!     .with_secondary_label(definition, "mixin defined here")
//!     .with_help("remove the argument or add a parameter to the mixin");
//! ```

mod collector;
mod diagnostic;
mod diagnostic_error;
mod error_code;
mod label;
mod severity;

pub use collector::DiagnosticCollector;
pub(crate) use diagnostic_error::Result;

pub use diagnostic::{Diagnostic, Suggestion};
pub use diagnostic_error::DiagnosticError;
pub use error_code::ErrorCode;
pub use label::Label;
pub use severity::Severity;
