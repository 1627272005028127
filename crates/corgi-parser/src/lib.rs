//! # Corgi Parser
//!
//! Lexer and parser for the corgi template language. This crate turns source
//! text into the syntax tree defined in [`corgi_core::ast`]:
//!
//! 1. **Lex** - an indentation-aware state machine produces positioned tokens
//! 2. **Parse** - a mode- and context-aware recursive-descent parser builds the
//!    [`File`](corgi_core::ast::File), parsing expressions and text
//!    interpolations on the way
//!
//! Both stop at the first error of a file. Linking, analysis and validation
//! live in the `corgi` crate and report through the same [`error`] types.
//!
//! ## Usage
//!
//! ```
//! # use std::sync::Arc;
//! # use corgi_core::Source;
//! # use corgi_parser::{parse, Mode, DiagnosticError};
//!
//! fn main() -> Result<(), DiagnosticError> {
//!     let source = Arc::new(Source::new(
//!         "hello.corgi",
//!         "func Hello(name string)\n\np Hello, #{name}!\n",
//!     ));
//!
//!     let file = parse(source, "example.com/app", "hello.corgi", Mode::Main)?;
//!     assert_eq!(file.func.map(|func| func.name).as_deref(), Some("Hello"));
//!     Ok(())
//! }
//! ```

pub mod error;
mod expression;
mod interpolation;
pub mod lexer;
mod parser;
#[cfg(test)]
mod parser_tests;
pub mod tokens;

pub use error::{Diagnostic, DiagnosticCollector, DiagnosticError, ErrorCode, Severity};
pub use expression::parse_expression;
pub use parser::{Context, Mode, parse, parse_with_context};
