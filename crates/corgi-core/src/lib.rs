//! # Corgi Core
//!
//! Core types shared by every stage of the corgi toolchain: source positions,
//! interned identifiers and the abstract syntax tree produced by the parser,
//! populated by the linker and summarized by mixin analysis.

pub mod ast;
pub mod identifier;
pub mod position;

pub use position::{Position, Source, SourceError, Span};
