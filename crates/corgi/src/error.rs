//! Error types for corgi compilations.
//!
//! [`CorgiError`] wraps everything that can stop a compilation. Problems in
//! the templates themselves are always [`CorgiError::Diagnostics`], carrying
//! every diagnostic of the stage that failed.

use std::io;

use thiserror::Error;

use corgi_parser::DiagnosticError;

use crate::{loader::LoadError, manifest::ManifestError};

/// The main error type of the compiler facade.
#[derive(Debug, Error)]
pub enum CorgiError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// A file could not be loaded; parse failures are reported as
    /// diagnostics instead.
    #[error("{0}")]
    Load(LoadError),

    /// The file or directory to compile does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    #[error("{0}")]
    Diagnostics(#[from] DiagnosticError),

    #[error("{0}")]
    Manifest(#[from] ManifestError),
}

impl From<LoadError> for CorgiError {
    fn from(err: LoadError) -> Self {
        match err {
            LoadError::Parse(err) => Self::Diagnostics(err),
            err @ LoadError::Io { .. } => Self::Load(err),
        }
    }
}

impl CorgiError {
    /// The diagnostics of a failed stage, if this is one.
    pub fn diagnostics(&self) -> Option<&DiagnosticError> {
        match self {
            Self::Diagnostics(err) => Some(err),
            _ => None,
        }
    }
}
