//! Compiler configuration.
//!
//! [`CompilerConfig`] is plain data implementing [`serde::Deserialize`]; the
//! CLI loads it from TOML:
//!
//! ```toml
//! module = "example.com/site"
//! roots = ["templates", "vendor"]
//!
//! [[intrinsics]]
//! name = "Svg"
//! kind = "element"
//! params = "name string"
//! ```
//!
//! # Example
//!
//! ```
//! # use corgi::config::CompilerConfig;
//! let config = CompilerConfig::from_toml("module = \"example.com/site\"").unwrap();
//! assert_eq!(config.module(), "example.com/site");
//! assert!(config.roots().is_empty());
//! ```

use std::path::PathBuf;

use serde::Deserialize;

use crate::intrinsic::IntrinsicKind;

/// Settings of one compilation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerConfig {
    /// Module the compiled files belong to.
    #[serde(default)]
    module: String,

    /// Directories logical paths are resolved against, in order.
    #[serde(default)]
    roots: Vec<PathBuf>,

    /// Intrinsic mixins in addition to the built-in ones.
    #[serde(default)]
    intrinsics: Vec<IntrinsicConfig>,
}

impl CompilerConfig {
    /// Creates a configuration for `module` reading below `roots`.
    pub fn new(module: impl Into<String>, roots: Vec<PathBuf>) -> Self {
        Self {
            module: module.into(),
            roots,
            intrinsics: Vec::new(),
        }
    }

    /// Parse a configuration from TOML text.
    ///
    /// # Errors
    ///
    /// Returns the TOML error for malformed input or unknown intrinsic kinds.
    pub fn from_toml(text: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(text)
    }

    /// Adds intrinsic mixins.
    pub fn with_intrinsics(
        mut self,
        intrinsics: impl IntoIterator<Item = IntrinsicConfig>,
    ) -> Self {
        self.intrinsics.extend(intrinsics);
        self
    }

    /// Replaces the roots, e.g. with ones given on the command line.
    pub fn with_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.roots = roots;
        self
    }

    pub fn module(&self) -> &str {
        &self.module
    }

    pub fn roots(&self) -> &[PathBuf] {
        &self.roots
    }

    pub fn intrinsics(&self) -> &[IntrinsicConfig] {
        &self.intrinsics
    }
}

/// An intrinsic mixin declared in the configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct IntrinsicConfig {
    name: String,
    kind: IntrinsicKind,
    /// Parameter list as written in a mixin definition, without parentheses.
    #[serde(default)]
    params: String,
}

impl IntrinsicConfig {
    pub fn new(name: impl Into<String>, kind: IntrinsicKind, params: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind,
            params: params.into(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> IntrinsicKind {
        self.kind
    }

    pub fn params(&self) -> &str {
        &self.params
    }
}
