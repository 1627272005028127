//! Intrinsic mixins.
//!
//! Intrinsics are the few mixins the rest of a mixin library is written in
//! terms of. Their bodies are produced by the code generator, so analysis
//! cannot derive what they write; their [`MixinInfo`] is fixed by their
//! [`IntrinsicKind`] instead. The registry is constructed explicitly and
//! handed to an [`IntrinsicLoader`], which serves it as a regular library:
//!
//! ```text
//! use "corgi/std/intrinsic"
//!
//! mixin Button()
//!   +intrinsic.Element(name="button")
//!     &&
//!     block _
//! ```

use std::sync::Arc;

use indexmap::IndexMap;
use log::debug;
use serde::{Deserialize, Serialize};

use corgi_core::{
    Source,
    ast::{File, IncludeTarget, Library, LibraryKey, MixinBlockInfo, MixinInfo},
    identifier::Id,
};
use corgi_parser::{DiagnosticError, Mode, parse};

use crate::{
    config::CompilerConfig,
    loader::{LoadResult, Loader},
};

/// Module of the built-in intrinsic library.
pub const DEFAULT_MODULE: &str = "corgi";

/// Path of the built-in intrinsic library within [`DEFAULT_MODULE`].
pub const DEFAULT_LIBRARY: &str = "std/intrinsic";

/// What an intrinsic writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntrinsicKind {
    /// Only contributes attributes to the enclosing element.
    Attributes,
    /// Writes a whole element, body included.
    Element,
}

impl IntrinsicKind {
    /// The fixed summary of intrinsics of this kind.
    pub fn info(self) -> MixinInfo {
        match self {
            IntrinsicKind::Attributes => MixinInfo {
                writes_top_level_attributes: true,
                has_and_placeholders: true,
                top_level_and_placeholder: true,
                ..MixinInfo::default()
            },
            IntrinsicKind::Element => MixinInfo {
                writes_body: true,
                writes_elements: true,
                has_and_placeholders: true,
                blocks: vec![MixinBlockInfo {
                    name: Id::content_block(),
                    top_level: false,
                    can_attributes: true,
                    default_writes_body: false,
                    default_writes_elements: false,
                    default_writes_top_level_attributes: false,
                    default_top_level_and_placeholder: false,
                }],
                ..MixinInfo::default()
            },
        }
    }
}

#[derive(Debug, Clone)]
struct Intrinsic {
    kind: IntrinsicKind,
    params: String,
}

/// The set of intrinsic mixins of a compilation.
#[derive(Debug, Clone)]
pub struct IntrinsicRegistry {
    module: String,
    path: String,
    intrinsics: IndexMap<String, Intrinsic>,
}

impl Default for IntrinsicRegistry {
    /// `Attrs` and `Element` in `corgi/std/intrinsic`.
    fn default() -> Self {
        let mut registry = Self::new(DEFAULT_MODULE, DEFAULT_LIBRARY);
        registry.register("Attrs", IntrinsicKind::Attributes, "");
        registry.register("Element", IntrinsicKind::Element, "name string");
        registry
    }
}

impl IntrinsicRegistry {
    /// An empty registry served as library `path` of `module`.
    pub fn new(module: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            path: path.into(),
            intrinsics: IndexMap::new(),
        }
    }

    /// The default registry extended with the intrinsics of `config`.
    pub fn from_config(config: &CompilerConfig) -> Self {
        let mut registry = Self::default();
        for intrinsic in config.intrinsics() {
            registry.register(intrinsic.name(), intrinsic.kind(), intrinsic.params());
        }
        registry
    }

    /// Add an intrinsic, replacing one of the same name.
    pub fn register(
        &mut self,
        name: impl Into<String>,
        kind: IntrinsicKind,
        params: impl Into<String>,
    ) {
        self.intrinsics.insert(
            name.into(),
            Intrinsic {
                kind,
                params: params.into(),
            },
        );
    }

    /// The path `use` directives name the library by.
    pub fn import_path(&self) -> String {
        format!("{}/{}", self.module, self.path)
    }

    pub fn key(&self) -> LibraryKey {
        LibraryKey::new(self.module.clone(), self.path.clone())
    }

    pub fn len(&self) -> usize {
        self.intrinsics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intrinsics.is_empty()
    }

    /// Build the library declaring every intrinsic, with summaries attached.
    ///
    /// # Errors
    ///
    /// Returns the parse error of an intrinsic with a malformed parameter list.
    pub fn build_library(&self) -> Result<Library, DiagnosticError> {
        let text: String = self
            .intrinsics
            .iter()
            .map(|(name, intrinsic)| format!("mixin {name}({})\n", intrinsic.params))
            .collect();
        let source = Arc::new(Source::new(format!("<{}>", self.import_path()), text));
        let file = parse(
            source,
            &self.module,
            &format!("{}/intrinsic.corgil", self.path),
            Mode::Use,
        )?;

        for mixin in file.top_level_mixins() {
            if let Some(intrinsic) = self.intrinsics.get(&mixin.name.as_string()) {
                let _ = mixin.info.set(intrinsic.kind.info());
            }
        }

        debug!(library:% = self.key(), intrinsics = self.len(); "Built intrinsic library");
        Ok(Library {
            module: self.module.clone(),
            path: self.path.clone(),
            files: vec![Arc::new(file)],
        })
    }
}

/// A [`Loader`] serving the intrinsic library before asking `inner`.
#[derive(Debug)]
pub struct IntrinsicLoader<L> {
    inner: L,
    import_path: String,
    library: Arc<Library>,
}

impl<L: Loader> IntrinsicLoader<L> {
    /// Wrap `inner`, serving the library built from `registry`.
    ///
    /// # Errors
    ///
    /// Returns the error of [`IntrinsicRegistry::build_library`].
    pub fn new(inner: L, registry: &IntrinsicRegistry) -> Result<Self, DiagnosticError> {
        Ok(Self {
            inner,
            import_path: registry.import_path(),
            library: Arc::new(registry.build_library()?),
        })
    }
}

impl<L: Loader> Loader for IntrinsicLoader<L> {
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
        self.inner.load_main(path)
    }

    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
        self.inner.load_template(extending, path)
    }

    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget> {
        self.inner.load_include(including, path)
    }

    fn load_library(&self, using: &File, path: &str) -> LoadResult<Arc<Library>> {
        if path == self.import_path {
            return Ok(Some(Arc::clone(&self.library)));
        }
        self.inner.load_library(using, path)
    }

    fn load_dir_library(&self, file: &File) -> LoadResult<Arc<Library>> {
        self.inner.load_dir_library(file)
    }
}
