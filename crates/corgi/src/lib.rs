//! Corgi - an indentation-based HTML template language.
//!
//! This crate links parsed corgi files into compilation units and checks
//! them. A compilation runs in stages, each stopping the pipeline when it
//! reports errors:
//!
//! 1. **Load** - parse the main file through a [`Loader`]
//! 2. **Link** - load and bind everything it references ([`Linker`])
//! 3. **Analyze** - summarize what every mixin may write ([`analyze()`])
//! 4. **Validate** - check attribute placement, fills and void elements
//!    ([`validate()`])
//!
//! [`Compiler`] runs all of them with the file system loader, the intrinsic
//! library and single-flight caching.

pub mod config;
pub mod intrinsic;
pub mod loader;
pub mod manifest;

mod analyze;
mod cache;
mod error;
mod fs_loader;
mod link;
mod validate;

#[cfg(test)]
mod testing;

pub use corgi_core::{Position, Source, Span, ast, identifier};
pub use corgi_parser::{Diagnostic, DiagnosticError, ErrorCode, Severity};

pub use analyze::analyze;
pub use cache::CachingLoader;
pub use error::CorgiError;
pub use fs_loader::{FsLoader, LIBRARY_EXTENSION, TEMPLATE_EXTENSION, library_dirs, logical_path};
pub use link::{LinkOutput, Linker};
pub use validate::validate;

use std::{path::Path, sync::Arc};

use log::{debug, info};

use corgi_core::ast::{File, FileKind, Library};

use config::CompilerConfig;
use intrinsic::{IntrinsicLoader, IntrinsicRegistry};
use loader::Loader;
use manifest::Manifest;

/// Compiles corgi files and libraries.
///
/// # Examples
///
/// ```rust,no_run
/// use std::path::Path;
///
/// use corgi::{Compiler, config::CompilerConfig};
///
/// let config = CompilerConfig::new("example.com/site", vec!["templates".into()]);
/// let compiler = Compiler::new(config);
///
/// let compilation = compiler
///     .compile(Path::new("templates/index.corgi"))
///     .expect("Failed to compile");
///
/// let manifest = compilation.manifest(Some("templates".to_string()));
/// println!("{}", manifest.to_toml().expect("Failed to write manifest"));
/// ```
pub struct Compiler {
    config: CompilerConfig,
    registry: IntrinsicRegistry,
    loader: Box<dyn Loader>,
}

impl Compiler {
    /// Create a compiler reading from the roots of `config`.
    pub fn new(config: CompilerConfig) -> Self {
        let loader = FsLoader::from_config(&config);
        Self::with_loader(config, loader)
    }

    /// Create a compiler reading through a custom loader.
    ///
    /// Paths passed to [`compile`](Self::compile) are made relative to the
    /// configured roots and handed to `loader` as logical paths.
    pub fn with_loader(config: CompilerConfig, loader: impl Loader + 'static) -> Self {
        Self {
            registry: IntrinsicRegistry::from_config(&config),
            config,
            loader: Box::new(loader),
        }
    }

    pub fn config(&self) -> &CompilerConfig {
        &self.config
    }

    pub fn registry(&self) -> &IntrinsicRegistry {
        &self.registry
    }

    /// Compile the main file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`CorgiError::NotFound`] if the file does not exist,
    /// [`CorgiError::Load`] if it cannot be read and
    /// [`CorgiError::Diagnostics`] with every error of the first failing
    /// stage otherwise.
    pub fn compile(&self, path: &Path) -> Result<Compilation, CorgiError> {
        let logical = logical_path(self.config.roots(), path);
        info!(path = logical.as_str(); "Compiling file");

        let loader = CachingLoader::new(IntrinsicLoader::new(&*self.loader, &self.registry)?);
        let main = loader
            .load_main(&logical)?
            .ok_or_else(|| CorgiError::NotFound(logical.clone()))?;

        let output = Linker::new(&loader).link_file(main)?;
        check(&output)?;

        let mut files = output.files.into_iter();
        let main = files
            .next()
            .ok_or_else(|| CorgiError::NotFound(logical.clone()))?;
        info!(path = logical.as_str(), files = files.len() + 1; "Compiled file");

        Ok(Compilation {
            main,
            files: files.collect(),
            libraries: output.libraries,
            warnings: output.warnings,
        })
    }

    /// Compile the library formed by the directory at `dir`.
    ///
    /// # Errors
    ///
    /// As [`compile`](Self::compile); a directory without library files is
    /// [`CorgiError::NotFound`].
    pub fn compile_library(&self, dir: &Path) -> Result<LibraryCompilation, CorgiError> {
        let logical = logical_path(self.config.roots(), dir)
            .trim_end_matches('/')
            .to_string();
        info!(path = logical.as_str(); "Compiling library");

        let loader = CachingLoader::new(IntrinsicLoader::new(&*self.loader, &self.registry)?);
        // Library paths resolve against the requesting file; a library
        // compiled on its own is requested from the module root.
        let anchor = File::new(
            Arc::new(Source::new("<library>", "")),
            self.config.module(),
            "",
            FileKind::Unknown,
        );
        let library = loader
            .load_library(&anchor, &logical)?
            .filter(|library| !library.files.is_empty())
            .ok_or_else(|| CorgiError::NotFound(logical.clone()))?;

        let output = Linker::new(&loader).link_library(Arc::clone(&library))?;
        check(&output)?;
        info!(path = logical.as_str(), files = library.files.len(); "Compiled library");

        Ok(LibraryCompilation {
            library,
            files: output.files,
            libraries: output.libraries,
            warnings: output.warnings,
        })
    }
}

/// Analyze and validate a successful link.
fn check(output: &LinkOutput) -> Result<(), CorgiError> {
    for warning in &output.warnings {
        debug!(warning:% = warning; "Link warning");
    }
    analyze(&output.files)?;
    debug!(files = output.files.len(); "Analyzed");
    validate(&output.files)?;
    Ok(())
}

/// A successfully compiled main file.
#[derive(Debug)]
pub struct Compilation {
    main: Arc<File>,
    files: Vec<Arc<File>>,
    libraries: Vec<Arc<Library>>,
    warnings: Vec<Diagnostic>,
}

impl Compilation {
    pub fn main(&self) -> &Arc<File> {
        &self.main
    }

    /// Every other linked file, ordered by key.
    pub fn files(&self) -> &[Arc<File>] {
        &self.files
    }

    pub fn libraries(&self) -> &[Arc<Library>] {
        &self.libraries
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Describe the main file, placed in `package`.
    pub fn manifest(&self, package: Option<String>) -> Manifest {
        Manifest::from_file(&self.main, package)
    }
}

/// A successfully compiled library.
#[derive(Debug)]
pub struct LibraryCompilation {
    library: Arc<Library>,
    files: Vec<Arc<File>>,
    libraries: Vec<Arc<Library>>,
    warnings: Vec<Diagnostic>,
}

impl LibraryCompilation {
    pub fn library(&self) -> &Arc<Library> {
        &self.library
    }

    /// Every linked file, the library's own first.
    pub fn files(&self) -> &[Arc<File>] {
        &self.files
    }

    /// Every linked library, this one included.
    pub fn libraries(&self) -> &[Arc<Library>] {
        &self.libraries
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    pub fn manifest(&self) -> Manifest {
        Manifest::from_library(&self.library)
    }
}
