//! Loading corgi files from the file system.
//!
//! Logical paths use `/` separators. A logical path is looked up under each
//! configured root in order; the first root containing it wins. `.corgi`
//! files are mains, templates and includes. A library is the set of
//! `.corgil` files of one directory.

use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use log::{debug, trace};

use corgi_core::{
    Source,
    ast::{File, FileKind, IncludeTarget, Library, RawFile},
};
use corgi_parser::{Diagnostic, DiagnosticError, Mode, parse};

use crate::{
    config::CompilerConfig,
    loader::{LoadError, LoadResult, Loader, resolve_path},
};

/// Extension of mains, templates and includes.
pub const TEMPLATE_EXTENSION: &str = "corgi";

/// Extension of library files.
pub const LIBRARY_EXTENSION: &str = "corgil";

/// A [`Loader`] reading from one or more root directories.
#[derive(Debug, Clone)]
pub struct FsLoader {
    module: String,
    roots: Vec<PathBuf>,
}

impl FsLoader {
    /// Create a loader for `module` reading below `roots`.
    ///
    /// Without roots, paths are resolved against the working directory.
    pub fn new(module: impl Into<String>, roots: Vec<PathBuf>) -> Self {
        let roots = if roots.is_empty() {
            vec![PathBuf::from(".")]
        } else {
            roots
        };
        Self {
            module: module.into(),
            roots,
        }
    }

    /// Create a loader from the module and roots of `config`.
    pub fn from_config(config: &CompilerConfig) -> Self {
        Self::new(config.module(), config.roots().to_vec())
    }

    /// The logical path of a file system path.
    pub fn logical_path(&self, path: &Path) -> String {
        logical_path(&self.roots, path)
    }

    fn locate(&self, logical: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(logical))
            .find(|path| path.is_file())
    }

    fn locate_dir(&self, logical: &str) -> Option<PathBuf> {
        self.roots
            .iter()
            .map(|root| root.join(logical))
            .find(|path| path.is_dir())
    }

    fn read_source(&self, physical: &Path) -> Result<Arc<Source>, LoadError> {
        let bytes = fs::read(physical).map_err(|err| io_error(physical, err))?;
        Source::from_bytes(physical.display().to_string(), bytes)
            .map_err(|err| io_error(physical, err))
    }

    fn parse_file(
        &self,
        logical: &str,
        physical: &Path,
        mode: Mode,
    ) -> Result<Arc<File>, LoadError> {
        trace!(path = logical, mode:?; "Parsing file");
        let source = self.read_source(physical)?;
        let file = parse(source, &self.module, logical, mode)?;
        Ok(Arc::new(file))
    }

    /// Strip this loader's module from an absolute library path.
    fn library_path(&self, using: &File, path: &str) -> String {
        let local = if self.module.is_empty() {
            None
        } else {
            path.strip_prefix(self.module.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
        };
        match local {
            Some(local) => local.to_string(),
            None => resolve_path(&using.path, path),
        }
    }

    fn read_library(&self, dir: &str) -> LoadResult<Arc<Library>> {
        let Some(physical) = self.locate_dir(dir) else {
            return Ok(None);
        };

        let mut paths: Vec<PathBuf> = fs::read_dir(&physical)
            .map_err(|err| io_error(&physical, err))?
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.is_file() && has_extension(path, LIBRARY_EXTENSION))
            .collect();
        paths.sort();

        let mut files = Vec::with_capacity(paths.len());
        let mut diagnostics: Vec<Diagnostic> = Vec::new();
        for path in &paths {
            let name = path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default();
            let logical = if dir.is_empty() {
                name
            } else {
                format!("{dir}/{name}")
            };
            match self.parse_file(&logical, path, Mode::Use) {
                Ok(file) => files.push(file),
                Err(LoadError::Parse(err)) => diagnostics.extend(err.into_diagnostics()),
                Err(err) => return Err(err),
            }
        }
        if !diagnostics.is_empty() {
            return Err(LoadError::Parse(DiagnosticError::new(diagnostics)));
        }

        debug!(library = dir, files = files.len(); "Loaded library");
        Ok(Some(Arc::new(Library {
            module: self.module.clone(),
            path: dir.to_string(),
            files,
        })))
    }
}

impl Loader for FsLoader {
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
        let Some(physical) = self.locate(path) else {
            return Ok(None);
        };
        debug!(path; "Loading main file");
        self.parse_file(path, &physical, Mode::Main).map(Some)
    }

    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
        let logical = resolve_path(&extending.path, path);
        let Some(physical) = self.locate(&logical) else {
            return Ok(None);
        };
        debug!(path = logical.as_str(); "Loading template");
        self.parse_file(&logical, &physical, Mode::Extend).map(Some)
    }

    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget> {
        let logical = resolve_path(&including.path, path);
        let Some(physical) = self.locate(&logical) else {
            return Ok(None);
        };
        debug!(path = logical.as_str(); "Loading include");

        if has_extension(&physical, TEMPLATE_EXTENSION) {
            let file = self.parse_file(&logical, &physical, Mode::Include)?;
            return Ok(Some(IncludeTarget::File(file)));
        }

        let bytes = fs::read(&physical).map_err(|err| io_error(&physical, err))?;
        let contents = String::from_utf8(bytes).map_err(|err| io_error(&physical, err))?;
        Ok(Some(IncludeTarget::Raw(RawFile {
            path: logical,
            contents,
        })))
    }

    fn load_library(&self, using: &File, path: &str) -> LoadResult<Arc<Library>> {
        let dir = self.library_path(using, path);
        debug!(path, dir = dir.as_str(); "Loading library");
        self.read_library(&dir)
    }

    fn load_dir_library(&self, file: &File) -> LoadResult<Arc<Library>> {
        if !matches!(
            file.kind,
            FileKind::Main | FileKind::Template | FileKind::Include
        ) {
            return Ok(None);
        }
        let dir = file.path.rsplit_once('/').map_or("", |(dir, _)| dir);
        match self.read_library(dir)? {
            Some(library) if !library.files.is_empty() => Ok(Some(library)),
            _ => Ok(None),
        }
    }
}

/// The logical path of `path` relative to the first root containing it.
pub fn logical_path(roots: &[PathBuf], path: &Path) -> String {
    let relative = roots
        .iter()
        .find_map(|root| path.strip_prefix(root).ok())
        .unwrap_or(path);
    relative.to_string_lossy().replace('\\', "/")
}

/// Every directory below `root`, `root` included, holding library files.
///
/// # Errors
///
/// Returns the first directory that cannot be listed.
pub fn library_dirs(root: &Path) -> std::io::Result<Vec<PathBuf>> {
    let mut dirs = Vec::new();
    let mut pending = vec![root.to_path_buf()];
    while let Some(dir) = pending.pop() {
        let mut is_library = false;
        for entry in fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.is_dir() {
                pending.push(path);
            } else if has_extension(&path, LIBRARY_EXTENSION) {
                is_library = true;
            }
        }
        if is_library {
            dirs.push(dir);
        }
    }
    dirs.sort();
    Ok(dirs)
}

fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension().is_some_and(|ext| ext == extension)
}

fn io_error(path: &Path, err: impl std::fmt::Display) -> LoadError {
    LoadError::Io {
        path: path.display().to_string(),
        message: err.to_string(),
    }
}
