//! The loader abstraction consumed by the linker.
//!
//! A [`Loader`] turns the logical paths written in `extend`, `include` and
//! `use` directives into parsed files and libraries. The linker never touches
//! the file system itself, so tests and embedders can serve sources from
//! memory. [`FsLoader`](crate::FsLoader) is the file system implementation and
//! [`CachingLoader`](crate::CachingLoader) adds single-flight de-duplication on
//! top of any loader.

use std::sync::Arc;

use thiserror::Error;

use corgi_core::ast::{File, IncludeTarget, Library};
use corgi_parser::DiagnosticError;

/// Failure to produce a file that exists.
///
/// A missing file is not an error at this level: loaders return `Ok(None)`
/// and the linker reports it at the directive that asked for it.
#[derive(Debug, Clone, Error)]
pub enum LoadError {
    /// The file was read but does not parse.
    #[error("{0}")]
    Parse(DiagnosticError),

    /// The file exists but could not be read.
    #[error("failed to read `{path}`: {message}")]
    Io { path: String, message: String },
}

impl From<DiagnosticError> for LoadError {
    fn from(err: DiagnosticError) -> Self {
        Self::Parse(err)
    }
}

/// Result of a single load.
pub type LoadResult<T> = Result<Option<T>, LoadError>;

/// Fetches and parses the files a compilation needs.
///
/// Every method receives the file containing the directive, so relative
/// paths can be resolved against it. Implementations are shared between the
/// linker's worker threads.
pub trait Loader: Send + Sync {
    /// Load the file being compiled, parsed as a main file.
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>>;

    /// Load the target of `extend` in `extending`, parsed as a template.
    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>>;

    /// Load the target of an `include` in `including`.
    ///
    /// Corgi files are parsed as include files, anything else is returned
    /// verbatim as [`IncludeTarget::Raw`].
    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget>;

    /// Load the library named by a `use` in `using`.
    fn load_library(&self, using: &File, path: &str) -> LoadResult<Arc<Library>>;

    /// Load the library formed by the directory of `file`, if any.
    fn load_dir_library(&self, file: &File) -> LoadResult<Arc<Library>> {
        let _ = file;
        Ok(None)
    }
}

impl<L: Loader + ?Sized> Loader for &L {
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
        (**self).load_main(path)
    }

    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
        (**self).load_template(extending, path)
    }

    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget> {
        (**self).load_include(including, path)
    }

    fn load_library(&self, using: &File, path: &str) -> LoadResult<Arc<Library>> {
        (**self).load_library(using, path)
    }

    fn load_dir_library(&self, file: &File) -> LoadResult<Arc<Library>> {
        (**self).load_dir_library(file)
    }
}

impl<L: Loader + ?Sized> Loader for Box<L> {
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
        (**self).load_main(path)
    }

    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
        (**self).load_template(extending, path)
    }

    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget> {
        (**self).load_include(including, path)
    }

    fn load_library(&self, using: &File, path: &str) -> LoadResult<Arc<Library>> {
        (**self).load_library(using, path)
    }

    fn load_dir_library(&self, file: &File) -> LoadResult<Arc<Library>> {
        (**self).load_dir_library(file)
    }
}

/// Resolve `path` written in a file at `from`.
///
/// `./` and `../` paths are relative to the directory of `from`; other paths
/// are returned unchanged. Both use `/` separators.
pub fn resolve_path(from: &str, path: &str) -> String {
    if !(path.starts_with("./") || path.starts_with("../")) {
        return path.to_string();
    }
    let dir = from.rsplit_once('/').map_or("", |(dir, _)| dir);
    join_path(dir, path)
}

/// Join a relative path onto `dir`, folding `.` and `..` segments.
pub(crate) fn join_path(dir: &str, path: &str) -> String {
    let absolute = dir.starts_with('/');
    let mut segments: Vec<&str> = Vec::new();
    for segment in dir.split('/').chain(path.split('/')) {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            segment => segments.push(segment),
        }
    }
    let joined = segments.join("/");
    if absolute { format!("/{joined}") } else { joined }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_path() {
        assert_eq!(resolve_path("pages/index.corgi", "./nav.corgi"), "pages/nav.corgi");
        assert_eq!(resolve_path("pages/index.corgi", "../base.corgi"), "base.corgi");
        assert_eq!(resolve_path("index.corgi", "./nav.corgi"), "nav.corgi");
        assert_eq!(resolve_path("index.corgi", "../shared/x.corgi"), "../shared/x.corgi");
        assert_eq!(resolve_path("pages/index.corgi", "layout/base.corgi"), "layout/base.corgi");
    }

    #[test]
    fn test_join_absolute() {
        assert_eq!(join_path("/srv/site/pages", "../ui"), "/srv/site/ui");
        assert_eq!(join_path("/", "../ui"), "/ui");
    }
}
