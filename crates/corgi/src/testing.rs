//! Test helpers shared by the unit tests of this crate.

use std::{collections::HashMap, sync::Arc};

use corgi_core::{
    Source,
    ast::{File, IncludeTarget, Library},
};
use corgi_parser::{Mode, parse};

use crate::loader::{LoadResult, Loader, resolve_path};

/// Serves files from memory, parsing them anew on every request.
///
/// A library `path` is the single file `path/lib.corgil`.
pub(crate) struct MemoryLoader {
    files: HashMap<&'static str, &'static str>,
}

impl MemoryLoader {
    pub(crate) fn new(files: &[(&'static str, &'static str)]) -> Self {
        Self {
            files: files.iter().copied().collect(),
        }
    }

    fn parse(&self, path: &str, mode: Mode) -> LoadResult<Arc<File>> {
        let Some(text) = self.files.get(path) else {
            return Ok(None);
        };
        let source = Arc::new(Source::new(path, *text));
        Ok(Some(Arc::new(parse(source, "", path, mode)?)))
    }
}

impl Loader for MemoryLoader {
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
        self.parse(path, Mode::Main)
    }

    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
        self.parse(&resolve_path(&extending.path, path), Mode::Extend)
    }

    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget> {
        let file = self.parse(&resolve_path(&including.path, path), Mode::Include)?;
        Ok(file.map(IncludeTarget::File))
    }

    fn load_library(&self, _using: &File, path: &str) -> LoadResult<Arc<Library>> {
        let file = self.parse(&format!("{path}/lib.corgil"), Mode::Use)?;
        Ok(file.map(|file| {
            Arc::new(Library {
                module: String::new(),
                path: path.to_string(),
                files: vec![file],
            })
        }))
    }
}
