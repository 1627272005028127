//! Single-flight caching on top of any [`Loader`].
//!
//! The linker resolves independent directives on separate threads, so two
//! paths through the dependency graph regularly ask for the same template or
//! library at the same time. [`CachingLoader`] guarantees at most one load per
//! key: the first caller runs the inner loader, later callers block on the
//! same slot and share its result, including failures.

use std::{
    collections::HashMap,
    hash::Hash,
    sync::{Arc, Mutex, OnceLock},
};

use log::trace;

use corgi_core::ast::{File, IncludeTarget, Library};

use crate::loader::{LoadResult, Loader, resolve_path};

type Slot<T> = Arc<OnceLock<LoadResult<T>>>;

/// What a cache entry was loaded as.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Kind {
    Main,
    Template,
    Include,
    Library,
    DirLibrary,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct Key {
    kind: Kind,
    module: String,
    path: String,
}

/// A [`Loader`] that loads every file and library at most once.
#[derive(Debug)]
pub struct CachingLoader<L> {
    inner: L,
    files: Mutex<HashMap<Key, Slot<Arc<File>>>>,
    includes: Mutex<HashMap<Key, Slot<IncludeTarget>>>,
    libraries: Mutex<HashMap<Key, Slot<Arc<Library>>>>,
}

impl<L: Loader> CachingLoader<L> {
    pub fn new(inner: L) -> Self {
        Self {
            inner,
            files: Mutex::default(),
            includes: Mutex::default(),
            libraries: Mutex::default(),
        }
    }

    /// The wrapped loader.
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

/// Get or load the entry for `key`.
///
/// The map lock is only held while looking up the slot, never during a load.
fn single_flight<K, T>(
    slots: &Mutex<HashMap<K, Slot<T>>>,
    key: K,
    load: impl FnOnce() -> LoadResult<T>,
) -> LoadResult<T>
where
    K: Eq + Hash,
    T: Clone,
{
    let slot = {
        let mut slots = slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(slots.entry(key).or_default())
    };
    slot.get_or_init(|| {
        trace!("Cache miss");
        load()
    })
    .clone()
}

fn key(kind: Kind, from: Option<&File>, module: &str, path: &str) -> Key {
    let path = match from {
        Some(from) => resolve_path(&from.path, path),
        None => path.to_string(),
    };
    Key {
        kind,
        module: module.to_string(),
        path,
    }
}

impl<L: Loader> Loader for CachingLoader<L> {
    fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
        let key = key(Kind::Main, None, "", path);
        single_flight(&self.files, key, || self.inner.load_main(path))
    }

    fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
        let key = key(Kind::Template, Some(extending), &extending.module, path);
        single_flight(&self.files, key, || self.inner.load_template(extending, path))
    }

    fn load_include(&self, including: &File, path: &str) -> LoadResult<IncludeTarget> {
        let key = key(Kind::Include, Some(including), &including.module, path);
        single_flight(&self.includes, key, || {
            self.inner.load_include(including, path)
        })
    }

    fn load_library(&self, using: &File, path: &str) -> LoadResult<Arc<Library>> {
        let key = key(Kind::Library, Some(using), &using.module, path);
        single_flight(&self.libraries, key, || self.inner.load_library(using, path))
    }

    fn load_dir_library(&self, file: &File) -> LoadResult<Arc<Library>> {
        let dir = file.path.rsplit_once('/').map_or("", |(dir, _)| dir);
        let key = key(Kind::DirLibrary, None, &file.module, dir);
        single_flight(&self.libraries, key, || self.inner.load_dir_library(file))
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::atomic::{AtomicUsize, Ordering},
        thread,
    };

    use corgi_core::{Source, ast::FileKind};

    use super::*;

    /// Serves empty files and counts how often it was asked.
    #[derive(Default)]
    struct CountingLoader {
        loads: AtomicUsize,
    }

    impl CountingLoader {
        fn file(&self, path: &str, kind: FileKind) -> Arc<File> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            thread::sleep(std::time::Duration::from_millis(5));
            Arc::new(File::new(
                Arc::new(Source::new(path, "")),
                "example.com/app",
                path,
                kind,
            ))
        }
    }

    impl Loader for CountingLoader {
        fn load_main(&self, path: &str) -> LoadResult<Arc<File>> {
            Ok(Some(self.file(path, FileKind::Main)))
        }

        fn load_template(&self, extending: &File, path: &str) -> LoadResult<Arc<File>> {
            let path = resolve_path(&extending.path, path);
            Ok(Some(self.file(&path, FileKind::Template)))
        }

        fn load_include(&self, _including: &File, _path: &str) -> LoadResult<IncludeTarget> {
            Ok(None)
        }

        fn load_library(&self, _using: &File, _path: &str) -> LoadResult<Arc<Library>> {
            Ok(None)
        }
    }

    #[test]
    fn test_single_flight() {
        let loader = CachingLoader::new(CountingLoader::default());
        let main = loader.load_main("pages/index.corgi").unwrap().unwrap();

        let templates: Vec<_> = thread::scope(|s| {
            let handles: Vec<_> = (0..8)
                .map(|_| s.spawn(|| loader.load_template(&main, "../base.corgi")))
                .collect();
            handles
                .into_iter()
                .map(|handle| handle.join().unwrap().unwrap().unwrap())
                .collect::<Vec<_>>()
        });

        assert!(templates.windows(2).all(|pair| Arc::ptr_eq(&pair[0], &pair[1])));
        assert_eq!(loader.inner().loads.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_relative_paths_share_entries() {
        let loader = CachingLoader::new(CountingLoader::default());
        let a = loader.load_main("pages/a.corgi").unwrap().unwrap();
        let b = loader.load_main("pages/b.corgi").unwrap().unwrap();

        let from_a = loader.load_template(&a, "./base.corgi").unwrap().unwrap();
        let from_b = loader.load_template(&b, "base.corgi").unwrap().unwrap();
        assert!(!Arc::ptr_eq(&from_a, &from_b));

        let again = loader.load_template(&b, "./base.corgi").unwrap().unwrap();
        assert!(Arc::ptr_eq(&from_a, &again));
    }

    #[test]
    fn test_misses_are_cached() {
        let loader = CachingLoader::new(CountingLoader::default());
        let main = loader.load_main("index.corgi").unwrap().unwrap();
        assert!(loader.load_library(&main, "ui").unwrap().is_none());
        assert!(loader.load_library(&main, "ui").unwrap().is_none());
    }
}
