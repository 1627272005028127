//! Concurrent loading of everything a file references.
//!
//! Each file fans out one scoped thread per `extend`, `use` spec, `include`
//! and one for its directory library. Every thread publishes what it loaded
//! into the directive's one-time slot and sends its diagnostics back over a
//! channel; the parent waits for exactly as many results as it spawned.
//!
//! Loaded files and libraries are claimed by key before they are resolved.
//! Whoever claims a key first resolves it; everyone else publishes the
//! claimed instance instead of their own, so each logical file is linked
//! once no matter how many pointers it was loaded through.

use std::{
    sync::{Arc, Mutex, MutexGuard, mpsc},
    thread,
};

use indexmap::{IndexMap, map::Entry};
use log::{debug, trace};

use corgi_core::{
    Position, Span,
    ast::{Extend, File, FileKey, FileKind, Include, IncludeTarget, Library, LibraryKey, UseSpec},
};
use corgi_parser::{Diagnostic, ErrorCode};

use crate::loader::{LoadError, Loader};

use super::includes;

type Files = IndexMap<FileKey, Arc<File>>;
type Libraries = IndexMap<LibraryKey, Arc<Library>>;

pub(super) struct Resolver<'a> {
    loader: &'a dyn Loader,
    files: Mutex<Files>,
    libraries: Mutex<Libraries>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl<'a> Resolver<'a> {
    pub(super) fn new(loader: &'a dyn Loader) -> Self {
        Self {
            loader,
            files: Mutex::default(),
            libraries: Mutex::default(),
        }
    }

    pub(super) fn into_parts(self) -> (Files, Libraries) {
        let files = self
            .files
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let libraries = self
            .libraries
            .into_inner()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        (files, libraries)
    }

    /// Register `file`, returning the canonical instance for its key and
    /// whether this call claimed it.
    pub(super) fn claim_file(&self, file: Arc<File>) -> (Arc<File>, bool) {
        match lock(&self.files).entry(file.key()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&file));
                (file, true)
            }
        }
    }

    pub(super) fn claim_library(&self, library: Arc<Library>) -> (Arc<Library>, bool) {
        match lock(&self.libraries).entry(library.key()) {
            Entry::Occupied(entry) => (Arc::clone(entry.get()), false),
            Entry::Vacant(entry) => {
                entry.insert(Arc::clone(&library));
                (library, true)
            }
        }
    }

    /// Resolve every dependency of `file`, recursively.
    pub(super) fn resolve_file(&self, file: &Arc<File>) -> Vec<Diagnostic> {
        debug!(file:% = file.key(); "Resolving file");
        let includes = includes(&file.scope);
        let (tx, rx) = mpsc::channel::<Vec<Diagnostic>>();

        thread::scope(|s| {
            let mut tasks = 0;

            if let Some(extend) = &file.extend {
                let tx = tx.clone();
                s.spawn(move || tx.send(self.resolve_extend(file, extend)));
                tasks += 1;
            }
            for spec in file.use_specs() {
                let tx = tx.clone();
                s.spawn(move || tx.send(self.resolve_use(file, spec)));
                tasks += 1;
            }
            for include in includes {
                let tx = tx.clone();
                s.spawn(move || tx.send(self.resolve_include(file, include)));
                tasks += 1;
            }
            if file.kind == FileKind::LibraryFile {
                // Library files see their own library without a directory
                // library; storing it here would make the library own itself.
                let _ = file.dir_library.set(None);
            } else {
                let tx = tx.clone();
                s.spawn(move || tx.send(self.resolve_dir_library(file)));
                tasks += 1;
            }
            drop(tx);

            trace!(file:% = file.key(), tasks; "Waiting for dependencies");
            rx.iter().take(tasks).flatten().collect()
        })
    }

    /// Resolve the files of a library one after another.
    pub(super) fn resolve_library(&self, library: &Arc<Library>) -> Vec<Diagnostic> {
        debug!(library:% = library.key(), files = library.files.len(); "Resolving library");
        let mut diagnostics = Vec::new();
        for file in &library.files {
            let (file, claimed) = self.claim_file(Arc::clone(file));
            if claimed {
                diagnostics.extend(self.resolve_file(&file));
            }
        }
        diagnostics
    }

    fn resolve_extend(&self, file: &File, extend: &Extend) -> Vec<Diagnostic> {
        match self.loader.load_template(file, &extend.path) {
            Ok(Some(template)) => {
                let (template, claimed) = self.claim_file(template);
                let _ = extend.file.set(Arc::clone(&template));
                if claimed {
                    self.resolve_file(&template)
                } else {
                    Vec::new()
                }
            }
            Ok(None) => {
                let span = directive_span(extend.position, "extend", &extend.path);
                vec![not_found(file, "template", &extend.path, span).with_code(ErrorCode::E200)]
            }
            Err(err) => load_failure(file, extend.position, err),
        }
    }

    fn resolve_use(&self, file: &File, spec: &UseSpec) -> Vec<Diagnostic> {
        match self.loader.load_library(file, &spec.path) {
            Ok(Some(library)) => {
                let (library, claimed) = self.claim_library(library);
                let _ = spec.library.set(Arc::clone(&library));
                if claimed {
                    self.resolve_library(&library)
                } else {
                    Vec::new()
                }
            }
            Ok(None) => {
                let span = Span::at(spec.position, spec.path.chars().count() + 2);
                vec![
                    not_found(file, "library", &spec.path, span)
                        .with_code(ErrorCode::E202)
                        .with_help("a library is a directory containing `.corgil` files"),
                ]
            }
            Err(err) => load_failure(file, spec.position, err),
        }
    }

    fn resolve_include(&self, file: &File, include: &Include) -> Vec<Diagnostic> {
        match self.loader.load_include(file, &include.path) {
            Ok(Some(IncludeTarget::File(included))) => {
                let (included, claimed) = self.claim_file(included);
                let _ = include
                    .target
                    .set(IncludeTarget::File(Arc::clone(&included)));
                if claimed {
                    self.resolve_file(&included)
                } else {
                    Vec::new()
                }
            }
            Ok(Some(raw @ IncludeTarget::Raw(_))) => {
                let _ = include.target.set(raw);
                Vec::new()
            }
            Ok(None) => {
                let span = directive_span(include.position, "include", &include.path);
                vec![not_found(file, "include", &include.path, span).with_code(ErrorCode::E201)]
            }
            Err(err) => load_failure(file, include.position, err),
        }
    }

    fn resolve_dir_library(&self, file: &File) -> Vec<Diagnostic> {
        match self.loader.load_dir_library(file) {
            Ok(Some(library)) => {
                let (library, claimed) = self.claim_library(library);
                let _ = file.dir_library.set(Some(Arc::clone(&library)));
                if claimed {
                    self.resolve_library(&library)
                } else {
                    Vec::new()
                }
            }
            Ok(None) => {
                let _ = file.dir_library.set(None);
                Vec::new()
            }
            Err(err) => load_failure(file, Position::new(1, 1), err),
        }
    }
}

/// The span of `keyword "path"`.
fn directive_span(position: Position, keyword: &str, path: &str) -> Span {
    Span::at(position, keyword.len() + path.chars().count() + 3)
}

fn not_found(file: &File, what: &str, path: &str, span: Span) -> Diagnostic {
    Diagnostic::error(format!("{what} `{path}` not found"))
        .with_label(span, format!("cannot find `{path}`"))
        .with_source(Arc::clone(&file.source))
}

fn load_failure(file: &File, position: Position, err: LoadError) -> Vec<Diagnostic> {
    match err {
        LoadError::Parse(err) => err.into_diagnostics(),
        LoadError::Io { path, message } => vec![
            Diagnostic::error(format!("failed to load `{path}`"))
                .with_code(ErrorCode::E203)
                .with_label(position, message)
                .with_source(Arc::clone(&file.source)),
        ],
    }
}
