//! Linking: turning a parsed file into a resolved compilation unit.
//!
//! Linking runs in stages, each reporting every problem it finds:
//!
//! 1. **Resolve** - load everything reachable through `extend`, `use`,
//!    `include` and directory libraries, concurrently ([`resolve`])
//! 2. **Cycles** - reject files that depend on themselves ([`graph`])
//! 3. **Imports** - surface the imports of included files ([`graph`])
//! 4. **Bind** - bind every mixin call and check names and call contracts
//!    ([`bind`], [`checks`])
//!
//! A stage with errors stops the pipeline; later stages assume a fully
//! loaded, acyclic graph.

mod bind;
mod checks;
mod graph;
mod resolve;

use std::{convert::Infallible, sync::Arc};

use log::{debug, info};

use corgi_core::ast::{File, Include, Library, Scope, ScopeItem, Visit, walk};
use corgi_parser::{Diagnostic, DiagnosticCollector, DiagnosticError};

use crate::loader::Loader;

use resolve::Resolver;

/// Everything a successful link produced.
#[derive(Debug)]
pub struct LinkOutput {
    /// Every linked file. The file linking started from comes first, the
    /// rest are ordered by key.
    pub files: Vec<Arc<File>>,
    /// Every linked library, ordered by key.
    pub libraries: Vec<Arc<Library>>,
    pub warnings: Vec<Diagnostic>,
}

/// Links files and libraries against a [`Loader`].
pub struct Linker<'a> {
    loader: &'a dyn Loader,
}

impl<'a> Linker<'a> {
    pub fn new(loader: &'a dyn Loader) -> Self {
        Self { loader }
    }

    /// Link `file` and everything it references.
    ///
    /// # Errors
    ///
    /// Returns every diagnostic of the first stage that failed.
    pub fn link_file(&self, file: Arc<File>) -> Result<LinkOutput, DiagnosticError> {
        info!(file:% = file.key(); "Linking file");
        let resolver = Resolver::new(self.loader);
        let (file, _) = resolver.claim_file(file);
        let diagnostics = resolver.resolve_file(&file);
        finish(resolver, diagnostics)
    }

    /// Link every file of `library` and everything they reference.
    ///
    /// # Errors
    ///
    /// Returns every diagnostic of the first stage that failed.
    pub fn link_library(&self, library: Arc<Library>) -> Result<LinkOutput, DiagnosticError> {
        info!(library:% = library.key(); "Linking library");
        let resolver = Resolver::new(self.loader);
        let (library, _) = resolver.claim_library(library);
        let diagnostics = resolver.resolve_library(&library);
        finish(resolver, diagnostics)
    }
}

fn finish(
    resolver: Resolver<'_>,
    diagnostics: Vec<Diagnostic>,
) -> Result<LinkOutput, DiagnosticError> {
    let (files, libraries) = resolver.into_parts();
    debug!(files = files.len(), libraries = libraries.len(); "Resolved");

    let mut collector = DiagnosticCollector::new();
    collector.emit_all(diagnostics);

    if !collector.has_errors() {
        collector.emit_all(graph::find_cycles(&files));
    }

    if !collector.has_errors() {
        for file in files.values() {
            graph::propagate_imports(file);
        }
        for library in libraries.values() {
            collector.emit_all(bind::check_library(library));
        }
        for file in files.values() {
            collector.emit_all(bind::bind_file(file, &libraries));
        }
    }

    let warnings = collector.finish()?;

    let mut files: Vec<_> = files.into_values().collect();
    if let Some((_, rest)) = files.split_first_mut() {
        rest.sort_by_key(|file| file.key());
    }
    let mut libraries: Vec<_> = libraries.into_values().collect();
    libraries.sort_by_key(|library| library.key());

    Ok(LinkOutput {
        files,
        libraries,
        warnings,
    })
}

/// Every `include` in `scope`, mixin bodies included.
pub(crate) fn includes(scope: &Scope) -> Vec<&Include> {
    let mut includes = Vec::new();
    let _ = walk(scope, &mut |item, _| {
        if let ScopeItem::Include(include) = item {
            includes.push(include);
        }
        Ok::<_, Infallible>(Visit::Children)
    });
    includes
}
