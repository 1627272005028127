//! The file dependency graph: cycle detection and import propagation.

use std::{collections::HashMap, sync::Arc};

use indexmap::IndexMap;
use log::trace;

use corgi_core::{
    Position,
    ast::{File, FileKey, ImportSpec, IncludeTarget},
};
use corgi_parser::{Diagnostic, ErrorCode};

use super::includes;

/// A dependency of one file on another, anchored at its directive.
struct Edge {
    target: FileKey,
    position: Position,
}

fn edges(file: &File) -> Vec<Edge> {
    let mut edges = Vec::new();
    if let Some(extend) = &file.extend {
        if let Some(template) = extend.file.get() {
            edges.push(Edge {
                target: template.key(),
                position: extend.position,
            });
        }
    }
    for include in includes(&file.scope) {
        if let Some(IncludeTarget::File(target)) = include.target.get() {
            edges.push(Edge {
                target: target.key(),
                position: include.position,
            });
        }
    }
    for spec in file.use_specs() {
        if let Some(library) = spec.library.get() {
            edges.extend(library.files.iter().map(|target| Edge {
                target: target.key(),
                position: spec.position,
            }));
        }
    }
    edges
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Visiting,
    Done,
}

struct CycleFinder<'a> {
    files: &'a IndexMap<FileKey, Arc<File>>,
    states: HashMap<FileKey, State>,
    stack: Vec<FileKey>,
    diagnostics: Vec<Diagnostic>,
}

impl CycleFinder<'_> {
    fn visit(&mut self, key: &FileKey) {
        let files = self.files;
        let Some(file) = files.get(key) else {
            return;
        };
        self.states.insert(key.clone(), State::Visiting);
        self.stack.push(key.clone());

        for edge in edges(file) {
            match self.states.get(&edge.target) {
                Some(State::Visiting) => self.report(file, &edge),
                Some(State::Done) => {}
                None => self.visit(&edge.target),
            }
        }

        self.stack.pop();
        self.states.insert(key.clone(), State::Done);
    }

    fn report(&mut self, file: &File, edge: &Edge) {
        let start = self
            .stack
            .iter()
            .position(|key| *key == edge.target)
            .unwrap_or(0);
        let cycle = self.stack[start..]
            .iter()
            .chain([&edge.target])
            .map(|key| {
                // Paths in the reporting file's own module are shown bare.
                if key.module == file.module {
                    key.path.clone()
                } else {
                    key.to_string()
                }
            })
            .collect::<Vec<_>>()
            .join(" -> ");
        trace!(cycle = cycle.as_str(); "Found cycle");

        self.diagnostics.push(
            Diagnostic::error(format!("circular dependency: {cycle}"))
                .with_code(ErrorCode::E204)
                .with_label(edge.position, "this directive closes the cycle")
                .with_source(Arc::clone(&file.source))
                .with_help(
                    "files may not extend, include or use themselves, directly or indirectly",
                ),
        );
    }
}

/// Report every dependency cycle, once per closing directive.
pub(super) fn find_cycles(files: &IndexMap<FileKey, Arc<File>>) -> Vec<Diagnostic> {
    let mut finder = CycleFinder {
        files,
        states: HashMap::new(),
        stack: Vec::new(),
        diagnostics: Vec::new(),
    };
    for key in files.keys() {
        if !finder.states.contains_key(key) {
            finder.visit(key);
        }
    }
    finder.diagnostics
}

/// Attach the imports of transitively included files to `file`.
///
/// Imports already declared by `file`, or surfaced twice, are kept once.
/// Requires an acyclic include graph.
pub(super) fn propagate_imports(file: &File) -> &[ImportSpec] {
    file.included_imports.get_or_init(|| {
        let own: Vec<&ImportSpec> = file
            .imports
            .iter()
            .flat_map(|import| import.specs.iter())
            .collect();
        let mut propagated: Vec<ImportSpec> = Vec::new();

        for include in includes(&file.scope) {
            let Some(IncludeTarget::File(target)) = include.target.get() else {
                continue;
            };
            let surfaced = target
                .imports
                .iter()
                .flat_map(|import| import.specs.iter())
                .chain(propagate_imports(target));
            for spec in surfaced {
                let seen = own
                    .iter()
                    .copied()
                    .chain(&propagated)
                    .any(|other| other.alias == spec.alias && other.path == spec.path);
                if !seen {
                    propagated.push(spec.clone());
                }
            }
        }
        propagated
    })
}
