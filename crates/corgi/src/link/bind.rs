//! Binding mixin calls to their definitions.
//!
//! An unqualified call is looked up in the lexically enclosing scopes,
//! innermost first, then in the directory library, the file's own library
//! and finally in the libraries used with `.`. Unexported names stop after
//! the lexical scopes. A qualified call is looked up in the library of the
//! `use` declaring its namespace.

use std::{collections::HashMap, convert::Infallible, sync::Arc};

use indexmap::IndexMap;
use log::trace;

use corgi_core::{
    Source, Span,
    ast::{
        File, FileKey, FileKind, Library, LibraryKey, Mixin, MixinCall, ResolvedMixin, Scope,
        ScopeItem, UseNamespace, UseSpec, Visit, walk,
    },
    identifier::Id,
};
use corgi_parser::{Diagnostic, ErrorCode};

use super::checks::{self, call_span};

/// Where a call was bound.
struct Found<'a> {
    mixin: &'a Arc<Mixin>,
    source: &'a Arc<Source>,
    file: FileKey,
    library: Option<LibraryKey>,
}

struct Binder<'a> {
    file: &'a File,
    dir_library: Option<&'a Library>,
    own_library: Option<&'a Library>,
    dot_libraries: Vec<&'a Library>,
    diagnostics: Vec<Diagnostic>,
}

/// Bind every call of `file` and check the naming rules of its scopes and
/// uses.
pub(super) fn bind_file(
    file: &Arc<File>,
    libraries: &IndexMap<LibraryKey, Arc<Library>>,
) -> Vec<Diagnostic> {
    let own_library = if file.kind == FileKind::LibraryFile {
        libraries.get(&file.key().library()).map(|library| &**library)
    } else {
        None
    };
    let dot_libraries = file
        .use_specs()
        .filter(|spec| spec.namespace == UseNamespace::Dot)
        .filter_map(|spec| spec.library.get())
        .map(|library| &**library)
        .collect();

    let mut binder = Binder {
        file,
        dir_library: file.dir_library.get().and_then(|library| library.as_deref()),
        own_library,
        dot_libraries,
        diagnostics: Vec::new(),
    };
    binder.check_uses();
    binder.check_redeclarations();
    binder.bind_calls();
    if file.extend.is_some() {
        binder
            .diagnostics
            .extend(checks::check_extending_file(file));
    }
    binder.diagnostics
}

/// Report exported mixins declared by more than one file of `library`.
pub(super) fn check_library(library: &Library) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut seen: HashMap<Id, (&Arc<File>, &Arc<Mixin>)> = HashMap::new();

    for (file, mixin) in library.mixins() {
        if !mixin.name.is_exported() {
            continue;
        }
        match seen.get(&mixin.name) {
            // Within one file the scope check reports it.
            Some((first_file, _)) if first_file.key() == file.key() => {}
            Some((first_file, first)) => diagnostics.push(
                redeclared(mixin, &file.source)
                    .with_secondary_label_in(
                        &first_file.source,
                        mixin_span(first),
                        "first declared here",
                    )
                    .with_help(format!(
                        "exported mixins share the namespace of library `{}`",
                        library.key()
                    )),
            ),
            None => {
                seen.insert(mixin.name, (file, mixin));
            }
        }
    }
    diagnostics
}

fn mixin_span(mixin: &Mixin) -> Span {
    Span::at(mixin.position, "mixin ".len() + mixin.name.as_string().chars().count())
}

fn redeclared(mixin: &Mixin, source: &Arc<Source>) -> Diagnostic {
    Diagnostic::error(format!("mixin `{}` redeclared", mixin.name))
        .with_code(ErrorCode::E301)
        .with_label(mixin_span(mixin), "declared again here")
        .with_source(Arc::clone(source))
}

/// The span of a use spec, alias included.
fn use_span(spec: &UseSpec) -> Span {
    let quoted = spec.path.chars().count() + 2;
    let len = match spec.namespace {
        UseNamespace::Default => quoted,
        UseNamespace::Named(name) => name.as_string().chars().count() + 1 + quoted,
        UseNamespace::Dot | UseNamespace::Blank => 2 + quoted,
    };
    Span::at(spec.position, len)
}

impl<'a> Binder<'a> {
    fn error(&self, message: String, code: ErrorCode) -> Diagnostic {
        Diagnostic::error(message)
            .with_code(code)
            .with_source(Arc::clone(&self.file.source))
    }

    fn check_uses(&mut self) {
        let file = self.file;
        let mut namespaces: HashMap<Id, &UseSpec> = HashMap::new();

        for spec in file.use_specs() {
            if let Some(library) = spec.library.get() {
                let exports = library.mixins().any(|(_, mixin)| mixin.name.is_exported());
                if spec.namespace != UseNamespace::Blank && !exports {
                    self.diagnostics.push(
                        Diagnostic::warning(format!(
                            "library `{}` exports no mixins",
                            library.key()
                        ))
                        .with_label(use_span(spec), "nothing to call")
                        .with_source(Arc::clone(&file.source))
                        .with_help(format!(
                            "link it for side effects only with `use _ \"{}\"`",
                            spec.path
                        )),
                    );
                }
            }

            let Some(namespace) = spec.namespace_id() else {
                continue;
            };
            match namespaces.get(&namespace) {
                Some(first) => {
                    let diagnostic = self
                        .error(format!("namespace `{namespace}` is used twice"), ErrorCode::E300)
                        .with_label(use_span(spec), format!("`{namespace}` used again here"))
                        .with_secondary_label(use_span(first), "first used here")
                        .with_help("give one of the libraries another name")
                        .with_example(format!("use other \"{}\"", spec.path));
                    self.diagnostics.push(diagnostic);
                }
                None => {
                    namespaces.insert(namespace, spec);
                }
            }
        }
    }

    fn check_redeclarations(&mut self) {
        let file = self.file;
        self.check_scope(&file.scope);
        let _ = walk(&file.scope, &mut |item, _| {
            for scope in item.child_scopes() {
                self.check_scope(scope);
            }
            Ok::<_, Infallible>(Visit::Children)
        });

        // Exported top-level mixins share a namespace with every library
        // used with `.`.
        let mut declared: HashMap<Id, (&Arc<Source>, Span)> = file
            .top_level_mixins()
            .filter(|mixin| mixin.name.is_exported())
            .map(|mixin| (mixin.name, (&file.source, mixin_span(mixin))))
            .collect();

        for spec in file.use_specs().filter(|spec| spec.namespace == UseNamespace::Dot) {
            let Some(library) = spec.library.get() else {
                continue;
            };
            let mut exported: Vec<(&Arc<File>, &Arc<Mixin>)> = Vec::new();
            for (lib_file, mixin) in library.mixins() {
                if mixin.name.is_exported()
                    && !exported.iter().any(|(_, other)| other.name == mixin.name)
                {
                    exported.push((lib_file, mixin));
                }
            }

            for (lib_file, mixin) in exported {
                match declared.get(&mixin.name) {
                    Some((source, span)) => {
                        let diagnostic = self
                            .error(format!("mixin `{}` redeclared", mixin.name), ErrorCode::E301)
                            .with_label(
                                use_span(spec),
                                format!(
                                    "library `{}` declares `{}` again",
                                    library.key(),
                                    mixin.name
                                ),
                            )
                            .with_secondary_label_in(
                                &lib_file.source,
                                mixin_span(mixin),
                                "declared here",
                            )
                            .with_secondary_label_in(source, *span, "first declared here")
                            .with_help(
                                "mixins of libraries used with `.` share the namespace of this file",
                            );
                        self.diagnostics.push(diagnostic);
                    }
                    None => {
                        declared.insert(mixin.name, (&lib_file.source, mixin_span(mixin)));
                    }
                }
            }
        }
    }

    fn check_scope(&mut self, scope: &Scope) {
        let mut seen: HashMap<Id, &Arc<Mixin>> = HashMap::new();
        for mixin in scope.mixins() {
            match seen.get(&mixin.name) {
                Some(first) => {
                    let diagnostic = redeclared(mixin, &self.file.source)
                        .with_secondary_label(mixin_span(first), "first declared here");
                    self.diagnostics.push(diagnostic);
                }
                None => {
                    seen.insert(mixin.name, mixin);
                }
            }
        }
    }

    fn bind_calls(&mut self) {
        let file = self.file;
        let _ = walk(&file.scope, &mut |item, ctx| {
            if let ScopeItem::MixinCall(call) = item {
                self.bind_call(call, ctx.scopes());
            }
            Ok::<_, Infallible>(Visit::Children)
        });
    }

    fn bind_call(&mut self, call: &MixinCall, scopes: &[&'a Scope]) {
        let Some(found) = self.lookup(call, scopes) else {
            return;
        };
        trace!(call:% = call, file:% = found.file; "Bound mixin call");
        let _ = call
            .resolved
            .set(ResolvedMixin::new(found.mixin, found.file, found.library));
        self.diagnostics
            .extend(checks::check_call(self.file, call, found.mixin, found.source));
    }

    fn lookup(&mut self, call: &MixinCall, scopes: &[&'a Scope]) -> Option<Found<'a>> {
        if let Some(namespace) = call.namespace {
            return self.lookup_qualified(call, namespace);
        }

        let file = self.file;
        for &scope in scopes.iter().rev() {
            if let Some(mixin) = scope.mixins().find(|mixin| mixin.name == call.name) {
                return Some(Found {
                    mixin,
                    source: &file.source,
                    file: file.key(),
                    library: None,
                });
            }
        }

        if !call.name.is_exported() {
            self.unknown_mixin(
                call,
                format!(
                    "`{}` is not exported, so it is only visible in the file declaring it",
                    call.name
                ),
            );
            return None;
        }

        let libraries = self
            .dir_library
            .into_iter()
            .chain(self.own_library)
            .chain(self.dot_libraries.iter().copied());
        for library in libraries {
            if let Some((lib_file, mixin)) = library.exported_mixin(call.name) {
                return Some(Found {
                    mixin,
                    source: &lib_file.source,
                    file: lib_file.key(),
                    library: Some(library.key()),
                });
            }
        }

        self.unknown_mixin(
            call,
            "define the mixin in this file or `use` the library declaring it".to_string(),
        );
        None
    }

    fn lookup_qualified(&mut self, call: &MixinCall, namespace: Id) -> Option<Found<'a>> {
        let file = self.file;
        let Some(spec) = file
            .use_specs()
            .find(|spec| spec.namespace_id() == Some(namespace))
        else {
            let diagnostic = self
                .error(format!("no `use` declares namespace `{namespace}`"), ErrorCode::E206)
                .with_label(call_span(call), format!("`{namespace}` is not declared"))
                .with_help(format!("add `use \".../{namespace}\"` to the preamble of this file"));
            self.diagnostics.push(diagnostic);
            return None;
        };
        let library = spec.library.get()?;

        match library.exported_mixin(call.name) {
            Some((lib_file, mixin)) => Some(Found {
                mixin,
                source: &lib_file.source,
                file: lib_file.key(),
                library: Some(library.key()),
            }),
            None => {
                let help = if call.name.is_exported() {
                    format!("library `{}` declares no mixin `{}`", library.key(), call.name)
                } else {
                    format!(
                        "`{}` is not exported; only capitalized mixins are visible outside their file",
                        call.name
                    )
                };
                self.unknown_mixin(call, help);
                None
            }
        }
    }

    fn unknown_mixin(&mut self, call: &MixinCall, help: String) {
        let diagnostic = self
            .error(format!("unknown mixin `{call}`"), ErrorCode::E205)
            .with_label(call_span(call), "not found")
            .with_help(help);
        self.diagnostics.push(diagnostic);
    }
}
