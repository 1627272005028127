//! Call contracts and the rules of extending files.

use std::{
    collections::{HashMap, HashSet},
    convert::Infallible,
    sync::Arc,
};

use corgi_core::{
    Position, Source, Span,
    ast::{BlockKind, File, IncludeTarget, Mixin, MixinCall, ScopeItem, Visit, walk},
    identifier::Id,
};
use corgi_parser::{Diagnostic, ErrorCode, error::Suggestion};

/// The span of `+name` or `+namespace.name`.
pub(super) fn call_span(call: &MixinCall) -> Span {
    Span::at(call.position, call.to_string().chars().count() + 1)
}

fn name_span(position: Position, name: Id) -> Span {
    Span::at(position, name.as_string().chars().count())
}

/// Check the arguments and fills of `call` against the bound `mixin`,
/// declared in `definition`.
pub(super) fn check_call(
    file: &File,
    call: &MixinCall,
    mixin: &Mixin,
    definition: &Arc<Source>,
) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let error = |message: String, code: ErrorCode| {
        Diagnostic::error(message)
            .with_code(code)
            .with_source(Arc::clone(&file.source))
    };

    let mut passed: HashMap<Id, Position> = HashMap::new();
    for arg in &call.args {
        if mixin.param(arg.name).is_none() {
            let params: Vec<_> = mixin
                .params
                .iter()
                .map(|param| param.name.to_string())
                .collect();
            let help = if params.is_empty() {
                format!("`{}` takes no parameters", mixin.name)
            } else {
                format!("`{}` takes {}", mixin.name, params.join(", "))
            };
            diagnostics.push(
                error(
                    format!("unknown parameter `{}` for mixin `{}`", arg.name, mixin.name),
                    ErrorCode::E302,
                )
                .with_label(name_span(arg.position, arg.name), "no such parameter")
                .with_secondary_label_in(definition, mixin.position, "mixin defined here")
                .with_help(help),
            );
        }

        if let Some(first) = passed.get(&arg.name) {
            diagnostics.push(
                error(format!("parameter `{}` passed twice", arg.name), ErrorCode::E303)
                    .with_label(name_span(arg.position, arg.name), "passed again here")
                    .with_secondary_label(name_span(*first, arg.name), "first passed here"),
            );
        } else {
            passed.insert(arg.name, arg.position);
        }
    }

    for param in mixin.params.iter().filter(|param| param.is_required()) {
        match call.args.iter().find(|arg| arg.name == param.name) {
            None => diagnostics.push(
                error(
                    format!("missing argument `{}` for mixin `{}`", param.name, mixin.name),
                    ErrorCode::E304,
                )
                .with_label(call_span(call), format!("`{}` is required", param.name))
                .with_secondary_label_in(definition, param.position, "parameter declared here")
                .with_should_be(format!("+{call}({}=...)", param.name)),
            ),
            Some(arg) if arg.value.may_be_unset() => diagnostics.push(
                error(
                    format!("argument `{}` for mixin `{}` may be unset", param.name, mixin.name),
                    ErrorCode::E304,
                )
                .with_label(arg.value.position(), "this check has no default")
                .with_secondary_label_in(
                    definition,
                    param.position,
                    "required parameter declared here",
                )
                .with_suggestion(
                    Suggestion::new("give the checked expression a default")
                        .with_code(format!("{}={} ?? ...", arg.name, arg.value)),
                ),
            ),
            Some(_) => {}
        }
    }

    let mut filled: HashMap<Id, Position> = HashMap::new();
    for fill in call.fills() {
        if let Some(first) = filled.get(&fill.name) {
            diagnostics.push(
                error(format!("block `{}` filled twice", fill.name), ErrorCode::E305)
                    .with_label(fill.position, "filled again here")
                    .with_secondary_label(*first, "first filled here"),
            );
        } else {
            filled.insert(fill.name, fill.position);
        }
    }

    diagnostics
}

/// Block names declared anywhere in `template` and the templates it extends.
fn template_blocks(template: &File) -> HashSet<Id> {
    let mut blocks = HashSet::new();
    let mut next = Some(template);
    while let Some(file) = next {
        collect_blocks(file, &mut blocks);
        next = file.extended_file().map(|file| &**file);
    }
    blocks
}

fn collect_blocks(file: &File, blocks: &mut HashSet<Id>) {
    let _ = walk(&file.scope, &mut |item, ctx| {
        Ok::<_, Infallible>(match item {
            ScopeItem::Mixin(_) => Visit::Skip,
            ScopeItem::Block(block) => {
                // Blocks in a call body fill the callee; their bodies may
                // still declare template blocks.
                if !matches!(ctx.parent(), Some(ScopeItem::MixinCall(_))) {
                    blocks.insert(block.name);
                }
                Visit::Children
            }
            ScopeItem::Include(include) => {
                if let Some(IncludeTarget::File(included)) = include.target.get() {
                    collect_blocks(included, blocks);
                }
                Visit::Skip
            }
            _ => Visit::Children,
        })
    });
}

/// Check the top level of a file that extends a template.
pub(super) fn check_extending_file(file: &File) -> Vec<Diagnostic> {
    let Some(template) = file.extended_file() else {
        return Vec::new();
    };
    let declared = template_blocks(template);
    let mut diagnostics = Vec::new();
    let mut filled: HashMap<(Id, BlockKind), Position> = HashMap::new();

    for item in &file.scope {
        match item {
            ScopeItem::And(and) => diagnostics.push(
                Diagnostic::error("`&` at the top level of an extending file")
                    .with_code(ErrorCode::E307)
                    .with_label(Span::at(and.position, 1), "no element to attach to")
                    .with_source(Arc::clone(&file.source))
                    .with_help("move the attributes into the `block` that renders the element"),
            ),
            ScopeItem::Block(block) => {
                if !declared.contains(&block.name) {
                    let mut known: Vec<_> = declared.iter().map(ToString::to_string).collect();
                    known.sort();
                    diagnostics.push(
                        Diagnostic::error(format!("template has no block `{}`", block.name))
                            .with_code(ErrorCode::E311)
                            .with_label(block.position, "unknown block")
                            .with_source(Arc::clone(&file.source))
                            .with_help(if known.is_empty() {
                                "the template declares no blocks".to_string()
                            } else {
                                format!("declared blocks: {}", known.join(", "))
                            }),
                    );
                }

                if let Some(first) = filled.get(&(block.name, block.kind)) {
                    diagnostics.push(
                        Diagnostic::error(format!("block `{}` filled twice", block.name))
                            .with_code(ErrorCode::E305)
                            .with_label(block.position, "filled again here")
                            .with_secondary_label(*first, "first filled here")
                            .with_source(Arc::clone(&file.source)),
                    );
                } else {
                    filled.insert((block.name, block.kind), block.position);
                }
            }
            _ => {}
        }
    }
    diagnostics
}
