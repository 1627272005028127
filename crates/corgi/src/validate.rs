//! Placement rules that need mixin summaries.
//!
//! Attributes written with `&` attach to the element that is open at that
//! point. What that element is depends on where the `&` sits: directly in an
//! element, at the top of a mixin (the caller's element), in a call body (the
//! callee's `&&` placeholders) or in a block fill (the element the block was
//! declared in). In every case the attributes must come before the element's
//! content.

use std::sync::Arc;

use log::debug;

use corgi_core::{
    Span,
    ast::{Block, CommentKind, Element, File, FileKind, MixinCall, MixinInfo, Scope, ScopeItem},
};
use corgi_parser::{Diagnostic, DiagnosticCollector, DiagnosticError, ErrorCode};

/// Validate every file of an analyzed compilation.
///
/// # Errors
///
/// Returns every placement error found, across all files.
pub fn validate(files: &[Arc<File>]) -> Result<(), DiagnosticError> {
    let mut collector = DiagnosticCollector::new();
    for file in files {
        let mut validator = Validator {
            file,
            diagnostics: Vec::new(),
        };
        let attach = if file.kind == FileKind::Include || file.extend.is_some() {
            Attach::Block
        } else {
            Attach::None
        };
        validator.scope(
            &file.scope,
            &mut State {
                attach,
                written: false,
            },
        );
        collector.emit_all(validator.diagnostics);
    }
    debug!(files = files.len(); "Validated");
    collector.finish().map(|_| ())
}

/// What attributes written at some point attach to.
enum Attach {
    /// Nothing, like the top of a standalone template.
    None,
    Element,
    /// The element a mixin's caller attaches the mixin to.
    Mixin,
    /// The `&&` placeholders of a callee.
    Call(Callee),
    /// The element a filled block was declared in.
    Fill { block: String, can_attributes: bool },
    /// Whatever renders a block or an included file; not known here.
    Block,
}

#[derive(Clone)]
struct Callee {
    name: String,
    info: MixinInfo,
}

struct State {
    attach: Attach,
    /// Content was written since the attach point opened.
    written: bool,
}

impl State {
    fn nested(attach: Attach) -> Self {
        Self {
            attach,
            written: false,
        }
    }
}

struct Validator<'a> {
    file: &'a File,
    diagnostics: Vec<Diagnostic>,
}

impl Validator<'_> {
    fn error(&mut self, diagnostic: Diagnostic) {
        self.diagnostics
            .push(diagnostic.with_source(Arc::clone(&self.file.source)));
    }

    fn scope(&mut self, scope: &Scope, state: &mut State) {
        for item in scope {
            self.item(item, state);
        }
    }

    fn branches<'s>(&mut self, scopes: impl IntoIterator<Item = &'s Scope>, state: &mut State) {
        let before = state.written;
        let mut after = before;
        for scope in scopes {
            state.written = before;
            self.scope(scope, state);
            after |= state.written;
        }
        state.written = after;
    }

    fn item(&mut self, item: &ScopeItem, state: &mut State) {
        match item {
            ScopeItem::Element(element) => {
                self.check_void(element);
                state.written = true;
                self.scope(&element.body, &mut State::nested(Attach::Element));
            }
            ScopeItem::Text(_) => {
                state.written = true;
                for inline in item.inline_items() {
                    self.item(inline, state);
                }
            }
            ScopeItem::Output(_)
            | ScopeItem::Doctype(_)
            | ScopeItem::Filter(_)
            | ScopeItem::Include(_) => state.written = true,
            ScopeItem::Comment(comment) => {
                if comment.kind == CommentKind::Html {
                    state.written = true;
                }
            }
            ScopeItem::Code(_) => {}
            ScopeItem::Mixin(mixin) => self.scope(&mixin.body, &mut State::nested(Attach::Mixin)),
            ScopeItem::If(_)
            | ScopeItem::IfBlock(_)
            | ScopeItem::Switch(_)
            | ScopeItem::For(_)
            | ScopeItem::While(_) => self.branches(item.child_scopes(), state),
            ScopeItem::MixinCall(call) => self.call(call, state),
            ScopeItem::And(and) => self.attributes(Span::at(and.position, 1), state),
            ScopeItem::AndPlaceholder(placeholder) => {
                // Parsing keeps `&&` inside mixins; it only matters when it
                // forwards to a callee.
                if let Attach::Call(callee) = &state.attach {
                    if !callee.info.has_and_placeholders {
                        self.no_placeholders(Span::at(placeholder.position, 2), callee);
                    }
                }
            }
            ScopeItem::Block(block) => self.block(block, state),
        }
    }

    /// Check attributes written at `span`, by `&` or by a call that writes
    /// its caller's attributes.
    fn attributes(&mut self, span: Span, state: &State) {
        match &state.attach {
            Attach::None => self.error(
                Diagnostic::error("attributes without an element")
                    .with_code(ErrorCode::E307)
                    .with_label(span, "no element to attach to")
                    .with_help("attributes can only be written inside an element or a mixin"),
            ),
            Attach::Element | Attach::Mixin | Attach::Block => {
                if state.written {
                    self.error(
                        Diagnostic::error("attributes after the element's content")
                            .with_code(ErrorCode::E307)
                            .with_label(span, "content was already written")
                            .with_help("write attributes before any content of the element"),
                    );
                }
            }
            Attach::Call(callee) => {
                if !callee.info.has_and_placeholders {
                    self.no_placeholders(span, callee);
                }
            }
            Attach::Fill {
                block,
                can_attributes,
            } => {
                if !can_attributes || state.written {
                    let message = if *can_attributes {
                        "content was already written"
                    } else {
                        "the block is declared after content"
                    };
                    self.error(
                        Diagnostic::error(format!("block `{block}` cannot take attributes"))
                            .with_code(ErrorCode::E308)
                            .with_label(span, message),
                    );
                }
            }
        }
    }

    fn no_placeholders(&mut self, span: Span, callee: &Callee) {
        self.error(
            Diagnostic::error(format!("mixin `{}` takes no attributes", callee.name))
                .with_code(ErrorCode::E310)
                .with_label(span, "attributes passed here")
                .with_help(format!("`{}` has no `&&` placeholder", callee.name)),
        );
    }

    fn call(&mut self, call: &MixinCall, state: &mut State) {
        let span = Span::at(call.position, call.to_string().chars().count() + 1);
        let Some(info) = call.mixin().and_then(|mixin| mixin.info().cloned()) else {
            return;
        };

        if info.writes_top_level_attributes || info.top_level_and_placeholder {
            match &state.attach {
                Attach::Call(outer) => {
                    if !outer.info.has_and_placeholders {
                        self.no_placeholders(span, outer);
                    }
                }
                _ if info.writes_top_level_attributes => self.attributes(span, state),
                _ => {}
            }
        }
        if info.writes_body {
            state.written = true;
        }

        let callee = Callee {
            name: call.to_string(),
            info,
        };
        let mut body = State::nested(Attach::Call(callee.clone()));
        for item in &call.body {
            match item {
                ScopeItem::Block(fill) => self.fill(fill, &callee),
                item => self.item(item, &mut body),
            }
        }
    }

    fn fill(&mut self, fill: &Block, callee: &Callee) {
        let can_attributes = match callee.info.block(fill.name) {
            Some(block) => block.can_attributes,
            None => {
                let mut known: Vec<_> = callee
                    .info
                    .blocks
                    .iter()
                    .map(|block| block.name.to_string())
                    .collect();
                known.sort();
                self.error(
                    Diagnostic::error(format!(
                        "mixin `{}` has no block `{}`",
                        callee.name, fill.name
                    ))
                    .with_code(ErrorCode::E306)
                    .with_label(fill.position, "unknown block")
                    .with_help(if known.is_empty() {
                        format!("`{}` declares no blocks", callee.name)
                    } else {
                        format!("`{}` declares {}", callee.name, known.join(", "))
                    }),
                );
                true
            }
        };
        self.scope(
            &fill.body,
            &mut State::nested(Attach::Fill {
                block: fill.name.to_string(),
                can_attributes,
            }),
        );
    }

    fn block(&mut self, block: &Block, state: &mut State) {
        if matches!(state.attach, Attach::Block) {
            self.scope(&block.body, &mut State::nested(Attach::Block));
        } else {
            self.scope(&block.body, state);
        }
    }

    fn check_void(&mut self, element: &Element) {
        if !element.is_void() {
            return;
        }
        let content = element.body.iter().find(|item| match item {
            ScopeItem::And(_) | ScopeItem::AndPlaceholder(_) | ScopeItem::Code(_) => false,
            ScopeItem::Comment(comment) => comment.kind == CommentKind::Html,
            _ => true,
        });
        if let Some(content) = content {
            self.error(
                Diagnostic::error(format!("void element `{}` cannot have content", element.name))
                    .with_code(ErrorCode::E309)
                    .with_label(
                        content.position(),
                        format!("{} inside `{}`", content.kind_name(), element.name),
                    )
                    .with_secondary_label(
                        Span::at(element.position, element.name.chars().count()),
                        "void element",
                    ),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{analyze::analyze, link::Linker, loader::Loader, testing::MemoryLoader};

    const UI: &str = "\
mixin Button()
  button
    &&
    block
mixin Plain()
  div
    block
mixin Late()
  div
    p x
    block
";

    fn validated(index: &'static str) -> Vec<Diagnostic> {
        let loader = MemoryLoader::new(&[("index.corgi", index), ("ui/lib.corgil", UI)]);
        let main = loader.load_main("index.corgi").unwrap().unwrap();
        let output = Linker::new(&loader).link_file(main).unwrap();
        analyze(&output.files).unwrap();
        match validate(&output.files) {
            Ok(()) => Vec::new(),
            Err(err) => err.into_diagnostics(),
        }
    }

    fn codes(diagnostics: &[Diagnostic]) -> Vec<ErrorCode> {
        diagnostics.iter().filter_map(Diagnostic::code).collect()
    }

    #[test]
    fn test_valid_attributes() {
        let diagnostics = validated(
            "\
use \"ui\"
func Index()
div
  &.box
  +ui.Button()
    &.primary
    block
      span
        &.icon
",
        );
        assert!(diagnostics.is_empty(), "{diagnostics:?}");
    }

    #[test]
    fn test_attributes_without_element() {
        let diagnostics = validated("func Index()\n&.page\n");
        assert_eq!(codes(&diagnostics), vec![ErrorCode::E307]);
        assert_eq!(diagnostics[0].message(), "attributes without an element");
    }

    #[test]
    fn test_attributes_after_content() {
        let diagnostics = validated("func Index()\ndiv\n  p first\n  if ok\n    &.late\n");
        assert_eq!(codes(&diagnostics), vec![ErrorCode::E307]);
        assert_eq!(diagnostics[0].message(), "attributes after the element's content");
    }

    #[test]
    fn test_mixin_without_placeholders() {
        let diagnostics = validated("use \"ui\"\nfunc Index()\n+ui.Plain()\n  &.extra\n");
        assert_eq!(codes(&diagnostics), vec![ErrorCode::E310]);
        assert_eq!(diagnostics[0].message(), "mixin `ui.Plain` takes no attributes");
    }

    #[test]
    fn test_fill_attributes() {
        let diagnostics = validated("use \"ui\"\nfunc Index()\n+ui.Late()\n  block\n    &.x\n");
        assert_eq!(codes(&diagnostics), vec![ErrorCode::E308]);
        assert_eq!(diagnostics[0].message(), "block `_` cannot take attributes");
    }

    #[test]
    fn test_unknown_fill() {
        let diagnostics =
            validated("use \"ui\"\nfunc Index()\n+ui.Plain()\n  block footer\n    p x\n");
        assert_eq!(codes(&diagnostics), vec![ErrorCode::E306]);
        assert_eq!(diagnostics[0].help(), Some("`ui.Plain` declares _"));
    }

    #[test]
    fn test_void_element_content() {
        let diagnostics = validated("func Index()\nimg\n  &.photo\n  // fine\n  span nope\n");
        assert_eq!(codes(&diagnostics), vec![ErrorCode::E309]);
        assert_eq!(diagnostics[0].labels().len(), 2);
    }
}
