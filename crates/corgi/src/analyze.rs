//! Mixin analysis.
//!
//! Computes a [`MixinInfo`] for every mixin of a linked compilation: what the
//! mixin, together with everything it calls, may write. Summaries depend on
//! the summaries of callees, which may be declared anywhere, so analysis
//! runs as a worklist: a mixin whose callee is not summarized yet is
//! requeued. A full pass without progress leaves only mixins that depend on
//! themselves, which is reported as recursion.
//!
//! An item is *top level* when no element or mixin call lies between it and
//! the mixin body. Conditionals, loops and blocks are transparent.

use std::{collections::VecDeque, convert::Infallible, mem, sync::Arc};

use log::{debug, trace};

use corgi_core::{
    Span,
    ast::{
        Block, CommentKind, File, IncludeTarget, Mixin, MixinBlockInfo, MixinCall, MixinInfo, Scope,
        ScopeItem, Visit, walk,
    },
};
use corgi_parser::{Diagnostic, DiagnosticCollector, DiagnosticError, ErrorCode};

/// Summarize every mixin declared in `files`.
///
/// Mixins that already carry a summary, like intrinsics, are left alone.
///
/// # Errors
///
/// Returns one E400 diagnostic per mixin whose summary depends on itself.
pub fn analyze(files: &[Arc<File>]) -> Result<(), DiagnosticError> {
    let mut queue: VecDeque<(&File, &Arc<Mixin>)> = files
        .iter()
        .flat_map(|file| mixins(file).into_iter().map(move |mixin| (&**file, mixin)))
        .filter(|(_, mixin)| mixin.info().is_none())
        .collect();
    debug!(mixins = queue.len(); "Analyzing mixins");

    let mut pass = 0;
    while !queue.is_empty() {
        pass += 1;
        let mut pending = VecDeque::new();
        let mut progress = false;

        while let Some((file, mixin)) = queue.pop_front() {
            match summarize(mixin) {
                Some(info) => {
                    trace!(mixin:% = mixin.name, file:% = file.key(), pass; "Analyzed mixin");
                    let _ = mixin.info.set(info);
                    progress = true;
                }
                None => pending.push_back((file, mixin)),
            }
        }

        if !progress {
            let mut collector = DiagnosticCollector::new();
            for (file, mixin) in pending {
                collector.emit(
                    Diagnostic::error(format!(
                        "mixin `{}` is likely part of a recursion",
                        mixin.name
                    ))
                    .with_code(ErrorCode::E400)
                    .with_label(
                        Span::at(
                            mixin.position,
                            "mixin ".len() + mixin.name.as_string().chars().count(),
                        ),
                        "cannot be analyzed",
                    )
                    .with_source(Arc::clone(&file.source))
                    .with_help("mixins may not call themselves, directly or through other mixins"),
                );
            }
            collector.finish()?;
            break;
        }
        queue = pending;
    }
    Ok(())
}

/// Every mixin definition of `file`. Mixins do not nest.
fn mixins(file: &File) -> Vec<&Arc<Mixin>> {
    let mut mixins = Vec::new();
    let _ = walk(&file.scope, &mut |item, _| {
        Ok::<_, Infallible>(match item {
            ScopeItem::Mixin(mixin) => {
                mixins.push(mixin);
                Visit::Skip
            }
            _ => Visit::Children,
        })
    });
    mixins
}

/// Summarize `mixin`, or `None` if a callee has no summary yet.
fn summarize(mixin: &Mixin) -> Option<MixinInfo> {
    let mut analyzer = Analyzer::default();
    analyzer
        .scope(
            &mixin.body,
            Level {
                top_level: true,
                placeholder_top: true,
            },
        )
        .ok()?;

    let Flags {
        writes_body,
        writes_elements,
        writes_top_level_attributes,
        has_and_placeholders,
        top_level_and_placeholder,
    } = analyzer.flags;
    Some(MixinInfo {
        writes_body,
        writes_elements,
        writes_top_level_attributes,
        has_and_placeholders,
        top_level_and_placeholder,
        blocks: analyzer.blocks,
    })
}

/// A callee without summary.
struct Pending;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Flags {
    writes_body: bool,
    writes_elements: bool,
    writes_top_level_attributes: bool,
    has_and_placeholders: bool,
    top_level_and_placeholder: bool,
}

impl Flags {
    fn merge(&mut self, other: Flags) {
        self.writes_body |= other.writes_body;
        self.writes_elements |= other.writes_elements;
        self.writes_top_level_attributes |= other.writes_top_level_attributes;
        self.has_and_placeholders |= other.has_and_placeholders;
        self.top_level_and_placeholder |= other.top_level_and_placeholder;
    }
}

/// Where an item sits relative to the mixin body.
#[derive(Debug, Clone, Copy)]
struct Level {
    /// No element or call in between.
    top_level: bool,
    /// No element or block fill in between.
    placeholder_top: bool,
}

impl Level {
    const NESTED: Level = Level {
        top_level: false,
        placeholder_top: false,
    };
}

#[derive(Debug, Default)]
struct Analyzer {
    flags: Flags,
    blocks: Vec<MixinBlockInfo>,
    /// Body content was written in the current element context.
    written: bool,
}

impl Analyzer {
    fn scope(&mut self, scope: &Scope, level: Level) -> Result<(), Pending> {
        scope.iter().try_for_each(|item| self.item(item, level))
    }

    /// Analyze alternative scopes; content is written after them if any
    /// of them writes.
    fn branches<'s>(
        &mut self,
        scopes: impl IntoIterator<Item = &'s Scope>,
        level: Level,
        exhaustive: bool,
    ) -> Result<(), Pending> {
        let before = self.written;
        let mut after = if exhaustive { false } else { before };
        for scope in scopes {
            self.written = before;
            self.scope(scope, level)?;
            after |= self.written;
        }
        self.written = after;
        Ok(())
    }

    fn write_body(&mut self) {
        self.flags.writes_body = true;
        self.written = true;
    }

    fn item(&mut self, item: &ScopeItem, level: Level) -> Result<(), Pending> {
        match item {
            ScopeItem::Element(element) => {
                self.flags.writes_elements = true;
                self.write_body();
                let outer = mem::replace(&mut self.written, false);
                self.scope(&element.body, Level::NESTED)?;
                self.written = outer;
            }
            ScopeItem::Text(_) => {
                self.write_body();
                for inline in item.inline_items() {
                    self.item(inline, level)?;
                }
            }
            ScopeItem::Output(_) | ScopeItem::Filter(_) | ScopeItem::Doctype(_) => {
                self.write_body()
            }
            ScopeItem::Comment(comment) => {
                if comment.kind == CommentKind::Html {
                    self.flags.writes_elements = true;
                    self.write_body();
                }
            }
            ScopeItem::Code(_) | ScopeItem::Mixin(_) => {}
            ScopeItem::If(if_) => {
                let scopes = std::iter::once(&if_.then)
                    .chain(if_.else_ifs.iter().map(|else_if| &else_if.body))
                    .chain(if_.otherwise.as_ref());
                self.branches(scopes, level, if_.otherwise.is_some())?;
            }
            ScopeItem::IfBlock(if_block) => {
                let scopes = std::iter::once(&if_block.then).chain(if_block.otherwise.as_ref());
                self.branches(scopes, level, if_block.otherwise.is_some())?;
            }
            ScopeItem::Switch(switch) => {
                let exhaustive = switch.cases.iter().any(|case| case.expression.is_none());
                self.branches(switch.cases.iter().map(|case| &case.body), level, exhaustive)?;
            }
            ScopeItem::For(for_) => self.branches([&for_.body], level, false)?,
            ScopeItem::While(while_) => self.branches([&while_.body], level, false)?,
            ScopeItem::MixinCall(call) => self.call(call, level)?,
            ScopeItem::And(_) => {
                if level.top_level {
                    self.flags.writes_top_level_attributes = true;
                }
            }
            ScopeItem::AndPlaceholder(_) => {
                self.flags.has_and_placeholders = true;
                if level.placeholder_top {
                    self.flags.top_level_and_placeholder = true;
                }
            }
            ScopeItem::Include(include) => match include.target.get() {
                Some(IncludeTarget::File(included)) => self.scope(&included.scope, level)?,
                Some(IncludeTarget::Raw(_)) => self.write_body(),
                None => {}
            },
            ScopeItem::Block(block) => self.declare_block(block, level)?,
        }
        Ok(())
    }

    fn call(&mut self, call: &MixinCall, level: Level) -> Result<(), Pending> {
        // Unbound calls never reach analysis; treat one as writing nothing.
        if call.resolved.get().is_some() {
            let callee = call.mixin().ok_or(Pending)?;
            let info = callee.info().ok_or(Pending)?;

            self.flags.writes_body |= info.writes_body;
            self.flags.writes_elements |= info.writes_elements;
            if level.top_level {
                self.flags.writes_top_level_attributes |= info.writes_top_level_attributes;
                if info.top_level_and_placeholder {
                    self.flags.has_and_placeholders = true;
                    if level.placeholder_top {
                        self.flags.top_level_and_placeholder = true;
                    }
                }
            }
            if info.writes_body {
                self.written = true;
            }
        }

        let written = self.written;
        for item in &call.body {
            match item {
                ScopeItem::Block(fill) => {
                    let outer = mem::replace(&mut self.written, false);
                    self.scope(&fill.body, Level::NESTED)?;
                    self.written = outer;
                }
                item => self.item(
                    item,
                    Level {
                        top_level: false,
                        placeholder_top: level.placeholder_top,
                    },
                )?,
            }
        }
        self.written = written;
        Ok(())
    }

    fn declare_block(&mut self, block: &Block, level: Level) -> Result<(), Pending> {
        let can_attributes = !self.written;
        let index = match self.blocks.iter().position(|info| info.name == block.name) {
            Some(index) => index,
            None => {
                self.blocks.push(MixinBlockInfo {
                    name: block.name,
                    top_level: level.top_level,
                    can_attributes,
                    default_writes_body: false,
                    default_writes_elements: false,
                    default_writes_top_level_attributes: false,
                    default_top_level_and_placeholder: false,
                });
                self.blocks.len() - 1
            }
        };

        let outer = mem::take(&mut self.flags);
        self.scope(&block.body, level)?;
        let defaults = mem::replace(&mut self.flags, outer);
        self.flags.merge(defaults);

        let info = &mut self.blocks[index];
        info.top_level |= level.top_level;
        info.can_attributes &= can_attributes;
        info.default_writes_body |= defaults.writes_body;
        info.default_writes_elements |= defaults.writes_elements;
        info.default_writes_top_level_attributes |= defaults.writes_top_level_attributes;
        info.default_top_level_and_placeholder |= defaults.top_level_and_placeholder;

        // A fill may write anything.
        self.written = true;
        Ok(())
    }
}
