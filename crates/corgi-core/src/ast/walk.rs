//! Generic pre-order traversal of scopes.
//!
//! Every pass after parsing (include discovery, call binding, mixin
//! collection, analysis, validation) is written as a callback over [`walk`].
//! The callback sees each item together with a [`WalkContext`] describing
//! where it sits and decides whether to descend into the item's children.
//! Returning an error aborts the walk and is passed through unchanged.

use crate::ast::{Scope, ScopeItem};

/// What to do after visiting an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visit {
    /// Descend into the item's scopes and inline items.
    Children,
    /// Continue with the next sibling.
    Skip,
}

/// The ancestry of the item being visited.
#[derive(Debug, Default)]
pub struct WalkContext<'a> {
    scopes: Vec<&'a Scope>,
    parents: Vec<&'a ScopeItem>,
}

impl<'a> WalkContext<'a> {
    /// Enclosing scopes, outermost first. The last one contains the item,
    /// except for inline items, which sit in the scope of their text.
    pub fn scopes(&self) -> &[&'a Scope] {
        &self.scopes
    }

    /// The directly enclosing item.
    pub fn parent(&self) -> Option<&'a ScopeItem> {
        self.parents.last().copied()
    }
}

/// Walk `scope` in pre-order, calling `f` for every item.
///
/// # Errors
///
/// Returns the first error produced by `f`.
pub fn walk<'a, E, F>(scope: &'a Scope, f: &mut F) -> Result<(), E>
where
    F: FnMut(&'a ScopeItem, &WalkContext<'a>) -> Result<Visit, E>,
{
    let mut ctx = WalkContext::default();
    walk_scope(scope, &mut ctx, f)
}

fn walk_scope<'a, E, F>(scope: &'a Scope, ctx: &mut WalkContext<'a>, f: &mut F) -> Result<(), E>
where
    F: FnMut(&'a ScopeItem, &WalkContext<'a>) -> Result<Visit, E>,
{
    ctx.scopes.push(scope);
    let result = scope.iter().try_for_each(|item| walk_item(item, ctx, f));
    ctx.scopes.pop();
    result
}

fn walk_item<'a, E, F>(item: &'a ScopeItem, ctx: &mut WalkContext<'a>, f: &mut F) -> Result<(), E>
where
    F: FnMut(&'a ScopeItem, &WalkContext<'a>) -> Result<Visit, E>,
{
    if f(item, ctx)? == Visit::Skip {
        return Ok(());
    }

    ctx.parents.push(item);
    let result = item
        .inline_items()
        .try_for_each(|inline| walk_item(inline, ctx, f))
        .and_then(|()| {
            item.child_scopes()
                .into_iter()
                .try_for_each(|child| walk_scope(child, ctx, f))
        });
    ctx.parents.pop();
    result
}

#[cfg(test)]
mod tests {
    use std::{convert::Infallible, sync::OnceLock};

    use super::*;
    use crate::{
        ast::{Element, MixinCall, Text, TextItem, TextKind, TextLine},
        identifier::Id,
        position::Position,
    };

    fn element(name: &str, body: Vec<ScopeItem>) -> ScopeItem {
        ScopeItem::Element(Element {
            name: name.to_string(),
            attributes: Vec::new(),
            void: false,
            body: Scope::new(body),
            position: Position::new(1, 1),
        })
    }

    fn call(name: &str) -> ScopeItem {
        ScopeItem::MixinCall(MixinCall {
            namespace: None,
            name: Id::new(name),
            args: Vec::new(),
            body: Scope::default(),
            position: Position::new(1, 1),
            resolved: OnceLock::new(),
        })
    }

    fn text_with(item: ScopeItem) -> ScopeItem {
        ScopeItem::Text(Text {
            kind: TextKind::Inline,
            lines: vec![TextLine {
                items: vec![TextItem::Literal("see ".to_string()), TextItem::Item(item)],
                position: Position::new(1, 1),
            }],
            position: Position::new(1, 1),
        })
    }

    #[test]
    fn test_walk_visits_in_order() {
        let scope = Scope::new(vec![
            element("div", vec![element("span", vec![]), call("icon")]),
            element("p", vec![]),
        ]);

        let mut seen = Vec::new();
        walk(&scope, &mut |item, ctx| {
            seen.push((item.kind_name(), ctx.scopes().len()));
            Ok::<_, Infallible>(Visit::Children)
        })
        .unwrap();

        assert_eq!(
            seen,
            vec![
                ("element", 1),
                ("element", 2),
                ("mixin call", 2),
                ("element", 1)
            ]
        );
    }

    #[test]
    fn test_walk_skip() {
        let scope = Scope::new(vec![element("div", vec![call("hidden")]), call("shown")]);

        let mut calls = 0;
        walk(&scope, &mut |item, _| {
            Ok::<_, Infallible>(match item {
                ScopeItem::Element(_) => Visit::Skip,
                ScopeItem::MixinCall(_) => {
                    calls += 1;
                    Visit::Children
                }
                _ => Visit::Children,
            })
        })
        .unwrap();

        assert_eq!(calls, 1);
    }

    #[test]
    fn test_walk_visits_inline_items() {
        let scope = Scope::new(vec![element("p", vec![text_with(call("link"))])]);

        let mut parents = Vec::new();
        walk(&scope, &mut |item, ctx| {
            if let ScopeItem::MixinCall(call) = item {
                parents.push((call.name, ctx.parent().map(ScopeItem::kind_name)));
            }
            Ok::<_, Infallible>(Visit::Children)
        })
        .unwrap();

        assert_eq!(parents, vec![(Id::new("link"), Some("text"))]);
    }

    #[test]
    fn test_walk_error_aborts() {
        let scope = Scope::new(vec![call("a"), call("b"), call("c")]);

        let mut visited = 0;
        let result = walk(&scope, &mut |item, _| {
            visited += 1;
            match item {
                ScopeItem::MixinCall(call) if call.name == "b" => Err("stop"),
                _ => Ok(Visit::Children),
            }
        });

        assert_eq!(result, Err("stop"));
        assert_eq!(visited, 2);
    }
}
