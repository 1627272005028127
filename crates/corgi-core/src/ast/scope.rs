//! Scopes and the closed set of scope items.

use std::sync::{Arc, OnceLock};

use crate::{
    ast::{Expression, File, Mixin, MixinCall, RawFile},
    identifier::Id,
    position::Position,
};

/// An ordered sequence of items. Order is output order.
#[derive(Debug, Default)]
pub struct Scope {
    pub items: Vec<ScopeItem>,
}

impl Scope {
    /// Create a scope from its items.
    pub fn new(items: Vec<ScopeItem>) -> Self {
        Self { items }
    }

    /// Returns `true` if the scope has no items.
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Number of items.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Iterate over the items in order.
    pub fn iter(&self) -> std::slice::Iter<'_, ScopeItem> {
        self.items.iter()
    }

    /// Mixins defined directly in this scope, in declaration order.
    pub fn mixins(&self) -> impl Iterator<Item = &Arc<Mixin>> {
        self.items.iter().filter_map(|item| match item {
            ScopeItem::Mixin(mixin) => Some(mixin),
            _ => None,
        })
    }
}

impl<'a> IntoIterator for &'a Scope {
    type Item = &'a ScopeItem;
    type IntoIter = std::slice::Iter<'a, ScopeItem>;

    fn into_iter(self) -> Self::IntoIter {
        self.items.iter()
    }
}

/// One item of a [`Scope`].
#[derive(Debug)]
pub enum ScopeItem {
    Element(Element),
    Text(Text),
    Output(Output),
    If(If),
    IfBlock(IfBlock),
    Switch(Switch),
    For(For),
    While(While),
    Code(Code),
    Comment(Comment),
    Mixin(Arc<Mixin>),
    MixinCall(MixinCall),
    And(And),
    AndPlaceholder(AndPlaceholder),
    Include(Include),
    Block(Block),
    Doctype(Doctype),
    Filter(Filter),
}

impl ScopeItem {
    /// Position of the item's first token.
    pub fn position(&self) -> Position {
        match self {
            ScopeItem::Element(element) => element.position,
            ScopeItem::Text(text) => text.position,
            ScopeItem::Output(output) => output.position,
            ScopeItem::If(if_) => if_.position,
            ScopeItem::IfBlock(if_block) => if_block.position,
            ScopeItem::Switch(switch) => switch.position,
            ScopeItem::For(for_) => for_.position,
            ScopeItem::While(while_) => while_.position,
            ScopeItem::Code(code) => code.position,
            ScopeItem::Comment(comment) => comment.position,
            ScopeItem::Mixin(mixin) => mixin.position,
            ScopeItem::MixinCall(call) => call.position,
            ScopeItem::And(and) => and.position,
            ScopeItem::AndPlaceholder(placeholder) => placeholder.position,
            ScopeItem::Include(include) => include.position,
            ScopeItem::Block(block) => block.position,
            ScopeItem::Doctype(doctype) => doctype.position,
            ScopeItem::Filter(filter) => filter.position,
        }
    }

    /// A short human readable name of the item kind, used in diagnostics.
    pub fn kind_name(&self) -> &'static str {
        match self {
            ScopeItem::Element(_) => "element",
            ScopeItem::Text(_) => "text",
            ScopeItem::Output(_) => "output",
            ScopeItem::If(_) => "if",
            ScopeItem::IfBlock(_) => "if block",
            ScopeItem::Switch(_) => "switch",
            ScopeItem::For(_) => "for",
            ScopeItem::While(_) => "while",
            ScopeItem::Code(_) => "code",
            ScopeItem::Comment(_) => "comment",
            ScopeItem::Mixin(_) => "mixin definition",
            ScopeItem::MixinCall(_) => "mixin call",
            ScopeItem::And(_) => "`&`",
            ScopeItem::AndPlaceholder(_) => "`&&`",
            ScopeItem::Include(_) => "include",
            ScopeItem::Block(_) => "block",
            ScopeItem::Doctype(_) => "doctype",
            ScopeItem::Filter(_) => "filter",
        }
    }

    /// The nested scopes owned by this item, in source order.
    pub fn child_scopes(&self) -> Vec<&Scope> {
        match self {
            ScopeItem::Element(element) => vec![&element.body],
            ScopeItem::If(if_) => {
                let mut scopes = vec![&if_.then];
                scopes.extend(if_.else_ifs.iter().map(|else_if| &else_if.body));
                scopes.extend(if_.otherwise.as_ref());
                scopes
            }
            ScopeItem::IfBlock(if_block) => {
                let mut scopes = vec![&if_block.then];
                scopes.extend(if_block.otherwise.as_ref());
                scopes
            }
            ScopeItem::Switch(switch) => switch.cases.iter().map(|case| &case.body).collect(),
            ScopeItem::For(for_) => vec![&for_.body],
            ScopeItem::While(while_) => vec![&while_.body],
            ScopeItem::Mixin(mixin) => vec![&mixin.body],
            ScopeItem::MixinCall(call) => vec![&call.body],
            ScopeItem::Block(block) => vec![&block.body],
            ScopeItem::Text(_)
            | ScopeItem::Output(_)
            | ScopeItem::Code(_)
            | ScopeItem::Comment(_)
            | ScopeItem::And(_)
            | ScopeItem::AndPlaceholder(_)
            | ScopeItem::Include(_)
            | ScopeItem::Doctype(_)
            | ScopeItem::Filter(_) => Vec::new(),
        }
    }

    /// Items embedded inline through text interpolation (`#[..]`, `#+..[..]`).
    pub fn inline_items(&self) -> impl Iterator<Item = &ScopeItem> {
        let lines: &[TextLine] = match self {
            ScopeItem::Text(text) => &text.lines,
            _ => &[],
        };
        lines
            .iter()
            .flat_map(|line| line.items.iter())
            .filter_map(|item| match item {
                TextItem::Item(item) => Some(item),
                TextItem::Literal(_) | TextItem::Expression(_) => None,
            })
    }
}

/// An HTML element.
#[derive(Debug)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<AttributeCollection>,
    /// Written with a trailing `/`.
    pub void: bool,
    pub body: Scope,
    pub position: Position,
}

/// Names of elements that may never have content.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

impl Element {
    /// Returns `true` for `/` elements and HTML void elements.
    pub fn is_void(&self) -> bool {
        self.void || VOID_ELEMENTS.contains(&self.name.as_str())
    }
}

/// A group of attributes written together.
#[derive(Debug)]
pub enum AttributeCollection {
    /// `.name`
    Class { name: String, position: Position },
    /// `#name`
    Id { name: String, position: Position },
    /// `(a=1, b)`
    List(Vec<Attribute>),
}

/// `name`, `name=value` or `name!=value`.
#[derive(Debug)]
pub struct Attribute {
    pub name: String,
    pub value: Option<Expression>,
    pub escape: bool,
    pub position: Position,
}

/// `&`: attributes contributed to the enclosing element.
#[derive(Debug)]
pub struct And {
    pub attributes: Vec<AttributeCollection>,
    pub position: Position,
}

/// `&&`: where a mixin splices in the attributes supplied by its caller.
#[derive(Debug)]
pub struct AndPlaceholder {
    pub position: Position,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextKind {
    /// Text following an element or mixin call on the same line.
    Inline,
    /// `| text`
    Pipe,
    /// Lines of a `.` block.
    DotBlock,
}

#[derive(Debug)]
pub struct Text {
    pub kind: TextKind,
    pub lines: Vec<TextLine>,
    pub position: Position,
}

#[derive(Debug)]
pub struct TextLine {
    pub items: Vec<TextItem>,
    pub position: Position,
}

#[derive(Debug)]
pub enum TextItem {
    Literal(String),
    /// `#{expr}` or `#!{expr}`
    Expression(ExpressionInterpolation),
    /// `#[el ...]` or `#+mixin()[...]`, kept as a regular element or mixin call.
    Item(ScopeItem),
}

#[derive(Debug)]
pub struct ExpressionInterpolation {
    pub expression: Expression,
    pub escape: bool,
    pub position: Position,
}

/// `= expr` or `!= expr`
#[derive(Debug)]
pub struct Output {
    pub expression: Expression,
    pub escape: bool,
    pub position: Position,
}

#[derive(Debug)]
pub struct If {
    pub condition: Expression,
    pub then: Scope,
    pub else_ifs: Vec<ElseIf>,
    pub otherwise: Option<Scope>,
    pub position: Position,
}

#[derive(Debug)]
pub struct ElseIf {
    pub condition: Expression,
    pub body: Scope,
    pub position: Position,
}

/// `if block name`: branches on whether a block was filled.
#[derive(Debug)]
pub struct IfBlock {
    pub name: Id,
    pub then: Scope,
    pub otherwise: Option<Scope>,
    pub position: Position,
}

#[derive(Debug)]
pub struct Switch {
    pub comparator: Option<Expression>,
    pub cases: Vec<Case>,
    pub position: Position,
}

#[derive(Debug)]
pub struct Case {
    /// `None` for `default`.
    pub expression: Option<Expression>,
    pub body: Scope,
    pub position: Position,
}

#[derive(Debug)]
pub struct For {
    /// Raw range clause, e.g. `_, item := range items`.
    pub clause: String,
    pub body: Scope,
    pub position: Position,
}

#[derive(Debug)]
pub struct While {
    pub condition: Expression,
    pub body: Scope,
    pub position: Position,
}

#[derive(Debug)]
pub struct Code {
    pub lines: Vec<String>,
    pub position: Position,
}

#[derive(Debug)]
pub struct Comment {
    pub kind: CommentKind,
    pub lines: Vec<String>,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommentKind {
    /// `//`, never written to the output.
    Corgi,
    /// `<!--`, written to the output.
    Html,
    /// `//- namespace:directive args`, interpreted by the code generator.
    Machine(MachineComment),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineComment {
    pub namespace: String,
    pub directive: String,
    pub args: String,
}

#[derive(Debug)]
pub struct Include {
    pub path: String,
    pub target: OnceLock<IncludeTarget>,
    pub position: Position,
}

/// What an `include` resolved to.
#[derive(Clone)]
pub enum IncludeTarget {
    /// A corgi file, parsed in include mode and linked.
    File(Arc<File>),
    /// Any other file, passed through verbatim.
    Raw(RawFile),
}

impl std::fmt::Debug for IncludeTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IncludeTarget::File(file) => f.debug_tuple("File").field(&file.key()).finish(),
            IncludeTarget::Raw(raw) => f.debug_tuple("Raw").field(&raw.path).finish(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlockKind {
    Block,
    Append,
    Prepend,
}

/// A block placeholder (in templates and mixins) or a block fill (in
/// extending files and mixin calls).
#[derive(Debug)]
pub struct Block {
    pub kind: BlockKind,
    pub name: Id,
    pub body: Scope,
    pub position: Position,
}

#[derive(Debug)]
pub struct Doctype {
    pub value: String,
    pub position: Position,
}

/// `:name args` followed by raw lines.
#[derive(Debug)]
pub struct Filter {
    pub name: String,
    pub args: String,
    pub lines: Vec<String>,
    pub position: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn element(name: &str, void: bool) -> Element {
        Element {
            name: name.to_string(),
            attributes: Vec::new(),
            void,
            body: Scope::default(),
            position: Position::new(1, 1),
        }
    }

    #[test]
    fn test_is_void() {
        assert!(element("img", false).is_void());
        assert!(element("my-icon", true).is_void());
        assert!(!element("div", false).is_void());
    }

    #[test]
    fn test_child_scopes_of_if() {
        let item = ScopeItem::If(If {
            condition: Expression::Go(crate::ast::GoExpression {
                code: "ok".to_string(),
                position: Position::new(1, 4),
            }),
            then: Scope::default(),
            else_ifs: vec![ElseIf {
                condition: Expression::Go(crate::ast::GoExpression {
                    code: "other".to_string(),
                    position: Position::new(3, 9),
                }),
                body: Scope::default(),
                position: Position::new(3, 1),
            }],
            otherwise: Some(Scope::default()),
            position: Position::new(1, 1),
        });

        assert_eq!(item.child_scopes().len(), 3);
    }
}
