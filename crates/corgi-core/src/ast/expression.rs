//! Expression nodes.
//!
//! Most expressions are opaque Go code. Two forms are understood structurally:
//! chain expressions carrying nil/bounds checks (`user.Name?`, `m["k"]? ?? "none"`)
//! and ternaries (`ok ? "yes" : "no"`).

use std::fmt;

use crate::position::Position;

/// Any expression appearing in a template.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Go(GoExpression),
    Chain(ChainExpression),
    Ternary(TernaryExpression),
}

impl Expression {
    /// Position of the first character of the expression.
    pub fn position(&self) -> Position {
        match self {
            Expression::Go(go) => go.position,
            Expression::Chain(chain) => chain.position,
            Expression::Ternary(ternary) => ternary.position,
        }
    }

    /// Returns `true` if the expression may evaluate to "not set".
    ///
    /// That is the case for a chain with at least one check and no default.
    pub fn may_be_unset(&self) -> bool {
        match self {
            Expression::Chain(chain) => chain.has_checks() && chain.default.is_none(),
            Expression::Go(_) | Expression::Ternary(_) => false,
        }
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expression::Go(go) => write!(f, "{}", go.code),
            Expression::Chain(chain) => write!(f, "{chain}"),
            Expression::Ternary(ternary) => write!(
                f,
                "{} ? {} : {}",
                ternary.condition, ternary.if_true, ternary.if_false
            ),
        }
    }
}

/// Plain Go code, kept verbatim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoExpression {
    pub code: String,
    pub position: Position,
}

/// A chain of field accesses, indexes, calls and type assertions.
#[derive(Debug, Clone, PartialEq)]
pub struct ChainExpression {
    pub root: String,
    /// `root?`: the root itself is nil-checked.
    pub root_check: bool,
    pub links: Vec<ChainLink>,
    /// The `?? default` used when a check fails.
    pub default: Option<Box<Expression>>,
    pub position: Position,
}

impl ChainExpression {
    /// Returns `true` if the root or any link is checked.
    pub fn has_checks(&self) -> bool {
        self.root_check || self.links.iter().any(|link| link.check)
    }
}

impl fmt::Display for ChainExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.root)?;
        if self.root_check {
            write!(f, "?")?;
        }
        for link in &self.links {
            match &link.kind {
                ChainLinkKind::Field(name) => write!(f, ".{name}")?,
                ChainLinkKind::Index(index) => write!(f, "[{index}]")?,
                ChainLinkKind::Call(args) => write!(f, "({args})")?,
                ChainLinkKind::TypeAssertion(ty) => write!(f, ".({ty})")?,
            }
            if link.check {
                write!(f, "?")?;
            }
        }
        if let Some(default) = &self.default {
            write!(f, " ?? {default}")?;
        }
        Ok(())
    }
}

/// One step of a [`ChainExpression`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainLink {
    pub kind: ChainLinkKind,
    /// `?` written directly after the link.
    pub check: bool,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainLinkKind {
    /// `.name`
    Field(String),
    /// `[expr]`, raw index expression
    Index(String),
    /// `(args)`, raw argument list
    Call(String),
    /// `.(Type)`
    TypeAssertion(String),
}

/// `condition ? if_true : if_false`
#[derive(Debug, Clone, PartialEq)]
pub struct TernaryExpression {
    pub condition: Box<Expression>,
    pub if_true: Box<Expression>,
    pub if_false: Box<Expression>,
    pub position: Position,
}
