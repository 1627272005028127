//! Token definitions for the corgi lexer.
//!
//! Tokens are produced line by line: every logical line yields optional
//! [`Token::Indent`]/[`Token::Dedent`] tokens, the tokens of its item and a
//! closing [`Token::Eol`]. The stream ends with one `Dedent` per open level and
//! [`Token::Eof`].

use std::fmt;

use corgi_core::{Position, Span};

/// A lexical token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token {
    // Structure
    Indent,
    Dedent,
    Eol,
    Eof,

    // Preamble
    Extend,
    Import,
    Use,
    Func,

    // Directives
    Include,
    Block,
    Append,
    Prepend,
    IfBlock,
    Mixin,
    MixinCall,
    Doctype,

    // Control flow
    If,
    ElseIf,
    Else,
    Switch,
    Case,
    Default,
    For,
    While,

    // Code and comments
    Code,
    CodeLine(String),
    CorgiComment,
    HtmlComment,
    MachineComment,

    // Markup
    Element(String),
    /// `.class` or `#id` without an element name.
    Div,
    Class(String),
    Id(String),
    /// Trailing `/` of a void element.
    Void,
    And,
    AndPlaceholder,
    Filter(String),
    Pipe,
    /// `.` at the end of an element line: a dot block follows.
    DotBlock,
    DotBlockLine(String),
    /// `:` between an element or call and a nested item on the same line.
    BlockExpansion,
    Text(String),

    // Punctuation
    LParen,
    RParen,
    Comma,
    Dot,
    /// `=`
    Assign,
    /// `!=`
    AssignNoEscape,

    // Values
    Ident(String),
    /// A quoted string, unquoted.
    Str(String),
    /// A Go type in a mixin parameter list.
    GoType(String),
    /// A Go expression, verbatim.
    Expression(String),
    /// Verbatim text the parser passes through, such as `func` parameters.
    Raw(String),
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Indent => write!(f, "indentation"),
            Token::Dedent => write!(f, "dedent"),
            Token::Eol => write!(f, "end of line"),
            Token::Eof => write!(f, "end of file"),
            Token::Extend => write!(f, "`extend`"),
            Token::Import => write!(f, "`import`"),
            Token::Use => write!(f, "`use`"),
            Token::Func => write!(f, "`func`"),
            Token::Include => write!(f, "`include`"),
            Token::Block => write!(f, "`block`"),
            Token::Append => write!(f, "`append`"),
            Token::Prepend => write!(f, "`prepend`"),
            Token::IfBlock => write!(f, "`if block`"),
            Token::Mixin => write!(f, "`mixin`"),
            Token::MixinCall => write!(f, "`+`"),
            Token::Doctype => write!(f, "`doctype`"),
            Token::If => write!(f, "`if`"),
            Token::ElseIf => write!(f, "`else if`"),
            Token::Else => write!(f, "`else`"),
            Token::Switch => write!(f, "`switch`"),
            Token::Case => write!(f, "`case`"),
            Token::Default => write!(f, "`default`"),
            Token::For => write!(f, "`for`"),
            Token::While => write!(f, "`while`"),
            Token::Code | Token::CodeLine(_) => write!(f, "code"),
            Token::CorgiComment | Token::HtmlComment | Token::MachineComment => {
                write!(f, "comment")
            }
            Token::Element(name) => write!(f, "element `{name}`"),
            Token::Div => write!(f, "element"),
            Token::Class(name) => write!(f, "class `.{name}`"),
            Token::Id(name) => write!(f, "id `#{name}`"),
            Token::Void => write!(f, "`/`"),
            Token::And => write!(f, "`&`"),
            Token::AndPlaceholder => write!(f, "`&&`"),
            Token::Filter(name) => write!(f, "filter `:{name}`"),
            Token::Pipe => write!(f, "`|`"),
            Token::DotBlock => write!(f, "`.`"),
            Token::DotBlockLine(_) => write!(f, "text block line"),
            Token::BlockExpansion => write!(f, "`:`"),
            Token::Text(_) => write!(f, "text"),
            Token::LParen => write!(f, "`(`"),
            Token::RParen => write!(f, "`)`"),
            Token::Comma => write!(f, "`,`"),
            Token::Dot => write!(f, "`.`"),
            Token::Assign => write!(f, "`=`"),
            Token::AssignNoEscape => write!(f, "`!=`"),
            Token::Ident(name) => write!(f, "identifier `{name}`"),
            Token::Str(_) => write!(f, "string"),
            Token::GoType(ty) => write!(f, "type `{ty}`"),
            Token::Expression(_) => write!(f, "expression"),
            Token::Raw(_) => write!(f, "text"),
        }
    }
}

/// A token with the position of its first character.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionedToken {
    pub token: Token,
    pub position: Position,
    /// Width in characters; zero for structural tokens.
    pub len: usize,
}

impl PositionedToken {
    pub fn new(token: Token, position: Position, len: usize) -> Self {
        Self {
            token,
            position,
            len,
        }
    }

    pub fn span(&self) -> Span {
        Span::at(self.position, self.len)
    }
}
