//! The expression sub-grammar.
//!
//! Expressions are Go code and stay opaque, except for two corgi extensions
//! that are parsed into structure:
//!
//! - nil-check chains: `user?.Address?.City ?? "unknown"`, where a `?` after
//!   the root or any link turns a nil pointer, missing key or failed type
//!   assertion into the zero value (or the `??` default);
//! - ternaries: `cond ? a : b`, with `?` and `:` surrounded by whitespace.

use winnow::{
    Parser as _,
    ascii::space0,
    combinator::{alt, delimited, eof, not, opt, preceded, repeat, terminated},
    error::{ContextError, ErrMode},
    token::{one_of, take_while},
};

use corgi_core::{
    Position, Span,
    ast::{ChainExpression, ChainLink, ChainLinkKind, Expression, GoExpression, TernaryExpression},
};

use crate::error::{Diagnostic, ErrorCode, Result};

type IResult<O> = std::result::Result<O, ErrMode<ContextError>>;

/// Walks a line of Go code, skipping string literals and tracking bracket
/// depth.
///
/// Yields `(byte index, char, depth)` for every character outside string
/// bodies. Openers report the depth before they open, closers the depth
/// before they close, so an unmatched closer reports zero.
struct Scanner<'a> {
    chars: std::str::CharIndices<'a>,
    depth: usize,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.char_indices(),
            depth: 0,
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = (usize, char, usize);

    fn next(&mut self) -> Option<Self::Item> {
        let (i, c) = self.chars.next()?;
        let depth = self.depth;
        match c {
            '(' | '[' | '{' => self.depth += 1,
            ')' | ']' | '}' => self.depth = self.depth.saturating_sub(1),
            '"' | '\'' | '`' => {
                let mut escaped = false;
                for (_, s) in self.chars.by_ref() {
                    match s {
                        _ if escaped => escaped = false,
                        '\\' if c != '`' => escaped = true,
                        s if s == c => break,
                        _ => {}
                    }
                }
            }
            _ => {}
        }
        Some((i, c, depth))
    }
}

/// Byte index of the first `close` outside brackets and strings.
pub(crate) fn find_unnested(text: &str, close: char) -> Option<usize> {
    Scanner::new(text)
        .find(|&(_, c, depth)| c == close && depth == 0)
        .map(|(i, _, _)| i)
}

fn has_question(text: &str) -> bool {
    Scanner::new(text).any(|(_, c, _)| c == '?')
}

fn char_offset(text: &str, byte: usize) -> usize {
    text[..byte].chars().count()
}

fn spaced(text: &str, i: usize) -> bool {
    let bytes = text.as_bytes();
    i > 0
        && bytes.get(i - 1).is_some_and(u8::is_ascii_whitespace)
        && bytes.get(i + 1).is_some_and(u8::is_ascii_whitespace)
}

/// Byte indices of the `?` and `:` of a top-level ternary.
fn split_ternary(text: &str) -> Option<(usize, usize)> {
    let mut question = None;
    let mut nested = 0usize;
    for (i, c, depth) in Scanner::new(text) {
        if depth != 0 || !spaced(text, i) {
            continue;
        }
        match (c, question) {
            ('?', None) => question = Some(i),
            ('?', Some(_)) => nested += 1,
            (':', Some(q)) if nested == 0 => return Some((q, i)),
            (':', Some(_)) => nested -= 1,
            _ => {}
        }
    }
    None
}

// =========================================================================
// Chain grammar
// =========================================================================

struct RawLink {
    kind: ChainLinkKind,
    check: bool,
    /// Bytes remaining in the input when the link started.
    remaining: usize,
}

struct RawChain<'s> {
    root: &'s str,
    root_check: bool,
    links: Vec<RawLink>,
    default: Option<&'s str>,
}

fn ident<'s>(input: &mut &'s str) -> IResult<&'s str> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .parse_next(input)
}

/// A `?` that is not the start of `??`.
fn check(input: &mut &str) -> IResult<bool> {
    opt(terminated('?', not('?')))
        .map(|check| check.is_some())
        .parse_next(input)
}

/// Balanced text up to an unnested `close`, which is not consumed.
fn balanced<'s>(input: &mut &'s str, close: char) -> IResult<&'s str> {
    let len = find_unnested(input, close).ok_or_else(|| ErrMode::Backtrack(ContextError::new()))?;
    let (body, rest) = input.split_at(len);
    *input = rest;
    Ok(body)
}

fn paren_body<'s>(input: &mut &'s str) -> IResult<&'s str> {
    balanced(input, ')')
}

fn bracket_body<'s>(input: &mut &'s str) -> IResult<&'s str> {
    balanced(input, ']')
}

fn link(input: &mut &str) -> IResult<RawLink> {
    let remaining = input.len();
    let kind = alt((
        delimited(".(", paren_body, ')')
            .map(|ty: &str| ChainLinkKind::TypeAssertion(ty.to_string())),
        preceded('.', ident).map(|field: &str| ChainLinkKind::Field(field.to_string())),
        delimited('[', bracket_body, ']')
            .map(|index: &str| ChainLinkKind::Index(index.to_string())),
        delimited('(', paren_body, ')')
            .map(|args: &str| ChainLinkKind::Call(args.to_string())),
    ))
    .parse_next(input)?;
    let check = check.parse_next(input)?;

    Ok(RawLink {
        kind,
        check,
        remaining,
    })
}

fn chain<'s>(input: &mut &'s str) -> IResult<RawChain<'s>> {
    let root = ident.parse_next(input)?;
    let root_check = check.parse_next(input)?;
    let links: Vec<RawLink> = repeat(0.., link).parse_next(input)?;
    let default = opt(preceded(
        (space0, "??", space0),
        take_while(1.., |_: char| true),
    ))
    .parse_next(input)?;
    eof.parse_next(input)?;

    Ok(RawChain {
        root,
        root_check,
        links,
        default,
    })
}

// =========================================================================
// Entry point
// =========================================================================

fn invalid_expression(text: &str, position: Position) -> Diagnostic {
    Diagnostic::error("invalid expression")
        .with_code(ErrorCode::E112)
        .with_label(
            Span::at(position, text.chars().count()),
            "`?` is only allowed in nil-check chains and ternaries",
        )
        .with_help("write `a?.b ?? c` for nil checks or `cond ? a : b` for ternaries")
}

/// Parse the expression `text` starting at `position`.
///
/// # Errors
///
/// Returns a diagnostic for misplaced `?`s, for a ternary whose condition is
/// a nil-check chain or ternary, and for a chain whose default is one.
pub fn parse_expression(text: &str, position: Position) -> Result<Expression> {
    let leading = text.len() - text.trim_start().len();
    let position = position.advance(char_offset(text, leading));
    let text = text.trim();

    if text.is_empty() {
        return Err(invalid_expression(text, position));
    }

    if let Some((question, colon)) = split_ternary(text) {
        return parse_ternary(text, position, question, colon);
    }

    if !has_question(text) {
        return Ok(Expression::Go(GoExpression {
            code: text.to_string(),
            position,
        }));
    }

    let raw = chain
        .parse(text)
        .map_err(|_| invalid_expression(text, position))?;
    build_chain(text, position, raw)
}

fn parse_ternary(
    text: &str,
    position: Position,
    question: usize,
    colon: usize,
) -> Result<Expression> {
    let at = |byte: usize| position.advance(char_offset(text, byte));

    let condition = parse_expression(&text[..question], position)?;
    if matches!(condition, Expression::Chain(_) | Expression::Ternary(_)) {
        return Err(Diagnostic::error("invalid ternary condition")
            .with_code(ErrorCode::E110)
            .with_label(
                Span::at(condition.position(), char_offset(text, question)),
                "condition must be a plain expression",
            )
            .with_help("assign the nil-check or ternary to a variable and test that"));
    }
    let if_true = parse_expression(&text[question + 1..colon], at(question + 1))?;
    let if_false = parse_expression(&text[colon + 1..], at(colon + 1))?;

    Ok(Expression::Ternary(TernaryExpression {
        condition: Box::new(condition),
        if_true: Box::new(if_true),
        if_false: Box::new(if_false),
        position,
    }))
}

fn build_chain(text: &str, position: Position, raw: RawChain<'_>) -> Result<Expression> {
    let at = |byte: usize| position.advance(char_offset(text, byte));

    let mut links = Vec::with_capacity(raw.links.len());
    for link in raw.links {
        let start = text.len() - link.remaining;
        let body = match &link.kind {
            ChainLinkKind::Field(_) => None,
            ChainLinkKind::Index(body)
            | ChainLinkKind::Call(body)
            | ChainLinkKind::TypeAssertion(body) => Some(body),
        };
        if body.is_some_and(|body| has_question(body)) {
            return Err(invalid_expression(text, position));
        }
        links.push(ChainLink {
            kind: link.kind,
            check: link.check,
            position: at(start),
        });
    }

    let default = match raw.default {
        Some(default) => {
            let start = text.len() - default.len();
            let expression = parse_expression(default, at(start))?;
            if matches!(expression, Expression::Chain(_) | Expression::Ternary(_)) {
                return Err(Diagnostic::error("invalid nil-check default")
                    .with_code(ErrorCode::E111)
                    .with_label(
                        Span::at(expression.position(), default.chars().count()),
                        "default must be a plain expression",
                    )
                    .with_help("the default of `??` cannot itself use `?`"));
            }
            Some(Box::new(expression))
        }
        None => None,
    };

    let chain = ChainExpression {
        root: raw.root.to_string(),
        root_check: raw.root_check,
        links,
        default,
        position,
    };
    if !chain.has_checks() && chain.default.is_none() {
        return Err(invalid_expression(text, position));
    }
    Ok(Expression::Chain(chain))
}
