//! Splitting text into literals and interpolations.
//!
//! Recognized forms:
//!
//! | form | meaning |
//! |---|---|
//! | `#{expr}` | escaped expression |
//! | `#!{expr}` | unescaped expression |
//! | `#[el.class(attrs) text]` | inline element |
//! | `#+ns.name(args)[text]` | inline mixin call, `text` fills `_` |
//! | `##` | a literal `#` |
//!
//! Any other `#` is literal. The parser turns element and call pieces into
//! scope items by parsing them as a line of their own.

use winnow::{
    Parser as _,
    combinator::{alt, opt, peek, repeat, terminated},
    error::{ContextError, ErrMode},
    stream::Stream,
    token::{take_till, take_while},
};

use corgi_core::{Position, Span};

use crate::{
    error::{Diagnostic, ErrorCode, Result},
    expression::find_unnested,
};

/// One piece of a text line.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Piece<'a> {
    Literal(String),
    Expression {
        code: &'a str,
        escape: bool,
        position: Position,
    },
    Element {
        text: &'a str,
        position: Position,
    },
    MixinCall {
        head: &'a str,
        head_position: Position,
        text: &'a str,
        text_position: Position,
    },
}

/// Context type for interpolation errors
#[derive(Debug, Clone, PartialEq, Eq)]
enum Context {
    /// What is wrong with the interpolation
    Label(&'static str),
    /// Remaining byte count at the `#` that opened the interpolation
    StartOffset(usize),
}

type IResult<O> = std::result::Result<O, ErrMode<ContextError<Context>>>;

/// A piece before positions are resolved. Offsets are remaining byte counts.
#[derive(Debug, Clone)]
enum Raw<'s> {
    Literal(&'s str),
    Expression {
        code: &'s str,
        escape: bool,
        offset: usize,
    },
    Element {
        text: &'s str,
        offset: usize,
    },
    MixinCall {
        head: &'s str,
        head_offset: usize,
        text: &'s str,
        text_offset: usize,
    },
}

fn cut_error(start: usize, label: &'static str) -> ErrMode<ContextError<Context>> {
    let mut e = ContextError::new();
    e.push(Context::Label(label));
    e.push(Context::StartOffset(start));
    ErrMode::Cut(e)
}

/// Run `parser`, turning a failure into a cut error for the interpolation
/// opened at `start`.
fn cut_err<'s, O>(
    input: &mut &'s str,
    start: usize,
    label: &'static str,
    mut parser: impl winnow::Parser<&'s str, O, ErrMode<ContextError<Context>>>,
) -> IResult<O> {
    parser
        .parse_next(input)
        .map_err(|_| cut_error(start, label))
}

/// Go code up to an unnested `close`, which is not consumed.
fn code_until<'s>(input: &mut &'s str, close: char) -> IResult<&'s str> {
    let len = find_unnested(input, close).ok_or_else(|| ErrMode::Backtrack(ContextError::new()))?;
    Ok(input.next_slice(len))
}

fn brace_body<'s>(input: &mut &'s str) -> IResult<&'s str> {
    code_until(input, '}')
}

fn paren_body<'s>(input: &mut &'s str) -> IResult<&'s str> {
    code_until(input, ')')
}

/// Text up to the `]` closing an already opened `[`.
///
/// Only square brackets are counted, so apostrophes in text do not open
/// strings.
fn bracketed<'s>(input: &mut &'s str) -> IResult<&'s str> {
    repeat::<_, _, (), _, _>(
        0..,
        alt((
            take_till(1.., ['[', ']']).void(),
            ('[', bracketed, ']').void(),
        )),
    )
    .take()
    .parse_next(input)
}

/// Tag, classes, id and attribute lists of an inline element. Attribute
/// values are Go code, so their strings may hold brackets.
fn element_head<'s>(input: &mut &'s str) -> IResult<&'s str> {
    repeat::<_, _, (), _, _>(
        0..,
        alt((
            take_while(1.., |c: char| {
                c.is_alphanumeric() || matches!(c, '-' | '_' | '.' | '#' | ':')
            })
            .void(),
            ('(', paren_body, ')').void(),
        )),
    )
    .take()
    .parse_next(input)
}

/// `+ns.name(args)`
fn call_head<'s>(input: &mut &'s str) -> IResult<&'s str> {
    (
        '+',
        take_while(1.., |c: char| c.is_alphanumeric() || c == '_' || c == '.'),
        opt(('(', paren_body, ')')),
    )
        .take()
        .parse_next(input)
}

fn expression<'s>(input: &mut &'s str) -> IResult<Raw<'s>> {
    let start = input.eof_offset();
    let escape = alt(("#{".value(true), "#!{".value(false))).parse_next(input)?;
    let offset = input.eof_offset();
    let code = cut_err(
        input,
        start,
        "this `{` is never closed",
        terminated(brace_body, '}'),
    )?;
    if code.trim().is_empty() {
        return Err(cut_error(start, "empty expression"));
    }
    Ok(Raw::Expression {
        code,
        escape,
        offset,
    })
}

fn element<'s>(input: &mut &'s str) -> IResult<Raw<'s>> {
    let start = input.eof_offset();
    "#[".parse_next(input)?;
    let offset = input.eof_offset();
    let text = cut_err(
        input,
        start,
        "this `[` is never closed",
        terminated((element_head, bracketed).take(), ']'),
    )?;
    if text.trim().is_empty() {
        return Err(cut_error(start, "empty element"));
    }
    Ok(Raw::Element { text, offset })
}

fn mixin_call<'s>(input: &mut &'s str) -> IResult<Raw<'s>> {
    let start = input.eof_offset();
    ('#', peek('+')).parse_next(input)?;
    let head_offset = input.eof_offset();
    let head = cut_err(input, start, "expected a mixin call", call_head)?;
    cut_err(
        input,
        start,
        "a mixin call interpolation needs a `[text]` part",
        '[',
    )?;
    let text_offset = input.eof_offset();
    let text = cut_err(
        input,
        start,
        "this `[` is never closed",
        terminated(bracketed, ']'),
    )?;
    Ok(Raw::MixinCall {
        head,
        head_offset,
        text,
        text_offset,
    })
}

fn piece<'s>(input: &mut &'s str) -> IResult<Raw<'s>> {
    alt((
        take_till(1.., '#').map(Raw::Literal),
        "##".value(Raw::Literal("#")),
        expression,
        element,
        mixin_call,
        // Any other `#` is literal.
        '#'.take().map(Raw::Literal),
    ))
    .parse_next(input)
}

fn invalid_interpolation(
    err: &ErrMode<ContextError<Context>>,
    at: &impl Fn(usize) -> Position,
    fallback: Position,
) -> Diagnostic {
    let mut label = None;
    let mut position = None;
    if let ErrMode::Backtrack(e) | ErrMode::Cut(e) = err {
        for context in e.context() {
            match context {
                Context::Label(l) if label.is_none() => label = Some(*l),
                Context::StartOffset(offset) if position.is_none() => position = Some(at(*offset)),
                _ => {}
            }
        }
    }
    Diagnostic::error("invalid interpolation")
        .with_code(ErrorCode::E113)
        .with_label(
            Span::at(position.unwrap_or(fallback), 2),
            label.unwrap_or("cannot be read"),
        )
        .with_help("write `##` for a literal `#`")
}

/// Split `text`, whose first character is at `position`, into pieces.
///
/// # Errors
///
/// Returns an invalid-interpolation diagnostic for unclosed interpolations
/// and for call interpolations without a `[text]` part.
pub(crate) fn split(text: &str, position: Position) -> Result<Vec<Piece<'_>>> {
    let at = |remaining: usize| {
        let byte = text.len() - remaining;
        position.advance(text[..byte].chars().count())
    };

    let mut input = text;
    let raws: Vec<Raw<'_>> = repeat(0.., piece)
        .parse_next(&mut input)
        .map_err(|err| invalid_interpolation(&err, &at, position))?;

    let mut pieces = Vec::new();
    let mut literal = String::new();
    for raw in raws {
        let piece = match raw {
            Raw::Literal(text) => {
                literal.push_str(text);
                continue;
            }
            Raw::Expression {
                code,
                escape,
                offset,
            } => Piece::Expression {
                code,
                escape,
                position: at(offset),
            },
            Raw::Element { text, offset } => Piece::Element {
                text,
                position: at(offset),
            },
            Raw::MixinCall {
                head,
                head_offset,
                text,
                text_offset,
            } => Piece::MixinCall {
                head,
                head_position: at(head_offset),
                text,
                text_position: at(text_offset),
            },
        };
        flush(&mut pieces, &mut literal);
        pieces.push(piece);
    }
    flush(&mut pieces, &mut literal);
    Ok(pieces)
}

fn flush(pieces: &mut Vec<Piece<'_>>, literal: &mut String) {
    if !literal.is_empty() {
        pieces.push(Piece::Literal(std::mem::take(literal)));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pieces(text: &str) -> Vec<Piece<'_>> {
        split(text, Position::new(1, 1)).expect("split")
    }

    fn lit(s: &str) -> Piece<'static> {
        Piece::Literal(s.to_string())
    }

    #[test]
    fn test_plain_text() {
        assert_eq!(pieces("Hello, world"), vec![lit("Hello, world")]);
        assert_eq!(pieces(""), vec![]);
    }

    #[test]
    fn test_literal_hashes() {
        assert_eq!(pieces("item ##1 and #2"), vec![lit("item #1 and #2")]);
    }

    #[test]
    fn test_expressions() {
        assert_eq!(
            pieces("Hi #{user.Name}, #!{html}!"),
            vec![
                lit("Hi "),
                Piece::Expression {
                    code: "user.Name",
                    escape: true,
                    position: Position::new(1, 6),
                },
                lit(", "),
                Piece::Expression {
                    code: "html",
                    escape: false,
                    position: Position::new(1, 21),
                },
                lit("!"),
            ]
        );
    }

    #[test]
    fn test_expression_with_braces_in_string() {
        assert_eq!(
            pieces("#{fmt.Sprint(\"}\")}"),
            vec![Piece::Expression {
                code: "fmt.Sprint(\"}\")",
                escape: true,
                position: Position::new(1, 3),
            }]
        );
    }

    #[test]
    fn test_element() {
        assert_eq!(
            pieces("see #[a(href=url) the [docs]] now"),
            vec![
                lit("see "),
                Piece::Element {
                    text: "a(href=url) the [docs]",
                    position: Position::new(1, 7),
                },
                lit(" now"),
            ]
        );
    }

    #[test]
    fn test_element_text_with_apostrophe() {
        assert_eq!(
            pieces("#[em don't]"),
            vec![Piece::Element {
                text: "em don't",
                position: Position::new(1, 3),
            }]
        );
    }

    #[test]
    fn test_element_attribute_with_bracket_in_string() {
        assert_eq!(
            pieces("#[a(href=\"x]\") t] end"),
            vec![
                Piece::Element {
                    text: "a(href=\"x]\") t",
                    position: Position::new(1, 3),
                },
                lit(" end"),
            ]
        );
    }

    #[test]
    fn test_invalid_interpolation_labels() {
        let err = split("ok #{open", Position::new(2, 5)).unwrap_err();
        let label = err.primary_label().unwrap();
        assert_eq!(label.span().start(), Position::new(2, 8));
        assert_eq!(label.message(), "this `{` is never closed");
    }

    #[test]
    fn test_mixin_call() {
        assert_eq!(
            pieces("#+ui.Link(href=\"/\")[home]."),
            vec![
                Piece::MixinCall {
                    head: "+ui.Link(href=\"/\")",
                    head_position: Position::new(1, 2),
                    text: "home",
                    text_position: Position::new(1, 21),
                },
                lit("."),
            ]
        );
    }

    #[test]
    fn test_invalid_interpolations() {
        for text in ["#{open", "#[em", "#+link", "#+link[x", "#{ }", "#+(x)[y]"] {
            let err = split(text, Position::new(1, 1)).unwrap_err();
            assert_eq!(err.code(), Some(ErrorCode::E113), "for `{text}`");
        }
    }
}
