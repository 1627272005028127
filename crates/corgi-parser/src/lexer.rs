//! Lexical analyzer for corgi source text.
//!
//! The lexer is a state machine: every state function lexes one logical line
//! (or one raw text block), queues the tokens it produced and returns the next
//! state. [`Lexer`] is an iterator that runs states on demand, so the parser
//! pulls tokens lazily and may abandon the stream at any time through
//! [`Lexer::stop`].
//!
//! Indentation is structure: the lexer tracks the reference indentation
//! established by the first indented line and turns level changes into
//! [`Token::Indent`] and [`Token::Dedent`] tokens.
//!
//! Any lexical error ends the stream. The tokens queued before the error are
//! delivered first, then exactly one `Err`, then nothing.

use std::collections::VecDeque;

use thiserror::Error;

use corgi_core::{Position, Span};

use crate::{
    error::{Diagnostic, ErrorCode},
    tokens::{PositionedToken, Token},
};

/// What went wrong while lexing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LexErrorKind {
    #[error("unterminated string literal")]
    UnterminatedString,

    #[error("unexpected character `{0}`")]
    UnexpectedChar(char),

    #[error("mixed tabs and spaces in indentation")]
    MixedIndentation,

    #[error("inconsistent indentation")]
    IndentationError {
        expected: char,
        expected_width: usize,
        actual: char,
        actual_width: usize,
        reference_line: usize,
    },

    #[error("indentation increased by more than one level")]
    IndentationIncrease,

    #[error("unexpected end of line")]
    UnexpectedEol,
}

/// A lexical error with the position it was detected at.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{position}: {kind}")]
pub struct LexError {
    pub kind: LexErrorKind,
    pub position: Position,
}

impl From<LexError> for Diagnostic {
    fn from(err: LexError) -> Self {
        let span = Span::at(err.position, 1);
        let diag = Diagnostic::error(err.kind.to_string());
        match err.kind {
            LexErrorKind::UnterminatedString => diag
                .with_code(ErrorCode::E001)
                .with_label(span, "string starts here")
                .with_help("close the string on the same line"),
            LexErrorKind::UnexpectedChar(_) => diag
                .with_code(ErrorCode::E002)
                .with_label(span, "unexpected character"),
            LexErrorKind::MixedIndentation => diag
                .with_code(ErrorCode::E003)
                .with_label(span, "indentation mixes tabs and spaces")
                .with_help("indent with either tabs or spaces, never both"),
            LexErrorKind::IndentationError {
                expected,
                expected_width,
                actual,
                actual_width,
                reference_line,
            } => diag
                .with_code(ErrorCode::E004)
                .with_label(
                    Span::at(err.position, actual_width),
                    format!("indented with {}", describe_indent(actual, actual_width)),
                )
                .with_secondary_label(
                    Span::at(Position::new(reference_line, 1), expected_width),
                    format!(
                        "indentation set to {} here",
                        describe_indent(expected, expected_width)
                    ),
                )
                .with_should_be(format!(
                    "a multiple of {}",
                    describe_indent(expected, expected_width)
                )),
            LexErrorKind::IndentationIncrease => diag
                .with_code(ErrorCode::E005)
                .with_label(span, "indented too far")
                .with_help("indent nested lines by exactly one level"),
            LexErrorKind::UnexpectedEol => diag
                .with_code(ErrorCode::E006)
                .with_label(span, "line ends here")
                .with_help("close every parenthesis, bracket and brace on the same line"),
        }
    }
}

fn describe_indent(ch: char, width: usize) -> String {
    let name = if ch == '\t' { "tab" } else { "space" };
    if width == 1 {
        format!("1 {name}")
    } else {
        format!("{width} {name}s")
    }
}

type LexResult<T> = Result<T, LexError>;

/// A state of the lexer: lexes some input and returns the next state, or
/// `None` once the input is exhausted.
struct StateFn(fn(&mut Lexer<'_>) -> LexResult<Option<StateFn>>);

/// How much an indentation increase is tolerated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndentMode {
    /// Decreases and no change only; an increase is left in the line.
    NoIncrease,
    /// Additionally exactly one level up; excess stays in the line.
    SingleIncrease,
    /// Any consistent change of at most one level up.
    AllIndents,
}

/// The indentation established by the first indented line.
#[derive(Debug, Clone, Copy)]
struct Reference {
    ch: char,
    width: usize,
    line: usize,
}

/// Lines following a bare `import` or `use`.
#[derive(Debug, Clone, Copy)]
struct SpecBlock {
    kind: SpecKind,
    level: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SpecKind {
    Import,
    Use,
}

const KEYWORDS: &[&str] = &[
    "extend", "import", "use", "func", "include", "block", "append", "prepend", "mixin", "doctype",
    "if", "else", "switch", "case", "default", "for", "while",
];

/// The corgi lexer.
///
/// Iterates over `Result<PositionedToken, LexError>`.
pub struct Lexer<'src> {
    lines: Vec<&'src str>,
    /// Index of the current line.
    line: usize,
    /// Byte offset into the current line.
    offset: usize,
    level: usize,
    reference: Option<Reference>,
    spec_block: Option<SpecBlock>,
    queue: VecDeque<PositionedToken>,
    state: Option<StateFn>,
    error: Option<LexError>,
}

impl<'src> Lexer<'src> {
    /// Create a lexer over `text`.
    pub fn new(text: &'src str) -> Self {
        let lines = text
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line))
            .collect();

        Self {
            lines,
            line: 0,
            offset: 0,
            level: 0,
            reference: None,
            spec_block: None,
            queue: VecDeque::new(),
            state: Some(StateFn(lex_line)),
            error: None,
        }
    }

    /// Abandon the stream: drop queued tokens and stop the state machine.
    ///
    /// The iterator yields nothing afterwards.
    pub fn stop(&mut self) {
        self.queue.clear();
        self.state = None;
        self.error = None;
    }

    fn line_text(&self) -> &'src str {
        self.lines.get(self.line).copied().unwrap_or("")
    }

    fn rest(&self) -> &'src str {
        &self.line_text()[self.offset..]
    }

    fn peek_char(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn pos(&self, offset: usize) -> Position {
        let col = self.line_text()[..offset].chars().count() + 1;
        Position::new(self.line + 1, col)
    }

    fn error(&self, kind: LexErrorKind, offset: usize) -> LexError {
        LexError {
            kind,
            position: self.pos(offset),
        }
    }

    fn unexpected_here(&self) -> LexError {
        match self.peek_char() {
            Some(c) => self.error(LexErrorKind::UnexpectedChar(c), self.offset),
            None => self.error(LexErrorKind::UnexpectedEol, self.offset),
        }
    }

    fn push(&mut self, token: Token, start: usize, end: usize) {
        let len = self.line_text()[start..end].chars().count();
        let position = self.pos(start);
        self.queue
            .push_back(PositionedToken::new(token, position, len));
    }

    /// Push a token spanning `len` bytes from the cursor and move past it.
    fn push_advance(&mut self, token: Token, len: usize) {
        let start = self.offset;
        self.offset += len;
        self.push(token, start, self.offset);
    }

    fn push_structural(&mut self, token: Token, position: Position) {
        self.queue.push_back(PositionedToken::new(token, position, 0));
    }

    fn skip_spaces(&mut self) {
        let rest = self.rest();
        self.offset += rest.len() - rest.trim_start_matches([' ', '\t']).len();
    }

    fn at_end(&self) -> bool {
        self.rest().trim().is_empty()
    }

    fn expect_end(&mut self) -> LexResult<()> {
        self.skip_spaces();
        match self.peek_char() {
            None => Ok(()),
            Some(c) => Err(self.error(LexErrorKind::UnexpectedChar(c), self.offset)),
        }
    }

    /// Take characters while `pred` holds; returns the taken text.
    fn take_while(&mut self, pred: impl Fn(char) -> bool) -> &'src str {
        let rest = self.rest();
        let len = rest.find(|c: char| !pred(c)).unwrap_or(rest.len());
        self.offset += len;
        &rest[..len]
    }

    fn next_line(&mut self) {
        self.line += 1;
        self.offset = 0;
    }

    fn is_blank(line: &str) -> bool {
        line.trim_matches([' ', '\t']).is_empty()
    }

    fn leading_whitespace(&self) -> &'src str {
        let line = self.line_text();
        let len = line.len() - line.trim_start_matches([' ', '\t']).len();
        &line[..len]
    }

    // =====================================================================
    // Indentation
    // =====================================================================

    /// Consume the indentation of the current line and return its level.
    fn consume_indent(&mut self, mode: IndentMode) -> LexResult<usize> {
        let ws = self.leading_whitespace();
        if ws.is_empty() {
            return Ok(0);
        }

        let allowed = match mode {
            IndentMode::NoIncrease => self.level,
            IndentMode::SingleIncrease | IndentMode::AllIndents => self.level + 1,
        };

        // Mixing is checked over the whole run, whatever part of it is consumed.
        if ws.contains(' ') && ws.contains('\t') {
            return Err(self.error(LexErrorKind::MixedIndentation, 0));
        }

        let reference = match self.reference {
            Some(reference) => reference,
            None => {
                let reference = Reference {
                    ch: ws.chars().next().unwrap_or(' '),
                    width: ws.len(),
                    line: self.line + 1,
                };
                self.reference = Some(reference);
                reference
            }
        };

        // Only the part that forms levels has to be consistent; excess
        // indentation left in a line belongs to its text.
        let counted = match mode {
            IndentMode::AllIndents => ws,
            IndentMode::NoIncrease | IndentMode::SingleIncrease => {
                &ws[..ws.len().min(allowed * reference.width)]
            }
        };
        self.check_indent(counted, reference)?;

        let levels = counted.len() / reference.width;
        if levels > allowed {
            return Err(self.error(LexErrorKind::IndentationIncrease, 0));
        }
        self.offset = levels * reference.width;
        Ok(levels)
    }

    fn check_indent(&self, ws: &str, reference: Reference) -> LexResult<()> {
        let foreign = ws.chars().any(|c| c != reference.ch);
        if foreign && ws.contains(reference.ch) {
            return Err(self.error(LexErrorKind::MixedIndentation, 0));
        }
        if foreign || ws.len() % reference.width != 0 {
            return Err(self.error(
                LexErrorKind::IndentationError {
                    expected: reference.ch,
                    expected_width: reference.width,
                    actual: ws.chars().next().unwrap_or(reference.ch),
                    actual_width: ws.len(),
                    reference_line: reference.line,
                },
                0,
            ));
        }
        Ok(())
    }

    /// Emit one `Indent` or `Dedent` per level changed.
    fn change_level(&mut self, level: usize) {
        let position = Position::new(self.line + 1, 1);
        while self.level < level {
            self.level += 1;
            self.push_structural(Token::Indent, position);
        }
        while self.level > level {
            self.level -= 1;
            self.push_structural(Token::Dedent, position);
        }
    }

    // =====================================================================
    // Items
    // =====================================================================

    /// Lex the item starting at the cursor.
    ///
    /// Returns `true` if a raw block follows the line.
    fn lex_item(&mut self) -> LexResult<bool> {
        let rest = self.rest();

        if rest.starts_with("//-") {
            self.push_advance(Token::MachineComment, 3);
            self.skip_spaces();
            let args = self.rest().trim_end();
            self.push_advance(Token::Raw(args.to_string()), args.len());
            return Ok(false);
        }
        if rest.starts_with("//") {
            self.push_advance(Token::CorgiComment, 2);
            return Ok(self.lex_comment_text(None));
        }
        if rest.starts_with("<!--") {
            self.push_advance(Token::HtmlComment, 4);
            return Ok(self.lex_comment_text(Some("-->")));
        }

        if let Some(kw) = keyword(rest) {
            return self.lex_keyword(kw);
        }

        match rest.chars().next() {
            Some('-') => self.lex_code(),
            Some(':') => self.lex_filter(),
            Some('|') => {
                self.push_advance(Token::Pipe, 1);
                if self.peek_char() == Some(' ') {
                    self.offset += 1;
                }
                self.lex_text();
                Ok(false)
            }
            Some('!') if rest.starts_with("!=") => {
                self.push_advance(Token::AssignNoEscape, 2);
                self.lex_line_expression()?;
                Ok(false)
            }
            Some('=') => {
                self.push_advance(Token::Assign, 1);
                self.lex_line_expression()?;
                Ok(false)
            }
            Some('&') if rest.starts_with("&&") => {
                self.push_advance(Token::AndPlaceholder, 2);
                self.expect_end()?;
                Ok(false)
            }
            Some('&') => {
                self.push_advance(Token::And, 1);
                self.lex_attributes()?;
                self.expect_end()?;
                Ok(false)
            }
            Some('+') => self.lex_mixin_call(),
            Some('.' | '#') => {
                self.push_structural(Token::Div, self.pos(self.offset));
                self.lex_attributes()?;
                self.lex_tail(true)
            }
            Some(c) if c.is_alphabetic() => {
                let start = self.offset;
                let name = self.take_element_name();
                self.push(Token::Element(name.to_string()), start, self.offset);
                self.lex_attributes()?;
                self.lex_tail(true)
            }
            _ => Err(self.unexpected_here()),
        }
    }

    /// Text after `//` or `<!--`. Returns `true` if the comment continues as
    /// a raw block.
    fn lex_comment_text(&mut self, terminator: Option<&str>) -> bool {
        self.skip_spaces();
        let rest = self.rest().trim_end();
        let (text, closed) = match terminator.and_then(|t| rest.strip_suffix(t)) {
            Some(text) => (text.trim_end(), true),
            None => (rest, false),
        };

        if text.is_empty() {
            self.offset = self.line_text().len();
            return !closed;
        }
        let start = self.offset;
        self.push(Token::Text(text.to_string()), start, start + text.len());
        self.offset = self.line_text().len();
        false
    }

    fn lex_keyword(&mut self, kw: &'static str) -> LexResult<bool> {
        let kw_len = kw.len();
        match kw {
            "extend" | "include" => {
                let token = if kw == "extend" {
                    Token::Extend
                } else {
                    Token::Include
                };
                self.push_advance(token, kw_len);
                self.skip_spaces();
                self.lex_string()?;
                self.expect_end()?;
            }
            "import" | "use" => {
                let kind = if kw == "import" {
                    SpecKind::Import
                } else {
                    SpecKind::Use
                };
                let token = match kind {
                    SpecKind::Import => Token::Import,
                    SpecKind::Use => Token::Use,
                };
                self.push_advance(token, kw_len);
                self.skip_spaces();
                if self.at_end() {
                    self.spec_block = Some(SpecBlock {
                        kind,
                        level: self.level + 1,
                    });
                } else {
                    self.lex_spec(kind)?;
                }
            }
            "func" => {
                self.push_advance(Token::Func, kw_len);
                self.skip_spaces();
                self.lex_ident()?;
                self.skip_spaces();
                if self.peek_char() != Some('(') {
                    return Err(self.unexpected_here());
                }
                let inner_start = self.offset + 1;
                let len = self.scan_balanced(inner_start, &[')'])?;
                if self.rest()[1 + len..].chars().next() != Some(')') {
                    return Err(self.error(LexErrorKind::UnexpectedEol, inner_start + len));
                }
                let params = &self.rest()[1..1 + len];
                self.push(Token::Raw(params.to_string()), inner_start, inner_start + len);
                self.offset = inner_start + len + 1;
                self.expect_end()?;
            }
            "block" | "append" | "prepend" => {
                let token = match kw {
                    "block" => Token::Block,
                    "append" => Token::Append,
                    _ => Token::Prepend,
                };
                self.push_advance(token, kw_len);
                self.skip_spaces();
                if !self.at_end() {
                    self.lex_ident()?;
                }
                self.expect_end()?;
            }
            "mixin" => {
                self.push_advance(Token::Mixin, kw_len);
                self.skip_spaces();
                self.lex_ident()?;
                self.skip_spaces();
                if self.peek_char() == Some('(') {
                    self.lex_params()?;
                }
                self.expect_end()?;
            }
            "doctype" => {
                self.push_advance(Token::Doctype, kw_len);
                self.skip_spaces();
                let value = self.rest().trim_end();
                self.push_advance(Token::Raw(value.to_string()), value.len());
            }
            "if" => {
                let start = self.offset;
                self.offset += kw_len;
                self.skip_spaces();
                if keyword(self.rest()) == Some("block") {
                    self.offset += "block".len();
                    self.push(Token::IfBlock, start, self.offset);
                    self.skip_spaces();
                    if !self.at_end() {
                        self.lex_ident()?;
                    }
                    self.expect_end()?;
                } else {
                    self.push(Token::If, start, start + kw_len);
                    self.lex_line_expression()?;
                }
            }
            "else" => {
                let start = self.offset;
                self.offset += kw_len;
                self.skip_spaces();
                if self.at_end() {
                    self.push(Token::Else, start, start + kw_len);
                } else if keyword(self.rest()) == Some("if") {
                    self.offset += "if".len();
                    self.push(Token::ElseIf, start, self.offset);
                    self.lex_line_expression()?;
                } else {
                    return Err(self.unexpected_here());
                }
            }
            "switch" => {
                self.push_advance(Token::Switch, kw_len);
                if !self.at_end() {
                    self.lex_line_expression()?;
                }
            }
            "case" | "while" => {
                let token = if kw == "case" {
                    Token::Case
                } else {
                    Token::While
                };
                self.push_advance(token, kw_len);
                self.lex_line_expression()?;
            }
            "default" => {
                self.push_advance(Token::Default, kw_len);
                self.expect_end()?;
            }
            "for" => {
                self.push_advance(Token::For, kw_len);
                self.skip_spaces();
                if self.at_end() {
                    return Err(self.error(LexErrorKind::UnexpectedEol, self.offset));
                }
                let clause = self.rest().trim_end();
                self.push_advance(Token::Raw(clause.to_string()), clause.len());
            }
            _ => return Err(self.unexpected_here()),
        }
        Ok(false)
    }

    /// `[alias] "path"` of an import or use.
    fn lex_spec(&mut self, kind: SpecKind) -> LexResult<()> {
        match self.peek_char() {
            Some('"' | '`') => {}
            Some('.') if kind == SpecKind::Use => {
                self.push_advance(Token::Dot, 1);
                self.skip_spaces();
            }
            _ => {
                self.lex_ident()?;
                self.skip_spaces();
            }
        }
        self.lex_string()?;
        self.expect_end()
    }

    fn lex_code(&mut self) -> LexResult<bool> {
        let rest = self.rest().trim_end();
        if rest == "-" {
            self.push_advance(Token::Code, 1);
            return Ok(true);
        }
        if !rest.starts_with("- ") {
            return Err(self.error(LexErrorKind::UnexpectedChar('-'), self.offset));
        }
        self.push_advance(Token::Code, 1);
        self.skip_spaces();
        let code = self.rest().trim_end();
        self.push_advance(Token::CodeLine(code.to_string()), code.len());
        Ok(false)
    }

    fn lex_filter(&mut self) -> LexResult<bool> {
        let start = self.offset;
        self.offset += 1;
        let name = self.take_while(|c| c.is_alphanumeric() || c == '-' || c == '_');
        if name.is_empty() {
            return Err(self.unexpected_here());
        }
        self.push(Token::Filter(name.to_string()), start, self.offset);
        self.skip_spaces();
        if !self.at_end() {
            let args = self.rest().trim_end();
            self.push_advance(Token::Raw(args.to_string()), args.len());
        }
        Ok(true)
    }

    /// The rest of the line as text, if any.
    fn lex_text(&mut self) {
        let text = self.rest().trim_end();
        if !text.is_empty() {
            self.push_advance(Token::Text(text.to_string()), text.len());
        }
        self.offset = self.line_text().len();
    }

    fn lex_mixin_call(&mut self) -> LexResult<bool> {
        self.push_advance(Token::MixinCall, 1);
        self.lex_ident()?;

        let rest = self.rest();
        if rest.starts_with('.') && rest[1..].starts_with(|c: char| c.is_alphabetic() || c == '_') {
            self.push_advance(Token::Dot, 1);
            self.lex_ident()?;
        }

        if self.peek_char() == Some('(') {
            self.push_advance(Token::LParen, 1);
            loop {
                self.skip_spaces();
                match self.peek_char() {
                    Some(')') => {
                        self.push_advance(Token::RParen, 1);
                        break;
                    }
                    None => return Err(self.unexpected_here()),
                    Some(_) => {}
                }
                self.lex_ident()?;
                self.skip_spaces();
                if self.peek_char() != Some('=') {
                    return Err(self.unexpected_here());
                }
                self.push_advance(Token::Assign, 1);
                self.lex_delimited_expression(&[',', ')'])?;
                self.skip_spaces();
                if self.peek_char() == Some(',') {
                    self.push_advance(Token::Comma, 1);
                }
            }
        }

        self.lex_tail(false)
    }

    /// Parameters of a mixin definition, starting at `(`.
    fn lex_params(&mut self) -> LexResult<()> {
        self.push_advance(Token::LParen, 1);
        loop {
            self.skip_spaces();
            match self.peek_char() {
                Some(')') => {
                    self.push_advance(Token::RParen, 1);
                    return Ok(());
                }
                None => return Err(self.unexpected_here()),
                Some(_) => {}
            }

            self.lex_ident()?;
            self.skip_spaces();
            if !matches!(self.peek_char(), Some(',' | ')' | '=') | None) {
                let len = self.scan_balanced(self.offset, &[',', ')', '='])?;
                let ty = self.rest()[..len].trim_end();
                self.push_advance(Token::GoType(ty.to_string()), ty.len());
                self.offset += len - ty.len();
            }
            if self.peek_char() == Some('=') {
                self.push_advance(Token::Assign, 1);
                self.lex_delimited_expression(&[',', ')'])?;
            }
            self.skip_spaces();
            if self.peek_char() == Some(',') {
                self.push_advance(Token::Comma, 1);
            }
        }
    }

    /// `.class`, `#id` and `(attribute lists)` following an element.
    fn lex_attributes(&mut self) -> LexResult<()> {
        let is_name = |c: char| c.is_alphanumeric() || c == '-' || c == '_';
        loop {
            let rest = self.rest();
            let second = rest[rest.chars().next().map_or(0, char::len_utf8)..]
                .chars()
                .next();
            match rest.chars().next() {
                Some('.') if second.is_some_and(is_name) => {
                    let start = self.offset;
                    self.offset += 1;
                    let name = self.take_while(is_name);
                    self.push(Token::Class(name.to_string()), start, self.offset);
                }
                Some('#') if second.is_some_and(is_name) => {
                    let start = self.offset;
                    self.offset += 1;
                    let name = self.take_while(is_name);
                    self.push(Token::Id(name.to_string()), start, self.offset);
                }
                Some('(') => self.lex_attribute_list()?,
                _ => return Ok(()),
            }
        }
    }

    fn lex_attribute_list(&mut self) -> LexResult<()> {
        self.push_advance(Token::LParen, 1);
        loop {
            self.skip_spaces();
            match self.peek_char() {
                Some(')') => {
                    self.push_advance(Token::RParen, 1);
                    return Ok(());
                }
                None => return Err(self.unexpected_here()),
                Some(_) => {}
            }

            let start = self.offset;
            let name = self.take_while(|c| !matches!(c, ' ' | '\t' | '=' | '!' | '(' | ')' | ','));
            if name.is_empty() {
                return Err(self.unexpected_here());
            }
            self.push(Token::Ident(name.to_string()), start, self.offset);
            self.skip_spaces();

            if self.rest().starts_with("!=") {
                self.push_advance(Token::AssignNoEscape, 2);
                self.lex_delimited_expression(&[',', ')'])?;
            } else if self.peek_char() == Some('=') {
                self.push_advance(Token::Assign, 1);
                self.lex_delimited_expression(&[',', ')'])?;
            }
            self.skip_spaces();
            if self.peek_char() == Some(',') {
                self.push_advance(Token::Comma, 1);
            }
        }
    }

    /// What follows an element or mixin call head.
    fn lex_tail(&mut self, element: bool) -> LexResult<bool> {
        if element && self.peek_char() == Some('/') {
            self.push_advance(Token::Void, 1);
        }

        let rest = self.rest();
        if rest.trim_end().is_empty() {
            return Ok(false);
        }
        if rest.trim_end() == "." {
            self.push_advance(Token::DotBlock, 1);
            return Ok(true);
        }
        if rest.starts_with(':') {
            self.push_advance(Token::BlockExpansion, 1);
            self.skip_spaces();
            if self.at_end() {
                return Err(self.error(LexErrorKind::UnexpectedEol, self.offset));
            }
            return self.lex_item();
        }
        if element && rest.starts_with("!=") {
            self.push_advance(Token::AssignNoEscape, 2);
            self.lex_line_expression()?;
            return Ok(false);
        }
        if element && rest.starts_with('=') {
            self.push_advance(Token::Assign, 1);
            self.lex_line_expression()?;
            return Ok(false);
        }
        if rest.starts_with(' ') {
            self.offset += 1;
            self.lex_text();
            return Ok(false);
        }
        Err(self.unexpected_here())
    }

    // =====================================================================
    // Values
    // =====================================================================

    fn lex_ident(&mut self) -> LexResult<String> {
        let start = self.offset;
        if !self
            .peek_char()
            .is_some_and(|c| c.is_alphabetic() || c == '_')
        {
            return Err(self.unexpected_here());
        }
        let name = self.take_while(|c| c.is_alphanumeric() || c == '_');
        self.push(Token::Ident(name.to_string()), start, self.offset);
        Ok(name.to_string())
    }

    fn take_element_name(&mut self) -> &'src str {
        let rest = self.rest();
        let mut end = 0;
        let mut chars = rest.char_indices().peekable();
        while let Some((i, c)) = chars.next() {
            let next_is_name = chars
                .peek()
                .is_some_and(|(_, next)| next.is_alphanumeric());
            if c.is_alphanumeric() || c == '-' || c == '_' || (c == ':' && next_is_name) {
                end = i + c.len_utf8();
            } else {
                break;
            }
        }
        self.offset += end;
        &rest[..end]
    }

    /// A `"…"` or `` `…` `` string at the cursor.
    fn lex_string(&mut self) -> LexResult<()> {
        let quote = match self.peek_char() {
            Some(quote @ ('"' | '`')) => quote,
            _ => return Err(self.unexpected_here()),
        };
        let start = self.offset;
        let len = string_len(&self.rest()[1..], quote)
            .ok_or_else(|| self.error(LexErrorKind::UnterminatedString, start))?;
        let raw = &self.rest()[1..1 + len];
        let value = if quote == '"' {
            unescape(raw)
        } else {
            raw.to_string()
        };
        self.offset += len + 2;
        self.push(Token::Str(value), start, self.offset);
        Ok(())
    }

    /// An expression running to the end of the line.
    fn lex_line_expression(&mut self) -> LexResult<()> {
        self.skip_spaces();
        if self.at_end() {
            return Err(self.error(LexErrorKind::UnexpectedEol, self.offset));
        }
        let len = self.scan_balanced(self.offset, &[])?;
        let expression = self.rest()[..len].trim_end();
        self.push_advance(Token::Expression(expression.to_string()), expression.len());
        self.offset = self.line_text().len();
        Ok(())
    }

    /// An expression ending before one of `stop` at depth zero.
    fn lex_delimited_expression(&mut self, stop: &[char]) -> LexResult<()> {
        self.skip_spaces();
        let len = self.scan_balanced(self.offset, stop)?;
        let expression = self.rest()[..len].trim_end();
        if expression.is_empty() {
            return Err(self.unexpected_here());
        }
        if self.offset + len >= self.line_text().len() {
            return Err(self.error(LexErrorKind::UnexpectedEol, self.offset + len));
        }
        self.push_advance(Token::Expression(expression.to_string()), expression.len());
        self.offset += len - expression.len();
        Ok(())
    }

    /// Length in bytes of the balanced text starting at `from`, up to the
    /// first of `stop` outside brackets and strings or the end of the line.
    fn scan_balanced(&self, from: usize, stop: &[char]) -> LexResult<usize> {
        let text = &self.line_text()[from..];
        let mut closers = Vec::new();
        let mut iter = text.char_indices();

        while let Some((i, c)) = iter.next() {
            if closers.is_empty() && stop.contains(&c) {
                return Ok(i);
            }
            match c {
                '(' => closers.push(')'),
                '[' => closers.push(']'),
                '{' => closers.push('}'),
                ')' | ']' | '}' => {
                    if closers.pop() != Some(c) {
                        return Err(self.error(LexErrorKind::UnexpectedChar(c), from + i));
                    }
                }
                '"' | '\'' | '`' => {
                    let len = string_len(&text[i + 1..], c).ok_or_else(|| {
                        self.error(LexErrorKind::UnterminatedString, from + i)
                    })?;
                    // Skip the body and the closing quote.
                    let end = i + 1 + len;
                    while iter.next().is_some_and(|(j, _)| j < end) {}
                }
                _ => {}
            }
        }

        if closers.is_empty() {
            Ok(text.len())
        } else {
            Err(self.error(LexErrorKind::UnexpectedEol, from + text.len()))
        }
    }
}

/// Byte length of a string body up to (not including) the closing `quote`.
fn string_len(text: &str, quote: char) -> Option<usize> {
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quote != '`' => escaped = true,
            c if c == quote => return Some(i),
            _ => {}
        }
    }
    None
}

fn unescape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut chars = raw.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

fn keyword(rest: &str) -> Option<&'static str> {
    let end = rest.find([' ', '\t']).unwrap_or(rest.len());
    let word = &rest[..end];
    KEYWORDS.iter().copied().find(|keyword| *keyword == word)
}

// =========================================================================
// States
// =========================================================================

/// Lex one logical line.
fn lex_line(lx: &mut Lexer<'_>) -> LexResult<Option<StateFn>> {
    while lx.line < lx.lines.len() && Lexer::is_blank(lx.line_text()) {
        lx.next_line();
    }
    if lx.line >= lx.lines.len() {
        return Ok(Some(StateFn(lex_eof)));
    }

    let level = lx.consume_indent(IndentMode::AllIndents)?;
    lx.change_level(level);

    let raw_block = match lx.spec_block {
        Some(block) if level >= block.level => {
            lx.lex_spec(block.kind)?;
            false
        }
        _ => {
            lx.spec_block = None;
            lx.lex_item()?
        }
    };

    let eol = lx.pos(lx.line_text().len());
    lx.push_structural(Token::Eol, eol);
    lx.next_line();

    Ok(Some(if raw_block {
        StateFn(lex_raw_block)
    } else {
        StateFn(lex_line)
    }))
}

/// Lex the verbatim lines of a dot block, comment block, code block or
/// filter body.
fn lex_raw_block(lx: &mut Lexer<'_>) -> LexResult<Option<StateFn>> {
    let outer = lx.level;
    let mut opened = false;
    let mut pending_blank = Vec::new();

    while lx.line < lx.lines.len() {
        if Lexer::is_blank(lx.line_text()) {
            if opened {
                pending_blank.push(lx.line);
            }
            lx.next_line();
            continue;
        }

        let mode = if opened {
            IndentMode::NoIncrease
        } else {
            IndentMode::SingleIncrease
        };
        // Raw lines are consumed one level deeper than their owner.
        lx.level = outer + usize::from(opened);
        let level = lx.consume_indent(mode);
        lx.level = outer;
        if level? <= outer {
            lx.offset = 0;
            break;
        }

        if !opened {
            opened = true;
            lx.push_structural(Token::Indent, Position::new(lx.line + 1, 1));
        }
        for line in pending_blank.drain(..) {
            let position = Position::new(line + 1, 1);
            lx.push_structural(Token::DotBlockLine(String::new()), position);
            lx.push_structural(Token::Eol, position);
        }

        let text = lx.rest();
        lx.push_advance(Token::DotBlockLine(text.to_string()), text.len());
        let eol = lx.pos(lx.line_text().len());
        lx.push_structural(Token::Eol, eol);
        lx.next_line();
    }

    if opened {
        lx.push_structural(Token::Dedent, Position::new(lx.line + 1, 1));
    }
    Ok(Some(StateFn(lex_line)))
}

/// Close every open level and end the stream.
fn lex_eof(lx: &mut Lexer<'_>) -> LexResult<Option<StateFn>> {
    let position = Position::new(lx.lines.len().max(1), 1);
    while lx.level > 0 {
        lx.level -= 1;
        lx.push_structural(Token::Dedent, position);
    }
    lx.push_structural(Token::Eof, position);
    Ok(None)
}

impl Iterator for Lexer<'_> {
    type Item = Result<PositionedToken, LexError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(token) = self.queue.pop_front() {
                return Some(Ok(token));
            }
            if let Some(err) = self.error.take() {
                return Some(Err(err));
            }
            let state = self.state.take()?;
            match (state.0)(self) {
                Ok(next) => self.state = next,
                Err(err) => self.error = Some(err),
            }
        }
    }
}

/// Lex `text` completely.
///
/// # Errors
///
/// Returns the first lexical error.
pub fn tokenize(text: &str) -> Result<Vec<PositionedToken>, LexError> {
    Lexer::new(text).collect()
}


#[cfg(test)]
mod proptest_tests {
    use proptest::prelude::*;

    use super::*;

    // ===================
    // Strategies
    // ===================

    /// Strategy for a well-formed outline: each line is at most one level
    /// deeper than the previous one.
    fn outline_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(0usize..3, 1..20).prop_map(|steps| {
            let mut depth = 0usize;
            steps
                .into_iter()
                .map(|step| {
                    depth = match step {
                        0 => depth + 1,
                        1 => depth,
                        _ => depth.saturating_sub(2),
                    };
                    depth
                })
                .collect::<Vec<_>>()
        })
    }

    fn render(depths: &[usize], indent: &str) -> String {
        // The first line always starts at depth zero.
        let base = depths.first().copied().unwrap_or(0);
        let mut prev = 0;
        depths
            .iter()
            .map(|depth| {
                let depth = (depth.saturating_sub(base)).min(prev + 1);
                prev = depth;
                format!("{}p", indent.repeat(depth))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    // ===================
    // Property Test Functions
    // ===================

    /// Indents and dedents always balance and never go negative.
    fn check_indentation_balances(src: &str) -> Result<(), TestCaseError> {
        let toks = tokenize(src).map_err(|e| TestCaseError::fail(e.to_string()))?;
        let mut depth: i64 = 0;
        for token in &toks {
            match token.token {
                Token::Indent => depth += 1,
                Token::Dedent => depth -= 1,
                _ => {}
            }
            prop_assert!(depth >= 0);
        }
        prop_assert_eq!(depth, 0);
        prop_assert_eq!(toks.last().map(|t| &t.token), Some(&Token::Eof));
        Ok(())
    }

    // ===================
    // Proptest Wrappers
    // ===================

    proptest! {
        #[test]
        fn indentation_balances_with_spaces(depths in outline_strategy()) {
            check_indentation_balances(&render(&depths, "  "))?;
        }

        #[test]
        fn indentation_balances_with_tabs(depths in outline_strategy()) {
            check_indentation_balances(&render(&depths, "\t"))?;
        }
    }
}
