//! Parser for corgi token streams.
//!
//! A recursive-descent parser pulling tokens lazily from the [`Lexer`]. What is
//! legal depends on two things besides the next token:
//!
//! - the [`Mode`] of the file, fixed for the whole parse;
//! - a stack of [`Context`]s, pushed when entering mixin definitions, mixin
//!   call bodies, conditionals inside call bodies and block fills.
//!
//! Parsing stops at the first error. The lexer is stopped and the error is
//! returned with the file's source attached.

use std::sync::{Arc, OnceLock};

use log::{debug, trace};

use corgi_core::{
    Position, Source, Span,
    ast::{
        And, AndPlaceholder, Attribute, AttributeCollection, Block, BlockKind, Case, Code, Comment,
        CommentKind, Doctype, Element, ElseIf, Expression, ExpressionInterpolation, Extend, File,
        FileKind, Filter, For, Func, If, IfBlock, Import, ImportSpec, Include, MachineComment,
        Mixin, MixinArg, MixinCall, MixinParam, Output, Scope, ScopeItem, Switch, Text, TextItem,
        TextKind, TextLine, Use, UseNamespace, UseSpec, While,
    },
    identifier::Id,
};

use crate::{
    error::{Diagnostic, DiagnosticError, ErrorCode, Result},
    expression::parse_expression,
    interpolation::{self, Piece},
    lexer::Lexer,
    tokens::{PositionedToken, Token},
};

/// What kind of file is being parsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Mode {
    /// A file being compiled. Must declare `func`.
    Main,
    /// A template loaded through `extend`.
    Extend,
    /// A file loaded through `include`.
    Include,
    /// A library file loaded through `use`.
    Use,
}

impl Mode {
    fn file_kind(self) -> FileKind {
        match self {
            Mode::Main => FileKind::Main,
            Mode::Extend => FileKind::Template,
            Mode::Include => FileKind::Include,
            Mode::Use => FileKind::LibraryFile,
        }
    }
}

/// Where in the tree the parser is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Context {
    Regular,
    /// Inside a mixin body.
    MixinDefinition,
    /// Directly inside a mixin call body.
    MixinCall,
    /// Inside an `if` or `switch` directly inside a mixin call body, where
    /// block fills are illegal.
    MixinCallConditional,
}

impl Context {
    fn is_call(self) -> bool {
        matches!(self, Context::MixinCall | Context::MixinCallConditional)
    }
}

/// Progress through the preamble.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Preamble {
    Start,
    Extend,
    Imports,
    Uses,
    Body,
}

/// Parse a file in the regular context.
///
/// # Errors
///
/// Returns the first lexical or syntax error of the file.
pub fn parse(
    source: Arc<Source>,
    module: &str,
    path: &str,
    mode: Mode,
) -> std::result::Result<File, DiagnosticError> {
    parse_with_context(source, module, path, mode, Context::Regular)
}

/// Parse a file starting in `context`.
///
/// # Errors
///
/// Returns the first lexical or syntax error of the file.
pub fn parse_with_context(
    source: Arc<Source>,
    module: &str,
    path: &str,
    mode: Mode,
    context: Context,
) -> std::result::Result<File, DiagnosticError> {
    debug!(module, path, mode:?; "Parsing file");

    let mut file = File::new(Arc::clone(&source), module, path, mode.file_kind());
    let mut parser = Parser::new(source.text(), mode, context);
    match parser.parse_file(&mut file) {
        Ok(()) => {
            trace!(items = file.scope.len(); "Parsed file");
            Ok(file)
        }
        Err(diag) => {
            parser.lexer.stop();
            debug!(path, error:% = diag; "Parsing failed");
            Err(DiagnosticError::from(diag.or_source(&source)))
        }
    }
}

fn unexpected(token: &PositionedToken, expected: &str) -> Diagnostic {
    if token.token == Token::Eof {
        return Diagnostic::error("unexpected end of input")
            .with_code(ErrorCode::E101)
            .with_label(token.span(), format!("expected {expected}"));
    }
    Diagnostic::error(format!("unexpected {}", token.token))
        .with_code(ErrorCode::E100)
        .with_label(token.span(), format!("expected {expected}"))
}

fn not_allowed_here(token: &PositionedToken, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(message)
        .with_code(ErrorCode::E108)
        .with_label(token.span(), format!("{} not allowed here", token.token))
}

fn not_allowed_in_file(token: &PositionedToken, message: impl Into<String>) -> Diagnostic {
    Diagnostic::error(message)
        .with_code(ErrorCode::E107)
        .with_label(token.span(), format!("{} not allowed in this file", token.token))
}

fn content_fill(item: ScopeItem, position: Position) -> ScopeItem {
    ScopeItem::Block(Block {
        kind: BlockKind::Block,
        name: Id::content_block(),
        body: Scope::new(vec![item]),
        position,
    })
}

fn is_string_literal(code: &str) -> bool {
    let Some(quote @ ('"' | '`')) = code.chars().next() else {
        return false;
    };
    let mut escaped = false;
    for (i, c) in code.char_indices().skip(1) {
        match c {
            _ if escaped => escaped = false,
            '\\' if quote == '"' => escaped = true,
            c if c == quote => return i + 1 == code.len(),
            _ => {}
        }
    }
    false
}

/// The Go type of a literal default value.
fn infer_type(code: &str) -> Option<&'static str> {
    let code = code.trim();
    let digits = code.strip_prefix('-').unwrap_or(code);

    if is_string_literal(code) {
        Some("string")
    } else if code == "true" || code == "false" {
        Some("bool")
    } else if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit() || c == '_') {
        Some("int")
    } else if digits.starts_with(|c: char| c.is_ascii_digit() || c == '.')
        && digits.contains(['.', 'e', 'E'])
        && digits.parse::<f64>().is_ok()
    {
        Some("float64")
    } else {
        None
    }
}

struct Parser<'src> {
    lexer: Lexer<'src>,
    peeked: Option<PositionedToken>,
    /// Position of the last token taken.
    last: Position,
    mode: Mode,
    contexts: Vec<Context>,
    /// The file declares `extend`.
    extending: bool,
    /// Where line 1, column 1 lies, for interpolations parsed on their own.
    origin: Option<Position>,
}

impl<'src> Parser<'src> {
    fn new(text: &'src str, mode: Mode, context: Context) -> Self {
        Self {
            lexer: Lexer::new(text),
            peeked: None,
            last: Position::new(1, 1),
            mode,
            contexts: vec![context],
            extending: false,
            origin: None,
        }
    }

    // =====================================================================
    // Token access
    // =====================================================================

    fn relocate(&self, position: Position) -> Position {
        match self.origin {
            Some(origin) if position.line() == 1 => origin.advance(position.col() - 1),
            Some(origin) => origin,
            None => position,
        }
    }

    fn pull(&mut self) -> Result<PositionedToken> {
        match self.lexer.next() {
            Some(Ok(mut token)) => {
                token.position = self.relocate(token.position);
                Ok(token)
            }
            Some(Err(mut err)) => {
                err.position = self.relocate(err.position);
                Err(Diagnostic::from(err))
            }
            None => Ok(PositionedToken::new(Token::Eof, self.last, 0)),
        }
    }

    fn peek(&mut self) -> Result<&PositionedToken> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.pull()?,
        };
        let token: &PositionedToken = self.peeked.insert(token);
        Ok(token)
    }

    fn next(&mut self) -> Result<PositionedToken> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.pull()?,
        };
        self.last = token.position;
        Ok(token)
    }

    fn check(&mut self, f: impl FnOnce(&Token) -> bool) -> Result<bool> {
        Ok(f(&self.peek()?.token))
    }

    fn eat(&mut self, f: impl FnOnce(&Token) -> bool) -> Result<Option<PositionedToken>> {
        if self.check(f)? {
            self.next().map(Some)
        } else {
            Ok(None)
        }
    }

    fn expect(
        &mut self,
        expected: &str,
        f: impl FnOnce(&Token) -> bool,
    ) -> Result<PositionedToken> {
        let token = self.next()?;
        if f(&token.token) {
            Ok(token)
        } else {
            Err(unexpected(&token, expected))
        }
    }

    fn expect_ident(&mut self, expected: &str) -> Result<(String, Position)> {
        let token = self.next()?;
        match token.token {
            Token::Ident(name) => Ok((name, token.position)),
            _ => Err(unexpected(&token, expected)),
        }
    }

    fn expect_str(&mut self) -> Result<(String, Position)> {
        let token = self.next()?;
        match token.token {
            Token::Str(value) => Ok((value, token.position)),
            _ => Err(unexpected(&token, "a string")),
        }
    }

    fn expect_raw(&mut self) -> Result<String> {
        let token = self.next()?;
        match token.token {
            Token::Raw(raw) => Ok(raw),
            _ => Err(unexpected(&token, "text")),
        }
    }

    fn expect_eol(&mut self) -> Result<()> {
        self.expect("end of line", |t| *t == Token::Eol).map(|_| ())
    }

    /// End a line whose item cannot have nested items.
    fn end_line(&mut self) -> Result<()> {
        self.expect_eol()?;
        let token = self.peek()?;
        if token.token == Token::Indent {
            return Err(Diagnostic::error("unexpected indentation")
                .with_code(ErrorCode::E100)
                .with_label(Span::point(token.position), "nothing may be nested here")
                .with_help("indent only the children of elements, mixins, calls and control flow"));
        }
        Ok(())
    }

    fn expression(&mut self) -> Result<Expression> {
        let token = self.next()?;
        match token.token {
            Token::Expression(code) => parse_expression(&code, token.position),
            _ => Err(unexpected(&token, "an expression")),
        }
    }

    // =====================================================================
    // Contexts
    // =====================================================================

    fn context(&self) -> Context {
        self.contexts.last().copied().unwrap_or(Context::Regular)
    }

    fn in_mixin(&self) -> bool {
        self.contexts.contains(&Context::MixinDefinition)
    }

    /// The context of a conditional's branches.
    fn branch_context(&self) -> Context {
        if self.context().is_call() {
            Context::MixinCallConditional
        } else {
            self.context()
        }
    }

    /// The context of a block fill's body: the nearest non-call context.
    fn fill_context(&self) -> Context {
        self.contexts
            .iter()
            .rev()
            .copied()
            .find(|context| !context.is_call())
            .unwrap_or(Context::Regular)
    }

    fn with_context<T>(
        &mut self,
        context: Context,
        f: impl FnOnce(&mut Self) -> Result<T>,
    ) -> Result<T> {
        self.contexts.push(context);
        let result = f(self);
        self.contexts.pop();
        result
    }

    fn blocks_allowed(&self) -> bool {
        self.in_mixin() || self.extending || matches!(self.mode, Mode::Extend | Mode::Include)
    }

    /// Reject items that are syntactically fine but illegal where they are.
    fn check_context(&self, token: &PositionedToken) -> Result<()> {
        let context = self.context();
        match token.token {
            Token::Mixin if self.in_mixin() => {
                return Err(not_allowed_here(token, "mixin definitions cannot be nested"));
            }
            Token::AndPlaceholder if !self.in_mixin() => {
                return Err(not_allowed_here(
                    token,
                    "`&&` is only allowed inside a mixin definition",
                ));
            }
            Token::Doctype if self.mode == Mode::Extend => {
                return Err(not_allowed_in_file(token, "templates cannot declare a doctype")
                    .with_help("declare the doctype in the file that is compiled"));
            }
            Token::Block | Token::Append | Token::Prepend
                if context == Context::MixinCallConditional =>
            {
                return Err(Diagnostic::error("block fill inside a conditional")
                    .with_code(ErrorCode::E109)
                    .with_label(token.span(), "this fill is conditional")
                    .with_help("move the conditional into the block: `block name` then `if ...`"));
            }
            Token::Block | Token::Append | Token::Prepend if context.is_call() => {}
            Token::Block | Token::Append | Token::Prepend | Token::IfBlock
                if !context.is_call() && !self.blocks_allowed() =>
            {
                return Err(not_allowed_here(
                    token,
                    "blocks are only allowed in templates, included files, extending files and mixin definitions",
                ));
            }
            _ => {}
        }

        if context.is_call()
            && !matches!(
                token.token,
                Token::If
                    | Token::Switch
                    | Token::Code
                    | Token::And
                    | Token::AndPlaceholder
                    | Token::MixinCall
                    | Token::CorgiComment
                    | Token::Block
                    | Token::Append
                    | Token::Prepend
            )
        {
            return Err(not_allowed_here(
                token,
                format!("{} is not allowed in a mixin call body", token.token),
            )
            .with_help("put content into a block fill, e.g. `block _`"));
        }
        Ok(())
    }

    // =====================================================================
    // File and preamble
    // =====================================================================

    fn parse_file(&mut self, file: &mut File) -> Result<()> {
        let mut preamble = Preamble::Start;
        let mut items = Vec::new();

        loop {
            let token = self.peek()?.clone();
            match token.token {
                Token::Eof => break,
                Token::CorgiComment | Token::MachineComment => {
                    items.push(self.parse_item()?);
                }
                Token::Extend => {
                    if self.mode == Mode::Include {
                        return Err(Diagnostic::error("included files cannot extend")
                            .with_code(ErrorCode::E106)
                            .with_label(token.span(), "`extend` in an included file")
                            .with_help("extend from the including file instead"));
                    }
                    if self.mode == Mode::Use {
                        return Err(not_allowed_in_file(&token, "library files cannot extend"));
                    }
                    if preamble > Preamble::Start || !only_comments(&items) {
                        return Err(extend_placement(&token));
                    }
                    file.extend = Some(self.parse_extend()?);
                    self.extending = true;
                    preamble = Preamble::Extend;
                }
                Token::Import => {
                    if preamble > Preamble::Imports {
                        return Err(Diagnostic::error("misplaced `import`")
                            .with_code(ErrorCode::E103)
                            .with_label(token.span(), "`import` after the preamble")
                            .with_help("imports must directly follow `extend`, before any `use`"));
                    }
                    file.imports.push(self.parse_import()?);
                    preamble = Preamble::Imports;
                }
                Token::Use => {
                    if preamble > Preamble::Uses {
                        return Err(Diagnostic::error("misplaced `use`")
                            .with_code(ErrorCode::E104)
                            .with_label(token.span(), "`use` after the preamble")
                            .with_help("uses must directly follow the imports"));
                    }
                    file.uses.push(self.parse_use()?);
                    preamble = Preamble::Uses;
                }
                Token::Func => {
                    if self.mode != Mode::Main {
                        return Err(not_allowed_in_file(
                            &token,
                            "only compiled files may declare `func`",
                        ));
                    }
                    if let Some(func) = &file.func {
                        return Err(Diagnostic::error("duplicate `func`")
                            .with_code(ErrorCode::E115)
                            .with_label(token.span(), "second `func`")
                            .with_secondary_label(func.position, "first declared here"));
                    }
                    file.func = Some(self.parse_func()?);
                    preamble = Preamble::Body;
                }
                _ => {
                    self.check_top_level(&token, file.func.is_some())?;
                    items.push(self.parse_item()?);
                    preamble = Preamble::Body;
                }
            }
        }

        if self.mode == Mode::Main && file.func.is_none() {
            return Err(missing_func(Span::point(self.last)));
        }

        file.scope = Scope::new(items);
        Ok(())
    }

    fn check_top_level(&self, token: &PositionedToken, has_func: bool) -> Result<()> {
        let preamble_like = matches!(
            token.token,
            Token::Code
                | Token::CorgiComment
                | Token::HtmlComment
                | Token::MachineComment
                | Token::Mixin
        );

        if self.mode == Mode::Main && !has_func && !preamble_like {
            return Err(missing_func(token.span()));
        }
        if self.mode == Mode::Use && !preamble_like {
            return Err(not_allowed_in_file(
                token,
                "library files may only contain imports, uses, code, comments and mixin definitions",
            ));
        }
        if self.extending
            && !preamble_like
            && !matches!(
                token.token,
                Token::Block | Token::Append | Token::Prepend | Token::And
            )
        {
            return Err(not_allowed_in_file(
                token,
                "the top level of an extending file may only contain block fills, code, comments and mixin definitions",
            )
            .with_help("wrap the content in the `block` it should fill"));
        }
        Ok(())
    }

    fn parse_extend(&mut self) -> Result<Extend> {
        let head = self.next()?;
        let (path, _) = self.expect_str()?;
        self.end_line()?;
        Ok(Extend {
            path,
            position: head.position,
            file: OnceLock::new(),
        })
    }

    fn parse_import(&mut self) -> Result<Import> {
        let head = self.next()?;
        let mut specs = Vec::new();

        if self.eat(|t| *t == Token::Eol)?.is_some() {
            if self.eat(|t| *t == Token::Indent)?.is_some() {
                while self.eat(|t| *t == Token::Dedent)?.is_none() {
                    specs.push(self.parse_import_spec()?);
                    self.expect_eol()?;
                }
            }
        } else {
            specs.push(self.parse_import_spec()?);
            self.end_line()?;
        }

        Ok(Import {
            specs,
            position: head.position,
        })
    }

    fn parse_import_spec(&mut self) -> Result<ImportSpec> {
        let next = self.peek()?.token.clone();
        let alias = match next {
            Token::Ident(alias) => Some((alias, self.next()?.position)),
            _ => None,
        };
        let (path, path_position) = self.expect_str()?;
        let position = alias.as_ref().map_or(path_position, |(_, position)| *position);
        Ok(ImportSpec {
            alias: alias.map(|(alias, _)| alias),
            path,
            position,
        })
    }

    fn parse_use(&mut self) -> Result<Use> {
        let head = self.next()?;
        let mut specs = Vec::new();

        if self.eat(|t| *t == Token::Eol)?.is_some() {
            if self.eat(|t| *t == Token::Indent)?.is_some() {
                while self.eat(|t| *t == Token::Dedent)?.is_none() {
                    specs.push(self.parse_use_spec()?);
                    self.expect_eol()?;
                }
            }
        } else {
            specs.push(self.parse_use_spec()?);
            self.end_line()?;
        }

        Ok(Use {
            specs,
            position: head.position,
        })
    }

    fn parse_use_spec(&mut self) -> Result<UseSpec> {
        let token = self.peek()?.clone();
        let namespace = match &token.token {
            Token::Ident(name) if name == "_" => UseNamespace::Blank,
            Token::Ident(name) => UseNamespace::Named(Id::new(name)),
            Token::Dot => UseNamespace::Dot,
            _ => UseNamespace::Default,
        };
        if namespace != UseNamespace::Default {
            self.next()?;
        }
        let (path, path_position) = self.expect_str()?;
        let position = if namespace == UseNamespace::Default {
            path_position
        } else {
            token.position
        };
        Ok(UseSpec {
            namespace,
            path,
            position,
            library: OnceLock::new(),
        })
    }

    fn parse_func(&mut self) -> Result<Func> {
        let head = self.next()?;
        let (name, _) = self.expect_ident("a function name")?;
        let params = self.expect_raw()?;
        self.end_line()?;
        Ok(Func {
            name,
            params,
            position: head.position,
        })
    }

    // =====================================================================
    // Scope items
    // =====================================================================

    fn parse_item(&mut self) -> Result<ScopeItem> {
        let token = self.peek()?.clone();
        self.check_context(&token)?;
        trace!(token:% = token.token, position:% = token.position; "Parsing item");

        match token.token {
            Token::Element(_) | Token::Div => self.parse_element(),
            Token::Pipe => self.parse_pipe(),
            Token::Assign | Token::AssignNoEscape => {
                let output = self.parse_output()?;
                self.end_line()?;
                Ok(ScopeItem::Output(output))
            }
            Token::If => self.parse_if(),
            Token::IfBlock => self.parse_if_block(),
            Token::Switch => self.parse_switch(),
            Token::For => self.parse_for(),
            Token::While => self.parse_while(),
            Token::Code => self.parse_code(),
            Token::CorgiComment | Token::HtmlComment | Token::MachineComment => {
                self.parse_comment()
            }
            Token::Mixin => self.parse_mixin(),
            Token::MixinCall => self.parse_mixin_call(),
            Token::And => self.parse_and(),
            Token::AndPlaceholder => {
                self.next()?;
                self.end_line()?;
                Ok(ScopeItem::AndPlaceholder(AndPlaceholder {
                    position: token.position,
                }))
            }
            Token::Include => self.parse_include(),
            Token::Block | Token::Append | Token::Prepend => self.parse_block(),
            Token::Doctype => self.parse_doctype(),
            Token::Filter(_) => self.parse_filter(),
            Token::Extend => Err(extend_placement(&token)),
            Token::Import | Token::Use | Token::Func => Err(not_allowed_here(
                &token,
                format!("{} must be at the top of the file", token.token),
            )),
            Token::Else | Token::ElseIf => Err(unexpected(&token, "a template item")
                .with_help("`else` must directly follow the body of an `if`")),
            Token::Case | Token::Default => Err(unexpected(&token, "a template item")
                .with_help("`case` and `default` must be nested in a `switch`")),
            _ => Err(unexpected(&token, "a template item")),
        }
    }

    /// Parse the end of the current line and the items nested below it.
    fn parse_children(&mut self) -> Result<Vec<ScopeItem>> {
        self.expect_eol()?;
        self.parse_indented()
    }

    fn parse_indented(&mut self) -> Result<Vec<ScopeItem>> {
        let mut items = Vec::new();
        if self.eat(|t| *t == Token::Indent)?.is_none() {
            return Ok(items);
        }
        while self.eat(|t| *t == Token::Dedent)?.is_none() {
            items.push(self.parse_item()?);
        }
        Ok(items)
    }

    /// The verbatim lines of a raw block, after the owning line's `Eol`.
    fn parse_raw_lines(&mut self) -> Result<Vec<(String, Position)>> {
        let mut lines = Vec::new();
        if self.eat(|t| *t == Token::Indent)?.is_none() {
            return Ok(lines);
        }
        loop {
            let token = self.next()?;
            match token.token {
                Token::DotBlockLine(line) => {
                    lines.push((line, token.position));
                    self.expect_eol()?;
                }
                Token::Dedent => return Ok(lines),
                _ => return Err(unexpected(&token, "a line of text")),
            }
        }
    }

    fn parse_element(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let name = match head.token {
            Token::Element(name) => name,
            _ => "div".to_string(),
        };
        let attributes = self.parse_attributes()?;
        let void = self.eat(|t| *t == Token::Void)?.is_some();

        let mut body = Vec::new();
        let token = self.peek()?.clone();
        match token.token {
            Token::DotBlock => {
                body.push(self.parse_dot_block()?);
                return Ok(element(name, attributes, void, body, head.position));
            }
            Token::BlockExpansion => {
                self.next()?;
                body.push(self.parse_item()?);
                return Ok(element(name, attributes, void, body, head.position));
            }
            Token::Assign | Token::AssignNoEscape => {
                body.push(ScopeItem::Output(self.parse_output()?));
            }
            Token::Text(text) => {
                self.next()?;
                body.push(self.inline_text(&text, token.position)?);
            }
            _ => {}
        }

        body.extend(self.parse_children()?);
        Ok(element(name, attributes, void, body, head.position))
    }

    fn parse_attributes(&mut self) -> Result<Vec<AttributeCollection>> {
        let mut collections = Vec::new();
        loop {
            let token = self.peek()?.clone();
            match token.token {
                Token::Class(name) => {
                    self.next()?;
                    collections.push(AttributeCollection::Class {
                        name,
                        position: token.position,
                    });
                }
                Token::Id(name) => {
                    self.next()?;
                    collections.push(AttributeCollection::Id {
                        name,
                        position: token.position,
                    });
                }
                Token::LParen => {
                    self.next()?;
                    collections.push(AttributeCollection::List(self.parse_attribute_list()?));
                }
                _ => return Ok(collections),
            }
        }
    }

    fn parse_attribute_list(&mut self) -> Result<Vec<Attribute>> {
        let mut attributes = Vec::new();
        loop {
            let token = self.next()?;
            match token.token {
                Token::RParen => return Ok(attributes),
                Token::Ident(name) => {
                    let assign =
                        self.eat(|t| matches!(t, Token::Assign | Token::AssignNoEscape))?;
                    let (value, escape) = match assign {
                        Some(assign) => (Some(self.expression()?), assign.token == Token::Assign),
                        None => (None, true),
                    };
                    attributes.push(Attribute {
                        name,
                        value,
                        escape,
                        position: token.position,
                    });
                    self.eat(|t| *t == Token::Comma)?;
                }
                _ => return Err(unexpected(&token, "an attribute name or `)`")),
            }
        }
    }

    fn parse_output(&mut self) -> Result<Output> {
        let head = self.next()?;
        let expression = self.expression()?;
        Ok(Output {
            expression,
            escape: head.token == Token::Assign,
            position: head.position,
        })
    }

    fn parse_pipe(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let token = self.peek()?.clone();
        let line = match token.token {
            Token::Text(text) => {
                self.next()?;
                self.text_line(&text, token.position)?
            }
            _ => TextLine {
                items: Vec::new(),
                position: head.position,
            },
        };
        self.end_line()?;
        Ok(ScopeItem::Text(Text {
            kind: TextKind::Pipe,
            lines: vec![line],
            position: head.position,
        }))
    }

    /// A `.` and the text block below it.
    fn parse_dot_block(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        self.expect_eol()?;
        let mut lines = Vec::new();
        for (line, position) in self.parse_raw_lines()? {
            lines.push(self.text_line(&line, position)?);
        }
        Ok(ScopeItem::Text(Text {
            kind: TextKind::DotBlock,
            lines,
            position: head.position,
        }))
    }

    fn inline_text(&mut self, text: &str, position: Position) -> Result<ScopeItem> {
        let line = self.text_line(text, position)?;
        Ok(ScopeItem::Text(Text {
            kind: TextKind::Inline,
            lines: vec![line],
            position,
        }))
    }

    fn text_line(&mut self, text: &str, position: Position) -> Result<TextLine> {
        let mut items = Vec::new();
        for piece in interpolation::split(text, position)? {
            let item = match piece {
                Piece::Literal(literal) => TextItem::Literal(literal),
                Piece::Expression {
                    code,
                    escape,
                    position,
                } => TextItem::Expression(ExpressionInterpolation {
                    expression: parse_expression(code, position)?,
                    escape,
                    position,
                }),
                Piece::Element { text, position } => {
                    TextItem::Item(self.parse_inline(text, position)?)
                }
                Piece::MixinCall {
                    head,
                    head_position,
                    text,
                    text_position,
                } => {
                    let mut item = self.parse_inline(head, head_position)?;
                    if let ScopeItem::MixinCall(call) = &mut item
                        && !text.is_empty()
                    {
                        let text = self.inline_text(text, text_position)?;
                        call.body.items.push(content_fill(text, text_position));
                    }
                    TextItem::Item(item)
                }
            };
            items.push(item);
        }
        Ok(TextLine { items, position })
    }

    /// Parse an interpolated element or mixin call as a line of its own.
    fn parse_inline(&mut self, text: &str, position: Position) -> Result<ScopeItem> {
        let mut inline = Parser {
            lexer: Lexer::new(text),
            peeked: None,
            last: position,
            mode: self.mode,
            contexts: self.contexts.clone(),
            extending: self.extending,
            origin: Some(position),
        };

        let token = inline.peek()?.clone();
        let item = match token.token {
            Token::Element(_) | Token::Div => inline.parse_element()?,
            Token::MixinCall => inline.parse_mixin_call()?,
            _ => return Err(unexpected(&token, "an element or mixin call")),
        };
        inline.expect("end of interpolation", |t| *t == Token::Eof)?;
        Ok(item)
    }

    fn parse_if(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let condition = self.expression()?;
        let context = self.branch_context();
        let then = self.with_context(context, Self::parse_children)?;

        let mut else_ifs = Vec::new();
        let mut otherwise = None;
        loop {
            let token = self.peek()?.clone();
            match token.token {
                Token::ElseIf => {
                    self.next()?;
                    let condition = self.expression()?;
                    let body = self.with_context(context, Self::parse_children)?;
                    else_ifs.push(ElseIf {
                        condition,
                        body: Scope::new(body),
                        position: token.position,
                    });
                }
                Token::Else => {
                    self.next()?;
                    let body = self.with_context(context, Self::parse_children)?;
                    otherwise = Some(Scope::new(body));
                    break;
                }
                _ => break,
            }
        }

        Ok(ScopeItem::If(If {
            condition,
            then: Scope::new(then),
            else_ifs,
            otherwise,
            position: head.position,
        }))
    }

    fn parse_if_block(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let name = self.optional_block_name()?;
        let then = self.parse_children()?;
        let otherwise = match self.eat(|t| *t == Token::Else)? {
            Some(_) => Some(Scope::new(self.parse_children()?)),
            None => None,
        };
        Ok(ScopeItem::IfBlock(IfBlock {
            name,
            then: Scope::new(then),
            otherwise,
            position: head.position,
        }))
    }

    fn parse_switch(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let comparator = if self.check(|t| matches!(t, Token::Expression(_)))? {
            Some(self.expression()?)
        } else {
            None
        };
        self.expect_eol()?;

        let context = self.branch_context();
        let mut cases = Vec::new();
        if self.eat(|t| *t == Token::Indent)?.is_some() {
            loop {
                let token = self.next()?;
                let expression = match token.token {
                    Token::Dedent => break,
                    Token::Case => Some(self.expression()?),
                    Token::Default => None,
                    _ => return Err(unexpected(&token, "`case` or `default`")),
                };
                let body = self.with_context(context, Self::parse_children)?;
                cases.push(Case {
                    expression,
                    body: Scope::new(body),
                    position: token.position,
                });
            }
        }

        Ok(ScopeItem::Switch(Switch {
            comparator,
            cases,
            position: head.position,
        }))
    }

    fn parse_for(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let clause = self.expect_raw()?;
        let body = self.parse_children()?;
        Ok(ScopeItem::For(For {
            clause,
            body: Scope::new(body),
            position: head.position,
        }))
    }

    fn parse_while(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let condition = self.expression()?;
        let body = self.parse_children()?;
        Ok(ScopeItem::While(While {
            condition,
            body: Scope::new(body),
            position: head.position,
        }))
    }

    fn parse_code(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let token = self.peek()?.clone();
        let lines = match token.token {
            Token::CodeLine(code) => {
                self.next()?;
                self.end_line()?;
                vec![code]
            }
            _ => {
                self.expect_eol()?;
                raw_text(self.parse_raw_lines()?)
            }
        };
        Ok(ScopeItem::Code(Code {
            lines,
            position: head.position,
        }))
    }

    fn parse_comment(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;

        if head.token == Token::MachineComment {
            let raw = self.expect_raw()?;
            self.end_line()?;
            let (directive, args) = raw.split_once([' ', '\t']).unwrap_or((raw.as_str(), ""));
            let (namespace, directive) = directive.split_once(':').unwrap_or(("", directive));
            let comment = MachineComment {
                namespace: namespace.to_string(),
                directive: directive.to_string(),
                args: args.trim().to_string(),
            };
            return Ok(ScopeItem::Comment(Comment {
                kind: CommentKind::Machine(comment),
                lines: vec![raw],
                position: head.position,
            }));
        }

        let kind = if head.token == Token::HtmlComment {
            CommentKind::Html
        } else {
            CommentKind::Corgi
        };
        let token = self.peek()?.clone();
        let lines = match token.token {
            Token::Text(text) => {
                self.next()?;
                self.end_line()?;
                vec![text]
            }
            _ => {
                self.expect_eol()?;
                let mut lines = raw_text(self.parse_raw_lines()?);
                if kind == CommentKind::Html {
                    strip_comment_end(&mut lines);
                }
                lines
            }
        };

        Ok(ScopeItem::Comment(Comment {
            kind,
            lines,
            position: head.position,
        }))
    }

    fn parse_mixin(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let (name, _) = self.expect_ident("a mixin name")?;
        let params = if self.eat(|t| *t == Token::LParen)?.is_some() {
            self.parse_params()?
        } else {
            Vec::new()
        };
        let body = self.with_context(Context::MixinDefinition, Self::parse_children)?;

        debug!(mixin = name.as_str(), params = params.len(); "Parsed mixin definition");
        Ok(ScopeItem::Mixin(Arc::new(Mixin {
            name: Id::new(&name),
            params,
            body: Scope::new(body),
            position: head.position,
            info: OnceLock::new(),
        })))
    }

    fn parse_params(&mut self) -> Result<Vec<MixinParam>> {
        let mut params: Vec<MixinParam> = Vec::new();
        loop {
            let token = self.next()?;
            let name = match token.token {
                Token::RParen => return Ok(params),
                Token::Ident(name) => name,
                _ => return Err(unexpected(&token, "a parameter name or `)`")),
            };
            let id = Id::new(&name);
            if let Some(first) = params.iter().find(|param| param.name == id) {
                return Err(Diagnostic::error(format!("duplicate parameter `{name}`"))
                    .with_code(ErrorCode::E114)
                    .with_label(Span::at(token.position, token.len), "declared again here")
                    .with_secondary_label(first.position, "first declared here"));
            }

            let next = self.peek()?.token.clone();
            let declared = match next {
                Token::GoType(ty) => {
                    self.next()?;
                    Some(ty)
                }
                _ => None,
            };
            let default = match self.eat(|t| *t == Token::Assign)? {
                Some(_) => {
                    let value = self.next()?;
                    match value.token {
                        Token::Expression(code) => {
                            Some((parse_expression(&code, value.position)?, code, value.position))
                        }
                        _ => return Err(unexpected(&value, "a default value")),
                    }
                }
                None => None,
            };

            let (ty, type_inferred) = match (declared, &default) {
                (Some(ty), _) => (ty, false),
                (None, Some((_, code, position))) => match infer_type(code) {
                    Some(ty) => (ty.to_string(), true),
                    None => {
                        return Err(Diagnostic::error(format!(
                            "cannot infer the type of parameter `{name}`"
                        ))
                        .with_code(ErrorCode::E114)
                        .with_label(
                            Span::at(*position, code.chars().count()),
                            "not a literal",
                        )
                        .with_help("declare the type explicitly")
                        .with_example(format!("{name} string = {code}")));
                    }
                },
                (None, None) => {
                    return Err(Diagnostic::error(format!(
                        "parameter `{name}` has neither a type nor a default"
                    ))
                    .with_code(ErrorCode::E114)
                    .with_label(Span::at(token.position, token.len), "missing type")
                    .with_example(format!("{name} string")));
                }
            };

            params.push(MixinParam {
                name: id,
                ty,
                type_inferred,
                default: default.map(|(expression, _, _)| expression),
                position: token.position,
            });
            self.eat(|t| *t == Token::Comma)?;
        }
    }

    fn parse_mixin_call(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let (first, _) = self.expect_ident("a mixin name")?;
        let (namespace, name) = if self.eat(|t| *t == Token::Dot)?.is_some() {
            let (name, _) = self.expect_ident("a mixin name")?;
            (Some(Id::new(&first)), Id::new(&name))
        } else {
            (None, Id::new(&first))
        };
        let args = if self.eat(|t| *t == Token::LParen)?.is_some() {
            self.parse_args()?
        } else {
            Vec::new()
        };

        let mut body = Vec::new();
        let fill_context = self.fill_context();
        let token = self.peek()?.clone();
        match token.token {
            Token::DotBlock => {
                let text = self.with_context(fill_context, Self::parse_dot_block)?;
                body.push(content_fill(text, token.position));
                return Ok(call(namespace, name, args, body, head.position));
            }
            Token::BlockExpansion => {
                self.next()?;
                let item = self.with_context(fill_context, Self::parse_item)?;
                body.push(content_fill(item, token.position));
                return Ok(call(namespace, name, args, body, head.position));
            }
            Token::Text(text) => {
                self.next()?;
                let text =
                    self.with_context(fill_context, |p| p.inline_text(&text, token.position))?;
                body.push(content_fill(text, token.position));
            }
            _ => {}
        }

        body.extend(self.with_context(Context::MixinCall, Self::parse_children)?);
        Ok(call(namespace, name, args, body, head.position))
    }

    fn parse_args(&mut self) -> Result<Vec<MixinArg>> {
        let mut args = Vec::new();
        loop {
            let token = self.next()?;
            match token.token {
                Token::RParen => return Ok(args),
                Token::Ident(name) => {
                    self.expect("`=`", |t| *t == Token::Assign)?;
                    let value = self.expression()?;
                    args.push(MixinArg {
                        name: Id::new(&name),
                        value,
                        position: token.position,
                    });
                    self.eat(|t| *t == Token::Comma)?;
                }
                _ => return Err(unexpected(&token, "an argument name or `)`")),
            }
        }
    }

    fn parse_and(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let attributes = self.parse_attributes()?;
        self.end_line()?;
        Ok(ScopeItem::And(And {
            attributes,
            position: head.position,
        }))
    }

    fn parse_include(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let (path, _) = self.expect_str()?;
        self.end_line()?;
        Ok(ScopeItem::Include(Include {
            path,
            target: OnceLock::new(),
            position: head.position,
        }))
    }

    fn optional_block_name(&mut self) -> Result<Id> {
        let next = self.peek()?.token.clone();
        Ok(match next {
            Token::Ident(name) => {
                self.next()?;
                Id::new(&name)
            }
            _ => Id::content_block(),
        })
    }

    fn parse_block(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let kind = match head.token {
            Token::Append => BlockKind::Append,
            Token::Prepend => BlockKind::Prepend,
            _ => BlockKind::Block,
        };
        let name = self.optional_block_name()?;
        let context = self.fill_context();
        let body = self.with_context(context, Self::parse_children)?;
        Ok(ScopeItem::Block(Block {
            kind,
            name,
            body: Scope::new(body),
            position: head.position,
        }))
    }

    fn parse_doctype(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let value = self.expect_raw()?;
        self.end_line()?;
        Ok(ScopeItem::Doctype(Doctype {
            value,
            position: head.position,
        }))
    }

    fn parse_filter(&mut self) -> Result<ScopeItem> {
        let head = self.next()?;
        let Token::Filter(name) = head.token else {
            return Err(unexpected(&head, "a filter"));
        };
        let next = self.peek()?.token.clone();
        let args = match next {
            Token::Raw(args) => {
                self.next()?;
                args
            }
            _ => String::new(),
        };
        self.expect_eol()?;
        let lines = raw_text(self.parse_raw_lines()?);
        Ok(ScopeItem::Filter(Filter {
            name,
            args,
            lines,
            position: head.position,
        }))
    }
}

fn element(
    name: String,
    attributes: Vec<AttributeCollection>,
    void: bool,
    body: Vec<ScopeItem>,
    position: Position,
) -> ScopeItem {
    ScopeItem::Element(Element {
        name,
        attributes,
        void,
        body: Scope::new(body),
        position,
    })
}

fn call(
    namespace: Option<Id>,
    name: Id,
    args: Vec<MixinArg>,
    body: Vec<ScopeItem>,
    position: Position,
) -> ScopeItem {
    ScopeItem::MixinCall(MixinCall {
        namespace,
        name,
        args,
        body: Scope::new(body),
        position,
        resolved: OnceLock::new(),
    })
}

fn raw_text(lines: Vec<(String, Position)>) -> Vec<String> {
    lines.into_iter().map(|(line, _)| line).collect()
}

/// Remove the `-->` closing a multi-line HTML comment.
fn strip_comment_end(lines: &mut Vec<String>) {
    let Some(last) = lines.last_mut() else {
        return;
    };
    if let Some(stripped) = last.trim_end().strip_suffix("-->") {
        *last = stripped.trim_end().to_string();
        if last.is_empty() {
            lines.pop();
        }
    }
}

fn only_comments(items: &[ScopeItem]) -> bool {
    items.iter().all(|item| matches!(item, ScopeItem::Comment(_)))
}

fn extend_placement(token: &PositionedToken) -> Diagnostic {
    Diagnostic::error("misplaced `extend`")
        .with_code(ErrorCode::E102)
        .with_label(token.span(), "`extend` must come first")
        .with_help("move `extend` to the top of the file, only comments may precede it")
}

fn missing_func(span: Span) -> Diagnostic {
    Diagnostic::error("missing `func`")
        .with_code(ErrorCode::E105)
        .with_label(span, "expected `func` before any markup")
        .with_help("declare the generated function after the preamble")
        .with_example("func Page(title string)")
}
