//! Tests for the parser: modes, contexts, the preamble and every scope item.

use std::sync::Arc;

use corgi_core::{
    Position, Source,
    ast::{
        AttributeCollection, CommentKind, Expression, File, ScopeItem, TextItem, TextKind,
        TextLine, UseNamespace,
    },
    identifier::Id,
};

use crate::{
    error::{DiagnosticError, ErrorCode},
    parser::{Context, Mode, parse, parse_with_context},
};

fn lines(lines: &[&str]) -> String {
    lines.join("\n")
}

fn try_parse(src: &str, mode: Mode) -> Result<File, DiagnosticError> {
    parse(
        Arc::new(Source::new("page.corgi", src)),
        "example.com/app",
        "page.corgi",
        mode,
    )
}

fn parse_ok(src: &str, mode: Mode) -> File {
    try_parse(src, mode).unwrap_or_else(|err| panic!("expected `{src}` to parse, got: {err}"))
}

fn error_code(src: &str, mode: Mode) -> ErrorCode {
    let err = try_parse(src, mode).expect_err("expected a parse error");
    err.diagnostics()[0].code().expect("error code")
}

fn literal(line: &TextLine) -> String {
    line.items
        .iter()
        .filter_map(|item| match item {
            TextItem::Literal(text) => Some(text.as_str()),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Preamble and modes
// =========================================================================

#[test]
fn test_minimal_main_file() {
    let file = parse_ok(&lines(&["func Page(title string)", "p Hello"]), Mode::Main);

    let func = file.func.as_ref().expect("func");
    assert_eq!(func.name, "Page");
    assert_eq!(func.params, "title string");
    assert_eq!(file.scope.len(), 1);

    let ScopeItem::Element(p) = &file.scope.items[0] else {
        panic!("expected element");
    };
    assert_eq!(p.name, "p");
    assert_eq!(p.position, Position::new(2, 1));
    let ScopeItem::Text(text) = &p.body.items[0] else {
        panic!("expected text");
    };
    assert_eq!(text.kind, TextKind::Inline);
    assert_eq!(literal(&text.lines[0]), "Hello");
}

#[test]
fn test_missing_func() {
    assert_eq!(error_code("p Hello", Mode::Main), ErrorCode::E105);
    assert_eq!(
        error_code(&lines(&["- x := 1", "mixin A()", "  p x"]), Mode::Main),
        ErrorCode::E105
    );
    assert_eq!(error_code("", Mode::Main), ErrorCode::E105);
}

#[test]
fn test_code_comments_and_mixins_may_precede_func() {
    let src = lines(&[
        "// header",
        "- const limit = 3",
        "mixin Item(n int)",
        "  li= n",
        "func List()",
        "ul",
    ]);
    let file = parse_ok(&src, Mode::Main);
    assert_eq!(file.scope.len(), 4);
    assert_eq!(file.top_level_mixins().count(), 1);
}

#[test]
fn test_duplicate_func() {
    let src = lines(&["func A()", "func B()"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E115);
}

#[test]
fn test_func_outside_main() {
    assert_eq!(error_code("func A()", Mode::Extend), ErrorCode::E107);
    assert_eq!(error_code("func A()", Mode::Use), ErrorCode::E107);
}

#[test]
fn test_preamble() {
    let src = lines(&[
        "// the page",
        "extend \"base.corgi\"",
        "import \"strings\"",
        "import",
        "  h \"html\"",
        "  \"fmt\"",
        "use \"example.com/ui\"",
        "use",
        "  icons \"example.com/icons\"",
        "  . \"example.com/std\"",
        "  _ \"example.com/side\"",
        "func Page()",
    ]);
    let file = parse_ok(&src, Mode::Main);

    assert_eq!(file.extend.as_ref().map(|e| e.path.as_str()), Some("base.corgi"));
    assert_eq!(file.imports.len(), 2);
    assert_eq!(file.imports[1].specs.len(), 2);
    assert_eq!(file.imports[1].specs[0].alias.as_deref(), Some("h"));
    assert_eq!(file.imports[1].specs[1].path, "fmt");

    let specs: Vec<_> = file.use_specs().collect();
    assert_eq!(specs.len(), 4);
    assert_eq!(specs[0].namespace, UseNamespace::Default);
    assert_eq!(specs[0].namespace_id(), Some(Id::new("ui")));
    assert_eq!(specs[1].namespace, UseNamespace::Named(Id::new("icons")));
    assert_eq!(specs[2].namespace, UseNamespace::Dot);
    assert_eq!(specs[3].namespace, UseNamespace::Blank);
}

#[test]
fn test_preamble_placement_errors() {
    let extend_late = lines(&["import \"a\"", "extend \"b.corgi\"", "func P()"]);
    assert_eq!(error_code(&extend_late, Mode::Main), ErrorCode::E102);

    let import_late = lines(&["use \"a\"", "import \"b\"", "func P()"]);
    assert_eq!(error_code(&import_late, Mode::Main), ErrorCode::E103);

    let use_late = lines(&["func P()", "use \"a\""]);
    assert_eq!(error_code(&use_late, Mode::Main), ErrorCode::E104);

    let nested_import = lines(&["func P()", "div", "  import \"a\""]);
    assert_eq!(error_code(&nested_import, Mode::Main), ErrorCode::E108);
}

#[test]
fn test_include_cannot_extend() {
    assert_eq!(error_code("extend \"base.corgi\"", Mode::Include), ErrorCode::E106);
}

#[test]
fn test_library_files_hold_definitions_only() {
    let src = lines(&[
        "import \"strings\"",
        "use \"example.com/icons\"",
        "- var sizes = []string{\"s\", \"m\"}",
        "mixin Badge(text string)",
        "  span.badge= strings.ToUpper(text)",
    ]);
    let file = parse_ok(&src, Mode::Use);
    assert!(file.func.is_none());
    assert_eq!(file.top_level_mixins().count(), 1);

    assert_eq!(error_code("p stray", Mode::Use), ErrorCode::E107);
    assert_eq!(error_code("extend \"x.corgi\"", Mode::Use), ErrorCode::E107);
}

#[test]
fn test_extending_file_top_level() {
    let src = lines(&[
        "extend \"base.corgi\"",
        "func Page()",
        "&.dark",
        "block content",
        "  p hi",
        "append scripts",
        "  script(src=\"/app.js\")",
    ]);
    let file = parse_ok(&src, Mode::Main);
    assert_eq!(file.scope.len(), 3);

    let stray = lines(&["extend \"base.corgi\"", "func Page()", "p hi"]);
    assert_eq!(error_code(&stray, Mode::Main), ErrorCode::E107);
}

#[test]
fn test_template_cannot_declare_doctype() {
    assert_eq!(error_code("doctype html", Mode::Extend), ErrorCode::E107);

    let file = parse_ok(&lines(&["func Page()", "doctype html"]), Mode::Main);
    let ScopeItem::Doctype(doctype) = &file.scope.items[0] else {
        panic!("expected doctype");
    };
    assert_eq!(doctype.value, "html");
}

// =========================================================================
// Blocks and contexts
// =========================================================================

#[test]
fn test_blocks_outside_templates_and_mixins() {
    assert_eq!(
        error_code(&lines(&["func Page()", "block content"]), Mode::Main),
        ErrorCode::E108
    );
    assert_eq!(
        error_code(&lines(&["func Page()", "if block title"]), Mode::Main),
        ErrorCode::E108
    );
}

#[test]
fn test_template_blocks() {
    let src = lines(&[
        "html",
        "  body",
        "    block",
        "      p default",
        "    if block footer",
        "      footer",
        "        block footer",
        "    else",
        "      p none",
    ]);
    let file = parse_ok(&src, Mode::Extend);

    let ScopeItem::Element(html) = &file.scope.items[0] else {
        panic!("expected html");
    };
    let ScopeItem::Element(body) = &html.body.items[0] else {
        panic!("expected body");
    };
    let ScopeItem::Block(block) = &body.body.items[0] else {
        panic!("expected block");
    };
    assert_eq!(block.name, Id::content_block());
    let ScopeItem::IfBlock(if_block) = &body.body.items[1] else {
        panic!("expected if block");
    };
    assert_eq!(if_block.name, Id::new("footer"));
    assert!(if_block.otherwise.is_some());
}

#[test]
fn test_and_placeholder_only_in_mixins() {
    assert_eq!(
        error_code(&lines(&["div", "  &&"]), Mode::Include),
        ErrorCode::E108
    );

    let src = lines(&["mixin Box()", "  div", "    &&", "    block"]);
    let file = parse_ok(&src, Mode::Use);
    assert_eq!(file.top_level_mixins().count(), 1);
}

#[test]
fn test_mixins_cannot_nest() {
    let src = lines(&["mixin A()", "  mixin B()", "    p x"]);
    assert_eq!(error_code(&src, Mode::Use), ErrorCode::E108);
}

#[test]
fn test_mixin_call_body_restrictions() {
    let src = lines(&["func Page()", "+Card()", "  p text"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E108);

    let src = lines(&["func Page()", "+Card()", "  for _, x := range xs", "    p x"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E108);
}

#[test]
fn test_block_fill_in_conditional() {
    let src = lines(&[
        "func Page()",
        "+Card()",
        "  if ok",
        "    block title",
        "      p x",
    ]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E109);

    let src = lines(&[
        "func Page()",
        "+Card()",
        "  switch",
        "    case ok",
        "      append title",
    ]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E109);
}

#[test]
fn test_fill_body_is_regular_again() {
    let src = lines(&[
        "func Page()",
        "+Card()",
        "  block title",
        "    if ok",
        "      p x",
        "  if wide",
        "    &.wide",
        "    +Icon()",
        "      block _",
        "        p nested",
    ]);
    let file = parse_ok(&src, Mode::Main);

    let ScopeItem::MixinCall(call) = &file.scope.items[0] else {
        panic!("expected call");
    };
    assert_eq!(call.fills().count(), 1);
    assert_eq!(call.body.len(), 2);
}

#[test]
fn test_fill_in_mixin_definition_keeps_mixin_context() {
    let src = lines(&[
        "mixin Wrapper()",
        "  +Card()",
        "    block _",
        "      div",
        "        &&",
        "      block inner",
    ]);
    parse_ok(&src, Mode::Use);
}

#[test]
fn test_parse_with_context() {
    let source = Arc::new(Source::new("fill.corgi", "p x"));
    let err = parse_with_context(
        source,
        "example.com/app",
        "fill.corgi",
        Mode::Include,
        Context::MixinCall,
    )
    .expect_err("elements are not allowed in call bodies");
    assert_eq!(err.diagnostics()[0].code(), Some(ErrorCode::E108));

    let source = Arc::new(Source::new("fill.corgi", "&.x"));
    parse_with_context(
        source,
        "example.com/app",
        "fill.corgi",
        Mode::Include,
        Context::MixinCall,
    )
    .expect("`&` is allowed in call bodies");
}

// =========================================================================
// Mixins
// =========================================================================

#[test]
fn test_mixin_params() {
    let src = lines(&[
        "mixin Button(label string, kind = \"primary\", size = 3, ratio = 1.5, on bool = false)",
        "  button= label",
    ]);
    let file = parse_ok(&src, Mode::Use);
    let mixin = file.top_level_mixins().next().expect("mixin");

    assert_eq!(mixin.name, Id::new("Button"));
    let types: Vec<_> = mixin
        .params
        .iter()
        .map(|param| (param.ty.as_str(), param.type_inferred, param.is_required()))
        .collect();
    assert_eq!(
        types,
        vec![
            ("string", false, true),
            ("string", true, false),
            ("int", true, false),
            ("float64", true, false),
            ("bool", false, false),
        ]
    );
    assert_eq!(mixin.params[0].position, Position::new(1, 14));
}

#[test]
fn test_invalid_mixin_params() {
    assert_eq!(error_code("mixin A(x)", Mode::Use), ErrorCode::E114);
    assert_eq!(error_code("mixin A(x = y)", Mode::Use), ErrorCode::E114);
    assert_eq!(
        error_code("mixin A(x string, x int)", Mode::Use),
        ErrorCode::E114
    );
}

#[test]
fn test_mixin_call() {
    let src = lines(&[
        "func Page()",
        "+ui.Card(title=\"Hi\", n=count + 1) Some text",
        "  &.extra",
        "  block footer",
        "    p bye",
    ]);
    let file = parse_ok(&src, Mode::Main);
    let ScopeItem::MixinCall(call) = &file.scope.items[0] else {
        panic!("expected call");
    };

    assert_eq!(call.namespace, Some(Id::new("ui")));
    assert_eq!(call.name, Id::new("Card"));
    assert_eq!(call.to_string(), "ui.Card");
    assert_eq!(call.args.len(), 2);
    assert_eq!(call.args[1].name, Id::new("n"));
    assert_eq!(call.args[1].value.to_string(), "count + 1");

    let fills: Vec<_> = call.fills().map(|fill| fill.name).collect();
    assert_eq!(fills, vec![Id::content_block(), Id::new("footer")]);
    assert!(matches!(call.body.items[1], ScopeItem::And(_)));
}

#[test]
fn test_call_shorthand_fills() {
    let src = lines(&[
        "func Page()",
        "+Button(): span.icon",
        "+Note.",
        "  first line",
        "  second line",
    ]);
    let file = parse_ok(&src, Mode::Main);

    let ScopeItem::MixinCall(button) = &file.scope.items[0] else {
        panic!("expected call");
    };
    let fill = button.fills().next().expect("fill");
    assert_eq!(fill.name, Id::content_block());
    assert!(matches!(fill.body.items[0], ScopeItem::Element(ref el) if el.name == "span"));

    let ScopeItem::MixinCall(note) = &file.scope.items[1] else {
        panic!("expected call");
    };
    let fill = note.fills().next().expect("fill");
    let ScopeItem::Text(text) = &fill.body.items[0] else {
        panic!("expected text");
    };
    assert_eq!(text.kind, TextKind::DotBlock);
    assert_eq!(text.lines.len(), 2);
}

// =========================================================================
// Scope items
// =========================================================================

#[test]
fn test_control_flow() {
    let src = lines(&[
        "func P()",
        "if a",
        "  p a",
        "else if b",
        "  p b",
        "else",
        "  p c",
        "switch kind",
        "  case \"x\"",
        "    p x",
        "  default",
        "    p d",
        "for _, v := range vs",
        "  p= v",
        "while more()",
        "  p more",
    ]);
    let file = parse_ok(&src, Mode::Main);
    assert_eq!(file.scope.len(), 4);

    let ScopeItem::If(if_) = &file.scope.items[0] else {
        panic!("expected if");
    };
    assert_eq!(if_.condition.to_string(), "a");
    assert_eq!(if_.else_ifs.len(), 1);
    assert!(if_.otherwise.is_some());

    let ScopeItem::Switch(switch) = &file.scope.items[1] else {
        panic!("expected switch");
    };
    assert!(switch.comparator.is_some());
    assert_eq!(switch.cases.len(), 2);
    assert!(switch.cases[1].expression.is_none());

    let ScopeItem::For(for_) = &file.scope.items[2] else {
        panic!("expected for");
    };
    assert_eq!(for_.clause, "_, v := range vs");
    assert!(matches!(file.scope.items[3], ScopeItem::While(_)));
}

#[test]
fn test_switch_only_holds_cases() {
    let src = lines(&["func P()", "switch", "  p x"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E100);
}

#[test]
fn test_else_without_if() {
    let src = lines(&["func P()", "else", "  p x"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E100);
}

#[test]
fn test_code() {
    let src = lines(&["func P()", "- x := 1", "-", "  y := 2", "  z := 3"]);
    let file = parse_ok(&src, Mode::Main);

    let code: Vec<_> = file
        .scope
        .iter()
        .map(|item| match item {
            ScopeItem::Code(code) => code.lines.clone(),
            other => panic!("expected code, got {}", other.kind_name()),
        })
        .collect();
    assert_eq!(code, vec![vec!["x := 1"], vec!["y := 2", "z := 3"]]);
}

#[test]
fn test_comments() {
    let src = lines(&[
        "func P()",
        "// note",
        "//",
        "  hidden",
        "  lines",
        "<!-- visible -->",
        "<!--",
        "  multi",
        "  line -->",
        "//- corgi:keep-whitespace on",
    ]);
    let file = parse_ok(&src, Mode::Main);

    let comments: Vec<_> = file
        .scope
        .iter()
        .map(|item| match item {
            ScopeItem::Comment(comment) => comment,
            other => panic!("expected comment, got {}", other.kind_name()),
        })
        .collect();
    assert_eq!(comments.len(), 5);
    assert_eq!(comments[0].lines, vec!["note"]);
    assert_eq!(comments[1].lines, vec!["hidden", "lines"]);
    assert_eq!(comments[2].kind, CommentKind::Html);
    assert_eq!(comments[2].lines, vec!["visible"]);
    assert_eq!(comments[3].lines, vec!["multi", "line"]);

    let CommentKind::Machine(machine) = &comments[4].kind else {
        panic!("expected machine comment");
    };
    assert_eq!(machine.namespace, "corgi");
    assert_eq!(machine.directive, "keep-whitespace");
    assert_eq!(machine.args, "on");
}

#[test]
fn test_filter() {
    let src = lines(&["func P()", ":markdown --safe", "  # Title", "  text"]);
    let file = parse_ok(&src, Mode::Main);
    let ScopeItem::Filter(filter) = &file.scope.items[0] else {
        panic!("expected filter");
    };
    assert_eq!(filter.name, "markdown");
    assert_eq!(filter.args, "--safe");
    assert_eq!(filter.lines, vec!["# Title", "text"]);
}

#[test]
fn test_elements() {
    let src = lines(&[
        "func P()",
        "a.btn#go(href=url, disabled, title!=raw) Go",
        "img(src=s)/",
        "p.",
        "  Hello #{name}",
        "  second",
        "p: span= x",
        ".card",
    ]);
    let file = parse_ok(&src, Mode::Main);

    let ScopeItem::Element(a) = &file.scope.items[0] else {
        panic!("expected a");
    };
    assert_eq!(a.attributes.len(), 3);
    assert!(matches!(&a.attributes[0], AttributeCollection::Class { name, .. } if name == "btn"));
    assert!(matches!(&a.attributes[1], AttributeCollection::Id { name, .. } if name == "go"));
    let AttributeCollection::List(list) = &a.attributes[2] else {
        panic!("expected attribute list");
    };
    assert_eq!(list.len(), 3);
    assert!(list[0].value.is_some() && list[0].escape);
    assert!(list[1].value.is_none());
    assert!(!list[2].escape);

    let ScopeItem::Element(img) = &file.scope.items[1] else {
        panic!("expected img");
    };
    assert!(img.void && img.is_void());

    let ScopeItem::Element(p) = &file.scope.items[2] else {
        panic!("expected p");
    };
    let ScopeItem::Text(text) = &p.body.items[0] else {
        panic!("expected text");
    };
    assert_eq!(text.kind, TextKind::DotBlock);
    assert_eq!(literal(&text.lines[0]), "Hello ");
    assert!(matches!(text.lines[0].items[1], TextItem::Expression(_)));
    assert_eq!(literal(&text.lines[1]), "second");

    let ScopeItem::Element(outer) = &file.scope.items[3] else {
        panic!("expected p");
    };
    let ScopeItem::Element(span) = &outer.body.items[0] else {
        panic!("expected span");
    };
    assert!(matches!(span.body.items[0], ScopeItem::Output(ref out) if out.escape));

    let ScopeItem::Element(div) = &file.scope.items[4] else {
        panic!("expected div");
    };
    assert_eq!(div.name, "div");
}

#[test]
fn test_pipe_output_and_include() {
    let src = lines(&[
        "func P()",
        "| Hello #{x}",
        "!= raw",
        "include \"partial.corgi\"",
    ]);
    let file = parse_ok(&src, Mode::Main);

    let ScopeItem::Text(text) = &file.scope.items[0] else {
        panic!("expected text");
    };
    assert_eq!(text.kind, TextKind::Pipe);
    assert_eq!(text.lines[0].items.len(), 2);

    assert!(matches!(file.scope.items[1], ScopeItem::Output(ref out) if !out.escape));
    let ScopeItem::Include(include) = &file.scope.items[2] else {
        panic!("expected include");
    };
    assert_eq!(include.path, "partial.corgi");
}

#[test]
fn test_nothing_nested_under_leaf_items() {
    let src = lines(&["func P()", "include \"a.corgi\"", "  p x"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E100);
}

#[test]
fn test_text_interpolation_items() {
    let src = lines(&["func P()", "p See #[a(href=u) docs] and #+Link(to=\"/\")[home]."]);
    let file = parse_ok(&src, Mode::Main);

    let ScopeItem::Element(p) = &file.scope.items[0] else {
        panic!("expected p");
    };
    let ScopeItem::Text(text) = &p.body.items[0] else {
        panic!("expected text");
    };
    let items = &text.lines[0].items;
    assert_eq!(items.len(), 5);

    let TextItem::Item(ScopeItem::Element(a)) = &items[1] else {
        panic!("expected inline element");
    };
    assert_eq!(a.name, "a");
    assert_eq!(a.position, Position::new(2, 9));

    let TextItem::Item(ScopeItem::MixinCall(link)) = &items[3] else {
        panic!("expected inline call");
    };
    assert_eq!(link.name, Id::new("Link"));
    assert_eq!(link.position, Position::new(2, 30));
    assert_eq!(link.fills().count(), 1);
}

// =========================================================================
// Errors
// =========================================================================

#[test]
fn test_expression_errors() {
    assert_eq!(
        error_code(&lines(&["func P()", "p= a ?b"]), Mode::Main),
        ErrorCode::E112
    );
    assert_eq!(
        error_code(&lines(&["func P()", "if x? ? a : b", "  p"]), Mode::Main),
        ErrorCode::E110
    );
    assert_eq!(
        error_code(&lines(&["func P()", "p #{open"]), Mode::Main),
        ErrorCode::E113
    );
}

#[test]
fn test_nil_check_chain_in_output() {
    let file = parse_ok(&lines(&["func P()", "p= user?.Name"]), Mode::Main);
    let ScopeItem::Element(p) = &file.scope.items[0] else {
        panic!("expected p");
    };
    let ScopeItem::Output(output) = &p.body.items[0] else {
        panic!("expected output");
    };
    assert!(matches!(output.expression, Expression::Chain(_)));
    assert!(output.expression.may_be_unset());
}

#[test]
fn test_errors_carry_source() {
    let err = try_parse("p Hello", Mode::Main).expect_err("missing func");
    let diag = &err.diagnostics()[0];
    assert_eq!(diag.source().map(|source| source.name()), Some("page.corgi"));
    assert!(diag.primary_label().is_some());
}

#[test]
fn test_lex_errors_surface() {
    let src = lines(&["func P()", "div", " \tp"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E003);

    let src = lines(&["func P()", "p(title=\"open)"]);
    assert_eq!(error_code(&src, Mode::Main), ErrorCode::E001);
}

#[test]
fn test_unexpected_end_of_input() {
    let err = try_parse(&lines(&["func P()", "+Card("]), Mode::Main).expect_err("unclosed call");
    let code = err.diagnostics()[0].code();
    assert!(matches!(code, Some(ErrorCode::E002 | ErrorCode::E006)), "{code:?}");
}
