use std::sync::Arc;

use corgi_core::{
    Position, Source,
    ast::{ChainLinkKind, Expression, FileKind, ScopeItem},
    identifier::Id,
};
use corgi_parser::{ErrorCode, Mode, lexer::tokenize, parse, parse_expression, tokens::Token};

fn source(name: &str, text: &str) -> Arc<Source> {
    Arc::new(Source::new(name, text))
}

#[test]
fn test_page_with_layout() {
    let text = "\
extend \"layout.corgi\"
import \"strings\"
use \"example.com/app/ui\"
func Profile(user User)

block title
  | #{user.Name}

block content
  +ui.Card(title=strings.Title(user.Name))
    block _
      p.bio= user.Bio ?? \"nothing yet\"
      if len(user.Links) > 0
        ul
          for _, link := range user.Links
            li: a(href=link.URL)= link.Title
";

    let file = parse(
        source("profile.corgi", text),
        "example.com/app",
        "pages/profile.corgi",
        Mode::Main,
    )
    .expect("Failed to parse");

    assert_eq!(file.kind, FileKind::Main);
    assert_eq!(file.key().library().path, "pages");
    assert_eq!(file.extend.as_ref().map(|e| e.path.as_str()), Some("layout.corgi"));
    assert_eq!(file.imports.len(), 1);
    assert_eq!(file.uses.len(), 1);
    assert_eq!(file.scope.len(), 2);

    // Second block: content
    let ScopeItem::Block(content) = &file.scope.items[1] else {
        panic!("Expected block");
    };
    assert_eq!(content.name, Id::new("content"));
    assert_eq!(content.position, Position::new(9, 1));

    let ScopeItem::MixinCall(card) = &content.body.items[0] else {
        panic!("Expected mixin call");
    };
    assert_eq!(card.to_string(), "ui.Card");
    assert!(card.resolved.get().is_none());

    let fill = card.fills().next().expect("content fill");
    let ScopeItem::Element(bio) = &fill.body.items[0] else {
        panic!("Expected element");
    };
    let ScopeItem::Output(output) = &bio.body.items[0] else {
        panic!("Expected output");
    };
    match &output.expression {
        Expression::Chain(chain) => {
            assert_eq!(chain.root, "user");
            assert!(chain.default.is_some());
        }
        other => panic!("Expected chain, got {other:?}"),
    }
}

#[test]
fn test_library_file() {
    let text = "\
// Buttons shared by every page.
import \"fmt\"

mixin Button(label string, kind = \"primary\")
  button(class=fmt.Sprint(\"btn-\", kind))&attributes
    &&
    block
      = label

mixin icon(name string)
  i(class=name)/
";

    let file = parse(
        source("button.corgil", text),
        "example.com/app",
        "ui/button.corgil",
        Mode::Use,
    );

    // `&attributes` is not corgi syntax, so the line does not lex.
    let err = file.expect_err("expected a lex error");
    assert_eq!(err.diagnostics()[0].code(), Some(ErrorCode::E002));

    let fixed = text.replace("&attributes", "");
    let file = parse(
        source("button.corgil", &fixed),
        "example.com/app",
        "ui/button.corgil",
        Mode::Use,
    )
    .expect("Failed to parse");

    assert_eq!(file.kind, FileKind::LibraryFile);
    let mixins: Vec<_> = file.top_level_mixins().map(|m| (m.name, m.name.is_exported())).collect();
    assert_eq!(
        mixins,
        vec![(Id::new("Button"), true), (Id::new("icon"), false)]
    );
}

#[test]
fn test_diagnostic_display() {
    let err = parse(
        source("page.corgi", "p Hello"),
        "example.com/app",
        "page.corgi",
        Mode::Main,
    )
    .expect_err("missing func");

    assert_eq!(err.diagnostics().len(), 1);
    assert!(err.diagnostics()[0].to_string().starts_with("error[E105]"));
}

#[test]
fn test_tokenize() {
    let tokens = tokenize("div\n  p Hi\n").expect("Failed to tokenize");
    let kinds: Vec<_> = tokens.into_iter().map(|t| t.token).collect();
    assert_eq!(
        kinds,
        vec![
            Token::Element("div".to_string()),
            Token::Eol,
            Token::Indent,
            Token::Element("p".to_string()),
            Token::Text("Hi".to_string()),
            Token::Eol,
            Token::Dedent,
            Token::Eof,
        ]
    );
}

#[test]
fn test_parse_expression() {
    let expression =
        parse_expression("order?.Items[0]?.(Gift).Note", Position::new(3, 7)).expect("chain");
    let Expression::Chain(chain) = &expression else {
        panic!("Expected chain");
    };
    assert_eq!(chain.position, Position::new(3, 7));
    assert!(
        chain
            .links
            .iter()
            .any(|link| matches!(link.kind, ChainLinkKind::TypeAssertion(_)))
    );
    assert!(expression.may_be_unset());

    let go = parse_expression("  a + b", Position::new(1, 1)).expect("go");
    assert_eq!(go.position(), Position::new(1, 3));
    assert!(matches!(go, Expression::Go(_)));
}
