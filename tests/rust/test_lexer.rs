//! Lexer tests — tokenization, indentation, error handling

use kestrel_lang::ast::Position;
use kestrel_lang::lexer::tokens::TokenType;
use kestrel_lang::lexer::Lexer;

fn lex(source: &str) -> Vec<(TokenType, String)> {
    let tokens = Lexer::new(source, "test.kst").tokenize().unwrap();
    tokens.into_iter()
        .filter(|t| !matches!(t.token_type, TokenType::Eof))
        .map(|t| (t.token_type, t.value))
        .collect()
}

fn lex_types(source: &str) -> Vec<TokenType> {
    lex(source).into_iter().map(|(tt, _)| tt).collect()
}

fn lex_err(source: &str) -> String {
    Lexer::new(source, "test.kst").tokenize().unwrap_err().message
}

// ── Basic tokens ────────────────────────────────────────────

#[test]
fn identifier() {
    let tokens = lex("hello");
    assert_eq!(tokens.len(), 2); // Identifier plus the implied final newline
    assert_eq!(tokens[0], (TokenType::Identifier, "hello".into()));
    assert_eq!(tokens[1].0, TokenType::Newline);
}

#[test]
fn integer_literal() {
    let tokens = lex("42");
    assert_eq!(tokens[0], (TokenType::Integer, "42".into()));
}

#[test]
fn prefixed_integer_literals() {
    assert_eq!(lex("0x1F")[0], (TokenType::Integer, "0x1F".into()));
    assert_eq!(lex("0XfF")[0], (TokenType::Integer, "0xfF".into()));
    assert_eq!(lex("0o17")[0], (TokenType::Integer, "0o17".into()));
    assert_eq!(lex("0b101")[0], (TokenType::Integer, "0b101".into()));
}

#[test]
fn float_literals() {
    assert_eq!(lex("3.14")[0], (TokenType::Float, "3.14".into()));
    assert_eq!(lex(".5")[0], (TokenType::Float, ".5".into()));
    assert_eq!(lex("1e3")[0], (TokenType::Float, "1e3".into()));
    assert_eq!(lex("2.5E-2")[0], (TokenType::Float, "2.5E-2".into()));
}

#[test]
fn zero_is_not_octal() {
    assert_eq!(lex("0")[0], (TokenType::Integer, "0".into()));
    assert_eq!(lex("000")[0], (TokenType::Integer, "000".into()));
}

#[test]
fn string_literal() {
    let tokens = lex("\"hello world\"");
    assert_eq!(tokens[0], (TokenType::StringLit, "hello world".into()));
    let tokens = lex("'single'");
    assert_eq!(tokens[0], (TokenType::StringLit, "single".into()));
}

#[test]
fn string_escape_sequences() {
    let tokens = lex("\"line1\\nline2\\ttab\\\\backslash\"");
    assert_eq!(tokens[0].1, "line1\nline2\ttab\\backslash");
}

#[test]
fn string_hex_and_unicode_escapes() {
    assert_eq!(lex("\"\\x41\"")[0].1, "A");
    assert_eq!(lex("\"\\u00e9\"")[0].1, "é");
    assert_eq!(lex("\"\\U0001F600\"")[0].1, "\u{1F600}");
}

#[test]
fn raw_string_keeps_backslashes() {
    assert_eq!(lex("r\"a\\nb\"")[0], (TokenType::StringLit, "a\\nb".into()));
}

#[test]
fn triple_quoted_string_spans_lines() {
    let tokens = lex("\"\"\"one\ntwo \"quoted\" end\"\"\"");
    assert_eq!(tokens[0], (TokenType::StringLit, "one\ntwo \"quoted\" end".into()));
}

// ── Operators ───────────────────────────────────────────────

#[test]
fn arithmetic_operators() {
    let types = lex_types("+ - * / // % **");
    assert_eq!(
        &types[..7],
        &[
            TokenType::Plus,
            TokenType::Minus,
            TokenType::Star,
            TokenType::Slash,
            TokenType::SlashSlash,
            TokenType::Percent,
            TokenType::StarStar,
        ]
    );
}

#[test]
fn comparison_operators() {
    let types = lex_types("== != < <= > >=");
    assert_eq!(types[0], TokenType::Equals);
    assert_eq!(types[1], TokenType::NotEquals);
    assert_eq!(types[2], TokenType::LessThan);
    assert_eq!(types[3], TokenType::LessEqual);
    assert_eq!(types[4], TokenType::GreaterThan);
    assert_eq!(types[5], TokenType::GreaterEqual);
}

#[test]
fn bitwise_operators() {
    let types = lex_types("& | ^ ~ << >>");
    assert_eq!(
        &types[..6],
        &[
            TokenType::Ampersand,
            TokenType::Pipe,
            TokenType::Caret,
            TokenType::Tilde,
            TokenType::LtLt,
            TokenType::GtGt,
        ]
    );
}

#[test]
fn assignment_vs_equality() {
    let types = lex_types("x = 1\ny == 2");
    assert_eq!(types[0], TokenType::Identifier); // x
    assert_eq!(types[1], TokenType::Assign);     // =
    assert_eq!(types[2], TokenType::Integer);    // 1
    assert_eq!(types[3], TokenType::Newline);
    assert_eq!(types[4], TokenType::Identifier); // y
    assert_eq!(types[5], TokenType::Equals);     // ==
    assert_eq!(types[6], TokenType::Integer);    // 2
}

#[test]
fn augmented_assignment_operators() {
    let types = lex_types("x += 1; x //= 2; x <<= 3; x |= 4");
    assert!(types.contains(&TokenType::PlusEq));
    assert!(types.contains(&TokenType::SlashSlashEq));
    assert!(types.contains(&TokenType::LtLtEq));
    assert!(types.contains(&TokenType::PipeEq));
    assert!(types.iter().filter(|t| t.is_augmented_assign()).count() == 4);
}

#[test]
fn brackets_and_parens() {
    let types = lex_types("()[]{}");
    assert_eq!(
        &types[..6],
        &[
            TokenType::LParen,
            TokenType::RParen,
            TokenType::LBracket,
            TokenType::RBracket,
            TokenType::LBrace,
            TokenType::RBrace,
        ]
    );
}

#[test]
fn dot_between_identifiers() {
    let types = lex_types("a.b");
    assert_eq!(&types[..3], &[TokenType::Identifier, TokenType::Dot, TokenType::Identifier]);
}

// ── Keywords ────────────────────────────────────────────────

#[test]
fn keywords() {
    let types = lex_types("and break continue def elif else for if in lambda load not or pass return while");
    assert_eq!(
        &types[..16],
        &[
            TokenType::And,
            TokenType::Break,
            TokenType::Continue,
            TokenType::Def,
            TokenType::Elif,
            TokenType::Else,
            TokenType::For,
            TokenType::If,
            TokenType::In,
            TokenType::Lambda,
            TokenType::Load,
            TokenType::Not,
            TokenType::Or,
            TokenType::Pass,
            TokenType::Return,
            TokenType::While,
        ]
    );
}

#[test]
fn constants_are_identifiers() {
    let types = lex_types("True False None");
    assert_eq!(&types[..3], &[TokenType::Identifier; 3]);
}

#[test]
fn reserved_word_rejected() {
    assert_eq!(lex_err("class = 1"), "keyword class is reserved");
    assert_eq!(lex_err("x = yield"), "keyword yield is reserved");
}

// ── Layout ──────────────────────────────────────────────────

#[test]
fn indentation_tokens() {
    let types = lex_types("def f():\n  pass\n");
    assert_eq!(
        types,
        vec![
            TokenType::Def,
            TokenType::Identifier,
            TokenType::LParen,
            TokenType::RParen,
            TokenType::Colon,
            TokenType::Newline,
            TokenType::Indent,
            TokenType::Pass,
            TokenType::Newline,
            TokenType::Dedent,
        ]
    );
}

#[test]
fn nested_dedents() {
    let types = lex_types("if a:\n  if b:\n    x\ny\n");
    let dedents = types.iter().filter(|t| **t == TokenType::Dedent).count();
    let indents = types.iter().filter(|t| **t == TokenType::Indent).count();
    assert_eq!(indents, 2);
    assert_eq!(dedents, 2);
    assert_eq!(types[types.len() - 2], TokenType::Identifier); // y
}

#[test]
fn newlines_inside_brackets_are_ignored() {
    let types = lex_types("[1,\n  2]\n");
    assert_eq!(
        types,
        vec![
            TokenType::LBracket,
            TokenType::Integer,
            TokenType::Comma,
            TokenType::Integer,
            TokenType::RBracket,
            TokenType::Newline,
        ]
    );
}

#[test]
fn blank_and_comment_lines_are_skipped() {
    let types = lex_types("x # trailing\n\n   # indented comment\ny\n");
    assert_eq!(
        types,
        vec![
            TokenType::Identifier,
            TokenType::Newline,
            TokenType::Identifier,
            TokenType::Newline,
        ]
    );
}

#[test]
fn backslash_continues_line() {
    let types = lex_types("x = 1 + \\\n  2\n");
    assert_eq!(types.iter().filter(|t| **t == TokenType::Newline).count(), 1);
    assert!(!types.contains(&TokenType::Indent));
}

#[test]
fn token_positions() {
    let tokens = Lexer::new("x = 1\n\nfoo(y)", "test.kst").tokenize().unwrap();
    assert_eq!(tokens[0].pos, Position::new(1, 1));
    assert_eq!(tokens[2].pos, Position::new(1, 5));
    let foo = tokens.iter().find(|t| t.value == "foo").unwrap();
    assert_eq!(foo.pos, Position::new(3, 1));
    let lparen = tokens.iter().find(|t| t.token_type == TokenType::LParen).unwrap();
    assert_eq!(lparen.pos, Position::new(3, 4));
}

// ── Errors ──────────────────────────────────────────────────

#[test]
fn unterminated_string() {
    assert_eq!(lex_err("\"abc"), "unexpected EOF in string");
    assert_eq!(lex_err("\"a\nb\""), "unexpected newline in string");
}

#[test]
fn invalid_escape() {
    assert_eq!(lex_err("\"\\q\""), "invalid escape sequence \\q");
    assert!(lex_err("\"\\x4\"").starts_with("truncated escape sequence"));
}

#[test]
fn obsolete_octal_literal() {
    assert_eq!(lex_err("0755"), "obsolete form of octal literal; use 0o755");
}

#[test]
fn bad_numeric_literals() {
    assert_eq!(lex_err("0x"), "invalid base-16 integer literal");
    assert_eq!(lex_err("12abc"), "invalid character 'a' in numeric literal");
}

#[test]
fn tab_indentation_rejected() {
    assert_eq!(lex_err("if x:\n\ty\n"), "tab characters are not allowed in indentation");
}

#[test]
fn inconsistent_dedent() {
    assert_eq!(
        lex_err("if x:\n    y\n  z\n"),
        "unindent does not match any outer indentation level"
    );
}

#[test]
fn unbalanced_brackets() {
    assert_eq!(lex_err(")"), "unexpected \")\"");
    assert_eq!(lex_err("f(1,\n"), "unexpected end of file inside brackets");
}

#[test]
fn unexpected_character() {
    assert_eq!(lex_err("x = $"), "unexpected input character '$'");
}

#[test]
fn error_display_includes_location() {
    let err = Lexer::new("x = 1\ny = $", "conf.kst").tokenize().unwrap_err();
    assert_eq!(err.to_string(), "conf.kst:2:5: unexpected input character '$'");
}
