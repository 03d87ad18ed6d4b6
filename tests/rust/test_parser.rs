//! Parser tests — syntax tree construction, positions, syntax errors

use kestrel_lang::ast::*;
use kestrel_lang::parser::{parse_expr, parse_file};

fn parse(source: &str) -> File {
    parse_file("test.kst", source).unwrap()
}

fn parse_err(source: &str) -> String {
    parse_file("test.kst", source).unwrap_err().message
}

fn expr(source: &str) -> Expr {
    parse_expr("test.kst", source).unwrap()
}

fn int(e: &Expr) -> i64 {
    match e {
        Expr::Literal { value: Literal::Int(n), .. } => n.try_into().unwrap(),
        other => panic!("expected int literal, got {:?}", other),
    }
}

// ── Statements ──────────────────────────────────────────────

#[test]
fn assignment() {
    let f = parse("x = 1\n");
    assert_eq!(f.stmts.len(), 1);
    match &f.stmts[0] {
        Stmt::Assign { target: Expr::Ident(id), value, pos } => {
            assert_eq!(id.name, "x");
            assert_eq!(int(value), 1);
            assert_eq!(*pos, Position::new(1, 3)); // the '=' token
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn tuple_assignment() {
    let f = parse("a, b = 1, 2\n");
    match &f.stmts[0] {
        Stmt::Assign {
            target: Expr::Tuple { elements, .. },
            value: Expr::Tuple { elements: values, .. },
            ..
        } => {
            assert_eq!(elements.len(), 2);
            assert_eq!(values.len(), 2);
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn augmented_assignment() {
    let f = parse("x.y += 2\n");
    match &f.stmts[0] {
        Stmt::AugAssign { op, target: Expr::Dot { name, .. }, .. } => {
            assert_eq!(*op, BinaryOp::Add);
            assert_eq!(name, "y");
        }
        other => panic!("unexpected {:?}", other),
    }
}

#[test]
fn semicolon_separated_statements() {
    let f = parse("a = 1; b = 2; pass\n");
    assert_eq!(f.stmts.len(), 3);
    assert!(matches!(f.stmts[2], Stmt::Pass { .. }));
}

#[test]
fn def_with_all_parameter_kinds() {
    let f = parse("def f(a, b=2, *args, c, d=4, **kw):\n    return a\n");
    let Stmt::Def { name, function, .. } = &f.stmts[0] else {
        panic!("expected def");
    };
    assert_eq!(name.name, "f");
    assert_eq!(function.name, "f");
    assert_eq!(function.pos, Position::new(1, 5));
    assert_eq!(function.params.len(), 6);
    assert!(matches!(function.params[0], Param::Required(_)));
    assert!(matches!(function.params[1], Param::Optional { .. }));
    assert!(matches!(function.params[2], Param::Star { name: Some(_), .. }));
    assert!(matches!(function.params[3], Param::Required(_)));
    assert!(matches!(function.params[4], Param::Optional { .. }));
    assert!(matches!(function.params[5], Param::StarStar(_)));
}

#[test]
fn bare_star_separates_keyword_only() {
    let f = parse("def f(a, *, b):\n    pass\n");
    let Stmt::Def { function, .. } = &f.stmts[0] else {
        panic!("expected def");
    };
    assert!(matches!(function.params[1], Param::Star { name: None, .. }));
}

#[test]
fn docstring() {
    let f = parse("def f():\n    \"Says hello.\"\n    return 1\n");
    let Stmt::Def { function, .. } = &f.stmts[0] else {
        panic!("expected def");
    };
    assert_eq!(function.doc(), Some("Says hello."));

    let f = parse("def g():\n    return 1\n");
    let Stmt::Def { function, .. } = &f.stmts[0] else {
        panic!("expected def");
    };
    assert_eq!(function.doc(), None);
}

#[test]
fn if_elif_else_nests() {
    let f = parse("if a:\n  x = 1\nelif b:\n  x = 2\nelse:\n  x = 3\n");
    let Stmt::If { then_body, else_body, .. } = &f.stmts[0] else {
        panic!("expected if");
    };
    assert_eq!(then_body.len(), 1);
    assert_eq!(else_body.len(), 1);
    let Stmt::If { else_body: inner_else, .. } = &else_body[0] else {
        panic!("elif should become a nested if");
    };
    assert_eq!(inner_else.len(), 1);
}

#[test]
fn for_loop_with_tuple_variables() {
    let f = parse("for k, v in d.items():\n  pass\n");
    let Stmt::For { vars, iterable, body, .. } = &f.stmts[0] else {
        panic!("expected for");
    };
    assert!(matches!(vars, Expr::Tuple { elements, .. } if elements.len() == 2));
    assert!(matches!(iterable, Expr::Call { .. }));
    assert_eq!(body.len(), 1);
}

#[test]
fn while_break_continue() {
    let f = parse("while x:\n  if y:\n    break\n  continue\n");
    let Stmt::While { body, .. } = &f.stmts[0] else {
        panic!("expected while");
    };
    assert!(matches!(body[1], Stmt::Continue { .. }));
}

#[test]
fn simple_suite_on_same_line() {
    let f = parse("def f(): return 1\n");
    let Stmt::Def { function, .. } = &f.stmts[0] else {
        panic!("expected def");
    };
    assert!(matches!(function.body[0], Stmt::Return { value: Some(_), .. }));
}

#[test]
fn load_statement() {
    let f = parse("load(\"lib.kst\", \"a\", b2=\"b\")\n");
    let Stmt::Load { module, bindings, .. } = &f.stmts[0] else {
        panic!("expected load");
    };
    assert_eq!(module, "lib.kst");
    assert_eq!(bindings.len(), 2);
    assert_eq!(bindings[0].local.name, "a");
    assert_eq!(bindings[0].name, "a");
    assert_eq!(bindings[1].local.name, "b2");
    assert_eq!(bindings[1].name, "b");
    assert_eq!(f.load_modules(), vec!["lib.kst"]);
}

// ── Expressions ─────────────────────────────────────────────

#[test]
fn precedence() {
    // 1 + 2 * 3 parses as 1 + (2 * 3)
    let e = expr("1 + 2 * 3");
    let Expr::Binary { op, left, right, .. } = &e else {
        panic!("expected binary");
    };
    assert_eq!(*op, BinaryOp::Add);
    assert_eq!(int(left), 1);
    assert!(matches!(**right, Expr::Binary { op: BinaryOp::Mul, .. }));
}

#[test]
fn binary_position_is_operator() {
    let e = expr("ab + cd");
    assert_eq!(e.pos(), Position::new(1, 4));
}

#[test]
fn left_associative_subtraction() {
    let e = expr("a - b - c");
    let Expr::Binary { left, .. } = &e else {
        panic!("expected binary");
    };
    assert!(matches!(**left, Expr::Binary { op: BinaryOp::Sub, .. }));
}

#[test]
fn not_in_and_boolean_operators() {
    let e = expr("a not in b or c and not d");
    let Expr::Binary { op: BinaryOp::Or, left, right, .. } = &e else {
        panic!("expected or");
    };
    assert!(matches!(**left, Expr::Binary { op: BinaryOp::NotIn, .. }));
    let Expr::Binary { op: BinaryOp::And, right: not_d, .. } = &**right else {
        panic!("expected and");
    };
    assert!(matches!(**not_d, Expr::Unary { op: UnaryOp::Not, .. }));
}

#[test]
fn conditional_expression() {
    let e = expr("a if b else c");
    assert!(matches!(e, Expr::Conditional { .. }));
}

#[test]
fn call_arguments() {
    let e = expr("f(1, x=2, *rest, **kw)");
    let Expr::Call { args, pos, .. } = &e else {
        panic!("expected call");
    };
    assert_eq!(*pos, Position::new(1, 2)); // the '(' token
    assert!(matches!(args[0], Argument::Positional(_)));
    assert!(matches!(&args[1], Argument::Named { name, .. } if name == "x"));
    assert!(matches!(args[2], Argument::Star(_)));
    assert!(matches!(args[3], Argument::StarStar(_)));
}

#[test]
fn dot_index_and_slice() {
    let e = expr("a.b[1]");
    let Expr::Index { object, .. } = &e else {
        panic!("expected index");
    };
    assert!(matches!(&**object, Expr::Dot { name, .. } if name == "b"));

    let e = expr("s[1:2]");
    assert!(matches!(e, Expr::Slice { start: Some(_), stop: Some(_), step: None, .. }));
    let e = expr("s[::-1]");
    assert!(matches!(e, Expr::Slice { start: None, stop: None, step: Some(_), .. }));
}

#[test]
fn collection_literals() {
    assert!(matches!(expr("[]"), Expr::List { elements, .. } if elements.is_empty()));
    assert!(matches!(expr("()"), Expr::Tuple { elements, .. } if elements.is_empty()));
    assert!(matches!(expr("(1,)"), Expr::Tuple { elements, .. } if elements.len() == 1));
    assert!(matches!(expr("(1)"), Expr::Literal { .. }));
    assert!(matches!(expr("{1: 2, 3: 4,}"), Expr::Dict { entries, .. } if entries.len() == 2));
}

#[test]
fn comprehensions() {
    let e = expr("[x * 2 for x in xs if x > 1]");
    let Expr::Comprehension(c) = &e else {
        panic!("expected comprehension");
    };
    assert!(matches!(c.body, ComprehensionBody::List(_)));
    assert_eq!(c.clauses.len(), 2);
    assert!(matches!(c.clauses[0], Clause::For { .. }));
    assert!(matches!(c.clauses[1], Clause::If { .. }));

    let e = expr("{k: v for k, v in pairs}");
    let Expr::Comprehension(c) = &e else {
        panic!("expected comprehension");
    };
    assert!(matches!(c.body, ComprehensionBody::Dict(_)));
}

#[test]
fn lambda_body_is_return() {
    let e = expr("lambda x, y=1: x + y");
    let Expr::Lambda(f) = &e else {
        panic!("expected lambda");
    };
    assert_eq!(f.name, "lambda");
    assert_eq!(f.params.len(), 2);
    assert!(matches!(f.body[0], Stmt::Return { value: Some(Expr::Binary { .. }), .. }));
}

#[test]
fn big_and_prefixed_integers() {
    let e = expr("0xff");
    assert_eq!(int(&e), 255);
    let e = expr("123456789012345678901234567890");
    let Expr::Literal { value: Literal::Int(n), .. } = e else {
        panic!("expected int");
    };
    assert_eq!(n.to_string(), "123456789012345678901234567890");
}

#[test]
fn unary_operators() {
    assert!(matches!(expr("-x"), Expr::Unary { op: UnaryOp::Minus, .. }));
    assert!(matches!(expr("~x"), Expr::Unary { op: UnaryOp::Invert, .. }));
    assert!(matches!(expr("+x"), Expr::Unary { op: UnaryOp::Plus, .. }));
}

// ── Errors ──────────────────────────────────────────────────

#[test]
fn comparisons_do_not_chain() {
    assert_eq!(parse_err("x = a < b < c\n"), "< does not associate with < (use parens)");
}

#[test]
fn conditional_requires_else() {
    assert_eq!(parse_err("x = a if b\n"), "conditional expression without else clause");
}

#[test]
fn invalid_assignment_targets() {
    assert_eq!(parse_err("1 = 2\n"), "invalid assignment target");
    assert_eq!(parse_err("f() += 1\n"), "invalid target for augmented assignment");
}

#[test]
fn load_errors() {
    assert_eq!(parse_err("load(\"m\")\n"), "load statement must import at least 1 symbol");
    assert_eq!(
        parse_err("load(\"m\", \"_x\")\n"),
        "load: names with leading underscores are not exported: _x"
    );
    assert_eq!(parse_err("load(\"m\", \"a-b\")\n"), "load: not an identifier: a-b");
}

#[test]
fn missing_operand() {
    assert_eq!(parse_err("x = \n"), "got newline, want primary expression");
}

#[test]
fn syntax_error_display() {
    let err = parse_file("conf.kst", "x = )\n").unwrap_err();
    assert!(err.to_string().starts_with("conf.kst:1:5: "), "{}", err);
}

#[test]
fn trailing_input_after_expression() {
    let err = parse_expr("test.kst", "1 2").unwrap_err();
    assert_eq!(err.message, "got number 2, want end of expression");
}
