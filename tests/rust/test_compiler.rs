//! Compiler tests — disassembly, plus folding, function numbering

use kestrel_lang::ast::Position;
use kestrel_lang::parser::{parse_expr, parse_file};
use kestrel_lang::resolve::{resolve_expr, resolve_file, FileOptions};
use kestrel_lang::vm::{compile_expr, compile_file, Program};

fn compile(source: &str) -> Program {
    let mut file = parse_file("test.kst", source).unwrap();
    resolve_file(&mut file, &FileOptions::default(), &|n| n == "x", &|n| n == "len").unwrap();
    compile_file(&file, &FileOptions::default())
}

fn disasm_expr(source: &str) -> String {
    let mut expr = parse_expr("test.kst", source).unwrap();
    let scope = resolve_expr(&mut expr, &FileOptions::default(), &|n| n == "x", &|_| false).unwrap();
    let program = compile_expr(&expr, &scope);
    program.toplevel().disassemble(&program)
}

fn disasm_fn(program: &Program, name: &str) -> String {
    let f = program.functions.iter().find(|f| f.name == name).unwrap();
    f.disassemble(program)
}

// ── Plus folding ────────────────────────────────────────────

#[test]
fn string_literals_fold_into_one_constant() {
    assert_eq!(disasm_expr(r#""a" + "b" + "c" + "d""#), r#"CONSTANT "abcd"; RETURN"#);
}

#[test]
fn list_literals_fold_into_one_list() {
    assert_eq!(
        disasm_expr("[1] + [2] + [3]"),
        "CONSTANT 1; CONSTANT 2; CONSTANT 3; MAKE_LIST 3; RETURN"
    );
}

#[test]
fn tuple_runs_fold_around_non_literal() {
    assert_eq!(
        disasm_expr("() + (1,) + x + (2, 3)"),
        "CONSTANT 1; MAKE_TUPLE 1; PREDECLARED x; PLUS; CONSTANT 2; CONSTANT 3; MAKE_TUPLE 2; PLUS; RETURN"
    );
}

#[test]
fn mixed_literal_kinds_do_not_fold() {
    assert_eq!(
        disasm_expr(r#""a" + [1]"#),
        r#"CONSTANT "a"; CONSTANT 1; MAKE_LIST 1; PLUS; RETURN"#
    );
}

#[test]
fn plain_addition_of_numbers_is_not_folded() {
    assert_eq!(disasm_expr("1 + 2"), "CONSTANT 1; CONSTANT 2; PLUS; RETURN");
}

// ── Expressions ─────────────────────────────────────────────

#[test]
fn or_uses_jump_if_true() {
    assert_eq!(
        disasm_expr("x or 2"),
        "PREDECLARED x; DUP; JMP_IF_TRUE 5; POP; CONSTANT 2; RETURN"
    );
}

#[test]
fn conditional_expression() {
    assert_eq!(
        disasm_expr("1 if x else 2"),
        "PREDECLARED x; JMP_IF_FALSE 4; CONSTANT 1; JMP 5; CONSTANT 2; RETURN"
    );
}

#[test]
fn attribute_and_index() {
    assert_eq!(disasm_expr("x.field"), "PREDECLARED x; ATTR field; RETURN");
    assert_eq!(disasm_expr("x[0]"), "PREDECLARED x; CONSTANT 0; INDEX; RETURN");
}

#[test]
fn slice_fills_missing_parts_with_none() {
    assert_eq!(
        disasm_expr("x[1:]"),
        "PREDECLARED x; CONSTANT 1; NONE; NONE; SLICE; RETURN"
    );
}

#[test]
fn call_with_named_argument() {
    assert_eq!(
        disasm_expr("x(1, k=2)"),
        r#"PREDECLARED x; CONSTANT 1; CONSTANT "k"; CONSTANT 2; CALL 1 1; RETURN"#
    );
}

#[test]
fn call_with_star_arguments() {
    assert_eq!(
        disasm_expr("x(*x, **x)"),
        "PREDECLARED x; PREDECLARED x; PREDECLARED x; CALL_VAR_KW 0 0; RETURN"
    );
}

#[test]
fn dict_literal_uses_unique_insertion() {
    assert_eq!(
        disasm_expr("{1: 2}"),
        "MAKE_DICT; DUP; CONSTANT 1; CONSTANT 2; SET_DICT_UNIQ; RETURN"
    );
}

#[test]
fn unary_operators() {
    assert_eq!(disasm_expr("-x"), "PREDECLARED x; UMINUS; RETURN");
    assert_eq!(disasm_expr("not x"), "PREDECLARED x; NOT; RETURN");
}

// ── Statements ──────────────────────────────────────────────

#[test]
fn global_assignment() {
    let p = compile("y = 1\n");
    assert_eq!(
        p.toplevel().disassemble(&p),
        "CONSTANT 1; SET_GLOBAL y; NONE; RETURN"
    );
}

#[test]
fn function_definition_and_body() {
    let p = compile("def f(a, b = 2):\n    return a + b\n");
    assert_eq!(
        p.toplevel().disassemble(&p),
        "CONSTANT 2; MAKE_TUPLE 1; MAKE_FUNC f; SET_GLOBAL f; NONE; RETURN"
    );
    assert_eq!(
        disasm_fn(&p, "f"),
        "LOCAL a; LOCAL b; PLUS; RETURN; NONE; RETURN"
    );
    let f = &p.functions[1];
    assert_eq!(f.num_params, 2);
    assert_eq!(f.default_mask, vec![false, true]);
}

#[test]
fn augmented_assignment_uses_inplace_add() {
    let p = compile("def f(a):\n    a += 1\n");
    assert_eq!(
        disasm_fn(&p, "f"),
        "LOCAL a; CONSTANT 1; INPLACE_ADD; SET_LOCAL a; NONE; RETURN"
    );
}

#[test]
fn if_else_jumps() {
    let p = compile("def f(a):\n    if a:\n        return 1\n    else:\n        return 2\n");
    assert_eq!(
        disasm_fn(&p, "f"),
        "LOCAL a; JMP_IF_FALSE 5; CONSTANT 1; RETURN; JMP 7; CONSTANT 2; RETURN; NONE; RETURN"
    );
}

#[test]
fn for_loop_iterates_with_iter_ops() {
    let p = compile("def f(xs):\n    for v in xs:\n        pass\n");
    assert_eq!(
        disasm_fn(&p, "f"),
        "LOCAL xs; ITER_PUSH; ITER_JMP 5; SET_LOCAL v; JMP 2; ITER_POP; NONE; RETURN"
    );
}

#[test]
fn universal_names_are_looked_up_by_name() {
    let p = compile("n = len(x)\n");
    assert_eq!(
        p.toplevel().disassemble(&p),
        "UNIVERSAL len; PREDECLARED x; CALL 1 0; SET_GLOBAL n; NONE; RETURN"
    );
}

#[test]
fn closures_use_cells_and_free_variables() {
    let p = compile("def outer():\n    a = 1\n    def inner():\n        return a\n    return inner\n");
    assert_eq!(disasm_fn(&p, "inner"), "FREE a; RETURN; NONE; RETURN");
    assert!(disasm_fn(&p, "outer").starts_with("CONSTANT 1; SET_LOCAL_CELL a"));
}

#[test]
fn load_statement_records_module() {
    let mut file = parse_file("test.kst", "load(\"lib.kst\", \"a\", b = \"c\")\n").unwrap();
    resolve_file(&mut file, &FileOptions::default(), &|_| false, &|_| false).unwrap();
    let p = compile_file(&file, &FileOptions::default());
    assert_eq!(p.load_modules(), vec!["lib.kst"]);
    assert!(p.toplevel().disassemble(&p).contains("LOAD 2"));
}

// ── Program structure ───────────────────────────────────────

#[test]
fn functions_numbered_in_definition_order() {
    let p = compile(
        "def a():\n    def b():\n        pass\n    return b\ndef c():\n    return lambda: 1\n",
    );
    let names: Vec<&str> = p.functions.iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["<toplevel>", "a", "b", "c", "lambda"]);
}

#[test]
fn compilation_is_deterministic() {
    let src = "def f(a, *args, k = 1, **kw):\n    return [a, args, k, kw]\nout = f(1, 2, k = 3) + [\"s\"]\n";
    let first = compile(src);
    let second = compile(src);
    assert_eq!(first.listing(), second.listing());
    assert_eq!(first.write(), second.write());
}

#[test]
fn instruction_positions() {
    let p = compile("y = 1\nz = y + 2\n");
    let top = p.toplevel();
    let plus = top.code.iter().position(|i| i.mnemonic() == "PLUS").unwrap();
    assert_eq!(top.position(plus), Position::new(2, 7));
    assert_eq!(top.position(0), Position::new(1, 5));
}

#[test]
fn listing_names_every_function() {
    let p = compile("def f(a, *rest):\n    return a\n");
    let listing = p.listing();
    assert!(listing.contains("function <toplevel> test.kst:1:1 params=0 kwonly=0"));
    assert!(listing.contains("function f test.kst:1:5 params=1 kwonly=0 *args"));
    assert!(listing.contains("LOCAL a"));
}
