//! VM tests — execution, calls, tracebacks, freezing, budgets

use std::sync::{Arc, Mutex};

use kestrel_lang::resolve::FileOptions;
use kestrel_lang::runtime::{structs, ErrorKind, EvalError, StringDict, Thread, Value};
use kestrel_lang::{compile_source, eval_expr, exec_file, Error};

// ── Helpers ──────────────────────────────────────────────────────

fn exec_with(src: &str, predeclared: &StringDict, options: &FileOptions) -> Result<StringDict, Error> {
    let mut thread = Thread::new("test");
    exec_file(&mut thread, "test.kst", src, predeclared, options)
}

fn exec(src: &str) -> StringDict {
    exec_with(src, &structs::predeclared(), &FileOptions::default()).unwrap()
}

/// The repr of global `name` after executing `src`.
fn global(src: &str, name: &str) -> String {
    exec(src).get(name).map(Value::repr).unwrap_or_else(|| panic!("no global {}", name))
}

fn eval_error(result: Result<StringDict, Error>) -> EvalError {
    match result {
        Err(Error::Eval(e)) => e,
        Err(other) => panic!("expected a runtime error, got: {}", other),
        Ok(_) => panic!("expected a runtime error"),
    }
}

fn exec_err(src: &str) -> EvalError {
    eval_error(exec_with(src, &structs::predeclared(), &FileOptions::default()))
}

fn env(pairs: &[(&str, Value)]) -> StringDict {
    pairs.iter().map(|(k, v)| (k.to_string(), v.clone())).collect()
}

// ── End to end ───────────────────────────────────────────────────

const MUL: &str = "def mul(a, b):\n    return a * b\ny = mul(x, n)\n";

#[test]
fn mul_repeats_string() {
    let predeclared = env(&[("x", Value::from("mur")), ("n", Value::from(2))]);
    let globals = exec_with(MUL, &predeclared, &FileOptions::default()).unwrap();
    assert_eq!(globals["y"].repr(), "\"murmur\"");
    assert!(globals.contains_key("mul"));
}

#[test]
fn mul_failure_has_backtrace_through_both_frames() {
    let options = FileOptions::default();
    let names = env(&[("x", Value::None), ("n", Value::None)]);
    let program = Arc::new(compile_source("test.kst", MUL, &names, &options).unwrap());

    let mut thread = Thread::new("test");
    let ok = env(&[("x", Value::from("mur")), ("n", Value::from(2))]);
    assert_eq!(program.init(&mut thread, &ok).unwrap()["y"].repr(), "\"murmur\"");

    let bad = env(&[("x", Value::from("mur")), ("n", Value::None)]);
    let err = program.init(&mut thread, &bad).unwrap_err();
    assert_eq!(err.message(), "unknown binary op: string * NoneType");
    assert_eq!(err.kind(), ErrorKind::UnknownBinaryOp);
    assert_eq!(
        err.backtrace(),
        "Traceback (most recent call first):\n  test.kst:2:14: in mul\n  test.kst:3:8: in <toplevel>\nError: unknown binary op: string * NoneType"
    );
    let names: Vec<&str> = err.call_stack().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["mul", "<toplevel>"]);
    assert_eq!(thread.call_depth(), 0);
}

// ── Arithmetic and values ───────────────────────────────────────

#[test]
fn integer_division_floors() {
    let g = exec("a = 7 // 2\nb = -7 // 2\nc = 7 % -3\nd = -7 % 3\n");
    assert_eq!(g["a"].repr(), "3");
    assert_eq!(g["b"].repr(), "-4");
    assert_eq!(g["c"].repr(), "-2");
    assert_eq!(g["d"].repr(), "2");
}

#[test]
fn mixed_arithmetic_promotes_to_float() {
    assert_eq!(global("x = 1 + 2.5\n", "x"), "3.5");
    assert_eq!(global("x = 3 / 2\n", "x"), "1.5");
    assert_eq!(global("x = 4 / 2\n", "x"), "2.0");
}

#[test]
fn integers_grow_past_64_bits() {
    assert_eq!(
        global("x = 9223372036854775807 + 1\n", "x"),
        "9223372036854775808"
    );
    assert_eq!(
        global("x = 4294967296 * 4294967296\n", "x"),
        "18446744073709551616"
    );
}

#[test]
fn division_by_zero() {
    assert_eq!(exec_err("x = 1 // 0\n").message(), "integer division by zero");
    assert_eq!(exec_err("x = 1.0 / 0\n").message(), "floating-point division by zero");
}

#[test]
fn comparisons_and_membership() {
    let g = exec("a = [1, 2] < [1, 3]\nb = \"b\" in \"abc\"\nc = 3 not in (1, 2)\nd = 1 == 1.0\n");
    assert_eq!(g["a"].repr(), "True");
    assert_eq!(g["b"].repr(), "True");
    assert_eq!(g["c"].repr(), "True");
    assert_eq!(g["d"].repr(), "True");
}

#[test]
fn ordering_mixed_types_fails() {
    let err = exec_err("x = 1 < \"a\"\n");
    assert_eq!(err.message(), "unknown binary op: int < string");
}

#[test]
fn string_formatting() {
    assert_eq!(global("x = \"%s-%d\" % (\"a\", 3)\n", "x"), "\"a-3\"");
    assert_eq!(global("x = \"{}+{}\".format(1, 2)\n", "x"), "\"1+2\"");
    assert_eq!(global("x = \",\".join([\"a\", \"b\"])\n", "x"), "\"a,b\"");
}

#[test]
fn slicing() {
    let g = exec("a = [0, 1, 2, 3][1:3]\nb = \"hello\"[::-1]\nc = (1, 2, 3)[-2:]\n");
    assert_eq!(g["a"].repr(), "[1, 2]");
    assert_eq!(g["b"].repr(), "\"olleh\"");
    assert_eq!(g["c"].repr(), "(2, 3)");
}

#[test]
fn index_out_of_range() {
    assert_eq!(exec_err("x = [1][5]\n").message(), "index 5 out of range [0:1]");
}

#[test]
fn dict_literal_rejects_duplicate_keys() {
    assert_eq!(exec_err("d = {\"a\": 1, \"a\": 2}\n").message(), "duplicate key: \"a\"");
}

#[test]
fn unpacking() {
    let g = exec("a, b = [1, 2]\n");
    assert_eq!(g["a"].repr(), "1");
    assert_eq!(g["b"].repr(), "2");
    assert_eq!(
        exec_err("a, b = [1, 2, 3]\n").message(),
        "too many values to unpack (got 3, want 2)"
    );
}

// ── Control flow ────────────────────────────────────────────────

#[test]
fn comprehensions() {
    assert_eq!(
        global("sq = [i * i for i in range(5) if i % 2 == 0]\n", "sq"),
        "[0, 4, 16]"
    );
    assert_eq!(
        global("d = {k: v for k, v in [(\"a\", 1), (\"b\", 2)]}\n", "d"),
        "{\"a\": 1, \"b\": 2}"
    );
    assert_eq!(
        global("p = [(x, y) for x in [1, 2] for y in \"ab\".elems()]\n", "p"),
        "[(1, \"a\"), (1, \"b\"), (2, \"a\"), (2, \"b\")]"
    );
}

#[test]
fn for_loop_with_break_and_continue() {
    let src = "def f():\n    out = []\n    for i in range(10):\n        if i == 5:\n            break\n        if i % 2:\n            continue\n        out.append(i)\n    return out\nr = f()\n";
    assert_eq!(global(src, "r"), "[0, 2, 4]");
}

#[test]
fn while_loop_when_enabled() {
    let src = "def f():\n    n = 0\n    while n < 5:\n        n += 1\n    return n\nr = f()\n";
    let options = FileOptions {
        allow_while: true,
        ..FileOptions::default()
    };
    let g = exec_with(src, &StringDict::new(), &options).unwrap();
    assert_eq!(g["r"].repr(), "5");
}

#[test]
fn short_circuit_operators_return_operands() {
    let g = exec("a = 0 or \"x\"\nb = [] and fail(\"not reached\")\nc = 1 if None else 2\n");
    assert_eq!(g["a"].repr(), "\"x\"");
    assert_eq!(g["b"].repr(), "[]");
    assert_eq!(g["c"].repr(), "2");
}

// ── Functions ────────────────────────────────────────────────────

#[test]
fn parameter_binding() {
    let src = "def f(a, b = 2, *args, k = 3, **kw):\n    return [a, b, args, k, kw]\nr = f(1, 5, 6, k = 4, z = 9)\ns = f(0)\n";
    let g = exec(src);
    assert_eq!(g["r"].repr(), "[1, 5, (6,), 4, {\"z\": 9}]");
    assert_eq!(g["s"].repr(), "[0, 2, (), 3, {}]");
}

#[test]
fn star_arguments_are_spread() {
    let src = "def f(a, b, c):\n    return a + b + c\nr = f(*[1, 2], **{\"c\": 3})\n";
    assert_eq!(global(src, "r"), "6");
}

#[test]
fn parameter_binding_errors() {
    let def = "def g(a):\n    return a\n";
    assert_eq!(
        exec_err(&format!("{}r = g()\n", def)).message(),
        "function g missing 1 argument (a)"
    );
    assert_eq!(
        exec_err(&format!("{}r = g(1, 2)\n", def)).message(),
        "function g accepts at most 1 positional arguments (2 given)"
    );
    assert_eq!(
        exec_err(&format!("{}r = g(b = 1)\n", def)).message(),
        "function g got an unexpected keyword argument b"
    );
    assert_eq!(
        exec_err(&format!("{}r = g(1, a = 2)\n", def)).message(),
        "function g got multiple values for parameter a"
    );
}

#[test]
fn binding_error_is_reported_at_the_call_site() {
    let err = exec_err("def g(a):\n    return a\nr = g()\n");
    assert_eq!(err.call_stack().len(), 1);
    assert_eq!(err.call_stack()[0].name, "<toplevel>");
}

#[test]
fn recursion_is_rejected_by_default() {
    let src = "def f(n):\n    return f(n - 1) if n > 0 else 0\nr = f(3)\n";
    assert_eq!(exec_err(src).message(), "function f called recursively");

    let options = FileOptions {
        allow_recursion: true,
        ..FileOptions::default()
    };
    let g = exec_with(src, &StringDict::new(), &options).unwrap();
    assert_eq!(g["r"].repr(), "0");
}

#[test]
fn closures_share_cells() {
    let src = "def counter():\n    n = [0]\n    def inc():\n        n[0] += 1\n        return n[0]\n    inc()\n    return inc()\nc = counter()\n";
    assert_eq!(global(src, "c"), "2");
}

#[test]
fn lambda_captures_enclosing_local() {
    let src = "def adder(k):\n    return lambda x: x + k\nr = adder(10)(5)\n";
    assert_eq!(global(src, "r"), "15");
}

#[test]
fn global_referenced_before_assignment() {
    let src = "def f():\n    return g\nx = f()\ng = 1\n";
    assert_eq!(
        exec_err(src).message(),
        "global variable g referenced before assignment"
    );
}

#[test]
fn calling_a_non_function() {
    assert_eq!(exec_err("x = 1\ny = x()\n").message(), "invalid call of non-function (int)");
}

#[test]
fn builtin_with_key_function() {
    assert_eq!(
        global("s = sorted([\"bb\", \"a\", \"ccc\"], key = len, reverse = True)\n", "s"),
        "[\"ccc\", \"bb\", \"a\"]"
    );
    assert_eq!(global("m = max([3, 1, 2], key = lambda v: -v)\n", "m"), "1");
}

#[test]
fn fail_builtin_reports_message() {
    let err = exec_err("def check():\n    fail(\"bad value\", 42)\ncheck()\n");
    assert_eq!(err.message(), "fail: bad value 42");
    let names: Vec<&str> = err.call_stack().iter().map(|f| f.name.as_str()).collect();
    assert_eq!(names, vec!["fail", "check", "<toplevel>"]);
    assert!(err.backtrace().contains("<builtin>: in fail"));
}

// ── Freezing ─────────────────────────────────────────────────────

#[test]
fn globals_are_frozen_after_init() {
    let g = exec("xs = [1, [2]]\nd = {\"k\": []}\n");
    assert!(g["xs"].is_frozen());
    assert!(g["d"].is_frozen());

    let err = eval_error(exec_with(
        "xs.append(3)\n",
        &env(&[("xs", g["xs"].clone())]),
        &FileOptions::default(),
    ));
    assert_eq!(err.message(), "append: cannot append to frozen list");
    assert_eq!(err.kind(), ErrorKind::Frozen);
}

#[test]
fn mutation_during_iteration_fails() {
    let src = "def f():\n    xs = [1, 2]\n    for x in xs:\n        xs.append(x)\nf()\n";
    let err = exec_err(src);
    assert_eq!(err.message(), "append: cannot append to list during iteration");
    assert_eq!(err.kind(), ErrorKind::IterationMutation);
}

#[test]
fn mutation_after_iteration_is_allowed() {
    let src = "def f():\n    xs = [1, 2]\n    for x in xs:\n        pass\n    xs.append(3)\n    return xs\nr = f()\n";
    assert_eq!(global(src, "r"), "[1, 2, 3]");
}

// ── Structs and modules ─────────────────────────────────────────

#[test]
fn struct_values() {
    let g = exec("s = struct(b = \"x\", a = 1)\nt = s.a\nu = struct(a = 1) + struct(b = 2)\n");
    assert_eq!(g["s"].repr(), "struct(a = 1, b = \"x\")");
    assert_eq!(g["t"].repr(), "1");
    assert_eq!(g["u"].repr(), "struct(a = 1, b = 2)");
}

#[test]
fn struct_equality_and_missing_field() {
    assert_eq!(global("e = struct(a = 1) == struct(a = 1)\n", "e"), "True");
    assert_eq!(
        exec_err("s = struct(a = 1)\nx = s.b\n").message(),
        "struct has no .b attribute"
    );
}

#[test]
fn module_values() {
    let g = exec("m = module(\"util\", f = 1)\nv = m.f\n");
    assert_eq!(g["v"].repr(), "1");
    assert_eq!(g["m"].repr(), "<module \"util\">");
}

// ── Threads ──────────────────────────────────────────────────────

#[test]
fn step_budget_cancels_execution() {
    let mut thread = Thread::new("test");
    thread.set_max_steps(100);
    let result = exec_file(
        &mut thread,
        "test.kst",
        "x = [i for i in range(1000)]\n",
        &StringDict::new(),
        &FileOptions::default(),
    );
    let err = eval_error(result);
    assert_eq!(err.kind(), ErrorKind::Cancelled);
    assert_eq!(err.message(), "computation cancelled: too many steps");
}

#[test]
fn cancelled_thread_stops_at_first_instruction() {
    let mut thread = Thread::new("test");
    thread.cancel_token().cancel("shutting down");
    let err = eval_error(exec_file(
        &mut thread,
        "test.kst",
        "x = 1\n",
        &StringDict::new(),
        &FileOptions::default(),
    ));
    assert_eq!(err.message(), "computation cancelled: shutting down");
}

#[test]
fn steps_are_counted() {
    let mut thread = Thread::new("test");
    exec_file(&mut thread, "test.kst", "x = 1\n", &StringDict::new(), &FileOptions::default())
        .unwrap();
    assert!(thread.steps() >= 4);
}

#[test]
fn print_goes_to_the_thread_hook() {
    let lines = Arc::new(Mutex::new(Vec::new()));
    let sink = lines.clone();
    let mut thread = Thread::new("test");
    thread.set_print(move |msg| sink.lock().unwrap().push(msg.to_string()));
    exec_file(
        &mut thread,
        "test.kst",
        "print(\"a\", 1, [2], sep = \"-\")\n",
        &StringDict::new(),
        &FileOptions::default(),
    )
    .unwrap();
    assert_eq!(*lines.lock().unwrap(), vec!["a-1-[2]".to_string()]);
}

#[test]
fn thread_local_store() {
    let mut thread = Thread::new("test");
    assert!(thread.local("key").is_none());
    thread.set_local("key", Value::from(7));
    assert_eq!(thread.local("key").map(Value::repr), Some("7".to_string()));
}

#[test]
fn evaluate_expression() {
    let mut thread = Thread::new("test");
    let v = eval_expr(
        &mut thread,
        "[x + 1, len(\"abc\")]",
        &env(&[("x", Value::from(2))]),
        &FileOptions::default(),
    )
    .unwrap();
    assert_eq!(v.repr(), "[3, 3]");
}

#[test]
fn load_without_loader_fails() {
    let err = exec_err("load(\"lib.kst\", \"a\")\n");
    assert_eq!(err.message(), "load not implemented by this application");
}
