//! Runtime tests — value model, freezing, hashing, builtins and methods

use std::sync::Arc;

use kestrel_lang::ast::BinaryOp;
use kestrel_lang::eval_expr;
use kestrel_lang::resolve::FileOptions;
use kestrel_lang::runtime::structs;
use kestrel_lang::runtime::{Dict, ErrorKind, List, Module, Set, StringDict, Struct, Thread, Value};

fn eval(source: &str) -> Value {
    let mut thread = Thread::new("test");
    eval_expr(&mut thread, source, &structs::predeclared(), &FileOptions::default()).unwrap()
}

fn eval_repr(source: &str) -> String {
    eval(source).repr()
}

fn eval_err(source: &str) -> String {
    let mut thread = Thread::new("test");
    match eval_expr(&mut thread, source, &structs::predeclared(), &FileOptions::default()) {
        Err(e) => e.to_string(),
        Ok(v) => panic!("expected an error, got {}", v.repr()),
    }
}

fn ints(ns: &[i64]) -> Vec<Value> {
    ns.iter().map(|n| Value::from(*n)).collect()
}

// ── Truth and types ─────────────────────────────────────────────

#[test]
fn truthiness() {
    assert!(!Value::None.truth());
    assert!(!Value::from(0).truth());
    assert!(!Value::Float(0.0).truth());
    assert!(!Value::from("").truth());
    assert!(!Value::list(vec![]).truth());
    assert!(!Value::tuple(vec![]).truth());
    assert!(!Value::dict(Dict::new()).truth());
    assert!(Value::from(-1).truth());
    assert!(Value::from("x").truth());
    assert!(Value::list(ints(&[0])).truth());
}

#[test]
fn type_names() {
    assert_eq!(Value::None.type_name(), "NoneType");
    assert_eq!(Value::from(true).type_name(), "bool");
    assert_eq!(Value::from(1).type_name(), "int");
    assert_eq!(Value::Float(1.5).type_name(), "float");
    assert_eq!(Value::from("s").type_name(), "string");
    assert_eq!(Value::set(Set::new()).type_name(), "set");
    assert_eq!(eval_repr("type(len)"), "\"builtin_function_or_method\"");
    assert_eq!(eval_repr("type(struct(a = 1))"), "\"struct\"");
}

// ── Freezing ────────────────────────────────────────────────────

#[test]
fn freeze_is_transitive() {
    let inner = Value::list(ints(&[1]));
    let dict = Dict::new();
    dict.insert(Value::from("k"), inner.clone()).unwrap();
    let outer = Value::tuple(vec![Value::dict(dict), Value::from(2)]);
    assert!(!inner.is_frozen());

    outer.freeze();
    assert!(inner.is_frozen());
    match &outer {
        Value::Tuple(t) => assert!(t[0].is_frozen()),
        _ => unreachable!(),
    }
    // Idempotent.
    outer.freeze();
    assert!(inner.is_frozen());
}

#[test]
fn freeze_handles_cycles() {
    let list = Arc::new(List::new(ints(&[1])));
    let value = Value::List(list.clone());
    list.append(value.clone()).unwrap();
    assert_eq!(value.repr(), "[1, [...]]");

    value.freeze();
    assert!(list.is_frozen());
    // Deep cyclic values still hash.
    assert!(value.hash().is_ok());
    assert!(value.equals(&value).unwrap());
}

#[test]
fn frozen_containers_reject_mutation() {
    let list = List::new(ints(&[1]));
    list.freeze();
    assert_eq!(list.append(Value::None).unwrap_err().message(), "cannot append to frozen list");
    assert_eq!(list.clear().unwrap_err().message(), "cannot clear frozen list");

    let dict = Dict::new();
    dict.freeze();
    let err = dict.insert(Value::from(1), Value::None).unwrap_err();
    assert_eq!(err.message(), "cannot insert into frozen dict");
    assert_eq!(err.kind(), ErrorKind::Frozen);

    let set = Set::new();
    set.freeze();
    assert_eq!(set.remove(&Value::from(1)).unwrap_err().message(), "cannot delete from frozen set");
}

#[test]
fn iteration_blocks_mutation() {
    let value = Value::list(ints(&[1, 2]));
    let Value::List(list) = &value else { unreachable!() };

    let iter = value.iterate().unwrap();
    let err = list.append(Value::from(3)).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IterationMutation);
    assert_eq!(err.message(), "cannot append to list during iteration");

    drop(iter);
    list.append(Value::from(3)).unwrap();
    assert_eq!(value.repr(), "[1, 2, 3]");
}

// ── Hashing ─────────────────────────────────────────────────────

#[test]
fn mutable_containers_are_unhashable() {
    let err = Value::list(vec![]).hash().unwrap_err();
    assert_eq!(err.message(), "unhashable type: list");
    assert_eq!(err.kind(), ErrorKind::Unhashable);
    assert_eq!(eval_err("{[1]: 2}"), "unhashable type: list");
    assert_eq!(eval_err("hash({})"), "hash: unhashable type: dict");
}

#[test]
fn equal_values_hash_equally() {
    assert_eq!(Value::from(1).hash().unwrap(), Value::Float(1.0).hash().unwrap());
    assert_eq!(
        Value::tuple(ints(&[1, 2])).hash().unwrap(),
        Value::tuple(vec![Value::Float(1.0), Value::from(2)]).hash().unwrap()
    );

    let a = Value::Struct(Arc::new(Struct::from_keywords(vec![("x".into(), Value::from(1))])));
    let b = Value::Struct(Arc::new(Struct::from_keywords(vec![("x".into(), Value::from(1))])));
    assert!(a.equals(&b).unwrap());
    assert_eq!(a.hash().unwrap(), b.hash().unwrap());
}

#[test]
fn string_hash_is_stable() {
    assert_eq!(Value::from("abc").hash().unwrap(), Value::from("abc").hash().unwrap());
    assert_ne!(Value::from("abc").hash().unwrap(), Value::from("abd").hash().unwrap());
}

#[test]
fn doubly_cyclic_list_hashes_promptly() {
    let list = Arc::new(List::new(vec![]));
    let value = Value::List(list.clone());
    list.append(value.clone()).unwrap();
    list.append(value.clone()).unwrap();
    value.freeze();

    let first = value.hash().unwrap();
    assert_eq!(value.hash().unwrap(), first);
}

#[test]
fn shared_substructure_hashes_promptly() {
    // Each level holds the previous one a hundred times over.
    let build = || {
        let mut v = Value::tuple(vec![Value::from("leaf")]);
        for _ in 0..40 {
            v = Value::tuple(vec![v; 100]);
        }
        v
    };
    let (a, b) = (build(), build());
    assert_eq!(a.hash().unwrap(), b.hash().unwrap());
}

// ── Dicts and sets ──────────────────────────────────────────────

#[test]
fn dict_keeps_insertion_order() {
    let dict = Dict::new();
    dict.insert(Value::from("b"), Value::from(1)).unwrap();
    dict.insert(Value::from("a"), Value::from(2)).unwrap();
    dict.insert(Value::from("c"), Value::from(3)).unwrap();
    // Replacing keeps the slot.
    dict.insert(Value::from("b"), Value::from(4)).unwrap();
    assert_eq!(Value::dict(dict).repr(), "{\"b\": 4, \"a\": 2, \"c\": 3}");

    assert_eq!(
        eval_repr("{\"z\": 1, \"y\": 2, \"x\": 3}.keys()"),
        "[\"z\", \"y\", \"x\"]"
    );
}

#[test]
fn dict_removal_keeps_order_of_others() {
    let dict = Dict::from_entries(
        ["a", "b", "c"]
            .iter()
            .zip(ints(&[1, 2, 3]))
            .map(|(k, v)| (Value::from(*k), v))
            .collect(),
    )
    .unwrap();
    dict.remove(&Value::from("a")).unwrap();
    dict.insert(Value::from("a"), Value::from(9)).unwrap();
    assert_eq!(Value::dict(dict).repr(), "{\"b\": 2, \"c\": 3, \"a\": 9}");
}

#[test]
fn int_and_float_keys_coincide() {
    let dict = Dict::new();
    dict.insert(Value::from(1), Value::from("int")).unwrap();
    assert_eq!(dict.get(&Value::Float(1.0)).unwrap().unwrap().repr(), "\"int\"");
}

#[test]
fn sets_deduplicate() {
    assert_eq!(eval_repr("set([1, 2, 1, 2.0])"), "set([1, 2])");
    assert_eq!(eval_repr("len(set(\"abca\".elems()))"), "3");
    let set = Set::from_elems(ints(&[3, 1, 3])).unwrap();
    assert_eq!(set.len(), 2);
    assert!(!set.insert(Value::from(1)).unwrap());
}

// ── Equality and ordering ───────────────────────────────────────

#[test]
fn structural_equality() {
    assert!(eval("[1, (2, \"x\")] == [1, (2, \"x\")]").truth());
    assert!(eval("{1: 2, 3: 4} == {3: 4, 1: 2}").truth());
    assert!(!eval("[1] == (1,)").truth());
    assert!(eval("1 == 1.0").truth());
    assert!(eval("set([1, 2]) == set([2, 1])").truth());
}

#[test]
fn equality_depth_is_bounded() {
    let nested = format!("{}1{}", "[".repeat(12), "]".repeat(12));
    let err = eval_err(&format!("{} == {}", nested, nested));
    assert_eq!(err, "comparison exceeded maximum recursion depth");
}

#[test]
fn nan_sorts_last_and_equals_itself() {
    let nan = Value::Float(f64::NAN);
    assert!(nan.equals(&nan).unwrap());
    assert!(nan.compare(BinaryOp::Gt, &Value::Float(f64::INFINITY)).unwrap());
    assert!(Value::from(5).compare(BinaryOp::Lt, &nan).unwrap());
    assert_eq!(
        eval_repr("sorted([float(\"nan\"), 1.0, float(\"-inf\"), 0])"),
        "[-inf, 0, 1.0, nan]"
    );
}

#[test]
fn mixed_type_ordering_fails() {
    assert_eq!(eval_err("1 < \"a\""), "unknown binary op: int < string");
    assert!(eval_err("sorted([1, \"a\"])").starts_with("sorted: unknown binary op"));
}

#[test]
fn sequences_order_lexicographically() {
    assert!(eval("[1, 2] < [1, 3]").truth());
    assert!(eval("(1,) < (1, 0)").truth());
    assert!(eval("\"ab\" < \"b\"").truth());
}

// ── Rendering ───────────────────────────────────────────────────

#[test]
fn reprs() {
    assert_eq!(Value::tuple(ints(&[1])).repr(), "(1,)");
    assert_eq!(Value::tuple(vec![]).repr(), "()");
    assert_eq!(Value::Float(1e20).repr(), "1e+20");
    assert_eq!(Value::Float(2.0).repr(), "2.0");
    assert_eq!(Value::from("a\"b\n").repr(), "\"a\\\"b\\n\"");
    assert_eq!(eval_repr("[None, True, 1.5]"), "[None, True, 1.5]");
    assert_eq!(eval_repr("struct(b = \"x\", a = 1)"), "struct(a = 1, b = \"x\")");
    assert_eq!(eval_repr("len"), "<built-in function len>");
    assert_eq!(eval_repr("[].append"), "<built-in method append of list value>");
}

#[test]
fn display_leaves_strings_unquoted() {
    assert_eq!(Value::from("plain").to_string(), "plain");
    assert_eq!(Value::list(vec![Value::from("q")]).to_string(), "[\"q\"]");
    assert_eq!(eval_repr("str([\"q\"]) + str(\"s\")"), "\"[\\\"q\\\"]s\"");
}

#[test]
fn json_conversion() {
    let v = eval("{\"a\": [1, 2.5, None, True], \"s\": struct(n = \"x\"), \"big\": 1 << 70}");
    assert_eq!(
        v.to_json(),
        serde_json::json!({
            "a": [1, 2.5, null, true],
            "s": {"n": "x"},
            "big": "1180591620717411303424",
        })
    );
}

// ── Structs and modules ─────────────────────────────────────────

#[test]
fn struct_fields_and_addition() {
    assert_eq!(eval_repr("struct(a = 1, b = 2).b"), "2");
    assert_eq!(
        eval_repr("struct(a = 1, b = 2) + struct(b = 3, c = 4)"),
        "struct(a = 1, b = 3, c = 4)"
    );
    assert_eq!(eval_err("struct(a = 1).z"), "struct has no .z attribute");
}

#[test]
fn struct_rejects_repeated_keyword() {
    assert_eq!(
        eval_err("struct(a = 1, **{\"a\": 2})"),
        "struct: duplicate keyword argument a"
    );
    assert_eq!(
        eval_err("module(\"m\", x = 1, **{\"x\": 2})"),
        "module: duplicate keyword argument x"
    );
}

#[test]
fn struct_addition_requires_same_constructor() {
    let a = Struct::new(Value::from("point"), vec![("x".into(), Value::from(1))]);
    let b = Struct::from_keywords(vec![("y".into(), Value::from(2))]);
    let err = a.add(&b).unwrap_err();
    assert_eq!(
        err.message(),
        "cannot add structs of different constructors: point + struct"
    );
}

#[test]
fn module_members_are_frozen() {
    let mut members = StringDict::new();
    members.insert("items".to_string(), Value::list(ints(&[1])));
    let m = Module::new("m", members);
    assert!(m.attr("items").unwrap().is_frozen());
    assert_eq!(
        m.attr("x").unwrap_err().message(),
        "module \"m\" has no .x field or method"
    );
}

#[test]
fn module_builtin() {
    assert_eq!(eval_repr("module(\"cfg\", port = 80).port"), "80");
    assert_eq!(eval_repr("module(\"cfg\", port = 80)"), "<module \"cfg\">");
    assert_eq!(eval_repr("dir(module(\"cfg\", b = 1, a = 2))"), "[\"a\", \"b\"]");
}

// ── Builtins ────────────────────────────────────────────────────

#[test]
fn sorting() {
    assert_eq!(eval_repr("sorted([3, 1, 2])"), "[1, 2, 3]");
    assert_eq!(eval_repr("sorted([\"b\", \"a\", \"c\"], reverse = True)"), "[\"c\", \"b\", \"a\"]");
    assert_eq!(eval_repr("sorted([3, 1, 2], key = lambda v: -v)"), "[3, 2, 1]");
    // Stable.
    assert_eq!(
        eval_repr("sorted([(1, \"b\"), (0, \"z\"), (1, \"a\")], key = lambda p: p[0])"),
        "[(0, \"z\"), (1, \"b\"), (1, \"a\")]"
    );
}

#[test]
fn ranges_and_sequences() {
    assert_eq!(eval_repr("range(4)"), "[0, 1, 2, 3]");
    assert_eq!(eval_repr("range(0, 10, 3)"), "[0, 3, 6, 9]");
    assert_eq!(eval_repr("range(5, 0, -2)"), "[5, 3, 1]");
    assert_eq!(eval_err("range(1, 2, 0)"), "range: step argument must not be zero");
    assert_eq!(eval_repr("enumerate([\"a\", \"b\"], 1)"), "[(1, \"a\"), (2, \"b\")]");
    assert_eq!(eval_repr("zip([1, 2], [\"a\", \"b\", \"c\"])"), "[(1, \"a\"), (2, \"b\")]");
    assert_eq!(eval_repr("reversed((1, 2, 3))"), "[3, 2, 1]");
    assert_eq!(eval_repr("tuple([1])"), "(1,)");
    assert_eq!(eval_repr("list((1, 2))"), "[1, 2]");
}

#[test]
fn conversions() {
    assert_eq!(eval_repr("int(\"0x1f\", 0)"), "31");
    assert_eq!(eval_repr("int(\"-42\")"), "-42");
    assert_eq!(eval_repr("int(\"ff\", 16)"), "255");
    assert_eq!(eval_repr("int(2.9)"), "2");
    assert_eq!(eval_err("int(\"1.5\")"), "int: invalid literal for int() with base 10: \"1.5\"");
    assert_eq!(eval_repr("float(\"2.5\")"), "2.5");
    assert_eq!(eval_repr("bool([])"), "False");
    assert_eq!(eval_repr("bool(\"x\")"), "True");
    assert_eq!(eval_repr("str(12)"), "\"12\"");
    assert_eq!(eval_repr("repr(\"q\")"), "\"\\\"q\\\"\"");
    assert_eq!(eval_repr("dict([(\"a\", 1)], b = 2)"), "{\"a\": 1, \"b\": 2}");
}

#[test]
fn numeric_builtins() {
    assert_eq!(eval_repr("abs(-5)"), "5");
    assert_eq!(eval_repr("abs(-2.5)"), "2.5");
    assert_eq!(eval_repr("min([3, 1, 2])"), "1");
    assert_eq!(eval_repr("max(3, 7, 5)"), "7");
    assert_eq!(eval_repr("max([\"aa\", \"b\"], key = len)"), "\"aa\"");
    assert_eq!(eval_repr("all([1, True, \"x\"])"), "True");
    assert_eq!(eval_repr("any([0, None, \"\"])"), "False");
    assert_eq!(eval_repr("len(\"héllo\")"), "5");
}

#[test]
fn attribute_builtins() {
    assert_eq!(eval_repr("hasattr(struct(a = 1), \"a\")"), "True");
    assert_eq!(eval_repr("hasattr(struct(a = 1), \"b\")"), "False");
    assert_eq!(eval_repr("getattr(struct(a = 1), \"b\", 0)"), "0");
    assert_eq!(eval_repr("dir(struct(b = 1, a = 2))"), "[\"a\", \"b\"]");
    assert_eq!(eval_repr("type({})"), "\"dict\"");
    assert!(eval_repr("dir(\"\")").contains("\"split\""));
}

// ── Methods ─────────────────────────────────────────────────────

#[test]
fn string_methods() {
    assert_eq!(eval_repr("\"  a  b \".split()"), "[\"a\", \"b\"]");
    assert_eq!(eval_repr("\"a,b,,c\".split(\",\")"), "[\"a\", \"b\", \"\", \"c\"]");
    assert_eq!(eval_repr("\"a b c\".split(None, 1)"), "[\"a\", \"b c\"]");
    assert_eq!(eval_repr("\"a.b.c\".rsplit(\".\", 1)"), "[\"a.b\", \"c\"]");
    assert_eq!(eval_repr("\"k=v=w\".partition(\"=\")"), "(\"k\", \"=\", \"v=w\")");
    assert_eq!(eval_repr("\"k\".partition(\"=\")"), "(\"k\", \"\", \"\")");
    assert_eq!(eval_repr("\"aaa\".replace(\"a\", \"b\", 2)"), "\"bba\"");
    assert_eq!(eval_repr("\"-\".join([\"x\", \"y\"])"), "\"x-y\"");
    assert_eq!(eval_repr("\"{} and {name}\".format(1, name = \"n\")"), "\"1 and n\"");
    assert_eq!(eval_repr("\"  pad \".strip()"), "\"pad\"");
    assert_eq!(eval_repr("\"Hello\".startswith(\"He\")"), "True");
    assert_eq!(eval_err("\"a\".split(\"\")"), "split: empty separator");
}

#[test]
fn strings_index_and_slice_by_code_point() {
    assert_eq!(eval_repr("\"héllo\"[1]"), "\"é\"");
    assert_eq!(eval_repr("\"héllo\"[-4]"), "\"é\"");
    assert_eq!(eval_repr("\"héllo\"[1:3]"), "\"él\"");
    assert_eq!(eval_repr("\"héllo\"[::-1]"), "\"olléh\"");
    assert_eq!(
        eval_repr("all([\"日本語\"[:i] + \"日本語\"[i:] == \"日本語\" for i in range(4)])"),
        "True"
    );
    assert_eq!(eval_err("\"é\"[1]"), "index 1 out of range [0:1]");
}

#[test]
fn negative_index_errors_name_the_bound() {
    assert_eq!(eval_err("[1, 2][-5]"), "index -5 out of range [-2:]");
    assert_eq!(
        eval_err("(1, 2)[-100000000000000000000]"),
        "index -100000000000000000000 out of range [-2:]"
    );
    assert_eq!(eval_err("[1, 2][100000000000000000000]"), "index 100000000000000000000 out of range [0:2]");
}

#[test]
fn find_family_counts_code_points() {
    assert_eq!(eval_repr("\"héllo\".find(\"l\")"), "2");
    assert_eq!(eval_repr("\"héllo\".rfind(\"l\")"), "3");
    assert_eq!(eval_repr("\"日本語\".index(\"語\")"), "2");
    assert_eq!(eval_repr("\"héllo\".find(\"o\", -1)"), "4");
    assert_eq!(eval_repr("\"héllo\".find(\"é\", 2)"), "-1");
    assert_eq!(eval_repr("\"aéaé\".count(\"é\", 2)"), "1");
}

#[test]
fn dict_methods() {
    assert_eq!(eval_repr("{\"a\": 1}.get(\"a\")"), "1");
    assert_eq!(eval_repr("{\"a\": 1}.get(\"z\")"), "None");
    assert_eq!(eval_repr("{\"a\": 1}.get(\"z\", 0)"), "0");
    assert_eq!(eval_repr("{\"a\": 1}.pop(\"z\", 5)"), "5");
    assert_eq!(eval_err("{\"a\": 1}.pop(\"z\")"), "pop: missing key \"z\"");
    assert_eq!(eval_repr("{\"a\": 1}.setdefault(\"b\", 2)"), "2");
    assert_eq!(eval_repr("{\"a\": 1}.items()"), "[(\"a\", 1)]");
}

#[test]
fn set_methods() {
    assert_eq!(eval_repr("set([1, 2]).union([3])"), "set([1, 2, 3])");
    assert_eq!(eval_repr("set([1, 2, 3]).intersection([2, 3, 4])"), "set([2, 3])");
    assert_eq!(eval_repr("set([1, 2]).issubset([1, 2, 3])"), "True");
}

#[test]
fn unknown_method() {
    assert_eq!(eval_err("\"s\".nosuch"), "string has no .nosuch field or method");
}
