//! Compiled module format tests — round trip, header checks, corruption

use std::sync::Arc;

use sha2::{Digest, Sha256};

use kestrel_lang::compile_source;
use kestrel_lang::resolve::FileOptions;
use kestrel_lang::runtime::{StringDict, Thread, Value};
use kestrel_lang::vm::{DecodeError, Program};

const SOURCE: &str = "\
\"\"\"Module docstring.\"\"\"
def scale(xs, factor = 2, *rest, **opts):
    \"\"\"Multiplies each element.\"\"\"
    return [x * factor for x in xs]

def make_adder(k):
    return lambda v: v + k

big = 123456789012345678901234567890
ratio = 0.25
values = scale([1, 2, 3])
add = make_adder(10)(5)
label = \"n=\" + str(len(values)) + \"!\"
";

fn compile(source: &str) -> Program {
    compile_source("mod.kst", source, &StringDict::new(), &FileOptions::default()).unwrap()
}

fn globals_repr(program: Program) -> Vec<(String, String)> {
    let mut thread = Thread::new("test");
    let globals = Arc::new(program).init(&mut thread, &StringDict::new()).unwrap();
    globals
        .into_iter()
        .filter(|(_, v)| !matches!(v, Value::Function(_)))
        .map(|(k, v)| (k, v.repr()))
        .collect()
}

/// Replaces the body of a serialized program and recomputes its checksum.
fn rewrap(data: &[u8], edit: impl FnOnce(&mut Vec<u8>)) -> Vec<u8> {
    let mut body = data[5..data.len() - 32].to_vec();
    edit(&mut body);
    let mut out = data[..5].to_vec();
    out.extend_from_slice(&body);
    out.extend_from_slice(&Sha256::digest(&body));
    out
}

// ── Round trip ──────────────────────────────────────────────

#[test]
fn round_trip_preserves_listing() {
    let program = compile(SOURCE);
    let decoded = Program::read(&program.write()).unwrap();
    assert_eq!(decoded.listing(), program.listing());
    assert_eq!(decoded.filename, "mod.kst");
    assert_eq!(decoded.functions.len(), program.functions.len());
}

#[test]
fn round_trip_executes_identically() {
    let program = compile(SOURCE);
    let decoded = Program::read(&program.write()).unwrap();
    let expected = globals_repr(program);
    assert_eq!(globals_repr(decoded), expected);
    assert!(expected.contains(&("values".to_string(), "[2, 4, 6]".to_string())));
    assert!(expected.contains(&("big".to_string(), "123456789012345678901234567890".to_string())));
    assert!(expected.contains(&("label".to_string(), "\"n=3!\"".to_string())));
}

#[test]
fn round_trip_preserves_function_metadata() {
    let program = compile(SOURCE);
    let decoded = Program::read(&program.write()).unwrap();
    let scale = decoded.functions.iter().find(|f| f.name == "scale").unwrap();
    assert_eq!(scale.doc, "Multiplies each element.");
    assert_eq!(scale.num_params, 2);
    assert!(scale.has_varargs);
    assert!(scale.has_kwargs);
    assert_eq!(scale.default_mask, vec![false, true]);
    let lambda = decoded.functions.iter().find(|f| f.name == "lambda").unwrap();
    assert_eq!(lambda.freevars.len(), 1);
}

#[test]
fn round_trip_preserves_backtraces() {
    let source = "def f(a):\n    return a + 1\nx = f(\"s\")\n";
    let program = compile(source);
    let decoded = Program::read(&program.write()).unwrap();

    let run = |p: Program| {
        let mut thread = Thread::new("test");
        Arc::new(p).init(&mut thread, &StringDict::new()).unwrap_err()
    };
    let original = run(program);
    let reloaded = run(decoded);
    assert_eq!(reloaded.backtrace(), original.backtrace());
    assert_eq!(reloaded.message(), "unknown binary op: string + int");
}

#[test]
fn serialization_is_deterministic() {
    assert_eq!(compile(SOURCE).write(), compile(SOURCE).write());
}

#[test]
fn load_statements_survive() {
    let program = compile("load(\"lib.kst\", \"a\")\nload(\"other.kst\", b = \"c\")\n");
    let decoded = Program::read(&program.write()).unwrap();
    assert_eq!(decoded.load_modules(), vec!["lib.kst", "other.kst"]);
}

// ── Malformed input ─────────────────────────────────────────

#[test]
fn source_text_is_not_compiled() {
    assert!(!Program::is_compiled(b"x = 1\n"));
    assert!(Program::is_compiled(&compile("x = 1\n").write()));
    let err = Program::read(b"x = 1\n").unwrap_err();
    assert_eq!(err, DecodeError::NotCompiled);
    assert_eq!(err.to_string(), "not a compiled module");
}

#[test]
fn unsupported_version() {
    let mut data = compile("x = 1\n").write();
    data[4] = 99;
    let err = Program::read(&data).unwrap_err();
    assert_eq!(err, DecodeError::UnsupportedVersion { found: 99 });
    assert_eq!(err.to_string(), "unsupported compiled module version 99 (want 1)");
}

#[test]
fn truncated_input() {
    assert!(Program::read(b"KSTC").unwrap_err().to_string().starts_with("corrupt compiled module"));
    let data = compile("x = 1\n").write();
    for len in [5, 20, data.len() - 1] {
        let err = Program::read(&data[..len]).unwrap_err();
        assert!(
            err.to_string().starts_with("corrupt compiled module"),
            "length {}: {}",
            len,
            err
        );
    }
}

#[test]
fn flipped_byte_fails_checksum() {
    let mut data = compile(SOURCE).write();
    let mid = data.len() / 2;
    data[mid] ^= 0x40;
    let err = Program::read(&data).unwrap_err();
    assert!(err.to_string().starts_with("corrupt compiled module"), "{}", err);
}

#[test]
fn trailing_body_bytes_are_rejected() {
    let data = compile("x = 1\n").write();
    let tampered = rewrap(&data, |body| body.push(0));
    assert_eq!(
        Program::read(&tampered).unwrap_err(),
        DecodeError::Corrupt("trailing data".to_string())
    );
}

#[test]
fn truncated_body_with_valid_checksum_is_rejected() {
    let data = compile(SOURCE).write();
    let tampered = rewrap(&data, |body| {
        let keep = body.len() / 3;
        body.truncate(keep);
    });
    let err = Program::read(&tampered).unwrap_err();
    assert!(matches!(err, DecodeError::Corrupt(_)), "{}", err);
}
