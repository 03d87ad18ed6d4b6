//! Loader tests — caching, cycles, compiled modules, sources

use std::sync::Arc;

use kestrel_lang::loader::{FsSource, LoadError, Loader, MemorySource};
use kestrel_lang::resolve::FileOptions;
use kestrel_lang::runtime::{StringDict, Thread, Value};
use kestrel_lang::{compile_source, exec_file, Error};

const LIB: &str = "def greet(n):\n    return \"hi \" + n\nanswer = 42\nitems = [1, 2]\n";

fn loader(source: MemorySource) -> Arc<Loader> {
    Loader::new(source, StringDict::new(), FileOptions::default())
}

fn run_main(loader: Arc<Loader>, src: &str) -> Result<StringDict, Error> {
    let mut thread = Thread::new("main");
    thread.set_loader(loader);
    exec_file(&mut thread, "main.kst", src, &StringDict::new(), &FileOptions::default())
}

fn error_text(result: Result<StringDict, Error>) -> String {
    match result {
        Err(e) => e.to_string(),
        Ok(_) => panic!("expected an error"),
    }
}

// ── Loading ─────────────────────────────────────────────────────

#[test]
fn load_binds_requested_names() {
    let l = loader(MemorySource::new().with("lib.kst", LIB));
    let g = run_main(l, "load(\"lib.kst\", \"greet\", a = \"answer\")\nmsg = greet(\"bob\")\nn = a + 1\n")
        .unwrap();
    assert_eq!(g["msg"].repr(), "\"hi bob\"");
    assert_eq!(g["n"].repr(), "43");
    // Loaded names are file-local.
    assert!(!g.contains_key("greet"));
    assert!(!g.contains_key("a"));
}

#[test]
fn loaded_globals_are_frozen() {
    let l = loader(MemorySource::new().with("lib.kst", LIB));
    let mut thread = Thread::new("main");
    let globals = l.get(&mut thread, "lib.kst").unwrap();
    assert!(globals["items"].is_frozen());

    let err = error_text(run_main(l, "load(\"lib.kst\", \"items\")\nitems.append(3)\n"));
    assert_eq!(err, "append: cannot append to frozen list");
}

#[test]
fn modules_are_cached() {
    let l = loader(MemorySource::new().with("lib.kst", LIB));
    assert!(!l.is_loaded("lib.kst"));

    let mut t1 = Thread::new("one");
    let mut t2 = Thread::new("two");
    let first = l.get(&mut t1, "lib.kst").unwrap();
    assert!(l.is_loaded("lib.kst"));
    let second = l.get(&mut t2, "lib.kst").unwrap();
    match (&first["items"], &second["items"]) {
        (Value::List(a), Value::List(b)) => assert!(Arc::ptr_eq(a, b)),
        other => panic!("unexpected values {:?}", other),
    }
}

#[test]
fn predeclared_names_reach_modules() {
    let mut env = StringDict::new();
    env.insert("base".to_string(), Value::from(10));
    let l = Loader::new(
        MemorySource::new().with("m.kst", "v = base + 1\n"),
        env,
        FileOptions::default(),
    );
    let mut thread = Thread::new("main");
    assert_eq!(l.get(&mut thread, "m.kst").unwrap()["v"].repr(), "11");
}

#[test]
fn nested_loads() {
    let l = loader(
        MemorySource::new()
            .with("base.kst", "root = \"r\"\n")
            .with("mid.kst", "load(\"base.kst\", \"root\")\npath = root + \"/mid\"\n"),
    );
    let g = run_main(l.clone(), "load(\"mid.kst\", \"path\")\nout = path + \"/main\"\n").unwrap();
    assert_eq!(g["out"].repr(), "\"r/mid/main\"");
    assert!(l.is_loaded("base.kst"));
}

#[test]
fn compiled_module_loads() {
    let compiled = compile_source("lib.kst", LIB, &StringDict::new(), &FileOptions::default())
        .unwrap()
        .write();
    let l = loader(MemorySource::new().with("lib.kstc", compiled));
    let g = run_main(l, "load(\"lib.kstc\", \"greet\")\nmsg = greet(\"ann\")\n").unwrap();
    assert_eq!(g["msg"].repr(), "\"hi ann\"");
}

#[test]
fn concurrent_requests_share_one_result() {
    let l = loader(MemorySource::new().with("lib.kst", LIB));
    let results: Vec<String> = std::thread::scope(|s| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let l = l.clone();
                s.spawn(move || {
                    let mut thread = Thread::new(&format!("worker {}", i));
                    l.get(&mut thread, "lib.kst").map(|g| g["answer"].repr())
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|h| h.join().unwrap().unwrap())
            .collect()
    });
    assert_eq!(results, vec!["42"; 4]);
}

#[test]
fn cyclic_module_value_usable_as_key() {
    let l = loader(MemorySource::new().with("cyc.kst", "l = []\nl.append(l)\nl.append(l)\n"));
    let g = run_main(l, "load(\"cyc.kst\", \"l\")\nd = {l: 1}\nn = d[l]\n").unwrap();
    assert_eq!(g["n"].repr(), "1");
}

// ── Failures ────────────────────────────────────────────────────

#[test]
fn cycle_in_load_graph() {
    let l = loader(
        MemorySource::new()
            .with("a.kst", "load(\"b.kst\", \"y\")\nx = 1\n")
            .with("b.kst", "load(\"a.kst\", \"x\")\ny = 2\n"),
    );
    let mut thread = Thread::new("main");
    let err = l.get(&mut thread, "a.kst").unwrap_err();
    assert!(err.to_string().contains("cycle in load graph"), "{}", err);

    // The failure is cached.
    assert!(l.is_loaded("a.kst"));
    let again = l.get(&mut thread, "a.kst").unwrap_err();
    assert_eq!(again.to_string(), err.to_string());
}

#[test]
fn module_loading_itself() {
    let l = loader(MemorySource::new().with("self.kst", "load(\"self.kst\", \"x\")\nx = 1\n"));
    let err = error_text(run_main(l, "load(\"self.kst\", \"x\")\n"));
    assert!(err.contains("cycle in load graph"), "{}", err);
    assert!(err.starts_with("cannot load self.kst: "), "{}", err);
}

#[test]
fn missing_module() {
    let l = loader(MemorySource::new());
    let mut thread = Thread::new("main");
    let err = l.get(&mut thread, "nope.kst").unwrap_err();
    assert!(matches!(err, LoadError::NotFound(_)));
    assert_eq!(err.to_string(), "module nope.kst not found");

    let err = error_text(run_main(l, "load(\"nope.kst\", \"x\")\n"));
    assert_eq!(err, "cannot load nope.kst: module nope.kst not found");
}

#[test]
fn missing_name() {
    let l = loader(MemorySource::new().with("lib.kst", LIB));
    let err = error_text(run_main(l, "load(\"lib.kst\", \"nothere\")\n"));
    assert_eq!(err, "load: name nothere not found in module lib.kst");
}

#[test]
fn private_names_are_not_loadable() {
    let l = loader(MemorySource::new().with("lib.kst", "_hidden = 1\n"));
    let err = error_text(run_main(l, "load(\"lib.kst\", \"_hidden\")\n"));
    assert!(
        err.contains("load: names with leading underscores are not exported: _hidden"),
        "{}",
        err
    );
}

#[test]
fn syntax_error_in_module() {
    let l = loader(MemorySource::new().with("bad.kst", "x = = 1\n"));
    let mut thread = Thread::new("main");
    assert!(matches!(l.get(&mut thread, "bad.kst"), Err(LoadError::Syntax(_))));
}

#[test]
fn runtime_error_in_module_keeps_its_traceback() {
    let l = loader(MemorySource::new().with("bad.kst", "x = 1 + \"a\"\n"));
    let mut thread = Thread::new("main");
    match l.get(&mut thread, "bad.kst") {
        Err(LoadError::Eval(e)) => {
            assert_eq!(e.message(), "unknown binary op: int + string");
            assert_eq!(e.call_stack()[0].name, "<toplevel>");
        }
        Err(other) => panic!("unexpected error {}", other),
        Ok(_) => panic!("expected an error"),
    }
}

#[test]
fn cancelled_load_is_not_cached() {
    let l = loader(MemorySource::new().with("lib.kst", LIB));

    let mut cancelled = Thread::new("cancelled");
    cancelled.cancel("stop");
    assert!(l.get(&mut cancelled, "lib.kst").is_err());
    assert!(!l.is_loaded("lib.kst"));

    let mut thread = Thread::new("main");
    assert_eq!(l.get(&mut thread, "lib.kst").unwrap()["answer"].repr(), "42");
}

// ── File system source ──────────────────────────────────────────

#[test]
fn fs_source_reads_relative_paths() {
    let root = std::env::temp_dir().join(format!("kestrel-loader-test-{}", std::process::id()));
    std::fs::create_dir_all(root.join("pkg")).unwrap();
    std::fs::write(root.join("pkg/defs.kst"), "name = \"defs\"\n").unwrap();

    let l = Loader::new(FsSource::new(&root), StringDict::new(), FileOptions::default());
    let mut thread = Thread::new("main");
    let g = l.get(&mut thread, "pkg/defs.kst").unwrap();
    assert_eq!(g["name"].repr(), "\"defs\"");

    assert!(matches!(
        l.get(&mut thread, "../escape.kst"),
        Err(LoadError::InvalidName(_))
    ));

    std::fs::remove_dir_all(&root).unwrap();
}
