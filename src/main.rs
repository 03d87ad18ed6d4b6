use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;

use clap::{Parser as ClapParser, Subcommand};

use kestrel_lang::lexer::Lexer;
use kestrel_lang::loader::{FsSource, Loader};
use kestrel_lang::parser::parse_file;
use kestrel_lang::resolve::FileOptions;
use kestrel_lang::runtime::{StringDict, Thread, Value};
use kestrel_lang::vm::Program;
use kestrel_lang::{compile_source, eval_expr, Error};

#[derive(ClapParser)]
#[command(name = "kestrel", version, about = "The Kestrel configuration language")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Display the token stream (debug)
    Tokenize {
        /// Path to .kst file
        file: PathBuf,
    },
    /// Parse and display the syntax tree
    Parse {
        /// Path to .kst file
        file: PathBuf,
    },
    /// Execute a module and print its globals
    Run {
        /// Path to a .kst source or .kstc compiled module
        file: PathBuf,
        /// Dialect options as a JSON file
        #[arg(long)]
        options: Option<PathBuf>,
        /// Print globals as JSON
        #[arg(long)]
        json: bool,
        /// Predeclare name=value; the value is a Kestrel expression,
        /// or a plain string if it does not parse as one
        #[arg(short = 'D', value_parser = parse_define)]
        define: Vec<(String, String)>,
    },
    /// Compile a module to a .kstc file
    Compile {
        /// Path to .kst file
        file: PathBuf,
        /// Output path (defaults to the input with a .kstc extension)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Dialect options as a JSON file
        #[arg(long)]
        options: Option<PathBuf>,
        /// Names the host will predeclare when running the module
        #[arg(short = 'p', long = "predeclare")]
        predeclare: Vec<String>,
    },
    /// Print the bytecode of every function
    Disasm {
        /// Path to a .kst source or .kstc compiled module
        file: PathBuf,
        /// Dialect options as a JSON file
        #[arg(long)]
        options: Option<PathBuf>,
        /// Names the host will predeclare when running the module
        #[arg(short = 'p', long = "predeclare")]
        predeclare: Vec<String>,
    },
}

fn parse_define(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("Invalid definition '{}', expected name=value", s)),
    }
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let exit_code = match cli.command {
        Commands::Tokenize { file } => cmd_tokenize(&file),
        Commands::Parse { file } => cmd_parse(&file),
        Commands::Run {
            file,
            options,
            json,
            define,
        } => cmd_run(&file, options.as_deref(), json, &define),
        Commands::Compile {
            file,
            output,
            options,
            predeclare,
        } => cmd_compile(&file, output, options.as_deref(), &predeclare),
        Commands::Disasm {
            file,
            options,
            predeclare,
        } => cmd_disasm(&file, options.as_deref(), &predeclare),
    };
    process::exit(exit_code);
}

const MAX_SOURCE_SIZE: u64 = 10 * 1024 * 1024; // 10 MB

fn read_bytes(path: &Path) -> Result<(Vec<u8>, String), i32> {
    let filename = path.to_string_lossy().to_string();

    match std::fs::metadata(path) {
        Ok(meta) => {
            if meta.len() > MAX_SOURCE_SIZE {
                eprintln!(
                    "Error: file {} is too large ({} bytes, max {} bytes)",
                    filename,
                    meta.len(),
                    MAX_SOURCE_SIZE
                );
                return Err(1);
            }
        }
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            return Err(1);
        }
    }

    match std::fs::read(path) {
        Ok(data) => Ok((data, filename)),
        Err(e) => {
            eprintln!("Error: cannot read file {}: {}", filename, e);
            Err(1)
        }
    }
}

fn read_source(path: &Path) -> Result<(String, String), i32> {
    let (data, filename) = read_bytes(path)?;
    match String::from_utf8(data) {
        Ok(source) => Ok((source, filename)),
        Err(_) => {
            eprintln!("Error: {} is not valid UTF-8", filename);
            Err(1)
        }
    }
}

fn read_options(path: Option<&Path>) -> Result<FileOptions, i32> {
    let Some(path) = path else {
        return Ok(FileOptions::default());
    };
    let (text, filename) = read_source(path)?;
    FileOptions::from_json(&text).map_err(|e| {
        eprintln!("Error: invalid options file {}: {}", filename, e);
        1
    })
}

fn report(err: &Error) -> i32 {
    match err {
        Error::Eval(e) => eprintln!("{}", e.backtrace()),
        other => eprintln!("{}", other),
    }
    1
}

/// Reads a source or compiled module into a program.
fn load_program(
    path: &Path,
    predeclared: &StringDict,
    options: &FileOptions,
) -> Result<Program, i32> {
    let (data, filename) = read_bytes(path)?;
    if Program::is_compiled(&data) {
        return Program::read(&data).map_err(|e| report(&Error::from(e)));
    }
    let source = String::from_utf8(data).map_err(|_| {
        eprintln!("Error: {} is not valid UTF-8", filename);
        1
    })?;
    compile_source(&filename, &source, predeclared, options).map_err(|e| report(&e))
}

fn cmd_tokenize(path: &Path) -> i32 {
    let (source, filename) = match read_source(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    let tokens = match Lexer::new(&source, &filename).tokenize() {
        Ok(t) => t,
        Err(e) => {
            eprintln!("{}", e);
            return 1;
        }
    };

    for tok in &tokens {
        println!("{}", tok);
    }
    0
}

fn cmd_parse(path: &Path) -> i32 {
    let (source, filename) = match read_source(path) {
        Ok(r) => r,
        Err(code) => return code,
    };

    match parse_file(&filename, &source) {
        Ok(file) => {
            for stmt in &file.stmts {
                println!("{:#?}", stmt);
            }
            0
        }
        Err(e) => {
            eprintln!("{}", e);
            1
        }
    }
}

fn cmd_run(path: &Path, options: Option<&Path>, json: bool, defines: &[(String, String)]) -> i32 {
    let options = match read_options(options) {
        Ok(o) => o,
        Err(code) => return code,
    };

    let mut thread = Thread::new("main");
    let mut predeclared = StringDict::new();
    for (name, text) in defines {
        let value = eval_expr(&mut thread, text, &StringDict::new(), &options)
            .unwrap_or_else(|_| Value::from(text.as_str()));
        predeclared.insert(name.clone(), value);
    }

    let program = match load_program(path, &predeclared, &options) {
        Ok(p) => Arc::new(p),
        Err(code) => return code,
    };

    let root = path.parent().map(Path::to_path_buf).unwrap_or_default();
    let loader = Loader::new(FsSource::new(root), predeclared.clone(), options);
    thread.set_loader(loader);

    let globals = match program.init(&mut thread, &predeclared) {
        Ok(g) => g,
        Err(e) => return report(&Error::from(e)),
    };

    if json {
        let map: serde_json::Map<String, serde_json::Value> =
            globals.iter().map(|(k, v)| (k.clone(), v.to_json())).collect();
        match serde_json::to_string_pretty(&serde_json::Value::Object(map)) {
            Ok(text) => println!("{}", text),
            Err(e) => {
                eprintln!("Error: {}", e);
                return 1;
            }
        }
    } else {
        for (name, value) in &globals {
            println!("{} = {}", name, value.repr());
        }
    }
    0
}

/// Placeholder environment for compiling without running.
fn names_only(names: &[String]) -> StringDict {
    names.iter().map(|n| (n.clone(), Value::None)).collect()
}

fn cmd_compile(
    path: &Path,
    output: Option<PathBuf>,
    options: Option<&Path>,
    predeclare: &[String],
) -> i32 {
    let options = match read_options(options) {
        Ok(o) => o,
        Err(code) => return code,
    };
    let program = match load_program(path, &names_only(predeclare), &options) {
        Ok(p) => p,
        Err(code) => return code,
    };

    let output = output.unwrap_or_else(|| path.with_extension("kstc"));
    if let Err(e) = std::fs::write(&output, program.write()) {
        eprintln!("Error: cannot write {}: {}", output.display(), e);
        return 1;
    }
    0
}

fn cmd_disasm(path: &Path, options: Option<&Path>, predeclare: &[String]) -> i32 {
    let options = match read_options(options) {
        Ok(o) => o,
        Err(code) => return code,
    };
    match load_program(path, &names_only(predeclare), &options) {
        Ok(program) => {
            print!("{}", program.listing());
            0
        }
        Err(code) => code,
    }
}
