//! Kestrel: a small, deterministic, Python-like configuration language.
//!
//! Source text goes through the lexer and parser into a syntax tree, the
//! resolver binds every identifier, the compiler lowers each function to
//! bytecode, and the stack machine in [`vm`] executes it. Compiled
//! programs can be serialized and loaded back without the source.

pub mod lexer;
pub mod ast;
pub mod parser;
pub mod resolve;
pub mod runtime;
pub mod vm;
pub mod loader;

use std::sync::Arc;

use thiserror::Error;

use crate::parser::SyntaxError;
use crate::resolve::{FileOptions, ResolveErrors};
use crate::runtime::{builtins, EvalError, StringDict, Thread, Value};
use crate::vm::bytecode::DecodeError;
use crate::loader::LoadError;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Syntax(#[from] SyntaxError),
    #[error(transparent)]
    Resolve(#[from] ResolveErrors),
    #[error(transparent)]
    Decode(#[from] DecodeError),
    #[error(transparent)]
    Eval(#[from] EvalError),
    #[error(transparent)]
    Load(#[from] LoadError),
}

pub type Result<T> = std::result::Result<T, Error>;

/// Compiles source text to a program, checking names against `predeclared`
/// and the universe.
pub fn compile_source(
    filename: &str,
    source: &str,
    predeclared: &StringDict,
    options: &FileOptions,
) -> Result<vm::Program> {
    let mut file = parser::parse_file(filename, source)?;
    resolve::resolve_file(
        &mut file,
        options,
        &|name| predeclared.contains_key(name),
        &builtins::is_universal,
    )?;
    Ok(vm::compile_file(&file, options))
}

/// Parses, resolves, compiles and executes a source file, returning its
/// frozen globals.
pub fn exec_file(
    thread: &mut Thread,
    filename: &str,
    source: &str,
    predeclared: &StringDict,
    options: &FileOptions,
) -> Result<StringDict> {
    let program = Arc::new(compile_source(filename, source, predeclared, options)?);
    Ok(program.init(thread, predeclared)?)
}

/// Evaluates a single expression against `predeclared`.
pub fn eval_expr(
    thread: &mut Thread,
    source: &str,
    predeclared: &StringDict,
    options: &FileOptions,
) -> Result<Value> {
    let mut expr = parser::parse_expr("<expr>", source)?;
    let scope = resolve::resolve_expr(
        &mut expr,
        options,
        &|name| predeclared.contains_key(name),
        &builtins::is_universal,
    )?;
    let program = Arc::new(vm::compile_expr(&expr, &scope));
    Ok(vm::eval(thread, &program, predeclared)?)
}
