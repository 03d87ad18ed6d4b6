//! Kestrel virtual machine
//!
//! Bytecode compiler, the serialized program format and the stack-based
//! interpreter that executes it.

pub mod opcodes;
pub mod bytecode;
pub mod compiler;
pub mod machine;

pub use bytecode::{DecodeError, Funcode, Program};
pub use compiler::{compile_expr, compile_file};
pub use machine::{call, eval, init};
