//! Callable values: compiled functions, closure cells and builtins.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;

use super::error::{EvalError, EvalResult};
use super::thread::Thread;
use super::Value;
use crate::ast::Position;
use crate::vm::bytecode::Funcode;
use crate::vm::machine::ModuleEnv;

/// A function value: compiled code plus the defaults and captured cells
/// bound when its `def` or `lambda` was executed.
pub struct Function {
    pub(crate) module: Arc<ModuleEnv>,
    pub(crate) funcode: usize,
    pub(crate) defaults: Vec<Value>,
    pub(crate) freevars: Vec<Arc<Cell>>,
}

impl Function {
    pub fn funcode(&self) -> &Funcode {
        &self.module.program.functions[self.funcode]
    }

    pub fn name(&self) -> &str {
        &self.funcode().name
    }

    pub fn pos(&self) -> Position {
        self.funcode().pos
    }

    pub fn doc(&self) -> &str {
        &self.funcode().doc
    }

    pub fn freeze(&self) {
        for d in &self.defaults {
            d.freeze();
        }
        for c in &self.freevars {
            c.freeze();
        }
    }
}

/// Storage for a variable shared between a function and the closures
/// nested in it.
#[derive(Default)]
pub struct Cell {
    value: RwLock<Option<Value>>,
}

impl Cell {
    pub fn new(value: Option<Value>) -> Cell {
        Cell {
            value: RwLock::new(value),
        }
    }

    pub fn get(&self) -> Option<Value> {
        self.value.read().clone()
    }

    pub fn set(&self, v: Value) {
        *self.value.write() = Some(v);
    }

    pub fn freeze(&self) {
        if let Some(v) = self.value.read().as_ref() {
            v.freeze();
        }
    }
}

/// Arguments of a call after `*args` and `**kwargs` have been flattened.
#[derive(Default, Clone)]
pub struct Args {
    pub positional: Vec<Value>,
    pub named: Vec<(String, Value)>,
}

impl Args {
    pub fn positional(positional: Vec<Value>) -> Args {
        Args {
            positional,
            named: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.positional.len() + self.named.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

pub type BuiltinFn = fn(&mut Thread, &Builtin, Args) -> EvalResult<Value>;

/// A function implemented by the host. Methods carry their receiver.
pub struct Builtin {
    pub name: String,
    pub receiver: Option<Value>,
    pub func: BuiltinFn,
}

impl Builtin {
    pub fn new(name: &str, func: BuiltinFn) -> Builtin {
        Builtin {
            name: name.to_string(),
            receiver: None,
            func,
        }
    }

    pub fn method(name: &str, receiver: Value, func: BuiltinFn) -> Builtin {
        Builtin {
            name: name.to_string(),
            receiver: Some(receiver),
            func,
        }
    }

    /// The receiver of a bound method.
    pub fn recv(&self) -> EvalResult<&Value> {
        self.receiver
            .as_ref()
            .ok_or_else(|| EvalError::new(format!("{} requires a receiver", self.name)))
    }
}

impl fmt::Debug for Builtin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Builtin").field("name", &self.name).finish()
    }
}

/// Matches `args` against parameter names. A trailing `?` marks a
/// parameter optional. Returns one slot per parameter, `None` where an
/// optional parameter was omitted.
pub fn unpack_args(args: &Args, params: &[&str]) -> EvalResult<Vec<Option<Value>>> {
    let names: Vec<(&str, bool)> = params
        .iter()
        .map(|p| match p.strip_suffix('?') {
            Some(n) => (n, true),
            None => (*p, false),
        })
        .collect();

    if args.positional.len() > names.len() {
        return Err(EvalError::new(format!(
            "got {} arguments, want at most {}",
            args.positional.len(),
            names.len()
        )));
    }

    let mut slots: Vec<Option<Value>> = vec![None; names.len()];
    for (slot, v) in slots.iter_mut().zip(args.positional.iter()) {
        *slot = Some(v.clone());
    }

    for (key, v) in &args.named {
        let Some(i) = names.iter().position(|(n, _)| n == key) else {
            return Err(EvalError::new(format!("unexpected keyword argument {}", key)));
        };
        if slots[i].is_some() {
            return Err(EvalError::new(format!(
                "got multiple values for keyword argument {}",
                key
            )));
        }
        slots[i] = Some(v.clone());
    }

    for ((name, optional), slot) in names.iter().zip(slots.iter()) {
        if !optional && slot.is_none() {
            return Err(EvalError::new(format!("missing argument for {}", name)));
        }
    }
    Ok(slots)
}

/// The value of a required parameter's slot, which `unpack_args` has
/// already checked is filled.
pub(crate) fn required(slot: &Option<Value>) -> Value {
    slot.clone().unwrap_or(Value::None)
}
