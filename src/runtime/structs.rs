//! The `struct` and `module` composite values, and the predeclared
//! helpers that build them.

use super::error::{EvalError, EvalResult};
use super::function::{unpack_args, Args, Builtin};
use super::thread::Thread;
use super::{hash_bytes, HashMemo, StringDict, Value};

use std::collections::HashSet;
use std::sync::Arc;

/// An immutable record of named fields, tagged by a constructor value.
#[derive(Debug)]
pub struct Struct {
    constructor: Value,
    /// Sorted by name, names unique.
    fields: Vec<(String, Value)>,
}

impl Struct {
    /// Builds a struct from keyword pairs. Later duplicates win.
    ///
    /// # Panics
    ///
    /// If `constructor` is `None`; every struct must carry a tag.
    pub fn new(constructor: Value, fields: Vec<(String, Value)>) -> Struct {
        assert!(
            !matches!(constructor, Value::None),
            "struct constructor must not be None"
        );
        let mut sorted: Vec<(String, Value)> = Vec::with_capacity(fields.len());
        for (name, value) in fields {
            match sorted.binary_search_by(|(n, _)| n.as_str().cmp(&name)) {
                Ok(i) => sorted[i].1 = value,
                Err(i) => sorted.insert(i, (name, value)),
            }
        }
        Struct {
            constructor,
            fields: sorted,
        }
    }

    /// A struct tagged with the default constructor, the string `"struct"`.
    pub fn from_keywords(fields: Vec<(String, Value)>) -> Struct {
        Struct::new(Value::string("struct"), fields)
    }

    pub fn constructor(&self) -> &Value {
        &self.constructor
    }

    pub fn fields(&self) -> &[(String, Value)] {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<Value> {
        self.fields
            .binary_search_by(|(n, _)| n.as_str().cmp(name))
            .ok()
            .map(|i| self.fields[i].1.clone())
    }

    pub fn attr(&self, name: &str) -> EvalResult<Value> {
        match self.get(name) {
            Some(v) => Ok(v),
            None => Err(EvalError::new(format!(
                "{} has no .{} attribute",
                self.constructor, name
            ))),
        }
    }

    pub fn attr_names(&self) -> Vec<String> {
        self.fields.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn freeze(&self) {
        self.constructor.freeze();
        for (_, v) in &self.fields {
            v.freeze();
        }
    }

    /// Field-wise union; the right operand wins on conflicts.
    pub fn add(&self, other: &Struct) -> EvalResult<Struct> {
        if !self.constructor.equals(&other.constructor)? {
            return Err(EvalError::new(format!(
                "cannot add structs of different constructors: {} + {}",
                self.constructor, other.constructor
            )));
        }
        let mut fields = self.fields.clone();
        fields.extend(other.fields.iter().cloned());
        Ok(Struct::new(self.constructor.clone(), fields))
    }

    pub(crate) fn equals(&self, other: &Struct, depth: usize) -> EvalResult<bool> {
        if !self.constructor.equals_depth(&other.constructor, depth + 1)? {
            return Ok(false);
        }
        if self.fields.len() != other.fields.len() {
            return Ok(false);
        }
        for ((xn, xv), (yn, yv)) in self.fields.iter().zip(other.fields.iter()) {
            if xn != yn || !xv.equals_depth(yv, depth + 1)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    pub(crate) fn hash(&self, depth: usize, memo: &mut HashMemo) -> EvalResult<u32> {
        let mut x: u32 = 8731;
        let mut m: u32 = 9839;
        for (name, v) in &self.fields {
            x ^= hash_bytes(name.as_bytes()).wrapping_mul(3);
            x ^= v.hash_depth(depth + 1, memo)?.wrapping_mul(m);
            m = m.wrapping_add(7349);
        }
        Ok(x)
    }
}

/// A named, immutable namespace of members.
pub struct Module {
    name: String,
    members: StringDict,
}

impl Module {
    /// Members are frozen on construction.
    pub fn new(name: &str, members: StringDict) -> Module {
        for v in members.values() {
            v.freeze();
        }
        Module {
            name: name.to_string(),
            members,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn members(&self) -> &StringDict {
        &self.members
    }

    pub fn attr(&self, name: &str) -> EvalResult<Value> {
        match self.members.get(name) {
            Some(v) => Ok(v.clone()),
            None => Err(EvalError::new(format!(
                "module {:?} has no .{} field or method",
                self.name, name
            ))),
        }
    }

    pub fn attr_names(&self) -> Vec<String> {
        self.members.keys().cloned().collect()
    }

    pub fn freeze(&self) {
        for v in self.members.values() {
            v.freeze();
        }
    }
}

/// The host helpers `struct` and `module`, for use as predeclared
/// bindings.
pub fn predeclared() -> StringDict {
    let mut env = StringDict::new();
    env.insert(
        "struct".to_string(),
        Value::Builtin(Arc::new(Builtin::new("struct", make_struct))),
    );
    env.insert(
        "module".to_string(),
        Value::Builtin(Arc::new(Builtin::new("module", make_module))),
    );
    env
}

/// Keywords may arrive twice when `**kwargs` repeats an explicit one.
fn check_unique_keywords(named: &[(String, Value)]) -> EvalResult<()> {
    let mut seen = HashSet::new();
    for (name, _) in named {
        if !seen.insert(name.as_str()) {
            return Err(EvalError::new(format!("duplicate keyword argument {}", name)));
        }
    }
    Ok(())
}

fn make_struct(_thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    if !args.positional.is_empty() {
        return Err(EvalError::new("unexpected positional arguments"));
    }
    check_unique_keywords(&args.named)?;
    Ok(Value::Struct(Arc::new(Struct::from_keywords(args.named))))
}

fn make_module(_thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let name_args = Args {
        positional: args.positional,
        named: Vec::new(),
    };
    let unpacked = unpack_args(&name_args, &["name"])?;
    let name = match &unpacked[0] {
        Some(Value::String(s)) => s.to_string(),
        Some(other) => {
            return Err(EvalError::new(format!(
                "got {} for module name, want string",
                other.type_name()
            )))
        }
        None => return Err(EvalError::new("missing argument for name")),
    };
    check_unique_keywords(&args.named)?;
    let members: StringDict = args.named.into_iter().collect();
    Ok(Value::Module(Arc::new(Module::new(&name, members))))
}
