//! The dynamic value model.
//!
//! `Value` is a closed enum; every variant is cheap to clone (reference
//! counted) and `Send + Sync`. Mutable containers carry a frozen flag and
//! an active-iterator count, and every mutation checks both.

pub mod builtins;
pub mod dict;
pub mod error;
pub mod function;
pub mod int;
pub mod list;
pub mod methods;
pub mod ops;
pub mod structs;
pub mod thread;

use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;

use crate::ast::BinaryOp;

pub use dict::{Dict, Set};
pub use error::{CallFrame, ErrorKind, EvalError, EvalResult};
pub use function::{unpack_args, Args, Builtin, BuiltinFn, Cell, Function};
pub use int::Int;
pub use list::List;
pub use structs::{Module, Struct};
pub use thread::{CancelToken, Load, Thread};

/// Name-ordered bindings: predeclared environments and module globals.
pub type StringDict = BTreeMap<String, Value>;

/// Equality recursion limit for nested containers.
const MAX_EQUALITY_DEPTH: usize = 10;
/// Beyond this depth hashing contributes a constant, keeping cyclic frozen
/// values hashable.
const MAX_HASH_DEPTH: usize = 64;

/// Container hashes computed during one `hash()` call, keyed by identity
/// and depth. Shared and cyclic substructure is hashed once per depth, so
/// the work stays linear in the size of the value graph.
pub(crate) type HashMemo = HashMap<(usize, usize), u32>;

#[derive(Clone)]
pub enum Value {
    None,
    Bool(bool),
    Int(Int),
    Float(f64),
    String(Arc<str>),
    List(Arc<List>),
    Tuple(Arc<[Value]>),
    Dict(Arc<Dict>),
    Set(Arc<Set>),
    Function(Arc<Function>),
    Builtin(Arc<Builtin>),
    Struct(Arc<Struct>),
    Module(Arc<Module>),
}

// ── Mutation guard ──────────────────────────────────────────────────────

#[derive(Default)]
pub(crate) struct MutationGuard {
    frozen: AtomicBool,
    iterators: AtomicUsize,
}

impl MutationGuard {
    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::Acquire)
    }

    /// Sets the frozen flag; returns true if it was not already set.
    pub(crate) fn freeze(&self) -> bool {
        !self.frozen.swap(true, AtomicOrdering::AcqRel)
    }

    pub(crate) fn check(&self, verb: &str, type_name: &str) -> EvalResult<()> {
        if self.is_frozen() {
            return Err(EvalError::frozen(format!("cannot {} frozen {}", verb, type_name)));
        }
        if self.iterators.load(AtomicOrdering::Acquire) > 0 {
            return Err(EvalError::with_kind(
                ErrorKind::IterationMutation,
                format!("cannot {} {} during iteration", verb, type_name),
            ));
        }
        Ok(())
    }

    /// Frozen containers cannot change, so only mutable ones are tracked.
    /// Returns whether `end_iteration` must be called.
    fn begin_iteration(&self) -> bool {
        if self.is_frozen() {
            return false;
        }
        self.iterators.fetch_add(1, AtomicOrdering::AcqRel);
        true
    }

    fn end_iteration(&self) {
        self.iterators.fetch_sub(1, AtomicOrdering::AcqRel);
    }
}

// ── Iteration ───────────────────────────────────────────────────────────

enum IterSource {
    List(Arc<List>),
    Dict(Arc<Dict>),
    Set(Arc<Set>),
    Elems(Arc<[Value]>),
}

/// An iterator over a container. While it is alive the container rejects
/// mutation.
pub struct ValueIter {
    source: IterSource,
    index: usize,
    tracked: bool,
}

impl Iterator for ValueIter {
    type Item = Value;

    fn next(&mut self) -> Option<Value> {
        let v = match &self.source {
            IterSource::List(l) => l.get(self.index),
            IterSource::Dict(d) => d.entry_at(self.index).map(|(k, _)| k),
            IterSource::Set(s) => s.elem_at(self.index),
            IterSource::Elems(e) => e.get(self.index).cloned(),
        };
        if v.is_some() {
            self.index += 1;
        }
        v
    }
}

impl Drop for ValueIter {
    fn drop(&mut self) {
        if !self.tracked {
            return;
        }
        match &self.source {
            IterSource::List(l) => l.guard().end_iteration(),
            IterSource::Dict(d) => d.guard().end_iteration(),
            IterSource::Set(s) => s.guard().end_iteration(),
            IterSource::Elems(_) => {}
        }
    }
}

// ── Constructors ────────────────────────────────────────────────────────

impl Value {
    pub fn string(s: &str) -> Value {
        Value::String(Arc::from(s))
    }

    pub fn list(elems: Vec<Value>) -> Value {
        Value::List(Arc::new(List::new(elems)))
    }

    pub fn tuple(elems: Vec<Value>) -> Value {
        Value::Tuple(Arc::from(elems))
    }

    pub fn dict(d: Dict) -> Value {
        Value::Dict(Arc::new(d))
    }

    pub fn set(s: Set) -> Value {
        Value::Set(Arc::new(s))
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(Int::Small(i))
    }
}

impl From<Int> for Value {
    fn from(i: Int) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::string(s)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(Arc::from(s))
    }
}

// ── Core behaviour ──────────────────────────────────────────────────────

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::None => "NoneType",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Function(_) => "function",
            Value::Builtin(_) => "builtin_function_or_method",
            Value::Struct(_) => "struct",
            Value::Module(_) => "module",
        }
    }

    pub fn truth(&self) -> bool {
        match self {
            Value::None => false,
            Value::Bool(b) => *b,
            Value::Int(i) => !i.is_zero(),
            Value::Float(f) => *f != 0.0,
            Value::String(s) => !s.is_empty(),
            Value::List(l) => !l.is_empty(),
            Value::Tuple(t) => !t.is_empty(),
            Value::Dict(d) => !d.is_empty(),
            Value::Set(s) => !s.is_empty(),
            Value::Function(_) | Value::Builtin(_) | Value::Struct(_) | Value::Module(_) => true,
        }
    }

    /// Makes the value and everything reachable from it immutable.
    /// Idempotent; safe on cyclic values.
    pub fn freeze(&self) {
        match self {
            Value::List(l) => l.freeze(),
            Value::Tuple(t) => t.iter().for_each(Value::freeze),
            Value::Dict(d) => d.freeze(),
            Value::Set(s) => s.freeze(),
            Value::Function(f) => f.freeze(),
            Value::Builtin(b) => {
                if let Some(r) = &b.receiver {
                    r.freeze();
                }
            }
            Value::Struct(s) => s.freeze(),
            Value::Module(m) => m.freeze(),
            Value::None | Value::Bool(_) | Value::Int(_) | Value::Float(_) | Value::String(_) => {}
        }
    }

    /// Whether a mutating operation on this value would be rejected.
    pub fn is_frozen(&self) -> bool {
        match self {
            Value::List(l) => l.is_frozen(),
            Value::Dict(d) => d.is_frozen(),
            Value::Set(s) => s.is_frozen(),
            _ => true,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<&Int> {
        match self {
            Value::Int(i) => Some(i),
            _ => None,
        }
    }

    /// Number of elements for sized values.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::List(l) => Some(l.len()),
            Value::Tuple(t) => Some(t.len()),
            Value::Dict(d) => Some(d.len()),
            Value::Set(s) => Some(s.len()),
            _ => None,
        }
    }

    pub fn iterate(&self) -> EvalResult<ValueIter> {
        let (source, tracked) = match self {
            Value::List(l) => (IterSource::List(l.clone()), l.guard().begin_iteration()),
            Value::Dict(d) => (IterSource::Dict(d.clone()), d.guard().begin_iteration()),
            Value::Set(s) => (IterSource::Set(s.clone()), s.guard().begin_iteration()),
            Value::Tuple(t) => (IterSource::Elems(t.clone()), false),
            _ => {
                return Err(EvalError::new(format!("{} value is not iterable", self.type_name())));
            }
        };
        Ok(ValueIter {
            source,
            index: 0,
            tracked,
        })
    }

    /// Collects the elements of an iterable value.
    pub fn to_vec(&self) -> EvalResult<Vec<Value>> {
        match self {
            Value::List(l) => Ok(l.snapshot()),
            Value::Tuple(t) => Ok(t.to_vec()),
            _ => Ok(self.iterate()?.collect()),
        }
    }

    // ── Hashing ─────────────────────────────────────────────────────────

    /// Deterministic across runs. Mutable containers are unhashable.
    pub fn hash(&self) -> EvalResult<u32> {
        self.hash_depth(0, &mut HashMemo::new())
    }

    fn hash_depth(&self, depth: usize, memo: &mut HashMemo) -> EvalResult<u32> {
        if depth > MAX_HASH_DEPTH {
            return Ok(0);
        }
        let id = match self {
            Value::List(l) => Some(Arc::as_ptr(l) as *const u8 as usize),
            Value::Tuple(t) => Some(Arc::as_ptr(t) as *const u8 as usize),
            Value::Dict(d) => Some(Arc::as_ptr(d) as *const u8 as usize),
            Value::Struct(s) => Some(Arc::as_ptr(s) as *const u8 as usize),
            _ => None,
        };
        let Some(id) = id else {
            return self.hash_node(depth, memo);
        };
        if let Some(h) = memo.get(&(id, depth)) {
            return Ok(*h);
        }
        let h = self.hash_node(depth, memo)?;
        memo.insert((id, depth), h);
        Ok(h)
    }

    fn hash_node(&self, depth: usize, memo: &mut HashMemo) -> EvalResult<u32> {
        match self {
            Value::None => Ok(0),
            Value::Bool(b) => Ok(*b as u32),
            Value::Int(i) => Ok(i.hash()),
            Value::Float(f) => Ok(float_hash(*f)),
            Value::String(s) => Ok(hash_bytes(s.as_bytes())),
            Value::Tuple(t) => seq_hash(t, depth, memo),
            Value::List(l) => {
                if !l.is_frozen() {
                    return Err(EvalError::unhashable("list"));
                }
                seq_hash(&l.snapshot(), depth, memo)
            }
            Value::Dict(d) => {
                if !d.is_frozen() {
                    return Err(EvalError::unhashable("dict"));
                }
                // Order-independent, as dict equality is.
                let mut x: u32 = 0x3b9a_ca07;
                for (k, v) in d.items() {
                    let pair = k
                        .hash_depth(depth + 1, memo)?
                        .wrapping_mul(31)
                        ^ v.hash_depth(depth + 1, memo)?;
                    x = x.wrapping_add(pair);
                }
                Ok(x)
            }
            Value::Set(s) => {
                if !s.is_frozen() {
                    return Err(EvalError::unhashable("set"));
                }
                Ok(s.with_table(|t| {
                    t.hashes()
                        .iter()
                        .fold(0x0139_a3b5u32, |acc, h| acc.wrapping_add(*h))
                }))
            }
            Value::Struct(s) => s.hash(depth, memo),
            Value::Function(f) => {
                let pos = f.pos();
                Ok(hash_bytes(f.name().as_bytes()) ^ pos.line.wrapping_mul(1_000_003) ^ pos.col)
            }
            Value::Builtin(b) => Ok(hash_bytes(b.name.as_bytes())),
            Value::Module(m) => Ok(hash_bytes(m.name().as_bytes())),
        }
    }

    // ── Equality and ordering ───────────────────────────────────────────

    /// Structural equality, bounded in depth.
    pub fn equals(&self, other: &Value) -> EvalResult<bool> {
        self.equals_depth(other, 0)
    }

    pub(crate) fn equals_depth(&self, other: &Value, depth: usize) -> EvalResult<bool> {
        if depth > MAX_EQUALITY_DEPTH {
            return Err(EvalError::new("comparison exceeded maximum recursion depth"));
        }
        Ok(match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                int_float_cmp(a, *b) == Ordering::Equal
            }
            (Value::Float(a), Value::Float(b)) => float_cmp(*a, *b) == Ordering::Equal,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) => {
                Arc::ptr_eq(a, b) || seq_equal(&a.snapshot(), &b.snapshot(), depth)?
            }
            (Value::Tuple(a), Value::Tuple(b)) => seq_equal(a, b, depth)?,
            (Value::Dict(a), Value::Dict(b)) => {
                if Arc::ptr_eq(a, b) {
                    return Ok(true);
                }
                if a.len() != b.len() {
                    return Ok(false);
                }
                for (k, v) in a.items() {
                    match b.get(&k)? {
                        Some(w) if v.equals_depth(&w, depth + 1)? => {}
                        _ => return Ok(false),
                    }
                }
                true
            }
            (Value::Set(a), Value::Set(b)) => {
                if a.len() != b.len() {
                    return Ok(false);
                }
                for v in a.elems() {
                    if !b.contains(&v)? {
                        return Ok(false);
                    }
                }
                true
            }
            (Value::Struct(a), Value::Struct(b)) => a.equals(b, depth)?,
            (Value::Function(a), Value::Function(b)) => Arc::ptr_eq(a, b),
            (Value::Builtin(a), Value::Builtin(b)) => {
                a.name == b.name
                    && match (&a.receiver, &b.receiver) {
                        (None, None) => true,
                        (Some(x), Some(y)) => same_identity(x, y),
                        _ => false,
                    }
            }
            (Value::Module(a), Value::Module(b)) => Arc::ptr_eq(a, b),
            _ => false,
        })
    }

    /// Applies a comparison operator (`== != < <= > >=`).
    pub fn compare(&self, op: BinaryOp, other: &Value) -> EvalResult<bool> {
        match op {
            BinaryOp::Eq => self.equals(other),
            BinaryOp::Ne => Ok(!self.equals(other)?),
            BinaryOp::Lt => Ok(self.order(other, op.symbol(), 0)? == Ordering::Less),
            BinaryOp::Le => Ok(self.order(other, op.symbol(), 0)? != Ordering::Greater),
            BinaryOp::Gt => Ok(self.order(other, op.symbol(), 0)? == Ordering::Greater),
            BinaryOp::Ge => Ok(self.order(other, op.symbol(), 0)? != Ordering::Less),
            _ => Err(EvalError::unknown_binary_op(
                op.symbol(),
                self.type_name(),
                other.type_name(),
            )),
        }
    }

    /// Total order used by `<` and `sorted`. Unordered type pairs fail.
    pub fn order(&self, other: &Value, op: &str, depth: usize) -> EvalResult<Ordering> {
        if depth > MAX_EQUALITY_DEPTH {
            return Err(EvalError::new("comparison exceeded maximum recursion depth"));
        }
        match (self, other) {
            (Value::Int(a), Value::Int(b)) => Ok(a.cmp(b)),
            (Value::Int(a), Value::Float(b)) => Ok(int_float_cmp(a, *b)),
            (Value::Float(a), Value::Int(b)) => Ok(int_float_cmp(b, *a).reverse()),
            (Value::Float(a), Value::Float(b)) => Ok(float_cmp(*a, *b)),
            (Value::String(a), Value::String(b)) => Ok(a.as_bytes().cmp(b.as_bytes())),
            (Value::Bool(a), Value::Bool(b)) => Ok(a.cmp(b)),
            (Value::List(a), Value::List(b)) => seq_order(&a.snapshot(), &b.snapshot(), op, depth),
            (Value::Tuple(a), Value::Tuple(b)) => seq_order(a, b, op, depth),
            _ => Err(EvalError::unknown_binary_op(
                op,
                self.type_name(),
                other.type_name(),
            )),
        }
    }

    // ── Rendering ───────────────────────────────────────────────────────

    /// The quoted form used for elements of containers and by `repr()`.
    pub fn repr(&self) -> String {
        let mut out = String::new();
        self.write_to(&mut out, true, &mut Vec::new());
        out
    }

    fn write_to(&self, out: &mut String, quote: bool, path: &mut Vec<usize>) {
        match self {
            Value::None => out.push_str("None"),
            Value::Bool(true) => out.push_str("True"),
            Value::Bool(false) => out.push_str("False"),
            Value::Int(i) => out.push_str(&i.to_string()),
            Value::Float(f) => out.push_str(&format_float(*f)),
            Value::String(s) => {
                if quote {
                    out.push_str(&quote_string(s));
                } else {
                    out.push_str(s);
                }
            }
            Value::List(l) => {
                let id = Arc::as_ptr(l) as *const u8 as usize;
                if path.contains(&id) {
                    out.push_str("[...]");
                    return;
                }
                path.push(id);
                out.push('[');
                write_elems(out, &l.snapshot(), path);
                out.push(']');
                path.pop();
            }
            Value::Tuple(t) => {
                out.push('(');
                write_elems(out, t, path);
                if t.len() == 1 {
                    out.push(',');
                }
                out.push(')');
            }
            Value::Dict(d) => {
                let id = Arc::as_ptr(d) as *const u8 as usize;
                if path.contains(&id) {
                    out.push_str("{...}");
                    return;
                }
                path.push(id);
                out.push('{');
                for (i, (k, v)) in d.items().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    k.write_to(out, true, path);
                    out.push_str(": ");
                    v.write_to(out, true, path);
                }
                out.push('}');
                path.pop();
            }
            Value::Set(s) => {
                out.push_str("set([");
                write_elems(out, &s.elems(), path);
                out.push_str("])");
            }
            Value::Function(f) => {
                out.push_str("<function ");
                out.push_str(f.name());
                out.push('>');
            }
            Value::Builtin(b) => match &b.receiver {
                Some(r) => {
                    out.push_str(&format!("<built-in method {} of {} value>", b.name, r.type_name()))
                }
                None => out.push_str(&format!("<built-in function {}>", b.name)),
            },
            Value::Struct(s) => {
                let id = Arc::as_ptr(s) as *const u8 as usize;
                if path.contains(&id) {
                    out.push_str("struct(...)");
                    return;
                }
                path.push(id);
                s.constructor().write_to(out, false, path);
                out.push('(');
                for (i, (name, v)) in s.fields().iter().enumerate() {
                    if i > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(" = ");
                    v.write_to(out, true, path);
                }
                out.push(')');
                path.pop();
            }
            Value::Module(m) => out.push_str(&format!("<module {:?}>", m.name())),
        }
    }

    /// Plain-data conversion for JSON output. Functions and other
    /// non-data values are rendered as strings.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Value::None => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Int(i) => match i.to_i64() {
                Some(n) => Json::from(n),
                None => Json::String(i.to_string()),
            },
            Value::Float(f) => serde_json::Number::from_f64(*f)
                .map(Json::Number)
                .unwrap_or_else(|| Json::String(format_float(*f))),
            Value::String(s) => Json::String(s.to_string()),
            Value::List(l) => Json::Array(l.snapshot().iter().map(Value::to_json).collect()),
            Value::Tuple(t) => Json::Array(t.iter().map(Value::to_json).collect()),
            Value::Set(s) => Json::Array(s.elems().iter().map(Value::to_json).collect()),
            Value::Dict(d) => Json::Object(
                d.items()
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_json()))
                    .collect(),
            ),
            Value::Struct(s) => Json::Object(
                s.fields()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
            other => Json::String(other.to_string()),
        }
    }
}

impl fmt::Display for Value {
    /// Strings render without quotes; everything else as `repr`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut out = String::new();
        self.write_to(&mut out, false, &mut Vec::new());
        f.write_str(&out)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.repr())
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────

/// 32-bit FNV-1a.
pub(crate) fn hash_bytes(bytes: &[u8]) -> u32 {
    let mut h: u32 = 0x811c_9dc5;
    for b in bytes {
        h ^= *b as u32;
        h = h.wrapping_mul(0x0100_0193);
    }
    h
}

fn float_hash(f: f64) -> u32 {
    if f.fract() == 0.0 {
        if let Some(i) = Int::from_f64(f) {
            return i.hash();
        }
    }
    let bits = f.to_bits();
    (bits ^ (bits >> 32)) as u32
}

fn seq_hash(elems: &[Value], depth: usize, memo: &mut HashMemo) -> EvalResult<u32> {
    let mut x: u32 = 0x0034_5678;
    let mut mult: u32 = 1_000_003;
    for e in elems {
        let y = e.hash_depth(depth + 1, memo)?;
        x ^= y.wrapping_mul(mult);
        mult = mult.wrapping_add(82520 + 2 * elems.len() as u32);
    }
    Ok(x)
}

fn seq_equal(a: &[Value], b: &[Value], depth: usize) -> EvalResult<bool> {
    if a.len() != b.len() {
        return Ok(false);
    }
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.equals_depth(y, depth + 1)? {
            return Ok(false);
        }
    }
    Ok(true)
}

fn seq_order(a: &[Value], b: &[Value], op: &str, depth: usize) -> EvalResult<Ordering> {
    for (x, y) in a.iter().zip(b.iter()) {
        if !x.equals_depth(y, depth + 1)? {
            return x.order(y, op, depth + 1);
        }
    }
    Ok(a.len().cmp(&b.len()))
}

/// NaN sorts above every other float and equal to itself.
fn float_cmp(a: f64, b: f64) -> Ordering {
    match (a.is_nan(), b.is_nan()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
    }
}

/// Exact comparison of an int with a float.
fn int_float_cmp(a: &Int, b: f64) -> Ordering {
    if b.is_nan() {
        return Ordering::Less;
    }
    if b.is_infinite() {
        return if b > 0.0 { Ordering::Less } else { Ordering::Greater };
    }
    let floor = b.floor();
    match Int::from_f64(floor) {
        Some(fi) => match a.cmp(&fi) {
            Ordering::Equal if b > floor => Ordering::Less,
            o => o,
        },
        None => float_cmp(a.to_f64(), b),
    }
}

fn same_identity(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::List(x), Value::List(y)) => Arc::ptr_eq(x, y),
        (Value::Dict(x), Value::Dict(y)) => Arc::ptr_eq(x, y),
        (Value::Set(x), Value::Set(y)) => Arc::ptr_eq(x, y),
        (Value::String(x), Value::String(y)) => x == y,
        _ => false,
    }
}

fn write_elems(out: &mut String, elems: &[Value], path: &mut Vec<usize>) {
    for (i, e) in elems.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        e.write_to(out, true, path);
    }
}

/// Renders a float: integral values keep a `.0`, very large or small
/// magnitudes use an exponent (`1e+20`), infinities are signed.
pub fn format_float(f: f64) -> String {
    if f.is_nan() {
        return "nan".to_string();
    }
    if f.is_infinite() {
        return if f > 0.0 { "+inf" } else { "-inf" }.to_string();
    }
    let abs = f.abs();
    if abs != 0.0 && !(1e-4..1e16).contains(&abs) {
        let s = format!("{:e}", f);
        let (mantissa, exp) = s.split_once('e').unwrap_or((&s, "0"));
        let (sign, digits) = match exp.strip_prefix('-') {
            Some(d) => ('-', d),
            None => ('+', exp),
        };
        return format!("{}e{}{:0>2}", mantissa, sign, digits);
    }
    if f.fract() == 0.0 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

/// Double-quoted string literal with escapes.
pub fn quote_string(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('"');
    for c in s.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            '\r' => out.push_str("\\r"),
            c if (c as u32) < 0x20 || c as u32 == 0x7f => {
                out.push_str(&format!("\\x{:02x}", c as u32));
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
