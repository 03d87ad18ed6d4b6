//! Operators: arithmetic, membership, indexing, slicing and attributes,
//! dispatched on the runtime types of the operands.

use std::sync::Arc;

use super::dict::{Dict, Set};
use super::error::{EvalError, EvalResult};
use super::function::Builtin;
use super::int::Int;
use super::methods;
use super::{format_float, Value};
use crate::ast::{BinaryOp, UnaryOp};

/// Upper bound on the length produced by `*` repetition.
const MAX_REPEAT_LEN: usize = 10_000_000;

pub fn binary(op: BinaryOp, x: &Value, y: &Value) -> EvalResult<Value> {
    use Value as V;
    let unknown = || EvalError::unknown_binary_op(op.symbol(), x.type_name(), y.type_name());

    match op {
        BinaryOp::Add => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.add(b))),
            (V::String(a), V::String(b)) => {
                let mut s = String::with_capacity(a.len() + b.len());
                s.push_str(a);
                s.push_str(b);
                Ok(V::from(s))
            }
            (V::List(a), V::List(b)) => {
                let mut elems = a.snapshot();
                elems.extend(b.snapshot());
                Ok(V::list(elems))
            }
            (V::Tuple(a), V::Tuple(b)) => {
                Ok(V::tuple(a.iter().chain(b.iter()).cloned().collect()))
            }
            (V::Struct(a), V::Struct(b)) => Ok(V::Struct(Arc::new(a.add(b)?))),
            _ => float_arith(op, x, y).ok_or_else(unknown)?,
        },
        BinaryOp::Sub => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.sub(b))),
            (V::Set(a), V::Set(b)) => {
                let out = Set::new();
                for v in a.elems() {
                    if !b.contains(&v)? {
                        out.insert(v)?;
                    }
                }
                Ok(V::set(out))
            }
            _ => float_arith(op, x, y).ok_or_else(unknown)?,
        },
        BinaryOp::Mul => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.mul(b))),
            (V::String(_) | V::List(_) | V::Tuple(_), V::Int(n)) => repeat(x, n),
            (V::Int(n), V::String(_) | V::List(_) | V::Tuple(_)) => repeat(y, n),
            _ => float_arith(op, x, y).ok_or_else(unknown)?,
        },
        BinaryOp::Div | BinaryOp::FloorDiv => match (x, y) {
            (V::Int(a), V::Int(b)) if op == BinaryOp::FloorDiv => Ok(V::Int(a.floor_div(b)?)),
            _ => float_arith(op, x, y).ok_or_else(unknown)?,
        },
        BinaryOp::Mod => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.modulo(b)?)),
            (V::String(fmt), _) => Ok(V::from(percent_format(fmt, y)?)),
            _ => float_arith(op, x, y).ok_or_else(unknown)?,
        },
        BinaryOp::BitAnd => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.bitand(b))),
            (V::Set(a), V::Set(b)) => {
                let out = Set::new();
                for v in a.elems() {
                    if b.contains(&v)? {
                        out.insert(v)?;
                    }
                }
                Ok(V::set(out))
            }
            _ => Err(unknown()),
        },
        BinaryOp::BitOr => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.bitor(b))),
            (V::Set(a), V::Set(b)) => {
                let out = Set::from_elems(a.elems())?;
                for v in b.elems() {
                    out.insert(v)?;
                }
                Ok(V::set(out))
            }
            (V::Dict(a), V::Dict(b)) => {
                let out = Dict::from_entries(a.items())?;
                for (k, v) in b.items() {
                    out.insert(k, v)?;
                }
                Ok(V::dict(out))
            }
            _ => Err(unknown()),
        },
        BinaryOp::BitXor => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(a.bitxor(b))),
            (V::Set(a), V::Set(b)) => {
                let out = Set::new();
                for v in a.elems() {
                    if !b.contains(&v)? {
                        out.insert(v)?;
                    }
                }
                for v in b.elems() {
                    if !a.contains(&v)? {
                        out.insert(v)?;
                    }
                }
                Ok(V::set(out))
            }
            _ => Err(unknown()),
        },
        BinaryOp::Shl | BinaryOp::Shr => match (x, y) {
            (V::Int(a), V::Int(b)) => Ok(V::Int(if op == BinaryOp::Shl {
                a.shl(b)?
            } else {
                a.shr(b)?
            })),
            _ => Err(unknown()),
        },
        BinaryOp::In => Ok(V::Bool(contains(y, x, op)?)),
        BinaryOp::NotIn => Ok(V::Bool(!contains(y, x, op)?)),
        BinaryOp::Eq
        | BinaryOp::Ne
        | BinaryOp::Lt
        | BinaryOp::Le
        | BinaryOp::Gt
        | BinaryOp::Ge => Ok(V::Bool(x.compare(op, y)?)),
        BinaryOp::And | BinaryOp::Or => Err(unknown()),
    }
}

fn as_float(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(i.to_f64()),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

/// Arithmetic where at least one side is a float (or `/` on ints).
/// `None` when the operands are not both numbers.
fn float_arith(op: BinaryOp, x: &Value, y: &Value) -> Option<EvalResult<Value>> {
    let (a, b) = (as_float(x)?, as_float(y)?);
    let r = match op {
        BinaryOp::Add => Ok(a + b),
        BinaryOp::Sub => Ok(a - b),
        BinaryOp::Mul => Ok(a * b),
        BinaryOp::Div if b == 0.0 => Err(EvalError::new("floating-point division by zero")),
        BinaryOp::Div => Ok(a / b),
        BinaryOp::FloorDiv if b == 0.0 => {
            Err(EvalError::new("floating-point division by zero"))
        }
        BinaryOp::FloorDiv => Ok((a / b).floor()),
        BinaryOp::Mod if b == 0.0 => Err(EvalError::new("floating-point modulo by zero")),
        BinaryOp::Mod => {
            let r = a % b;
            Ok(if r != 0.0 && ((r < 0.0) != (b < 0.0)) { r + b } else { r })
        }
        _ => return None,
    };
    Some(r.map(Value::Float))
}

fn repeat(seq: &Value, n: &Int) -> EvalResult<Value> {
    let count = if n.is_negative() {
        0
    } else {
        n.to_i64().unwrap_or(i64::MAX) as usize
    };
    let len = seq.len().unwrap_or(0);
    let count = if len == 0 { 0 } else { count };
    if len > 0 && count.checked_mul(len).map_or(true, |total| total > MAX_REPEAT_LEN) {
        return Err(EvalError::new(format!(
            "excessive repeat ({} * {} elements)",
            len, n
        )));
    }
    Ok(match seq {
        Value::String(s) => Value::from(s.repeat(count)),
        Value::List(l) => {
            let elems = l.snapshot();
            Value::list(repeat_elems(&elems, count))
        }
        Value::Tuple(t) => Value::tuple(repeat_elems(t, count)),
        _ => unreachable!("repeat called on {}", seq.type_name()),
    })
}

fn repeat_elems(elems: &[Value], count: usize) -> Vec<Value> {
    let mut out = Vec::with_capacity(elems.len() * count);
    for _ in 0..count {
        out.extend(elems.iter().cloned());
    }
    out
}

/// Membership: whether `container` holds `x`.
pub fn contains(container: &Value, x: &Value, op: BinaryOp) -> EvalResult<bool> {
    match container {
        Value::String(s) => match x {
            Value::String(needle) => Ok(s.contains(&**needle)),
            _ => Err(EvalError::new(format!(
                "'in <string>' requires string as left operand, not {}",
                x.type_name()
            ))),
        },
        Value::List(l) => {
            for e in l.snapshot() {
                if e.equals(x)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Tuple(t) => {
            for e in t.iter() {
                if e.equals(x)? {
                    return Ok(true);
                }
            }
            Ok(false)
        }
        Value::Dict(d) => d.contains(x),
        Value::Set(s) => s.contains(x),
        _ => Err(EvalError::unknown_binary_op(
            op.symbol(),
            x.type_name(),
            container.type_name(),
        )),
    }
}

/// `x += y`. Lists are extended in place; other types fall back to `+`.
pub fn inplace_add(x: &Value, y: &Value) -> EvalResult<Value> {
    if let Value::List(l) = x {
        if matches!(y, Value::List(_) | Value::Tuple(_) | Value::Dict(_) | Value::Set(_)) {
            l.check_mutable("apply += to")?;
            let elems = y.to_vec()?;
            l.extend(elems)?;
            return Ok(x.clone());
        }
    }
    binary(BinaryOp::Add, x, y)
}

/// `x |= y`. Dicts are updated in place; other types fall back to `|`.
pub fn inplace_pipe(x: &Value, y: &Value) -> EvalResult<Value> {
    if let (Value::Dict(a), Value::Dict(b)) = (x, y) {
        for (k, v) in b.items() {
            a.insert(k, v)?;
        }
        return Ok(x.clone());
    }
    binary(BinaryOp::BitOr, x, y)
}

pub fn unary(op: UnaryOp, x: &Value) -> EvalResult<Value> {
    match (op, x) {
        (UnaryOp::Not, _) => Ok(Value::Bool(!x.truth())),
        (UnaryOp::Minus, Value::Int(i)) => Ok(Value::Int(i.neg())),
        (UnaryOp::Minus, Value::Float(f)) => Ok(Value::Float(-f)),
        (UnaryOp::Plus, Value::Int(_) | Value::Float(_)) => Ok(x.clone()),
        (UnaryOp::Invert, Value::Int(i)) => Ok(Value::Int(i.invert())),
        _ => Err(EvalError::new(format!(
            "unknown unary op: {}{}",
            op.symbol(),
            x.type_name()
        ))),
    }
}

// ── Indexing ────────────────────────────────────────────────────────────

/// Resolves a possibly negative index against `len`.
fn seq_index(index: &Value, len: usize, type_name: &str) -> EvalResult<usize> {
    let Value::Int(i) = index else {
        return Err(EvalError::new(format!(
            "{} index: got {}, want int",
            type_name,
            index.type_name()
        )));
    };
    let n = len as i64;
    let negative = i.is_negative();
    let raw = i
        .to_i64()
        .unwrap_or(if negative { i64::MIN } else { i64::MAX });
    let adjusted = if negative { raw + n } else { raw };
    if adjusted < 0 || adjusted >= n {
        return Err(if negative {
            EvalError::new(format!("index {} out of range [{}:]", i, -n))
        } else {
            EvalError::new(format!("index {} out of range [0:{}]", i, n))
        });
    }
    Ok(adjusted as usize)
}

pub fn index(x: &Value, y: &Value) -> EvalResult<Value> {
    match x {
        Value::List(l) => {
            let i = seq_index(y, l.len(), "list")?;
            l.get(i)
                .ok_or_else(|| EvalError::new(format!("index {} out of range", i)))
        }
        Value::Tuple(t) => Ok(t[seq_index(y, t.len(), "tuple")?].clone()),
        Value::String(s) => {
            let i = seq_index(y, s.chars().count(), "string")?;
            s.chars()
                .nth(i)
                .map(|c| Value::from(c.to_string()))
                .ok_or_else(|| EvalError::new(format!("index {} out of range", i)))
        }
        Value::Dict(d) => match d.get(y)? {
            Some(v) => Ok(v),
            None => Err(EvalError::new(format!("key {} not in dict", y.repr()))),
        },
        _ => Err(EvalError::new(format!(
            "unhandled index operation {}[{}]",
            x.type_name(),
            y.type_name()
        ))),
    }
}

pub fn set_index(x: &Value, y: &Value, v: Value) -> EvalResult<()> {
    match x {
        Value::List(l) => {
            l.check_mutable("assign to element of")?;
            let i = seq_index(y, l.len(), "list")?;
            l.set(i, v)
        }
        Value::Dict(d) => d.insert(y.clone(), v),
        _ => Err(EvalError::new(format!(
            "{} value does not support item assignment",
            x.type_name()
        ))),
    }
}

fn slice_bound(v: &Value, what: &str) -> EvalResult<Option<i64>> {
    match v {
        Value::None => Ok(None),
        Value::Int(i) => Ok(Some(i.to_i64().unwrap_or(if i.is_negative() {
            i64::MIN
        } else {
            i64::MAX
        }))),
        _ => Err(EvalError::new(format!(
            "invalid {} index: got {}, want int",
            what,
            v.type_name()
        ))),
    }
}

/// The element indices selected by `[start:stop:step]` over `len` items.
fn slice_indices(len: usize, start: &Value, stop: &Value, step: &Value) -> EvalResult<Vec<usize>> {
    let step = slice_bound(step, "slice step")?.unwrap_or(1);
    if step == 0 {
        return Err(EvalError::new("zero is not a valid slice step"));
    }
    let n = len as i64;
    let clamp = |v: Option<i64>, default: i64| -> i64 {
        match v {
            None => default,
            Some(i) => {
                let i = if i < 0 { i.saturating_add(n) } else { i };
                if step > 0 {
                    i.clamp(0, n)
                } else {
                    i.clamp(-1, n - 1)
                }
            }
        }
    };
    let (lo, hi) = if step > 0 { (0, n) } else { (n - 1, -1) };
    let mut i = clamp(slice_bound(start, "start")?, lo);
    let stop = clamp(slice_bound(stop, "end")?, hi);

    let mut out = Vec::new();
    while (step > 0 && i < stop) || (step < 0 && i > stop) {
        out.push(i as usize);
        i = match i.checked_add(step) {
            Some(next) => next,
            None => break,
        };
    }
    Ok(out)
}

pub fn slice(x: &Value, start: &Value, stop: &Value, step: &Value) -> EvalResult<Value> {
    match x {
        Value::List(l) => {
            let elems = l.snapshot();
            let picked = slice_indices(elems.len(), start, stop, step)?;
            Ok(Value::list(picked.into_iter().map(|i| elems[i].clone()).collect()))
        }
        Value::Tuple(t) => {
            let picked = slice_indices(t.len(), start, stop, step)?;
            Ok(Value::tuple(picked.into_iter().map(|i| t[i].clone()).collect()))
        }
        Value::String(s) => {
            let chars: Vec<char> = s.chars().collect();
            let picked = slice_indices(chars.len(), start, stop, step)?;
            Ok(Value::from(picked.into_iter().map(|i| chars[i]).collect::<String>()))
        }
        _ => Err(EvalError::new(format!(
            "invalid slice operand {}",
            x.type_name()
        ))),
    }
}

// ── Attributes ──────────────────────────────────────────────────────────

pub fn attr(x: &Value, name: &str) -> EvalResult<Value> {
    match x {
        Value::Struct(s) => s.attr(name),
        Value::Module(m) => m.attr(name),
        _ => match methods::lookup(x, name) {
            Some(f) => Ok(Value::Builtin(Arc::new(Builtin::method(name, x.clone(), f)))),
            None => Err(EvalError::new(format!(
                "{} has no .{} field or method",
                x.type_name(),
                name
            ))),
        },
    }
}

pub fn has_attr(x: &Value, name: &str) -> bool {
    attr_names(x).iter().any(|n| n == name)
}

/// Attribute names in sorted order, as reported by `dir()`.
pub fn attr_names(x: &Value) -> Vec<String> {
    let mut names = match x {
        Value::Struct(s) => s.attr_names(),
        Value::Module(m) => m.attr_names(),
        _ => methods::names(x).iter().map(|n| n.to_string()).collect(),
    };
    names.sort();
    names
}

pub fn set_field(x: &Value, name: &str, _v: Value) -> EvalResult<()> {
    Err(EvalError::new(format!(
        "cannot set .{} field of {} value",
        name,
        x.type_name()
    )))
}

// ── String formatting ───────────────────────────────────────────────────

/// `fmt % args`: `%s %r %d %i %x %X %o %e %f %g %%`. A tuple supplies
/// one operand per directive; any other value is a single operand.
pub fn percent_format(fmt: &str, args: &Value) -> EvalResult<String> {
    let operands: Vec<Value> = match args {
        Value::Tuple(t) => t.to_vec(),
        other => vec![other.clone()],
    };
    let mut next = operands.iter();
    let mut out = String::with_capacity(fmt.len());
    let mut chars = fmt.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        let Some(directive) = chars.next() else {
            return Err(EvalError::new("incomplete format"));
        };
        if directive == '%' {
            out.push('%');
            continue;
        }
        let arg = next
            .next()
            .ok_or_else(|| EvalError::new("not enough arguments for format string"))?;
        match directive {
            's' => out.push_str(&arg.to_string()),
            'r' => out.push_str(&arg.repr()),
            'd' | 'i' => match arg {
                Value::Int(i) => out.push_str(&i.to_string()),
                Value::Float(f) => match Int::from_f64(*f) {
                    Some(i) => out.push_str(&i.to_string()),
                    None => return Err(EvalError::new(format!("cannot convert {} to int", format_float(*f)))),
                },
                _ => return Err(format_type_error(directive, "number", arg)),
            },
            'x' | 'X' | 'o' => {
                let Value::Int(i) = arg else {
                    return Err(format_type_error(directive, "integer", arg));
                };
                let radix = if directive == 'o' { 8 } else { 16 };
                let mut digits = i.to_str_radix(radix);
                if directive == 'X' {
                    digits = digits.to_uppercase();
                }
                out.push_str(&digits);
            }
            'e' | 'f' | 'g' => {
                let f = as_float(arg).ok_or_else(|| format_type_error(directive, "number", arg))?;
                out.push_str(&match directive {
                    'e' => format!("{:e}", f),
                    'f' => format!("{:.6}", f),
                    _ => format_float(f),
                });
            }
            other => {
                return Err(EvalError::new(format!(
                    "unsupported format character '{}'",
                    other
                )))
            }
        }
    }
    if next.next().is_some() {
        return Err(EvalError::new("too many arguments for format string"));
    }
    Ok(out)
}

fn format_type_error(directive: char, want: &str, got: &Value) -> EvalError {
    EvalError::new(format!(
        "%{} format requires {}: {}",
        directive,
        want,
        got.type_name()
    ))
}
