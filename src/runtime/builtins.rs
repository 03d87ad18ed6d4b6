//! The universe: names every program can use without declaring them.

use std::cmp::Ordering;
use std::sync::Arc;

use num_bigint::BigInt;

use super::dict::{Dict, Set};
use super::error::{EvalError, EvalResult};
use super::function::{required, unpack_args, Args, Builtin, BuiltinFn};
use super::int::Int;
use super::ops;
use super::thread::Thread;
use super::{StringDict, Value};
use crate::vm::machine;

/// Elements produced by `range()` are capped at this count.
const MAX_RANGE_LEN: i64 = 10_000_000;
/// Long loops poll for cancellation once per this many iterations.
const CANCEL_POLL_INTERVAL: usize = 1 << 16;

pub const UNIVERSAL_NAMES: &[&str] = &[
    "False", "None", "True", "abs", "all", "any", "bool", "dict", "dir", "enumerate", "fail",
    "float", "getattr", "hasattr", "hash", "int", "len", "list", "max", "min", "print", "range",
    "repr", "reversed", "set", "sorted", "str", "tuple", "type", "zip",
];

pub fn is_universal(name: &str) -> bool {
    UNIVERSAL_NAMES.binary_search(&name).is_ok()
}

/// Builds a fresh universe. Each thread owns its own copy.
pub fn universe() -> StringDict {
    let funcs: &[(&str, BuiltinFn)] = &[
        ("abs", builtin_abs),
        ("all", builtin_all),
        ("any", builtin_any),
        ("bool", builtin_bool),
        ("dict", builtin_dict),
        ("dir", builtin_dir),
        ("enumerate", builtin_enumerate),
        ("fail", builtin_fail),
        ("float", builtin_float),
        ("getattr", builtin_getattr),
        ("hasattr", builtin_hasattr),
        ("hash", builtin_hash),
        ("int", builtin_int),
        ("len", builtin_len),
        ("list", builtin_list),
        ("max", builtin_max),
        ("min", builtin_min),
        ("print", builtin_print),
        ("range", builtin_range),
        ("repr", builtin_repr),
        ("reversed", builtin_reversed),
        ("set", builtin_set),
        ("sorted", builtin_sorted),
        ("str", builtin_str),
        ("tuple", builtin_tuple),
        ("type", builtin_type),
        ("zip", builtin_zip),
    ];
    let mut env = StringDict::new();
    env.insert("None".to_string(), Value::None);
    env.insert("True".to_string(), Value::Bool(true));
    env.insert("False".to_string(), Value::Bool(false));
    for (name, f) in funcs {
        env.insert(name.to_string(), Value::Builtin(Arc::new(Builtin::new(name, *f))));
    }
    env
}

// ── Argument helpers ────────────────────────────────────────────────────

pub(crate) fn int_arg(v: &Value, what: &str) -> EvalResult<i64> {
    match v {
        Value::Int(i) => i
            .to_i64()
            .ok_or_else(|| EvalError::new(format!("{} out of range: {}", what, i))),
        _ => Err(EvalError::new(format!(
            "for {}, got {}, want int",
            what,
            v.type_name()
        ))),
    }
}

pub(crate) fn str_arg<'a>(v: &'a Value, what: &str) -> EvalResult<&'a str> {
    match v {
        Value::String(s) => Ok(s),
        _ => Err(EvalError::new(format!(
            "for {}, got {}, want string",
            what,
            v.type_name()
        ))),
    }
}

/// Key/value pairs from a dict or an iterable of 2-element iterables.
pub(crate) fn pairs(src: &Value) -> EvalResult<Vec<(Value, Value)>> {
    if let Value::Dict(d) = src {
        return Ok(d.items());
    }
    let mut out = Vec::new();
    for (i, item) in src.iterate()?.enumerate() {
        let elems = match &item {
            Value::List(_) | Value::Tuple(_) => item.to_vec()?,
            _ => {
                return Err(EvalError::new(format!(
                    "dictionary update sequence element #{} is not iterable ({})",
                    i,
                    item.type_name()
                )))
            }
        };
        let [k, v] = <[Value; 2]>::try_from(elems).map_err(|e| {
            EvalError::new(format!(
                "dictionary update sequence element #{} has length {}, want 2",
                i,
                e.len()
            ))
        })?;
        out.push((k, v));
    }
    Ok(out)
}

fn no_named(args: &Args) -> EvalResult<()> {
    match args.named.first() {
        Some((k, _)) => Err(EvalError::new(format!("unexpected keyword argument {}", k))),
        None => Ok(()),
    }
}

fn optional_iterable(slot: &Option<Value>) -> EvalResult<Vec<Value>> {
    match slot {
        Some(v) => v.to_vec(),
        None => Ok(Vec::new()),
    }
}

// ── Builtins ────────────────────────────────────────────────────────────

fn builtin_abs(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    match required(&slots[0]) {
        Value::Int(i) if i.is_negative() => Ok(Value::Int(i.neg())),
        v @ Value::Int(_) => Ok(v),
        Value::Float(f) => Ok(Value::Float(f.abs())),
        other => Err(EvalError::new(format!("got {}, want int or float", other.type_name()))),
    }
}

fn builtin_all(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    let all = required(&slots[0]).iterate()?.all(|v| v.truth());
    Ok(Value::Bool(all))
}

fn builtin_any(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    let any = required(&slots[0]).iterate()?.any(|v| v.truth());
    Ok(Value::Bool(any))
}

fn builtin_bool(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x?"])?;
    Ok(Value::Bool(slots[0].as_ref().is_some_and(Value::truth)))
}

fn builtin_dict(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    if args.positional.len() > 1 {
        return Err(EvalError::new(format!(
            "got {} arguments, want at most 1",
            args.positional.len()
        )));
    }
    let dict = Dict::new();
    if let Some(src) = args.positional.first() {
        for (k, v) in pairs(src)? {
            dict.insert(k, v)?;
        }
    }
    for (k, v) in args.named {
        dict.insert(Value::from(k), v)?;
    }
    Ok(Value::dict(dict))
}

fn builtin_dir(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    let names = ops::attr_names(&required(&slots[0]));
    Ok(Value::list(names.into_iter().map(Value::from).collect()))
}

fn builtin_enumerate(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x", "start?"])?;
    let start = match &slots[1] {
        Some(v) => int_arg(v, "start")?,
        None => 0,
    };
    let items = required(&slots[0])
        .iterate()?
        .enumerate()
        .map(|(i, v)| Value::tuple(vec![Value::from(start + i as i64), v]))
        .collect();
    Ok(Value::list(items))
}

/// Aborts execution with a user-supplied message.
fn builtin_fail(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let mut sep = " ".to_string();
    for (k, v) in &args.named {
        match k.as_str() {
            "sep" => sep = str_arg(v, "sep")?.to_string(),
            _ => return Err(EvalError::new(format!("unexpected keyword argument {}", k))),
        }
    }
    let parts: Vec<String> = args.positional.iter().map(Value::to_string).collect();
    Err(EvalError::new(parts.join(&sep)))
}

fn builtin_float(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x?"])?;
    let Some(x) = &slots[0] else {
        return Ok(Value::Float(0.0));
    };
    match x {
        Value::Bool(b) => Ok(Value::Float(if *b { 1.0 } else { 0.0 })),
        Value::Int(i) => Ok(Value::Float(i.to_f64())),
        Value::Float(_) => Ok(x.clone()),
        Value::String(s) => parse_float(s)
            .map(Value::Float)
            .ok_or_else(|| EvalError::new(format!("invalid float literal: {}", s))),
        other => Err(EvalError::new(format!(
            "{} value is not convertible to float",
            other.type_name()
        ))),
    }
}

fn parse_float(s: &str) -> Option<f64> {
    let t = s.trim();
    let (sign, body) = match t.strip_prefix('-') {
        Some(rest) => (-1.0, rest),
        None => (1.0, t.strip_prefix('+').unwrap_or(t)),
    };
    match body.to_ascii_lowercase().as_str() {
        "inf" | "infinity" => Some(sign * f64::INFINITY),
        "nan" => Some(f64::NAN),
        _ => body.parse::<f64>().ok().map(|f| sign * f),
    }
}

fn builtin_getattr(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x", "name", "default?"])?;
    let x = required(&slots[0]);
    let name = required(&slots[1]);
    let name = str_arg(&name, "name")?;
    match ops::attr(&x, name) {
        Ok(v) => Ok(v),
        Err(e) => slots[2].clone().ok_or(e),
    }
}

fn builtin_hasattr(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x", "name"])?;
    let name = required(&slots[1]);
    let name = str_arg(&name, "name")?;
    Ok(Value::Bool(ops::has_attr(&required(&slots[0]), name)))
}

fn builtin_hash(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    Ok(Value::from(required(&slots[0]).hash()? as i64))
}

fn builtin_int(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x?", "base?"])?;
    let Some(x) = &slots[0] else {
        return Ok(Value::from(0));
    };
    if let Value::String(s) = x {
        let base = match &slots[1] {
            Some(b) => int_arg(b, "base")?,
            None => 10,
        };
        return parse_int(s, base).map(Value::Int);
    }
    if slots[1].is_some() {
        return Err(EvalError::new("can't convert non-string with explicit base"));
    }
    match x {
        Value::Bool(b) => Ok(Value::from(*b as i64)),
        Value::Int(_) => Ok(x.clone()),
        Value::Float(f) => Int::from_f64(*f)
            .map(Value::Int)
            .ok_or_else(|| EvalError::new(format!("cannot convert float {} to integer", super::format_float(*f)))),
        other => Err(EvalError::new(format!(
            "{} value is not convertible to int",
            other.type_name()
        ))),
    }
}

/// Parses an integer literal. Base 0 infers the base from a `0x`, `0o`
/// or `0b` prefix.
fn parse_int(s: &str, base: i64) -> EvalResult<Int> {
    let invalid = || {
        EvalError::new(format!(
            "invalid literal for int() with base {}: {}",
            base,
            super::quote_string(s)
        ))
    };
    if base != 0 && !(2..=36).contains(&base) {
        return Err(EvalError::new("base must be an integer >= 2 && <= 36"));
    }
    let t = s.trim();
    let (negative, body) = match t.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, t.strip_prefix('+').unwrap_or(t)),
    };
    let lower = body.to_ascii_lowercase();
    let prefixed = |p: &str, b: u32| lower.strip_prefix(p).map(|rest| (rest.to_string(), b));
    let (digits, radix) = match base {
        0 => prefixed("0x", 16)
            .or_else(|| prefixed("0o", 8))
            .or_else(|| prefixed("0b", 2))
            .unwrap_or((lower.clone(), 10)),
        16 => prefixed("0x", 16).unwrap_or((lower.clone(), 16)),
        8 => prefixed("0o", 8).unwrap_or((lower.clone(), 8)),
        2 => prefixed("0b", 2).unwrap_or((lower.clone(), 2)),
        b => (lower.clone(), b as u32),
    };
    if digits.is_empty() || digits.starts_with(['+', '-']) {
        return Err(invalid());
    }
    let n = BigInt::parse_bytes(digits.as_bytes(), radix).ok_or_else(invalid)?;
    Ok(Int::from_bigint(if negative { -n } else { n }))
}

fn builtin_len(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    let x = required(&slots[0]);
    match x.len() {
        Some(n) => Ok(Value::from(n as i64)),
        None => Err(EvalError::new(format!(
            "value of type {} has no len",
            x.type_name()
        ))),
    }
}

fn builtin_list(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x?"])?;
    Ok(Value::list(optional_iterable(&slots[0])?))
}

fn builtin_tuple(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x?"])?;
    Ok(Value::tuple(optional_iterable(&slots[0])?))
}

fn builtin_set(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x?"])?;
    Ok(Value::set(Set::from_elems(optional_iterable(&slots[0])?)?))
}

/// Shared body of `min` and `max`: a single iterable or several
/// positional arguments, with an optional `key` function.
fn extremum(thread: &mut Thread, args: Args, want: Ordering) -> EvalResult<Value> {
    let mut key = None;
    for (k, v) in &args.named {
        match k.as_str() {
            "key" if !matches!(v, Value::None) => key = Some(v.clone()),
            "key" => {}
            _ => return Err(EvalError::new(format!("unexpected keyword argument {}", k))),
        }
    }
    let candidates = match args.positional.len() {
        0 => return Err(EvalError::new("got 0 arguments, want at least 1")),
        1 => args.positional[0].to_vec()?,
        _ => args.positional,
    };
    let mut best: Option<(Value, Value)> = None;
    for v in candidates {
        let k = match &key {
            Some(f) => machine::call(thread, f, Args::positional(vec![v.clone()]))?,
            None => v.clone(),
        };
        let better = match &best {
            None => true,
            Some((bk, _)) => k.order(bk, "<", 0)? == want,
        };
        if better {
            best = Some((k, v));
        }
    }
    best.map(|(_, v)| v)
        .ok_or_else(|| EvalError::new("argument is an empty sequence"))
}

fn builtin_max(thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    extremum(thread, args, Ordering::Greater)
}

fn builtin_min(thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    extremum(thread, args, Ordering::Less)
}

fn builtin_print(thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let mut sep = " ".to_string();
    for (k, v) in &args.named {
        match k.as_str() {
            "sep" => sep = str_arg(v, "sep")?.to_string(),
            _ => return Err(EvalError::new(format!("unexpected keyword argument {}", k))),
        }
    }
    let parts: Vec<String> = args.positional.iter().map(Value::to_string).collect();
    thread.print(&parts.join(&sep));
    Ok(Value::None)
}

/// `range(stop)` or `range(start, stop[, step])`, materialised as a list.
fn builtin_range(thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    no_named(&args)?;
    let slots = unpack_args(&args, &["start_or_stop", "stop?", "step?"])?;
    let first = int_arg(&required(&slots[0]), "start")?;
    let (start, stop) = match &slots[1] {
        Some(v) => (first, int_arg(v, "stop")?),
        None => (0, first),
    };
    let step = match &slots[2] {
        Some(v) => int_arg(v, "step")?,
        None => 1,
    };
    if step == 0 {
        return Err(EvalError::new("step argument must not be zero"));
    }
    let span = if step > 0 {
        (stop as i128 - start as i128).max(0)
    } else {
        (start as i128 - stop as i128).max(0)
    };
    let len = (span + step.unsigned_abs() as i128 - 1) / step.unsigned_abs() as i128;
    if len > MAX_RANGE_LEN as i128 {
        return Err(EvalError::new(format!(
            "range of {} elements exceeds the limit of {}",
            len, MAX_RANGE_LEN
        )));
    }
    let mut out = Vec::with_capacity(len as usize);
    let mut i = start;
    for n in 0..len as usize {
        if n % CANCEL_POLL_INTERVAL == 0 {
            thread.check_cancelled()?;
        }
        out.push(Value::from(i));
        i = i.wrapping_add(step);
    }
    Ok(Value::list(out))
}

fn builtin_repr(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    Ok(Value::from(required(&slots[0]).repr()))
}

fn builtin_reversed(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["sequence"])?;
    let mut elems = required(&slots[0]).to_vec()?;
    elems.reverse();
    Ok(Value::list(elems))
}

/// Stable sort. Comparison failures (mixed types) abort the sort.
fn builtin_sorted(thread: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["iterable", "key?", "reverse?"])?;
    let elems = required(&slots[0]).to_vec()?;
    let key = slots[1].clone().filter(|k| !matches!(k, Value::None));
    let reverse = slots[2].as_ref().is_some_and(Value::truth);

    let mut keyed = Vec::with_capacity(elems.len());
    for (n, v) in elems.into_iter().enumerate() {
        if n % CANCEL_POLL_INTERVAL == 0 {
            thread.check_cancelled()?;
        }
        let k = match &key {
            Some(f) => machine::call(thread, f, Args::positional(vec![v.clone()]))?,
            None => v.clone(),
        };
        keyed.push((k, v));
    }

    let mut failure = None;
    keyed.sort_by(|(a, _), (b, _)| {
        if failure.is_some() {
            return Ordering::Equal;
        }
        match a.order(b, "<", 0) {
            Ok(o) if reverse => o.reverse(),
            Ok(o) => o,
            Err(e) => {
                failure = Some(e);
                Ordering::Equal
            }
        }
    });
    if let Some(e) = failure {
        return Err(e);
    }
    thread.check_cancelled()?;
    Ok(Value::list(keyed.into_iter().map(|(_, v)| v).collect()))
}

fn builtin_str(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    match required(&slots[0]) {
        s @ Value::String(_) => Ok(s),
        other => Ok(Value::from(other.to_string())),
    }
}

fn builtin_type(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    Ok(Value::string(required(&slots[0]).type_name()))
}

fn builtin_zip(_t: &mut Thread, _b: &Builtin, args: Args) -> EvalResult<Value> {
    no_named(&args)?;
    let columns = args
        .positional
        .iter()
        .map(Value::to_vec)
        .collect::<EvalResult<Vec<_>>>()?;
    let rows = columns.iter().map(Vec::len).min().unwrap_or(0);
    let out = (0..rows)
        .map(|i| Value::tuple(columns.iter().map(|c| c[i].clone()).collect()))
        .collect();
    Ok(Value::list(out))
}
