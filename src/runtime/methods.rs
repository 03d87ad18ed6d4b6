//! Built-in methods of strings, lists, dicts and sets.
//!
//! `x.name` looks the method up here and binds `x` as the receiver.

use super::builtins::{int_arg, str_arg};
use super::dict::Set;
use super::error::{EvalError, EvalResult};
use super::function::{required, unpack_args, Args, Builtin, BuiltinFn};
use super::thread::Thread;
use super::Value;

const STRING_METHODS: &[&str] = &[
    "capitalize", "count", "elems", "endswith", "find", "format", "index", "isalnum",
    "isalpha", "isdigit", "islower", "isspace", "isupper", "join", "lower", "lstrip",
    "partition", "removeprefix", "removesuffix", "replace", "rfind", "rindex", "rpartition",
    "rsplit", "rstrip", "split", "splitlines", "startswith", "strip", "title", "upper",
];

const LIST_METHODS: &[&str] = &["append", "clear", "extend", "index", "insert", "pop", "remove"];

const DICT_METHODS: &[&str] = &[
    "clear", "get", "items", "keys", "pop", "popitem", "setdefault", "update", "values",
];

const SET_METHODS: &[&str] = &[
    "add", "clear", "difference", "discard", "intersection", "issubset", "issuperset", "pop",
    "remove", "symmetric_difference", "union",
];

/// Method names of the value's type, sorted.
pub fn names(x: &Value) -> &'static [&'static str] {
    match x {
        Value::String(_) => STRING_METHODS,
        Value::List(_) => LIST_METHODS,
        Value::Dict(_) => DICT_METHODS,
        Value::Set(_) => SET_METHODS,
        _ => &[],
    }
}

pub fn lookup(x: &Value, name: &str) -> Option<BuiltinFn> {
    let f: BuiltinFn = match (x, name) {
        (Value::String(_), "capitalize") => str_capitalize,
        (Value::String(_), "count") => str_count,
        (Value::String(_), "elems") => str_elems,
        (Value::String(_), "endswith") => str_endswith,
        (Value::String(_), "find") => str_find,
        (Value::String(_), "format") => str_format,
        (Value::String(_), "index") => str_index,
        (Value::String(_), "isalnum") => str_isalnum,
        (Value::String(_), "isalpha") => str_isalpha,
        (Value::String(_), "isdigit") => str_isdigit,
        (Value::String(_), "islower") => str_islower,
        (Value::String(_), "isspace") => str_isspace,
        (Value::String(_), "isupper") => str_isupper,
        (Value::String(_), "join") => str_join,
        (Value::String(_), "lower") => str_lower,
        (Value::String(_), "lstrip") => str_lstrip,
        (Value::String(_), "partition") => str_partition,
        (Value::String(_), "removeprefix") => str_removeprefix,
        (Value::String(_), "removesuffix") => str_removesuffix,
        (Value::String(_), "replace") => str_replace,
        (Value::String(_), "rfind") => str_rfind,
        (Value::String(_), "rindex") => str_rindex,
        (Value::String(_), "rpartition") => str_rpartition,
        (Value::String(_), "rsplit") => str_rsplit,
        (Value::String(_), "rstrip") => str_rstrip,
        (Value::String(_), "split") => str_split,
        (Value::String(_), "splitlines") => str_splitlines,
        (Value::String(_), "startswith") => str_startswith,
        (Value::String(_), "strip") => str_strip,
        (Value::String(_), "title") => str_title,
        (Value::String(_), "upper") => str_upper,

        (Value::List(_), "append") => list_append,
        (Value::List(_), "clear") => list_clear,
        (Value::List(_), "extend") => list_extend,
        (Value::List(_), "index") => list_index,
        (Value::List(_), "insert") => list_insert,
        (Value::List(_), "pop") => list_pop,
        (Value::List(_), "remove") => list_remove,

        (Value::Dict(_), "clear") => dict_clear,
        (Value::Dict(_), "get") => dict_get,
        (Value::Dict(_), "items") => dict_items,
        (Value::Dict(_), "keys") => dict_keys,
        (Value::Dict(_), "pop") => dict_pop,
        (Value::Dict(_), "popitem") => dict_popitem,
        (Value::Dict(_), "setdefault") => dict_setdefault,
        (Value::Dict(_), "update") => dict_update,
        (Value::Dict(_), "values") => dict_values,

        (Value::Set(_), "add") => set_add,
        (Value::Set(_), "clear") => set_clear,
        (Value::Set(_), "difference") => set_difference,
        (Value::Set(_), "discard") => set_discard,
        (Value::Set(_), "intersection") => set_intersection,
        (Value::Set(_), "issubset") => set_issubset,
        (Value::Set(_), "issuperset") => set_issuperset,
        (Value::Set(_), "pop") => set_pop,
        (Value::Set(_), "remove") => set_remove,
        (Value::Set(_), "symmetric_difference") => set_symmetric_difference,
        (Value::Set(_), "union") => set_union,
        _ => return None,
    };
    Some(f)
}

// ── Receivers ───────────────────────────────────────────────────────────

fn recv_str(b: &Builtin) -> EvalResult<String> {
    match b.recv()? {
        Value::String(s) => Ok(s.to_string()),
        other => Err(wrong_receiver(other, "string")),
    }
}

fn recv_list(b: &Builtin) -> EvalResult<&super::List> {
    match b.recv()? {
        Value::List(l) => Ok(l.as_ref()),
        other => Err(wrong_receiver(other, "list")),
    }
}

fn recv_dict(b: &Builtin) -> EvalResult<&super::Dict> {
    match b.recv()? {
        Value::Dict(d) => Ok(d.as_ref()),
        other => Err(wrong_receiver(other, "dict")),
    }
}

fn recv_set(b: &Builtin) -> EvalResult<&Set> {
    match b.recv()? {
        Value::Set(s) => Ok(s.as_ref()),
        other => Err(wrong_receiver(other, "set")),
    }
}

fn wrong_receiver(got: &Value, want: &str) -> EvalError {
    EvalError::new(format!("got {} receiver, want {}", got.type_name(), want))
}

fn no_args(args: &Args) -> EvalResult<()> {
    unpack_args(args, &[]).map(|_| ())
}

// ── Strings ─────────────────────────────────────────────────────────────

fn str_transform(b: &Builtin, args: &Args, f: impl Fn(&str) -> String) -> EvalResult<Value> {
    no_args(args)?;
    Ok(Value::from(f(&recv_str(b)?)))
}

fn str_test(b: &Builtin, args: &Args, f: impl Fn(&str) -> bool) -> EvalResult<Value> {
    no_args(args)?;
    Ok(Value::Bool(f(&recv_str(b)?)))
}

fn str_lower(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_transform(b, &args, str::to_lowercase)
}

fn str_upper(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_transform(b, &args, str::to_uppercase)
}

fn str_capitalize(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_transform(b, &args, |s| {
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
            None => String::new(),
        }
    })
}

fn str_title(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_transform(b, &args, |s| {
        let mut out = String::with_capacity(s.len());
        let mut prev_letter = false;
        for c in s.chars() {
            if prev_letter {
                out.extend(c.to_lowercase());
            } else {
                out.extend(c.to_uppercase());
            }
            prev_letter = c.is_alphabetic();
        }
        out
    })
}

fn str_isalnum(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_test(b, &args, |s| !s.is_empty() && s.chars().all(char::is_alphanumeric))
}

fn str_isalpha(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_test(b, &args, |s| !s.is_empty() && s.chars().all(char::is_alphabetic))
}

fn str_isdigit(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_test(b, &args, |s| !s.is_empty() && s.chars().all(|c| c.is_ascii_digit()))
}

fn str_isspace(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_test(b, &args, |s| !s.is_empty() && s.chars().all(char::is_whitespace))
}

fn str_islower(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_test(b, &args, |s| {
        s.chars().any(char::is_lowercase) && !s.chars().any(char::is_uppercase)
    })
}

fn str_isupper(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    str_test(b, &args, |s| {
        s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
    })
}

fn str_elems(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    let s = recv_str(b)?;
    Ok(Value::list(s.chars().map(|c| Value::from(c.to_string())).collect()))
}

/// The `[start:end]` window of `s` used by the find family, as byte
/// offsets. Bounds count code points; negative ones count from the end.
fn window(s: &str, start: &Option<Value>, end: &Option<Value>) -> EvalResult<(usize, usize)> {
    let n = s.chars().count() as i64;
    let norm = |v: &Option<Value>, default: i64| -> EvalResult<usize> {
        let i = match v {
            None | Some(Value::None) => default,
            Some(v) => int_arg(v, "index")?,
        };
        let i = if i < 0 { (i + n).max(0) } else { i.min(n) };
        Ok(s.char_indices().nth(i as usize).map_or(s.len(), |(b, _)| b))
    };
    Ok((norm(start, 0)?, norm(end, n)?))
}

fn find_impl(b: &Builtin, args: &Args, last: bool) -> EvalResult<Option<usize>> {
    let slots = unpack_args(args, &["sub", "start?", "end?"])?;
    let s = recv_str(b)?;
    let sub = required(&slots[0]);
    let sub = str_arg(&sub, "sub")?;
    let (lo, hi) = window(&s, &slots[1], &slots[2])?;
    if lo > hi {
        return Ok(None);
    }
    let hay = &s[lo..hi];
    let found = if last { hay.rfind(sub) } else { hay.find(sub) };
    Ok(found.map(|i| s[..i + lo].chars().count()))
}

fn str_find(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    Ok(Value::from(find_impl(b, &args, false)?.map_or(-1, |i| i as i64)))
}

fn str_rfind(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    Ok(Value::from(find_impl(b, &args, true)?.map_or(-1, |i| i as i64)))
}

fn str_index(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    match find_impl(b, &args, false)? {
        Some(i) => Ok(Value::from(i as i64)),
        None => Err(EvalError::new("substring not found")),
    }
}

fn str_rindex(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    match find_impl(b, &args, true)? {
        Some(i) => Ok(Value::from(i as i64)),
        None => Err(EvalError::new("substring not found")),
    }
}

fn str_count(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["sub", "start?", "end?"])?;
    let s = recv_str(b)?;
    let sub = required(&slots[0]);
    let sub = str_arg(&sub, "sub")?;
    let (lo, hi) = window(&s, &slots[1], &slots[2])?;
    if lo > hi {
        return Ok(Value::from(0));
    }
    let hay = &s[lo..hi];
    let n = if sub.is_empty() {
        hay.chars().count() + 1
    } else {
        hay.matches(sub).count()
    };
    Ok(Value::from(n as i64))
}

/// The prefix or suffix argument: a string or a tuple of strings.
fn affix_test(b: &Builtin, args: &Args, test: fn(&str, &str) -> bool) -> EvalResult<Value> {
    let slots = unpack_args(args, &["x"])?;
    let s = recv_str(b)?;
    match required(&slots[0]) {
        Value::String(x) => Ok(Value::Bool(test(&s, &x))),
        Value::Tuple(t) => {
            for item in t.iter() {
                if test(&s, str_arg(item, "element of tuple")?) {
                    return Ok(Value::Bool(true));
                }
            }
            Ok(Value::Bool(false))
        }
        other => Err(EvalError::new(format!(
            "got {}, want string or tuple of strings",
            other.type_name()
        ))),
    }
}

fn str_startswith(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    affix_test(b, &args, |s, x| s.starts_with(x))
}

fn str_endswith(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    affix_test(b, &args, |s, x| s.ends_with(x))
}

fn str_removeprefix(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["prefix"])?;
    let s = recv_str(b)?;
    let p = required(&slots[0]);
    let p = str_arg(&p, "prefix")?;
    Ok(Value::string(s.strip_prefix(p).unwrap_or(&s)))
}

fn str_removesuffix(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["suffix"])?;
    let s = recv_str(b)?;
    let p = required(&slots[0]);
    let p = str_arg(&p, "suffix")?;
    Ok(Value::string(s.strip_suffix(p).unwrap_or(&s)))
}

fn strip_impl(b: &Builtin, args: &Args, left: bool, right: bool) -> EvalResult<Value> {
    let slots = unpack_args(args, &["cutset?"])?;
    let s = recv_str(b)?;
    let out = match &slots[0] {
        None | Some(Value::None) => {
            let t = if left { s.trim_start() } else { s.as_str() };
            if right {
                t.trim_end()
            } else {
                t
            }
        }
        Some(v) => {
            let cutset: Vec<char> = str_arg(v, "cutset")?.chars().collect();
            let t = if left {
                s.trim_start_matches(cutset.as_slice())
            } else {
                s.as_str()
            };
            if right {
                t.trim_end_matches(cutset.as_slice())
            } else {
                t
            }
        }
    };
    Ok(Value::string(out))
}

fn str_strip(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    strip_impl(b, &args, true, true)
}

fn str_lstrip(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    strip_impl(b, &args, true, false)
}

fn str_rstrip(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    strip_impl(b, &args, false, true)
}

fn partition_impl(b: &Builtin, args: &Args, last: bool) -> EvalResult<Value> {
    let slots = unpack_args(args, &["sep"])?;
    let s = recv_str(b)?;
    let sep = required(&slots[0]);
    let sep = str_arg(&sep, "sep")?;
    if sep.is_empty() {
        return Err(EvalError::new("empty separator"));
    }
    let found = if last { s.rfind(sep) } else { s.find(sep) };
    let parts = match found {
        Some(i) => [&s[..i], sep, &s[i + sep.len()..]],
        None if last => ["", "", s.as_str()],
        None => [s.as_str(), "", ""],
    };
    Ok(Value::tuple(parts.iter().map(|p| Value::string(p)).collect()))
}

fn str_partition(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    partition_impl(b, &args, false)
}

fn str_rpartition(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    partition_impl(b, &args, true)
}

fn str_replace(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["old", "new", "count?"])?;
    let s = recv_str(b)?;
    let old = required(&slots[0]);
    let new = required(&slots[1]);
    let (old, new) = (str_arg(&old, "old")?, str_arg(&new, "new")?);
    let out = match &slots[2] {
        Some(v) if !matches!(v, Value::None) => {
            let n = int_arg(v, "count")?;
            if n < 0 {
                s.replace(old, new)
            } else {
                s.replacen(old, new, n as usize)
            }
        }
        _ => s.replace(old, new),
    };
    Ok(Value::from(out))
}

fn split_impl(b: &Builtin, args: &Args, from_right: bool) -> EvalResult<Value> {
    let slots = unpack_args(args, &["sep?", "maxsplit?"])?;
    let s = recv_str(b)?;
    let maxsplit = match &slots[1] {
        None | Some(Value::None) => -1,
        Some(v) => int_arg(v, "maxsplit")?,
    };
    let limit = if maxsplit < 0 { usize::MAX } else { maxsplit as usize + 1 };

    let parts: Vec<String> = match &slots[0] {
        None | Some(Value::None) => {
            let words: Vec<&str> = s.split_whitespace().collect();
            if words.len() <= limit {
                words.into_iter().map(str::to_string).collect()
            } else if from_right {
                let keep = words.len() - (limit - 1);
                let head_end = nth_word_end(&s, keep);
                let mut out = vec![s[..head_end].trim().to_string()];
                out.extend(words[keep..].iter().map(|w| w.to_string()));
                out
            } else {
                let tail_start = nth_word_start(&s, limit - 1);
                let mut out: Vec<String> =
                    words[..limit - 1].iter().map(|w| w.to_string()).collect();
                out.push(s[tail_start..].trim_end().to_string());
                out
            }
        }
        Some(v) => {
            let sep = str_arg(v, "sep")?;
            if sep.is_empty() {
                return Err(EvalError::new("empty separator"));
            }
            if from_right {
                let mut parts: Vec<String> = s.rsplitn(limit, sep).map(str::to_string).collect();
                parts.reverse();
                parts
            } else {
                s.splitn(limit, sep).map(str::to_string).collect()
            }
        }
    };
    Ok(Value::list(parts.into_iter().map(Value::from).collect()))
}

/// Byte offset of the start of the `n`th whitespace-separated word.
fn nth_word_start(s: &str, n: usize) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            in_word = false;
        } else if !in_word {
            if count == n {
                return i;
            }
            count += 1;
            in_word = true;
        }
    }
    s.len()
}

/// Byte offset just past the end of the `n`th word (1-based count).
fn nth_word_end(s: &str, n: usize) -> usize {
    let mut count = 0;
    let mut in_word = false;
    for (i, c) in s.char_indices() {
        if c.is_whitespace() {
            if in_word && count == n {
                return i;
            }
            in_word = false;
        } else if !in_word {
            count += 1;
            in_word = true;
        }
    }
    s.len()
}

fn str_split(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    split_impl(b, &args, false)
}

fn str_rsplit(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    split_impl(b, &args, true)
}

fn str_splitlines(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["keepends?"])?;
    let keep = slots[0].as_ref().is_some_and(Value::truth);
    let s = recv_str(b)?;
    let mut lines = Vec::new();
    let mut rest = s.as_str();
    while !rest.is_empty() {
        let (line, next) = match rest.find('\n') {
            Some(i) => (&rest[..=i], &rest[i + 1..]),
            None => (rest, ""),
        };
        let line = if keep {
            line
        } else {
            line.trim_end_matches('\n').trim_end_matches('\r')
        };
        lines.push(Value::string(line));
        rest = next;
    }
    Ok(Value::list(lines))
}

fn str_join(thread: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["iterable"])?;
    let sep = recv_str(b)?;
    let mut out = String::new();
    for (i, item) in required(&slots[0]).iterate()?.enumerate() {
        if i % 1024 == 0 {
            thread.check_cancelled()?;
        }
        let Value::String(s) = &item else {
            return Err(EvalError::new(format!(
                "in list, want string, got {}",
                item.type_name()
            )));
        };
        if i > 0 {
            out.push_str(&sep);
        }
        out.push_str(s);
    }
    Ok(Value::from(out))
}

/// `"{} {0} {name!r}".format(...)`; `{{` and `}}` are literal braces.
fn str_format(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let fmt = recv_str(b)?;
    let mut out = String::with_capacity(fmt.len());
    let mut auto_index = 0usize;
    let mut chars = fmt.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '{' if chars.peek() == Some(&'{') => {
                chars.next();
                out.push('{');
            }
            '}' if chars.peek() == Some(&'}') => {
                chars.next();
                out.push('}');
            }
            '}' => return Err(EvalError::new("single '}' in format")),
            '{' => {
                let mut field = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(c) => field.push(c),
                        None => return Err(EvalError::new("unmatched '{' in format")),
                    }
                }
                let (name, conv) = match field.split_once('!') {
                    Some((n, c)) => (n.to_string(), c.to_string()),
                    None => (field, "s".to_string()),
                };
                let arg = if name.is_empty() {
                    let v = args.positional.get(auto_index).cloned().ok_or_else(|| {
                        EvalError::new(format!("tuple index out of range: {}", auto_index))
                    })?;
                    auto_index += 1;
                    v
                } else if let Ok(i) = name.parse::<usize>() {
                    args.positional.get(i).cloned().ok_or_else(|| {
                        EvalError::new(format!("tuple index out of range: {}", i))
                    })?
                } else {
                    args.named
                        .iter()
                        .find(|(k, _)| *k == name)
                        .map(|(_, v)| v.clone())
                        .ok_or_else(|| EvalError::new(format!("keyword {} not found", name)))?
                };
                match conv.as_str() {
                    "s" => out.push_str(&arg.to_string()),
                    "r" => out.push_str(&arg.repr()),
                    other => {
                        return Err(EvalError::new(format!(
                            "unknown conversion {:?}",
                            other
                        )))
                    }
                }
            }
            c => out.push(c),
        }
    }
    Ok(Value::from(out))
}

// ── Lists ───────────────────────────────────────────────────────────────

fn list_append(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    recv_list(b)?.append(required(&slots[0]))?;
    Ok(Value::None)
}

fn list_clear(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    recv_list(b)?.clear()?;
    Ok(Value::None)
}

fn list_extend(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["iterable"])?;
    let list = recv_list(b)?;
    list.check_mutable("extend")?;
    list.extend(required(&slots[0]).to_vec()?)?;
    Ok(Value::None)
}

fn list_index(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x", "start?", "end?"])?;
    let elems = recv_list(b)?.snapshot();
    let x = required(&slots[0]);
    let n = elems.len() as i64;
    let bound = |v: &Option<Value>, default: i64| -> EvalResult<usize> {
        let i = match v {
            None | Some(Value::None) => default,
            Some(v) => int_arg(v, "index")?,
        };
        Ok((if i < 0 { (i + n).max(0) } else { i.min(n) }) as usize)
    };
    let (lo, hi) = (bound(&slots[1], 0)?, bound(&slots[2], n)?);
    for (i, e) in elems.iter().enumerate().take(hi).skip(lo) {
        if e.equals(&x)? {
            return Ok(Value::from(i as i64));
        }
    }
    Err(EvalError::new("value not in list"))
}

fn list_insert(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["index", "x"])?;
    let list = recv_list(b)?;
    let i = int_arg(&required(&slots[0]), "index")?;
    let n = list.len() as i64;
    let i = if i < 0 { (i + n).max(0) } else { i.min(n) };
    list.insert(i as usize, required(&slots[1]))?;
    Ok(Value::None)
}

fn list_pop(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["index?"])?;
    let list = recv_list(b)?;
    list.check_mutable("pop from")?;
    let n = list.len() as i64;
    let raw = match &slots[0] {
        None | Some(Value::None) => -1,
        Some(v) => int_arg(v, "index")?,
    };
    let i = if raw < 0 { raw + n } else { raw };
    if i < 0 || i >= n {
        return Err(EvalError::new(format!("index {} out of range [{}:{}]", raw, -n, n)));
    }
    list.remove_at(i as usize)
}

fn list_remove(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["x"])?;
    let list = recv_list(b)?;
    list.check_mutable("remove from")?;
    let x = required(&slots[0]);
    for (i, e) in list.snapshot().iter().enumerate() {
        if e.equals(&x)? {
            list.remove_at(i)?;
            return Ok(Value::None);
        }
    }
    Err(EvalError::new("element not found"))
}

// ── Dicts ───────────────────────────────────────────────────────────────

fn dict_clear(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    recv_dict(b)?.clear()?;
    Ok(Value::None)
}

fn dict_get(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["key", "default?"])?;
    let found = recv_dict(b)?.get(&required(&slots[0]))?;
    Ok(found.or_else(|| slots[1].clone()).unwrap_or(Value::None))
}

fn dict_items(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    let items = recv_dict(b)?.items();
    Ok(Value::list(
        items.into_iter().map(|(k, v)| Value::tuple(vec![k, v])).collect(),
    ))
}

fn dict_keys(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    Ok(Value::list(recv_dict(b)?.keys()))
}

fn dict_values(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    Ok(Value::list(recv_dict(b)?.values()))
}

fn dict_pop(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["key", "default?"])?;
    let key = required(&slots[0]);
    match recv_dict(b)?.remove(&key)? {
        Some(v) => Ok(v),
        None => slots[1]
            .clone()
            .ok_or_else(|| EvalError::new(format!("missing key {}", key.repr()))),
    }
}

fn dict_popitem(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    match recv_dict(b)?.pop_first()? {
        Some((k, v)) => Ok(Value::tuple(vec![k, v])),
        None => Err(EvalError::new("empty dict")),
    }
}

fn dict_setdefault(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["key", "default?"])?;
    let dict = recv_dict(b)?;
    let key = required(&slots[0]);
    if let Some(v) = dict.get(&key)? {
        return Ok(v);
    }
    let default = slots[1].clone().unwrap_or(Value::None);
    dict.insert(key, default.clone())?;
    Ok(default)
}

fn dict_update(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    if args.positional.len() > 1 {
        return Err(EvalError::new(format!(
            "got {} arguments, want at most 1",
            args.positional.len()
        )));
    }
    let dict = recv_dict(b)?;
    if let Some(src) = args.positional.first() {
        for (k, v) in super::builtins::pairs(src)? {
            dict.insert(k, v)?;
        }
    }
    for (k, v) in args.named {
        dict.insert(Value::from(k), v)?;
    }
    Ok(Value::None)
}

// ── Sets ────────────────────────────────────────────────────────────────

fn set_add(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["elem"])?;
    recv_set(b)?.insert(required(&slots[0]))?;
    Ok(Value::None)
}

fn set_clear(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    recv_set(b)?.clear()?;
    Ok(Value::None)
}

fn set_discard(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["elem"])?;
    recv_set(b)?.remove(&required(&slots[0]))?;
    Ok(Value::None)
}

fn set_remove(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["elem"])?;
    let elem = required(&slots[0]);
    if recv_set(b)?.remove(&elem)? {
        Ok(Value::None)
    } else {
        Err(EvalError::new(format!("missing key {}", elem.repr())))
    }
}

fn set_pop(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    no_args(&args)?;
    recv_set(b)?
        .pop_first()?
        .ok_or_else(|| EvalError::new("empty set"))
}

/// Elements of the positional arguments, each an iterable.
fn variadic_sets(args: &Args) -> EvalResult<Vec<Set>> {
    if let Some((k, _)) = args.named.first() {
        return Err(EvalError::new(format!("unexpected keyword argument {}", k)));
    }
    args.positional
        .iter()
        .map(|v| Set::from_elems(v.to_vec()?))
        .collect()
}

fn set_union(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let out = Set::from_elems(recv_set(b)?.elems())?;
    for other in variadic_sets(&args)? {
        for v in other.elems() {
            out.insert(v)?;
        }
    }
    Ok(Value::set(out))
}

fn set_intersection(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let mut current = recv_set(b)?.elems();
    for other in variadic_sets(&args)? {
        let mut kept = Vec::new();
        for v in current {
            if other.contains(&v)? {
                kept.push(v);
            }
        }
        current = kept;
    }
    Ok(Value::set(Set::from_elems(current)?))
}

fn set_difference(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let mut current = recv_set(b)?.elems();
    for other in variadic_sets(&args)? {
        let mut kept = Vec::new();
        for v in current {
            if !other.contains(&v)? {
                kept.push(v);
            }
        }
        current = kept;
    }
    Ok(Value::set(Set::from_elems(current)?))
}

fn set_symmetric_difference(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["other"])?;
    let this = recv_set(b)?;
    let other = Set::from_elems(required(&slots[0]).to_vec()?)?;
    let out = Set::new();
    for v in this.elems() {
        if !other.contains(&v)? {
            out.insert(v)?;
        }
    }
    for v in other.elems() {
        if !this.contains(&v)? {
            out.insert(v)?;
        }
    }
    Ok(Value::set(out))
}

fn set_issubset(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["other"])?;
    let other = Set::from_elems(required(&slots[0]).to_vec()?)?;
    for v in recv_set(b)?.elems() {
        if !other.contains(&v)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}

fn set_issuperset(_t: &mut Thread, b: &Builtin, args: Args) -> EvalResult<Value> {
    let slots = unpack_args(&args, &["other"])?;
    let this = recv_set(b)?;
    for v in required(&slots[0]).to_vec()? {
        if !this.contains(&v)? {
            return Ok(Value::Bool(false));
        }
    }
    Ok(Value::Bool(true))
}
