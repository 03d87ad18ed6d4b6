//! Kestrel virtual machine: stack-based bytecode execution
//!
//! Every active call has a Frame on its thread's frame stack. Calls from
//! one compiled function to another push a frame and continue in the same
//! dispatch loop; builtins run on the host stack under a builtin frame so
//! that tracebacks name them. On failure the call stack is captured before
//! any frame is popped, then every frame pushed since the entry point is
//! discarded.

use std::sync::Arc;

use parking_lot::RwLock;

use super::bytecode::{Funcode, Program};
use super::opcodes::Instruction;
use crate::ast::{BinaryOp, UnaryOp};
use crate::resolve::Scope;
use crate::runtime::{
    ops, Args, Builtin, CallFrame, Cell, Dict, EvalError, EvalResult, Function, StringDict,
    Thread, Value, ValueIter,
};

pub const MAX_CALL_DEPTH: usize = 1000;

/// The state shared by all functions of one execution of a Program:
/// its globals, the predeclared environment and the constant values.
pub struct ModuleEnv {
    pub(crate) program: Arc<Program>,
    predeclared: StringDict,
    constants: Vec<Value>,
    globals: RwLock<Vec<Option<Value>>>,
}

impl ModuleEnv {
    fn new(program: Arc<Program>, predeclared: StringDict) -> Self {
        let constants = program.constants.iter().map(|c| c.to_value()).collect();
        let globals = RwLock::new(vec![None; program.globals.len()]);
        Self {
            program,
            predeclared,
            constants,
            globals,
        }
    }

    /// Bound globals by name.
    fn globals(&self) -> StringDict {
        let values = self.globals.read();
        self.program
            .globals
            .iter()
            .zip(values.iter())
            .filter_map(|(g, v)| v.as_ref().map(|v| (g.name.clone(), v.clone())))
            .collect()
    }
}

/// A local variable slot.
#[derive(Clone)]
enum Slot {
    Empty,
    Value(Value),
    /// A local captured by a nested function.
    Cell(Arc<Cell>),
}

enum Callee {
    Function(Arc<Function>),
    Builtin(Arc<Builtin>),
}

/// One activation record.
pub struct Frame {
    callee: Callee,
    /// Index of the next instruction.
    pc: usize,
    stack: Vec<Value>,
    locals: Vec<Slot>,
    iterators: Vec<ValueIter>,
}

impl Frame {
    fn function(f: Arc<Function>, locals: Vec<Slot>) -> Frame {
        Frame {
            callee: Callee::Function(f),
            pc: 0,
            stack: Vec::with_capacity(16),
            locals,
            iterators: Vec::new(),
        }
    }

    fn builtin(b: Arc<Builtin>) -> Frame {
        Frame {
            callee: Callee::Builtin(b),
            pc: 0,
            stack: Vec::new(),
            locals: Vec::new(),
            iterators: Vec::new(),
        }
    }

    /// The traceback entry for this frame: the position of the
    /// instruction being executed.
    pub(crate) fn call_frame(&self) -> CallFrame {
        match &self.callee {
            Callee::Function(f) => {
                let fc = f.funcode();
                CallFrame {
                    name: fc.name.clone(),
                    location: Some((
                        f.module.program.filename.clone(),
                        fc.position(self.pc.saturating_sub(1)),
                    )),
                }
            }
            Callee::Builtin(b) => CallFrame {
                name: b.name.clone(),
                location: None,
            },
        }
    }

    fn pop(&mut self) -> Value {
        // The compiler keeps the operand stack balanced.
        self.stack.pop().unwrap_or(Value::None)
    }

    fn popn(&mut self, n: usize) -> Vec<Value> {
        let at = self.stack.len().saturating_sub(n);
        self.stack.split_off(at)
    }

    fn push(&mut self, v: Value) {
        self.stack.push(v);
    }
}

// ── Entry points ─────────────────────────────────────────────────────────

/// Executes the toplevel of `program` against `predeclared` and returns
/// its globals, frozen.
pub fn init(
    thread: &mut Thread,
    program: &Arc<Program>,
    predeclared: &StringDict,
) -> EvalResult<StringDict> {
    let (_, module) = run_toplevel(thread, program, predeclared)?;
    let globals = module.globals();
    for v in globals.values() {
        v.freeze();
    }
    Ok(globals)
}

/// Executes a program built by `compile_expr` and returns the value of
/// its expression.
pub fn eval(
    thread: &mut Thread,
    program: &Arc<Program>,
    predeclared: &StringDict,
) -> EvalResult<Value> {
    run_toplevel(thread, program, predeclared).map(|(v, _)| v)
}

fn run_toplevel(
    thread: &mut Thread,
    program: &Arc<Program>,
    predeclared: &StringDict,
) -> EvalResult<(Value, Arc<ModuleEnv>)> {
    let module = Arc::new(ModuleEnv::new(program.clone(), predeclared.clone()));
    let toplevel = Arc::new(Function {
        module: module.clone(),
        funcode: 0,
        defaults: Vec::new(),
        freevars: Vec::new(),
    });

    let base = thread.frames.len();
    if base >= MAX_CALL_DEPTH {
        return Err(depth_exceeded());
    }
    let locals = new_slots(toplevel.funcode(), Vec::new());
    thread.frames.push(Frame::function(toplevel, locals));
    let value = run(thread, base)?;
    Ok((value, module))
}

impl Program {
    /// Runs the toplevel; see [`init`].
    pub fn init(
        self: &Arc<Self>,
        thread: &mut Thread,
        predeclared: &StringDict,
    ) -> EvalResult<StringDict> {
        init(thread, self, predeclared)
    }
}

/// Calls any callable value.
pub fn call(thread: &mut Thread, callee: &Value, args: Args) -> EvalResult<Value> {
    match callee {
        Value::Function(f) => {
            let base = thread.frames.len();
            enter(thread, f.clone(), args)?;
            run(thread, base)
        }
        Value::Builtin(b) => call_builtin(thread, b, args),
        other => Err(not_callable(other)),
    }
}

fn not_callable(v: &Value) -> EvalError {
    EvalError::new(format!("invalid call of non-function ({})", v.type_name()))
}

fn depth_exceeded() -> EvalError {
    EvalError::new(format!("call stack depth exceeded {}", MAX_CALL_DEPTH))
}

fn call_builtin(thread: &mut Thread, b: &Arc<Builtin>, args: Args) -> EvalResult<Value> {
    if thread.frames.len() >= MAX_CALL_DEPTH {
        return Err(depth_exceeded());
    }
    thread.frames.push(Frame::builtin(b.clone()));
    let result = (b.func)(thread, b, args).map_err(|e| {
        if e.has_call_stack() {
            e
        } else {
            let mut e = e.prefix(&b.name);
            e.attach_call_stack(thread.call_stack());
            e
        }
    });
    thread.frames.pop();
    result
}

// ── Calls ────────────────────────────────────────────────────────────────

/// Binds `args` to the parameters of `f` and pushes its frame.
fn enter(thread: &mut Thread, f: Arc<Function>, args: Args) -> EvalResult<()> {
    if thread.frames.len() >= MAX_CALL_DEPTH {
        return Err(depth_exceeded());
    }
    if !f.module.program.recursion {
        let recursive = thread.frames.iter().any(|fr| match &fr.callee {
            Callee::Function(g) => {
                g.funcode == f.funcode && Arc::ptr_eq(&g.module.program, &f.module.program)
            }
            Callee::Builtin(_) => false,
        });
        if recursive {
            return Err(EvalError::new(format!(
                "function {} called recursively",
                f.name()
            )));
        }
    }
    let values = bind_args(&f, args)?;
    let locals = new_slots(f.funcode(), values);
    thread.frames.push(Frame::function(f, locals));
    Ok(())
}

/// Local slots for a new frame. Captured locals get a fresh cell.
fn new_slots(fc: &Funcode, mut values: Vec<Option<Value>>) -> Vec<Slot> {
    values.resize(fc.locals.len(), None);
    fc.locals
        .iter()
        .zip(values)
        .map(|(local, v)| match (local.cell, v) {
            (true, v) => Slot::Cell(Arc::new(Cell::new(v))),
            (false, Some(v)) => Slot::Value(v),
            (false, None) => Slot::Empty,
        })
        .collect()
}

/// Matches call arguments to parameters: positional, then named, then
/// defaults. Surplus arguments go to `*args` and `**kwargs` if present.
fn bind_args(f: &Function, args: Args) -> EvalResult<Vec<Option<Value>>> {
    let fc = f.funcode();
    let name = fc.name.as_str();
    let nparams = fc.num_params as usize;
    let npositional = nparams - fc.num_kwonly as usize;
    let mut slots: Vec<Option<Value>> = vec![None; fc.locals.len().max(fc.param_slots())];

    let mut positional = args.positional;
    if positional.len() > npositional && !fc.has_varargs {
        return Err(EvalError::new(if npositional == 0 {
            format!(
                "function {} accepts no positional arguments ({} given)",
                name,
                positional.len()
            )
        } else {
            format!(
                "function {} accepts at most {} positional arguments ({} given)",
                name,
                npositional,
                positional.len()
            )
        }));
    }
    let surplus = positional.split_off(positional.len().min(npositional));
    for (slot, v) in slots.iter_mut().zip(positional) {
        *slot = Some(v);
    }
    if fc.has_varargs {
        slots[nparams] = Some(Value::tuple(surplus));
    }

    let kwargs = fc.has_kwargs.then(Dict::new);
    for (key, v) in args.named {
        if let Some(i) = fc.locals[..nparams].iter().position(|l| l.name == key) {
            if slots[i].is_some() {
                return Err(EvalError::new(format!(
                    "function {} got multiple values for parameter {}",
                    name, key
                )));
            }
            slots[i] = Some(v);
            continue;
        }
        let Some(kwargs) = &kwargs else {
            return Err(EvalError::new(format!(
                "function {} got an unexpected keyword argument {}",
                name, key
            )));
        };
        let k = Value::from(key.as_str());
        if kwargs.contains(&k)? {
            return Err(EvalError::new(format!(
                "function {} got multiple values for keyword argument {}",
                name, key
            )));
        }
        kwargs.insert(k, v)?;
    }
    if let Some(kwargs) = kwargs {
        slots[nparams + fc.has_varargs as usize] = Some(Value::dict(kwargs));
    }

    let mut defaults = f.defaults.iter();
    let mut missing = Vec::new();
    for (i, has_default) in fc.default_mask.iter().enumerate() {
        let default = if *has_default { defaults.next() } else { None };
        if slots[i].is_none() {
            match default {
                Some(d) => slots[i] = Some(d.clone()),
                None => missing.push(fc.locals[i].name.as_str()),
            }
        }
    }
    if !missing.is_empty() {
        return Err(EvalError::new(format!(
            "function {} missing {} argument{} ({})",
            name,
            missing.len(),
            if missing.len() == 1 { "" } else { "s" },
            missing.join(", ")
        )));
    }
    Ok(slots)
}

/// Flattens the stack operands of a CALL-family instruction into `Args`.
fn collect_args(
    frame: &mut Frame,
    npos: usize,
    nnamed: usize,
    varargs: bool,
    kwargs: bool,
) -> EvalResult<(Value, Args)> {
    let kw = kwargs.then(|| frame.pop());
    let var = varargs.then(|| frame.pop());
    let named_flat = frame.popn(2 * nnamed);
    let mut positional = frame.popn(npos);
    let callee = frame.pop();

    let mut named = Vec::with_capacity(nnamed);
    let mut it = named_flat.into_iter();
    while let (Some(k), Some(v)) = (it.next(), it.next()) {
        named.push((k.as_str().unwrap_or_default().to_string(), v));
    }

    if let Some(var) = var {
        let elems = var.to_vec().map_err(|_| {
            EvalError::new(format!(
                "argument after * must be iterable, not {}",
                var.type_name()
            ))
        })?;
        positional.extend(elems);
    }
    if let Some(kw) = kw {
        let Value::Dict(d) = &kw else {
            return Err(EvalError::new(format!(
                "argument after ** must be a mapping, not {}",
                kw.type_name()
            )));
        };
        for (k, v) in d.items() {
            let Value::String(s) = &k else {
                return Err(EvalError::new(format!(
                    "keywords must be strings, not {}",
                    k.type_name()
                )));
            };
            named.push((s.to_string(), v));
        }
    }
    Ok((callee, Args { positional, named }))
}

// ── Main execution loop ──────────────────────────────────────────────────

/// How control left a function's instruction stream.
enum Exit {
    Return(Value),
    Call(Arc<Function>, Args),
}

/// Runs until the frame stack is back to `base` frames. On error the
/// call stack is attached and frames above `base` are discarded.
pub(crate) fn run(thread: &mut Thread, base: usize) -> EvalResult<Value> {
    loop {
        let current = match thread.frames.last().map(|fr| &fr.callee) {
            Some(Callee::Function(f)) if thread.frames.len() > base => f.clone(),
            _ => return Err(EvalError::new("internal error: no active function frame")),
        };

        let step = match execute(thread, &current) {
            Ok(Exit::Call(f, args)) => enter(thread, f, args).map(|_| None),
            Ok(Exit::Return(v)) => Ok(Some(v)),
            Err(e) => Err(e),
        };

        match step {
            Ok(None) => {}
            Ok(Some(v)) => {
                thread.frames.pop();
                if thread.frames.len() <= base {
                    return Ok(v);
                }
                if let Some(caller) = thread.frames.last_mut() {
                    caller.push(v);
                }
            }
            Err(mut e) => {
                e.attach_call_stack(thread.call_stack());
                thread.frames.truncate(base);
                return Err(e);
            }
        }
    }
}

fn top(thread: &mut Thread) -> EvalResult<&mut Frame> {
    thread
        .frames
        .last_mut()
        .ok_or_else(|| EvalError::new("internal error: empty frame stack"))
}

fn binary_op(inst: Instruction) -> Option<BinaryOp> {
    Some(match inst {
        Instruction::Plus => BinaryOp::Add,
        Instruction::Minus => BinaryOp::Sub,
        Instruction::Star => BinaryOp::Mul,
        Instruction::Slash => BinaryOp::Div,
        Instruction::SlashSlash => BinaryOp::FloorDiv,
        Instruction::Percent => BinaryOp::Mod,
        Instruction::Amp => BinaryOp::BitAnd,
        Instruction::Pipe => BinaryOp::BitOr,
        Instruction::Circumflex => BinaryOp::BitXor,
        Instruction::LtLt => BinaryOp::Shl,
        Instruction::GtGt => BinaryOp::Shr,
        Instruction::In => BinaryOp::In,
        Instruction::NotIn => BinaryOp::NotIn,
        Instruction::Eql => BinaryOp::Eq,
        Instruction::Neq => BinaryOp::Ne,
        Instruction::Lt => BinaryOp::Lt,
        Instruction::Gt => BinaryOp::Gt,
        Instruction::Le => BinaryOp::Le,
        Instruction::Ge => BinaryOp::Ge,
        _ => return None,
    })
}

/// Executes instructions of the innermost frame, which belongs to `fun`,
/// until it returns or calls another compiled function.
fn execute(thread: &mut Thread, fun: &Arc<Function>) -> EvalResult<Exit> {
    let fc = fun.funcode();
    let module = &fun.module;
    let program = &module.program;

    loop {
        thread.tick()?;
        let frame = top(thread)?;
        let Some(&inst) = fc.code.get(frame.pc) else {
            return Ok(Exit::Return(Value::None));
        };
        frame.pc += 1;

        if let Some(op) = binary_op(inst) {
            let y = frame.pop();
            let x = frame.pop();
            frame.push(ops::binary(op, &x, &y)?);
            continue;
        }

        match inst {
            Instruction::Nop => {}
            Instruction::Dup => {
                let x = frame.stack.last().cloned().unwrap_or(Value::None);
                frame.push(x);
            }
            Instruction::Dup2 => {
                let n = frame.stack.len();
                if n >= 2 {
                    let (x, y) = (frame.stack[n - 2].clone(), frame.stack[n - 1].clone());
                    frame.push(x);
                    frame.push(y);
                }
            }
            Instruction::Pop => {
                frame.pop();
            }
            Instruction::Exch => {
                let n = frame.stack.len();
                if n >= 2 {
                    frame.stack.swap(n - 2, n - 1);
                }
            }

            Instruction::None => frame.push(Value::None),
            Instruction::True => frame.push(Value::Bool(true)),
            Instruction::False => frame.push(Value::Bool(false)),
            Instruction::Constant(i) => frame.push(module.constants[i as usize].clone()),

            Instruction::UPlus | Instruction::UMinus | Instruction::Tilde | Instruction::Not => {
                let op = match inst {
                    Instruction::UPlus => UnaryOp::Plus,
                    Instruction::UMinus => UnaryOp::Minus,
                    Instruction::Tilde => UnaryOp::Invert,
                    _ => UnaryOp::Not,
                };
                let x = frame.pop();
                frame.push(ops::unary(op, &x)?);
            }
            Instruction::InplaceAdd => {
                let y = frame.pop();
                let x = frame.pop();
                frame.push(ops::inplace_add(&x, &y)?);
            }
            Instruction::InplacePipe => {
                let y = frame.pop();
                let x = frame.pop();
                frame.push(ops::inplace_pipe(&x, &y)?);
            }

            // ── Containers ──────────────────────────────────────────
            Instruction::MakeTuple(n) => {
                let elems = frame.popn(n as usize);
                frame.push(Value::tuple(elems));
            }
            Instruction::MakeList(n) => {
                let elems = frame.popn(n as usize);
                frame.push(Value::list(elems));
            }
            Instruction::MakeDict => frame.push(Value::dict(Dict::new())),
            Instruction::SetDict | Instruction::SetDictUniq => {
                let v = frame.pop();
                let k = frame.pop();
                let d = frame.pop();
                let Value::Dict(d) = &d else {
                    return Err(EvalError::new(format!(
                        "internal error: SET_DICT on {}",
                        d.type_name()
                    )));
                };
                if inst == Instruction::SetDictUniq && d.contains(&k)? {
                    return Err(EvalError::new(format!("duplicate key: {}", k.repr())));
                }
                d.insert(k, v)?;
            }
            Instruction::Append => {
                let x = frame.pop();
                let l = frame.pop();
                match &l {
                    Value::List(l) => l.append(x)?,
                    other => {
                        return Err(EvalError::new(format!(
                            "internal error: APPEND on {}",
                            other.type_name()
                        )))
                    }
                }
            }
            Instruction::Index => {
                let y = frame.pop();
                let x = frame.pop();
                frame.push(ops::index(&x, &y)?);
            }
            Instruction::SetIndex => {
                let v = frame.pop();
                let y = frame.pop();
                let x = frame.pop();
                ops::set_index(&x, &y, v)?;
            }
            Instruction::Slice => {
                let step = frame.pop();
                let hi = frame.pop();
                let lo = frame.pop();
                let x = frame.pop();
                frame.push(ops::slice(&x, &lo, &hi, &step)?);
            }
            Instruction::Unpack(n) => {
                let x = frame.pop();
                let elems = x.to_vec().map_err(|_| {
                    EvalError::new(format!("got {} in sequence assignment", x.type_name()))
                })?;
                let want = n as usize;
                if elems.len() != want {
                    return Err(EvalError::new(format!(
                        "too {} values to unpack (got {}, want {})",
                        if elems.len() > want { "many" } else { "few" },
                        elems.len(),
                        want
                    )));
                }
                frame.stack.extend(elems.into_iter().rev());
            }

            // ── Variables ───────────────────────────────────────────
            Instruction::Local(i) | Instruction::LocalCell(i) => {
                let v = match &frame.locals[i as usize] {
                    Slot::Value(v) => Some(v.clone()),
                    Slot::Cell(c) => c.get(),
                    Slot::Empty => None,
                };
                match v {
                    Some(v) => frame.push(v),
                    None => {
                        return Err(EvalError::new(format!(
                            "local variable {} referenced before assignment",
                            fc.locals[i as usize].name
                        )))
                    }
                }
            }
            Instruction::SetLocal(i) | Instruction::SetLocalCell(i) => {
                let v = frame.pop();
                match &mut frame.locals[i as usize] {
                    Slot::Cell(c) => c.set(v),
                    slot => *slot = Slot::Value(v),
                }
            }
            Instruction::Free(i) => {
                let v = fun.freevars.get(i as usize).and_then(|c| c.get());
                match v {
                    Some(v) => frame.push(v),
                    None => {
                        return Err(EvalError::new(format!(
                            "local variable {} referenced before assignment",
                            fc.freevars[i as usize].name
                        )))
                    }
                }
            }
            Instruction::Global(i) => {
                let v = module.globals.read()[i as usize].clone();
                match v {
                    Some(v) => frame.push(v),
                    None => {
                        return Err(EvalError::new(format!(
                            "global variable {} referenced before assignment",
                            program.globals[i as usize].name
                        )))
                    }
                }
            }
            Instruction::SetGlobal(i) => {
                let v = frame.pop();
                module.globals.write()[i as usize] = Some(v);
            }
            Instruction::Predeclared(i) => {
                let name = &program.names[i as usize];
                match module.predeclared.get(name) {
                    Some(v) => frame.push(v.clone()),
                    None => return Err(EvalError::new(format!("undefined: {}", name))),
                }
            }
            Instruction::Universal(i) => {
                let name = &program.names[i as usize];
                let v = thread.universe().get(name).cloned();
                let frame = top(thread)?;
                match v {
                    Some(v) => frame.push(v),
                    None => return Err(EvalError::new(format!("undefined: {}", name))),
                }
            }

            // ── Attributes ──────────────────────────────────────────
            Instruction::Attr(i) => {
                let x = frame.pop();
                frame.push(ops::attr(&x, &program.names[i as usize])?);
            }
            Instruction::SetField(i) => {
                let v = frame.pop();
                let x = frame.pop();
                ops::set_field(&x, &program.names[i as usize], v)?;
            }

            // ── Control flow ────────────────────────────────────────
            Instruction::Jmp(t) => frame.pc = t as usize,
            Instruction::JmpIfFalse(t) => {
                if !frame.pop().truth() {
                    frame.pc = t as usize;
                }
            }
            Instruction::JmpIfTrue(t) => {
                if frame.pop().truth() {
                    frame.pc = t as usize;
                }
            }
            Instruction::IterPush => {
                let x = frame.pop();
                let it = x.iterate()?;
                frame.iterators.push(it);
            }
            Instruction::IterJmp(t) => match frame.iterators.last_mut().and_then(Iterator::next) {
                Some(v) => frame.push(v),
                None => frame.pc = t as usize,
            },
            Instruction::IterPop => {
                frame.iterators.pop();
            }
            Instruction::Return => return Ok(Exit::Return(frame.pop())),

            // ── Calls ───────────────────────────────────────────────
            Instruction::Call(npos, nnamed)
            | Instruction::CallVar(npos, nnamed)
            | Instruction::CallKw(npos, nnamed)
            | Instruction::CallVarKw(npos, nnamed) => {
                let varargs = matches!(inst, Instruction::CallVar(..) | Instruction::CallVarKw(..));
                let kwargs = matches!(inst, Instruction::CallKw(..) | Instruction::CallVarKw(..));
                let (callee, args) =
                    collect_args(frame, npos as usize, nnamed as usize, varargs, kwargs)?;
                match callee {
                    Value::Function(f) => return Ok(Exit::Call(f, args)),
                    Value::Builtin(b) => {
                        let result = call_builtin(thread, &b, args)?;
                        top(thread)?.push(result);
                    }
                    other => return Err(not_callable(&other)),
                }
            }
            Instruction::MakeFunc(i) => {
                let defaults = frame.pop();
                let target = &program.functions[i as usize];
                let mut freevars = Vec::with_capacity(target.freevars.len());
                for fv in &target.freevars {
                    let idx = fv.outer.index as usize;
                    let cell = match fv.outer.scope {
                        Scope::Cell => match frame.locals.get(idx) {
                            Some(Slot::Cell(c)) => Some(c.clone()),
                            _ => None,
                        },
                        _ => fun.freevars.get(idx).cloned(),
                    };
                    let Some(cell) = cell else {
                        return Err(EvalError::new(format!(
                            "internal error: cannot capture {} in {}",
                            fv.name, target.name
                        )));
                    };
                    freevars.push(cell);
                }
                let defaults = match &defaults {
                    Value::Tuple(t) => t.to_vec(),
                    _ => Vec::new(),
                };
                frame.push(Value::Function(Arc::new(Function {
                    module: module.clone(),
                    funcode: i as usize,
                    defaults,
                    freevars,
                })));
            }
            Instruction::Load(n) => {
                let names = frame.popn(n as usize);
                let module_name = frame.pop();
                let module_name = module_name.as_str().unwrap_or_default().to_string();
                let values = load_module(thread, &module_name, &names)?;
                top(thread)?.stack.extend(values);
            }

            // Operators are handled above.
            _ => {}
        }
    }
}

/// Executes `load(module, names...)` through the thread's loader.
fn load_module(thread: &mut Thread, module: &str, names: &[Value]) -> EvalResult<Vec<Value>> {
    let Some(loader) = thread.loader() else {
        return Err(EvalError::new("load not implemented by this application"));
    };
    let members = loader
        .load(thread, module)
        .map_err(|e| EvalError::new(format!("cannot load {}: {}", module, e.message())))?;

    let mut values = Vec::with_capacity(names.len());
    for name in names {
        let name = name.as_str().unwrap_or_default();
        if name.starts_with('_') {
            return Err(EvalError::new(format!(
                "load: names with leading underscores are not exported: {}",
                name
            )));
        }
        match members.get(name) {
            Some(v) => values.push(v.clone()),
            None => {
                return Err(EvalError::new(format!(
                    "load: name {} not found in module {}",
                    name, module
                )))
            }
        }
    }
    Ok(values)
}
