//! Execution threads: the per-call-stack state the interpreter runs on.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use super::builtins;
use super::error::{CallFrame, ErrorKind, EvalError, EvalResult};
use super::{StringDict, Value};
use crate::vm::machine::Frame;

/// Resolves `load("name", ...)` statements to the named module's globals.
pub trait Load: Send + Sync {
    fn load(&self, thread: &mut Thread, module: &str) -> EvalResult<StringDict>;
}

/// A cloneable handle that stops a running thread at its next
/// instruction boundary. The first reason given wins.
#[derive(Clone, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
    reason: Arc<Mutex<Option<String>>>,
}

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self, reason: &str) {
        let mut slot = self.reason.lock();
        if slot.is_none() {
            *slot = Some(reason.to_string());
        }
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    pub fn reason(&self) -> Option<String> {
        self.reason.lock().clone()
    }
}

type PrintFn = Box<dyn FnMut(&str) + Send>;

/// The state of one call stack. Never shared between OS threads; only
/// frozen values may cross from one thread to another.
pub struct Thread {
    name: String,
    pub(crate) frames: Vec<Frame>,
    locals: HashMap<String, Value>,
    loader: Option<Arc<dyn Load>>,
    print: Option<PrintFn>,
    cancel: CancelToken,
    steps: u64,
    max_steps: Option<u64>,
    universe: StringDict,
}

impl Thread {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            frames: Vec::new(),
            locals: HashMap::new(),
            loader: None,
            print: None,
            cancel: CancelToken::new(),
            steps: 0,
            max_steps: None,
            universe: builtins::universe(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    // ── Configuration ───────────────────────────────────────────────────

    pub fn set_loader(&mut self, loader: Arc<dyn Load>) {
        self.loader = Some(loader);
    }

    pub fn loader(&self) -> Option<Arc<dyn Load>> {
        self.loader.clone()
    }

    /// Replaces the destination of `print()`, which defaults to stderr.
    pub fn set_print(&mut self, f: impl FnMut(&str) + Send + 'static) {
        self.print = Some(Box::new(f));
    }

    pub fn set_max_steps(&mut self, max: u64) {
        self.max_steps = Some(max);
    }

    /// Shares an existing token, for example one owned by a watchdog.
    pub fn set_cancel_token(&mut self, token: CancelToken) {
        self.cancel = token;
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    // ── Host-visible state ──────────────────────────────────────────────

    pub fn set_local(&mut self, key: &str, value: Value) {
        self.locals.insert(key.to_string(), value);
    }

    pub fn local(&self, key: &str) -> Option<&Value> {
        self.locals.get(key)
    }

    pub fn cancel(&self, reason: &str) {
        debug!("thread {}: cancelled: {}", self.name, reason);
        self.cancel.cancel(reason);
    }

    /// Instructions executed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    pub fn universe(&self) -> &StringDict {
        &self.universe
    }

    pub fn call_depth(&self) -> usize {
        self.frames.len()
    }

    /// The active frames, innermost first.
    pub fn call_stack(&self) -> Vec<CallFrame> {
        self.frames.iter().rev().map(Frame::call_frame).collect()
    }

    pub fn print(&mut self, msg: &str) {
        match self.print.as_mut() {
            Some(f) => f(msg),
            None => eprintln!("{}", msg),
        }
    }

    // ── Interpreter hooks ───────────────────────────────────────────────

    /// Fails if the thread has been cancelled. Long-running builtins call
    /// this at safe points.
    pub fn check_cancelled(&self) -> EvalResult<()> {
        if self.cancel.is_cancelled() {
            let reason = self.cancel.reason().unwrap_or_default();
            return Err(EvalError::with_kind(
                ErrorKind::Cancelled,
                format!("computation cancelled: {}", reason),
            ));
        }
        Ok(())
    }

    /// Counts one instruction against the step budget.
    pub(crate) fn tick(&mut self) -> EvalResult<()> {
        self.steps += 1;
        if let Some(max) = self.max_steps {
            if self.steps > max && !self.cancel.is_cancelled() {
                self.cancel("too many steps");
            }
        }
        self.check_cancelled()
    }
}
