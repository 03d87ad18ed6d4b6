use std::fmt;

use thiserror::Error;

use crate::ast::Position;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Mutation of a frozen value.
    Frozen,
    /// Mutation of a container while it is being iterated.
    IterationMutation,
    /// An operator applied to an unsupported pair of operand types.
    UnknownBinaryOp,
    Unhashable,
    Cancelled,
    Generic,
}

/// One entry of a captured call stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallFrame {
    pub name: String,
    /// File and position of the active instruction; `None` for builtins.
    pub location: Option<(String, Position)>,
}

impl fmt::Display for CallFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some((file, pos)) => write!(f, "{}:{}: in {}", file, pos, self.name),
            None => write!(f, "<builtin>: in {}", self.name),
        }
    }
}

/// A runtime error, with the call stack captured where it was raised.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct EvalError {
    message: String,
    kind: ErrorKind,
    call_stack: Vec<CallFrame>,
}

pub type EvalResult<T> = Result<T, EvalError>;

impl EvalError {
    pub fn new(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Generic, message)
    }

    pub fn with_kind(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            kind,
            call_stack: Vec::new(),
        }
    }

    pub fn frozen(message: impl Into<String>) -> Self {
        Self::with_kind(ErrorKind::Frozen, message)
    }

    pub fn unknown_binary_op(op: &str, left: &str, right: &str) -> Self {
        Self::with_kind(
            ErrorKind::UnknownBinaryOp,
            format!("unknown binary op: {} {} {}", left, op, right),
        )
    }

    pub fn unhashable(type_name: &str) -> Self {
        Self::with_kind(ErrorKind::Unhashable, format!("unhashable type: {}", type_name))
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Innermost frame first.
    pub fn call_stack(&self) -> &[CallFrame] {
        &self.call_stack
    }

    pub fn has_call_stack(&self) -> bool {
        !self.call_stack.is_empty()
    }

    /// Records the stack at the point of failure. A stack captured deeper
    /// down (inside a builtin's callback) is kept.
    pub(crate) fn attach_call_stack(&mut self, stack: Vec<CallFrame>) {
        if self.call_stack.is_empty() {
            self.call_stack = stack;
        }
    }

    pub(crate) fn prefix(mut self, name: &str) -> Self {
        self.message = format!("{}: {}", name, self.message);
        self
    }

    /// Multi-line rendering, most recent call first.
    pub fn backtrace(&self) -> String {
        let mut out = String::from("Traceback (most recent call first):\n");
        for frame in &self.call_stack {
            out.push_str("  ");
            out.push_str(&frame.to_string());
            out.push('\n');
        }
        out.push_str("Error: ");
        out.push_str(&self.message);
        out
    }
}
