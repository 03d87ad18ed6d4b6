//! Syntax tree produced by the parser and annotated in place by the resolver.

use std::fmt;

use num_bigint::BigInt;

use crate::resolve::{Binding, FunctionScope, GlobalVar};

/// A 1-based line/column position within a source file.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Position {
    pub line: u32,
    pub col: u32,
}

impl Position {
    pub fn new(line: u32, col: u32) -> Self {
        Self { line, col }
    }

    pub fn is_valid(&self) -> bool {
        self.line > 0
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

// ── Identifiers ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Ident {
    pub name: String,
    pub pos: Position,
    /// Filled in by the resolver.
    pub binding: Option<Binding>,
}

impl Ident {
    pub fn new(name: &str, pos: Position) -> Self {
        Self {
            name: name.to_string(),
            pos,
            binding: None,
        }
    }
}

// ── Operators ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    FloorDiv,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    And,
    Or,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::FloorDiv => "//",
            BinaryOp::Mod => "%",
            BinaryOp::BitAnd => "&",
            BinaryOp::BitOr => "|",
            BinaryOp::BitXor => "^",
            BinaryOp::Shl => "<<",
            BinaryOp::Shr => ">>",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
        }
    }

    pub fn is_bitwise(&self) -> bool {
        matches!(
            self,
            BinaryOp::BitAnd | BinaryOp::BitOr | BinaryOp::BitXor | BinaryOp::Shl | BinaryOp::Shr
        )
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Plus,
    Minus,
    Not,
    Invert,
}

impl UnaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            UnaryOp::Plus => "+",
            UnaryOp::Minus => "-",
            UnaryOp::Not => "not",
            UnaryOp::Invert => "~",
        }
    }
}

// ── Expressions ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Int(BigInt),
    Float(f64),
    String(String),
}

#[derive(Debug, Clone)]
pub struct DictEntry {
    pub key: Expr,
    pub value: Expr,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum Clause {
    For {
        vars: Expr,
        iterable: Expr,
        pos: Position,
    },
    If {
        cond: Expr,
        pos: Position,
    },
}

#[derive(Debug, Clone)]
pub enum ComprehensionBody {
    List(Expr),
    Dict(DictEntry),
}

#[derive(Debug, Clone)]
pub struct Comprehension {
    pub body: ComprehensionBody,
    pub clauses: Vec<Clause>,
    pub pos: Position,
}

#[derive(Debug, Clone)]
pub enum Argument {
    Positional(Expr),
    Named {
        name: String,
        value: Expr,
        pos: Position,
    },
    Star(Expr),
    StarStar(Expr),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Ident(Ident),
    Literal {
        value: Literal,
        pos: Position,
    },
    List {
        elements: Vec<Expr>,
        pos: Position,
    },
    Tuple {
        elements: Vec<Expr>,
        pos: Position,
    },
    Dict {
        entries: Vec<DictEntry>,
        pos: Position,
    },
    Comprehension(Box<Comprehension>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        /// Position of the operator.
        pos: Position,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        pos: Position,
    },
    Conditional {
        cond: Box<Expr>,
        then_expr: Box<Expr>,
        else_expr: Box<Expr>,
        pos: Position,
    },
    Dot {
        object: Box<Expr>,
        name: String,
        /// Position of the attribute name.
        pos: Position,
    },
    Index {
        object: Box<Expr>,
        index: Box<Expr>,
        /// Position of the opening bracket.
        pos: Position,
    },
    Slice {
        object: Box<Expr>,
        start: Option<Box<Expr>>,
        stop: Option<Box<Expr>>,
        step: Option<Box<Expr>>,
        pos: Position,
    },
    Call {
        function: Box<Expr>,
        args: Vec<Argument>,
        /// Position of the opening parenthesis.
        pos: Position,
    },
    Lambda(Box<Function>),
}

impl Expr {
    pub fn pos(&self) -> Position {
        match self {
            Expr::Ident(id) => id.pos,
            Expr::Literal { pos, .. } => *pos,
            Expr::List { pos, .. } => *pos,
            Expr::Tuple { pos, .. } => *pos,
            Expr::Dict { pos, .. } => *pos,
            Expr::Comprehension(c) => c.pos,
            Expr::Binary { pos, .. } => *pos,
            Expr::Unary { pos, .. } => *pos,
            Expr::Conditional { pos, .. } => *pos,
            Expr::Dot { pos, .. } => *pos,
            Expr::Index { pos, .. } => *pos,
            Expr::Slice { pos, .. } => *pos,
            Expr::Call { pos, .. } => *pos,
            Expr::Lambda(f) => f.pos,
        }
    }

    /// Whether the expression may appear on the left of `=`.
    pub fn is_assignable(&self) -> bool {
        match self {
            Expr::Ident(_) | Expr::Dot { .. } | Expr::Index { .. } => true,
            Expr::List { elements, .. } | Expr::Tuple { elements, .. } => {
                elements.iter().all(Expr::is_assignable)
            }
            _ => false,
        }
    }
}

// ── Functions ───────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub enum Param {
    Required(Ident),
    Optional { name: Ident, default: Expr },
    /// `*args`, or a bare `*` separating keyword-only parameters.
    Star { name: Option<Ident>, pos: Position },
    StarStar(Ident),
}

impl Param {
    pub fn pos(&self) -> Position {
        match self {
            Param::Required(id) => id.pos,
            Param::Optional { name, .. } => name.pos,
            Param::Star { pos, .. } => *pos,
            Param::StarStar(id) => id.pos,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Function {
    pub name: String,
    pub pos: Position,
    pub params: Vec<Param>,
    pub body: Vec<Stmt>,
    /// Filled in by the resolver.
    pub scope: FunctionScope,
}

impl Function {
    /// The docstring: a string literal as the first statement of the body.
    pub fn doc(&self) -> Option<&str> {
        match self.body.first() {
            Some(Stmt::Expr {
                expr: Expr::Literal { value: Literal::String(s), .. },
                ..
            }) => Some(s.as_str()),
            _ => None,
        }
    }
}

// ── Statements ──────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct LoadBinding {
    /// The name bound in the loading file.
    pub local: Ident,
    /// The name exported by the loaded module.
    pub name: String,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Assign {
        target: Expr,
        value: Expr,
        pos: Position,
    },
    AugAssign {
        op: BinaryOp,
        target: Expr,
        value: Expr,
        pos: Position,
    },
    Expr {
        expr: Expr,
        pos: Position,
    },
    Def {
        name: Ident,
        function: Box<Function>,
        pos: Position,
    },
    If {
        cond: Expr,
        then_body: Vec<Stmt>,
        else_body: Vec<Stmt>,
        pos: Position,
    },
    For {
        vars: Expr,
        iterable: Expr,
        body: Vec<Stmt>,
        pos: Position,
    },
    While {
        cond: Expr,
        body: Vec<Stmt>,
        pos: Position,
    },
    Return {
        value: Option<Expr>,
        pos: Position,
    },
    Break {
        pos: Position,
    },
    Continue {
        pos: Position,
    },
    Pass {
        pos: Position,
    },
    Load {
        module: String,
        bindings: Vec<LoadBinding>,
        pos: Position,
    },
}

impl Stmt {
    pub fn pos(&self) -> Position {
        match self {
            Stmt::Assign { pos, .. } => *pos,
            Stmt::AugAssign { pos, .. } => *pos,
            Stmt::Expr { pos, .. } => *pos,
            Stmt::Def { pos, .. } => *pos,
            Stmt::If { pos, .. } => *pos,
            Stmt::For { pos, .. } => *pos,
            Stmt::While { pos, .. } => *pos,
            Stmt::Return { pos, .. } => *pos,
            Stmt::Break { pos } => *pos,
            Stmt::Continue { pos } => *pos,
            Stmt::Pass { pos } => *pos,
            Stmt::Load { pos, .. } => *pos,
        }
    }
}

// ── Top-level file ──────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct File {
    pub name: String,
    pub stmts: Vec<Stmt>,
    /// Scope of the implicit toplevel function (filled in by the resolver).
    pub scope: FunctionScope,
    /// Module-level variables in order of first binding (filled in by the resolver).
    pub globals: Vec<GlobalVar>,
}

impl File {
    /// Names of all modules mentioned in `load` statements, in order.
    pub fn load_modules(&self) -> Vec<&str> {
        self.stmts
            .iter()
            .filter_map(|s| match s {
                Stmt::Load { module, .. } => Some(module.as_str()),
                _ => None,
            })
            .collect()
    }
}
