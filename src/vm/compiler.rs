//! Bytecode compiler: resolved syntax tree → Program
//!
//! Compilation is total over a successfully resolved tree. Every function,
//! including the implicit toplevel, becomes one Funcode; nested functions
//! are numbered in the order their definitions are reached.

use std::collections::HashMap;

use log::debug;

use super::bytecode::{Funcode, LoadRef, Program};
use super::opcodes::{Constant, Instruction};
use crate::ast::*;
use crate::resolve::{FileOptions, FunctionScope, Scope};
use crate::runtime::Int;

/// Compiles a resolved file.
pub fn compile_file(file: &File, options: &FileOptions) -> Program {
    let mut compiler = Compiler::new();
    let top = compiler.reserve();
    let mut fc = FunctionCompiler::new(&mut compiler);
    fc.compile_statements(&file.stmts);
    fc.emit(Instruction::None);
    fc.emit(Instruction::Return);
    let (code, positions) = fc.finish();

    compiler.functions[top] = Funcode {
        code,
        positions,
        locals: file.scope.locals.clone(),
        ..toplevel_stub()
    };
    compiler.into_program(&file.name, options.allow_recursion, file.globals.clone())
}

/// Compiles a resolved standalone expression. The toplevel evaluates the
/// expression and returns its value.
pub fn compile_expr(expr: &Expr, scope: &FunctionScope) -> Program {
    let mut compiler = Compiler::new();
    let top = compiler.reserve();
    let mut fc = FunctionCompiler::new(&mut compiler);
    fc.compile_expression(expr);
    fc.emit(Instruction::Return);
    let (code, positions) = fc.finish();

    compiler.functions[top] = Funcode {
        code,
        positions,
        locals: scope.locals.clone(),
        ..toplevel_stub()
    };
    compiler.into_program("<expr>", false, Vec::new())
}

fn toplevel_stub() -> Funcode {
    Funcode {
        name: "<toplevel>".to_string(),
        pos: Position::new(1, 1),
        doc: String::new(),
        code: Vec::new(),
        positions: Vec::new(),
        locals: Vec::new(),
        freevars: Vec::new(),
        num_params: 0,
        num_kwonly: 0,
        has_varargs: false,
        has_kwargs: false,
        default_mask: Vec::new(),
    }
}

/// Program-wide tables shared by all function compilers.
struct Compiler {
    names: Vec<String>,
    name_index: HashMap<String, u32>,
    constants: Vec<Constant>,
    functions: Vec<Funcode>,
    loads: Vec<LoadRef>,
}

impl Compiler {
    fn new() -> Self {
        Self {
            names: Vec::new(),
            name_index: HashMap::new(),
            constants: Vec::new(),
            functions: Vec::new(),
            loads: Vec::new(),
        }
    }

    /// Reserves a funcode slot so that nested functions are numbered in
    /// preorder.
    fn reserve(&mut self) -> usize {
        self.functions.push(toplevel_stub());
        self.functions.len() - 1
    }

    fn into_program(
        self,
        filename: &str,
        recursion: bool,
        globals: Vec<crate::resolve::GlobalVar>,
    ) -> Program {
        debug!(
            "compiled {}: {} functions, {} constants, {} names",
            filename,
            self.functions.len(),
            self.constants.len(),
            self.names.len()
        );
        Program {
            filename: filename.to_string(),
            recursion,
            loads: self.loads,
            names: self.names,
            constants: self.constants,
            globals,
            functions: self.functions,
        }
    }

    /// Interns a constant; identical constants share one pool entry.
    fn add_constant(&mut self, c: Constant) -> u32 {
        if let Some(i) = self.constants.iter().position(|existing| existing.same(&c)) {
            i as u32
        } else {
            self.constants.push(c);
            (self.constants.len() - 1) as u32
        }
    }

    fn add_name(&mut self, name: &str) -> u32 {
        if let Some(&i) = self.name_index.get(name) {
            return i;
        }
        let i = self.names.len() as u32;
        self.names.push(name.to_string());
        self.name_index.insert(name.to_string(), i);
        i
    }

    fn compile_function(&mut self, f: &Function, default_mask: Vec<bool>) -> u32 {
        let index = self.reserve();
        let mut fc = FunctionCompiler::new(self);
        fc.set_pos(f.pos);
        fc.compile_statements(&f.body);
        fc.emit(Instruction::None);
        fc.emit(Instruction::Return);
        let (code, positions) = fc.finish();

        self.functions[index] = Funcode {
            name: f.name.clone(),
            pos: f.pos,
            doc: f.doc().unwrap_or_default().to_string(),
            code,
            positions,
            locals: f.scope.locals.clone(),
            freevars: f.scope.freevars.clone(),
            num_params: f.scope.num_params,
            num_kwonly: f.scope.num_kwonly,
            has_varargs: f.scope.has_varargs,
            has_kwargs: f.scope.has_kwargs,
            default_mask,
        };
        index as u32
    }
}

// ── Per-function compiler state ──────────────────────────────────────────

struct LoopLabels {
    continue_to: usize,
    breaks: Vec<usize>,
}

/// Operand of a flattened `+` chain, possibly the merge of several
/// adjacent literals.
enum Summand<'e> {
    Expr(&'e Expr),
    Folded(Expr),
}

impl Summand<'_> {
    fn expr(&self) -> &Expr {
        match self {
            Summand::Expr(e) => e,
            Summand::Folded(e) => e,
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq)]
enum Foldable {
    String,
    List,
    Tuple,
}

fn foldable(e: &Expr) -> Option<Foldable> {
    match e {
        Expr::Literal {
            value: Literal::String(_),
            ..
        } => Some(Foldable::String),
        Expr::List { .. } => Some(Foldable::List),
        Expr::Tuple { .. } => Some(Foldable::Tuple),
        _ => None,
    }
}

fn fold(kind: Foldable, run: &[(Summand<'_>, Position)]) -> Expr {
    let pos = run[0].0.expr().pos();
    match kind {
        Foldable::String => {
            let mut s = String::new();
            for (x, _) in run {
                if let Expr::Literal {
                    value: Literal::String(part),
                    ..
                } = x.expr()
                {
                    s.push_str(part);
                }
            }
            Expr::Literal {
                value: Literal::String(s),
                pos,
            }
        }
        Foldable::List | Foldable::Tuple => {
            let mut elements = Vec::new();
            for (x, _) in run {
                if let Expr::List { elements: e, .. } | Expr::Tuple { elements: e, .. } = x.expr() {
                    elements.extend(e.iter().cloned());
                }
            }
            if kind == Foldable::List {
                Expr::List { elements, pos }
            } else {
                Expr::Tuple { elements, pos }
            }
        }
    }
}

struct FunctionCompiler<'a> {
    pcomp: &'a mut Compiler,
    code: Vec<Instruction>,
    positions: Vec<(u32, Position)>,
    pos: Position,
    loops: Vec<LoopLabels>,
}

impl<'a> FunctionCompiler<'a> {
    fn new(pcomp: &'a mut Compiler) -> Self {
        Self {
            pcomp,
            code: Vec::new(),
            positions: Vec::new(),
            pos: Position::default(),
            loops: Vec::new(),
        }
    }

    fn finish(self) -> (Vec<Instruction>, Vec<(u32, Position)>) {
        (self.code, self.positions)
    }

    // ── Helpers ──────────────────────────────────────────────────────

    fn set_pos(&mut self, pos: Position) {
        if pos.is_valid() {
            self.pos = pos;
        }
    }

    fn emit(&mut self, inst: Instruction) {
        let pc = self.code.len() as u32;
        let changed = self.positions.last().map_or(true, |(_, p)| *p != self.pos);
        if self.pos.is_valid() && changed {
            self.positions.push((pc, self.pos));
        }
        self.code.push(inst);
    }

    fn current_offset(&self) -> usize {
        self.code.len()
    }

    fn emit_jump(&mut self, inst: Instruction) -> usize {
        let idx = self.code.len();
        self.emit(inst);
        idx
    }

    /// Points the jump at `idx` to the next instruction to be emitted.
    fn patch_jump(&mut self, idx: usize) {
        let target = self.code.len();
        self.patch_jump_to(idx, target);
    }

    fn patch_jump_to(&mut self, idx: usize, target: usize) {
        let target = target as u32;
        match &mut self.code[idx] {
            Instruction::Jmp(t)
            | Instruction::JmpIfFalse(t)
            | Instruction::JmpIfTrue(t)
            | Instruction::IterJmp(t) => *t = target,
            other => unreachable!("patch of non-jump instruction {}", other),
        }
    }

    fn constant(&mut self, c: Constant) {
        let idx = self.pcomp.add_constant(c);
        self.emit(Instruction::Constant(idx));
    }

    fn string(&mut self, s: &str) {
        self.constant(Constant::String(s.to_string()));
    }

    // ── Variables ────────────────────────────────────────────────────

    fn load(&mut self, id: &Ident) {
        self.set_pos(id.pos);
        let inst = match id.binding {
            Some(b) => match b.scope {
                Scope::Local => Instruction::Local(b.index),
                Scope::Cell => Instruction::LocalCell(b.index),
                Scope::Free => Instruction::Free(b.index),
                Scope::Global => Instruction::Global(b.index),
                Scope::Predeclared => Instruction::Predeclared(self.pcomp.add_name(&id.name)),
                Scope::Universal => Instruction::Universal(self.pcomp.add_name(&id.name)),
            },
            None => Instruction::Universal(self.pcomp.add_name(&id.name)),
        };
        self.emit(inst);
    }

    fn store(&mut self, id: &Ident) {
        self.set_pos(id.pos);
        let inst = match id.binding.map(|b| (b.scope, b.index)) {
            Some((Scope::Local, i)) => Instruction::SetLocal(i),
            Some((Scope::Cell, i)) => Instruction::SetLocalCell(i),
            Some((Scope::Global, i)) => Instruction::SetGlobal(i),
            // Only locals and globals are assignable.
            _ => Instruction::Pop,
        };
        self.emit(inst);
    }

    /// Pops the value on top of the stack into `target`.
    fn assign(&mut self, target: &Expr) {
        match target {
            Expr::Ident(id) => self.store(id),
            Expr::Tuple { elements, pos } | Expr::List { elements, pos } => {
                self.set_pos(*pos);
                self.emit(Instruction::Unpack(elements.len() as u32));
                for e in elements {
                    self.assign(e);
                }
            }
            Expr::Dot { object, name, pos } => {
                self.compile_expression(object);
                self.emit(Instruction::Exch);
                self.set_pos(*pos);
                let idx = self.pcomp.add_name(name);
                self.emit(Instruction::SetField(idx));
            }
            Expr::Index { object, index, pos } => {
                self.compile_expression(object);
                self.emit(Instruction::Exch);
                self.compile_expression(index);
                self.emit(Instruction::Exch);
                self.set_pos(*pos);
                self.emit(Instruction::SetIndex);
            }
            // Rejected by the parser.
            _ => self.emit(Instruction::Pop),
        }
    }

    // ── Statement compilation ────────────────────────────────────────

    fn compile_statements(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.compile_statement(stmt);
        }
    }

    fn compile_statement(&mut self, stmt: &Stmt) {
        self.set_pos(stmt.pos());
        match stmt {
            Stmt::Assign { target, value, .. } => {
                self.compile_expression(value);
                self.assign(target);
            }

            Stmt::AugAssign {
                op,
                target,
                value,
                pos,
            } => self.compile_aug_assign(*op, target, value, *pos),

            Stmt::Expr { expr, .. } => {
                self.compile_expression(expr);
                self.emit(Instruction::Pop);
            }

            Stmt::Def { name, function, .. } => {
                self.compile_function_value(function);
                self.store(name);
            }

            Stmt::If {
                cond,
                then_body,
                else_body,
                ..
            } => {
                self.compile_expression(cond);
                let else_jump = self.emit_jump(Instruction::JmpIfFalse(0));
                self.compile_statements(then_body);
                if else_body.is_empty() {
                    self.patch_jump(else_jump);
                } else {
                    let end_jump = self.emit_jump(Instruction::Jmp(0));
                    self.patch_jump(else_jump);
                    self.compile_statements(else_body);
                    self.patch_jump(end_jump);
                }
            }

            Stmt::For {
                vars,
                iterable,
                body,
                pos,
            } => {
                self.compile_expression(iterable);
                self.set_pos(*pos);
                self.emit(Instruction::IterPush);
                let head = self.current_offset();
                let exit = self.emit_jump(Instruction::IterJmp(0));
                self.assign(vars);

                self.loops.push(LoopLabels {
                    continue_to: head,
                    breaks: Vec::new(),
                });
                self.compile_statements(body);
                self.emit(Instruction::Jmp(head as u32));
                let labels = self.loops.pop();

                self.patch_jump(exit);
                for b in labels.map(|l| l.breaks).unwrap_or_default() {
                    self.patch_jump(b);
                }
                self.emit(Instruction::IterPop);
            }

            Stmt::While { cond, body, .. } => {
                let head = self.current_offset();
                self.compile_expression(cond);
                let exit = self.emit_jump(Instruction::JmpIfFalse(0));

                self.loops.push(LoopLabels {
                    continue_to: head,
                    breaks: Vec::new(),
                });
                self.compile_statements(body);
                self.emit(Instruction::Jmp(head as u32));
                let labels = self.loops.pop();

                self.patch_jump(exit);
                for b in labels.map(|l| l.breaks).unwrap_or_default() {
                    self.patch_jump(b);
                }
            }

            Stmt::Return { value, .. } => {
                match value {
                    Some(v) => self.compile_expression(v),
                    None => self.emit(Instruction::None),
                }
                self.emit(Instruction::Return);
            }

            Stmt::Break { .. } => {
                let jump = self.emit_jump(Instruction::Jmp(0));
                if let Some(labels) = self.loops.last_mut() {
                    labels.breaks.push(jump);
                }
            }

            Stmt::Continue { .. } => {
                let target = self.loops.last().map_or(0, |l| l.continue_to);
                self.emit(Instruction::Jmp(target as u32));
            }

            Stmt::Pass { .. } => {}

            Stmt::Load {
                module,
                bindings,
                pos,
            } => {
                self.pcomp.loads.push(LoadRef {
                    module: module.clone(),
                    pos: *pos,
                });
                self.string(module);
                for b in bindings {
                    self.string(&b.name);
                }
                self.set_pos(*pos);
                self.emit(Instruction::Load(bindings.len() as u32));
                for b in bindings.iter().rev() {
                    self.store(&b.local);
                }
            }
        }
    }

    /// `x op= y`. The target's operands are evaluated once.
    fn compile_aug_assign(&mut self, op: BinaryOp, target: &Expr, value: &Expr, pos: Position) {
        enum Store<'t> {
            Name(&'t Ident),
            Index(Position),
            Field(u32, Position),
        }

        let store = match target {
            Expr::Ident(id) => {
                self.load(id);
                Store::Name(id)
            }
            Expr::Index {
                object,
                index,
                pos: bracket,
            } => {
                self.compile_expression(object);
                self.compile_expression(index);
                self.emit(Instruction::Dup2);
                self.set_pos(*bracket);
                self.emit(Instruction::Index);
                Store::Index(*bracket)
            }
            Expr::Dot {
                object,
                name,
                pos: dot,
            } => {
                self.compile_expression(object);
                self.emit(Instruction::Dup);
                let idx = self.pcomp.add_name(name);
                self.set_pos(*dot);
                self.emit(Instruction::Attr(idx));
                Store::Field(idx, *dot)
            }
            // Rejected by the parser.
            _ => return,
        };

        self.compile_expression(value);
        self.set_pos(pos);
        match op {
            BinaryOp::Add => self.emit(Instruction::InplaceAdd),
            BinaryOp::BitOr => self.emit(Instruction::InplacePipe),
            other => self.emit_binary(other),
        }

        match store {
            Store::Name(id) => self.store(id),
            Store::Index(p) => {
                self.set_pos(p);
                self.emit(Instruction::SetIndex);
            }
            Store::Field(idx, p) => {
                self.set_pos(p);
                self.emit(Instruction::SetField(idx));
            }
        }
    }

    /// Pushes a function value: defaults tuple, then MAKE_FUNC.
    fn compile_function_value(&mut self, f: &Function) {
        let mut mask = Vec::new();
        let mut ndefaults = 0;
        for p in &f.params {
            match p {
                Param::Required(_) => mask.push(false),
                Param::Optional { default, .. } => {
                    self.compile_expression(default);
                    mask.push(true);
                    ndefaults += 1;
                }
                Param::Star { .. } | Param::StarStar(_) => {}
            }
        }
        self.set_pos(f.pos);
        self.emit(Instruction::MakeTuple(ndefaults));
        let index = self.pcomp.compile_function(f, mask);
        self.set_pos(f.pos);
        self.emit(Instruction::MakeFunc(index));
    }

    // ── Expression compilation ───────────────────────────────────────

    fn compile_expression(&mut self, expr: &Expr) {
        match expr {
            Expr::Ident(id) => self.load(id),

            Expr::Literal { value, pos } => {
                self.set_pos(*pos);
                match value {
                    Literal::Int(i) => self.constant(Constant::Int(Int::from_bigint(i.clone()))),
                    Literal::Float(f) => self.constant(Constant::Float(*f)),
                    Literal::String(s) => self.string(s),
                }
            }

            Expr::List { elements, pos } => {
                for e in elements {
                    self.compile_expression(e);
                }
                self.set_pos(*pos);
                self.emit(Instruction::MakeList(elements.len() as u32));
            }

            Expr::Tuple { elements, pos } => {
                for e in elements {
                    self.compile_expression(e);
                }
                self.set_pos(*pos);
                self.emit(Instruction::MakeTuple(elements.len() as u32));
            }

            Expr::Dict { entries, pos } => {
                self.set_pos(*pos);
                self.emit(Instruction::MakeDict);
                for entry in entries {
                    self.emit(Instruction::Dup);
                    self.compile_expression(&entry.key);
                    self.compile_expression(&entry.value);
                    self.set_pos(entry.pos);
                    self.emit(Instruction::SetDictUniq);
                }
            }

            Expr::Comprehension(comp) => {
                self.set_pos(comp.pos);
                match comp.body {
                    ComprehensionBody::List(_) => self.emit(Instruction::MakeList(0)),
                    ComprehensionBody::Dict(_) => self.emit(Instruction::MakeDict),
                }
                self.compile_clauses(comp, 0);
            }

            Expr::Binary {
                op: BinaryOp::Add, ..
            } => self.compile_plus(expr),

            Expr::Binary {
                op: BinaryOp::And,
                left,
                right,
                ..
            } => {
                // x and y  ⇒  if x then y else x
                self.compile_expression(left);
                self.emit(Instruction::Dup);
                let done = self.emit_jump(Instruction::JmpIfFalse(0));
                self.emit(Instruction::Pop);
                self.compile_expression(right);
                self.patch_jump(done);
            }

            Expr::Binary {
                op: BinaryOp::Or,
                left,
                right,
                ..
            } => {
                self.compile_expression(left);
                self.emit(Instruction::Dup);
                let done = self.emit_jump(Instruction::JmpIfTrue(0));
                self.emit(Instruction::Pop);
                self.compile_expression(right);
                self.patch_jump(done);
            }

            Expr::Binary {
                op,
                left,
                right,
                pos,
            } => {
                self.compile_expression(left);
                self.compile_expression(right);
                self.set_pos(*pos);
                self.emit_binary(*op);
            }

            Expr::Unary { op, operand, pos } => {
                self.compile_expression(operand);
                self.set_pos(*pos);
                self.emit(match op {
                    UnaryOp::Plus => Instruction::UPlus,
                    UnaryOp::Minus => Instruction::UMinus,
                    UnaryOp::Not => Instruction::Not,
                    UnaryOp::Invert => Instruction::Tilde,
                });
            }

            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.compile_expression(cond);
                let else_jump = self.emit_jump(Instruction::JmpIfFalse(0));
                self.compile_expression(then_expr);
                let end_jump = self.emit_jump(Instruction::Jmp(0));
                self.patch_jump(else_jump);
                self.compile_expression(else_expr);
                self.patch_jump(end_jump);
            }

            Expr::Dot { object, name, pos } => {
                self.compile_expression(object);
                self.set_pos(*pos);
                let idx = self.pcomp.add_name(name);
                self.emit(Instruction::Attr(idx));
            }

            Expr::Index { object, index, pos } => {
                self.compile_expression(object);
                self.compile_expression(index);
                self.set_pos(*pos);
                self.emit(Instruction::Index);
            }

            Expr::Slice {
                object,
                start,
                stop,
                step,
                pos,
            } => {
                self.compile_expression(object);
                for part in [start, stop, step] {
                    match part {
                        Some(e) => self.compile_expression(e),
                        None => self.emit(Instruction::None),
                    }
                }
                self.set_pos(*pos);
                self.emit(Instruction::Slice);
            }

            Expr::Call {
                function,
                args,
                pos,
            } => self.compile_call(function, args, *pos),

            Expr::Lambda(f) => self.compile_function_value(f),
        }
    }

    fn emit_binary(&mut self, op: BinaryOp) {
        self.emit(match op {
            BinaryOp::Add => Instruction::Plus,
            BinaryOp::Sub => Instruction::Minus,
            BinaryOp::Mul => Instruction::Star,
            BinaryOp::Div => Instruction::Slash,
            BinaryOp::FloorDiv => Instruction::SlashSlash,
            BinaryOp::Mod => Instruction::Percent,
            BinaryOp::BitAnd => Instruction::Amp,
            BinaryOp::BitOr => Instruction::Pipe,
            BinaryOp::BitXor => Instruction::Circumflex,
            BinaryOp::Shl => Instruction::LtLt,
            BinaryOp::Shr => Instruction::GtGt,
            BinaryOp::Eq => Instruction::Eql,
            BinaryOp::Ne => Instruction::Neq,
            BinaryOp::Lt => Instruction::Lt,
            BinaryOp::Le => Instruction::Le,
            BinaryOp::Gt => Instruction::Gt,
            BinaryOp::Ge => Instruction::Ge,
            BinaryOp::In => Instruction::In,
            BinaryOp::NotIn => Instruction::NotIn,
            // Short-circuit operators never reach here.
            BinaryOp::And | BinaryOp::Or => Instruction::Nop,
        });
    }

    /// Compiles a `+` chain. `((a + b) + c) + d` is flattened to
    /// `[a, b, c, d]`; runs of adjacent string, list or tuple literals are
    /// merged, and what remains is summed left to right.
    fn compile_plus(&mut self, expr: &Expr) {
        let mut summands: Vec<(Summand<'_>, Position)> = Vec::new();
        let mut cur = expr;
        loop {
            match cur {
                Expr::Binary {
                    op: BinaryOp::Add,
                    left,
                    right,
                    pos,
                } => {
                    summands.push((Summand::Expr(right), *pos));
                    cur = left;
                }
                other => {
                    summands.push((Summand::Expr(other), other.pos()));
                    break;
                }
            }
        }
        summands.reverse();

        let mut folded: Vec<(Summand<'_>, Position)> = Vec::with_capacity(summands.len());
        let mut i = 0;
        while i < summands.len() {
            let mut j = i + 1;
            if let Some(kind) = foldable(summands[i].0.expr()) {
                while j < summands.len() && foldable(summands[j].0.expr()) == Some(kind) {
                    j += 1;
                }
                if j > i + 1 {
                    let merged = fold(kind, &summands[i..j]);
                    folded.push((Summand::Folded(merged), summands[i].1));
                    i = j;
                    continue;
                }
            }
            folded.push((Summand::Expr(summands[i].0.expr()), summands[i].1));
            i = j;
        }

        for (k, (summand, plus_pos)) in folded.iter().enumerate() {
            self.compile_expression(summand.expr());
            if k > 0 {
                self.set_pos(*plus_pos);
                self.emit(Instruction::Plus);
            }
        }
    }

    fn compile_clauses(&mut self, comp: &Comprehension, index: usize) {
        let Some(clause) = comp.clauses.get(index) else {
            // Innermost body: add to the accumulator below the loop state.
            self.emit(Instruction::Dup);
            match &comp.body {
                ComprehensionBody::List(e) => {
                    self.compile_expression(e);
                    self.set_pos(comp.pos);
                    self.emit(Instruction::Append);
                }
                ComprehensionBody::Dict(entry) => {
                    self.compile_expression(&entry.key);
                    self.compile_expression(&entry.value);
                    self.set_pos(entry.pos);
                    self.emit(Instruction::SetDict);
                }
            }
            return;
        };

        match clause {
            Clause::If { cond, .. } => {
                self.compile_expression(cond);
                let skip = self.emit_jump(Instruction::JmpIfFalse(0));
                self.compile_clauses(comp, index + 1);
                self.patch_jump(skip);
            }
            Clause::For {
                vars,
                iterable,
                pos,
            } => {
                self.compile_expression(iterable);
                self.set_pos(*pos);
                self.emit(Instruction::IterPush);
                let head = self.current_offset();
                let exit = self.emit_jump(Instruction::IterJmp(0));
                self.assign(vars);
                self.compile_clauses(comp, index + 1);
                self.emit(Instruction::Jmp(head as u32));
                self.patch_jump(exit);
                self.emit(Instruction::IterPop);
            }
        }
    }

    fn compile_call(&mut self, function: &Expr, args: &[Argument], pos: Position) {
        self.compile_expression(function);

        let mut npos = 0u32;
        let mut nnamed = 0u32;
        let mut varargs = None;
        let mut kwargs = None;
        for arg in args {
            match arg {
                Argument::Positional(e) => {
                    self.compile_expression(e);
                    npos += 1;
                }
                Argument::Named { name, value, pos } => {
                    self.set_pos(*pos);
                    self.string(name);
                    self.compile_expression(value);
                    nnamed += 1;
                }
                Argument::Star(e) => varargs = Some(e),
                Argument::StarStar(e) => kwargs = Some(e),
            }
        }
        if let Some(e) = varargs {
            self.compile_expression(e);
        }
        if let Some(e) = kwargs {
            self.compile_expression(e);
        }

        self.set_pos(pos);
        self.emit(match (varargs.is_some(), kwargs.is_some()) {
            (false, false) => Instruction::Call(npos, nnamed),
            (true, false) => Instruction::CallVar(npos, nnamed),
            (false, true) => Instruction::CallKw(npos, nnamed),
            (true, true) => Instruction::CallVarKw(npos, nnamed),
        });
    }
}
