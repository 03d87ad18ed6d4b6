//! Static name resolution.
//!
//! The resolver walks a parsed file, decides the storage class of every
//! identifier and records the local/free variable layout of each function.
//! It annotates the tree in place and never evaluates anything, so running
//! it twice over the same tree gives the same result.

pub mod options;

use std::collections::HashMap;
use std::fmt;

use log::debug;
use thiserror::Error;

use crate::ast::*;
pub use options::FileOptions;

// ── Bindings ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// A slot in the current frame.
    Local,
    /// A local slot captured by a nested function; the slot holds a cell.
    Cell,
    /// A cell captured from an enclosing function.
    Free,
    Global,
    Predeclared,
    Universal,
}

impl Scope {
    pub fn name(&self) -> &'static str {
        match self {
            Scope::Local => "local",
            Scope::Cell => "cell",
            Scope::Free => "free",
            Scope::Global => "global",
            Scope::Predeclared => "predeclared",
            Scope::Universal => "universal",
        }
    }
}

/// The storage class of an identifier plus its index within that class.
/// The index is meaningless for predeclared and universal names, which are
/// looked up by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    pub scope: Scope,
    pub index: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalVar {
    pub name: String,
    pub pos: Position,
    /// Captured by some nested function.
    pub cell: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeVar {
    pub name: String,
    pub pos: Position,
    /// Where the enclosing function keeps the cell: `Cell` (its own local)
    /// or `Free` (captured further out).
    pub outer: Binding,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GlobalVar {
    pub name: String,
    pub pos: Position,
}

/// Variable layout of one function.
///
/// Parameters occupy the first local slots: positional parameters, then
/// keyword-only parameters, then `*args`, then `**kwargs`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FunctionScope {
    pub locals: Vec<LocalVar>,
    pub freevars: Vec<FreeVar>,
    /// Named parameters, positional and keyword-only.
    pub num_params: u32,
    pub num_kwonly: u32,
    pub has_varargs: bool,
    pub has_kwargs: bool,
}

// ── Errors ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveError {
    pub pos: Position,
    pub message: String,
}

/// All static errors found in one file, sorted by position.
#[derive(Debug, Clone, Error)]
pub struct ResolveErrors {
    pub file: String,
    pub errors: Vec<ResolveError>,
}

impl fmt::Display for ResolveErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.errors.iter().enumerate() {
            if i > 0 {
                writeln!(f)?;
            }
            write!(f, "{}:{}: {}", self.file, e.pos, e.message)?;
        }
        Ok(())
    }
}

impl ResolveErrors {
    pub fn messages(&self) -> Vec<&str> {
        self.errors.iter().map(|e| e.message.as_str()).collect()
    }
}

// ── Entry points ────────────────────────────────────────────────────────

/// Resolves a whole file, filling in `file.scope`, `file.globals` and the
/// binding of every identifier.
pub fn resolve_file(
    file: &mut File,
    options: &FileOptions,
    is_predeclared: &dyn Fn(&str) -> bool,
    is_universal: &dyn Fn(&str) -> bool,
) -> Result<(), ResolveErrors> {
    let mut r = Resolver::new(&file.name, options, is_predeclared, is_universal);
    r.functions.push(FnState::new());
    r.bind_toplevel(&file.stmts);
    r.resolve_stmts(&mut file.stmts);

    let top = r.functions.pop().unwrap_or_else(FnState::new);
    mark_cells(&mut file.stmts, &top.locals);
    debug!(
        "resolved {}: {} globals, {} toplevel locals",
        file.name,
        r.globals.len(),
        top.locals.len()
    );
    file.scope = FunctionScope {
        locals: top.locals,
        ..FunctionScope::default()
    };
    file.globals = std::mem::take(&mut r.globals);
    r.finish()
}

/// Resolves a standalone expression. Only comprehension variables become
/// locals; every other name must be predeclared or universal.
pub fn resolve_expr(
    expr: &mut Expr,
    options: &FileOptions,
    is_predeclared: &dyn Fn(&str) -> bool,
    is_universal: &dyn Fn(&str) -> bool,
) -> Result<FunctionScope, ResolveErrors> {
    let mut r = Resolver::new("<expr>", options, is_predeclared, is_universal);
    r.functions.push(FnState::new());
    r.resolve_expr(expr);

    let top = r.functions.pop().unwrap_or_else(FnState::new);
    if top.locals.iter().any(|l| l.cell) {
        walk_expr(expr, &mut |id: &mut Ident| upgrade_to_cell(id, &top.locals));
    }
    let scope = FunctionScope {
        locals: top.locals,
        ..FunctionScope::default()
    };
    r.finish().map(|_| scope)
}

// ── Resolver state ──────────────────────────────────────────────────────

struct FnState {
    locals: Vec<LocalVar>,
    freevars: Vec<FreeVar>,
    /// Block 0 holds the function's own bindings; later blocks belong to
    /// the comprehensions currently being resolved, innermost last.
    blocks: Vec<HashMap<String, u32>>,
    loop_depth: usize,
}

impl FnState {
    fn new() -> Self {
        Self {
            locals: Vec::new(),
            freevars: Vec::new(),
            blocks: vec![HashMap::new()],
            loop_depth: 0,
        }
    }

    /// Binds `name` in the function block, reusing an existing slot.
    fn bind_local(&mut self, name: &str, pos: Position) -> u32 {
        if let Some(&i) = self.blocks[0].get(name) {
            return i;
        }
        let i = self.new_slot(name, pos);
        self.blocks[0].insert(name.to_string(), i);
        i
    }

    fn new_slot(&mut self, name: &str, pos: Position) -> u32 {
        self.locals.push(LocalVar {
            name: name.to_string(),
            pos,
            cell: false,
        });
        (self.locals.len() - 1) as u32
    }
}

struct Resolver<'a> {
    file: String,
    options: &'a FileOptions,
    is_predeclared: &'a dyn Fn(&str) -> bool,
    is_universal: &'a dyn Fn(&str) -> bool,
    errors: Vec<ResolveError>,
    globals: Vec<GlobalVar>,
    global_index: HashMap<String, u32>,
    /// Enclosing functions; index 0 is the toplevel.
    functions: Vec<FnState>,
    /// if/for/while nesting at the toplevel, for placing `load`.
    toplevel_nesting: usize,
}

impl<'a> Resolver<'a> {
    fn new(
        file: &str,
        options: &'a FileOptions,
        is_predeclared: &'a dyn Fn(&str) -> bool,
        is_universal: &'a dyn Fn(&str) -> bool,
    ) -> Self {
        Self {
            file: file.to_string(),
            options,
            is_predeclared,
            is_universal,
            errors: Vec::new(),
            globals: Vec::new(),
            global_index: HashMap::new(),
            functions: Vec::new(),
            toplevel_nesting: 0,
        }
    }

    fn finish(mut self) -> Result<(), ResolveErrors> {
        if self.errors.is_empty() {
            return Ok(());
        }
        self.errors.sort_by_key(|e| e.pos);
        Err(ResolveErrors {
            file: self.file,
            errors: self.errors,
        })
    }

    fn error(&mut self, pos: Position, message: impl Into<String>) {
        self.errors.push(ResolveError {
            pos,
            message: message.into(),
        });
    }

    fn at_toplevel(&self) -> bool {
        self.functions.len() == 1
    }

    fn current(&mut self) -> &mut FnState {
        let last = self.functions.len() - 1;
        &mut self.functions[last]
    }

    // ── Binding sites ───────────────────────────────────────────────────

    fn bind_toplevel(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            if let Stmt::Load { bindings, .. } = stmt {
                for b in bindings {
                    if self.options.load_binds_globally {
                        self.bind_global(&b.local.name, b.local.pos);
                    } else {
                        self.bind_file_local(&b.local.name, b.local.pos);
                    }
                }
                continue;
            }
            let mut names = Vec::new();
            collect_bound(stmt, &mut names);
            for (name, pos) in names {
                self.bind_global(&name, pos);
            }
        }
    }

    fn bind_global(&mut self, name: &str, pos: Position) {
        if let Some(&i) = self.functions[0].blocks[0].get(name) {
            if !self.options.allow_global_reassign {
                let prev = self.functions[0].locals[i as usize].pos;
                self.error(pos, format!("cannot reassign local {} declared at {}", name, prev));
            }
            return;
        }
        if let Some(&i) = self.global_index.get(name) {
            if !self.options.allow_global_reassign {
                let prev = self.globals[i as usize].pos;
                self.error(pos, format!("cannot reassign global {} declared at {}", name, prev));
            }
            return;
        }
        self.global_index
            .insert(name.to_string(), self.globals.len() as u32);
        self.globals.push(GlobalVar {
            name: name.to_string(),
            pos,
        });
    }

    fn bind_file_local(&mut self, name: &str, pos: Position) {
        let existing = self.functions[0].blocks[0]
            .get(name)
            .map(|&i| self.functions[0].locals[i as usize].pos)
            .or_else(|| self.global_index.get(name).map(|&i| self.globals[i as usize].pos));
        if let Some(prev) = existing {
            if !self.options.allow_global_reassign {
                self.error(pos, format!("cannot reassign local {} declared at {}", name, prev));
            }
            return;
        }
        self.functions[0].bind_local(name, pos);
    }

    // ── Uses ────────────────────────────────────────────────────────────

    fn use_ident(&mut self, id: &mut Ident) {
        id.binding = Some(self.lookup(&id.name, id.pos));
    }

    fn lookup(&mut self, name: &str, pos: Position) -> Binding {
        let depth = self.functions.len() - 1;
        if let Some(b) = self.lookup_lexical(depth, name) {
            return b;
        }
        if let Some(&i) = self.global_index.get(name) {
            return Binding {
                scope: Scope::Global,
                index: i,
            };
        }
        if (self.is_predeclared)(name) {
            return Binding {
                scope: Scope::Predeclared,
                index: 0,
            };
        }
        if (self.is_universal)(name) {
            if name == "set" && !self.options.allow_set {
                self.error(pos, "dialect does not support sets");
            }
            return Binding {
                scope: Scope::Universal,
                index: 0,
            };
        }
        self.error(pos, format!("undefined: {}", name));
        Binding {
            scope: Scope::Universal,
            index: 0,
        }
    }

    /// Looks `name` up in function `fi` and its enclosing functions,
    /// threading free variables through every function in between.
    fn lookup_lexical(&mut self, fi: usize, name: &str) -> Option<Binding> {
        let state = &self.functions[fi];
        for block in state.blocks.iter().rev() {
            if let Some(&i) = block.get(name) {
                return Some(Binding {
                    scope: Scope::Local,
                    index: i,
                });
            }
        }
        if let Some(i) = state.freevars.iter().position(|f| f.name == name) {
            return Some(Binding {
                scope: Scope::Free,
                index: i as u32,
            });
        }
        if fi == 0 {
            return None;
        }

        let outer = self.lookup_lexical(fi - 1, name)?;
        let enclosing = &mut self.functions[fi - 1];
        let (outer, pos) = match outer.scope {
            Scope::Local | Scope::Cell => {
                let local = &mut enclosing.locals[outer.index as usize];
                local.cell = true;
                let cell = Binding {
                    scope: Scope::Cell,
                    index: outer.index,
                };
                (cell, local.pos)
            }
            _ => (outer, enclosing.freevars[outer.index as usize].pos),
        };

        let state = &mut self.functions[fi];
        state.freevars.push(FreeVar {
            name: name.to_string(),
            pos,
            outer,
        });
        Some(Binding {
            scope: Scope::Free,
            index: (state.freevars.len() - 1) as u32,
        })
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn resolve_stmts(&mut self, stmts: &mut [Stmt]) {
        for stmt in stmts {
            self.resolve_stmt(stmt);
        }
    }

    fn resolve_nested_block(&mut self, stmts: &mut [Stmt]) {
        let toplevel = self.at_toplevel();
        if toplevel {
            self.toplevel_nesting += 1;
        }
        self.resolve_stmts(stmts);
        if toplevel {
            self.toplevel_nesting -= 1;
        }
    }

    fn resolve_stmt(&mut self, stmt: &mut Stmt) {
        match stmt {
            Stmt::Assign { target, value, .. } => {
                self.resolve_expr(value);
                self.resolve_target(target);
            }
            Stmt::AugAssign {
                op,
                target,
                value,
                pos,
            } => {
                if op.is_bitwise() && !self.options.allow_bitwise {
                    self.error(*pos, format!("dialect does not support bitwise operator {}=", op));
                }
                self.resolve_expr(target);
                self.resolve_expr(value);
            }
            Stmt::Expr { expr, .. } => self.resolve_expr(expr),
            Stmt::Def { name, function, pos } => {
                if !self.at_toplevel() && !self.options.allow_nested_def {
                    self.error(*pos, "dialect does not support nested def");
                }
                self.resolve_function(function);
                self.use_ident(name);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
                pos,
            } => {
                if self.at_toplevel() && !self.options.allow_toplevel_control {
                    self.error(*pos, "if statement not within a function");
                }
                self.resolve_expr(cond);
                self.resolve_nested_block(then_body);
                self.resolve_nested_block(else_body);
            }
            Stmt::For {
                vars,
                iterable,
                body,
                pos,
            } => {
                if self.at_toplevel() && !self.options.allow_toplevel_control {
                    self.error(*pos, "for loop not within a function");
                }
                self.resolve_expr(iterable);
                self.resolve_target(vars);
                self.current().loop_depth += 1;
                self.resolve_nested_block(body);
                self.current().loop_depth -= 1;
            }
            Stmt::While { cond, body, pos } => {
                if !self.options.allow_while {
                    self.error(*pos, "dialect does not support while loops");
                }
                if self.at_toplevel() && !self.options.allow_toplevel_control {
                    self.error(*pos, "while loop not within a function");
                }
                self.resolve_expr(cond);
                self.current().loop_depth += 1;
                self.resolve_nested_block(body);
                self.current().loop_depth -= 1;
            }
            Stmt::Return { value, pos } => {
                if self.at_toplevel() {
                    self.error(*pos, "return statement not within a function");
                }
                if let Some(value) = value {
                    self.resolve_expr(value);
                }
            }
            Stmt::Break { pos } => {
                if self.current().loop_depth == 0 {
                    self.error(*pos, "break not in a loop");
                }
            }
            Stmt::Continue { pos } => {
                if self.current().loop_depth == 0 {
                    self.error(*pos, "continue not in a loop");
                }
            }
            Stmt::Pass { .. } => {}
            Stmt::Load { bindings, pos, .. } => {
                if !self.at_toplevel() {
                    self.error(*pos, "load statement within a function");
                    return;
                }
                if self.toplevel_nesting > 0 {
                    self.error(*pos, "load statement within a conditional");
                    return;
                }
                for b in bindings {
                    self.use_ident(&mut b.local);
                }
            }
        }
    }

    /// Resolves the left side of an assignment. Names are already bound;
    /// attribute and index targets evaluate their operands.
    fn resolve_target(&mut self, target: &mut Expr) {
        match target {
            Expr::Ident(id) => self.use_ident(id),
            Expr::Tuple { elements, .. } | Expr::List { elements, .. } => {
                for e in elements {
                    self.resolve_target(e);
                }
            }
            other => self.resolve_expr(other),
        }
    }

    // ── Functions ───────────────────────────────────────────────────────

    fn resolve_function(&mut self, f: &mut Function) {
        // Defaults are evaluated in the enclosing scope.
        for p in f.params.iter_mut() {
            if let Param::Optional { default, .. } = p {
                self.resolve_expr(default);
            }
        }

        let mut positional: Vec<&Ident> = Vec::new();
        let mut kwonly: Vec<&Ident> = Vec::new();
        let mut varargs: Option<&Ident> = None;
        let mut kwargs: Option<&Ident> = None;
        let mut seen_star = false;
        let mut seen_optional = false;
        let mut bare_star: Option<Position> = None;
        let mut errors = Vec::new();

        for p in &f.params {
            if kwargs.is_some() {
                errors.push((p.pos(), "parameter may not follow **kwargs".to_string()));
                continue;
            }
            match p {
                Param::Required(id) => {
                    if seen_star {
                        kwonly.push(id);
                    } else {
                        if seen_optional {
                            errors.push((id.pos, "required parameter may not follow optional".to_string()));
                        }
                        positional.push(id);
                    }
                }
                Param::Optional { name, .. } => {
                    if seen_star {
                        kwonly.push(name);
                    } else {
                        seen_optional = true;
                        positional.push(name);
                    }
                }
                Param::Star { name, pos } => {
                    if seen_star {
                        errors.push((*pos, "multiple * parameters not allowed".to_string()));
                        continue;
                    }
                    seen_star = true;
                    match name {
                        Some(id) => varargs = Some(id),
                        None => bare_star = Some(*pos),
                    }
                }
                Param::StarStar(id) => kwargs = Some(id),
            }
        }
        if let Some(pos) = bare_star {
            if kwonly.is_empty() {
                errors.push((pos, "bare * must be followed by keyword-only parameters".to_string()));
            }
        }

        let mut state = FnState::new();
        for id in positional
            .iter()
            .chain(kwonly.iter())
            .chain(varargs.iter())
            .chain(kwargs.iter())
        {
            if state.blocks[0].contains_key(&id.name) {
                errors.push((id.pos, format!("duplicate parameter: {}", id.name)));
            } else {
                state.bind_local(&id.name, id.pos);
            }
        }
        let layout = FunctionScope {
            num_params: (positional.len() + kwonly.len()) as u32,
            num_kwonly: kwonly.len() as u32,
            has_varargs: varargs.is_some(),
            has_kwargs: kwargs.is_some(),
            ..FunctionScope::default()
        };
        for (pos, message) in errors {
            self.error(pos, message);
        }

        let mut bound = Vec::new();
        for stmt in &f.body {
            collect_bound(stmt, &mut bound);
        }
        for (name, pos) in bound {
            state.bind_local(&name, pos);
        }

        self.functions.push(state);
        self.resolve_stmts(&mut f.body);
        let Some(state) = self.functions.pop() else {
            return;
        };

        mark_cells(&mut f.body, &state.locals);
        f.scope = FunctionScope {
            locals: state.locals,
            freevars: state.freevars,
            ..layout
        };
    }

    // ── Expressions ─────────────────────────────────────────────────────

    fn resolve_expr(&mut self, expr: &mut Expr) {
        match expr {
            Expr::Ident(id) => self.use_ident(id),
            Expr::Literal { value, pos } => {
                if matches!(value, Literal::Float(_)) && !self.options.allow_float {
                    self.error(*pos, "dialect does not support floating-point numbers");
                }
            }
            Expr::List { elements, .. } | Expr::Tuple { elements, .. } => {
                for e in elements {
                    self.resolve_expr(e);
                }
            }
            Expr::Dict { entries, .. } => {
                for entry in entries {
                    self.resolve_expr(&mut entry.key);
                    self.resolve_expr(&mut entry.value);
                }
            }
            Expr::Comprehension(comp) => self.resolve_comprehension(comp),
            Expr::Binary {
                op,
                left,
                right,
                pos,
            } => {
                if op.is_bitwise() && !self.options.allow_bitwise {
                    self.error(*pos, format!("dialect does not support bitwise operator {}", op));
                }
                self.resolve_expr(left);
                self.resolve_expr(right);
            }
            Expr::Unary { op, operand, pos } => {
                if *op == UnaryOp::Invert && !self.options.allow_bitwise {
                    self.error(*pos, "dialect does not support bitwise operator ~");
                }
                self.resolve_expr(operand);
            }
            Expr::Conditional {
                cond,
                then_expr,
                else_expr,
                ..
            } => {
                self.resolve_expr(cond);
                self.resolve_expr(then_expr);
                self.resolve_expr(else_expr);
            }
            Expr::Dot { object, .. } => self.resolve_expr(object),
            Expr::Index { object, index, .. } => {
                self.resolve_expr(object);
                self.resolve_expr(index);
            }
            Expr::Slice {
                object,
                start,
                stop,
                step,
                ..
            } => {
                self.resolve_expr(object);
                for part in [start, stop, step].into_iter().flatten() {
                    self.resolve_expr(part);
                }
            }
            Expr::Call { function, args, .. } => {
                self.resolve_expr(function);
                self.check_call_args(args);
                for arg in args {
                    match arg {
                        Argument::Positional(e)
                        | Argument::Star(e)
                        | Argument::StarStar(e)
                        | Argument::Named { value: e, .. } => self.resolve_expr(e),
                    }
                }
            }
            Expr::Lambda(function) => {
                if !self.options.allow_lambda {
                    self.error(function.pos, "dialect does not support lambda");
                }
                self.resolve_function(function);
            }
        }
    }

    fn check_call_args(&mut self, args: &[Argument]) {
        let mut seen_named = false;
        let mut seen_star = false;
        let mut seen_starstar = false;
        let mut names: HashMap<&str, ()> = HashMap::new();

        for arg in args {
            match arg {
                Argument::Positional(e) => {
                    if seen_starstar {
                        self.error(e.pos(), "positional argument may not follow **kwargs");
                    } else if seen_star {
                        self.error(e.pos(), "positional argument may not follow *args");
                    } else if seen_named {
                        self.error(e.pos(), "positional argument may not follow named");
                    }
                }
                Argument::Named { name, pos, .. } => {
                    if seen_starstar {
                        self.error(*pos, "keyword argument may not follow **kwargs");
                    }
                    if names.insert(name.as_str(), ()).is_some() {
                        self.error(*pos, format!("keyword argument {} repeated", name));
                    }
                    seen_named = true;
                }
                Argument::Star(e) => {
                    if seen_starstar {
                        self.error(e.pos(), "*args may not follow **kwargs");
                    } else if seen_star {
                        self.error(e.pos(), "multiple *args not allowed");
                    }
                    seen_star = true;
                }
                Argument::StarStar(e) => {
                    if seen_starstar {
                        self.error(e.pos(), "multiple **kwargs not allowed");
                    }
                    seen_starstar = true;
                }
            }
        }
    }

    fn resolve_comprehension(&mut self, comp: &mut Comprehension) {
        // The first iterable is evaluated in the enclosing block.
        if let Some(Clause::For { iterable, .. }) = comp.clauses.first_mut() {
            self.resolve_expr(iterable);
        }

        self.current().blocks.push(HashMap::new());
        for (i, clause) in comp.clauses.iter_mut().enumerate() {
            match clause {
                Clause::For { vars, iterable, .. } => {
                    if i > 0 {
                        self.resolve_expr(iterable);
                    }
                    let mut names = Vec::new();
                    collect_target_names(vars, &mut names);
                    let state = self.current();
                    for (name, pos) in names {
                        let slot = state.new_slot(&name, pos);
                        if let Some(block) = state.blocks.last_mut() {
                            block.insert(name, slot);
                        }
                    }
                    self.resolve_target(vars);
                }
                Clause::If { cond, .. } => self.resolve_expr(cond),
            }
        }
        match &mut comp.body {
            ComprehensionBody::List(e) => self.resolve_expr(e),
            ComprehensionBody::Dict(entry) => {
                self.resolve_expr(&mut entry.key);
                self.resolve_expr(&mut entry.value);
            }
        }
        self.current().blocks.pop();
    }
}

// ── Tree helpers ────────────────────────────────────────────────────────

/// Names bound by a statement in its own function: assignment targets,
/// loop variables and `def` names, looking inside nested blocks but not
/// inside nested functions or comprehensions.
fn collect_bound(stmt: &Stmt, out: &mut Vec<(String, Position)>) {
    match stmt {
        Stmt::Assign { target, .. } => collect_target_names(target, out),
        Stmt::AugAssign { target, .. } => {
            if let Expr::Ident(id) = target {
                out.push((id.name.clone(), id.pos));
            }
        }
        Stmt::Def { name, .. } => out.push((name.name.clone(), name.pos)),
        Stmt::If {
            then_body,
            else_body,
            ..
        } => {
            for s in then_body.iter().chain(else_body.iter()) {
                collect_bound(s, out);
            }
        }
        Stmt::For { vars, body, .. } => {
            collect_target_names(vars, out);
            for s in body {
                collect_bound(s, out);
            }
        }
        Stmt::While { body, .. } => {
            for s in body {
                collect_bound(s, out);
            }
        }
        _ => {}
    }
}

fn collect_target_names(target: &Expr, out: &mut Vec<(String, Position)>) {
    match target {
        Expr::Ident(id) => out.push((id.name.clone(), id.pos)),
        Expr::Tuple { elements, .. } | Expr::List { elements, .. } => {
            for e in elements {
                collect_target_names(e, out);
            }
        }
        _ => {}
    }
}

fn upgrade_to_cell(id: &mut Ident, locals: &[LocalVar]) {
    if let Some(b) = id.binding.as_mut() {
        if b.scope == Scope::Local && locals.get(b.index as usize).is_some_and(|l| l.cell) {
            b.scope = Scope::Cell;
        }
    }
}

/// Rewrites `Local` uses of captured locals to `Cell` once the whole
/// function has been resolved.
fn mark_cells(stmts: &mut [Stmt], locals: &[LocalVar]) {
    if !locals.iter().any(|l| l.cell) {
        return;
    }
    let mut visit = |id: &mut Ident| upgrade_to_cell(id, locals);
    for stmt in stmts {
        walk_stmt(stmt, &mut visit);
    }
}

/// Visits every identifier belonging to the current function. Nested
/// function bodies are skipped; their default values are not.
fn walk_stmt(stmt: &mut Stmt, f: &mut dyn FnMut(&mut Ident)) {
    match stmt {
        Stmt::Assign { target, value, .. } | Stmt::AugAssign { target, value, .. } => {
            walk_expr(target, f);
            walk_expr(value, f);
        }
        Stmt::Expr { expr, .. } => walk_expr(expr, f),
        Stmt::Def { name, function, .. } => {
            walk_params(function, f);
            f(name);
        }
        Stmt::If {
            cond,
            then_body,
            else_body,
            ..
        } => {
            walk_expr(cond, f);
            for s in then_body.iter_mut().chain(else_body.iter_mut()) {
                walk_stmt(s, f);
            }
        }
        Stmt::For {
            vars,
            iterable,
            body,
            ..
        } => {
            walk_expr(vars, f);
            walk_expr(iterable, f);
            for s in body {
                walk_stmt(s, f);
            }
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, f);
            for s in body {
                walk_stmt(s, f);
            }
        }
        Stmt::Return { value, .. } => {
            if let Some(v) = value {
                walk_expr(v, f);
            }
        }
        Stmt::Load { bindings, .. } => {
            for b in bindings {
                f(&mut b.local);
            }
        }
        Stmt::Break { .. } | Stmt::Continue { .. } | Stmt::Pass { .. } => {}
    }
}

fn walk_params(function: &mut Function, f: &mut dyn FnMut(&mut Ident)) {
    for p in function.params.iter_mut() {
        if let Param::Optional { default, .. } = p {
            walk_expr(default, f);
        }
    }
}

fn walk_expr(expr: &mut Expr, f: &mut dyn FnMut(&mut Ident)) {
    match expr {
        Expr::Ident(id) => f(id),
        Expr::Literal { .. } => {}
        Expr::List { elements, .. } | Expr::Tuple { elements, .. } => {
            for e in elements {
                walk_expr(e, f);
            }
        }
        Expr::Dict { entries, .. } => {
            for entry in entries {
                walk_expr(&mut entry.key, f);
                walk_expr(&mut entry.value, f);
            }
        }
        Expr::Comprehension(comp) => {
            for clause in comp.clauses.iter_mut() {
                match clause {
                    Clause::For { vars, iterable, .. } => {
                        walk_expr(vars, f);
                        walk_expr(iterable, f);
                    }
                    Clause::If { cond, .. } => walk_expr(cond, f),
                }
            }
            match &mut comp.body {
                ComprehensionBody::List(e) => walk_expr(e, f),
                ComprehensionBody::Dict(entry) => {
                    walk_expr(&mut entry.key, f);
                    walk_expr(&mut entry.value, f);
                }
            }
        }
        Expr::Binary { left, right, .. } => {
            walk_expr(left, f);
            walk_expr(right, f);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, f),
        Expr::Conditional {
            cond,
            then_expr,
            else_expr,
            ..
        } => {
            walk_expr(cond, f);
            walk_expr(then_expr, f);
            walk_expr(else_expr, f);
        }
        Expr::Dot { object, .. } => walk_expr(object, f),
        Expr::Index { object, index, .. } => {
            walk_expr(object, f);
            walk_expr(index, f);
        }
        Expr::Slice {
            object,
            start,
            stop,
            step,
            ..
        } => {
            walk_expr(object, f);
            for part in [start, stop, step].into_iter().flatten() {
                walk_expr(part, f);
            }
        }
        Expr::Call { function, args, .. } => {
            walk_expr(function, f);
            for arg in args {
                match arg {
                    Argument::Positional(e)
                    | Argument::Star(e)
                    | Argument::StarStar(e)
                    | Argument::Named { value: e, .. } => walk_expr(e, f),
                }
            }
        }
        Expr::Lambda(function) => walk_params(function, f),
    }
}
