use num_bigint::BigInt;
use num_traits::Num;
use thiserror::Error;

use crate::ast::*;
use crate::lexer::tokens::{Token, TokenType};
use crate::lexer::{Lexer, LexerError};
use crate::resolve::FunctionScope;

#[derive(Debug, Clone, Error)]
#[error("{file}:{pos}: {message}")]
pub struct SyntaxError {
    pub message: String,
    pub pos: Position,
    pub file: String,
}

impl From<LexerError> for SyntaxError {
    fn from(e: LexerError) -> Self {
        SyntaxError {
            message: e.message,
            pos: e.pos,
            file: e.file,
        }
    }
}

const MAX_PARSER_DEPTH: usize = 256;

/// Tokenizes and parses a whole source file.
pub fn parse_file(filename: &str, source: &str) -> Result<File, SyntaxError> {
    let tokens = Lexer::new(source, filename).tokenize()?;
    Parser::new(tokens, filename).parse()
}

/// Parses a source string holding a single expression.
pub fn parse_expr(filename: &str, source: &str) -> Result<Expr, SyntaxError> {
    let tokens = Lexer::new(source, filename).tokenize()?;
    let mut parser = Parser::new(tokens, filename);
    let expr = parser.parse_expression_list()?;
    parser.skip_newlines();
    if !parser.at_end() {
        return Err(parser.unexpected("end of expression"));
    }
    Ok(expr)
}

pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    filename: String,
    depth: usize,
}

impl Parser {
    pub fn new(tokens: Vec<Token>, filename: &str) -> Self {
        Self {
            tokens,
            pos: 0,
            filename: filename.to_string(),
            depth: 0,
        }
    }

    fn enter_depth(&mut self) -> Result<(), SyntaxError> {
        self.depth += 1;
        if self.depth > MAX_PARSER_DEPTH {
            Err(self.error(&format!(
                "maximum nesting depth ({}) exceeded",
                MAX_PARSER_DEPTH
            )))
        } else {
            Ok(())
        }
    }

    fn exit_depth(&mut self) {
        self.depth -= 1;
    }

    // ── Public API ──────────────────────────────────────────────────────

    pub fn parse(&mut self) -> Result<File, SyntaxError> {
        let mut stmts = Vec::new();
        loop {
            self.skip_newlines();
            if self.at_end() {
                break;
            }
            self.parse_statement(&mut stmts)?;
        }

        Ok(File {
            name: self.filename.clone(),
            stmts,
            scope: FunctionScope::default(),
            globals: Vec::new(),
        })
    }

    // ── Statements ──────────────────────────────────────────────────────

    fn parse_statement(&mut self, out: &mut Vec<Stmt>) -> Result<(), SyntaxError> {
        match self.current().token_type {
            TokenType::Def => out.push(self.parse_def_stmt()?),
            TokenType::If => out.push(self.parse_if_stmt()?),
            TokenType::For => out.push(self.parse_for_stmt()?),
            TokenType::While => out.push(self.parse_while_stmt()?),
            _ => self.parse_simple_stmt(out)?,
        }
        Ok(())
    }

    /// small_stmt {';' small_stmt} [';'] NEWLINE
    fn parse_simple_stmt(&mut self, out: &mut Vec<Stmt>) -> Result<(), SyntaxError> {
        loop {
            out.push(self.parse_small_stmt()?);
            if !self.check(TokenType::Semicolon) {
                break;
            }
            self.advance();
            if self.check(TokenType::Newline) || self.at_end() {
                break;
            }
        }
        if self.at_end() {
            return Ok(());
        }
        self.expect(TokenType::Newline)?;
        Ok(())
    }

    fn parse_small_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        match self.current().token_type {
            TokenType::Return => {
                self.advance();
                let value = if self.at_statement_end() {
                    None
                } else {
                    Some(self.parse_expression_list()?)
                };
                return Ok(Stmt::Return { value, pos });
            }
            TokenType::Break => {
                self.advance();
                return Ok(Stmt::Break { pos });
            }
            TokenType::Continue => {
                self.advance();
                return Ok(Stmt::Continue { pos });
            }
            TokenType::Pass => {
                self.advance();
                return Ok(Stmt::Pass { pos });
            }
            TokenType::Load => return self.parse_load_stmt(),
            _ => {}
        }

        // Parse expression first, then decide if it's an assignment
        let expr = self.parse_expression_list()?;

        if self.check(TokenType::Assign) {
            let op_pos = self.pos();
            self.advance();
            if !expr.is_assignable() {
                return Err(self.error_at(expr.pos(), "invalid assignment target"));
            }
            let value = self.parse_expression_list()?;
            return Ok(Stmt::Assign {
                target: expr,
                value,
                pos: op_pos,
            });
        }

        if self.current().token_type.is_augmented_assign() {
            let op_pos = self.pos();
            let op = augmented_op(self.current().token_type);
            self.advance();
            if !matches!(expr, Expr::Ident(_) | Expr::Dot { .. } | Expr::Index { .. }) {
                return Err(self.error_at(expr.pos(), "invalid target for augmented assignment"));
            }
            let value = self.parse_expression_list()?;
            return Ok(Stmt::AugAssign {
                op,
                target: expr,
                value,
                pos: op_pos,
            });
        }

        Ok(Stmt::Expr { expr, pos })
    }

    fn parse_load_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::Load)?;
        self.expect(TokenType::LParen)?;
        let module = self.expect(TokenType::StringLit)?.value.clone();

        let mut bindings = Vec::new();
        while self.check(TokenType::Comma) {
            self.advance();
            if self.check(TokenType::RParen) {
                break;
            }
            let tok = self.current().clone();
            match tok.token_type {
                TokenType::StringLit => {
                    self.advance();
                    if !is_identifier(&tok.value) {
                        return Err(self.error_at(
                            tok.pos,
                            &format!("load: not an identifier: {}", tok.value),
                        ));
                    }
                    bindings.push(LoadBinding {
                        local: Ident::new(&tok.value, tok.pos),
                        name: tok.value.clone(),
                    });
                }
                TokenType::Identifier => {
                    self.advance();
                    self.expect(TokenType::Assign)?;
                    let name = self.expect(TokenType::StringLit)?.value.clone();
                    bindings.push(LoadBinding {
                        local: Ident::new(&tok.value, tok.pos),
                        name,
                    });
                }
                _ => {
                    return Err(self.error_at(
                        tok.pos,
                        "load operand must be \"name\" or localname=\"name\"",
                    ))
                }
            }
        }
        self.expect(TokenType::RParen)?;

        if bindings.is_empty() {
            return Err(self.error_at(pos, "load statement must import at least 1 symbol"));
        }
        for b in &bindings {
            if b.name.starts_with('_') {
                return Err(self.error_at(
                    b.local.pos,
                    &format!("load: names with leading underscores are not exported: {}", b.name),
                ));
            }
        }

        Ok(Stmt::Load {
            module,
            bindings,
            pos,
        })
    }

    fn parse_def_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::Def)?;
        let name_tok = self.expect(TokenType::Identifier)?.clone();
        self.expect(TokenType::LParen)?;
        let params = self.parse_params(TokenType::RParen)?;
        self.expect(TokenType::RParen)?;
        self.expect(TokenType::Colon)?;
        let body = self.parse_suite()?;

        Ok(Stmt::Def {
            name: Ident::new(&name_tok.value, name_tok.pos),
            function: Box::new(Function {
                name: name_tok.value.clone(),
                pos: name_tok.pos,
                params,
                body,
                scope: FunctionScope::default(),
            }),
            pos,
        })
    }

    fn parse_params(&mut self, close: TokenType) -> Result<Vec<Param>, SyntaxError> {
        let mut params = Vec::new();
        while !self.check(close) {
            if !params.is_empty() {
                self.expect(TokenType::Comma)?;
                if self.check(close) {
                    break;
                }
            }
            params.push(self.parse_param()?);
        }
        Ok(params)
    }

    fn parse_param(&mut self) -> Result<Param, SyntaxError> {
        let pos = self.pos();
        if self.check(TokenType::StarStar) {
            self.advance();
            let tok = self.expect(TokenType::Identifier)?;
            return Ok(Param::StarStar(Ident::new(&tok.value, tok.pos)));
        }
        if self.check(TokenType::Star) {
            self.advance();
            let name = if self.check(TokenType::Identifier) {
                let tok = self.advance();
                Some(Ident::new(&tok.value, tok.pos))
            } else {
                None
            };
            return Ok(Param::Star { name, pos });
        }

        let tok = self.expect(TokenType::Identifier)?;
        let name = Ident::new(&tok.value, tok.pos);
        if self.check(TokenType::Assign) {
            self.advance();
            let default = self.parse_test()?;
            return Ok(Param::Optional { name, default });
        }
        Ok(Param::Required(name))
    }

    /// An indented block, or a simple statement on the same line.
    fn parse_suite(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        self.enter_depth()?;
        let result = self.parse_suite_inner();
        self.exit_depth();
        result
    }

    fn parse_suite_inner(&mut self) -> Result<Vec<Stmt>, SyntaxError> {
        let mut stmts = Vec::new();
        if !self.check(TokenType::Newline) {
            self.parse_simple_stmt(&mut stmts)?;
            return Ok(stmts);
        }

        self.advance();
        self.expect(TokenType::Indent)?;
        while !self.check(TokenType::Dedent) && !self.at_end() {
            self.skip_newlines();
            if self.check(TokenType::Dedent) || self.at_end() {
                break;
            }
            self.parse_statement(&mut stmts)?;
        }
        self.expect(TokenType::Dedent)?;
        Ok(stmts)
    }

    /// Parses `if` and, recursively, each `elif` as a nested `if` in the else branch.
    fn parse_if_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        self.advance(); // 'if' or 'elif'
        let cond = self.parse_test()?;
        self.expect(TokenType::Colon)?;
        let then_body = self.parse_suite()?;

        let else_body = if self.check(TokenType::Elif) {
            vec![self.parse_if_stmt()?]
        } else if self.check(TokenType::Else) {
            self.advance();
            self.expect(TokenType::Colon)?;
            self.parse_suite()?
        } else {
            Vec::new()
        };

        Ok(Stmt::If {
            cond,
            then_body,
            else_body,
            pos,
        })
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::For)?;
        let vars = self.parse_loop_variables()?;
        self.expect(TokenType::In)?;
        let iterable = self.parse_expression_list()?;
        self.expect(TokenType::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::For {
            vars,
            iterable,
            body,
            pos,
        })
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::While)?;
        let cond = self.parse_test()?;
        self.expect(TokenType::Colon)?;
        let body = self.parse_suite()?;
        Ok(Stmt::While { cond, body, pos })
    }

    /// primary_with_suffix {',' primary_with_suffix}, stopping before `in`.
    fn parse_loop_variables(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_primary_with_suffix()?;
        let vars = if self.check(TokenType::Comma) {
            let pos = first.pos();
            let mut elements = vec![first];
            while self.check(TokenType::Comma) {
                self.advance();
                if self.check(TokenType::In) {
                    break;
                }
                elements.push(self.parse_primary_with_suffix()?);
            }
            Expr::Tuple { elements, pos }
        } else {
            first
        };
        if !vars.is_assignable() {
            return Err(self.error_at(vars.pos(), "invalid loop variable"));
        }
        Ok(vars)
    }

    // ── Expressions (precedence climbing) ───────────────────────────────

    /// test {',' test}; more than one element yields a tuple.
    fn parse_expression_list(&mut self) -> Result<Expr, SyntaxError> {
        let first = self.parse_test()?;
        if !self.check(TokenType::Comma) {
            return Ok(first);
        }
        let pos = first.pos();
        let mut elements = vec![first];
        while self.check(TokenType::Comma) {
            self.advance();
            if self.at_expression_end() {
                break;
            }
            elements.push(self.parse_test()?);
        }
        Ok(Expr::Tuple { elements, pos })
    }

    fn parse_test(&mut self) -> Result<Expr, SyntaxError> {
        self.enter_depth()?;
        let result = self.parse_test_inner();
        self.exit_depth();
        result
    }

    fn parse_test_inner(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenType::Lambda) {
            return self.parse_lambda(true);
        }
        let then_expr = self.parse_or_expr()?;
        if !self.check(TokenType::If) {
            return Ok(then_expr);
        }

        let pos = self.pos();
        self.advance();
        let cond = self.parse_or_expr()?;
        if !self.check(TokenType::Else) {
            return Err(self.error("conditional expression without else clause"));
        }
        self.advance();
        let else_expr = self.parse_test()?;
        Ok(Expr::Conditional {
            cond: Box::new(cond),
            then_expr: Box::new(then_expr),
            else_expr: Box::new(else_expr),
            pos,
        })
    }

    /// A test without a trailing `if ... else ...`, as used in comprehension clauses.
    fn parse_test_no_cond(&mut self) -> Result<Expr, SyntaxError> {
        self.enter_depth()?;
        let result = if self.check(TokenType::Lambda) {
            self.parse_lambda(false)
        } else {
            self.parse_or_expr()
        };
        self.exit_depth();
        result
    }

    fn parse_lambda(&mut self, allow_cond: bool) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::Lambda)?;
        let params = self.parse_params(TokenType::Colon)?;
        self.expect(TokenType::Colon)?;
        let body = if allow_cond {
            self.parse_test()?
        } else {
            self.parse_test_no_cond()?
        };
        let body_pos = body.pos();
        Ok(Expr::Lambda(Box::new(Function {
            name: "lambda".to_string(),
            pos,
            params,
            body: vec![Stmt::Return {
                value: Some(body),
                pos: body_pos,
            }],
            scope: FunctionScope::default(),
        })))
    }

    fn parse_or_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_and_expr()?;
        while self.check(TokenType::Or) {
            let pos = self.pos();
            self.advance();
            let right = self.parse_and_expr()?;
            left = binary(BinaryOp::Or, left, right, pos);
        }
        Ok(left)
    }

    fn parse_and_expr(&mut self) -> Result<Expr, SyntaxError> {
        let mut left = self.parse_not_expr()?;
        while self.check(TokenType::And) {
            let pos = self.pos();
            self.advance();
            let right = self.parse_not_expr()?;
            left = binary(BinaryOp::And, left, right, pos);
        }
        Ok(left)
    }

    fn parse_not_expr(&mut self) -> Result<Expr, SyntaxError> {
        if self.check(TokenType::Not) {
            let pos = self.pos();
            self.advance();
            self.enter_depth()?;
            let operand = self.parse_not_expr();
            self.exit_depth();
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                operand: Box::new(operand?),
                pos,
            });
        }
        self.parse_comparison()
    }

    fn comparison_op(&self) -> Option<BinaryOp> {
        match self.current().token_type {
            TokenType::Equals => Some(BinaryOp::Eq),
            TokenType::NotEquals => Some(BinaryOp::Ne),
            TokenType::LessThan => Some(BinaryOp::Lt),
            TokenType::LessEqual => Some(BinaryOp::Le),
            TokenType::GreaterThan => Some(BinaryOp::Gt),
            TokenType::GreaterEqual => Some(BinaryOp::Ge),
            TokenType::In => Some(BinaryOp::In),
            TokenType::Not if self.peek_type(1) == Some(TokenType::In) => Some(BinaryOp::NotIn),
            _ => None,
        }
    }

    /// Comparisons do not chain: `a < b < c` is rejected.
    fn parse_comparison(&mut self) -> Result<Expr, SyntaxError> {
        let left = self.parse_bitor()?;
        let Some(op) = self.comparison_op() else {
            return Ok(left);
        };
        let pos = self.pos();
        self.advance();
        if op == BinaryOp::NotIn {
            self.advance();
        }
        let right = self.parse_bitor()?;
        if let Some(next) = self.comparison_op() {
            return Err(self.error(&format!(
                "{} does not associate with {} (use parens)",
                op, next
            )));
        }
        Ok(binary(op, left, right, pos))
    }

    fn parse_bitor(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(&[(TokenType::Pipe, BinaryOp::BitOr)], Self::parse_bitxor)
    }

    fn parse_bitxor(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(&[(TokenType::Caret, BinaryOp::BitXor)], Self::parse_bitand)
    }

    fn parse_bitand(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(&[(TokenType::Ampersand, BinaryOp::BitAnd)], Self::parse_shift)
    }

    fn parse_shift(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[(TokenType::LtLt, BinaryOp::Shl), (TokenType::GtGt, BinaryOp::Shr)],
            Self::parse_additive,
        )
    }

    fn parse_additive(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[(TokenType::Plus, BinaryOp::Add), (TokenType::Minus, BinaryOp::Sub)],
            Self::parse_multiplicative,
        )
    }

    fn parse_multiplicative(&mut self) -> Result<Expr, SyntaxError> {
        self.parse_binary_level(
            &[
                (TokenType::Star, BinaryOp::Mul),
                (TokenType::Slash, BinaryOp::Div),
                (TokenType::SlashSlash, BinaryOp::FloorDiv),
                (TokenType::Percent, BinaryOp::Mod),
            ],
            Self::parse_unary,
        )
    }

    /// One left-associative precedence level.
    fn parse_binary_level(
        &mut self,
        ops: &[(TokenType, BinaryOp)],
        next: fn(&mut Self) -> Result<Expr, SyntaxError>,
    ) -> Result<Expr, SyntaxError> {
        let mut left = next(self)?;
        loop {
            let tt = self.current().token_type;
            let Some(&(_, op)) = ops.iter().find(|(t, _)| *t == tt) else {
                break;
            };
            let pos = self.pos();
            self.advance();
            let right = next(self)?;
            left = binary(op, left, right, pos);
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, SyntaxError> {
        let op = match self.current().token_type {
            TokenType::Minus => UnaryOp::Minus,
            TokenType::Plus => UnaryOp::Plus,
            TokenType::Tilde => UnaryOp::Invert,
            _ => return self.parse_primary_with_suffix(),
        };
        let pos = self.pos();
        self.advance();
        self.enter_depth()?;
        let operand = self.parse_unary();
        self.exit_depth();
        Ok(Expr::Unary {
            op,
            operand: Box::new(operand?),
            pos,
        })
    }

    fn parse_primary_with_suffix(&mut self) -> Result<Expr, SyntaxError> {
        let mut expr = self.parse_primary()?;

        loop {
            match self.current().token_type {
                TokenType::Dot => {
                    self.advance();
                    let tok = self.expect(TokenType::Identifier)?;
                    expr = Expr::Dot {
                        object: Box::new(expr),
                        name: tok.value.clone(),
                        pos: tok.pos,
                    };
                }
                TokenType::LParen => {
                    let pos = self.pos();
                    self.advance();
                    let args = self.parse_call_args()?;
                    self.expect(TokenType::RParen)?;
                    expr = Expr::Call {
                        function: Box::new(expr),
                        args,
                        pos,
                    };
                }
                TokenType::LBracket => {
                    expr = self.parse_index_or_slice(expr)?;
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_index_or_slice(&mut self, object: Expr) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::LBracket)?;

        let mut start = None;
        if !self.check(TokenType::Colon) {
            let index = self.parse_expression_list()?;
            if self.check(TokenType::RBracket) {
                self.advance();
                return Ok(Expr::Index {
                    object: Box::new(object),
                    index: Box::new(index),
                    pos,
                });
            }
            start = Some(Box::new(index));
        }

        self.expect(TokenType::Colon)?;
        let stop = if self.check(TokenType::Colon) || self.check(TokenType::RBracket) {
            None
        } else {
            Some(Box::new(self.parse_test()?))
        };
        let mut step = None;
        if self.check(TokenType::Colon) {
            self.advance();
            if !self.check(TokenType::RBracket) {
                step = Some(Box::new(self.parse_test()?));
            }
        }
        self.expect(TokenType::RBracket)?;

        Ok(Expr::Slice {
            object: Box::new(object),
            start,
            stop,
            step,
            pos,
        })
    }

    fn parse_call_args(&mut self) -> Result<Vec<Argument>, SyntaxError> {
        let mut args = Vec::new();
        while !self.check(TokenType::RParen) {
            if !args.is_empty() {
                self.expect(TokenType::Comma)?;
                if self.check(TokenType::RParen) {
                    break;
                }
            }
            let arg = match self.current().token_type {
                TokenType::StarStar => {
                    self.advance();
                    Argument::StarStar(self.parse_test()?)
                }
                TokenType::Star => {
                    self.advance();
                    Argument::Star(self.parse_test()?)
                }
                TokenType::Identifier if self.peek_type(1) == Some(TokenType::Assign) => {
                    let tok = self.advance().clone();
                    self.advance(); // consume =
                    Argument::Named {
                        name: tok.value,
                        value: self.parse_test()?,
                        pos: tok.pos,
                    }
                }
                _ => Argument::Positional(self.parse_test()?),
            };
            args.push(arg);
        }
        Ok(args)
    }

    fn parse_primary(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        let tok = self.current().clone();

        match tok.token_type {
            TokenType::Identifier => {
                self.advance();
                Ok(Expr::Ident(Ident::new(&tok.value, pos)))
            }
            TokenType::Integer => {
                self.advance();
                let value = parse_int_literal(&tok.value).ok_or_else(|| {
                    self.error_at(pos, &format!("invalid int literal: {}", tok.value))
                })?;
                Ok(Expr::Literal {
                    value: Literal::Int(value),
                    pos,
                })
            }
            TokenType::Float => {
                self.advance();
                let value: f64 = tok.value.parse().map_err(|_| {
                    self.error_at(pos, &format!("invalid float literal: {}", tok.value))
                })?;
                Ok(Expr::Literal {
                    value: Literal::Float(value),
                    pos,
                })
            }
            TokenType::StringLit => {
                self.advance();
                Ok(Expr::Literal {
                    value: Literal::String(tok.value),
                    pos,
                })
            }
            TokenType::LParen => {
                self.advance();
                if self.check(TokenType::RParen) {
                    self.advance();
                    return Ok(Expr::Tuple {
                        elements: Vec::new(),
                        pos,
                    });
                }
                let expr = self.parse_expression_list()?;
                self.expect(TokenType::RParen)?;
                Ok(expr)
            }
            TokenType::LBracket => self.parse_list_expr(),
            TokenType::LBrace => self.parse_dict_expr(),
            _ => Err(self.unexpected("primary expression")),
        }
    }

    fn parse_list_expr(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::LBracket)?;
        if self.check(TokenType::RBracket) {
            self.advance();
            return Ok(Expr::List {
                elements: Vec::new(),
                pos,
            });
        }

        let first = self.parse_test()?;
        if self.check(TokenType::For) {
            let clauses = self.parse_comp_clauses()?;
            self.expect(TokenType::RBracket)?;
            return Ok(Expr::Comprehension(Box::new(Comprehension {
                body: ComprehensionBody::List(first),
                clauses,
                pos,
            })));
        }

        let mut elements = vec![first];
        while self.check(TokenType::Comma) {
            self.advance();
            if self.check(TokenType::RBracket) {
                break;
            }
            elements.push(self.parse_test()?);
        }
        self.expect(TokenType::RBracket)?;
        Ok(Expr::List { elements, pos })
    }

    fn parse_dict_expr(&mut self) -> Result<Expr, SyntaxError> {
        let pos = self.pos();
        self.expect(TokenType::LBrace)?;
        if self.check(TokenType::RBrace) {
            self.advance();
            return Ok(Expr::Dict {
                entries: Vec::new(),
                pos,
            });
        }

        let first = self.parse_dict_entry()?;
        if self.check(TokenType::For) {
            let clauses = self.parse_comp_clauses()?;
            self.expect(TokenType::RBrace)?;
            return Ok(Expr::Comprehension(Box::new(Comprehension {
                body: ComprehensionBody::Dict(first),
                clauses,
                pos,
            })));
        }

        let mut entries = vec![first];
        while self.check(TokenType::Comma) {
            self.advance();
            if self.check(TokenType::RBrace) {
                break;
            }
            entries.push(self.parse_dict_entry()?);
        }
        self.expect(TokenType::RBrace)?;
        Ok(Expr::Dict { entries, pos })
    }

    fn parse_dict_entry(&mut self) -> Result<DictEntry, SyntaxError> {
        let key = self.parse_test()?;
        let pos = self.pos();
        self.expect(TokenType::Colon)?;
        let value = self.parse_test()?;
        Ok(DictEntry { key, value, pos })
    }

    fn parse_comp_clauses(&mut self) -> Result<Vec<Clause>, SyntaxError> {
        let mut clauses = Vec::new();
        loop {
            let pos = self.pos();
            if self.check(TokenType::For) {
                self.advance();
                let vars = self.parse_loop_variables()?;
                self.expect(TokenType::In)?;
                let iterable = self.parse_test_no_cond()?;
                clauses.push(Clause::For {
                    vars,
                    iterable,
                    pos,
                });
            } else if self.check(TokenType::If) {
                self.advance();
                let cond = self.parse_test_no_cond()?;
                clauses.push(Clause::If { cond, pos });
            } else {
                break;
            }
        }
        Ok(clauses)
    }

    // ── Token stream helpers ────────────────────────────────────────────

    fn current(&self) -> &Token {
        if self.pos >= self.tokens.len() {
            &self.tokens[self.tokens.len() - 1] // EOF
        } else {
            &self.tokens[self.pos]
        }
    }

    fn advance(&mut self) -> &Token {
        let pos = self.pos.min(self.tokens.len() - 1);
        if self.pos < self.tokens.len() {
            self.pos += 1;
        }
        &self.tokens[pos]
    }

    fn check(&self, token_type: TokenType) -> bool {
        self.current().token_type == token_type
    }

    fn expect(&mut self, token_type: TokenType) -> Result<&Token, SyntaxError> {
        if !self.check(token_type) {
            return Err(self.unexpected(&format!("{:?}", token_type)));
        }
        Ok(self.advance())
    }

    fn peek_type(&self, offset: usize) -> Option<TokenType> {
        self.tokens.get(self.pos + offset).map(|t| t.token_type)
    }

    fn at_end(&self) -> bool {
        self.current().token_type == TokenType::Eof
    }

    fn at_statement_end(&self) -> bool {
        matches!(
            self.current().token_type,
            TokenType::Newline | TokenType::Semicolon | TokenType::Eof
        )
    }

    /// Tokens that may follow a trailing comma in a bare tuple.
    fn at_expression_end(&self) -> bool {
        let tt = self.current().token_type;
        tt.is_augmented_assign()
            || matches!(
                tt,
                TokenType::Newline
                    | TokenType::Semicolon
                    | TokenType::Eof
                    | TokenType::Assign
                    | TokenType::Colon
                    | TokenType::RParen
                    | TokenType::RBracket
                    | TokenType::RBrace
            )
    }

    fn skip_newlines(&mut self) {
        while self.check(TokenType::Newline) {
            self.advance();
        }
    }

    fn pos(&self) -> Position {
        self.current().pos
    }

    fn error(&self, message: &str) -> SyntaxError {
        self.error_at(self.pos(), message)
    }

    fn error_at(&self, pos: Position, message: &str) -> SyntaxError {
        SyntaxError {
            message: message.to_string(),
            pos,
            file: self.filename.clone(),
        }
    }

    fn unexpected(&self, want: &str) -> SyntaxError {
        self.error(&format!("got {}, want {}", describe(self.current()), want))
    }
}

fn binary(op: BinaryOp, left: Expr, right: Expr, pos: Position) -> Expr {
    Expr::Binary {
        op,
        left: Box::new(left),
        right: Box::new(right),
        pos,
    }
}

fn augmented_op(tt: TokenType) -> BinaryOp {
    match tt {
        TokenType::PlusEq => BinaryOp::Add,
        TokenType::MinusEq => BinaryOp::Sub,
        TokenType::StarEq => BinaryOp::Mul,
        TokenType::SlashEq => BinaryOp::Div,
        TokenType::SlashSlashEq => BinaryOp::FloorDiv,
        TokenType::PercentEq => BinaryOp::Mod,
        TokenType::AmpEq => BinaryOp::BitAnd,
        TokenType::PipeEq => BinaryOp::BitOr,
        TokenType::CaretEq => BinaryOp::BitXor,
        TokenType::LtLtEq => BinaryOp::Shl,
        TokenType::GtGtEq => BinaryOp::Shr,
        other => unreachable!("not an augmented assignment: {:?}", other),
    }
}

fn describe(tok: &Token) -> String {
    match tok.token_type {
        TokenType::Newline => "newline".to_string(),
        TokenType::Indent => "indent".to_string(),
        TokenType::Dedent => "outdent".to_string(),
        TokenType::Eof => "end of file".to_string(),
        TokenType::StringLit => format!("string literal {:?}", tok.value),
        TokenType::Integer | TokenType::Float => format!("number {}", tok.value),
        TokenType::Identifier => format!("identifier {}", tok.value),
        _ => format!("{:?}", tok.value),
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_alphabetic() || c == '_' => {}
        _ => return false,
    }
    chars.all(|c| c.is_alphanumeric() || c == '_')
}

/// Parses decimal and `0x`/`0o`/`0b` prefixed literals as produced by the lexer.
fn parse_int_literal(text: &str) -> Option<BigInt> {
    let (digits, radix) = match text.get(..2) {
        Some("0x") => (&text[2..], 16),
        Some("0o") => (&text[2..], 8),
        Some("0b") => (&text[2..], 2),
        _ => (text, 10),
    };
    BigInt::from_str_radix(digits, radix).ok()
}
