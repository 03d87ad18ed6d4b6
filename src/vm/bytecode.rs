//! Kestrel program format and serialization
//!
//! A .kstc file holds a serialized Program: the magic tag, a version byte,
//! the body and a SHA-256 checksum of the body. All counts and operands in
//! the body are unsigned LEB128 varints.

use std::fmt::Write as _;

use log::debug;
use sha2::{Digest, Sha256};
use thiserror::Error;

use super::opcodes::{Constant, Instruction};
use crate::ast::Position;
use crate::resolve::{Binding, FreeVar, GlobalVar, LocalVar, Scope};
use crate::runtime::Int;

pub const MAGIC: &[u8; 4] = b"KSTC";
pub const VERSION: u8 = 1;
const CHECKSUM_LEN: usize = 32;

// Constant type tags
const TAG_INT: u8 = 0;
const TAG_FLOAT: u8 = 1;
const TAG_STRING: u8 = 2;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("not a compiled module")]
    NotCompiled,
    #[error("unsupported compiled module version {found} (want {VERSION})")]
    UnsupportedVersion { found: u8 },
    #[error("corrupt compiled module: {0}")]
    Corrupt(String),
}

/// A module named by a `load` statement.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRef {
    pub module: String,
    pub pos: Position,
}

/// A compiled file: the unit of serialization and execution.
#[derive(Debug, Clone)]
pub struct Program {
    pub filename: String,
    /// Whether functions may call themselves.
    pub recursion: bool,
    pub loads: Vec<LoadRef>,
    /// Attribute, predeclared and universal names referenced by operands.
    pub names: Vec<String>,
    pub constants: Vec<Constant>,
    pub globals: Vec<GlobalVar>,
    /// Compiled functions; index 0 is the toplevel.
    pub functions: Vec<Funcode>,
}

/// The compiled form of one function body.
#[derive(Debug, Clone)]
pub struct Funcode {
    pub name: String,
    pub pos: Position,
    pub doc: String,
    pub code: Vec<Instruction>,
    /// `(pc, position)` pairs in pc order; an instruction takes the
    /// position of the last entry at or before it.
    pub positions: Vec<(u32, Position)>,
    pub locals: Vec<LocalVar>,
    pub freevars: Vec<FreeVar>,
    /// Named parameters, positional and keyword-only.
    pub num_params: u32,
    pub num_kwonly: u32,
    pub has_varargs: bool,
    pub has_kwargs: bool,
    /// One flag per named parameter: whether it has a default value.
    pub default_mask: Vec<bool>,
}

impl Funcode {
    /// Source position of the instruction at `pc`.
    pub fn position(&self, pc: usize) -> Position {
        let i = self.positions.partition_point(|(p, _)| *p as usize <= pc);
        if i == 0 {
            self.pos
        } else {
            self.positions[i - 1].1
        }
    }

    /// Number of local slots taken by parameters.
    pub fn param_slots(&self) -> usize {
        self.num_params as usize + self.has_varargs as usize + self.has_kwargs as usize
    }

    /// The instructions with symbolic operands, separated by `; `.
    pub fn disassemble(&self, program: &Program) -> String {
        self.code
            .iter()
            .map(|inst| self.render(program, inst))
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn render(&self, program: &Program, inst: &Instruction) -> String {
        let name_of = |list: &[String], i: u32| {
            list.get(i as usize).cloned().unwrap_or_else(|| format!("?{}", i))
        };
        let symbol = match *inst {
            Instruction::Constant(i) => Some(
                program
                    .constants
                    .get(i as usize)
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| format!("?{}", i)),
            ),
            Instruction::Local(i)
            | Instruction::SetLocal(i)
            | Instruction::LocalCell(i)
            | Instruction::SetLocalCell(i) => Some(
                self.locals
                    .get(i as usize)
                    .map(|l| l.name.clone())
                    .unwrap_or_else(|| format!("?{}", i)),
            ),
            Instruction::Free(i) => Some(
                self.freevars
                    .get(i as usize)
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| format!("?{}", i)),
            ),
            Instruction::Global(i) | Instruction::SetGlobal(i) => Some(
                program
                    .globals
                    .get(i as usize)
                    .map(|g| g.name.clone())
                    .unwrap_or_else(|| format!("?{}", i)),
            ),
            Instruction::Predeclared(i)
            | Instruction::Universal(i)
            | Instruction::Attr(i)
            | Instruction::SetField(i) => Some(name_of(&program.names, i)),
            Instruction::MakeFunc(i) => Some(
                program
                    .functions
                    .get(i as usize)
                    .map(|f| f.name.clone())
                    .unwrap_or_else(|| format!("?{}", i)),
            ),
            _ => None,
        };
        match symbol {
            Some(s) => format!("{} {}", inst.mnemonic(), s),
            None => inst.to_string(),
        }
    }
}

impl Program {
    pub fn toplevel(&self) -> &Funcode {
        &self.functions[0]
    }

    /// Whether `data` starts with the compiled-module tag.
    pub fn is_compiled(data: &[u8]) -> bool {
        data.starts_with(MAGIC)
    }

    /// Names of the modules this program loads, in statement order.
    pub fn load_modules(&self) -> Vec<&str> {
        self.loads.iter().map(|l| l.module.as_str()).collect()
    }

    /// Multi-line listing of every function with pcs and positions.
    pub fn listing(&self) -> String {
        let mut out = String::new();
        for (fi, f) in self.functions.iter().enumerate() {
            if fi > 0 {
                out.push('\n');
            }
            let _ = writeln!(
                out,
                "function {} {}:{} params={} kwonly={}{}{}",
                f.name,
                self.filename,
                f.pos,
                f.num_params,
                f.num_kwonly,
                if f.has_varargs { " *args" } else { "" },
                if f.has_kwargs { " **kwargs" } else { "" },
            );
            for (pc, inst) in f.code.iter().enumerate() {
                let _ = writeln!(
                    out,
                    "  {:>4}  {:<40} {}",
                    pc,
                    f.render(self, inst),
                    f.position(pc)
                );
            }
        }
        out
    }

    // ── Serialization ───────────────────────────────────────────────────

    pub fn write(&self) -> Vec<u8> {
        let mut enc = Encoder::default();
        enc.string(&self.filename);
        enc.flag(self.recursion);

        enc.uint(self.loads.len());
        for l in &self.loads {
            enc.string(&l.module);
            enc.position(l.pos);
        }

        enc.uint(self.names.len());
        for n in &self.names {
            enc.string(n);
        }

        enc.uint(self.constants.len());
        for c in &self.constants {
            enc.constant(c);
        }

        enc.uint(self.globals.len());
        for g in &self.globals {
            enc.string(&g.name);
            enc.position(g.pos);
        }

        enc.uint(self.functions.len());
        for f in &self.functions {
            enc.funcode(f);
        }

        let body = enc.buf;
        let mut out = Vec::with_capacity(MAGIC.len() + 1 + body.len() + CHECKSUM_LEN);
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        out.extend_from_slice(&body);
        out.extend_from_slice(&Sha256::digest(&body));
        debug!(
            "serialized {}: {} functions, {} bytes",
            self.filename,
            self.functions.len(),
            out.len()
        );
        out
    }

    /// Decodes a serialized program. Never panics on malformed input.
    pub fn read(data: &[u8]) -> Result<Program, DecodeError> {
        if !Program::is_compiled(data) {
            return Err(DecodeError::NotCompiled);
        }
        let Some(&version) = data.get(MAGIC.len()) else {
            return Err(corrupt("truncated header"));
        };
        if version != VERSION {
            return Err(DecodeError::UnsupportedVersion { found: version });
        }
        let header = MAGIC.len() + 1;
        if data.len() < header + CHECKSUM_LEN {
            return Err(corrupt("truncated"));
        }
        let (body, checksum) = data[header..].split_at(data.len() - header - CHECKSUM_LEN);
        if Sha256::digest(body).as_slice() != checksum {
            return Err(corrupt("checksum mismatch"));
        }

        let mut dec = Decoder { data: body, pos: 0 };
        let filename = dec.string()?;
        let recursion = dec.flag()?;

        let n = dec.count()?;
        let mut loads = Vec::with_capacity(n);
        for _ in 0..n {
            let module = dec.string()?;
            let pos = dec.position()?;
            loads.push(LoadRef { module, pos });
        }

        let n = dec.count()?;
        let mut names = Vec::with_capacity(n);
        for _ in 0..n {
            names.push(dec.string()?);
        }

        let n = dec.count()?;
        let mut constants = Vec::with_capacity(n);
        for _ in 0..n {
            constants.push(dec.constant()?);
        }

        let n = dec.count()?;
        let mut globals = Vec::with_capacity(n);
        for _ in 0..n {
            let name = dec.string()?;
            let pos = dec.position()?;
            globals.push(GlobalVar { name, pos });
        }

        let n = dec.count()?;
        let mut functions = Vec::with_capacity(n);
        for _ in 0..n {
            functions.push(dec.funcode()?);
        }

        if dec.pos != body.len() {
            return Err(corrupt("trailing data"));
        }

        let program = Program {
            filename,
            recursion,
            loads,
            names,
            constants,
            globals,
            functions,
        };
        program.validate()?;
        debug!(
            "decoded {}: {} functions from {} bytes",
            program.filename,
            program.functions.len(),
            data.len()
        );
        Ok(program)
    }

    /// Checks that every operand refers to something that exists, so the
    /// interpreter can index without bounds failures.
    fn validate(&self) -> Result<(), DecodeError> {
        if self.functions.is_empty() {
            return Err(corrupt("no toplevel function"));
        }
        for f in &self.functions {
            let bad = |what: &str, i: u32| corrupt(&format!("{} index {} out of range in {}", what, i, f.name));
            if f.default_mask.len() != f.num_params as usize
                || f.num_kwonly > f.num_params
                || f.param_slots() > f.locals.len()
            {
                return Err(corrupt(&format!("bad parameter layout in {}", f.name)));
            }
            for fv in &f.freevars {
                if !matches!(fv.outer.scope, Scope::Cell | Scope::Free) {
                    return Err(corrupt(&format!("bad free variable {} in {}", fv.name, f.name)));
                }
            }
            for inst in &f.code {
                let ok = match *inst {
                    Instruction::Constant(i) => (i as usize) < self.constants.len(),
                    Instruction::Local(i)
                    | Instruction::SetLocal(i)
                    | Instruction::LocalCell(i)
                    | Instruction::SetLocalCell(i) => (i as usize) < f.locals.len(),
                    Instruction::Free(i) => (i as usize) < f.freevars.len(),
                    Instruction::Global(i) | Instruction::SetGlobal(i) => {
                        (i as usize) < self.globals.len()
                    }
                    Instruction::Predeclared(i)
                    | Instruction::Universal(i)
                    | Instruction::Attr(i)
                    | Instruction::SetField(i) => (i as usize) < self.names.len(),
                    Instruction::MakeFunc(i) => i > 0 && (i as usize) < self.functions.len(),
                    other => match other.jump_target() {
                        Some(t) => (t as usize) <= f.code.len(),
                        None => true,
                    },
                };
                if !ok {
                    let operand = inst.operands().first().copied().unwrap_or(0);
                    return Err(bad(inst.mnemonic(), operand));
                }
            }
        }
        Ok(())
    }
}

fn corrupt(msg: &str) -> DecodeError {
    DecodeError::Corrupt(msg.to_string())
}

// ── Encoding ────────────────────────────────────────────────────────────

#[derive(Default)]
struct Encoder {
    buf: Vec<u8>,
}

impl Encoder {
    fn varint(&mut self, mut v: u64) {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.buf.push(byte);
                return;
            }
            self.buf.push(byte | 0x80);
        }
    }

    fn uint(&mut self, v: usize) {
        self.varint(v as u64);
    }

    fn flag(&mut self, b: bool) {
        self.buf.push(b as u8);
    }

    fn bytes(&mut self, b: &[u8]) {
        self.uint(b.len());
        self.buf.extend_from_slice(b);
    }

    fn string(&mut self, s: &str) {
        self.bytes(s.as_bytes());
    }

    fn position(&mut self, p: Position) {
        self.varint(p.line as u64);
        self.varint(p.col as u64);
    }

    fn scope(&mut self, s: Scope) {
        self.buf.push(match s {
            Scope::Local => 0,
            Scope::Cell => 1,
            Scope::Free => 2,
            Scope::Global => 3,
            Scope::Predeclared => 4,
            Scope::Universal => 5,
        });
    }

    fn constant(&mut self, c: &Constant) {
        match c {
            Constant::Int(i) => {
                self.buf.push(TAG_INT);
                self.bytes(&i.to_signed_bytes_le());
            }
            Constant::Float(f) => {
                self.buf.push(TAG_FLOAT);
                self.buf.extend_from_slice(&f.to_le_bytes());
            }
            Constant::String(s) => {
                self.buf.push(TAG_STRING);
                self.string(s);
            }
        }
    }

    fn funcode(&mut self, f: &Funcode) {
        self.string(&f.name);
        self.position(f.pos);
        self.string(&f.doc);

        self.varint(f.num_params as u64);
        self.varint(f.num_kwonly as u64);
        self.flag(f.has_varargs);
        self.flag(f.has_kwargs);
        for d in &f.default_mask {
            self.flag(*d);
        }

        self.uint(f.locals.len());
        for l in &f.locals {
            self.string(&l.name);
            self.position(l.pos);
            self.flag(l.cell);
        }

        self.uint(f.freevars.len());
        for fv in &f.freevars {
            self.string(&fv.name);
            self.position(fv.pos);
            self.scope(fv.outer.scope);
            self.varint(fv.outer.index as u64);
        }

        self.uint(f.code.len());
        for inst in &f.code {
            self.buf.push(inst.opcode());
            for op in inst.operands() {
                self.varint(op as u64);
            }
        }

        // Position table: pc and line as deltas, column absolute.
        self.uint(f.positions.len());
        let (mut prev_pc, mut prev_line) = (0u32, 0i64);
        for (pc, pos) in &f.positions {
            self.varint((pc - prev_pc) as u64);
            let delta = pos.line as i64 - prev_line;
            self.varint(((delta << 1) ^ (delta >> 63)) as u64);
            self.varint(pos.col as u64);
            prev_pc = *pc;
            prev_line = pos.line as i64;
        }
    }
}

// ── Decoding ────────────────────────────────────────────────────────────

struct Decoder<'a> {
    data: &'a [u8],
    pos: usize,
}

impl Decoder<'_> {
    fn byte(&mut self) -> Result<u8, DecodeError> {
        let b = *self
            .data
            .get(self.pos)
            .ok_or_else(|| corrupt("unexpected end of data"))?;
        self.pos += 1;
        Ok(b)
    }

    fn varint(&mut self) -> Result<u64, DecodeError> {
        let mut v: u64 = 0;
        let mut shift = 0;
        loop {
            let b = self.byte()?;
            if shift >= 64 || (shift == 63 && b > 1) {
                return Err(corrupt("varint overflow"));
            }
            v |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
        }
    }

    fn u32(&mut self) -> Result<u32, DecodeError> {
        u32::try_from(self.varint()?).map_err(|_| corrupt("operand out of range"))
    }

    /// A length prefix, bounded by the bytes that remain.
    fn count(&mut self) -> Result<usize, DecodeError> {
        let n = self.varint()?;
        if n > (self.data.len() - self.pos) as u64 {
            return Err(corrupt("count exceeds remaining data"));
        }
        Ok(n as usize)
    }

    fn flag(&mut self) -> Result<bool, DecodeError> {
        match self.byte()? {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(corrupt(&format!("bad flag byte {}", b))),
        }
    }

    fn bytes(&mut self) -> Result<&[u8], DecodeError> {
        let n = self.count()?;
        let out = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(out)
    }

    fn string(&mut self) -> Result<String, DecodeError> {
        let b = self.bytes()?;
        String::from_utf8(b.to_vec()).map_err(|_| corrupt("invalid UTF-8 in string"))
    }

    fn position(&mut self) -> Result<Position, DecodeError> {
        Ok(Position::new(self.u32()?, self.u32()?))
    }

    fn scope(&mut self) -> Result<Scope, DecodeError> {
        Ok(match self.byte()? {
            0 => Scope::Local,
            1 => Scope::Cell,
            2 => Scope::Free,
            3 => Scope::Global,
            4 => Scope::Predeclared,
            5 => Scope::Universal,
            b => return Err(corrupt(&format!("unknown scope {}", b))),
        })
    }

    fn constant(&mut self) -> Result<Constant, DecodeError> {
        match self.byte()? {
            TAG_INT => Ok(Constant::Int(Int::from_signed_bytes_le(self.bytes()?))),
            TAG_FLOAT => {
                let mut raw = [0u8; 8];
                for b in raw.iter_mut() {
                    *b = self.byte()?;
                }
                Ok(Constant::Float(f64::from_le_bytes(raw)))
            }
            TAG_STRING => Ok(Constant::String(self.string()?)),
            tag => Err(corrupt(&format!("unknown constant tag {}", tag))),
        }
    }

    fn funcode(&mut self) -> Result<Funcode, DecodeError> {
        let name = self.string()?;
        let pos = self.position()?;
        let doc = self.string()?;

        let num_params = self.u32()?;
        let num_kwonly = self.u32()?;
        let has_varargs = self.flag()?;
        let has_kwargs = self.flag()?;
        if num_params as usize > self.data.len() - self.pos {
            return Err(corrupt("parameter count exceeds remaining data"));
        }
        let mut default_mask = Vec::with_capacity(num_params as usize);
        for _ in 0..num_params {
            default_mask.push(self.flag()?);
        }

        let n = self.count()?;
        let mut locals = Vec::with_capacity(n);
        for _ in 0..n {
            let name = self.string()?;
            let pos = self.position()?;
            let cell = self.flag()?;
            locals.push(LocalVar { name, pos, cell });
        }

        let n = self.count()?;
        let mut freevars = Vec::with_capacity(n);
        for _ in 0..n {
            let name = self.string()?;
            let pos = self.position()?;
            let scope = self.scope()?;
            let index = self.u32()?;
            freevars.push(FreeVar {
                name,
                pos,
                outer: Binding { scope, index },
            });
        }

        let n = self.count()?;
        let mut code = Vec::with_capacity(n);
        for _ in 0..n {
            let op = self.byte()?;
            match Instruction::decode(op, || self.u32())? {
                Some(inst) => code.push(inst),
                None => return Err(corrupt(&format!("unknown opcode 0x{:02x}", op))),
            }
        }

        let n = self.count()?;
        let mut positions = Vec::with_capacity(n);
        let (mut pc, mut line) = (0u32, 0i64);
        for _ in 0..n {
            pc = pc
                .checked_add(self.u32()?)
                .ok_or_else(|| corrupt("position table overflow"))?;
            let z = self.varint()?;
            line += ((z >> 1) as i64) ^ -((z & 1) as i64);
            let col = self.u32()?;
            let line32 = u32::try_from(line).map_err(|_| corrupt("bad line number"))?;
            positions.push((pc, Position::new(line32, col)));
        }

        Ok(Funcode {
            name,
            pos,
            doc,
            code,
            positions,
            locals,
            freevars,
            num_params,
            num_kwonly,
            has_varargs,
            has_kwargs,
            default_mask,
        })
    }
}
