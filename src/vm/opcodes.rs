//! Kestrel bytecode instruction set

use std::fmt;

use crate::runtime::{format_float, quote_string, Int, Value};

/// Constants stored in a program's constant pool
#[derive(Debug, Clone)]
pub enum Constant {
    Int(Int),
    Float(f64),
    String(String),
}

impl Constant {
    /// Identity used for interning: floats compare by bit pattern so that
    /// `0.0` and `-0.0` stay distinct.
    pub fn same(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            _ => false,
        }
    }

    pub fn to_value(&self) -> Value {
        match self {
            Constant::Int(i) => Value::Int(i.clone()),
            Constant::Float(f) => Value::Float(*f),
            Constant::String(s) => Value::string(s),
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Constant::Int(n) => write!(f, "{}", n),
            Constant::Float(n) => write!(f, "{}", format_float(*n)),
            Constant::String(s) => write!(f, "{}", quote_string(s)),
        }
    }
}

/// Bytecode instructions for the Kestrel VM.
///
/// Operands are `u32`: indices into the constant pool, the names table,
/// the frame's locals, the program's globals or funcodes, element counts,
/// or absolute jump targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    // ── Stack ────────────────────────────────────────────────────────
    Nop,
    /// x → x x
    Dup,
    /// x y → x y x y
    Dup2,
    Pop,
    /// x y → y x
    Exch,

    // ── Constants ────────────────────────────────────────────────────
    None,
    True,
    False,
    /// Push constants[idx]
    Constant(u32),

    // ── Operators ────────────────────────────────────────────────────
    Plus,
    Minus,
    Star,
    Slash,
    SlashSlash,
    Percent,
    Amp,
    Pipe,
    Circumflex,
    LtLt,
    GtGt,
    In,
    NotIn,
    Eql,
    Neq,
    Lt,
    Gt,
    Le,
    Ge,
    UPlus,
    UMinus,
    Tilde,
    Not,
    /// `x += y`: extends lists in place
    InplaceAdd,
    /// `x |= y`: updates dicts in place
    InplacePipe,

    // ── Containers ───────────────────────────────────────────────────
    /// Pop n elements, push tuple
    MakeTuple(u32),
    /// Pop n elements, push list
    MakeList(u32),
    /// Push a new empty dict
    MakeDict,
    /// dict k v → (dict[k] = v)
    SetDict,
    /// As SetDict, but a duplicate key is an error
    SetDictUniq,
    /// list x → (list.append(x))
    Append,
    /// x i → x[i]
    Index,
    /// x i v → (x[i] = v)
    SetIndex,
    /// x lo hi step → x[lo:hi:step]
    Slice,
    /// Pop an iterable of exactly n elements, push them last-first
    Unpack(u32),

    // ── Variables ────────────────────────────────────────────────────
    Local(u32),
    SetLocal(u32),
    /// Load through the cell held in a local slot
    LocalCell(u32),
    SetLocalCell(u32),
    /// Load through a captured cell
    Free(u32),
    Global(u32),
    SetGlobal(u32),
    /// Push the predeclared value named names[idx]
    Predeclared(u32),
    /// Push the universal value named names[idx]
    Universal(u32),

    // ── Attributes ───────────────────────────────────────────────────
    /// x → x.names[idx]
    Attr(u32),
    /// x v → (x.names[idx] = v)
    SetField(u32),

    // ── Control flow ─────────────────────────────────────────────────
    /// Jump to an absolute pc
    Jmp(u32),
    /// Pop; jump if falsy
    JmpIfFalse(u32),
    /// Pop; jump if truthy
    JmpIfTrue(u32),
    /// Pop an iterable, push an iterator on the frame's iterator stack
    IterPush,
    /// Push the next element, or jump to the target when exhausted
    IterJmp(u32),
    IterPop,
    Return,

    // ── Calls ────────────────────────────────────────────────────────
    /// fn positional... (name value)... → result: (positional, named)
    Call(u32, u32),
    /// As Call, followed by a `*args` iterable
    CallVar(u32, u32),
    /// As Call, followed by a `**kwargs` dict
    CallKw(u32, u32),
    /// As Call, followed by `*args` and `**kwargs`
    CallVarKw(u32, u32),
    /// defaults-tuple → function for funcodes[idx]
    MakeFunc(u32),
    /// module name1..nameN → value1..valueN
    Load(u32),
}

impl Instruction {
    pub fn mnemonic(&self) -> &'static str {
        use Instruction::*;
        match self {
            Nop => "NOP",
            Dup => "DUP",
            Dup2 => "DUP2",
            Pop => "POP",
            Exch => "EXCH",
            None => "NONE",
            True => "TRUE",
            False => "FALSE",
            Instruction::Constant(_) => "CONSTANT",
            Plus => "PLUS",
            Minus => "MINUS",
            Star => "STAR",
            Slash => "SLASH",
            SlashSlash => "SLASHSLASH",
            Percent => "PERCENT",
            Amp => "AMP",
            Pipe => "PIPE",
            Circumflex => "CIRCUMFLEX",
            LtLt => "LTLT",
            GtGt => "GTGT",
            In => "IN",
            NotIn => "NOT_IN",
            Eql => "EQL",
            Neq => "NEQ",
            Lt => "LT",
            Gt => "GT",
            Le => "LE",
            Ge => "GE",
            UPlus => "UPLUS",
            UMinus => "UMINUS",
            Tilde => "TILDE",
            Not => "NOT",
            InplaceAdd => "INPLACE_ADD",
            InplacePipe => "INPLACE_PIPE",
            MakeTuple(_) => "MAKE_TUPLE",
            MakeList(_) => "MAKE_LIST",
            MakeDict => "MAKE_DICT",
            SetDict => "SET_DICT",
            SetDictUniq => "SET_DICT_UNIQ",
            Append => "APPEND",
            Index => "INDEX",
            SetIndex => "SET_INDEX",
            Slice => "SLICE",
            Unpack(_) => "UNPACK",
            Local(_) => "LOCAL",
            SetLocal(_) => "SET_LOCAL",
            LocalCell(_) => "LOCAL_CELL",
            SetLocalCell(_) => "SET_LOCAL_CELL",
            Free(_) => "FREE",
            Global(_) => "GLOBAL",
            SetGlobal(_) => "SET_GLOBAL",
            Predeclared(_) => "PREDECLARED",
            Universal(_) => "UNIVERSAL",
            Attr(_) => "ATTR",
            SetField(_) => "SET_FIELD",
            Jmp(_) => "JMP",
            JmpIfFalse(_) => "JMP_IF_FALSE",
            JmpIfTrue(_) => "JMP_IF_TRUE",
            IterPush => "ITER_PUSH",
            IterJmp(_) => "ITER_JMP",
            IterPop => "ITER_POP",
            Return => "RETURN",
            Call(..) => "CALL",
            CallVar(..) => "CALL_VAR",
            CallKw(..) => "CALL_KW",
            CallVarKw(..) => "CALL_VAR_KW",
            MakeFunc(_) => "MAKE_FUNC",
            Load(_) => "LOAD",
        }
    }

    /// The serialized opcode byte.
    pub fn opcode(&self) -> u8 {
        use Instruction::*;
        match self {
            Nop => 0x00,
            Dup => 0x01,
            Dup2 => 0x02,
            Pop => 0x03,
            Exch => 0x04,
            None => 0x08,
            True => 0x09,
            False => 0x0a,
            Instruction::Constant(_) => 0x0b,
            Plus => 0x10,
            Minus => 0x11,
            Star => 0x12,
            Slash => 0x13,
            SlashSlash => 0x14,
            Percent => 0x15,
            Amp => 0x16,
            Pipe => 0x17,
            Circumflex => 0x18,
            LtLt => 0x19,
            GtGt => 0x1a,
            In => 0x1b,
            NotIn => 0x1c,
            Eql => 0x1d,
            Neq => 0x1e,
            Lt => 0x1f,
            Gt => 0x20,
            Le => 0x21,
            Ge => 0x22,
            UPlus => 0x23,
            UMinus => 0x24,
            Tilde => 0x25,
            Not => 0x26,
            InplaceAdd => 0x27,
            InplacePipe => 0x28,
            MakeTuple(_) => 0x30,
            MakeList(_) => 0x31,
            MakeDict => 0x32,
            SetDict => 0x33,
            SetDictUniq => 0x34,
            Append => 0x35,
            Index => 0x36,
            SetIndex => 0x37,
            Slice => 0x38,
            Unpack(_) => 0x39,
            Local(_) => 0x40,
            SetLocal(_) => 0x41,
            LocalCell(_) => 0x42,
            SetLocalCell(_) => 0x43,
            Free(_) => 0x44,
            Global(_) => 0x45,
            SetGlobal(_) => 0x46,
            Predeclared(_) => 0x47,
            Universal(_) => 0x48,
            Attr(_) => 0x50,
            SetField(_) => 0x51,
            Jmp(_) => 0x60,
            JmpIfFalse(_) => 0x61,
            JmpIfTrue(_) => 0x62,
            IterPush => 0x63,
            IterJmp(_) => 0x64,
            IterPop => 0x65,
            Return => 0x66,
            Call(..) => 0x70,
            CallVar(..) => 0x71,
            CallKw(..) => 0x72,
            CallVarKw(..) => 0x73,
            MakeFunc(_) => 0x74,
            Load(_) => 0x75,
        }
    }

    /// Operands in serialization order.
    pub fn operands(&self) -> Vec<u32> {
        use Instruction::*;
        match *self {
            Instruction::Constant(a) | MakeTuple(a) | MakeList(a) | Unpack(a) | Local(a) | SetLocal(a)
            | LocalCell(a) | SetLocalCell(a) | Free(a) | Global(a) | SetGlobal(a)
            | Predeclared(a) | Universal(a) | Attr(a) | SetField(a) | Jmp(a) | JmpIfFalse(a)
            | JmpIfTrue(a) | IterJmp(a) | MakeFunc(a) | Load(a) => vec![a],
            Call(a, b) | CallVar(a, b) | CallKw(a, b) | CallVarKw(a, b) => vec![a, b],
            _ => Vec::new(),
        }
    }

    /// Rebuilds an instruction from its opcode byte, reading operands
    /// through `next`. `Ok(None)` for an unknown opcode.
    pub fn decode<E>(
        opcode: u8,
        mut next: impl FnMut() -> Result<u32, E>,
    ) -> Result<Option<Instruction>, E> {
        use Instruction::*;
        let inst = match opcode {
            0x00 => Nop,
            0x01 => Dup,
            0x02 => Dup2,
            0x03 => Pop,
            0x04 => Exch,
            0x08 => None,
            0x09 => True,
            0x0a => False,
            0x0b => Instruction::Constant(next()?),
            0x10 => Plus,
            0x11 => Minus,
            0x12 => Star,
            0x13 => Slash,
            0x14 => SlashSlash,
            0x15 => Percent,
            0x16 => Amp,
            0x17 => Pipe,
            0x18 => Circumflex,
            0x19 => LtLt,
            0x1a => GtGt,
            0x1b => In,
            0x1c => NotIn,
            0x1d => Eql,
            0x1e => Neq,
            0x1f => Lt,
            0x20 => Gt,
            0x21 => Le,
            0x22 => Ge,
            0x23 => UPlus,
            0x24 => UMinus,
            0x25 => Tilde,
            0x26 => Not,
            0x27 => InplaceAdd,
            0x28 => InplacePipe,
            0x30 => MakeTuple(next()?),
            0x31 => MakeList(next()?),
            0x32 => MakeDict,
            0x33 => SetDict,
            0x34 => SetDictUniq,
            0x35 => Append,
            0x36 => Index,
            0x37 => SetIndex,
            0x38 => Slice,
            0x39 => Unpack(next()?),
            0x40 => Local(next()?),
            0x41 => SetLocal(next()?),
            0x42 => LocalCell(next()?),
            0x43 => SetLocalCell(next()?),
            0x44 => Free(next()?),
            0x45 => Global(next()?),
            0x46 => SetGlobal(next()?),
            0x47 => Predeclared(next()?),
            0x48 => Universal(next()?),
            0x50 => Attr(next()?),
            0x51 => SetField(next()?),
            0x60 => Jmp(next()?),
            0x61 => JmpIfFalse(next()?),
            0x62 => JmpIfTrue(next()?),
            0x63 => IterPush,
            0x64 => IterJmp(next()?),
            0x65 => IterPop,
            0x66 => Return,
            0x70 => Call(next()?, next()?),
            0x71 => CallVar(next()?, next()?),
            0x72 => CallKw(next()?, next()?),
            0x73 => CallVarKw(next()?, next()?),
            0x74 => MakeFunc(next()?),
            0x75 => Load(next()?),
            _ => return Ok(Option::None),
        };
        Ok(Some(inst))
    }

    /// Jump target, for instructions that have one.
    pub fn jump_target(&self) -> Option<u32> {
        match *self {
            Instruction::Jmp(t)
            | Instruction::JmpIfFalse(t)
            | Instruction::JmpIfTrue(t)
            | Instruction::IterJmp(t) => Some(t),
            _ => Option::None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.mnemonic())?;
        for op in self.operands() {
            write!(f, " {}", op)?;
        }
        Ok(())
    }
}
