use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

// Label name -> resolved address, kept in definition order
type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Address that assembled programs are loaded at.
pub const LOAD_ADDR: u16 = 0x200;

/// Size of the addressable memory.
pub const MEMORY_SIZE: usize = 0x1000;

/// Largest image that fits between the load address and the end of memory.
pub const MAX_PROGRAM_SIZE: usize = MEMORY_SIZE - LOAD_ADDR as usize;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Debug, Default)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub const fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug, Default)]
pub struct SrcOffset(pub usize);

/// One of the sixteen general purpose 8-bit registers.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct Register(u8);

impl Register {
    /// Carry, borrow and collision flag by convention.
    pub const VF: Register = Register(0xF);

    pub fn new(index: u8) -> Option<Self> {
        (index < 16).then_some(Register(index))
    }

    /// Register named by the low four bits of `nibble`.
    pub fn from_nibble(nibble: u8) -> Self {
        Register(nibble & 0x0F)
    }

    pub fn index(self) -> u8 {
        self.0
    }
}

impl FromStr for Register {
    type Err = ();

    /// Parses the digit following `R`, eg. `"a"` for `RA`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => c
                .to_digit(16)
                .and_then(|d| Register::new(d as u8))
                .ok_or(()),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "R{:X}", self.0)
    }
}

/// Every instruction and pseudo-op the assembler understands.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Mnemonic {
    /// Non-standard: stops the interpreter.
    Break,
    Clear,
    Return,
    Jump,
    Subroutine,
    /// Execute the next instruction only if the operands differ.
    IfNeq,
    /// Execute the next instruction only if the operands are equal.
    IfEq,
    Set,
    Add,
    Or,
    And,
    Xor,
    Sub,
    RShift,
    RevSub,
    LShift,
    Random,
    Draw,
    /// Non-standard: toggles a single pixel.
    Pixel,
    IfNKey,
    IfKey,
    Await,
    SetSprite,
    Bcd,
    Dump,
    Fill,
    Data,
}

impl Mnemonic {
    pub const ALL: [Mnemonic; 27] = [
        Mnemonic::Break,
        Mnemonic::Clear,
        Mnemonic::Return,
        Mnemonic::Jump,
        Mnemonic::Subroutine,
        Mnemonic::IfNeq,
        Mnemonic::IfEq,
        Mnemonic::Set,
        Mnemonic::Add,
        Mnemonic::Or,
        Mnemonic::And,
        Mnemonic::Xor,
        Mnemonic::Sub,
        Mnemonic::RShift,
        Mnemonic::RevSub,
        Mnemonic::LShift,
        Mnemonic::Random,
        Mnemonic::Draw,
        Mnemonic::Pixel,
        Mnemonic::IfNKey,
        Mnemonic::IfKey,
        Mnemonic::Await,
        Mnemonic::SetSprite,
        Mnemonic::Bcd,
        Mnemonic::Dump,
        Mnemonic::Fill,
        Mnemonic::Data,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Mnemonic::Break => "BREAK",
            Mnemonic::Clear => "CLEAR",
            Mnemonic::Return => "RETURN",
            Mnemonic::Jump => "JUMP",
            Mnemonic::Subroutine => "SUBROUTINE",
            Mnemonic::IfNeq => "IFNEQ",
            Mnemonic::IfEq => "IFEQ",
            Mnemonic::Set => "SET",
            Mnemonic::Add => "ADD",
            Mnemonic::Or => "OR",
            Mnemonic::And => "AND",
            Mnemonic::Xor => "XOR",
            Mnemonic::Sub => "SUB",
            Mnemonic::RShift => "RSHIFT",
            Mnemonic::RevSub => "REVSUB",
            Mnemonic::LShift => "LSHIFT",
            Mnemonic::Random => "RANDOM",
            Mnemonic::Draw => "DRAW",
            Mnemonic::Pixel => "PIXEL",
            Mnemonic::IfNKey => "IFNKEY",
            Mnemonic::IfKey => "IFKEY",
            Mnemonic::Await => "AWAIT",
            Mnemonic::SetSprite => "SETSPRITE",
            Mnemonic::Bcd => "BCD",
            Mnemonic::Dump => "DUMP",
            Mnemonic::Fill => "FILL",
            Mnemonic::Data => "DATA",
        }
    }
}

impl FromStr for Mnemonic {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Mnemonic::ALL
            .into_iter()
            .find(|m| m.name().eq_ignore_ascii_case(s))
            .ok_or(())
    }
}

impl fmt::Display for Mnemonic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Flat table of label name -> address, filled by the label pass.
#[derive(Debug, Default)]
pub struct SymbolTable {
    labels: FxMap<String, u16>,
}

/// Returned when inserting a name that is already defined.
#[derive(Debug, PartialEq, Eq)]
pub struct Duplicate;

impl SymbolTable {
    pub fn new() -> Self {
        SymbolTable {
            labels: IndexMap::with_hasher(FxBuildHasher::default()),
        }
    }

    /// Record a label definition. Definitions are never overwritten.
    pub fn insert(&mut self, name: &str, addr: u16) -> Result<(), Duplicate> {
        if self.labels.contains_key(name) {
            return Err(Duplicate);
        }
        self.labels.insert(name.to_string(), addr);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<u16> {
        self.labels.get(name).copied()
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Labels in the order they were defined.
    pub fn iter(&self) -> impl Iterator<Item = (&str, u16)> + '_ {
        self.labels.iter().map(|(name, addr)| (name.as_str(), *addr))
    }
}
