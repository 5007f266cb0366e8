use crate::{
    error::{AsmError, AsmErrorKind},
    symbol::{Mnemonic, Register, Span, SymbolTable},
};

/// Largest value of a 12-bit address field.
const ADDR_MAX: u32 = 0xFFF;
/// Largest value of an 8-bit immediate field.
const BYTE_MAX: u32 = 0xFF;
/// Largest value of the 4-bit sprite height field.
const NIBBLE_MAX: u32 = 0xF;

/// Operand of a single statement, classified from its token.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Argument {
    Register(Register),
    IndexRegister,
    Literal(u32),
    Label(String),
    Timer,
    Sound,
}

impl Argument {
    fn describe(&self) -> &'static str {
        match self {
            Argument::Register(_) => "a register",
            Argument::IndexRegister => "the index register",
            Argument::Literal(_) => "a number",
            Argument::Label(_) => "a label",
            Argument::Timer => "TIMER",
            Argument::Sound => "SOUND",
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Arg {
    pub value: Argument,
    pub span: Span,
}

/// One instruction or pseudo-op with its collected operands.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AirStmt {
    pub mnemonic: Mnemonic,
    pub args: Vec<Arg>,
    /// Span of the mnemonic
    pub span: Span,
    pub line: u32,
}

/// Output of encoding a single statement.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Emit {
    /// Big-endian 2-byte opcode
    Word(u16),
    /// `DATA` bytes, emitted verbatim
    Data(Vec<u8>),
}

impl Emit {
    pub fn len(&self) -> usize {
        match self {
            Emit::Word(_) => 2,
            Emit::Data(bytes) => bytes.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn write_to(&self, image: &mut Vec<u8>) {
        match self {
            Emit::Word(word) => image.extend_from_slice(&word.to_be_bytes()),
            Emit::Data(bytes) => image.extend_from_slice(bytes),
        }
    }
}

impl AirStmt {
    /// Validate operands and produce the final encoding, resolving labels.
    pub fn emit(&self, symbols: &SymbolTable) -> Result<Emit, AsmError> {
        use Mnemonic::*;
        let enc = Encoder {
            stmt: self,
            symbols,
        };
        let word = match self.mnemonic {
            Break => enc.no_args(0x0000)?,
            Clear => enc.no_args(0x00E0)?,
            Return => enc.no_args(0x00EE)?,
            Jump => match self.args.len() {
                1 => 0x1000 | enc.addr(0)?,
                2 => {
                    let addr = enc.addr(0)?;
                    match &self.args[1].value {
                        Argument::Register(reg) if reg.index() == 0 => 0xB000 | addr,
                        _ => return Err(enc.invalid(1, "R0")),
                    }
                }
                found => return Err(enc.arity_err("1 or 2", found)),
            },
            Subroutine => {
                enc.arity(1)?;
                0x2000 | enc.addr(0)?
            }
            // Skips when equal, so the next line runs only when they differ
            IfNeq => enc.compare(0x5000, 0x3000)?,
            IfEq => enc.compare(0x9000, 0x4000)?,
            Pixel => enc.reg_reg(0x5001)?,
            Set => enc.set()?,
            Add => enc.add()?,
            Or => enc.reg_reg(0x8001)?,
            And => enc.reg_reg(0x8002)?,
            Xor => enc.reg_reg(0x8003)?,
            Sub => enc.reg_reg(0x8005)?,
            RevSub => enc.reg_reg(0x8007)?,
            RShift => enc.reg_only(0x8006)?,
            LShift => enc.reg_only(0x800E)?,
            Random => {
                enc.arity(2)?;
                0xC000 | enc.x(0)? | enc.literal(1, BYTE_MAX)?
            }
            Draw => {
                enc.arity(3)?;
                0xD000 | enc.x(0)? | enc.y(1)? | enc.literal(2, NIBBLE_MAX)?
            }
            IfNKey => enc.reg_only(0xE09E)?,
            IfKey => enc.reg_only(0xE0A1)?,
            Await => enc.reg_only(0xF00A)?,
            SetSprite => enc.reg_only(0xF029)?,
            Bcd => enc.reg_only(0xF033)?,
            Dump => enc.reg_only(0xF055)?,
            Fill => enc.reg_only(0xF065)?,
            Data => return enc.data(),
        };
        Ok(Emit::Word(word))
    }
}

/// Operand checks shared by the per-mnemonic rules.
struct Encoder<'a> {
    stmt: &'a AirStmt,
    symbols: &'a SymbolTable,
}

impl Encoder<'_> {
    fn err_at(&self, kind: AsmErrorKind, pos: usize) -> AsmError {
        let span = self
            .stmt
            .args
            .get(pos)
            .map_or(self.stmt.span, |arg| arg.span);
        AsmError::new(kind, span, self.stmt.line)
    }

    fn invalid(&self, pos: usize, expected: &'static str) -> AsmError {
        self.err_at(
            AsmErrorKind::InvalidOperand {
                mnemonic: self.stmt.mnemonic,
                position: pos,
                expected,
                found: self.stmt.args[pos].value.describe(),
            },
            pos,
        )
    }

    fn arity_err(&self, expected: &'static str, found: usize) -> AsmError {
        AsmError::new(
            AsmErrorKind::WrongArity {
                mnemonic: self.stmt.mnemonic,
                expected,
                found,
            },
            self.stmt.span,
            self.stmt.line,
        )
    }

    fn arity(&self, count: usize) -> Result<(), AsmError> {
        const COUNTS: [&str; 4] = ["0", "1", "2", "3"];
        if self.stmt.args.len() == count {
            Ok(())
        } else {
            Err(self.arity_err(COUNTS[count], self.stmt.args.len()))
        }
    }

    fn arg(&self, pos: usize) -> &Argument {
        &self.stmt.args[pos].value
    }

    fn reg(&self, pos: usize) -> Result<u16, AsmError> {
        match self.arg(pos) {
            Argument::Register(reg) => Ok(reg.index() as u16),
            _ => Err(self.invalid(pos, "a register")),
        }
    }

    /// Register placed in the X nibble
    fn x(&self, pos: usize) -> Result<u16, AsmError> {
        Ok(self.reg(pos)? << 8)
    }

    /// Register placed in the Y nibble
    fn y(&self, pos: usize) -> Result<u16, AsmError> {
        Ok(self.reg(pos)? << 4)
    }

    fn literal(&self, pos: usize, max: u32) -> Result<u16, AsmError> {
        match *self.arg(pos) {
            Argument::Literal(value) if value <= max => Ok(value as u16),
            Argument::Literal(value) => {
                Err(self.err_at(AsmErrorKind::LiteralOutOfRange { value, max }, pos))
            }
            _ => Err(self.invalid(pos, "a number")),
        }
    }

    /// 12-bit address from a literal or a resolved label.
    fn addr(&self, pos: usize) -> Result<u16, AsmError> {
        match self.arg(pos) {
            Argument::Label(name) => match self.symbols.get(name) {
                Some(addr) if addr as u32 <= ADDR_MAX => Ok(addr),
                Some(addr) => Err(self.err_at(
                    AsmErrorKind::LiteralOutOfRange {
                        value: addr as u32,
                        max: ADDR_MAX,
                    },
                    pos,
                )),
                None => Err(self.err_at(AsmErrorKind::UndefinedLabel(name.clone()), pos)),
            },
            Argument::Literal(_) => self.literal(pos, ADDR_MAX),
            _ => Err(self.invalid(pos, "an address or a label")),
        }
    }

    fn no_args(&self, word: u16) -> Result<u16, AsmError> {
        self.arity(0)?;
        Ok(word)
    }

    fn reg_only(&self, base: u16) -> Result<u16, AsmError> {
        self.arity(1)?;
        Ok(base | self.x(0)?)
    }

    fn reg_reg(&self, base: u16) -> Result<u16, AsmError> {
        self.arity(2)?;
        Ok(base | self.x(0)? | self.y(1)?)
    }

    /// `Rx, Ry` or `Rx, NN` comparison.
    fn compare(&self, with_reg: u16, with_byte: u16) -> Result<u16, AsmError> {
        self.arity(2)?;
        let x = self.x(0)?;
        match self.arg(1) {
            Argument::Register(_) => Ok(with_reg | x | self.y(1)?),
            Argument::Literal(_) => Ok(with_byte | x | self.literal(1, BYTE_MAX)?),
            _ => Err(self.invalid(1, "a register or a number")),
        }
    }

    fn set(&self) -> Result<u16, AsmError> {
        self.arity(2)?;
        match (self.arg(0), self.arg(1)) {
            (Argument::Register(_), Argument::Literal(_)) => {
                Ok(0x6000 | self.x(0)? | self.literal(1, BYTE_MAX)?)
            }
            (Argument::Register(_), Argument::Register(_)) => Ok(0x8000 | self.x(0)? | self.y(1)?),
            (Argument::Register(_), Argument::Timer) => Ok(0xF007 | self.x(0)?),
            (Argument::Register(_), _) => Err(self.invalid(1, "a number, a register or TIMER")),
            (Argument::IndexRegister, _) => Ok(0xA000 | self.addr(1)?),
            (Argument::Timer, Argument::Register(_)) => Ok(0xF015 | self.x(1)?),
            (Argument::Sound, Argument::Register(_)) => Ok(0xF018 | self.x(1)?),
            (Argument::Timer | Argument::Sound, _) => Err(self.invalid(1, "a register")),
            _ => Err(self.invalid(0, "a register, I, TIMER or SOUND")),
        }
    }

    fn add(&self) -> Result<u16, AsmError> {
        self.arity(2)?;
        match (self.arg(0), self.arg(1)) {
            (Argument::Register(_), Argument::Register(_)) => Ok(0x8004 | self.x(0)? | self.y(1)?),
            (Argument::Register(_), Argument::Literal(_)) => {
                Ok(0x7000 | self.x(0)? | self.literal(1, BYTE_MAX)?)
            }
            (Argument::Register(_), _) => Err(self.invalid(1, "a register or a number")),
            (Argument::IndexRegister, Argument::Register(_)) => Ok(0xF01E | self.x(1)?),
            (Argument::IndexRegister, _) => Err(self.invalid(1, "a register")),
            _ => Err(self.invalid(0, "a register or I")),
        }
    }

    fn data(&self) -> Result<Emit, AsmError> {
        if self.stmt.args.is_empty() {
            return Err(self.arity_err("at least 1", 0));
        }
        let bytes = (0..self.stmt.args.len())
            .map(|pos| self.literal(pos, BYTE_MAX).map(|byte| byte as u8))
            .collect::<Result<Vec<u8>, AsmError>>()?;
        Ok(Emit::Data(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Category;

    fn stmt(mnemonic: Mnemonic, args: Vec<Argument>) -> AirStmt {
        AirStmt {
            mnemonic,
            args: args
                .into_iter()
                .map(|value| Arg {
                    value,
                    span: Span::dummy(),
                })
                .collect(),
            span: Span::dummy(),
            line: 1,
        }
    }

    fn r(n: u8) -> Argument {
        Argument::Register(Register::new(n).unwrap())
    }

    fn lit(n: u32) -> Argument {
        Argument::Literal(n)
    }

    fn word(mnemonic: Mnemonic, args: Vec<Argument>) -> u16 {
        let mut symbols = SymbolTable::new();
        symbols.insert("target", 0x234).unwrap();
        match stmt(mnemonic, args).emit(&symbols).unwrap() {
            Emit::Word(word) => word,
            Emit::Data(_) => panic!("expected an instruction word"),
        }
    }

    fn fails(mnemonic: Mnemonic, args: Vec<Argument>) -> AsmErrorKind {
        stmt(mnemonic, args)
            .emit(&SymbolTable::new())
            .unwrap_err()
            .kind
    }

    #[test]
    fn encode_table() {
        use Mnemonic::*;
        let label = || Argument::Label("target".into());
        #[rustfmt::skip]
        let cases = [
            (word(Break, vec![]), 0x0000),
            (word(Clear, vec![]), 0x00E0),
            (word(Return, vec![]), 0x00EE),
            (word(Jump, vec![lit(0x345)]), 0x1345),
            (word(Jump, vec![label()]), 0x1234),
            (word(Jump, vec![lit(0x300), r(0)]), 0xB300),
            (word(Subroutine, vec![label()]), 0x2234),
            (word(IfNeq, vec![r(1), lit(0x42)]), 0x3142),
            (word(IfEq, vec![r(2), lit(7)]), 0x4207),
            (word(IfNeq, vec![r(3), r(4)]), 0x5340),
            (word(Pixel, vec![r(5), r(6)]), 0x5561),
            (word(Set, vec![r(7), lit(255)]), 0x67FF),
            (word(Add, vec![r(8), lit(1)]), 0x7801),
            (word(Set, vec![r(9), r(0xA)]), 0x89A0),
            (word(Or, vec![r(1), r(2)]), 0x8121),
            (word(And, vec![r(1), r(2)]), 0x8122),
            (word(Xor, vec![r(1), r(2)]), 0x8123),
            (word(Add, vec![r(1), r(2)]), 0x8124),
            (word(Sub, vec![r(1), r(2)]), 0x8125),
            (word(RShift, vec![r(3)]), 0x8306),
            (word(RevSub, vec![r(1), r(2)]), 0x8127),
            (word(LShift, vec![r(3)]), 0x830E),
            (word(IfEq, vec![r(0xB), r(0xC)]), 0x9BC0),
            (word(Set, vec![Argument::IndexRegister, lit(0xFFF)]), 0xAFFF),
            (word(Set, vec![Argument::IndexRegister, label()]), 0xA234),
            (word(Random, vec![r(0xD), lit(0x0F)]), 0xCD0F),
            (word(Draw, vec![r(1), r(2), lit(15)]), 0xD12F),
            (word(IfNKey, vec![r(4)]), 0xE49E),
            (word(IfKey, vec![r(4)]), 0xE4A1),
            (word(Set, vec![r(5), Argument::Timer]), 0xF507),
            (word(Await, vec![r(6)]), 0xF60A),
            (word(Set, vec![Argument::Timer, r(7)]), 0xF715),
            (word(Set, vec![Argument::Sound, r(8)]), 0xF818),
            (word(Add, vec![Argument::IndexRegister, r(9)]), 0xF91E),
            (word(SetSprite, vec![r(0xA)]), 0xFA29),
            (word(Bcd, vec![r(0xB)]), 0xFB33),
            (word(Dump, vec![r(0xC)]), 0xFC55),
            (word(Fill, vec![r(0xD)]), 0xFD65),
        ];
        for (i, (actual, expected)) in cases.into_iter().enumerate() {
            assert_eq!(actual, expected, "case {i}: {actual:04X} != {expected:04X}");
        }
    }

    #[test]
    fn encode_data() {
        let emit = stmt(Mnemonic::Data, vec![lit(1), lit(2), lit(255)])
            .emit(&SymbolTable::new())
            .unwrap();
        assert_eq!(emit, Emit::Data(vec![1, 2, 255]));
        assert_eq!(emit.len(), 3);
        assert!(matches!(
            fails(Mnemonic::Data, vec![]),
            AsmErrorKind::WrongArity { found: 0, .. }
        ));
        assert_eq!(
            fails(Mnemonic::Data, vec![lit(1), lit(256)]),
            AsmErrorKind::LiteralOutOfRange { value: 256, max: 255 }
        );
        assert!(matches!(
            fails(Mnemonic::Data, vec![r(0)]),
            AsmErrorKind::InvalidOperand { position: 0, .. }
        ));
    }

    #[test]
    fn encode_arity() {
        assert_eq!(
            fails(Mnemonic::Clear, vec![r(0)]),
            AsmErrorKind::WrongArity {
                mnemonic: Mnemonic::Clear,
                expected: "0",
                found: 1
            }
        );
        assert!(matches!(
            fails(Mnemonic::Jump, vec![]),
            AsmErrorKind::WrongArity { expected: "1 or 2", .. }
        ));
        assert!(matches!(
            fails(Mnemonic::Draw, vec![r(0), r(1)]),
            AsmErrorKind::WrongArity { found: 2, .. }
        ));
    }

    #[test]
    fn encode_operand_kinds() {
        assert!(matches!(
            fails(Mnemonic::Or, vec![lit(1), r(2)]),
            AsmErrorKind::InvalidOperand { position: 0, .. }
        ));
        assert!(matches!(
            fails(Mnemonic::Set, vec![lit(1), r(2)]),
            AsmErrorKind::InvalidOperand { position: 0, .. }
        ));
        assert!(matches!(
            fails(Mnemonic::Set, vec![Argument::IndexRegister, r(2)]),
            AsmErrorKind::InvalidOperand { position: 1, .. }
        ));
        assert!(matches!(
            fails(Mnemonic::Set, vec![Argument::Sound, lit(3)]),
            AsmErrorKind::InvalidOperand { position: 1, .. }
        ));
        assert!(matches!(
            fails(Mnemonic::Add, vec![Argument::IndexRegister, lit(3)]),
            AsmErrorKind::InvalidOperand { position: 1, .. }
        ));
        // Only R0 may offset a jump
        assert!(matches!(
            fails(Mnemonic::Jump, vec![lit(0x300), r(1)]),
            AsmErrorKind::InvalidOperand {
                position: 1,
                expected: "R0",
                ..
            }
        ));
        let kind = fails(Mnemonic::Random, vec![r(0), r(1)]);
        assert_eq!(kind.category(), Category::Syntax);
    }

    #[test]
    fn encode_ranges() {
        assert_eq!(
            fails(Mnemonic::Set, vec![r(0), lit(256)]),
            AsmErrorKind::LiteralOutOfRange { value: 256, max: 255 }
        );
        assert_eq!(
            fails(Mnemonic::Jump, vec![lit(0x1000)]),
            AsmErrorKind::LiteralOutOfRange {
                value: 0x1000,
                max: 0xFFF
            }
        );
        assert_eq!(
            fails(Mnemonic::Draw, vec![r(0), r(1), lit(16)]),
            AsmErrorKind::LiteralOutOfRange { value: 16, max: 15 }
        );
        assert_eq!(
            fails(Mnemonic::IfEq, vec![r(0), lit(300)]).category(),
            Category::Range
        );
    }

    #[test]
    fn encode_undefined_label() {
        assert_eq!(
            fails(Mnemonic::Subroutine, vec![Argument::Label("nowhere".into())]),
            AsmErrorKind::UndefinedLabel("nowhere".into())
        );
    }
}
