use std::{error::Error, fmt};

use miette::{miette, LabeledSpan, NamedSource, Report, Severity};

use crate::symbol::{Mnemonic, Span, MAX_PROGRAM_SIZE};

/// Error raised while lexing or assembling a source file.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AsmError {
    pub kind: AsmErrorKind,
    /// Offending token
    pub span: Span,
    /// 1-based source line
    pub line: u32,
}

impl AsmError {
    pub fn new(kind: AsmErrorKind, span: Span, line: u32) -> Self {
        AsmError { kind, span, line }
    }
}

/// Broad classes of assembler failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Category {
    Lex,
    Syntax,
    Range,
    UndefinedLabel,
    DuplicateLabel,
    Limit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AsmErrorKind {
    // Lexer
    UnexpectedCharacter(char),
    InvalidRegister(String),
    UnknownIdentifier(String),
    NumberTooLong { prefix: char, max_digits: usize },
    MalformedNumber { prefix: char },
    MissingLabelName,
    IdentifierTooLong,

    // Argument collection
    UnexpectedToken { found: String },
    ExpectedComma { found: String },
    TooManyArguments,

    // Encoding
    WrongArity {
        mnemonic: Mnemonic,
        expected: &'static str,
        found: usize,
    },
    InvalidOperand {
        mnemonic: Mnemonic,
        position: usize,
        expected: &'static str,
        found: &'static str,
    },
    LiteralOutOfRange { value: u32, max: u32 },
    UndefinedLabel(String),

    // Label pass
    DuplicateLabel(String),
    TooManyLabels(usize),
    ProgramTooLarge,
}

impl AsmErrorKind {
    pub fn category(&self) -> Category {
        use AsmErrorKind::*;
        match self {
            UnexpectedCharacter(_)
            | InvalidRegister(_)
            | UnknownIdentifier(_)
            | NumberTooLong { .. }
            | MalformedNumber { .. }
            | MissingLabelName
            | IdentifierTooLong => Category::Lex,
            UnexpectedToken { .. }
            | ExpectedComma { .. }
            | TooManyArguments
            | WrongArity { .. }
            | InvalidOperand { .. } => Category::Syntax,
            LiteralOutOfRange { .. } => Category::Range,
            UndefinedLabel(_) => Category::UndefinedLabel,
            DuplicateLabel(_) => Category::DuplicateLabel,
            TooManyLabels(_) | ProgramTooLarge => Category::Limit,
        }
    }

    fn code(&self) -> &'static str {
        use AsmErrorKind::*;
        match self {
            UnexpectedCharacter(_) => "lex::unknown",
            InvalidRegister(_) => "lex::register",
            UnknownIdentifier(_) => "lex::identifier",
            NumberTooLong { .. } | MalformedNumber { .. } => "lex::bad_lit",
            MissingLabelName | IdentifierTooLong => "lex::label",
            UnexpectedToken { .. } => "asm::unexpected_token",
            ExpectedComma { .. } => "asm::expected_comma",
            TooManyArguments => "asm::too_many_args",
            WrongArity { .. } => "asm::arity",
            InvalidOperand { .. } => "asm::operand",
            LiteralOutOfRange { .. } => "asm::range",
            UndefinedLabel(_) => "asm::undefined_label",
            DuplicateLabel(_) => "asm::duplicate_label",
            TooManyLabels(_) => "asm::too_many_labels",
            ProgramTooLarge => "asm::too_large",
        }
    }

    fn help(&self) -> &'static str {
        use AsmErrorKind::*;
        match self {
            UnexpectedCharacter(_) => {
                "numbers start with #, $ or %, labels with : and comments with ;"
            }
            InvalidRegister(_) => "registers are named R0 through RF",
            UnknownIdentifier(_) => "check the list of available instructions in the documentation",
            NumberTooLong { .. } => "decimal allows 5 digits, hexadecimal 4 and binary 16",
            MalformedNumber { .. } => "a number prefix must be followed by at least one digit",
            MissingLabelName | IdentifierTooLong => {
                "labels are a letter followed by up to 62 letters, digits or underscores"
            }
            UnexpectedToken { .. } => "lines should start with an instruction or a label",
            ExpectedComma { .. } => "separate operands with exactly one comma",
            TooManyArguments => "no instruction takes more than 8 operands",
            WrongArity { .. } | InvalidOperand { .. } => {
                "check the operands allowed for this instruction"
            }
            LiteralOutOfRange { .. } => "the literal does not fit the instruction field",
            UndefinedLabel(_) => "labels are defined with `:name` at the start of a line",
            DuplicateLabel(_) => "labels are only allowed once per file",
            TooManyLabels(_) => "split the program or raise the label limit",
            ProgramTooLarge => "the program must fit between 0x200 and 0xFFF",
        }
    }
}

impl Error for AsmError {}

impl fmt::Display for AsmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.kind)
    }
}

impl fmt::Display for AsmErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        use AsmErrorKind::*;
        match self {
            UnexpectedCharacter(c) => write!(f, "Unexpected character '{}'", c.escape_debug()),
            InvalidRegister(name) => write!(f, "Invalid register '{}'", name),
            UnknownIdentifier(name) => write!(f, "Unexpected identifier '{}'", name),
            NumberTooLong { prefix, max_digits } => write!(
                f,
                "Number literal after '{}' is longer than {} digits",
                prefix, max_digits
            ),
            MalformedNumber { prefix } => write!(f, "Expected digits after '{}'", prefix),
            MissingLabelName => write!(f, "Expected identifier after ':'"),
            IdentifierTooLong => write!(f, "Identifier is too long"),
            UnexpectedToken { found } => write!(f, "Unexpected '{}'", found),
            ExpectedComma { found } => write!(f, "Expected ',' but got '{}'", found),
            TooManyArguments => write!(f, "More than maximum (8) arguments"),
            WrongArity {
                mnemonic,
                expected,
                found,
            } => write!(
                f,
                "{} requires {} argument(s), got {}",
                mnemonic, expected, found
            ),
            InvalidOperand {
                mnemonic,
                position,
                expected,
                found,
            } => write!(
                f,
                "Argument {} to {} must be {}, found {}",
                position + 1,
                mnemonic,
                expected,
                found
            ),
            LiteralOutOfRange { value, max } => write!(
                f,
                "Number {} is out of range (maximum {}, or {:#X})",
                value, max, max
            ),
            UndefinedLabel(name) => write!(f, "Use of undefined label '{}'", name),
            DuplicateLabel(name) => write!(f, "Duplicate label '{}'", name),
            TooManyLabels(limit) => write!(f, "More than the maximum of {} labels", limit),
            ProgramTooLarge => write!(
                f,
                "Program is larger than the {} bytes available",
                MAX_PROGRAM_SIZE
            ),
        }
    }
}

/// Fatal condition raised by the interpreter. The machine halts on any of these.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RuntimeError {
    OutOfBounds { addr: usize },
    StackUnderflow,
    StackOverflow,
    InvalidOpcode { opcode: u16, addr: u16 },
    RomTooLarge { len: usize },
}

impl Error for RuntimeError {}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfBounds { addr } => {
                write!(f, "Out-of-bounds memory access at {:#05X}", addr)
            }
            Self::StackUnderflow => write!(f, "Stack underflow"),
            Self::StackOverflow => write!(f, "Stack overflow"),
            Self::InvalidOpcode { opcode, addr } => {
                write!(f, "Invalid instruction {:04X} at {:#05X}", opcode, addr)
            }
            Self::RomTooLarge { len } => write!(
                f,
                "Loaded ROM is too big ({} bytes, maximum {})",
                len, MAX_PROGRAM_SIZE
            ),
        }
    }
}

/// Build a labelled diagnostic pointing into the assembled source.
pub fn report(err: &AsmError, name: &str, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = err.kind.code(),
        help = err.kind.help(),
        labels = vec![LabeledSpan::at(err.span, label_for(err.kind.category()))],
        "{}",
        err.kind
    )
    .with_source_code(NamedSource::new(name, src.to_string()))
}

fn label_for(category: Category) -> &'static str {
    match category {
        Category::Lex => "unknown token",
        Category::Syntax => "unexpected token",
        Category::Range => "out-of-range literal",
        Category::UndefinedLabel => "undefined label",
        Category::DuplicateLabel => "duplicate label",
        Category::Limit => "limit reached here",
    }
}

pub fn runtime_report(err: RuntimeError) -> Report {
    let (code, help) = match err {
        RuntimeError::OutOfBounds { .. } => (
            "runtime::out_of_bounds",
            "memory ends at 0xFFF; check I and jump targets",
        ),
        RuntimeError::StackUnderflow => (
            "runtime::stack_underflow",
            "RETURN was executed outside of a subroutine",
        ),
        RuntimeError::StackOverflow => (
            "runtime::stack_overflow",
            "subroutines may only nest 16 deep",
        ),
        RuntimeError::InvalidOpcode { .. } => (
            "runtime::invalid_opcode",
            "execution may have run into data; end programs with BREAK",
        ),
        RuntimeError::RomTooLarge { .. } => (
            "runtime::rom_size",
            "the program must fit between 0x200 and 0xFFF",
        ),
    };
    miette!(severity = Severity::Error, code = code, help = help, "{}", err)
}
