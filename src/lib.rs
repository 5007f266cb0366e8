// Assembling
mod air;
pub use air::{AirStmt, Arg, Argument, Emit};
mod parser;
pub use parser::{assemble, AssemblerContext, Assembly, DEFAULT_LABEL_LIMIT, MAX_ARGS};
pub mod lexer;
pub mod symbol;
pub use symbol::{Mnemonic, Register, SymbolTable};

// Running
mod runtime;
pub use runtime::{Display, RunState, Status, SCREEN_HEIGHT, SCREEN_WIDTH, STACK_SIZE};
mod quirks;
pub use quirks::Quirks;

pub mod error;
pub use error::{AsmError, AsmErrorKind, Category, RuntimeError};
pub mod output;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 4;
