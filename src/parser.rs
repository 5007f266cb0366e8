use crate::{
    air::{AirStmt, Arg, Argument},
    error::{AsmError, AsmErrorKind},
    lexer::{tokenize, Token, TokenKind},
    symbol::{Mnemonic, Span, SymbolTable, LOAD_ADDR, MEMORY_SIZE},
};

/// Most operands a single statement may carry.
pub const MAX_ARGS: usize = 8;

/// Default ceiling on the number of labels in one program.
pub const DEFAULT_LABEL_LIMIT: usize = 1024;

/// Result of a successful assembly.
#[derive(Debug)]
pub struct Assembly {
    /// Byte `i` is loaded at address `0x200 + i`
    pub image: Vec<u8>,
    pub symbols: SymbolTable,
}

/// State for assembling one token stream. Both passes stop at the first error.
pub struct AssemblerContext<'t> {
    toks: &'t [Token],
    /// Index of the next token
    pos: usize,
    /// Address of the next emitted byte
    addr: usize,
    symbols: SymbolTable,
    image: Vec<u8>,
    label_limit: Option<usize>,
}

/// Assemble source text into a binary image.
pub fn assemble(src: &str) -> Result<Assembly, AsmError> {
    let toks = tokenize(src)?;
    let mut ctx = AssemblerContext::new(&toks);
    ctx.assemble()?;
    Ok(ctx.finish())
}

impl<'t> AssemblerContext<'t> {
    /// Takes a token stream terminated by `Eof`.
    pub fn new(toks: &'t [Token]) -> Self {
        AssemblerContext {
            toks,
            pos: 0,
            addr: LOAD_ADDR as usize,
            symbols: SymbolTable::new(),
            image: Vec::new(),
            label_limit: Some(DEFAULT_LABEL_LIMIT),
        }
    }

    /// `None` removes the ceiling.
    pub fn with_label_limit(mut self, limit: Option<usize>) -> Self {
        self.label_limit = limit;
        self
    }

    /// Run the label pass and then the encoding pass.
    pub fn assemble(&mut self) -> Result<(), AsmError> {
        self.resolve_labels()?;
        self.encode()
    }

    /// Image emitted so far. Only complete after `assemble` succeeds.
    pub fn image(&self) -> &[u8] {
        &self.image
    }

    pub fn symbols(&self) -> &SymbolTable {
        &self.symbols
    }

    pub fn finish(self) -> Assembly {
        Assembly {
            image: self.image,
            symbols: self.symbols,
        }
    }

    /// Pass 1: record every label definition at the address it will be emitted at.
    pub fn resolve_labels(&mut self) -> Result<(), AsmError> {
        self.pos = 0;
        self.addr = LOAD_ADDR as usize;
        self.symbols = SymbolTable::new();
        let toks = self.toks;
        loop {
            let Some(tok) = toks.get(self.pos) else {
                break;
            };
            self.pos += 1;
            match &tok.kind {
                TokenKind::Eof => break,
                TokenKind::Newline => continue,
                TokenKind::Label(name) => {
                    if let Some(limit) = self.label_limit {
                        if self.symbols.len() >= limit {
                            return Err(error(AsmErrorKind::TooManyLabels(limit), tok));
                        }
                    }
                    // Addresses past the end are caught as ProgramTooLarge below
                    let addr = self.addr.min(u16::MAX as usize) as u16;
                    if self.symbols.insert(name, addr).is_err() {
                        return Err(error(AsmErrorKind::DuplicateLabel(name.clone()), tok));
                    }
                }
                TokenKind::Mnemonic(Mnemonic::Data) => {
                    self.addr += self.collect_args()?.len();
                }
                TokenKind::Mnemonic(_) => {
                    self.collect_args()?;
                    self.addr += 2;
                }
                _ => return Err(unexpected(tok)),
            }
            if self.addr > MEMORY_SIZE {
                return Err(error(AsmErrorKind::ProgramTooLarge, tok));
            }
        }
        Ok(())
    }

    /// Pass 2: encode every statement, resolving labels through the symbol table.
    pub fn encode(&mut self) -> Result<(), AsmError> {
        self.pos = 0;
        self.image.clear();
        let toks = self.toks;
        loop {
            let Some(tok) = toks.get(self.pos) else {
                break;
            };
            self.pos += 1;
            match &tok.kind {
                TokenKind::Eof => break,
                TokenKind::Newline | TokenKind::Label(_) => continue,
                TokenKind::Mnemonic(mnemonic) => {
                    let stmt = AirStmt {
                        mnemonic: *mnemonic,
                        args: self.collect_args()?,
                        span: tok.span,
                        line: tok.line,
                    };
                    stmt.emit(&self.symbols)?.write_to(&mut self.image);
                }
                _ => return Err(unexpected(tok)),
            }
        }
        Ok(())
    }

    /// Consume comma-separated operands up to the end of the line.
    /// The line break itself is left for the caller.
    fn collect_args(&mut self) -> Result<Vec<Arg>, AsmError> {
        let toks = self.toks;
        let mut args = Vec::new();
        loop {
            let tok = self.peek(toks);
            if matches!(tok.kind, TokenKind::Newline | TokenKind::Eof) {
                break;
            }
            let value = match &tok.kind {
                TokenKind::Register(reg) => Argument::Register(*reg),
                TokenKind::IndexRegister => Argument::IndexRegister,
                TokenKind::Number(val) => Argument::Literal(*val),
                TokenKind::Label(name) => Argument::Label(name.clone()),
                TokenKind::Timer => Argument::Timer,
                TokenKind::Sound => Argument::Sound,
                // Leading or doubled comma
                TokenKind::Comma => {
                    return Err(error(AsmErrorKind::ExpectedComma { found: ",".into() }, tok))
                }
                _ => return Err(unexpected(tok)),
            };
            if args.len() >= MAX_ARGS {
                return Err(error(AsmErrorKind::TooManyArguments, tok));
            }
            args.push(Arg {
                value,
                span: tok.span,
            });
            self.pos += 1;

            let sep = self.peek(toks);
            match sep.kind {
                TokenKind::Comma => {
                    self.pos += 1;
                    // Trailing comma
                    let next = self.peek(toks);
                    if matches!(next.kind, TokenKind::Newline | TokenKind::Eof) {
                        return Err(error(
                            AsmErrorKind::ExpectedComma {
                                found: next.kind.to_string(),
                            },
                            next,
                        ));
                    }
                }
                TokenKind::Newline | TokenKind::Eof => break,
                _ => {
                    return Err(error(
                        AsmErrorKind::ExpectedComma {
                            found: sep.kind.to_string(),
                        },
                        sep,
                    ))
                }
            }
        }
        Ok(args)
    }

    /// Token at the cursor. Streams missing their `Eof` read as ending on the last token.
    fn peek(&self, toks: &'t [Token]) -> &'t Token {
        toks.get(self.pos)
            .or_else(|| toks.last())
            .unwrap_or(&EOF)
    }
}

static EOF: Token = Token {
    kind: TokenKind::Eof,
    span: Span::dummy(),
    line: 0,
};

fn error(kind: AsmErrorKind, tok: &Token) -> AsmError {
    AsmError::new(kind, tok.span, tok.line)
}

fn unexpected(tok: &Token) -> AsmError {
    error(
        AsmErrorKind::UnexpectedToken {
            found: tok.kind.to_string(),
        },
        tok,
    )
}
