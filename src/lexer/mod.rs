use std::fmt;

use crate::error::{AsmError, AsmErrorKind};
use crate::lexer::cursor::Cursor;
use crate::symbol::{Mnemonic, Register, Span, SrcOffset};

pub mod cursor;

const DEC_MAX_DIGITS: usize = 5;
const HEX_MAX_DIGITS: usize = 4;
const BIN_MAX_DIGITS: usize = 16;
const IDENT_MAX_LEN: usize = 63;

/// Single token with its location in the source.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
    pub line: u32,
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum TokenKind {
    Register(Register),
    /// `I`
    IndexRegister,
    /// `TIMER`, the delay timer
    Timer,
    /// `SOUND`
    Sound,
    Number(u32),
    /// Label name without the leading ':'
    Label(String),
    Mnemonic(Mnemonic),
    Comma,
    Newline,
    Eof,
}

impl TokenKind {
    /// Short description for diagnostics.
    pub fn describe(&self) -> &'static str {
        match self {
            TokenKind::Register(_) => "a register",
            TokenKind::IndexRegister => "the index register",
            TokenKind::Timer => "the delay timer",
            TokenKind::Sound => "the sound timer",
            TokenKind::Number(_) => "a number",
            TokenKind::Label(_) => "a label",
            TokenKind::Mnemonic(_) => "an instruction",
            TokenKind::Comma => "a comma",
            TokenKind::Newline => "a line break",
            TokenKind::Eof => "end of file",
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TokenKind::Register(reg) => write!(f, "{}", reg),
            TokenKind::IndexRegister => f.write_str("I"),
            TokenKind::Timer => f.write_str("TIMER"),
            TokenKind::Sound => f.write_str("SOUND"),
            TokenKind::Number(val) => write!(f, "#{}", val),
            TokenKind::Label(name) => write!(f, ":{}", name),
            TokenKind::Mnemonic(m) => write!(f, "{}", m),
            TokenKind::Comma => f.write_str(","),
            TokenKind::Newline => f.write_str("\\n"),
            TokenKind::Eof => f.write_str("EOF"),
        }
    }
}

/// Turn source text into a token stream terminated by `Eof`.
/// Stops at the first malformed token.
pub fn tokenize(src: &str) -> Result<Vec<Token>, AsmError> {
    let mut cursor = Cursor::new(src);
    let mut toks: Vec<Token> = Vec::new();
    loop {
        let tok = cursor.advance_token()?;
        match tok.kind {
            // Collapse blank lines
            TokenKind::Newline
                if matches!(toks.last(), Some(Token { kind: TokenKind::Newline, .. })) => {}
            TokenKind::Eof => {
                toks.push(tok);
                break;
            }
            _ => toks.push(tok),
        }
    }
    Ok(toks)
}

/// Test if a character can continue an identifier.
pub(crate) fn is_id(c: char) -> bool {
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_')
}

/// Whitespace that is not significant. Line breaks are tokens.
pub(crate) fn is_blank(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r')
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> Result<Token, AsmError> {
        // Skip trivia first so spans start on the token itself
        loop {
            match self.first() {
                c if is_blank(c) && !self.is_eof() => self.take_while(is_blank),
                ';' => self.take_while(|c| c != '\n'),
                _ => break,
            }
        }
        self.reset_pos();

        let start = self.abs_pos();
        let line = self.line();
        let first_char = match self.bump() {
            Some(c) => c,
            None => return Ok(self.token(TokenKind::Eof, start, line)),
        };

        let kind = match first_char {
            '\n' => TokenKind::Newline,
            ',' => TokenKind::Comma,
            '#' => self.number('#', 10, DEC_MAX_DIGITS, start + 1, line)?,
            '$' => self.number('$', 16, HEX_MAX_DIGITS, start + 1, line)?,
            '%' => self.number('%', 2, BIN_MAX_DIGITS, start + 1, line)?,
            // Bare decimal, limits as for '#'
            '0'..='9' => self.number('#', 10, DEC_MAX_DIGITS, start, line)?,
            ':' => {
                if !self.first().is_ascii_alphabetic() {
                    return Err(self.error(AsmErrorKind::MissingLabelName, start, line));
                }
                self.take_while(is_id);
                let name = self.get_range(start + 1, self.abs_pos());
                if name.len() > IDENT_MAX_LEN {
                    return Err(self.error(AsmErrorKind::IdentifierTooLong, start, line));
                }
                TokenKind::Label(name.to_string())
            }
            c if c.is_ascii_alphabetic() => {
                self.take_while(is_id);
                let ident = self.get_range(start, self.abs_pos());
                self.classify(ident, start, line)?
            }
            c => return Err(self.error(AsmErrorKind::UnexpectedCharacter(c), start, line)),
        };
        Ok(self.token(kind, start, line))
    }

    fn number(
        &mut self,
        prefix: char,
        radix: u32,
        max_digits: usize,
        digits_from: usize,
        line: u32,
    ) -> Result<TokenKind, AsmError> {
        let start = self.abs_pos() - self.pos_in_token();
        self.take_while(|c| c.is_digit(radix));
        let digits = self.get_range(digits_from, self.abs_pos());
        if digits.is_empty() {
            return Err(self.error(AsmErrorKind::MalformedNumber { prefix }, start, line));
        }
        if digits.len() > max_digits {
            return Err(self.error(
                AsmErrorKind::NumberTooLong { prefix, max_digits },
                start,
                line,
            ));
        }
        // Digit count bounds the value well inside u32
        let val = u32::from_str_radix(digits, radix)
            .map_err(|_| self.error(AsmErrorKind::MalformedNumber { prefix }, start, line))?;
        Ok(TokenKind::Number(val))
    }

    fn classify(&self, ident: &str, start: usize, line: u32) -> Result<TokenKind, AsmError> {
        if ident.len() > IDENT_MAX_LEN {
            return Err(self.error(AsmErrorKind::IdentifierTooLong, start, line));
        }
        if let Ok(mnemonic) = ident.parse::<Mnemonic>() {
            return Ok(TokenKind::Mnemonic(mnemonic));
        }
        match ident.to_ascii_uppercase().as_str() {
            "I" => return Ok(TokenKind::IndexRegister),
            "TIMER" => return Ok(TokenKind::Timer),
            "SOUND" => return Ok(TokenKind::Sound),
            _ => {}
        }
        if ident.len() == 2 && ident.starts_with(['R', 'r']) {
            return ident[1..]
                .parse::<Register>()
                .map(TokenKind::Register)
                .map_err(|_| {
                    self.error(AsmErrorKind::InvalidRegister(ident.to_string()), start, line)
                });
        }
        Err(self.error(
            AsmErrorKind::UnknownIdentifier(ident.to_string()),
            start,
            line,
        ))
    }

    fn token(&self, kind: TokenKind, start: usize, line: u32) -> Token {
        Token {
            kind,
            span: Span::new(SrcOffset(start), self.pos_in_token()),
            line,
        }
    }

    fn error(&self, kind: AsmErrorKind, start: usize, line: u32) -> AsmError {
        AsmError::new(
            kind,
            Span::new(SrcOffset(start), self.pos_in_token().max(1)),
            line,
        )
    }
}
