// Heavily inspired and referenced from `rustc_lexer` and adapted to suit the project.
// See https://doc.rust-lang.org/beta/nightly-rustc/src/rustc_lexer/cursor.rs.html

use std::str::Chars;

pub(crate) const EOF_CHAR: char = '\0';

/// Peekable iterator over a char sequence.
#[derive(Clone)]
pub struct Cursor<'a> {
    /// Full input, for slicing out token text
    input: &'a str,
    len_remaining: usize,
    /// Iterator over chars in a &str
    chars: Chars<'a>,
    /// 1-based line of the cursor
    line: u32,
}

impl<'a> Cursor<'a> {
    pub fn new(input: &'a str) -> Cursor<'a> {
        Cursor {
            input,
            len_remaining: input.len(),
            chars: input.chars(),
            line: 1,
        }
    }

    /// Peek the next char without consuming it, or `EOF_CHAR` at the end.
    pub fn first(&self) -> char {
        self.chars.clone().next().unwrap_or(EOF_CHAR)
    }

    /// File is finished parsing
    pub fn is_eof(&self) -> bool {
        self.chars.as_str().is_empty()
    }

    /// Move to the next char, tracking line breaks.
    pub fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
        }
        Some(c)
    }

    pub fn take_while(&mut self, mut predicate: impl FnMut(char) -> bool) {
        while predicate(self.first()) && !self.is_eof() {
            self.bump();
        }
    }

    /// Byte length of the token consumed since the last `reset_pos`.
    pub fn pos_in_token(&self) -> usize {
        self.len_remaining - self.chars.as_str().len()
    }

    pub fn reset_pos(&mut self) {
        self.len_remaining = self.chars.as_str().len();
    }

    /// Byte offset of the cursor from the start of the input
    pub fn abs_pos(&self) -> usize {
        self.input.len() - self.chars.as_str().len()
    }

    pub fn line(&self) -> u32 {
        self.line
    }

    pub fn get_range(&self, start: usize, end: usize) -> &'a str {
        &self.input[start..end]
    }
}
