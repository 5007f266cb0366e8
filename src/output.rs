use std::fmt::Write;

use colored::Colorize;

use crate::{
    lexer::Token,
    runtime::{Display, RunState, Status},
    symbol::{SymbolTable, LOAD_ADDR},
};

/// Bytes per hex dump row.
const DUMP_ROW: usize = 32;

/// Hex listing of an assembled image, one row of 32 bytes per line, bytes grouped in pairs.
///
/// ```text
/// 200 - 205 |  600A 7005 0000
/// ```
pub fn hex_dump(image: &[u8]) -> String {
    let mut out = String::new();
    for (row, chunk) in image.chunks(DUMP_ROW).enumerate() {
        let start = LOAD_ADDR as usize + row * DUMP_ROW;
        let end = start + chunk.len() - 1;
        let mut line = format!("{:03X} - {:03X} |  ", start, end);
        for pair in chunk.chunks(2) {
            for byte in pair {
                let _ = write!(line, "{:02X}", byte);
            }
            line.push(' ');
        }
        out.push_str(line.trim_end());
        out.push('\n');
    }
    out
}

/// Render the display bitmap as text, one line per pixel row.
pub fn display_text(display: &Display, minimal: bool) -> String {
    let (on, off) = if minimal { ('#', '.') } else { ('█', ' ') };
    let width = display[0].len();
    let mut out = String::new();
    if !minimal {
        let _ = writeln!(out, "+{}+", "-".repeat(width));
    }
    for row in display.iter() {
        if !minimal {
            out.push('|');
        }
        out.extend(row.iter().map(|&lit| if lit { on } else { off }));
        if !minimal {
            out.push('|');
        }
        out.push('\n');
    }
    if !minimal {
        let _ = writeln!(out, "+{}+", "-".repeat(width));
    }
    out
}

/// Summary of the register file, timers and execution status.
pub fn register_summary(state: &RunState, minimal: bool) -> String {
    let label = |name: &str| {
        if minimal {
            name.normal()
        } else {
            name.cyan()
        }
    };
    let mut out = String::new();
    let _ = writeln!(
        out,
        "{} {:#05X}  {} {:#05X}  {} {:<2}  {} {:<3}  {} {:<3}",
        label("PC"),
        state.pc(),
        label("I"),
        state.index(),
        label("SP"),
        state.sp(),
        label("DT"),
        state.delay_timer(),
        label("ST"),
        state.sound_timer(),
    );
    for (row, regs) in state.registers().chunks(4).enumerate() {
        let line = regs
            .iter()
            .enumerate()
            .map(|(i, val)| {
                let name = format!("R{:X}", row * 4 + i);
                format!("{} {:#04X}", label(name.as_str()), val)
            })
            .collect::<Vec<_>>()
            .join("  ");
        let _ = writeln!(out, "{}", line);
    }
    let status = match state.status() {
        Status::Running => "running".to_string(),
        Status::AwaitingKey { reg } => format!("awaiting key into {}", reg),
        Status::Halted => match state.error() {
            Some(err) => format!("halted: {}", err),
            None => "halted".to_string(),
        },
    };
    let _ = writeln!(out, "{} {}", label("Status"), status);
    out
}

/// One line per token: text, kind and source line.
pub fn token_listing(tokens: &[Token]) -> String {
    let mut out = String::new();
    for tok in tokens {
        let _ = writeln!(
            out,
            "{:>16}  |  {:<18}  |  line = {}",
            tok.kind.to_string(),
            tok.kind.describe(),
            tok.line
        );
    }
    out
}

/// Labels in definition order with their addresses.
pub fn symbol_listing(symbols: &SymbolTable) -> String {
    let mut out = String::new();
    for (name, addr) in symbols.iter() {
        let _ = writeln!(out, "{:#05X}  :{}", addr, name);
    }
    out
}
