use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use c8kit::env::Trace;
use c8kit::error::{report, runtime_report};
use c8kit::output::{display_text, hex_dump, register_summary, symbol_listing, token_listing};
use c8kit::{lexer, AssemblerContext, Assembly, Quirks, RunState, Status};

/// c8kit is an assembler and headless interpreter for an 8-bit CHIP-8 style machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.asm` or binary `.ch8` file and print the final machine state
    Run {
        /// `.asm` or `.ch8` file to run
        name: PathBuf,
        /// Stop after this many steps
        #[arg(short, long, default_value_t = 100_000)]
        steps: usize,
        /// Steps between timer ticks
        #[arg(short, long, default_value_t = 8)]
        tick_every: usize,
        /// Comma-separated interpreter quirks: `legacy-fill`, `collision`
        #[arg(short, long)]
        quirks: Option<Quirks>,
        /// Hex key (0-F) to hold down for the whole run, may be repeated
        #[arg(short, long = "key", value_parser = parse_key)]
        keys: Vec<u8>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Create binary `.ch8` file to run later
    Assemble {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination to output `.ch8` file
        dest: Option<PathBuf>,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print tokens, labels and a hex dump of the assembled image
    Dump {
        /// `.asm` file to dump
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    c8kit::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(c8kit::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    if let Some(command) = args.command {
        match command {
            Command::Run {
                name,
                steps,
                tick_every,
                quirks,
                keys,
                minimal,
            } => {
                let opts = RunOptions {
                    steps,
                    tick_every,
                    quirks: quirks.unwrap_or_default(),
                    keys,
                    minimal,
                };
                run(&name, &opts)
            }
            Command::Assemble { name, dest } => {
                file_message(Green, "Assembling", &name);
                let src = fs::read_to_string(&name).into_diagnostic()?;
                let assembly = assemble(&name, &src)?;

                let out_file_name = dest.unwrap_or_else(|| name.with_extension("ch8"));
                fs::write(&out_file_name, &assembly.image).into_diagnostic()?;

                let finished = format!("emit binary ({} bytes)", assembly.image.len());
                message(Green, "Finished", &finished);
                file_message(Green, "Saved", &out_file_name);
                Ok(())
            }
            Command::Check { name } => {
                file_message(Green, "Checking", &name);
                let src = fs::read_to_string(&name).into_diagnostic()?;
                let _ = assemble(&name, &src)?;
                message(Green, "Success", "no errors found!");
                Ok(())
            }
            Command::Dump { name } => dump(&name),
        }
    } else if let Some(path) = args.path {
        run(&path, &RunOptions::default())
    } else {
        println!("\n~ c8kit v{VERSION} ~");
        println!("{}", LOGO.truecolor(120, 200, 120).bold());
        println!("{SHORT_INFO}");
        Ok(())
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn parse_key(value: &str) -> std::result::Result<u8, String> {
    match u8::from_str_radix(value, 16) {
        Ok(key) if key <= 0xF && value.len() == 1 => Ok(key),
        _ => Err(format!("'{}' is not a hex key between 0 and F", value)),
    }
}

struct RunOptions {
    steps: usize,
    tick_every: usize,
    quirks: Quirks,
    keys: Vec<u8>,
    minimal: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        RunOptions {
            steps: 100_000,
            tick_every: 8,
            quirks: Quirks::default(),
            keys: Vec::new(),
            minimal: false,
        }
    }
}

fn run(name: &Path, opts: &RunOptions) -> Result<()> {
    use MsgColor::*;
    if opts.minimal {
        colored::control::set_override(false);
    }
    let loud = !opts.minimal;

    if loud {
        file_message(Green, "Loading", name);
    }
    let image = match name.extension().and_then(|ext| ext.to_str()) {
        Some("ch8") => fs::read(name).into_diagnostic()?,
        Some("asm") => {
            let src = fs::read_to_string(name).into_diagnostic()?;
            assemble(name, &src)?.image
        }
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    };

    let mut state = RunState::from_image(&image, opts.quirks).map_err(runtime_report)?;
    for &key in &opts.keys {
        state.set_key(key, true);
    }

    if loud {
        let quirks = format!("emitted binary (quirks: {})", opts.quirks);
        message(Green, "Running", &quirks);
    }
    let tick_every = opts.tick_every.max(1);
    let trace = c8kit::env::trace();
    let mut taken = 0;
    let outcome = loop {
        if taken == opts.steps {
            break Ok(state.status());
        }
        if trace.is_enabled() && state.status() == Status::Running {
            trace_step(&state, trace);
        }
        let result = state.step();
        taken += 1;
        if taken % tick_every == 0 {
            state.tick_timers();
        }
        match result {
            Ok(Status::Running) => {}
            // Held keys never change, so nothing can wake the machine
            Ok(Status::AwaitingKey { .. }) if opts.keys.is_empty() => break result,
            Ok(Status::AwaitingKey { .. }) => {}
            Ok(Status::Halted) | Err(_) => break result,
        }
    };

    print!("{}", register_summary(&state, opts.minimal));
    print!("{}", display_text(state.display(), opts.minimal));

    match outcome {
        Ok(Status::Halted) => {
            if loud {
                message(Green, "Halted", &format!("after {} steps", taken));
            }
            Ok(())
        }
        Ok(Status::AwaitingKey { reg }) => {
            if loud {
                message(Cyan, "Blocked", &format!("waiting for a key into {}", reg));
            }
            Ok(())
        }
        Ok(Status::Running) => {
            if loud {
                message(Cyan, "Stopped", &format!("step limit of {} reached", opts.steps));
            }
            Ok(())
        }
        Err(err) => Err(runtime_report(err)),
    }
}

fn trace_step(state: &RunState, trace: Trace) {
    if let Some(opcode) = state.peek_opcode() {
        eprintln!("[{:03X}] {:04X}", state.pc(), opcode);
    }
    if trace == Trace::Registers {
        let regs = state
            .registers()
            .iter()
            .map(|val| format!("{:02X}", val))
            .collect::<Vec<_>>()
            .join(" ");
        eprintln!("      I={:03X} {}", state.index(), regs);
    }
}

fn dump(name: &Path) -> Result<()> {
    use MsgColor::*;
    file_message(Green, "Dumping", name);
    let src = fs::read_to_string(name).into_diagnostic()?;
    let name_str = name.display().to_string();
    let toks = lexer::tokenize(&src).map_err(|err| report(&err, &name_str, &src))?;

    println!("\n===== TOKENS =====");
    print!("{}", token_listing(&toks));

    let mut ctx = AssemblerContext::new(&toks);
    let result = ctx.assemble();

    println!("\n===== LABELS =====");
    print!("{}", symbol_listing(ctx.symbols()));
    println!("\n===== HEX DUMP =====");
    print!("{}", hex_dump(ctx.image()));
    println!();

    match result {
        Ok(()) => {
            message(Green, "Finished", "dump");
            Ok(())
        }
        Err(err) => {
            message(Red, "Partial", "image above is incomplete");
            Err(report(&err, &name_str, &src))
        }
    }
}

/// Assemble a source file, converting errors into labelled diagnostics.
fn assemble(name: &Path, src: &str) -> Result<Assembly> {
    c8kit::assemble(src).map_err(|err| report(&err, &name.display().to_string(), src))
}

const LOGO: &str = r#"
         ___  _    _ _
   ___  ( _ )| | _(_) |_
  / __| / _ \| |/ / | __|
 | (__ | (_) |   <| | |_
  \___| \___/|_|\_\_|\__|"#;

const SHORT_INFO: &str = r"
Welcome to c8kit, an assembler and interpreter for programs written
for a 64x32 monochrome, 16 register, 4KB virtual machine.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
