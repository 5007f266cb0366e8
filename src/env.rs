use std::cell::RefCell;

/// Per-instruction tracing requested through `C8_TRACE`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Trace {
    #[default]
    Off,
    /// `C8_TRACE=1`: address and opcode of every executed instruction
    Opcodes,
    /// `C8_TRACE=regs`: opcodes followed by the register file
    Registers,
}

impl Trace {
    fn from_var(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("1" | "opcodes") => Trace::Opcodes,
            Some("regs" | "registers") => Trace::Registers,
            _ => Trace::Off,
        }
    }

    pub fn is_enabled(self) -> bool {
        self != Trace::Off
    }
}

#[derive(Clone, Copy)]
struct Env {
    trace: Trace,
}

thread_local! {
    /// Must only be mutated within `init`
    static ENV: RefCell<Option<Env>> = const { RefCell::new(None) };
}

/// Read the environment once. Must be called before any accessor.
pub fn init() {
    let value = Env {
        trace: Trace::from_var(std::env::var("C8_TRACE").ok().as_deref()),
    };
    ENV.with(|env| {
        let mut env = env.borrow_mut();
        assert!(
            env.is_none(),
            "tried to initialize environment state multiple times"
        );
        *env = Some(value);
    });
}

pub fn trace() -> Trace {
    with_env(|env| env.trace)
}

fn with_env<F, R>(callback: F) -> R
where
    F: Fn(&Env) -> R,
{
    ENV.with(|env| {
        let env = env.borrow();
        let env = env.unwrap_or_else(|| {
            panic!("tried to access environment state before initialization");
        });
        callback(&env)
    })
}
