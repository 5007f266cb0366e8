use rand_core::{OsRng, RngCore};

use crate::{
    error::RuntimeError,
    quirks::Quirks,
    symbol::{Register, LOAD_ADDR, MAX_PROGRAM_SIZE, MEMORY_SIZE},
};

pub const SCREEN_WIDTH: usize = 64;
pub const SCREEN_HEIGHT: usize = 32;

/// Deepest subroutine nesting.
pub const STACK_SIZE: usize = 16;

/// Bytes per hex digit sprite.
const GLYPH_HEIGHT: u16 = 5;

/// Digit sprites 0-F, loaded at address 0.
const FONT: [u8; 80] = [
    0xF0, 0x90, 0x90, 0x90, 0xF0, // 0
    0x20, 0x60, 0x20, 0x20, 0x70, // 1
    0xF0, 0x10, 0xF0, 0x80, 0xF0, // 2
    0xF0, 0x10, 0xF0, 0x10, 0xF0, // 3
    0x90, 0x90, 0xF0, 0x10, 0x10, // 4
    0xF0, 0x80, 0xF0, 0x10, 0xF0, // 5
    0xF0, 0x80, 0xF0, 0x90, 0xF0, // 6
    0xF0, 0x10, 0x20, 0x40, 0x40, // 7
    0xF0, 0x90, 0xF0, 0x90, 0xF0, // 8
    0xF0, 0x90, 0xF0, 0x10, 0xF0, // 9
    0xF0, 0x90, 0xF0, 0x90, 0x90, // A
    0xE0, 0x90, 0xE0, 0x90, 0xE0, // B
    0xF0, 0x80, 0x80, 0x80, 0xF0, // C
    0xE0, 0x90, 0x90, 0x90, 0xE0, // D
    0xF0, 0x80, 0xF0, 0x80, 0xF0, // E
    0xF0, 0x80, 0xF0, 0x80, 0x80, // F
];

pub type Display = [[bool; SCREEN_WIDTH]; SCREEN_HEIGHT];

/// Execution state observed by the host after each step.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Status {
    Running,
    /// Blocked on `AWAIT` until a key is held. PC stays on the instruction.
    AwaitingKey { reg: Register },
    /// Terminal. Reached through `BREAK` or a runtime error.
    Halted,
}

/// Represents complete machine state during runtime.
pub struct RunState {
    /// 4KB of memory, font at 0x000 and program at 0x200
    mem: Box<[u8; MEMORY_SIZE]>,
    /// R0 to RF, RF doubling as the flag register
    reg: [u8; 16],
    /// Index register
    index: u16,
    /// Program counter
    pc: u16,
    stack: [u16; STACK_SIZE],
    /// Number of occupied stack slots
    sp: usize,
    delay: u8,
    sound: u8,
    /// Indexed `[y][x]`
    display: Box<Display>,
    keys: [bool; 16],
    status: Status,
    error: Option<RuntimeError>,
    quirks: Quirks,
    rng: Box<dyn RngCore>,
}

/// Single fetched instruction, split into its fields.
#[derive(Clone, Copy, Debug)]
struct Opcode(u16);

impl Opcode {
    fn group(self) -> usize {
        (self.0 >> 12) as usize
    }

    fn x(self) -> usize {
        ((self.0 >> 8) & 0xF) as usize
    }

    fn y(self) -> usize {
        ((self.0 >> 4) & 0xF) as usize
    }

    fn n(self) -> u8 {
        (self.0 & 0xF) as u8
    }

    fn nn(self) -> u8 {
        (self.0 & 0xFF) as u8
    }

    fn nnn(self) -> u16 {
        self.0 & 0xFFF
    }
}

type Exec = Result<(), RuntimeError>;

impl RunState {
    pub fn new(quirks: Quirks) -> Self {
        let mut mem = Box::new([0; MEMORY_SIZE]);
        mem[..FONT.len()].copy_from_slice(&FONT);
        RunState {
            mem,
            reg: [0; 16],
            index: 0,
            pc: LOAD_ADDR,
            stack: [0; STACK_SIZE],
            sp: 0,
            delay: 0,
            sound: 0,
            display: Box::new([[false; SCREEN_WIDTH]; SCREEN_HEIGHT]),
            keys: [false; 16],
            status: Status::Running,
            error: None,
            quirks,
            rng: Box::new(OsRng),
        }
    }

    /// Replace the random source used by `RANDOM`.
    pub fn with_rng(mut self, rng: Box<dyn RngCore>) -> Self {
        self.rng = rng;
        self
    }

    /// Copy a binary image to the load address.
    pub fn load(&mut self, image: &[u8]) -> Result<(), RuntimeError> {
        if image.len() > MAX_PROGRAM_SIZE {
            let err = RuntimeError::RomTooLarge { len: image.len() };
            self.halt_with(err);
            return Err(err);
        }
        let start = LOAD_ADDR as usize;
        self.mem[start..start + image.len()].copy_from_slice(image);
        Ok(())
    }

    /// Create a machine with `image` loaded.
    pub fn from_image(image: &[u8], quirks: Quirks) -> Result<Self, RuntimeError> {
        let mut state = RunState::new(quirks);
        state.load(image)?;
        Ok(state)
    }

    const OP_TABLE: [fn(&mut RunState, Opcode) -> Exec; 16] = [
        Self::system,      // 0x0
        Self::jump,        // 0x1
        Self::call,        // 0x2
        Self::skip_eq,     // 0x3
        Self::skip_ne,     // 0x4
        Self::reg_pair,    // 0x5
        Self::set,         // 0x6
        Self::add,         // 0x7
        Self::alu,         // 0x8
        Self::skip_ne_reg, // 0x9
        Self::set_index,   // 0xA
        Self::jump_offset, // 0xB
        Self::random,      // 0xC
        Self::draw,        // 0xD
        Self::key,         // 0xE
        Self::misc,        // 0xF
    ];

    /// Execute a single instruction, or retry a pending `AWAIT`.
    /// Stepping a halted machine does nothing.
    pub fn step(&mut self) -> Result<Status, RuntimeError> {
        match self.status {
            Status::Halted => return Ok(Status::Halted),
            Status::AwaitingKey { reg } => {
                if let Some(key) = self.held_key() {
                    self.reg[reg.index() as usize] = key;
                    self.pc += 2;
                    self.status = Status::Running;
                }
                return Ok(self.status);
            }
            Status::Running => {}
        }

        match self.execute() {
            Ok(()) => Ok(self.status),
            Err(err) => {
                self.halt_with(err);
                Err(err)
            }
        }
    }

    /// Step until the machine halts, blocks on a key or `limit` steps pass.
    /// Returns the number of steps taken.
    pub fn run(&mut self, limit: usize) -> Result<usize, RuntimeError> {
        for taken in 0..limit {
            if self.step()? != Status::Running {
                return Ok(taken + 1);
            }
        }
        Ok(limit)
    }

    /// Decrement both timers, saturating at zero.
    pub fn tick_timers(&mut self) {
        self.delay = self.delay.saturating_sub(1);
        self.sound = self.sound.saturating_sub(1);
    }

    /// Opcode at the program counter, if it is in memory.
    pub fn peek_opcode(&self) -> Option<u16> {
        let pc = self.pc as usize;
        let bytes = self.mem.get(pc..pc + 2)?;
        Some(u16::from_be_bytes([bytes[0], bytes[1]]))
    }

    pub fn set_key(&mut self, key: u8, pressed: bool) {
        self.keys[(key & 0xF) as usize] = pressed;
    }

    pub fn registers(&self) -> &[u8; 16] {
        &self.reg
    }

    pub fn index(&self) -> u16 {
        self.index
    }

    pub fn pc(&self) -> u16 {
        self.pc
    }

    pub fn sp(&self) -> usize {
        self.sp
    }

    /// Return addresses, oldest first.
    pub fn stack(&self) -> &[u16] {
        &self.stack[..self.sp]
    }

    pub fn delay_timer(&self) -> u8 {
        self.delay
    }

    pub fn sound_timer(&self) -> u8 {
        self.sound
    }

    pub fn memory(&self) -> &[u8] {
        &self.mem[..]
    }

    pub fn display(&self) -> &Display {
        &self.display
    }

    pub fn keys(&self) -> &[bool; 16] {
        &self.keys
    }

    pub fn status(&self) -> Status {
        self.status
    }

    /// Error that halted the machine, if any.
    pub fn error(&self) -> Option<RuntimeError> {
        self.error
    }

    pub fn quirks(&self) -> Quirks {
        self.quirks
    }

    fn halt_with(&mut self, err: RuntimeError) {
        self.status = Status::Halted;
        self.error = Some(err);
    }

    fn execute(&mut self) -> Exec {
        let addr = self.pc as usize;
        let op = Opcode(u16::from_be_bytes([self.read(addr)?, self.read(addr + 1)?]));
        // PC moves past the instruction before it is performed
        self.pc += 2;
        Self::OP_TABLE[op.group()](self, op)
    }

    #[inline]
    fn read(&self, addr: usize) -> Result<u8, RuntimeError> {
        self.mem
            .get(addr)
            .copied()
            .ok_or(RuntimeError::OutOfBounds { addr })
    }

    #[inline]
    fn write(&mut self, addr: usize, value: u8) -> Exec {
        let cell = self
            .mem
            .get_mut(addr)
            .ok_or(RuntimeError::OutOfBounds { addr })?;
        *cell = value;
        Ok(())
    }

    fn invalid(&self, op: Opcode) -> RuntimeError {
        RuntimeError::InvalidOpcode {
            opcode: op.0,
            addr: self.pc - 2,
        }
    }

    fn skip_if(&mut self, cond: bool) {
        if cond {
            self.pc += 2;
        }
    }

    fn held_key(&self) -> Option<u8> {
        self.keys.iter().position(|&held| held).map(|key| key as u8)
    }

    fn system(&mut self, op: Opcode) -> Exec {
        match op.0 {
            0x0000 => {
                // Leave PC on the BREAK
                self.pc -= 2;
                self.status = Status::Halted;
            }
            0x00E0 => *self.display = [[false; SCREEN_WIDTH]; SCREEN_HEIGHT],
            0x00EE => {
                if self.sp == 0 {
                    return Err(RuntimeError::StackUnderflow);
                }
                self.sp -= 1;
                self.pc = self.stack[self.sp];
            }
            _ => return Err(self.invalid(op)),
        }
        Ok(())
    }

    fn jump(&mut self, op: Opcode) -> Exec {
        self.pc = op.nnn();
        Ok(())
    }

    fn call(&mut self, op: Opcode) -> Exec {
        if self.sp == STACK_SIZE {
            return Err(RuntimeError::StackOverflow);
        }
        self.stack[self.sp] = self.pc;
        self.sp += 1;
        self.pc = op.nnn();
        Ok(())
    }

    fn skip_eq(&mut self, op: Opcode) -> Exec {
        self.skip_if(self.reg[op.x()] == op.nn());
        Ok(())
    }

    fn skip_ne(&mut self, op: Opcode) -> Exec {
        self.skip_if(self.reg[op.x()] != op.nn());
        Ok(())
    }

    fn reg_pair(&mut self, op: Opcode) -> Exec {
        match op.n() {
            0x0 => self.skip_if(self.reg[op.x()] == self.reg[op.y()]),
            0x1 => {
                let (x, y) = (self.reg[op.x()] as usize, self.reg[op.y()] as usize);
                if x < SCREEN_WIDTH && y < SCREEN_HEIGHT {
                    self.display[y][x] ^= true;
                }
            }
            _ => return Err(self.invalid(op)),
        }
        Ok(())
    }

    fn set(&mut self, op: Opcode) -> Exec {
        self.reg[op.x()] = op.nn();
        Ok(())
    }

    fn add(&mut self, op: Opcode) -> Exec {
        // No carry
        self.reg[op.x()] = self.reg[op.x()].wrapping_add(op.nn());
        Ok(())
    }

    /// 8XYN register arithmetic. Flags are written after the result.
    fn alu(&mut self, op: Opcode) -> Exec {
        let (x, y) = (op.x(), op.y());
        let (vx, vy) = (self.reg[x], self.reg[y]);
        let (result, flag) = match op.n() {
            0x0 => (vy, None),
            0x1 => (vx | vy, None),
            0x2 => (vx & vy, None),
            0x3 => (vx ^ vy, None),
            0x4 => {
                let (sum, carry) = vx.overflowing_add(vy);
                (sum, Some(carry as u8))
            }
            0x5 => (vx.wrapping_sub(vy), Some((vx >= vy) as u8)),
            0x6 => (vx >> 1, Some(vx & 0x01)),
            0x7 => (vy.wrapping_sub(vx), Some((vy > vx) as u8)),
            0xE => (vx << 1, Some(vx >> 7)),
            _ => return Err(self.invalid(op)),
        };
        let vf = Register::VF.index() as usize;
        match flag {
            // Shifts write the flag before the shifted value
            Some(flag) if matches!(op.n(), 0x6 | 0xE) => {
                self.reg[vf] = flag;
                self.reg[x] = result;
            }
            Some(flag) => {
                self.reg[x] = result;
                self.reg[vf] = flag;
            }
            None => self.reg[x] = result,
        }
        Ok(())
    }

    fn skip_ne_reg(&mut self, op: Opcode) -> Exec {
        if op.n() != 0 {
            return Err(self.invalid(op));
        }
        self.skip_if(self.reg[op.x()] != self.reg[op.y()]);
        Ok(())
    }

    fn set_index(&mut self, op: Opcode) -> Exec {
        self.index = op.nnn();
        Ok(())
    }

    fn jump_offset(&mut self, op: Opcode) -> Exec {
        let target = op.nnn() as usize + self.reg[0] as usize;
        if target >= MEMORY_SIZE {
            return Err(RuntimeError::OutOfBounds { addr: target });
        }
        self.pc = target as u16;
        Ok(())
    }

    fn random(&mut self, op: Opcode) -> Exec {
        let byte = self.rng.next_u32() as u8;
        self.reg[op.x()] = byte & op.nn();
        Ok(())
    }

    /// XOR an 8-pixel-wide sprite from memory at I. Pixels past the edge are clipped.
    fn draw(&mut self, op: Opcode) -> Exec {
        let x0 = self.reg[op.x()] as usize;
        let y0 = self.reg[op.y()] as usize;
        let mut erased = false;
        for row in 0..op.n() as usize {
            let bits = self.read(self.index as usize + row)?;
            let y = y0 + row;
            if y >= SCREEN_HEIGHT {
                continue;
            }
            for col in 0..8 {
                let x = x0 + col;
                if x >= SCREEN_WIDTH {
                    break;
                }
                if bits & (0x80 >> col) != 0 {
                    let pixel = &mut self.display[y][x];
                    erased |= *pixel;
                    *pixel = !*pixel;
                }
            }
        }
        if self.quirks.collision {
            self.reg[Register::VF.index() as usize] = erased as u8;
        }
        Ok(())
    }

    fn key(&mut self, op: Opcode) -> Exec {
        let held = self.keys[(self.reg[op.x()] & 0xF) as usize];
        match op.nn() {
            0x9E => self.skip_if(held),
            0xA1 => self.skip_if(!held),
            _ => return Err(self.invalid(op)),
        }
        Ok(())
    }

    fn misc(&mut self, op: Opcode) -> Exec {
        let x = op.x();
        match op.nn() {
            0x07 => self.reg[x] = self.delay,
            0x0A => match self.held_key() {
                Some(key) => self.reg[x] = key,
                None => {
                    self.pc -= 2;
                    self.status = Status::AwaitingKey {
                        reg: Register::from_nibble(x as u8),
                    };
                }
            },
            0x15 => self.delay = self.reg[x],
            0x18 => self.sound = self.reg[x],
            0x1E => {
                let sum = self.index as usize + self.reg[x] as usize;
                if sum >= MEMORY_SIZE {
                    return Err(RuntimeError::OutOfBounds { addr: sum });
                }
                self.index = sum as u16;
            }
            0x29 => self.index = (self.reg[x] & 0xF) as u16 * GLYPH_HEIGHT,
            0x33 => {
                let value = self.reg[x];
                let base = self.index as usize;
                self.write(base, value / 100)?;
                self.write(base + 1, value / 10 % 10)?;
                self.write(base + 2, value % 10)?;
            }
            0x55 => self.store_registers(x)?,
            0x65 if self.quirks.legacy_fill => self.store_registers(x)?,
            0x65 => {
                for i in 0..=x {
                    self.reg[i] = self.read(self.index as usize + i)?;
                }
            }
            _ => return Err(self.invalid(op)),
        }
        Ok(())
    }

    /// Store R0..=RX to memory starting at I.
    fn store_registers(&mut self, x: usize) -> Exec {
        for i in 0..=x {
            self.write(self.index as usize + i, self.reg[i])?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Deterministic stand-in for the OS random source.
    struct FixedRng(u32);

    impl RngCore for FixedRng {
        fn next_u32(&mut self) -> u32 {
            self.0
        }

        fn next_u64(&mut self) -> u64 {
            self.0 as u64
        }

        fn fill_bytes(&mut self, dest: &mut [u8]) {
            dest.fill(self.0 as u8);
        }

        fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand_core::Error> {
            self.fill_bytes(dest);
            Ok(())
        }
    }

    fn machine(words: &[u16]) -> RunState {
        with_quirks(words, Quirks::default())
    }

    fn with_quirks(words: &[u16], quirks: Quirks) -> RunState {
        let image: Vec<u8> = words.iter().flat_map(|w| w.to_be_bytes()).collect();
        RunState::from_image(&image, quirks).unwrap()
    }

    fn run_to_halt(state: &mut RunState) {
        state.run(1000).unwrap();
        assert_eq!(state.status(), Status::Halted);
    }

    fn lit_pixels(state: &RunState) -> usize {
        state.display().iter().flatten().filter(|&&px| px).count()
    }

    #[test]
    fn fresh_machine() {
        let state = RunState::new(Quirks::default());
        assert_eq!(state.pc(), 0x200);
        assert_eq!(&state.memory()[..5], &[0xF0, 0x90, 0x90, 0x90, 0xF0]);
        assert_eq!(state.memory()[0x4F], 0x80);
        assert_eq!(state.status(), Status::Running);
        assert_eq!(state.sp(), 0);
    }

    #[test]
    fn set_add_break() {
        let mut state = machine(&[0x600A, 0x7005, 0x0000]);
        assert_eq!(state.step(), Ok(Status::Running));
        assert_eq!(state.step(), Ok(Status::Running));
        assert_eq!(state.step(), Ok(Status::Halted));
        assert_eq!(state.registers()[0], 15);
        assert_eq!(state.pc(), 0x204);
        // Halted is terminal
        assert_eq!(state.step(), Ok(Status::Halted));
        assert_eq!(state.pc(), 0x204);
        assert_eq!(state.error(), None);
    }

    #[test]
    fn add_immediate_leaves_flag() {
        let mut state = machine(&[0x60FF, 0x6F07, 0x7002, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[0], 1);
        assert_eq!(state.registers()[0xF], 7);
    }

    fn alu(n: u16, vx: u8, vy: u8) -> (u8, u8) {
        let mut state = machine(&[0x8120 | n]);
        state.reg[1] = vx;
        state.reg[2] = vy;
        state.step().unwrap();
        (state.reg[1], state.reg[0xF])
    }

    #[test]
    fn add_registers_carry() {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                let (result, flag) = alu(0x4, a, b);
                assert_eq!(result, a.wrapping_add(b));
                assert_eq!(flag, (a as u16 + b as u16 > 255) as u8, "{a} + {b}");
            }
        }
    }

    #[test]
    fn sub_registers_borrow() {
        for a in 0..=255u8 {
            for b in 0..=255u8 {
                let (result, flag) = alu(0x5, a, b);
                assert_eq!(result, a.wrapping_sub(b));
                assert_eq!(flag, (a >= b) as u8, "{a} - {b}");
            }
        }
    }

    #[test]
    fn revsub_shift_and_bitwise() {
        assert_eq!(alu(0x7, 3, 10), (7, 1));
        assert_eq!(alu(0x7, 10, 3), (249, 0));
        assert_eq!(alu(0x7, 5, 5), (0, 0));
        assert_eq!(alu(0x6, 0b1000_0011, 0), (0b0100_0001, 1));
        assert_eq!(alu(0x6, 0b10, 0), (0b1, 0));
        assert_eq!(alu(0xE, 0b1000_0001, 0), (0b10, 1));
        assert_eq!(alu(0xE, 0b0100_0000, 0), (0b1000_0000, 0));
        assert_eq!(alu(0x1, 0b1100, 0b1010).0, 0b1110);
        assert_eq!(alu(0x2, 0b1100, 0b1010).0, 0b1000);
        assert_eq!(alu(0x3, 0b1100, 0b1010).0, 0b0110);
        assert_eq!(alu(0x0, 1, 42).0, 42);
    }

    #[test]
    fn flag_written_after_result() {
        // ADD RF, R1 with RF=200, R1=100 leaves the carry in RF
        let mut state = machine(&[0x8F14]);
        state.reg[0xF] = 200;
        state.reg[1] = 100;
        state.step().unwrap();
        assert_eq!(state.registers()[0xF], 1);
    }

    #[test]
    fn shift_flag_written_before_result() {
        // RSHIFT RF with RF=6 keeps the shifted value, not the dropped bit
        let mut state = machine(&[0x8F06]);
        state.reg[0xF] = 6;
        state.step().unwrap();
        assert_eq!(state.registers()[0xF], 3);

        let mut state = machine(&[0x8F0E]);
        state.reg[0xF] = 3;
        state.step().unwrap();
        assert_eq!(state.registers()[0xF], 6);

        let mut state = machine(&[0x8F0E]);
        state.reg[0xF] = 0x81;
        state.step().unwrap();
        assert_eq!(state.registers()[0xF], 0x02);
    }

    #[test]
    fn skips() {
        // IFNEQ R0, #1 skips the SET when R0 == 1
        let mut state = machine(&[0x6001, 0x3001, 0x6142, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[1], 0);

        let mut state = machine(&[0x6001, 0x4001, 0x6142, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[1], 0x42);

        let mut state = machine(&[0x6003, 0x6103, 0x5010, 0x6242, 0x9010, 0x6342, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[2], 0);
        assert_eq!(state.registers()[3], 0x42);
    }

    #[test]
    fn call_and_return() {
        // 0x200 CALL 0x206, 0x202 SET R1, 0x204 BREAK, 0x206 SET R0, RETURN
        let mut state = machine(&[0x2206, 0x6101, 0x0000, 0x6007, 0x00EE]);
        state.step().unwrap();
        assert_eq!(state.pc(), 0x206);
        assert_eq!(state.stack(), &[0x202]);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[0], 7);
        assert_eq!(state.registers()[1], 1);
        assert_eq!(state.sp(), 0);
    }

    #[test]
    fn stack_underflow_halts() {
        let mut state = machine(&[0x00EE]);
        assert_eq!(state.step(), Err(RuntimeError::StackUnderflow));
        assert_eq!(state.status(), Status::Halted);
        assert_eq!(state.error(), Some(RuntimeError::StackUnderflow));
        assert_eq!(state.step(), Ok(Status::Halted));
    }

    #[test]
    fn stack_overflow_halts() {
        // Calls itself forever
        let mut state = machine(&[0x2200]);
        for _ in 0..STACK_SIZE {
            assert_eq!(state.step(), Ok(Status::Running));
        }
        assert_eq!(state.sp(), STACK_SIZE);
        assert_eq!(state.step(), Err(RuntimeError::StackOverflow));
        assert_eq!(state.sp(), STACK_SIZE);
        assert_eq!(state.status(), Status::Halted);
    }

    #[test]
    fn invalid_opcodes() {
        for word in [0x0123, 0x5AB2, 0x8AB9, 0x9AB1, 0xE0FF, 0xF0FF] {
            let mut state = machine(&[word]);
            assert_eq!(
                state.step(),
                Err(RuntimeError::InvalidOpcode {
                    opcode: word,
                    addr: 0x200
                })
            );
        }
    }

    #[test]
    fn jumps() {
        let mut state = machine(&[0x1208, 0, 0, 0, 0x0000]);
        state.step().unwrap();
        assert_eq!(state.pc(), 0x208);

        let mut state = machine(&[0x6004, 0xB204, 0, 0, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(state.pc(), 0x208);

        let mut state = machine(&[0x60FF, 0xBFFF]);
        state.step().unwrap();
        assert_eq!(
            state.step(),
            Err(RuntimeError::OutOfBounds { addr: 0x10FE })
        );
    }

    #[test]
    fn fetch_past_end_of_memory() {
        let mut state = machine(&[0x1FFF]);
        state.step().unwrap();
        assert_eq!(
            state.step(),
            Err(RuntimeError::OutOfBounds { addr: 0x1000 })
        );
    }

    #[test]
    fn random_masks_byte() {
        let mut state = machine(&[0xC00F, 0xC1FF]).with_rng(Box::new(FixedRng(0xABCD)));
        state.run(2).unwrap();
        assert_eq!(state.registers()[0], 0x0D);
        assert_eq!(state.registers()[1], 0xCD);
    }

    #[test]
    fn draw_is_xor() {
        // SET R0, #2 / SETSPRITE R0 / DRAW R1, R1, 5 (twice)
        let mut state = machine(&[0x6002, 0xF029, 0xD115, 0xD115, 0x0000]);
        state.run(3).unwrap();
        assert_eq!(state.index(), 10);
        // Glyph 2 lights 4+1+4+1+4 pixels
        assert_eq!(lit_pixels(&state), 14);
        assert!(state.display()[0][0] && !state.display()[1][0]);
        run_to_halt(&mut state);
        assert_eq!(lit_pixels(&state), 0);
        assert_eq!(state.registers()[0xF], 0);
    }

    #[test]
    fn draw_clips_at_edges() {
        // Draw the 8 glyph at (62, 30)
        let mut state = machine(&[0x603E, 0x611E, 0x6208, 0xF229, 0xD015, 0x0000]);
        run_to_halt(&mut state);
        let display = state.display();
        assert!(display[30][62] && display[30][63]);
        assert!(display[31][62] && !display[31][63]);
        // Nothing wrapped to the opposite edges
        assert!(!display[0][0] && !display[0][62] && !display[30][0]);
        assert_eq!(lit_pixels(&state), 3);
    }

    #[test]
    fn draw_collision_flag() {
        let words = [0xD015, 0xD015, 0x0000];
        let mut state = with_quirks(
            &words,
            Quirks {
                collision: true,
                ..Quirks::default()
            },
        );
        state.step().unwrap();
        assert_eq!(state.registers()[0xF], 0);
        state.step().unwrap();
        assert_eq!(state.registers()[0xF], 1);
    }

    #[test]
    fn pixel_toggle() {
        let mut state = machine(&[0x6005, 0x6106, 0x5011, 0x5011, 0x6050, 0x5011, 0x0000]);
        state.run(3).unwrap();
        assert!(state.display()[6][5]);
        state.step().unwrap();
        assert!(!state.display()[6][5]);
        // Off screen is ignored
        run_to_halt(&mut state);
        assert_eq!(lit_pixels(&state), 0);
    }

    #[test]
    fn clear_screen() {
        let mut state = machine(&[0xD005, 0x00E0, 0x0000]);
        state.step().unwrap();
        assert!(lit_pixels(&state) > 0);
        run_to_halt(&mut state);
        assert_eq!(lit_pixels(&state), 0);
    }

    #[test]
    fn keys() {
        // IFNKEY R0 / SET R1, #1 / IFKEY R0 / SET R2, #1
        let words = [0x6003, 0xE09E, 0x6101, 0xE0A1, 0x6201, 0x0000];
        let mut state = machine(&words);
        state.set_key(3, true);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[1], 0);
        assert_eq!(state.registers()[2], 1);

        let mut state = machine(&words);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[1], 1);
        assert_eq!(state.registers()[2], 0);
    }

    #[test]
    fn await_blocks_until_key() {
        let mut state = machine(&[0xF50A, 0x0000]);
        let waiting = Status::AwaitingKey {
            reg: Register::new(5).unwrap(),
        };
        assert_eq!(state.step(), Ok(waiting));
        assert_eq!(state.step(), Ok(waiting));
        assert_eq!(state.pc(), 0x200);
        // Timers still run while blocked
        state.delay = 3;
        state.tick_timers();
        assert_eq!(state.delay_timer(), 2);

        state.set_key(0xC, true);
        state.set_key(0x9, true);
        assert_eq!(state.step(), Ok(Status::Running));
        assert_eq!(state.registers()[5], 0x9);
        assert_eq!(state.pc(), 0x202);
        assert_eq!(state.step(), Ok(Status::Halted));
    }

    #[test]
    fn await_with_key_already_held() {
        let mut state = machine(&[0xF20A, 0x0000]);
        state.set_key(0x4, true);
        assert_eq!(state.step(), Ok(Status::Running));
        assert_eq!(state.registers()[2], 4);
    }

    #[test]
    fn timers() {
        // SET R0, #2 / SET TIMER, R0 / SET SOUND, R0 / SET R1, TIMER
        let mut state = machine(&[0x6002, 0xF015, 0xF018, 0xF107, 0x0000]);
        state.run(3).unwrap();
        assert_eq!(state.delay_timer(), 2);
        assert_eq!(state.sound_timer(), 2);
        for _ in 0..5 {
            state.tick_timers();
        }
        assert_eq!(state.delay_timer(), 0);
        assert_eq!(state.sound_timer(), 0);
        // Ticking never touches anything else
        assert_eq!(state.pc(), 0x206);
        assert_eq!(state.registers()[0], 2);
        run_to_halt(&mut state);
        assert_eq!(state.registers()[1], 0);
    }

    #[test]
    fn index_arithmetic() {
        let mut state = machine(&[0xAFFE, 0x6001, 0xF01E, 0xF01E]);
        state.run(3).unwrap();
        assert_eq!(state.index(), 0xFFF);
        assert_eq!(
            state.step(),
            Err(RuntimeError::OutOfBounds { addr: 0x1000 })
        );
    }

    #[test]
    fn bcd_digits() {
        let mut state = machine(&[0x60FE, 0xA300, 0xF033, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(&state.memory()[0x300..0x303], &[2, 5, 4]);

        let mut state = machine(&[0x6007, 0xAFFE, 0xF033]);
        state.run(2).unwrap();
        assert_eq!(
            state.step(),
            Err(RuntimeError::OutOfBounds { addr: 0x1000 })
        );
    }

    #[test]
    fn dump_registers() {
        let mut state = machine(&[0x6011, 0x6122, 0x6233, 0xA300, 0xF155, 0x0000]);
        run_to_halt(&mut state);
        assert_eq!(&state.memory()[0x300..0x303], &[0x11, 0x22, 0]);
        assert_eq!(state.index(), 0x300);
    }

    // FILL diverges between modes: the legacy behaviour stores registers exactly
    // like DUMP and never reads memory.
    const FILL_PROGRAM: [u16; 8] = [
        0xA300, 0x6011, 0x6122, 0xF155, // DUMP R1 at 0x300
        0x6000, 0x6100, 0xF165, 0x0000, // zero R0, R1 then FILL R1
    ];

    #[test]
    fn fill_loads_registers() {
        let mut state = machine(&FILL_PROGRAM);
        run_to_halt(&mut state);
        assert_eq!(&state.registers()[..2], &[0x11, 0x22]);
    }

    #[test]
    fn fill_legacy_stores_registers() {
        let mut state = with_quirks(
            &FILL_PROGRAM,
            Quirks {
                legacy_fill: true,
                ..Quirks::default()
            },
        );
        run_to_halt(&mut state);
        assert_eq!(&state.registers()[..2], &[0, 0]);
        assert_eq!(&state.memory()[0x300..0x302], &[0, 0]);
    }

    #[test]
    fn rom_too_large() {
        let mut state = RunState::new(Quirks::default());
        let image = vec![0; MAX_PROGRAM_SIZE + 1];
        assert_eq!(
            state.load(&image),
            Err(RuntimeError::RomTooLarge {
                len: MAX_PROGRAM_SIZE + 1
            })
        );
        assert_eq!(state.status(), Status::Halted);
        assert!(state.load(&image[1..]).is_ok());
    }
}
