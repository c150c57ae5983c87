use rand::{SeedableRng, rngs::StdRng};

use super::{Display, Machine, Opcode, StepStatus, TraceSink};
use crate::u4;

/// CHIP-8 execution engine
///
/// Owns the machine state and the random source used by `Cxnn`. Stepping,
/// timer ticks and key updates are driven from outside at their own rates.
pub struct Chip8 {
    pub(crate) machine: Machine,
    pub(crate) rng: StdRng,
}

impl Chip8 {
    /// Wraps a machine with a random source seeded once from the OS.
    pub fn new(machine: Machine) -> Self {
        Self::with_rng(machine, StdRng::from_os_rng())
    }

    pub fn with_rng(machine: Machine, rng: StdRng) -> Self {
        Self { machine, rng }
    }

    /// Executes a single CPU cycle (fetch, decode, execute).
    ///
    /// The program counter is advanced past the instruction before its
    /// effect is applied.
    pub fn step(&mut self, trace: Option<&mut dyn TraceSink>) -> StepStatus {
        let pc = self.machine.pc;
        let raw = self.machine.memory.read_u16(pc);
        self.machine.pc = pc.wrapping_add(2);

        let opcode = Opcode::decode(raw);
        if let Some(trace) = trace {
            trace.record(pc, raw, &opcode);
        }

        self.execute(opcode)
    }

    /// Decrements both timers. Should be called at 60Hz.
    pub fn tick_timers(&mut self) {
        self.machine.delay_timer = self.machine.delay_timer.saturating_sub(1);
        self.machine.sound_timer = self.machine.sound_timer.saturating_sub(1);
    }

    pub fn sound_timer(&self) -> u8 {
        self.machine.sound_timer
    }

    /// Returns true if the sound timer is greater than zero, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.machine.sound_timer > 0
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.machine.keypad.set(key, pressed);
    }

    pub fn keypad(&self) -> u16 {
        self.machine.keypad.bits()
    }

    /// Renders the display into a 64x32 grid (true = lit).
    pub fn display(&self) -> Display<bool> {
        self.machine.display.to_grid()
    }

    /// Get the state of a pixel on the display (true = on, false = off).
    pub fn get_display_pixel(&self, x: usize, y: usize) -> bool {
        self.machine.display.pixel(x, y)
    }

    pub fn machine(&self) -> &Machine {
        &self.machine
    }

    pub fn machine_mut(&mut self) -> &mut Machine {
        &mut self.machine
    }
}
