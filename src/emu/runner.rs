use super::{Chip8, ConfigError, Display, StepStatus, TraceSink};
use crate::u4;

/// Instruction and timer rates used by [`Chip8Runner`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RunnerConfig {
    /// Instructions executed per second
    pub cpu_hz: f32,
    /// Timer decrements per second
    pub timer_hz: f32,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            cpu_hz: 700.0,
            timer_hz: 60.0,
        }
    }
}

impl RunnerConfig {
    /// Both rates must be finite and strictly positive.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [("cpu_hz", self.cpu_hz), ("timer_hz", self.timer_hz)] {
            if !(value.is_finite() && value > 0.0) {
                return Err(ConfigError::InvalidRate { name, value });
            }
        }
        Ok(())
    }
}

#[derive(Debug, PartialEq, Eq)]
pub enum RunnerStatus {
    Ok,
    /// The program is blocked on an await-key instruction.
    AwaitingInput,
}

/// High-level emulator runner that manages timing internally.
pub struct Chip8Runner {
    chip8: Chip8,
    cpu_time_step: f32,
    timer_time_step: f32,
    cpu_dt_accumulator: f32,
    timer_dt_accumulator: f32,
}

impl Chip8Runner {
    pub fn new(chip8: Chip8, config: RunnerConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        Ok(Self {
            chip8,
            cpu_time_step: 1.0 / config.cpu_hz,
            timer_time_step: 1.0 / config.timer_hz,
            cpu_dt_accumulator: 0.0,
            timer_dt_accumulator: 0.0,
        })
    }

    /// Update emulator by delta time, handles both CPU and timer cycles.
    ///
    /// Runs as many timer updates and CPU cycles as needed based on the elapsed time `dt`.
    /// Returns early when the program blocks on an await-key instruction, so the caller
    /// can deliver input before the next cycle.
    pub fn update(&mut self, dt: f32, mut trace: Option<&mut dyn TraceSink>) -> RunnerStatus {
        self.cpu_dt_accumulator += dt;
        self.timer_dt_accumulator += dt;

        while self.timer_dt_accumulator >= self.timer_time_step {
            self.timer_dt_accumulator -= self.timer_time_step;
            self.chip8.tick_timers();
        }

        while self.cpu_dt_accumulator >= self.cpu_time_step {
            self.cpu_dt_accumulator -= self.cpu_time_step;

            let status = match trace {
                Some(ref mut trace) => self.chip8.step(Some(&mut **trace)),
                None => self.chip8.step(None),
            };

            match status {
                StepStatus::AwaitingInput => {
                    // The same instruction runs again once input has been polled.
                    // We clear the accumulator to avoid "catching up" in the next frame.
                    self.cpu_dt_accumulator = 0.0;
                    return RunnerStatus::AwaitingInput;
                }
                StepStatus::Unrecognized { opcode } => {
                    log::warn!(
                        "Ignoring unknown opcode {:#06X} at {:#05X}",
                        opcode,
                        self.chip8.machine().pc.wrapping_sub(2)
                    );
                }
                StepStatus::Progressed => {}
            }
        }

        RunnerStatus::Ok
    }

    /// Returns true if the sound timer is active, indicating a beep should be played.
    pub fn should_beep(&self) -> bool {
        self.chip8.should_beep()
    }

    /// Set the state of a key on the keypad.
    pub fn set_key(&mut self, key: u4, pressed: bool) {
        self.chip8.set_key(key, pressed)
    }

    pub fn display(&self) -> Display<bool> {
        self.chip8.display()
    }

    pub fn chip8_ref(&self) -> &Chip8 {
        &self.chip8
    }

    pub fn chip8_mut(&mut self) -> &mut Chip8 {
        &mut self.chip8
    }
}
