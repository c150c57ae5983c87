use std::path::Path;

use super::{
    CallStack, FONT, FONT_START_ADDRESS, Framebuffer, Keypad, LoadError, MAX_PROGRAM_SIZE,
    Memory, PROGRAM_START_ADDRESS,
};

/// CHIP-8 machine state
pub struct Machine {
    /// 4KB memory: font at 0x050, program from 0x200
    pub memory: Memory,
    /// Display buffer: 64x32 monochrome pixels
    pub display: Framebuffer,

    /// Program counter: address of the next instruction to execute
    pub pc: u16,
    /// Index register: used for memory operations
    pub i: u16,
    /// General-purpose registers V0-VF (VF is used as a flag register)
    pub v: [u8; 16],
    /// Call stack for subroutine returns
    pub stack: CallStack,

    /// Delay timer: decremented by the timer driver until it reaches 0
    pub delay_timer: u8,
    /// Sound timer: decremented by the timer driver, audible while non-zero
    pub sound_timer: u8,

    pub keypad: Keypad,
}

impl Machine {
    /// Builds the initial image: font glyphs, program bytes, everything
    /// else zeroed and the program counter at the program offset.
    pub fn new(program: &[u8]) -> Result<Self, LoadError> {
        if program.is_empty() {
            return Err(LoadError::Empty);
        }

        let mut memory = Memory::new();
        memory
            .clipped_mut(FONT_START_ADDRESS as u16, FONT.len())
            .copy_from_slice(&FONT);
        memory
            .load(PROGRAM_START_ADDRESS, program)
            .ok_or(LoadError::TooLarge {
                size: program.len(),
                max_size: MAX_PROGRAM_SIZE,
            })?;

        log::debug!(
            "Loaded {} byte program at {:#05X}",
            program.len(),
            PROGRAM_START_ADDRESS
        );

        Ok(Self {
            memory,
            display: Framebuffer::new(),
            pc: PROGRAM_START_ADDRESS as u16,
            i: 0,
            v: [0; 16],
            stack: CallStack::new(),
            delay_timer: 0,
            sound_timer: 0,
            keypad: Keypad::default(),
        })
    }

    /// Reads a program image from disk and builds the machine from it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, LoadError> {
        let path = path.as_ref();
        let program = std::fs::read(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        Self::new(&program)
    }
}
