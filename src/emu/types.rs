use std::path::PathBuf;

pub const DISPLAY_X: usize = 64;
pub const DISPLAY_Y: usize = 32;

pub const MEMORY_SIZE: usize = 4096;
pub const PROGRAM_START_ADDRESS: usize = 0x200;
/// Largest program image that fits after the program offset.
pub const MAX_PROGRAM_SIZE: usize = MEMORY_SIZE - PROGRAM_START_ADDRESS;

pub const STACK_CAPACITY: usize = 32;

/// Register 15, overwritten by carry, borrow, shift and collision results.
pub const FLAG_REGISTER: usize = 0xF;

/// A type alias for the read-out grid handed to presentation layers
pub type Display<T> = [[T; DISPLAY_X]; DISPLAY_Y];

/// Outcome of a single CPU step
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StepStatus {
    /// The instruction was applied.
    Progressed,
    /// An await-key instruction found no key held; the program counter was
    /// rewound so the same instruction runs again on the next step.
    AwaitingInput,
    /// The instruction is not part of the instruction set and had no effect.
    Unrecognized { opcode: u16 },
}

/// Errors that can occur while building the machine from a program image
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Failed to read program file {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Program is too large ({size} bytes), max size is {max_size} bytes")]
    TooLarge { size: usize, max_size: usize },

    #[error("Program image is empty")]
    Empty,
}

/// Errors raised when a runner is built from an unusable configuration
#[derive(Debug, PartialEq, thiserror::Error)]
pub enum ConfigError {
    #[error("{name} must be a finite rate above zero, got {value}")]
    InvalidRate { name: &'static str, value: f32 },
}
