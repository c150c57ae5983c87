mod chip8;
mod execute;
mod font;
mod machine;
mod memory;
mod opcode;
mod runner;
mod trace;
mod types;

pub use chip8::*;
pub use font::*;
pub use machine::*;
pub use memory::*;
pub use opcode::*;
pub use runner::*;
pub use trace::*;
pub use types::*;
