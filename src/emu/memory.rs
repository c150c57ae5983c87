//! Fixed-capacity containers backing the machine state.
//!
//! Every accessor here applies an explicit out-of-range policy instead of
//! failing: addresses are masked to the 12-bit address space, ranges are
//! clipped at the end of memory, sprite rows outside the display are dropped
//! and the call stack pointer wraps around its capacity.

use super::{DISPLAY_X, DISPLAY_Y, Display, MEMORY_SIZE, STACK_CAPACITY};
use crate::u4;

const ADDRESS_MASK: u16 = (MEMORY_SIZE - 1) as u16;

/// 4KB byte-addressable memory.
pub struct Memory {
    bytes: [u8; MEMORY_SIZE],
}

impl Memory {
    pub fn new() -> Self {
        Self {
            bytes: [0; MEMORY_SIZE],
        }
    }

    /// Masks an address into the valid address space.
    pub const fn mask(addr: u16) -> u16 {
        addr & ADDRESS_MASK
    }

    pub fn read(&self, addr: u16) -> u8 {
        self.bytes[Self::mask(addr) as usize]
    }

    pub fn write(&mut self, addr: u16, value: u8) {
        self.bytes[Self::mask(addr) as usize] = value;
    }

    /// Reads a big-endian word, each byte address masked on its own.
    pub fn read_u16(&self, addr: u16) -> u16 {
        u16::from_be_bytes([self.read(addr), self.read(addr.wrapping_add(1))])
    }

    /// Up to `len` bytes starting at `addr`, clipped at the end of memory.
    pub fn clipped(&self, addr: u16, len: usize) -> &[u8] {
        let start = Self::mask(addr) as usize;
        let end = start.saturating_add(len).min(MEMORY_SIZE);
        &self.bytes[start..end]
    }

    pub fn clipped_mut(&mut self, addr: u16, len: usize) -> &mut [u8] {
        let start = Self::mask(addr) as usize;
        let end = start.saturating_add(len).min(MEMORY_SIZE);
        &mut self.bytes[start..end]
    }

    /// Copies `data` to `offset`. Returns `None` if it does not fit.
    pub(crate) fn load(&mut self, offset: usize, data: &[u8]) -> Option<()> {
        let end = offset.checked_add(data.len())?;
        self.bytes.get_mut(offset..end)?.copy_from_slice(data);
        Some(())
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }
}

impl Default for Memory {
    fn default() -> Self {
        Self::new()
    }
}

/// Return address stack with a wrapping stack pointer.
///
/// Pushing more than [`STACK_CAPACITY`] addresses silently overwrites the
/// oldest entries, and popping an empty stack wraps to the top slot.
pub struct CallStack {
    entries: [u16; STACK_CAPACITY],
    sp: usize,
}

impl CallStack {
    pub fn new() -> Self {
        Self {
            entries: [0; STACK_CAPACITY],
            sp: 0,
        }
    }

    pub fn push(&mut self, addr: u16) {
        self.entries[self.sp] = addr;
        self.sp = (self.sp + 1) % STACK_CAPACITY;
    }

    pub fn pop(&mut self) -> u16 {
        self.sp = (self.sp + STACK_CAPACITY - 1) % STACK_CAPACITY;
        self.entries[self.sp]
    }

    pub fn pointer(&self) -> usize {
        self.sp
    }

    pub fn entries(&self) -> &[u16; STACK_CAPACITY] {
        &self.entries
    }
}

impl Default for CallStack {
    fn default() -> Self {
        Self::new()
    }
}

/// 64x32 monochrome display stored as one `u64` per row.
///
/// Bit `x` of row `y` is pixel (x, y).
#[derive(Clone, PartialEq, Eq)]
pub struct Framebuffer {
    rows: [u64; DISPLAY_Y],
}

impl Framebuffer {
    pub fn new() -> Self {
        Self {
            rows: [0; DISPLAY_Y],
        }
    }

    pub fn clear(&mut self) {
        self.rows = [0; DISPLAY_Y];
    }

    pub fn rows(&self) -> &[u64; DISPLAY_Y] {
        &self.rows
    }

    pub fn pixel(&self, x: usize, y: usize) -> bool {
        x < DISPLAY_X && y < DISPLAY_Y && self.rows[y] & (1 << x) != 0
    }

    pub fn is_clear(&self) -> bool {
        self.rows.iter().all(|&row| row == 0)
    }

    /// XORs one sprite byte into row `y` starting at column `x`.
    ///
    /// The most significant sprite bit lands on column `x`. Bits past the
    /// right edge are truncated and rows past the bottom edge are dropped.
    /// Returns true if any lit pixel was hit.
    pub fn blit_row(&mut self, x: usize, y: usize, sprite: u8) -> bool {
        if y >= DISPLAY_Y || x >= DISPLAY_X {
            return false;
        }

        let lane = u64::from(sprite.reverse_bits()) << x;
        let row = &mut self.rows[y];
        let collision = *row & lane != 0;
        *row ^= lane;
        collision
    }

    pub fn to_grid(&self) -> Display<bool> {
        let mut grid = [[false; DISPLAY_X]; DISPLAY_Y];
        for (y, row) in grid.iter_mut().enumerate() {
            for (x, pixel) in row.iter_mut().enumerate() {
                *pixel = self.rows[y] & (1 << x) != 0;
            }
        }
        grid
    }
}

impl Default for Framebuffer {
    fn default() -> Self {
        Self::new()
    }
}

/// 16-key keypad as a bitmask, bit `k` set while key `k` is held.
#[derive(Clone, Copy, Default, PartialEq, Eq)]
pub struct Keypad(u16);

impl Keypad {
    pub fn set(&mut self, key: u4, pressed: bool) {
        let bit = 1u16 << key.get();
        if pressed {
            self.0 |= bit;
        } else {
            self.0 &= !bit;
        }
    }

    /// Keys outside 0x0-0xF are never held.
    pub fn is_pressed(&self, key: u8) -> bool {
        1u16.checked_shl(u32::from(key))
            .is_some_and(|bit| self.0 & bit != 0)
    }

    /// The highest-numbered key currently held, if any.
    pub fn highest_pressed(&self) -> Option<u4> {
        (self.0 != 0).then(|| u4::new(15 - self.0.leading_zeros() as u8))
    }

    pub fn bits(&self) -> u16 {
        self.0
    }
}
