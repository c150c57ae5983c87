use rand::Rng;

use super::{
    Chip8, DISPLAY_X, DISPLAY_Y, FLAG_REGISTER, FONT_START_ADDRESS, Memory, Opcode, OpcodeALU,
    StepStatus,
};
use crate::u4;

impl Chip8 {
    pub(crate) fn execute(&mut self, opcode: Opcode) -> StepStatus {
        let m = &mut self.machine;

        match opcode {
            Opcode::ClearDisplay => {
                m.display.clear();
            }
            Opcode::Jump { nnn } => {
                m.pc = nnn;
            }
            Opcode::JumpWithOffset { nnn } => {
                m.pc = Memory::mask(nnn.wrapping_add(m.v[0].into()));
            }
            Opcode::Call { nnn } => {
                m.stack.push(m.pc);
                m.pc = nnn;
            }
            Opcode::Return => {
                m.pc = m.stack.pop();
            }
            Opcode::SkipRegEqualImm { x, nn } => {
                if m.v[x] == nn {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualImm { x, nn } => {
                if m.v[x] != nn {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegEqualReg { x, y } => {
                if m.v[x] == m.v[y] {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipRegNotEqualReg { x, y } => {
                if m.v[x] != m.v[y] {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SetRegImm { x, nn } => {
                m.v[x] = nn;
            }
            Opcode::AddRegImm { x, nn } => {
                m.v[x] = m.v[x].wrapping_add(nn);
            }
            Opcode::ALU { x, y, op } => {
                self.execute_alu(x, y, op);
            }
            Opcode::Random { x, nn } => {
                let rand_byte: u8 = self.rng.random();
                m.v[x] = rand_byte & nn;
            }
            Opcode::SetIndexImm { nnn } => {
                m.i = nnn;
            }
            Opcode::AddIndexReg { x } => {
                let before = m.i;
                m.i = Memory::mask(m.i.wrapping_add(m.v[x].into()));
                m.v[FLAG_REGISTER] = u8::from(m.i < before);
            }
            Opcode::Draw { x, y, n } => {
                self.execute_draw(x, y, n);
            }
            Opcode::SkipIfPressed { x } => {
                if m.keypad.is_pressed(m.v[x]) {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::SkipIfNotPressed { x } => {
                if !m.keypad.is_pressed(m.v[x]) {
                    m.pc = m.pc.wrapping_add(2);
                }
            }
            Opcode::WaitForKey { x } => {
                return self.execute_wait_for_key(x);
            }
            Opcode::ReadDelayTimer { x } => {
                m.v[x] = m.delay_timer;
            }
            Opcode::SetDelayTimer { x } => {
                m.delay_timer = m.v[x];
            }
            Opcode::SetSoundTimer { x } => {
                m.sound_timer = m.v[x];
            }
            Opcode::FontChar { x } => {
                m.i = FONT_START_ADDRESS as u16 + u16::from(m.v[x] & 0x0F);
            }
            Opcode::BCD { x } => {
                let value = m.v[x];
                m.memory.write(m.i, value / 100);
                m.memory.write(m.i.wrapping_add(1), (value / 10) % 10);
                m.memory.write(m.i.wrapping_add(2), value % 10);
            }
            Opcode::StoreRegs { x } => {
                let count = usize::from(x) + 1;
                let dest = m.memory.clipped_mut(m.i, count);
                let len = dest.len();
                dest.copy_from_slice(&m.v[..len]);
            }
            Opcode::LoadRegs { x } => {
                let count = usize::from(x) + 1;
                let src = m.memory.clipped(m.i, count);
                m.v[..src.len()].copy_from_slice(src);
            }
            Opcode::Unknown(opcode) => {
                return StepStatus::Unrecognized { opcode };
            }
        };

        StepStatus::Progressed
    }

    fn execute_alu(&mut self, x: u4, y: u4, op: OpcodeALU) {
        let v = &mut self.machine.v;

        match op {
            OpcodeALU::Set => v[x] = v[y],
            OpcodeALU::Or => v[x] |= v[y],
            OpcodeALU::And => v[x] &= v[y],
            OpcodeALU::Xor => v[x] ^= v[y],
            OpcodeALU::Add => {
                let before = v[x];
                v[x] = before.wrapping_add(v[y]);
                v[FLAG_REGISTER] = u8::from(v[x] < before);
            }
            OpcodeALU::Sub => {
                let before = v[x];
                v[x] = before.wrapping_sub(v[y]);
                v[FLAG_REGISTER] = u8::from(v[x] < before);
            }
            OpcodeALU::SubReverse => {
                v[x] = v[y].wrapping_sub(v[x]);
                // Compared against the registers as they are after the write
                v[FLAG_REGISTER] = u8::from(v[x] < v[y]);
            }
            OpcodeALU::ShiftRight => {
                v[FLAG_REGISTER] = v[x] & 1;
                v[x] >>= 1;
            }
            OpcodeALU::ShiftLeft => {
                v[FLAG_REGISTER] = v[x] >> 7;
                v[x] <<= 1;
            }
        }
    }

    fn execute_draw(&mut self, x: u4, y: u4, n: u4) {
        let m = &mut self.machine;

        // VF is cleared before the coordinates are read, so `DFyn` draws at column 0
        m.v[FLAG_REGISTER] = 0;
        let x_pos = usize::from(m.v[x]) & (DISPLAY_X - 1);
        let y_pos = usize::from(m.v[y]) & (DISPLAY_Y - 1);

        // Rows past the bottom edge and bytes past the end of memory are dropped
        let sprite = m.memory.clipped(m.i, usize::from(n));
        let mut collision = false;
        for (row, &byte) in sprite.iter().enumerate() {
            collision |= m.display.blit_row(x_pos, y_pos + row, byte);
        }

        if collision {
            m.v[FLAG_REGISTER] = 1;
        }
    }

    fn execute_wait_for_key(&mut self, x: u4) -> StepStatus {
        let m = &mut self.machine;

        match m.keypad.highest_pressed() {
            Some(key) => {
                m.v[x] = key.get();
                StepStatus::Progressed
            }
            None => {
                // Repeat this instruction until a key is held
                m.pc = m.pc.wrapping_sub(2);
                StepStatus::AwaitingInput
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;
    use crate::emu::{Machine, StepStatus};

    fn chip8_with(program: &[u16]) -> Chip8 {
        let bytes: Vec<u8> = program.iter().flat_map(|op| op.to_be_bytes()).collect();
        let machine = Machine::new(&bytes).unwrap();
        Chip8::with_rng(machine, StdRng::seed_from_u64(8))
    }

    fn run(chip8: &mut Chip8, steps: usize) {
        for _ in 0..steps {
            chip8.step(None);
        }
    }

    #[test]
    fn add_sets_carry_on_wrap() {
        let mut chip8 = chip8_with(&[0x8014]);
        chip8.machine.v[0] = 200;
        chip8.machine.v[1] = 100;
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 44);
        assert_eq!(chip8.machine.v[0xF], 1);

        let mut chip8 = chip8_with(&[0x8014]);
        chip8.machine.v[0] = 20;
        chip8.machine.v[1] = 10;
        chip8.machine.v[0xF] = 1;
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 30);
        assert_eq!(chip8.machine.v[0xF], 0);
    }

    #[test]
    fn sub_flag_follows_wrapped_result() {
        let mut chip8 = chip8_with(&[0x8015]);
        chip8.machine.v[0] = 10;
        chip8.machine.v[1] = 3;
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 7);
        assert_eq!(chip8.machine.v[0xF], 1);

        let mut chip8 = chip8_with(&[0x8015]);
        chip8.machine.v[0] = 3;
        chip8.machine.v[1] = 10;
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 249);
        assert_eq!(chip8.machine.v[0xF], 0);
    }

    #[test]
    fn reverse_sub_and_shifts() {
        let mut chip8 = chip8_with(&[0x8017, 0x8206, 0x830E]);
        chip8.machine.v[0] = 3;
        chip8.machine.v[1] = 10;
        chip8.machine.v[2] = 0b0000_0101;
        chip8.machine.v[3] = 0b1000_0001;

        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 7);
        assert_eq!(chip8.machine.v[0xF], 1);

        chip8.step(None);
        assert_eq!(chip8.machine.v[2], 0b0000_0010);
        assert_eq!(chip8.machine.v[0xF], 1);

        chip8.step(None);
        assert_eq!(chip8.machine.v[3], 0b0000_0010);
        assert_eq!(chip8.machine.v[0xF], 1);
    }

    #[test]
    fn reverse_sub_and_shift_left_clear_flag() {
        let mut chip8 = chip8_with(&[0x8017, 0x820E]);
        chip8.machine.v[0] = 10;
        chip8.machine.v[1] = 3;
        chip8.machine.v[2] = 0b0100_0001;
        chip8.machine.v[0xF] = 1;

        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 249);
        assert_eq!(chip8.machine.v[0xF], 0);

        chip8.machine.v[0xF] = 1;
        chip8.step(None);
        assert_eq!(chip8.machine.v[2], 0b1000_0010);
        assert_eq!(chip8.machine.v[0xF], 0);
    }

    #[test]
    fn shift_on_flag_register_shifts_the_flag() {
        let mut chip8 = chip8_with(&[0x8FF6, 0x8FFE]);
        chip8.machine.v[0xF] = 0b0000_0111;
        chip8.step(None);
        assert_eq!(chip8.machine.v[0xF], 0);

        chip8.machine.v[0xF] = 0b1000_0001;
        chip8.step(None);
        assert_eq!(chip8.machine.v[0xF], 0b0000_0010);
    }

    #[test]
    fn logic_ops_leave_flag_untouched() {
        let mut chip8 = chip8_with(&[0x8011, 0x8012, 0x8013]);
        chip8.machine.v[0] = 0b1100;
        chip8.machine.v[1] = 0b1010;
        chip8.machine.v[0xF] = 0x42;

        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 0b1110);
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 0b1010);
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 0);
        assert_eq!(chip8.machine.v[0xF], 0x42);
    }

    #[test]
    fn skips_advance_past_next_instruction() {
        let mut chip8 = chip8_with(&[0x3005, 0x0000, 0x4005, 0x5010, 0x0000, 0x9010]);
        chip8.machine.v[0] = 5;
        chip8.machine.v[1] = 5;

        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x204);
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x206);
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x20A);
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x20C);
    }

    #[test]
    fn call_then_return_restores_pc() {
        let mut chip8 = chip8_with(&[0x2300]);
        chip8.machine.memory.write(0x300, 0x00);
        chip8.machine.memory.write(0x301, 0xEE);

        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x300);
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x202);
        assert_eq!(chip8.machine.stack.pointer(), 0);
    }

    #[test]
    fn jump_with_offset_is_masked() {
        let mut chip8 = chip8_with(&[0xBFFF]);
        chip8.machine.v[0] = 0x03;
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x002);
    }

    #[test]
    fn random_is_masked_by_immediate() {
        let mut chip8 = chip8_with(&[0xC30F, 0xC400]);
        run(&mut chip8, 2);
        assert_eq!(chip8.machine.v[3] & 0xF0, 0);
        assert_eq!(chip8.machine.v[4], 0);
    }

    #[test]
    fn add_to_index_wraps_and_flags() {
        let mut chip8 = chip8_with(&[0xAFFE, 0xF01E, 0xA100, 0xF01E]);
        chip8.machine.v[0] = 4;

        run(&mut chip8, 2);
        assert_eq!(chip8.machine.i, 0x002);
        assert_eq!(chip8.machine.v[0xF], 1);

        run(&mut chip8, 2);
        assert_eq!(chip8.machine.i, 0x104);
        assert_eq!(chip8.machine.v[0xF], 0);
    }

    #[test]
    fn font_char_points_into_font_table() {
        let mut chip8 = chip8_with(&[0xF029]);
        chip8.machine.v[0] = 0x1A;
        chip8.step(None);
        assert_eq!(chip8.machine.i, FONT_START_ADDRESS as u16 + 0xA);
    }

    #[test]
    fn bcd_writes_three_digits() {
        let mut chip8 = chip8_with(&[0xA300, 0xF533]);
        chip8.machine.v[5] = 255;
        run(&mut chip8, 2);
        assert_eq!(chip8.machine.memory.clipped(0x300, 3), &[2, 5, 5]);
    }

    #[test]
    fn bcd_wraps_digit_addresses() {
        let mut chip8 = chip8_with(&[0xAFFF, 0xF033]);
        chip8.machine.v[0] = 107;
        run(&mut chip8, 2);
        assert_eq!(chip8.machine.memory.read(0xFFF), 1);
        assert_eq!(chip8.machine.memory.read(0x000), 0);
        assert_eq!(chip8.machine.memory.read(0x001), 7);
    }

    #[test]
    fn store_and_load_registers() {
        let mut chip8 = chip8_with(&[0xA400, 0xF255, 0xF365]);
        chip8.machine.v[..4].copy_from_slice(&[1, 2, 3, 4]);

        run(&mut chip8, 2);
        assert_eq!(chip8.machine.memory.clipped(0x400, 4), &[1, 2, 3, 0]);
        assert_eq!(chip8.machine.i, 0x400);

        chip8.machine.v = [9; 16];
        chip8.step(None);
        assert_eq!(&chip8.machine.v[..5], &[1, 2, 3, 0, 9]);
    }

    #[test]
    fn store_registers_is_clipped_at_end_of_memory() {
        let mut chip8 = chip8_with(&[0xAFFE, 0xFF55, 0xFF65]);
        chip8.machine.v = [7; 16];

        run(&mut chip8, 2);
        assert_eq!(chip8.machine.memory.read(0xFFE), 7);
        assert_eq!(chip8.machine.memory.read(0xFFF), 7);
        assert_eq!(chip8.machine.memory.read(0x000), 0);

        chip8.machine.v = [0; 16];
        chip8.step(None);
        assert_eq!(&chip8.machine.v[..3], &[7, 7, 0]);
    }

    #[test]
    fn timers_copy_to_and_from_registers() {
        let mut chip8 = chip8_with(&[0xF015, 0xF118, 0xF207]);
        chip8.machine.v[0] = 30;
        chip8.machine.v[1] = 4;

        run(&mut chip8, 2);
        assert_eq!(chip8.machine.delay_timer, 30);
        assert_eq!(chip8.sound_timer(), 4);
        assert!(chip8.should_beep());

        chip8.tick_timers();
        chip8.step(None);
        assert_eq!(chip8.machine.v[2], 29);
    }

    #[test]
    fn timers_saturate_at_zero() {
        let mut chip8 = chip8_with(&[0x0000]);
        chip8.machine.sound_timer = 1;
        chip8.tick_timers();
        chip8.tick_timers();
        assert_eq!(chip8.machine.delay_timer, 0);
        assert_eq!(chip8.sound_timer(), 0);
        assert!(!chip8.should_beep());
    }

    #[test]
    fn key_skips_follow_keypad() {
        let mut chip8 = chip8_with(&[0xE09E, 0x0000, 0xE0A1, 0xE19E]);
        chip8.machine.v[0] = 5;
        chip8.machine.v[1] = 0x25;
        chip8.set_key(u4::new(5), true);

        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x204);
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x206);
        // Key values past 0xF are never held
        chip8.step(None);
        assert_eq!(chip8.machine.pc, 0x208);
    }

    #[test]
    fn await_key_rewinds_until_a_key_is_held() {
        let mut chip8 = chip8_with(&[0xF30A]);

        assert_eq!(chip8.step(None), StepStatus::AwaitingInput);
        assert_eq!(chip8.machine.pc, 0x200);
        assert_eq!(chip8.step(None), StepStatus::AwaitingInput);
        assert_eq!(chip8.machine.pc, 0x200);

        chip8.set_key(u4::new(5), true);
        assert_eq!(chip8.step(None), StepStatus::Progressed);
        assert_eq!(chip8.machine.v[3], 5);
        assert_eq!(chip8.machine.pc, 0x202);
    }

    #[test]
    fn await_key_picks_highest_held_key() {
        let mut chip8 = chip8_with(&[0xF00A]);
        chip8.set_key(u4::new(2), true);
        chip8.set_key(u4::new(0xC), true);
        chip8.step(None);
        assert_eq!(chip8.machine.v[0], 0xC);
    }

    #[test]
    fn unknown_opcode_has_no_effect() {
        let mut chip8 = chip8_with(&[0xF0FF]);
        chip8.machine.v[0] = 3;

        assert_eq!(
            chip8.step(None),
            StepStatus::Unrecognized { opcode: 0xF0FF }
        );
        assert_eq!(chip8.machine.pc, 0x202);
        assert_eq!(chip8.machine.v[0], 3);
        assert_eq!(chip8.machine.i, 0);
    }

    #[test]
    fn draw_font_glyph() {
        // Draw digit 0 at (0, 0)
        let mut chip8 = chip8_with(&[0xF029, 0xD015]);
        run(&mut chip8, 2);

        let display = chip8.display();
        assert_eq!(&display[0][..5], &[true, true, true, true, false]);
        assert_eq!(&display[1][..5], &[true, false, false, true, false]);
        assert_eq!(chip8.machine.v[0xF], 0);
    }

    #[test]
    fn draw_sets_collision_flag() {
        let mut chip8 = chip8_with(&[0xD011, 0xD011]);
        chip8.machine.i = 0x300;
        chip8.machine.memory.write(0x300, 0x80);

        chip8.step(None);
        assert_eq!(chip8.machine.v[0xF], 0);
        assert!(chip8.get_display_pixel(0, 0));

        chip8.step(None);
        assert_eq!(chip8.machine.v[0xF], 1);
        assert!(chip8.machine.display.is_clear());
    }

    #[test]
    fn draw_clips_at_right_edge() {
        let mut chip8 = chip8_with(&[0xD011]);
        chip8.machine.v[0] = 60;
        chip8.machine.i = 0x300;
        chip8.machine.memory.write(0x300, 0xFF);

        chip8.step(None);
        let display = chip8.display();
        assert!(display[0][60..].iter().all(|&p| p));
        assert!(display[0][..60].iter().all(|&p| !p));
    }

    #[test]
    fn draw_clips_at_bottom_edge() {
        let mut chip8 = chip8_with(&[0xD015]);
        chip8.machine.v[1] = 30;
        chip8.machine.i = 0x300;
        for row in 0..5 {
            chip8.machine.memory.write(0x300 + row, 0x80);
        }

        chip8.step(None);
        let rows = chip8.machine.display.rows();
        assert_eq!(rows[30], 1);
        assert_eq!(rows[31], 1);
        assert!(rows[..30].iter().all(|&r| r == 0));
    }

    #[test]
    fn draw_wraps_start_position() {
        let mut chip8 = chip8_with(&[0xD011]);
        chip8.machine.v[0] = 64 + 3;
        chip8.machine.v[1] = 32 + 2;
        chip8.machine.i = 0x300;
        chip8.machine.memory.write(0x300, 0x80);

        chip8.step(None);
        assert!(chip8.get_display_pixel(3, 2));
    }

    #[test]
    fn draw_reads_coordinates_after_clearing_flag() {
        let mut chip8 = chip8_with(&[0xDF01]);
        chip8.machine.v[0xF] = 10;
        chip8.machine.i = 0x300;
        chip8.machine.memory.write(0x300, 0x80);

        chip8.step(None);
        assert!(chip8.get_display_pixel(0, 0));
        assert!(!chip8.get_display_pixel(10, 0));
    }

    #[test]
    fn clear_display() {
        let mut chip8 = chip8_with(&[0xF029, 0xD015, 0x00E0]);
        run(&mut chip8, 2);
        assert!(!chip8.machine.display.is_clear());
        chip8.step(None);
        assert!(chip8.machine.display.is_clear());
    }

    proptest! {
        #[test]
        fn add_matches_wrapping_semantics(a in any::<u8>(), b in any::<u8>()) {
            let mut chip8 = chip8_with(&[0x8124]);
            chip8.machine.v[1] = a;
            chip8.machine.v[2] = b;
            chip8.step(None);

            prop_assert_eq!(chip8.machine.v[1], a.wrapping_add(b));
            prop_assert_eq!(chip8.machine.v[0xF], u8::from(u16::from(a) + u16::from(b) > 255));
        }

        #[test]
        fn sub_flag_marks_result_below_operand(a in any::<u8>(), b in any::<u8>()) {
            let mut chip8 = chip8_with(&[0x8125]);
            chip8.machine.v[1] = a;
            chip8.machine.v[2] = b;
            chip8.step(None);

            let result = a.wrapping_sub(b);
            prop_assert_eq!(chip8.machine.v[1], result);
            prop_assert_eq!(chip8.machine.v[0xF], u8::from(result < a));
        }

        #[test]
        fn drawing_twice_restores_display(
            x in any::<u8>(),
            y in any::<u8>(),
            n in 1u8..=15,
            sprite in proptest::collection::vec(any::<u8>(), 15),
            rows in proptest::collection::vec(any::<u64>(), 32),
        ) {
            let draw = 0xD010 | u16::from(n);
            let mut chip8 = chip8_with(&[draw, draw]);
            chip8.machine.v[0] = x;
            chip8.machine.v[1] = y;
            chip8.machine.i = 0x300;
            for (offset, byte) in sprite.iter().enumerate() {
                chip8.machine.memory.write(0x300 + offset as u16, *byte);
            }
            for (y, row) in rows.iter().enumerate() {
                for x in 0..64 {
                    if row & (1u64 << x) != 0 {
                        chip8.machine.display.blit_row(x, y, 0x80);
                    }
                }
            }
            let before = chip8.machine.display.clone();

            chip8.step(None);
            chip8.step(None);

            prop_assert!(chip8.machine.display == before);
        }
    }
}
