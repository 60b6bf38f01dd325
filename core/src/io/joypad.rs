//! P1 (0xFF00) button matrix. The host side is a polled source; any 1→0
//! transition on the low nibble raises the joypad interrupt.

use crate::controllers::JoypadSource;
use crate::io::interrupts::InterruptFlags;
use bitflags::*;

pub const JOYPAD_REGISTER: u16 = 0xFF00;

#[derive(Debug, Copy, Clone, PartialOrd, PartialEq)]
pub enum InputKey {
    Start,
    Select,
    A,
    B,
    Up,
    Down,
    Left,
    Right,
}

impl InputKey {
    pub fn iter() -> impl Iterator<Item = InputKey> {
        use InputKey::*;
        [Start, Select, A, B, Up, Down, Left, Right].iter().copied()
    }

    fn matrix_bit(self) -> JoypadFlags {
        match self {
            InputKey::Start | InputKey::Down => JoypadFlags::DOWN_START,
            InputKey::Select | InputKey::Up => JoypadFlags::UP_SELECT,
            InputKey::B | InputKey::Left => JoypadFlags::LEFT_B,
            InputKey::A | InputKey::Right => JoypadFlags::RIGHT_A,
        }
    }

    fn is_direction(self) -> bool {
        matches!(self, InputKey::Up | InputKey::Down | InputKey::Left | InputKey::Right)
    }
}

bitflags! {
    #[derive(Default)]
    struct JoypadFlags: u8 {
        const RIGHT_A        = 0b0000_0001;
        const LEFT_B         = 0b0000_0010;
        const UP_SELECT      = 0b0000_0100;
        const DOWN_START     = 0b0000_1000;
        const DIRECTION_KEYS = 0b0001_0000;
        const BUTTON_KEYS    = 0b0010_0000;
    }
}

#[derive(Debug, Default, Clone)]
pub struct JoyPad {
    pressed_buttons: JoypadFlags,
    pressed_directions: JoypadFlags,
    /// Row-select bits as written by the guest, stored active-high.
    selected_rows: JoypadFlags,
}

impl JoyPad {
    /// P1 reads are active low: selected rows and pressed keys read as 0.
    pub fn read_register(&self) -> u8 {
        let mut output = self.selected_rows;
        if self.selected_rows.contains(JoypadFlags::BUTTON_KEYS) {
            output.insert(self.pressed_buttons);
        }
        if self.selected_rows.contains(JoypadFlags::DIRECTION_KEYS) {
            output.insert(self.pressed_directions);
        }
        !output.bits()
    }

    /// Only bits 5 and 4 are writable; the low nibble is an output.
    pub fn write_register(&mut self, value: u8) {
        let rows = JoypadFlags::from_bits_truncate(!value) & (JoypadFlags::BUTTON_KEYS | JoypadFlags::DIRECTION_KEYS);
        self.selected_rows = rows;
    }

    /// Re-reads the host joypad and returns the joypad interrupt if any
    /// selected output line went from released to pressed.
    pub fn poll(&mut self, source: &mut dyn JoypadSource) -> Option<InterruptFlags> {
        let old_lines = self.read_register() & 0x0F;

        self.pressed_buttons = JoypadFlags::empty();
        self.pressed_directions = JoypadFlags::empty();
        for key in InputKey::iter() {
            if source.is_pressed(key) {
                if key.is_direction() {
                    self.pressed_directions.insert(key.matrix_bit());
                } else {
                    self.pressed_buttons.insert(key.matrix_bit());
                }
            }
        }

        let new_lines = self.read_register() & 0x0F;
        if old_lines & !new_lines != 0 {
            Some(InterruptFlags::JOYPAD)
        } else {
            None
        }
    }

    /// Only the guest-visible row selection is part of a save state; pressed
    /// keys are re-polled from the host.
    pub fn save_state(&self, writer: &mut dyn std::io::Write) -> std::io::Result<()> {
        crate::util::write_u8(writer, self.selected_rows.bits())
    }

    pub fn load_state(&mut self, reader: &mut dyn std::io::Read) -> std::io::Result<()> {
        self.selected_rows = JoypadFlags::from_bits_truncate(crate::util::read_u8(reader)?);
        self.pressed_buttons = JoypadFlags::empty();
        self.pressed_directions = JoypadFlags::empty();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedPad(Vec<InputKey>);

    impl JoypadSource for FixedPad {
        fn is_pressed(&mut self, key: InputKey) -> bool {
            self.0.contains(&key)
        }
    }

    #[test]
    fn unselected_rows_read_released() {
        let mut joypad = JoyPad::default();
        joypad.write_register(0x30);
        let mut pad = FixedPad(vec![InputKey::A]);
        joypad.poll(&mut pad);

        assert_eq!(joypad.read_register() & 0x0F, 0x0F);
    }

    #[test]
    fn selected_button_row_reads_pressed_key_low() {
        let mut joypad = JoyPad::default();
        // Bit 5 low selects the action row.
        joypad.write_register(0x10);
        let mut pad = FixedPad(vec![InputKey::A]);
        joypad.poll(&mut pad);

        assert_eq!(joypad.read_register() & 0x0F, 0x0E);
    }

    #[test]
    fn new_press_on_selected_row_raises_interrupt() {
        let mut joypad = JoyPad::default();
        joypad.write_register(0x20);

        let mut released = FixedPad(vec![]);
        assert_eq!(joypad.poll(&mut released), None);

        let mut pressed = FixedPad(vec![InputKey::Down]);
        assert_eq!(joypad.poll(&mut pressed), Some(InterruptFlags::JOYPAD));
        // Holding the key is not a new transition.
        assert_eq!(joypad.poll(&mut pressed), None);
    }
}
