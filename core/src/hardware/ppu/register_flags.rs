use crate::hardware::ppu::Mode;
use bitflags::*;

bitflags! {
    /// FF40. Every bit can be flipped mid-frame; the PPU never locks LCDC.
    #[derive(Default)]
    pub struct LcdControl: u8 {
        /// DMG: background/window display. CGB: master priority; when clear,
        /// sprites win over background regardless of the per-tile flags.
        const BG_WINDOW_PRIORITY = 0b0000_0001;
        const SPRITE_DISPLAY_ENABLE = 0b0000_0010;
        /// 0: 8x8 sprites, 1: 8x16.
        const SPRITE_SIZE = 0b0000_0100;
        /// 0: background map at 0x9800, 1: 0x9C00.
        const BG_TILE_MAP_SELECT = 0b0000_1000;
        /// 0: signed tile addressing from 0x9000, 1: unsigned from 0x8000.
        const BG_WINDOW_TILE_SELECT = 0b0001_0000;
        const WINDOW_DISPLAY = 0b0010_0000;
        /// 0: window map at 0x9800, 1: 0x9C00.
        const WINDOW_MAP_SELECT = 0b0100_0000;
        const LCD_DISPLAY = 0b1000_0000;
    }
}

bitflags! {
    /// FF41. The low three bits are outputs; bit 7 always reads 1.
    #[derive(Default)]
    pub struct LcdStatus: u8 {
        const MODE_FLAG_0 = 0b0000_0001;
        const MODE_FLAG_1 = 0b0000_0010;
        const COINCIDENCE_FLAG = 0b0000_0100;
        const MODE_0_H_INTERRUPT = 0b0000_1000;
        const MODE_1_V_INTERRUPT = 0b0001_0000;
        const MODE_2_OAM_INTERRUPT = 0b0010_0000;
        const COINCIDENCE_INTERRUPT = 0b0100_0000;
    }
}

bitflags! {
    /// OAM byte 3 / CGB background map attributes.
    #[derive(Default)]
    pub struct AttributeFlags: u8 {
        /// CGB palette 0-7.
        const PALETTE_NUMBER_CGB = 0b0000_0111;
        /// CGB tile data bank.
        const TILE_VRAM_BANK = 0b0000_1000;
        /// DMG: 0 = OBP0, 1 = OBP1.
        const PALETTE_NUMBER = 0b0001_0000;
        const X_FLIP = 0b0010_0000;
        const Y_FLIP = 0b0100_0000;
        /// Sprite behind background colors 1-3 (or, on background map
        /// attributes, background over sprites).
        const OBJ_TO_BG_PRIORITY = 0b1000_0000;
    }
}

impl AttributeFlags {
    pub fn cgb_palette_number(&self) -> usize {
        (self.bits() & 0x07) as usize
    }

    pub fn vram_bank(&self) -> usize {
        self.contains(AttributeFlags::TILE_VRAM_BANK) as usize
    }
}

impl LcdStatus {
    pub fn mode_flag(&self) -> Mode {
        match self.bits() & 0x3 {
            0 => Mode::HBlank,
            1 => Mode::VBlank,
            2 => Mode::OamSearch,
            _ => Mode::LcdTransfer,
        }
    }

    pub fn set_mode_flag(&mut self, mode: Mode) {
        *self = LcdStatus::from_bits_truncate((self.bits() & 0xFC) | mode as u8);
    }
}
