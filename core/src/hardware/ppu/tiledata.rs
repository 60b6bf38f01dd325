//! Tile data/map layout constants and the OAM entry view.
//!
//! Tiles are indexed with an 8-bit value under two addressing schemes: the
//! "8000 method" (unsigned, blocks 0 and 1) and the "8800 method" (signed
//! from 0x9000, blocks 2 and 1). Sprites always use the 8000 method; the
//! background and window pick per LCDC bit 4.

use crate::hardware::ppu::register_flags::AttributeFlags;

pub const TILE_BLOCK_0_START: u16 = 0x8000;
pub const TILE_BLOCK_1_START: u16 = 0x8800;
pub const TILE_BLOCK_2_START: u16 = 0x9000;

pub const TILEMAP_9800_START: u16 = 0x9800;
pub const TILEMAP_9C00_START: u16 = 0x9C00;
/// Both maps are 32x32 bytes.
pub const TILEMAP_SIZE: u16 = 0x400;

/// Bytes per 8x8 tile (8 lines of 2 bitplane bytes).
pub const TILE_BYTES: usize = 16;

pub const OAM_ENTRY_COUNT: usize = 40;
pub const OAM_ENTRY_BYTES: usize = 4;
/// At most this many sprites are considered per scanline, in OAM order.
pub const SPRITES_PER_LINE: usize = 10;

/// One OAM entry, decoded from its four bytes.
#[derive(Debug, Default, Copy, Clone)]
pub struct SpriteAttribute {
    pub y_pos: u8,
    pub x_pos: u8,
    pub tile_number: u8,
    pub flags: AttributeFlags,
    /// Index in OAM, the CGB priority key.
    pub oam_index: u8,
}

impl SpriteAttribute {
    pub fn from_oam(oam: &[u8], index: usize) -> Self {
        let base = index * OAM_ENTRY_BYTES;
        SpriteAttribute {
            y_pos: oam[base],
            x_pos: oam[base + 1],
            tile_number: oam[base + 2],
            flags: AttributeFlags::from_bits_truncate(oam[base + 3]),
            oam_index: index as u8,
        }
    }

    /// Whether this sprite's vertical span covers `line` for the current
    /// sprite height (8 or 16).
    pub fn covers_line(&self, line: u8, height: u8) -> bool {
        let top = self.y_pos as i16 - 16;
        (line as i16) >= top && (line as i16) < top + height as i16
    }
}
