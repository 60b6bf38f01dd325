//! Versioned save states. Layout: the magic `"FBSS"`, a LE u16 version,
//! then fixed-order little-endian subsystem blocks (CPU, WRAM, VRAM, OAM,
//! HRAM, I/O, PPU counters, APU, timer, serial, joypad, bus engines, MBC
//! state with its RTC shadow, cartridge RAM).
//!
//! Restores are crash-safe: the current state is snapshotted first and
//! re-applied if the incoming stream turns out to be truncated or mismatched.

use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::Memory;
use crate::hardware::ppu::palette::MonochromePalette;
use crate::hardware::ppu::register_flags::{LcdControl, LcdStatus};
use crate::util::{read_u8, read_u16, write_u8, write_u16};
use std::io::{self, Read, Write};
use thiserror::Error;

pub const SAVE_STATE_MAGIC: &[u8; 4] = b"FBSS";
pub const SAVE_STATE_VERSION: u16 = 1;

/// Why a save state could not be restored. The emulator's state is unchanged
/// after any of these.
#[derive(Debug, Error)]
pub enum RestoreError {
    #[error("Save state header is not recognized")]
    BadMagic,
    #[error("Unsupported save state version: {0}")]
    UnsupportedVersion(u16),
    #[error("Save state does not fit the loaded cartridge: {0}")]
    CartridgeMismatch(String),
    #[error("Save state is truncated or unreadable: {0}")]
    Stream(#[from] io::Error),
}

pub(crate) fn write_snapshot(cpu: &mut Cpu<Memory>, writer: &mut dyn Write) -> io::Result<()> {
    writer.write_all(SAVE_STATE_MAGIC)?;
    write_u16(writer, SAVE_STATE_VERSION)?;

    cpu.save_state(writer)?;

    let memory = &mut cpu.mmu;
    writer.write_all(memory.wram.raw())?;
    writer.write_all(&memory.ppu.vram)?;
    writer.write_all(&memory.ppu.oam)?;
    writer.write_all(memory.hram.raw())?;
    writer.write_all(&memory.io_registers)?;
    write_u8(writer, memory.interrupts.interrupt_flag.bits())?;
    write_u8(writer, memory.interrupts.interrupt_enable.bits())?;
    write_u8(writer, memory.boot_rom_finished() as u8)?;
    write_u8(writer, memory.model.is_cgb() as u8)?;

    write_ppu_block(memory, writer)?;
    memory.apu.save_state(writer)?;
    memory.timer.save_state(writer)?;
    memory.serial.save_state(writer)?;
    memory.joypad.save_state(writer)?;
    write_bus_block(memory, writer)?;

    memory.cartridge.mbc_mut().serialize(writer)?;
    writer.write_all(memory.cartridge.ram())
}

/// Restores `cpu` from `reader`, rolling back to the pre-call state when the
/// stream is bad.
pub(crate) fn read_snapshot(cpu: &mut Cpu<Memory>, reader: &mut dyn Read) -> Result<(), RestoreError> {
    let mut header = [0u8; 4];
    reader.read_exact(&mut header)?;
    if &header != SAVE_STATE_MAGIC {
        return Err(RestoreError::BadMagic);
    }
    let version = read_u16(reader)?;
    if version != SAVE_STATE_VERSION {
        return Err(RestoreError::UnsupportedVersion(version));
    }

    let mut backup = Vec::new();
    write_snapshot(cpu, &mut backup)
        .unwrap_or_else(|err| panic!("In-memory snapshot can not fail: {}", err));

    match apply_snapshot(cpu, reader) {
        Ok(()) => Ok(()),
        Err(error) => {
            // Skip the backup's own header, then roll back.
            let mut cursor = &backup[6..];
            apply_snapshot(cpu, &mut cursor)
                .unwrap_or_else(|err| panic!("Rolling back to a known-good state failed: {}", err));
            Err(error)
        }
    }
}

fn apply_snapshot(cpu: &mut Cpu<Memory>, reader: &mut dyn Read) -> Result<(), RestoreError> {
    cpu.load_state(reader)?;

    let memory = &mut cpu.mmu;
    reader.read_exact(memory.wram.raw_mut())?;
    reader.read_exact(&mut memory.ppu.vram)?;
    reader.read_exact(&mut memory.ppu.oam)?;
    reader.read_exact(memory.hram.raw_mut())?;
    reader.read_exact(&mut memory.io_registers)?;
    memory.interrupts.overwrite_flag(read_u8(reader)?);
    memory.interrupts.overwrite_enable(read_u8(reader)?);
    let boot_finished = read_u8(reader)? != 0;
    let was_cgb = read_u8(reader)? != 0;
    if was_cgb != memory.model.is_cgb() {
        return Err(RestoreError::CartridgeMismatch(
            "console model differs from the snapshot".into(),
        ));
    }
    memory.set_boot_rom_finished(boot_finished);

    read_ppu_block(memory, reader)?;
    memory.apu.load_state(reader)?;
    memory.timer.load_state(reader)?;
    memory.serial.load_state(reader)?;
    memory.joypad.load_state(reader)?;
    read_bus_block(memory, reader)?;

    memory
        .cartridge
        .mbc_mut()
        .deserialize(reader)
        .map_err(|err| match err.kind() {
            io::ErrorKind::InvalidData => RestoreError::CartridgeMismatch(err.to_string()),
            _ => RestoreError::Stream(err),
        })?;
    reader.read_exact(memory.cartridge.ram_mut())?;
    Ok(())
}

fn write_ppu_block(memory: &Memory, writer: &mut dyn Write) -> io::Result<()> {
    let ppu = &memory.ppu;
    write_u8(writer, ppu.lcd_control.bits())?;
    write_u8(writer, ppu.lcd_status.bits())?;
    write_u8(writer, ppu.current_y)?;
    write_u8(writer, ppu.compare_line)?;
    write_u8(writer, ppu.scroll_x)?;
    write_u8(writer, ppu.scroll_y)?;
    write_u8(writer, ppu.window_x)?;
    write_u8(writer, ppu.window_y)?;
    write_u8(writer, ppu.window_counter)?;
    write_u8(writer, ppu.bg_palette.bits())?;
    write_u8(writer, ppu.obj_palette_0.bits())?;
    write_u8(writer, ppu.obj_palette_1.bits())?;
    writer.write_all(ppu.cgb_bg_palette.raw())?;
    write_u8(writer, ppu.cgb_bg_palette.read_index())?;
    writer.write_all(ppu.cgb_obj_palette.raw())?;
    write_u8(writer, ppu.cgb_obj_palette.read_index())?;
    write_u8(writer, ppu.vram_bank)?;
    write_u8(writer, ppu.oam_priority_mode as u8)?;
    write_u16(writer, ppu.scanline_dot)?;
    write_u8(writer, ppu.stat_line as u8)?;
    write_u8(writer, ppu.oam_dma_running as u8)
}

fn read_ppu_block(memory: &mut Memory, reader: &mut dyn Read) -> io::Result<()> {
    let ppu = &mut memory.ppu;
    ppu.lcd_control = LcdControl::from_bits_truncate(read_u8(reader)?);
    ppu.lcd_status = LcdStatus::from_bits_truncate(read_u8(reader)?);
    ppu.current_y = read_u8(reader)?;
    ppu.compare_line = read_u8(reader)?;
    ppu.scroll_x = read_u8(reader)?;
    ppu.scroll_y = read_u8(reader)?;
    ppu.window_x = read_u8(reader)?;
    ppu.window_y = read_u8(reader)?;
    ppu.window_counter = read_u8(reader)?;
    ppu.bg_palette = MonochromePalette::from(read_u8(reader)?);
    ppu.obj_palette_0 = MonochromePalette::from(read_u8(reader)?);
    ppu.obj_palette_1 = MonochromePalette::from(read_u8(reader)?);
    reader.read_exact(ppu.cgb_bg_palette.raw_mut())?;
    let index = read_u8(reader)?;
    ppu.cgb_bg_palette.write_index(index);
    reader.read_exact(ppu.cgb_obj_palette.raw_mut())?;
    let index = read_u8(reader)?;
    ppu.cgb_obj_palette.write_index(index);
    ppu.vram_bank = read_u8(reader)? & 0x1;
    ppu.oam_priority_mode = read_u8(reader)? != 0;
    ppu.scanline_dot = read_u16(reader)?;
    ppu.stat_line = read_u8(reader)? != 0;
    ppu.oam_dma_running = read_u8(reader)? != 0;
    // The candidate list is derived state; rebuild it for the restored line.
    ppu.collect_sprite_candidates();
    Ok(())
}

fn write_bus_block(memory: &Memory, writer: &mut dyn Write) -> io::Result<()> {
    write_u8(writer, memory.oam_dma.register)?;
    write_u8(writer, memory.oam_dma.active as u8)?;
    write_u8(writer, memory.oam_dma.start_delay)?;
    write_u8(writer, memory.oam_dma.progress)?;
    write_u8(writer, memory.speed.double_speed as u8)?;
    write_u8(writer, memory.speed.prepared as u8)?;
    write_u16(writer, memory.hdma.source)?;
    write_u16(writer, memory.hdma.destination)?;
    write_u8(writer, memory.hdma.blocks_remaining)?;
    write_u8(writer, memory.hdma.hblank_active as u8)?;
    write_u8(writer, memory.wram.read_bank_select())?;
    write_u8(writer, memory.ppu.get_vram_bank())
}

fn read_bus_block(memory: &mut Memory, reader: &mut dyn Read) -> io::Result<()> {
    memory.oam_dma.register = read_u8(reader)?;
    memory.oam_dma.active = read_u8(reader)? != 0;
    memory.oam_dma.start_delay = read_u8(reader)?;
    memory.oam_dma.progress = read_u8(reader)?;
    memory.speed.double_speed = read_u8(reader)? != 0;
    memory.speed.prepared = read_u8(reader)? != 0;
    memory.hdma.source = read_u16(reader)?;
    memory.hdma.destination = read_u16(reader)?;
    memory.hdma.blocks_remaining = read_u8(reader)?;
    memory.hdma.hblank_active = read_u8(reader)? != 0;
    let wram_bank = read_u8(reader)?;
    memory.wram.write_bank_select(wram_bank);
    let vram_bank = read_u8(reader)?;
    memory.ppu.set_vram_bank(vram_bank);
    Ok(())
}
