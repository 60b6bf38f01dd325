use std::io::{self, Read, Write};

use crate::controllers::{AudioSink, DisplaySink, JoypadSource, SerialLink};
use crate::hardware::cartridge::CartridgeError;
use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::Memory;
use crate::hardware::ppu::FRAMEBUFFER_SIZE;
use crate::state::{read_snapshot, write_snapshot, RestoreError};
use crate::EmulatorOptions;

/// Master clock of the original hardware in Hz.
pub const DMG_CLOCK_SPEED: u64 = 4_194_304;
/// Master clocks per full frame (154 lines of 456 dots).
pub const CYCLES_PER_FRAME: u64 = 70_224;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GameBoyModel {
    Dmg,
    Cgb,
}

impl GameBoyModel {
    pub fn is_dmg(self) -> bool {
        self == GameBoyModel::Dmg
    }

    pub fn is_cgb(self) -> bool {
        self == GameBoyModel::Cgb
    }
}

/// The whole machine. The CPU owns the bus, the bus owns everything else;
/// one [`tick`](Emulator::tick) runs the CPU to its next instruction boundary
/// with every other unit advancing in 4-dot lockstep inside it.
pub struct Emulator {
    cpu: Cpu<Memory>,
}

impl Emulator {
    pub fn new(rom: &[u8], options: EmulatorOptions) -> Result<Self, CartridgeError> {
        let memory = Memory::new(rom, options)?;
        let skip_boot_rom = memory.boot_rom_finished();
        let cgb = memory.model.is_cgb();

        let mut cpu = Cpu::new(memory);
        if skip_boot_rom {
            cpu.set_post_boot_state(cgb);
        }
        Ok(Emulator { cpu })
    }

    /// Executes the next CPU step. Returns `false` once the core is fatally
    /// stopped (an illegal opcode or a dead STOP).
    pub fn tick(&mut self) -> bool {
        self.cpu.step()
    }

    /// Runs until the PPU enters V-blank (or the core stops).
    pub fn run_until_frame(&mut self) {
        loop {
            if !self.tick() || self.cpu.mmu.take_vblank() {
                return;
            }
        }
    }

    /// Power cycle: every subsystem restarts, cartridge RAM survives.
    pub fn reset(&mut self) {
        self.cpu.mmu.reset();
        let cgb = self.cpu.mmu.model.is_cgb();
        let skip_boot_rom = self.cpu.mmu.boot_rom_finished();
        self.cpu.reset();
        if skip_boot_rom {
            self.cpu.set_post_boot_state(cgb);
        }
    }

    pub fn model(&self) -> GameBoyModel {
        self.cpu.mmu.model
    }

    pub fn cycles_performed(&self) -> u64 {
        self.cpu.cycles_performed
    }

    /// The completed frame, for hosts that pull instead of taking scanlines.
    pub fn frame_buffer(&self) -> &[u16; FRAMEBUFFER_SIZE] {
        self.cpu.mmu.ppu.frame_buffer()
    }

    pub fn game_title(&self) -> &str {
        &self.cpu.mmu.cartridge.header().title
    }

    pub fn set_display_sink(&mut self, sink: Box<dyn DisplaySink>) {
        self.cpu.mmu.controllers.display = Some(sink);
    }

    pub fn set_audio_sink(&mut self, sink: Box<dyn AudioSink>) {
        self.cpu.mmu.controllers.audio = Some(sink);
    }

    pub fn set_joypad_source(&mut self, source: Box<dyn JoypadSource>) {
        self.cpu.mmu.controllers.joypad = Some(source);
    }

    pub fn set_serial_link(&mut self, link: Box<dyn SerialLink>) {
        self.cpu.mmu.controllers.serial = Some(link);
    }

    /// Serializes the full machine state. Call between `tick`s only.
    pub fn snapshot(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        write_snapshot(&mut self.cpu, writer)
    }

    /// Restores a state produced by [`snapshot`](Emulator::snapshot) for the
    /// same cartridge. On failure the current state is left unchanged.
    pub fn restore(&mut self, reader: &mut dyn Read) -> Result<(), RestoreError> {
        read_snapshot(&mut self.cpu, reader)
    }

    /// Writes battery-backed RAM (and the RTC tail where present). Writes
    /// nothing for cartridges without a battery.
    pub fn save_battery(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        self.cpu.mmu.cartridge.save_battery(writer)
    }

    pub fn load_battery(&mut self, reader: &mut dyn Read) -> Result<(), RestoreError> {
        self.cpu.mmu.cartridge.load_battery(reader).map_err(RestoreError::from)
    }

    pub fn has_battery(&self) -> bool {
        self.cpu.mmu.cartridge.has_battery()
    }
}

impl std::fmt::Debug for Emulator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Emulator {{ model: {:?}, title: {:?} }}", self.model(), self.game_title())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hardware::cartridge::tests::test_rom;
    use crate::EmulatorOptionsBuilder;
    use pretty_assertions::assert_eq;

    /// Headerful ROM that jumps from the entry point into a small loop:
    /// `LD HL, 0xC000; INC A; LD (HL), A; JR -4`.
    fn looping_rom() -> Vec<u8> {
        let mut rom = test_rom(0x00, 0x00, 0x00);
        rom[0x100..0x103].copy_from_slice(&[0xC3, 0x50, 0x01]); // JP 0x0150
        rom[0x150..0x157].copy_from_slice(&[0x21, 0x00, 0xC0, 0x3C, 0x77, 0x18, 0xFC]);
        rom
    }

    fn emulator_for(rom: &[u8]) -> Emulator {
        Emulator::new(rom, EmulatorOptionsBuilder::new().build()).unwrap()
    }

    #[test]
    fn boots_at_the_entry_point_with_post_boot_registers() {
        let emulator = emulator_for(&looping_rom());
        assert_eq!(emulator.cpu.registers.pc, 0x0100);
        assert_eq!(emulator.cpu.registers.af(), 0x01B0);
        assert_eq!(emulator.cpu.registers.sp, 0xFFFE);
    }

    #[test]
    fn the_program_loop_writes_through_the_bus() {
        let mut emulator = emulator_for(&looping_rom());
        for _ in 0..100 {
            emulator.tick();
        }
        let written = emulator.cpu.mmu.read_byte(0xC000);
        assert_eq!(written, emulator.cpu.registers.a);
        assert!(written > 0);
    }

    #[test]
    fn run_until_frame_stops_at_vblank() {
        let mut emulator = emulator_for(&looping_rom());
        emulator.run_until_frame();
        assert_eq!(emulator.cpu.mmu.ppu.get_ly(), 144);
    }

    #[test]
    fn snapshot_restore_round_trip_is_bit_identical() {
        let rom = looping_rom();
        let mut original = emulator_for(&rom);
        for _ in 0..1_000 {
            original.tick();
        }

        let mut state = Vec::new();
        original.snapshot(&mut state).unwrap();

        let mut replica = emulator_for(&rom);
        replica.restore(&mut state.as_slice()).unwrap();

        // Long enough that a full frame is redrawn on both sides.
        for _ in 0..20_000 {
            original.tick();
            replica.tick();
        }
        assert_eq!(original.cpu.registers, replica.cpu.registers);
        assert_eq!(original.cycles_performed(), replica.cycles_performed());
        assert_eq!(original.cpu.mmu.read_byte(0xC000), replica.cpu.mmu.read_byte(0xC000));
        assert_eq!(original.cpu.mmu.ppu.get_ly(), replica.cpu.mmu.ppu.get_ly());
        assert_eq!(&original.frame_buffer()[..], &replica.frame_buffer()[..]);
    }

    #[test]
    fn restore_failure_leaves_state_unchanged() {
        let mut emulator = emulator_for(&looping_rom());
        for _ in 0..500 {
            emulator.tick();
        }
        let pc_before = emulator.cpu.registers.pc;
        let cycles_before = emulator.cycles_performed();

        // Valid header, truncated body.
        let mut state = Vec::new();
        emulator.snapshot(&mut state).unwrap();
        state.truncate(state.len() / 2);

        assert!(emulator.restore(&mut state.as_slice()).is_err());
        assert_eq!(emulator.cpu.registers.pc, pc_before);
        assert_eq!(emulator.cycles_performed(), cycles_before);
    }

    #[test]
    fn garbage_header_is_rejected_up_front() {
        let mut emulator = emulator_for(&looping_rom());
        let result = emulator.restore(&mut b"NOPE".as_ref());
        assert!(matches!(result, Err(RestoreError::BadMagic)));
    }

    #[test]
    fn reset_restarts_execution_from_the_entry_point() {
        let mut emulator = emulator_for(&looping_rom());
        for _ in 0..1_000 {
            emulator.tick();
        }
        emulator.reset();
        assert_eq!(emulator.cpu.registers.pc, 0x0100);
        assert_eq!(emulator.cycles_performed(), 0);
        assert!(emulator.tick());
    }
}
