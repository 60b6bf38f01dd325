//! The 16-bit memory bus: region dispatch, the I/O register file, and the
//! per-M-cycle lockstep of every non-CPU unit.

use log::*;

use crate::controllers::Controllers;
use crate::emulator::GameBoyModel;
use crate::hardware::apu::{Apu, APU_MEM_END, APU_MEM_START, WAVE_SAMPLE_END, WAVE_SAMPLE_START};
use crate::hardware::cartridge::{Cartridge, CartridgeError};
use crate::hardware::mmu::cgb::{HdmaRegisters, HdmaRequest, SpeedSwitch};
use crate::hardware::mmu::dma::OamDma;
use crate::hardware::mmu::hram::Hram;
use crate::hardware::mmu::wram::Wram;
use crate::hardware::ppu::*;
use crate::io::bootrom::BootRom;
use crate::io::interrupts::Interrupts;
use crate::io::joypad::{JoyPad, JOYPAD_REGISTER};
use crate::io::serial::{Serial, SERIAL_CONTROL, SERIAL_DATA};
use crate::io::timer::{Timer, DIVIDER_REGISTER, TIMER_CONTROL, TIMER_COUNTER, TIMER_MODULO};
use crate::EmulatorOptions;

pub mod cgb;
pub mod dma;
pub mod hram;
pub mod wram;

pub const ROM_BANK_00_START: u16 = 0x0000;
pub const ROM_BANK_00_END: u16 = 0x3FFF;
pub const ROM_BANK_NN_START: u16 = 0x4000;
pub const ROM_BANK_NN_END: u16 = 0x7FFF;
pub const VRAM_START: u16 = 0x8000;
pub const VRAM_END: u16 = 0x9FFF;
pub const EXTERNAL_RAM_START: u16 = 0xA000;
pub const EXTERNAL_RAM_END: u16 = 0xBFFF;
pub const WRAM_BANK_00_START: u16 = 0xC000;
pub const WRAM_BANK_00_END: u16 = 0xCFFF;
pub const WRAM_BANK_NN_START: u16 = 0xD000;
pub const WRAM_BANK_NN_END: u16 = 0xDFFF;
pub const ECHO_RAM_START: u16 = 0xE000;
pub const ECHO_RAM_END: u16 = 0xFDFF;
pub const OAM_ATTRIBUTE_START: u16 = 0xFE00;
pub const OAM_ATTRIBUTE_END: u16 = 0xFE9F;
pub const NOT_USABLE_START: u16 = 0xFEA0;
pub const NOT_USABLE_END: u16 = 0xFEFF;
pub const IO_START: u16 = 0xFF00;
pub const IO_END: u16 = 0xFF7F;
pub const HRAM_START: u16 = 0xFF80;
pub const HRAM_END: u16 = 0xFFFE;

pub const INTERRUPTS_FLAG: u16 = 0xFF0F;
pub const INTERRUPTS_ENABLE: u16 = 0xFFFF;

/// One-way latch that unmaps the boot ROM.
pub const BOOT_ROM_DISABLE: u16 = 0xFF50;

pub const CGB_SPEED_SWITCH: u16 = 0xFF4D;
pub const CGB_HDMA_1: u16 = 0xFF51;
pub const CGB_HDMA_2: u16 = 0xFF52;
pub const CGB_HDMA_3: u16 = 0xFF53;
pub const CGB_HDMA_4: u16 = 0xFF54;
pub const CGB_HDMA_5: u16 = 0xFF55;
pub const CGB_WRAM_BANK: u16 = 0xFF70;

/// The value of any unmapped or disabled read.
pub const INVALID_READ: u8 = 0xFF;

/// The bus interface the CPU executes against. `do_m_cycle` advances every
/// non-CPU unit by one machine cycle; the CPU calls it once per bus
/// transaction, which keeps the whole system in 4-dot lockstep.
pub trait MemoryMapper {
    fn read_byte(&self, address: u16) -> u8;
    fn write_byte(&mut self, address: u16, value: u8);
    fn interrupts(&self) -> &Interrupts;
    fn interrupts_mut(&mut self) -> &mut Interrupts;
    fn do_m_cycle(&mut self);
    fn model(&self) -> GameBoyModel;
    /// STOP's CGB speed switch; returns whether a switch was armed and taken.
    fn try_speed_switch(&mut self) -> bool;
}

pub struct Memory {
    boot_rom: BootRom,
    pub cartridge: Cartridge,
    pub model: GameBoyModel,

    pub ppu: Ppu,
    pub apu: Apu,
    pub hram: Hram,
    pub wram: Wram,

    pub joypad: JoyPad,
    pub timer: Timer,
    pub serial: Serial,
    pub interrupts: Interrupts,
    pub oam_dma: OamDma,
    pub speed: SpeedSwitch,
    pub hdma: HdmaRegisters,

    pub controllers: Controllers,
    /// Miscellaneous I/O registers without modeled behavior.
    pub(crate) io_registers: [u8; 0x80],
    /// Set when the PPU reaches line 144; consumed by `Emulator`.
    vblank_seen: bool,
}

impl Memory {
    pub fn new(rom: &[u8], options: EmulatorOptions) -> Result<Self, CartridgeError> {
        let EmulatorOptions {
            boot_rom,
            saved_ram,
            model,
            time_source,
        } = options;

        let cartridge = Cartridge::new(rom, saved_ram, time_source)?;
        let boot_rom = BootRom::new(boot_rom);

        // Without a CGB-capable cartridge (and no boot ROM to decide
        // otherwise) the machine behaves as a DMG.
        let mut model = model;
        if model.is_cgb() && boot_rom.is_finished && !cartridge.header().cgb_flag {
            model = GameBoyModel::Dmg;
        }

        let mut result = Memory {
            boot_rom,
            cartridge,
            model,
            ppu: Ppu::new(),
            apu: Apu::new(),
            hram: Hram::new(),
            wram: Wram::new(),
            joypad: JoyPad::default(),
            timer: Timer::default(),
            serial: Serial::default(),
            interrupts: Interrupts::default(),
            oam_dma: OamDma::default(),
            speed: SpeedSwitch::default(),
            hdma: HdmaRegisters::default(),
            controllers: Controllers::default(),
            io_registers: [INVALID_READ; 0x80],
            vblank_seen: false,
        };
        // DIV as the boot ROM leaves it.
        if result.boot_rom.is_finished {
            result.timer.system_clock = 0xAB00;
        }
        Ok(result)
    }

    pub fn read_byte(&self, address: u16) -> u8 {
        match address {
            _ if self.boot_rom.covers(address) => self.boot_rom.read_byte(address),
            ROM_BANK_00_START..=ROM_BANK_00_END => self.cartridge.read_0000_3fff(address),
            ROM_BANK_NN_START..=ROM_BANK_NN_END => self.cartridge.read_4000_7fff(address),
            VRAM_START..=VRAM_END => self.ppu.read_vram(address),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.read_external_ram(address),
            WRAM_BANK_00_START..=WRAM_BANK_00_END => self.wram.read_bank_0(address),
            WRAM_BANK_NN_START..=WRAM_BANK_NN_END => self.wram.read_bank_n(address),
            ECHO_RAM_START..=ECHO_RAM_END => self.wram.read_echo_ram(address),
            OAM_ATTRIBUTE_START..=OAM_ATTRIBUTE_END => self.ppu.read_oam(address),
            NOT_USABLE_START..=NOT_USABLE_END => INVALID_READ,
            IO_START..=IO_END => self.read_io_byte(address),
            HRAM_START..=HRAM_END => self.hram.read_byte(address),
            INTERRUPTS_ENABLE => self.interrupts.read_enable(),
        }
    }

    pub fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            ROM_BANK_00_START..=ROM_BANK_NN_END => self.cartridge.write_byte(address, value),
            VRAM_START..=VRAM_END => self.ppu.write_vram(address, value),
            EXTERNAL_RAM_START..=EXTERNAL_RAM_END => self.cartridge.write_byte(address, value),
            WRAM_BANK_00_START..=WRAM_BANK_00_END => self.wram.write_bank_0(address, value),
            WRAM_BANK_NN_START..=WRAM_BANK_NN_END => self.wram.write_bank_n(address, value),
            ECHO_RAM_START..=ECHO_RAM_END => self.wram.write_echo_ram(address, value),
            OAM_ATTRIBUTE_START..=OAM_ATTRIBUTE_END => self.ppu.write_oam(address, value),
            NOT_USABLE_START..=NOT_USABLE_END => {
                trace!("Write to unusable memory: {:#06X}", address)
            }
            IO_START..=IO_END => self.write_io_byte(address, value),
            HRAM_START..=HRAM_END => self.hram.write_byte(address, value),
            INTERRUPTS_ENABLE => self.interrupts.overwrite_enable(value),
        }
    }

    fn read_io_byte(&self, address: u16) -> u8 {
        match address {
            JOYPAD_REGISTER => self.joypad.read_register(),
            SERIAL_DATA => self.serial.data,
            SERIAL_CONTROL => self.serial.read_control(),
            DIVIDER_REGISTER => self.timer.divider(),
            TIMER_COUNTER => self.timer.tima,
            TIMER_MODULO => self.timer.tma,
            TIMER_CONTROL => self.timer.control.to_bits(),
            INTERRUPTS_FLAG => self.interrupts.read_flag(),
            APU_MEM_START..=APU_MEM_END => self.apu.read_register(address),
            WAVE_SAMPLE_START..=WAVE_SAMPLE_END => self.apu.read_wave_sample(address),
            LCD_CONTROL_REGISTER => self.ppu.get_lcd_control(),
            LCD_STATUS_REGISTER => self.ppu.get_lcd_status(),
            SCY_REGISTER => self.ppu.scroll_y,
            SCX_REGISTER => self.ppu.scroll_x,
            LY_REGISTER => self.ppu.get_ly(),
            LYC_REGISTER => self.ppu.get_lyc(),
            DMA_TRANSFER => self.oam_dma.register,
            BG_PALETTE => self.ppu.bg_palette.bits(),
            OB_PALETTE_0 => self.ppu.obj_palette_0.bits(),
            OB_PALETTE_1 => self.ppu.obj_palette_1.bits(),
            WY_REGISTER => self.ppu.window_y,
            WX_REGISTER => self.ppu.window_x,
            BOOT_ROM_DISABLE => INVALID_READ,
            CGB_SPEED_SWITCH if self.model.is_cgb() => self.speed.read(),
            CGB_VRAM_BANK_REGISTER if self.model.is_cgb() => self.ppu.get_vram_bank(),
            CGB_HDMA_1..=CGB_HDMA_4 => INVALID_READ,
            CGB_HDMA_5 if self.model.is_cgb() => self.hdma.read_control(),
            CGB_BG_PALETTE_INDEX if self.model.is_cgb() => self.ppu.cgb_bg_palette.read_index(),
            CGB_BG_PALETTE_DATA if self.model.is_cgb() => self.ppu.cgb_bg_palette.read_data(),
            CGB_OBJ_PALETTE_INDEX if self.model.is_cgb() => self.ppu.cgb_obj_palette.read_index(),
            CGB_OBJ_PALETTE_DATA if self.model.is_cgb() => self.ppu.cgb_obj_palette.read_data(),
            CGB_OBJECT_PRIORITY_MODE if self.model.is_cgb() => self.ppu.get_object_priority(),
            CGB_WRAM_BANK if self.model.is_cgb() => self.wram.read_bank_select(),
            _ => self.io_registers[(address & 0x7F) as usize],
        }
    }

    fn write_io_byte(&mut self, address: u16, value: u8) {
        match address {
            JOYPAD_REGISTER => {
                self.joypad.write_register(value);
                self.poll_joypad();
            }
            SERIAL_DATA => self.serial.data = value,
            SERIAL_CONTROL => self.serial.write_control(value),
            DIVIDER_REGISTER => {
                // Resetting the counter can clock the APU sequencer too.
                let sequencer_bit = self.frame_sequencer_bit();
                self.timer.write_divider();
                if sequencer_bit {
                    self.apu.tick_frame_sequencer();
                }
            }
            TIMER_COUNTER => self.timer.write_tima(value),
            TIMER_MODULO => self.timer.write_tma(value),
            TIMER_CONTROL => self.timer.write_control(value),
            INTERRUPTS_FLAG => self.interrupts.overwrite_flag(value),
            APU_MEM_START..=APU_MEM_END => self.apu.write_register(address, value, self.model),
            WAVE_SAMPLE_START..=WAVE_SAMPLE_END => self.apu.write_wave_sample(address, value),
            LCD_CONTROL_REGISTER => self.ppu.set_lcd_control(value, &mut self.interrupts),
            LCD_STATUS_REGISTER => self.ppu.set_lcd_status(value, &mut self.interrupts),
            SCY_REGISTER => self.ppu.scroll_y = value,
            SCX_REGISTER => self.ppu.scroll_x = value,
            LY_REGISTER => trace!("Ignored write to the read-only LY register"),
            LYC_REGISTER => self.ppu.set_lyc(value, &mut self.interrupts),
            DMA_TRANSFER => self.oam_dma.start(value),
            BG_PALETTE => self.ppu.bg_palette = value.into(),
            OB_PALETTE_0 => self.ppu.obj_palette_0 = value.into(),
            OB_PALETTE_1 => self.ppu.obj_palette_1 = value.into(),
            WY_REGISTER => self.ppu.window_y = value,
            WX_REGISTER => self.ppu.window_x = value,
            BOOT_ROM_DISABLE if !self.boot_rom.is_finished => {
                self.boot_rom.is_finished = true;
                if !self.cartridge.header().cgb_flag {
                    self.model = GameBoyModel::Dmg;
                }
                info!("Boot ROM finished");
            }
            CGB_SPEED_SWITCH if self.model.is_cgb() => self.speed.write(value),
            CGB_VRAM_BANK_REGISTER if self.model.is_cgb() => self.ppu.set_vram_bank(value),
            CGB_HDMA_1 if self.model.is_cgb() => self.hdma.write_source_high(value),
            CGB_HDMA_2 if self.model.is_cgb() => self.hdma.write_source_low(value),
            CGB_HDMA_3 if self.model.is_cgb() => self.hdma.write_destination_high(value),
            CGB_HDMA_4 if self.model.is_cgb() => self.hdma.write_destination_low(value),
            CGB_HDMA_5 if self.model.is_cgb() => match self.hdma.write_control(value) {
                Some(HdmaRequest::General) => self.general_dma_with_stall(),
                Some(HdmaRequest::PerHblank) | None => {}
            },
            CGB_BG_PALETTE_INDEX if self.model.is_cgb() => self.ppu.cgb_bg_palette.write_index(value),
            CGB_BG_PALETTE_DATA if self.model.is_cgb() => self.ppu.cgb_bg_palette.write_data(value),
            CGB_OBJ_PALETTE_INDEX if self.model.is_cgb() => self.ppu.cgb_obj_palette.write_index(value),
            CGB_OBJ_PALETTE_DATA if self.model.is_cgb() => self.ppu.cgb_obj_palette.write_data(value),
            CGB_OBJECT_PRIORITY_MODE if self.model.is_cgb() => self.ppu.set_object_priority(value),
            CGB_WRAM_BANK if self.model.is_cgb() => self.wram.write_bank_select(value),
            _ => self.io_registers[(address & 0x7F) as usize] = value,
        }
    }

    /// GDMA copies everything immediately while the CPU stalls: 8 M-cycles
    /// per block at single speed, 16 at double.
    fn general_dma_with_stall(&mut self) {
        let blocks = self.hdma.blocks_remaining as u32;
        self.run_general_dma();
        let stall = blocks * if self.speed.double_speed { 16 } else { 8 };
        for _ in 0..stall {
            self.do_m_cycle();
        }
    }

    /// The divider bit whose falling edge clocks the APU frame sequencer at
    /// 512 Hz: bit 12 at single speed, bit 13 at double.
    fn frame_sequencer_bit(&self) -> bool {
        let bit = if self.speed.double_speed { 13 } else { 12 };
        self.timer.system_clock & (1 << bit) != 0
    }

    fn poll_joypad(&mut self) {
        if let Some(source) = self.controllers.joypad.as_deref_mut() {
            if let Some(flag) = self.joypad.poll(source) {
                self.interrupts.request(flag);
            }
        }
    }

    fn handle_ppu_events(&mut self, events: PpuEvents) {
        if let Some(line) = events.scanline_ready {
            if let Some(display) = self.controllers.display.as_deref_mut() {
                display.draw_scanline(line, &self.ppu.scanline_buffer);
            }
        }
        if events.entered_hblank && self.hdma.hblank_active {
            self.copy_hdma_block();
        }
        if events.entered_vblank {
            self.vblank_seen = true;
            if let Some(display) = self.controllers.display.as_deref_mut() {
                display.present();
            }
            self.poll_joypad();
        }
    }

    fn drain_audio(&mut self) {
        if let Some(sink) = self.controllers.audio.as_deref_mut() {
            let mut samples = self.apu.drain_samples();
            while let (Some(left), Some(right)) = (samples.next(), samples.next()) {
                sink.push_sample(left, right);
            }
        }
    }

    /// True once since the last call if a V-blank happened.
    pub fn take_vblank(&mut self) -> bool {
        std::mem::replace(&mut self.vblank_seen, false)
    }

    pub fn boot_rom_finished(&self) -> bool {
        self.boot_rom.is_finished
    }

    pub(crate) fn set_boot_rom_finished(&mut self, finished: bool) {
        self.boot_rom.is_finished = finished;
    }

    /// Power cycle everything except the cartridge (its RAM survives).
    pub fn reset(&mut self) {
        self.boot_rom.reset();
        self.ppu = Ppu::new();
        self.apu = Apu::new();
        self.hram = Hram::new();
        self.wram = Wram::new();
        self.joypad = JoyPad::default();
        self.timer = Timer::default();
        self.serial = Serial::default();
        self.interrupts = Interrupts::default();
        self.oam_dma = OamDma::default();
        self.speed = SpeedSwitch::default();
        self.hdma = HdmaRegisters::default();
        self.io_registers = [INVALID_READ; 0x80];
        self.vblank_seen = false;
        if self.boot_rom.is_finished {
            self.timer.system_clock = 0xAB00;
        }
    }
}

impl MemoryMapper for Memory {
    fn read_byte(&self, address: u16) -> u8 {
        Memory::read_byte(self, address)
    }

    fn write_byte(&mut self, address: u16, value: u8) {
        Memory::write_byte(self, address, value)
    }

    fn interrupts(&self) -> &Interrupts {
        &self.interrupts
    }

    fn interrupts_mut(&mut self) -> &mut Interrupts {
        &mut self.interrupts
    }

    /// One machine cycle for everything except the CPU, in a fixed order:
    /// timer, OAM DMA, PPU, APU, serial. The PPU and APU advance by 2 dots
    /// per M-cycle in double speed so they stay on wall-clock time.
    fn do_m_cycle(&mut self) {
        let sequencer_bit_before = self.frame_sequencer_bit();
        if let Some(flag) = self.timer.tick() {
            self.interrupts.request(flag);
        }
        if sequencer_bit_before && !self.frame_sequencer_bit() {
            self.apu.tick_frame_sequencer();
        }

        self.tick_oam_dma();

        let dots = if self.speed.double_speed { 2 } else { 4 };
        let events = self.ppu.tick(dots, &mut self.interrupts, self.model);
        self.handle_ppu_events(events);

        self.apu.tick(dots);
        self.drain_audio();

        if let Some(flag) = self.serial.tick(self.controllers.serial.as_deref_mut()) {
            self.interrupts.request(flag);
        }
    }

    fn model(&self) -> GameBoyModel {
        self.model
    }

    fn try_speed_switch(&mut self) -> bool {
        if !self.model.is_cgb() {
            return false;
        }
        self.speed.perform()
    }
}

impl std::fmt::Debug for Memory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Memory {{ model: {:?}, cartridge: {:?} }}", self.model, self.cartridge)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::hardware::cartridge::tests::test_rom;
    use crate::EmulatorOptionsBuilder;

    pub(crate) fn test_memory() -> Memory {
        Memory::new(&test_rom(0x00, 0x00, 0x00), EmulatorOptionsBuilder::new().build()).unwrap()
    }

    #[test]
    fn echo_ram_aliases_wram_through_the_bus() {
        let mut memory = test_memory();
        memory.write_byte(0xC100, 0x5A);
        assert_eq!(memory.read_byte(0xE100), 0x5A);
    }

    #[test]
    fn unusable_region_reads_ff_and_drops_writes() {
        let mut memory = test_memory();
        memory.write_byte(0xFEA5, 0x77);
        assert_eq!(memory.read_byte(0xFEA5), 0xFF);
    }

    #[test]
    fn cgb_registers_are_hidden_on_dmg() {
        let memory = test_memory();
        assert_eq!(memory.read_byte(CGB_SPEED_SWITCH), 0xFF);
        assert_eq!(memory.read_byte(CGB_WRAM_BANK), 0xFF);
    }

    #[test]
    fn oam_dma_copies_after_the_arming_delay() {
        let mut memory = test_memory();
        // Disable the LCD so OAM is otherwise accessible.
        memory.write_byte(0xFF40, 0x11);
        for i in 0..0xA0u16 {
            memory.write_byte(0xC000 + i, i as u8);
        }

        memory.write_byte(0xFF46, 0xC0);
        assert_eq!(memory.read_byte(0xFF46), 0xC0);

        // 1 arming cycle + 160 copy cycles.
        for _ in 0..161 {
            memory.do_m_cycle();
        }
        assert!(!memory.oam_dma.active);
        assert_eq!(memory.read_byte(0xFE00), 0x00);
        assert_eq!(memory.read_byte(0xFE9F), 0x9F);
    }

    #[test]
    fn oam_is_unreadable_while_dma_runs() {
        let mut memory = test_memory();
        memory.write_byte(0xFF40, 0x11);
        memory.write_byte(0xFE00, 0x42);

        memory.write_byte(0xFF46, 0xC0);
        memory.do_m_cycle();
        memory.do_m_cycle();
        assert!(memory.oam_dma.active);
        assert_eq!(memory.read_byte(0xFE00), 0xFF);
    }

    #[test]
    fn timer_overflow_interrupt_reaches_if() {
        let mut memory = test_memory();
        memory.write_byte(0xFF07, 0x05);
        memory.write_byte(0xFF06, 0xFB);
        memory.write_byte(0xFF05, 0xFF);

        // 512 master clocks.
        for _ in 0..128 {
            memory.do_m_cycle();
        }
        assert!(memory.interrupts.interrupt_flag.contains(crate::io::interrupts::InterruptFlags::TIMER));
    }

    #[test]
    fn vblank_flag_is_taken_once() {
        let mut memory = test_memory();
        for _ in 0..(456 * 145) / 4 {
            memory.do_m_cycle();
        }
        assert!(memory.take_vblank());
        assert!(!memory.take_vblank());
    }
}
