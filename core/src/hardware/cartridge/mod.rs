use crate::controllers::TimeSource;
use crate::hardware::cartridge::header::{CartridgeHeader, RamSize};
use crate::hardware::cartridge::mbc::{Mbc, Mbc1State, Mbc2State, Mbc3State, Mbc5State, MBC2_RAM_SIZE, ROM_BANK_SIZE};
use crate::hardware::cartridge::rtc::RealTimeClock;
use num_integer::Integer;
use std::fmt;
use std::io::{self, Read, Write};
use thiserror::Error;

pub mod header;
pub mod mbc;
pub mod rtc;

/// Largest ROM the header encoding can describe: 512 banks of 16 KiB.
const MAX_ROM_SIZE: usize = 512 * ROM_BANK_SIZE;

/// The closed set of ways loading a cartridge image can fail. A successful
/// load is the `Ok` side of the `Result`.
#[derive(Debug, Error, PartialEq)]
pub enum CartridgeError {
    #[error("No ROM was loaded")]
    NoRomLoaded,
    #[error("ROM file could not be read")]
    RomFileNotReadable,
    #[error("Selected file is either corrupt or not a cartridge image")]
    RomParseError,
    #[error("Selected file is too big")]
    RomTooBig,
    #[error("The ROM file's size does not match its header information")]
    RomSizeMismatch,
    #[error("The ROM uses an unsupported memory bank controller: {0:#04X}")]
    RomUnsupportedMbc(u8),
    #[error("The ROM declares an unsupported RAM size: {0:#04X}")]
    RamSizeUnsupported(u8),
}

pub struct Cartridge {
    header: CartridgeHeader,
    rom: Vec<u8>,
    ram: Vec<u8>,
    mbc: Mbc,
    has_battery: bool,
}

impl Cartridge {
    /// Parses and validates `rom`, dimensioning buffers from the header and
    /// picking the MBC variant from the type byte. `saved_ram` (a previous
    /// battery dump) is adopted when its size matches.
    pub fn new(
        rom: &[u8],
        saved_ram: Option<Vec<u8>>,
        time_source: Box<dyn TimeSource>,
    ) -> Result<Self, CartridgeError> {
        if rom.is_empty() {
            return Err(CartridgeError::NoRomLoaded);
        }
        if rom.len() < 0x150 {
            return Err(CartridgeError::RomParseError);
        }
        if rom.len() > MAX_ROM_SIZE {
            return Err(CartridgeError::RomTooBig);
        }

        let header = CartridgeHeader::parse(rom);
        let declared_size = header.rom_size_in_bytes().ok_or(CartridgeError::RomParseError)?;
        if rom.len() != declared_size {
            return Err(CartridgeError::RomSizeMismatch);
        }

        let ram_size = RamSize::from_header_byte(header.ram_size)
            .ok_or(CartridgeError::RamSizeUnsupported(header.ram_size))?;
        let (mbc, has_battery, has_rtc) = make_mbc(header.cartridge_type, time_source)
            .ok_or(CartridgeError::RomUnsupportedMbc(header.cartridge_type))?;

        // MBC2 carts carry their RAM on the controller die; the header's RAM
        // byte is zero for them.
        let ram_len = if matches!(mbc, Mbc::Mbc2(_)) {
            MBC2_RAM_SIZE
        } else {
            ram_size.in_bytes()
        };

        let mut ram = vec![mbc::INVALID_READ; ram_len];
        if let Some(saved) = saved_ram {
            if saved.len() == ram.len() {
                ram = saved;
            } else {
                log::warn!(
                    "Ignoring battery RAM of {} bytes, cartridge expects {}",
                    saved.len(),
                    ram.len()
                );
            }
        }

        log::info!(
            "Loaded \"{}\": {} ({} KiB ROM, {} KiB RAM{}{})",
            header.title,
            cartridge_type_name(header.cartridge_type),
            rom.len() / 1024,
            ram.len() / 1024,
            if has_battery { ", battery" } else { "" },
            if has_rtc { ", RTC" } else { "" },
        );

        Ok(Cartridge {
            header,
            rom: rom.to_vec(),
            ram,
            mbc,
            has_battery,
        })
    }

    pub fn header(&self) -> &CartridgeHeader {
        &self.header
    }

    pub fn has_battery(&self) -> bool {
        self.has_battery
    }

    pub fn mbc(&self) -> &Mbc {
        &self.mbc
    }

    fn rom_banks(&self) -> u16 {
        (self.rom.len() / ROM_BANK_SIZE) as u16
    }

    fn ram_banks(&self) -> u8 {
        // Ceiling division so the 2 KiB class still counts as one bank.
        Integer::div_ceil(&self.ram.len(), &mbc::RAM_BANK_SIZE) as u8
    }

    /// 0x0000..=0x3FFF window.
    pub fn read_0000_3fff(&self, address: u16) -> u8 {
        let bank = self.mbc.low_rom_bank(self.rom_banks()) as usize;
        self.rom[bank * ROM_BANK_SIZE + address as usize]
    }

    /// 0x4000..=0x7FFF window.
    pub fn read_4000_7fff(&self, address: u16) -> u8 {
        let bank = self.mbc.high_rom_bank(self.rom_banks()) as usize;
        self.rom[bank * ROM_BANK_SIZE + (address & 0x3FFF) as usize]
    }

    pub fn read_external_ram(&self, address: u16) -> u8 {
        self.mbc.ram_read(&self.ram, address, self.ram_banks())
    }

    /// ROM-space and RAM-space writes; the former are MBC control signals.
    pub fn write_byte(&mut self, address: u16, value: u8) {
        match address {
            0x0000..=0x7FFF => self.mbc.rom_write(address, value),
            0xA000..=0xBFFF => {
                let banks = self.ram_banks();
                self.mbc.ram_write(&mut self.ram, address, value, banks)
            }
            _ => log::warn!("Cartridge write outside its windows: {:#06X}", address),
        }
    }

    /// Raw battery dump: the RAM buffer, plus the 48-byte RTC tail on
    /// timer-equipped MBC3 carts. No-op for cartridges without a battery.
    pub fn save_battery(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        if !self.has_battery {
            return Ok(());
        }
        writer.write_all(&self.ram)?;
        if let Mbc::Mbc3(state) = &mut self.mbc {
            if let Some(rtc) = state.rtc.as_mut() {
                rtc.save_battery(writer)?;
            }
        }
        Ok(())
    }

    pub fn load_battery(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        if !self.has_battery {
            return Ok(());
        }
        reader.read_exact(&mut self.ram)?;
        if let Mbc::Mbc3(state) = &mut self.mbc {
            if let Some(rtc) = state.rtc.as_mut() {
                rtc.load_battery(reader)?;
            }
        }
        Ok(())
    }

    /// External RAM snapshot for the save-state codec.
    pub fn ram(&self) -> &[u8] {
        &self.ram
    }

    pub fn ram_mut(&mut self) -> &mut [u8] {
        &mut self.ram
    }

    pub fn mbc_mut(&mut self) -> &mut Mbc {
        &mut self.mbc
    }
}

impl fmt::Debug for Cartridge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Cartridge \"{}\" ({}) rom: {} banks, ram: {} banks, mbc: {:?}",
            self.header.title,
            cartridge_type_name(self.header.cartridge_type),
            self.rom_banks(),
            self.ram_banks(),
            self.mbc
        )
    }
}

/// MBC variant, battery flag and RTC flag for a cartridge type byte.
fn make_mbc(cartridge_type: u8, time_source: Box<dyn TimeSource>) -> Option<(Mbc, bool, bool)> {
    let mbc3 = |rtc: Option<RealTimeClock>| Mbc3State {
        ram_enabled: false,
        rom_bank: 1,
        mapped_select: 0,
        rtc,
        latch_state: 0xFF,
    };
    let mbc5 = || Mbc5State {
        rom_bank: 1,
        ..Mbc5State::default()
    };

    Some(match cartridge_type {
        0x00 | 0x08 => (Mbc::None, false, false),
        0x09 => (Mbc::None, true, false),
        0x01 | 0x02 => (Mbc::Mbc1(Mbc1State::default()), false, false),
        0x03 => (Mbc::Mbc1(Mbc1State::default()), true, false),
        0x05 => (Mbc::Mbc2(Mbc2State::default()), false, false),
        0x06 => (Mbc::Mbc2(Mbc2State::default()), true, false),
        0x0F | 0x10 => (Mbc::Mbc3(mbc3(Some(RealTimeClock::new(time_source)))), true, true),
        0x11 | 0x12 => (Mbc::Mbc3(mbc3(None)), false, false),
        0x13 => (Mbc::Mbc3(mbc3(None)), true, false),
        0x19 | 0x1A | 0x1C | 0x1D => (Mbc::Mbc5(mbc5()), false, false),
        0x1B | 0x1E => (Mbc::Mbc5(mbc5()), true, false),
        _ => return None,
    })
}

fn cartridge_type_name(cartridge_type: u8) -> &'static str {
    match cartridge_type {
        0x00 | 0x08 | 0x09 => "ROM",
        0x01..=0x03 => "MBC1",
        0x05 | 0x06 => "MBC2",
        0x0F | 0x10 => "MBC3+RTC",
        0x11..=0x13 => "MBC3",
        0x19..=0x1E => "MBC5",
        _ => "unknown",
    }
}
