pub mod controllers;
pub mod emulator;
pub mod hardware;
mod io;
pub mod state;
mod util;

pub use crate::emulator::{Emulator, GameBoyModel};
pub use crate::hardware::cartridge::CartridgeError;
pub use crate::io::joypad::InputKey;
pub use crate::state::RestoreError;

use crate::controllers::{SystemTimeSource, TimeSource};

/// Construction-time knobs for the [`Emulator`].
pub struct EmulatorOptions {
    pub boot_rom: Option<Vec<u8>>,
    pub saved_ram: Option<Vec<u8>>,
    pub model: GameBoyModel,
    pub time_source: Box<dyn TimeSource>,
}

pub struct EmulatorOptionsBuilder {
    boot_rom: Option<Vec<u8>>,
    saved_ram: Option<Vec<u8>>,
    model: GameBoyModel,
    time_source: Box<dyn TimeSource>,
}

impl EmulatorOptionsBuilder {
    pub fn new() -> Self {
        EmulatorOptionsBuilder {
            boot_rom: None,
            saved_ram: None,
            model: GameBoyModel::Dmg,
            time_source: Box::new(SystemTimeSource),
        }
    }

    pub fn boot_rom(mut self, boot_rom: Option<Vec<u8>>) -> Self {
        self.boot_rom = boot_rom;
        self
    }

    /// Battery RAM from an earlier session, adopted when its size fits.
    pub fn saved_ram(mut self, saved_ram: Option<Vec<u8>>) -> Self {
        self.saved_ram = saved_ram;
        self
    }

    pub fn with_model(mut self, model: GameBoyModel) -> Self {
        self.model = model;
        self
    }

    /// Clock for the MBC3 real-time clock; tests swap in a mock here.
    pub fn time_source(mut self, time_source: Box<dyn TimeSource>) -> Self {
        self.time_source = time_source;
        self
    }

    pub fn build(self) -> EmulatorOptions {
        EmulatorOptions {
            boot_rom: self.boot_rom,
            saved_ram: self.saved_ram,
            model: self.model,
            time_source: self.time_source,
        }
    }
}

impl Default for EmulatorOptionsBuilder {
    fn default() -> Self {
        EmulatorOptionsBuilder::new()
    }
}

impl From<EmulatorOptions> for EmulatorOptionsBuilder {
    fn from(options: EmulatorOptions) -> Self {
        EmulatorOptionsBuilder {
            boot_rom: options.boot_rom,
            saved_ram: options.saved_ram,
            model: options.model,
            time_source: options.time_source,
        }
    }
}
