//! Host-side collaborators. The core is headless; everything that touches a
//! screen, speaker, controller, link cable or clock is injected through these
//! traits.

use crate::hardware::ppu::RESOLUTION_WIDTH;
use crate::io::joypad::InputKey;
use std::time::{SystemTime, UNIX_EPOCH};

/// One emitted scanline: in DMG mode every pixel is the post-palette shade
/// 0..=3, in CGB mode a 15-bit BGR color.
pub type ScanlinePixels = [u16; RESOLUTION_WIDTH];

/// Receives finished scanlines during mode 3 and a present call at V-blank.
pub trait DisplaySink {
    fn draw_scanline(&mut self, y: u8, pixels: &ScanlinePixels);
    fn present(&mut self);
}

/// Receives stereo samples at the emulator's native output rate, each in
/// `[-1.0, 1.0]`.
pub trait AudioSink {
    fn push_sample(&mut self, left: f32, right: f32);
}

/// Polled for the current button state; low-level matrix handling stays in
/// the core.
pub trait JoypadSource {
    fn is_pressed(&mut self, key: InputKey) -> bool;
}

/// Bit-level link cable. `send_bit` carries the outgoing bit and returns the
/// bit shifted in from the remote side in the same clock.
pub trait SerialLink {
    fn send_bit(&mut self, bit: u8) -> u8;
}

/// Wall-clock source for the MBC3 real-time clock. Injected so tests can run
/// against a controlled clock.
pub trait TimeSource {
    fn unix_timestamp(&self) -> u64;
}

/// The set of attached host collaborators; every slot is optional and a
/// missing one behaves like disconnected hardware.
#[derive(Default)]
pub struct Controllers {
    pub display: Option<Box<dyn DisplaySink>>,
    pub audio: Option<Box<dyn AudioSink>>,
    pub joypad: Option<Box<dyn JoypadSource>>,
    pub serial: Option<Box<dyn SerialLink>>,
}

impl std::fmt::Debug for Controllers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "Controllers(display: {}, audio: {}, joypad: {}, serial: {})",
            self.display.is_some(),
            self.audio.is_some(),
            self.joypad.is_some(),
            self.serial.is_some()
        )
    }
}

/// Default `TimeSource` backed by the host's system clock.
#[derive(Debug, Default, Copy, Clone)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn unix_timestamp(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|duration| duration.as_secs())
            .unwrap_or(0)
    }
}
