use crate::io::interrupts::InterruptFlags;
use crate::util::{read_u8, read_u16, write_u8, write_u16};
use std::io::{self, Read, Write};

/// DIV exposes the upper 8 bits of the free-running 16-bit counter.
/// Writing any value resets the whole counter to 0.
pub const DIVIDER_REGISTER: u16 = 0xFF04;
/// Incremented on a falling edge of the TAC-selected counter bit; overflow
/// reloads TMA and requests the timer interrupt after a 4-clock delay.
pub const TIMER_COUNTER: u16 = 0xFF05;
/// Reload value for TIMA on overflow.
pub const TIMER_MODULO: u16 = 0xFF06;
/// Enable bit and input-clock selection for TIMA.
pub const TIMER_CONTROL: u16 = 0xFF07;

/// The counter bit watched by the falling-edge detector, per TAC clock select.
#[derive(Debug, Copy, Clone, PartialEq)]
enum InputClock {
    C1024 = 0x0,
    C16 = 0x1,
    C64 = 0x2,
    C256 = 0x3,
}

impl InputClock {
    fn selected_bit(self) -> u16 {
        match self {
            InputClock::C1024 => 1 << 9,
            InputClock::C16 => 1 << 3,
            InputClock::C64 => 1 << 5,
            InputClock::C256 => 1 << 7,
        }
    }
}

impl From<u8> for InputClock {
    fn from(value: u8) -> Self {
        match value & 0x3 {
            0x0 => InputClock::C1024,
            0x1 => InputClock::C16,
            0x2 => InputClock::C64,
            _ => InputClock::C256,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct TimerControl {
    enabled: bool,
    input_select: InputClock,
}

impl TimerControl {
    pub fn to_bits(self) -> u8 {
        0xF8 | ((self.enabled as u8) << 2) | self.input_select as u8
    }
}

impl Default for TimerControl {
    fn default() -> Self {
        TimerControl {
            enabled: false,
            input_select: InputClock::C1024,
        }
    }
}

impl From<u8> for TimerControl {
    fn from(value: u8) -> Self {
        TimerControl {
            enabled: value & 0b100 != 0,
            input_select: InputClock::from(value),
        }
    }
}

/// DIV/TIMA/TMA/TAC built around a single internal 16-bit counter and a
/// falling-edge detector, which is what produces all the documented quirks.
#[derive(Debug, Default)]
pub struct Timer {
    pub system_clock: u16,
    pub tima: u8,
    pub tma: u8,
    pub control: TimerControl,
    /// Set while in the 4-clock window between TIMA overflow and TMA reload.
    overflow_pending: bool,
    /// Set for the single M-cycle in which TMA was copied into TIMA.
    just_reloaded: bool,
}

impl Timer {
    pub fn divider(&self) -> u8 {
        (self.system_clock >> 8) as u8
    }

    /// Advances the internal counter by one M-cycle (4 master clocks) and
    /// returns the timer interrupt if a delayed overflow completed.
    pub fn tick(&mut self) -> Option<InterruptFlags> {
        self.just_reloaded = false;
        let mut request = None;

        if self.overflow_pending {
            self.tima = self.tma;
            self.overflow_pending = false;
            self.just_reloaded = true;
            request = Some(InterruptFlags::TIMER);
        }

        let old_clock = self.system_clock;
        self.system_clock = old_clock.wrapping_add(4);

        if self.control.enabled && self.edge_fell(old_clock, self.system_clock) {
            self.increment_tima();
        }

        request
    }

    fn edge_fell(&self, old_clock: u16, new_clock: u16) -> bool {
        let bit = self.control.input_select.selected_bit();
        (old_clock & bit) != 0 && (new_clock & bit) == 0
    }

    fn increment_tima(&mut self) {
        let (new_value, overflowed) = self.tima.overflowing_add(1);
        // TIMA reads 0 during the 4-clock delay before the TMA reload.
        self.tima = new_value;
        self.overflow_pending = overflowed;
    }

    /// A DIV write zeroes the counter, which itself looks like a falling edge
    /// to the detector if the selected bit happened to be high.
    pub fn write_divider(&mut self) {
        let old_clock = self.system_clock;
        self.system_clock = 0;

        if self.control.enabled && self.edge_fell(old_clock, 0) {
            self.increment_tima();
        }
    }

    pub fn write_tima(&mut self, value: u8) {
        // Writes inside the overflow window lose against the pending reload.
        if self.overflow_pending || self.just_reloaded {
            return;
        }
        self.tima = value;
    }

    pub fn write_tma(&mut self, value: u8) {
        self.tma = value;
        // TMA written inside the overflow window is forwarded to TIMA as well.
        if self.overflow_pending || self.just_reloaded {
            self.tima = value;
        }
    }

    /// TAC writes can glitch an extra increment out of the edge detector when
    /// the enable bit or the selected bit changes while the line is high.
    pub fn write_control(&mut self, value: u8) {
        let old_control = self.control;
        self.control = TimerControl::from(value);

        let old_bit_high = self.system_clock & old_control.input_select.selected_bit() != 0;
        let new_bit_high = self.system_clock & self.control.input_select.selected_bit() != 0;

        if old_control.enabled && !self.control.enabled && old_bit_high {
            self.increment_tima();
        }

        if old_control.enabled && self.control.enabled && old_bit_high && !new_bit_high {
            self.increment_tima();
        }
    }

    pub fn save_state(&self, writer: &mut dyn Write) -> io::Result<()> {
        write_u16(writer, self.system_clock)?;
        write_u8(writer, self.tima)?;
        write_u8(writer, self.tma)?;
        write_u8(writer, self.control.to_bits())?;
        write_u8(writer, self.overflow_pending as u8)?;
        write_u8(writer, self.just_reloaded as u8)
    }

    pub fn load_state(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        self.system_clock = read_u16(reader)?;
        self.tima = read_u8(reader)?;
        self.tma = read_u8(reader)?;
        self.control = TimerControl::from(read_u8(reader)?);
        self.overflow_pending = read_u8(reader)? != 0;
        self.just_reloaded = read_u8(reader)? != 0;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run_clocks(timer: &mut Timer, clocks: u32) -> u32 {
        let mut interrupts = 0;
        for _ in 0..clocks / 4 {
            if timer.tick().is_some() {
                interrupts += 1;
            }
        }
        interrupts
    }

    #[test]
    fn overflow_reloads_tma_and_requests_interrupt_once() {
        let mut timer = Timer::default();
        timer.write_control(0x05);
        timer.tma = 0xFB;
        timer.tima = 0xFF;

        // Bit 3 falls for the first time at clock 16; the reload and the
        // interrupt follow one M-cycle later.
        let interrupts = run_clocks(&mut timer, 20);
        assert_eq!(interrupts, 1);
        assert_eq!(timer.tima, 0xFB);
    }

    #[test]
    fn tima_reads_zero_inside_the_overflow_window() {
        let mut timer = Timer::default();
        timer.write_control(0x05);
        timer.tima = 0xFF;

        run_clocks(&mut timer, 16);
        assert_eq!(timer.tima, 0x00);
        assert!(timer.tick().is_some());
    }

    #[test]
    fn tima_write_is_dropped_during_overflow_window() {
        let mut timer = Timer::default();
        timer.write_control(0x05);
        timer.tma = 0x42;
        timer.tima = 0xFF;

        run_clocks(&mut timer, 16);
        timer.write_tima(0x99);
        assert!(timer.tick().is_some());
        assert_eq!(timer.tima, 0x42);
    }

    #[test]
    fn tma_write_during_window_updates_tima_too() {
        let mut timer = Timer::default();
        timer.write_control(0x05);
        timer.tma = 0x42;
        timer.tima = 0xFF;

        run_clocks(&mut timer, 16);
        timer.write_tma(0x77);
        timer.tick();
        assert_eq!(timer.tima, 0x77);
    }

    #[test]
    fn divider_write_can_tick_tima_through_the_falling_edge() {
        let mut timer = Timer::default();
        timer.write_control(0x05);

        // Park the counter with the selected bit (bit 3) high.
        run_clocks(&mut timer, 8);
        assert_ne!(timer.system_clock & 0x8, 0);

        let before = timer.tima;
        timer.write_divider();
        assert_eq!(timer.tima, before + 1);
        assert_eq!(timer.divider(), 0);
    }

    #[test]
    fn disabling_timer_with_selected_bit_high_ticks_once() {
        let mut timer = Timer::default();
        timer.write_control(0x05);
        run_clocks(&mut timer, 8);

        timer.write_control(0x00);
        assert_eq!(timer.tima, 1);
    }
}
