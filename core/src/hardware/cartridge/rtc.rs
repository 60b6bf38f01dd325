//! MBC3 real-time clock. The live counters are synchronized lazily against
//! the injected [`TimeSource`] whenever the guest touches them, and a 0→1
//! edge on the latch register copies them into the readable shadow.

use crate::controllers::TimeSource;
use crate::util::{read_u32, read_u64, write_u32, write_u64};
use std::fmt;
use std::io::{self, Read, Write};

const SECONDS_PER_DAY: u64 = 86_400;

pub struct RealTimeClock {
    time_source: Box<dyn TimeSource>,
    /// Wall-clock second at which the live registers were last normalized.
    base_timestamp: u64,
    seconds: u8,
    minutes: u8,
    hours: u8,
    /// 9-bit day counter.
    days: u16,
    halted: bool,
    day_carry: bool,
    /// Shadow registers in S, M, H, DL, DH order.
    latched: [u8; 5],
}

impl RealTimeClock {
    pub fn new(time_source: Box<dyn TimeSource>) -> Self {
        let base_timestamp = time_source.unix_timestamp();
        RealTimeClock {
            time_source,
            base_timestamp,
            seconds: 0,
            minutes: 0,
            hours: 0,
            days: 0,
            halted: false,
            day_carry: false,
            latched: [0; 5],
        }
    }

    /// Folds elapsed wall time into the live counters.
    fn synchronize(&mut self) {
        let now = self.time_source.unix_timestamp();
        let delta = now.saturating_sub(self.base_timestamp);
        self.base_timestamp = now;

        if self.halted || delta == 0 {
            return;
        }

        let mut total = self.seconds as u64
            + self.minutes as u64 * 60
            + self.hours as u64 * 3600
            + self.days as u64 * SECONDS_PER_DAY
            + delta;

        self.seconds = (total % 60) as u8;
        total /= 60;
        self.minutes = (total % 60) as u8;
        total /= 60;
        self.hours = (total % 24) as u8;
        let days = total / 24;
        self.days = (days & 0x1FF) as u16;
        if days > 0x1FF {
            self.day_carry = true;
        }
    }

    /// Copies the live counters into the readable shadow.
    pub fn latch(&mut self) {
        self.synchronize();
        self.latched = [
            self.seconds,
            self.minutes,
            self.hours,
            (self.days & 0xFF) as u8,
            self.day_high(),
        ];
    }

    fn day_high(&self) -> u8 {
        ((self.days >> 8) as u8 & 0x1) | ((self.halted as u8) << 6) | ((self.day_carry as u8) << 7)
    }

    /// Register select values 0x08..=0x0C map to S, M, H, DL, DH.
    pub fn read_register(&self, select: u8) -> u8 {
        self.latched[(select - 0x08) as usize]
    }

    pub fn write_register(&mut self, select: u8, value: u8) {
        self.synchronize();
        match select {
            0x08 => self.seconds = value & 0x3F,
            0x09 => self.minutes = value & 0x3F,
            0x0A => self.hours = value & 0x1F,
            0x0B => self.days = (self.days & 0x100) | value as u16,
            0x0C => {
                self.days = (self.days & 0xFF) | (((value & 0x1) as u16) << 8);
                self.halted = value & 0x40 != 0;
                self.day_carry = value & 0x80 != 0;
            }
            _ => unreachable!("RTC register select out of range: {:#04X}", select),
        }
    }

    /// Battery tail, 48 bytes: live S/M/H/DL/DH as LE u32s, the latched
    /// shadow the same way, then the wall-clock second they were valid at.
    pub fn save_battery(&mut self, writer: &mut dyn Write) -> io::Result<()> {
        self.synchronize();
        let live = [
            self.seconds,
            self.minutes,
            self.hours,
            (self.days & 0xFF) as u8,
            self.day_high(),
        ];
        for value in live.iter().chain(self.latched.iter()) {
            write_u32(writer, *value as u32)?;
        }
        write_u64(writer, self.base_timestamp)
    }

    /// Restores the registers from a battery tail and re-applies the wall
    /// time elapsed since the save was taken.
    pub fn load_battery(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        let mut registers = [0u32; 5];
        for value in registers.iter_mut() {
            *value = read_u32(reader)?;
        }
        for value in self.latched.iter_mut() {
            *value = read_u32(reader)? as u8;
        }
        let saved_at = read_u64(reader)?;

        self.seconds = registers[0] as u8 & 0x3F;
        self.minutes = registers[1] as u8 & 0x3F;
        self.hours = registers[2] as u8 & 0x1F;
        self.days = (registers[3] as u16 & 0xFF) | (((registers[4] as u16) & 0x1) << 8);
        self.halted = registers[4] & 0x40 != 0;
        self.day_carry = registers[4] & 0x80 != 0;
        self.base_timestamp = saved_at;
        self.synchronize();
        self.latch();
        Ok(())
    }
}

impl fmt::Debug for RealTimeClock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "RTC {:03}d {:02}:{:02}:{:02} halted: {} carry: {}",
            self.days, self.hours, self.minutes, self.seconds, self.halted, self.day_carry
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Clone, Default)]
    pub struct MockTime(pub Rc<Cell<u64>>);

    impl TimeSource for MockTime {
        fn unix_timestamp(&self) -> u64 {
            self.0.get()
        }
    }

    #[test]
    fn latch_reflects_elapsed_time() {
        let clock = MockTime::default();
        let mut rtc = RealTimeClock::new(Box::new(clock.clone()));

        clock.0.set(SECONDS_PER_DAY + 3661);
        rtc.latch();

        assert_eq!(rtc.read_register(0x08), 1);
        assert_eq!(rtc.read_register(0x09), 1);
        assert_eq!(rtc.read_register(0x0A), 1);
        assert_eq!(rtc.read_register(0x0B), 1);
    }

    #[test]
    fn halt_freezes_the_counters() {
        let clock = MockTime::default();
        let mut rtc = RealTimeClock::new(Box::new(clock.clone()));

        rtc.write_register(0x0C, 0x40);
        clock.0.set(500);
        rtc.latch();
        assert_eq!(rtc.read_register(0x08), 0);
    }

    #[test]
    fn day_overflow_sets_the_carry_bit() {
        let clock = MockTime::default();
        let mut rtc = RealTimeClock::new(Box::new(clock.clone()));

        clock.0.set(SECONDS_PER_DAY * 513);
        rtc.latch();
        assert_ne!(rtc.read_register(0x0C) & 0x80, 0);
        assert_eq!(rtc.read_register(0x0B), 1);
    }

    #[test]
    fn battery_round_trip_reapplies_elapsed_time() {
        let clock = MockTime::default();
        let mut rtc = RealTimeClock::new(Box::new(clock.clone()));
        clock.0.set(90);

        let mut saved = Vec::new();
        rtc.save_battery(&mut saved).unwrap();
        assert_eq!(saved.len(), 48);

        // A fresh cartridge loaded an hour later sees the save-time value
        // plus the elapsed hour.
        let later = MockTime::default();
        later.0.set(90 + 3600);
        let mut restored = RealTimeClock::new(Box::new(later));
        restored.load_battery(&mut saved.as_slice()).unwrap();
        assert_eq!(restored.read_register(0x08), 30);
        assert_eq!(restored.read_register(0x09), 1);
        assert_eq!(restored.read_register(0x0A), 1);
    }
}
