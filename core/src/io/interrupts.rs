use bitflags::*;

/// The five interrupt sources in their service-priority order, each carrying
/// its bit in IF/IE as the discriminant.
#[derive(Debug, Copy, Clone, PartialOrd, PartialEq)]
pub enum Interrupt {
    Vblank = 0b0000_0001,
    LcdStat = 0b0000_0010,
    Timer = 0b0000_0100,
    Serial = 0b0000_1000,
    Joypad = 0b0001_0000,
}

impl Interrupt {
    /// Iterates in hardware priority order, lowest vector first.
    pub fn iter() -> impl Iterator<Item = Interrupt> {
        use Interrupt::*;
        [Vblank, LcdStat, Timer, Serial, Joypad].iter().copied()
    }

    pub const fn vector(self) -> u16 {
        match self {
            Interrupt::Vblank => 0x0040,
            Interrupt::LcdStat => 0x0048,
            Interrupt::Timer => 0x0050,
            Interrupt::Serial => 0x0058,
            Interrupt::Joypad => 0x0060,
        }
    }
}

bitflags! {
    #[derive(Default)]
    pub struct InterruptFlags: u8 {
        const VBLANK = 0b0000_0001;
        const LCD    = 0b0000_0010;
        const TIMER  = 0b0000_0100;
        const SERIAL = 0b0000_1000;
        const JOYPAD = 0b0001_0000;
    }
}

/// The interrupt controller: IF (0xFF0F) and IE (0xFFFF).
#[derive(Default, Debug, Clone)]
pub struct Interrupts {
    pub interrupt_enable: InterruptFlags,
    pub interrupt_flag: InterruptFlags,
}

impl Interrupts {
    #[inline]
    pub fn request(&mut self, interrupt: InterruptFlags) {
        self.interrupt_flag.insert(interrupt);
    }

    /// The enabled and requested set; non-empty means the CPU has work to do.
    #[inline]
    pub fn pending(&self) -> InterruptFlags {
        self.interrupt_flag & self.interrupt_enable
    }

    /// IF reads with the three unimplemented bits high.
    pub fn read_flag(&self) -> u8 {
        0xE0 | self.interrupt_flag.bits()
    }

    pub fn read_enable(&self) -> u8 {
        self.interrupt_enable.bits()
    }

    /// Writes latch exactly the value's low five bits.
    pub fn overwrite_flag(&mut self, value: u8) {
        self.interrupt_flag = InterruptFlags::from_bits_truncate(value);
    }

    pub fn overwrite_enable(&mut self, value: u8) {
        self.interrupt_enable = InterruptFlags::from_bits_truncate(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn priority_order_matches_vectors() {
        let vectors: Vec<u16> = Interrupt::iter().map(Interrupt::vector).collect();
        assert_eq!(vectors, vec![0x40, 0x48, 0x50, 0x58, 0x60]);
    }

    #[test]
    fn flag_reads_keep_upper_bits_high() {
        let mut interrupts = Interrupts::default();
        interrupts.overwrite_flag(0x04);
        assert_eq!(interrupts.read_flag(), 0xE4);

        // Writes latch exactly the given five bits, nothing is sticky.
        interrupts.overwrite_flag(0x00);
        assert_eq!(interrupts.read_flag(), 0xE0);
    }

    #[test]
    fn pending_requires_both_registers() {
        let mut interrupts = Interrupts::default();
        interrupts.request(InterruptFlags::TIMER);
        assert!(interrupts.pending().is_empty());

        interrupts.overwrite_enable(0x04);
        assert_eq!(interrupts.pending(), InterruptFlags::TIMER);
    }
}
