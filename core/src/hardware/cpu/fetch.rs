//! Bus-access helpers and the interrupt-service sequence. Every memory touch
//! goes through these so that one M-cycle of hardware time is charged per
//! bus transaction.

use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;
use crate::io::interrupts::{Interrupt, InterruptFlags};

impl<M: MemoryMapper> Cpu<M> {
    /// Charges one M-cycle: the rest of the machine advances by 4 dots.
    pub fn add_cycles(&mut self) {
        self.cycles_performed += 4;
        self.mmu.do_m_cycle();
    }

    /// Reads the byte at `PC` and advances it.
    pub fn get_instr_u8(&mut self) -> u8 {
        let result = self.read_byte_cycle(self.registers.pc);
        self.registers.pc = self.registers.pc.wrapping_add(1);
        result
    }

    /// Reads the little-endian word at `PC` and advances it twice.
    pub fn get_instr_u16(&mut self) -> u16 {
        let low = self.get_instr_u8() as u16;
        let high = self.get_instr_u8() as u16;
        (high << 8) | low
    }

    /// One-M-cycle bus read.
    pub fn read_byte_cycle(&mut self, address: u16) -> u8 {
        self.add_cycles();
        self.mmu.read_byte(address)
    }

    /// One-M-cycle bus write.
    pub fn write_byte_cycle(&mut self, address: u16, value: u8) {
        self.add_cycles();
        self.mmu.write_byte(address, value);
    }

    /// Two-M-cycle little-endian word read.
    pub fn read_short_cycle(&mut self, address: u16) -> u16 {
        let low = self.read_byte_cycle(address) as u16;
        let high = self.read_byte_cycle(address.wrapping_add(1)) as u16;
        (high << 8) | low
    }

    /// Two-M-cycle little-endian word write.
    pub fn write_short_cycle(&mut self, address: u16, value: u16) {
        self.write_byte_cycle(address, (value & 0xFF) as u8);
        self.write_byte_cycle(address.wrapping_add(1), (value >> 8) as u8);
    }

    /// Services the highest-priority pending interrupt if IME allows it.
    /// Returns whether a dispatch happened (5 M-cycles).
    pub(crate) fn handle_interrupts(&mut self) -> bool {
        let pending = self.mmu.interrupts().pending();
        if pending.is_empty() {
            return false;
        }
        // Pending interrupts always lift HALT, serviced or not.
        self.halted = false;
        if !self.ime {
            return false;
        }

        for interrupt in Interrupt::iter() {
            let flag = InterruptFlags::from_bits_truncate(interrupt as u8);
            if pending.contains(flag) {
                log::trace!("Servicing {:?} interrupt", interrupt);
                self.interrupt_service_routine(interrupt, flag);
                return true;
            }
        }
        false
    }

    /// The 5 M-cycle dispatch: two internal delay cycles, the PC push, and
    /// the jump to the vector.
    fn interrupt_service_routine(&mut self, interrupt: Interrupt, flag: InterruptFlags) {
        self.add_cycles();
        self.add_cycles();

        self.ime = false;
        self.mmu.interrupts_mut().interrupt_flag.remove(flag);
        self.push_helper(self.registers.pc);
        self.registers.pc = interrupt.vector();
    }
}
