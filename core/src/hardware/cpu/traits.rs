//! Operand-resolution traits. An instruction body takes any operand kind
//! (register, memory-through-HL, immediate, high-page) and resolves it to a
//! value through these, charging bus cycles as a side effect.

use crate::hardware::cpu::execute::{InstructionAddress, WrapperEnum};
use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;
use crate::hardware::registers::{Reg16, Reg8};

pub trait ToU8<T: Copy> {
    fn read_u8_value(&mut self, target: T) -> u8;
}

pub trait SetU8<T: Copy> {
    fn set_u8_value(&mut self, target: T, value: u8);
}

pub trait ToU16<T: Copy> {
    fn read_u16_value(&mut self, target: T) -> u16;
}

pub trait SetU16<T: Copy> {
    fn set_u16_value(&mut self, target: T, value: u16);
}

impl<M: MemoryMapper> ToU8<Reg8> for Cpu<M> {
    fn read_u8_value(&mut self, target: Reg8) -> u8 {
        use Reg8::*;
        match target {
            A => self.registers.a,
            B => self.registers.b,
            C => self.registers.c,
            D => self.registers.d,
            E => self.registers.e,
            H => self.registers.h,
            L => self.registers.l,
        }
    }
}

impl<M: MemoryMapper> SetU8<Reg8> for Cpu<M> {
    fn set_u8_value(&mut self, target: Reg8, value: u8) {
        use Reg8::*;
        match target {
            A => self.registers.a = value,
            B => self.registers.b = value,
            C => self.registers.c = value,
            D => self.registers.d = value,
            E => self.registers.e = value,
            H => self.registers.h = value,
            L => self.registers.l = value,
        }
    }
}

impl<M: MemoryMapper> ToU8<InstructionAddress> for Cpu<M> {
    fn read_u8_value(&mut self, target: InstructionAddress) -> u8 {
        use InstructionAddress::*;
        match target {
            BCI => self.read_byte_cycle(self.registers.bc()),
            DEI => self.read_byte_cycle(self.registers.de()),
            HLI => self.read_byte_cycle(self.registers.hl()),
            HLIP => {
                let address = self.registers.hl();
                let result = self.read_byte_cycle(address);
                self.registers.set_hl(address.wrapping_add(1));
                result
            }
            HLIN => {
                let address = self.registers.hl();
                let result = self.read_byte_cycle(address);
                self.registers.set_hl(address.wrapping_sub(1));
                result
            }
            Direct => self.get_instr_u8(),
            DirectMem => {
                let address = self.get_instr_u16();
                self.read_byte_cycle(address)
            }
            IoDirect => {
                let offset = self.get_instr_u8();
                self.read_byte_cycle(0xFF00 | offset as u16)
            }
            IoC => self.read_byte_cycle(0xFF00 | self.registers.c as u16),
        }
    }
}

impl<M: MemoryMapper> SetU8<InstructionAddress> for Cpu<M> {
    fn set_u8_value(&mut self, target: InstructionAddress, value: u8) {
        use InstructionAddress::*;
        match target {
            BCI => self.write_byte_cycle(self.registers.bc(), value),
            DEI => self.write_byte_cycle(self.registers.de(), value),
            HLI => self.write_byte_cycle(self.registers.hl(), value),
            HLIP => {
                let address = self.registers.hl();
                self.write_byte_cycle(address, value);
                self.registers.set_hl(address.wrapping_add(1));
            }
            HLIN => {
                let address = self.registers.hl();
                self.write_byte_cycle(address, value);
                self.registers.set_hl(address.wrapping_sub(1));
            }
            Direct => unreachable!("An immediate operand can not be a store destination"),
            DirectMem => {
                let address = self.get_instr_u16();
                self.write_byte_cycle(address, value);
            }
            IoDirect => {
                let offset = self.get_instr_u8();
                self.write_byte_cycle(0xFF00 | offset as u16, value);
            }
            IoC => self.write_byte_cycle(0xFF00 | self.registers.c as u16, value),
        }
    }
}

impl<M: MemoryMapper> ToU8<WrapperEnum> for Cpu<M> {
    fn read_u8_value(&mut self, target: WrapperEnum) -> u8 {
        match target {
            WrapperEnum::Reg8(register) => self.read_u8_value(register),
            WrapperEnum::InstructionAddress(address) => self.read_u8_value(address),
        }
    }
}

impl<M: MemoryMapper> SetU8<WrapperEnum> for Cpu<M> {
    fn set_u8_value(&mut self, target: WrapperEnum, value: u8) {
        match target {
            WrapperEnum::Reg8(register) => self.set_u8_value(register, value),
            WrapperEnum::InstructionAddress(address) => self.set_u8_value(address, value),
        }
    }
}

impl<M: MemoryMapper> ToU16<Reg16> for Cpu<M> {
    fn read_u16_value(&mut self, target: Reg16) -> u16 {
        use Reg16::*;
        match target {
            AF => self.registers.af(),
            BC => self.registers.bc(),
            DE => self.registers.de(),
            HL => self.registers.hl(),
            SP => self.registers.sp,
        }
    }
}

impl<M: MemoryMapper> SetU16<Reg16> for Cpu<M> {
    fn set_u16_value(&mut self, target: Reg16, value: u16) {
        use Reg16::*;
        match target {
            AF => self.registers.set_af(value),
            BC => self.registers.set_bc(value),
            DE => self.registers.set_de(value),
            HL => self.registers.set_hl(value),
            SP => self.registers.sp = value,
        }
    }
}

impl<M: MemoryMapper> ToU16<InstructionAddress> for Cpu<M> {
    fn read_u16_value(&mut self, target: InstructionAddress) -> u16 {
        match target {
            InstructionAddress::Direct => self.get_instr_u16(),
            _ => unreachable!("No 16-bit read exists for {:?}", target),
        }
    }
}

impl<M: MemoryMapper> SetU16<InstructionAddress> for Cpu<M> {
    fn set_u16_value(&mut self, target: InstructionAddress, value: u16) {
        match target {
            // LD (nn), SP
            InstructionAddress::DirectMem => {
                let address = self.get_instr_u16();
                self.write_short_cycle(address, value);
            }
            _ => unreachable!("No 16-bit store exists for {:?}", target),
        }
    }
}
