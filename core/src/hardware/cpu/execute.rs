use crate::hardware::cpu::Cpu;
use crate::hardware::mmu::MemoryMapper;
use crate::hardware::registers::Reg8;

impl<M: MemoryMapper> Cpu<M> {
    pub fn execute(&mut self, opcode: u8) {
        use crate::hardware::registers::Reg16::*;
        use crate::hardware::registers::Reg8::*;
        use InstructionAddress::*;
        match opcode {
            0x00 => self.nop(),
            0x01 => self.load_16bit(BC, Direct),
            0x02 => self.load_8bit(BCI, A),
            0x03 => self.increment16(BC),
            0x04 => self.increment(B),
            0x05 => self.decrement(B),
            0x06 => self.load_8bit(B, Direct),
            0x07 => self.rlca(),
            0x08 => self.load_16bit(DirectMem, SP),
            0x09 => self.add16(BC),
            0x0A => self.load_8bit(A, BCI),
            0x0B => self.decrement16(BC),
            0x0C => self.increment(C),
            0x0D => self.decrement(C),
            0x0E => self.load_8bit(C, Direct),
            0x0F => self.rrca(),
            0x10 => self.stop(),
            0x11 => self.load_16bit(DE, Direct),
            0x12 => self.load_8bit(DEI, A),
            0x13 => self.increment16(DE),
            0x14 => self.increment(D),
            0x15 => self.decrement(D),
            0x16 => self.load_8bit(D, Direct),
            0x17 => self.rla(),
            0x18 => self.relative_jump(JumpModifier::Always),
            0x19 => self.add16(DE),
            0x1A => self.load_8bit(A, DEI),
            0x1B => self.decrement16(DE),
            0x1C => self.increment(E),
            0x1D => self.decrement(E),
            0x1E => self.load_8bit(E, Direct),
            0x1F => self.rra(),
            0x20 => self.relative_jump(JumpModifier::NotZero),
            0x21 => self.load_16bit(HL, Direct),
            0x22 => self.load_8bit(HLIP, A),
            0x23 => self.increment16(HL),
            0x24 => self.increment(H),
            0x25 => self.decrement(H),
            0x26 => self.load_8bit(H, Direct),
            0x27 => self.daa(),
            0x28 => self.relative_jump(JumpModifier::Zero),
            0x29 => self.add16(HL),
            0x2A => self.load_8bit(A, HLIP),
            0x2B => self.decrement16(HL),
            0x2C => self.increment(L),
            0x2D => self.decrement(L),
            0x2E => self.load_8bit(L, Direct),
            0x2F => self.cpl(),
            0x30 => self.relative_jump(JumpModifier::NotCarry),
            0x31 => self.load_16bit(SP, Direct),
            0x32 => self.load_8bit(HLIN, A),
            0x33 => self.increment16(SP),
            0x34 => self.increment(HLI),
            0x35 => self.decrement(HLI),
            0x36 => self.load_8bit(HLI, Direct),
            0x37 => self.scf(),
            0x38 => self.relative_jump(JumpModifier::Carry),
            0x39 => self.add16(SP),
            0x3A => self.load_8bit(A, HLIN),
            0x3B => self.decrement16(SP),
            0x3C => self.increment(A),
            0x3D => self.decrement(A),
            0x3E => self.load_8bit(A, Direct),
            0x3F => self.ccf(),
            0x76 => self.halt(),
            0x40..=0x7F => self.load_8bit(vertical_decode(opcode), horizontal_decode(opcode)),
            0x80..=0x87 => self.add(horizontal_decode(opcode)),
            0x88..=0x8F => self.adc(horizontal_decode(opcode)),
            0x90..=0x97 => self.sub(horizontal_decode(opcode)),
            0x98..=0x9F => self.sbc(horizontal_decode(opcode)),
            0xA0..=0xA7 => self.and(horizontal_decode(opcode)),
            0xA8..=0xAF => self.xor(horizontal_decode(opcode)),
            0xB0..=0xB7 => self.or(horizontal_decode(opcode)),
            0xB8..=0xBF => self.compare(horizontal_decode(opcode)),
            0xC0 => self.ret_conditional(JumpModifier::NotZero),
            0xC1 => self.pop(BC),
            0xC2 => self.jump(JumpModifier::NotZero),
            0xC3 => self.jump(JumpModifier::Always),
            0xC4 => self.call(JumpModifier::NotZero),
            0xC5 => self.push(BC),
            0xC6 => self.add(Direct),
            0xC7 => self.rst(0x00),
            0xC8 => self.ret_conditional(JumpModifier::Zero),
            0xC9 => self.ret(),
            0xCA => self.jump(JumpModifier::Zero),
            0xCB => self.cb_prefix_call(),
            0xCC => self.call(JumpModifier::Zero),
            0xCD => self.call(JumpModifier::Always),
            0xCE => self.adc(Direct),
            0xCF => self.rst(0x08),
            0xD0 => self.ret_conditional(JumpModifier::NotCarry),
            0xD1 => self.pop(DE),
            0xD2 => self.jump(JumpModifier::NotCarry),
            0xD4 => self.call(JumpModifier::NotCarry),
            0xD5 => self.push(DE),
            0xD6 => self.sub(Direct),
            0xD7 => self.rst(0x10),
            0xD8 => self.ret_conditional(JumpModifier::Carry),
            0xD9 => self.reti(),
            0xDA => self.jump(JumpModifier::Carry),
            0xDC => self.call(JumpModifier::Carry),
            0xDE => self.sbc(Direct),
            0xDF => self.rst(0x18),
            0xE0 => self.load_8bit(IoDirect, A),
            0xE1 => self.pop(HL),
            0xE2 => self.load_8bit(IoC, A),
            0xE5 => self.push(HL),
            0xE6 => self.and(Direct),
            0xE7 => self.rst(0x20),
            0xE8 => self.add_sp(),
            0xE9 => self.jump_hl(),
            0xEA => self.load_8bit(DirectMem, A),
            0xEE => self.xor(Direct),
            0xEF => self.rst(0x28),
            0xF0 => self.load_8bit(A, IoDirect),
            0xF1 => self.pop(AF),
            0xF2 => self.load_8bit(A, IoC),
            0xF3 => self.di(),
            0xF5 => self.push(AF),
            0xF6 => self.or(Direct),
            0xF7 => self.rst(0x30),
            0xF8 => self.load_hl_sp_offset(),
            0xF9 => self.load_sp_hl(),
            0xFA => self.load_8bit(A, DirectMem),
            0xFB => self.ei(),
            0xFE => self.compare(Direct),
            0xFF => self.rst(0x38),
            0xD3 | 0xDB | 0xDD | 0xE3 | 0xE4 | 0xEB | 0xEC | 0xED | 0xF4 | 0xFC | 0xFD => self.illegal(),
        }
    }

    pub fn execute_prefix(&mut self, opcode: u8) {
        match opcode {
            0x00..=0x07 => self.rlc(horizontal_decode(opcode)),
            0x08..=0x0F => self.rrc(horizontal_decode(opcode)),
            0x10..=0x17 => self.rl(horizontal_decode(opcode)),
            0x18..=0x1F => self.rr(horizontal_decode(opcode)),
            0x20..=0x27 => self.sla(horizontal_decode(opcode)),
            0x28..=0x2F => self.sra(horizontal_decode(opcode)),
            0x30..=0x37 => self.swap(horizontal_decode(opcode)),
            0x38..=0x3F => self.srl(horizontal_decode(opcode)),
            0x40..=0x7F => self.bit(decode_prefixed_bit(opcode), horizontal_decode(opcode)),
            0x80..=0xBF => self.res(decode_prefixed_bit(opcode), horizontal_decode(opcode)),
            0xC0..=0xFF => self.set(decode_prefixed_bit(opcode), horizontal_decode(opcode)),
        }
    }
}

/// Non-register operand kinds an opcode can name.
#[derive(Debug, Copy, Clone)]
pub enum InstructionAddress {
    /// (BC)
    BCI,
    /// (DE)
    DEI,
    /// (HL)
    HLI,
    /// (HL+), post-increment
    HLIP,
    /// (HL-), post-decrement
    HLIN,
    /// Immediate byte/word following the opcode
    Direct,
    /// Memory at an immediate 16-bit address
    DirectMem,
    /// High page 0xFF00 + immediate byte
    IoDirect,
    /// High page 0xFF00 + C
    IoC,
}

/// Either side of the regular 8-bit operand grid.
#[derive(Debug, Copy, Clone)]
pub enum WrapperEnum {
    Reg8(Reg8),
    InstructionAddress(InstructionAddress),
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum JumpModifier {
    NotZero,
    Zero,
    NotCarry,
    Carry,
    Always,
}

/// Bit index for the CB BIT/RES/SET quadrants.
pub fn decode_prefixed_bit(opcode: u8) -> u8 {
    ((opcode >> 3) & 0x7) as u8
}

/// Operand from the low nibble: B C D E H L (HL) A, repeating every 8.
pub fn horizontal_decode(opcode: u8) -> WrapperEnum {
    match opcode & 0x7 {
        0x0 => WrapperEnum::Reg8(Reg8::B),
        0x1 => WrapperEnum::Reg8(Reg8::C),
        0x2 => WrapperEnum::Reg8(Reg8::D),
        0x3 => WrapperEnum::Reg8(Reg8::E),
        0x4 => WrapperEnum::Reg8(Reg8::H),
        0x5 => WrapperEnum::Reg8(Reg8::L),
        0x6 => WrapperEnum::InstructionAddress(InstructionAddress::HLI),
        _ => WrapperEnum::Reg8(Reg8::A),
    }
}

/// Destination operand for the 0x40..=0x7F load block, one per 8 opcodes.
pub fn vertical_decode(opcode: u8) -> WrapperEnum {
    match (opcode >> 3) & 0x7 {
        0x0 => WrapperEnum::Reg8(Reg8::B),
        0x1 => WrapperEnum::Reg8(Reg8::C),
        0x2 => WrapperEnum::Reg8(Reg8::D),
        0x3 => WrapperEnum::Reg8(Reg8::E),
        0x4 => WrapperEnum::Reg8(Reg8::H),
        0x5 => WrapperEnum::Reg8(Reg8::L),
        0x6 => WrapperEnum::InstructionAddress(InstructionAddress::HLI),
        _ => WrapperEnum::Reg8(Reg8::A),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefixed_bit_covers_all_eight() {
        assert_eq!(decode_prefixed_bit(0x40), 0);
        assert_eq!(decode_prefixed_bit(0x7F), 7);
        assert_eq!(decode_prefixed_bit(0x58), 3);
    }

    #[test]
    fn horizontal_decode_hits_memory_on_6() {
        assert!(matches!(
            horizontal_decode(0x46),
            WrapperEnum::InstructionAddress(InstructionAddress::HLI)
        ));
        assert!(matches!(horizontal_decode(0x47), WrapperEnum::Reg8(Reg8::A)));
    }
}
