//! Machine-cycle accounting and interrupt/HALT sequencing.

use crate::hardware::cpu::tests::cpu_with_program;
use crate::io::interrupts::InterruptFlags;
use pretty_assertions::assert_eq;

/// M-cycles consumed by the next instruction boundary.
fn step_cycles(cpu: &mut crate::hardware::cpu::Cpu<super::TestMemory>) -> u64 {
    let before = cpu.cycles_performed;
    cpu.step();
    (cpu.cycles_performed - before) / 4
}

#[test]
fn representative_instruction_cycle_counts() {
    // NOP
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x00])), 1);
    // LD B, n
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x06, 0x01])), 2);
    // LD B, C
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x41])), 1);
    // LD B, (HL)
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x46])), 2);
    // INC (HL)
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x34])), 3);
    // LD BC, nn
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x01, 0x00, 0x00])), 3);
    // INC BC
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x03])), 2);
    // ADD HL, BC
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x09])), 2);
    // LD (nn), SP
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x08, 0x00, 0x90])), 5);
    // PUSH BC
    let mut cpu = cpu_with_program(&[0xC5]);
    cpu.registers.sp = 0xFFFE;
    assert_eq!(step_cycles(&mut cpu), 4);
    // POP BC
    let mut cpu = cpu_with_program(&[0xC1]);
    cpu.registers.sp = 0xFFFC;
    assert_eq!(step_cycles(&mut cpu), 3);
    // ADD SP, e8
    assert_eq!(step_cycles(&mut cpu_with_program(&[0xE8, 0x01])), 4);
    // LD HL, SP+e8
    assert_eq!(step_cycles(&mut cpu_with_program(&[0xF8, 0x01])), 3);
    // RST 0x38
    let mut cpu = cpu_with_program(&[0xFF]);
    cpu.registers.sp = 0xFFFE;
    assert_eq!(step_cycles(&mut cpu), 4);
    // CB RLC B / CB RLC (HL)
    assert_eq!(step_cycles(&mut cpu_with_program(&[0xCB, 0x00])), 2);
    assert_eq!(step_cycles(&mut cpu_with_program(&[0xCB, 0x06])), 4);
    // CB BIT 0, (HL) only reads.
    assert_eq!(step_cycles(&mut cpu_with_program(&[0xCB, 0x46])), 3);
}

#[test]
fn control_flow_cycle_counts_depend_on_the_branch() {
    // JR taken / not taken
    assert_eq!(step_cycles(&mut cpu_with_program(&[0x18, 0x00])), 3);
    let mut cpu = cpu_with_program(&[0x20, 0x00]);
    cpu.registers.set_zf(true);
    assert_eq!(step_cycles(&mut cpu), 2);

    // JP taken / not taken
    assert_eq!(step_cycles(&mut cpu_with_program(&[0xC3, 0x00, 0x01])), 4);
    let mut cpu = cpu_with_program(&[0xC2, 0x00, 0x01]);
    cpu.registers.set_zf(true);
    assert_eq!(step_cycles(&mut cpu), 3);

    // CALL taken / not taken
    let mut cpu = cpu_with_program(&[0xCD, 0x00, 0x01]);
    cpu.registers.sp = 0xFFFE;
    assert_eq!(step_cycles(&mut cpu), 6);
    let mut cpu = cpu_with_program(&[0xC4, 0x00, 0x01]);
    cpu.registers.set_zf(true);
    assert_eq!(step_cycles(&mut cpu), 3);

    // RET / RETI / RET cc taken / RET cc not taken
    let mut cpu = cpu_with_program(&[0xC9]);
    cpu.registers.sp = 0xFFFC;
    assert_eq!(step_cycles(&mut cpu), 4);
    let mut cpu = cpu_with_program(&[0xD9]);
    cpu.registers.sp = 0xFFFC;
    assert_eq!(step_cycles(&mut cpu), 4);
    let mut cpu = cpu_with_program(&[0xC0]);
    cpu.registers.sp = 0xFFFC;
    assert_eq!(step_cycles(&mut cpu), 5);
    let mut cpu = cpu_with_program(&[0xC0]);
    cpu.registers.set_zf(true);
    assert_eq!(step_cycles(&mut cpu), 2);
}

#[test]
fn interrupt_dispatch_takes_five_cycles_and_clears_if() {
    let mut cpu = cpu_with_program(&[0x00; 16]);
    cpu.registers.sp = 0xFFFE;
    cpu.ime = true;
    cpu.mmu.interrupts.overwrite_enable(0x04);
    cpu.mmu.interrupts.request(InterruptFlags::TIMER);

    let before = cpu.cycles_performed;
    cpu.step();
    assert_eq!((cpu.cycles_performed - before) / 4, 5);
    assert_eq!(cpu.registers.pc, 0x0050);
    assert!(!cpu.ime);
    assert!(cpu.mmu.interrupts.interrupt_flag.is_empty());
    // The old PC sits on the stack.
    assert_eq!(cpu.mmu.mem[0xFFFC], 0x00);
}

#[test]
fn lower_interrupt_bits_win_ties() {
    let mut cpu = cpu_with_program(&[0x00; 16]);
    cpu.registers.sp = 0xFFFE;
    cpu.ime = true;
    cpu.mmu.interrupts.overwrite_enable(0x1F);
    cpu.mmu.interrupts.overwrite_flag(0x1F);

    cpu.step();
    assert_eq!(cpu.registers.pc, 0x0040);
    // Only the serviced bit was cleared.
    assert_eq!(cpu.mmu.interrupts.interrupt_flag.bits(), 0x1E);
}

#[test]
fn ei_enables_ime_only_after_the_next_instruction() {
    // EI; NOP; NOP with a pending, enabled interrupt.
    let mut cpu = cpu_with_program(&[0xFB, 0x00, 0x00]);
    cpu.registers.sp = 0xFFFE;
    cpu.mmu.interrupts.overwrite_enable(0x01);
    cpu.mmu.interrupts.request(InterruptFlags::VBLANK);

    cpu.step(); // EI
    assert!(!cpu.ime);
    cpu.step(); // NOP, IME becomes effective after this boundary
    assert!(cpu.ime);
    assert_eq!(cpu.registers.pc, 0x0002);

    cpu.step(); // dispatch
    assert_eq!(cpu.registers.pc, 0x0040);
}

#[test]
fn di_disables_immediately() {
    let mut cpu = cpu_with_program(&[0xF3, 0x00]);
    cpu.ime = true;
    cpu.mmu.interrupts.overwrite_enable(0x01);
    cpu.mmu.interrupts.request(InterruptFlags::VBLANK);

    cpu.step(); // DI
    cpu.step(); // NOP, no dispatch
    assert_eq!(cpu.registers.pc, 0x0002);
}

#[test]
fn halt_wakes_without_service_when_ime_is_clear() {
    // HALT; INC A
    let mut cpu = cpu_with_program(&[0x76, 0x3C]);
    cpu.mmu.interrupts.overwrite_enable(0x01);

    cpu.step();
    assert!(cpu.halted);
    cpu.step();
    assert!(cpu.halted);

    cpu.mmu.interrupts.request(InterruptFlags::VBLANK);
    cpu.step();
    assert!(!cpu.halted);
    assert_eq!(cpu.registers.a, 1);
    assert_eq!(cpu.registers.pc, 0x0002);
}

#[test]
fn halt_bug_reads_the_next_byte_twice() {
    // IME=0, IE and IF both set: HALT; INC A; NOP
    let mut cpu = cpu_with_program(&[0x76, 0x3C, 0x00]);
    cpu.mmu.interrupts.overwrite_enable(0x01);
    cpu.mmu.interrupts.overwrite_flag(0x01);

    cpu.step(); // HALT triggers the bug, no halt state
    assert!(!cpu.halted);
    assert_eq!(cpu.registers.pc, 0x0001);

    cpu.step();
    assert_eq!(cpu.registers.a, 1);
    // The PC increment was lost, 0x3C executes again.
    cpu.step();
    assert_eq!(cpu.registers.a, 2);
    assert_eq!(cpu.registers.pc, 0x0002);
}

#[test]
fn halted_cpu_burns_one_cycle_per_step() {
    let mut cpu = cpu_with_program(&[0x76]);
    cpu.ime = true;
    cpu.step();
    assert!(cpu.halted);

    assert_eq!(step_cycles(&mut cpu), 1);
    assert_eq!(step_cycles(&mut cpu), 1);
}

#[test]
fn halted_cpu_services_interrupt_with_ime() {
    let mut cpu = cpu_with_program(&[0x76, 0x00]);
    cpu.registers.sp = 0xFFFE;
    cpu.ime = true;
    cpu.mmu.interrupts.overwrite_enable(0x04);

    cpu.step();
    assert!(cpu.halted);

    cpu.mmu.interrupts.request(InterruptFlags::TIMER);
    cpu.step();
    assert!(!cpu.halted);
    assert_eq!(cpu.registers.pc, 0x0050);
}
