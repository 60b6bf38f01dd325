use criterion::{criterion_group, criterion_main, Criterion};
use ferroboy_core::{Emulator, EmulatorOptionsBuilder};

/// 32 KiB ROM-only image whose entry point jumps into a tight bus-write
/// loop, enough to exercise the CPU, bus and PPU paths.
fn busy_loop_rom() -> Vec<u8> {
    let mut rom = vec![0u8; 0x8000];
    rom[0x100..0x103].copy_from_slice(&[0xC3, 0x50, 0x01]); // JP 0x0150
    // LD HL, 0xC000; INC A; LD (HL), A; JR -4
    rom[0x150..0x157].copy_from_slice(&[0x21, 0x00, 0xC0, 0x3C, 0x77, 0x18, 0xFC]);
    rom
}

fn frame_benchmark(c: &mut Criterion) {
    let rom = busy_loop_rom();
    c.bench_function("run one frame", |b| {
        let mut emulator = Emulator::new(&rom, EmulatorOptionsBuilder::new().build()).unwrap();
        b.iter(|| {
            emulator.run_until_frame();
        });
    });
}

criterion_group!(benches, frame_benchmark);
criterion_main!(benches);
