//! Four-channel APU ticked in lockstep with the bus. The frame sequencer is
//! clocked externally from the divider counter's 512 Hz edge, and a sample
//! pair is produced for the host every [`SAMPLE_CYCLES`] master clocks.

use crate::emulator::GameBoyModel;
use crate::hardware::apu::noise_channel::NoiseChannel;
use crate::hardware::apu::square_channel::SquareWaveChannel;
use crate::hardware::apu::wave_channel::WaveformChannel;
use crate::util::{read_u8, read_u16, set_bit, test_bit, write_u8, write_u16};
use std::io::{self, Read, Write};

pub mod channel_features;
pub mod noise_channel;
pub mod square_channel;
pub mod wave_channel;

pub const APU_MEM_START: u16 = 0xFF10;
pub const APU_MEM_END: u16 = 0xFF2F;
pub const WAVE_SAMPLE_START: u16 = 0xFF30;
pub const WAVE_SAMPLE_END: u16 = 0xFF3F;

/// Master clocks between emitted sample pairs, ~44.1 kHz.
pub const SAMPLE_CYCLES: u16 = 95;
pub const INVALID_APU_READ: u8 = 0xFF;

/// Length counters fire on even sequencer steps; `step` here is the next
/// step the sequencer will execute.
pub(crate) fn no_length_tick_next_step(step: u8) -> bool {
    step % 2 == 1
}

#[derive(Debug)]
pub struct Apu {
    pub(crate) voice1: SquareWaveChannel,
    pub(crate) voice2: SquareWaveChannel,
    pub(crate) voice3: WaveformChannel,
    pub(crate) voice4: NoiseChannel,

    pub(crate) vin_l_enable: bool,
    pub(crate) vin_r_enable: bool,
    pub(crate) left_volume: u8,
    pub(crate) right_volume: u8,
    /// NR51 routing, index 0..=3 for channels 1..=4.
    pub(crate) left_channel_enable: [bool; 4],
    pub(crate) right_channel_enable: [bool; 4],
    pub(crate) power: bool,
    /// The step the sequencer will execute on its next clock.
    pub(crate) frame_sequencer_step: u8,
    pub(crate) sample_counter: u16,

    output_buffer: Vec<f32>,
}

impl Apu {
    pub fn new() -> Self {
        Apu {
            voice1: SquareWaveChannel::default(),
            voice2: SquareWaveChannel::default(),
            voice3: WaveformChannel::default(),
            voice4: NoiseChannel::default(),
            vin_l_enable: false,
            vin_r_enable: false,
            left_volume: 7,
            right_volume: 7,
            left_channel_enable: [true; 4],
            right_channel_enable: [true, true, false, false],
            power: true,
            frame_sequencer_step: 0,
            sample_counter: 0,
            output_buffer: Vec::with_capacity(1024),
        }
    }

    /// Advances all channel timers by `cycles` master clocks and emits
    /// samples at the host rate. Sample cadence continues while the APU is
    /// powered down, pushing silence.
    pub fn tick(&mut self, cycles: u16) {
        if self.power {
            self.voice1.tick_timer(cycles);
            self.voice2.tick_timer(cycles);
            self.voice3.tick_timer(cycles);
            self.voice4.tick_timer(cycles);
        }

        self.sample_counter += cycles;
        while self.sample_counter >= SAMPLE_CYCLES {
            self.sample_counter -= SAMPLE_CYCLES;
            self.generate_sample();
        }
    }

    /// 512 Hz clock derived from the divider; steps length, sweep and
    /// envelope phases.
    pub fn tick_frame_sequencer(&mut self) {
        if !self.power {
            return;
        }
        match self.frame_sequencer_step {
            0 | 4 => self.tick_lengths(),
            2 | 6 => {
                self.tick_lengths();
                self.voice1.tick_sweep();
            }
            7 => {
                self.voice1.tick_envelope();
                self.voice2.tick_envelope();
                self.voice4.tick_envelope();
            }
            _ => {}
        }
        self.frame_sequencer_step = (self.frame_sequencer_step + 1) % 8;
    }

    fn tick_lengths(&mut self) {
        self.voice1.tick_length();
        self.voice2.tick_length();
        self.voice3.tick_length();
        self.voice4.tick_length();
    }

    fn generate_sample(&mut self) {
        let left = self.mix_side(self.left_channel_enable, self.left_volume);
        let right = self.mix_side(self.right_channel_enable, self.right_volume);
        self.output_buffer.push(left);
        self.output_buffer.push(right);
    }

    /// Raw DAC sum for one side, scaled by the NR50 master volume into
    /// [-1, 1]. No filtering.
    fn mix_side(&self, enables: [bool; 4], volume: u8) -> f32 {
        let dacs = [
            (enables[0], self.voice1.dac_enabled(), self.voice1.output_volume()),
            (enables[1], self.voice2.dac_enabled(), self.voice2.output_volume()),
            (enables[2], self.voice3.dac_enabled(), self.voice3.output_volume()),
            (enables[3], self.voice4.dac_enabled(), self.voice4.output_volume()),
        ];

        let mut sum = 0f32;
        for (routed, dac_on, output) in dacs.iter() {
            if *routed && *dac_on && self.power {
                // A powered DAC maps its 0..=15 input onto -1..=1.
                sum += (*output as f32) / 7.5 - 1.0;
            }
        }
        (sum / 4.0) * ((volume + 1) as f32 / 8.0)
    }

    /// Sample pairs accumulated since the last drain.
    pub fn drain_samples(&mut self) -> std::vec::Drain<'_, f32> {
        self.output_buffer.drain(..)
    }

    pub fn read_register(&self, address: u16) -> u8 {
        let address = address & 0xFF;
        match address {
            0x10..=0x14 => self.voice1.read_register(address),
            0x15..=0x19 => self.voice2.read_register(address),
            0x1A..=0x1E => self.voice3.read_register(address),
            0x1F..=0x23 => self.voice4.read_register(address),
            0x24 => {
                let mut output = (self.left_volume << 4) | self.right_volume;
                set_bit(&mut output, 7, self.vin_l_enable);
                set_bit(&mut output, 3, self.vin_r_enable);
                output
            }
            0x25 => {
                let mut output = 0;
                for i in 0..4u8 {
                    set_bit(&mut output, i, self.right_channel_enable[i as usize]);
                    set_bit(&mut output, i + 4, self.left_channel_enable[i as usize]);
                }
                output
            }
            0x26 => {
                let mut output = 0x70;
                set_bit(&mut output, 7, self.power);
                set_bit(&mut output, 0, self.voice1.enabled());
                set_bit(&mut output, 1, self.voice2.enabled());
                set_bit(&mut output, 2, self.voice3.enabled());
                set_bit(&mut output, 3, self.voice4.enabled());
                output
            }
            0x27..=0x2F => INVALID_APU_READ,
            _ => unreachable!("APU register read out of range: 0xFF{:02X}", address),
        }
    }

    pub fn write_register(&mut self, address: u16, value: u8, model: GameBoyModel) {
        let address = address & 0xFF;

        // With the APU powered off everything but NR52 is read-only, except
        // the DMG's length loads.
        if !self.power && address != 0x26 && !(model.is_dmg() && matches!(address, 0x11 | 0x16 | 0x1B | 0x20)) {
            log::trace!("Dropped APU write while powered off: 0xFF{:02X}", address);
            return;
        }

        match address {
            0x10..=0x14 => self.voice1.write_register(address, value, self.frame_sequencer_step),
            0x15..=0x19 => self.voice2.write_register(address, value, self.frame_sequencer_step),
            0x1A..=0x1E => self.voice3.write_register(address, value, self.frame_sequencer_step),
            0x1F..=0x23 => self.voice4.write_register(address, value, self.frame_sequencer_step),
            0x24 => {
                self.vin_l_enable = test_bit(value, 7);
                self.vin_r_enable = test_bit(value, 3);
                self.left_volume = (value >> 4) & 0x7;
                self.right_volume = value & 0x7;
            }
            0x25 => {
                for i in 0..4u8 {
                    self.right_channel_enable[i as usize] = test_bit(value, i);
                    self.left_channel_enable[i as usize] = test_bit(value, i + 4);
                }
            }
            0x26 => {
                let was_powered = self.power;
                self.power = test_bit(value, 7);
                if was_powered && !self.power {
                    self.power_off(model);
                } else if !was_powered && self.power {
                    self.frame_sequencer_step = 0;
                }
            }
            0x27..=0x2F => {}
            _ => unreachable!("APU register write out of range: 0xFF{:02X}", address),
        }
    }

    pub fn read_wave_sample(&self, address: u16) -> u8 {
        self.voice3.read_register(address & 0xFF)
    }

    pub fn write_wave_sample(&mut self, address: u16, value: u8) {
        // Wave RAM is writable even with the APU off.
        self.voice3.write_register(address & 0xFF, value, self.frame_sequencer_step);
    }

    pub fn save_state(&self, writer: &mut dyn Write) -> io::Result<()> {
        self.voice1.save_state(writer)?;
        self.voice2.save_state(writer)?;
        self.voice3.save_state(writer)?;
        self.voice4.save_state(writer)?;
        write_u8(writer, self.read_register(0x24))?;
        write_u8(writer, self.read_register(0x25))?;
        write_u8(writer, self.power as u8)?;
        write_u8(writer, self.frame_sequencer_step)?;
        write_u16(writer, self.sample_counter)
    }

    pub fn load_state(&mut self, reader: &mut dyn Read) -> io::Result<()> {
        self.voice1.load_state(reader)?;
        self.voice2.load_state(reader)?;
        self.voice3.load_state(reader)?;
        self.voice4.load_state(reader)?;
        let nr50 = read_u8(reader)?;
        let nr51 = read_u8(reader)?;
        self.power = read_u8(reader)? != 0;
        self.frame_sequencer_step = read_u8(reader)? % 8;
        self.sample_counter = read_u16(reader)?;

        self.vin_l_enable = test_bit(nr50, 7);
        self.vin_r_enable = test_bit(nr50, 3);
        self.left_volume = (nr50 >> 4) & 0x7;
        self.right_volume = nr50 & 0x7;
        for i in 0..4u8 {
            self.right_channel_enable[i as usize] = test_bit(nr51, i);
            self.left_channel_enable[i as usize] = test_bit(nr51, i + 4);
        }
        Ok(())
    }

    fn power_off(&mut self, model: GameBoyModel) {
        let keep_length = model.is_dmg();
        self.voice1.reset(keep_length);
        self.voice2.reset(keep_length);
        self.voice3.reset(keep_length);
        self.voice4.reset(keep_length);
        self.vin_l_enable = false;
        self.vin_r_enable = false;
        self.left_volume = 0;
        self.right_volume = 0;
        self.left_channel_enable = [false; 4];
        self.right_channel_enable = [false; 4];
        self.frame_sequencer_step = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sample_cadence_matches_the_divider() {
        let mut apu = Apu::new();
        for _ in 0..SAMPLE_CYCLES {
            apu.tick(4);
        }
        // 95 ticks of 4 cycles = 4 sample pairs.
        assert_eq!(apu.drain_samples().count(), 8);
    }

    #[test]
    fn power_off_clears_registers_and_gates_writes() {
        let mut apu = Apu::new();
        apu.write_register(0x24, 0x77, GameBoyModel::Dmg);
        apu.write_register(0x26, 0x00, GameBoyModel::Dmg);

        assert_eq!(apu.read_register(0x24), 0x00);
        assert_eq!(apu.read_register(0x26) & 0x80, 0);

        // NR50 writes are ignored while powered off.
        apu.write_register(0x24, 0x44, GameBoyModel::Dmg);
        assert_eq!(apu.read_register(0x24), 0x00);
    }

    #[test]
    fn power_on_restarts_the_frame_sequencer() {
        let mut apu = Apu::new();
        apu.tick_frame_sequencer();
        apu.tick_frame_sequencer();
        assert_eq!(apu.frame_sequencer_step, 2);

        apu.write_register(0x26, 0x00, GameBoyModel::Dmg);
        apu.write_register(0x26, 0x80, GameBoyModel::Dmg);
        assert_eq!(apu.frame_sequencer_step, 0);
    }

    #[test]
    fn nr52_reports_channel_status() {
        let mut apu = Apu::new();
        apu.write_register(0x12, 0xF0, GameBoyModel::Dmg);
        apu.write_register(0x14, 0x80, GameBoyModel::Dmg);
        assert_eq!(apu.read_register(0x26) & 0x0F, 0x01);
    }

    #[test]
    fn length_sequencer_silences_a_channel() {
        let mut apu = Apu::new();
        apu.write_register(0x12, 0xF0, GameBoyModel::Dmg);
        apu.write_register(0x11, 62, GameBoyModel::Dmg); // counter = 2
        apu.write_register(0x14, 0xC0, GameBoyModel::Dmg);

        // Steps 0 and 2 clock the length counter twice.
        apu.tick_frame_sequencer();
        apu.tick_frame_sequencer();
        apu.tick_frame_sequencer();
        assert_eq!(apu.read_register(0x26) & 0x01, 0);
    }

    #[test]
    fn wave_ram_is_writable_while_powered_off() {
        let mut apu = Apu::new();
        apu.write_register(0x26, 0x00, GameBoyModel::Dmg);
        apu.write_wave_sample(0x30, 0x5A);
        assert_eq!(apu.read_wave_sample(0x30), 0x5A);
    }
}
