//! Headless test-ROM runner. Executes one ROM or whole directories of
//! Blargg/Mooneye suites, captures the serial port, and judges pass/fail
//! from the output the ROMs emit there.

use std::cell::RefCell;
use std::fs::{read, read_dir};
use std::path::{Path, PathBuf};
use std::rc::Rc;

use anyhow::{anyhow, Context, Result};
use gumdrop::Options;
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};

use ferroboy_core::controllers::SerialLink;
use ferroboy_core::{Emulator, EmulatorOptionsBuilder};

use crate::options::AppOptions;

mod options;

/// Registers/serial signature Mooneye ROMs emit on success.
const MOONEYE_PASS: [u8; 6] = [0x03, 0x05, 0x08, 0x0D, 0x15, 0x22];

#[derive(Debug, PartialEq)]
enum Verdict {
    Passed,
    Failed,
    /// The cycle budget ran out without a recognizable result.
    Indeterminate,
}

/// Assembles the bits the guest shifts out back into bytes.
#[derive(Default)]
struct SerialCapture {
    bits: u8,
    current: u8,
    bytes: Rc<RefCell<Vec<u8>>>,
}

impl SerialLink for SerialCapture {
    fn send_bit(&mut self, bit: u8) -> u8 {
        self.current = (self.current << 1) | (bit & 0x1);
        self.bits += 1;
        if self.bits == 8 {
            self.bytes.borrow_mut().push(self.current);
            self.bits = 0;
            self.current = 0;
        }
        // Nothing on the other end of the cable pulls the line low.
        1
    }
}

fn main() -> Result<()> {
    let options: AppOptions = AppOptions::parse_args_default_or_exit();
    let level = if options.verbose { LevelFilter::Debug } else { LevelFilter::Warn };
    let _ = SimpleLogger::init(level, Config::default());

    let boot_rom = if options.boot_rom.is_empty() {
        None
    } else {
        Some(read(&options.boot_rom).context("could not read the boot ROM")?)
    };

    let mut roms = Vec::new();
    if !options.rom.is_empty() {
        roms.push(PathBuf::from(&options.rom));
    }
    if !options.blargg_path.is_empty() {
        roms.extend(list_files_with_extension(&options.blargg_path, ".gb")?);
    }
    if !options.mooneye_path.is_empty() {
        roms.extend(list_files_with_extension(&options.mooneye_path, ".gb")?);
    }
    if roms.is_empty() {
        return Err(anyhow!("no ROMs given; see --help"));
    }

    let mut failures = 0;
    for path in &roms {
        let (verdict, serial_text) = run_test_rom(path, boot_rom.clone(), options.cycle_budget)?;
        println!("{:<60} {:?}", path.display(), verdict);
        if !serial_text.is_empty() {
            println!("    serial: {}", serial_text.trim());
        }
        if verdict != Verdict::Passed {
            failures += 1;
        }
    }

    println!("{}/{} passed", roms.len() - failures, roms.len());
    if failures > 0 {
        std::process::exit(1);
    }
    Ok(())
}

fn run_test_rom(path: &Path, boot_rom: Option<Vec<u8>>, cycle_budget: u64) -> Result<(Verdict, String)> {
    let rom = read(path).with_context(|| format!("could not read {}", path.display()))?;
    let emulator_options = EmulatorOptionsBuilder::new().boot_rom(boot_rom).build();
    let mut emulator = Emulator::new(&rom, emulator_options).map_err(|status| anyhow!("{}", status))?;

    let bytes = Rc::new(RefCell::new(Vec::new()));
    emulator.set_serial_link(Box::new(SerialCapture {
        bytes: bytes.clone(),
        ..Default::default()
    }));

    let mut verdict = Verdict::Indeterminate;
    while emulator.cycles_performed() < cycle_budget {
        if !emulator.tick() {
            break;
        }
        if let Some(result) = judge(&bytes.borrow()) {
            verdict = result;
            break;
        }
    }

    let serial_text = String::from_utf8_lossy(&bytes.borrow()).into_owned();
    Ok((verdict, serial_text))
}

/// Blargg ROMs print "Passed"/"Failed"; Mooneye ROMs emit the Fibonacci
/// signature bytes.
fn judge(serial_bytes: &[u8]) -> Option<Verdict> {
    if contains(serial_bytes, b"Passed") || contains(serial_bytes, &MOONEYE_PASS) {
        return Some(Verdict::Passed);
    }
    if contains(serial_bytes, b"Failed") || contains(serial_bytes, &[0x42; 6]) {
        return Some(Verdict::Failed);
    }
    None
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

/// Recursively lists files below `path` ending in `extension`.
fn list_files_with_extension(path: impl AsRef<Path>, extension: &str) -> Result<Vec<PathBuf>> {
    let mut result = Vec::new();
    if path.as_ref().is_dir() {
        for entry in read_dir(&path)? {
            let entry_path = entry?.path();
            if entry_path.is_dir() {
                result.extend(list_files_with_extension(&entry_path, extension)?);
            } else if entry_path.to_str().map_or(false, |p| p.ends_with(extension)) {
                result.push(entry_path);
            }
        }
    }
    Ok(result)
}
