pub mod apu;
pub mod bus;
pub mod cartridge;
pub mod controller;
pub mod cpu;
pub mod mapper;
mod palette;
pub mod ppu;

use std::{error::Error, fmt, path::Path};

use bus::CpuBus;
use cpu::Cpu;

pub use cartridge::{Cartridge, Region};
pub use controller::{
    BUTTON_A, BUTTON_B, BUTTON_DOWN, BUTTON_LEFT, BUTTON_RIGHT, BUTTON_SELECT, BUTTON_START,
    BUTTON_UP,
};
pub use ppu::{FRAME_HEIGHT, FRAME_WIDTH};

/// Errors surfaced to the driver. Nothing inside the emulated machine errors;
/// these cover loading and the external sinks/sources only.
#[derive(Debug)]
pub enum NesError {
    RomInvalid(String),
    UnsupportedMapper(u8),
    SinkFailure(&'static str),
    InputClosed,
}

impl fmt::Display for NesError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NesError::RomInvalid(reason) => write!(f, "invalid ROM: {reason}"),
            NesError::UnsupportedMapper(id) => write!(f, "unsupported mapper {id}"),
            NesError::SinkFailure(which) => write!(f, "{which} sink failed"),
            NesError::InputClosed => write!(f, "input source closed"),
        }
    }
}

impl Error for NesError {}

/// The console: CPU plus the bus that owns everything else. The coordinator
/// here steps one instruction at a time; the bus runs the PPU and APU up to
/// the current cycle during the instruction's own memory traffic, and the
/// remaining internal cycles are paid afterwards.
pub struct Nes {
    cpu: Cpu,
    bus: CpuBus,
}

impl std::fmt::Debug for Nes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Nes").finish_non_exhaustive()
    }
}

impl Nes {
    pub fn from_path(path: &Path) -> Result<Self, NesError> {
        Self::from_cartridge(Cartridge::from_file(path)?)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NesError> {
        Self::from_cartridge(Cartridge::from_bytes(bytes)?)
    }

    pub fn from_cartridge(cart: Cartridge) -> Result<Self, NesError> {
        let mapper = mapper::create_mapper(cart)?;
        let mut nes = Self {
            cpu: Cpu::new(),
            bus: CpuBus::new(mapper),
        };
        nes.reset();
        Ok(nes)
    }

    pub fn reset(&mut self) {
        self.bus.reset();
        self.cpu.reset(&mut self.bus);
    }

    /// Execute one CPU instruction (or one stall/interrupt slot) and bring
    /// the PPU and APU up to date. Returns the CPU cycles consumed.
    pub fn step(&mut self) -> u32 {
        self.bus.begin_instruction();
        let cycles = self.cpu.step(&mut self.bus);
        let ticked = self.bus.end_instruction();
        if cycles > ticked {
            self.bus.tick_chips(cycles - ticked);
        }
        cycles
    }

    /// Run until the PPU finishes the current frame.
    pub fn run_frame(&mut self) {
        self.bus.ppu.clear_frame_complete();
        let mut guard: u32 = 0;
        while !self.bus.ppu.frame_complete() && !self.cpu.halted {
            self.step();

            guard += 1;
            if guard > 5_000_000 {
                break;
            }
        }
    }

    pub fn frame_buffer(&self) -> &[u8] {
        self.bus.ppu.frame_buffer()
    }

    pub fn region(&self) -> Region {
        self.bus.mapper.region()
    }

    pub fn total_cycles(&self) -> u64 {
        self.bus.cycles
    }

    pub fn halted(&self) -> bool {
        self.cpu.halted
    }

    pub fn set_controller_state(&mut self, port: usize, state: u8) {
        self.bus.controllers.set_state(port, state);
    }

    pub fn set_audio_sample_rate(&mut self, sample_rate: u32) {
        self.bus.apu.set_sample_rate(sample_rate);
    }

    pub fn take_audio_samples(&mut self) -> Vec<i16> {
        self.bus.apu.take_samples()
    }

    pub fn set_show_background(&mut self, show: bool) {
        self.bus.ppu.set_show_background(show);
    }

    pub fn set_show_sprites(&mut self, show: bool) {
        self.bus.ppu.set_show_sprites(show);
    }

    pub fn show_background(&self) -> bool {
        self.bus.ppu.show_background()
    }

    pub fn show_sprites(&self) -> bool {
        self.bus.ppu.show_sprites()
    }

    pub fn battery_ram(&self) -> Option<&[u8]> {
        self.bus.mapper.battery_ram()
    }

    pub fn load_battery_ram(&mut self, data: &[u8]) {
        self.bus.mapper.load_battery_ram(data);
    }
}
