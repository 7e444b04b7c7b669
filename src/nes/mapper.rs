use super::NesError;
use super::cartridge::{Cartridge, Region};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mirroring {
    Horizontal,
    Vertical,
    OneScreenLower,
    OneScreenUpper,
    FourScreen,
}

/// Cartridge-side view of the two address spaces. Addresses arrive already
/// decoded into cartridge space: $4020-$FFFF on the CPU side, $0000-$1FFF on
/// the PPU side.
pub trait Mapper {
    fn cpu_read(&mut self, addr: u16) -> u8;
    fn cpu_write(&mut self, addr: u16, value: u8);
    fn ppu_read(&mut self, addr: u16) -> u8;
    fn ppu_write(&mut self, addr: u16, value: u8);
    fn mirroring(&self) -> Mirroring;
    fn region(&self) -> Region;
    fn battery_ram(&self) -> Option<&[u8]> {
        None
    }
    fn load_battery_ram(&mut self, _data: &[u8]) {}
}

pub fn create_mapper(cart: Cartridge) -> Result<Box<dyn Mapper>, NesError> {
    match cart.mapper_id {
        0 => Ok(Box::new(Nrom::new(cart))),
        id => Err(NesError::UnsupportedMapper(id)),
    }
}

/// Mapper 0. One or two fixed 16 KiB PRG banks (a single bank mirrors into
/// $C000-$FFFF), 8 KiB CHR, optional battery-backed PRG RAM at $6000-$7FFF.
struct Nrom {
    prg_rom: Vec<u8>,
    chr: Vec<u8>,
    chr_is_ram: bool,
    prg_ram: Vec<u8>,
    battery: bool,
    mirroring: Mirroring,
    region: Region,
}

impl Nrom {
    fn new(cart: Cartridge) -> Self {
        Self {
            prg_ram: vec![0; cart.ram_len()],
            prg_rom: cart.prg_rom,
            chr: cart.chr_data,
            chr_is_ram: cart.chr_is_ram,
            battery: cart.battery,
            mirroring: cart.mirroring,
            region: cart.region,
        }
    }
}

impl Mapper for Nrom {
    fn cpu_read(&mut self, addr: u16) -> u8 {
        match addr {
            0x6000..=0x7FFF => self.prg_ram[(addr as usize - 0x6000) % self.prg_ram.len()],
            0x8000..=0xFFFF => {
                let mut idx = addr as usize - 0x8000;
                if self.prg_rom.len() == 0x4000 {
                    idx %= 0x4000;
                }
                self.prg_rom[idx]
            }
            _ => 0,
        }
    }

    fn cpu_write(&mut self, addr: u16, value: u8) {
        // PRG ROM is not writable on NROM; only the RAM window takes stores.
        if (0x6000..=0x7FFF).contains(&addr) {
            let idx = (addr as usize - 0x6000) % self.prg_ram.len();
            self.prg_ram[idx] = value;
        }
    }

    fn ppu_read(&mut self, addr: u16) -> u8 {
        self.chr[addr as usize % self.chr.len()]
    }

    fn ppu_write(&mut self, addr: u16, value: u8) {
        if self.chr_is_ram {
            let idx = addr as usize % self.chr.len();
            self.chr[idx] = value;
        }
    }

    fn mirroring(&self) -> Mirroring {
        self.mirroring
    }

    fn region(&self) -> Region {
        self.region
    }

    fn battery_ram(&self) -> Option<&[u8]> {
        self.battery.then_some(self.prg_ram.as_slice())
    }

    fn load_battery_ram(&mut self, data: &[u8]) {
        if self.battery && data.len() == self.prg_ram.len() {
            self.prg_ram.copy_from_slice(data);
        }
    }
}
