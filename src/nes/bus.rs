use super::apu::Apu;
use super::cartridge::Region;
use super::controller::Controllers;
use super::mapper::Mapper;
use super::ppu::Ppu;

/// CPU-side address space. Owns the PPU, APU, mapper and controller ports so
/// that every bus access can first run the other chips up to the current CPU
/// cycle; memory-mapped register traffic then lands on the exact dot.
pub struct CpuBus {
    pub(crate) ram: [u8; 2048],
    pub(crate) ppu: Ppu,
    pub(crate) apu: Apu,
    pub(crate) mapper: Box<dyn Mapper>,
    pub(crate) controllers: Controllers,

    open_bus: u8,
    pub(crate) dma_stall: u32,
    nmi_pending: bool,
    pub(crate) cycles: u64,

    // PPU dots owed per CPU cycle, as a ratio: 3/1 NTSC, 16/5 PAL.
    dot_num: u32,
    dot_den: u32,
    dot_credit: u32,

    instruction_active: bool,
    ticked_cycles: u32,
}

impl CpuBus {
    pub fn new(mapper: Box<dyn Mapper>) -> Self {
        let region = mapper.region();
        let (dot_num, dot_den) = match region {
            Region::Ntsc => (3, 1),
            Region::Pal => (16, 5),
        };
        Self {
            ram: [0; 2048],
            ppu: Ppu::new(region),
            apu: Apu::new(region),
            mapper,
            controllers: Controllers::new(),
            open_bus: 0,
            dma_stall: 0,
            nmi_pending: false,
            cycles: 0,
            dot_num,
            dot_den,
            dot_credit: 0,
            instruction_active: false,
            ticked_cycles: 0,
        }
    }

    /// Console reset: chips restart, RAM contents survive.
    pub fn reset(&mut self) {
        self.ppu.reset();
        self.apu.reset();
        self.open_bus = 0;
        self.dma_stall = 0;
        self.nmi_pending = false;
        self.cycles = 0;
        self.dot_credit = 0;
        self.instruction_active = false;
        self.ticked_cycles = 0;
    }

    pub(crate) fn begin_instruction(&mut self) {
        self.instruction_active = true;
        self.ticked_cycles = 0;
    }

    pub(crate) fn end_instruction(&mut self) -> u32 {
        self.instruction_active = false;
        std::mem::take(&mut self.ticked_cycles)
    }

    pub(crate) fn take_nmi(&mut self) -> bool {
        std::mem::take(&mut self.nmi_pending)
    }

    pub(crate) fn irq_line(&self) -> bool {
        self.apu.irq_pending()
    }

    /// Advance the PPU and APU by whole CPU cycles.
    pub(crate) fn tick_chips(&mut self, cpu_cycles: u32) {
        for _ in 0..cpu_cycles {
            self.cycles += 1;

            self.dot_credit += self.dot_num;
            while self.dot_credit >= self.dot_den {
                self.dot_credit -= self.dot_den;
                self.ppu.tick(self.mapper.as_mut());
                if self.ppu.take_nmi() {
                    self.nmi_pending = true;
                }
            }

            self.apu.tick();
            if let Some(addr) = self.apu.take_dmc_dma_request() {
                let value = self.read_for_dma(addr);
                self.apu.complete_dmc_dma(value);
                self.dma_stall += 4;
            }
        }
    }

    fn catch_up(&mut self) {
        if self.instruction_active {
            self.ticked_cycles += 1;
            self.tick_chips(1);
        }
    }

    pub(crate) fn read(&mut self, addr: u16) -> u8 {
        self.catch_up();
        let value = match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x2000..=0x3FFF => self
                .ppu
                .cpu_read_register(0x2000 | (addr & 0x0007), self.mapper.as_mut()),
            0x4015 => self.apu.read_status(),
            0x4016 => self.controllers.read(0),
            0x4017 => self.controllers.read(1),
            // Write-only and disabled registers read back the open bus.
            0x4000..=0x401F => self.open_bus,
            _ => self.mapper.cpu_read(addr),
        };
        self.open_bus = value;
        value
    }

    pub(crate) fn write(&mut self, addr: u16, value: u8) {
        self.open_bus = value;
        self.catch_up();
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize] = value,
            0x2000..=0x3FFF => {
                self.ppu
                    .cpu_write_register(0x2000 | (addr & 0x0007), value, self.mapper.as_mut());
            }
            0x4014 => self.oam_dma(value),
            0x4016 => self.controllers.write_strobe(value),
            0x4000..=0x4013 | 0x4015 | 0x4017 => self.apu.write_register(addr, value),
            0x4018..=0x401F => {}
            _ => self.mapper.cpu_write(addr, value),
        }
    }

    /// $4014: copy a 256-byte page into OAM. The copy itself runs outside the
    /// catch-up path; the CPU pays for it through the stall counter, one extra
    /// cycle when the transfer starts on an odd CPU cycle.
    fn oam_dma(&mut self, page: u8) {
        let was_active = self.instruction_active;
        self.instruction_active = false;

        let base = (page as u16) << 8;
        let mut bytes = [0u8; 256];
        for (i, slot) in bytes.iter_mut().enumerate() {
            *slot = self.read(base.wrapping_add(i as u16));
        }

        self.instruction_active = was_active;
        self.ppu.write_oam_dma(&bytes);
        self.dma_stall += 513 + (self.cycles & 1) as u32;
    }

    /// DMC sample fetches bypass catch-up; they happen from inside a tick.
    fn read_for_dma(&mut self, addr: u16) -> u8 {
        match addr {
            0x0000..=0x1FFF => self.ram[(addr & 0x07FF) as usize],
            0x4020..=0xFFFF => self.mapper.cpu_read(addr),
            _ => self.open_bus,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::Cartridge;
    use crate::nes::controller::BUTTON_A;
    use crate::nes::mapper::{self, Mirroring};

    fn test_bus() -> CpuBus {
        let cart = Cartridge {
            prg_banks: 1,
            chr_banks: 0,
            ram_banks: 1,
            mapper_id: 0,
            mirroring: Mirroring::Horizontal,
            battery: false,
            trainer: false,
            region: Region::Ntsc,
            prg_rom: vec![0xEA; 0x4000],
            chr_data: vec![0; 0x2000],
            chr_is_ram: true,
        };
        CpuBus::new(mapper::create_mapper(cart).unwrap())
    }

    #[test]
    fn internal_ram_mirrors_every_2k() {
        let mut bus = test_bus();
        bus.write(0x0000, 0x42);
        assert_eq!(bus.read(0x0800), 0x42);
        assert_eq!(bus.read(0x1000), 0x42);
        assert_eq!(bus.read(0x1800), 0x42);

        bus.write(0x1FFF, 0x24);
        assert_eq!(bus.read(0x07FF), 0x24);
    }

    #[test]
    fn ppu_registers_mirror_every_8_bytes() {
        let mut bus = test_bus();
        bus.write(0x2006, 0x21);
        bus.write(0x200E, 0x08); // second $2006 write through the mirror
        bus.write(0x3FFF, 0x77); // $2007 through the last mirror
        bus.write(0x2006, 0x21);
        bus.write(0x2006, 0x08);
        bus.read(0x2007); // prime the buffer
        assert_eq!(bus.read(0x2007), 0x77);
    }

    #[test]
    fn cartridge_space_routes_to_mapper() {
        let mut bus = test_bus();
        assert_eq!(bus.read(0x8000), 0xEA);
        bus.write(0x6000, 0x55);
        assert_eq!(bus.read(0x6000), 0x55);
    }

    #[test]
    fn oam_dma_copies_a_full_page() {
        let mut bus = test_bus();
        for i in 0..256usize {
            bus.ram[0x0200 + i] = i as u8;
        }

        bus.write(0x4014, 0x02);
        assert_eq!(bus.dma_stall, 513);
        for (i, byte) in bus.ppu.oam_bytes().iter().enumerate() {
            assert_eq!(*byte, i as u8, "OAM[{i}]");
        }
    }

    #[test]
    fn oam_dma_on_odd_cycle_costs_one_extra() {
        let mut bus = test_bus();
        bus.tick_chips(1);
        bus.write(0x4014, 0x00);
        assert_eq!(bus.dma_stall, 514);
    }

    #[test]
    fn oam_dma_respects_oam_addr_origin() {
        let mut bus = test_bus();
        bus.write(0x2003, 0x10);
        bus.ram[0] = 0xAB;
        bus.write(0x4014, 0x00);
        assert_eq!(bus.ppu.oam_bytes()[0x10], 0xAB);
    }

    #[test]
    fn controller_ports_shift_through_the_bus() {
        let mut bus = test_bus();
        bus.controllers.set_state(0, BUTTON_A);
        bus.write(0x4016, 1);
        bus.write(0x4016, 0);
        assert_eq!(bus.read(0x4016) & 0x01, 1);
        assert_eq!(bus.read(0x4016) & 0x01, 0);
    }

    #[test]
    fn write_only_registers_read_open_bus() {
        let mut bus = test_bus();
        bus.write(0x4000, 0x3F);
        let last = bus.read(0x8000);
        assert_eq!(bus.read(0x4000), last);
    }

    #[test]
    fn catch_up_runs_chips_during_instructions() {
        let mut bus = test_bus();
        bus.begin_instruction();
        bus.read(0x0000);
        bus.read(0x0000);
        let ticked = bus.end_instruction();
        assert_eq!(ticked, 2);
        assert_eq!(bus.cycles, 2);

        // Outside an instruction, peeks are free.
        bus.read(0x0000);
        assert_eq!(bus.cycles, 2);
    }

    #[test]
    fn pal_ratio_ticks_16_dots_per_5_cycles() {
        let cart = Cartridge {
            prg_banks: 1,
            chr_banks: 0,
            ram_banks: 1,
            mapper_id: 0,
            mirroring: Mirroring::Horizontal,
            battery: false,
            trainer: false,
            region: Region::Pal,
            prg_rom: vec![0xEA; 0x4000],
            chr_data: vec![0; 0x2000],
            chr_is_ram: true,
        };
        let mut bus = CpuBus::new(mapper::create_mapper(cart).unwrap());
        assert_eq!((bus.dot_num, bus.dot_den), (16, 5));
        // 5 CPU cycles owe the PPU exactly 16 dots, with no leftover credit.
        bus.tick_chips(5);
        assert_eq!(bus.dot_credit, 0);
    }
}
