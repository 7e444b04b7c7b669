use super::bus::CpuBus;

pub(crate) const FLAG_CARRY: u8 = 0x01;
pub(crate) const FLAG_ZERO: u8 = 0x02;
pub(crate) const FLAG_INTERRUPT: u8 = 0x04;
pub(crate) const FLAG_DECIMAL: u8 = 0x08;
pub(crate) const FLAG_BREAK: u8 = 0x10;
pub(crate) const FLAG_UNUSED: u8 = 0x20;
pub(crate) const FLAG_OVERFLOW: u8 = 0x40;
pub(crate) const FLAG_NEGATIVE: u8 = 0x80;

const NMI_VECTOR: u16 = 0xFFFA;
const RESET_VECTOR: u16 = 0xFFFC;
const IRQ_VECTOR: u16 = 0xFFFE;

/// 6502 interpreter without decimal mode. `step` runs one instruction (or
/// services a latched interrupt) and returns the cycles consumed; every bus
/// access the real chip would make is issued, including the dummy reads of
/// indexed and read-modify-write addressing, so catch-up ticking stays exact.
pub struct Cpu {
    pub(crate) a: u8,
    pub(crate) x: u8,
    pub(crate) y: u8,
    pub(crate) p: u8,
    pub(crate) sp: u8,
    pub(crate) pc: u16,
    pub(crate) halted: bool,
}

impl Cpu {
    pub(crate) fn new() -> Self {
        Self {
            a: 0,
            x: 0,
            y: 0,
            p: FLAG_INTERRUPT | FLAG_UNUSED,
            sp: 0xFD,
            pc: 0,
            halted: false,
        }
    }

    pub(crate) fn reset(&mut self, bus: &mut CpuBus) {
        self.a = 0;
        self.x = 0;
        self.y = 0;
        self.p = FLAG_INTERRUPT | FLAG_UNUSED;
        self.sp = 0xFD;
        self.halted = false;
        self.pc = self.read_u16(bus, RESET_VECTOR);
    }

    pub(crate) fn step(&mut self, bus: &mut CpuBus) -> u32 {
        if bus.dma_stall > 0 {
            bus.dma_stall -= 1;
            return 1;
        }
        if self.halted {
            return 1;
        }

        if bus.take_nmi() {
            return self.service_interrupt(bus, NMI_VECTOR);
        }
        if bus.irq_line() && !self.flag(FLAG_INTERRUPT) {
            return self.service_interrupt(bus, IRQ_VECTOR);
        }

        let opcode = self.fetch_byte(bus);
        match opcode {
            // -- loads --
            0xA9 => {
                let value = self.fetch_byte(bus);
                self.lda(value);
                2
            }
            0xA5 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.lda(value);
                3
            }
            0xB5 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.lda(value);
                4
            }
            0xAD => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.lda(value);
                4
            }
            0xBD => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.lda(value);
                4 + extra
            }
            0xB9 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.lda(value);
                4 + extra
            }
            0xA1 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.lda(value);
                6
            }
            0xB1 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.lda(value);
                5 + extra
            }

            0xA2 => {
                let value = self.fetch_byte(bus);
                self.ldx(value);
                2
            }
            0xA6 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.ldx(value);
                3
            }
            0xB6 => {
                let addr = self.zero_page_indexed(bus, self.y);
                let value = bus.read(addr);
                self.ldx(value);
                4
            }
            0xAE => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.ldx(value);
                4
            }
            0xBE => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.ldx(value);
                4 + extra
            }

            0xA0 => {
                let value = self.fetch_byte(bus);
                self.ldy(value);
                2
            }
            0xA4 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.ldy(value);
                3
            }
            0xB4 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.ldy(value);
                4
            }
            0xAC => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.ldy(value);
                4
            }
            0xBC => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.ldy(value);
                4 + extra
            }

            // -- stores --
            0x85 => {
                let addr = self.zero_page(bus);
                bus.write(addr, self.a);
                3
            }
            0x95 => {
                let addr = self.zero_page_indexed(bus, self.x);
                bus.write(addr, self.a);
                4
            }
            0x8D => {
                let addr = self.absolute(bus);
                bus.write(addr, self.a);
                4
            }
            0x9D => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                bus.write(addr, self.a);
                5
            }
            0x99 => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                bus.write(addr, self.a);
                5
            }
            0x81 => {
                let addr = self.indexed_indirect(bus);
                bus.write(addr, self.a);
                6
            }
            0x91 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                bus.write(addr, self.a);
                6
            }

            0x86 => {
                let addr = self.zero_page(bus);
                bus.write(addr, self.x);
                3
            }
            0x96 => {
                let addr = self.zero_page_indexed(bus, self.y);
                bus.write(addr, self.x);
                4
            }
            0x8E => {
                let addr = self.absolute(bus);
                bus.write(addr, self.x);
                4
            }

            0x84 => {
                let addr = self.zero_page(bus);
                bus.write(addr, self.y);
                3
            }
            0x94 => {
                let addr = self.zero_page_indexed(bus, self.x);
                bus.write(addr, self.y);
                4
            }
            0x8C => {
                let addr = self.absolute(bus);
                bus.write(addr, self.y);
                4
            }

            // -- transfers --
            0xAA => {
                self.x = self.a;
                self.update_zn(self.x);
                2
            }
            0xA8 => {
                self.y = self.a;
                self.update_zn(self.y);
                2
            }
            0x8A => {
                self.a = self.x;
                self.update_zn(self.a);
                2
            }
            0x98 => {
                self.a = self.y;
                self.update_zn(self.a);
                2
            }
            0xBA => {
                self.x = self.sp;
                self.update_zn(self.x);
                2
            }
            0x9A => {
                self.sp = self.x;
                2
            }

            // -- stack --
            0x48 => {
                self.push(bus, self.a);
                3
            }
            0x08 => {
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                3
            }
            0x68 => {
                self.a = self.pop(bus);
                self.update_zn(self.a);
                4
            }
            0x28 => {
                self.p = (self.pop(bus) & !FLAG_BREAK) | FLAG_UNUSED;
                4
            }

            // -- logic / arithmetic --
            0x29 => {
                let value = self.fetch_byte(bus);
                self.and(value);
                2
            }
            0x25 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.and(value);
                3
            }
            0x35 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.and(value);
                4
            }
            0x2D => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.and(value);
                4
            }
            0x3D => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.and(value);
                4 + extra
            }
            0x39 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.and(value);
                4 + extra
            }
            0x21 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.and(value);
                6
            }
            0x31 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.and(value);
                5 + extra
            }

            0x09 => {
                let value = self.fetch_byte(bus);
                self.ora(value);
                2
            }
            0x05 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.ora(value);
                3
            }
            0x15 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.ora(value);
                4
            }
            0x0D => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.ora(value);
                4
            }
            0x1D => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.ora(value);
                4 + extra
            }
            0x19 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.ora(value);
                4 + extra
            }
            0x01 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.ora(value);
                6
            }
            0x11 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.ora(value);
                5 + extra
            }

            0x49 => {
                let value = self.fetch_byte(bus);
                self.eor(value);
                2
            }
            0x45 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.eor(value);
                3
            }
            0x55 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.eor(value);
                4
            }
            0x4D => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.eor(value);
                4
            }
            0x5D => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.eor(value);
                4 + extra
            }
            0x59 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.eor(value);
                4 + extra
            }
            0x41 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.eor(value);
                6
            }
            0x51 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.eor(value);
                5 + extra
            }

            0x69 => {
                let value = self.fetch_byte(bus);
                self.adc(value);
                2
            }
            0x65 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.adc(value);
                3
            }
            0x75 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.adc(value);
                4
            }
            0x6D => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.adc(value);
                4
            }
            0x7D => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.adc(value);
                4 + extra
            }
            0x79 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.adc(value);
                4 + extra
            }
            0x61 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.adc(value);
                6
            }
            0x71 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.adc(value);
                5 + extra
            }

            0xE9 | 0xEB => {
                let value = self.fetch_byte(bus);
                self.sbc(value);
                2
            }
            0xE5 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.sbc(value);
                3
            }
            0xF5 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.sbc(value);
                4
            }
            0xED => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.sbc(value);
                4
            }
            0xFD => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.sbc(value);
                4 + extra
            }
            0xF9 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.sbc(value);
                4 + extra
            }
            0xE1 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.sbc(value);
                6
            }
            0xF1 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.sbc(value);
                5 + extra
            }

            // -- compares / BIT --
            0xC9 => {
                let value = self.fetch_byte(bus);
                self.compare(self.a, value);
                2
            }
            0xC5 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.compare(self.a, value);
                3
            }
            0xD5 => {
                let addr = self.zero_page_indexed(bus, self.x);
                let value = bus.read(addr);
                self.compare(self.a, value);
                4
            }
            0xCD => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.compare(self.a, value);
                4
            }
            0xDD => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                let value = bus.read(addr);
                self.compare(self.a, value);
                4 + extra
            }
            0xD9 => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.compare(self.a, value);
                4 + extra
            }
            0xC1 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.compare(self.a, value);
                6
            }
            0xD1 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.compare(self.a, value);
                5 + extra
            }

            0xE0 => {
                let value = self.fetch_byte(bus);
                self.compare(self.x, value);
                2
            }
            0xE4 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.compare(self.x, value);
                3
            }
            0xEC => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.compare(self.x, value);
                4
            }

            0xC0 => {
                let value = self.fetch_byte(bus);
                self.compare(self.y, value);
                2
            }
            0xC4 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.compare(self.y, value);
                3
            }
            0xCC => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.compare(self.y, value);
                4
            }

            0x24 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.bit(value);
                3
            }
            0x2C => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.bit(value);
                4
            }

            // -- increments / decrements --
            0xE6 => {
                let addr = self.zero_page(bus);
                self.rmw(bus, addr, Cpu::inc_value);
                5
            }
            0xF6 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rmw(bus, addr, Cpu::inc_value);
                6
            }
            0xEE => {
                let addr = self.absolute(bus);
                self.rmw(bus, addr, Cpu::inc_value);
                6
            }
            0xFE => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rmw(bus, addr, Cpu::inc_value);
                7
            }

            0xC6 => {
                let addr = self.zero_page(bus);
                self.rmw(bus, addr, Cpu::dec_value);
                5
            }
            0xD6 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rmw(bus, addr, Cpu::dec_value);
                6
            }
            0xCE => {
                let addr = self.absolute(bus);
                self.rmw(bus, addr, Cpu::dec_value);
                6
            }
            0xDE => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rmw(bus, addr, Cpu::dec_value);
                7
            }

            0xE8 => {
                self.x = self.x.wrapping_add(1);
                self.update_zn(self.x);
                2
            }
            0xC8 => {
                self.y = self.y.wrapping_add(1);
                self.update_zn(self.y);
                2
            }
            0xCA => {
                self.x = self.x.wrapping_sub(1);
                self.update_zn(self.x);
                2
            }
            0x88 => {
                self.y = self.y.wrapping_sub(1);
                self.update_zn(self.y);
                2
            }

            // -- shifts / rotates --
            0x0A => {
                self.a = self.asl(self.a);
                2
            }
            0x06 => {
                let addr = self.zero_page(bus);
                self.rmw(bus, addr, Cpu::asl);
                5
            }
            0x16 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rmw(bus, addr, Cpu::asl);
                6
            }
            0x0E => {
                let addr = self.absolute(bus);
                self.rmw(bus, addr, Cpu::asl);
                6
            }
            0x1E => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rmw(bus, addr, Cpu::asl);
                7
            }

            0x4A => {
                self.a = self.lsr(self.a);
                2
            }
            0x46 => {
                let addr = self.zero_page(bus);
                self.rmw(bus, addr, Cpu::lsr);
                5
            }
            0x56 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rmw(bus, addr, Cpu::lsr);
                6
            }
            0x4E => {
                let addr = self.absolute(bus);
                self.rmw(bus, addr, Cpu::lsr);
                6
            }
            0x5E => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rmw(bus, addr, Cpu::lsr);
                7
            }

            0x2A => {
                self.a = self.rol(self.a);
                2
            }
            0x26 => {
                let addr = self.zero_page(bus);
                self.rmw(bus, addr, Cpu::rol);
                5
            }
            0x36 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rmw(bus, addr, Cpu::rol);
                6
            }
            0x2E => {
                let addr = self.absolute(bus);
                self.rmw(bus, addr, Cpu::rol);
                6
            }
            0x3E => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rmw(bus, addr, Cpu::rol);
                7
            }

            0x6A => {
                self.a = self.ror(self.a);
                2
            }
            0x66 => {
                let addr = self.zero_page(bus);
                self.rmw(bus, addr, Cpu::ror);
                5
            }
            0x76 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rmw(bus, addr, Cpu::ror);
                6
            }
            0x6E => {
                let addr = self.absolute(bus);
                self.rmw(bus, addr, Cpu::ror);
                6
            }
            0x7E => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rmw(bus, addr, Cpu::ror);
                7
            }

            // -- jumps / subroutines --
            0x4C => {
                self.pc = self.fetch_word(bus);
                3
            }
            0x6C => {
                let pointer = self.fetch_word(bus);
                self.pc = self.read_u16_page_wrapped(bus, pointer);
                5
            }
            0x20 => {
                let addr = self.fetch_word(bus);
                self.push_u16(bus, self.pc.wrapping_sub(1));
                self.pc = addr;
                6
            }
            0x60 => {
                self.pc = self.pop_u16(bus).wrapping_add(1);
                6
            }
            0x40 => {
                self.p = (self.pop(bus) & !FLAG_BREAK) | FLAG_UNUSED;
                self.pc = self.pop_u16(bus);
                6
            }
            0x00 => {
                self.pc = self.pc.wrapping_add(1);
                self.push_u16(bus, self.pc);
                self.push(bus, self.p | FLAG_BREAK | FLAG_UNUSED);
                self.set_flag(FLAG_INTERRUPT, true);
                self.pc = self.read_u16(bus, IRQ_VECTOR);
                7
            }

            // -- branches --
            0x10 => self.branch(bus, !self.flag(FLAG_NEGATIVE)),
            0x30 => self.branch(bus, self.flag(FLAG_NEGATIVE)),
            0x50 => self.branch(bus, !self.flag(FLAG_OVERFLOW)),
            0x70 => self.branch(bus, self.flag(FLAG_OVERFLOW)),
            0x90 => self.branch(bus, !self.flag(FLAG_CARRY)),
            0xB0 => self.branch(bus, self.flag(FLAG_CARRY)),
            0xD0 => self.branch(bus, !self.flag(FLAG_ZERO)),
            0xF0 => self.branch(bus, self.flag(FLAG_ZERO)),

            // -- flags --
            0x18 => {
                self.set_flag(FLAG_CARRY, false);
                2
            }
            0x38 => {
                self.set_flag(FLAG_CARRY, true);
                2
            }
            0x58 => {
                self.set_flag(FLAG_INTERRUPT, false);
                2
            }
            0x78 => {
                self.set_flag(FLAG_INTERRUPT, true);
                2
            }
            0xB8 => {
                self.set_flag(FLAG_OVERFLOW, false);
                2
            }
            0xD8 => {
                self.set_flag(FLAG_DECIMAL, false);
                2
            }
            0xF8 => {
                self.set_flag(FLAG_DECIMAL, true);
                2
            }

            0xEA => 2,

            // -- unofficial: LAX / SAX --
            0xA7 => {
                let addr = self.zero_page(bus);
                let value = bus.read(addr);
                self.lax(value);
                3
            }
            0xB7 => {
                let addr = self.zero_page_indexed(bus, self.y);
                let value = bus.read(addr);
                self.lax(value);
                4
            }
            0xAF => {
                let addr = self.absolute(bus);
                let value = bus.read(addr);
                self.lax(value);
                4
            }
            0xBF => {
                let (addr, extra) = self.absolute_indexed(bus, self.y, false);
                let value = bus.read(addr);
                self.lax(value);
                4 + extra
            }
            0xA3 => {
                let addr = self.indexed_indirect(bus);
                let value = bus.read(addr);
                self.lax(value);
                6
            }
            0xB3 => {
                let (addr, extra) = self.indirect_indexed(bus, false);
                let value = bus.read(addr);
                self.lax(value);
                5 + extra
            }

            0x87 => {
                let addr = self.zero_page(bus);
                bus.write(addr, self.a & self.x);
                3
            }
            0x97 => {
                let addr = self.zero_page_indexed(bus, self.y);
                bus.write(addr, self.a & self.x);
                4
            }
            0x8F => {
                let addr = self.absolute(bus);
                bus.write(addr, self.a & self.x);
                4
            }
            0x83 => {
                let addr = self.indexed_indirect(bus);
                bus.write(addr, self.a & self.x);
                6
            }

            // -- unofficial read-modify-write families --
            0xC7 => {
                let addr = self.zero_page(bus);
                self.dcp(bus, addr);
                5
            }
            0xD7 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.dcp(bus, addr);
                6
            }
            0xCF => {
                let addr = self.absolute(bus);
                self.dcp(bus, addr);
                6
            }
            0xDF => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.dcp(bus, addr);
                7
            }
            0xDB => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                self.dcp(bus, addr);
                7
            }
            0xC3 => {
                let addr = self.indexed_indirect(bus);
                self.dcp(bus, addr);
                8
            }
            0xD3 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                self.dcp(bus, addr);
                8
            }

            0xE7 => {
                let addr = self.zero_page(bus);
                self.isb(bus, addr);
                5
            }
            0xF7 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.isb(bus, addr);
                6
            }
            0xEF => {
                let addr = self.absolute(bus);
                self.isb(bus, addr);
                6
            }
            0xFF => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.isb(bus, addr);
                7
            }
            0xFB => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                self.isb(bus, addr);
                7
            }
            0xE3 => {
                let addr = self.indexed_indirect(bus);
                self.isb(bus, addr);
                8
            }
            0xF3 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                self.isb(bus, addr);
                8
            }

            0x07 => {
                let addr = self.zero_page(bus);
                self.slo(bus, addr);
                5
            }
            0x17 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.slo(bus, addr);
                6
            }
            0x0F => {
                let addr = self.absolute(bus);
                self.slo(bus, addr);
                6
            }
            0x1F => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.slo(bus, addr);
                7
            }
            0x1B => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                self.slo(bus, addr);
                7
            }
            0x03 => {
                let addr = self.indexed_indirect(bus);
                self.slo(bus, addr);
                8
            }
            0x13 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                self.slo(bus, addr);
                8
            }

            0x27 => {
                let addr = self.zero_page(bus);
                self.rla(bus, addr);
                5
            }
            0x37 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rla(bus, addr);
                6
            }
            0x2F => {
                let addr = self.absolute(bus);
                self.rla(bus, addr);
                6
            }
            0x3F => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rla(bus, addr);
                7
            }
            0x3B => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                self.rla(bus, addr);
                7
            }
            0x23 => {
                let addr = self.indexed_indirect(bus);
                self.rla(bus, addr);
                8
            }
            0x33 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                self.rla(bus, addr);
                8
            }

            0x47 => {
                let addr = self.zero_page(bus);
                self.sre(bus, addr);
                5
            }
            0x57 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.sre(bus, addr);
                6
            }
            0x4F => {
                let addr = self.absolute(bus);
                self.sre(bus, addr);
                6
            }
            0x5F => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.sre(bus, addr);
                7
            }
            0x5B => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                self.sre(bus, addr);
                7
            }
            0x43 => {
                let addr = self.indexed_indirect(bus);
                self.sre(bus, addr);
                8
            }
            0x53 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                self.sre(bus, addr);
                8
            }

            0x67 => {
                let addr = self.zero_page(bus);
                self.rra(bus, addr);
                5
            }
            0x77 => {
                let addr = self.zero_page_indexed(bus, self.x);
                self.rra(bus, addr);
                6
            }
            0x6F => {
                let addr = self.absolute(bus);
                self.rra(bus, addr);
                6
            }
            0x7F => {
                let (addr, _) = self.absolute_indexed(bus, self.x, true);
                self.rra(bus, addr);
                7
            }
            0x7B => {
                let (addr, _) = self.absolute_indexed(bus, self.y, true);
                self.rra(bus, addr);
                7
            }
            0x63 => {
                let addr = self.indexed_indirect(bus);
                self.rra(bus, addr);
                8
            }
            0x73 => {
                let (addr, _) = self.indirect_indexed(bus, true);
                self.rra(bus, addr);
                8
            }

            // -- NOP variants --
            0x1A | 0x3A | 0x5A | 0x7A | 0xDA | 0xFA => 2,
            0x80 | 0x82 | 0x89 | 0xC2 | 0xE2 => {
                self.fetch_byte(bus);
                2
            }
            0x04 | 0x44 | 0x64 => {
                let addr = self.zero_page(bus);
                bus.read(addr);
                3
            }
            0x14 | 0x34 | 0x54 | 0x74 | 0xD4 | 0xF4 => {
                let addr = self.zero_page_indexed(bus, self.x);
                bus.read(addr);
                4
            }
            0x0C => {
                let addr = self.absolute(bus);
                bus.read(addr);
                4
            }
            0x1C | 0x3C | 0x5C | 0x7C | 0xDC | 0xFC => {
                let (addr, extra) = self.absolute_indexed(bus, self.x, false);
                bus.read(addr);
                4 + extra
            }

            // Remaining unassigned/unstable opcodes run as operand-consuming
            // no-ops with their nominal cycle counts.
            0x0B | 0x2B | 0x4B | 0x6B | 0x8B | 0xAB | 0xCB => {
                self.fetch_byte(bus);
                2
            }
            0x93 => {
                self.fetch_byte(bus);
                6
            }
            0x9B | 0x9C | 0x9E | 0x9F => {
                self.fetch_word(bus);
                5
            }
            0xBB => {
                self.fetch_word(bus);
                4
            }

            // JAM: the real part deadlocks until reset.
            0x02 | 0x12 | 0x22 | 0x32 | 0x42 | 0x52 | 0x62 | 0x72 | 0x92 | 0xB2 | 0xD2
            | 0xF2 => {
                self.halted = true;
                2
            }
        }
    }

    fn service_interrupt(&mut self, bus: &mut CpuBus, vector: u16) -> u32 {
        self.push_u16(bus, self.pc);
        self.push(bus, (self.p & !FLAG_BREAK) | FLAG_UNUSED);
        self.set_flag(FLAG_INTERRUPT, true);
        self.pc = self.read_u16(bus, vector);
        7
    }

    // -- addressing modes --

    fn zero_page(&mut self, bus: &mut CpuBus) -> u16 {
        self.fetch_byte(bus) as u16
    }

    fn zero_page_indexed(&mut self, bus: &mut CpuBus, index: u8) -> u16 {
        let base = self.fetch_byte(bus);
        bus.read(base as u16);
        base.wrapping_add(index) as u16
    }

    fn absolute(&mut self, bus: &mut CpuBus) -> u16 {
        self.fetch_word(bus)
    }

    /// Absolute,X/Y. Reads, when crossing a page, see one dummy fetch from the
    /// un-fixed-up address and cost an extra cycle; writes and RMW always do.
    fn absolute_indexed(&mut self, bus: &mut CpuBus, index: u8, always_fixup: bool) -> (u16, u32) {
        let base = self.fetch_word(bus);
        let addr = base.wrapping_add(index as u16);
        let crossed = (base ^ addr) & 0xFF00 != 0;
        if crossed || always_fixup {
            bus.read((base & 0xFF00) | (addr & 0x00FF));
        }
        (addr, u32::from(crossed))
    }

    fn indexed_indirect(&mut self, bus: &mut CpuBus) -> u16 {
        let zp = self.fetch_byte(bus);
        bus.read(zp as u16);
        let pointer = zp.wrapping_add(self.x);
        self.read_zero_page_u16(bus, pointer)
    }

    fn indirect_indexed(&mut self, bus: &mut CpuBus, always_fixup: bool) -> (u16, u32) {
        let zp = self.fetch_byte(bus);
        let base = self.read_zero_page_u16(bus, zp);
        let addr = base.wrapping_add(self.y as u16);
        let crossed = (base ^ addr) & 0xFF00 != 0;
        if crossed || always_fixup {
            bus.read((base & 0xFF00) | (addr & 0x00FF));
        }
        (addr, u32::from(crossed))
    }

    fn branch(&mut self, bus: &mut CpuBus, condition: bool) -> u32 {
        let offset = self.fetch_byte(bus) as i8;
        if !condition {
            return 2;
        }

        let old_pc = self.pc;
        bus.read(old_pc);
        let new_pc = old_pc.wrapping_add(offset as i16 as u16);
        self.pc = new_pc;
        if (old_pc ^ new_pc) & 0xFF00 != 0 {
            bus.read((old_pc & 0xFF00) | (new_pc & 0x00FF));
            4
        } else {
            3
        }
    }

    // -- memory helpers --

    fn fetch_byte(&mut self, bus: &mut CpuBus) -> u8 {
        let byte = bus.read(self.pc);
        self.pc = self.pc.wrapping_add(1);
        byte
    }

    fn fetch_word(&mut self, bus: &mut CpuBus) -> u16 {
        let lo = self.fetch_byte(bus) as u16;
        let hi = self.fetch_byte(bus) as u16;
        (hi << 8) | lo
    }

    fn read_u16(&mut self, bus: &mut CpuBus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi = bus.read(addr.wrapping_add(1)) as u16;
        (hi << 8) | lo
    }

    /// The 6502's indirect-JMP bug: the high pointer byte never carries into
    /// the next page.
    fn read_u16_page_wrapped(&mut self, bus: &mut CpuBus, addr: u16) -> u16 {
        let lo = bus.read(addr) as u16;
        let hi_addr = (addr & 0xFF00) | (addr.wrapping_add(1) & 0x00FF);
        let hi = bus.read(hi_addr) as u16;
        (hi << 8) | lo
    }

    fn read_zero_page_u16(&mut self, bus: &mut CpuBus, addr: u8) -> u16 {
        let lo = bus.read(addr as u16) as u16;
        let hi = bus.read(addr.wrapping_add(1) as u16) as u16;
        (hi << 8) | lo
    }

    fn push(&mut self, bus: &mut CpuBus, value: u8) {
        bus.write(0x0100 | self.sp as u16, value);
        self.sp = self.sp.wrapping_sub(1);
    }

    fn pop(&mut self, bus: &mut CpuBus) -> u8 {
        self.sp = self.sp.wrapping_add(1);
        bus.read(0x0100 | self.sp as u16)
    }

    fn push_u16(&mut self, bus: &mut CpuBus, value: u16) {
        self.push(bus, (value >> 8) as u8);
        self.push(bus, value as u8);
    }

    fn pop_u16(&mut self, bus: &mut CpuBus) -> u16 {
        let lo = self.pop(bus) as u16;
        let hi = self.pop(bus) as u16;
        (hi << 8) | lo
    }

    // -- flags --

    fn set_flag(&mut self, flag: u8, value: bool) {
        if value {
            self.p |= flag;
        } else {
            self.p &= !flag;
        }
        self.p |= FLAG_UNUSED;
    }

    fn flag(&self, flag: u8) -> bool {
        (self.p & flag) != 0
    }

    fn update_zn(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, value == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
    }

    // -- operations --

    fn lda(&mut self, value: u8) {
        self.a = value;
        self.update_zn(self.a);
    }

    fn ldx(&mut self, value: u8) {
        self.x = value;
        self.update_zn(self.x);
    }

    fn ldy(&mut self, value: u8) {
        self.y = value;
        self.update_zn(self.y);
    }

    fn lax(&mut self, value: u8) {
        self.a = value;
        self.x = value;
        self.update_zn(value);
    }

    fn and(&mut self, value: u8) {
        self.a &= value;
        self.update_zn(self.a);
    }

    fn ora(&mut self, value: u8) {
        self.a |= value;
        self.update_zn(self.a);
    }

    fn eor(&mut self, value: u8) {
        self.a ^= value;
        self.update_zn(self.a);
    }

    fn bit(&mut self, value: u8) {
        self.set_flag(FLAG_ZERO, (self.a & value) == 0);
        self.set_flag(FLAG_NEGATIVE, (value & 0x80) != 0);
        self.set_flag(FLAG_OVERFLOW, (value & 0x40) != 0);
    }

    fn compare(&mut self, register: u8, value: u8) {
        self.set_flag(FLAG_CARRY, register >= value);
        self.update_zn(register.wrapping_sub(value));
    }

    // The 2A03 has no decimal mode; the D flag is carried but ignored here.
    fn adc(&mut self, value: u8) {
        let carry_in = u16::from(self.flag(FLAG_CARRY));
        let sum = self.a as u16 + value as u16 + carry_in;
        let result = sum as u8;

        self.set_flag(FLAG_CARRY, sum > 0xFF);
        self.set_flag(
            FLAG_OVERFLOW,
            ((self.a ^ result) & (value ^ result) & 0x80) != 0,
        );
        self.a = result;
        self.update_zn(self.a);
    }

    fn sbc(&mut self, value: u8) {
        self.adc(value ^ 0xFF);
    }

    fn asl(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = value << 1;
        self.update_zn(result);
        result
    }

    fn lsr(&mut self, value: u8) -> u8 {
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = value >> 1;
        self.update_zn(result);
        result
    }

    fn rol(&mut self, value: u8) -> u8 {
        let carry_in = u8::from(self.flag(FLAG_CARRY));
        self.set_flag(FLAG_CARRY, (value & 0x80) != 0);
        let result = (value << 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn ror(&mut self, value: u8) -> u8 {
        let carry_in = if self.flag(FLAG_CARRY) { 0x80 } else { 0 };
        self.set_flag(FLAG_CARRY, (value & 0x01) != 0);
        let result = (value >> 1) | carry_in;
        self.update_zn(result);
        result
    }

    fn inc_value(&mut self, value: u8) -> u8 {
        let result = value.wrapping_add(1);
        self.update_zn(result);
        result
    }

    fn dec_value(&mut self, value: u8) -> u8 {
        let result = value.wrapping_sub(1);
        self.update_zn(result);
        result
    }

    /// Read-modify-write: the hardware writes the unmodified value back
    /// before the result, and some registers observe that.
    fn rmw(&mut self, bus: &mut CpuBus, addr: u16, op: fn(&mut Cpu, u8) -> u8) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let result = op(self, value);
        bus.write(addr, result);
    }

    fn dcp(&mut self, bus: &mut CpuBus, addr: u16) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let result = value.wrapping_sub(1);
        self.compare(self.a, result);
        bus.write(addr, result);
    }

    fn isb(&mut self, bus: &mut CpuBus, addr: u16) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let result = value.wrapping_add(1);
        self.sbc(result);
        bus.write(addr, result);
    }

    fn slo(&mut self, bus: &mut CpuBus, addr: u16) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let shifted = self.asl(value);
        self.a |= shifted;
        self.update_zn(self.a);
        bus.write(addr, shifted);
    }

    fn rla(&mut self, bus: &mut CpuBus, addr: u16) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let shifted = self.rol(value);
        self.a &= shifted;
        self.update_zn(self.a);
        bus.write(addr, shifted);
    }

    fn sre(&mut self, bus: &mut CpuBus, addr: u16) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let shifted = self.lsr(value);
        self.a ^= shifted;
        self.update_zn(self.a);
        bus.write(addr, shifted);
    }

    fn rra(&mut self, bus: &mut CpuBus, addr: u16) {
        let value = bus.read(addr);
        bus.write(addr, value);
        let shifted = self.ror(value);
        self.adc(shifted);
        bus.write(addr, shifted);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::nes::cartridge::{Cartridge, Region};
    use crate::nes::mapper::{self, Mirroring};

    fn setup(program: &[u8]) -> (Cpu, CpuBus) {
        let mut prg = vec![0xEA; 0x4000];
        prg[..program.len()].copy_from_slice(program);
        prg[0x3FFC] = 0x00;
        prg[0x3FFD] = 0x80;

        let cart = Cartridge {
            prg_banks: 1,
            chr_banks: 0,
            ram_banks: 1,
            mapper_id: 0,
            mirroring: Mirroring::Horizontal,
            battery: false,
            trainer: false,
            region: Region::Ntsc,
            prg_rom: prg,
            chr_data: vec![0; 0x2000],
            chr_is_ram: true,
        };

        let mut bus = CpuBus::new(mapper::create_mapper(cart).unwrap());
        let mut cpu = Cpu::new();
        cpu.reset(&mut bus);
        (cpu, bus)
    }

    #[test]
    fn reset_loads_vector_and_initial_state() {
        let (cpu, _) = setup(&[]);
        assert_eq!(cpu.pc, 0x8000);
        assert_eq!(cpu.sp, 0xFD);
        assert!(cpu.flag(FLAG_INTERRUPT));
    }

    #[test]
    fn a_hundred_nops_take_two_hundred_cycles() {
        let (mut cpu, mut bus) = setup(&[]);
        let mut cycles = 0;
        for _ in 0..100 {
            cycles += cpu.step(&mut bus);
        }
        assert_eq!(cpu.pc, 0x8064);
        assert_eq!(cycles, 200);
        assert!(cpu.flag(FLAG_INTERRUPT));
    }

    #[test]
    fn adc_sets_overflow_and_carry() {
        // LDA #$50; ADC #$50 -> $A0, V set. LDA #$FF; ADC #$01 -> carry out.
        let (mut cpu, mut bus) = setup(&[0xA9, 0x50, 0x69, 0x50, 0xA9, 0xFF, 0x69, 0x01]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0xA0);
        assert!(cpu.flag(FLAG_OVERFLOW));
        assert!(!cpu.flag(FLAG_CARRY));
        assert!(cpu.flag(FLAG_NEGATIVE));

        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag(FLAG_CARRY));
        assert!(cpu.flag(FLAG_ZERO));
    }

    #[test]
    fn sbc_borrows_through_carry() {
        // SEC; LDA #$00; SBC #$01 -> $FF with carry clear.
        let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0x00, 0xE9, 0x01]);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.a, 0xFF);
        assert!(!cpu.flag(FLAG_CARRY));
        assert!(cpu.flag(FLAG_NEGATIVE));
    }

    #[test]
    fn compare_sets_zero_and_carry_on_equal() {
        let (mut cpu, mut bus) = setup(&[0xA9, 0x10, 0xC9, 0x10]);
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert!(cpu.flag(FLAG_ZERO));
        assert!(cpu.flag(FLAG_CARRY));
        assert!(!cpu.flag(FLAG_NEGATIVE));
    }

    #[test]
    fn branch_cycle_accounting() {
        // BEQ not taken: 2. LDX #$01; BNE +0 taken same page: 3.
        let (mut cpu, mut bus) = setup(&[0xF0, 0x02, 0xA2, 0x01, 0xD0, 0x00]);
        cpu.p &= !FLAG_ZERO;
        assert_eq!(cpu.step(&mut bus), 2);
        cpu.step(&mut bus);
        assert_eq!(cpu.step(&mut bus), 3);
    }

    #[test]
    fn branch_across_page_costs_four() {
        // Branch instruction whose target lands in the previous page.
        let mut program = vec![0xEA; 0x101];
        program[0x00] = 0xA2; // LDX #$01 so Z is clear
        program[0x01] = 0x01;
        program[0xFF] = 0xD0; // BNE -$80 at $80FF: old_pc $8101, target $8081
        program[0x100] = 0x80;
        let (mut cpu, mut bus) = setup(&program);

        cpu.step(&mut bus);
        while cpu.pc != 0x80FF {
            cpu.step(&mut bus);
        }
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.pc, 0x8081);
    }

    #[test]
    fn indexed_read_page_cross_costs_extra() {
        // LDX #$FF; LDA $8001,X crosses into $8100.
        let (mut cpu, mut bus) = setup(&[0xA2, 0xFF, 0xBD, 0x01, 0x80, 0xBD, 0x00, 0x80]);
        cpu.step(&mut bus);
        assert_eq!(cpu.step(&mut bus), 5);

        // Same mode without crossing: LDA $8000,X reaches $80FF.
        assert_eq!(cpu.step(&mut bus), 4);
    }

    #[test]
    fn indexed_store_always_pays_fixup_cycle() {
        let (mut cpu, mut bus) = setup(&[0xA2, 0x00, 0x9D, 0x00, 0x02]);
        cpu.step(&mut bus);
        assert_eq!(cpu.step(&mut bus), 5);
    }

    #[test]
    fn jmp_indirect_wraps_within_page() {
        let (mut cpu, mut bus) = setup(&[0x6C, 0xFF, 0x02]);
        bus.ram[0x02FF] = 0x34;
        bus.ram[0x0200] = 0x12;
        assert_eq!(cpu.step(&mut bus), 5);
        assert_eq!(cpu.pc, 0x1234);
    }

    #[test]
    fn jsr_rts_round_trip() {
        // JSR $8010; target holds RTS.
        let mut program = vec![0xEA; 0x11];
        program[0x00] = 0x20;
        program[0x01] = 0x10;
        program[0x02] = 0x80;
        program[0x10] = 0x60;
        let (mut cpu, mut bus) = setup(&program);

        assert_eq!(cpu.step(&mut bus), 6);
        assert_eq!(cpu.pc, 0x8010);
        assert_eq!(cpu.sp, 0xFB);
        assert_eq!(cpu.step(&mut bus), 6);
        assert_eq!(cpu.pc, 0x8003);
        assert_eq!(cpu.sp, 0xFD);
    }

    #[test]
    fn stack_wraps_within_page_one() {
        // LDX #$00; TXS; PHA pushes at $0100 and wraps SP to $FF.
        let (mut cpu, mut bus) = setup(&[0xA2, 0x00, 0x9A, 0xA9, 0x5A, 0x48]);
        for _ in 0..4 {
            cpu.step(&mut bus);
        }
        assert_eq!(bus.ram[0x0100], 0x5A);
        assert_eq!(cpu.sp, 0xFF);
    }

    #[test]
    fn brk_pushes_break_flag_and_vectors() {
        let mut program = vec![0x00u8];
        program.resize(0x4000, 0xEA);
        program[0x3FFE] = 0x00;
        program[0x3FFF] = 0x90;
        let (mut cpu, mut bus) = setup(&program);

        assert_eq!(cpu.step(&mut bus), 7);
        assert_eq!(cpu.pc, 0x9000);
        assert!(cpu.flag(FLAG_INTERRUPT));
        // Pushed P has B set; pushed return address is opcode + 2.
        assert_ne!(bus.ram[0x01FB] & FLAG_BREAK, 0);
        assert_eq!(bus.ram[0x01FC], 0x02);
        assert_eq!(bus.ram[0x01FD], 0x80);
    }

    #[test]
    fn rti_restores_flags_without_break() {
        let mut program = vec![0x00u8];
        program.resize(0x4000, 0xEA);
        program[0x3FFE] = 0x10; // BRK vector -> $8010
        program[0x3FFF] = 0x80;
        program[0x10] = 0x40; // RTI
        let (mut cpu, mut bus) = setup(&program);

        cpu.step(&mut bus);
        assert_eq!(cpu.step(&mut bus), 6);
        assert_eq!(cpu.pc, 0x8002);
        assert!(!cpu.flag(FLAG_BREAK));
    }

    #[test]
    fn plp_ignores_break_bit() {
        // LDA #$FF; PHA; PLP
        let (mut cpu, mut bus) = setup(&[0xA9, 0xFF, 0x48, 0x28]);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert!(!cpu.flag(FLAG_BREAK));
        assert!(cpu.flag(FLAG_UNUSED));
        assert!(cpu.flag(FLAG_NEGATIVE));
    }

    #[test]
    fn lax_loads_both_registers() {
        let (mut cpu, mut bus) = setup(&[0xA7, 0x10]);
        bus.ram[0x10] = 0x55;
        assert_eq!(cpu.step(&mut bus), 3);
        assert_eq!(cpu.a, 0x55);
        assert_eq!(cpu.x, 0x55);
    }

    #[test]
    fn sax_stores_a_and_x() {
        let (mut cpu, mut bus) = setup(&[0xA9, 0xF0, 0xA2, 0xCC, 0x87, 0x20]);
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(bus.ram[0x20], 0xC0);
    }

    #[test]
    fn dcp_decrements_then_compares() {
        let (mut cpu, mut bus) = setup(&[0xA9, 0x10, 0xC7, 0x10]);
        bus.ram[0x10] = 0x11;
        cpu.step(&mut bus);
        assert_eq!(cpu.step(&mut bus), 5);
        assert_eq!(bus.ram[0x10], 0x10);
        assert!(cpu.flag(FLAG_ZERO));
        assert!(cpu.flag(FLAG_CARRY));
    }

    #[test]
    fn isb_increments_then_subtracts() {
        // SEC; LDA #$10; ISB $10 (with $0F at $10) -> A = 0.
        let (mut cpu, mut bus) = setup(&[0x38, 0xA9, 0x10, 0xE7, 0x10]);
        bus.ram[0x10] = 0x0F;
        for _ in 0..3 {
            cpu.step(&mut bus);
        }
        assert_eq!(bus.ram[0x10], 0x10);
        assert_eq!(cpu.a, 0x00);
        assert!(cpu.flag(FLAG_ZERO));
    }

    #[test]
    fn slo_shifts_and_ors() {
        let (mut cpu, mut bus) = setup(&[0xA9, 0x01, 0x07, 0x10]);
        bus.ram[0x10] = 0x81;
        cpu.step(&mut bus);
        cpu.step(&mut bus);
        assert_eq!(bus.ram[0x10], 0x02);
        assert_eq!(cpu.a, 0x03);
        assert!(cpu.flag(FLAG_CARRY));
    }

    #[test]
    fn rmw_performs_double_write() {
        // INC $10: RAM sees the old value rewritten before the new one; the
        // end state has the incremented value.
        let (mut cpu, mut bus) = setup(&[0xE6, 0x10]);
        bus.ram[0x10] = 0x7F;
        assert_eq!(cpu.step(&mut bus), 5);
        assert_eq!(bus.ram[0x10], 0x80);
        assert!(cpu.flag(FLAG_NEGATIVE));
    }

    #[test]
    fn jam_halts_the_core() {
        let (mut cpu, mut bus) = setup(&[0x02]);
        cpu.step(&mut bus);
        assert!(cpu.halted);
        let pc = cpu.pc;
        assert_eq!(cpu.step(&mut bus), 1);
        assert_eq!(cpu.pc, pc);
    }

    #[test]
    fn unstable_opcodes_consume_their_operands() {
        let (mut cpu, mut bus) = setup(&[0x0B, 0x12, 0x9C, 0x34, 0x12, 0xBB, 0x34, 0x12]);
        assert_eq!(cpu.step(&mut bus), 2);
        assert_eq!(cpu.pc, 0x8002);
        assert_eq!(cpu.step(&mut bus), 5);
        assert_eq!(cpu.pc, 0x8005);
        assert_eq!(cpu.step(&mut bus), 4);
        assert_eq!(cpu.pc, 0x8008);
    }
}
