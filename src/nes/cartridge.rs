use std::{fs, path::Path};

use super::NesError;
use super::mapper::Mirroring;

const HEADER_LEN: usize = 16;
const TRAINER_LEN: usize = 512;
const PRG_BANK_LEN: usize = 16 * 1024;
const CHR_BANK_LEN: usize = 8 * 1024;
const RAM_BANK_LEN: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Region {
    Ntsc,
    Pal,
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    pub prg_banks: u8,
    pub chr_banks: u8,
    pub ram_banks: u8,
    pub mapper_id: u8,
    pub mirroring: Mirroring,
    pub battery: bool,
    pub trainer: bool,
    pub region: Region,
    pub prg_rom: Vec<u8>,
    pub chr_data: Vec<u8>,
    pub chr_is_ram: bool,
}

impl Cartridge {
    pub fn from_file(path: &Path) -> Result<Self, NesError> {
        let bytes = fs::read(path)
            .map_err(|err| NesError::RomInvalid(format!("{}: {err}", path.display())))?;
        Self::from_bytes(&bytes)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, NesError> {
        if bytes.len() < HEADER_LEN {
            return Err(NesError::RomInvalid("missing 16-byte header".into()));
        }
        if &bytes[0..4] != b"NES\x1A" {
            return Err(NesError::RomInvalid("missing NES<EOF> magic".into()));
        }

        let prg_banks = bytes[4];
        let chr_banks = bytes[5];
        let flags6 = bytes[6];
        let flags7 = bytes[7];

        let mapper_id = (flags6 >> 4) | (flags7 & 0xF0);
        let battery = (flags6 & 0x02) != 0;
        let trainer = (flags6 & 0x04) != 0;
        let mirroring = if (flags6 & 0x08) != 0 {
            Mirroring::FourScreen
        } else if (flags6 & 0x01) != 0 {
            Mirroring::Vertical
        } else {
            Mirroring::Horizontal
        };

        // Zero RAM banks means one on first-generation headers.
        let ram_banks = if bytes[8] == 0 { 1 } else { bytes[8] };
        let region = if (bytes[9] & 0x01) != 0 {
            Region::Pal
        } else {
            Region::Ntsc
        };

        if prg_banks == 0 {
            return Err(NesError::RomInvalid("no PRG banks".into()));
        }

        let prg_len = prg_banks as usize * PRG_BANK_LEN;
        let chr_len = chr_banks as usize * CHR_BANK_LEN;
        let mut cursor = HEADER_LEN;
        if trainer {
            cursor += TRAINER_LEN;
        }

        if bytes.len() < cursor + prg_len + chr_len {
            return Err(NesError::RomInvalid(format!(
                "truncated image: need {} bytes, have {}",
                cursor + prg_len + chr_len,
                bytes.len()
            )));
        }

        let prg_rom = bytes[cursor..cursor + prg_len].to_vec();
        cursor += prg_len;

        let (chr_data, chr_is_ram) = if chr_len == 0 {
            (vec![0; CHR_BANK_LEN], true)
        } else {
            (bytes[cursor..cursor + chr_len].to_vec(), false)
        };

        Ok(Self {
            prg_banks,
            chr_banks,
            ram_banks,
            mapper_id,
            mirroring,
            battery,
            trainer,
            region,
            prg_rom,
            chr_data,
            chr_is_ram,
        })
    }

    pub fn ram_len(&self) -> usize {
        self.ram_banks as usize * RAM_BANK_LEN
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build_ines(
        prg_banks: u8,
        chr_banks: u8,
        flags6: u8,
        flags7: u8,
        ram_banks: u8,
        flags9: u8,
    ) -> Vec<u8> {
        let mut image = vec![
            b'N', b'E', b'S', 0x1A, prg_banks, chr_banks, flags6, flags7, ram_banks, flags9, 0,
            0, 0, 0, 0, 0,
        ];
        if (flags6 & 0x04) != 0 {
            image.extend(std::iter::repeat_n(0xFF, TRAINER_LEN));
        }
        image.extend(std::iter::repeat_n(0xEA, prg_banks as usize * PRG_BANK_LEN));
        image.extend(std::iter::repeat_n(0x00, chr_banks as usize * CHR_BANK_LEN));
        image
    }

    #[test]
    fn parses_minimal_header() {
        let cart = Cartridge::from_bytes(&build_ines(1, 1, 0, 0, 0, 0)).unwrap();
        assert_eq!(cart.prg_banks, 1);
        assert_eq!(cart.chr_banks, 1);
        assert_eq!(cart.mapper_id, 0);
        assert_eq!(cart.mirroring, Mirroring::Horizontal);
        assert_eq!(cart.region, Region::Ntsc);
        assert!(!cart.battery);
        assert!(!cart.trainer);
        assert!(!cart.chr_is_ram);
        assert_eq!(cart.prg_rom.len(), PRG_BANK_LEN);
        assert_eq!(cart.chr_data.len(), CHR_BANK_LEN);
    }

    #[test]
    fn decodes_flag_fields() {
        let cart = Cartridge::from_bytes(&build_ines(2, 1, 0x03, 0x40, 2, 0x01)).unwrap();
        assert_eq!(cart.mirroring, Mirroring::Vertical);
        assert!(cart.battery);
        assert_eq!(cart.mapper_id, 0x40);
        assert_eq!(cart.ram_banks, 2);
        assert_eq!(cart.ram_len(), 2 * RAM_BANK_LEN);
        assert_eq!(cart.region, Region::Pal);
    }

    #[test]
    fn four_screen_wins_over_vertical_bit() {
        let cart = Cartridge::from_bytes(&build_ines(1, 1, 0x09, 0, 0, 0)).unwrap();
        assert_eq!(cart.mirroring, Mirroring::FourScreen);
    }

    #[test]
    fn zero_ram_banks_reads_as_one() {
        let cart = Cartridge::from_bytes(&build_ines(1, 1, 0, 0, 0, 0)).unwrap();
        assert_eq!(cart.ram_banks, 1);
        assert_eq!(cart.ram_len(), RAM_BANK_LEN);
    }

    #[test]
    fn trainer_offsets_bank_data() {
        let mut image = build_ines(1, 1, 0x04, 0, 0, 0);
        let prg_start = HEADER_LEN + TRAINER_LEN;
        image[prg_start] = 0x42;
        let cart = Cartridge::from_bytes(&image).unwrap();
        assert!(cart.trainer);
        assert_eq!(cart.prg_rom[0], 0x42);
    }

    #[test]
    fn chr_ram_allocated_when_no_chr_banks() {
        let cart = Cartridge::from_bytes(&build_ines(1, 0, 0, 0, 0, 0)).unwrap();
        assert!(cart.chr_is_ram);
        assert_eq!(cart.chr_data.len(), CHR_BANK_LEN);
    }

    #[test]
    fn rejects_bad_magic() {
        let mut image = build_ines(1, 1, 0, 0, 0, 0);
        image[0] = b'X';
        assert!(matches!(
            Cartridge::from_bytes(&image),
            Err(NesError::RomInvalid(_))
        ));
    }

    #[test]
    fn rejects_truncated_banks() {
        let mut image = build_ines(2, 1, 0, 0, 0, 0);
        image.truncate(HEADER_LEN + PRG_BANK_LEN);
        assert!(matches!(
            Cartridge::from_bytes(&image),
            Err(NesError::RomInvalid(_))
        ));
    }

    #[test]
    fn parsed_fields_round_trip_through_rebuilt_image() {
        let original = Cartridge::from_bytes(&build_ines(2, 1, 0x03, 0x10, 2, 0x01)).unwrap();

        let mut rebuilt = vec![
            b'N',
            b'E',
            b'S',
            0x1A,
            original.prg_banks,
            original.chr_banks,
            0x03,
            0x10,
            original.ram_banks,
            0x01,
            0,
            0,
            0,
            0,
            0,
            0,
        ];
        rebuilt.extend_from_slice(&original.prg_rom);
        rebuilt.extend_from_slice(&original.chr_data);

        let reparsed = Cartridge::from_bytes(&rebuilt).unwrap();
        assert_eq!(reparsed.prg_banks, original.prg_banks);
        assert_eq!(reparsed.chr_banks, original.chr_banks);
        assert_eq!(reparsed.ram_banks, original.ram_banks);
        assert_eq!(reparsed.mapper_id, original.mapper_id);
        assert_eq!(reparsed.mirroring, original.mirroring);
        assert_eq!(reparsed.battery, original.battery);
        assert_eq!(reparsed.region, original.region);
        assert_eq!(reparsed.prg_rom, original.prg_rom);
        assert_eq!(reparsed.chr_data, original.chr_data);
    }
}
