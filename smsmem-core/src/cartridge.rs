use std::path::Path;
use std::{fs, io};
use thiserror::Error;

pub const ROM_BANK_SIZE: usize = 16 * 1024;

/// Paging registers are 8 bits wide, so at most 256 ROM banks are addressable.
pub const MAX_ROM_BANKS: usize = 256;

pub const CARTRIDGE_RAM_BANK_SIZE: usize = 16 * 1024;
pub const CARTRIDGE_RAM_BANKS: usize = 2;
pub const CARTRIDGE_RAM_SIZE: usize = CARTRIDGE_RAM_BANK_SIZE * CARTRIDGE_RAM_BANKS;

// Some dumps carry a 512-byte copier header in front of the actual ROM data
const COPIER_HEADER_LEN: usize = 512;

#[derive(Error, Debug)]
pub enum CartridgeLoadError {
    #[error("ROM image is empty")]
    Empty,
    #[error("ROM image is {len} bytes, larger than the maximum of {max} bytes")]
    TooLarge { len: usize, max: usize },
    #[error("cartridge RAM image is {len} bytes, expected at most {max} bytes")]
    RamTooLarge { len: usize, max: usize },
    #[error("error reading ROM image: {source}")]
    FileRead {
        #[from]
        source: io::Error,
    },
}

#[derive(Debug, Clone)]
pub struct Cartridge {
    rom: Vec<u8>,
    ram: Option<Vec<u8>>,
}

impl Cartridge {
    /// Create a cartridge from a raw ROM image. The image is padded with 0xFF to a whole number of
    /// 16KB banks.
    pub fn new(mut rom: Vec<u8>) -> Result<Self, CartridgeLoadError> {
        if rom.len() % 1024 == COPIER_HEADER_LEN {
            log::debug!("Stripping {COPIER_HEADER_LEN}-byte copier header from ROM image");
            rom.drain(..COPIER_HEADER_LEN);
        }

        if rom.is_empty() {
            return Err(CartridgeLoadError::Empty);
        }

        let max = MAX_ROM_BANKS * ROM_BANK_SIZE;
        if rom.len() > max {
            return Err(CartridgeLoadError::TooLarge { len: rom.len(), max });
        }

        let padded_len = rom.len().div_ceil(ROM_BANK_SIZE) * ROM_BANK_SIZE;
        if padded_len != rom.len() {
            log::debug!("Padding ROM image from {} to {padded_len} bytes", rom.len());
            rom.resize(padded_len, 0xFF);
        }

        Ok(Self { rom, ram: None })
    }

    pub fn from_file<P>(path: P) -> Result<Self, CartridgeLoadError>
    where
        P: AsRef<Path>,
    {
        let rom = fs::read(path.as_ref())?;
        Self::new(rom)
    }

    /// Attach previously saved cartridge RAM contents. Shorter images are zero-extended.
    pub fn with_ram(mut self, ram: Vec<u8>) -> Result<Self, CartridgeLoadError> {
        if ram.len() > CARTRIDGE_RAM_SIZE {
            return Err(CartridgeLoadError::RamTooLarge {
                len: ram.len(),
                max: CARTRIDGE_RAM_SIZE,
            });
        }

        self.ram = Some(ram);
        Ok(self)
    }

    pub fn rom(&self) -> &[u8] {
        &self.rom
    }

    pub fn ram(&self) -> Option<&[u8]> {
        self.ram.as_deref()
    }

    pub fn rom_bank_count(&self) -> usize {
        self.rom.len() / ROM_BANK_SIZE
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_whole_banks() {
        let cartridge = Cartridge::new(vec![0x00; 20 * 1024]).unwrap();

        assert_eq!(2, cartridge.rom_bank_count());
        assert_eq!(32 * 1024, cartridge.rom().len());
        assert_eq!(0x00, cartridge.rom()[20 * 1024 - 1]);
        assert_eq!(0xFF, cartridge.rom()[20 * 1024]);
    }

    #[test]
    fn strips_copier_header() {
        let mut rom = vec![0xAA; 512];
        rom.extend(vec![0x11; ROM_BANK_SIZE]);

        let cartridge = Cartridge::new(rom).unwrap();

        assert_eq!(1, cartridge.rom_bank_count());
        assert!(cartridge.rom().iter().all(|&b| b == 0x11));
    }

    #[test]
    fn rejects_empty_and_oversized() {
        assert!(matches!(Cartridge::new(Vec::new()), Err(CartridgeLoadError::Empty)));
        assert!(matches!(Cartridge::new(vec![0; 512]), Err(CartridgeLoadError::Empty)));
        assert!(matches!(
            Cartridge::new(vec![0; (MAX_ROM_BANKS + 1) * ROM_BANK_SIZE]),
            Err(CartridgeLoadError::TooLarge { .. })
        ));
    }

    #[test]
    fn attaches_ram() {
        let cartridge = Cartridge::new(vec![0; ROM_BANK_SIZE]).unwrap();
        assert!(cartridge.ram().is_none());

        let cartridge = cartridge.with_ram(vec![0x12; 100]).unwrap();
        assert_eq!(Some(&[0x12; 100][..]), cartridge.ram());

        let cartridge = Cartridge::new(vec![0; ROM_BANK_SIZE]).unwrap();
        assert!(matches!(
            cartridge.with_ram(vec![0; CARTRIDGE_RAM_SIZE + 1]),
            Err(CartridgeLoadError::RamTooLarge { .. })
        ));
    }
}
