//! HiROM internal checksum
//!
//! The sum covers file offsets `[0, 0x200000)` once and
//! `[0x200000, 0x300000)` twice; bytes past the end of the file count as
//! zero. The checksum word lives at 0xC0FFDE and its complement at 0xC0FFDC.

use tracing::info;

use crate::error::{CodecError, Result};
use crate::rom::{AddressMode, Rom, Width};

pub const CHECKSUM_ADDRESS: u32 = 0xC0FFDE;
pub const COMPLEMENT_ADDRESS: u32 = 0xC0FFDC;

const SINGLE_END: usize = 0x200000;
const DOUBLE_END: usize = 0x300000;

/// Checksum and complement words.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Checksum {
    pub checksum: u16,
    pub complement: u16,
}

impl Checksum {
    fn from_sum(sum: u64) -> Self {
        let checksum = (sum & 0xFFFF) as u16;
        Self {
            checksum,
            complement: checksum ^ 0xFFFF,
        }
    }
}

fn weight(offset: usize) -> u64 {
    if offset < SINGLE_END {
        1
    } else if offset < DOUBLE_END {
        2
    } else {
        0
    }
}

fn sum(bytes: &[u8], skip: Option<std::ops::Range<usize>>) -> u64 {
    bytes
        .iter()
        .enumerate()
        .take(DOUBLE_END)
        .filter(|(i, _)| skip.as_ref().is_none_or(|s| !s.contains(i)))
        .map(|(i, &b)| b as u64 * weight(i))
        .sum()
}

fn check_mode(rom: &Rom) -> Result<()> {
    match rom.mode() {
        AddressMode::HiRom => Ok(()),
        mode => Err(CodecError::Validation(format!(
            "checksums are only defined for HiROM images, not {mode:?}"
        ))),
    }
}

/// File offsets of the four checksum bytes.
fn checksum_bytes(rom: &Rom) -> Result<std::ops::Range<usize>> {
    let start = rom.to_physical(COMPLEMENT_ADDRESS)?;
    Ok(start..start + 4)
}

/// Checksum over every byte of the raw file.
pub fn compute(bytes: &[u8]) -> Checksum {
    Checksum::from_sum(sum(bytes, None))
}

/// Checksum the image would carry, ignoring the stored checksum bytes.
pub fn expected(rom: &Rom) -> Result<Checksum> {
    check_mode(rom)?;
    let skip = checksum_bytes(rom)?;
    Ok(Checksum::from_sum(sum(rom.as_bytes(), Some(skip))))
}

/// Checksum currently stored in the header.
pub fn stored(rom: &mut Rom) -> Result<Checksum> {
    check_mode(rom)?;
    let checksum = rom.enter(CHECKSUM_ADDRESS, |rom| rom.read(Width::Word))? as u16;
    let complement = rom.enter(COMPLEMENT_ADDRESS, |rom| rom.read(Width::Word))? as u16;
    Ok(Checksum {
        checksum,
        complement,
    })
}

/// Recompute and store the checksum.
pub fn apply(rom: &mut Rom) -> Result<Checksum> {
    let value = expected(rom)?;
    rom.enter(CHECKSUM_ADDRESS, |rom| {
        rom.write(value.checksum as u32, Width::Word)
    })?;
    rom.enter(COMPLEMENT_ADDRESS, |rom| {
        rom.write(value.complement as u32, Width::Word)
    })?;
    info!(checksum = value.checksum, complement = value.complement, "Checksum written");
    Ok(value)
}

/// Whether the stored checksum matches the image.
pub fn verify(rom: &mut Rom) -> Result<bool> {
    Ok(stored(rom)? == expected(rom)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_byte_image() {
        let mut bytes = vec![0u8; 0x300200];
        bytes[0] = 1;
        let value = compute(&bytes);
        assert_eq!(value.checksum, 0x0001);
        assert_eq!(value.complement, 0xFFFE);
    }

    #[test]
    fn test_upper_megabyte_counts_twice() {
        let mut bytes = vec![0u8; 0x300000];
        bytes[0x1FFFFF] = 1;
        bytes[0x200000] = 1;
        bytes[0x2FFFFF] = 1;
        assert_eq!(compute(&bytes).checksum, 5);

        // Short files sum as if zero-padded.
        assert_eq!(compute(&[3, 4]).checksum, 7);
    }

    #[test]
    fn test_applied_checksum_verifies() {
        let mut bytes = vec![0u8; 0x10000];
        bytes[0x20] = 0x42;
        let mut rom = Rom::new(bytes, AddressMode::HiRom);
        assert!(!verify(&mut rom).unwrap());

        let value = apply(&mut rom).unwrap();
        assert_eq!(value.checksum, 0x0042);
        assert_eq!(stored(&mut rom).unwrap(), value);
        assert!(verify(&mut rom).unwrap());

        // The stored words are part of the file but not of the sum.
        assert_eq!(expected(&rom).unwrap(), value);
        assert_ne!(compute(rom.as_bytes()), value);
    }

    #[test]
    fn test_lorom_is_rejected() {
        let mut rom = Rom::new(vec![0u8; 0x10000], AddressMode::LoRom);
        assert!(matches!(apply(&mut rom), Err(CodecError::Validation(_))));
    }
}
