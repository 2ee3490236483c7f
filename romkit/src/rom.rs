//! Bank-addressed ROM buffer
//!
//! A [`Rom`] owns the raw image bytes and a cursor. The cursor is stored as a
//! physical file offset; every public position is a logical (CPU-visible)
//! address translated through the image's [`AddressMode`].
//!
//! # Address mapping
//!
//! ```text
//! LoROM  bank   = (addr - 0xC00000 if addr >= 0xC00000 else addr) >> 16
//!        offset = (bank << 15) + (addr & 0x7FFF) + header
//! HiROM  offset = addr - 0xC00000 + header
//! ```
//!
//! `header` is the 0x200-byte copier header, present when the file is at
//! least [`AddressMode::header_threshold`] bytes long.

use serde::{Deserialize, Serialize};

use crate::error::{CodecError, Result};

/// Base of the fast ROM mirror used for every logical address we hand out.
pub const ROM_BASE: u32 = 0xC00000;

/// Size of a copier header.
pub const COPIER_HEADER_SIZE: usize = 0x200;

/// Address-mapping scheme of an image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AddressMode {
    /// 32KB windows at 0x8000 within each 64KB bank
    LoRom,
    /// Linear mapping from 0xC00000
    #[default]
    HiRom,
}

impl AddressMode {
    /// Smallest file length that implies a copier header.
    pub const fn header_threshold(self) -> usize {
        match self {
            AddressMode::LoRom => 0x100200,
            AddressMode::HiRom => 0x300200,
        }
    }

    /// Header size for a file of `len` bytes.
    pub const fn header_size(self, len: usize) -> usize {
        if len >= self.header_threshold() {
            COPIER_HEADER_SIZE
        } else {
            0
        }
    }
}

/// Scalar width in bytes. All scalars are little-endian.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Width {
    #[default]
    Byte,
    Word,
    /// 24-bit long address
    #[serde(alias = "sword")]
    Long,
    Dword,
}

impl Width {
    pub const fn bytes(self) -> usize {
        match self {
            Width::Byte => 1,
            Width::Word => 2,
            Width::Long => 3,
            Width::Dword => 4,
        }
    }

    /// Largest value representable in this width.
    pub const fn max(self) -> u32 {
        match self {
            Width::Byte => 0xFF,
            Width::Word => 0xFFFF,
            Width::Long => 0xFF_FFFF,
            Width::Dword => u32::MAX,
        }
    }

    /// Narrowest width that can hold `value`.
    pub const fn fitting(value: u32) -> Width {
        if value <= 0xFF {
            Width::Byte
        } else if value <= 0xFFFF {
            Width::Word
        } else if value <= 0xFF_FFFF {
            Width::Long
        } else {
            Width::Dword
        }
    }
}

/// ROM image with a logical cursor and a call/return stack.
#[derive(Debug)]
pub struct Rom {
    bytes: Vec<u8>,
    mode: AddressMode,
    header_size: usize,
    index: usize,
    stack: Vec<usize>,
}

impl Rom {
    /// Wrap raw image bytes. The cursor starts at file offset zero.
    pub fn new(bytes: Vec<u8>, mode: AddressMode) -> Self {
        let header_size = mode.header_size(bytes.len());
        Self {
            bytes,
            mode,
            header_size,
            index: 0,
            stack: Vec::new(),
        }
    }

    pub fn mode(&self) -> AddressMode {
        self.mode
    }

    pub fn header_size(&self) -> usize {
        self.header_size
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    /// Number of saved cursors currently on the stack.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Translate a logical address to a file offset.
    ///
    /// The end of the image is a valid position; anything past it is not.
    pub fn to_physical(&self, address: u32) -> Result<usize> {
        let offset = match self.mode {
            AddressMode::LoRom => {
                let address = if address >= ROM_BASE {
                    address - ROM_BASE
                } else {
                    address
                };
                let bank = (address >> 16) as usize;
                (bank << 15) + (address & 0x7FFF) as usize + self.header_size
            }
            AddressMode::HiRom => {
                if address < ROM_BASE {
                    return Err(CodecError::Addressing(format!(
                        "{address:#08X} is below the HiROM base {ROM_BASE:#08X}"
                    )));
                }
                (address - ROM_BASE) as usize + self.header_size
            }
        };

        if offset > self.bytes.len() {
            return Err(CodecError::Addressing(format!(
                "{address:#08X} maps to offset {offset:#X}, past the end of a {:#X}-byte image",
                self.bytes.len()
            )));
        }
        Ok(offset)
    }

    /// Translate a file offset back to its canonical logical address.
    pub fn to_logical(&self, offset: usize) -> Result<u32> {
        if offset < self.header_size {
            return Err(CodecError::Addressing(format!(
                "offset {offset:#X} lies inside the {:#X}-byte copier header",
                self.header_size
            )));
        }
        let fixed = offset - self.header_size;
        let address = match self.mode {
            AddressMode::LoRom => ((fixed >> 15) << 16) + ((fixed & 0x7FFF) | 0x8000),
            AddressMode::HiRom => fixed,
        };
        u32::try_from(address)
            .ok()
            .and_then(|a| a.checked_add(ROM_BASE))
            .ok_or_else(|| CodecError::Addressing(format!("offset {offset:#X} has no logical address")))
    }

    /// Current logical address.
    pub fn offset(&self) -> Result<u32> {
        self.to_logical(self.index)
    }

    /// Move the cursor to a logical address.
    pub fn seek(&mut self, address: u32) -> Result<()> {
        self.index = self.to_physical(address)?;
        Ok(())
    }

    fn span(&self, width: Width) -> Result<std::ops::Range<usize>> {
        let end = self.index + width.bytes();
        if end > self.bytes.len() {
            let at = self
                .to_logical(self.index)
                .map(|a| format!("{a:#08X}"))
                .unwrap_or_else(|_| format!("offset {:#X}", self.index));
            return Err(CodecError::Addressing(format!(
                "{}-byte access at {at} runs past the end of a {:#X}-byte image",
                width.bytes(),
                self.bytes.len()
            )));
        }
        Ok(self.index..end)
    }

    /// Read an unsigned little-endian scalar and advance.
    pub fn read(&mut self, width: Width) -> Result<u32> {
        let span = self.span(width)?;
        let value = self.bytes[span.clone()]
            .iter()
            .rev()
            .fold(0u32, |acc, &b| (acc << 8) | b as u32);
        self.index = span.end;
        Ok(value)
    }

    /// Read without moving the cursor.
    pub fn peek(&mut self, width: Width) -> Result<u32> {
        let index = self.index;
        let value = self.read(width);
        self.index = index;
        value
    }

    /// Write an unsigned little-endian scalar and advance.
    pub fn write(&mut self, value: u32, width: Width) -> Result<()> {
        if value > width.max() {
            return Err(CodecError::RangeExceeded(format!(
                "{value:#X} does not fit in {} byte(s)",
                width.bytes()
            )));
        }
        let span = self.span(width)?;
        let end = span.end;
        for (i, slot) in self.bytes[span].iter_mut().enumerate() {
            *slot = (value >> (8 * i)) as u8;
        }
        self.index = end;
        Ok(())
    }

    /// Run `f` with the cursor moved to `address`, then restore it.
    ///
    /// The saved cursor is restored whether `f` succeeds or fails, so an
    /// error never leaves the stack unbalanced.
    pub fn enter<T, F>(&mut self, address: u32, f: F) -> Result<T>
    where
        F: FnOnce(&mut Rom) -> Result<T>,
    {
        self.stack.push(self.index);
        let result = self.seek(address).and_then(|()| f(self));
        if let Some(index) = self.stack.pop() {
            self.index = index;
        }
        result
    }
}

/// Cloning copies the image bytes and resets the cursor.
///
/// The clone is a fresh output image: it starts at offset zero with an empty
/// cursor stack, whatever state the source buffer was in.
impl Clone for Rom {
    fn clone(&self) -> Self {
        Self {
            bytes: self.bytes.clone(),
            mode: self.mode,
            header_size: self.header_size,
            index: 0,
            stack: Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hirom(len: usize) -> Rom {
        Rom::new(vec![0; len], AddressMode::HiRom)
    }

    fn lorom(len: usize) -> Rom {
        Rom::new(vec![0; len], AddressMode::LoRom)
    }

    #[test]
    fn test_hirom_round_trip() {
        let rom = hirom(0x400000);
        for address in [0xC00000, 0xC0FFDC, 0xC12345, 0xFFFDFF] {
            let offset = rom.to_physical(address).unwrap();
            assert_eq!(rom.to_logical(offset).unwrap(), address);
        }
        assert_eq!(rom.to_physical(0xC12345).unwrap(), 0x12545);
    }

    #[test]
    fn test_lorom_round_trip() {
        let rom = lorom(0x200000);
        for address in [0xC08000, 0xC0FFFF, 0xC18000, 0xC3ABCD, 0xDFFFFF] {
            let offset = rom.to_physical(address).unwrap();
            assert_eq!(rom.to_logical(offset).unwrap(), address);
        }
        // Bank 1 starts 32KB into the file, after the header
        assert_eq!(rom.to_physical(0xC18000).unwrap(), 0x8000 + 0x200);
        // Low mirror maps to the same place as the 0xC0 mirror
        assert_eq!(
            rom.to_physical(0x018000).unwrap(),
            rom.to_physical(0xC18000).unwrap()
        );
    }

    #[test]
    fn test_header_thresholds() {
        assert_eq!(hirom(0x3001FF).header_size(), 0);
        assert_eq!(hirom(0x300200).header_size(), 0x200);
        assert_eq!(lorom(0x1001FF).header_size(), 0);
        assert_eq!(lorom(0x100200).header_size(), 0x200);

        let rom = hirom(0x300200);
        assert_eq!(rom.to_physical(0xC00000).unwrap(), 0x200);
        assert!(rom.to_logical(0x1FF).is_err());
    }

    #[test]
    fn test_read_write_widths() {
        let mut rom = hirom(0x20);
        rom.seek(0xC00000).unwrap();
        rom.write(0xAB, Width::Byte).unwrap();
        rom.write(0x1234, Width::Word).unwrap();
        rom.write(0x56789A, Width::Long).unwrap();
        rom.write(0xDEADBEEF, Width::Dword).unwrap();
        assert_eq!(rom.offset().unwrap(), 0xC0000A);
        assert_eq!(
            &rom.as_bytes()[..10],
            &[0xAB, 0x34, 0x12, 0x9A, 0x78, 0x56, 0xEF, 0xBE, 0xAD, 0xDE]
        );

        rom.seek(0xC00000).unwrap();
        assert_eq!(rom.read(Width::Byte).unwrap(), 0xAB);
        assert_eq!(rom.read(Width::Word).unwrap(), 0x1234);
        assert_eq!(rom.peek(Width::Long).unwrap(), 0x56789A);
        assert_eq!(rom.read(Width::Long).unwrap(), 0x56789A);
        assert_eq!(rom.read(Width::Dword).unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn test_out_of_range_is_an_error() {
        let mut rom = hirom(0x10);
        assert!(matches!(rom.seek(0xC00011), Err(CodecError::Addressing(_))));
        assert!(matches!(rom.seek(0xBFFFFF), Err(CodecError::Addressing(_))));

        rom.seek(0xC0000F).unwrap();
        assert!(matches!(rom.read(Width::Word), Err(CodecError::Addressing(_))));
        // Failed read leaves the cursor alone
        assert_eq!(rom.offset().unwrap(), 0xC0000F);
        assert!(matches!(
            rom.write(0x100, Width::Byte),
            Err(CodecError::RangeExceeded(_))
        ));
    }

    #[test]
    fn test_enter_restores_cursor() {
        let mut rom = hirom(0x100);
        rom.seek(0xC00010).unwrap();

        let value = rom
            .enter(0xC00080, |rom| {
                rom.write(0x42, Width::Byte)?;
                rom.offset()
            })
            .unwrap();
        assert_eq!(value, 0xC00081);
        assert_eq!(rom.offset().unwrap(), 0xC00010);
        assert_eq!(rom.depth(), 0);

        let failed = rom.enter(0xC00080, |rom| {
            rom.read(Width::Byte)?;
            rom.enter(0xC00090, |rom| rom.seek(0xC10000))
        });
        assert!(failed.is_err());
        assert_eq!(rom.offset().unwrap(), 0xC00010);
        assert_eq!(rom.depth(), 0);

        assert!(rom.enter(0xC20000, |_| Ok(())).is_err());
        assert_eq!(rom.offset().unwrap(), 0xC00010);
        assert_eq!(rom.depth(), 0);
    }

    #[test]
    fn test_clone_resets_cursor() {
        let mut rom = hirom(0x10);
        rom.seek(0xC00004).unwrap();
        rom.write(7, Width::Byte).unwrap();

        let mut copy = rom.clone();
        assert_eq!(copy.offset().unwrap(), 0xC00000);
        assert_eq!(copy.as_bytes()[4], 7);

        copy.seek(0xC00004).unwrap();
        copy.write(9, Width::Byte).unwrap();
        assert_eq!(rom.as_bytes()[4], 7);
    }
}
