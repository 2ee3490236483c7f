//! Glyph grids and bitplane tiles
//!
//! Both render as lines of fixed-width glyphs, one glyph per cell, so maps
//! and tiles can be edited as plain text.

use crate::error::{CodecError, Result};
use crate::pass::Pass;
use crate::rom::{Rom, Width};
use crate::types::Codec;
use crate::value::Value;

/// Glyphs used by [`Tile`] when none are configured.
pub const DEFAULT_GLYPHS: &str = "0123456789abcdef";

/// Fixed-width glyph alphabet indexed by cell value.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Glyphs {
    glyphs: Vec<String>,
    width: usize,
}

impl Glyphs {
    fn new(glyphs: Vec<String>, needed: usize) -> Result<Self> {
        let width = glyphs.first().map_or(0, |g| g.chars().count());
        if width == 0 || glyphs.iter().any(|g| g.chars().count() != width) {
            return Err(CodecError::Definition(
                "glyphs must be non-empty and equally wide".into(),
            ));
        }
        if glyphs.iter().any(|g| g.chars().any(char::is_whitespace)) {
            return Err(CodecError::Definition("glyphs may not contain whitespace".into()));
        }
        for (i, glyph) in glyphs.iter().enumerate() {
            if glyphs[..i].contains(glyph) {
                return Err(CodecError::Definition(format!("duplicate glyph {glyph:?}")));
            }
        }
        if glyphs.len() < needed {
            return Err(CodecError::Definition(format!(
                "{needed} glyphs needed, {} given",
                glyphs.len()
            )));
        }
        Ok(Self { glyphs, width })
    }

    fn chars(text: &str) -> Vec<String> {
        text.chars().map(String::from).collect()
    }

    fn glyph(&self, cell: u32) -> Result<&str> {
        self.glyphs
            .get(cell as usize)
            .map(String::as_str)
            .ok_or_else(|| CodecError::LookupMissing(format!("glyph for {cell:#x}")))
    }

    fn render(&self, cells: &[Value], per_line: usize) -> Result<String> {
        let mut lines = Vec::new();
        for row in cells.chunks(per_line) {
            let mut line = String::new();
            for cell in row {
                line.push_str(self.glyph(cell.as_u32()?)?);
            }
            lines.push(line);
        }
        Ok(lines.join("\n"))
    }

    fn read(&self, text: &str, expected: usize) -> Result<Vec<u32>> {
        let chars: Vec<char> = text.chars().filter(|c| !c.is_whitespace()).collect();
        let cells = chars
            .chunks(self.width)
            .map(|chunk| {
                let glyph: String = chunk.iter().collect();
                self.glyphs
                    .iter()
                    .position(|g| *g == glyph)
                    .map(|i| i as u32)
                    .ok_or_else(|| CodecError::LookupMissing(format!("glyph {glyph:?}")))
            })
            .collect::<Result<Vec<_>>>()?;
        if cells.len() != expected {
            return Err(CodecError::Validation(format!(
                "expected {expected} cells, found {}",
                cells.len()
            )));
        }
        Ok(cells)
    }
}

/// `width * height` byte cells shown as `height` lines of glyphs.
#[derive(Debug, Clone)]
pub struct Grid {
    pub width: usize,
    pub height: usize,
    glyphs: Glyphs,
}

impl Grid {
    pub fn new(width: usize, height: usize, glyphs: Vec<String>) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(CodecError::Definition("grid must have at least one cell".into()));
        }
        Ok(Self {
            width,
            height,
            glyphs: Glyphs::new(glyphs, 0)?,
        })
    }

    /// One single-character glyph per cell value.
    pub fn with_chars(width: usize, height: usize, glyphs: &str) -> Result<Self> {
        Self::new(width, height, Glyphs::chars(glyphs))
    }
}

impl Codec for Grid {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        let mut cells = Vec::with_capacity(self.width * self.height);
        for _ in 0..self.width * self.height {
            cells.push(Value::from(rom.read(Width::Byte)?));
        }
        Ok(Value::List(cells))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        let cells = value.as_list()?;
        if cells.len() != self.width * self.height {
            return Err(CodecError::Validation(format!(
                "expected {} cells, found {}",
                self.width * self.height,
                cells.len()
            )));
        }
        for cell in cells {
            rom.write(cell.as_u32()?, Width::Byte)?;
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let cells = self.glyphs.read(external.as_text()?, self.width * self.height)?;
        Ok(Value::List(cells.into_iter().map(Value::from).collect()))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        Ok(Value::Text(self.glyphs.render(value.as_list()?, self.width)?))
    }
}

const TILE_SIDE: usize = 8;
const TILE_PIXELS: usize = TILE_SIDE * TILE_SIDE;

/// 8x8 planar tile.
///
/// Planes are stored in pairs: for each pair, 8 rows of two interleaved bytes
/// (low plane, high plane), most significant bit leftmost. A 4bpp tile is
/// therefore 32 bytes: planes 0/1 for rows 0-7, then planes 2/3.
#[derive(Debug, Clone)]
pub struct Tile {
    pub bpp: u8,
    glyphs: Glyphs,
}

impl Tile {
    pub fn new(bpp: u8, glyphs: &str) -> Result<Self> {
        if !matches!(bpp, 2 | 4 | 8) {
            return Err(CodecError::Definition(format!(
                "tiles have 2, 4 or 8 bitplanes, not {bpp}"
            )));
        }
        Ok(Self {
            bpp,
            glyphs: Glyphs::new(Glyphs::chars(glyphs), 1 << bpp)?,
        })
    }

    /// Bytes occupied by one tile.
    pub fn size(&self) -> usize {
        TILE_SIDE * self.bpp as usize
    }

    fn plane_offset(plane: usize, row: usize) -> usize {
        (plane / 2) * 2 * TILE_SIDE + row * 2 + plane % 2
    }
}

impl Codec for Tile {
    fn decode(&self, rom: &mut Rom, _pass: &mut Pass) -> Result<Value> {
        let mut bytes = vec![0u8; self.size()];
        for byte in bytes.iter_mut() {
            *byte = rom.read(Width::Byte)? as u8;
        }

        let mut pixels = vec![0u32; TILE_PIXELS];
        for plane in 0..self.bpp as usize {
            for row in 0..TILE_SIDE {
                let bits = bytes[Self::plane_offset(plane, row)];
                for col in 0..TILE_SIDE {
                    if bits & (0x80 >> col) != 0 {
                        pixels[row * TILE_SIDE + col] |= 1 << plane;
                    }
                }
            }
        }
        Ok(Value::List(pixels.into_iter().map(Value::from).collect()))
    }

    fn encode(&self, value: &Value, rom: &mut Rom, _pass: &mut Pass) -> Result<()> {
        let pixels = value.as_list()?;
        if pixels.len() != TILE_PIXELS {
            return Err(CodecError::Validation(format!(
                "a tile has {TILE_PIXELS} pixels, found {}",
                pixels.len()
            )));
        }

        let mut bytes = vec![0u8; self.size()];
        for (i, pixel) in pixels.iter().enumerate() {
            let color = pixel.as_u32()?;
            if color >> self.bpp != 0 {
                return Err(CodecError::RangeExceeded(format!(
                    "color {color} needs more than {} bitplanes",
                    self.bpp
                )));
            }
            let (row, col) = (i / TILE_SIDE, i % TILE_SIDE);
            for plane in 0..self.bpp as usize {
                if color & (1 << plane) != 0 {
                    bytes[Self::plane_offset(plane, row)] |= 0x80 >> col;
                }
            }
        }

        for byte in bytes {
            rom.write(byte.into(), Width::Byte)?;
        }
        Ok(())
    }

    fn parse(&self, external: &Value) -> Result<Value> {
        let pixels = self.glyphs.read(external.as_text()?, TILE_PIXELS)?;
        Ok(Value::List(pixels.into_iter().map(Value::from).collect()))
    }

    fn format(&self, value: &Value) -> Result<Value> {
        Ok(Value::Text(self.glyphs.render(value.as_list()?, TILE_SIDE)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rom::AddressMode;

    fn rom(bytes: &[u8]) -> Rom {
        let mut data = bytes.to_vec();
        data.resize(64, 0);
        let mut rom = Rom::new(data, AddressMode::HiRom);
        rom.seek(0xC00000).unwrap();
        rom
    }

    #[test]
    fn test_grid_lines() {
        let grid = Grid::with_chars(3, 2, ".#o").unwrap();
        let mut pass = Pass::new();
        let raw = grid.decode(&mut rom(&[0, 1, 0, 2, 2, 1]), &mut pass).unwrap();
        let formatted = grid.format(&raw).unwrap();
        assert_eq!(formatted, Value::text(".#.\noo#"));
        assert_eq!(grid.parse(&formatted).unwrap(), raw);
        assert!(grid.parse(&Value::text(".#.\noo")).is_err());
    }

    #[test]
    fn test_grid_multi_char_glyphs() {
        let glyphs = vec!["..".to_string(), "[]".to_string()];
        let grid = Grid::new(2, 1, glyphs).unwrap();
        assert_eq!(
            grid.format(&Value::List(vec![Value::Int(1), Value::Int(0)])).unwrap(),
            Value::text("[].."),
        );
        assert!(Grid::new(2, 1, vec!["a".into(), "bb".into()]).is_err());
    }

    #[test]
    fn test_2bpp_tile() {
        let tile = Tile::new(2, DEFAULT_GLYPHS).unwrap();
        assert_eq!(tile.size(), 16);

        // Row 0: plane 0 = 0b1100_0000, plane 1 = 0b1010_0000
        let mut bytes = [0u8; 16];
        bytes[0] = 0xC0;
        bytes[1] = 0xA0;
        let mut pass = Pass::new();
        let raw = tile.decode(&mut rom(&bytes), &mut pass).unwrap();

        let formatted = tile.format(&raw).unwrap();
        let text = formatted.as_text().unwrap();
        assert_eq!(text.lines().next(), Some("31200000"));
        assert_eq!(text.lines().count(), 8);

        let parsed = tile.parse(&formatted).unwrap();
        let mut out = rom(&[]);
        tile.encode(&parsed, &mut out, &mut pass).unwrap();
        assert_eq!(&out.as_bytes()[..16], &bytes);
    }

    #[test]
    fn test_4bpp_plane_pairs() {
        let tile = Tile::new(4, DEFAULT_GLYPHS).unwrap();
        let mut pixels = vec![Value::Int(0); 64];
        pixels[0] = Value::Int(0xF);
        let mut pass = Pass::new();
        let mut out = rom(&[]);
        tile.encode(&Value::List(pixels), &mut out, &mut pass).unwrap();

        let bytes = out.as_bytes();
        assert_eq!((bytes[0], bytes[1]), (0x80, 0x80));
        assert_eq!((bytes[16], bytes[17]), (0x80, 0x80));
        assert_eq!(bytes[2..16].iter().filter(|&&b| b != 0).count(), 0);
    }

    #[test]
    fn test_tile_definition_checks() {
        assert!(Tile::new(3, DEFAULT_GLYPHS).is_err());
        assert!(Tile::new(8, DEFAULT_GLYPHS).is_err());
        assert!(Tile::new(2, "0123").is_ok());
    }
}
