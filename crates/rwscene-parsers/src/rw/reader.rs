// rwscene-parsers/src/rw/reader.rs
//! Bounded little-endian reader over an in-memory chunk payload
//!
//! Every chunk body is read through its own [`ChunkReader`] whose slice ends
//! exactly at the declared payload length, so a child can never read into its
//! siblings. Offsets reported in errors are absolute within the source buffer.

use byteorder::{ByteOrder, LittleEndian};
use glam::{Mat4, Vec2, Vec3};

use rwscene_core::{Error, Result};

use super::chunk::{ChunkHeader, ChunkType, HEADER_SIZE};

/// Per-descent parse state handed from parent to child
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseContext {
    /// Current nesting depth
    pub depth: u32,
    /// Maximum nesting depth before parsing fails
    pub max_depth: u32,
    /// Vertex count of the enclosing geometry
    pub vertex_count: Option<usize>,
    /// Whether the enclosing geometry stores platform-native data
    pub native: bool,
}

impl ParseContext {
    /// Nesting limit when none is configured
    pub const DEFAULT_MAX_DEPTH: u32 = 32;

    /// Context for a top-level chunk
    pub fn new(max_depth: u32) -> Self {
        Self {
            depth: 0,
            max_depth,
            vertex_count: None,
            native: false,
        }
    }

    /// Context one level deeper, failing past the nesting limit
    pub fn descend(self) -> Result<Self> {
        let depth = self.depth + 1;
        if depth > self.max_depth {
            return Err(Error::NestingTooDeep {
                depth,
                limit: self.max_depth,
            });
        }
        Ok(Self { depth, ..self })
    }

    /// Context for the children of a geometry
    pub fn within_geometry(self, vertex_count: usize, native: bool) -> Self {
        Self {
            vertex_count: Some(vertex_count),
            native,
            ..self
        }
    }
}

impl Default for ParseContext {
    fn default() -> Self {
        Self::new(Self::DEFAULT_MAX_DEPTH)
    }
}

/// Cursor over a bounded byte region
#[derive(Debug, Clone)]
pub struct ChunkReader<'a> {
    data: &'a [u8],
    pos: usize,
    base: u64,
}

impl<'a> ChunkReader<'a> {
    /// Reader over a whole buffer starting at offset 0
    pub fn new(data: &'a [u8]) -> Self {
        Self::with_base(data, 0)
    }

    /// Reader whose first byte sits at `base` in the source buffer
    pub fn with_base(data: &'a [u8], base: u64) -> Self {
        Self { data, pos: 0, base }
    }

    /// Absolute offset of the next byte
    pub fn offset(&self) -> u64 {
        self.base + self.pos as u64
    }

    /// Bytes consumed so far
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left in this region
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Whether the region is used up
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    fn truncated(&self, expected: usize) -> Error {
        Error::Truncated {
            offset: self.offset(),
            expected: expected as u64,
            available: self.remaining() as u64,
        }
    }

    /// Borrow the next `len` bytes and advance past them
    pub fn read_bytes(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    /// Borrow everything left in the region
    pub fn read_rest(&mut self) -> &'a [u8] {
        let bytes = &self.data[self.pos..];
        self.pos = self.data.len();
        bytes
    }

    /// Copy the next `N` bytes
    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    /// One byte
    pub fn read_u8(&mut self) -> Result<u8> {
        Ok(self.read_bytes(1)?[0])
    }

    /// Little-endian `u16`
    pub fn read_u16(&mut self) -> Result<u16> {
        Ok(LittleEndian::read_u16(self.read_bytes(2)?))
    }

    /// Little-endian `i16`
    pub fn read_i16(&mut self) -> Result<i16> {
        Ok(LittleEndian::read_i16(self.read_bytes(2)?))
    }

    /// Little-endian `u32`
    pub fn read_u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.read_bytes(4)?))
    }

    /// Little-endian `i32`
    pub fn read_i32(&mut self) -> Result<i32> {
        Ok(LittleEndian::read_i32(self.read_bytes(4)?))
    }

    /// Little-endian `f32`
    pub fn read_f32(&mut self) -> Result<f32> {
        Ok(LittleEndian::read_f32(self.read_bytes(4)?))
    }

    /// Read `N` consecutive floats
    pub fn read_f32s<const N: usize>(&mut self) -> Result<[f32; N]> {
        let bytes = self.read_bytes(N * 4)?;
        let mut out = [0.0f32; N];
        LittleEndian::read_f32_into(bytes, &mut out);
        Ok(out)
    }

    /// Two floats as a vector
    pub fn read_vec2(&mut self) -> Result<Vec2> {
        Ok(Vec2::from_array(self.read_f32s::<2>()?))
    }

    /// Three floats as a vector
    pub fn read_vec3(&mut self) -> Result<Vec3> {
        Ok(Vec3::from_array(self.read_f32s::<3>()?))
    }

    /// Read a column-major 4x4 matrix
    pub fn read_mat4(&mut self) -> Result<Mat4> {
        Ok(Mat4::from_cols_array(&self.read_f32s::<16>()?))
    }

    /// Read a count field and check it against what the region could hold
    ///
    /// `min_item_size` is the smallest number of bytes one item can occupy;
    /// a count that cannot possibly fit is reported as truncation before any
    /// allocation happens.
    pub fn read_count(&mut self, min_item_size: usize) -> Result<usize> {
        let offset = self.offset();
        let raw = self.read_i32()?;
        let count = usize::try_from(raw)
            .map_err(|_| Error::invalid_data(format!("negative count {raw} at offset {offset}")))?;
        self.check_fits(count, min_item_size)?;
        Ok(count)
    }

    /// Fail early when `count` items of `item_size` bytes cannot fit
    pub fn check_fits(&self, count: usize, item_size: usize) -> Result<()> {
        let needed = count.saturating_mul(item_size);
        if needed > self.remaining() {
            return Err(self.truncated(needed));
        }
        Ok(())
    }

    /// Read a chunk header without descending into it
    pub fn read_header(&mut self) -> Result<ChunkHeader> {
        let offset = self.offset();
        let bytes = self.read_array::<HEADER_SIZE>()?;
        Ok(ChunkHeader::from_bytes(&bytes, offset))
    }

    /// Look at the next chunk type without consuming anything
    pub fn peek_type(&self) -> Option<ChunkType> {
        if self.remaining() < 4 {
            return None;
        }
        Some(ChunkType::from_u32(LittleEndian::read_u32(&self.data[self.pos..])))
    }

    /// Look at the next u32 without consuming it
    pub fn peek_u32(&self) -> Option<u32> {
        if self.remaining() < 4 {
            return None;
        }
        Some(LittleEndian::read_u32(&self.data[self.pos..]))
    }

    /// Split off a reader for the payload of `header`, advancing past it
    pub fn body(&mut self, header: &ChunkHeader) -> Result<ChunkReader<'a>> {
        let len = header.length as usize;
        if len > self.remaining() {
            return Err(self.truncated(len));
        }
        let base = self.offset();
        let data = self.read_bytes(len)?;
        Ok(ChunkReader::with_base(data, base))
    }

    /// Read a header that must be of type `expected` and return its payload
    pub fn enter(&mut self, expected: ChunkType) -> Result<(ChunkHeader, ChunkReader<'a>)> {
        let header = self.read_header()?;
        if header.chunk_type != expected {
            return Err(Error::UnexpectedNode {
                expected: expected.name().to_string(),
                found: header.chunk_type.to_u32(),
                offset: header.offset,
            });
        }
        let body = self.body(&header)?;
        Ok((header, body))
    }

    /// Verify that the whole payload of `header` was consumed
    pub fn finish(&self, header: &ChunkHeader) -> Result<()> {
        if self.pos != self.data.len() {
            return Err(Error::StructuralMismatch {
                node_type: header.chunk_type.to_u32(),
                offset: header.offset,
                declared: u64::from(header.length),
                consumed: self.pos as u64,
            });
        }
        Ok(())
    }
}
