// rwscene-parsers/src/rw/writer.rs
//! Chunk serialization with backpatched lengths
//!
//! A chunk is written as a placeholder header, then its body, then the
//! length field is patched once the body size is known.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use glam::{Mat4, Vec2, Vec3};

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::ChunkType;

/// Position of an open chunk's length field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[must_use = "an open chunk must be closed with ChunkWriter::end_chunk"]
pub struct ChunkMark(usize);

/// Growable output buffer for chunk trees
#[derive(Debug, Default, Clone)]
pub struct ChunkWriter {
    buf: Vec<u8>,
}

impl ChunkWriter {
    /// Empty writer
    pub fn new() -> Self {
        Self::default()
    }

    /// Empty writer with room for `capacity` bytes
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    /// Bytes written so far
    pub fn len(&self) -> usize {
        self.buf.len()
    }

    /// Whether nothing has been written
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    /// Bytes written so far
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    /// Take the written bytes
    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }

    /// Write a header with a zero length and return the patch location
    pub fn begin_chunk(&mut self, chunk_type: ChunkType, version: ChunkVersion) -> Result<ChunkMark> {
        self.write_u32(chunk_type.to_u32())?;
        let mark = ChunkMark(self.buf.len());
        self.write_u32(0)?;
        self.write_u32(version.raw())?;
        Ok(mark)
    }

    /// Patch the length of the chunk opened at `mark`
    pub fn end_chunk(&mut self, mark: ChunkMark) -> Result<()> {
        let body_start = mark.0 + 8;
        let length = u32::try_from(self.buf.len() - body_start)
            .map_err(|_| Error::out_of_range("chunk length", self.buf.len() - body_start))?;
        LittleEndian::write_u32(&mut self.buf[mark.0..mark.0 + 4], length);
        Ok(())
    }

    /// Write a Struct chunk whose body is produced by `body`
    pub fn write_struct<F>(&mut self, version: ChunkVersion, body: F) -> Result<()>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let mark = self.begin_chunk(ChunkType::Struct, version)?;
        body(self)?;
        self.end_chunk(mark)
    }

    /// Append raw bytes
    pub fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    /// Write `count` zero bytes
    pub fn write_zeros(&mut self, count: usize) -> Result<()> {
        self.buf.resize(self.buf.len() + count, 0);
        Ok(())
    }

    /// One byte
    pub fn write_u8(&mut self, value: u8) -> Result<()> {
        Ok(self.buf.write_u8(value)?)
    }

    /// Little-endian `u16`
    pub fn write_u16(&mut self, value: u16) -> Result<()> {
        Ok(self.buf.write_u16::<LittleEndian>(value)?)
    }

    /// Little-endian `i16`
    pub fn write_i16(&mut self, value: i16) -> Result<()> {
        Ok(self.buf.write_i16::<LittleEndian>(value)?)
    }

    /// Little-endian `u32`
    pub fn write_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.buf.write_u32::<LittleEndian>(value)?)
    }

    /// Little-endian `i32`
    pub fn write_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.buf.write_i32::<LittleEndian>(value)?)
    }

    /// Little-endian `f32`
    pub fn write_f32(&mut self, value: f32) -> Result<()> {
        Ok(self.buf.write_f32::<LittleEndian>(value)?)
    }

    /// Consecutive floats
    pub fn write_f32s(&mut self, values: &[f32]) -> Result<()> {
        for &v in values {
            self.write_f32(v)?;
        }
        Ok(())
    }

    /// Vector as two floats
    pub fn write_vec2(&mut self, v: Vec2) -> Result<()> {
        self.write_f32s(&v.to_array())
    }

    /// Vector as three floats
    pub fn write_vec3(&mut self, v: Vec3) -> Result<()> {
        self.write_f32s(&v.to_array())
    }

    /// Write a column-major 4x4 matrix
    pub fn write_mat4(&mut self, m: &Mat4) -> Result<()> {
        self.write_f32s(&m.to_cols_array())
    }

    /// Write a collection length as a signed 32-bit count
    pub fn write_count(&mut self, field: &'static str, count: usize) -> Result<()> {
        let value = i32::try_from(count).map_err(|_| Error::out_of_range(field, count))?;
        self.write_i32(value)
    }
}

/// Narrow a length into a fixed-width on-disk field
pub fn narrow<T, U>(field: &'static str, value: U) -> Result<T>
where
    U: Copy + TryInto<T> + TryInto<i64>,
{
    <U as TryInto<T>>::try_into(value).map_err(|_| Error::out_of_range(field, value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backpatched_length() {
        let mut w = ChunkWriter::new();
        let mark = w.begin_chunk(ChunkType::Struct, ChunkVersion::SAN_ANDREAS).unwrap();
        w.write_u32(7).unwrap();
        w.write_u16(1).unwrap();
        w.end_chunk(mark).unwrap();

        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 18);
        assert_eq!(&bytes[0..4], &[1, 0, 0, 0]);
        assert_eq!(&bytes[4..8], &[6, 0, 0, 0]);
        assert_eq!(&bytes[8..12], &[0xFF, 0xFF, 0x03, 0x18]);
    }

    #[test]
    fn test_nested_chunks() {
        let mut w = ChunkWriter::new();
        let outer = w.begin_chunk(ChunkType::Extension, ChunkVersion::SAN_ANDREAS).unwrap();
        w.write_struct(ChunkVersion::SAN_ANDREAS, |w| w.write_u32(1)).unwrap();
        w.end_chunk(outer).unwrap();

        let bytes = w.into_bytes();
        assert_eq!(bytes.len(), 28);
        assert_eq!(LittleEndian::read_u32(&bytes[4..8]), 16);
        assert_eq!(LittleEndian::read_u32(&bytes[16..20]), 4);
    }

    #[test]
    fn test_narrow_out_of_range() {
        assert!(narrow::<u8, usize>("bone count", 300).is_err());
        assert_eq!(narrow::<u8, usize>("bone count", 30).unwrap(), 30);
    }
}
