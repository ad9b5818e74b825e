// rwscene-parsers/src/rw/atomic.rs
//! Atomic chunk: a draw call binding one frame to one geometry

use serde::Serialize;

use rwscene_core::{ChunkVersion, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::extension::Extension;
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::writer::{narrow, ChunkWriter};

/// Atomic flags
pub mod atomic_flags {
    /// Take part in collision tests
    pub const COLLISION_TEST: u32 = 0x01;
    /// Draw the atomic
    pub const RENDER: u32 = 0x04;
}

/// Atomic chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Atomic {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Storage index into the clump's frame list
    pub frame_index: usize,
    /// Index into the clump's geometry list
    pub geometry_index: usize,
    /// See [`atomic_flags`]
    pub flags: u32,
    /// Unused field, preserved as read
    pub unused: u32,
    /// Atomic plugins such as the render pipeline id
    pub extension: Extension,
}

impl Atomic {
    /// Rendered, collidable atomic with an empty extension
    pub fn new(frame_index: usize, geometry_index: usize, version: ChunkVersion) -> Self {
        Self {
            version,
            frame_index,
            geometry_index,
            flags: atomic_flags::COLLISION_TEST | atomic_flags::RENDER,
            unused: 0,
            extension: Extension::new(version),
        }
    }

    /// Whether the render flag is set
    pub fn is_rendered(&self) -> bool {
        self.flags & atomic_flags::RENDER != 0
    }
}

impl Chunk for Atomic {
    const TYPE: ChunkType = ChunkType::Atomic;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let frame_index = s.read_u32()? as usize;
        let geometry_index = s.read_u32()? as usize;
        let flags = s.read_u32()?;
        let unused = s.read_u32()?;
        s.finish(&struct_header)?;

        Ok(Self {
            version: header.version,
            frame_index,
            geometry_index,
            flags,
            unused,
            extension: Extension::read(r, ctx)?,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| {
            w.write_u32(narrow("atomic frame index", self.frame_index)?)?;
            w.write_u32(narrow("atomic geometry index", self.geometry_index)?)?;
            w.write_u32(self.flags)?;
            w.write_u32(self.unused)
        })?;
        self.extension.write(w)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_atomic_roundtrip() {
        let atomic = Atomic::new(3, 1, ChunkVersion::SAN_ANDREAS);
        let mut w = ChunkWriter::new();
        atomic.write(&mut w).unwrap();
        assert_eq!(w.len(), 12 + 12 + 16 + 12);
        let back = Atomic::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap();
        assert_eq!(back, atomic);
        assert!(back.is_rendered());
    }
}
