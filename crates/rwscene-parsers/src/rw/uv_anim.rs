// rwscene-parsers/src/rw/uv_anim.rs
//! UV animation dictionary
//!
//! Appears in front of the clump in files with animated materials. The
//! animations themselves are kept as opaque nodes.

use serde::Serialize;

use rwscene_core::{ChunkVersion, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::node::{Chunk, Node};
use super::reader::{ChunkReader, ParseContext};
use super::writer::ChunkWriter;

/// UV animation dictionary chunk, animations kept as opaque nodes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UvAnimDictionary {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Animation chunks in stored order
    pub animations: Vec<Node>,
}

impl UvAnimDictionary {
    /// Empty dictionary
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            animations: Vec::new(),
        }
    }

    /// Number of animations
    pub fn len(&self) -> usize {
        self.animations.len()
    }

    /// Whether there are no animations
    pub fn is_empty(&self) -> bool {
        self.animations.is_empty()
    }
}

impl Chunk for UvAnimDictionary {
    const TYPE: ChunkType = ChunkType::UvAnimDictionary;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let count = s.read_count(0)?;
        s.finish(&struct_header)?;

        r.check_fits(count, 12)?;
        let animations = (0..count)
            .map(|_| Node::read(r, ctx))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            version: header.version,
            animations,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| w.write_count("animation count", self.animations.len()))?;
        for animation in &self.animations {
            animation.write(w)?;
        }
        Ok(())
    }
}
