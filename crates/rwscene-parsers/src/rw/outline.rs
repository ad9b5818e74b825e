// rwscene-parsers/src/rw/outline.rs
//! Chunk tree outline
//!
//! Walks raw chunk headers without interpreting payloads, descending into
//! chunk types that are known to hold nothing but child chunks. Used for
//! dumping the layout of a file.

use std::fmt;

use serde::Serialize;

use rwscene_core::Result;

use super::chunk::{ChunkType, HEADER_SIZE};
use super::reader::{ChunkReader, ParseContext};

/// One chunk in an outline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OutlineNode {
    /// Chunk type name, `Unknown` for unregistered tags
    pub name: &'static str,
    /// Raw type tag
    pub tag: u32,
    /// Version stamp, formatted
    pub version: String,
    /// Header offset from the start of the input
    pub offset: u64,
    /// Declared payload length
    pub length: u32,
    /// Child chunks, empty for leaf types
    pub children: Vec<OutlineNode>,
}

impl OutlineNode {
    /// Number of chunks in this subtree, this one included
    pub fn count(&self) -> usize {
        1 + self.children.iter().map(OutlineNode::count).sum::<usize>()
    }

    fn fmt_indented(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        writeln!(
            f,
            "{:indent$}{} (0x{:X}) @{} len {} v{}",
            "",
            self.name,
            self.tag,
            self.offset,
            self.length,
            self.version,
            indent = depth * 2
        )?;
        for child in &self.children {
            child.fmt_indented(f, depth + 1)?;
        }
        Ok(())
    }
}

impl fmt::Display for OutlineNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.fmt_indented(f, 0)
    }
}

fn is_container(chunk_type: ChunkType) -> bool {
    matches!(
        chunk_type,
        ChunkType::Extension
            | ChunkType::Texture
            | ChunkType::Material
            | ChunkType::MaterialList
            | ChunkType::FrameList
            | ChunkType::Geometry
            | ChunkType::Clump
            | ChunkType::Atomic
            | ChunkType::TextureNative
            | ChunkType::TextureDictionary
            | ChunkType::GeometryList
            | ChunkType::UvAnimDictionary
    )
}

/// Outline every top-level chunk in `data`
///
/// Trailing bytes too short to hold a header are ignored.
pub fn outline(data: &[u8], ctx: ParseContext) -> Result<Vec<OutlineNode>> {
    let mut r = ChunkReader::new(data);
    let mut nodes = Vec::new();
    while r.remaining() >= HEADER_SIZE {
        nodes.push(outline_node(&mut r, ctx)?);
    }
    Ok(nodes)
}

fn outline_node(r: &mut ChunkReader<'_>, ctx: ParseContext) -> Result<OutlineNode> {
    let ctx = ctx.descend()?;
    let header = r.read_header()?;
    let mut body = r.body(&header)?;

    let mut children = Vec::new();
    if is_container(header.chunk_type) {
        while !body.is_empty() {
            children.push(outline_node(&mut body, ctx)?);
        }
    }

    Ok(OutlineNode {
        name: header.chunk_type.name(),
        tag: header.chunk_type.to_u32(),
        version: header.version.to_string(),
        offset: header.offset,
        length: header.length,
        children,
    })
}
