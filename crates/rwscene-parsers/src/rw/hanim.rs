// rwscene-parsers/src/rw/hanim.rs
//! Hierarchy animation (HAnim) plugin
//!
//! Every animated frame carries one of these with its name id. The frame at
//! the top of the skeleton additionally carries the node table that defines
//! hierarchy order, which is the index space skin data is expressed in.

use serde::Serialize;

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::writer::ChunkWriter;

/// Plugin version written by every known exporter
pub const HANIM_PLUGIN_VERSION: u32 = 0x100;

/// Default key frame size (standard rotation + translation keys)
pub const DEFAULT_KEY_FRAME_SIZE: u32 = 36;

/// Node flags
pub mod node_flags {
    /// Pop the matrix stack after this node
    pub const POP: u32 = 0x1;
    /// Push the matrix stack before this node's children
    pub const PUSH: u32 = 0x2;
}

/// One entry of the hierarchy node table
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct HAnimNode {
    /// Name id of the frame this entry refers to
    pub node_id: i32,
    /// Index stored with the entry (conventionally its own position)
    pub index: i32,
    /// Push/pop flags
    pub flags: u32,
}

/// Node table carried by the hierarchy root
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HAnimHierarchy {
    /// Hierarchy flags
    pub flags: u32,
    /// Size of one animation key frame
    pub key_frame_size: u32,
    /// Nodes in hierarchy order
    pub nodes: Vec<HAnimNode>,
}

impl HAnimHierarchy {
    /// Position of `node_id` in hierarchy order
    pub fn index_of(&self, node_id: i32) -> Option<usize> {
        self.nodes.iter().position(|n| n.node_id == node_id)
    }
}

/// HAnim plugin chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HAnimPlugin {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Plugin data version
    pub plugin_version: u32,
    /// Name id of the owning frame
    pub node_id: i32,
    /// Node table, present only on the hierarchy root
    ///
    /// A table with no nodes is written as no table at all.
    pub hierarchy: Option<HAnimHierarchy>,
}

impl HAnimPlugin {
    /// Plugin for a frame that is not the hierarchy root
    pub fn new(node_id: i32, version: ChunkVersion) -> Self {
        Self {
            version,
            plugin_version: HANIM_PLUGIN_VERSION,
            node_id,
            hierarchy: None,
        }
    }

    /// Plugin for the hierarchy root with the given nodes
    pub fn root(node_id: i32, nodes: Vec<HAnimNode>, version: ChunkVersion) -> Self {
        Self {
            hierarchy: Some(HAnimHierarchy {
                flags: 0,
                key_frame_size: DEFAULT_KEY_FRAME_SIZE,
                nodes,
            }),
            ..Self::new(node_id, version)
        }
    }

    /// Number of nodes in the table (zero when there is no table)
    pub fn node_count(&self) -> usize {
        self.hierarchy.as_ref().map_or(0, |h| h.nodes.len())
    }

    /// Nodes in hierarchy order
    pub fn nodes(&self) -> &[HAnimNode] {
        self.hierarchy.as_ref().map_or(&[], |h| h.nodes.as_slice())
    }
}

impl Chunk for HAnimPlugin {
    const TYPE: ChunkType = ChunkType::HAnim;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, _ctx: ParseContext) -> Result<Self> {
        let plugin_version = r.read_u32()?;
        let node_id = r.read_i32()?;
        let offset = r.offset();
        let node_count = r.read_i32()?;
        if node_count < 0 {
            return Err(Error::invalid_data(format!(
                "negative HAnim node count {node_count} at offset {offset}"
            )));
        }

        let hierarchy = if node_count > 0 {
            let flags = r.read_u32()?;
            let key_frame_size = r.read_u32()?;
            let count = node_count as usize;
            r.check_fits(count, 12)?;
            let mut nodes = Vec::with_capacity(count);
            for _ in 0..count {
                nodes.push(HAnimNode {
                    node_id: r.read_i32()?,
                    index: r.read_i32()?,
                    flags: r.read_u32()?,
                });
            }
            Some(HAnimHierarchy {
                flags,
                key_frame_size,
                nodes,
            })
        } else {
            None
        };

        Ok(Self {
            version: header.version,
            plugin_version,
            node_id,
            hierarchy,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_u32(self.plugin_version)?;
        w.write_i32(self.node_id)?;
        match &self.hierarchy {
            Some(h) if !h.nodes.is_empty() => {
                w.write_count("HAnim node count", h.nodes.len())?;
                w.write_u32(h.flags)?;
                w.write_u32(h.key_frame_size)?;
                for node in &h.nodes {
                    w.write_i32(node.node_id)?;
                    w.write_i32(node.index)?;
                    w.write_u32(node.flags)?;
                }
            }
            _ => w.write_i32(0)?,
        }
        Ok(())
    }
}
