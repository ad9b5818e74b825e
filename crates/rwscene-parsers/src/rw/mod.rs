// rwscene-parsers/src/rw/mod.rs
//! RenderWare binary stream codec
//!
//! A RenderWare file is a tree of chunks. Each chunk starts with a 12-byte
//! header (type, payload length, library version stamp) followed by its
//! payload, which is either raw data or further chunks.
//!
//! # Structure of a model file
//! ```text
//! Clump
//! ├── Struct            counts
//! ├── FrameList         transforms + per-frame Extension (HAnim, names)
//! ├── GeometryList
//! │   └── Geometry      vertices, triangles, MaterialList, Extension (skin, split)
//! ├── Atomic            frame + geometry binding
//! └── Extension
//! ```
//!
//! Parsing yields a typed tree of [`Node`]s; serialization recomputes every
//! length and count from the tree, so an unmodified tree writes back to the
//! bytes it was read from.

pub mod atomic;
pub mod chunk;
pub mod clump;
pub mod extension;
pub mod frame;
pub mod geometry;
pub mod hanim;
pub mod material;
pub mod node;
pub mod outline;
pub mod reader;
pub mod skin;
pub mod split;
pub mod stream;
pub mod string;
pub mod texture;
pub mod user_data;
pub mod uv_anim;
pub mod writer;

pub use atomic::Atomic;
pub use chunk::{ChunkHeader, ChunkType, HEADER_SIZE};
pub use clump::{Clump, ClumpSummary, GeometryList, SceneObject};
pub use extension::Extension;
pub use frame::{Frame, FrameList};
pub use geometry::{Geometry, MorphTarget, SurfaceProperties, Triangle};
pub use hanim::{HAnimHierarchy, HAnimNode, HAnimPlugin};
pub use material::{Material, MaterialList, MaterialSlot};
pub use node::{Chunk, FromNode, Node, StructChunk, UnknownChunk};
pub use outline::{outline, OutlineNode};
pub use reader::{ChunkReader, ParseContext};
pub use skin::{SkinPlugin, SkinSplitData, VertexInfluences, MAX_INFLUENCES};
pub use split::{MaterialSplit, MaterialSplitList, SplitEncoding};
pub use stream::RwStream;
pub use string::RwString;
pub use texture::{RasterCodec, RasterDescriptor, RasterName, SkyMipMap, TextureNative, TextureReference};
pub use user_data::{UserDataPlugin, UserDataSet, UserDataString, UserDataValues};
pub use uv_anim::UvAnimDictionary;
pub use writer::{ChunkWriter, ChunkMark};

use std::io::{Read, Seek};
use std::path::Path;

use memmap2::Mmap;
use tracing::{debug, info};

use rwscene_core::Result;

use crate::logging::instrument_parse;
use crate::traits::{HumanReadable, ParseOptions, ParsePhase, ParseProgress, Parser, ProgressCallback};

/// Parse the node at the start of `bytes` with default limits
pub fn parse_node(bytes: &[u8]) -> Result<Node> {
    Node::from_bytes(bytes)
}

/// Model (.dff) file parser producing the file's clump
pub struct DffParser;

impl DffParser {
    /// Parser with no state
    pub fn new() -> Self {
        Self
    }

    /// Parse all top-level chunks of an in-memory file
    pub fn parse_stream(
        &self,
        data: &[u8],
        options: &ParseOptions,
        progress: Option<&ProgressCallback>,
    ) -> Result<RwStream> {
        let total = Some(data.len() as u64);
        let report = |update: ParseProgress| {
            if let Some(callback) = progress {
                callback(update);
            }
        };

        report(ParseProgress::new(ParsePhase::ReadingHeader, 0, total));
        if data.len() >= HEADER_SIZE {
            let header = ChunkReader::new(data).read_header()?;
            options.check_version(header.version)?;
            debug!(chunk = %header.chunk_type, version = %header.version, "first chunk");
        }

        let stream = RwStream::read_with(data, options.context(), |node, end| {
            report(
                ParseProgress::new(ParsePhase::ParsingRecords, end as u64, total)
                    .with_item(node.chunk_type().name()),
            );
        })?;
        report(ParseProgress::new(ParsePhase::LinkingReferences, data.len() as u64, total));
        Ok(stream)
    }

    fn parse_bytes(
        &self,
        data: &[u8],
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Clump> {
        let clump = instrument_parse(self.name(), data.len(), || {
            self.parse_stream(data, options, progress.as_ref())?.into_clump()
        })?;
        if let Some(callback) = &progress {
            let len = data.len() as u64;
            callback(ParseProgress::new(ParsePhase::Complete, len, Some(len)));
        }
        info!(
            frames = clump.frame_list.len(),
            geometries = clump.geometry_list.len(),
            atomics = clump.atomics.len(),
            "parsed model"
        );
        Ok(clump)
    }
}

impl Default for DffParser {
    fn default() -> Self {
        Self::new()
    }
}

impl Parser for DffParser {
    type Output = Clump;

    fn extensions(&self) -> &[&str] {
        &["dff"]
    }

    fn name(&self) -> &str {
        "RenderWare Model Parser"
    }

    fn sniff(&self, header: &ChunkHeader) -> bool {
        matches!(
            header.chunk_type,
            ChunkType::Clump | ChunkType::UvAnimDictionary | ChunkType::TextureDictionary
        ) && header.version.unpacked() >= 0x30000
    }

    fn parse_with_options<R: Read + Seek>(
        &self,
        mut reader: R,
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self::Output> {
        let mut data = Vec::new();
        reader.read_to_end(&mut data)?;
        self.parse_bytes(&data, options, progress)
    }

    fn parse_memory_mapped(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self::Output> {
        let file = std::fs::File::open(path)?;
        #[allow(unsafe_code)]
        let mmap = unsafe { Mmap::map(&file)? };
        debug!(path = %path.display(), size = mmap.len(), "memory mapped model");
        self.parse_bytes(&mmap, options, progress)
    }
}

impl HumanReadable for Clump {
    fn to_readable_string(&self) -> String {
        let s = self.summary();
        format!(
            "Clump {}\n  frames: {}\n  geometries: {} ({} skinned)\n  atomics: {}\n  lights: {}, cameras: {}\n  vertices: {}, triangles: {}\n  materials: {}\n  bones: {}",
            s.version,
            s.frames,
            s.geometries,
            s.skinned_geometries,
            s.atomics,
            s.lights,
            s.cameras,
            s.vertices,
            s.triangles,
            s.materials,
            s.bones
        )
    }

    fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self.summary()).unwrap_or(serde_json::Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rwscene_core::{ChunkVersion, Error};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_dff_parser_reports_phases() {
        let bytes = Clump::new(ChunkVersion::SAN_ANDREAS).to_bytes().unwrap();
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        let callback: ProgressCallback = Box::new(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clump = DffParser::new()
            .parse_with_options(std::io::Cursor::new(bytes), &ParseOptions::default(), Some(callback))
            .unwrap();
        assert!(clump.atomics.is_empty());
        assert_eq!(seen.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_dff_parser_strict_versions() {
        let bytes = Clump::new(ChunkVersion(0x0000_0001)).to_bytes().unwrap();
        let options = ParseOptions {
            strict_versions: true,
            ..Default::default()
        };
        let err = DffParser::new()
            .parse_with_options(std::io::Cursor::new(bytes), &options, None)
            .unwrap_err();
        assert!(matches!(err, Error::UnsupportedVersion { .. }));
    }

    #[test]
    fn test_sniff_top_level_chunks() {
        let parser = DffParser::new();
        let header = |chunk_type, version| ChunkHeader {
            chunk_type,
            length: 0,
            version,
            offset: 0,
        };
        assert!(parser.sniff(&header(ChunkType::Clump, ChunkVersion::SAN_ANDREAS)));
        assert!(parser.sniff(&header(ChunkType::UvAnimDictionary, ChunkVersion::GTA3)));
        assert!(!parser.sniff(&header(ChunkType::Geometry, ChunkVersion::SAN_ANDREAS)));
        assert!(!parser.sniff(&header(ChunkType::Clump, ChunkVersion(0))));
    }

    #[test]
    fn test_human_readable_summary() {
        let clump = Clump::new(ChunkVersion::SAN_ANDREAS);
        assert!(clump.to_readable_string().contains("frames: 0"));
        assert_eq!(clump.to_json()["atomics"], 0);
    }
}
