//! rwscene-parsers
//!
//! Reader and writer for RenderWare binary stream scene graphs, the chunked
//! format used by model (`.dff`) files.
//!
//! # Supported Chunks
//!
//! | Chunk | Tag | Description |
//! |-------|-----|-------------|
//! | Clump | `0x10` | Model root: frames, geometries, atomics |
//! | FrameList | `0x0E` | Transform hierarchy |
//! | Geometry | `0x0F` | Vertices, triangles, morph targets |
//! | Material | `0x07` | Surface color and texture reference |
//! | Skin | `0x116` | Bone weights and inverse bind matrices |
//! | HAnim | `0x11E` | Animation hierarchy node table |
//! | BinMesh | `0x50E` | Per-material index runs |
//! | TextureNative | `0x15` | Platform raster (pixels kept opaque) |
//!
//! Any other chunk is preserved verbatim.
//!
//! # Example
//!
//! ```rust,ignore
//! use rwscene_parsers::{DffParser, Parser};
//!
//! let parser = DffParser::new();
//! let clump = parser.parse_file("player.dff".as_ref())?;
//!
//! println!("Found {} atomics", clump.atomics.len());
//! ```

pub mod logging;
pub mod rw;
pub mod traits;

// Re-export main types
pub use traits::{HumanReadable, ParseOptions, ParsePhase, ParseProgress, Parser, ProgressCallback};

pub use rw::{
    outline, parse_node, Atomic, Chunk, ChunkHeader, ChunkReader, ChunkType, ChunkWriter, Clump,
    ClumpSummary, DffParser, Extension, Frame, FrameList, FromNode, Geometry, GeometryList,
    HAnimNode, HAnimPlugin, Material, MaterialList, MaterialSplitList, Node, OutlineNode,
    ParseContext, RwStream, SkinPlugin, SplitEncoding, Triangle, UnknownChunk, VertexInfluences,
};

pub use rwscene_core::{ChunkVersion, Error, Result};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
