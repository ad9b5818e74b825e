// rwscene-parsers/src/rw/node.rs
//! The node object model and chunk factory
//!
//! [`Node`] is a closed sum over every chunk type the codec understands, plus
//! an [`Node::Unknown`] arm that carries any other chunk verbatim. Containers
//! hold their children by value; lengths and counts are recomputed whenever a
//! tree is written.

use std::io::{Read, Write};

use serde::Serialize;
use tracing::trace;

use rwscene_core::{ChunkVersion, Error, Result};

use super::atomic::Atomic;
use super::chunk::{ChunkHeader, ChunkType, HEADER_SIZE};
use super::clump::{Clump, GeometryList};
use super::extension::Extension;
use super::frame::FrameList;
use super::geometry::Geometry;
use super::hanim::HAnimPlugin;
use super::material::{Material, MaterialList};
use super::reader::{ChunkReader, ParseContext};
use super::skin::SkinPlugin;
use super::split::MaterialSplitList;
use super::string::RwString;
use super::texture::{SkyMipMap, TextureNative, TextureReference};
use super::user_data::UserDataPlugin;
use super::uv_anim::UvAnimDictionary;
use super::writer::ChunkWriter;

/// A chunk type with a typed in-memory representation
pub trait Chunk: Sized {
    /// Type tag written in the chunk header
    const TYPE: ChunkType;

    /// Library version stamp written in the chunk header
    fn version(&self) -> ChunkVersion;

    /// Parse the payload of a chunk whose header has already been read
    ///
    /// The reader is bounded to the declared payload; implementations must
    /// consume exactly their own structure and nothing else.
    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self>;

    /// Serialize the payload, header excluded
    fn write_body(&self, w: &mut ChunkWriter) -> Result<()>;

    /// Read a header that must carry [`Self::TYPE`], then the payload
    fn read(r: &mut ChunkReader<'_>, ctx: ParseContext) -> Result<Self> {
        let (header, mut body) = r.enter(Self::TYPE)?;
        trace!(chunk = %Self::TYPE, offset = header.offset, length = header.length, "reading chunk");
        let value = Self::read_body(&mut body, &header, ctx.descend()?)?;
        body.finish(&header)?;
        Ok(value)
    }

    /// Write header, payload and patched length
    fn write(&self, w: &mut ChunkWriter) -> Result<()> {
        let mark = w.begin_chunk(Self::TYPE, self.version())?;
        self.write_body(w)?;
        w.end_chunk(mark)
    }
}

/// Struct chunk found outside a container that interprets it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StructChunk {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Raw payload
    pub data: Vec<u8>,
}

impl Chunk for StructChunk {
    const TYPE: ChunkType = ChunkType::Struct;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, _ctx: ParseContext) -> Result<Self> {
        Ok(Self {
            version: header.version,
            data: r.read_rest().to_vec(),
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_bytes(&self.data)
    }
}

/// Chunk of a type the codec does not interpret, preserved byte for byte
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UnknownChunk {
    /// Raw type tag
    pub tag: u32,
    /// Library version stamp
    pub version: ChunkVersion,
    /// Raw payload
    pub data: Vec<u8>,
}

impl UnknownChunk {
    fn write(&self, w: &mut ChunkWriter) -> Result<()> {
        let mark = w.begin_chunk(ChunkType::from_u32(self.tag), self.version)?;
        w.write_bytes(&self.data)?;
        w.end_chunk(mark)
    }
}

/// Any chunk in a RenderWare binary stream
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "chunk")]
pub enum Node {
    Struct(StructChunk),
    String(RwString),
    Extension(Extension),
    Texture(TextureReference),
    Material(Material),
    MaterialList(MaterialList),
    FrameList(FrameList),
    Geometry(Geometry),
    Atomic(Atomic),
    TextureNative(TextureNative),
    GeometryList(GeometryList),
    Clump(Clump),
    Skin(SkinPlugin),
    MaterialSplit(MaterialSplitList),
    SkyMipMap(SkyMipMap),
    UserData(UserDataPlugin),
    UvAnimDictionary(UvAnimDictionary),
    HAnim(HAnimPlugin),
    Unknown(UnknownChunk),
}

impl Node {
    /// Type tag of this node
    pub fn chunk_type(&self) -> ChunkType {
        match self {
            Node::Struct(_) => StructChunk::TYPE,
            Node::String(_) => RwString::TYPE,
            Node::Extension(_) => Extension::TYPE,
            Node::Texture(_) => TextureReference::TYPE,
            Node::Material(_) => Material::TYPE,
            Node::MaterialList(_) => MaterialList::TYPE,
            Node::FrameList(_) => FrameList::TYPE,
            Node::Geometry(_) => Geometry::TYPE,
            Node::Atomic(_) => Atomic::TYPE,
            Node::TextureNative(_) => TextureNative::TYPE,
            Node::GeometryList(_) => GeometryList::TYPE,
            Node::Clump(_) => Clump::TYPE,
            Node::Skin(_) => SkinPlugin::TYPE,
            Node::MaterialSplit(_) => MaterialSplitList::TYPE,
            Node::SkyMipMap(_) => SkyMipMap::TYPE,
            Node::UserData(_) => UserDataPlugin::TYPE,
            Node::UvAnimDictionary(_) => UvAnimDictionary::TYPE,
            Node::HAnim(_) => HAnimPlugin::TYPE,
            Node::Unknown(u) => ChunkType::from_u32(u.tag),
        }
    }

    /// Library version stamp of this node
    pub fn version(&self) -> ChunkVersion {
        match self {
            Node::Struct(n) => n.version,
            Node::String(n) => n.version,
            Node::Extension(n) => n.version,
            Node::Texture(n) => n.version,
            Node::Material(n) => n.version,
            Node::MaterialList(n) => n.version,
            Node::FrameList(n) => n.version,
            Node::Geometry(n) => n.version,
            Node::Atomic(n) => n.version,
            Node::TextureNative(n) => n.version,
            Node::GeometryList(n) => n.version,
            Node::Clump(n) => n.version,
            Node::Skin(n) => n.version,
            Node::MaterialSplit(n) => n.version,
            Node::SkyMipMap(n) => n.version,
            Node::UserData(n) => n.version,
            Node::UvAnimDictionary(n) => n.version,
            Node::HAnim(n) => n.version,
            Node::Unknown(n) => n.version,
        }
    }

    /// Whether the chunk type is not modelled
    pub fn is_unknown(&self) -> bool {
        matches!(self, Node::Unknown(_))
    }

    /// Read one complete node (header and payload) from `r`
    pub fn read(r: &mut ChunkReader<'_>, ctx: ParseContext) -> Result<Self> {
        let header = r.read_header()?;
        let mut body = r.body(&header)?;
        trace!(chunk = %header.chunk_type, offset = header.offset, length = header.length, "reading node");
        let node = Self::read_body(&mut body, &header, ctx.descend()?)?;
        body.finish(&header)?;
        Ok(node)
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let node = match header.chunk_type {
            ChunkType::Struct => Node::Struct(StructChunk::read_body(r, header, ctx)?),
            ChunkType::String => Node::String(RwString::read_body(r, header, ctx)?),
            ChunkType::Extension => Node::Extension(Extension::read_body(r, header, ctx)?),
            ChunkType::Texture => Node::Texture(TextureReference::read_body(r, header, ctx)?),
            ChunkType::Material => Node::Material(Material::read_body(r, header, ctx)?),
            ChunkType::MaterialList => Node::MaterialList(MaterialList::read_body(r, header, ctx)?),
            ChunkType::FrameList => Node::FrameList(FrameList::read_body(r, header, ctx)?),
            ChunkType::Geometry => Node::Geometry(Geometry::read_body(r, header, ctx)?),
            ChunkType::Atomic => Node::Atomic(Atomic::read_body(r, header, ctx)?),
            ChunkType::TextureNative => Node::TextureNative(TextureNative::read_body(r, header, ctx)?),
            ChunkType::GeometryList => Node::GeometryList(GeometryList::read_body(r, header, ctx)?),
            ChunkType::Clump => Node::Clump(Clump::read_body(r, header, ctx)?),
            ChunkType::Skin => Node::Skin(SkinPlugin::read_body(r, header, ctx)?),
            ChunkType::BinMesh => Node::MaterialSplit(MaterialSplitList::read_body(r, header, ctx)?),
            ChunkType::SkyMipMap => Node::SkyMipMap(SkyMipMap::read_body(r, header, ctx)?),
            ChunkType::UserData => Node::UserData(UserDataPlugin::read_body(r, header, ctx)?),
            ChunkType::UvAnimDictionary => {
                Node::UvAnimDictionary(UvAnimDictionary::read_body(r, header, ctx)?)
            }
            ChunkType::HAnim => Node::HAnim(HAnimPlugin::read_body(r, header, ctx)?),
            other => {
                trace!(chunk = %other, length = header.length, "preserving uninterpreted chunk");
                Node::Unknown(UnknownChunk {
                    tag: other.to_u32(),
                    version: header.version,
                    data: r.read_rest().to_vec(),
                })
            }
        };
        Ok(node)
    }

    /// Write this node, header included
    pub fn write(&self, w: &mut ChunkWriter) -> Result<()> {
        match self {
            Node::Struct(n) => n.write(w),
            Node::String(n) => n.write(w),
            Node::Extension(n) => n.write(w),
            Node::Texture(n) => n.write(w),
            Node::Material(n) => n.write(w),
            Node::MaterialList(n) => n.write(w),
            Node::FrameList(n) => n.write(w),
            Node::Geometry(n) => n.write(w),
            Node::Atomic(n) => n.write(w),
            Node::TextureNative(n) => n.write(w),
            Node::GeometryList(n) => n.write(w),
            Node::Clump(n) => n.write(w),
            Node::Skin(n) => n.write(w),
            Node::MaterialSplit(n) => n.write(w),
            Node::SkyMipMap(n) => n.write(w),
            Node::UserData(n) => n.write(w),
            Node::UvAnimDictionary(n) => n.write(w),
            Node::HAnim(n) => n.write(w),
            Node::Unknown(n) => n.write(w),
        }
    }

    /// Parse the node at the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut ChunkReader::new(bytes), ParseContext::default())
    }

    /// Serialize this node to a fresh buffer
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ChunkWriter::new();
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Read exactly one node from a stream, leaving it just past the node
    pub fn read_from<R: Read>(reader: &mut R, ctx: ParseContext) -> Result<Self> {
        let mut header_bytes = [0u8; HEADER_SIZE];
        reader.read_exact(&mut header_bytes)?;
        let header = ChunkHeader::from_bytes(&header_bytes, 0);

        let mut buffer = Vec::with_capacity(HEADER_SIZE + header.length as usize);
        buffer.extend_from_slice(&header_bytes);
        let read = reader
            .take(u64::from(header.length))
            .read_to_end(&mut buffer)?;
        if read < header.length as usize {
            return Err(Error::Truncated {
                offset: HEADER_SIZE as u64 + read as u64,
                expected: u64::from(header.length),
                available: read as u64,
            });
        }
        Self::read(&mut ChunkReader::new(&buffer), ctx)
    }

    /// Write this node to a stream
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }
}

/// Typed access to the payload of a [`Node`]
pub trait FromNode: Sized {
    /// Borrow the payload if `node` is of this type
    fn from_node(node: &Node) -> Option<&Self>;

    /// Mutably borrow the payload if `node` is of this type
    fn from_node_mut(node: &mut Node) -> Option<&mut Self>;
}

macro_rules! node_variants {
    ($($variant:ident => $ty:ty),* $(,)?) => {
        $(
            impl FromNode for $ty {
                fn from_node(node: &Node) -> Option<&Self> {
                    match node {
                        Node::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }

                fn from_node_mut(node: &mut Node) -> Option<&mut Self> {
                    match node {
                        Node::$variant(inner) => Some(inner),
                        _ => None,
                    }
                }
            }

            impl From<$ty> for Node {
                fn from(inner: $ty) -> Self {
                    Node::$variant(inner)
                }
            }
        )*
    };
}

node_variants! {
    Struct => StructChunk,
    String => RwString,
    Extension => Extension,
    Texture => TextureReference,
    Material => Material,
    MaterialList => MaterialList,
    FrameList => FrameList,
    Geometry => Geometry,
    Atomic => Atomic,
    TextureNative => TextureNative,
    GeometryList => GeometryList,
    Clump => Clump,
    Skin => SkinPlugin,
    MaterialSplit => MaterialSplitList,
    SkyMipMap => SkyMipMap,
    UserData => UserDataPlugin,
    UvAnimDictionary => UvAnimDictionary,
    HAnim => HAnimPlugin,
    Unknown => UnknownChunk,
}
