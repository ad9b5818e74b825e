// rwscene-parsers/src/rw/chunk.rs
//! Chunk type tags and the 12-byte chunk header

use serde::{Deserialize, Serialize};

use rwscene_core::ChunkVersion;

/// Size of a chunk header on disk
pub const HEADER_SIZE: usize = 12;

/// Chunk types found in RenderWare binary streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkType {
    /// Plain data block owned by the enclosing chunk
    Struct,
    /// NUL-terminated, 4-byte padded string
    String,
    /// Plugin container
    Extension,
    /// Camera
    Camera,
    /// Texture reference
    Texture,
    /// Material
    Material,
    /// Material list
    MaterialList,
    /// Frame list
    FrameList,
    /// Geometry
    Geometry,
    /// Clump
    Clump,
    /// Light
    Light,
    /// Atomic
    Atomic,
    /// Platform texture
    TextureNative,
    /// Texture dictionary
    TextureDictionary,
    /// Geometry list
    GeometryList,
    /// Animation
    Animation,
    /// UV animation dictionary
    UvAnimDictionary,
    /// Sky mipmap K value
    SkyMipMap,
    /// Skin plugin
    Skin,
    /// Hierarchy animation plugin
    HAnim,
    /// User data plugin
    UserData,
    /// Material split (bin mesh) plugin
    BinMesh,
    /// Frame name plugin
    NodeName,
    /// Unknown chunk type
    Unknown(u32),
}

impl ChunkType {
    /// Convert from raw u32 chunk type ID
    pub fn from_u32(value: u32) -> Self {
        match value {
            0x0001 => ChunkType::Struct,
            0x0002 => ChunkType::String,
            0x0003 => ChunkType::Extension,
            0x0005 => ChunkType::Camera,
            0x0006 => ChunkType::Texture,
            0x0007 => ChunkType::Material,
            0x0008 => ChunkType::MaterialList,
            0x000E => ChunkType::FrameList,
            0x000F => ChunkType::Geometry,
            0x0010 => ChunkType::Clump,
            0x0012 => ChunkType::Light,
            0x0014 => ChunkType::Atomic,
            0x0015 => ChunkType::TextureNative,
            0x0016 => ChunkType::TextureDictionary,
            0x001A => ChunkType::GeometryList,
            0x001B => ChunkType::Animation,
            0x002B => ChunkType::UvAnimDictionary,
            0x0110 => ChunkType::SkyMipMap,
            0x0116 => ChunkType::Skin,
            0x011E => ChunkType::HAnim,
            0x011F => ChunkType::UserData,
            0x050E => ChunkType::BinMesh,
            0x0253_F2FE => ChunkType::NodeName,
            other => ChunkType::Unknown(other),
        }
    }

    /// Convert to raw u32 chunk type ID
    pub fn to_u32(&self) -> u32 {
        match self {
            ChunkType::Struct => 0x0001,
            ChunkType::String => 0x0002,
            ChunkType::Extension => 0x0003,
            ChunkType::Camera => 0x0005,
            ChunkType::Texture => 0x0006,
            ChunkType::Material => 0x0007,
            ChunkType::MaterialList => 0x0008,
            ChunkType::FrameList => 0x000E,
            ChunkType::Geometry => 0x000F,
            ChunkType::Clump => 0x0010,
            ChunkType::Light => 0x0012,
            ChunkType::Atomic => 0x0014,
            ChunkType::TextureNative => 0x0015,
            ChunkType::TextureDictionary => 0x0016,
            ChunkType::GeometryList => 0x001A,
            ChunkType::Animation => 0x001B,
            ChunkType::UvAnimDictionary => 0x002B,
            ChunkType::SkyMipMap => 0x0110,
            ChunkType::Skin => 0x0116,
            ChunkType::HAnim => 0x011E,
            ChunkType::UserData => 0x011F,
            ChunkType::BinMesh => 0x050E,
            ChunkType::NodeName => 0x0253_F2FE,
            ChunkType::Unknown(v) => *v,
        }
    }

    /// Human-readable name, used in error messages and tree dumps
    pub fn name(&self) -> &'static str {
        match self {
            ChunkType::Struct => "Struct",
            ChunkType::String => "String",
            ChunkType::Extension => "Extension",
            ChunkType::Camera => "Camera",
            ChunkType::Texture => "Texture",
            ChunkType::Material => "Material",
            ChunkType::MaterialList => "MaterialList",
            ChunkType::FrameList => "FrameList",
            ChunkType::Geometry => "Geometry",
            ChunkType::Clump => "Clump",
            ChunkType::Light => "Light",
            ChunkType::Atomic => "Atomic",
            ChunkType::TextureNative => "TextureNative",
            ChunkType::TextureDictionary => "TextureDictionary",
            ChunkType::GeometryList => "GeometryList",
            ChunkType::Animation => "Animation",
            ChunkType::UvAnimDictionary => "UVAnimDictionary",
            ChunkType::SkyMipMap => "SkyMipMap",
            ChunkType::Skin => "Skin",
            ChunkType::HAnim => "HAnim",
            ChunkType::UserData => "UserData",
            ChunkType::BinMesh => "BinMesh",
            ChunkType::NodeName => "NodeName",
            ChunkType::Unknown(_) => "Unknown",
        }
    }

    /// Check if chunks of this type are plugin data found inside extensions
    pub fn is_plugin(&self) -> bool {
        matches!(
            self,
            ChunkType::SkyMipMap
                | ChunkType::Skin
                | ChunkType::HAnim
                | ChunkType::UserData
                | ChunkType::BinMesh
                | ChunkType::NodeName
        )
    }
}

impl std::fmt::Display for ChunkType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ChunkType::Unknown(tag) => write!(f, "Unknown(0x{tag:X})"),
            other => f.write_str(other.name()),
        }
    }
}

/// Chunk header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    /// Chunk type
    pub chunk_type: ChunkType,
    /// Payload length in bytes, header excluded
    pub length: u32,
    /// Library version stamp
    pub version: ChunkVersion,
    /// Absolute offset of the header in the source buffer
    pub offset: u64,
}

impl ChunkHeader {
    /// Absolute offset of the first payload byte
    pub fn body_offset(&self) -> u64 {
        self.offset + HEADER_SIZE as u64
    }

    /// Decode a header from its 12 raw bytes
    pub fn from_bytes(bytes: &[u8; HEADER_SIZE], offset: u64) -> Self {
        use byteorder::{ByteOrder, LittleEndian};

        Self {
            chunk_type: ChunkType::from_u32(LittleEndian::read_u32(&bytes[0..4])),
            length: LittleEndian::read_u32(&bytes[4..8]),
            version: ChunkVersion(LittleEndian::read_u32(&bytes[8..12])),
            offset,
        }
    }
}
