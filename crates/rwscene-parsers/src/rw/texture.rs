// rwscene-parsers/src/rw/texture.rs
//! Texture reference, native texture and sky mipmap chunks
//!
//! Pixel data of native textures is kept opaque. Converting between stored
//! levels and RGBA is the job of a [`RasterCodec`] supplied by the caller.

use std::borrow::Cow;

use serde::Serialize;

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::extension::Extension;
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::string::RwString;
use super::writer::{narrow, ChunkWriter};

// ==================== Texture Reference ====================

/// Texture filter/addressing record naming a texture by string
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureReference {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Filter mode
    pub filter: u8,
    /// U addressing in the low nibble, V addressing in the high nibble
    pub addressing: u8,
    /// Bit 0 set when the texture has mip levels
    pub flags: u16,
    /// Texture name
    pub name: RwString,
    /// Alpha mask name, often empty
    pub mask: RwString,
    /// Texture plugins such as the sky mipmap value
    pub extension: Extension,
}

impl TextureReference {
    /// Reference with the usual linear, wrapped, mipmapped settings
    pub fn new(name: &str, mask: &str, version: ChunkVersion) -> Self {
        Self {
            version,
            filter: 0x06,
            addressing: 0x11,
            flags: 1,
            name: RwString::new(name, version),
            mask: RwString::new(mask, version),
            extension: Extension::new(version),
        }
    }

    /// U addressing mode
    pub fn address_u(&self) -> u8 {
        self.addressing & 0x0F
    }

    /// V addressing mode
    pub fn address_v(&self) -> u8 {
        self.addressing >> 4
    }

    /// Whether bit 0 of `flags` is set
    pub fn has_mip_levels(&self) -> bool {
        self.flags & 1 != 0
    }
}

impl Chunk for TextureReference {
    const TYPE: ChunkType = ChunkType::Texture;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let filter = s.read_u8()?;
        let addressing = s.read_u8()?;
        let flags = s.read_u16()?;
        s.finish(&struct_header)?;

        Ok(Self {
            version: header.version,
            filter,
            addressing,
            flags,
            name: RwString::read(r, ctx)?,
            mask: RwString::read(r, ctx)?,
            extension: Extension::read(r, ctx)?,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| {
            w.write_u8(self.filter)?;
            w.write_u8(self.addressing)?;
            w.write_u16(self.flags)
        })?;
        self.name.write(w)?;
        self.mask.write(w)?;
        self.extension.write(w)
    }
}

// ==================== Sky Mipmap ====================

/// Mipmap K value (fixed point) from the texture extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SkyMipMap {
    /// Library version stamp
    pub version: ChunkVersion,
    /// K value as stored
    pub k_value: u32,
}

impl Chunk for SkyMipMap {
    const TYPE: ChunkType = ChunkType::SkyMipMap;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, _ctx: ParseContext) -> Result<Self> {
        Ok(Self {
            version: header.version,
            k_value: r.read_u32()?,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_u32(self.k_value)
    }
}

// ==================== Native Texture ====================

/// Raster format bits
pub mod raster {
    /// Bits holding the pixel format
    pub const PIXEL_FORMAT_MASK: u32 = 0x0F00;
    /// 16-bit, one alpha bit
    pub const FORMAT_1555: u32 = 0x0100;
    /// 16-bit, no alpha
    pub const FORMAT_565: u32 = 0x0200;
    /// 16-bit, four alpha bits
    pub const FORMAT_4444: u32 = 0x0300;
    /// 8-bit luminance
    pub const FORMAT_LUM8: u32 = 0x0400;
    /// 32-bit BGRA
    pub const FORMAT_8888: u32 = 0x0500;
    /// 32-bit BGRX
    pub const FORMAT_888: u32 = 0x0600;
    /// 16-bit, no alpha, top bit unused
    pub const FORMAT_555: u32 = 0x0A00;
    /// Mip levels are generated on load
    pub const AUTO_MIPMAP: u32 = 0x1000;
    /// 256-entry palette
    pub const PAL8: u32 = 0x2000;
    /// 16-entry palette
    pub const PAL4: u32 = 0x4000;
    /// Mip levels are stored
    pub const MIPMAP: u32 = 0x8000;
}

/// Width of the name and mask fields
const NAME_FIELD_SIZE: usize = 32;

/// Fixed 32-byte name field of a native texture, kept byte for byte
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterName([u8; NAME_FIELD_SIZE]);

impl RasterName {
    /// Name from text; at most 31 bytes so the terminator fits
    pub fn new(text: impl AsRef<[u8]>) -> Result<Self> {
        let text = text.as_ref();
        if text.len() >= NAME_FIELD_SIZE {
            return Err(Error::out_of_range("texture name length", text.len()));
        }
        let mut field = [0u8; NAME_FIELD_SIZE];
        field[..text.len()].copy_from_slice(text);
        Ok(Self(field))
    }

    /// Bytes before the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(NAME_FIELD_SIZE);
        &self.0[..end]
    }

    /// Text for display; invalid UTF-8 is replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// The whole field, padding included
    pub fn raw(&self) -> &[u8; NAME_FIELD_SIZE] {
        &self.0
    }
}

impl Default for RasterName {
    fn default() -> Self {
        Self([0; NAME_FIELD_SIZE])
    }
}

impl Serialize for RasterName {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}

/// Everything a codec needs to interpret one stored level
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RasterDescriptor {
    /// Raster format bits, see [`raster`]
    pub raster_format: u32,
    /// Direct3D format code, zero when unused
    pub d3d_format: u32,
    /// Level width in pixels
    pub width: u32,
    /// Level height in pixels
    pub height: u32,
    /// Bits per pixel
    pub depth: u8,
    /// Mip level, 0 is the full size image
    pub level: usize,
}

impl RasterDescriptor {
    /// Pixel format bits only
    pub fn pixel_format(&self) -> u32 {
        self.raster_format & raster::PIXEL_FORMAT_MASK
    }

    /// Whether a palette precedes the levels
    pub fn is_palettized(&self) -> bool {
        self.raster_format & (raster::PAL8 | raster::PAL4) != 0
    }
}

/// Converts between stored raster levels and RGBA8 pixels
pub trait RasterCodec {
    /// Decode one level to tightly packed RGBA8
    fn decode(&self, descriptor: &RasterDescriptor, pixels: &[u8], palette: &[u8]) -> Result<Vec<u8>>;

    /// Encode RGBA8 pixels, returning level bytes and the palette to store
    fn encode(&self, descriptor: &RasterDescriptor, rgba: &[u8]) -> Result<(Vec<u8>, Vec<u8>)>;
}

/// Platform texture stored inside a texture dictionary (PC layout)
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextureNative {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Platform id, 8 or 9 for Direct3D
    pub platform: u32,
    /// Filter mode
    pub filter: u8,
    /// U addressing in the low nibble, V in the high nibble
    pub addressing: u8,
    /// Texture name
    pub name: RasterName,
    /// Alpha mask name
    pub mask: RasterName,
    /// Raster format bits, see [`raster`]
    pub raster_format: u32,
    /// Direct3D format code
    pub d3d_format: u32,
    /// Width of level 0
    pub width: u16,
    /// Height of level 0
    pub height: u16,
    /// Bits per pixel
    pub depth: u8,
    /// Raster type, 4 for textures
    pub raster_type: u8,
    /// Compression and alpha bits
    pub flags: u8,
    /// Raw palette bytes, sized by the palette bits of `raster_format`
    #[serde(skip)]
    pub palette: Vec<u8>,
    /// Stored mip levels
    #[serde(skip)]
    pub levels: Vec<Vec<u8>>,
    /// Texture plugins
    pub extension: Extension,
}

impl TextureNative {
    /// Palette size implied by a raster format
    pub fn palette_size(raster_format: u32) -> usize {
        if raster_format & raster::PAL8 != 0 {
            256 * 4
        } else if raster_format & raster::PAL4 != 0 {
            32 * 4
        } else {
            0
        }
    }

    /// Number of stored levels
    pub fn level_count(&self) -> usize {
        self.levels.len()
    }

    /// Descriptor of mip level `level`
    pub fn descriptor(&self, level: usize) -> RasterDescriptor {
        let shift = level.min(31) as u32;
        RasterDescriptor {
            raster_format: self.raster_format,
            d3d_format: self.d3d_format,
            width: (u32::from(self.width) >> shift).max(1),
            height: (u32::from(self.height) >> shift).max(1),
            depth: self.depth,
            level,
        }
    }

    /// Decode a stored level with `codec`
    pub fn decode_with<C: RasterCodec + ?Sized>(&self, codec: &C, level: usize) -> Result<Vec<u8>> {
        let pixels = self.levels.get(level).ok_or(Error::UnresolvedIndex {
            space: "mip level",
            index: level as i64,
        })?;
        codec.decode(&self.descriptor(level), pixels, &self.palette)
    }

    /// Encode `rgba` with `codec` and store it as level `level`
    pub fn replace_level<C: RasterCodec + ?Sized>(&mut self, codec: &C, level: usize, rgba: &[u8]) -> Result<()> {
        if level > self.levels.len() {
            return Err(Error::UnresolvedIndex {
                space: "mip level",
                index: level as i64,
            });
        }
        let (pixels, palette) = codec.encode(&self.descriptor(level), rgba)?;
        let expected = Self::palette_size(self.raster_format);
        if palette.len() != expected {
            return Err(Error::invalid_data(format!(
                "codec produced a {} byte palette, raster format needs {expected}",
                palette.len()
            )));
        }
        self.palette = palette;
        if level == self.levels.len() {
            self.levels.push(pixels);
        } else {
            self.levels[level] = pixels;
        }
        Ok(())
    }
}

impl Chunk for TextureNative {
    const TYPE: ChunkType = ChunkType::TextureNative;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let platform = s.read_u32()?;
        let filter = s.read_u8()?;
        let addressing = s.read_u8()?;
        let _pad = s.read_u16()?;
        let name = RasterName(s.read_array::<NAME_FIELD_SIZE>()?);
        let mask = RasterName(s.read_array::<NAME_FIELD_SIZE>()?);
        let raster_format = s.read_u32()?;
        let d3d_format = s.read_u32()?;
        let width = s.read_u16()?;
        let height = s.read_u16()?;
        let depth = s.read_u8()?;
        let level_count = s.read_u8()?;
        let raster_type = s.read_u8()?;
        let flags = s.read_u8()?;

        let palette = s.read_bytes(Self::palette_size(raster_format))?.to_vec();
        let mut levels = Vec::with_capacity(usize::from(level_count));
        for _ in 0..level_count {
            let size = s.read_u32()? as usize;
            levels.push(s.read_bytes(size)?.to_vec());
        }
        s.finish(&struct_header)?;

        Ok(Self {
            version: header.version,
            platform,
            filter,
            addressing,
            name,
            mask,
            raster_format,
            d3d_format,
            width,
            height,
            depth,
            raster_type,
            flags,
            palette,
            levels,
            extension: Extension::read(r, ctx)?,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        let expected = Self::palette_size(self.raster_format);
        if self.palette.len() != expected {
            return Err(Error::invalid_data(format!(
                "texture '{}' has a {} byte palette, raster format needs {expected}",
                self.name.text(),
                self.palette.len()
            )));
        }
        let level_count: u8 = narrow("mip level count", self.levels.len())?;

        w.write_struct(self.version, |w| {
            w.write_u32(self.platform)?;
            w.write_u8(self.filter)?;
            w.write_u8(self.addressing)?;
            w.write_u16(0)?;
            w.write_bytes(self.name.raw())?;
            w.write_bytes(self.mask.raw())?;
            w.write_u32(self.raster_format)?;
            w.write_u32(self.d3d_format)?;
            w.write_u16(self.width)?;
            w.write_u16(self.height)?;
            w.write_u8(self.depth)?;
            w.write_u8(level_count)?;
            w.write_u8(self.raster_type)?;
            w.write_u8(self.flags)?;
            w.write_bytes(&self.palette)?;
            for level in &self.levels {
                let size: u32 = narrow("mip level size", level.len())?;
                w.write_u32(size)?;
                w.write_bytes(level)?;
            }
            Ok(())
        })?;
        self.extension.write(w)
    }
}
