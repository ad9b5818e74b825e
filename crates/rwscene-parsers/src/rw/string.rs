// rwscene-parsers/src/rw/string.rs
//! String chunk

use std::borrow::Cow;

use serde::ser::{Serialize, SerializeStruct, Serializer};

use rwscene_core::{ChunkVersion, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::writer::ChunkWriter;

/// NUL-terminated string padded to a 4-byte boundary
///
/// The payload is kept byte for byte. Names in older assets are often
/// Latin-1 or Shift-JIS, so text is only decoded for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RwString {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Payload as stored: text, terminator, padding
    pub payload: Vec<u8>,
}

impl RwString {
    /// Create a string with the minimal padded payload
    pub fn new(text: impl AsRef<[u8]>, version: ChunkVersion) -> Self {
        Self {
            version,
            payload: Self::padded(text.as_ref(), 0),
        }
    }

    fn padded(text: &[u8], min_len: usize) -> Vec<u8> {
        let len = ((text.len() + 1 + 3) & !3).max(min_len);
        let mut payload = vec![0u8; len];
        payload[..text.len()].copy_from_slice(text);
        payload
    }

    /// Bytes before the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let end = self
            .payload
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(self.payload.len());
        &self.payload[..end]
    }

    /// Text for display; invalid UTF-8 is replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }

    /// Stored payload size
    pub fn capacity(&self) -> usize {
        self.payload.len()
    }

    /// Replace the text, keeping the stored payload size when it still fits
    pub fn set(&mut self, text: impl AsRef<[u8]>) {
        self.payload = Self::padded(text.as_ref(), self.payload.len());
    }
}

impl Serialize for RwString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("RwString", 3)?;
        s.serialize_field("version", &self.version)?;
        s.serialize_field("text", &self.text())?;
        s.serialize_field("capacity", &self.capacity())?;
        s.end()
    }
}

impl Chunk for RwString {
    const TYPE: ChunkType = ChunkType::String;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, _ctx: ParseContext) -> Result<Self> {
        Ok(Self {
            version: header.version,
            payload: r.read_rest().to_vec(),
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_bytes(&self.payload)
    }
}
