// rwscene-parsers/src/rw/stream.rs
//! Sequence of top-level chunks making up a file
//!
//! Model files usually hold a single clump, optionally preceded by a UV
//! animation dictionary. Some exporters pad the end of the file with zeros,
//! which is kept so the file can be rewritten byte for byte.

use serde::Serialize;
use tracing::debug;

use rwscene_core::{Error, Result};

use super::chunk::HEADER_SIZE;
use super::clump::Clump;
use super::node::{FromNode, Node};
use super::reader::{ChunkReader, ParseContext};
use super::writer::ChunkWriter;

/// Whole binary stream: top-level chunks in file order
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RwStream {
    /// Top-level chunks
    pub chunks: Vec<Node>,
    /// Padding after the last chunk
    #[serde(skip)]
    pub trailing: Vec<u8>,
}

impl RwStream {
    /// Parse every top-level chunk in `data`
    pub fn from_bytes(data: &[u8], ctx: ParseContext) -> Result<Self> {
        Self::read_with(data, ctx, |_, _| {})
    }

    /// Parse every top-level chunk, calling `on_chunk` with each node and
    /// the offset just past it
    pub fn read_with<F>(data: &[u8], ctx: ParseContext, mut on_chunk: F) -> Result<Self>
    where
        F: FnMut(&Node, usize),
    {
        let mut r = ChunkReader::new(data);
        let mut chunks = Vec::new();
        loop {
            let rest = &data[r.position()..];
            if rest.len() < HEADER_SIZE || rest.iter().all(|&b| b == 0) {
                break;
            }
            let node = Node::read(&mut r, ctx)?;
            on_chunk(&node, r.position());
            chunks.push(node);
        }
        let trailing = r.read_rest().to_vec();
        debug!(chunks = chunks.len(), trailing = trailing.len(), "parsed chunk stream");
        Ok(Self { chunks, trailing })
    }

    /// Serialize every chunk followed by the trailing bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ChunkWriter::new();
        for chunk in &self.chunks {
            chunk.write(&mut w)?;
        }
        w.write_bytes(&self.trailing)?;
        Ok(w.into_bytes())
    }

    /// First clump in the stream
    pub fn clump(&self) -> Option<&Clump> {
        self.chunks.iter().find_map(Clump::from_node)
    }

    /// Mutable first clump
    pub fn clump_mut(&mut self) -> Option<&mut Clump> {
        self.chunks.iter_mut().find_map(Clump::from_node_mut)
    }

    /// Every clump in the stream
    pub fn clumps_mut(&mut self) -> impl Iterator<Item = &mut Clump> {
        self.chunks.iter_mut().filter_map(Clump::from_node_mut)
    }

    /// Take the first clump out of the stream
    pub fn into_clump(self) -> Result<Clump> {
        self.chunks
            .into_iter()
            .find_map(|node| match node {
                Node::Clump(clump) => Some(clump),
                _ => None,
            })
            .ok_or_else(|| Error::missing_field("Clump"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rw::node::Chunk;
    use crate::rw::uv_anim::UvAnimDictionary;
    use rwscene_core::ChunkVersion;

    #[test]
    fn test_stream_with_dictionary_and_padding() {
        let mut w = ChunkWriter::new();
        UvAnimDictionary::new(ChunkVersion::SAN_ANDREAS).write(&mut w).unwrap();
        Clump::new(ChunkVersion::SAN_ANDREAS).write(&mut w).unwrap();
        w.write_zeros(16).unwrap();
        let bytes = w.into_bytes();

        let stream = RwStream::from_bytes(&bytes, ParseContext::default()).unwrap();
        assert_eq!(stream.chunks.len(), 2);
        assert_eq!(stream.trailing.len(), 16);
        assert!(stream.clump().is_some());
        assert_eq!(stream.to_bytes().unwrap(), bytes);
        assert!(stream.into_clump().is_ok());
    }

    #[test]
    fn test_read_with_reports_chunk_ends() {
        let mut w = ChunkWriter::new();
        UvAnimDictionary::new(ChunkVersion::SAN_ANDREAS).write(&mut w).unwrap();
        let first_end = w.len();
        Clump::new(ChunkVersion::SAN_ANDREAS).write(&mut w).unwrap();
        let bytes = w.into_bytes();

        let mut seen = Vec::new();
        RwStream::read_with(&bytes, ParseContext::default(), |node, end| {
            seen.push((node.chunk_type().name(), end));
        })
        .unwrap();
        assert_eq!(seen, vec![("UVAnimDictionary", first_end), ("Clump", bytes.len())]);
    }

    #[test]
    fn test_stream_without_clump() {
        let stream = RwStream::from_bytes(&[], ParseContext::default()).unwrap();
        assert!(matches!(stream.into_clump(), Err(Error::MissingField { .. })));
    }
}
