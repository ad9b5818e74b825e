// rwscene-parsers/src/rw/extension.rs
//! Extension chunk: an ordered list of plugin chunks
//!
//! Termination is purely length based: children are read until the reader
//! reaches the end of the Extension payload. A zero-length Extension is an
//! empty list.

use serde::Serialize;

use rwscene_core::{ChunkVersion, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::node::{Chunk, FromNode, Node};
use super::reader::{ChunkReader, ParseContext};
use super::writer::ChunkWriter;

/// Ordered, heterogeneous list of plugin chunks
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct Extension {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Children in stream order
    pub children: Vec<Node>,
}

impl Extension {
    /// Empty extension
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            children: Vec::new(),
        }
    }

    /// Number of plugin chunks
    pub fn len(&self) -> usize {
        self.children.len()
    }

    /// Whether there are no plugin chunks
    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Plugin chunks in stored order
    pub fn iter(&self) -> std::slice::Iter<'_, Node> {
        self.children.iter()
    }

    /// Append a plugin chunk
    pub fn push(&mut self, node: impl Into<Node>) {
        self.children.push(node.into());
    }

    /// First child of the given type
    pub fn first_of(&self, chunk_type: ChunkType) -> Option<&Node> {
        self.children.iter().find(|n| n.chunk_type() == chunk_type)
    }

    /// All children of the given type, in order
    pub fn all_of(&self, chunk_type: ChunkType) -> impl Iterator<Item = &Node> {
        self.children.iter().filter(move |n| n.chunk_type() == chunk_type)
    }

    /// First child with a typed payload of `T`
    pub fn find<T: FromNode>(&self) -> Option<&T> {
        self.children.iter().find_map(T::from_node)
    }

    /// Mutable first plugin of type `T`
    pub fn find_mut<T: FromNode>(&mut self) -> Option<&mut T> {
        self.children.iter_mut().find_map(T::from_node_mut)
    }

    /// Every child with a typed payload of `T`
    pub fn find_all<'a, T: FromNode + 'a>(&'a self) -> impl Iterator<Item = &'a T> {
        self.children.iter().filter_map(T::from_node)
    }

    /// Replace the first child of the same type, or append
    pub fn replace_or_push(&mut self, node: impl Into<Node>) {
        let node = node.into();
        let chunk_type = node.chunk_type();
        match self.children.iter_mut().find(|n| n.chunk_type() == chunk_type) {
            Some(slot) => *slot = node,
            None => self.children.push(node),
        }
    }

    /// Remove every child of the given type, returning how many were removed
    pub fn remove_all(&mut self, chunk_type: ChunkType) -> usize {
        let before = self.children.len();
        self.children.retain(|n| n.chunk_type() != chunk_type);
        before - self.children.len()
    }
}

impl Chunk for Extension {
    const TYPE: ChunkType = ChunkType::Extension;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let mut children = Vec::new();
        while !r.is_empty() {
            children.push(Node::read(r, ctx)?);
        }
        Ok(Self {
            version: header.version,
            children,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        for child in &self.children {
            child.write(w)?;
        }
        Ok(())
    }
}
