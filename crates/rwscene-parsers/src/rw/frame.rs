// rwscene-parsers/src/rw/frame.rs
//! Frame list and skeleton hierarchy resolution
//!
//! Frames live in a flat arena ("storage order") where every parent precedes
//! its children. Skinned models additionally define a "hierarchy order"
//! through the node table of one HAnim plugin. The two index spaces are only
//! related through HAnim name ids, so every translation here is a lookup that
//! may fail and returns `Option`.

use std::collections::VecDeque;

use glam::{Mat3, Mat4, Vec3};
use serde::Serialize;
use tracing::debug;

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::extension::Extension;
use super::hanim::HAnimPlugin;
use super::node::{Chunk, FromNode, UnknownChunk};
use super::reader::{ChunkReader, ParseContext};
use super::writer::ChunkWriter;

/// Size of one frame record in the FrameList struct
const FRAME_RECORD_SIZE: usize = 56;

/// Local transform and parent link of one frame
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Frame {
    /// Rotation with columns right, up, at
    pub rotation: Mat3,
    /// Translation relative to the parent
    pub position: Vec3,
    /// Storage index of the parent, -1 for a root
    pub parent: i32,
    /// Frame flags
    pub flags: u32,
}

impl Frame {
    /// Identity frame attached to `parent`
    pub fn new(parent: i32) -> Self {
        Self {
            rotation: Mat3::IDENTITY,
            position: Vec3::ZERO,
            parent,
            flags: 0,
        }
    }

    /// Frame with an explicit local transform
    pub fn with_transform(rotation: Mat3, position: Vec3, parent: i32) -> Self {
        Self {
            rotation,
            position,
            parent,
            flags: 0,
        }
    }

    /// Local transform as a 4x4 matrix
    pub fn local_matrix(&self) -> Mat4 {
        Mat4::from_cols(
            self.rotation.x_axis.extend(0.0),
            self.rotation.y_axis.extend(0.0),
            self.rotation.z_axis.extend(0.0),
            self.position.extend(1.0),
        )
    }

    /// Parent storage index, `None` for a root
    pub fn parent_index(&self) -> Option<usize> {
        usize::try_from(self.parent).ok()
    }
}

/// Frame list chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameList {
    /// Library version stamp
    pub version: ChunkVersion,
    frames: Vec<Frame>,
    extensions: Vec<Extension>,
    #[serde(skip)]
    children: Vec<Vec<usize>>,
}

impl FrameList {
    /// Empty frame list
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            frames: Vec::new(),
            extensions: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Build a list from frames in storage order, one extension per frame
    pub fn from_frames(
        version: ChunkVersion,
        frames: Vec<Frame>,
        extensions: Vec<Extension>,
    ) -> Result<Self> {
        if frames.len() != extensions.len() {
            return Err(Error::invalid_data(format!(
                "{} frames but {} frame extensions",
                frames.len(),
                extensions.len()
            )));
        }
        for (index, frame) in frames.iter().enumerate() {
            Self::check_parent(index, frame.parent)?;
        }
        let mut list = Self {
            version,
            frames,
            extensions,
            children: Vec::new(),
        };
        list.rebuild_children();
        Ok(list)
    }

    fn check_parent(index: usize, parent: i32) -> Result<()> {
        let valid = parent == -1 || (parent >= 0 && (parent as usize) < index);
        if valid {
            Ok(())
        } else {
            Err(Error::invalid_data(format!(
                "frame {index} has parent {parent}, which does not precede it"
            )))
        }
    }

    fn rebuild_children(&mut self) {
        let mut children = vec![Vec::new(); self.frames.len()];
        for (index, frame) in self.frames.iter().enumerate() {
            if let Some(parent) = frame.parent_index() {
                children[parent].push(index);
            }
        }
        self.children = children;
    }

    /// Append a frame, returning its storage index
    pub fn push_frame(&mut self, frame: Frame, extension: Extension) -> Result<usize> {
        let index = self.frames.len();
        Self::check_parent(index, frame.parent)?;
        self.frames.push(frame);
        self.extensions.push(extension);
        self.children.push(Vec::new());
        if let Some(parent) = frame.parent_index() {
            self.children[parent].push(index);
        }
        Ok(index)
    }

    /// Number of frames
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Whether there are no frames
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Frames in storage order
    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Frame at a storage index
    pub fn frame(&self, index: usize) -> Option<&Frame> {
        self.frames.get(index)
    }

    /// Local transform of a frame; the parent link cannot be changed here
    pub fn set_transform(&mut self, index: usize, rotation: Mat3, position: Vec3) -> Result<()> {
        let frame = self
            .frames
            .get_mut(index)
            .ok_or(Error::UnresolvedIndex {
                space: "frame",
                index: index as i64,
            })?;
        frame.rotation = rotation;
        frame.position = position;
        Ok(())
    }

    /// Extension of a frame
    pub fn extension(&self, index: usize) -> Option<&Extension> {
        self.extensions.get(index)
    }

    /// Mutable extension of a frame
    pub fn extension_mut(&mut self, index: usize) -> Option<&mut Extension> {
        self.extensions.get_mut(index)
    }

    /// Parent storage index of a frame
    pub fn parent(&self, index: usize) -> Option<usize> {
        self.frames.get(index)?.parent_index()
    }

    /// Child storage indices of a frame, in storage order
    pub fn children(&self, index: usize) -> &[usize] {
        self.children.get(index).map_or(&[], Vec::as_slice)
    }

    /// Name from the frame's node-name plugin, if any
    pub fn name(&self, index: usize) -> Option<String> {
        let node = self.extension(index)?.first_of(ChunkType::NodeName)?;
        let data = &UnknownChunk::from_node(node)?.data;
        let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
        Some(String::from_utf8_lossy(&data[..end]).into_owned())
    }

    /// HAnim plugin of a frame
    pub fn hanim(&self, index: usize) -> Option<&HAnimPlugin> {
        self.extension(index)?.find::<HAnimPlugin>()
    }

    /// World transforms of every frame, in storage order
    pub fn world_matrices(&self) -> Vec<Mat4> {
        let mut worlds: Vec<Mat4> = Vec::with_capacity(self.frames.len());
        for frame in &self.frames {
            let local = frame.local_matrix();
            let world = match frame.parent_index() {
                Some(parent) => worlds[parent] * local,
                None => local,
            };
            worlds.push(world);
        }
        worlds
    }

    /// World transform of one frame
    pub fn world_matrix(&self, index: usize) -> Option<Mat4> {
        let mut world = self.frames.get(index)?.local_matrix();
        let mut current = self.parent(index);
        while let Some(parent) = current {
            world = self.frames[parent].local_matrix() * world;
            current = self.parent(parent);
        }
        Some(world)
    }

    // ==================== Hierarchy resolution ====================

    /// The first HAnim plugin, in storage order, that carries a node table
    pub fn hierarchy_root(&self) -> Option<(usize, &HAnimPlugin)> {
        (0..self.frames.len()).find_map(|index| {
            self.hanim(index)
                .filter(|plugin| plugin.node_count() != 0)
                .map(|plugin| (index, plugin))
        })
    }

    /// Storage index of the frame whose HAnim plugin has `name_id`
    pub fn frame_index_by_name_id(&self, name_id: i32) -> Option<usize> {
        (0..self.frames.len())
            .find(|&index| self.hanim(index).is_some_and(|plugin| plugin.node_id == name_id))
    }

    /// Hierarchy index of `name_id` in the root node table
    pub fn hierarchy_index_by_name_id(&self, name_id: i32) -> Option<usize> {
        let (_, root) = self.hierarchy_root()?;
        root.hierarchy.as_ref()?.index_of(name_id)
    }

    /// Storage index of the frame at hierarchy position `hierarchy_index`
    pub fn storage_index_for_hierarchy_index(&self, hierarchy_index: usize) -> Option<usize> {
        let (_, root) = self.hierarchy_root()?;
        let node = root.nodes().get(hierarchy_index)?;
        self.frame_index_by_name_id(node.node_id)
    }

    /// Hierarchy position of the frame at `storage_index`
    pub fn hierarchy_index_for_storage_index(&self, storage_index: usize) -> Option<usize> {
        let name_id = self.hanim(storage_index)?.node_id;
        self.hierarchy_index_by_name_id(name_id)
    }

    // ==================== Traversal ====================

    /// Pre-order walk of the subtree rooted at storage index 1
    ///
    /// Index 0 is the clump's own root frame and is not part of the walk.
    pub fn depth_first_order(&self) -> Vec<usize> {
        let mut order = Vec::new();
        if self.frames.len() < 2 {
            return order;
        }
        let mut stack = vec![1usize];
        while let Some(index) = stack.pop() {
            order.push(index);
            stack.extend(self.children(index).iter().rev());
        }
        order
    }

    /// Level-order walk starting from every root frame
    pub fn breadth_first_order(&self) -> Vec<usize> {
        let mut order = Vec::with_capacity(self.frames.len());
        let mut queue: VecDeque<usize> = self
            .frames
            .iter()
            .enumerate()
            .filter(|(_, frame)| frame.parent == -1)
            .map(|(index, _)| index)
            .collect();
        while let Some(index) = queue.pop_front() {
            order.push(index);
            queue.extend(self.children(index));
        }
        order
    }
}

impl Chunk for FrameList {
    const TYPE: ChunkType = ChunkType::FrameList;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let count = s.read_count(FRAME_RECORD_SIZE)?;
        let mut frames = Vec::with_capacity(count);
        for index in 0..count {
            let rotation = Mat3::from_cols(s.read_vec3()?, s.read_vec3()?, s.read_vec3()?);
            let position = s.read_vec3()?;
            let parent = s.read_i32()?;
            let flags = s.read_u32()?;
            Self::check_parent(index, parent)?;
            frames.push(Frame {
                rotation,
                position,
                parent,
                flags,
            });
        }
        s.finish(&struct_header)?;

        let mut extensions = Vec::with_capacity(count);
        for _ in 0..count {
            extensions.push(Extension::read(r, ctx)?);
        }

        debug!(frames = count, "parsed frame list");
        let mut list = Self {
            version: header.version,
            frames,
            extensions,
            children: Vec::new(),
        };
        list.rebuild_children();
        Ok(list)
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| {
            w.write_count("frame count", self.frames.len())?;
            for frame in &self.frames {
                w.write_vec3(frame.rotation.x_axis)?;
                w.write_vec3(frame.rotation.y_axis)?;
                w.write_vec3(frame.rotation.z_axis)?;
                w.write_vec3(frame.position)?;
                w.write_i32(frame.parent)?;
                w.write_u32(frame.flags)?;
            }
            Ok(())
        })?;
        for extension in &self.extensions {
            extension.write(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const V: ChunkVersion = ChunkVersion::SAN_ANDREAS;

    fn ext_with(plugin: HAnimPlugin) -> Extension {
        let mut ext = Extension::new(V);
        ext.push(plugin);
        ext
    }

    /// Root frame, then a two-bone chain 1 -> 2 with name ids 500 and 501
    fn skeleton() -> FrameList {
        use crate::rw::hanim::HAnimNode;

        let nodes = vec![
            HAnimNode { node_id: 500, index: 0, flags: 0 },
            HAnimNode { node_id: 501, index: 1, flags: 0 },
        ];
        FrameList::from_frames(
            V,
            vec![Frame::new(-1), Frame::new(0), Frame::new(1)],
            vec![
                Extension::new(V),
                ext_with(HAnimPlugin::root(500, nodes, V)),
                ext_with(HAnimPlugin::new(501, V)),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_hierarchy_translation() {
        let frames = skeleton();
        assert_eq!(frames.hierarchy_root().map(|(i, _)| i), Some(1));
        assert_eq!(frames.storage_index_for_hierarchy_index(0), Some(1));
        assert_eq!(frames.storage_index_for_hierarchy_index(1), Some(2));
        assert_eq!(frames.storage_index_for_hierarchy_index(2), None);
        assert_eq!(frames.hierarchy_index_for_storage_index(2), Some(1));
        assert_eq!(frames.hierarchy_index_for_storage_index(0), None);
        assert_eq!(frames.frame_index_by_name_id(999), None);
    }

    #[test]
    fn test_parent_must_precede_child() {
        let err = FrameList::from_frames(
            V,
            vec![Frame::new(1), Frame::new(-1)],
            vec![Extension::new(V), Extension::new(V)],
        )
        .unwrap_err();
        assert!(err.is_parse_error());

        let mut list = FrameList::new(V);
        list.push_frame(Frame::new(-1), Extension::new(V)).unwrap();
        assert!(list.push_frame(Frame::new(1), Extension::new(V)).is_err());
        assert_eq!(list.len(), 1);
    }

    #[test]
    fn test_world_matrices_compose_parent_first() {
        let mut list = FrameList::new(V);
        list.push_frame(
            Frame::with_transform(Mat3::IDENTITY, Vec3::new(1.0, 0.0, 0.0), -1),
            Extension::new(V),
        )
        .unwrap();
        list.push_frame(
            Frame::with_transform(Mat3::from_rotation_z(std::f32::consts::FRAC_PI_2), Vec3::new(0.0, 2.0, 0.0), 0),
            Extension::new(V),
        )
        .unwrap();
        list.push_frame(
            Frame::with_transform(Mat3::IDENTITY, Vec3::new(1.0, 0.0, 0.0), 1),
            Extension::new(V),
        )
        .unwrap();

        let worlds = list.world_matrices();
        let p = worlds[2].w_axis.truncate();
        assert!((p - Vec3::new(1.0, 3.0, 0.0)).length() < 1e-5);
        assert!(worlds[2].abs_diff_eq(list.world_matrix(2).unwrap(), 1e-6));
    }

    #[test]
    fn test_traversal_orders() {
        // 0 -> {1, 3}, 1 -> {2}, 4 is a second root
        let frames = vec![
            Frame::new(-1),
            Frame::new(0),
            Frame::new(1),
            Frame::new(0),
            Frame::new(-1),
        ];
        let exts = (0..5).map(|_| Extension::new(V)).collect();
        let list = FrameList::from_frames(V, frames, exts).unwrap();

        assert_eq!(list.depth_first_order(), vec![1, 2]);
        assert_eq!(list.breadth_first_order(), vec![0, 4, 1, 3, 2]);
        assert_eq!(list.children(0), &[1, 3]);
        assert_eq!(list.parent(3), Some(0));
        assert_eq!(list.parent(4), None);
    }

    #[test]
    fn test_frame_list_roundtrip() {
        let list = skeleton();
        let mut w = ChunkWriter::new();
        list.write(&mut w).unwrap();
        let back = FrameList::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap();
        assert_eq!(back, list);
        assert_eq!(back.children(1), &[2]);
    }

    #[test]
    fn test_frame_name_from_plugin() {
        let mut list = skeleton();
        list.extension_mut(2).unwrap().push(UnknownChunk {
            tag: ChunkType::NodeName.to_u32(),
            version: V,
            data: b"Bip01 Spine".to_vec(),
        });
        assert_eq!(list.name(2).as_deref(), Some("Bip01 Spine"));
        assert_eq!(list.name(0), None);
    }
}
