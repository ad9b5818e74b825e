// rwscene-parsers/src/rw/clump.rs
//! Clump and GeometryList chunks
//!
//! A clump is the unit stored in a model file: a frame hierarchy, the
//! geometries, atomics binding the two together, and any lights or cameras.
//!
//! # Layout
//! ```text
//! Struct { i32 atomics [, i32 lights, i32 cameras] }   counts after 3.3
//! FrameList
//! GeometryList
//! Atomic * atomics
//! (Struct { i32 frame } + Light) * lights
//! (Struct { i32 frame } + Camera) * cameras
//! Extension                                            only with atomics
//! ```

use std::io::Write;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info};

use rwscene_core::{ChunkVersion, Error, Result, ResultExt};

use super::atomic::Atomic;
use super::chunk::{ChunkHeader, ChunkType};
use super::extension::Extension;
use super::frame::FrameList;
use super::geometry::Geometry;
use super::node::{Chunk, Node};
use super::reader::{ChunkReader, ParseContext};
use super::skin::{SkinPlugin, VertexInfluences};
use super::split::SplitEncoding;
use super::writer::ChunkWriter;

/// Library versions above this store light and camera counts
const SCENE_OBJECT_COUNTS_AFTER: u32 = 0x33000;

// ==================== Geometry List ====================

/// Geometries shared by the atomics of a clump
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GeometryList {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Geometries, referenced by [`Atomic::geometry_index`]
    pub geometries: Vec<Geometry>,
}

impl GeometryList {
    /// Empty list
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            geometries: Vec::new(),
        }
    }

    /// Number of geometries
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// Whether the list holds no geometry
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }
}

impl Chunk for GeometryList {
    const TYPE: ChunkType = ChunkType::GeometryList;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let count = s.read_count(0)?;
        s.finish(&struct_header)?;

        r.check_fits(count, 12)?;
        let mut geometries = Vec::with_capacity(count);
        for index in 0..count {
            let geometry = Geometry::read(r, ctx).with_context(|| format!("geometry {index}"))?;
            geometries.push(geometry);
        }
        Ok(Self {
            version: header.version,
            geometries,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| w.write_count("geometry count", self.geometries.len()))?;
        for geometry in &self.geometries {
            geometry.write(w)?;
        }
        Ok(())
    }
}

// ==================== Clump ====================

/// Light or camera attached to a frame, carried opaquely
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SceneObject {
    /// Storage index of the frame the object hangs from
    pub frame_index: i32,
    /// Version stamp of the Struct carrying the frame index
    pub link_version: ChunkVersion,
    /// The light or camera chunk
    pub node: Node,
}

/// Counts describing a clump, for reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClumpSummary {
    /// Version stamp, formatted for display
    pub version: String,
    /// Frames, the clump root included
    pub frames: usize,
    /// Entries in the geometry list
    pub geometries: usize,
    /// Atomics
    pub atomics: usize,
    /// Lights
    pub lights: usize,
    /// Cameras
    pub cameras: usize,
    /// Vertices over all geometries
    pub vertices: usize,
    /// Triangles over all geometries
    pub triangles: usize,
    /// Materials over all geometries, instance slots included
    pub materials: usize,
    /// Geometries carrying a skin plugin
    pub skinned_geometries: usize,
    /// Nodes in the hierarchy table, zero without one
    pub bones: usize,
}

/// Clump chunk, the root of a model file
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Clump {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Frame hierarchy in storage order
    pub frame_list: FrameList,
    /// Geometries referenced by the atomics
    pub geometry_list: GeometryList,
    /// Draw calls, each binding a frame to a geometry
    pub atomics: Vec<Atomic>,
    /// Lights, each linked to a frame
    pub lights: Vec<SceneObject>,
    /// Cameras, each linked to a frame
    pub cameras: Vec<SceneObject>,
    /// Clump plugins (collision and the like), kept verbatim
    pub extension: Extension,
}

impl Clump {
    /// Empty clump with an empty frame and geometry list
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            frame_list: FrameList::new(version),
            geometry_list: GeometryList::new(version),
            atomics: Vec::new(),
            lights: Vec::new(),
            cameras: Vec::new(),
            extension: Extension::new(version),
        }
    }

    fn has_scene_object_counts(&self) -> bool {
        self.version.unpacked() > SCENE_OBJECT_COUNTS_AFTER
    }

    /// Frame a given atomic is drawn at
    pub fn atomic_frame(&self, atomic: usize) -> Option<usize> {
        let frame = self.atomics.get(atomic)?.frame_index;
        (frame < self.frame_list.len()).then_some(frame)
    }

    /// Geometry drawn by a given atomic
    pub fn geometry_for(&self, atomic: usize) -> Option<&Geometry> {
        let index = self.atomics.get(atomic)?.geometry_index;
        self.geometry_list.geometries.get(index)
    }

    /// Mutable geometry drawn by a given atomic
    pub fn geometry_for_mut(&mut self, atomic: usize) -> Option<&mut Geometry> {
        let index = self.atomics.get(atomic)?.geometry_index;
        self.geometry_list.geometries.get_mut(index)
    }

    /// Build skin data for an atomic's geometry and store it in its extension
    ///
    /// `influences` must hold one entry per vertex of the geometry.
    pub fn attach_skin(&mut self, atomic: usize, influences: &[VertexInfluences]) -> Result<()> {
        let frame = self.atomic_frame(atomic).ok_or(Error::UnresolvedIndex {
            space: "atomic",
            index: atomic as i64,
        })?;
        let geometry = self.geometry_for(atomic).ok_or(Error::UnresolvedIndex {
            space: "atomic geometry",
            index: atomic as i64,
        })?;
        if influences.len() != geometry.vertex_count {
            return Err(Error::invalid_data(format!(
                "{} vertex influences for a geometry of {} vertices",
                influences.len(),
                geometry.vertex_count
            )));
        }

        let skin = SkinPlugin::bind(&self.frame_list, frame, influences, geometry.version)?;
        if let Some(geometry) = self.geometry_for_mut(atomic) {
            geometry.extension.replace_or_push(skin);
        }
        Ok(())
    }

    /// Rebuild the material split of every non-native geometry
    pub fn rebuild_material_splits(&mut self, encoding: SplitEncoding) -> Result<usize> {
        let targets: Vec<&mut Geometry> = self
            .geometry_list
            .geometries
            .iter_mut()
            .filter(|g| !g.is_native())
            .collect();
        let rebuilt = targets.len();
        targets
            .into_par_iter()
            .try_for_each(|g| g.rebuild_material_split(encoding))?;
        info!(geometries = rebuilt, ?encoding, "rebuilt material splits");
        Ok(rebuilt)
    }

    /// Counts for reports
    pub fn summary(&self) -> ClumpSummary {
        let geometries = &self.geometry_list.geometries;
        ClumpSummary {
            version: self.version.to_string(),
            frames: self.frame_list.len(),
            geometries: geometries.len(),
            atomics: self.atomics.len(),
            lights: self.lights.len(),
            cameras: self.cameras.len(),
            vertices: geometries.iter().map(|g| g.vertex_count).sum(),
            triangles: geometries.iter().map(Geometry::triangle_count).sum(),
            materials: geometries.iter().map(|g| g.material_list.len()).sum(),
            skinned_geometries: geometries.iter().filter(|g| g.skin().is_some()).count(),
            bones: self
                .frame_list
                .hierarchy_root()
                .map_or(0, |(_, root)| root.node_count()),
        }
    }

    /// Parse a clump from the start of `bytes`
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        Self::read(&mut ChunkReader::new(bytes), ParseContext::default())
    }

    /// Serialize the clump chunk
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut w = ChunkWriter::new();
        self.write(&mut w)?;
        Ok(w.into_bytes())
    }

    /// Serialize the clump chunk into `writer`
    pub fn write_to<W: Write>(&self, writer: &mut W) -> Result<()> {
        writer.write_all(&self.to_bytes()?)?;
        Ok(())
    }

    fn read_scene_objects(
        r: &mut ChunkReader<'_>,
        ctx: ParseContext,
        count: usize,
        kind: ChunkType,
    ) -> Result<Vec<SceneObject>> {
        let mut objects = Vec::with_capacity(count.min(r.remaining() / 28));
        for _ in 0..count {
            let (link_header, mut link) = r.enter(ChunkType::Struct)?;
            let frame_index = link.read_i32()?;
            link.finish(&link_header)?;

            let offset = r.offset();
            match r.peek_type() {
                Some(found) if found != kind => {
                    return Err(Error::UnexpectedNode {
                        expected: kind.name().to_string(),
                        found: found.to_u32(),
                        offset,
                    })
                }
                _ => {}
            }
            objects.push(SceneObject {
                frame_index,
                link_version: link_header.version,
                node: Node::read(r, ctx)?,
            });
        }
        Ok(objects)
    }

    fn write_scene_objects(w: &mut ChunkWriter, objects: &[SceneObject], kind: ChunkType) -> Result<()> {
        for object in objects {
            if object.node.chunk_type() != kind {
                return Err(Error::invalid_data(format!(
                    "{} attached where a {} belongs",
                    object.node.chunk_type(),
                    kind
                )));
            }
            w.write_struct(object.link_version, |w| w.write_i32(object.frame_index))?;
            object.node.write(w)?;
        }
        Ok(())
    }
}

impl Chunk for Clump {
    const TYPE: ChunkType = ChunkType::Clump;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let atomic_count = s.read_count(0)?;
        let (light_count, camera_count) = if header.version.unpacked() > SCENE_OBJECT_COUNTS_AFTER {
            (s.read_count(0)?, s.read_count(0)?)
        } else {
            (0, 0)
        };
        s.finish(&struct_header)?;

        let frame_list = FrameList::read(r, ctx).context("clump frame list")?;
        let geometry_list = GeometryList::read(r, ctx).context("clump geometry list")?;

        r.check_fits(atomic_count, 12)?;
        let mut atomics = Vec::with_capacity(atomic_count);
        for _ in 0..atomic_count {
            atomics.push(Atomic::read(r, ctx)?);
        }

        let lights = Self::read_scene_objects(r, ctx, light_count, ChunkType::Light)?;
        let cameras = Self::read_scene_objects(r, ctx, camera_count, ChunkType::Camera)?;

        let extension = if atomic_count > 0 {
            Extension::read(r, ctx)?
        } else {
            Extension::new(header.version)
        };

        debug!(
            frames = frame_list.len(),
            geometries = geometry_list.len(),
            atomics = atomics.len(),
            lights = lights.len(),
            cameras = cameras.len(),
            "parsed clump"
        );

        Ok(Self {
            version: header.version,
            frame_list,
            geometry_list,
            atomics,
            lights,
            cameras,
            extension,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        if !self.has_scene_object_counts() && !(self.lights.is_empty() && self.cameras.is_empty()) {
            return Err(Error::invalid_data(format!(
                "clump version {} cannot store lights or cameras",
                self.version
            )));
        }
        if self.atomics.is_empty() && !self.extension.is_empty() {
            return Err(Error::invalid_data("clump extension requires at least one atomic"));
        }

        w.write_struct(self.version, |w| {
            w.write_count("atomic count", self.atomics.len())?;
            if self.has_scene_object_counts() {
                w.write_count("light count", self.lights.len())?;
                w.write_count("camera count", self.cameras.len())?;
            }
            Ok(())
        })?;
        self.frame_list.write(w)?;
        self.geometry_list.write(w)?;
        for atomic in &self.atomics {
            atomic.write(w)?;
        }
        Self::write_scene_objects(w, &self.lights, ChunkType::Light)?;
        Self::write_scene_objects(w, &self.cameras, ChunkType::Camera)?;
        if !self.atomics.is_empty() {
            self.extension.write(w)?;
        }
        Ok(())
    }
}
