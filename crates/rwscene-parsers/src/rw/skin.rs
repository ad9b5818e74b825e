// rwscene-parsers/src/rw/skin.rs
//! Skin plugin: per-vertex bone weights and inverse bind matrices
//!
//! Bone indices and inverse bind matrices are expressed in hierarchy order
//! (see [`FrameList::storage_index_for_hierarchy_index`]). The plugin does
//! not store its vertex count; it comes from the owning geometry.

use std::collections::BTreeSet;

use glam::Mat4;
use serde::Serialize;
use smallvec::SmallVec;
use tracing::debug;

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::frame::FrameList;
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::writer::{narrow, ChunkWriter};

/// Marker preceding each matrix in the legacy layout
const LEGACY_MATRIX_MARKER: u32 = 0xDEAD_DEAD;

/// Most influences one vertex can carry
pub const MAX_INFLUENCES: usize = 4;

/// Bone influences of one vertex as (hierarchy bone index, weight) pairs
pub type VertexInfluences = SmallVec<[(u8, f32); MAX_INFLUENCES]>;

/// Hardware split tables following the matrices in the current layout
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct SkinSplitData {
    /// Maximum bones per split
    pub bone_limit: u32,
    /// Bone remap table, one entry per bone; only written when `splits` is non-empty
    pub bone_remap: Vec<u8>,
    /// (first bone, bone count) per split
    pub splits: Vec<(u8, u8)>,
    /// (hierarchy index, flag) run table; only written when `splits` is non-empty
    pub rle: Vec<(u8, u8)>,
    /// Run count stored alongside an empty split table
    ///
    /// No runs follow in that case, but exporters disagree on the value.
    /// Ignored when `splits` is non-empty.
    pub empty_rle_count: u32,
}

/// Skin plugin chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkinPlugin {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Sorted hierarchy indices of bones that influence any vertex
    pub used_bones: Vec<u8>,
    /// Largest number of nonzero weights on any vertex
    pub max_weights_per_vertex: u8,
    /// Four bone indices per vertex
    pub vertex_bone_indices: Vec<[u8; 4]>,
    /// Four weights per vertex, matching `vertex_bone_indices`
    pub vertex_weights: Vec<[f32; 4]>,
    /// One inverse bind matrix per hierarchy bone
    pub inverse_bind_matrices: Vec<Mat4>,
    /// Split tables of the current layout
    ///
    /// `None` selects the legacy layout with per-matrix markers, which has
    /// no room for a used-bone list.
    pub split_data: Option<SkinSplitData>,
}

impl SkinPlugin {
    /// Number of bones (one per inverse bind matrix)
    pub fn bone_count(&self) -> usize {
        self.inverse_bind_matrices.len()
    }

    /// Number of weighted vertices
    pub fn vertex_count(&self) -> usize {
        self.vertex_weights.len()
    }

    /// Whether the plugin is written in the legacy marker layout
    pub fn is_legacy_layout(&self) -> bool {
        self.split_data.is_none()
    }

    /// Build skin data for a mesh drawn at `root_frame`
    ///
    /// `influences` holds one entry per vertex of the owning geometry. Bone
    /// indices are hierarchy indices into the node table of
    /// [`FrameList::hierarchy_root`]. Weights are normalised so that every
    /// vertex sums to one. Inverse bind matrices are relative to the world
    /// transform of `root_frame`.
    pub fn bind(
        frames: &FrameList,
        root_frame: usize,
        influences: &[VertexInfluences],
        version: ChunkVersion,
    ) -> Result<Self> {
        let (_, root) = frames
            .hierarchy_root()
            .ok_or_else(|| Error::missing_field("HAnim hierarchy root"))?;
        let bone_count = root.node_count();

        let mut vertex_bone_indices = Vec::with_capacity(influences.len());
        let mut vertex_weights = Vec::with_capacity(influences.len());
        let mut used = BTreeSet::new();
        let mut max_weights = 0usize;

        for (vertex, vertex_influences) in influences.iter().enumerate() {
            let (indices, weights, count) = normalize_influences(vertex, vertex_influences, bone_count)?;
            used.extend(indices.iter().take(count).copied());
            max_weights = max_weights.max(count);
            vertex_bone_indices.push(indices);
            vertex_weights.push(weights);
        }

        let worlds = frames.world_matrices();
        let root_world = *worlds.get(root_frame).ok_or(Error::UnresolvedIndex {
            space: "frame",
            index: root_frame as i64,
        })?;
        let root_inverse = root_world.inverse();

        let mut inverse_bind_matrices = Vec::with_capacity(bone_count);
        for hierarchy_index in 0..bone_count {
            let storage_index = frames
                .storage_index_for_hierarchy_index(hierarchy_index)
                .ok_or(Error::UnresolvedIndex {
                    space: "hierarchy",
                    index: hierarchy_index as i64,
                })?;
            let bone_world = worlds[storage_index];
            inverse_bind_matrices.push((root_inverse * bone_world).inverse());
        }

        debug!(
            vertices = influences.len(),
            bones = bone_count,
            used = used.len(),
            "built skin bind data"
        );

        Ok(Self {
            version,
            used_bones: used.into_iter().collect(),
            max_weights_per_vertex: narrow("max weights per vertex", max_weights)?,
            vertex_bone_indices,
            vertex_weights,
            inverse_bind_matrices,
            split_data: Some(SkinSplitData::default()),
        })
    }

    /// Influences of one vertex, zero weights dropped
    pub fn influences(&self, vertex: usize) -> Option<VertexInfluences> {
        let indices = self.vertex_bone_indices.get(vertex)?;
        let weights = self.vertex_weights.get(vertex)?;
        Some(
            indices
                .iter()
                .zip(weights)
                .filter(|(_, w)| **w != 0.0)
                .map(|(&i, &w)| (i, w))
                .collect(),
        )
    }
}

/// Whether the matrices after the weights use the legacy marker layout
///
/// Only consulted when the used-bone list is empty. With bones, the first
/// matrix is preceded by a marker; without bones, the current layout still
/// carries its split header.
fn is_legacy_tail(r: &ChunkReader<'_>, bone_count: usize) -> bool {
    if bone_count == 0 {
        r.is_empty()
    } else {
        r.peek_u32() == Some(LEGACY_MATRIX_MARKER)
    }
}

/// Check one vertex's influences and bring its weight sum to one
fn normalize_influences(
    vertex: usize,
    influences: &[(u8, f32)],
    bone_count: usize,
) -> Result<([u8; 4], [f32; 4], usize)> {
    let nonzero: SmallVec<[(u8, f32); MAX_INFLUENCES]> =
        influences.iter().copied().filter(|&(_, w)| w != 0.0).collect();

    if nonzero.len() > MAX_INFLUENCES {
        return Err(Error::TooManyInfluences {
            vertex,
            count: nonzero.len(),
        });
    }
    if nonzero.is_empty() {
        return Err(Error::UnweightedVertex { vertex });
    }

    let mut indices = [0u8; 4];
    let mut weights = [0f32; 4];
    for (slot, &(bone, weight)) in nonzero.iter().enumerate() {
        if usize::from(bone) >= bone_count {
            return Err(Error::UnresolvedIndex {
                space: "hierarchy",
                index: i64::from(bone),
            });
        }
        if !(weight.is_finite() && weight > 0.0) {
            return Err(Error::invalid_data(format!(
                "vertex {vertex} has invalid weight {weight} for bone {bone}"
            )));
        }
        indices[slot] = bone;
        weights[slot] = weight;
    }

    let count = nonzero.len();
    let sum: f32 = weights.iter().sum();
    if sum < 1.0 {
        let share = (1.0 - sum) / count as f32;
        for w in weights.iter_mut().take(count) {
            *w += share;
        }
    } else if sum > 1.0 {
        for w in weights.iter_mut().take(count) {
            *w /= sum;
        }
    }

    Ok((indices, weights, count))
}

impl Chunk for SkinPlugin {
    const TYPE: ChunkType = ChunkType::Skin;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let vertex_count = ctx
            .vertex_count
            .ok_or_else(|| Error::missing_field("vertex count for skin outside a geometry"))?;

        let bone_count = usize::from(r.read_u8()?);
        let used_count = usize::from(r.read_u8()?);
        let max_weights_per_vertex = r.read_u8()?;
        let _padding = r.read_u8()?;
        let used_bones = r.read_bytes(used_count)?.to_vec();

        r.check_fits(vertex_count, 20)?;
        let mut vertex_bone_indices = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            vertex_bone_indices.push(r.read_array::<4>()?);
        }
        let mut vertex_weights = Vec::with_capacity(vertex_count);
        for _ in 0..vertex_count {
            vertex_weights.push(r.read_f32s::<4>()?);
        }

        let legacy = used_count == 0 && is_legacy_tail(r, bone_count);
        let mut inverse_bind_matrices = Vec::with_capacity(bone_count);
        for _ in 0..bone_count {
            if legacy {
                let offset = r.offset();
                let marker = r.read_u32()?;
                if marker != LEGACY_MATRIX_MARKER {
                    return Err(Error::invalid_data(format!(
                        "expected skin matrix marker at offset {offset}, found 0x{marker:08X}"
                    )));
                }
            }
            inverse_bind_matrices.push(r.read_mat4()?);
        }

        let split_data = if legacy {
            None
        } else {
            let bone_limit = r.read_u32()?;
            let split_count = r.read_u32()? as usize;
            let rle_count = r.read_u32()? as usize;
            let mut data = SkinSplitData {
                bone_limit,
                ..SkinSplitData::default()
            };
            if split_count == 0 {
                data.empty_rle_count = rle_count as u32;
            } else {
                data.bone_remap = r.read_bytes(bone_count)?.to_vec();
                r.check_fits(split_count, 2)?;
                for _ in 0..split_count {
                    data.splits.push((r.read_u8()?, r.read_u8()?));
                }
                r.check_fits(rle_count, 2)?;
                for _ in 0..rle_count {
                    data.rle.push((r.read_u8()?, r.read_u8()?));
                }
            }
            Some(data)
        };

        Ok(Self {
            version: header.version,
            used_bones,
            max_weights_per_vertex,
            vertex_bone_indices,
            vertex_weights,
            inverse_bind_matrices,
            split_data,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        if self.vertex_bone_indices.len() != self.vertex_weights.len() {
            return Err(Error::invalid_data(format!(
                "skin has {} index sets but {} weight sets",
                self.vertex_bone_indices.len(),
                self.vertex_weights.len()
            )));
        }
        let bone_count: u8 = narrow("skin bone count", self.bone_count())?;
        w.write_u8(bone_count)?;
        w.write_u8(narrow("skin used bone count", self.used_bones.len())?)?;
        w.write_u8(self.max_weights_per_vertex)?;
        w.write_u8(0)?;
        w.write_bytes(&self.used_bones)?;
        for indices in &self.vertex_bone_indices {
            w.write_bytes(indices)?;
        }
        for weights in &self.vertex_weights {
            w.write_f32s(weights)?;
        }

        let legacy = self.is_legacy_layout();
        if legacy && !self.used_bones.is_empty() {
            return Err(Error::invalid_data(format!(
                "legacy skin layout cannot store {} used bones",
                self.used_bones.len()
            )));
        }
        for matrix in &self.inverse_bind_matrices {
            if legacy {
                w.write_u32(LEGACY_MATRIX_MARKER)?;
            }
            w.write_mat4(matrix)?;
        }
        if legacy {
            return Ok(());
        }

        let default_split = SkinSplitData::default();
        let data = self.split_data.as_ref().unwrap_or(&default_split);
        w.write_u32(data.bone_limit)?;
        w.write_u32(narrow("skin split count", data.splits.len())?)?;
        if data.splits.is_empty() {
            return w.write_u32(data.empty_rle_count);
        }
        w.write_u32(narrow("skin rle count", data.rle.len())?)?;
        if data.bone_remap.len() != usize::from(bone_count) {
            return Err(Error::invalid_data(format!(
                "skin bone remap has {} entries for {} bones",
                data.bone_remap.len(),
                bone_count
            )));
        }
        w.write_bytes(&data.bone_remap)?;
        for &(start, count) in &data.splits {
            w.write_u8(start)?;
            w.write_u8(count)?;
        }
        for &(index, flag) in &data.rle {
            w.write_u8(index)?;
            w.write_u8(flag)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    #[test]
    fn test_normalize_shortfall_is_spread_evenly() {
        let (indices, weights, count) = normalize_influences(0, &[(1, 0.4), (2, 0.2)], 4).unwrap();
        assert_eq!(count, 2);
        assert_eq!(&indices[..2], &[1, 2]);
        assert!((weights[0] - 0.6).abs() < 1e-6);
        assert!((weights[1] - 0.4).abs() < 1e-6);
        assert_eq!(weights[2], 0.0);
    }

    #[test]
    fn test_normalize_excess_is_scaled() {
        let (_, weights, _) = normalize_influences(0, &[(0, 1.5), (1, 0.5)], 2).unwrap();
        assert!((weights[0] - 0.75).abs() < 1e-6);
        assert!((weights[1] - 0.25).abs() < 1e-6);
    }

    #[test]
    fn test_normalize_rejects_bad_input() {
        let five = [(0u8, 0.2f32); 5];
        assert!(matches!(
            normalize_influences(3, &five, 8),
            Err(Error::TooManyInfluences { vertex: 3, count: 5 })
        ));
        assert!(matches!(
            normalize_influences(1, &[(0, 0.0)], 8),
            Err(Error::UnweightedVertex { vertex: 1 })
        ));
        assert!(matches!(
            normalize_influences(0, &[(9, 1.0)], 8),
            Err(Error::UnresolvedIndex { index: 9, .. })
        ));
    }

    #[test]
    fn test_zero_weights_do_not_count_against_limit() {
        let influences: VertexInfluences = smallvec![(0, 0.5), (1, 0.0), (2, 0.5), (3, 0.0), (4, 0.0)];
        let (_, _, count) = normalize_influences(0, &influences, 8).unwrap();
        assert_eq!(count, 2);
    }

    fn legacy_skin() -> SkinPlugin {
        SkinPlugin {
            version: ChunkVersion::GTA3,
            used_bones: Vec::new(),
            max_weights_per_vertex: 1,
            vertex_bone_indices: vec![[0, 0, 0, 0], [1, 0, 0, 0]],
            vertex_weights: vec![[1.0, 0.0, 0.0, 0.0]; 2],
            inverse_bind_matrices: vec![Mat4::IDENTITY, Mat4::from_translation(glam::Vec3::X)],
            split_data: None,
        }
    }

    #[test]
    fn test_legacy_layout_roundtrip() {
        let skin = legacy_skin();
        let mut w = ChunkWriter::new();
        skin.write(&mut w).unwrap();
        // header + 4 + 2 * (4 + 16) + 2 * (4 + 64)
        assert_eq!(w.len(), 12 + 4 + 40 + 136);

        let ctx = ParseContext::default().within_geometry(2, false);
        let back = SkinPlugin::read(&mut ChunkReader::new(w.as_bytes()), ctx).unwrap();
        assert_eq!(back, skin);
    }

    #[test]
    fn test_split_tables_roundtrip() {
        let mut skin = legacy_skin();
        skin.version = ChunkVersion::SAN_ANDREAS;
        skin.used_bones = vec![0, 1];
        skin.split_data = Some(SkinSplitData {
            bone_limit: 64,
            bone_remap: vec![0, 1],
            splits: vec![(0, 2)],
            rle: vec![(0, 2)],
            empty_rle_count: 0,
        });
        let mut w = ChunkWriter::new();
        skin.write(&mut w).unwrap();

        let ctx = ParseContext::default().within_geometry(2, false);
        let back = SkinPlugin::read(&mut ChunkReader::new(w.as_bytes()), ctx).unwrap();
        assert_eq!(back, skin);
    }

    #[test]
    fn test_skin_needs_vertex_count() {
        let mut w = ChunkWriter::new();
        legacy_skin().write(&mut w).unwrap();
        let err = SkinPlugin::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }

    fn roundtrip(skin: &SkinPlugin) -> SkinPlugin {
        let mut w = ChunkWriter::new();
        skin.write(&mut w).unwrap();
        let ctx = ParseContext::default().within_geometry(skin.vertex_count(), false);
        SkinPlugin::read(&mut ChunkReader::new(w.as_bytes()), ctx).unwrap()
    }

    #[test]
    fn test_run_count_without_splits_is_kept() {
        let mut skin = legacy_skin();
        skin.version = ChunkVersion::SAN_ANDREAS;
        skin.used_bones = vec![0, 1];
        skin.split_data = Some(SkinSplitData {
            bone_limit: 0,
            empty_rle_count: 3,
            ..SkinSplitData::default()
        });
        let back = roundtrip(&skin);
        assert_eq!(back.split_data.as_ref().unwrap().empty_rle_count, 3);
        assert_eq!(back, skin);
    }

    #[test]
    fn test_empty_used_bones_keeps_current_layout() {
        let mut skin = legacy_skin();
        skin.version = ChunkVersion::SAN_ANDREAS;
        skin.split_data = Some(SkinSplitData::default());
        let back = roundtrip(&skin);
        assert!(!back.is_legacy_layout());
        assert_eq!(back, skin);

        // no vertices and no bones: only the split header follows
        skin.vertex_bone_indices.clear();
        skin.vertex_weights.clear();
        skin.inverse_bind_matrices.clear();
        skin.max_weights_per_vertex = 0;
        assert_eq!(roundtrip(&skin), skin);

        skin.split_data = None;
        let back = roundtrip(&skin);
        assert!(back.is_legacy_layout());
        assert_eq!(back, skin);
    }

    #[test]
    fn test_legacy_layout_rejects_used_bones() {
        let mut skin = legacy_skin();
        skin.used_bones = vec![0];
        let mut w = ChunkWriter::new();
        assert!(matches!(skin.write(&mut w), Err(Error::InvalidData { .. })));
    }

    fn single_bone_frames(root_offset: glam::Vec3, bone_offset: glam::Vec3) -> FrameList {
        use super::super::extension::Extension;
        use super::super::frame::Frame;
        use super::super::hanim::{node_flags, HAnimNode, HAnimPlugin};

        let v = ChunkVersion::SAN_ANDREAS;
        let mut frames = FrameList::new(v);
        frames
            .push_frame(
                Frame::with_transform(glam::Mat3::IDENTITY, root_offset, -1),
                Extension::new(v),
            )
            .unwrap();
        let mut ext = Extension::new(v);
        ext.push(HAnimPlugin::root(
            7,
            vec![HAnimNode { node_id: 7, index: 0, flags: node_flags::POP }],
            v,
        ));
        frames
            .push_frame(Frame::with_transform(glam::Mat3::IDENTITY, bone_offset, 0), ext)
            .unwrap();
        frames
    }

    #[test]
    fn test_identity_pose_binds_to_identity() {
        let frames = single_bone_frames(glam::Vec3::ZERO, glam::Vec3::ZERO);
        let influences: Vec<VertexInfluences> = vec![smallvec![(0, 1.0)]];
        let skin = SkinPlugin::bind(&frames, 0, &influences, ChunkVersion::SAN_ANDREAS).unwrap();
        assert_eq!(skin.inverse_bind_matrices, vec![Mat4::IDENTITY]);
    }

    #[test]
    fn test_inverse_bind_is_relative_to_root_frame() {
        // moving the whole model leaves the bind matrices unchanged
        let influences: Vec<VertexInfluences> = vec![smallvec![(0, 1.0)]];
        for root_offset in [glam::Vec3::ZERO, glam::Vec3::new(5.0, -2.0, 3.0)] {
            let frames = single_bone_frames(root_offset, glam::Vec3::new(0.0, 0.0, 2.0));
            let skin = SkinPlugin::bind(&frames, 0, &influences, ChunkVersion::SAN_ANDREAS).unwrap();
            let expected = Mat4::from_translation(glam::Vec3::new(0.0, 0.0, -2.0));
            assert!(skin.inverse_bind_matrices[0].abs_diff_eq(expected, 1e-6));
        }
    }

    #[test]
    fn test_bind_without_vertices_roundtrips() {
        let frames = single_bone_frames(glam::Vec3::ZERO, glam::Vec3::X);
        let skin = SkinPlugin::bind(&frames, 0, &[], ChunkVersion::SAN_ANDREAS).unwrap();
        assert!(skin.used_bones.is_empty());
        assert!(!skin.is_legacy_layout());
        assert_eq!(roundtrip(&skin), skin);
    }
}
