//! Integration tests for the RenderWare codec
//!
//! These tests cover:
//! - Whole-clump round trips and byte-count preservation
//! - Storage/hierarchy index translation
//! - Skin binding and weight normalisation
//! - Material split construction in list and strip form
//! - Extension boundaries and nesting limits
//! - File-level parsing through `DffParser`

use std::io::Write;

use glam::{Mat3, Vec2, Vec3};
use smallvec::smallvec;

use rwscene_parsers::rw::geometry::flags;
use rwscene_parsers::rw::hanim::node_flags;
use rwscene_parsers::rw::node::Chunk;
use rwscene_parsers::rw::texture::TextureReference;
use rwscene_parsers::rw::user_data::{UserDataPlugin, UserDataSet, UserDataValues};
use rwscene_parsers::{
    Atomic, ChunkReader, ChunkType, ChunkVersion, ChunkWriter, Clump, DffParser, Error, Extension,
    Frame, FrameList, Geometry, HAnimNode, HAnimPlugin, Material, MaterialSplitList, Node,
    ParseContext, ParseOptions, Parser, RwStream, SkinPlugin, SplitEncoding, Triangle,
    UnknownChunk, VertexInfluences,
};

const V: ChunkVersion = ChunkVersion::SAN_ANDREAS;

/// Helper to create an extension holding one HAnim plugin
fn hanim_ext(plugin: HAnimPlugin) -> Extension {
    let mut ext = Extension::new(V);
    ext.push(plugin);
    ext
}

/// Helper to create the three-frame skeleton used throughout:
/// frame 0 is the clump root, frame 1 carries name id 500 and the node
/// table, frame 2 carries name id 501.
fn skeleton() -> FrameList {
    let mut frames = FrameList::new(V);
    frames.push_frame(Frame::new(-1), Extension::new(V)).unwrap();
    frames
        .push_frame(
            Frame::with_transform(Mat3::IDENTITY, Vec3::new(0.0, 0.0, 1.0), 0),
            hanim_ext(HAnimPlugin::root(
                500,
                vec![
                    HAnimNode { node_id: 500, index: 0, flags: node_flags::PUSH },
                    HAnimNode { node_id: 501, index: 1, flags: node_flags::POP },
                ],
                V,
            )),
        )
        .unwrap();
    frames
        .push_frame(
            Frame::with_transform(Mat3::IDENTITY, Vec3::new(0.0, 1.0, 0.0), 1),
            hanim_ext(HAnimPlugin::new(501, V)),
        )
        .unwrap();
    frames
}

/// Helper to create a textured quad with two materials
fn textured_quad() -> Geometry {
    let mut geometry = Geometry::from_mesh(
        V,
        vec![
            Vec3::new(0.0, 0.0, 0.0),
            Vec3::new(1.0, 0.0, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ],
        vec![Triangle::new(0, 1, 2, 0), Triangle::new(2, 1, 3, 1)],
    );
    geometry.format |= flags::TEXTURED | flags::NORMALS;
    geometry.uv_sets = vec![vec![Vec2::ZERO, Vec2::X, Vec2::Y, Vec2::ONE]];
    geometry.morph_targets[0].normals = Some(vec![Vec3::Z; 4]);
    geometry
        .material_list
        .push(Material::new(V).with_texture(TextureReference::new("body", "", V)));
    geometry.material_list.push(Material::new(V));
    geometry
}

/// Helper to create a complete skinned model
fn model() -> Clump {
    let mut clump = Clump::new(V);
    clump.frame_list = skeleton();
    clump.geometry_list.geometries.push(textured_quad());
    clump.atomics.push(Atomic::new(1, 0, V));

    let influences: Vec<VertexInfluences> = vec![
        smallvec![(0, 1.0)],
        smallvec![(0, 0.25), (1, 0.75)],
        smallvec![(1, 1.0)],
        smallvec![(1, 0.5)],
    ];
    clump.attach_skin(0, &influences).unwrap();
    clump.rebuild_material_splits(SplitEncoding::List).unwrap();

    let mut user_data = UserDataPlugin::new(V);
    user_data.sets.push(UserDataSet {
        name: Some("lod".into()),
        values: UserDataValues::Int(vec![2]),
    });
    clump.geometry_list.geometries[0].extension.push(user_data);
    clump
}

mod roundtrip_tests {
    use super::*;

    #[test]
    fn test_model_roundtrip_is_byte_identical() {
        let clump = model();
        let bytes = clump.to_bytes().unwrap();
        let back = Clump::from_bytes(&bytes).unwrap();
        assert_eq!(back, clump);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_node_factory_reads_whole_model() {
        let bytes = model().to_bytes().unwrap();
        let node = Node::from_bytes(&bytes).unwrap();
        assert_eq!(node.chunk_type(), ChunkType::Clump);
        assert_eq!(node.to_bytes().unwrap().len(), bytes.len());
    }

    #[test]
    fn test_unknown_plugins_survive() {
        let mut clump = model();
        let name = UnknownChunk {
            tag: ChunkType::NodeName.to_u32(),
            version: V,
            data: b"bip01\0\0\0".to_vec(),
        };
        clump.frame_list.extension_mut(1).unwrap().push(name);
        clump.extension.push(UnknownChunk {
            tag: 0x0253_F2F8,
            version: V,
            data: vec![1, 2, 3, 4, 5],
        });

        let bytes = clump.to_bytes().unwrap();
        let back = Clump::from_bytes(&bytes).unwrap();
        assert_eq!(back.frame_list.name(1).as_deref(), Some("bip01"));
        assert_eq!(back.extension.len(), 1);
        assert_eq!(back.to_bytes().unwrap(), bytes);
    }

    #[test]
    fn test_stream_roundtrip_through_writer() {
        let bytes = model().to_bytes().unwrap();
        let stream = RwStream::from_bytes(&bytes, ParseContext::default()).unwrap();
        let mut out = Vec::new();
        stream.clump().unwrap().write_to(&mut out).unwrap();
        assert_eq!(out, bytes);
    }

    #[test]
    fn test_truncated_model_fails() {
        let bytes = model().to_bytes().unwrap();
        for cut in [4, 12, 40, bytes.len() / 2, bytes.len() - 1] {
            let err = Clump::from_bytes(&bytes[..cut]).unwrap_err();
            assert!(err.is_parse_error(), "cut at {cut}: {err}");
        }
    }
}

mod hierarchy_tests {
    use super::*;

    #[test]
    fn test_name_id_scenario() {
        let frames = skeleton();
        assert_eq!(frames.storage_index_for_hierarchy_index(1), Some(2));
        assert_eq!(frames.storage_index_for_hierarchy_index(0), Some(1));
        assert_eq!(frames.hierarchy_index_for_storage_index(2), Some(1));
        assert_eq!(frames.hierarchy_index_for_storage_index(0), None);
        assert_eq!(frames.storage_index_for_hierarchy_index(2), None);
    }

    #[test]
    fn test_hierarchy_survives_roundtrip() {
        let bytes = model().to_bytes().unwrap();
        let clump = Clump::from_bytes(&bytes).unwrap();
        let frames = &clump.frame_list;
        assert_eq!(frames.hierarchy_root().map(|(i, _)| i), Some(1));
        assert_eq!(frames.depth_first_order(), vec![1, 2]);
        assert_eq!(frames.breadth_first_order(), vec![0, 1, 2]);
        assert_eq!(frames.children(1), &[2]);
    }

    #[test]
    fn test_world_matrices_compose_parents() {
        let frames = skeleton();
        let world = frames.world_matrix(2).unwrap();
        assert_eq!(world.w_axis.truncate(), Vec3::new(0.0, 1.0, 1.0));
        assert_eq!(frames.world_matrices()[2], world);
    }
}

mod skin_tests {
    use super::*;

    #[test]
    fn test_bind_normalises_and_inverts() {
        let clump = model();
        let skin = clump.geometry_for(0).unwrap().skin().unwrap();
        assert_eq!(skin.vertex_count(), 4);
        assert_eq!(skin.used_bones, vec![0, 1]);
        assert_eq!(skin.max_weights_per_vertex, 2);
        // The half weight on vertex 3 is topped up to one
        assert!((skin.vertex_weights[3][0] - 1.0).abs() < 1e-6);

        // Bone 1 sits at (0, 1, 0) relative to the drawing frame
        let bone = skin.inverse_bind_matrices[1];
        assert!((bone.w_axis.truncate() - Vec3::new(0.0, -1.0, 0.0)).length() < 1e-6);
    }

    #[test]
    fn test_bind_rejects_bad_influences() {
        let frames = skeleton();
        let five: VertexInfluences = (0..5).map(|_| (0u8, 0.2f32)).collect();
        assert!(matches!(
            SkinPlugin::bind(&frames, 1, &[five], V),
            Err(Error::TooManyInfluences { vertex: 0, count: 5 })
        ));
        let none: VertexInfluences = smallvec![(0, 0.0)];
        assert!(matches!(
            SkinPlugin::bind(&frames, 1, &[none], V),
            Err(Error::UnweightedVertex { vertex: 0 })
        ));
        let unknown_bone: VertexInfluences = smallvec![(7, 1.0)];
        let err = SkinPlugin::bind(&frames, 1, &[unknown_bone], V).unwrap_err();
        assert!(err.is_skin_error());
    }

    #[test]
    fn test_skin_requires_geometry_context() {
        let skin = model().geometry_for(0).unwrap().skin().unwrap().clone();
        let mut w = ChunkWriter::new();
        skin.write(&mut w).unwrap();
        let err = SkinPlugin::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }
}

mod split_tests {
    use super::*;

    #[test]
    fn test_two_material_scenario() {
        let triangles = [
            Triangle::new(0, 1, 2, 0),
            Triangle::new(2, 1, 3, 0),
            Triangle::new(3, 4, 5, 1),
        ];
        let split = MaterialSplitList::build(&triangles, 2, SplitEncoding::List, V);
        assert_eq!(split.len(), 2);
        assert_eq!(split.splits[0].indices.len(), 6);
        assert_eq!(split.splits[1].indices.len(), 3);
        assert_eq!(split.total_index_count(), 9);
    }

    #[test]
    fn test_out_of_range_materials_get_trailing_runs() {
        let triangles = [
            Triangle::new(0, 1, 2, 5),
            Triangle::new(0, 1, 2, -1),
            Triangle::new(0, 1, 2, 0),
        ];
        let split = MaterialSplitList::build(&triangles, 1, SplitEncoding::List, V);
        let materials: Vec<u32> = split.splits.iter().map(|s| s.material).collect();
        assert_eq!(materials, vec![0, u32::MAX, 5]);
    }

    #[test]
    fn test_restripped_model_roundtrips() {
        let mut clump = model();
        clump.rebuild_material_splits(SplitEncoding::Strip).unwrap();
        let geometry = clump.geometry_for(0).unwrap();
        assert!(geometry.has_flag(flags::TRISTRIP));
        assert_eq!(geometry.material_split().unwrap().encoding, SplitEncoding::Strip);

        let bytes = clump.to_bytes().unwrap();
        assert_eq!(Clump::from_bytes(&bytes).unwrap(), clump);
    }

    #[test]
    fn test_restrip_keeps_degenerate_triangles() {
        let mut clump = model();
        let geometry = &mut clump.geometry_list.geometries[0];
        geometry.triangles.push(Triangle::new(3, 3, 1, 0));
        geometry.rebuild_material_split(SplitEncoding::Strip).unwrap();
        assert!(!geometry.has_flag(flags::TRISTRIP));

        let split = geometry.material_split().unwrap();
        assert_eq!(split.encoding, SplitEncoding::List);
        assert!(split.triangles().contains(&(0, [3, 3, 1])));

        let bytes = clump.to_bytes().unwrap();
        assert_eq!(Clump::from_bytes(&bytes).unwrap(), clump);
    }
}

mod extension_tests {
    use super::*;

    fn raw_chunk(tag: u32, payload: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&tag.to_le_bytes());
        bytes.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        bytes.extend_from_slice(&V.raw().to_le_bytes());
        bytes.extend_from_slice(payload);
        bytes
    }

    #[test]
    fn test_zero_length_extension_is_empty() {
        let bytes = raw_chunk(0x03, &[]);
        let ext = Extension::read(&mut ChunkReader::new(&bytes), ParseContext::default()).unwrap();
        assert!(ext.is_empty());
    }

    #[test]
    fn test_child_overrunning_extension_fails() {
        // Child declares 8 bytes but only 4 remain inside the extension
        let mut child = raw_chunk(0x1234, &[0; 8]);
        child.truncate(12 + 4);
        let mut bytes = raw_chunk(0x03, &child);
        // Bytes after the extension must not be borrowed by the child
        bytes.extend_from_slice(&[0; 8]);
        let err = Extension::read(&mut ChunkReader::new(&bytes), ParseContext::default()).unwrap_err();
        assert!(matches!(err, Error::Truncated { .. }));
    }

    #[test]
    fn test_nesting_limit_applies_to_models() {
        let bytes = model().to_bytes().unwrap();
        let err = Clump::read(&mut ChunkReader::new(&bytes), ParseContext::new(3)).unwrap_err();
        assert!(matches!(err.root_cause(), Error::NestingTooDeep { limit: 3, .. }));
    }
}

mod parser_tests {
    use super::*;

    fn write_model(bytes: &[u8]) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(".dff").tempfile().unwrap();
        file.write_all(bytes).unwrap();
        file.flush().unwrap();
        file
    }

    #[test]
    fn test_parse_file() {
        let clump = model();
        let file = write_model(&clump.to_bytes().unwrap());
        let parser = DffParser::new();
        assert!(parser.can_parse(file.path()));
        assert_eq!(parser.parse_file(file.path()).unwrap(), clump);
    }

    #[test]
    fn test_can_parse_by_header() {
        let parser = DffParser::new();
        let mut clump_file = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        clump_file.write_all(&model().to_bytes().unwrap()).unwrap();
        clump_file.flush().unwrap();
        assert!(parser.can_parse(clump_file.path()));

        let mut other = tempfile::Builder::new().suffix(".bin").tempfile().unwrap();
        other.write_all(b"not a renderware stream").unwrap();
        other.flush().unwrap();
        assert!(!parser.can_parse(other.path()));
    }

    #[test]
    fn test_parse_memory_mapped() {
        let clump = model();
        let file = write_model(&clump.to_bytes().unwrap());
        let options = ParseOptions {
            memory_mapping_threshold: 0,
            ..Default::default()
        };
        let parsed = DffParser::new()
            .parse_file_with_options(file.path(), &options, None)
            .unwrap();
        assert_eq!(parsed, clump);
    }

    #[test]
    fn test_file_without_clump() {
        let mut w = ChunkWriter::new();
        Atomic::new(0, 0, V).write(&mut w).unwrap();
        let file = write_model(w.as_bytes());
        let err = DffParser::new().parse_file(file.path()).unwrap_err();
        assert!(matches!(err, Error::MissingField { .. }));
    }
}

// Property-based tests using proptest
mod proptest_tests {
    use super::*;
    use proptest::prelude::*;

    fn triangle() -> impl Strategy<Value = Triangle> {
        (0u16..8, 0u16..8, 0u16..8, -1i16..4)
            .prop_map(|(a, b, c, m)| Triangle::new(a, b, c, m))
    }

    fn position() -> impl Strategy<Value = Vec3> {
        (-100.0f32..100.0, -100.0f32..100.0, -100.0f32..100.0).prop_map(|(x, y, z)| Vec3::new(x, y, z))
    }

    /// Rotate so the smallest corner comes first, keeping winding
    fn canonical(t: [u32; 3]) -> [u32; 3] {
        let min = (0..3).min_by_key(|&i| t[i]).unwrap_or(0);
        [t[min], t[(min + 1) % 3], t[(min + 2) % 3]]
    }

    fn sorted_source(triangles: &[Triangle]) -> Vec<(u32, [u32; 3])> {
        let mut v: Vec<_> = triangles
            .iter()
            .map(|t| (i32::from(t.material) as u32, canonical(t.vertices.map(u32::from))))
            .collect();
        v.sort_unstable();
        v
    }

    proptest! {
        #[test]
        fn test_geometry_roundtrip(
            positions in prop::collection::vec(position(), 8),
            triangles in prop::collection::vec(triangle(), 0..24),
            uv_sets in 0usize..3,
        ) {
            let mut geometry = Geometry::from_mesh(V, positions, triangles);
            geometry.uv_sets = vec![vec![Vec2::new(0.5, 0.25); 8]; uv_sets];
            geometry.material_list.push(Material::new(V));
            geometry.rebuild_material_split(SplitEncoding::List).unwrap();

            let mut w = ChunkWriter::new();
            geometry.write(&mut w).unwrap();
            let node = Node::from_bytes(w.as_bytes()).unwrap();
            let bytes = node.to_bytes().unwrap();
            prop_assert_eq!(bytes.len(), w.len());
            prop_assert_eq!(&bytes[..], w.as_bytes());
        }

        #[test]
        fn test_split_completeness(
            triangles in prop::collection::vec(triangle(), 0..40),
            strip in any::<bool>(),
        ) {
            let encoding = if strip { SplitEncoding::Strip } else { SplitEncoding::List };
            let split = MaterialSplitList::build(&triangles, 2, encoding, V);

            let mut decoded: Vec<_> = split
                .triangles()
                .into_iter()
                .map(|(m, t)| (m, canonical(t)))
                .collect();
            decoded.sort_unstable();
            prop_assert_eq!(decoded, sorted_source(&triangles));

            let mut ids: Vec<i16> = triangles
                .iter()
                .map(|t| t.material)
                .filter(|m| !(0..2).contains(m))
                .collect();
            ids.sort_unstable();
            ids.dedup();
            prop_assert_eq!(split.len(), 2 + ids.len());
        }

        #[test]
        fn test_weights_sum_to_one(
            weights in prop::collection::vec(
                prop::collection::vec((0u8..2, 0.01f32..3.0), 1..=4),
                1..16,
            ),
        ) {
            let frames = skeleton();
            let influences: Vec<VertexInfluences> =
                weights.iter().map(|v| v.iter().copied().collect()).collect();
            let skin = SkinPlugin::bind(&frames, 1, &influences, V).unwrap();
            for vertex in &skin.vertex_weights {
                let sum: f32 = vertex.iter().sum();
                prop_assert!((sum - 1.0).abs() < 1e-5, "sum {}", sum);
            }
        }

        #[test]
        fn test_hierarchy_translation_is_two_sided(
            order in Just((0..6usize).collect::<Vec<_>>()).prop_shuffle(),
        ) {
            let mut frames = FrameList::new(V);
            frames.push_frame(Frame::new(-1), Extension::new(V)).unwrap();
            let nodes: Vec<HAnimNode> = order
                .iter()
                .enumerate()
                .map(|(h, &bone)| HAnimNode { node_id: 1000 + bone as i32, index: h as i32, flags: 0 })
                .collect();
            for bone in 0..order.len() {
                let id = 1000 + bone as i32;
                let plugin = if bone == 0 {
                    HAnimPlugin::root(id, nodes.clone(), V)
                } else {
                    HAnimPlugin::new(id, V)
                };
                frames.push_frame(Frame::new(0), hanim_ext(plugin)).unwrap();
            }

            for h in 0..order.len() {
                let storage = frames.storage_index_for_hierarchy_index(h);
                prop_assert_eq!(storage, Some(order[h] + 1));
                prop_assert_eq!(frames.hierarchy_index_for_storage_index(order[h] + 1), Some(h));
            }
            prop_assert_eq!(frames.hierarchy_index_for_storage_index(0), None);
            prop_assert_eq!(frames.storage_index_for_hierarchy_index(order.len()), None);
        }
    }
}
