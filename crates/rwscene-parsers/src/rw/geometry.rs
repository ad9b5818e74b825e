// rwscene-parsers/src/rw/geometry.rs
//! Geometry chunk: vertex data, triangles, morph targets and materials
//!
//! # Struct Layout
//! ```text
//! u32 format        flags (low 16 bits), uv set count (bits 16..24), native flag
//! i32 triangles, i32 vertices, i32 morph targets
//! [f32 ambient, specular, diffuse]            library < 3.4
//! -- non-native only --
//! [u8 rgba per vertex]                        PRELIT
//! f32 uv[2] per vertex, per uv set
//! (u16 v1, u16 v0, i16 material, u16 v2) per triangle
//! -- per morph target --
//! f32 sphere[4], u32 has_positions, u32 has_normals
//! [f32 position[3] per vertex] [f32 normal[3] per vertex]
//! ```
//! The Struct is followed by a MaterialList and an Extension. Children of the
//! Extension see the geometry's vertex count and native flag.

use glam::{Vec2, Vec3};
use serde::Serialize;
use tracing::debug;

use rwscene_core::{BoundingSphere, ChunkVersion, Error, Result, Rgba};

use super::chunk::{ChunkHeader, ChunkType};
use super::extension::Extension;
use super::material::MaterialList;
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::skin::SkinPlugin;
use super::split::{MaterialSplitList, SplitEncoding};
use super::writer::ChunkWriter;

/// Geometry format flags
pub mod flags {
    /// Material split is a triangle strip
    pub const TRISTRIP: u32 = 0x0000_0001;
    /// Morph targets carry positions
    pub const POSITIONS: u32 = 0x0000_0002;
    /// One UV set
    pub const TEXTURED: u32 = 0x0000_0004;
    /// Per-vertex prelight colors
    pub const PRELIT: u32 = 0x0000_0008;
    /// Morph targets carry normals
    pub const NORMALS: u32 = 0x0000_0010;
    /// Geometry is lit
    pub const LIGHT: u32 = 0x0000_0020;
    /// Material color tints the geometry
    pub const MODULATE_MATERIAL_COLOR: u32 = 0x0000_0040;
    /// Two or more UV sets
    pub const TEXTURED2: u32 = 0x0000_0080;
    /// Vertex data lives in a platform-specific plugin
    pub const NATIVE: u32 = 0x0100_0000;
}

/// Library versions below this carry surface lighting in the geometry struct
const SURFACE_PROPERTIES_BEFORE: u32 = 0x34000;

/// Maximum number of uv sets
pub const MAX_UV_SETS: usize = 8;

/// Triangle with its material id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct Triangle {
    /// Corner vertex indices, in winding order
    pub vertices: [u16; 3],
    /// Material index; out-of-range values act as sentinels
    pub material: i16,
}

impl Triangle {
    /// Triangle with corners `a`, `b`, `c`
    pub fn new(a: u16, b: u16, c: u16, material: i16) -> Self {
        Self {
            vertices: [a, b, c],
            material,
        }
    }

    /// Whether two corners share a vertex
    pub fn is_degenerate(&self) -> bool {
        let [a, b, c] = self.vertices;
        a == b || b == c || a == c
    }
}

/// One morph target (keyframe) of vertex positions and normals
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct MorphTarget {
    /// Bounding sphere of the positions
    pub bounding_sphere: BoundingSphere,
    /// Vertex positions
    pub positions: Option<Vec<Vec3>>,
    /// Vertex normals
    pub normals: Option<Vec<Vec3>>,
}

impl MorphTarget {
    /// Midpoint-of-extents sphere around the positions
    pub fn compute_bounding_sphere(&self) -> BoundingSphere {
        let points: Vec<[f32; 3]> = self
            .positions
            .iter()
            .flatten()
            .map(|p| p.to_array())
            .collect();
        BoundingSphere::enclosing(&points)
    }
}

/// Ambient, specular and diffuse coefficients of pre-3.4 geometry
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SurfaceProperties {
    /// Ambient coefficient
    pub ambient: f32,
    /// Specular coefficient
    pub specular: f32,
    /// Diffuse coefficient
    pub diffuse: f32,
}

impl Default for SurfaceProperties {
    fn default() -> Self {
        Self {
            ambient: 1.0,
            specular: 1.0,
            diffuse: 1.0,
        }
    }
}

/// Geometry chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Geometry {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Raw format word; uv count bits are refreshed from `uv_sets` on write
    pub format: u32,
    /// Vertex count
    pub vertex_count: usize,
    /// Triangle count of native geometry, whose triangles are not stored here
    pub native_triangle_count: usize,
    /// Surface lighting, present before library 3.4
    pub surface: Option<SurfaceProperties>,
    /// Prelit vertex colors
    pub prelit: Vec<Rgba>,
    /// Texture coordinate sets
    pub uv_sets: Vec<Vec<Vec2>>,
    /// Triangles
    pub triangles: Vec<Triangle>,
    /// Morph targets; the first one is the base mesh
    pub morph_targets: Vec<MorphTarget>,
    /// Materials referenced by triangle material ids
    pub material_list: MaterialList,
    /// Plugins
    pub extension: Extension,
}

impl Geometry {
    /// Empty, non-native geometry
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            format: flags::POSITIONS,
            vertex_count: 0,
            native_triangle_count: 0,
            surface: (version.unpacked() < SURFACE_PROPERTIES_BEFORE).then(SurfaceProperties::default),
            prelit: Vec::new(),
            uv_sets: Vec::new(),
            triangles: Vec::new(),
            morph_targets: vec![MorphTarget::default()],
            material_list: MaterialList::new(version),
            extension: Extension::new(version),
        }
    }

    /// Non-native geometry from positions and triangles
    pub fn from_mesh(version: ChunkVersion, positions: Vec<Vec3>, triangles: Vec<Triangle>) -> Self {
        let mut geometry = Self::new(version);
        geometry.vertex_count = positions.len();
        geometry.triangles = triangles;
        geometry.morph_targets = vec![MorphTarget {
            bounding_sphere: BoundingSphere::default(),
            positions: Some(positions),
            normals: None,
        }];
        geometry.recompute_bounds();
        geometry
    }

    /// Whether every bit of `flag` is set in `format`
    pub fn has_flag(&self, flag: u32) -> bool {
        self.format & flag != 0
    }

    /// Whether vertex data lives in a platform native chunk
    pub fn is_native(&self) -> bool {
        self.has_flag(flags::NATIVE)
    }

    /// Number of uv sets the format word declares
    pub fn declared_uv_sets(format: u32) -> usize {
        let explicit = ((format >> 16) & 0xFF) as usize;
        if explicit != 0 {
            explicit
        } else if format & flags::TEXTURED2 != 0 {
            2
        } else if format & flags::TEXTURED != 0 {
            1
        } else {
            0
        }
    }

    /// Format word with the uv count and prelit bits matching the data
    fn encoded_format(&self) -> u32 {
        let mut format = self.format;
        if !self.is_native() {
            let uv_count = self.uv_sets.len();
            if Self::declared_uv_sets(format) != uv_count {
                format &= !(0x00FF_0000 | flags::TEXTURED | flags::TEXTURED2);
                format |= (uv_count as u32 & 0xFF) << 16;
                match uv_count {
                    0 => {}
                    1 => format |= flags::TEXTURED,
                    _ => format |= flags::TEXTURED2,
                }
            }
            if self.prelit.is_empty() {
                format &= !flags::PRELIT;
            } else {
                format |= flags::PRELIT;
            }
        }
        format
    }

    /// Triangle count written to the struct
    pub fn triangle_count(&self) -> usize {
        if self.is_native() {
            self.native_triangle_count
        } else {
            self.triangles.len()
        }
    }

    /// Base mesh positions
    pub fn positions(&self) -> Option<&[Vec3]> {
        self.morph_targets.first()?.positions.as_deref()
    }

    /// Sphere around the base mesh positions
    pub fn compute_bounding_sphere(&self) -> BoundingSphere {
        self.morph_targets
            .first()
            .map(MorphTarget::compute_bounding_sphere)
            .unwrap_or_default()
    }

    /// Refresh the stored sphere of every morph target
    pub fn recompute_bounds(&mut self) {
        for target in &mut self.morph_targets {
            target.bounding_sphere = target.compute_bounding_sphere();
        }
    }

    /// Skin plugin from the extension
    pub fn skin(&self) -> Option<&SkinPlugin> {
        self.extension.find::<SkinPlugin>()
    }

    /// Material split plugin from the extension
    pub fn material_split(&self) -> Option<&MaterialSplitList> {
        self.extension.find::<MaterialSplitList>()
    }

    /// Replace the material split with one derived from the triangles
    pub fn rebuild_material_split(&mut self, encoding: SplitEncoding) -> Result<()> {
        if self.is_native() {
            return Err(Error::invalid_data(
                "cannot rebuild the material split of native geometry",
            ));
        }
        let split = MaterialSplitList::build(
            &self.triangles,
            self.material_list.len(),
            encoding,
            self.version,
        );
        match split.encoding {
            SplitEncoding::Strip => self.format |= flags::TRISTRIP,
            SplitEncoding::List => self.format &= !flags::TRISTRIP,
        }
        self.extension.replace_or_push(split);
        Ok(())
    }

    fn check_vertex_array(&self, what: &str, len: usize) -> Result<()> {
        if len != self.vertex_count {
            return Err(Error::invalid_data(format!(
                "geometry has {} vertices but {len} {what}",
                self.vertex_count
            )));
        }
        Ok(())
    }
}

impl Chunk for Geometry {
    const TYPE: ChunkType = ChunkType::Geometry;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let format = s.read_u32()?;
        let native = format & flags::NATIVE != 0;
        let triangle_count = s.read_count(if native { 0 } else { 8 })?;
        let vertex_count = s.read_count(0)?;
        let morph_count = s.read_count(24)?;

        let surface = if header.version.unpacked() < SURFACE_PROPERTIES_BEFORE {
            Some(SurfaceProperties {
                ambient: s.read_f32()?,
                specular: s.read_f32()?,
                diffuse: s.read_f32()?,
            })
        } else {
            None
        };

        let mut prelit = Vec::new();
        let mut uv_sets = Vec::new();
        let mut triangles = Vec::new();
        if !native {
            if format & flags::PRELIT != 0 {
                s.check_fits(vertex_count, 4)?;
                prelit.reserve(vertex_count);
                for _ in 0..vertex_count {
                    prelit.push(Rgba::from_bytes(s.read_array::<4>()?));
                }
            }

            let uv_count = Self::declared_uv_sets(format);
            if uv_count > MAX_UV_SETS {
                return Err(Error::invalid_data(format!("geometry declares {uv_count} uv sets")));
            }
            for _ in 0..uv_count {
                s.check_fits(vertex_count, 8)?;
                let mut set = Vec::with_capacity(vertex_count);
                for _ in 0..vertex_count {
                    set.push(s.read_vec2()?);
                }
                uv_sets.push(set);
            }

            triangles.reserve(triangle_count);
            for _ in 0..triangle_count {
                let v1 = s.read_u16()?;
                let v0 = s.read_u16()?;
                let material = s.read_i16()?;
                let v2 = s.read_u16()?;
                triangles.push(Triangle::new(v0, v1, v2, material));
            }
        }

        let mut morph_targets = Vec::with_capacity(morph_count);
        for _ in 0..morph_count {
            let sphere = s.read_f32s::<4>()?;
            let has_positions = s.read_u32()? != 0;
            let has_normals = s.read_u32()? != 0;
            let mut read_vectors = |present: bool| -> Result<Option<Vec<Vec3>>> {
                if !present {
                    return Ok(None);
                }
                s.check_fits(vertex_count, 12)?;
                (0..vertex_count).map(|_| s.read_vec3()).collect::<Result<Vec<_>>>().map(Some)
            };
            let positions = read_vectors(has_positions)?;
            let normals = read_vectors(has_normals)?;
            morph_targets.push(MorphTarget {
                bounding_sphere: BoundingSphere {
                    center: [sphere[0], sphere[1], sphere[2]],
                    radius: sphere[3],
                },
                positions,
                normals,
            });
        }
        s.finish(&struct_header)?;

        let material_list = MaterialList::read(r, ctx)?;
        let extension = Extension::read(r, ctx.within_geometry(vertex_count, native))?;

        debug!(
            vertices = vertex_count,
            triangles = triangle_count,
            materials = material_list.len(),
            native,
            "parsed geometry"
        );

        Ok(Self {
            version: header.version,
            format,
            vertex_count,
            native_triangle_count: if native { triangle_count } else { 0 },
            surface,
            prelit,
            uv_sets,
            triangles,
            morph_targets,
            material_list,
            extension,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        let native = self.is_native();
        if !native {
            if !self.prelit.is_empty() {
                self.check_vertex_array("prelit colors", self.prelit.len())?;
            }
            for set in &self.uv_sets {
                self.check_vertex_array("texture coordinates", set.len())?;
            }
        }
        for target in &self.morph_targets {
            for array in [&target.positions, &target.normals].into_iter().flatten() {
                self.check_vertex_array("morph target vectors", array.len())?;
            }
        }
        if self.uv_sets.len() > MAX_UV_SETS {
            return Err(Error::out_of_range("uv set count", self.uv_sets.len()));
        }

        w.write_struct(self.version, |w| {
            w.write_u32(self.encoded_format())?;
            w.write_count("triangle count", self.triangle_count())?;
            w.write_count("vertex count", self.vertex_count)?;
            w.write_count("morph target count", self.morph_targets.len())?;

            if self.version.unpacked() < SURFACE_PROPERTIES_BEFORE {
                let surface = self.surface.unwrap_or_default();
                w.write_f32(surface.ambient)?;
                w.write_f32(surface.specular)?;
                w.write_f32(surface.diffuse)?;
            }

            if !native {
                for color in &self.prelit {
                    w.write_bytes(&color.to_bytes())?;
                }
                for set in &self.uv_sets {
                    for uv in set {
                        w.write_vec2(*uv)?;
                    }
                }
                for tri in &self.triangles {
                    let [v0, v1, v2] = tri.vertices;
                    w.write_u16(v1)?;
                    w.write_u16(v0)?;
                    w.write_i16(tri.material)?;
                    w.write_u16(v2)?;
                }
            }

            for target in &self.morph_targets {
                let sphere = target.bounding_sphere;
                w.write_f32s(&sphere.center)?;
                w.write_f32(sphere.radius)?;
                w.write_u32(u32::from(target.positions.is_some()))?;
                w.write_u32(u32::from(target.normals.is_some()))?;
                for array in [&target.positions, &target.normals].into_iter().flatten() {
                    for v in array {
                        w.write_vec3(*v)?;
                    }
                }
            }
            Ok(())
        })?;

        self.material_list.write(w)?;
        self.extension.write(w)
    }
}
