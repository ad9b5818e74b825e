//! Common types used across rwscene
//!
//! Small value types shared by the codec and the command-line tool.

use serde::{Deserialize, Serialize};

/// Library version stamp carried in every chunk header
///
/// The stamp is kept exactly as read so that re-serialization reproduces it.
/// Layout decisions are made on the unpacked `0x3xxxx` form.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChunkVersion(pub u32);

impl ChunkVersion {
    /// GTA San Andreas era stamp (3.6.0.3, build 0xFFFF)
    pub const SAN_ANDREAS: Self = Self(0x1803_FFFF);
    /// GTA Vice City era stamp (3.4.0.3, build 0x0310)
    pub const VICE_CITY: Self = Self(0x1003_0310);
    /// GTA III era stamp (pre-3.1 legacy encoding)
    pub const GTA3: Self = Self(0x0000_0310);

    /// Build a stamp from an unpacked version and a build number
    pub fn from_unpacked(version: u32, build: u16) -> Self {
        let major = version.wrapping_sub(0x30000) & 0x3FF00;
        Self((major << 14) | ((version & 0x3F) << 16) | u32::from(build))
    }

    /// Raw stamp as stored on disk
    pub fn raw(&self) -> u32 {
        self.0
    }

    /// Library version in `0x3xxxx` form
    pub fn unpacked(&self) -> u32 {
        if self.0 & 0xFFFF_0000 != 0 {
            (((self.0 >> 14) & 0x3FF00) + 0x30000) | ((self.0 >> 16) & 0x3F)
        } else {
            self.0 << 8
        }
    }

    /// Build number, when the stamp carries one
    pub fn build(&self) -> Option<u16> {
        if self.0 & 0xFFFF_0000 != 0 {
            Some((self.0 & 0xFFFF) as u16)
        } else {
            None
        }
    }
}

impl Default for ChunkVersion {
    fn default() -> Self {
        Self::SAN_ANDREAS
    }
}

impl std::fmt::Display for ChunkVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let v = self.unpacked();
        write!(
            f,
            "{}.{}.{}.{}",
            (v >> 16) & 0xF,
            (v >> 12) & 0xF,
            (v >> 8) & 0xF,
            v & 0xFF
        )?;
        if let Some(build) = self.build() {
            write!(f, " (build 0x{build:04X})")?;
        }
        Ok(())
    }
}

/// Color in RGBA format (0-255 per channel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rgba {
    /// Red channel
    pub r: u8,
    /// Green channel
    pub g: u8,
    /// Blue channel
    pub b: u8,
    /// Alpha channel, 255 is opaque
    pub a: u8,
}

impl Rgba {
    /// Opaque white, the default
    pub const WHITE: Self = Self { r: 255, g: 255, b: 255, a: 255 };
    /// Opaque black
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0, a: 255 };

    /// Color from its four channels
    pub fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    /// Channels in on-disk order
    pub fn to_bytes(self) -> [u8; 4] {
        [self.r, self.g, self.b, self.a]
    }

    /// Color from bytes stored in R, G, B, A order
    pub fn from_bytes(bytes: [u8; 4]) -> Self {
        Self::new(bytes[0], bytes[1], bytes[2], bytes[3])
    }
}

impl Default for Rgba {
    fn default() -> Self {
        Self::WHITE
    }
}

/// Axis-aligned bounding box
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    /// Smallest coordinate on each axis
    pub min: [f32; 3],
    /// Largest coordinate on each axis
    pub max: [f32; 3],
}

impl BoundingBox {
    /// Smallest box containing every point, or `None` for an empty set
    pub fn from_points<'a>(points: impl IntoIterator<Item = &'a [f32; 3]>) -> Option<Self> {
        let mut iter = points.into_iter();
        let first = *iter.next()?;
        let mut bbox = Self { min: first, max: first };
        for p in iter {
            bbox.expand(*p);
        }
        Some(bbox)
    }

    /// Midpoint of the box
    pub fn center(&self) -> [f32; 3] {
        [
            (self.min[0] + self.max[0]) / 2.0,
            (self.min[1] + self.max[1]) / 2.0,
            (self.min[2] + self.max[2]) / 2.0,
        ]
    }

    /// Grow the box to contain `point`
    pub fn expand(&mut self, point: [f32; 3]) {
        for axis in 0..3 {
            self.min[axis] = self.min[axis].min(point[axis]);
            self.max[axis] = self.max[axis].max(point[axis]);
        }
    }
}

/// Bounding sphere stored with every morph target
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingSphere {
    /// Sphere center
    pub center: [f32; 3],
    /// Sphere radius
    pub radius: f32,
}

impl BoundingSphere {
    /// Sphere centred on the box midpoint, reaching the farthest point
    pub fn enclosing(points: &[[f32; 3]]) -> Self {
        let Some(bbox) = BoundingBox::from_points(points) else {
            return Self::default();
        };
        let center = bbox.center();
        let radius = points
            .iter()
            .map(|p| {
                let d = [p[0] - center[0], p[1] - center[1], p[2] - center[2]];
                (d[0] * d[0] + d[1] * d[1] + d[2] * d[2]).sqrt()
            })
            .fold(0.0f32, f32::max);
        Self { center, radius }
    }
}
