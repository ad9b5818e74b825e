// rwscene-parsers/src/rw/material.rs
//! Material and MaterialList chunks

use std::borrow::Cow;

use serde::Serialize;
use tracing::debug;

use rwscene_core::{ChunkVersion, Error, Result, Rgba};

use super::chunk::{ChunkHeader, ChunkType};
use super::extension::Extension;
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::texture::TextureReference;
use super::writer::ChunkWriter;

/// Library versions above this carry surface lighting in the material struct
const SURFACE_PROPERTIES_AFTER: u32 = 0x30400;

/// Material chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Material {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Unused by every known runtime, preserved as read
    pub flags: u32,
    /// Material color
    pub color: Rgba,
    /// Unused field, preserved as read
    pub unused: i32,
    /// Ambient, specular, diffuse
    pub surface: Option<[f32; 3]>,
    /// Diffuse texture, if any
    pub texture: Option<TextureReference>,
    /// Material plugins (effects, reflection, specular)
    pub extension: Extension,
}

impl Material {
    /// Untextured white material
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            flags: 0,
            color: Rgba::WHITE,
            unused: 0,
            surface: (version.unpacked() > SURFACE_PROPERTIES_AFTER).then_some([1.0, 1.0, 1.0]),
            texture: None,
            extension: Extension::new(version),
        }
    }

    /// Attach a texture reference
    pub fn with_texture(mut self, texture: TextureReference) -> Self {
        self.texture = Some(texture);
        self
    }

    /// Texture name for display
    pub fn texture_name(&self) -> Option<Cow<'_, str>> {
        self.texture.as_ref().map(|t| t.name.text())
    }
}

impl Chunk for Material {
    const TYPE: ChunkType = ChunkType::Material;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let flags = s.read_u32()?;
        let color = Rgba::from_bytes(s.read_array::<4>()?);
        let unused = s.read_i32()?;
        let textured = s.read_u32()? != 0;
        let surface = if header.version.unpacked() > SURFACE_PROPERTIES_AFTER {
            Some(s.read_f32s::<3>()?)
        } else {
            None
        };
        s.finish(&struct_header)?;

        let texture = if textured {
            Some(TextureReference::read(r, ctx)?)
        } else {
            None
        };
        let extension = Extension::read(r, ctx)?;

        Ok(Self {
            version: header.version,
            flags,
            color,
            unused,
            surface,
            texture,
            extension,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| {
            w.write_u32(self.flags)?;
            w.write_bytes(&self.color.to_bytes())?;
            w.write_i32(self.unused)?;
            w.write_u32(u32::from(self.texture.is_some()))?;
            if self.version.unpacked() > SURFACE_PROPERTIES_AFTER {
                w.write_f32s(&self.surface.unwrap_or([1.0, 1.0, 1.0]))?;
            }
            Ok(())
        })?;
        if let Some(texture) = &self.texture {
            texture.write(w)?;
        }
        self.extension.write(w)
    }
}

/// Entry of a material list
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum MaterialSlot {
    /// Material stored in the list
    Owned(Material),
    /// Reuse of an earlier slot
    Instance(u32),
}

/// MaterialList chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialList {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Owned materials and instance slots, in stored order
    pub slots: Vec<MaterialSlot>,
}

impl MaterialList {
    /// Empty list
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            slots: Vec::new(),
        }
    }

    /// Number of slots
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether there are no slots
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Append an owned material
    pub fn push(&mut self, material: Material) {
        self.slots.push(MaterialSlot::Owned(material));
    }

    /// Material used by slot `index`, following instances
    pub fn material(&self, index: usize) -> Option<&Material> {
        let mut current = index;
        // Instances only point backwards, so this terminates within len steps
        for _ in 0..=self.slots.len() {
            match self.slots.get(current)? {
                MaterialSlot::Owned(material) => return Some(material),
                MaterialSlot::Instance(target) if (*target as usize) < current => {
                    current = *target as usize;
                }
                MaterialSlot::Instance(_) => return None,
            }
        }
        None
    }

    /// Materials stored in the list, in order
    pub fn owned(&self) -> impl Iterator<Item = &Material> {
        self.slots.iter().filter_map(|slot| match slot {
            MaterialSlot::Owned(material) => Some(material),
            MaterialSlot::Instance(_) => None,
        })
    }
}

impl Chunk for MaterialList {
    const TYPE: ChunkType = ChunkType::MaterialList;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let (struct_header, mut s) = r.enter(ChunkType::Struct)?;
        let count = s.read_count(4)?;
        let mut indices = Vec::with_capacity(count);
        for _ in 0..count {
            indices.push(s.read_i32()?);
        }
        s.finish(&struct_header)?;

        let mut slots = Vec::with_capacity(count);
        for (position, index) in indices.into_iter().enumerate() {
            let slot = match index {
                -1 => MaterialSlot::Owned(Material::read(r, ctx)?),
                i if i >= 0 && (i as usize) < position => MaterialSlot::Instance(i as u32),
                i => {
                    return Err(Error::UnresolvedIndex {
                        space: "material instance",
                        index: i64::from(i),
                    })
                }
            };
            slots.push(slot);
        }
        debug!(materials = slots.len(), "parsed material list");

        Ok(Self {
            version: header.version,
            slots,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_struct(self.version, |w| {
            w.write_count("material count", self.slots.len())?;
            for (position, slot) in self.slots.iter().enumerate() {
                match slot {
                    MaterialSlot::Owned(_) => w.write_i32(-1)?,
                    MaterialSlot::Instance(target) if (*target as usize) < position => {
                        w.write_i32(*target as i32)?
                    }
                    MaterialSlot::Instance(target) => {
                        return Err(Error::UnresolvedIndex {
                            space: "material instance",
                            index: i64::from(*target),
                        })
                    }
                }
            }
            Ok(())
        })?;
        for material in self.owned() {
            material.write(w)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_material_roundtrip_with_texture() {
        let mut material = Material::new(ChunkVersion::SAN_ANDREAS);
        material.color = Rgba::new(10, 20, 30, 255);
        let material = material.with_texture(TextureReference::new("body", "", ChunkVersion::SAN_ANDREAS));

        let mut w = ChunkWriter::new();
        material.write(&mut w).unwrap();
        let back = Material::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap();
        assert_eq!(back, material);
        assert_eq!(back.texture_name().as_deref(), Some("body"));
    }

    #[test]
    fn test_old_material_has_no_surface_properties() {
        let material = Material::new(ChunkVersion::from_unpacked(0x30400, 0));
        assert_eq!(material.surface, None);
        let mut w = ChunkWriter::new();
        material.write(&mut w).unwrap();
        // Material header + Struct header + 16 byte struct + empty Extension
        assert_eq!(w.len(), 12 + 12 + 16 + 12);
    }

    #[test]
    fn test_instanced_slots() {
        let mut list = MaterialList::new(ChunkVersion::SAN_ANDREAS);
        list.push(Material::new(ChunkVersion::SAN_ANDREAS));
        list.slots.push(MaterialSlot::Instance(0));

        let mut w = ChunkWriter::new();
        list.write(&mut w).unwrap();
        let back = MaterialList::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap();
        assert_eq!(back, list);
        assert_eq!(back.material(1), back.material(0));
        assert!(back.material(2).is_none());
    }

    #[test]
    fn test_forward_instance_is_rejected() {
        let mut list = MaterialList::new(ChunkVersion::SAN_ANDREAS);
        list.slots.push(MaterialSlot::Instance(1));
        list.push(Material::new(ChunkVersion::SAN_ANDREAS));
        let mut w = ChunkWriter::new();
        assert!(matches!(list.write(&mut w), Err(Error::UnresolvedIndex { .. })));
    }
}
