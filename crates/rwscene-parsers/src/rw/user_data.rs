// rwscene-parsers/src/rw/user_data.rs
//! User data plugin: named arrays of ints, floats or strings

use std::borrow::Cow;

use serde::{Serialize, Serializer};

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::writer::{narrow, ChunkWriter};

/// Values of one user data set
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", content = "values")]
pub enum UserDataValues {
    Int(Vec<i32>),
    Float(Vec<f32>),
    /// Zero-length strings are stored as absent
    String(Vec<Option<UserDataString>>),
}

impl UserDataValues {
    fn type_code(&self) -> u32 {
        match self {
            UserDataValues::Int(_) => 1,
            UserDataValues::Float(_) => 2,
            UserDataValues::String(_) => 3,
        }
    }

    /// Number of entries
    pub fn len(&self) -> usize {
        match self {
            UserDataValues::Int(v) => v.len(),
            UserDataValues::Float(v) => v.len(),
            UserDataValues::String(v) => v.len(),
        }
    }

    /// Whether there are no entries
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Length-prefixed string, stored bytes kept as read
///
/// The stored length normally counts a trailing NUL, but some exporters
/// leave it out; either form is written back unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserDataString(pub Vec<u8>);

impl UserDataString {
    /// Bytes before the first NUL
    pub fn as_bytes(&self) -> &[u8] {
        let end = self.0.iter().position(|&b| b == 0).unwrap_or(self.0.len());
        &self.0[..end]
    }

    /// Text for display; invalid UTF-8 is replaced
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(self.as_bytes())
    }
}

impl From<&str> for UserDataString {
    fn from(text: &str) -> Self {
        let mut bytes = Vec::with_capacity(text.len() + 1);
        bytes.extend_from_slice(text.as_bytes());
        bytes.push(0);
        Self(bytes)
    }
}

impl Serialize for UserDataString {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.text())
    }
}

/// One named array
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDataSet {
    /// Set name, `None` when stored with length 0
    pub name: Option<UserDataString>,
    /// Entries of one type
    pub values: UserDataValues,
}

/// User data plugin chunk
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UserDataPlugin {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Sets in stored order
    pub sets: Vec<UserDataSet>,
}

impl UserDataPlugin {
    /// Plugin with no sets
    pub fn new(version: ChunkVersion) -> Self {
        Self {
            version,
            sets: Vec::new(),
        }
    }

    /// First set called `name`
    pub fn set(&self, name: &str) -> Option<&UserDataSet> {
        self.sets
            .iter()
            .find(|s| s.name.as_ref().is_some_and(|n| n.as_bytes() == name.as_bytes()))
    }
}

/// Length-prefixed string; a length of 0 means absent
fn read_string(r: &mut ChunkReader<'_>) -> Result<Option<UserDataString>> {
    let len = r.read_count(1)?;
    if len == 0 {
        return Ok(None);
    }
    Ok(Some(UserDataString(r.read_bytes(len)?.to_vec())))
}

fn write_string(w: &mut ChunkWriter, text: Option<&UserDataString>) -> Result<()> {
    match text {
        None => w.write_i32(0),
        Some(text) => {
            let len: i32 = narrow("user data string length", text.0.len())?;
            w.write_i32(len)?;
            w.write_bytes(&text.0)
        }
    }
}

impl Chunk for UserDataPlugin {
    const TYPE: ChunkType = ChunkType::UserData;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, _ctx: ParseContext) -> Result<Self> {
        let set_count = r.read_count(12)?;
        let mut sets = Vec::with_capacity(set_count);
        for _ in 0..set_count {
            let name = read_string(r)?;
            let offset = r.offset();
            let type_code = r.read_u32()?;
            let values = match type_code {
                1 => {
                    let count = r.read_count(4)?;
                    UserDataValues::Int((0..count).map(|_| r.read_i32()).collect::<Result<_>>()?)
                }
                2 => {
                    let count = r.read_count(4)?;
                    UserDataValues::Float((0..count).map(|_| r.read_f32()).collect::<Result<_>>()?)
                }
                3 => {
                    let count = r.read_count(4)?;
                    UserDataValues::String((0..count).map(|_| read_string(r)).collect::<Result<_>>()?)
                }
                other => {
                    return Err(Error::invalid_data(format!(
                        "unknown user data type {other} at offset {offset}"
                    )))
                }
            };
            sets.push(UserDataSet { name, values });
        }
        Ok(Self {
            version: header.version,
            sets,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_count("user data set count", self.sets.len())?;
        for set in &self.sets {
            write_string(w, set.name.as_ref())?;
            w.write_u32(set.values.type_code())?;
            w.write_count("user data value count", set.values.len())?;
            match &set.values {
                UserDataValues::Int(values) => {
                    for v in values {
                        w.write_i32(*v)?;
                    }
                }
                UserDataValues::Float(values) => w.write_f32s(values)?,
                UserDataValues::String(values) => {
                    for v in values {
                        write_string(w, v.as_ref())?;
                    }
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip(plugin: &UserDataPlugin) -> (UserDataPlugin, usize) {
        let mut w = ChunkWriter::new();
        plugin.write(&mut w).unwrap();
        let back = UserDataPlugin::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap();
        (back, w.len())
    }

    #[test]
    fn test_all_value_types_roundtrip() {
        let mut plugin = UserDataPlugin::new(ChunkVersion::SAN_ANDREAS);
        plugin.sets.push(UserDataSet {
            name: Some("ids".into()),
            values: UserDataValues::Int(vec![1, -2, 3]),
        });
        plugin.sets.push(UserDataSet {
            name: None,
            values: UserDataValues::Float(vec![0.5]),
        });
        plugin.sets.push(UserDataSet {
            name: Some("tags".into()),
            values: UserDataValues::String(vec![Some("a".into()), None]),
        });
        let (back, _) = roundtrip(&plugin);
        assert_eq!(back, plugin);
        assert_eq!(back.set("tags").map(|s| s.values.len()), Some(2));
    }

    #[test]
    fn test_absent_name_is_zero_length() {
        let mut plugin = UserDataPlugin::new(ChunkVersion::SAN_ANDREAS);
        plugin.sets.push(UserDataSet {
            name: None,
            values: UserDataValues::Int(Vec::new()),
        });
        // header + set count + name len + type + value count
        let (_, len) = roundtrip(&plugin);
        assert_eq!(len, 12 + 16);
    }

    #[test]
    fn test_unterminated_and_non_utf8_strings_roundtrip() {
        let mut plugin = UserDataPlugin::new(ChunkVersion::SAN_ANDREAS);
        plugin.sets.push(UserDataSet {
            name: Some(UserDataString(b"abc".to_vec())),
            values: UserDataValues::String(vec![Some(UserDataString(vec![0x83, 0x65, 0]))]),
        });
        // header + set count + name (4 + 3) + type + value count + value (4 + 3)
        let (back, len) = roundtrip(&plugin);
        assert_eq!(len, 12 + 4 + 7 + 4 + 4 + 7);
        assert_eq!(back, plugin);
        assert!(back.set("abc").is_some());
        match &back.sets[0].values {
            UserDataValues::String(v) => assert_eq!(v[0].as_ref().map(|s| s.as_bytes()), Some(&[0x83, 0x65][..])),
            other => panic!("unexpected values {other:?}"),
        }
    }

    #[test]
    fn test_unknown_type_code_is_invalid() {
        let mut w = ChunkWriter::new();
        let mark = w.begin_chunk(ChunkType::UserData, ChunkVersion::SAN_ANDREAS).unwrap();
        w.write_i32(1).unwrap();
        w.write_i32(0).unwrap();
        w.write_u32(9).unwrap();
        w.write_i32(0).unwrap();
        w.end_chunk(mark).unwrap();
        let err = UserDataPlugin::read(&mut ChunkReader::new(w.as_bytes()), ParseContext::default()).unwrap_err();
        assert!(matches!(err, Error::InvalidData { .. }));
    }
}
