// rwscene-parsers/src/rw/split.rs
//! Material split (bin mesh) plugin and the strip builder
//!
//! A material split partitions a geometry's triangles into one index run per
//! material, either as a plain triangle list or as a single triangle strip
//! per material with degenerate bridges between sub-strips.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use rwscene_core::{ChunkVersion, Error, Result};

use super::chunk::{ChunkHeader, ChunkType};
use super::geometry::Triangle;
use super::node::Chunk;
use super::reader::{ChunkReader, ParseContext};
use super::writer::{narrow, ChunkWriter};

/// How the indices of each run are laid out
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SplitEncoding {
    /// Three indices per triangle
    #[default]
    List,
    /// One triangle strip per run
    Strip,
}

impl SplitEncoding {
    fn from_flags(flags: u32) -> Result<Self> {
        match flags {
            0 => Ok(SplitEncoding::List),
            1 => Ok(SplitEncoding::Strip),
            other => Err(Error::invalid_data(format!("unknown material split flags {other}"))),
        }
    }

    fn to_flags(self) -> u32 {
        match self {
            SplitEncoding::List => 0,
            SplitEncoding::Strip => 1,
        }
    }
}

/// Index run for one material
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialSplit {
    /// Material index (sentinel ids keep their two's-complement value)
    pub material: u32,
    /// Index count; only authoritative for native geometry, where `indices` is empty
    pub index_count: u32,
    /// Vertex indices
    pub indices: Vec<u32>,
}

impl MaterialSplit {
    fn new(material: u32, indices: Vec<u32>) -> Self {
        Self {
            material,
            index_count: indices.len() as u32,
            indices,
        }
    }

    /// Triangles described by this run
    ///
    /// Strip runs skip degenerate triangles; odd strip triangles have their
    /// first two corners swapped so every triangle keeps its winding.
    pub fn triangles(&self, encoding: SplitEncoding) -> Vec<[u32; 3]> {
        match encoding {
            SplitEncoding::List => self
                .indices
                .chunks_exact(3)
                .map(|c| [c[0], c[1], c[2]])
                .collect(),
            SplitEncoding::Strip => decode_strip(&self.indices),
        }
    }
}

/// Material split plugin chunk
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MaterialSplitList {
    /// Library version stamp
    pub version: ChunkVersion,
    /// Index layout of every run
    pub encoding: SplitEncoding,
    /// Runs in material order
    pub splits: Vec<MaterialSplit>,
    /// Indices live in platform data and are not stored here
    pub native: bool,
}

impl MaterialSplitList {
    /// Partition `triangles` into per-material runs
    ///
    /// Runs `0..material_count` come first, in order, and may be empty. Any
    /// triangle whose material id falls outside that range gets a run of its
    /// own, appended in ascending id order.
    ///
    /// A strip cannot carry degenerate triangles, since decoding drops them
    /// with the bridges. When any are present the split is built as a list
    /// instead; check [`MaterialSplitList::encoding`] on the result.
    pub fn build(
        triangles: &[Triangle],
        material_count: usize,
        encoding: SplitEncoding,
        version: ChunkVersion,
    ) -> Self {
        let degenerate = triangles.iter().filter(|t| t.is_degenerate()).count();
        let encoding = if encoding == SplitEncoding::Strip && degenerate > 0 {
            warn!(degenerate, "degenerate triangles present, building a list split");
            SplitEncoding::List
        } else {
            encoding
        };

        let mut groups: BTreeMap<i16, Vec<[u32; 3]>> = BTreeMap::new();
        for tri in triangles {
            groups
                .entry(tri.material)
                .or_default()
                .push(tri.vertices.map(u32::from));
        }

        let encode = |tris: &[[u32; 3]]| match encoding {
            SplitEncoding::List => tris.iter().flatten().copied().collect(),
            SplitEncoding::Strip => build_strip(tris),
        };

        let mut splits = Vec::with_capacity(material_count.max(groups.len()));
        for material in 0..material_count {
            let indices = i16::try_from(material)
                .ok()
                .and_then(|id| groups.remove(&id))
                .map_or_else(Vec::new, |tris| encode(&tris));
            splits.push(MaterialSplit::new(material as u32, indices));
        }
        for (id, tris) in groups {
            splits.push(MaterialSplit::new(i32::from(id) as u32, encode(&tris)));
        }

        debug!(
            triangles = triangles.len(),
            runs = splits.len(),
            ?encoding,
            "built material split"
        );

        Self {
            version,
            encoding,
            splits,
            native: false,
        }
    }

    /// Number of runs
    pub fn len(&self) -> usize {
        self.splits.len()
    }

    /// Whether there are no runs
    pub fn is_empty(&self) -> bool {
        self.splits.is_empty()
    }

    /// Sum of the index counts of every run
    pub fn total_index_count(&self) -> usize {
        self.splits.iter().map(|s| self.run_len(s)).sum()
    }

    fn run_len(&self, split: &MaterialSplit) -> usize {
        if self.native {
            split.index_count as usize
        } else {
            split.indices.len()
        }
    }

    /// Every triangle of every run, paired with the run's material
    pub fn triangles(&self) -> Vec<(u32, [u32; 3])> {
        self.splits
            .iter()
            .flat_map(|s| s.triangles(self.encoding).into_iter().map(move |t| (s.material, t)))
            .collect()
    }
}

impl Chunk for MaterialSplitList {
    const TYPE: ChunkType = ChunkType::BinMesh;

    fn version(&self) -> ChunkVersion {
        self.version
    }

    fn read_body(r: &mut ChunkReader<'_>, header: &ChunkHeader, ctx: ParseContext) -> Result<Self> {
        let encoding = SplitEncoding::from_flags(r.read_u32()?)?;
        let split_count = r.read_u32()? as usize;
        let total_offset = r.offset();
        let total = r.read_u32()? as usize;
        r.check_fits(split_count, 8)?;

        let mut splits = Vec::with_capacity(split_count);
        let mut seen = 0usize;
        for _ in 0..split_count {
            let index_count = r.read_u32()?;
            let material = r.read_u32()?;
            let indices = if ctx.native {
                Vec::new()
            } else {
                let count = index_count as usize;
                r.check_fits(count, 4)?;
                (0..count).map(|_| r.read_u32()).collect::<Result<Vec<_>>>()?
            };
            seen += index_count as usize;
            splits.push(MaterialSplit {
                material,
                index_count,
                indices,
            });
        }
        if seen != total {
            return Err(Error::invalid_data(format!(
                "material split total at offset {total_offset} is {total}, runs hold {seen}"
            )));
        }

        Ok(Self {
            version: header.version,
            encoding,
            splits,
            native: ctx.native,
        })
    }

    fn write_body(&self, w: &mut ChunkWriter) -> Result<()> {
        w.write_u32(self.encoding.to_flags())?;
        w.write_u32(narrow("material split count", self.splits.len())?)?;
        w.write_u32(narrow("material split index total", self.total_index_count())?)?;
        for split in &self.splits {
            w.write_u32(narrow("material split index count", self.run_len(split))?)?;
            w.write_u32(split.material)?;
            if !self.native {
                for &index in &split.indices {
                    w.write_u32(index)?;
                }
            }
        }
        Ok(())
    }
}

// ==================== Strips ====================

/// Greedy strip builder
///
/// Each sub-strip starts from the first unused triangle and grows while some
/// unused triangle shares the directed edge the next strip position needs.
/// Sub-strips are joined with degenerate bridges that keep every sub-strip
/// starting on an even position, so winding is preserved throughout.
/// Input triangles must not be degenerate themselves.
pub fn build_strip(triangles: &[[u32; 3]]) -> Vec<u32> {
    let mut by_edge: HashMap<(u32, u32), Vec<usize>> = HashMap::new();
    for (index, &[a, b, c]) in triangles.iter().enumerate() {
        for edge in [(a, b), (b, c), (c, a)] {
            by_edge.entry(edge).or_default().push(index);
        }
    }

    let mut used = vec![false; triangles.len()];
    let mut strip: Vec<u32> = Vec::with_capacity(triangles.len() * 3);

    for start in 0..triangles.len() {
        if used[start] {
            continue;
        }
        used[start] = true;
        let mut current = triangles[start].to_vec();

        loop {
            let n = current.len();
            let (p, q) = (current[n - 2], current[n - 1]);
            // Strip triangle k = n - 2 is (p, q, x) when k is even and (q, p, x) when odd
            let edge = if (n - 2) % 2 == 0 { (p, q) } else { (q, p) };
            let next = by_edge
                .get(&edge)
                .and_then(|candidates| candidates.iter().copied().find(|&t| !used[t]));
            let Some(t) = next else { break };
            used[t] = true;
            current.push(third_vertex(triangles[t], edge));
        }

        if let (Some(&last), Some(&first)) = (strip.last(), current.first()) {
            let odd = strip.len() % 2 == 1;
            strip.push(last);
            strip.push(first);
            if odd {
                strip.push(first);
            }
        }
        strip.extend_from_slice(&current);
    }
    strip
}

/// Corner of `tri` that is not on the directed edge `edge`
fn third_vertex(tri: [u32; 3], edge: (u32, u32)) -> u32 {
    let [a, b, c] = tri;
    if (a, b) == edge {
        c
    } else if (b, c) == edge {
        a
    } else {
        b
    }
}

/// Whether two corners share a vertex
fn is_degenerate([a, b, c]: [u32; 3]) -> bool {
    a == b || b == c || a == c
}

/// Expand a strip into triangles, skipping degenerates
pub fn decode_strip(strip: &[u32]) -> Vec<[u32; 3]> {
    strip
        .windows(3)
        .enumerate()
        .filter_map(|(k, w)| {
            let tri = if k % 2 == 0 {
                [w[0], w[1], w[2]]
            } else {
                [w[1], w[0], w[2]]
            };
            (!is_degenerate(tri)).then_some(tri)
        })
        .collect()
}
