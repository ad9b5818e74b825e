// rwscene-parsers/src/traits.rs
//! File-level parser interface
//!
//! The chunk codec works on byte slices. This module layers files on top:
//! options, memory mapping above a size threshold, header sniffing and
//! progress callbacks.

use std::io::{Read, Seek};
use std::path::Path;

use rwscene_core::{ChunkVersion, Error, Result};

use crate::rw::chunk::{ChunkHeader, HEADER_SIZE};
use crate::rw::reader::ParseContext;

/// Receives progress reports while a file is parsed
pub type ProgressCallback = Box<dyn Fn(ParseProgress) + Send + Sync>;

/// One progress report
#[derive(Debug, Clone)]
pub struct ParseProgress {
    /// Current phase
    pub phase: ParsePhase,
    /// Input bytes handled so far
    pub bytes_processed: u64,
    /// Input size, when the source has one
    pub total_bytes: Option<u64>,
    /// Chunk type currently being handled
    pub current_item: Option<String>,
}

impl ParseProgress {
    /// Report without a current item
    pub fn new(phase: ParsePhase, bytes_processed: u64, total_bytes: Option<u64>) -> Self {
        Self {
            phase,
            bytes_processed,
            total_bytes,
            current_item: None,
        }
    }

    /// Attach the name of the chunk being handled
    pub fn with_item(mut self, item: impl Into<String>) -> Self {
        self.current_item = Some(item.into());
        self
    }

    /// Fraction done in `0.0..=1.0`; an empty input counts as done
    pub fn percentage(&self) -> Option<f32> {
        let total = self.total_bytes?;
        if total == 0 {
            return Some(1.0);
        }
        Some((self.bytes_processed.min(total)) as f32 / total as f32)
    }
}

/// Stage a parse is in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParsePhase {
    /// First chunk header and version check
    ReadingHeader,
    /// Reading the chunk tree
    ParsingRecords,
    /// Picking the clump out of the stream and resolving frames
    LinkingReferences,
    /// Parse finished
    Complete,
}

/// Limits and I/O policy for a parse
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Deepest chunk nesting accepted before `NestingTooDeep`
    pub max_nesting_depth: u32,
    /// Reject top-level version stamps that do not unpack to a 3.x library
    pub strict_versions: bool,
    /// Memory map large files instead of reading them
    pub use_memory_mapping: bool,
    /// Files at least this large are memory mapped
    pub memory_mapping_threshold: u64,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_nesting_depth: ParseContext::DEFAULT_MAX_DEPTH,
            strict_versions: false,
            use_memory_mapping: true,
            memory_mapping_threshold: 10 << 20,
        }
    }
}

impl ParseOptions {
    /// Parse context for a top-level chunk
    pub fn context(&self) -> ParseContext {
        ParseContext::new(self.max_nesting_depth)
    }

    /// Apply the version policy to a top-level version stamp
    pub fn check_version(&self, version: ChunkVersion) -> Result<()> {
        if self.strict_versions && version.unpacked() < 0x30000 {
            return Err(Error::UnsupportedVersion {
                version: version.raw(),
            });
        }
        Ok(())
    }

    /// Whether a file of `len` bytes should be memory mapped
    pub fn should_map(&self, len: u64) -> bool {
        self.use_memory_mapping && len >= self.memory_mapping_threshold
    }
}

/// A parser for one file format
pub trait Parser: Send + Sync {
    type Output: Send + Sync;

    /// Lowercase file extensions without the dot
    fn extensions(&self) -> &[&str];

    /// Display name
    fn name(&self) -> &str;

    /// Whether the first chunk header looks like this format
    fn sniff(&self, _header: &ChunkHeader) -> bool {
        false
    }

    fn parse<R: Read + Seek>(&self, reader: R) -> Result<Self::Output> {
        self.parse_with_options(reader, &ParseOptions::default(), None)
    }

    fn parse_with_options<R: Read + Seek>(
        &self,
        reader: R,
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self::Output>;

    fn parse_file(&self, path: &Path) -> Result<Self::Output> {
        self.parse_file_with_options(path, &ParseOptions::default(), None)
    }

    /// Parse a file, mapping it into memory when `options` allow
    fn parse_file_with_options(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self::Output> {
        let file = std::fs::File::open(path)?;
        if options.should_map(file.metadata()?.len()) {
            return self.parse_memory_mapped(path, options, progress);
        }
        self.parse_with_options(std::io::BufReader::new(file), options, progress)
    }

    /// Parse through a memory map; buffered reads unless overridden
    fn parse_memory_mapped(
        &self,
        path: &Path,
        options: &ParseOptions,
        progress: Option<ProgressCallback>,
    ) -> Result<Self::Output> {
        let file = std::fs::File::open(path)?;
        self.parse_with_options(std::io::BufReader::new(file), options, progress)
    }

    /// Match by extension, then by sniffing the first chunk header
    fn can_parse(&self, path: &Path) -> bool {
        let by_extension = path
            .extension()
            .map(|ext| ext.to_string_lossy().to_lowercase())
            .is_some_and(|ext| self.extensions().iter().any(|e| *e == ext));
        if by_extension {
            return true;
        }

        let mut buffer = [0u8; HEADER_SIZE];
        let read = std::fs::File::open(path).and_then(|mut f| f.read_exact(&mut buffer));
        read.is_ok() && self.sniff(&ChunkHeader::from_bytes(&buffer, 0))
    }
}

/// Text and JSON renderings for CLI output
pub trait HumanReadable {
    fn to_readable_string(&self) -> String;

    fn to_json(&self) -> serde_json::Value;
}
