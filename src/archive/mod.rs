//! Archive capability: a single-file PMTiles v3 container.
//!
//! The pipeline only sees [`ArchiveSink`]: append `(tile_id, bytes)` in arrival order, then
//! finalize once. Sorting, deduplication and directory layout live behind it.

pub mod directory;
pub mod header;
pub mod reader;
pub mod writer;

use anyhow::{Result, bail};
use serde_json::Value;

use crate::BoundingBox;

pub use directory::DirEntry;
pub use header::PmtilesHeader;
pub use reader::{PmtilesReader, VerifyReport};
pub use writer::PmtilesWriter;

/// Compression tags used in the header (both for tiles and internal sections).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum Compression {
    Unknown = 0,
    None = 1,
    Gzip = 2,
    Brotli = 3,
    Zstd = 4,
}

impl Compression {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => Compression::Unknown,
            1 => Compression::None,
            2 => Compression::Gzip,
            3 => Compression::Brotli,
            4 => Compression::Zstd,
            other => bail!("unknown compression tag {other}"),
        })
    }
}

/// Tile type tags. Raw float grids have no registered type, so they are `Unknown`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum TileType {
    Unknown = 0,
    Mvt = 1,
    Png = 2,
    Jpeg = 3,
    Webp = 4,
    Avif = 5,
}

impl TileType {
    pub fn from_u8(value: u8) -> Result<Self> {
        Ok(match value {
            0 => TileType::Unknown,
            1 => TileType::Mvt,
            2 => TileType::Png,
            3 => TileType::Jpeg,
            4 => TileType::Webp,
            5 => TileType::Avif,
            other => bail!("unknown tile type tag {other}"),
        })
    }
}

/// Everything finalize needs that only the coordinator knows.
#[derive(Clone, Debug)]
pub struct ArchiveHeader {
    pub bounds: BoundingBox,
    pub min_zoom: u8,
    pub max_zoom: u8,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    /// JSON object stored (gzip) in the metadata section.
    pub metadata: Value,
}

/// What finalize wrote.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ArchiveStats {
    /// Tile ids addressed by the directory (run lengths expanded).
    pub addressed_tiles: u64,
    /// Directory entries after run-length merging.
    pub tile_entries: u64,
    /// Distinct payloads in the tile data section.
    pub tile_contents: u64,
    pub archive_bytes: u64,
}

/// Exclusively owned by the writer thread. `finalize` and `abort` consume the sink, so neither
/// can run twice and no append can follow them.
pub trait ArchiveSink: Send + 'static {
    /// Append one tile. Called in arrival order; ids are not sorted.
    fn append(&mut self, tile_id: u64, data: &[u8]) -> Result<()>;

    /// Write header, directories, metadata and tile data. Called exactly once after all appends.
    fn finalize(self, header: ArchiveHeader) -> Result<ArchiveStats>
    where
        Self: Sized;

    /// Throw the partial output away (cancelled or failed runs).
    fn abort(self) -> Result<()>
    where
        Self: Sized;
}
