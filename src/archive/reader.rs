//! Read-back of finished archives, for `--verify` and tests.

use anyhow::{Context, Result, bail};
use memmap2::Mmap;
use serde_json::Value;
use std::fs::File;
use std::path::Path;

use super::directory::{DirEntry, decode_directory, gunzip};
use super::header::PmtilesHeader;
use super::Compression;

/// Maximum directory depth followed (root plus leaves, with slack for nested leaves).
const MAX_DIRECTORY_DEPTH: usize = 4;

pub struct PmtilesReader {
    data: Mmap,
    header: PmtilesHeader,
}

/// Result of [`PmtilesReader::verify`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VerifyReport {
    pub addressed_tiles: u64,
    pub tile_entries: u64,
    pub leaf_directories: u64,
}

impl PmtilesReader {
    pub fn open(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("open archive {}", path.display()))?;
        let data = unsafe { Mmap::map(&file) }
            .with_context(|| format!("memory-map archive {}", path.display()))?;
        let header = PmtilesHeader::from_bytes(&data)
            .with_context(|| format!("read header of {}", path.display()))?;
        if header.internal_compression != Compression::Gzip {
            bail!(
                "internal compression {:?} is not supported",
                header.internal_compression
            );
        }
        Ok(Self { data, header })
    }

    pub fn header(&self) -> &PmtilesHeader {
        &self.header
    }

    fn section(&self, offset: u64, length: u64) -> Result<&[u8]> {
        let start = usize::try_from(offset).context("section offset")?;
        let end = start
            .checked_add(usize::try_from(length).context("section length")?)
            .context("section end overflows")?;
        self.data
            .get(start..end)
            .with_context(|| format!("section {start}..{end} is past the end of the archive"))
    }

    pub fn metadata(&self) -> Result<Value> {
        let raw = self.section(
            self.header.json_metadata_offset,
            self.header.json_metadata_length,
        )?;
        serde_json::from_slice(&gunzip(raw)?).context("parse archive metadata")
    }

    fn root_directory(&self) -> Result<Vec<DirEntry>> {
        let raw = self.section(self.header.root_dir_offset, self.header.root_dir_length)?;
        decode_directory(&gunzip(raw)?)
    }

    fn leaf_directory(&self, entry: &DirEntry) -> Result<Vec<DirEntry>> {
        if entry.offset + u64::from(entry.length) > self.header.leaf_dirs_length {
            bail!("leaf directory at {} overruns the leaf section", entry.offset);
        }
        let raw = self.section(
            self.header.leaf_dirs_offset + entry.offset,
            u64::from(entry.length),
        )?;
        decode_directory(&gunzip(raw)?)
    }

    /// All tile entries in id order, leaves resolved.
    pub fn entries(&self) -> Result<Vec<DirEntry>> {
        let mut out = Vec::new();
        self.collect(self.root_directory()?, 0, &mut out, &mut 0)?;
        Ok(out)
    }

    fn collect(
        &self,
        dir: Vec<DirEntry>,
        depth: usize,
        out: &mut Vec<DirEntry>,
        leaves: &mut u64,
    ) -> Result<()> {
        if depth > MAX_DIRECTORY_DEPTH {
            bail!("directory nesting deeper than {MAX_DIRECTORY_DEPTH}");
        }
        for entry in dir {
            if entry.is_leaf() {
                *leaves += 1;
                self.collect(self.leaf_directory(&entry)?, depth + 1, out, leaves)?;
            } else {
                out.push(entry);
            }
        }
        Ok(())
    }

    /// Every addressed tile id (runs expanded), ascending.
    pub fn tile_ids(&self) -> Result<Vec<u64>> {
        Ok(self
            .entries()?
            .iter()
            .flat_map(|e| e.tile_id..e.tile_id + u64::from(e.run_length))
            .collect())
    }

    /// Payload of one tile, or None when the id is not in the archive.
    pub fn get_tile(&self, tile_id: u64) -> Result<Option<&[u8]>> {
        let mut dir = self.root_directory()?;
        for _ in 0..=MAX_DIRECTORY_DEPTH {
            let idx = match dir.binary_search_by_key(&tile_id, |e| e.tile_id) {
                Ok(i) => i,
                Err(0) => return Ok(None),
                Err(i) => i - 1,
            };
            let entry = dir[idx];
            if entry.is_leaf() {
                dir = self.leaf_directory(&entry)?;
                continue;
            }
            if tile_id >= entry.tile_id + u64::from(entry.run_length) {
                return Ok(None);
            }
            return self.tile_bytes(&entry).map(Some);
        }
        bail!("directory nesting deeper than {MAX_DIRECTORY_DEPTH}")
    }

    fn tile_bytes(&self, entry: &DirEntry) -> Result<&[u8]> {
        if entry.offset + u64::from(entry.length) > self.header.tile_data_length {
            bail!(
                "tile {} at {}+{} overruns the tile data section",
                entry.tile_id,
                entry.offset,
                entry.length
            );
        }
        self.section(
            self.header.tile_data_offset + entry.offset,
            u64::from(entry.length),
        )
    }

    /// Walk the whole directory tree and cross-check it against the header.
    pub fn verify(&self) -> Result<VerifyReport> {
        let mut entries = Vec::new();
        let mut leaves = 0_u64;
        self.collect(self.root_directory()?, 0, &mut entries, &mut leaves)?;

        let mut next_free = 0_u64;
        let mut addressed = 0_u64;
        for entry in &entries {
            if entry.tile_id < next_free {
                bail!("tile id {} is out of order or overlaps a run", entry.tile_id);
            }
            if entry.run_length == 0 {
                bail!("tile entry {} has an empty run", entry.tile_id);
            }
            self.tile_bytes(entry)?;
            next_free = entry.tile_id + u64::from(entry.run_length);
            addressed += u64::from(entry.run_length);
        }
        if addressed != self.header.addressed_tiles_count {
            bail!(
                "directory addresses {addressed} tiles, header says {}",
                self.header.addressed_tiles_count
            );
        }
        if entries.len() as u64 != self.header.tile_entries_count {
            bail!(
                "directory has {} entries, header says {}",
                entries.len(),
                self.header.tile_entries_count
            );
        }
        let expected_len = self.header.tile_data_offset + self.header.tile_data_length;
        if self.data.len() as u64 != expected_len {
            bail!(
                "archive is {} bytes, header implies {expected_len}",
                self.data.len()
            );
        }
        Ok(VerifyReport {
            addressed_tiles: addressed,
            tile_entries: entries.len() as u64,
            leaf_directories: leaves,
        })
    }
}
