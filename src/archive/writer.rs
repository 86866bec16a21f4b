//! PMTiles writer: spools tile bytes in arrival order, lays the archive out at finalize.

use anyhow::{Context, Result, bail};
use log::debug;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use super::directory::{DirEntry, build_directories, gzip};
use super::header::PmtilesHeader;
use super::{ArchiveHeader, ArchiveSink, ArchiveStats, Compression};
use crate::types::degrees_to_e7;
use crate::utils::config::ArchiveConsts;
use crate::utils::tempfiles::{prepare_spool_path, remove_partial_output};

/// Where one appended tile's bytes live in the spool.
#[derive(Clone, Copy, Debug)]
struct SpoolEntry {
    tile_id: u64,
    offset: u64,
    length: u32,
}

/// [`ArchiveSink`] writing a PMTiles v3 file.
///
/// The output file is created up front so an unwritable destination fails at setup. Tile bytes go
/// to `<output>.spool`; only `(tile_id, offset, length)` stays in memory. Identical payloads are
/// stored once.
pub struct PmtilesWriter {
    output_path: PathBuf,
    spool_path: PathBuf,
    output: Option<File>,
    spool: Option<BufWriter<File>>,
    spool_len: u64,
    entries: Vec<SpoolEntry>,
    seen: HashMap<blake3::Hash, (u64, u32)>,
    done: bool,
}

impl PmtilesWriter {
    pub fn create(output_path: &Path) -> Result<Self> {
        let output = File::create(output_path)
            .with_context(|| format!("create output archive {}", output_path.display()))?;
        let spool_path = prepare_spool_path(output_path)?;
        let spool = File::create(&spool_path)
            .with_context(|| format!("create spool file {}", spool_path.display()))?;
        Ok(Self {
            output_path: output_path.to_path_buf(),
            spool_path,
            output: Some(output),
            spool: Some(BufWriter::with_capacity(
                ArchiveConsts::SPOOL_BUFFER_SIZE,
                spool,
            )),
            spool_len: 0,
            entries: Vec::new(),
            seen: HashMap::new(),
            done: false,
        })
    }

    /// Sort by tile id, refuse duplicates, fold consecutive ids sharing a payload into runs.
    fn directory_entries(&mut self) -> Result<Vec<DirEntry>> {
        self.entries.sort_unstable_by_key(|e| e.tile_id);
        if let Some(pair) = self.entries.windows(2).find(|w| w[0].tile_id == w[1].tile_id) {
            bail!("tile id {} was appended twice", pair[0].tile_id);
        }

        let mut dir: Vec<DirEntry> = Vec::with_capacity(self.entries.len());
        for e in &self.entries {
            if let Some(last) = dir.last_mut()
                && last.offset == e.offset
                && e.tile_id == last.tile_id + u64::from(last.run_length)
                && last.run_length < u32::MAX
            {
                last.run_length += 1;
                continue;
            }
            dir.push(DirEntry {
                tile_id: e.tile_id,
                offset: e.offset,
                length: e.length,
                run_length: 1,
            });
        }
        Ok(dir)
    }

    fn write_archive(&mut self, request: ArchiveHeader) -> Result<ArchiveStats> {
        if let Some(mut spool) = self.spool.take() {
            spool.flush().context("flush spool file")?;
        }
        let addressed = self.entries.len() as u64;
        let dir_entries = self.directory_entries()?;
        let dirs = build_directories(&dir_entries)?;

        let metadata =
            serde_json::to_vec(&request.metadata).context("serialize archive metadata")?;
        let metadata = gzip(&metadata)?;

        let header_len = ArchiveConsts::HEADER_LEN as u64;
        let root_len = dirs.root.len() as u64;
        let metadata_offset = header_len + root_len;
        let leaf_offset = metadata_offset + metadata.len() as u64;
        let tile_data_offset = leaf_offset + dirs.leaves.len() as u64;
        let (center_lon, center_lat) = request.bounds.center();

        let header = PmtilesHeader {
            root_dir_offset: header_len,
            root_dir_length: root_len,
            json_metadata_offset: metadata_offset,
            json_metadata_length: metadata.len() as u64,
            leaf_dirs_offset: leaf_offset,
            leaf_dirs_length: dirs.leaves.len() as u64,
            tile_data_offset,
            tile_data_length: self.spool_len,
            addressed_tiles_count: addressed,
            tile_entries_count: dir_entries.len() as u64,
            tile_contents_count: self.seen.len() as u64,
            clustered: false,
            internal_compression: Compression::Gzip,
            tile_compression: request.tile_compression,
            tile_type: request.tile_type,
            min_zoom: request.min_zoom,
            max_zoom: request.max_zoom,
            bounds_e7: request.bounds.to_e7(),
            center_zoom: request.min_zoom,
            center_lon_e7: degrees_to_e7(center_lon),
            center_lat_e7: degrees_to_e7(center_lat),
        };

        let output = self
            .output
            .take()
            .context("archive output already closed")?;
        let mut out = BufWriter::with_capacity(ArchiveConsts::SPOOL_BUFFER_SIZE, output);
        out.write_all(&header.to_bytes()).context("write header")?;
        out.write_all(&dirs.root).context("write root directory")?;
        out.write_all(&metadata).context("write metadata")?;
        out.write_all(&dirs.leaves).context("write leaf directories")?;
        let mut spool = File::open(&self.spool_path)
            .with_context(|| format!("reopen spool file {}", self.spool_path.display()))?;
        let copied = std::io::copy(&mut spool, &mut out).context("copy tile data")?;
        if copied != self.spool_len {
            bail!(
                "spool holds {copied} bytes, expected {}",
                self.spool_len
            );
        }
        let file = out
            .into_inner()
            .map_err(|e| anyhow::anyhow!("flush archive: {}", e.error()))?;
        file.sync_all().context("sync archive")?;
        drop(spool);
        fs::remove_file(&self.spool_path)
            .with_context(|| format!("remove spool file {}", self.spool_path.display()))?;

        debug!(
            "archive: {} entries, {} leaf dirs, {} unique payloads",
            dir_entries.len(),
            dirs.num_leaves,
            self.seen.len()
        );
        Ok(ArchiveStats {
            addressed_tiles: addressed,
            tile_entries: dir_entries.len() as u64,
            tile_contents: self.seen.len() as u64,
            archive_bytes: tile_data_offset + self.spool_len,
        })
    }

    fn remove_partial_files(&mut self) {
        self.spool = None;
        self.output = None;
        remove_partial_output(&self.output_path);
    }
}

impl ArchiveSink for PmtilesWriter {
    fn append(&mut self, tile_id: u64, data: &[u8]) -> Result<()> {
        let hash = blake3::hash(data);
        if let Some(&(offset, length)) = self.seen.get(&hash) {
            self.entries.push(SpoolEntry {
                tile_id,
                offset,
                length,
            });
            return Ok(());
        }

        let spool = self.spool.as_mut().context("archive already finalized")?;
        let length = u32::try_from(data.len()).context("tile payload exceeds 4 GiB")?;
        spool
            .write_all(data)
            .with_context(|| format!("append tile {tile_id} to spool"))?;
        let offset = self.spool_len;
        self.spool_len += u64::from(length);
        self.seen.insert(hash, (offset, length));
        self.entries.push(SpoolEntry {
            tile_id,
            offset,
            length,
        });
        Ok(())
    }

    fn finalize(mut self, header: ArchiveHeader) -> Result<ArchiveStats> {
        let stats = self.write_archive(header)?;
        self.done = true;
        Ok(stats)
    }

    fn abort(mut self) -> Result<()> {
        self.remove_partial_files();
        self.done = true;
        Ok(())
    }
}

impl Drop for PmtilesWriter {
    /// A writer dropped without finishing leaves nothing behind.
    fn drop(&mut self) {
        if !self.done {
            self.remove_partial_files();
        }
    }
}
