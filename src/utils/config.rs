//! Application configuration constants.
//! Tuning and thresholds in one place.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

// ---- Package / paths (from CARGO_PKG_NAME, cached) ----

/// Package-derived names: built once from `CARGO_PKG_NAME`, then cached.
pub struct PackagePaths {
    pkg_name: &'static str,
    config_filename: String,
    workers_env_key: String,
    spool_suffix: &'static str,
}

static PACKAGE_PATHS: OnceLock<PackagePaths> = OnceLock::new();

impl PackagePaths {
    /// Build and cache names from `CARGO_PKG_NAME`. Called once on first use.
    pub fn get() -> &'static PackagePaths {
        PACKAGE_PATHS.get_or_init(|| {
            let pkg = env!("CARGO_PKG_NAME");
            PackagePaths {
                pkg_name: pkg,
                config_filename: format!(".{pkg}.toml"),
                workers_env_key: format!("{}_WORKERS", pkg.to_uppercase()),
                spool_suffix: "spool",
            }
        })
    }

    pub fn pkg_name(&self) -> &str {
        self.pkg_name
    }

    /// Config file looked up in the working directory (e.g. `.pmslicer.toml`).
    pub fn config_filename(&self) -> &str {
        &self.config_filename
    }

    /// Environment variable overriding the worker count (e.g. `PMSLICER_WORKERS`).
    pub fn workers_env_key(&self) -> &str {
        &self.workers_env_key
    }

    /// Spool file that holds tile bytes until finalize: `<output>.spool` next to the output.
    pub fn spool_path_for(&self, output: &Path) -> PathBuf {
        let name = output
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or(self.pkg_name);
        output
            .parent()
            .unwrap_or(Path::new("."))
            .join(format!("{name}.{}", self.spool_suffix))
    }
}

// ---- Worker threads ----

/// Thread limits for drive-type-based tuning.
/// Use [`WorkerThreadLimits::current()`] to fill `all_threads` from rayon; the rest are const.
#[derive(Clone, Copy, Debug)]
pub struct WorkerThreadLimits {
    /// Available threads (from rayon); set by [`WorkerThreadLimits::current()`].
    pub all_threads: usize,
    /// Max threads when the source raster sits on a spinning disk.
    pub hdd_max: usize,
    /// Floor / minimum for any tuning result.
    pub floor: usize,
    /// Max threads when drive type is unknown.
    pub unknown_max: usize,
    /// Max threads when the source raster is on a network mount.
    pub network_max: usize,
}

impl Default for WorkerThreadLimits {
    fn default() -> Self {
        Self {
            all_threads: 0, // use current() to set from rayon
            hdd_max: Self::HDD_THREADS,
            floor: Self::FLOOR_THREADS,
            unknown_max: Self::UNKNOWN_MAX_THREADS,
            network_max: Self::NETWORK_MAX_THREADS,
        }
    }
}

impl WorkerThreadLimits {
    pub const HDD_THREADS: usize = 4;
    pub const FLOOR_THREADS: usize = 1;
    pub const UNKNOWN_MAX_THREADS: usize = 8;
    pub const NETWORK_MAX_THREADS: usize = 12;

    /// Build limits with `all_threads` set from `rayon::current_num_threads()`.
    pub fn current() -> Self {
        Self {
            all_threads: rayon::current_num_threads(),
            ..Self::default()
        }
    }
}

// ---- Tiles ----

/// Tile grid and payload defaults.
pub struct TileConsts;

impl TileConsts {
    /// Output tile edge in pixels.
    pub const DEFAULT_TILE_SIZE: u32 = 256;
    /// Largest accepted tile edge; keeps a decoded grid well under 64 MB.
    pub const MAX_TILE_SIZE: u32 = 4096;
    /// zlib level for tile payloads. Low on purpose: bulk generation is throughput bound.
    pub const DEFAULT_COMPRESSION_LEVEL: u32 = 1;
    /// Deepest zoom the enumerator and TileID encoding accept.
    pub const MAX_ZOOM: u8 = 30;
    /// No-data value used when the source does not declare one.
    pub const DEFAULT_NODATA: f32 = 0.0;
}

// ---- Relay queue ----

/// Capacity of the worker -> writer relay queue. Caps in-flight encoded tiles.
pub const DEFAULT_QUEUE_CAPACITY: usize = 128;

/// Coordinates buffered between the dispatcher and the worker pool (per worker).
pub const DISPATCH_BUFFER_PER_WORKER: usize = 4;

// ---- Progress ----

/// Progress bar tuning.
pub struct ProgressConsts;

impl ProgressConsts {
    /// Completed tiles a worker accumulates before touching the shared bar.
    pub const PROGRESS_UPDATE_BATCH_SIZE: usize = 64;
}

// ---- Raster decoding ----

/// Per-worker decoder tuning.
pub struct RasterConsts;

impl RasterConsts {
    /// Decoded source chunks kept per worker.
    pub const CHUNK_CACHE_CAPACITY: usize = 64;
}

// ---- Archive ----

/// PMTiles layout constants.
pub struct ArchiveConsts;

impl ArchiveConsts {
    pub const HEADER_LEN: usize = 127;
    /// Header plus root directory must fit in the first 16 KiB.
    pub const ROOT_BUDGET: usize = 16_384 - Self::HEADER_LEN;
    /// First leaf size tried when the root directory alone is too large.
    pub const INITIAL_LEAF_SIZE: usize = 4096;
    /// Buffer for spooled tile bytes.
    pub const SPOOL_BUFFER_SIZE: usize = 1024 * 1024;
}
