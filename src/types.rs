//! Public and internal types for the pmslicer API and pipeline.

use std::fmt;

use crate::tiles::tile_id::zxy_to_tile_id;
use crate::utils::config::{DEFAULT_QUEUE_CAPACITY, TileConsts};

/// Geographic bounds in EPSG:4326 degrees.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_lon: f64,
    pub min_lat: f64,
    pub max_lon: f64,
    pub max_lat: f64,
}

impl BoundingBox {
    pub fn new(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> Self {
        Self {
            min_lon,
            min_lat,
            max_lon,
            max_lat,
        }
    }

    /// Bounds as fixed-point integers (degrees × 10^7, rounded) in header order
    /// `[min_lon, min_lat, max_lon, max_lat]`.
    pub fn to_e7(&self) -> [i32; 4] {
        [
            degrees_to_e7(self.min_lon),
            degrees_to_e7(self.min_lat),
            degrees_to_e7(self.max_lon),
            degrees_to_e7(self.max_lat),
        ]
    }

    /// Midpoint `(lon, lat)`. Handles a box that crosses the antimeridian.
    pub fn center(&self) -> (f64, f64) {
        let lat = (self.min_lat + self.max_lat) / 2.0;
        if self.min_lon <= self.max_lon {
            return ((self.min_lon + self.max_lon) / 2.0, lat);
        }
        let mut lon = (self.min_lon + self.max_lon + 360.0) / 2.0;
        if lon > 180.0 {
            lon -= 360.0;
        }
        (lon, lat)
    }

    pub fn is_finite(&self) -> bool {
        self.min_lon.is_finite()
            && self.min_lat.is_finite()
            && self.max_lon.is_finite()
            && self.max_lat.is_finite()
    }
}

/// Degrees to header fixed point. Saturates instead of wrapping on out-of-range input.
///
/// Rounds to nearest rather than truncating: truncation pulls negative bounds toward zero
/// and can shrink the box by up to 1e-7 degrees on each side.
pub fn degrees_to_e7(degrees: f64) -> i32 {
    (degrees * 10_000_000.0).round() as i32
}

/// Slippy-map tile address. Valid when `x, y < 2^z`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TileCoord {
    pub z: u8,
    pub x: u32,
    pub y: u32,
}

impl TileCoord {
    pub fn new(z: u8, x: u32, y: u32) -> Self {
        Self { z, x, y }
    }

    pub fn is_valid(&self) -> bool {
        if self.z > TileConsts::MAX_ZOOM {
            return false;
        }
        let n = 1_u64 << self.z;
        u64::from(self.x) < n && u64::from(self.y) < n
    }

    /// PMTiles Hilbert TileID for this coordinate.
    pub fn tile_id(&self) -> u64 {
        zxy_to_tile_id(self.z, self.x, self.y)
    }
}

impl fmt::Display for TileCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

/// Single-band samples for one tile, row-major, `width * height` long.
#[derive(Clone, Debug, PartialEq)]
pub struct PixelGrid {
    pub width: u32,
    pub height: u32,
    pub samples: Vec<f32>,
}

impl PixelGrid {
    /// Grid of `width * height` samples all set to `value`.
    pub fn filled(width: u32, height: u32, value: f32) -> Self {
        Self {
            width,
            height,
            samples: vec![value; width as usize * height as usize],
        }
    }

    pub fn from_samples(width: u32, height: u32, samples: Vec<f32>) -> Self {
        debug_assert_eq!(samples.len(), width as usize * height as usize);
        Self {
            width,
            height,
            samples,
        }
    }

    pub fn get(&self, col: u32, row: u32) -> f32 {
        self.samples[row as usize * self.width as usize + col as usize]
    }

    pub fn set(&mut self, col: u32, row: u32, value: f32) {
        self.samples[row as usize * self.width as usize + col as usize] = value;
    }

    /// True when every sample is the no-data value (NaN no-data matches NaN samples).
    pub fn is_all_nodata(&self, nodata: f32) -> bool {
        if nodata.is_nan() {
            self.samples.iter().all(|v| v.is_nan())
        } else {
            self.samples.iter().all(|&v| v == nodata)
        }
    }
}

/// Encoded tile on its way to the archive writer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TilePayload {
    pub tile_id: u64,
    pub data: Vec<u8>,
}

/// Lifecycle of one pipeline run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum PipelineState {
    #[default]
    Init,
    Extracting,
    Draining,
    Finalized,
    Cancelled,
    Failed,
}

/// Counts reported after a run.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RunSummary {
    /// Coordinates produced by the enumerator.
    pub enumerated: usize,
    /// Tiles appended to the archive.
    pub written: usize,
    /// Tiles dropped because every sample was no-data.
    pub empty: usize,
    /// Tiles dropped after a decode error or a panic inside the tile invocation.
    pub failed: usize,
    /// Distinct payloads stored (identical tiles share one payload).
    pub unique_payloads: u64,
    /// Size of the finished archive in bytes.
    pub archive_bytes: u64,
    /// Worker threads used.
    pub workers: usize,
    /// Terminal state the coordinator reached.
    pub state: PipelineState,
}

/// Lib-only options for [`slice_to_archive`](crate::slice_to_archive).
#[derive(Clone, Debug)]
pub struct SliceOpts {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Override worker count. When None, derived from drive type and FD limit.
    pub num_workers: Option<usize>,
    pub tile_size: u32,
    pub queue_capacity: usize,
    pub compression_level: u32,
}

impl Default for SliceOpts {
    fn default() -> Self {
        Self {
            min_zoom: 0,
            max_zoom: 0,
            num_workers: None,
            tile_size: TileConsts::DEFAULT_TILE_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            compression_level: TileConsts::DEFAULT_COMPRESSION_LEVEL,
        }
    }
}

impl From<&SliceOpts> for Opts {
    fn from(o: &SliceOpts) -> Self {
        Opts {
            min_zoom: o.min_zoom,
            max_zoom: o.max_zoom,
            num_workers: o.num_workers,
            tile_size: o.tile_size,
            queue_capacity: o.queue_capacity,
            compression_level: o.compression_level,
            verbose: false,
            show_progress: false,
            verify: false,
        }
    }
}

/// Full options (CLI). Use [`SliceOpts`] for lib.
#[derive(Clone, Debug)]
pub struct Opts {
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// Override worker count (CLI flag, env or config file). Still capped by the FD limit.
    pub num_workers: Option<usize>,
    /// Output tile edge in pixels.
    pub tile_size: u32,
    /// Relay queue capacity (encoded tiles in flight).
    pub queue_capacity: usize,
    /// zlib level for tile payloads (0-9).
    pub compression_level: u32,
    /// Debug logging.
    pub verbose: bool,
    /// Draw the kdam progress bar.
    pub show_progress: bool,
    /// Re-open the archive after finalize and check its directory.
    pub verify: bool,
}

impl Default for Opts {
    fn default() -> Self {
        Opts::from(&SliceOpts::default())
    }
}
