//! Raster capability: the decoder sits behind [`RasterOpener`] / [`RasterSource`] so the
//! pipeline only sees "give me the pixels for this tile, or fail".

pub mod geotiff;
pub mod resample;

use anyhow::Result;

use crate::{BoundingBox, PixelGrid, TileCoord};

pub use geotiff::{GeoTiffOpener, GeoTiffSource};
pub use resample::{GeoTransform, SampleWindow, resample_tile};

/// Coordinate reference systems the built-in decoder understands.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Crs {
    /// EPSG:4326, lon/lat degrees.
    Wgs84,
    /// EPSG:3857, spherical mercator meters.
    WebMercator,
}

/// What the coordinator needs from the source before any worker starts.
#[derive(Clone, Debug)]
pub struct SourceInfo {
    /// Source extent reprojected to EPSG:4326.
    pub bounds: BoundingBox,
    pub nodata: f32,
    pub crs: Crs,
    pub width: u32,
    pub height: u32,
    /// Full resolution plus overviews.
    pub levels: usize,
}

/// One decoder handle, owned by exactly one worker for its whole life.
pub trait RasterSource {
    /// Value marking "no sample here"; an all-nodata tile is dropped.
    fn nodata(&self) -> f32;

    /// Bilinear-resampled `tile_size` x `tile_size` grid of band 1 covering `coord`.
    fn read_tile(&mut self, coord: TileCoord, tile_size: u32) -> Result<PixelGrid>;
}

/// Factory for per-worker decoder handles. Shared (by reference) across the pool.
pub trait RasterOpener: Sync {
    type Source: RasterSource + Send + 'static;

    /// Describe the source: bounds in EPSG:4326, no-data, dimensions. Failure is fatal.
    fn describe(&self) -> Result<SourceInfo>;

    /// Open an independent handle for one worker. Failure is fatal.
    fn open(&self) -> Result<Self::Source>;
}
