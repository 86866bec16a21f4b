//! Tile enumeration over a bounding box and an inclusive zoom range.

use anyhow::{Result, bail};

use super::mercator::{MAX_LATITUDE, lon_lat_to_tile};
use crate::utils::config::TileConsts;
use crate::{BoundingBox, TileCoord};

/// Nudge applied to the south-east corner so a box ending exactly on a tile edge does not
/// pull in the next row/column.
const EDGE_EPSILON: f64 = 1e-9;

/// Inclusive column/row span of covered tiles on one zoom level.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ZoomRange {
    pub z: u8,
    pub x_min: u32,
    pub x_max: u32,
    pub y_min: u32,
    pub y_max: u32,
}

impl ZoomRange {
    pub fn count(&self) -> u64 {
        u64::from(self.x_max - self.x_min + 1) * u64::from(self.y_max - self.y_min + 1)
    }

    pub fn tiles(&self) -> impl Iterator<Item = TileCoord> + use<> {
        let ZoomRange {
            z,
            x_min,
            x_max,
            y_min,
            y_max,
        } = *self;
        (x_min..=x_max).flat_map(move |x| (y_min..=y_max).map(move |y| TileCoord::new(z, x, y)))
    }
}

/// Every tile intersecting a bbox on every level of `[min_zoom, max_zoom]`.
///
/// The per-level spans are computed up front (a handful of integers per level); the tiles
/// themselves are produced lazily and the enumeration can be restarted with [`Self::iter`].
#[derive(Clone, Debug)]
pub struct TileEnumerator {
    ranges: Vec<ZoomRange>,
}

impl TileEnumerator {
    /// Build the enumerator. Invalid zoom ranges and malformed boxes are setup errors.
    pub fn new(bbox: &BoundingBox, min_zoom: u8, max_zoom: u8) -> Result<Self> {
        validate_zoom_range(min_zoom, max_zoom)?;
        if !bbox.is_finite() {
            bail!("Bounding box is not finite: {:?}", bbox);
        }
        if bbox.min_lat > bbox.max_lat {
            bail!(
                "Bounding box has min_lat {} above max_lat {}",
                bbox.min_lat,
                bbox.max_lat
            );
        }

        let south = bbox.min_lat.max(-MAX_LATITUDE);
        let north = bbox.max_lat.min(MAX_LATITUDE);
        let north = north.max(south);

        let mut ranges = Vec::new();
        for z in min_zoom..=max_zoom {
            if bbox.min_lon > bbox.max_lon {
                // Crosses the antimeridian: east part then west part.
                let east = level_range(z, bbox.min_lon, south, 180.0, north);
                let west = level_range(z, -180.0, south, bbox.max_lon, north);
                if west.x_max + 1 >= east.x_min {
                    ranges.push(ZoomRange {
                        x_min: 0,
                        x_max: east.x_max,
                        ..east
                    });
                } else {
                    ranges.push(west);
                    ranges.push(east);
                }
            } else {
                ranges.push(level_range(z, bbox.min_lon, south, bbox.max_lon, north));
            }
        }
        Ok(Self { ranges })
    }

    /// Total number of coordinates [`Self::iter`] yields, computed from the spans alone.
    pub fn count(&self) -> u64 {
        self.ranges.iter().map(ZoomRange::count).sum()
    }

    /// Lazy, level-grouped walk over every covered tile.
    pub fn iter(&self) -> impl Iterator<Item = TileCoord> + '_ {
        self.ranges.iter().flat_map(ZoomRange::tiles)
    }
}

impl<'a> IntoIterator for &'a TileEnumerator {
    type Item = TileCoord;
    type IntoIter = Box<dyn Iterator<Item = TileCoord> + 'a>;

    fn into_iter(self) -> Self::IntoIter {
        Box::new(self.iter())
    }
}

/// `min_zoom <= max_zoom <= MAX_ZOOM`.
pub fn validate_zoom_range(min_zoom: u8, max_zoom: u8) -> Result<()> {
    if min_zoom > max_zoom {
        bail!(
            "Invalid zoom range: min_zoom {} is greater than max_zoom {}",
            min_zoom,
            max_zoom
        );
    }
    if max_zoom > TileConsts::MAX_ZOOM {
        bail!(
            "Invalid zoom range: max_zoom {} exceeds the supported maximum {}",
            max_zoom,
            TileConsts::MAX_ZOOM
        );
    }
    Ok(())
}

fn level_range(z: u8, west: f64, south: f64, east: f64, north: f64) -> ZoomRange {
    let west = west.max(-180.0);
    let east = east.min(180.0);
    let (x_min, y_min) = lon_lat_to_tile(west, north, z);
    let (x_max, y_max) = lon_lat_to_tile(east - EDGE_EPSILON, south + EDGE_EPSILON, z);
    ZoomRange {
        z,
        x_min,
        x_max: x_max.max(x_min),
        y_min,
        y_max: y_max.max(y_min),
    }
}
