//! Bilinear resampling of a georeferenced raster window onto one Web Mercator tile.

use anyhow::{Result, bail};

use super::Crs;
use crate::tiles::mercator::{merc_x_to_lon, merc_y_to_lat, tile_bounds_mercator};
use crate::{PixelGrid, TileCoord};

/// North-up affine georeferencing: pixel `(0, 0)`'s outer corner sits at `origin`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct GeoTransform {
    pub origin_x: f64,
    pub origin_y: f64,
    /// Pixel width in CRS units (positive).
    pub pixel_width: f64,
    /// Pixel height in CRS units (positive; rows grow southwards).
    pub pixel_height: f64,
}

impl GeoTransform {
    pub fn new(origin_x: f64, origin_y: f64, pixel_width: f64, pixel_height: f64) -> Self {
        Self {
            origin_x,
            origin_y,
            pixel_width,
            pixel_height,
        }
    }

    /// From GeoTIFF `ModelPixelScale` (`[sx, sy, sz]`) and the first `ModelTiepoint`
    /// (`[i, j, k, x, y, z]`).
    pub fn from_geotiff_tags(scale: &[f64], tiepoint: &[f64]) -> Result<Self> {
        if scale.len() < 2 || tiepoint.len() < 6 {
            bail!(
                "Malformed georeferencing tags (scale has {} values, tiepoint has {})",
                scale.len(),
                tiepoint.len()
            );
        }
        let (sx, sy) = (scale[0], scale[1]);
        if !(sx > 0.0 && sy > 0.0) {
            bail!("Unsupported pixel scale ({sx}, {sy}): only north-up rasters are supported");
        }
        let (i, j, x, y) = (tiepoint[0], tiepoint[1], tiepoint[3], tiepoint[4]);
        Ok(Self::new(x - i * sx, y + j * sy, sx, sy))
    }

    /// Same georeferencing for an overview of `level` size derived from a `full` size image.
    pub fn for_overview(&self, full: (u32, u32), level: (u32, u32)) -> Self {
        let fx = f64::from(full.0) / f64::from(level.0.max(1));
        let fy = f64::from(full.1) / f64::from(level.1.max(1));
        Self::new(
            self.origin_x,
            self.origin_y,
            self.pixel_width * fx,
            self.pixel_height * fy,
        )
    }

    #[inline]
    pub fn world_to_col(&self, x: f64) -> f64 {
        (x - self.origin_x) / self.pixel_width
    }

    #[inline]
    pub fn world_to_row(&self, y: f64) -> f64 {
        (self.origin_y - y) / self.pixel_height
    }

    /// Extent in CRS units: `(min_x, min_y, max_x, max_y)`.
    pub fn extent(&self, width: u32, height: u32) -> (f64, f64, f64, f64) {
        let max_x = self.origin_x + f64::from(width) * self.pixel_width;
        let min_y = self.origin_y - f64::from(height) * self.pixel_height;
        (self.origin_x, min_y, max_x, self.origin_y)
    }
}

/// Random access to band-1 samples of one resolution level.
pub trait SampleWindow {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
    fn sample(&mut self, col: u32, row: u32) -> Result<f32>;
}

#[inline]
fn is_nodata(v: f32, nodata: f32) -> bool {
    v.is_nan() || v == nodata
}

/// Source pixel coordinate (centre-based) of each output pixel centre along one axis.
fn axis_positions(count: u32, start: f64, step: f64, to_source: impl Fn(f64) -> f64) -> Vec<f64> {
    (0..count)
        .map(|i| to_source(start + (f64::from(i) + 0.5) * step) - 0.5)
        .collect()
}

/// Resample `window` onto the `tile_size`² grid of `coord` with bilinear weights.
///
/// Neighbours outside the window or equal to `nodata` are left out and the remaining weights
/// renormalised; output pixels with no usable neighbour stay `nodata`. A tile whose extent is
/// disjoint from the window is an error; a tile that overlaps it without catching any output
/// pixel centre comes back all `nodata`.
pub fn resample_tile<W: SampleWindow + ?Sized>(
    window: &mut W,
    transform: &GeoTransform,
    crs: Crs,
    coord: TileCoord,
    tile_size: u32,
    nodata: f32,
) -> Result<PixelGrid> {
    if tile_size == 0 {
        bail!("Tile size must be positive");
    }
    let (min_x, min_y, max_x, max_y) = tile_bounds_mercator(coord);
    let (src_min_x, src_min_y, src_max_x, src_max_y) =
        transform.extent(window.width(), window.height());
    let (tile_min_x, tile_min_y, tile_max_x, tile_max_y) = match crs {
        Crs::Wgs84 => (
            merc_x_to_lon(min_x),
            merc_y_to_lat(min_y),
            merc_x_to_lon(max_x),
            merc_y_to_lat(max_y),
        ),
        Crs::WebMercator => (min_x, min_y, max_x, max_y),
    };
    if tile_max_x <= src_min_x
        || tile_min_x >= src_max_x
        || tile_max_y <= src_min_y
        || tile_min_y >= src_max_y
    {
        bail!("tile lies outside the source extent");
    }

    let res = (max_x - min_x) / f64::from(tile_size);

    let cols = axis_positions(tile_size, min_x, res, |mx| match crs {
        Crs::Wgs84 => transform.world_to_col(merc_x_to_lon(mx)),
        Crs::WebMercator => transform.world_to_col(mx),
    });
    let rows = axis_positions(tile_size, max_y, -res, |my| match crs {
        Crs::Wgs84 => transform.world_to_row(merc_y_to_lat(my)),
        Crs::WebMercator => transform.world_to_row(my),
    });

    let w = f64::from(window.width());
    let h = f64::from(window.height());
    let inside_x = |f: f64| f >= -0.5 && f < w - 0.5;
    let inside_y = |f: f64| f >= -0.5 && f < h - 0.5;

    let mut grid = PixelGrid::filled(tile_size, tile_size, nodata);
    // Source smaller than one output pixel: overlapping, but nothing to sample.
    if !cols.iter().any(|&f| inside_x(f)) || !rows.iter().any(|&f| inside_y(f)) {
        return Ok(grid);
    }

    for (j, &fy) in rows.iter().enumerate() {
        if !inside_y(fy) {
            continue;
        }
        let y0 = fy.floor();
        let dy = fy - y0;
        for (i, &fx) in cols.iter().enumerate() {
            if !inside_x(fx) {
                continue;
            }
            let x0 = fx.floor();
            let dx = fx - x0;
            let neighbours = [
                (x0, y0, (1.0 - dx) * (1.0 - dy)),
                (x0 + 1.0, y0, dx * (1.0 - dy)),
                (x0, y0 + 1.0, (1.0 - dx) * dy),
                (x0 + 1.0, y0 + 1.0, dx * dy),
            ];
            let mut acc = 0.0_f64;
            let mut weight = 0.0_f64;
            for (sx, sy, wgt) in neighbours {
                if wgt <= 0.0 || sx < 0.0 || sy < 0.0 || sx >= w || sy >= h {
                    continue;
                }
                let v = window.sample(sx as u32, sy as u32)?;
                if is_nodata(v, nodata) {
                    continue;
                }
                acc += f64::from(v) * wgt;
                weight += wgt;
            }
            if weight > 0.0 {
                grid.set(i as u32, j as u32, (acc / weight) as f32);
            }
        }
    }
    Ok(grid)
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Grid {
        width: u32,
        height: u32,
        values: Vec<f32>,
    }

    impl SampleWindow for Grid {
        fn width(&self) -> u32 {
            self.width
        }
        fn height(&self) -> u32 {
            self.height
        }
        fn sample(&mut self, col: u32, row: u32) -> Result<f32> {
            Ok(self.values[(row * self.width + col) as usize])
        }
    }

    fn world_grid(width: u32, height: u32, f: impl Fn(u32, u32) -> f32) -> (Grid, GeoTransform) {
        let values = (0..height)
            .flat_map(|r| (0..width).map(move |c| (c, r)))
            .map(|(c, r)| f(c, r))
            .collect();
        let transform = GeoTransform::new(
            -180.0,
            90.0,
            360.0 / f64::from(width),
            180.0 / f64::from(height),
        );
        (
            Grid {
                width,
                height,
                values,
            },
            transform,
        )
    }

    #[test]
    fn constant_raster_resamples_to_constant_tile() {
        let (mut grid, transform) = world_grid(36, 18, |_, _| 7.5);
        let tile = resample_tile(
            &mut grid,
            &transform,
            Crs::Wgs84,
            TileCoord::new(0, 0, 0),
            16,
            0.0,
        )
        .unwrap();
        assert_eq!(tile.samples.len(), 256);
        assert!(tile.samples.iter().all(|&v| (v - 7.5).abs() < 1e-6));
    }

    #[test]
    fn nodata_half_stays_nodata() {
        // West half is no-data, east half is 3.0.
        let (mut grid, transform) =
            world_grid(36, 18, |c, _| if c < 18 { 0.0 } else { 3.0 });
        let tile = resample_tile(
            &mut grid,
            &transform,
            Crs::Wgs84,
            TileCoord::new(0, 0, 0),
            8,
            0.0,
        )
        .unwrap();
        for row in 0..8 {
            for col in 0..4 {
                assert_eq!(tile.get(col, row), 0.0);
            }
            for col in 4..8 {
                assert!((tile.get(col, row) - 3.0).abs() < 1e-6);
            }
        }
    }

    #[test]
    fn tile_outside_source_is_an_error() {
        let transform = GeoTransform::new(10.0, 10.0, 0.1, 0.1);
        let mut grid = Grid {
            width: 10,
            height: 10,
            values: vec![1.0; 100],
        };
        // z=2 tile 0/0 covers lon -180..-90, far away from the 10..11 degree raster.
        let err = resample_tile(
            &mut grid,
            &transform,
            Crs::Wgs84,
            TileCoord::new(2, 0, 0),
            8,
            0.0,
        );
        assert!(err.is_err());
    }

    #[test]
    fn tiny_source_between_pixel_centres_is_all_nodata() {
        let transform = GeoTransform::new(0.001, 0.005, 0.001, 0.001);
        let mut grid = Grid {
            width: 4,
            height: 4,
            values: vec![5.0; 16],
        };
        let tile = resample_tile(
            &mut grid,
            &transform,
            Crs::Wgs84,
            TileCoord::new(1, 1, 0),
            16,
            0.0,
        )
        .unwrap();
        assert!(tile.is_all_nodata(0.0));
    }

    #[test]
    fn geotiff_tags_give_north_up_origin() {
        let t = GeoTransform::from_geotiff_tags(&[0.5, 0.25, 0.0], &[2.0, 4.0, 0.0, 10.0, 50.0, 0.0])
            .unwrap();
        assert_eq!(t.origin_x, 9.0);
        assert_eq!(t.origin_y, 51.0);
        assert_eq!(t.extent(4, 4), (9.0, 50.0, 11.0, 51.0));
        assert!(GeoTransform::from_geotiff_tags(&[0.5, -0.25], &[0.0; 6]).is_err());
    }
}
