//! Spherical (Web) Mercator helpers for the slippy-map grid.

use std::f64::consts::PI;

use crate::TileCoord;

/// Latitude limit of the square Web Mercator world.
pub const MAX_LATITUDE: f64 = 85.051_128_779_806_59;
/// Half the equatorial circumference in Web Mercator meters.
pub const HALF_EARTH: f64 = 20_037_508.342_789_244;

/// Guards `floor` against values that are a hair under an integer after float math.
const FRACTION_EPSILON: f64 = 1e-14;

/// Position of `(lon, lat)` on the unit square (0..1 both ways, y grows southwards).
pub fn lon_lat_to_unit(lon: f64, lat: f64) -> (f64, f64) {
    let x = lon / 360.0 + 0.5;
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    let sin_lat = lat.to_radians().sin();
    let y = 0.5 - 0.25 * ((1.0 + sin_lat) / (1.0 - sin_lat)).ln() / PI;
    (x, y)
}

/// Tile at zoom `z` containing `(lon, lat)`, clamped to the grid.
pub fn lon_lat_to_tile(lon: f64, lat: f64, z: u8) -> (u32, u32) {
    let (x, y) = lon_lat_to_unit(lon, lat);
    let n = (1_u64 << z) as f64;
    (unit_to_index(x, n), unit_to_index(y, n))
}

fn unit_to_index(v: f64, n: f64) -> u32 {
    if v <= 0.0 {
        0
    } else if v >= 1.0 {
        (n - 1.0) as u32
    } else {
        (((v + FRACTION_EPSILON) * n).floor() as u32).min((n - 1.0) as u32)
    }
}

#[inline]
pub fn merc_x_to_lon(x: f64) -> f64 {
    x * 180.0 / HALF_EARTH
}

#[inline]
pub fn merc_y_to_lat(y: f64) -> f64 {
    let y_rad = y * PI / HALF_EARTH;
    (2.0 * y_rad.exp().atan() - PI / 2.0).to_degrees()
}

#[inline]
pub fn lon_to_merc_x(lon: f64) -> f64 {
    lon * HALF_EARTH / 180.0
}

#[inline]
pub fn lat_to_merc_y(lat: f64) -> f64 {
    let lat = lat.clamp(-MAX_LATITUDE, MAX_LATITUDE);
    ((90.0 + lat).to_radians() / 2.0).tan().ln() * HALF_EARTH / PI
}

/// Tile extent in Web Mercator meters: `(min_x, min_y, max_x, max_y)`.
pub fn tile_bounds_mercator(coord: TileCoord) -> (f64, f64, f64, f64) {
    let n = (1_u64 << coord.z) as f64;
    let size = 2.0 * HALF_EARTH / n;
    let min_x = -HALF_EARTH + f64::from(coord.x) * size;
    let max_y = HALF_EARTH - f64::from(coord.y) * size;
    (min_x, max_y - size, min_x + size, max_y)
}

/// Tile extent in degrees: `(west, south, east, north)`.
pub fn tile_bounds_lon_lat(coord: TileCoord) -> (f64, f64, f64, f64) {
    let (min_x, min_y, max_x, max_y) = tile_bounds_mercator(coord);
    (
        merc_x_to_lon(min_x),
        merc_y_to_lat(min_y),
        merc_x_to_lon(max_x),
        merc_y_to_lat(max_y),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn world_corners_map_to_grid_corners() {
        assert_eq!(lon_lat_to_tile(-180.0, MAX_LATITUDE, 3), (0, 0));
        assert_eq!(lon_lat_to_tile(180.0, -MAX_LATITUDE, 3), (7, 7));
        assert_eq!(lon_lat_to_tile(180.0, -90.0, 0), (0, 0));
    }

    #[test]
    fn origin_falls_in_south_east_quadrant_tile() {
        assert_eq!(lon_lat_to_tile(0.0, 0.0, 1), (1, 1));
        assert_eq!(lon_lat_to_tile(-0.1, 0.1, 1), (0, 0));
    }

    #[test]
    fn mercator_round_trip() {
        for (lon, lat) in [(0.0, 0.0), (12.5, -33.9), (-179.0, 80.0)] {
            let x = lon_to_merc_x(lon);
            let y = lat_to_merc_y(lat);
            assert!((merc_x_to_lon(x) - lon).abs() < 1e-9);
            assert!((merc_y_to_lat(y) - lat).abs() < 1e-9);
        }
    }

    #[test]
    fn tile_bounds_cover_world_at_zoom_zero() {
        let (w, s, e, n) = tile_bounds_lon_lat(TileCoord::new(0, 0, 0));
        assert!((w + 180.0).abs() < 1e-9);
        assert!((e - 180.0).abs() < 1e-9);
        assert!((n - MAX_LATITUDE).abs() < 1e-6);
        assert!((s + MAX_LATITUDE).abs() < 1e-6);
    }
}
