//! PMTiles TileID: z-major, Hilbert order within a zoom level.
//!
//! `id = (4^z - 1) / 3 + d`, where `(4^z - 1) / 3` counts every tile on the levels above `z`
//! and `d` is the position of `(x, y)` on the level's Hilbert curve. Sorting by id therefore
//! groups tiles by zoom and keeps neighbours close, which is what the archive directory needs.

/// Number of tiles on all levels strictly above `z`.
#[inline]
pub fn zoom_base_id(z: u8) -> u64 {
    ((1_u64 << (2 * u32::from(z))) - 1) / 3
}

/// Encode `(z, x, y)` as a TileID. `x` and `y` must be below `2^z`.
pub fn zxy_to_tile_id(z: u8, x: u32, y: u32) -> u64 {
    debug_assert!(u64::from(x) < (1_u64 << z) && u64::from(y) < (1_u64 << z));
    let n = 1_u64 << z;
    let mut tx = u64::from(x);
    let mut ty = u64::from(y);
    let mut d = 0_u64;
    let mut s = n / 2;
    while s > 0 {
        let rx = u64::from((tx & s) > 0);
        let ry = u64::from((ty & s) > 0);
        d += s * s * ((3 * rx) ^ ry);
        rotate(n, &mut tx, &mut ty, rx, ry);
        s /= 2;
    }
    zoom_base_id(z) + d
}

/// Decode a TileID back to `(z, x, y)`. Returns `None` past the deepest supported zoom.
pub fn tile_id_to_zxy(tile_id: u64) -> Option<(u8, u32, u32)> {
    let mut z = 0_u8;
    while z < 31 {
        let next = zoom_base_id(z + 1);
        if tile_id < next {
            let mut t = tile_id - zoom_base_id(z);
            let n = 1_u64 << z;
            let (mut x, mut y) = (0_u64, 0_u64);
            let mut s = 1_u64;
            while s < n {
                let rx = 1 & (t / 2);
                let ry = 1 & (t ^ rx);
                rotate(s, &mut x, &mut y, rx, ry);
                x += s * rx;
                y += s * ry;
                t /= 4;
                s *= 2;
            }
            return Some((z, x as u32, y as u32));
        }
        z += 1;
    }
    None
}

#[inline]
fn rotate(n: u64, x: &mut u64, y: &mut u64, rx: u64, ry: u64) {
    if ry == 0 {
        if rx == 1 {
            *x = n - 1 - *x;
            *y = n - 1 - *y;
        }
        std::mem::swap(x, y);
    }
}
