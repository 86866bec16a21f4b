//! Tile encoder: degenerate check, float32 serialization, zlib.

use anyhow::{Context, Result};
use flate2::Compression;
use flate2::write::ZlibEncoder;
use std::io::Write;

use crate::{PixelGrid, TileCoord, TilePayload};

/// Turns pixel grids into relay payloads. One per worker; holds no state between tiles.
#[derive(Clone, Copy, Debug)]
pub struct TileEncoder {
    nodata: f32,
    level: u32,
}

impl TileEncoder {
    pub fn new(nodata: f32, level: u32) -> Self {
        Self {
            nodata,
            level: level.min(9),
        }
    }

    /// `Ok(None)` when every sample is no-data: nothing goes to the archive.
    pub fn encode(&self, coord: TileCoord, grid: &PixelGrid) -> Result<Option<TilePayload>> {
        if grid.is_all_nodata(self.nodata) {
            return Ok(None);
        }
        let raw = serialize_grid(grid);
        let mut encoder = ZlibEncoder::new(
            Vec::with_capacity(raw.len() / 2),
            Compression::new(self.level),
        );
        encoder
            .write_all(&raw)
            .with_context(|| format!("compress tile {coord}"))?;
        let data = encoder
            .finish()
            .with_context(|| format!("compress tile {coord}"))?;
        Ok(Some(TilePayload {
            tile_id: coord.tile_id(),
            data,
        }))
    }
}

/// Row-major little-endian float32, 4 bytes per sample.
pub fn serialize_grid(grid: &PixelGrid) -> Vec<u8> {
    let mut out = Vec::with_capacity(grid.samples.len() * 4);
    for sample in &grid.samples {
        out.extend_from_slice(&sample.to_le_bytes());
    }
    out
}

/// Inverse of [`TileEncoder::encode`]'s payload: zlib-decompress and read the floats back.
pub fn decode_payload(data: &[u8], width: u32, height: u32) -> Result<PixelGrid> {
    use flate2::read::ZlibDecoder;
    use std::io::Read;

    let mut raw = Vec::new();
    ZlibDecoder::new(data)
        .read_to_end(&mut raw)
        .context("decompress tile payload")?;
    let expected = width as usize * height as usize * 4;
    anyhow::ensure!(
        raw.len() == expected,
        "tile payload holds {} bytes, expected {expected}",
        raw.len()
    );
    let samples = raw
        .chunks_exact(4)
        .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
        .collect();
    Ok(PixelGrid::from_samples(width, height, samples))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nodata_grid_is_dropped() {
        let encoder = TileEncoder::new(0.0, 1);
        let grid = PixelGrid::filled(4, 3, 0.0);
        assert!(encoder.encode(TileCoord::new(1, 0, 0), &grid).unwrap().is_none());
    }

    #[test]
    fn one_valid_sample_keeps_the_tile() {
        let encoder = TileEncoder::new(-9999.0, 1);
        let mut grid = PixelGrid::filled(8, 8, -9999.0);
        grid.set(3, 5, 12.5);
        let payload = encoder
            .encode(TileCoord::new(2, 1, 3), &grid)
            .unwrap()
            .unwrap();
        assert_eq!(payload.tile_id, TileCoord::new(2, 1, 3).tile_id());
        assert_eq!(decode_payload(&payload.data, 8, 8).unwrap(), grid);
    }

    #[test]
    fn zero_is_data_when_nodata_is_nan() {
        let encoder = TileEncoder::new(f32::NAN, 1);
        assert!(
            encoder
                .encode(TileCoord::new(0, 0, 0), &PixelGrid::filled(2, 2, 0.0))
                .unwrap()
                .is_some()
        );
        assert!(
            encoder
                .encode(TileCoord::new(0, 0, 0), &PixelGrid::filled(2, 2, f32::NAN))
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn encoding_is_deterministic() {
        let encoder = TileEncoder::new(0.0, 1);
        let grid = PixelGrid::from_samples(2, 2, vec![1.0, 2.0, 3.0, 4.0]);
        let a = encoder.encode(TileCoord::new(0, 0, 0), &grid).unwrap();
        let b = encoder.encode(TileCoord::new(0, 0, 0), &grid).unwrap();
        assert_eq!(a, b);
        assert_eq!(serialize_grid(&grid)[0..4], 1.0_f32.to_le_bytes());
    }
}
