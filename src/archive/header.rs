//! Fixed 127-byte PMTiles v3 header.

use anyhow::{Result, bail};

use super::{Compression, TileType};
use crate::utils::config::ArchiveConsts;

const MAGIC: &[u8; 7] = b"PMTiles";
const VERSION: u8 = 3;

/// On-disk header. Positions are fixed-point degrees × 10^7.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PmtilesHeader {
    pub root_dir_offset: u64,
    pub root_dir_length: u64,
    pub json_metadata_offset: u64,
    pub json_metadata_length: u64,
    pub leaf_dirs_offset: u64,
    pub leaf_dirs_length: u64,
    pub tile_data_offset: u64,
    pub tile_data_length: u64,
    pub addressed_tiles_count: u64,
    pub tile_entries_count: u64,
    pub tile_contents_count: u64,
    pub clustered: bool,
    pub internal_compression: Compression,
    pub tile_compression: Compression,
    pub tile_type: TileType,
    pub min_zoom: u8,
    pub max_zoom: u8,
    /// `[min_lon, min_lat, max_lon, max_lat]`
    pub bounds_e7: [i32; 4],
    pub center_zoom: u8,
    pub center_lon_e7: i32,
    pub center_lat_e7: i32,
}

impl PmtilesHeader {
    pub fn to_bytes(&self) -> [u8; ArchiveConsts::HEADER_LEN] {
        let mut buf = [0_u8; ArchiveConsts::HEADER_LEN];
        buf[0..7].copy_from_slice(MAGIC);
        buf[7] = VERSION;

        let words = [
            self.root_dir_offset,
            self.root_dir_length,
            self.json_metadata_offset,
            self.json_metadata_length,
            self.leaf_dirs_offset,
            self.leaf_dirs_length,
            self.tile_data_offset,
            self.tile_data_length,
            self.addressed_tiles_count,
            self.tile_entries_count,
            self.tile_contents_count,
        ];
        for (i, word) in words.iter().enumerate() {
            let at = 8 + i * 8;
            buf[at..at + 8].copy_from_slice(&word.to_le_bytes());
        }

        buf[96] = u8::from(self.clustered);
        buf[97] = self.internal_compression as u8;
        buf[98] = self.tile_compression as u8;
        buf[99] = self.tile_type as u8;
        buf[100] = self.min_zoom;
        buf[101] = self.max_zoom;
        for (i, v) in self.bounds_e7.iter().enumerate() {
            let at = 102 + i * 4;
            buf[at..at + 4].copy_from_slice(&v.to_le_bytes());
        }
        buf[118] = self.center_zoom;
        buf[119..123].copy_from_slice(&self.center_lon_e7.to_le_bytes());
        buf[123..127].copy_from_slice(&self.center_lat_e7.to_le_bytes());
        buf
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < ArchiveConsts::HEADER_LEN {
            bail!("archive is shorter than the {}-byte header", ArchiveConsts::HEADER_LEN);
        }
        if &bytes[0..7] != MAGIC {
            bail!("not a PMTiles archive (bad magic)");
        }
        if bytes[7] != VERSION {
            bail!("unsupported PMTiles version {}", bytes[7]);
        }
        let word = |i: usize| {
            let at = 8 + i * 8;
            let mut raw = [0_u8; 8];
            raw.copy_from_slice(&bytes[at..at + 8]);
            u64::from_le_bytes(raw)
        };
        let int = |at: usize| {
            let mut raw = [0_u8; 4];
            raw.copy_from_slice(&bytes[at..at + 4]);
            i32::from_le_bytes(raw)
        };
        Ok(Self {
            root_dir_offset: word(0),
            root_dir_length: word(1),
            json_metadata_offset: word(2),
            json_metadata_length: word(3),
            leaf_dirs_offset: word(4),
            leaf_dirs_length: word(5),
            tile_data_offset: word(6),
            tile_data_length: word(7),
            addressed_tiles_count: word(8),
            tile_entries_count: word(9),
            tile_contents_count: word(10),
            clustered: bytes[96] == 1,
            internal_compression: Compression::from_u8(bytes[97])?,
            tile_compression: Compression::from_u8(bytes[98])?,
            tile_type: TileType::from_u8(bytes[99])?,
            min_zoom: bytes[100],
            max_zoom: bytes[101],
            bounds_e7: [int(102), int(106), int(110), int(114)],
            center_zoom: bytes[118],
            center_lon_e7: int(119),
            center_lat_e7: int(123),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PmtilesHeader {
        PmtilesHeader {
            root_dir_offset: 127,
            root_dir_length: 40,
            json_metadata_offset: 167,
            json_metadata_length: 20,
            leaf_dirs_offset: 187,
            leaf_dirs_length: 0,
            tile_data_offset: 187,
            tile_data_length: 1000,
            addressed_tiles_count: 21,
            tile_entries_count: 19,
            tile_contents_count: 18,
            clustered: false,
            internal_compression: Compression::Gzip,
            tile_compression: Compression::Unknown,
            tile_type: TileType::Unknown,
            min_zoom: 0,
            max_zoom: 2,
            bounds_e7: [-10_000_000, -10_000_000, 10_000_000, 10_000_000],
            center_zoom: 0,
            center_lon_e7: 0,
            center_lat_e7: 0,
        }
    }

    #[test]
    fn layout_is_byte_exact() {
        let bytes = sample().to_bytes();
        assert_eq!(bytes.len(), 127);
        assert_eq!(&bytes[0..7], b"PMTiles");
        assert_eq!(bytes[7], 3);
        assert_eq!(&bytes[8..16], &127_u64.to_le_bytes());
        assert_eq!(bytes[96], 0);
        assert_eq!(bytes[97], 2);
        assert_eq!(bytes[98], 0);
        assert_eq!(bytes[99], 0);
        assert_eq!(&bytes[102..106], &(-10_000_000_i32).to_le_bytes());
        assert_eq!(&bytes[114..118], &10_000_000_i32.to_le_bytes());
    }

    #[test]
    fn parse_reads_back_what_was_written() {
        let header = sample();
        assert_eq!(PmtilesHeader::from_bytes(&header.to_bytes()).unwrap(), header);
    }

    #[test]
    fn bad_magic_is_rejected() {
        let mut bytes = sample().to_bytes();
        bytes[0] = b'X';
        assert!(PmtilesHeader::from_bytes(&bytes).is_err());
        assert!(PmtilesHeader::from_bytes(&bytes[..50]).is_err());
    }
}
