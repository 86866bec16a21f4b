//! Directory encoding: columnar varints, gzip-compressed, with leaf directories when the root
//! would not fit in the first 16 KiB.

use anyhow::{Context, Result, bail};
use flate2::Compression as GzLevel;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use rayon::prelude::*;
use std::io::{Read, Write};

use crate::utils::config::ArchiveConsts;

/// One directory entry. `run_length == 0` marks a pointer to a leaf directory.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DirEntry {
    pub tile_id: u64,
    pub offset: u64,
    pub length: u32,
    pub run_length: u32,
}

impl DirEntry {
    pub fn is_leaf(&self) -> bool {
        self.run_length == 0
    }
}

pub fn encode_varint(mut value: u64, buf: &mut Vec<u8>) {
    while value >= 0x80 {
        buf.push((value as u8) | 0x80);
        value >>= 7;
    }
    buf.push(value as u8);
}

/// Returns `(value, bytes_consumed)`.
pub fn decode_varint(data: &[u8]) -> Result<(u64, usize)> {
    let mut value = 0_u64;
    let mut shift = 0_u32;
    for (i, &byte) in data.iter().enumerate() {
        if shift >= 64 {
            bail!("varint overflows 64 bits");
        }
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    bail!("truncated varint")
}

/// `count, delta tile ids, run lengths, lengths, offsets`. An offset is written as 0 when the
/// entry starts right where the previous one ended, otherwise as `offset + 1`.
pub fn encode_directory(entries: &[DirEntry]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(entries.len() * 6 + 4);
    encode_varint(entries.len() as u64, &mut buf);

    let mut last_id = 0_u64;
    for entry in entries {
        encode_varint(entry.tile_id - last_id, &mut buf);
        last_id = entry.tile_id;
    }
    for entry in entries {
        encode_varint(u64::from(entry.run_length), &mut buf);
    }
    for entry in entries {
        encode_varint(u64::from(entry.length), &mut buf);
    }
    for (i, entry) in entries.iter().enumerate() {
        let contiguous =
            i > 0 && entry.offset == entries[i - 1].offset + u64::from(entries[i - 1].length);
        encode_varint(if contiguous { 0 } else { entry.offset + 1 }, &mut buf);
    }
    buf
}

pub fn decode_directory(data: &[u8]) -> Result<Vec<DirEntry>> {
    let mut pos = 0_usize;
    let next = |pos: &mut usize| -> Result<u64> {
        let (value, used) = decode_varint(&data[*pos..])?;
        *pos += used;
        Ok(value)
    };

    let count = next(&mut pos)? as usize;
    // Each entry needs at least four bytes; reject absurd counts before allocating.
    if count > data.len() {
        bail!("directory claims {count} entries in {} bytes", data.len());
    }
    let mut entries = vec![
        DirEntry {
            tile_id: 0,
            offset: 0,
            length: 0,
            run_length: 0,
        };
        count
    ];

    let mut last_id = 0_u64;
    for entry in entries.iter_mut() {
        last_id += next(&mut pos)?;
        entry.tile_id = last_id;
    }
    for entry in entries.iter_mut() {
        entry.run_length = u32::try_from(next(&mut pos)?).context("run length overflows u32")?;
    }
    for entry in entries.iter_mut() {
        entry.length = u32::try_from(next(&mut pos)?).context("entry length overflows u32")?;
    }
    for i in 0..count {
        let raw = next(&mut pos)?;
        entries[i].offset = if raw == 0 && i > 0 {
            entries[i - 1].offset + u64::from(entries[i - 1].length)
        } else if raw == 0 {
            bail!("first directory entry has no offset");
        } else {
            raw - 1
        };
    }
    Ok(entries)
}

/// Gzip with a zeroed mtime, so output is deterministic.
pub fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 2), GzLevel::default());
    encoder.write_all(data).context("gzip section")?;
    encoder.finish().context("gzip section")
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .context("gunzip section")?;
    Ok(out)
}

/// Compressed root and leaf sections ready to write.
#[derive(Debug)]
pub struct Directories {
    pub root: Vec<u8>,
    pub leaves: Vec<u8>,
    pub num_leaves: usize,
}

/// Fit the root in [`ArchiveConsts::ROOT_BUDGET`]: try a single root, then leaves of
/// `INITIAL_LEAF_SIZE` entries, doubling until the root of leaf pointers fits.
pub fn build_directories(entries: &[DirEntry]) -> Result<Directories> {
    let root = gzip(&encode_directory(entries))?;
    if root.len() <= ArchiveConsts::ROOT_BUDGET {
        return Ok(Directories {
            root,
            leaves: Vec::new(),
            num_leaves: 0,
        });
    }

    let mut leaf_size = ArchiveConsts::INITIAL_LEAF_SIZE;
    loop {
        let dirs = build_with_leaves(entries, leaf_size)?;
        if dirs.root.len() <= ArchiveConsts::ROOT_BUDGET {
            return Ok(dirs);
        }
        leaf_size *= 2;
    }
}

fn build_with_leaves(entries: &[DirEntry], leaf_size: usize) -> Result<Directories> {
    let compressed: Vec<Vec<u8>> = entries
        .par_chunks(leaf_size)
        .map(|chunk| gzip(&encode_directory(chunk)))
        .collect::<Result<_>>()?;

    let mut root_entries = Vec::with_capacity(compressed.len());
    let mut leaves = Vec::with_capacity(compressed.iter().map(Vec::len).sum());
    for (chunk, leaf) in entries.chunks(leaf_size).zip(&compressed) {
        root_entries.push(DirEntry {
            tile_id: chunk[0].tile_id,
            offset: leaves.len() as u64,
            length: u32::try_from(leaf.len()).context("leaf directory exceeds 4 GiB")?,
            run_length: 0,
        });
        leaves.extend_from_slice(leaf);
    }
    Ok(Directories {
        root: gzip(&encode_directory(&root_entries))?,
        leaves,
        num_leaves: root_entries.len(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tile_id: u64, offset: u64, length: u32, run_length: u32) -> DirEntry {
        DirEntry {
            tile_id,
            offset,
            length,
            run_length,
        }
    }

    #[test]
    fn varint_known_encodings() {
        let mut buf = Vec::new();
        encode_varint(300, &mut buf);
        assert_eq!(buf, vec![0xac, 0x02]);
        assert_eq!(decode_varint(&buf).unwrap(), (300, 2));
        assert!(decode_varint(&[0x80]).is_err());
    }

    #[test]
    fn contiguous_offsets_encode_as_zero() {
        let entries = vec![entry(0, 0, 10, 1), entry(1, 10, 5, 2), entry(5, 3, 7, 1)];
        let bytes = encode_directory(&entries);
        // count, ids (0,1,4), runs (1,2,1), lengths (10,5,7), offsets (1,0,4)
        assert_eq!(bytes, vec![3, 0, 1, 4, 1, 2, 1, 10, 5, 7, 1, 0, 4]);
        assert_eq!(decode_directory(&bytes).unwrap(), entries);
    }

    #[test]
    fn small_directory_has_no_leaves() {
        let entries: Vec<_> = (0..100).map(|i| entry(i, i * 8, 8, 1)).collect();
        let dirs = build_directories(&entries).unwrap();
        assert_eq!(dirs.num_leaves, 0);
        assert!(dirs.leaves.is_empty());
        assert_eq!(decode_directory(&gunzip(&dirs.root).unwrap()).unwrap(), entries);
    }

    #[test]
    fn large_directory_spills_into_leaves() {
        // Scattered ids and lengths defeat gzip enough to overflow the root budget.
        let mut offset = 0_u64;
        let entries: Vec<_> = (0..60_000_u64)
            .map(|i| {
                let length = 100 + ((i * 7919) % 4093) as u32;
                let e = entry(i * 3 + (i * 31) % 3, offset, length, 1);
                offset += u64::from(length) + (i % 5);
                e
            })
            .collect();
        let dirs = build_directories(&entries).unwrap();
        assert!(dirs.num_leaves > 0);
        assert!(dirs.root.len() <= ArchiveConsts::ROOT_BUDGET);

        let root = decode_directory(&gunzip(&dirs.root).unwrap()).unwrap();
        assert!(root.iter().all(DirEntry::is_leaf));
        let mut flattened = Vec::new();
        for leaf in &root {
            let start = leaf.offset as usize;
            let bytes = &dirs.leaves[start..start + leaf.length as usize];
            flattened.extend(decode_directory(&gunzip(bytes).unwrap()).unwrap());
        }
        assert_eq!(flattened, entries);
    }
}
