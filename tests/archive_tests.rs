use pmslicer::BoundingBox;
use pmslicer::archive::{
    ArchiveHeader, ArchiveSink, Compression, PmtilesReader, PmtilesWriter, TileType,
};
use serde_json::json;

fn header(min_zoom: u8, max_zoom: u8) -> ArchiveHeader {
    ArchiveHeader {
        bounds: BoundingBox::new(-1.0, -1.0, 1.0, 1.0),
        min_zoom,
        max_zoom,
        tile_compression: Compression::Unknown,
        tile_type: TileType::Unknown,
        metadata: json!({ "generator": "archive_tests" }),
    }
}

#[test]
fn test_out_of_order_appends_are_sorted() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("sorted.pmtiles");
    let mut writer = PmtilesWriter::create(&path).unwrap();
    for id in [7_u64, 2, 5, 0, 3] {
        writer.append(id, format!("tile-{id}").as_bytes()).unwrap();
    }
    let stats = writer.finalize(header(0, 2)).unwrap();
    assert_eq!(stats.addressed_tiles, 5);
    assert_eq!(stats.tile_contents, 5);

    let reader = PmtilesReader::open(&path).unwrap();
    assert_eq!(reader.tile_ids().unwrap(), vec![0, 2, 3, 5, 7]);
    assert_eq!(reader.get_tile(5).unwrap(), Some(&b"tile-5"[..]));
    assert_eq!(reader.get_tile(4).unwrap(), None);
    assert_eq!(reader.get_tile(99).unwrap(), None);
    assert_eq!(reader.metadata().unwrap()["generator"], "archive_tests");
    reader.verify().unwrap();
}

#[test]
fn test_identical_payloads_are_stored_once_and_merged_into_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dedup.pmtiles");
    let mut writer = PmtilesWriter::create(&path).unwrap();
    for id in [3_u64, 1, 2, 4, 10] {
        writer.append(id, b"ocean").unwrap();
    }
    writer.append(5, b"land").unwrap();
    let stats = writer.finalize(header(0, 3)).unwrap();
    assert_eq!(stats.addressed_tiles, 6);
    assert_eq!(stats.tile_contents, 2);
    // 1..=4 is one run, then 5, then 10.
    assert_eq!(stats.tile_entries, 3);

    let reader = PmtilesReader::open(&path).unwrap();
    assert_eq!(reader.header().tile_data_length, 9);
    assert_eq!(reader.get_tile(3).unwrap(), Some(&b"ocean"[..]));
    assert_eq!(reader.get_tile(10).unwrap(), Some(&b"ocean"[..]));
    assert_eq!(reader.get_tile(5).unwrap(), Some(&b"land"[..]));
    assert_eq!(reader.tile_ids().unwrap(), vec![1, 2, 3, 4, 5, 10]);
}

#[test]
fn test_duplicate_tile_id_fails_finalize_and_cleans_up() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("dup.pmtiles");
    let mut writer = PmtilesWriter::create(&path).unwrap();
    writer.append(4, b"a").unwrap();
    writer.append(4, b"b").unwrap();
    let err = writer.finalize(header(0, 1)).unwrap_err();
    assert!(err.to_string().contains("appended twice"));
    assert!(!path.exists());
    assert!(!dir.path().join("dup.pmtiles.spool").exists());
}

#[test]
fn test_abort_removes_partial_files() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("aborted.pmtiles");
    let mut writer = PmtilesWriter::create(&path).unwrap();
    assert!(path.exists());
    writer.append(1, b"x").unwrap();
    writer.abort().unwrap();
    assert!(!path.exists());
    assert!(!dir.path().join("aborted.pmtiles.spool").exists());
}

#[test]
fn test_large_archive_uses_leaf_directories() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("leaves.pmtiles");
    let mut writer = PmtilesWriter::create(&path).unwrap();
    // Sparse ids with distinct payloads keep every entry separate.
    let ids: Vec<u64> = (0..50_000_u64).map(|i| i * 3 + 1).collect();
    for &id in ids.iter().rev() {
        writer.append(id, &id.to_le_bytes()).unwrap();
    }
    writer.finalize(header(0, 12)).unwrap();

    let reader = PmtilesReader::open(&path).unwrap();
    assert!(reader.header().leaf_dirs_length > 0);
    assert!(reader.header().root_dir_length <= 16_384 - 127);
    let report = reader.verify().unwrap();
    assert!(report.leaf_directories > 0);
    assert_eq!(report.addressed_tiles, 50_000);
    for &id in [ids[0], ids[12_345], ids[49_999]].iter() {
        assert_eq!(reader.get_tile(id).unwrap(), Some(&id.to_le_bytes()[..]));
    }
    assert_eq!(reader.get_tile(2).unwrap(), None);
}

#[test]
fn test_header_bounds_and_center() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bounds.pmtiles");
    let writer = PmtilesWriter::create(&path).unwrap();
    let mut h = header(2, 5);
    h.bounds = BoundingBox::new(5.95, 45.82, 10.49, 47.81);
    writer.finalize(h).unwrap();

    let reader = PmtilesReader::open(&path).unwrap();
    let hdr = reader.header();
    assert_eq!(hdr.bounds_e7, [59_500_000, 458_200_000, 104_900_000, 478_100_000]);
    assert_eq!(hdr.center_zoom, 2);
    assert_eq!(hdr.center_lon_e7, 82_200_000);
    assert_eq!(hdr.center_lat_e7, 468_150_000);
}
