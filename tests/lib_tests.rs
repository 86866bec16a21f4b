use pmslicer::engine::{TileEncoder, decode_payload};
use pmslicer::pipeline::relay_queue;
use pmslicer::tiles::{TileEnumerator, tile_id_to_zxy, validate_zoom_range, zxy_to_tile_id};
use pmslicer::{BoundingBox, PixelGrid, TileCoord};
use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

fn bbox(min_lon: f64, min_lat: f64, max_lon: f64, max_lat: f64) -> BoundingBox {
    BoundingBox::new(min_lon, min_lat, max_lon, max_lat)
}

// --- enumerator ---

#[test]
fn test_count_matches_enumeration() {
    let boxes = [
        bbox(-1.0, -1.0, 1.0, 1.0),
        bbox(-180.0, -90.0, 180.0, 90.0),
        bbox(5.9, 45.8, 10.5, 47.8),
        bbox(-122.52, 37.70, -122.35, 37.83),
        bbox(0.0, 0.0, 0.0, 0.0),
        bbox(170.0, -20.0, -170.0, -10.0),
        bbox(-180.0, 85.0, 180.0, 89.9),
    ];
    for b in &boxes {
        for (min_z, max_z) in [(0, 0), (0, 4), (3, 7), (9, 9)] {
            let e = TileEnumerator::new(b, min_z, max_z).unwrap();
            let tiles: Vec<TileCoord> = e.iter().collect();
            assert_eq!(e.count(), tiles.len() as u64, "{b:?} z{min_z}-{max_z}");
            // restartable
            assert_eq!(e.iter().count(), tiles.len());
            let unique: HashSet<_> = tiles.iter().collect();
            assert_eq!(unique.len(), tiles.len(), "duplicates for {b:?}");
            assert!(tiles.iter().all(TileCoord::is_valid));
        }
    }
}

#[test]
fn test_equatorial_box_tiles() {
    let e = TileEnumerator::new(&bbox(-1.0, -1.0, 1.0, 1.0), 0, 2).unwrap();
    let tiles: Vec<_> = e.iter().collect();
    assert_eq!(tiles.len(), 9);
    assert!(tiles.contains(&TileCoord::new(0, 0, 0)));
    for x in 1..=2 {
        for y in 1..=2 {
            assert!(tiles.contains(&TileCoord::new(2, x, y)));
        }
    }
}

#[test]
fn test_degenerate_box_yields_one_tile_per_level() {
    let e = TileEnumerator::new(&bbox(13.4, 52.5, 13.4, 52.5), 0, 12).unwrap();
    assert_eq!(e.count(), 13);
    let zooms: Vec<u8> = e.iter().map(|t| t.z).collect();
    assert_eq!(zooms, (0..=12).collect::<Vec<_>>());
}

#[test]
fn test_whole_world_has_no_wrap_duplicates() {
    let e = TileEnumerator::new(&bbox(-180.0, -90.0, 180.0, 90.0), 0, 5).unwrap();
    let expected: u64 = (0..=5).map(|z| 4_u64.pow(z)).sum();
    assert_eq!(e.count(), expected);
}

#[test]
fn test_antimeridian_box() {
    let e = TileEnumerator::new(&bbox(170.0, -20.0, -170.0, -10.0), 3, 3).unwrap();
    let xs: HashSet<u32> = e.iter().map(|t| t.x).collect();
    assert_eq!(xs, HashSet::from([0, 7]));
}

#[test]
fn test_invalid_zoom_range() {
    assert!(validate_zoom_range(3, 2).is_err());
    assert!(validate_zoom_range(0, 31).is_err());
    assert!(TileEnumerator::new(&bbox(0.0, 0.0, 1.0, 1.0), 5, 4).is_err());
    assert!(TileEnumerator::new(&bbox(0.0, 1.0, 1.0, 0.0), 0, 1).is_err());
    assert!(TileEnumerator::new(&bbox(f64::NAN, 0.0, 1.0, 1.0), 0, 1).is_err());
}

// --- tile ids ---

#[test]
fn test_tile_id_injective_and_zoom_ordered() {
    let mut seen = HashSet::new();
    let mut max_prev_level = None;
    for z in 0..=6_u8 {
        let n = 1_u32 << z;
        let mut min_level = u64::MAX;
        let mut max_level = 0;
        for x in 0..n {
            for y in 0..n {
                let id = zxy_to_tile_id(z, x, y);
                assert!(seen.insert(id), "duplicate id {id}");
                assert_eq!(tile_id_to_zxy(id), Some((z, x, y)));
                min_level = min_level.min(id);
                max_level = max_level.max(id);
            }
        }
        if let Some(prev) = max_prev_level {
            assert!(min_level > prev, "zoom {z} overlaps the previous level");
        }
        max_prev_level = Some(max_level);
    }
}

#[test]
fn test_tile_coord_id_matches_free_function() {
    let c = TileCoord::new(12, 2200, 1343);
    assert_eq!(c.tile_id(), zxy_to_tile_id(12, 2200, 1343));
    assert_eq!(c.to_string(), "12/2200/1343");
}

// --- encoder ---

#[test]
fn test_all_nodata_grids_never_produce_payloads() {
    let encoder = TileEncoder::new(0.0, 1);
    for (w, h) in [(1, 1), (3, 7), (256, 256)] {
        let grid = PixelGrid::filled(w, h, 0.0);
        assert!(encoder.encode(TileCoord::new(0, 0, 0), &grid).unwrap().is_none());
    }
}

#[test]
fn test_payload_decodes_to_grid() {
    let encoder = TileEncoder::new(0.0, 1);
    let grid = PixelGrid::from_samples(3, 2, vec![0.0, 1.5, -2.0, 3.25, 0.0, 9.0]);
    let payload = encoder
        .encode(TileCoord::new(4, 3, 9), &grid)
        .unwrap()
        .unwrap();
    assert_eq!(payload.tile_id, zxy_to_tile_id(4, 3, 9));
    assert_eq!(decode_payload(&payload.data, 3, 2).unwrap(), grid);
    assert!(decode_payload(&payload.data, 4, 4).is_err());
}

// --- relay ---

#[test]
fn test_relay_backpressure_blocks_then_releases() {
    let (tx, rx) = relay_queue::<u32>(2);
    tx.push(1).unwrap();
    tx.push(2).unwrap();

    let pushed = Arc::new(AtomicBool::new(false));
    let producer = {
        let tx = tx.clone();
        let pushed = Arc::clone(&pushed);
        thread::spawn(move || {
            tx.push(3).unwrap();
            pushed.store(true, Ordering::SeqCst);
        })
    };

    thread::sleep(Duration::from_millis(150));
    assert!(!pushed.load(Ordering::SeqCst), "push past capacity did not block");

    assert_eq!(rx.pop(), Some(1));
    producer.join().unwrap();
    assert!(pushed.load(Ordering::SeqCst));

    drop(tx);
    assert_eq!(rx.pop(), Some(2));
    assert_eq!(rx.pop(), Some(3));
    assert_eq!(rx.pop(), None);
}

#[test]
fn test_relay_shutdown_unblocks_waiting_consumer() {
    let (tx, rx) = relay_queue::<u32>(2);
    let consumer = thread::spawn(move || rx.pop());
    thread::sleep(Duration::from_millis(50));
    drop(tx);
    assert_eq!(consumer.join().unwrap(), None);
}

// --- bounds ---

#[test]
fn test_bounds_fixed_point_rounds() {
    let b = bbox(-1.0, -1.0, 1.0, 1.0);
    assert_eq!(b.to_e7(), [-10_000_000, -10_000_000, 10_000_000, 10_000_000]);
    assert_eq!(bbox(0.12345678, 0.0, 0.0, 0.0).to_e7()[0], 1_234_568);
    assert_eq!(bbox(170.0, 0.0, -170.0, 10.0).center(), (180.0, 5.0));
}
