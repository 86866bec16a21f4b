//! Slippy-map tile grid: enumeration, TileID encoding, Web Mercator math.

pub mod enumerate;
pub mod mercator;
pub mod tile_id;

pub use enumerate::{TileEnumerator, ZoomRange, validate_zoom_range};
pub use tile_id::{tile_id_to_zxy, zxy_to_tile_id};
