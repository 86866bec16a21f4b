use clap::Parser;
use std::path::PathBuf;

/// Slice a georeferenced raster into a single-file PMTiles pyramid.
#[derive(Clone, Debug, Parser)]
#[command(name = "pmslicer", version)]
#[command(about = "Slice a GeoTIFF/COG into a PMTiles archive of float32 tiles.")]
pub struct Cli {
    /// Source raster (GeoTIFF / COG in EPSG:4326 or EPSG:3857).
    #[arg(value_name = "INPUT_FILE")]
    pub input_file: PathBuf,

    /// Destination archive (.pmtiles). Overwritten if it exists.
    #[arg(value_name = "OUTPUT_FILE")]
    pub output_file: PathBuf,

    /// Lowest zoom level to generate.
    #[arg(long = "min_zoom", alias = "min-zoom", value_parser = clap::value_parser!(u8))]
    pub min_zoom: u8,

    /// Highest zoom level to generate (inclusive, at most 30).
    #[arg(long = "max_zoom", alias = "max-zoom", value_parser = clap::value_parser!(u8))]
    pub max_zoom: u8,

    /// Worker threads. Overrides PMSLICER_WORKERS and the config file; still capped by the FD limit.
    #[arg(long, short = 'w', value_parser = clap::value_parser!(u64).range(1..))]
    pub workers: Option<u64>,

    /// Tile edge in pixels.
    #[arg(long, value_parser = clap::value_parser!(u32).range(1..=4096))]
    pub tile_size: Option<u32>,

    /// Encoded tiles allowed in flight between workers and the archive writer.
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub queue_capacity: Option<u64>,

    /// zlib level for tile payloads (0-9).
    #[arg(long, value_parser = clap::value_parser!(u32).range(0..=9))]
    pub compression_level: Option<u32>,

    /// Re-open the archive after writing and check its directory against the header.
    #[arg(long, num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verify: Option<bool>,

    /// Verbose output.
    #[arg(long, short = 'v', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub verbose: Option<bool>,

    /// No progress bar.
    #[arg(long, short = 'q', num_args = 0..=1, default_missing_value = "true", value_parser = clap::value_parser!(bool))]
    pub quiet: Option<bool>,
}
