//! pmslicer CLI: slice a georeferenced raster into a PMTiles archive.

use anyhow::Result;
use clap::Parser;
use pmslicer::engine::arg_parser::Cli;
use pmslicer::engine::handle_run;
use std::time::Instant;

fn main() -> Result<()> {
    let start_time = Instant::now();
    let cli = Cli::parse();
    handle_run(&cli)?;
    log::debug!("Total time: {:?}", start_time.elapsed());
    Ok(())
}
