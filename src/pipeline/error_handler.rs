use crate::TileCoord;

/// Failed tiles remembered per worker for the end-of-run report.
pub const MAX_REPORTED_FAILURES: usize = 16;

/// Log the per-tile failure tally after the pool is joined. Each failure was already warned
/// about when it happened; this is the roll-up.
pub fn report_failed_tiles(failed: usize, sample: &[TileCoord], verbose: bool) {
    if failed == 0 {
        return;
    }
    log::warn!("{failed} tile(s) failed and were skipped");
    if verbose {
        let listed: Vec<String> = sample.iter().map(ToString::to_string).collect();
        let more = if failed > sample.len() { ", ..." } else { "" };
        log::warn!("  failed: {}{more}", listed.join(", "));
    }
}
