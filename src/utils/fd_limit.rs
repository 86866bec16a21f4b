//! File descriptor limit detection for capping the worker pool (Unix).

/// Descriptors one tile worker holds: the source file, its map, plus slack for the decoder.
pub const FDS_PER_WORKER: usize = 4;

/// Descriptors the process needs regardless of pool size (stdio, output archive, spool).
const FDS_RESERVED: usize = 8;

/// Fraction of the process FD limit to use (leave headroom for other code).
const FD_LIMIT_FRACTION: f64 = 0.8;

/// Returns the soft limit for max open file descriptors, or `None` if unavailable (e.g. Windows).
#[cfg(unix)]
pub fn max_open_fds() -> Option<u64> {
    use std::mem::MaybeUninit;
    let mut rlim = MaybeUninit::<libc::rlimit>::uninit();
    if unsafe { libc::getrlimit(libc::RLIMIT_NOFILE, rlim.as_mut_ptr()) } != 0 {
        return None;
    }
    let rlim = unsafe { rlim.assume_init() };
    let cur = rlim.rlim_cur;
    // RLIM_INFINITY is typically !0 or u64::MAX; treat as "no practical limit"
    if cur == libc::RLIM_INFINITY || cur > i64::MAX as u64 {
        return None;
    }
    Some(cur)
}

#[cfg(not(unix))]
pub fn max_open_fds() -> Option<u64> {
    None
}

/// Workers that fit in ~80% of `limit` descriptors. Never below one.
pub fn workers_for_fd_limit(limit: u64) -> usize {
    let usable = (limit as f64 * FD_LIMIT_FRACTION) as usize;
    (usable.saturating_sub(FDS_RESERVED) / FDS_PER_WORKER).max(1)
}

/// Suggested max pool size for this process, or `None` if no limit is available.
pub fn max_workers_by_fd_limit() -> Option<usize> {
    max_open_fds().map(workers_for_fd_limit)
}

/// Cap `requested` by the FD limit, logging when it bites.
pub fn determine_threads_given_fd_limit(requested: usize) -> usize {
    match max_workers_by_fd_limit() {
        Some(cap) if cap < requested => {
            log::warn!(
                "Worker count {requested} capped to {cap} by the open-file limit; raise `ulimit -n` for more"
            );
            cap
        }
        _ => requested,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fd_cap_scales_with_limit() {
        assert_eq!(workers_for_fd_limit(0), 1);
        assert_eq!(workers_for_fd_limit(16), 1);
        // 1024 * 0.8 = 819; (819 - 8) / 4 = 202
        assert_eq!(workers_for_fd_limit(1024), 202);
    }

    #[test]
    fn cap_never_raises_the_request() {
        assert!(determine_threads_given_fd_limit(1) == 1);
    }
}
