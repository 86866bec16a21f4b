//! Drive-type detection for sizing the worker pool.
//!
//! Tile extraction is random-read heavy on the source raster, so the drive holding the
//! *input* decides how many decoders it pays to run at once.

use log::debug;
use std::path::Path;
use sysinfo::{Disk, DiskKind, Disks};

use crate::utils::config::WorkerThreadLimits;
use crate::utils::fd_limit::determine_threads_given_fd_limit;

/// Drive type for performance tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriveType {
    SSD,
    HDD,
    Network,
    Unknown,
}

impl DriveType {
    /// Worker count for this drive type before the FD cap.
    pub fn worker_threads(&self, limits: &WorkerThreadLimits) -> usize {
        let all = limits.all_threads.max(limits.floor);
        match self {
            DriveType::SSD => all,
            DriveType::HDD => all.min(limits.hdd_max),
            DriveType::Network => all.min(limits.network_max),
            DriveType::Unknown => all.min(limits.unknown_max),
        }
    }
}

fn is_network_fs(fs_type: &str) -> bool {
    let fs = fs_type.to_lowercase();
    ["nfs", "smb", "cifs", "afp", "webdav", "sshfs", "9p"]
        .iter()
        .any(|n| fs.contains(n))
}

/// Detect the drive type backing `path` (longest matching mount point wins).
pub fn drive_type_for_path(path: &Path) -> DriveType {
    let disks = Disks::new_with_refreshed_list();
    let disk = disks
        .iter()
        .filter(|d| path.starts_with(d.mount_point()))
        .max_by_key(|d| d.mount_point().as_os_str().len());

    match disk {
        Some(disk) => classify(disk),
        None => {
            debug!("No mounted disk found for {}", path.display());
            DriveType::Unknown
        }
    }
}

fn classify(disk: &Disk) -> DriveType {
    let fs_type = disk.file_system().to_string_lossy();
    debug!(
        "Source disk: mount={}, fs={}, kind={:?}",
        disk.mount_point().display(),
        fs_type,
        disk.kind()
    );
    if is_network_fs(&fs_type) {
        return DriveType::Network;
    }
    match disk.kind() {
        DiskKind::HDD => DriveType::HDD,
        DiskKind::SSD => DriveType::SSD,
        DiskKind::Unknown(_) => rotational_flag(disk).unwrap_or(DriveType::Unknown),
    }
}

/// `/sys/block/<dev>/queue/rotational`: 1 for spinning disks.
#[cfg(target_os = "linux")]
fn rotational_flag(disk: &Disk) -> Option<DriveType> {
    let dev = disk.name().to_str()?.strip_prefix("/dev/")?;
    // sda1 -> sda, nvme0n1p1 -> nvme0n1
    let base = if dev.starts_with("nvme") {
        dev.split('p').next().unwrap_or(dev)
    } else {
        dev.trim_end_matches(char::is_numeric)
    };
    let flag = std::fs::read_to_string(format!("/sys/block/{base}/queue/rotational")).ok()?;
    Some(if flag.trim() == "1" {
        DriveType::HDD
    } else {
        DriveType::SSD
    })
}

#[cfg(not(target_os = "linux"))]
fn rotational_flag(_disk: &Disk) -> Option<DriveType> {
    None
}

/// Returns `(num_workers, drive_type)` for a source raster at `input`.
///
/// `worker_override` replaces the drive-based choice; both are capped by the FD limit.
pub fn determine_workers_for_input(
    input: &Path,
    limits: &WorkerThreadLimits,
    worker_override: Option<usize>,
) -> (usize, DriveType) {
    let drive_type = drive_type_for_path(input);
    let wanted = worker_override.unwrap_or_else(|| drive_type.worker_threads(limits));
    let workers = determine_threads_given_fd_limit(wanted.max(limits.floor));
    debug!("Drive type: {drive_type:?}, using {workers} worker(s)");
    (workers, drive_type)
}
