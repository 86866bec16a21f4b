pub mod config;
pub mod env_override;
pub mod fd_limit;
pub mod logger;
pub(crate) mod slicer_toml;
pub mod tempfiles;

pub use config::*;
pub use env_override::{parse_workers, workers_from_env};
pub use fd_limit::{FDS_PER_WORKER, determine_threads_given_fd_limit, max_workers_by_fd_limit};
pub use logger::setup_logging;
pub use tempfiles::{prepare_spool_path, remove_partial_output};
