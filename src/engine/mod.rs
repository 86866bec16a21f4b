//! Engine: CLI surface, handlers, tile encoding, progress, path checks.

pub mod arg_parser;
pub mod encode;
pub mod handlers;
pub mod progress;
pub mod tools;

pub use arg_parser::Cli;
pub use encode::{TileEncoder, decode_payload, serialize_grid};
pub use handlers::handle_run;
pub use tools::{check_output, resolve_input};
