//! Session configuration: immutable policy built once from raw flags.

mod types;
mod validation;

pub use types::{CopySessionConfig, GzipMode, GzipPolicy, GzipScope};
pub use validation::validate;
