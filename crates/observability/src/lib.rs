//! Logging setup shared by Huddle binaries.

mod args;
mod logging;

pub use args::LogArgs;
pub use logging::{init_logging, log_filter};
