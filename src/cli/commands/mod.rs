//! CLI command implementations.

mod config;
mod layout;
mod start;

pub use config::{run_config, ConfigArgs, ConfigCommand};
pub use layout::{run_layout, LayoutArgs, LayoutCommand};
pub use start::{run_start_with_config, StartArgs};
