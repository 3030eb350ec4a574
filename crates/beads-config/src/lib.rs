//! Workspace configuration and directory layout for the beads system.

pub mod config;
pub mod workspace;

pub use config::{BeadsConfig, ConfigError, load_config, save_config};
pub use workspace::{BEADS_DIR_ENV, BEADS_DIR_NAME, Workspace};
