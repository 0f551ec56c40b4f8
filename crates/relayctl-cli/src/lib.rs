//! Shared pieces of the relayctl binary

pub mod config;
pub mod guard;

pub use config::{CliConfig, ConfigManager};
