//! Core application infrastructure

pub mod cli;
pub mod config;
pub mod constants;
pub mod shutdown;
pub mod telemetry;

pub use crate::app::CoreApp;
pub use cli::CliConfig;
pub use config::{AppConfig, OtelConfig, ServerConfig};
pub use shutdown::ShutdownService;
