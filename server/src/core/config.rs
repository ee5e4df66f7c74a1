//! Runtime configuration
//!
//! Assembled once at startup from CLI flags (which carry their own env
//! fallbacks) and compile-time defaults.

use std::path::PathBuf;

use super::cli::CliConfig;
use super::constants::{DEFAULT_DATA_DIR, DEFAULT_GRPC_PORT, DEFAULT_HOST, DEFAULT_PORT};

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub otel: OtelConfig,
    pub data_dir: PathBuf,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone)]
pub struct OtelConfig {
    pub grpc_enabled: bool,
    pub grpc_port: u16,
}

impl AppConfig {
    pub fn load(cli: &CliConfig) -> Self {
        Self {
            server: ServerConfig {
                host: cli.host.clone().unwrap_or_else(|| DEFAULT_HOST.to_string()),
                port: cli.port.unwrap_or(DEFAULT_PORT),
            },
            otel: OtelConfig {
                grpc_enabled: cli.grpc.unwrap_or(true),
                grpc_port: cli.grpc_port.unwrap_or(DEFAULT_GRPC_PORT),
            },
            data_dir: cli
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
        }
    }
}
