use std::path::PathBuf;

use clap::Parser;

use super::constants::{ENV_DATA_DIR, ENV_GRPC_ENABLED, ENV_GRPC_PORT, ENV_HOST, ENV_PORT};

#[derive(Parser)]
#[command(name = "agentlens")]
#[command(version, about = "Agent observability server", long_about = None)]
pub struct Cli {
    /// Server host address
    #[arg(long, short = 'H', env = ENV_HOST)]
    pub host: Option<String>,

    /// HTTP server port (OTLP/HTTP ingestion plus the read API)
    #[arg(long, short = 'p', env = ENV_PORT)]
    pub port: Option<u16>,

    /// Enable or disable the OTLP gRPC listener
    #[arg(long, env = ENV_GRPC_ENABLED)]
    pub grpc: Option<bool>,

    /// OTLP gRPC port
    #[arg(long, env = ENV_GRPC_PORT)]
    pub grpc_port: Option<u16>,

    /// Data directory
    #[arg(long, short = 'd', env = ENV_DATA_DIR)]
    pub data_dir: Option<PathBuf>,
}

/// Parsed CLI configuration
pub struct CliConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub grpc: Option<bool>,
    pub grpc_port: Option<u16>,
    pub data_dir: Option<PathBuf>,
}

pub fn parse() -> CliConfig {
    let cli = Cli::parse();
    CliConfig {
        host: cli.host,
        port: cli.port,
        grpc: cli.grpc,
        grpc_port: cli.grpc_port,
        data_dir: cli.data_dir,
    }
}
