//! Compile-time application constants

// =============================================================================
// Application identity
// =============================================================================

/// Application display name
pub const APP_NAME: &str = "AgentLens";

/// Lowercase name, used for log filters and default paths
pub const APP_NAME_LOWER: &str = "agentlens";

// =============================================================================
// Environment variables
// =============================================================================

/// Server host address
pub const ENV_HOST: &str = "AGENTLENS_HOST";

/// HTTP server port
pub const ENV_PORT: &str = "AGENTLENS_PORT";

/// OTLP gRPC port
pub const ENV_GRPC_PORT: &str = "AGENTLENS_GRPC_PORT";

/// Enable/disable the OTLP gRPC listener
pub const ENV_GRPC_ENABLED: &str = "AGENTLENS_GRPC_ENABLED";

/// Data directory override
pub const ENV_DATA_DIR: &str = "AGENTLENS_DATA_DIR";

/// Log filter override (falls back to RUST_LOG)
pub const ENV_LOG: &str = "AGENTLENS_LOG";

// =============================================================================
// Server defaults
// =============================================================================

pub const DEFAULT_HOST: &str = "127.0.0.1";

/// Default HTTP port (OTLP/HTTP plus the read API)
pub const DEFAULT_PORT: u16 = 4318;

/// Default OTLP gRPC port
pub const DEFAULT_GRPC_PORT: u16 = 4317;

/// Default data directory, relative to the working directory
pub const DEFAULT_DATA_DIR: &str = ".agentlens";

// =============================================================================
// OTLP ingestion
// =============================================================================

/// Maximum OTLP request body size (HTTP and gRPC)
pub const OTLP_BODY_LIMIT: usize = 64 * 1024 * 1024;

// =============================================================================
// SQLite
// =============================================================================

pub const SQLITE_DB_FILENAME: &str = "agentlens.db";

pub const SQLITE_MAX_CONNECTIONS: u32 = 5;

pub const SQLITE_BUSY_TIMEOUT_SECS: u64 = 30;

/// Negative value = KiB of page cache
pub const SQLITE_CACHE_SIZE: &str = "-64000";

pub const SQLITE_WAL_AUTOCHECKPOINT: &str = "1000";

pub const SQLITE_CHECKPOINT_INTERVAL_SECS: u64 = 300;

// =============================================================================
// Topics
// =============================================================================

/// Per-topic broadcast buffer; lagging SSE subscribers lose the oldest
/// messages beyond this.
pub const TOPIC_CHANNEL_CAPACITY: usize = 100_000;

// =============================================================================
// Shutdown
// =============================================================================

pub const SHUTDOWN_TIMEOUT_SECS: u64 = 300;
