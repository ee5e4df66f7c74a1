//! Core application
//!
//! Startup ordering is a deployment invariant: the SQLite service (which
//! runs the span-table migration) is fully initialized before either
//! listener binds, so the migration's backup-rename step can never race a
//! live insert.

use std::sync::Arc;

use anyhow::{Context, Result};

use crate::api::{ApiServer, OtlpGrpcServer};
use crate::core::cli;
use crate::core::config::AppConfig;
use crate::core::shutdown::ShutdownService;
use crate::core::telemetry;
use crate::data::sqlite::SqliteService;
use crate::data::topics::TopicService;
use crate::domain::traces::IngestService;

pub struct CoreApp {
    pub config: AppConfig,
    pub shutdown: ShutdownService,
    pub database: Arc<SqliteService>,
    pub topics: Arc<TopicService>,
    pub ingest: Arc<IngestService>,
}

impl CoreApp {
    /// Run the application with CLI argument parsing
    pub async fn run() -> Result<()> {
        dotenvy::dotenv().ok();
        telemetry::init_logging();

        tracing::debug!("Application starting");

        let cli_config = cli::parse();
        let app = Self::init(&cli_config).await?;
        Self::start_server(app).await
    }

    async fn init(cli: &cli::CliConfig) -> Result<Self> {
        let config = AppConfig::load(cli);

        tokio::fs::create_dir_all(&config.data_dir)
            .await
            .with_context(|| {
                format!(
                    "Failed to create data directory: {}",
                    config.data_dir.display()
                )
            })?;

        // Runs the span-table migration before anything can write spans.
        let database = Arc::new(SqliteService::init(&config.data_dir).await?);
        let topics = Arc::new(TopicService::new());
        let ingest = Arc::new(IngestService::new(
            database.pool().clone(),
            topics.clone(),
        ));
        let shutdown = ShutdownService::new(database.clone());

        tracing::debug!(data_dir = %config.data_dir.display(), "Application initialized");

        Ok(Self {
            config,
            shutdown,
            database,
            topics,
            ingest,
        })
    }

    async fn start_server(app: Self) -> Result<()> {
        app.shutdown.install_signal_handlers();

        app.shutdown
            .register(
                app.database
                    .start_checkpoint_task(app.shutdown.subscribe()),
            )
            .await;

        if app.config.otel.grpc_enabled {
            let grpc_server = OtlpGrpcServer::new(
                &app.config.otel,
                &app.config.server.host,
                app.ingest.clone(),
            )?;
            let shutdown_rx = app.shutdown.subscribe();
            let handle = tokio::spawn(async move {
                if let Err(e) = grpc_server.start(shutdown_rx).await {
                    tracing::error!(error = %e, "OTLP gRPC server error");
                }
            });
            app.shutdown.register(handle).await;
        }

        let server = ApiServer::new(app);
        let app = server.start().await?;
        app.shutdown.shutdown().await;

        Ok(())
    }
}
