//! API server initialization

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use axum::Router;
use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::routes::{health, otel, otlp_collector};
use crate::core::CoreApp;
use crate::core::constants::OTLP_BODY_LIMIT;

pub struct ApiServer {
    app: CoreApp,
}

impl ApiServer {
    pub fn new(app: CoreApp) -> Self {
        Self { app }
    }

    /// Returns CoreApp for graceful shutdown
    pub async fn start(self) -> Result<CoreApp> {
        let Self { app } = self;

        let shutdown = app.shutdown.clone();
        let addr = SocketAddr::new(app.config.server.host.parse()?, app.config.server.port);

        let otlp_routes = otlp_collector::routes(app.ingest.clone())
            .layer(DefaultBodyLimit::max(OTLP_BODY_LIMIT));

        let otel_query_routes = otel::routes(
            app.database.pool().clone(),
            app.topics.clone(),
            app.shutdown.subscribe(),
        );

        let router = Router::new()
            .route("/api/health", get(health::health))
            .nest("/v1", otlp_routes)
            .nest("/api", otel_query_routes)
            .layer(TraceLayer::new_for_http())
            .layer(CorsLayer::permissive());

        tracing::info!(%addr, "Starting HTTP server");
        let listener = TcpListener::bind(addr).await?;
        axum::serve(listener, router)
            .with_graceful_shutdown(shutdown.wait())
            .await?;

        Ok(app)
    }
}
