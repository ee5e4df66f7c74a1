//! gRPC OTLP server

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Result;
use tokio::sync::watch;
use tonic::transport::Server as TonicServer;
use tonic::{Request, Response, Status};

use opentelemetry_proto::tonic::collector::trace::v1::{
    ExportTraceServiceRequest, ExportTraceServiceResponse,
    trace_service_server::{TraceService, TraceServiceServer},
};

use crate::core::config::OtelConfig;
use crate::core::constants::OTLP_BODY_LIMIT;
use crate::domain::traces::IngestService;

pub struct OtlpGrpcServer {
    addr: SocketAddr,
    ingest: Arc<IngestService>,
}

impl OtlpGrpcServer {
    pub fn new(config: &OtelConfig, host: &str, ingest: Arc<IngestService>) -> Result<Self> {
        let addr = SocketAddr::new(host.parse()?, config.grpc_port);
        Ok(Self { addr, ingest })
    }

    pub async fn start(self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        let addr = self.addr;

        tracing::debug!(%addr, "Starting OTLP gRPC server");

        TonicServer::builder()
            .add_service(
                TraceServiceServer::new(OtlpTraceService::new(self.ingest))
                    .max_decoding_message_size(OTLP_BODY_LIMIT)
                    .max_encoding_message_size(OTLP_BODY_LIMIT),
            )
            .serve_with_shutdown(addr, async move {
                let _ = shutdown_rx.wait_for(|&v| v).await;
                tracing::debug!("OTLP gRPC server shutting down");
            })
            .await?;

        Ok(())
    }
}

/// gRPC trace service
struct OtlpTraceService {
    ingest: Arc<IngestService>,
}

impl OtlpTraceService {
    fn new(ingest: Arc<IngestService>) -> Self {
        Self { ingest }
    }
}

#[tonic::async_trait]
impl TraceService for OtlpTraceService {
    async fn export(
        &self,
        request: Request<ExportTraceServiceRequest>,
    ) -> Result<Response<ExportTraceServiceResponse>, Status> {
        let request = request.into_inner();

        if let Err(e) = self.ingest.ingest(&request).await {
            tracing::error!(error = %e, "Failed to store trace batch");
            return Err(Status::internal("failed to store spans"));
        }

        Ok(Response::new(ExportTraceServiceResponse {
            partial_success: None,
        }))
    }
}
