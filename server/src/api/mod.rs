//! API server and routes

pub mod routes;
mod server;
pub mod types;

pub use routes::otlp_collector::OtlpGrpcServer;
pub use server::ApiServer;
