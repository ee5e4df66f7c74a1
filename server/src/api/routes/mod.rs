//! API route handlers

pub mod health;
pub mod otel;
pub mod otlp_collector;
