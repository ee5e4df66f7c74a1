//! Domain logic for trace observability
//!
//! - `traces` - OpenTelemetry trace decoding, normalization, and ingestion

pub mod traces;

pub use traces::{IngestService, SpanData};
