//! Trace ingestion and normalization pipeline
//!
//! Leaf-first:
//!
//! - `codec` - wire primitives (identifiers, timestamps, typed key-values)
//! - `attributes` - flat dotted keys to nested trees and back
//! - `model` - the canonical `SpanData` record
//! - `legacy` - pre-convention attribute rewrite
//! - `decode` - span decoder and defensive batch processor
//! - `project` - derived scalar columns for the persisted row
//! - `record` - historical-row conversion for the table migration
//! - `ingest` - the transport-facing entry point

mod attributes;
mod codec;
mod decode;
mod ingest;
mod legacy;
mod model;
mod project;
mod record;

pub use decode::{
    DecodeError, decode_span, decode_span_json, process_export, process_export_json,
};
pub use ingest::{IngestService, run_topic};
pub use legacy::{LegacyConversion, OldSpanKind, convert_old_protocol};
pub use model::{SpanData, SpanEvent, SpanLink, SpanResource, SpanScope, SpanStatus};
pub use project::{SpanRow, calculate_total_tokens, project_row};
pub use record::{RecordError, convert_record};
