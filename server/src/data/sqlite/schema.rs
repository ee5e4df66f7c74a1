//! SQLite schema definitions
//!
//! The span table in its current shape, its filter/sort indices, and the
//! aggregate view the dashboard reads. Everything is `IF NOT EXISTS` so the
//! schema can be re-applied on every startup, including right after the
//! span-table migration has rebuilt the table and dropped the view.

/// Current schema version
pub const SCHEMA_VERSION: i32 = 1;

/// Span table name. The migration renames the legacy table away from this
/// name before the new shape is created.
pub const SPAN_TABLE: &str = "span_table";

/// Aggregate view over the span table, dropped and recreated around the
/// span-table migration.
pub const MODEL_INVOCATION_VIEW: &str = "model_invocation_view";

/// Complete schema SQL
pub const SCHEMA: &str = r#"
-- =============================================================================
-- Infrastructure: Schema version tracking
-- =============================================================================
CREATE TABLE IF NOT EXISTS schema_version (
    id INTEGER PRIMARY KEY CHECK (id = 1),
    version INTEGER NOT NULL,
    applied_at INTEGER NOT NULL,
    description TEXT
);

CREATE TABLE IF NOT EXISTS schema_migrations (
    version INTEGER PRIMARY KEY,
    name TEXT NOT NULL,
    applied_at INTEGER NOT NULL,
    execution_time_ms INTEGER,
    success INTEGER NOT NULL DEFAULT 1
);
"#;

/// Span table DDL, shared by the initial schema and the migration rebuild.
///
/// `id` is the span identifier; timestamps are decimal nanosecond strings;
/// the JSON columns hold the canonical record verbatim, the scalar columns
/// are its projection.
pub const SPAN_TABLE_DDL: &str = r#"
CREATE TABLE IF NOT EXISTS span_table (
    id TEXT PRIMARY KEY NOT NULL,
    trace_id TEXT NOT NULL,
    span_id TEXT NOT NULL,
    trace_state TEXT,
    parent_span_id TEXT,
    flags INTEGER,
    name TEXT NOT NULL,
    kind INTEGER NOT NULL,
    start_time_unix_nano TEXT NOT NULL,
    end_time_unix_nano TEXT NOT NULL,
    attributes TEXT NOT NULL,
    dropped_attributes_count INTEGER,
    events TEXT,
    dropped_events_count INTEGER,
    links TEXT,
    dropped_links_count INTEGER,
    status TEXT NOT NULL,
    resource TEXT NOT NULL,
    scope TEXT NOT NULL,
    status_code INTEGER,
    service_name TEXT,
    operation_name TEXT,
    instrumentation_name TEXT,
    instrumentation_version TEXT,
    model TEXT,
    input_tokens INTEGER,
    output_tokens INTEGER,
    total_tokens INTEGER,
    run_id TEXT,
    latency_ns INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_span_trace_id ON span_table(trace_id);
CREATE INDEX IF NOT EXISTS idx_span_span_id ON span_table(span_id);
CREATE INDEX IF NOT EXISTS idx_span_parent_span_id ON span_table(parent_span_id);
CREATE INDEX IF NOT EXISTS idx_span_start_time ON span_table(start_time_unix_nano);
CREATE INDEX IF NOT EXISTS idx_span_status_code ON span_table(status_code);
CREATE INDEX IF NOT EXISTS idx_span_latency_ns ON span_table(latency_ns);
CREATE INDEX IF NOT EXISTS idx_span_service_name ON span_table(service_name);
CREATE INDEX IF NOT EXISTS idx_span_operation_name ON span_table(operation_name);
CREATE INDEX IF NOT EXISTS idx_span_instrumentation_name ON span_table(instrumentation_name);
CREATE INDEX IF NOT EXISTS idx_span_model ON span_table(model);
CREATE INDEX IF NOT EXISTS idx_span_input_tokens ON span_table(input_tokens);
CREATE INDEX IF NOT EXISTS idx_span_output_tokens ON span_table(output_tokens);
CREATE INDEX IF NOT EXISTS idx_span_total_tokens ON span_table(total_tokens);
CREATE INDEX IF NOT EXISTS idx_span_run_id ON span_table(run_id);
"#;

/// Chat-model invocation counts and token totals, overall and over trailing
/// windows. Timestamps are stored as text, so they are cast before being
/// compared against the window cutoffs.
pub const MODEL_INVOCATION_VIEW_DDL: &str = r#"
CREATE VIEW IF NOT EXISTS model_invocation_view AS
SELECT
    COUNT(CASE
        WHEN operation_name IN ('chat', 'chat_model') THEN 1
    END) AS total_model_invocations,
    COALESCE(SUM(CASE
        WHEN operation_name IN ('chat', 'chat_model')
        THEN COALESCE(input_tokens, 0) + COALESCE(output_tokens, 0)
        ELSE 0
    END), 0) AS total_tokens,
    COALESCE(SUM(CASE
        WHEN operation_name IN ('chat', 'chat_model')
         AND CAST(start_time_unix_nano AS INTEGER) > (strftime('%s', 'now', '-7 days') * 1000000000)
        THEN COALESCE(input_tokens, 0) + COALESCE(output_tokens, 0)
        ELSE 0
    END), 0) AS tokens_week,
    COALESCE(SUM(CASE
        WHEN operation_name IN ('chat', 'chat_model')
         AND CAST(start_time_unix_nano AS INTEGER) > (strftime('%s', 'now', '-1 month') * 1000000000)
        THEN COALESCE(input_tokens, 0) + COALESCE(output_tokens, 0)
        ELSE 0
    END), 0) AS tokens_month,
    COALESCE(SUM(CASE
        WHEN operation_name IN ('chat', 'chat_model')
         AND CAST(start_time_unix_nano AS INTEGER) > (strftime('%s', 'now', '-1 year') * 1000000000)
        THEN COALESCE(input_tokens, 0) + COALESCE(output_tokens, 0)
        ELSE 0
    END), 0) AS tokens_year,
    COUNT(CASE
        WHEN operation_name IN ('chat', 'chat_model')
         AND CAST(start_time_unix_nano AS INTEGER) > (strftime('%s', 'now', '-7 days') * 1000000000)
        THEN 1
    END) AS model_invocations_week,
    COUNT(CASE
        WHEN operation_name IN ('chat', 'chat_model')
         AND CAST(start_time_unix_nano AS INTEGER) > (strftime('%s', 'now', '-1 month') * 1000000000)
        THEN 1
    END) AS model_invocations_month,
    COUNT(CASE
        WHEN operation_name IN ('chat', 'chat_model')
         AND CAST(start_time_unix_nano AS INTEGER) > (strftime('%s', 'now', '-1 year') * 1000000000)
        THEN 1
    END) AS model_invocations_year
FROM span_table
"#;
