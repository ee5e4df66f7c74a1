//! SSE endpoint for real-time span streaming
//!
//! Subscribes to the per-run broadcast topic and forwards each ingested
//! span to the client as a `span` event. Fire-and-forget on the publishing
//! side; a lagging client loses the oldest buffered spans, never the stored
//! data.

use std::convert::Infallible;
use std::time::Duration;

use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::Stream;

use super::OtelApiState;
use crate::api::types::ApiError;
use crate::data::topics::TopicError;
use crate::domain::traces::{SpanData, run_topic};

const KEEP_ALIVE_SECS: u64 = 30;

pub async fn run_events(
    State(state): State<OtelApiState>,
    Path(run_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let topic = state
        .topics
        .broadcast_topic::<SpanData>(&run_topic(&run_id))
        .map_err(|e| {
            tracing::error!(error = %e, "Failed to resolve SSE topic");
            ApiError::Internal {
                message: "subscription failed".to_string(),
            }
        })?;
    let mut subscriber = topic.subscribe();
    let mut shutdown_rx = state.shutdown_rx.clone();

    let stream = async_stream::stream! {
        loop {
            tokio::select! {
                biased;
                _ = shutdown_rx.changed() => {
                    if *shutdown_rx.borrow() {
                        // Tell the client so it can reconnect immediately.
                        yield Ok(Event::default().event("terminate").data("shutdown"));
                        break;
                    }
                }
                result = subscriber.recv() => {
                    match result {
                        Ok(span) => {
                            match serde_json::to_string(&span) {
                                Ok(data) => {
                                    yield Ok(Event::default().event("span").data(data));
                                }
                                Err(e) => {
                                    tracing::error!(error = %e, "Failed to serialize SSE span");
                                }
                            }
                        }
                        Err(TopicError::Lagged(n)) => {
                            tracing::warn!(lagged = n, "SSE subscriber lagged behind");
                        }
                        Err(_) => break,
                    }
                }
            }
        }
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(KEEP_ALIVE_SECS))
            .text("keep-alive"),
    ))
}
