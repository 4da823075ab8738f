use std::convert::Infallible;

use axum::{
    extract::State,
    response::sse::{Event, Sse},
};
use metrics::counter;
use serde_json::json;
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info};

use staff_map_core::types::MapMarker;

use crate::router::AppState;

/// Streams the current map view marker by marker.
///
/// One-shot and not resumable: each cached marker is delivered in order,
/// followed by a terminal status event. A cache read failure produces a
/// single error status instead.
pub async fn map_stream(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    counter!("map_stream_requests_total").increment(1);

    let events = match state.map_cache().read_markers().await {
        Ok(markers) => {
            info!(stage = "stream", markers = markers.len(), "streaming map cache");
            marker_events(markers)
        }
        Err(err) => {
            error!(stage = "stream", error = %err, "failed to read map cache");
            vec![status_event("error", Some(err.to_string()))]
        }
    };

    Sse::new(tokio_stream::iter(events).map(Ok::<Event, Infallible>))
}

fn marker_events(markers: Vec<MapMarker>) -> Vec<Event> {
    let mut events = Vec::with_capacity(markers.len() + 1);
    for marker in markers {
        match Event::default().json_data(&marker) {
            Ok(event) => events.push(event),
            Err(err) => {
                error!(stage = "stream", city = %marker.city, error = %err, "failed to encode marker");
                return vec![status_event("error", Some(err.to_string()))];
            }
        }
    }
    events.push(status_event("complete", None));
    events
}

fn status_event(status: &str, message: Option<String>) -> Event {
    let mut payload = json!({ "status": status });
    if let Some(message) = message {
        payload["message"] = json!(message);
    }
    Event::default()
        .json_data(&payload)
        .unwrap_or_else(|_| Event::default().data("{\"status\":\"error\"}"))
}
