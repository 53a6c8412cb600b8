use std::sync::Arc;

use axum::{
    extract::State,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
};
use futures::{Stream, StreamExt};
use tracing::debug;

use crate::app::AppState;


/// `GET /api/events`: one SSE frame per published event, named by its type.
/// The stream ends when the hub closes its observers.
pub async fn events(
    State(state): State<Arc<AppState>>,
) -> Sse<impl Stream<Item = Result<SseEvent, axum::Error>>> {
    let subscription = state.service.subscribe();
    debug!("SSE client attached as observer {}", subscription.id());

    let stream = subscription.map(|event| {
        SseEvent::default()
            .event(&event.event_type)
            .id(event.event_id.to_string())
            .json_data(&event.payload)
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
