//! Build Event Handlers
//!
//! Ingestion from the executor (websocket, one envelope per frame) and
//! replay/tail to consumers (Server-Sent-Events with a resumable cursor).

use std::convert::Infallible;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::sse::{Event as SseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use capstan_core::domain::event::Event;
use futures::stream::{self, Stream};
use serde::Deserialize;

use crate::api::error::{ApiError, ApiResult};
use crate::api::AppState;
use crate::bus::build_events_channel;
use crate::repository::{build_repository, event_repository};
use crate::stream::{BuildEventSource, EventStreamError};

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    pub from: Option<i64>,
}

/// GET /builds/{id}/events
/// Replay the build's event log from `from`, then tail it live
pub async fn stream_events(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Query(query): Query<StreamQuery>,
) -> ApiResult<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>> {
    if build_repository::find_by_id(&state.pool, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Build {} not found", id)));
    }

    let source = BuildEventSource::open(
        state.pool.clone(),
        &state.bus,
        id,
        query.from.unwrap_or(0),
    )
    .await
    .map_err(|err| ApiError::InternalError(err.to_string()))?;

    // Dropping the stream on client disconnect drops the source, which
    // stops the producer and releases its bus subscription.
    let stream = stream::unfold(Some(source), |source| async move {
        let mut source = source?;
        match source.next().await {
            Ok(event) => {
                let data = serde_json::to_string(&event.event)
                    .unwrap_or_else(|_| "{}".to_string());
                let sse = SseEvent::default()
                    .id(event.event_id.to_string())
                    .event(event.event.event_type.clone())
                    .data(data);
                Some((Ok(sse), Some(source)))
            }
            Err(EventStreamError::EndOfStream) => {
                Some((Ok(SseEvent::default().event("end").data("")), None))
            }
            Err(_) => None,
        }
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}

/// GET /jobs/{job}/builds/{id}/events (websocket)
/// Executor-side event ingestion: one `{type, version, payload}` per frame
pub async fn ingest_events(
    State(state): State<AppState>,
    Path((_job, id)): Path<(String, i64)>,
    ws: WebSocketUpgrade,
) -> ApiResult<impl IntoResponse> {
    if build_repository::find_by_id(&state.pool, id).await?.is_none() {
        return Err(ApiError::NotFound(format!("Build {} not found", id)));
    }

    Ok(ws.on_upgrade(move |socket| ingest(state, id, socket)))
}

async fn ingest(state: AppState, build_id: i64, mut socket: WebSocket) {
    while let Some(Ok(message)) = socket.recv().await {
        let frame = match message {
            Message::Text(text) => text,
            Message::Close(_) => break,
            _ => continue,
        };

        let event: Event = match serde_json::from_str(&frame) {
            Ok(event) => event,
            Err(err) => {
                tracing::warn!("Dropping malformed event for build {}: {}", build_id, err);
                continue;
            }
        };

        if let Err(err) = event_repository::save(&state.pool, build_id, &event).await {
            tracing::error!("Failed to persist event for build {}: {}", build_id, err);
            break;
        }

        if let Err(err) = state.bus.notify(&build_events_channel(build_id)).await {
            tracing::warn!("Failed to notify build {} subscribers: {}", build_id, err);
        }
    }
}
