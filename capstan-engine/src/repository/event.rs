//! Build Event Repository
//!
//! Append-only persistence for build event logs. Events are opaque to the
//! engine; each insert allocates the build's next `event_id`, keeping the
//! per-build sequence strictly increasing. The engine ingests one build's
//! events through a single websocket, so no two writers race on a sequence.

use capstan_core::domain::event::Event;
use sqlx::PgPool;

/// Persist one event, returning the sequence number it was assigned
pub async fn save(pool: &PgPool, build_id: i64, event: &Event) -> Result<i64, sqlx::Error> {
    let event_id: i64 = sqlx::query_scalar(
        r#"
        INSERT INTO build_events (build_id, event_id, type, version, payload)
        SELECT $1, COALESCE(MAX(event_id), 0) + 1, $2, $3, $4
        FROM build_events
        WHERE build_id = $1
        RETURNING event_id
        "#,
    )
    .bind(build_id)
    .bind(&event.event_type)
    .bind(&event.version)
    .bind(&event.payload)
    .fetch_one(pool)
    .await?;

    Ok(event_id)
}

/// Number of events persisted for a build
pub async fn count_for_build(pool: &PgPool, build_id: i64) -> Result<i64, sqlx::Error> {
    let row: (i64,) = sqlx::query_as(
        r#"
        SELECT COUNT(*) FROM build_events WHERE build_id = $1
        "#,
    )
    .bind(build_id)
    .fetch_one(pool)
    .await?;

    Ok(row.0)
}
