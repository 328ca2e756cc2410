//! Build event stream source
//!
//! Presents a build's persisted event log as a resumable, ordered stream:
//! replay from a cursor, block on the notification bus once caught up,
//! terminate cleanly when the build completes or the consumer closes.

use std::sync::{Arc, Mutex};

use capstan_core::domain::event::{Event, SavedEvent};
use sqlx::PgPool;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::bus::{build_events_channel, BusClosed, NotificationBus, Notifier};

/// Events read per poll. Also the buffer capacity, so a slow consumer
/// backpressures the producer instead of growing memory, and the producer
/// stays responsive to close while blocked on the buffer.
const BATCH_SIZE: usize = 2000;

/// Terminal condition of a build event source; sticky once returned
#[derive(Debug, Clone)]
pub enum EventStreamError {
    /// The consumer closed the source
    Closed,
    /// The build completed and every event has been delivered
    EndOfStream,
    /// A storage read failed
    Database(Arc<sqlx::Error>),
}

impl std::fmt::Display for EventStreamError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventStreamError::Closed => write!(f, "build event stream closed"),
            EventStreamError::EndOfStream => write!(f, "end of build event stream"),
            EventStreamError::Database(err) => write!(f, "build event stream read failed: {}", err),
        }
    }
}

impl std::error::Error for EventStreamError {}

/// A consumer's cursor over one build's event log
pub struct BuildEventSource {
    events: mpsc::Receiver<SavedEvent>,
    stop: watch::Sender<bool>,
    err: Arc<Mutex<Option<EventStreamError>>>,
    producer: Option<JoinHandle<()>>,
}

impl BuildEventSource {
    /// Opens a stream over `build_id`'s events with ids greater than `from`
    ///
    /// The bus subscription is registered before the first poll, so events
    /// written after `open` resolves are never missed.
    pub async fn open(
        pool: PgPool,
        bus: &NotificationBus,
        build_id: i64,
        from: i64,
    ) -> Result<Self, BusClosed> {
        let notifier = bus.listen(&build_events_channel(build_id)).await?;

        let (events_tx, events) = mpsc::channel(BATCH_SIZE);
        let (stop, stop_rx) = watch::channel(false);
        let err = Arc::new(Mutex::new(None));

        let producer = Producer {
            pool,
            build_id,
            cursor: from,
            notifier,
            events: events_tx,
            stop: stop_rx,
            err: Arc::clone(&err),
        };

        Ok(Self {
            events,
            stop,
            err,
            producer: Some(tokio::spawn(producer.run())),
        })
    }

    /// Returns the next event in `event_id` order
    ///
    /// Once a terminal condition is reached it is returned forever.
    pub async fn next(&mut self) -> Result<SavedEvent, EventStreamError> {
        match self.events.recv().await {
            Some(event) => Ok(event),
            None => Err(self.terminal_error()),
        }
    }

    /// Stops the producer and waits for it to release its subscriptions
    ///
    /// Idempotent; subsequent `next` calls return `Closed`.
    pub async fn close(&mut self) {
        let _ = self.stop.send(true);
        if let Some(producer) = self.producer.take() {
            let _ = producer.await;
        }
    }

    fn terminal_error(&self) -> EventStreamError {
        self.err
            .lock()
            .unwrap()
            .clone()
            .unwrap_or(EventStreamError::Closed)
    }
}

struct Producer {
    pool: PgPool,
    build_id: i64,
    cursor: i64,
    notifier: Notifier,
    events: mpsc::Sender<SavedEvent>,
    stop: watch::Receiver<bool>,
    err: Arc<Mutex<Option<EventStreamError>>>,
}

impl Producer {
    async fn run(mut self) {
        let err = self.collect().await;
        *self.err.lock().unwrap() = Some(err);
        // Dropping self closes the buffer and unregisters the notifier.
    }

    async fn collect(&mut self) -> EventStreamError {
        loop {
            if *self.stop.borrow() {
                return EventStreamError::Closed;
            }

            // Completed is read before the batch: the loop only terminates
            // on an empty read taken after completion was observed, so
            // events racing the completion flag are never dropped.
            let completed: bool =
                match sqlx::query_scalar("SELECT completed FROM builds WHERE id = $1")
                    .bind(self.build_id)
                    .fetch_one(&self.pool)
                    .await
                {
                    Ok(completed) => completed,
                    Err(err) => return EventStreamError::Database(Arc::new(err)),
                };

            let rows = match sqlx::query_as::<_, EventRow>(
                r#"
                SELECT build_id, event_id, type, version, payload
                FROM build_events
                WHERE build_id = $1 AND event_id > $2
                ORDER BY event_id ASC
                LIMIT $3
                "#,
            )
            .bind(self.build_id)
            .bind(self.cursor)
            .bind(BATCH_SIZE as i64)
            .fetch_all(&self.pool)
            .await
            {
                Ok(rows) => rows,
                Err(err) => return EventStreamError::Database(Arc::new(err)),
            };

            let full_batch = rows.len() == BATCH_SIZE;

            for row in rows {
                let event: SavedEvent = row.into();
                self.cursor = event.event_id;

                tokio::select! {
                    sent = self.events.send(event) => {
                        if sent.is_err() {
                            return EventStreamError::Closed;
                        }
                    }
                    _ = self.stop.changed() => return EventStreamError::Closed,
                }
            }

            if full_batch {
                // still more events
                continue;
            }

            if completed {
                return EventStreamError::EndOfStream;
            }

            tokio::select! {
                _ = self.notifier.notified() => {}
                _ = self.stop.changed() => return EventStreamError::Closed,
            }
        }
    }
}

#[derive(sqlx::FromRow)]
struct EventRow {
    build_id: i64,
    event_id: i64,
    #[sqlx(rename = "type")]
    event_type: String,
    version: String,
    payload: serde_json::Value,
}

impl From<EventRow> for SavedEvent {
    fn from(row: EventRow) -> Self {
        SavedEvent {
            build_id: row.build_id,
            event_id: row.event_id,
            event: Event {
                event_type: row.event_type,
                version: row.version,
                payload: row.payload,
            },
        }
    }
}
