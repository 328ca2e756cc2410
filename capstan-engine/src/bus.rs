//! Notification bus
//!
//! Process-wide fan-out of database NOTIFY wake-ups. One background task owns
//! the shared `PgListener`; an in-process registry multiplexes it so a
//! channel with many subscribers costs a single LISTEN. Wake-ups carry no
//! payload and are coalesced per subscriber; consumers re-poll storage on
//! every wake-up, which also absorbs the wake-ups a listener reconnect can
//! drop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use sqlx::postgres::PgListener;
use sqlx::PgPool;
use tokio::sync::{mpsc, oneshot};

/// Channel carrying a build's event wake-ups
pub fn build_events_channel(build_id: i64) -> String {
    format!("build_events_{}", build_id)
}

/// The bus dispatch task has shut down
#[derive(Debug)]
pub struct BusClosed;

impl std::fmt::Display for BusClosed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification bus is closed")
    }
}

impl std::error::Error for BusClosed {}

enum Command {
    Listen {
        channel: String,
        ack: oneshot::Sender<()>,
    },
    Unlisten {
        channel: String,
    },
}

/// Shared LISTEN/NOTIFY fan-out
#[derive(Clone)]
pub struct NotificationBus {
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

struct Shared {
    pool: PgPool,
    subscribers: RwLock<HashMap<String, HashMap<u64, mpsc::Sender<()>>>>,
    next_id: AtomicU64,
}

impl Shared {
    fn dispatch(&self, channel: &str) {
        let subscribers = self.subscribers.read().unwrap();
        if let Some(listeners) = subscribers.get(channel) {
            for tx in listeners.values() {
                // A full slot means a wake-up is already pending; coalesce.
                let _ = tx.try_send(());
            }
        }
    }
}

impl NotificationBus {
    /// Connects the shared listener and starts the dispatch task
    pub async fn start(pool: PgPool) -> Result<Self, sqlx::Error> {
        let listener = PgListener::connect_with(&pool).await?;
        let shared = Arc::new(Shared {
            pool,
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        });
        let (commands, commands_rx) = mpsc::unbounded_channel();

        tokio::spawn(run_dispatch(listener, Arc::clone(&shared), commands_rx));

        Ok(Self { shared, commands })
    }

    /// Registers a wake-up subscription on `channel`
    ///
    /// Returns once the underlying LISTEN is in place, so notifications
    /// posted after this call resolves will reach the subscriber. Subscribers
    /// on the same channel are independent.
    pub async fn listen(&self, channel: &str) -> Result<Notifier, BusClosed> {
        let (tx, rx) = mpsc::channel(1);
        let id = self.shared.next_id.fetch_add(1, Ordering::Relaxed);

        let first_subscriber = {
            let mut subscribers = self.shared.subscribers.write().unwrap();
            let entry = subscribers.entry(channel.to_string()).or_default();
            let first = entry.is_empty();
            entry.insert(id, tx);
            first
        };

        if first_subscriber {
            let (ack, ack_rx) = oneshot::channel();
            self.commands
                .send(Command::Listen {
                    channel: channel.to_string(),
                    ack,
                })
                .map_err(|_| BusClosed)?;
            ack_rx.await.map_err(|_| BusClosed)?;
        }

        Ok(Notifier {
            channel: channel.to_string(),
            id,
            rx,
            shared: Arc::clone(&self.shared),
            commands: self.commands.clone(),
        })
    }

    /// Posts one best-effort wake-up to every subscriber of `channel`,
    /// in this process and every other engine sharing the database
    pub async fn notify(&self, channel: &str) -> Result<(), sqlx::Error> {
        sqlx::query("SELECT pg_notify($1, '')")
            .bind(channel)
            .execute(&self.shared.pool)
            .await?;
        Ok(())
    }
}

async fn run_dispatch(
    mut listener: PgListener,
    shared: Arc<Shared>,
    mut commands: mpsc::UnboundedReceiver<Command>,
) {
    loop {
        tokio::select! {
            command = commands.recv() => match command {
                Some(Command::Listen { channel, ack }) => {
                    if let Err(err) = listener.listen(&channel).await {
                        tracing::error!("Failed to LISTEN on {}: {}", channel, err);
                    }
                    let _ = ack.send(());
                }
                Some(Command::Unlisten { channel }) => {
                    if let Err(err) = listener.unlisten(&channel).await {
                        tracing::debug!("Failed to UNLISTEN {}: {}", channel, err);
                    }
                }
                None => return,
            },
            notification = listener.recv() => match notification {
                Ok(notification) => shared.dispatch(notification.channel()),
                Err(err) => {
                    // The listener pings and reconnects on the next recv,
                    // re-establishing every LISTEN. A wake-up may be lost
                    // across the gap; subscribers re-poll, so that is
                    // tolerable.
                    tracing::warn!("Notification listener error: {}", err);
                }
            },
        }
    }
}

/// One subscription's wake-up handle
///
/// Dropping it (or calling [`Notifier::close`]) unregisters the subscription
/// and releases the LISTEN once the channel has no subscribers left.
pub struct Notifier {
    channel: String,
    id: u64,
    rx: mpsc::Receiver<()>,
    shared: Arc<Shared>,
    commands: mpsc::UnboundedSender<Command>,
}

impl Notifier {
    /// Waits for the next wake-up
    pub async fn notified(&mut self) {
        let _ = self.rx.recv().await;
    }

    /// Unregisters the subscription
    pub fn close(self) {}
}

impl Drop for Notifier {
    fn drop(&mut self) {
        let mut subscribers = self.shared.subscribers.write().unwrap();
        if let Some(entry) = subscribers.get_mut(&self.channel) {
            entry.remove(&self.id);
            if entry.is_empty() {
                subscribers.remove(&self.channel);
                let _ = self.commands.send(Command::Unlisten {
                    channel: self.channel.clone(),
                });
            }
        }
    }
}
