//! Reload broadcasting to live client connections.
//!
//! [`Broadcaster`] keeps the set of connected clients and fans the reload
//! signal out to them. Fan-out works on a snapshot of the registry, so
//! clients may connect or disconnect while a broadcast is in flight.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;

/// Text frame sent to clients when they should reload.
pub const RELOAD_MESSAGE: &str = "reload";

/// Default upper bound for a single send during fan-out.
const DEFAULT_SEND_TIMEOUT: Duration = Duration::from_secs(5);

/// Error sending to or closing a live connection.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    /// The connection is already closed.
    #[error("Connection closed")]
    Closed,
    /// The transport failed.
    #[error("Transport error: {0}")]
    Transport(String),
    /// The send did not complete in time.
    #[error("Send timed out")]
    Timeout,
}

/// Outbound half of a client connection.
///
/// The broadcaster only ever writes to connections.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Send a text frame.
    async fn send(&self, text: &str) -> Result<(), ConnectionError>;

    /// Close the connection.
    async fn close(&self) -> Result<(), ConnectionError>;
}

/// Outcome of one fan-out.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    /// Connections the signal was delivered to.
    pub delivered: usize,
    /// Connections removed because the send failed.
    pub dropped: usize,
}

/// Registry identity of a connection: the address of its shared allocation.
type ConnectionKey = usize;

fn connection_key(connection: &Arc<dyn Connection>) -> ConnectionKey {
    Arc::as_ptr(connection).cast::<()>().addr()
}

/// Fans the reload signal out to every registered connection.
pub struct Broadcaster {
    connections: Mutex<HashMap<ConnectionKey, Arc<dyn Connection>>>,
    send_timeout: Duration,
}

impl Default for Broadcaster {
    fn default() -> Self {
        Self::new()
    }
}

impl Broadcaster {
    /// Create an empty broadcaster with the default send timeout.
    #[must_use]
    pub fn new() -> Self {
        Self::with_send_timeout(DEFAULT_SEND_TIMEOUT)
    }

    /// Create a broadcaster that gives up on a send after `send_timeout`.
    ///
    /// A timed-out send counts as a failure and drops the connection.
    #[must_use]
    pub fn with_send_timeout(send_timeout: Duration) -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
            send_timeout,
        }
    }

    /// Lock the registry.
    ///
    /// The registry holds no cross-entry invariants, so a poisoned lock is
    /// still usable.
    fn registry(&self) -> MutexGuard<'_, HashMap<ConnectionKey, Arc<dyn Connection>>> {
        self.connections
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Add a connection. Registering the same connection twice stores it once.
    pub fn register(&self, connection: Arc<dyn Connection>) {
        self.registry()
            .insert(connection_key(&connection), connection);
    }

    /// Remove a connection if present.
    pub fn unregister(&self, connection: &Arc<dyn Connection>) {
        self.registry().remove(&connection_key(connection));
    }

    /// Whether `connection` is registered.
    #[must_use]
    pub fn contains(&self, connection: &Arc<dyn Connection>) -> bool {
        self.registry().contains_key(&connection_key(connection))
    }

    /// Number of registered connections.
    #[must_use]
    pub fn len(&self) -> usize {
        self.registry().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.registry().is_empty()
    }

    /// Send [`RELOAD_MESSAGE`] to every registered connection.
    ///
    /// Every connection registered when the call starts gets one send
    /// attempt. Connections whose send fails or times out are removed; the
    /// remaining ones still receive the signal. Never fails.
    pub async fn notify_changed(&self) -> BroadcastReport {
        let snapshot: Vec<Arc<dyn Connection>> = self.registry().values().cloned().collect();

        let mut report = BroadcastReport::default();
        // Failed connections stay alive here until removed, so their keys
        // cannot be reused by a connection registered in the meantime.
        let mut failed = Vec::new();

        for connection in snapshot {
            match tokio::time::timeout(self.send_timeout, connection.send(RELOAD_MESSAGE)).await {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    tracing::debug!(error = %err, "Dropping live connection after failed send");
                    failed.push(connection);
                }
                Err(_) => {
                    tracing::debug!(
                        error = %ConnectionError::Timeout,
                        "Dropping live connection after failed send"
                    );
                    failed.push(connection);
                }
            }
        }

        if !failed.is_empty() {
            let mut registry = self.registry();
            for connection in &failed {
                registry.remove(&connection_key(connection));
            }
        }
        report.dropped = failed.len();

        report
    }

    /// Remove every connection and close it, ignoring errors.
    pub async fn close_all(&self) {
        let connections: Vec<_> = self.registry().drain().map(|(_, c)| c).collect();

        for connection in connections {
            if let Err(err) = connection.close().await {
                tracing::debug!(error = %err, "Failed to close live connection");
            }
        }
    }
}
