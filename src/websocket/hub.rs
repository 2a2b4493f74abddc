//! Broadcast Hub
//!
//! The registry of currently authenticated live connections. The hub
//! exclusively owns registry membership: connections signal lifecycle
//! events (register, unregister) and the hub applies them. A connection
//! is a member if and only if it authenticated and has not closed.
//!
//! Fan-out serializes each event once and pushes it into every member's
//! bounded outbound queue. The actual socket write happens in the
//! connection's writer task, outside any hub lock, so one stalled client
//! cannot delay delivery to the rest. A client whose queue overflows is
//! disconnected instead of blocking the pipeline.

use std::collections::HashMap;
use thiserror::Error;
use tokio::sync::mpsc::{self, error::TrySendError};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::auth::Identity;
use crate::config::HubSettings;

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Configuration for the broadcast hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
    /// Per-connection outbound queue bound
    pub outbound_queue: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
            outbound_queue: 64,
        }
    }
}

impl From<&HubSettings> for HubConfig {
    fn from(settings: &HubSettings) -> Self {
        Self {
            max_connections: settings.max_connections,
            outbound_queue: settings.outbound_queue,
        }
    }
}

/// Handle for sending serialized events to a specific connection
struct ConnectionHandle {
    sender: mpsc::Sender<String>,
    identity: Identity,
}

/// Registry of authenticated connections with broadcast fan-out
pub struct BroadcastHub {
    connections: RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    config: HubConfig,
}

impl BroadcastHub {
    /// Create a new hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Admit an authenticated connection to the registry
    ///
    /// The hub creates the connection's bounded outbound queue and hands
    /// back the receiving end for the connection's writer task. Callers
    /// must have completed authentication first; each physical connection
    /// registers exactly once.
    pub async fn register(
        &self,
        identity: Identity,
    ) -> Result<(ConnectionId, mpsc::Receiver<String>), HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        let (sender, receiver) = mpsc::channel(self.config.outbound_queue);

        tracing::info!(
            connection_id = %id,
            user = %identity.display(),
            clients = connections.len() + 1,
            "Client connected"
        );

        connections.insert(id.clone(), ConnectionHandle { sender, identity });
        Ok((id, receiver))
    }

    /// Remove a connection from the registry
    ///
    /// No-op if already absent; safe to call concurrently with broadcast.
    pub async fn unregister(&self, id: &str) {
        let removed = self.connections.write().await.remove(id);
        if let Some(handle) = removed {
            tracing::info!(
                connection_id = %id,
                user = %handle.identity.display(),
                "Client disconnected"
            );
        }
    }

    /// Deliver an event to every current registry member
    ///
    /// The event is serialized once; recipients are the snapshot of
    /// members at the instant the broadcast begins. A full or closed
    /// queue disconnects that client without affecting delivery to the
    /// rest. Returns the number of queues the event was delivered to.
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let text = match serde_json::to_string(message) {
            Ok(text) => text,
            Err(e) => {
                tracing::error!(error = %e, "Failed to serialize event");
                return 0;
            }
        };

        // Snapshot the membership, then send outside the lock
        let targets: Vec<(ConnectionId, mpsc::Sender<String>)> = {
            let connections = self.connections.read().await;
            connections
                .iter()
                .map(|(id, handle)| (id.clone(), handle.sender.clone()))
                .collect()
        };

        let mut delivered = 0;
        let mut stale = Vec::new();

        for (id, sender) in targets {
            match sender.try_send(text.clone()) {
                Ok(()) => delivered += 1,
                Err(TrySendError::Full(_)) => {
                    tracing::warn!(
                        connection_id = %id,
                        "Outbound queue full, disconnecting slow client"
                    );
                    stale.push(id);
                }
                Err(TrySendError::Closed(_)) => {
                    stale.push(id);
                }
            }
        }

        // Dropping the handle closes the queue, which ends the writer task
        for id in stale {
            self.unregister(&id).await;
        }

        delivered
    }

    /// Current registry cardinality, for diagnostics
    pub async fn size(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Close every registered connection
    ///
    /// Draining the registry drops each sender; writer tasks observe the
    /// closed queue and shut their sockets down with a going-away frame.
    pub async fn close_all(&self) {
        let mut connections = self.connections.write().await;
        let count = connections.len();
        connections.clear();
        if count > 0 {
            tracing::info!(clients = count, "Closed all connections");
        }
    }
}

/// Errors that can occur in the broadcast hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),
}
