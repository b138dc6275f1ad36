use std::collections::HashMap;

use log::{info, warn};
use tokio::sync::mpsc;

use crate::error::SyncError;

pub type ConnectionId = u64;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum OutboundMessage {
    Text(String),
    Close { code: u16, reason: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    Connecting,
    Open,
    /// Terminal. Closed connections are removed from the registry.
    Closed,
}

#[derive(Clone, Debug)]
struct Connection {
    tx: mpsc::Sender<OutboundMessage>,
    state: ConnectionState,
}

impl Connection {
    fn is_open(&self) -> bool {
        self.state == ConnectionState::Open && !self.tx.is_closed()
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BroadcastReport {
    pub delivered: usize,
    pub dropped: Vec<ConnectionId>,
}

/// Every live client channel of the server. Owned by the sync engine; there is
/// exactly one registry per server process.
#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    connections: HashMap<ConnectionId, Connection>,
    next_id: ConnectionId,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a channel in the `Connecting` state.
    pub fn register(&mut self, tx: mpsc::Sender<OutboundMessage>) -> ConnectionId {
        self.next_id += 1;
        let id = self.next_id;
        self.connections.insert(
            id,
            Connection {
                tx,
                state: ConnectionState::Connecting,
            },
        );
        id
    }

    pub fn open(&mut self, id: ConnectionId) -> bool {
        let Some(connection) = self.connections.get_mut(&id) else {
            return false;
        };
        if connection.state != ConnectionState::Connecting {
            return false;
        }
        connection.state = ConnectionState::Open;
        info!(
            "[ws] added connection {id}. clients connected: {}",
            self.connections.len()
        );
        true
    }

    /// Removes the connection. Returns false if it was already gone.
    pub fn close(&mut self, id: ConnectionId) -> bool {
        if self.connections.remove(&id).is_none() {
            return false;
        }
        info!(
            "[ws] closed connection {id}. clients connected: {}",
            self.connections.len()
        );
        true
    }

    pub fn state(&self, id: ConnectionId) -> ConnectionState {
        self.connections
            .get(&id)
            .map(|connection| connection.state)
            .unwrap_or(ConnectionState::Closed)
    }

    pub fn contains(&self, id: ConnectionId) -> bool {
        self.connections.contains_key(&id)
    }

    pub fn is_open(&self, id: ConnectionId) -> bool {
        self.connections
            .get(&id)
            .map(Connection::is_open)
            .unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    pub fn open_count(&self) -> usize {
        self.connections.values().filter(|c| c.is_open()).count()
    }

    /// Queues `payload` for a single connection. On failure the connection is
    /// dropped from the registry.
    pub fn send_to(&mut self, id: ConnectionId, payload: &str) -> Result<(), SyncError> {
        let delivered = match self.connections.get(&id) {
            Some(connection) if connection.is_open() => connection
                .tx
                .try_send(OutboundMessage::Text(payload.to_string()))
                .is_ok(),
            _ => false,
        };
        if delivered {
            return Ok(());
        }
        self.drop_failed(id);
        Err(SyncError::Transport(id))
    }

    /// Queues `payload` for every open connection. Connections whose channel
    /// is closed or full are dropped; the rest still receive it.
    pub fn broadcast(&mut self, payload: &str) -> BroadcastReport {
        let mut report = BroadcastReport::default();
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in ids {
            let Some(connection) = self.connections.get(&id) else {
                continue;
            };
            if connection.state == ConnectionState::Connecting {
                continue;
            }
            if !connection.is_open() {
                report.dropped.push(id);
                continue;
            }
            match connection
                .tx
                .try_send(OutboundMessage::Text(payload.to_string()))
            {
                Ok(()) => report.delivered += 1,
                Err(_) => report.dropped.push(id),
            }
        }
        for id in &report.dropped {
            self.drop_failed(*id);
        }
        report
    }

    /// Asks the connection's writer to close the socket, then forgets it.
    pub fn disconnect(&mut self, id: ConnectionId, code: u16, reason: &str) {
        if let Some(connection) = self.connections.get(&id) {
            let _ = connection.tx.try_send(OutboundMessage::Close {
                code,
                reason: reason.to_string(),
            });
        }
        self.close(id);
    }

    /// Sends the same close frame to every connection and forgets them all.
    pub fn disconnect_all(&mut self, code: u16, reason: &str) -> usize {
        let ids: Vec<ConnectionId> = self.connections.keys().copied().collect();
        for id in &ids {
            self.disconnect(*id, code, reason);
        }
        ids.len()
    }

    fn drop_failed(&mut self, id: ConnectionId) {
        if self.connections.contains_key(&id) {
            warn!("[ws] dropping connection {id}: send failed");
            self.close(id);
        }
    }
}
