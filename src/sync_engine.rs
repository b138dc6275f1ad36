use std::sync::Arc;

use log::{debug, error, warn};
use tokio::sync::mpsc;

use crate::error::SyncError;
use crate::grid::in_coordinate_range;
use crate::protocol::{parse_client_message, ClientMessage, MovePayload, ServerMessage};
use crate::registry::{BroadcastReport, ConnectionId, ConnectionRegistry, OutboundMessage};
use crate::resolver::neighborhood_of;
use crate::store::EntityStore;
use crate::types::Bit;

/// What a successfully handled frame did.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Dispatched {
    Pong,
    Moved { bit: Bit, report: BroadcastReport },
}

/// Decodes inbound frames and answers them.
///
/// Any connection may move any bit it names, and every move result goes to
/// every open connection including the sender.
pub struct SyncEngine {
    registry: ConnectionRegistry,
    store: Arc<dyn EntityStore>,
}

impl SyncEngine {
    pub fn new(store: Arc<dyn EntityStore>) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            store,
        }
    }

    pub fn store(&self) -> &Arc<dyn EntityStore> {
        &self.store
    }

    pub fn registry(&self) -> &ConnectionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut ConnectionRegistry {
        &mut self.registry
    }

    /// Registers and opens a channel in one step.
    pub fn connect(&mut self, tx: mpsc::Sender<OutboundMessage>) -> ConnectionId {
        let id = self.registry.register(tx);
        self.registry.open(id);
        id
    }

    pub fn disconnect(&mut self, id: ConnectionId) {
        self.registry.close(id);
    }

    /// Closes every connection, e.g. on shutdown. Returns how many were closed.
    pub fn close_all(&mut self, code: u16, reason: &str) -> usize {
        self.registry.disconnect_all(code, reason)
    }

    /// Handles one frame and logs any failure. Never fails the caller.
    pub fn receive(&mut self, id: ConnectionId, raw: &str) {
        match self.handle_frame(id, raw) {
            Ok(Dispatched::Pong) => debug!("[sync] ping from {id}, sent pong"),
            Ok(Dispatched::Moved { bit, report }) => debug!(
                "[sync] {} moved to ({}, {}); blocks sent to {} connections",
                bit.id, bit.x, bit.y, report.delivered
            ),
            Err(SyncError::Validation(reason)) => {
                warn!("[sync] received unhandled message from {id}: {reason}: {raw}")
            }
            Err(SyncError::NotFound(bit_id)) => {
                warn!("[sync] move from {id} dropped: bit {bit_id} not found")
            }
            Err(SyncError::Store(reason)) => {
                error!("[sync] move from {id} skipped: {reason}")
            }
            Err(SyncError::Transport(failed)) => {
                warn!("[sync] reply to {failed} failed; connection dropped")
            }
        }
    }

    pub fn handle_frame(&mut self, id: ConnectionId, raw: &str) -> Result<Dispatched, SyncError> {
        if !self.registry.is_open(id) {
            return Err(SyncError::Transport(id));
        }
        match parse_client_message(raw)? {
            ClientMessage::Ping => self.handle_ping(id),
            ClientMessage::Move(payload) => self.handle_move(payload),
        }
    }

    fn handle_ping(&mut self, id: ConnectionId) -> Result<Dispatched, SyncError> {
        self.registry.send_to(id, &ServerMessage::Pong.to_json())?;
        Ok(Dispatched::Pong)
    }

    fn handle_move(&mut self, payload: MovePayload) -> Result<Dispatched, SyncError> {
        if !in_coordinate_range(payload.x, payload.y) {
            return Err(SyncError::Validation(format!(
                "coordinates ({}, {}) out of range",
                payload.x, payload.y
            )));
        }
        let bit = self.store.update(&payload.bit_id, payload.x, payload.y)?;
        let neighborhood = neighborhood_of(self.store.as_ref(), bit.x, bit.y)?;
        let report = self
            .registry
            .broadcast(&ServerMessage::Blocks(neighborhood).to_json());
        Ok(Dispatched::Moved { bit, report })
    }
}
