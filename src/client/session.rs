use log::{debug, warn};
use tokio::sync::{mpsc, Mutex, MutexGuard, Notify};

use crate::client::model::{ClientModel, RenderFrame};
use crate::protocol::{parse_server_message, ClientMessage};
use crate::types::Direction;

/// Shared client state: the reconciliation model plus the outbound channel.
///
/// The model is only touched under its lock, so the tick clock, the render
/// clock and the network receiver never interleave writes.
pub struct ClientSession {
    model: Mutex<ClientModel>,
    outbound: mpsc::Sender<String>,
    dirty: Notify,
}

impl ClientSession {
    pub fn new(model: ClientModel, outbound: mpsc::Sender<String>) -> Self {
        Self {
            model: Mutex::new(model),
            outbound,
            dirty: Notify::new(),
        }
    }

    pub async fn model(&self) -> MutexGuard<'_, ClientModel> {
        self.model.lock().await
    }

    /// Fire-and-forget send. A full or closed channel drops the frame.
    pub fn send(&self, message: &ClientMessage) {
        if self.outbound.try_send(message.to_json()).is_err() {
            debug!("[client] outbound frame dropped");
        }
    }

    /// Announces the current position, e.g. right after connecting.
    pub async fn announce(&self, now_ms: u64) {
        let message = self.model.lock().await.move_message(now_ms);
        self.send(&message);
    }

    pub fn ping(&self) {
        self.send(&ClientMessage::Ping);
    }

    /// Handles one inbound frame from the server.
    pub async fn on_server_frame(&self, raw: &str, now_ms: u64) {
        let message = match parse_server_message(raw) {
            Ok(message) => message,
            Err(error) => {
                warn!("[client] ignoring server frame: {error}");
                return;
            }
        };
        let changed = self.model.lock().await.merge(message, now_ms);
        if changed {
            self.dirty.notify_one();
        }
    }

    /// Queues intents and applies them, sending one move per position change.
    pub async fn apply_moves(&self, directions: &[Direction], now_ms: u64) -> RenderFrame {
        let mut model = self.model.lock().await;
        for direction in directions {
            model.enqueue(*direction);
        }
        for message in model.apply_pending(now_ms) {
            self.send(&message);
        }
        model.render_frame()
    }

    pub async fn render_frame(&self) -> RenderFrame {
        self.model.lock().await.render_frame()
    }

    pub(crate) async fn wait_dirty(&self) {
        self.dirty.notified().await;
    }
}
