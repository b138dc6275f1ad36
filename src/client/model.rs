use std::collections::{BTreeMap, VecDeque};

use serde::Serialize;

use crate::protocol::{ClientMessage, MovePayload, ServerMessage};
use crate::types::{bits_in_neighborhood, Bit, BitId, Direction, Neighborhood};

/// Everything a renderer needs for one frame.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct RenderFrame {
    pub player: Bit,
    pub others: Vec<Bit>,
    pub in_sync: bool,
}

/// Client-side predicted state for one player.
///
/// Movement is applied optimistically; server snapshots never roll it back.
/// `is_in_sync` only reports whether the last snapshot agrees.
#[derive(Clone, Debug)]
pub struct ClientModel {
    entity: Bit,
    last_server_snapshot: Option<Neighborhood>,
    pending_moves: VecDeque<Direction>,
    last_pong_ms: Option<u64>,
}

impl ClientModel {
    pub fn new(entity: Bit) -> Self {
        Self {
            entity,
            last_server_snapshot: None,
            pending_moves: VecDeque::new(),
            last_pong_ms: None,
        }
    }

    pub fn entity(&self) -> &Bit {
        &self.entity
    }

    pub fn last_server_snapshot(&self) -> Option<&Neighborhood> {
        self.last_server_snapshot.as_ref()
    }

    pub fn last_pong_ms(&self) -> Option<u64> {
        self.last_pong_ms
    }

    pub fn enqueue(&mut self, direction: Direction) {
        self.pending_moves.push_back(direction);
    }

    pub fn pending_len(&self) -> usize {
        self.pending_moves.len()
    }

    /// Moves the predicted entity one unit and returns the move to send.
    pub fn step(&mut self, direction: Direction, now_ms: u64) -> ClientMessage {
        let (x, y) = direction.offset(self.entity.x, self.entity.y);
        self.entity.x = x;
        self.entity.y = y;
        self.move_message(now_ms)
    }

    /// Applies every queued intent in FIFO order, one move message per intent.
    pub fn apply_pending(&mut self, now_ms: u64) -> Vec<ClientMessage> {
        let mut outbound = Vec::with_capacity(self.pending_moves.len());
        while let Some(direction) = self.pending_moves.pop_front() {
            outbound.push(self.step(direction, now_ms));
        }
        outbound
    }

    /// Current predicted position as a move frame.
    pub fn move_message(&self, now_ms: u64) -> ClientMessage {
        ClientMessage::Move(MovePayload {
            bit_id: self.entity.id.clone(),
            x: self.entity.x,
            y: self.entity.y,
            time: now_ms as f64,
        })
    }

    /// Folds a server frame into local state. Returns true when the view changed.
    pub fn merge(&mut self, message: ServerMessage, now_ms: u64) -> bool {
        match message {
            ServerMessage::Pong => {
                self.last_pong_ms = Some(now_ms);
                false
            }
            ServerMessage::Blocks(neighborhood) => {
                self.merge_snapshot(neighborhood);
                true
            }
        }
    }

    pub fn merge_snapshot(&mut self, neighborhood: Neighborhood) {
        self.last_server_snapshot = Some(neighborhood);
    }

    /// Server-confirmed bits with the predicted player laid over them.
    pub fn local_view(&self) -> BTreeMap<BitId, Bit> {
        let mut view = self
            .last_server_snapshot
            .as_ref()
            .map(bits_in_neighborhood)
            .unwrap_or_default();
        view.insert(self.entity.id.clone(), self.entity.clone());
        view
    }

    pub fn is_in_sync(&self) -> bool {
        let Some(snapshot) = &self.last_server_snapshot else {
            return false;
        };
        let server = bits_in_neighborhood(snapshot);
        let local = self.local_view();
        local.len() == server.len()
            && local.values().all(|bit| {
                server
                    .get(&bit.id)
                    .map(|confirmed| confirmed.x == bit.x && confirmed.y == bit.y)
                    .unwrap_or(false)
            })
    }

    pub fn render_frame(&self) -> RenderFrame {
        let others = self
            .local_view()
            .into_values()
            .filter(|bit| bit.id != self.entity.id)
            .collect();
        RenderFrame {
            player: self.entity.clone(),
            others,
            in_sync: self.is_in_sync(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::grid::empty_block_at;

    fn bit(id: &str, x: i64, y: i64) -> Bit {
        Bit {
            id: id.to_string(),
            x,
            y,
            created_at: "2024-01-01T00:00:00.000Z".to_string(),
            updated_at: "2024-01-01T00:00:00.000Z".to_string(),
        }
    }

    fn snapshot_with(bits: &[Bit]) -> Neighborhood {
        let mut neighborhood = Neighborhood::new();
        for bit in bits {
            let block = neighborhood
                .entry(empty_block_at(bit.x, bit.y).block_id)
                .or_insert_with(|| empty_block_at(bit.x, bit.y));
            block.bit_in_range_by_id.insert(bit.id.clone(), bit.clone());
        }
        neighborhood
    }

    #[test]
    fn matching_snapshot_is_in_sync_until_local_move() {
        let mut model = ClientModel::new(bit("A", 1, 1));
        assert!(!model.is_in_sync());

        model.merge(ServerMessage::Blocks(snapshot_with(&[bit("A", 1, 1)])), 0);
        assert!(model.is_in_sync());

        model.step(Direction::Right, 10);
        assert_eq!((model.entity().x, model.entity().y), (2, 1));
        assert!(!model.is_in_sync());

        model.merge(ServerMessage::Blocks(snapshot_with(&[bit("A", 2, 1)])), 20);
        assert!(model.is_in_sync());
    }

    #[test]
    fn other_bits_in_snapshot_do_not_break_sync() {
        let mut model = ClientModel::new(bit("A", 0, 0));
        model.merge_snapshot(snapshot_with(&[bit("A", 0, 0), bit("B", -40, 3)]));
        assert!(model.is_in_sync());
        assert_eq!(model.render_frame().others, vec![bit("B", -40, 3)]);
    }

    #[test]
    fn snapshot_missing_player_is_out_of_sync() {
        let mut model = ClientModel::new(bit("A", 0, 0));
        model.merge_snapshot(snapshot_with(&[bit("B", 0, 0)]));
        assert!(!model.is_in_sync());
        assert!(!model.render_frame().in_sync);
    }

    #[test]
    fn pending_moves_apply_in_order_with_one_frame_each() {
        let mut model = ClientModel::new(bit("A", 0, 0));
        model.enqueue(Direction::Up);
        model.enqueue(Direction::Up);
        model.enqueue(Direction::Left);

        let frames = model.apply_pending(99);
        assert_eq!(model.pending_len(), 0);
        assert_eq!((model.entity().x, model.entity().y), (-1, -2));
        let positions: Vec<(i64, i64)> = frames
            .iter()
            .map(|frame| match frame {
                ClientMessage::Move(payload) => (payload.x, payload.y),
                ClientMessage::Ping => panic!("unexpected ping"),
            })
            .collect();
        assert_eq!(positions, vec![(0, -1), (0, -2), (-1, -2)]);
    }

    #[test]
    fn pong_records_liveness_without_touching_view() {
        let mut model = ClientModel::new(bit("A", 0, 0));
        assert!(!model.merge(ServerMessage::Pong, 1234));
        assert_eq!(model.last_pong_ms(), Some(1234));
        assert!(model.last_server_snapshot().is_none());
    }
}
