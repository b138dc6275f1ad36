//! Headless run of several clients against an in-process sync engine.

use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use bitgrid::client::identity::{create_or_load_player_bit, MemoryIdentityStore};
use bitgrid::client::input::{InputEvent, InputSampler};
use bitgrid::client::ClientModel;
use bitgrid::constants::{OUTBOUND_QUEUE_CAPACITY, TICK_MS};
use bitgrid::protocol::parse_server_message;
use bitgrid::registry::{ConnectionId, OutboundMessage};
use bitgrid::store::{EntityStore, MemoryBitStore};
use bitgrid::sync_engine::SyncEngine;
use bitgrid::types::Direction;
use clap::Parser;
use log::{error, info, warn};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use tokio::sync::mpsc;

const DIRECTIONS: [Direction; 4] = [
    Direction::Up,
    Direction::Down,
    Direction::Left,
    Direction::Right,
];

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[arg(long, default_value_t = 4)]
    clients: usize,
    #[arg(long, default_value_t = 50)]
    ticks: u64,
    #[arg(long)]
    seed: Option<u64>,
    /// Probability per tick that a client changes which key it holds.
    #[arg(long, default_value_t = 0.3)]
    churn: f64,
    #[arg(long)]
    summary_out: Option<PathBuf>,
}

#[derive(Clone, Debug, Serialize)]
struct FinalPosition {
    x: i64,
    y: i64,
    #[serde(rename = "inSync")]
    in_sync: bool,
}

#[derive(Clone, Debug, Serialize)]
struct RunSummary {
    seed: u64,
    clients: usize,
    ticks: u64,
    #[serde(rename = "movesSent")]
    moves_sent: u64,
    #[serde(rename = "blocksReceived")]
    blocks_received: u64,
    #[serde(rename = "inSyncRatio")]
    in_sync_ratio: f64,
    #[serde(rename = "finalPositions")]
    final_positions: BTreeMap<String, FinalPosition>,
}

struct SimulatedClient {
    connection: ConnectionId,
    inbox: mpsc::Receiver<OutboundMessage>,
    sampler: InputSampler,
    held: Option<Direction>,
    model: ClientModel,
}

impl SimulatedClient {
    fn churn_input(&mut self, rng: &mut StdRng, churn: f64) {
        if !rng.random_bool(churn.clamp(0.0, 1.0)) {
            return;
        }
        if let Some(direction) = self.held.take() {
            self.sampler.record(InputEvent::Release(direction));
        }
        if rng.random_bool(0.8) {
            let direction = DIRECTIONS[rng.random_range(0..DIRECTIONS.len())];
            self.sampler.record(InputEvent::Press(direction));
            self.held = Some(direction);
        }
    }

    fn drain_inbox(&mut self, now_ms: u64) -> u64 {
        let mut blocks = 0;
        while let Ok(outbound) = self.inbox.try_recv() {
            let OutboundMessage::Text(raw) = outbound else {
                continue;
            };
            match parse_server_message(&raw) {
                Ok(message) => {
                    if self.model.merge(message, now_ms) {
                        blocks += 1;
                    }
                }
                Err(error) => warn!("[simulate] bad server frame: {error}"),
            }
        }
        blocks
    }
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn")).init();
    let cli = Cli::parse();
    let seed = cli.seed.unwrap_or_else(rand::random);
    let mut rng = StdRng::seed_from_u64(seed);
    let client_count = cli.clients.clamp(1, 64);

    let store: Arc<dyn EntityStore> = Arc::new(MemoryBitStore::new());
    let mut engine = SyncEngine::new(store.clone());
    let mut clients = Vec::with_capacity(client_count);

    for _ in 0..client_count {
        let mut identity = MemoryIdentityStore::new();
        let bit = match create_or_load_player_bit(store.as_ref(), &mut identity) {
            Ok(bit) => bit,
            Err(error) => {
                error!("[simulate] failed to create bit: {error}");
                std::process::exit(1);
            }
        };
        let (tx, inbox) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);
        clients.push(SimulatedClient {
            connection: engine.connect(tx),
            inbox,
            sampler: InputSampler::new(),
            held: None,
            model: ClientModel::new(bit),
        });
    }

    let mut moves_sent = 0;
    let mut blocks_received = 0;
    for client in &clients {
        engine.receive(client.connection, &client.model.move_message(0).to_json());
        moves_sent += 1;
    }

    let mut in_sync_samples = 0u64;
    for tick in 1..=cli.ticks {
        let now_ms = tick * TICK_MS;

        for client in clients.iter_mut() {
            client.churn_input(&mut rng, cli.churn);
            if let Some(direction) = client.sampler.resolve_tick() {
                client.model.enqueue(direction);
            }
            for message in client.model.apply_pending(now_ms) {
                engine.receive(client.connection, &message.to_json());
                moves_sent += 1;
            }
        }

        for client in clients.iter_mut() {
            blocks_received += client.drain_inbox(now_ms);
            if client.model.is_in_sync() {
                in_sync_samples += 1;
            }
        }
    }

    let samples = (cli.ticks * client_count as u64).max(1);
    let summary = RunSummary {
        seed,
        clients: client_count,
        ticks: cli.ticks,
        moves_sent,
        blocks_received,
        in_sync_ratio: in_sync_samples as f64 / samples as f64,
        final_positions: clients
            .iter()
            .map(|client| {
                let entity = client.model.entity();
                (
                    entity.id.clone(),
                    FinalPosition {
                        x: entity.x,
                        y: entity.y,
                        in_sync: client.model.is_in_sync(),
                    },
                )
            })
            .collect(),
    };
    info!(
        "[simulate] {} clients, {} ticks, {} moves",
        summary.clients, summary.ticks, summary.moves_sent
    );

    let text = match serde_json::to_string_pretty(&summary) {
        Ok(text) => text,
        Err(error) => {
            error!("[simulate] failed to serialize summary: {error}");
            std::process::exit(1);
        }
    };
    println!("{text}");

    if let Some(path) = cli.summary_out {
        if let Err(error) = fs::write(&path, &text) {
            error!("[simulate] failed to write {}: {error}", path.display());
            std::process::exit(1);
        }
    }
}
