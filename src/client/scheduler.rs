use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::client::input::{InputEvent, InputSampler};
use crate::client::model::RenderFrame;
use crate::client::session::ClientSession;
use crate::constants::TICK_MS;
use crate::types::Direction;

/// Source of key transitions, polled once per tick.
pub trait InputSource: Send + 'static {
    fn drain(&mut self) -> Vec<InputEvent>;
}

/// Consumer of reconciled state.
pub trait Renderer: Send + 'static {
    fn draw(&mut self, frame: &RenderFrame);
}

#[derive(Clone, Copy, Debug)]
pub struct SchedulerOptions {
    pub tick_ms: u64,
    /// Start the tick clock at the next multiple of `tick_ms` of wall time.
    pub align_to_wall_clock: bool,
}

impl Default for SchedulerOptions {
    fn default() -> Self {
        Self {
            tick_ms: TICK_MS,
            align_to_wall_clock: true,
        }
    }
}

pub fn time_until_next_tick(now_ms: u64, tick_ms: u64) -> u64 {
    let tick_ms = tick_ms.max(1);
    let top_of_next_tick = (now_ms / tick_ms) * tick_ms + tick_ms;
    top_of_next_tick - now_ms
}

/// Two clocks driving a client: a fixed tick that turns held keys into move
/// intents, and a render loop that applies intents and redraws whenever the
/// model changes. Intents flow through a single queue from tick to render.
///
/// Dropping the scheduler cancels both clocks.
pub struct ClientScheduler {
    tick: JoinHandle<()>,
    render: JoinHandle<()>,
}

impl ClientScheduler {
    pub fn start<I: InputSource, R: Renderer>(
        session: Arc<ClientSession>,
        mut input: I,
        mut renderer: R,
        options: SchedulerOptions,
    ) -> Self {
        let (intent_tx, mut intent_rx) = mpsc::channel::<Direction>(64);

        let greeter = session.clone();
        let tick = tokio::spawn(async move {
            // Ask for the current neighborhood before the first tick.
            greeter.announce(now_ms()).await;
            greeter.ping();
            if options.align_to_wall_clock {
                let delay = time_until_next_tick(now_ms(), options.tick_ms);
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }
            let period = Duration::from_millis(options.tick_ms.max(1));
            let mut interval = tokio::time::interval(period);
            let mut sampler = InputSampler::new();
            loop {
                interval.tick().await;
                for event in input.drain() {
                    sampler.record(event);
                }
                let Some(direction) = sampler.resolve_tick() else {
                    continue;
                };
                if intent_tx.send(direction).await.is_err() {
                    break;
                }
            }
        });

        let render = tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = intent_rx.recv() => {
                        let Some(first) = received else {
                            break;
                        };
                        let mut batch = vec![first];
                        while let Ok(next) = intent_rx.try_recv() {
                            batch.push(next);
                        }
                        let frame = session.apply_moves(&batch, now_ms()).await;
                        renderer.draw(&frame);
                    }
                    _ = session.wait_dirty() => {
                        let frame = session.render_frame().await;
                        renderer.draw(&frame);
                    }
                }
            }
        });

        Self { tick, render }
    }

    pub fn cancel(self) {
        drop(self);
    }
}

impl Drop for ClientScheduler {
    fn drop(&mut self) {
        self.tick.abort();
        self.render.abort();
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
