//! Periodic fan-out of one message per connected client.
//!
//! The scheduler owns a single task, so ticks run strictly one after another.
//! Ticks that fall due while a previous one is still sending are skipped.

use crate::session::SessionTable;
use crate::transport::Outbound;
use log::{debug, error, info, warn};
use shared::{ConnectionId, Delivery, DeliveryError, NamedMessage, Packet, TestMsg};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Broadcast traffic may exceed a single transport packet.
pub const BROADCAST_DELIVERY: Delivery = Delivery::ReliableFragmentedSequenced;

/// Shortest interval the scheduler runs at. Shorter requests are raised to it.
pub const MIN_BROADCAST_INTERVAL: Duration = Duration::from_millis(1);

/// Builds the packet for one recipient on a given tick.
pub type BroadcastSource =
    Arc<dyn Fn(ConnectionId, u64) -> Result<Packet, DeliveryError> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    Stopped,
    Running,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickReport {
    pub sent: usize,
    pub failed: usize,
}

struct RunningTask {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct BroadcastScheduler {
    interval: Duration,
    source: BroadcastSource,
    running: Option<RunningTask>,
}

impl BroadcastScheduler {
    /// Scheduler sending [`TestMsg`] to every client.
    pub fn new(interval: Duration) -> Self {
        Self::with_message(interval, TestMsg::NAME, |connection_id, tick| TestMsg {
            bool_value: true,
            int_value: i32::try_from(tick).unwrap_or(i32::MAX),
            ulong_value: connection_id.0,
        })
    }

    /// Scheduler sending the message built by `build` under `name`.
    pub fn with_message<M, F>(interval: Duration, name: &str, build: F) -> Self
    where
        M: NamedMessage,
        F: Fn(ConnectionId, u64) -> M + Send + Sync + 'static,
    {
        let name = name.to_string();
        let source: BroadcastSource = Arc::new(move |connection_id: ConnectionId, tick: u64| {
            Packet::named(&name, &build(connection_id, tick), BROADCAST_DELIVERY)
        });

        if interval < MIN_BROADCAST_INTERVAL {
            warn!(
                "Broadcast interval {:?} too short, using {:?}",
                interval, MIN_BROADCAST_INTERVAL
            );
        }

        Self {
            interval: interval.max(MIN_BROADCAST_INTERVAL),
            source,
            running: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn state(&self) -> SchedulerState {
        if self.running.is_some() {
            SchedulerState::Running
        } else {
            SchedulerState::Stopped
        }
    }

    /// Starts ticking. Calling this while already running does nothing.
    pub fn start(&mut self, sessions: Arc<RwLock<SessionTable>>, outbound: Arc<dyn Outbound>) {
        if self.running.is_some() {
            debug!("Broadcast scheduler already running");
            return;
        }

        let token = CancellationToken::new();
        let task_token = token.clone();
        let source = Arc::clone(&self.source);
        let period = self.interval;

        let handle = tokio::spawn(async move {
            let mut timer = interval(period);
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

            // Skip the first tick since it fires immediately
            timer.tick().await;

            let mut tick: u64 = 0;
            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = timer.tick() => {}
                }

                tick += 1;
                let report = run_tick(tick, &sessions, outbound.as_ref(), &source, &task_token).await;
                if report.failed > 0 {
                    debug!(
                        "Broadcast tick {}: {} sent, {} failed",
                        tick, report.sent, report.failed
                    );
                }
            }
        });

        info!("Broadcasting to clients every {:?}", self.interval);
        self.running = Some(RunningTask { token, handle });
    }

    /// Requests cancellation without waiting for the task.
    ///
    /// A send already in progress completes; no new send is started.
    pub fn cancel(&mut self) {
        if let Some(task) = self.running.take() {
            task.token.cancel();
        }
    }

    /// Cancels and waits for the current tick, if any, to finish.
    pub async fn stop(&mut self) {
        if let Some(task) = self.running.take() {
            task.token.cancel();
            match task.handle.await {
                Ok(()) => debug!("Broadcast scheduler stopped"),
                Err(e) => error!("Broadcast task failed: {}", e),
            }
        }
    }
}

impl Drop for BroadcastScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}

/// Sends one message to every session in a fresh snapshot.
///
/// The table lock is released before the first send. A failed recipient is
/// counted and logged and does not stop the others.
pub async fn run_tick(
    tick: u64,
    sessions: &RwLock<SessionTable>,
    outbound: &dyn Outbound,
    source: &BroadcastSource,
    token: &CancellationToken,
) -> TickReport {
    let recipients = sessions.read().await.snapshot();
    let mut report = TickReport::default();

    for connection_id in recipients {
        if token.is_cancelled() {
            break;
        }

        match (**source)(connection_id, tick).and_then(|packet| outbound.send_packet(connection_id, packet)) {
            Ok(()) => {
                report.sent += 1;
                debug!("Sent broadcast to client {} (tick {})", connection_id, tick);
            }
            Err(e) => {
                report.failed += 1;
                warn!("Broadcast to client {} failed: {}", connection_id, e);
            }
        }
    }

    report
}
