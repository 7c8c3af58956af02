//! Background loops that keep the lobby moving: the set boundary clock, the
//! presence sweep, config refresh and the periodic room list.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, info, warn};

use super::lobby::Lobby;

/// How often the periodic loops run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverIntervals {
    /// Idle/hidden presence sweep.
    pub presence_sweep: Duration,
    /// Game config reload.
    pub config_refresh: Duration,
    /// Unconditional `room_list` broadcast.
    pub room_list: Duration,
}

impl Default for DriverIntervals {
    fn default() -> Self {
        Self {
            presence_sweep: Duration::from_secs(5),
            config_refresh: Duration::from_secs(60),
            room_list: Duration::from_secs(10),
        }
    }
}

/// Running background loops. Dropping the driver stops them.
#[derive(Debug)]
pub struct Driver {
    tasks: Vec<JoinHandle<()>>,
}

impl Driver {
    /// Spawns every loop for `lobby`.
    #[must_use]
    pub fn spawn(lobby: &Arc<Lobby>, intervals: DriverIntervals) -> Self {
        let tasks = vec![
            tokio::spawn(run_set_clock(Arc::clone(lobby))),
            tokio::spawn(run_presence_sweep(Arc::clone(lobby), intervals.presence_sweep)),
            tokio::spawn(run_config_refresh(Arc::clone(lobby), intervals.config_refresh)),
            tokio::spawn(run_room_list(Arc::clone(lobby), intervals.room_list)),
        ];
        info!(?intervals, "lobby driver started");
        Self { tasks }
    }

    /// Stops every loop.
    pub fn stop(&mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
    }
}

impl Drop for Driver {
    fn drop(&mut self) {
        self.stop();
    }
}

async fn run_set_clock(lobby: Arc<Lobby>) {
    loop {
        let wait = lobby.set_clock().until_next_change();
        tokio::time::sleep(wait.max(Duration::from_millis(10))).await;
        match lobby.tick().await {
            Ok(Some(change)) => debug!(to = ?change.to.phase, "phase change handled"),
            Ok(None) => {}
            Err(e) => warn!(error = %e, "set clock tick failed"),
        }
    }
}

async fn run_presence_sweep(lobby: Arc<Lobby>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        match lobby.sweep_presence().await {
            Ok(0) => {}
            Ok(swept) => info!(swept, "stale sessions disconnected"),
            Err(e) => warn!(error = %e, "presence sweep failed"),
        }
    }
}

async fn run_config_refresh(lobby: Arc<Lobby>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick fires immediately; bootstrap already loaded config.
    ticker.tick().await;
    loop {
        ticker.tick().await;
        if let Err(e) = lobby.refresh_config().await {
            warn!(error = %e, "config refresh failed");
        }
    }
}

async fn run_room_list(lobby: Arc<Lobby>, every: Duration) {
    let mut ticker = interval(every);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    loop {
        ticker.tick().await;
        if let Err(e) = lobby.publish_room_list() {
            warn!(error = %e, "room list broadcast failed");
        }
    }
}
