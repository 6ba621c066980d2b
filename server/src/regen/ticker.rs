//! Background task driving the regeneration scheduler.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval, MissedTickBehavior};

use super::RegenerationScheduler;

/// Spawn the tick loop. One tick runs to completion before the next starts;
/// late ticks are delayed rather than bunched.
pub fn spawn_regeneration_ticker(
    scheduler: Arc<RegenerationScheduler>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = interval(period);
        timer.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // Skip the first immediate tick
        timer.tick().await;

        tracing::info!(period_ms = period.as_millis() as u64, "Regeneration ticker started");

        loop {
            timer.tick().await;
            scheduler.tick().await;
        }
    })
}
