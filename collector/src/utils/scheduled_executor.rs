//! Scheduled Executor
//!
//! Runs a task at a fixed interval until the task asks to terminate.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// A unit of periodic work
pub trait ScheduledTask: Send + Sync + 'static {
    /// Execute one tick
    fn run(&self) -> Pin<Box<dyn Future<Output = Result<(), anyhow::Error>> + Send + '_>>;

    /// Checked before and after every tick
    fn should_terminate(&self) -> bool;
}

pub struct ScheduledExecutor {
    name: String,
    interval: Duration,
}

impl ScheduledExecutor {
    pub fn new(name: impl Into<String>, interval: Duration) -> Self {
        Self { name: name.into(), interval }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Run `task` until it terminates. The first tick fires one interval after start.
    ///
    /// A failed tick is logged and the schedule continues; tasks that must stop
    /// on failure report it through `should_terminate`.
    pub async fn start<T: ScheduledTask>(&self, task: T) -> u64 {
        let mut ticker = tokio::time::interval_at(Instant::now() + self.interval, self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut ticks = 0u64;

        debug!(task = %self.name, interval_ms = self.interval.as_millis() as u64, "Scheduled task started");

        loop {
            ticker.tick().await;
            if task.should_terminate() {
                break;
            }

            ticks += 1;
            if let Err(e) = task.run().await {
                warn!(task = %self.name, tick = ticks, "Scheduled task tick failed: {:#}", e);
            }

            if task.should_terminate() {
                break;
            }
        }

        info!(task = %self.name, ticks, "Scheduled task terminated");
        ticks
    }
}
