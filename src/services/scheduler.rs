//! Cancellable periodic tasks: wait a first delay, then run every period.

use chrono::{DateTime, TimeZone};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, info};

/// One day.
pub const DAILY: Duration = Duration::from_secs(24 * 60 * 60);

/// A background task firing after `first_delay` and then every `period`.
///
/// Stopped by [`ScheduledTask::cancel`] or when dropped.
pub struct ScheduledTask {
    name: String,
    handle: JoinHandle<()>,
    cancel: Arc<AtomicBool>,
}

impl ScheduledTask {
    /// Spawn on the current tokio runtime.
    pub fn spawn<F>(name: impl Into<String>, first_delay: Duration, period: Duration, mut task: F) -> Self
    where
        F: FnMut() + Send + 'static,
    {
        let name = name.into();
        let cancel = Arc::new(AtomicBool::new(false));
        let cancel_clone = cancel.clone();
        let task_name = name.clone();

        let handle = tokio::spawn(async move {
            let mut ticks = interval_at(Instant::now() + first_delay, period);
            ticks.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticks.tick().await;
                if cancel_clone.load(Ordering::SeqCst) {
                    break;
                }
                debug!("Running scheduled task {}", task_name);
                task();
            }
        });

        info!(
            "Scheduled {} in {}s, then every {}s",
            name,
            first_delay.as_secs(),
            period.as_secs()
        );

        Self { name, handle, cancel }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel(&self) {
        if !self.cancel.swap(true, Ordering::SeqCst) {
            info!("Cancelled scheduled task {}", self.name);
        }
        self.handle.abort();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::SeqCst)
    }
}

impl Drop for ScheduledTask {
    fn drop(&mut self) {
        self.cancel.store(true, Ordering::SeqCst);
        self.handle.abort();
    }
}

/// Time from `now` until the next local midnight in `now`'s time zone.
pub fn duration_until_next_midnight<Tz: TimeZone>(now: &DateTime<Tz>) -> Duration {
    let tz = now.timezone();
    let next_midnight = now
        .date_naive()
        .succ_opt()
        .and_then(|day| day.and_hms_opt(0, 0, 0))
        .and_then(|naive| tz.from_local_datetime(&naive).earliest());

    match next_midnight {
        Some(midnight) => (midnight - now.clone()).to_std().unwrap_or(Duration::ZERO),
        // Midnight skipped by a DST transition
        None => DAILY,
    }
}
