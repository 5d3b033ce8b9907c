//! Alert Log
//!
//! Capped, append-only log of risk alerts with change fan-out:
//! - Synchronous observers registered through disposable [`Subscription`]s,
//!   optionally replaying the current log on subscribe
//! - A `tokio::sync::broadcast` stream for async consumers
//!
//! Observers run outside the log lock. A panicking observer is logged and
//! skipped; the remaining observers still run.

use crate::types::{Alert, AlertEvent};
use std::collections::VecDeque;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use tokio::sync::broadcast;
use tracing::{debug, warn};

/// Default number of alerts retained.
pub const DEFAULT_ALERT_CAPACITY: usize = 100;

type Observer = Arc<dyn Fn(&AlertEvent) + Send + Sync>;
type ObserverList = Mutex<Vec<(u64, Observer)>>;

/// Handle for a registered observer. Dropping it unsubscribes.
pub struct Subscription {
    id: u64,
    observers: Weak<ObserverList>,
}

impl Subscription {
    /// Unsubscribe now.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(observers) = self.observers.upgrade() {
            lock(&observers).retain(|(id, _)| *id != self.id);
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

/// Capped alert log, oldest evicted first.
pub struct AlertLog {
    capacity: usize,
    alerts: Mutex<VecDeque<Alert>>,
    observers: Arc<ObserverList>,
    next_observer_id: AtomicU64,
    events: broadcast::Sender<AlertEvent>,
}

impl Default for AlertLog {
    fn default() -> Self {
        Self::new(DEFAULT_ALERT_CAPACITY)
    }
}

impl AlertLog {
    pub fn new(capacity: usize) -> Self {
        let (events, _) = broadcast::channel(1024);
        Self {
            capacity: capacity.max(1),
            alerts: Mutex::new(VecDeque::with_capacity(capacity.max(1))),
            observers: Arc::new(Mutex::new(Vec::new())),
            next_observer_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Append an alert, evicting the oldest beyond capacity.
    pub fn push(&self, alert: Alert) {
        {
            let mut alerts = lock(&self.alerts);
            alerts.push_back(alert.clone());
            while alerts.len() > self.capacity {
                alerts.pop_front();
            }
        }
        debug!("Alert [{}] {}", alert.alert_type.as_str(), alert.message);
        self.notify(AlertEvent::Raised(alert));
    }

    /// Append alerts in order.
    pub fn extend(&self, alerts: impl IntoIterator<Item = Alert>) {
        for alert in alerts {
            self.push(alert);
        }
    }

    /// All retained alerts, oldest first.
    pub fn alerts(&self) -> Vec<Alert> {
        lock(&self.alerts).iter().cloned().collect()
    }

    /// The newest `limit` alerts, newest first.
    pub fn recent(&self, limit: usize) -> Vec<Alert> {
        lock(&self.alerts).iter().rev().take(limit).cloned().collect()
    }

    pub fn len(&self) -> usize {
        lock(&self.alerts).len()
    }

    pub fn is_empty(&self) -> bool {
        lock(&self.alerts).is_empty()
    }

    pub fn unacknowledged_count(&self) -> usize {
        lock(&self.alerts).iter().filter(|a| !a.acknowledged).count()
    }

    /// Mark one alert acknowledged. Returns false if the ID is unknown.
    pub fn acknowledge(&self, id: &str) -> bool {
        let changed = {
            let mut alerts = lock(&self.alerts);
            match alerts.iter_mut().find(|a| a.id == id) {
                Some(alert) => !std::mem::replace(&mut alert.acknowledged, true),
                None => return false,
            }
        };
        if changed {
            self.notify(AlertEvent::Acknowledged(id.to_string()));
        }
        true
    }

    /// Acknowledge every alert. Returns how many changed.
    pub fn acknowledge_all(&self) -> usize {
        let ids: Vec<String> = {
            let mut alerts = lock(&self.alerts);
            alerts
                .iter_mut()
                .filter(|a| !a.acknowledged)
                .map(|a| {
                    a.acknowledged = true;
                    a.id.clone()
                })
                .collect()
        };
        let count = ids.len();
        for id in ids {
            self.notify(AlertEvent::Acknowledged(id));
        }
        count
    }

    /// Remove every alert.
    pub fn clear(&self) {
        lock(&self.alerts).clear();
        self.notify(AlertEvent::Cleared);
    }

    /// Register an observer. With `replay`, it first receives a snapshot of
    /// the current log.
    pub fn subscribe<F>(&self, observer: F, replay: bool) -> Subscription
    where
        F: Fn(&AlertEvent) + Send + Sync + 'static,
    {
        let id = self.next_observer_id.fetch_add(1, Ordering::Relaxed);
        let observer: Observer = Arc::new(observer);

        if replay {
            let snapshot = AlertEvent::Snapshot(self.alerts());
            Self::deliver(id, &observer, &snapshot);
        }

        lock(&self.observers).push((id, observer));
        Subscription {
            id,
            observers: Arc::downgrade(&self.observers),
        }
    }

    /// Async stream of alert events.
    pub fn subscribe_stream(&self) -> broadcast::Receiver<AlertEvent> {
        self.events.subscribe()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.observers).len()
    }

    fn notify(&self, event: AlertEvent) {
        let observers: Vec<(u64, Observer)> = lock(&self.observers).clone();
        for (id, observer) in &observers {
            Self::deliver(*id, observer, &event);
        }
        // No receivers is fine
        let _ = self.events.send(event);
    }

    fn deliver(id: u64, observer: &Observer, event: &AlertEvent) {
        if catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
            warn!("Alert observer {} panicked; skipping", id);
        }
    }
}
