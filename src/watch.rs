use crate::{
    alert::{Presenter, Slot},
    api,
    domain::Notification,
};
use std::{future::Future, time::Duration};
use tokio::time;
use tracing::{trace, warn};

/// Where the loop fetches the most recent notification from. The notifier
/// uses the HTTP client; tests script the responses.
pub trait Source: Send {
    fn latest(&mut self)
        -> impl Future<Output = Result<Option<Notification>, api::Error>> + Send;
}

/// The dedupe boundary: the highest notification id already presented,
/// plus whether the baseline has been established. Owned state with a
/// single pure transition, so the rule is testable without a timer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Watermark {
    last_seen_id: i32,
    initialized: bool,
}

impl Watermark {
    /// Feeds one poll result through the dedupe rule and returns the
    /// notification to present, if any. The watermark only moves forward,
    /// so alerts come out in strictly increasing id order.
    pub fn observe(&mut self, latest: Option<Notification>) -> Option<Notification> {
        let latest = match latest {
            Some(latest) => latest,
            None => {
                // Nothing exists yet; any first notification should alert.
                self.initialized = true;
                return None;
            }
        };

        if !self.initialized {
            // The baseline tick: remember where history ends instead of
            // replaying it at the user.
            self.initialized = true;
            self.last_seen_id = latest.id.0;
            None
        } else if latest.id.0 > self.last_seen_id {
            self.last_seen_id = latest.id.0;
            Some(latest)
        } else {
            None
        }
    }
}

/// The client-side delivery loop: poll on a fixed interval (and once
/// immediately), dedupe against the watermark, and raise fresh
/// notifications into the alert slot.
pub struct Watcher<S, P: Presenter> {
    source: S,
    slot: Slot<P>,
    watermark: Watermark,
    interval: Duration,
}

impl<S: Source, P: Presenter> Watcher<S, P> {
    pub fn new(source: S, slot: Slot<P>, interval: Duration) -> Self {
        Self {
            source,
            slot,
            watermark: Watermark::default(),
            interval,
        }
    }

    /// Runs until the owning task is dropped.
    pub async fn run(mut self) {
        let mut ticks = time::interval(self.interval);

        loop {
            ticks.tick().await;
            self.tick().await;
        }
    }

    async fn tick(&mut self) {
        match self.source.latest().await {
            Ok(latest) => {
                if let Some(fresh) = self.watermark.observe(latest) {
                    trace!(id = fresh.id.0, "Raising an alert");
                    self.slot.raise(fresh);
                }
            }
            // Transient by assumption; the next tick retries with the
            // watermark untouched.
            Err(e) => warn!("Skipping this poll tick: {}", e),
        }
    }
}
