//! Polling source task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{self, MissedTickBehavior};

use crate::model::{EventSource, FeedEvent, SessionTag, TaggedEvent};
use crate::observability::metrics;
use crate::store::RequestStore;

/// Handle to a running poll loop. Dropping it stops the loop.
pub struct PollingSource {
    task: JoinHandle<()>,
}

impl PollingSource {
    /// Start polling immediately, then every `interval`.
    ///
    /// `high_water_mark` is shared with the feed owner: the poller reads it
    /// to decide what is new and raises it when it forwards a record, so a
    /// second tick before the merge does not forward the same record again.
    pub fn start<S: RequestStore>(
        store: Arc<S>,
        tag: SessionTag,
        high_water_mark: Arc<AtomicU64>,
        interval: Duration,
        events: mpsc::UnboundedSender<TaggedEvent>,
    ) -> Self {
        tracing::info!(session = %tag, interval_ms = interval.as_millis() as u64, "Polling started");
        let task = tokio::spawn(poll_loop(store, tag, high_water_mark, interval, events));
        Self { task }
    }

    /// Stop the loop. Idempotent.
    pub fn stop(&self) {
        if !self.task.is_finished() {
            tracing::info!("Polling stopped");
        }
        self.task.abort();
    }

    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }
}

impl Drop for PollingSource {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn poll_loop<S: RequestStore>(
    store: Arc<S>,
    tag: SessionTag,
    high_water_mark: Arc<AtomicU64>,
    interval: Duration,
    events: mpsc::UnboundedSender<TaggedEvent>,
) {
    let mut ticker = time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let records = match store.list_requests(&tag.endpoint).await {
            Ok(records) => records,
            Err(e) => {
                tracing::warn!(session = %tag, error = %e, "Poll failed; retrying next tick");
                metrics::record_poll("error");
                continue;
            }
        };

        let Some(newest) = records.into_iter().max_by_key(|r| r.id) else {
            metrics::record_poll("idle");
            continue;
        };

        let previous = high_water_mark.fetch_max(newest.id, Ordering::AcqRel);
        if newest.id <= previous {
            metrics::record_poll("idle");
            continue;
        }

        tracing::debug!(session = %tag, id = newest.id, "Poll found new request");
        metrics::record_poll("new");
        let event = TaggedEvent {
            tag: tag.clone(),
            source: EventSource::Polling,
            event: FeedEvent::NewRequest(newest.with_endpoint(&tag.endpoint)),
        };
        if events.send(event).is_err() {
            break;
        }
    }
}
