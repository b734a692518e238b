//! Liveness controller driver.
//!
//! One driver task per session owns the state machine, the channel handle,
//! the polling source, both timers and the `FeedState`. Every input (channel
//! events, poll results, store completions, operator commands, timer expiry)
//! is serialized through one `select!` loop, so the feed is never touched
//! concurrently.
//!
//! Dropping the controller aborts the driver and, in the same call, the
//! channel worker and the poll loop, whose abort handles the driver shares
//! with it. The driver's own `Drop` then runs the machine's teardown, so an
//! aborted driver leaves no timer, socket or poller behind.

use std::collections::HashSet;
use std::future::pending;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle, JoinSet};
use tokio::time::{self, Instant};
use url::Url;

use crate::config::FeedConfig;
use crate::liveness::state::{Action, ConnectionStatus, LivenessMachine};
use crate::model::{
    Endpoint, EndpointId, EventSource, FeedEvent, RequestId, RequestRecord, SessionTag, TaggedEvent,
};
use crate::observability::metrics;
use crate::polling::PollingSource;
use crate::reconciler::{ApplyOutcome, FeedState, Reconciler};
use crate::resilience::ReconnectPolicy;
use crate::store::{RequestStore, StoreError, StoreResult};
use crate::transport::{channel_url, ChannelError, ChannelEvent, ChannelEventKind, ChannelHandle};

/// Errors returned by operator commands.
#[derive(Debug, Error)]
pub enum FeedError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("feed session has ended")]
    Closed,

    #[error("no endpoint selected")]
    NoEndpoint,
}

/// Read-only view of a feed, published after every change.
#[derive(Debug, Clone)]
pub struct FeedSnapshot {
    pub tag: SessionTag,
    pub endpoint: Option<Endpoint>,
    pub status: ConnectionStatus,
    pub items: Arc<Vec<RequestRecord>>,
    pub recently_arrived: Arc<HashSet<RequestId>>,
    pub high_water_mark: RequestId,
    /// Whether the initial bulk fetch has completed.
    pub loaded: bool,
}

impl FeedSnapshot {
    fn initial(tag: SessionTag) -> Self {
        Self {
            tag,
            endpoint: None,
            status: ConnectionStatus::Connecting,
            items: Arc::new(Vec::new()),
            recently_arrived: Arc::new(HashSet::new()),
            high_water_mark: 0,
            loaded: false,
        }
    }

    pub fn is_recently_arrived(&self, id: RequestId) -> bool {
        self.recently_arrived.contains(&id)
    }
}

enum Command {
    Send(serde_json::Value),
    Delete(RequestId, oneshot::Sender<Result<(), FeedError>>),
    Clear(oneshot::Sender<Result<(), FeedError>>),
    Refresh(oneshot::Sender<Result<usize, FeedError>>),
}

/// Store calls completed off the driver loop. Replies are sent after the
/// resulting snapshot is published.
enum Completion {
    Initial {
        endpoint: StoreResult<Endpoint>,
        records: StoreResult<Vec<RequestRecord>>,
    },
    Refreshed {
        records: StoreResult<Vec<RequestRecord>>,
        reply: Option<oneshot::Sender<Result<usize, FeedError>>>,
    },
    Deleted {
        id: RequestId,
        result: StoreResult<()>,
        reply: oneshot::Sender<Result<(), FeedError>>,
    },
    Cleared {
        result: StoreResult<()>,
        reply: oneshot::Sender<Result<(), FeedError>>,
    },
}

/// Abort handles of the tasks a session currently runs besides its driver.
#[derive(Debug, Default)]
struct Attached {
    channel: Option<AbortHandle>,
    polling: Option<AbortHandle>,
}

impl Attached {
    fn abort_all(&mut self) {
        if let Some(channel) = self.channel.take() {
            channel.abort();
        }
        if let Some(polling) = self.polling.take() {
            polling.abort();
        }
    }
}

fn attached(shared: &Mutex<Attached>) -> MutexGuard<'_, Attached> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Handle to one live feed session. Dropping it tears the session down.
pub struct FeedController {
    tag: SessionTag,
    commands: mpsc::UnboundedSender<Command>,
    snapshot: watch::Receiver<FeedSnapshot>,
    attached: Arc<Mutex<Attached>>,
    task: JoinHandle<()>,
}

impl FeedController {
    /// Start a session for `endpoint`: the channel is opened at once and the
    /// bulk fetch runs alongside it.
    pub fn spawn<S: RequestStore>(
        store: Arc<S>,
        config: &FeedConfig,
        endpoint: EndpointId,
    ) -> Result<Self, ChannelError> {
        let url = channel_url(config, &endpoint)?;
        let tag = SessionTag::new(endpoint);
        let (commands, command_rx) = mpsc::unbounded_channel();

        let driver = Driver::new(store, config, tag.clone(), url, command_rx);
        let snapshot = driver.snapshot_tx.subscribe();
        let attached = driver.attached.clone();

        tracing::info!(session = %tag, "Feed session starting");
        let task = tokio::spawn(driver.run());

        Ok(Self {
            tag,
            commands,
            snapshot,
            attached,
            task,
        })
    }

    pub fn tag(&self) -> &SessionTag {
        &self.tag
    }

    pub fn endpoint_id(&self) -> &EndpointId {
        &self.tag.endpoint
    }

    /// Latest published snapshot.
    pub fn snapshot(&self) -> FeedSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<FeedSnapshot> {
        self.snapshot.clone()
    }

    /// Best-effort send over the channel. Dropped with a warning unless open.
    pub fn send_message(&self, payload: serde_json::Value) {
        if self.commands.send(Command::Send(payload)).is_err() {
            tracing::warn!(session = %self.tag, "Feed session ended; message dropped");
        }
    }

    /// Delete one request in the store, then remove it from the feed.
    pub async fn delete_request(&self, id: RequestId) -> Result<(), FeedError> {
        self.request(|reply| Command::Delete(id, reply)).await?
    }

    /// Delete every request of the endpoint in the store, then empty the feed.
    pub async fn clear_requests(&self) -> Result<(), FeedError> {
        self.request(Command::Clear).await?
    }

    /// Re-fetch the bulk list and merge it. Returns how many records were new.
    pub async fn refresh(&self) -> Result<usize, FeedError> {
        self.request(Command::Refresh).await?
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> Result<T, FeedError> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .map_err(|_| FeedError::Closed)?;
        response.await.map_err(|_| FeedError::Closed)
    }

    /// Tear the session down: closes the channel, stops polling and cancels
    /// both timers. Equivalent to dropping the controller.
    pub fn teardown(self) {}
}

impl Drop for FeedController {
    fn drop(&mut self) {
        tracing::info!(session = %self.tag, "Feed session torn down");
        self.task.abort();
        attached(&self.attached).abort_all();
    }
}

struct Driver<S: RequestStore> {
    store: Arc<S>,
    tag: SessionTag,
    url: Url,
    connect_timeout: Duration,
    poll_interval: Duration,

    machine: LivenessMachine,
    reconciler: Reconciler,
    state: FeedState,
    loaded: bool,
    /// Events received before the initial bulk fetch completed, operator
    /// removals included. Replayed in order once it has been merged.
    queued: Vec<TaggedEvent>,
    high_water_mark: Arc<AtomicU64>,
    /// Whether the feed changed since the last published snapshot.
    dirty: bool,

    channel: Option<ChannelHandle>,
    channel_seq: u64,
    polling: Option<PollingSource>,
    attached: Arc<Mutex<Attached>>,
    fallback_deadline: Option<Instant>,
    reconnect_deadline: Option<Instant>,
    tasks: JoinSet<Completion>,

    channel_tx: mpsc::UnboundedSender<ChannelEvent>,
    channel_rx: mpsc::UnboundedReceiver<ChannelEvent>,
    poll_tx: mpsc::UnboundedSender<TaggedEvent>,
    poll_rx: mpsc::UnboundedReceiver<TaggedEvent>,
    command_rx: mpsc::UnboundedReceiver<Command>,
    snapshot_tx: watch::Sender<FeedSnapshot>,
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => pending().await,
    }
}

impl<S: RequestStore> Driver<S> {
    fn new(
        store: Arc<S>,
        config: &FeedConfig,
        tag: SessionTag,
        url: Url,
        command_rx: mpsc::UnboundedReceiver<Command>,
    ) -> Self {
        let (snapshot_tx, _) = watch::channel(FeedSnapshot::initial(tag.clone()));
        let (channel_tx, channel_rx) = mpsc::unbounded_channel();
        let (poll_tx, poll_rx) = mpsc::unbounded_channel();

        let machine = LivenessMachine::new(
            ReconnectPolicy::new(&config.reconnect),
            config.fallback.ceiling(),
            config.feed.refresh_on_reconnect,
        );

        Self {
            store,
            state: FeedState::empty(tag.endpoint.clone()),
            tag,
            url,
            connect_timeout: Duration::from_secs(config.channel.connect_timeout_secs),
            poll_interval: config.polling.interval(),
            machine,
            reconciler: Reconciler::new(&config.feed),
            loaded: false,
            queued: Vec::new(),
            high_water_mark: Arc::new(AtomicU64::new(0)),
            dirty: true,
            channel: None,
            channel_seq: 0,
            polling: None,
            attached: Arc::new(Mutex::new(Attached::default())),
            fallback_deadline: None,
            reconnect_deadline: None,
            tasks: JoinSet::new(),
            channel_tx,
            channel_rx,
            poll_tx,
            poll_rx,
            command_rx,
            snapshot_tx,
        }
    }

    fn start(&mut self) {
        let actions = self.machine.start();
        self.execute(actions);
        self.spawn_initial_fetch();
        self.publish();
    }

    async fn run(mut self) {
        self.start();

        loop {
            tokio::select! {
                Some(event) = self.channel_rx.recv() => self.on_channel_event(event),
                Some(event) = self.poll_rx.recv() => self.on_event(event),
                command = self.command_rx.recv() => match command {
                    Some(command) => self.on_command(command),
                    None => break,
                },
                Some(joined) = self.tasks.join_next(), if !self.tasks.is_empty() => match joined {
                    Ok(completion) => self.on_completion(completion),
                    Err(e) => tracing::warn!(session = %self.tag, error = %e, "Store task failed"),
                },
                _ = sleep_until(self.fallback_deadline) => {
                    self.fallback_deadline = None;
                    let actions = self.machine.on_fallback_timer();
                    self.execute(actions);
                }
                _ = sleep_until(self.reconnect_deadline) => {
                    self.reconnect_deadline = None;
                    let actions = self.machine.on_reconnect_timer();
                    self.execute(actions);
                }
                _ = sleep_until(self.state.next_expiry()) => {
                    if self.state.expire_recent(Instant::now()) > 0 {
                        self.dirty = true;
                    }
                }
            }
            self.publish();
        }
    }

    fn on_channel_event(&mut self, event: ChannelEvent) {
        if event.tag != self.tag {
            metrics::record_stale_event();
            tracing::debug!(session = %self.tag, stale = %event.tag, "Dropping event from another session");
            return;
        }
        if event.channel != self.channel_seq {
            tracing::debug!(session = %self.tag, channel = event.channel, current = self.channel_seq, "Dropping event from a replaced channel");
            return;
        }

        match event.kind {
            ChannelEventKind::Opened => {
                metrics::record_channel_open();
                let actions = self.machine.on_channel_open();
                self.execute(actions);
            }
            ChannelEventKind::Message(feed_event) => self.on_event(TaggedEvent {
                tag: event.tag,
                source: EventSource::Channel,
                event: feed_event,
            }),
            ChannelEventKind::Error(error) => {
                tracing::warn!(session = %self.tag, channel = event.channel, %error, "Channel failed");
                let actions = self.machine.on_channel_lost();
                self.execute(actions);
            }
            ChannelEventKind::Closed => {
                self.channel = None;
                attached(&self.attached).channel = None;
                let actions = self.machine.on_channel_lost();
                self.execute(actions);
            }
        }
    }

    fn on_event(&mut self, event: TaggedEvent) {
        if event.tag != self.tag {
            metrics::record_stale_event();
            tracing::debug!(session = %self.tag, stale = %event.tag, "Dropping event from another session");
            return;
        }
        if !self.loaded {
            self.queued.push(event);
            return;
        }
        self.apply(event.source, event.event);
    }

    fn apply(&mut self, source: EventSource, event: FeedEvent) {
        let kind = event.kind();
        let outcome = self
            .reconciler
            .apply_event(&mut self.state, event, Instant::now());
        metrics::record_event(source, outcome.as_str());
        if outcome.changed() {
            self.dirty = true;
        }

        match outcome {
            ApplyOutcome::Inserted(id) => {
                tracing::debug!(session = %self.tag, source = source.as_str(), id, "New request")
            }
            ApplyOutcome::Duplicate(id) => {
                tracing::debug!(session = %self.tag, source = source.as_str(), id, "Duplicate request ignored")
            }
            ApplyOutcome::Foreign(id) => {
                tracing::warn!(session = %self.tag, source = source.as_str(), id, "Request for another endpoint rejected")
            }
            ApplyOutcome::Ignored => {
                tracing::debug!(session = %self.tag, kind, "Event ignored")
            }
            _ => {}
        }
        self.high_water_mark
            .fetch_max(self.state.high_water_mark(), Ordering::AcqRel);
    }

    fn on_command(&mut self, command: Command) {
        match command {
            Command::Send(payload) => match &self.channel {
                Some(channel) => channel.send(&payload),
                None => tracing::warn!(session = %self.tag, "No channel; message dropped"),
            },
            Command::Delete(id, reply) => {
                let store = self.store.clone();
                let endpoint = self.tag.endpoint.clone();
                self.tasks.spawn(async move {
                    let result = store.delete_request(&endpoint, id).await;
                    Completion::Deleted { id, result, reply }
                });
            }
            Command::Clear(reply) => {
                let store = self.store.clone();
                let endpoint = self.tag.endpoint.clone();
                self.tasks.spawn(async move {
                    let result = store.clear_requests(&endpoint).await;
                    Completion::Cleared { result, reply }
                });
            }
            Command::Refresh(reply) => self.spawn_refresh(Some(reply)),
        }
    }

    fn on_completion(&mut self, completion: Completion) {
        match completion {
            Completion::Initial { endpoint, records } => {
                match endpoint {
                    Ok(endpoint) => self.state.set_endpoint(endpoint),
                    Err(e) => {
                        tracing::warn!(session = %self.tag, error = %e, "Could not fetch endpoint configuration")
                    }
                }
                let records = records.unwrap_or_else(|e| {
                    tracing::warn!(session = %self.tag, error = %e, "Initial request list failed; starting empty");
                    Vec::new()
                });
                let count = self.reconciler.merge_bulk(&mut self.state, records);
                metrics::record_bulk_merge(count);
                self.high_water_mark
                    .fetch_max(self.state.high_water_mark(), Ordering::AcqRel);
                self.loaded = true;
                self.dirty = true;
                tracing::info!(session = %self.tag, count, high_water_mark = self.state.high_water_mark(), "Feed loaded");

                for event in std::mem::take(&mut self.queued) {
                    self.apply(event.source, event.event);
                }
            }
            Completion::Refreshed { records, reply } => {
                let result = match records {
                    Ok(records) => {
                        let inserted = self.reconciler.merge_bulk(&mut self.state, records);
                        metrics::record_bulk_merge(inserted);
                        if inserted > 0 {
                            self.dirty = true;
                        }
                        self.high_water_mark
                            .fetch_max(self.state.high_water_mark(), Ordering::AcqRel);
                        tracing::info!(session = %self.tag, inserted, "Feed refreshed");
                        Ok(inserted)
                    }
                    Err(e) => {
                        tracing::warn!(session = %self.tag, error = %e, "Refresh failed");
                        Err(FeedError::Store(e))
                    }
                };
                if let Some(reply) = reply {
                    self.publish();
                    let _ = reply.send(result);
                }
            }
            Completion::Deleted { id, result, reply } => {
                let result = result.map(|()| self.remove(FeedEvent::RequestDeleted(id)));
                self.publish();
                let _ = reply.send(result.map_err(FeedError::Store));
            }
            Completion::Cleared { result, reply } => {
                let result = result.map(|()| self.remove(FeedEvent::RequestsCleared));
                self.publish();
                let _ = reply.send(result.map_err(FeedError::Store));
            }
        }
    }

    /// Apply a removal the store has confirmed. Before the initial load it
    /// is queued, since the bulk list in flight may predate it.
    fn remove(&mut self, event: FeedEvent) {
        self.on_event(TaggedEvent {
            tag: self.tag.clone(),
            source: EventSource::Operator,
            event,
        });
    }

    fn spawn_initial_fetch(&mut self) {
        let store = self.store.clone();
        let endpoint = self.tag.endpoint.clone();
        self.tasks.spawn(async move {
            let (endpoint_result, records) =
                tokio::join!(store.get_endpoint(&endpoint), store.list_requests(&endpoint));
            Completion::Initial {
                endpoint: endpoint_result,
                records,
            }
        });
    }

    fn spawn_refresh(&mut self, reply: Option<oneshot::Sender<Result<usize, FeedError>>>) {
        let store = self.store.clone();
        let endpoint = self.tag.endpoint.clone();
        self.tasks.spawn(async move {
            let records = store.list_requests(&endpoint).await;
            Completion::Refreshed { records, reply }
        });
    }

    fn execute(&mut self, actions: Vec<Action>) {
        for action in actions {
            match action {
                Action::OpenChannel => {
                    if let Some(mut old) = self.channel.take() {
                        old.close();
                    }
                    self.channel_seq += 1;
                    let channel = ChannelHandle::open(
                        self.url.clone(),
                        self.tag.clone(),
                        self.channel_seq,
                        self.connect_timeout,
                        self.channel_tx.clone(),
                    );
                    attached(&self.attached).channel = Some(channel.abort_handle());
                    self.channel = Some(channel);
                }
                Action::CloseChannel => {
                    if let Some(mut channel) = self.channel.take() {
                        channel.close();
                    }
                    attached(&self.attached).channel = None;
                }
                Action::ArmFallbackTimer(after) => {
                    self.fallback_deadline = Some(Instant::now() + after);
                }
                Action::CancelFallbackTimer => self.fallback_deadline = None,
                Action::ScheduleReconnect(delay) => {
                    metrics::record_reconnect_scheduled();
                    tracing::info!(
                        session = %self.tag,
                        delay_ms = delay.as_millis() as u64,
                        attempt = self.machine.policy().attempt(),
                        "Reconnection scheduled"
                    );
                    self.reconnect_deadline = Some(Instant::now() + delay);
                }
                Action::CancelReconnect => self.reconnect_deadline = None,
                Action::StartPolling => {
                    if self.polling.is_none() {
                        tracing::info!(session = %self.tag, "Channel not open within fallback window; polling");
                        let polling = PollingSource::start(
                            self.store.clone(),
                            self.tag.clone(),
                            self.high_water_mark.clone(),
                            self.poll_interval,
                            self.poll_tx.clone(),
                        );
                        attached(&self.attached).polling = Some(polling.abort_handle());
                        self.polling = Some(polling);
                    }
                }
                Action::StopPolling => {
                    if let Some(polling) = self.polling.take() {
                        polling.stop();
                        tracing::info!(session = %self.tag, "Fallback deactivated");
                    }
                    attached(&self.attached).polling = None;
                }
                Action::Refresh => self.spawn_refresh(None),
            }
        }
    }

    /// Publish a snapshot if the feed or the status moved since the last one.
    fn publish(&mut self) {
        let status = self.machine.status();
        if !self.dirty && status == self.state.connection_status() {
            return;
        }
        self.dirty = false;
        self.state.set_connection_status(status);
        metrics::record_connection_status(status);
        metrics::record_items(self.state.len());

        let snapshot = FeedSnapshot {
            tag: self.tag.clone(),
            endpoint: self.state.endpoint().cloned(),
            status,
            items: Arc::new(self.state.items().to_vec()),
            recently_arrived: Arc::new(self.state.recently_arrived().collect()),
            high_water_mark: self.state.high_water_mark(),
            loaded: self.loaded,
        };
        self.snapshot_tx.send_replace(snapshot);
    }
}

impl<S: RequestStore> Drop for Driver<S> {
    fn drop(&mut self) {
        let actions = self.machine.teardown();
        self.execute(actions);
        self.tasks.abort_all();
        metrics::record_connection_status(ConnectionStatus::Disconnected);
    }
}
