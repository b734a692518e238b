//! Transport channel: one push connection to one endpoint's event stream.
//!
//! # Responsibilities
//! - Open a WebSocket without blocking the caller
//! - Report `Opened`, `Message`, `Error` and `Closed` to the owner
//! - Decode frames; drop malformed ones with a log entry
//! - Answer server `ping` frames with `pong`
//!
//! # Contract
//! - `open` returns immediately; success is only visible as an `Opened` event
//! - `send` before `Opened` logs a warning and drops the payload
//! - every channel emits exactly one `Closed`, whether or not it ever opened
//! - `close` is idempotent; dropping the handle closes the channel

use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::timeout;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use url::Url;

use crate::config::FeedConfig;
use crate::model::{ChannelMessage, EndpointId, FeedEvent, SessionTag};
use crate::transport::codec;

const CLOSE_FRAME_TIMEOUT: Duration = Duration::from_secs(1);

/// Errors building a channel address.
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("invalid channel URL: {0}")]
    InvalidUrl(String),

    #[error("cannot derive a channel URL from scheme '{0}'")]
    UnsupportedScheme(String),
}

/// What happened on a channel.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelEventKind {
    Opened,
    Message(FeedEvent),
    Error(String),
    Closed,
}

/// A channel notification, stamped with the session and channel instance.
#[derive(Debug, Clone)]
pub struct ChannelEvent {
    pub tag: SessionTag,
    /// Sequence number of the channel instance within its session.
    pub channel: u64,
    pub kind: ChannelEventKind,
}

/// Build the channel address for an endpoint.
///
/// Uses `channel.base_url` when set, otherwise the store base URL with its
/// scheme switched to ws/wss; `channel.path_prefix` and the endpoint id are
/// appended as path segments.
pub fn channel_url(config: &FeedConfig, endpoint: &EndpointId) -> Result<Url, ChannelError> {
    let raw = config
        .channel
        .base_url
        .as_deref()
        .unwrap_or(&config.store.base_url);
    let mut url = Url::parse(raw).map_err(|e| ChannelError::InvalidUrl(format!("'{}': {}", raw, e)))?;

    let scheme = match url.scheme() {
        "http" | "ws" => "ws",
        "https" | "wss" => "wss",
        other => return Err(ChannelError::UnsupportedScheme(other.to_string())),
    };
    url.set_scheme(scheme)
        .map_err(|_| ChannelError::UnsupportedScheme(url.scheme().to_string()))?;

    url.path_segments_mut()
        .map_err(|_| ChannelError::InvalidUrl(raw.to_string()))?
        .pop_if_empty()
        .extend(config.channel.path_prefix.split('/').filter(|s| !s.is_empty()))
        .push(endpoint.as_str());

    Ok(url)
}

/// Owner-side handle of an open or opening channel.
pub struct ChannelHandle {
    id: u64,
    url: Url,
    open: Arc<AtomicBool>,
    outgoing: mpsc::UnboundedSender<Message>,
    close_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl ChannelHandle {
    /// Start connecting to `url`. Events are delivered to `events`.
    pub fn open(
        url: Url,
        tag: SessionTag,
        id: u64,
        connect_timeout: Duration,
        events: mpsc::UnboundedSender<ChannelEvent>,
    ) -> Self {
        let open = Arc::new(AtomicBool::new(false));
        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (close_tx, close_rx) = oneshot::channel();

        tracing::debug!(%url, channel = id, session = %tag, "Opening channel");

        let worker = ChannelWorker {
            url: url.clone(),
            tag,
            id,
            open: open.clone(),
            events,
        };
        let task = tokio::spawn(worker.run(connect_timeout, outgoing_rx, close_rx));

        Self {
            id,
            url,
            open,
            outgoing,
            close_tx: Some(close_tx),
            task,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Whether the channel has opened and not yet closed.
    pub fn is_open(&self) -> bool {
        self.open.load(Ordering::Acquire)
    }

    /// Fire-and-forget send. Dropped with a warning unless the channel is open.
    pub fn send<T: Serialize + ?Sized>(&self, payload: &T) {
        if !self.is_open() {
            tracing::warn!(channel = self.id, "Send before channel open; payload dropped");
            return;
        }
        match codec::encode(payload) {
            Ok(text) => {
                if self.outgoing.send(Message::Text(text.into())).is_err() {
                    tracing::warn!(channel = self.id, "Channel worker gone; payload dropped");
                }
            }
            Err(e) => tracing::warn!(channel = self.id, error = %e, "Payload dropped"),
        }
    }

    /// Close the channel. Safe to call any number of times.
    pub fn close(&mut self) {
        if let Some(close_tx) = self.close_tx.take() {
            tracing::debug!(channel = self.id, "Closing channel");
            let _ = close_tx.send(());
        }
    }

    /// Whether the worker task has finished (its `Closed` event has been sent).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Handle that stops the worker outright, without a close frame.
    pub fn abort_handle(&self) -> AbortHandle {
        self.task.abort_handle()
    }
}

struct ChannelWorker {
    url: Url,
    tag: SessionTag,
    id: u64,
    open: Arc<AtomicBool>,
    events: mpsc::UnboundedSender<ChannelEvent>,
}

impl ChannelWorker {
    fn emit(&self, kind: ChannelEventKind) {
        let _ = self.events.send(ChannelEvent {
            tag: self.tag.clone(),
            channel: self.id,
            kind,
        });
    }

    async fn run(
        self,
        connect_timeout: Duration,
        mut outgoing: mpsc::UnboundedReceiver<Message>,
        mut close_rx: oneshot::Receiver<()>,
    ) {
        let connect = timeout(connect_timeout, connect_async(self.url.as_str()));
        let stream = tokio::select! {
            _ = &mut close_rx => {
                self.emit(ChannelEventKind::Closed);
                return;
            }
            result = connect => match result {
                Ok(Ok((stream, _response))) => stream,
                Ok(Err(e)) => {
                    tracing::warn!(url = %self.url, channel = self.id, error = %e, "Channel connect failed");
                    self.emit(ChannelEventKind::Error(e.to_string()));
                    self.emit(ChannelEventKind::Closed);
                    return;
                }
                Err(_) => {
                    tracing::warn!(url = %self.url, channel = self.id, "Channel connect timed out");
                    self.emit(ChannelEventKind::Error(format!(
                        "connect timed out after {}ms",
                        connect_timeout.as_millis()
                    )));
                    self.emit(ChannelEventKind::Closed);
                    return;
                }
            }
        };

        self.open.store(true, Ordering::Release);
        tracing::info!(url = %self.url, channel = self.id, "Channel open");
        self.emit(ChannelEventKind::Opened);

        let (mut sink, mut frames) = stream.split();
        loop {
            tokio::select! {
                _ = &mut close_rx => {
                    let _ = timeout(CLOSE_FRAME_TIMEOUT, sink.send(Message::Close(None))).await;
                    break;
                }
                Some(message) = outgoing.recv() => {
                    if let Err(e) = sink.send(message).await {
                        tracing::warn!(channel = self.id, error = %e, "Channel send failed");
                        self.emit(ChannelEventKind::Error(e.to_string()));
                        break;
                    }
                }
                frame = frames.next() => match frame {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(reply) = self.on_text(text.as_str()) {
                            if let Err(e) = sink.send(reply).await {
                                tracing::warn!(channel = self.id, error = %e, "Channel reply failed");
                            }
                        }
                    }
                    Some(Ok(Message::Close(frame))) => {
                        tracing::info!(channel = self.id, ?frame, "Channel closed by server");
                        break;
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        tracing::warn!(channel = self.id, error = %e, "Channel error");
                        self.emit(ChannelEventKind::Error(e.to_string()));
                        break;
                    }
                    None => {
                        tracing::info!(channel = self.id, "Channel stream ended");
                        break;
                    }
                }
            }
        }

        self.open.store(false, Ordering::Release);
        self.emit(ChannelEventKind::Closed);
    }

    /// Handle one text frame; returns a frame to send back, if any.
    fn on_text(&self, text: &str) -> Option<Message> {
        match codec::decode(text) {
            Ok(ChannelMessage::Ping) => match codec::encode(&ChannelMessage::Pong) {
                Ok(pong) => Some(Message::Text(pong.into())),
                Err(e) => {
                    tracing::warn!(channel = self.id, error = %e, "Could not encode pong");
                    None
                }
            },
            Ok(message) => {
                if let Some(event) = message.into_feed_event() {
                    let event = match event {
                        FeedEvent::NewRequest(record) => {
                            FeedEvent::NewRequest(record.with_endpoint(&self.tag.endpoint))
                        }
                        other => other,
                    };
                    self.emit(ChannelEventKind::Message(event));
                }
                None
            }
            Err(e) => {
                tracing::warn!(channel = self.id, error = %e, "Dropping malformed frame");
                None
            }
        }
    }
}
