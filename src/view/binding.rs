//! Feed binding for the selected endpoint.

use std::sync::Arc;
use tokio::sync::watch;

use crate::config::FeedConfig;
use crate::liveness::{ConnectionStatus, FeedController, FeedError, FeedSnapshot};
use crate::model::{EndpointId, RequestId, RequestRecord};
use crate::store::RequestStore;
use crate::transport::ChannelError;

/// Owns at most one feed session, for the selected endpoint.
pub struct FeedBinding<S: RequestStore> {
    store: Arc<S>,
    config: FeedConfig,
    controller: Option<FeedController>,
}

impl<S: RequestStore> FeedBinding<S> {
    pub fn new(store: Arc<S>, config: FeedConfig) -> Self {
        Self {
            store,
            config,
            controller: None,
        }
    }

    /// Switch to `endpoint`, or to nothing. The previous session is torn
    /// down first, even when the same endpoint is selected again.
    pub fn select(&mut self, endpoint: Option<EndpointId>) -> Result<(), ChannelError> {
        if let Some(previous) = self.controller.take() {
            previous.teardown();
        }
        if let Some(endpoint) = endpoint {
            self.controller = Some(FeedController::spawn(
                self.store.clone(),
                &self.config,
                endpoint,
            )?);
        }
        Ok(())
    }

    /// Tear down the current session, if any.
    pub fn unmount(&mut self) {
        if let Some(controller) = self.controller.take() {
            controller.teardown();
        }
    }

    pub fn endpoint_id(&self) -> Option<&EndpointId> {
        self.controller.as_ref().map(FeedController::endpoint_id)
    }

    pub fn snapshot(&self) -> Option<FeedSnapshot> {
        self.controller.as_ref().map(FeedController::snapshot)
    }

    /// Snapshot updates for the current session. A new receiver is needed
    /// after every `select`.
    pub fn subscribe(&self) -> Option<watch::Receiver<FeedSnapshot>> {
        self.controller.as_ref().map(FeedController::subscribe)
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.snapshot()
            .map_or(ConnectionStatus::Disconnected, |snapshot| snapshot.status)
    }

    /// Records newest first.
    pub fn items(&self) -> Arc<Vec<RequestRecord>> {
        self.snapshot()
            .map(|snapshot| snapshot.items)
            .unwrap_or_default()
    }

    pub fn is_recently_arrived(&self, id: RequestId) -> bool {
        self.snapshot()
            .is_some_and(|snapshot| snapshot.is_recently_arrived(id))
    }

    /// Best-effort pass-through to the channel.
    pub fn send_message(&self, payload: serde_json::Value) {
        match &self.controller {
            Some(controller) => controller.send_message(payload),
            None => tracing::warn!("No endpoint selected; message dropped"),
        }
    }

    pub async fn delete_request(&self, id: RequestId) -> Result<(), FeedError> {
        self.current()?.delete_request(id).await
    }

    pub async fn clear_requests(&self) -> Result<(), FeedError> {
        self.current()?.clear_requests().await
    }

    pub async fn refresh(&self) -> Result<usize, FeedError> {
        self.current()?.refresh().await
    }

    fn current(&self) -> Result<&FeedController, FeedError> {
        self.controller.as_ref().ok_or(FeedError::NoEndpoint)
    }
}
