use async_trait::async_trait;
use carebell_db::models::RawNotification;
use thiserror::Error;
use tokio::{sync::mpsc, task::JoinHandle};

use crate::dao::base::DaoError;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Subscription failed: {0}")]
    Subscribe(String),
    #[error("Write failed: {0}")]
    Write(String),
    #[error("Notification not found: {0}")]
    NotFound(String),
    #[error(transparent)]
    Dao(#[from] DaoError),
}

/// One complete push of the current query result.
pub type Snapshot = Vec<RawNotification>;

/// The live query a view subscribes to: the newest `limit` notifications
/// addressed to `recipient_id`, ordered by `created_at` descending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedQuery {
    pub recipient_id: String,
    pub limit: usize,
}

impl FeedQuery {
    pub fn new(recipient_id: impl Into<String>, limit: usize) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            limit,
        }
    }
}

/// Receiving end of a live subscription.
///
/// Dropping the stream unsubscribes: the receiver closes and any producer task
/// owned by the stream is aborted.
pub struct SnapshotStream {
    receiver: mpsc::UnboundedReceiver<Result<Snapshot, BackendError>>,
    producer: Option<JoinHandle<()>>,
}

impl SnapshotStream {
    pub fn new(receiver: mpsc::UnboundedReceiver<Result<Snapshot, BackendError>>) -> Self {
        Self {
            receiver,
            producer: None,
        }
    }

    pub fn with_producer(
        receiver: mpsc::UnboundedReceiver<Result<Snapshot, BackendError>>,
        producer: JoinHandle<()>,
    ) -> Self {
        Self {
            receiver,
            producer: Some(producer),
        }
    }

    /// Next snapshot or subscription error; `None` once the backend closed the stream.
    pub async fn next(&mut self) -> Option<Result<Snapshot, BackendError>> {
        self.receiver.recv().await
    }
}

impl Drop for SnapshotStream {
    fn drop(&mut self) {
        self.receiver.close();
        if let Some(producer) = self.producer.take() {
            producer.abort();
        }
    }
}

/// The managed document store notifications live in.
#[async_trait]
pub trait NotificationBackend: Send + Sync + 'static {
    /// Opens a live query. The first snapshot is delivered as soon as it is
    /// available, then one per change affecting the result.
    async fn subscribe(&self, query: FeedQuery) -> Result<SnapshotStream, BackendError>;

    /// Reads the current result of `query` once, without subscribing.
    async fn snapshot(&self, query: FeedQuery) -> Result<Snapshot, BackendError>;

    /// Sets `read = true` on exactly one notification.
    async fn mark_read(&self, notification_id: &str) -> Result<(), BackendError>;

    /// Human-readable backend name.
    fn name(&self) -> &str;
}
