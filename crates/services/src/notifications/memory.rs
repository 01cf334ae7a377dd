use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use async_trait::async_trait;
use carebell_db::models::{RawNotification, RawTimestamp};
use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use super::backend::{
    BackendError, FeedQuery, NotificationBackend, Snapshot, SnapshotStream,
};

type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot, BackendError>>;

struct Subscriber {
    query: FeedQuery,
    sender: SnapshotSender,
}

/// Process-local notification store with live queries.
///
/// Every write re-runs the affected subscribers' queries and pushes a fresh
/// snapshot, the way the managed backend does. Used for local development
/// and as the backend in tests.
#[derive(Default)]
pub struct InMemoryBackend {
    records: RwLock<Vec<RawNotification>>,
    subscribers: DashMap<u64, Subscriber>,
    next_subscriber: AtomicU64,
    fail_writes: AtomicBool,
    writes: Mutex<Vec<String>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a new notification created now and returns its id.
    pub fn create(
        &self,
        recipient_id: &str,
        sender_name: Option<&str>,
        message: &str,
    ) -> String {
        let id = Uuid::new_v4().simple().to_string();
        self.insert(RawNotification {
            id: id.clone(),
            recipient_id: recipient_id.to_string(),
            sender_name: sender_name.map(str::to_string),
            message: message.to_string(),
            created_at: RawTimestamp::Native(Utc::now()),
            read: false,
        });
        id
    }

    pub fn insert(&self, notification: RawNotification) {
        let recipient_id = notification.recipient_id.clone();
        self.records.write().push(notification);
        self.publish_for(&recipient_id);
    }

    pub fn get(&self, id: &str) -> Option<RawNotification> {
        self.records.read().iter().find(|n| n.id == id).cloned()
    }

    /// Pushes `snapshot` verbatim to every live subscriber of `recipient_id`,
    /// bypassing the stored records. Returns how many subscribers received it.
    pub fn emit(&self, recipient_id: &str, snapshot: Snapshot) -> usize {
        let mut delivered = 0;
        self.subscribers.retain(|_, sub| {
            if sub.query.recipient_id != recipient_id {
                return !sub.sender.is_closed();
            }
            let ok = sub.sender.send(Ok(snapshot.clone())).is_ok();
            delivered += usize::from(ok);
            ok
        });
        delivered
    }

    /// Pushes a subscription error to every live subscriber of `recipient_id`.
    pub fn emit_error(&self, recipient_id: &str, message: &str) {
        for sub in self.subscribers.iter() {
            if sub.query.recipient_id == recipient_id {
                let _ = sub
                    .sender
                    .send(Err(BackendError::Subscribe(message.to_string())));
            }
        }
    }

    /// Makes every subsequent `mark_read` fail.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Ids passed to `mark_read`, in call order, including failed attempts.
    pub fn writes(&self) -> Vec<String> {
        self.writes.lock().clone()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .iter()
            .filter(|sub| !sub.sender.is_closed())
            .count()
    }

    fn publish_for(&self, recipient_id: &str) {
        let records = self.records.read();
        self.subscribers.retain(|id, sub| {
            if sub.query.recipient_id != recipient_id {
                return !sub.sender.is_closed();
            }
            let alive = sub.sender.send(Ok(run_query(&records, &sub.query))).is_ok();
            if !alive {
                debug!(subscriber = id, "Dropping closed in-memory subscriber");
            }
            alive
        });
    }
}

fn run_query(records: &[RawNotification], query: &FeedQuery) -> Snapshot {
    let now = Utc::now();
    let mut result: Snapshot = records
        .iter()
        .filter(|n| n.recipient_id == query.recipient_id)
        .cloned()
        .collect();
    result.sort_by(|a, b| {
        b.created_at
            .normalize(now)
            .cmp(&a.created_at.normalize(now))
            .then_with(|| a.id.cmp(&b.id))
    });
    result.truncate(query.limit);
    result
}

#[async_trait]
impl NotificationBackend for InMemoryBackend {
    async fn subscribe(&self, query: FeedQuery) -> Result<SnapshotStream, BackendError> {
        let (sender, receiver) = mpsc::unbounded_channel();

        // Holding the read lock orders the initial snapshot before any
        // snapshot caused by a concurrent write.
        let records = self.records.read();
        sender
            .send(Ok(run_query(&records, &query)))
            .map_err(|e| BackendError::Subscribe(e.to_string()))?;
        let id = self.next_subscriber.fetch_add(1, Ordering::SeqCst);
        self.subscribers.insert(id, Subscriber { query, sender });
        drop(records);
        Ok(SnapshotStream::new(receiver))
    }

    async fn snapshot(&self, query: FeedQuery) -> Result<Snapshot, BackendError> {
        Ok(run_query(&self.records.read(), &query))
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), BackendError> {
        self.writes.lock().push(notification_id.to_string());

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(BackendError::Write("simulated write failure".to_string()));
        }

        let recipient_id = {
            let mut records = self.records.write();
            let record = records
                .iter_mut()
                .find(|n| n.id == notification_id)
                .ok_or_else(|| BackendError::NotFound(notification_id.to_string()))?;
            record.read = true;
            record.recipient_id.clone()
        };

        self.publish_for(&recipient_id);
        Ok(())
    }

    fn name(&self) -> &str {
        "memory"
    }
}
