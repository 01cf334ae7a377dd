use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::{sync::oneshot, task::JoinHandle};
use tracing::{debug, info, warn};

use super::backend::{BackendError, FeedQuery, NotificationBackend, Snapshot, SnapshotStream};
use super::counter::{badge_label, unread_count};
use super::model::Notification;

/// The locally held feed for one view, republished after every snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct FeedState {
    pub notifications: Vec<Notification>,
    pub unread_count: usize,
    pub badge: Option<String>,
}

impl FeedState {
    pub fn new(notifications: Vec<Notification>, badge_cap: usize) -> Self {
        let unread_count = unread_count(&notifications);
        Self {
            badge: badge_label(unread_count, badge_cap),
            notifications,
            unread_count,
        }
    }

    pub fn unread_ids(&self) -> Vec<String> {
        self.notifications
            .iter()
            .filter(|n| !n.read)
            .map(|n| n.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&Notification> {
        self.notifications.iter().find(|n| n.id == id)
    }
}

/// Turns raw snapshots into the feed a view renders.
///
/// Each snapshot replaces the previous feed wholesale. Records addressed to
/// someone else are dropped, ids once seen read stay read, and the result is
/// ordered newest-first (ties by id) and capped at `limit`.
#[derive(Debug)]
pub struct FeedApplier {
    recipient_id: String,
    limit: usize,
    seen_read: HashSet<String>,
}

impl FeedApplier {
    pub fn new(recipient_id: impl Into<String>, limit: usize) -> Self {
        Self {
            recipient_id: recipient_id.into(),
            limit,
            seen_read: HashSet::new(),
        }
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    pub fn apply(&mut self, snapshot: Snapshot, now: DateTime<Utc>) -> Vec<Notification> {
        let mut feed: Vec<Notification> = snapshot
            .into_iter()
            .filter(|raw| raw.recipient_id == self.recipient_id)
            .map(|raw| Notification::from_raw(raw, now))
            .collect();

        for notification in &mut feed {
            if notification.read {
                self.seen_read.insert(notification.id.clone());
            } else if self.seen_read.contains(&notification.id) {
                notification.read = true;
            }
        }

        feed.sort_by(|a, b| {
            b.created_at
                .cmp(&a.created_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        feed.truncate(self.limit);
        feed
    }
}

/// A live feed subscription owned by one view.
///
/// `unsubscribe` consumes the handle, so it can run at most once; dropping the
/// handle without unsubscribing aborts the feed task.
pub struct FeedSubscription {
    recipient_id: String,
    cancel: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl FeedSubscription {
    /// Opens the backend query and starts applying its snapshots. `publish`
    /// receives every new feed state, and an empty one when the subscription
    /// is cancelled.
    pub async fn start<F>(
        backend: &dyn NotificationBackend,
        query: FeedQuery,
        badge_cap: usize,
        publish: F,
    ) -> Result<Self, BackendError>
    where
        F: Fn(FeedState) + Send + 'static,
    {
        let stream = backend.subscribe(query.clone()).await?;
        let (cancel_tx, cancel_rx) = oneshot::channel();
        let applier = FeedApplier::new(query.recipient_id.clone(), query.limit);
        let task = tokio::spawn(run_feed(stream, applier, badge_cap, publish, cancel_rx));

        info!(
            recipient_id = %query.recipient_id,
            limit = query.limit,
            backend = backend.name(),
            "Feed subscription opened"
        );

        Ok(Self {
            recipient_id: query.recipient_id,
            cancel: Some(cancel_tx),
            task: Some(task),
        })
    }

    pub fn recipient_id(&self) -> &str {
        &self.recipient_id
    }

    /// Stops applying snapshots and waits for the feed task to finish. Once
    /// this returns, no later snapshot can reach the view.
    pub async fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            let _ = cancel.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                if !e.is_cancelled() {
                    warn!(recipient_id = %self.recipient_id, %e, "Feed task panicked");
                }
            }
        }
        info!(recipient_id = %self.recipient_id, "Feed subscription closed");
    }
}

impl Drop for FeedSubscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

async fn run_feed<F>(
    mut stream: SnapshotStream,
    mut applier: FeedApplier,
    badge_cap: usize,
    publish: F,
    mut cancel: oneshot::Receiver<()>,
) where
    F: Fn(FeedState),
{
    let mut open = true;
    loop {
        tokio::select! {
            biased;
            _ = &mut cancel => {
                publish(FeedState::default());
                break;
            }
            item = stream.next(), if open => match item {
                Some(Ok(snapshot)) => {
                    let state = FeedState::new(applier.apply(snapshot, Utc::now()), badge_cap);
                    debug!(
                        recipient_id = %applier.recipient_id(),
                        count = state.notifications.len(),
                        unread = state.unread_count,
                        "Feed snapshot applied"
                    );
                    publish(state);
                }
                Some(Err(e)) => {
                    warn!(recipient_id = %applier.recipient_id(), %e, "Feed subscription error, keeping last snapshot");
                }
                None => {
                    warn!(recipient_id = %applier.recipient_id(), "Feed stream closed by backend, keeping last snapshot");
                    open = false;
                }
            }
        }
    }
}
