use std::collections::HashSet;
use std::sync::Arc;

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::task::JoinSet;
use tracing::{debug, warn};

use super::backend::NotificationBackend;

/// Writes read-state back to the backend.
///
/// The local feed is never touched here: a successful write shows up once
/// the backend pushes the next snapshot. Failures are logged and dropped, so
/// the notification simply stays unread until the user tries again.
///
/// Background writes are tracked so owners can [`settle`](Self::settle) them.
/// An id with a write still in flight is not written a second time.
pub struct Reconciler {
    backend: Arc<dyn NotificationBackend>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    tasks: Mutex<JoinSet<()>>,
}

impl Reconciler {
    pub fn new(backend: Arc<dyn NotificationBackend>) -> Self {
        Self {
            backend,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
            tasks: Mutex::new(JoinSet::new()),
        }
    }

    /// Marks one notification read and waits for the write.
    pub async fn mark_read(&self, notification_id: &str) {
        if self.claim(notification_id) {
            write_read_flag(
                Arc::clone(&self.backend),
                Arc::clone(&self.in_flight),
                notification_id.to_string(),
            )
            .await;
        }
    }

    /// Issues one write per id concurrently and waits for all of them. A
    /// failed write does not hold up the others.
    pub async fn mark_all_read(&self, notification_ids: Vec<String>) {
        let writes = self.claim_all(notification_ids).into_iter().map(|id| {
            write_read_flag(Arc::clone(&self.backend), Arc::clone(&self.in_flight), id)
        });
        join_all(writes).await;
    }

    /// Fire-and-forget variant of [`mark_read`](Self::mark_read).
    /// Returns false when a write for this id is already running.
    pub fn spawn_mark_read(&self, notification_id: &str) -> bool {
        if !self.claim(notification_id) {
            return false;
        }
        let fut = write_read_flag(
            Arc::clone(&self.backend),
            Arc::clone(&self.in_flight),
            notification_id.to_string(),
        );
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        tasks.spawn(fut);
        true
    }

    /// Fire-and-forget variant of [`mark_all_read`](Self::mark_all_read).
    /// Returns how many writes were issued.
    pub fn spawn_mark_all_read(&self, notification_ids: Vec<String>) -> usize {
        let claimed = self.claim_all(notification_ids);
        let issued = claimed.len();
        if issued == 0 {
            return 0;
        }

        let backend = Arc::clone(&self.backend);
        let in_flight = Arc::clone(&self.in_flight);
        let mut tasks = self.tasks.lock();
        reap_finished(&mut tasks);
        tasks.spawn(async move {
            let writes = claimed.into_iter().map(|id| {
                write_read_flag(Arc::clone(&backend), Arc::clone(&in_flight), id)
            });
            join_all(writes).await;
        });
        issued
    }

    /// Waits until every background write issued so far, and any issued
    /// while waiting, has finished.
    pub async fn settle(&self) {
        loop {
            let mut tasks = std::mem::take(&mut *self.tasks.lock());
            if tasks.is_empty() {
                return;
            }
            while let Some(result) = tasks.join_next().await {
                log_join_error(result);
            }
        }
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Background tasks still held, finished or not.
    pub fn tracked_tasks(&self) -> usize {
        self.tasks.lock().len()
    }

    fn claim(&self, notification_id: &str) -> bool {
        self.in_flight.lock().insert(notification_id.to_string())
    }

    fn claim_all(&self, notification_ids: Vec<String>) -> Vec<String> {
        let mut in_flight = self.in_flight.lock();
        notification_ids
            .into_iter()
            .filter(|id| in_flight.insert(id.clone()))
            .collect()
    }
}

impl Drop for Reconciler {
    fn drop(&mut self) {
        // Writes outlive the view that issued them.
        self.tasks.get_mut().detach_all();
    }
}

/// Drops tasks that already finished so a long-lived view doesn't keep
/// every handle it ever spawned.
fn reap_finished(tasks: &mut JoinSet<()>) {
    while let Some(result) = tasks.try_join_next() {
        log_join_error(result);
    }
}

fn log_join_error(result: Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        warn!(%e, "Read-state write task failed to complete");
    }
}

async fn write_read_flag(
    backend: Arc<dyn NotificationBackend>,
    in_flight: Arc<Mutex<HashSet<String>>>,
    notification_id: String,
) {
    match backend.mark_read(&notification_id).await {
        Ok(()) => debug!(%notification_id, "Notification marked read"),
        Err(e) => warn!(%notification_id, %e, "Failed to mark notification read"),
    }
    in_flight.lock().remove(&notification_id);
}
