use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use serde::Deserialize;

/// A pointer-down anywhere in the document.
///
/// `path` lists element ids from the event target outwards to the document
/// root, as the shell reports them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct PointerDown {
    pub path: Vec<String>,
}

impl PointerDown {
    pub fn new<I, S>(path: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            path: path.into_iter().map(Into::into).collect(),
        }
    }

    /// True when the target is `root` or one of its descendants.
    pub fn is_within(&self, root: &str) -> bool {
        self.path.iter().any(|id| id == root)
    }
}

type Listener = Arc<dyn Fn(&PointerDown) + Send + Sync>;

/// Document-level pointer-down listeners.
#[derive(Clone, Default)]
pub struct PointerEvents {
    listeners: Arc<DashMap<u64, Listener>>,
    next_id: Arc<AtomicU64>,
}

impl PointerEvents {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `listener` until the returned guard is dropped.
    pub fn listen<F>(&self, listener: F) -> ListenerGuard
    where
        F: Fn(&PointerDown) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.listeners.insert(id, Arc::new(listener));
        ListenerGuard {
            id,
            listeners: Arc::clone(&self.listeners),
        }
    }

    pub fn dispatch(&self, event: &PointerDown) {
        // Snapshot first: a listener may drop its own guard.
        let listeners: Vec<Listener> = self
            .listeners
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Removes its listener on drop.
pub struct ListenerGuard {
    id: u64,
    listeners: Arc<DashMap<u64, Listener>>,
}

impl Drop for ListenerGuard {
    fn drop(&mut self) {
        self.listeners.remove(&self.id);
    }
}
