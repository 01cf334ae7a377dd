pub mod backend;
pub mod center;
pub mod counter;
pub mod feed;
pub mod memory;
pub mod model;
pub mod panel;
pub mod pointer;
pub mod reconciler;
pub mod time;

pub use backend::{BackendError, FeedQuery, NotificationBackend, Snapshot, SnapshotStream};
pub use center::{CenterView, NotificationCenter, PANEL_ROOT_ID};
pub use feed::{FeedState, FeedSubscription};
pub use memory::InMemoryBackend;
pub use model::Notification;
pub use panel::PanelState;
pub use pointer::{PointerDown, PointerEvents};
