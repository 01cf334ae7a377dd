use std::sync::Arc;

use carebell_config::NotificationSettings;
use parking_lot::Mutex;
use serde::Serialize;
use tokio::{sync::watch, task::JoinHandle};
use tracing::{debug, warn};

use super::backend::{FeedQuery, NotificationBackend};
use super::feed::{FeedState, FeedSubscription};
use super::model::Notification;
use super::panel::{PanelEffect, PanelEvent, PanelState};
use super::pointer::{ListenerGuard, PointerDown, PointerEvents};
use super::reconciler::Reconciler;

/// Element id of the panel root in the shell's markup.
pub const PANEL_ROOT_ID: &str = "notification-panel";

/// Everything the shell renders for the bell and its panel.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CenterView {
    #[serde(flatten)]
    pub feed: FeedState,
    pub is_panel_open: bool,
}

/// The notification bell of one mounted view: live feed, unread badge,
/// panel state and read-state actions.
///
/// Only the feed subscription writes `CenterView::feed`; panel transitions
/// only write `is_panel_open`.
pub struct NotificationCenter {
    backend: Arc<dyn NotificationBackend>,
    settings: NotificationSettings,
    view: Arc<watch::Sender<CenterView>>,
    panel: Arc<Mutex<PanelState>>,
    subscription: tokio::sync::Mutex<Option<FeedSubscription>>,
    reconciler: Reconciler,
    outside_click: Mutex<Option<ListenerGuard>>,
}

impl NotificationCenter {
    pub fn new(backend: Arc<dyn NotificationBackend>, settings: NotificationSettings) -> Self {
        let (view, _) = watch::channel(CenterView::default());
        Self {
            reconciler: Reconciler::new(Arc::clone(&backend)),
            backend,
            settings,
            view: Arc::new(view),
            panel: Arc::new(Mutex::new(PanelState::Closed)),
            subscription: tokio::sync::Mutex::new(None),
            outside_click: Mutex::new(None),
        }
    }

    pub fn view(&self) -> watch::Receiver<CenterView> {
        self.view.subscribe()
    }

    pub fn current(&self) -> CenterView {
        self.view.borrow().clone()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.view.borrow().feed.notifications.clone()
    }

    pub fn unread_count(&self) -> usize {
        self.view.borrow().feed.unread_count
    }

    pub fn is_panel_open(&self) -> bool {
        self.panel.lock().is_open()
    }

    pub async fn current_user(&self) -> Option<String> {
        self.subscription
            .lock()
            .await
            .as_ref()
            .map(|sub| sub.recipient_id().to_string())
    }

    /// Points the feed at `user_id`. The previous subscription, if any, is
    /// cancelled before the new one opens; `None` just cancels.
    pub async fn set_user(&self, user_id: Option<&str>) {
        let mut current = self.subscription.lock().await;

        if let (Some(active), Some(user_id)) = (current.as_ref(), user_id) {
            if active.recipient_id() == user_id {
                return;
            }
        }

        if let Some(previous) = current.take() {
            previous.unsubscribe().await;
        }

        let Some(user_id) = user_id else {
            debug!("Signed out, notification feed cleared");
            return;
        };

        let view = Arc::clone(&self.view);
        let query = FeedQuery::new(user_id, self.settings.feed_limit);
        let publish = move |feed: FeedState| {
            view.send_modify(|v| v.feed = feed);
        };

        match FeedSubscription::start(
            self.backend.as_ref(),
            query,
            self.settings.badge_cap,
            publish,
        )
        .await
        {
            Ok(subscription) => *current = Some(subscription),
            Err(e) => warn!(%user_id, %e, "Failed to open notification feed"),
        }
    }

    /// Keeps the feed bound to whoever the session says is signed in, until
    /// the session channel closes or the center is dropped.
    pub fn follow_session(
        self: &Arc<Self>,
        mut session: watch::Receiver<Option<String>>,
    ) -> JoinHandle<()> {
        let center = Arc::downgrade(self);
        tokio::spawn(async move {
            loop {
                let user_id = session.borrow_and_update().clone();
                match center.upgrade() {
                    Some(center) => center.set_user(user_id.as_deref()).await,
                    None => break,
                }

                if session.changed().await.is_err() {
                    if let Some(center) = center.upgrade() {
                        center.set_user(None).await;
                    }
                    break;
                }
            }
        })
    }

    /// Bell click.
    pub fn toggle_panel(&self) -> PanelState {
        self.handle(PanelEvent::BellClicked)
    }

    pub fn pointer_down(&self, event: &PointerDown) -> PanelState {
        self.handle(PanelEvent::PointerDown {
            inside_panel: event.is_within(PANEL_ROOT_ID),
        })
    }

    /// Click on a notification in the open panel.
    pub fn click_item(&self, notification_id: &str) -> PanelState {
        self.handle(PanelEvent::ItemClicked(notification_id.to_string()))
    }

    /// Marks one notification read in the background. Ids outside this
    /// view's feed are ignored.
    pub fn mark_one_read(&self, notification_id: &str) -> bool {
        if !self.in_feed(notification_id) {
            debug!(%notification_id, "Ignoring read for a notification outside the feed");
            return false;
        }
        self.reconciler.spawn_mark_read(notification_id)
    }

    /// Marks every currently unread notification read and waits for the writes.
    pub async fn mark_all_read(&self) {
        let unread = self.view.borrow().feed.unread_ids();
        self.reconciler.mark_all_read(unread).await;
    }

    /// Background variant of [`mark_all_read`](Self::mark_all_read).
    pub fn request_mark_all_read(&self) -> usize {
        let unread = self.view.borrow().feed.unread_ids();
        self.reconciler.spawn_mark_all_read(unread)
    }

    /// Waits for every background read-state write issued so far.
    pub async fn settle(&self) {
        self.reconciler.settle().await;
    }

    /// Closes the panel on pointer-downs outside it. Re-attaching replaces the
    /// previous listener.
    pub fn attach_outside_click(&self, events: &PointerEvents) {
        let panel = Arc::clone(&self.panel);
        let view = Arc::clone(&self.view);
        let guard = events.listen(move |event| {
            let inside_panel = event.is_within(PANEL_ROOT_ID);
            transition(&panel, &view, PanelEvent::PointerDown { inside_panel });
        });
        *self.outside_click.lock() = Some(guard);
    }

    pub fn detach_outside_click(&self) {
        self.outside_click.lock().take();
    }

    /// Unmount: stops listening and cancels the feed. In-flight writes are
    /// left to finish on their own.
    pub async fn teardown(&self) {
        self.detach_outside_click();
        self.set_user(None).await;
    }

    fn handle(&self, event: PanelEvent) -> PanelState {
        let (state, effect) = transition(&self.panel, &self.view, event);
        match effect {
            PanelEffect::None => {}
            PanelEffect::MarkAllRead => {
                let issued = self.request_mark_all_read();
                debug!(issued, "Panel opened, marking unread notifications read");
            }
            PanelEffect::MarkRead(id) => {
                self.mark_one_read(&id);
            }
        }
        state
    }

    fn in_feed(&self, notification_id: &str) -> bool {
        self.view.borrow().feed.get(notification_id).is_some()
    }
}

fn transition(
    panel: &Mutex<PanelState>,
    view: &watch::Sender<CenterView>,
    event: PanelEvent,
) -> (PanelState, PanelEffect) {
    let unread_count = view.borrow().feed.unread_count;
    let mut panel = panel.lock();
    let (next, effect) = panel.transition(event, unread_count);
    if next != *panel {
        *panel = next;
        view.send_modify(|v| v.is_panel_open = next.is_open());
    }
    (next, effect)
}
