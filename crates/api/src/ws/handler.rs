use axum::{
    extract::{
        Query, State, WebSocketUpgrade,
        ws::{Message, WebSocket},
    },
    response::Response,
};
use carebell_services::{
    NotificationCenter,
    auth::Claims,
    notifications::{CenterView, Notification, PointerDown, PointerEvents, time::format_distance},
};
use chrono::{DateTime, Utc};
use futures::{SinkExt, StreamExt, stream::SplitSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::{error::ApiError, state::AppState};

type WsSender = Arc<Mutex<SplitSink<WebSocket, Message>>>;

#[derive(Debug, Deserialize)]
pub struct WsParams {
    pub token: String,
}

pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(params): Query<WsParams>,
    ws: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    // Verify JWT before accepting the WebSocket
    let claims = state.auth.verify_access_token(&params.token)?;
    Ok(ws.on_upgrade(move |socket| handle_socket(socket, state, claims)))
}

/// One open socket is one mounted view with its own bell and panel.
struct View {
    user_id: String,
    connection_id: String,
    center: Arc<NotificationCenter>,
    pointer_events: PointerEvents,
    sender: WsSender,
}

async fn handle_socket(socket: WebSocket, state: AppState, claims: Claims) {
    let user_id = claims.sub.clone();
    let connection_id = Uuid::new_v4().to_string();
    info!(%user_id, %connection_id, "WebSocket connected");

    let (sender, mut receiver) = socket.split();
    let sender: WsSender = Arc::new(Mutex::new(sender));
    state.ws_storage.add(&user_id, connection_id.clone());

    let center = Arc::new(NotificationCenter::new(
        state.notifications.clone(),
        state.settings.notifications.clone(),
    ));
    let pointer_events = PointerEvents::new();
    center.attach_outside_click(&pointer_events);

    let mut updates = center.view();
    let (session, session_rx) = watch::channel(Some(user_id.clone()));
    let follower = center.follow_session(session_rx);

    let view = View {
        user_id,
        connection_id,
        center,
        pointer_events,
        sender,
    };

    let connected = serde_json::json!({
        "type": "connected",
        "data": {
            "user_id": view.user_id,
            "name": claims.name,
            "role": claims.role,
        }
    });
    send_json(&view.sender, &connected).await;
    send_json(&view.sender, &feed_update(&view.center.current(), Utc::now())).await;

    loop {
        tokio::select! {
            msg = receiver.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_client_message(&view, &text).await,
                Some(Ok(Message::Ping(data))) => {
                    let mut guard = view.sender.lock().await;
                    let _ = guard.send(Message::Pong(data)).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Err(e)) => {
                    warn!(user_id = %view.user_id, connection_id = %view.connection_id, %e, "WebSocket error");
                    break;
                }
                Some(Ok(_)) => {}
            },
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let current = updates.borrow_and_update().clone();
                if !send_json(&view.sender, &feed_update(&current, Utc::now())).await {
                    break;
                }
            }
        }
    }

    // Closing the session channel makes the follower cancel the feed and exit.
    drop(session);
    if let Err(e) = follower.await {
        warn!(user_id = %view.user_id, %e, "Session follower did not finish cleanly");
    }
    view.center.teardown().await;
    state.ws_storage.remove(&view.user_id, &view.connection_id);

    info!(user_id = %view.user_id, connection_id = %view.connection_id, "WebSocket disconnected");
}

async fn handle_client_message(view: &View, text: &str) {
    let parsed: serde_json::Value = match serde_json::from_str(text) {
        Ok(v) => v,
        Err(_) => return,
    };

    let msg_type = parsed.get("type").and_then(|t| t.as_str()).unwrap_or("");
    let data = parsed.get("data");

    debug!(user_id = %view.user_id, connection_id = %view.connection_id, msg_type, "WS message received");

    match msg_type {
        "ping" => {
            send_json(&view.sender, &serde_json::json!({ "type": "pong" })).await;
        }
        "panel:toggle" => {
            view.center.toggle_panel();
        }
        "panel:pointer_down" => {
            match data.cloned().map(serde_json::from_value::<PointerDown>) {
                Some(Ok(event)) => view.pointer_events.dispatch(&event),
                _ => debug!(user_id = %view.user_id, "Malformed pointer_down payload"),
            }
        }
        "notification:click" => {
            if let Some(id) = notification_id(data) {
                view.center.click_item(id);
            }
        }
        "notification:mark_read" => {
            if let Some(id) = notification_id(data) {
                view.center.mark_one_read(id);
            }
        }
        "notification:mark_all_read" => {
            if view.center.unread_count() > 0 {
                view.center.request_mark_all_read();
            }
        }
        _ => {
            debug!(user_id = %view.user_id, msg_type, "Unknown WS message type");
        }
    }
}

fn notification_id(data: Option<&serde_json::Value>) -> Option<&str> {
    data.and_then(|d| d.get("id")).and_then(|id| id.as_str())
}

#[derive(Serialize)]
struct NotificationPayload<'a> {
    #[serde(flatten)]
    notification: &'a Notification,
    created_ago: String,
    avatar_initial: char,
}

fn feed_update(view: &CenterView, now: DateTime<Utc>) -> serde_json::Value {
    let notifications: Vec<NotificationPayload<'_>> = view
        .feed
        .notifications
        .iter()
        .map(|notification| NotificationPayload {
            notification,
            created_ago: format_distance(notification.created_at, now),
            avatar_initial: notification.avatar_initial(),
        })
        .collect();

    serde_json::json!({
        "type": "feed:update",
        "data": {
            "notifications": notifications,
            "unread_count": view.feed.unread_count,
            "badge": view.feed.badge,
            "is_panel_open": view.is_panel_open,
        }
    })
}

/// Returns false once the client is gone.
async fn send_json(sender: &WsSender, message: &serde_json::Value) -> bool {
    let Ok(text) = serde_json::to_string(message) else {
        return false;
    };
    let mut guard = sender.lock().await;
    guard.send(Message::text(text)).await.is_ok()
}
