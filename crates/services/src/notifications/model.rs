use carebell_db::models::RawNotification;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A notification after boundary normalization.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Notification {
    pub id: String,
    pub recipient_id: String,
    pub sender_name: Option<String>,
    pub message: String,
    pub created_at: DateTime<Utc>,
    pub read: bool,
}

impl Notification {
    pub fn from_raw(raw: RawNotification, now: DateTime<Utc>) -> Self {
        Self {
            created_at: raw.created_at.normalize(now),
            id: raw.id,
            recipient_id: raw.recipient_id,
            sender_name: raw.sender_name,
            message: raw.message,
            read: raw.read,
        }
    }

    /// Letter shown in the sender's avatar bubble.
    pub fn avatar_initial(&self) -> char {
        self.sender_name
            .as_deref()
            .and_then(|name| name.chars().find(|c| c.is_alphanumeric()))
            .and_then(|c| c.to_uppercase().next())
            .unwrap_or('?')
    }
}
