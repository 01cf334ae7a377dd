use bson::{Bson, DateTime, oid::ObjectId};
use serde::{Deserialize, Serialize};

use super::timestamp::RawTimestamp;

/// A notification as stored in the `notifications` collection.
///
/// `created_at` is kept as raw BSON: documents written by other services carry
/// native datetimes, ISO strings or `{seconds, nanoseconds}` records.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationDoc {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub id: Option<ObjectId>,
    pub recipient_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub created_at: Option<Bson>,
    #[serde(default)]
    pub read: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub read_at: Option<DateTime>,
}

impl NotificationDoc {
    pub const COLLECTION: &'static str = "notifications";

    pub fn new(recipient_id: impl Into<String>, sender_name: Option<String>, message: impl Into<String>) -> Self {
        Self {
            id: None,
            recipient_id: recipient_id.into(),
            sender_name,
            message: message.into(),
            created_at: Some(Bson::DateTime(DateTime::now())),
            read: false,
            read_at: None,
        }
    }

    /// Lifts the stored document into the backend-neutral raw record.
    /// Documents without an `_id` cannot be addressed and are skipped.
    pub fn into_raw(self) -> Option<RawNotification> {
        let id = self.id?;
        Some(RawNotification {
            id: id.to_hex(),
            recipient_id: self.recipient_id,
            sender_name: self.sender_name,
            message: self.message,
            created_at: RawTimestamp::from_bson(self.created_at.as_ref()),
            read: self.read,
        })
    }
}

/// A notification as delivered by any backend, before timestamp normalization.
#[derive(Debug, Clone, PartialEq)]
pub struct RawNotification {
    pub id: String,
    pub recipient_id: String,
    pub sender_name: Option<String>,
    pub message: String,
    pub created_at: RawTimestamp,
    pub read: bool,
}
