use std::sync::Arc;

use async_trait::async_trait;
use bson::{Bson, DateTime, Document, doc};
use carebell_db::models::NotificationDoc;
use futures::TryStreamExt;
use mongodb::{
    Database,
    change_stream::{
        ChangeStream,
        event::{ChangeStreamEvent, OperationType},
    },
    options::FullDocumentType,
};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::base::{BaseDao, DaoError, DaoResult, parse_object_id};
use crate::notifications::backend::{
    BackendError, FeedQuery, NotificationBackend, Snapshot, SnapshotStream,
};

pub struct NotificationDao {
    pub base: BaseDao<NotificationDoc>,
}

impl NotificationDao {
    pub fn new(db: &Database) -> Self {
        Self {
            base: BaseDao::new(db, NotificationDoc::COLLECTION),
        }
    }

    pub async fn create(
        &self,
        recipient_id: &str,
        sender_name: Option<String>,
        message: &str,
    ) -> DaoResult<NotificationDoc> {
        let doc = NotificationDoc::new(recipient_id, sender_name, message);
        let id = self.base.insert_one(&doc).await?;
        self.base.find_by_id(id).await
    }

    /// The newest `limit` notifications for `recipient_id`.
    ///
    /// Ordering runs on a normalized date rather than the raw `created_at`,
    /// which mixes BSON types across writers.
    pub async fn feed(&self, recipient_id: &str, limit: usize) -> DaoResult<Snapshot> {
        let docs = self
            .base
            .aggregate_lenient(feed_pipeline(recipient_id, limit))
            .await?;
        Ok(docs.into_iter().filter_map(NotificationDoc::into_raw).collect())
    }

    pub async fn mark_read(&self, notification_id: &str) -> DaoResult<()> {
        let id = parse_object_id(notification_id)?;
        let matched = self
            .base
            .update_by_id(
                id,
                doc! { "$set": { "read": true, "read_at": DateTime::now() } },
            )
            .await?;
        if !matched {
            return Err(DaoError::NotFound);
        }
        Ok(())
    }

    pub async fn count_unread(&self, recipient_id: &str) -> DaoResult<u64> {
        self.base
            .count(doc! { "recipient_id": recipient_id, "read": false })
            .await
    }
}

/// Live notification queries over a MongoDB change stream.
///
/// Each relevant change re-runs the feed query and pushes the full result.
/// Change streams need a replica set or sharded cluster.
#[derive(Clone)]
pub struct MongoNotificationBackend {
    dao: Arc<NotificationDao>,
}

impl MongoNotificationBackend {
    pub fn new(db: &Database) -> Self {
        Self {
            dao: Arc::new(NotificationDao::new(db)),
        }
    }

    pub fn dao(&self) -> &NotificationDao {
        &self.dao
    }
}

#[async_trait]
impl NotificationBackend for MongoNotificationBackend {
    async fn subscribe(&self, query: FeedQuery) -> Result<SnapshotStream, BackendError> {
        // Watch before the first read so no write between the two is missed.
        let changes = self
            .dao
            .base
            .collection()
            .clone_with_type::<Document>()
            .watch()
            .pipeline(change_filter(&query.recipient_id))
            .full_document(FullDocumentType::UpdateLookup)
            .await
            .map_err(|e| BackendError::Subscribe(e.to_string()))?;

        let (sender, receiver) = mpsc::unbounded_channel();
        let dao = Arc::clone(&self.dao);
        let producer = tokio::spawn(run_live_query(dao, query, changes, sender));
        Ok(SnapshotStream::with_producer(receiver, producer))
    }

    async fn snapshot(&self, query: FeedQuery) -> Result<Snapshot, BackendError> {
        Ok(self.dao.feed(&query.recipient_id, query.limit).await?)
    }

    async fn mark_read(&self, notification_id: &str) -> Result<(), BackendError> {
        self.dao
            .mark_read(notification_id)
            .await
            .map_err(|e| match e {
                DaoError::NotFound | DaoError::InvalidId(_) => {
                    BackendError::NotFound(notification_id.to_string())
                }
                other => BackendError::Dao(other),
            })
    }

    fn name(&self) -> &str {
        "mongo"
    }
}

type SnapshotSender = mpsc::UnboundedSender<Result<Snapshot, BackendError>>;

async fn run_live_query(
    dao: Arc<NotificationDao>,
    query: FeedQuery,
    mut changes: ChangeStream<ChangeStreamEvent<Document>>,
    sender: SnapshotSender,
) {
    info!(recipient_id = %query.recipient_id, "Live notification query started");
    if !push_snapshot(&dao, &query, &sender).await {
        return;
    }

    loop {
        match changes.try_next().await {
            Ok(Some(event)) => {
                if !affects(&event, &query.recipient_id) {
                    continue;
                }
                debug!(recipient_id = %query.recipient_id, op = ?event.operation_type, "Notification change");
                if !push_snapshot(&dao, &query, &sender).await {
                    break;
                }
            }
            Ok(None) => {
                debug!(recipient_id = %query.recipient_id, "Change stream ended");
                break;
            }
            Err(e) => {
                warn!(recipient_id = %query.recipient_id, %e, "Change stream failed");
                let _ = sender.send(Err(BackendError::Subscribe(e.to_string())));
                break;
            }
        }
    }
}

/// Returns false once the subscriber has gone away.
async fn push_snapshot(dao: &NotificationDao, query: &FeedQuery, sender: &SnapshotSender) -> bool {
    let result = dao
        .feed(&query.recipient_id, query.limit)
        .await
        .map_err(BackendError::from);
    sender.send(result).is_ok()
}

/// Server-side filter for the feed's change stream. Updates and deletes
/// pass through: an update's looked-up document can be gone by the time the
/// event is read, and a delete never carries one.
fn change_filter(recipient_id: &str) -> Vec<Document> {
    vec![doc! {
        "$match": {
            "$or": [
                { "fullDocument.recipient_id": recipient_id },
                { "operationType": { "$in": ["update", "delete"] } },
            ]
        }
    }]
}

fn affects(event: &ChangeStreamEvent<Document>, recipient_id: &str) -> bool {
    match event.operation_type {
        OperationType::Insert | OperationType::Update | OperationType::Replace => {
            event.full_document.as_ref().is_none_or(|doc| {
                doc.get_str("recipient_id")
                    .is_ok_and(|owner| owner == recipient_id)
            })
        }
        // Deletes carry no document, so the recipient is unknown.
        OperationType::Delete => true,
        _ => false,
    }
}

/// `$match` on the recipient, then sort on `created_at` resolved to a date:
/// datetimes as-is, strings and BSON timestamps converted, and
/// `{seconds, nanoseconds}` records scaled to milliseconds. Anything else,
/// including missing or unparsable values, sorts as the current time.
fn feed_pipeline(recipient_id: &str, limit: usize) -> Vec<Document> {
    let created_type = doc! { "$type": "$created_at" };
    let seconds = numeric_or(
        doc! { "$ifNull": ["$created_at.seconds", "$created_at._seconds"] },
        Bson::Null,
    );
    let nanoseconds = numeric_or(
        doc! { "$ifNull": ["$created_at.nanoseconds", "$created_at._nanoseconds"] },
        Bson::Int32(0),
    );
    let epoch_millis = doc! {
        "$add": [
            { "$multiply": [seconds, 1000] },
            { "$divide": [nanoseconds, 1_000_000] },
        ]
    };

    let feed_at = doc! {
        "$switch": {
            "branches": [
                { "case": { "$eq": [created_type.clone(), "date"] }, "then": "$created_at" },
                {
                    "case": { "$in": [created_type.clone(), ["string", "timestamp"]] },
                    "then": to_date_or_now("$created_at"),
                },
                {
                    "case": { "$eq": [created_type, "object"] },
                    "then": to_date_or_now(epoch_millis),
                },
            ],
            "default": "$$NOW",
        }
    };

    vec![
        doc! { "$match": { "recipient_id": recipient_id } },
        doc! { "$addFields": { FEED_SORT_FIELD: feed_at } },
        doc! { "$sort": { FEED_SORT_FIELD: -1, "_id": 1 } },
        doc! { "$limit": i64::try_from(limit).unwrap_or(i64::MAX) },
        doc! { "$project": { FEED_SORT_FIELD: 0 } },
    ]
}

const FEED_SORT_FIELD: &str = "_feed_at";

fn numeric_or(value: Document, fallback: Bson) -> Document {
    doc! {
        "$let": {
            "vars": { "v": value },
            "in": { "$cond": [{ "$isNumber": "$$v" }, "$$v", fallback] },
        }
    }
}

fn to_date_or_now(input: impl Into<Bson>) -> Document {
    doc! {
        "$convert": {
            "input": input.into(),
            "to": "date",
            "onError": "$$NOW",
            "onNull": "$$NOW",
        }
    }
}
