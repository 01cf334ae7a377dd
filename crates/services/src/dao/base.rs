use bson::{doc, oid::ObjectId, Document};
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DaoError {
    #[error("MongoDB error: {0}")]
    Mongo(#[from] mongodb::error::Error),
    #[error("BSON serialization error: {0}")]
    BsonSer(#[from] bson::ser::Error),
    #[error("BSON deserialization error: {0}")]
    BsonDe(#[from] bson::de::Error),
    #[error("Entity not found")]
    NotFound,
    #[error("Invalid id: {0}")]
    InvalidId(String),
}

pub type DaoResult<T> = Result<T, DaoError>;

pub fn parse_object_id(id: &str) -> DaoResult<ObjectId> {
    ObjectId::parse_str(id).map_err(|_| DaoError::InvalidId(id.to_string()))
}

pub struct BaseDao<T: Send + Sync> {
    collection: Collection<T>,
}

impl<T> BaseDao<T>
where
    T: Serialize + for<'de> Deserialize<'de> + Unpin + Send + Sync,
{
    pub fn new(db: &Database, collection_name: &str) -> Self {
        Self {
            collection: db.collection::<T>(collection_name),
        }
    }

    pub fn collection(&self) -> &Collection<T> {
        &self.collection
    }

    pub async fn find_by_id(&self, id: ObjectId) -> DaoResult<T> {
        self.collection
            .find_one(doc! { "_id": id })
            .await?
            .ok_or(DaoError::NotFound)
    }

    /// Runs `pipeline` and decodes each result as `T`. Documents that don't
    /// decode are logged and skipped, so one bad record can't sink the query.
    pub async fn aggregate_lenient(&self, pipeline: Vec<Document>) -> DaoResult<Vec<T>> {
        use futures::TryStreamExt;

        let mut cursor = self.collection.aggregate(pipeline).await?;

        let mut results = Vec::new();
        while let Some(doc) = cursor.try_next().await? {
            let id = doc.get("_id").cloned();
            match bson::from_document::<T>(doc) {
                Ok(decoded) => results.push(decoded),
                Err(e) => warn!(?id, %e, "Skipping malformed document"),
            }
        }
        Ok(results)
    }

    pub async fn insert_one(&self, doc: &T) -> DaoResult<ObjectId> {
        let result = self.collection.insert_one(doc).await?;
        let id = result
            .inserted_id
            .as_object_id()
            .ok_or_else(|| DaoError::InvalidId(result.inserted_id.to_string()))?;
        debug!(?id, "Inserted document");
        Ok(id)
    }

    /// Applies `update` to the document with `_id`. Returns whether a
    /// document matched, so a no-op update on an existing document is still
    /// a success.
    pub async fn update_by_id(&self, id: ObjectId, update: Document) -> DaoResult<bool> {
        let result = self
            .collection
            .update_one(doc! { "_id": id }, update)
            .await?;
        Ok(result.matched_count > 0)
    }

    pub async fn count(&self, filter: Document) -> DaoResult<u64> {
        Ok(self.collection.count_documents(filter).await?)
    }
}
