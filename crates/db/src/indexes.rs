use mongodb::{Database, IndexModel, options::IndexOptions};
use tracing::info;

use crate::models::NotificationDoc;

pub async fn ensure_indexes(db: &Database) -> Result<(), mongodb::error::Error> {
    // Notifications: the feed query filters by recipient and sorts newest-first,
    // with _id as the tie-breaker.
    create_indexes(
        db,
        NotificationDoc::COLLECTION,
        vec![
            index_named(
                bson::doc! { "recipient_id": 1, "created_at": -1, "_id": 1 },
                "recipient_feed",
            ),
            index(bson::doc! { "recipient_id": 1, "read": 1 }),
        ],
    )
    .await?;

    info!("MongoDB indexes ensured");
    Ok(())
}

async fn create_indexes(
    db: &Database,
    collection: &str,
    indexes: Vec<IndexModel>,
) -> Result<(), mongodb::error::Error> {
    let coll = db.collection::<bson::Document>(collection);
    coll.create_indexes(indexes).await?;
    Ok(())
}

fn index(keys: bson::Document) -> IndexModel {
    IndexModel::builder().keys(keys).build()
}

fn index_named(keys: bson::Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}
