use carebell_config::Settings;
use carebell_db::indexes::ensure_indexes;
use carebell_services::{
    NotificationBackend,
    dao::MongoNotificationBackend,
    notifications::{BackendError, FeedQuery, SnapshotStream, Snapshot},
};
use bson::{Document, doc};
use mongodb::{Client, Database};
use std::time::Duration;

/// Change streams only work against a replica set. Point
/// CAREBELL__DATABASE__URL at one to run these.
async fn test_db() -> Database {
    let settings = Settings::load().expect("Failed to load settings");
    let client = Client::with_uri_str(&settings.database.url)
        .await
        .expect("Failed to create MongoDB client");
    let db = client.database(&format!("carebell_test_{}", uuid::Uuid::new_v4().simple()));
    ensure_indexes(&db).await.expect("Failed to create indexes");
    db
}

async fn next_snapshot(stream: &mut SnapshotStream) -> Snapshot {
    tokio::time::timeout(Duration::from_secs(10), stream.next())
        .await
        .expect("Timeout waiting for snapshot")
        .expect("Stream ended")
        .expect("Subscription failed")
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn live_query_pushes_writes() {
    let db = test_db().await;
    let backend = MongoNotificationBackend::new(&db);

    let first = backend
        .dao()
        .create("patient-1", Some("Dr. Mensah".to_string()), "Appointment confirmed")
        .await
        .unwrap();
    backend
        .dao()
        .create("patient-2", None, "Someone else's")
        .await
        .unwrap();

    let mut stream = backend
        .subscribe(FeedQuery::new("patient-1", 20))
        .await
        .unwrap();
    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(snapshot.len(), 1);
    assert!(!snapshot[0].read);

    let id = first.id.unwrap().to_hex();
    backend.mark_read(&id).await.unwrap();

    let mut snapshot = next_snapshot(&mut stream).await;
    while !snapshot.iter().all(|n| n.read) {
        snapshot = next_snapshot(&mut stream).await;
    }
    assert_eq!(snapshot[0].id, id);
    assert_eq!(backend.dao().count_unread("patient-1").await.unwrap(), 0);

    drop(stream);
    db.drop().await.ok();
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn mark_read_of_unknown_id_is_not_found() {
    let db = test_db().await;
    let backend = MongoNotificationBackend::new(&db);

    let err = backend
        .mark_read(&bson::oid::ObjectId::new().to_hex())
        .await
        .unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));

    let err = backend.mark_read("not-an-object-id").await.unwrap_err();
    assert!(matches!(err, BackendError::NotFound(_)));

    db.drop().await.ok();
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn feed_orders_mixed_timestamp_shapes_by_date() {
    let db = test_db().await;
    let backend = MongoNotificationBackend::new(&db);
    let raw = db.collection::<Document>("notifications");

    let old = chrono::DateTime::parse_from_rfc3339("2024-01-01T00:00:00Z")
        .unwrap()
        .with_timezone(&chrono::Utc);
    let older: Vec<Document> = (0..20)
        .map(|i| {
            doc! {
                "recipient_id": "patient-1",
                "message": format!("old {i}"),
                "created_at": bson::DateTime::from_chrono(old - chrono::Duration::minutes(i)),
                "read": false,
            }
        })
        .collect();
    raw.insert_many(older).await.unwrap();
    raw.insert_one(doc! {
        "recipient_id": "patient-1",
        "message": "newest as a string",
        "created_at": "2025-01-01T00:00:00Z",
        "read": false,
    })
    .await
    .unwrap();
    raw.insert_one(doc! {
        "recipient_id": "patient-1",
        "message": "newer as an epoch record",
        "created_at": { "seconds": 1_717_200_000_i64, "nanoseconds": 0 },
        "read": false,
    })
    .await
    .unwrap();

    let snapshot = backend
        .snapshot(FeedQuery::new("patient-1", 20))
        .await
        .unwrap();

    assert_eq!(snapshot.len(), 20);
    assert_eq!(snapshot[0].message, "newest as a string");
    assert_eq!(snapshot[1].message, "newer as an epoch record");

    db.drop().await.ok();
}

#[tokio::test]
#[ignore = "requires a MongoDB replica set"]
async fn malformed_documents_do_not_stop_the_feed() {
    let db = test_db().await;
    let backend = MongoNotificationBackend::new(&db);
    let raw = db.collection::<Document>("notifications");

    backend
        .dao()
        .create("patient-1", None, "well formed")
        .await
        .unwrap();
    raw.insert_one(doc! { "recipient_id": "patient-1", "message": "bad flag", "read": "yes" })
        .await
        .unwrap();

    let mut stream = backend
        .subscribe(FeedQuery::new("patient-1", 20))
        .await
        .unwrap();
    let snapshot = next_snapshot(&mut stream).await;
    assert_eq!(snapshot.len(), 1);

    // A bad write for someone else must not end this view's stream.
    raw.insert_one(doc! { "recipient_id": "patient-2", "message": null })
        .await
        .unwrap();
    backend
        .dao()
        .create("patient-1", None, "still live")
        .await
        .unwrap();

    let mut snapshot = next_snapshot(&mut stream).await;
    while snapshot.len() < 2 {
        snapshot = next_snapshot(&mut stream).await;
    }
    assert!(snapshot.iter().any(|n| n.message == "still live"));

    drop(stream);
    db.drop().await.ok();
}
