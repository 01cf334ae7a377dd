use crate::fixtures::test_app::TestApp;
use carebell_services::auth::UserRole;
use serde_json::Value;

#[tokio::test]
async fn list_returns_own_feed_with_counts() {
    let app = TestApp::spawn().await;
    let inbox = app.seed_inbox("patient", 2, 1).await;
    let other = app.seed_inbox("other", 3, 0).await;

    let resp = app
        .auth_get("/api/notification", &inbox.user.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let json: Value = resp.json().await.unwrap();
    let notifications = json["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 3);
    assert!(
        notifications
            .iter()
            .all(|n| n["recipient_id"] == inbox.user.id.as_str())
    );
    assert!(
        !notifications
            .iter()
            .any(|n| other.unread.iter().any(|id| n["id"] == id.as_str()))
    );
    assert_eq!(json["unread_count"], 2);
    assert_eq!(json["badge"], "2");
}

#[tokio::test]
async fn list_without_token_is_unauthorized() {
    let app = TestApp::spawn().await;

    let resp = app
        .client
        .get(app.url("/api/notification"))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["error"], "unauthorized");
}

#[tokio::test]
async fn list_with_foreign_token_is_unauthorized() {
    let app = TestApp::spawn().await;
    let foreign = carebell_services::AuthService::new(carebell_config::JwtSettings {
        secret: "some-other-secret-that-is-long-enough-to-sign".to_string(),
        access_token_ttl_secs: 3600,
        issuer: app.settings.jwt.issuer.clone(),
    });
    let token = foreign
        .generate_access_token("intruder", "Intruder", UserRole::Admin)
        .unwrap();

    let resp = app
        .auth_get("/api/notification", &token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 401);
}

#[tokio::test]
async fn list_is_capped_at_feed_limit() {
    let app = TestApp::spawn().await;
    let inbox = app.seed_inbox("busy", 25, 0).await;

    let json: Value = app
        .auth_get("/api/notification", &inbox.user.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["notifications"].as_array().unwrap().len(), 20);
    assert_eq!(json["unread_count"], 20);
    assert_eq!(json["badge"], "9+");
}

#[tokio::test]
async fn feed_limit_follows_settings() {
    let app = TestApp::spawn_with_settings(|s| {
        s.notifications.feed_limit = 5;
        s.notifications.badge_cap = 3;
    })
    .await;
    let inbox = app.seed_inbox("patient", 8, 0).await;

    let json: Value = app
        .auth_get("/api/notification", &inbox.user.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    assert_eq!(json["notifications"].as_array().unwrap().len(), 5);
    assert_eq!(json["badge"], "3+");
}

#[tokio::test]
async fn mark_read_updates_the_record() {
    let app = TestApp::spawn().await;
    let inbox = app.seed_inbox("patient", 2, 0).await;
    let target = &inbox.unread[0];

    let resp = app
        .auth_post(
            &format!("/api/notification/{}/read", target),
            &inbox.user.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);
    assert!(app.backend.get(target).unwrap().read);

    let json: Value = app
        .auth_get("/api/notification", &inbox.user.access_token)
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["unread_count"], 1);
}

#[tokio::test]
async fn mark_read_of_someone_elses_notification_is_not_found() {
    let app = TestApp::spawn().await;
    let mine = app.seed_inbox("patient", 1, 0).await;
    let theirs = app.seed_inbox("other", 1, 0).await;

    let resp = app
        .auth_post(
            &format!("/api/notification/{}/read", theirs.unread[0]),
            &mine.user.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 404);
    assert!(!app.backend.get(&theirs.unread[0]).unwrap().read);
    assert!(app.backend.writes().is_empty());
}

#[tokio::test]
async fn rest_reads_leave_no_live_subscription_behind() {
    let app = TestApp::spawn().await;
    let inbox = app.seed_inbox("patient", 1, 0).await;

    let resp = app
        .auth_get("/api/notification", &inbox.user.access_token)
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let resp = app
        .auth_post(
            &format!("/api/notification/{}/read", inbox.unread[0]),
            &inbox.user.access_token,
        )
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status().as_u16(), 204);

    assert_eq!(app.backend.subscriber_count(), 0);
}
