use crate::fixtures::test_app::TestApp;
use carebell_services::auth::UserRole;
use serde_json::Value;
use std::time::Duration;

#[tokio::test]
async fn health_check_reports_backend() {
    let app = TestApp::spawn().await;

    let resp = app.client.get(app.url("/health")).send().await.unwrap();
    assert_eq!(resp.status().as_u16(), 200);

    let json: Value = resp.json().await.unwrap();
    assert_eq!(json["status"], "ok");
    assert_eq!(json["backend"], "memory");
    assert_eq!(json["connections"], 0);
}

#[tokio::test]
async fn health_check_counts_open_views() {
    let app = TestApp::spawn().await;
    let user = app.seed_user("patient", UserRole::Patient);

    let mut first = app.connect_ws(&user.access_token).await;
    let _second = app.connect_ws(&user.access_token).await;

    let json: Value = app
        .client
        .get(app.url("/health"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(json["connections"], 2);
    assert_eq!(json["users"], 1);

    first.close(None).await.ok();

    // The server unregisters the view once it sees the close frame.
    let mut connections = Value::Null;
    for _ in 0..50 {
        let json: Value = app
            .client
            .get(app.url("/health"))
            .send()
            .await
            .unwrap()
            .json()
            .await
            .unwrap();
        connections = json["connections"].clone();
        if connections == 1 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(connections, 1);
}
