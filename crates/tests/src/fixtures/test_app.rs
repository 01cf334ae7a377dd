use carebell_api::{build_router, state::AppState};
use carebell_config::{FeedBackendKind, Settings};
use carebell_services::{AuthService, InMemoryBackend, auth::UserRole};
use futures::StreamExt;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, tungstenite::Message};

pub type WsClient = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// A running test application backed by its own in-memory notification store.
pub struct TestApp {
    pub addr: SocketAddr,
    pub base_url: String,
    pub settings: Settings,
    pub backend: Arc<InMemoryBackend>,
    pub auth: AuthService,
    pub client: reqwest::Client,
}

impl TestApp {
    /// Spawn a new test server on a random local port.
    pub async fn spawn() -> Self {
        Self::spawn_with_settings(|_| {}).await
    }

    /// Spawn a test server with customized settings.
    ///
    /// The `mutator` closure receives a `&mut Settings` after defaults are applied,
    /// allowing tests to tweak specific fields (e.g., the feed limit).
    pub async fn spawn_with_settings(mutator: impl FnOnce(&mut Settings)) -> Self {
        let mut settings = Settings::load().unwrap_or_else(|_| test_settings());
        settings.notifications.backend = FeedBackendKind::Memory;
        mutator(&mut settings);

        let backend = Arc::new(InMemoryBackend::new());
        let app_state = AppState::new(settings.clone(), backend.clone());
        let app = build_router(app_state);

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind to random port");
        let addr = listener.local_addr().unwrap();

        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            base_url: format!("http://{}", addr),
            auth: AuthService::new(settings.jwt.clone()),
            settings,
            backend,
            client: reqwest::Client::new(),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    /// Mints an access token the server accepts.
    pub fn token_for(&self, user_id: &str, role: UserRole) -> String {
        self.auth
            .generate_access_token(user_id, user_id, role)
            .expect("Failed to mint access token")
    }

    pub fn auth_get(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.get(self.url(path)).bearer_auth(token)
    }

    pub fn auth_post(&self, path: &str, token: &str) -> reqwest::RequestBuilder {
        self.client.post(self.url(path)).bearer_auth(token)
    }

    pub fn ws_url(&self, token: &str) -> String {
        format!("ws://{}/ws?token={}", self.addr, token)
    }

    /// Opens a view and consumes its `connected` message.
    pub async fn connect_ws(&self, token: &str) -> WsClient {
        let (mut ws, _) = tokio_tungstenite::connect_async(self.ws_url(token))
            .await
            .expect("WS connect failed");
        let connected = next_json(&mut ws).await;
        assert_eq!(connected["type"], "connected");
        ws
    }
}

/// Next JSON text frame, failing the test after five seconds.
pub async fn next_json(ws: &mut WsClient) -> Value {
    loop {
        let msg = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("Timeout waiting for WS message")
            .expect("WS stream ended")
            .expect("WS read failed");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("WS message is not JSON");
        }
    }
}

/// Reads `feed:update` messages until one satisfies `pred`, returning its data.
pub async fn wait_for_feed(ws: &mut WsClient, mut pred: impl FnMut(&Value) -> bool) -> Value {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let msg = next_json(ws).await;
            if msg["type"] == "feed:update" && pred(&msg["data"]) {
                return msg["data"].clone();
            }
        }
    })
    .await
    .expect("Feed never reached the expected state")
}

pub fn client_message(msg_type: &str, data: Value) -> Message {
    let body = serde_json::json!({ "type": msg_type, "data": data });
    Message::text(body.to_string())
}

fn test_settings() -> Settings {
    Settings {
        app: carebell_config::AppSettings {
            host: "127.0.0.1".to_string(),
            port: 0,
            cors_origins: vec![],
        },
        database: carebell_config::DatabaseSettings {
            url: "mongodb://localhost:27017".to_string(),
            name: "carebell_test".to_string(),
            max_pool_size: Some(5),
            min_pool_size: Some(1),
        },
        jwt: carebell_config::JwtSettings {
            secret: "test-secret-key-for-jwt-signing-minimum-32-chars".to_string(),
            access_token_ttl_secs: 3600,
            issuer: "carebell".to_string(),
        },
        notifications: carebell_config::NotificationSettings::default(),
    }
}
