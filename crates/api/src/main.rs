use std::sync::Arc;

use carebell_api::{build_router, state::AppState};
use carebell_config::{FeedBackendKind, Settings};
use carebell_db::{connect, indexes::ensure_indexes};
use carebell_services::{InMemoryBackend, NotificationBackend, dao::MongoNotificationBackend};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file (silently ignore if missing)
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "carebell_api=debug,carebell_services=debug,carebell_db=debug,tower_http=debug".into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load config
    let settings = Settings::load()?;
    info!("Starting Carebell API on {}:{}", settings.app.host, settings.app.port);
    info!(
        backend = ?settings.notifications.backend,
        feed_limit = settings.notifications.feed_limit,
        badge_cap = settings.notifications.badge_cap,
        "Notification feed config"
    );

    let notifications: Arc<dyn NotificationBackend> = match settings.notifications.backend {
        FeedBackendKind::Mongo => {
            let db = connect(&settings).await?;
            ensure_indexes(&db).await?;
            Arc::new(MongoNotificationBackend::new(&db))
        }
        FeedBackendKind::Memory => {
            warn!("Using the in-memory notification backend, nothing is persisted");
            Arc::new(InMemoryBackend::new())
        }
    };

    let app_state = AppState::new(settings.clone(), notifications);

    // Build router
    let app = build_router(app_state);

    // Start server
    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("Listening on {}", addr);

    axum::serve(listener, app).await?;

    Ok(())
}
