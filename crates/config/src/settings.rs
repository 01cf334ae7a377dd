use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    pub app: AppSettings,
    pub database: DatabaseSettings,
    pub jwt: JwtSettings,
    pub notifications: NotificationSettings,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AppSettings {
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseSettings {
    pub url: String,
    pub name: String,
    pub max_pool_size: Option<u32>,
    pub min_pool_size: Option<u32>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct JwtSettings {
    pub secret: String,
    pub access_token_ttl_secs: u64,
    pub issuer: String,
}

/// Which store backs the live notification feed.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FeedBackendKind {
    Mongo,
    Memory,
}

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationSettings {
    pub backend: FeedBackendKind,
    /// Maximum number of notifications held in a view's feed.
    pub feed_limit: usize,
    /// Counts above this render as "{cap}+".
    pub badge_cap: usize,
}

impl Default for NotificationSettings {
    fn default() -> Self {
        Self {
            backend: FeedBackendKind::Mongo,
            feed_limit: 20,
            badge_cap: 9,
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name("config/local").required(false))
            .add_source(
                Environment::default()
                    .separator("__")
                    .prefix("CAREBELL"),
            )
            .set_default("app.host", "0.0.0.0")?
            .set_default("app.port", 3000)?
            .set_default("app.cors_origins", Vec::<String>::new())?
            .set_default("database.url", "mongodb://localhost:27017")?
            .set_default("database.name", "carebell")?
            .set_default("jwt.secret", "change-me-in-production")?
            .set_default("jwt.access_token_ttl_secs", 3600)?
            .set_default("jwt.issuer", "carebell")?
            .set_default("notifications.backend", "mongo")?
            .set_default("notifications.feed_limit", 20)?
            .set_default("notifications.badge_cap", 9)?
            .build()?;

        config.try_deserialize()
    }
}
