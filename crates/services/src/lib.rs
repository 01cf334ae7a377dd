pub mod auth;
pub mod dao;
pub mod notifications;

pub use auth::AuthService;
pub use dao::*;
pub use notifications::{InMemoryBackend, NotificationBackend, NotificationCenter};
