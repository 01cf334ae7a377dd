use carebell_config::Settings;
use carebell_services::{AuthService, NotificationBackend};
use std::sync::Arc;

use crate::ws::storage::WsStorage;

#[derive(Clone)]
pub struct AppState {
    pub settings: Settings,
    pub auth: Arc<AuthService>,
    pub notifications: Arc<dyn NotificationBackend>,
    pub ws_storage: Arc<WsStorage>,
}

impl AppState {
    pub fn new(settings: Settings, notifications: Arc<dyn NotificationBackend>) -> Self {
        let auth = Arc::new(AuthService::new(settings.jwt.clone()));
        let ws_storage = Arc::new(WsStorage::new());

        Self {
            settings,
            auth,
            notifications,
            ws_storage,
        }
    }
}
