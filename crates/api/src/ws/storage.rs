use dashmap::DashMap;

/// Tracks open notification views by user ID.
/// Each user can have several at once (tabs, devices), keyed by connection ID.
pub struct WsStorage {
    connections: DashMap<String, Vec<String>>,
}

impl WsStorage {
    pub fn new() -> Self {
        Self {
            connections: DashMap::new(),
        }
    }

    pub fn add(&self, user_id: &str, connection_id: String) {
        self.connections
            .entry(user_id.to_string())
            .or_default()
            .push(connection_id);
    }

    pub fn remove(&self, user_id: &str, connection_id: &str) {
        if let Some(mut ids) = self.connections.get_mut(user_id) {
            ids.retain(|id| id != connection_id);
            if ids.is_empty() {
                drop(ids);
                self.connections.remove(user_id);
            }
        }
    }

    pub fn user_count(&self) -> usize {
        self.connections.len()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.iter().map(|r| r.value().len()).sum()
    }
}

impl Default for WsStorage {
    fn default() -> Self {
        Self::new()
    }
}
