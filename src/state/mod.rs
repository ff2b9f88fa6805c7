use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use crate::config::ExplorerConfig;
use crate::db::RecordStore;

pub struct ConnectionRegistry {
    pub connections: Mutex<HashMap<String, Arc<dyn RecordStore>>>,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: Mutex::new(HashMap::new()),
        }
    }

    pub fn get(&self, connection_id: &str) -> Result<Arc<dyn RecordStore>, String> {
        let registry = self.connections.lock().map_err(|e| e.to_string())?;
        let store = registry.get(connection_id).ok_or("Connection not found")?;
        Ok(store.clone())
    }
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

pub struct AppState {
    pub registry: ConnectionRegistry,
    pub config: ExplorerConfig,
}

impl AppState {
    pub fn new(config: ExplorerConfig) -> Self {
        Self {
            registry: ConnectionRegistry::new(),
            config,
        }
    }
}

impl Default for AppState {
    fn default() -> Self {
        Self::new(ExplorerConfig::default())
    }
}
