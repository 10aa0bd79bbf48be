use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::config::EngineConfig;
use crate::source::sqlite::SqliteSource;

/// A previously computed result, retained so the API can keep answering
/// (marked stale) while the data source is unavailable.
#[derive(Clone)]
pub struct CachedReport {
    pub data: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

#[derive(Clone)]
pub struct AppState {
    pub source: Arc<SqliteSource>,
    pub config: Arc<EngineConfig>,
    pub cache: Arc<RwLock<HashMap<String, CachedReport>>>,
}

impl AppState {
    pub fn new(source: SqliteSource, config: EngineConfig) -> Self {
        Self {
            source: Arc::new(source),
            config: Arc::new(config),
            cache: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}
