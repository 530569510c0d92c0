pub mod types;
pub mod grades;
pub mod store;
pub mod dynamo;
pub mod memory;
pub mod error;
pub mod passwords;
pub mod config;
pub mod cors;
pub mod users;
pub mod subjects;
pub mod marks;
pub mod performance;
pub mod demo;

use config::Config;
use cors::CorsPolicy;
use dynamo::DynamoStore;
use memory::MemoryStore;
use std::sync::Arc;
use store::RecordStore;

/// Shared application state
pub struct AppState {
    pub store: Arc<dyn RecordStore>,
    pub cors: CorsPolicy,
}

impl AppState {
    pub fn new(store: Arc<dyn RecordStore>, cors: CorsPolicy) -> Arc<Self> {
        Arc::new(Self { store, cors })
    }

    /// Open the configured store once for the lifetime of the process.
    pub async fn from_config(config: &Config) -> Arc<Self> {
        let store: Arc<dyn RecordStore> = if config.uses_memory_store() {
            tracing::warn!("Using in-memory store; data is lost on shutdown");
            Arc::new(MemoryStore::new())
        } else {
            tracing::info!(
                "Using DynamoDB table {} at {}",
                config.db_name,
                config.database_url
            );
            Arc::new(DynamoStore::connect(&config.database_url, &config.db_name).await)
        };

        Self::new(store, CorsPolicy::from_origins(&config.cors_origins))
    }
}
