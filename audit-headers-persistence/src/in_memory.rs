use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{info, instrument};

use crate::Persistence;

pub struct InMemoryPersistence {
    entries: RwLock<HashMap<String, Vec<u8>>>,
}

impl Default for InMemoryPersistence {
    fn default() -> Self {
        info!("Using in-memory persistence");

        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }
}

impl Persistence for InMemoryPersistence {
    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, super::Error> {
        let entries = self.entries.read().await;
        Ok(entries.get(key).cloned())
    }

    #[instrument(skip(self, value))]
    async fn put(&self, key: &str, value: Vec<u8>) -> Result<(), super::Error> {
        let mut entries = self.entries.write().await;
        entries.insert(key.to_owned(), value);

        Ok(())
    }

    #[instrument(skip(self, value))]
    async fn put_if_absent(&self, key: &str, value: Vec<u8>) -> Result<Vec<u8>, super::Error> {
        let mut entries = self.entries.write().await;
        Ok(entries.entry(key.to_owned()).or_insert(value).clone())
    }
}
