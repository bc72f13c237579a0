use std::sync::Arc;

use anyhow::anyhow;
use tracing::error;

use scribe_db::Database;

use crate::error::ApiError;

/// Handle to the shared database, injected into every component.
///
/// rusqlite is blocking, so each call runs on tokio's blocking pool.
#[derive(Clone)]
pub struct Store {
    db: Arc<Database>,
}

impl Store {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    pub async fn run<F, T>(&self, f: F) -> Result<T, ApiError>
    where
        F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.db.clone();
        tokio::task::spawn_blocking(move || f(&db))
            .await
            .map_err(|e| {
                error!("spawn_blocking join error: {}", e);
                ApiError::Internal(anyhow!("blocking task failed: {}", e))
            })?
            .map_err(ApiError::Internal)
    }
}
