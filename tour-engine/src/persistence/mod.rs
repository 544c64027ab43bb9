// Persisted tutorial flag storage
//
// The gate is the only component that reads or writes through these stores. Every backend keeps
// per-screen flags monotonic: a completion write can only set flags, `reset` is the only way to
// clear them.

pub mod json_file;
pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;

use crate::models::flags::{FlagUpdate, ScreenTutorialFlags};
use crate::settings::{StoreBackend, StoreSettings};

/// Identity the flags are keyed by.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct UserId(String);

impl UserId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the raw identity.
        f.write_str(&crate::utils::logging::mask_sensitive(&self.0))
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("flag store I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("flag record is malformed: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("flag database query failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("invalid user id: {0}")]
    InvalidUser(String),
    #[error("flag store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait FlagStore: Send + Sync {
    /// Point read. A user with no record has all flags false.
    async fn load(&self, user: &UserId) -> Result<ScreenTutorialFlags, StoreError>;

    /// Point update setting the screen flag (and the master flag when requested) together.
    async fn mark_complete(&self, user: &UserId, update: &FlagUpdate) -> Result<(), StoreError>;

    /// Administrative reset of every flag for `user`.
    async fn reset(&self, user: &UserId) -> Result<(), StoreError>;
}

/// Open the backend selected in configuration.
pub async fn open_store(settings: &StoreSettings) -> anyhow::Result<Arc<dyn FlagStore>> {
    match settings.backend {
        StoreBackend::Memory => Ok(Arc::new(memory::MemoryFlagStore::default())),
        StoreBackend::File => {
            let dir = match &settings.flags_dir {
                Some(dir) => dir.clone(),
                None => crate::utils::path_resolver::resolve_flags_folder()?,
            };
            Ok(Arc::new(json_file::JsonFileFlagStore::new(dir)))
        }
        StoreBackend::Postgres => {
            let url = settings
                .database_url
                .as_deref()
                .ok_or_else(|| anyhow::anyhow!("store.database_url is not set"))?;
            let store = postgres::PgFlagStore::connect(url).await?;
            Ok(Arc::new(store))
        }
    }
}
