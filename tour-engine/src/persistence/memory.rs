// In-process flag store (smoke runs, tests, signed-out previews)

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Mutex;

use super::{FlagStore, StoreError, UserId};
use crate::models::flags::{FlagUpdate, ScreenTutorialFlags};

#[derive(Debug, Default)]
pub struct MemoryFlagStore {
    inner: Mutex<MemoryInner>,
    fail_writes: AtomicBool,
}

#[derive(Debug, Default)]
struct MemoryInner {
    records: HashMap<UserId, ScreenTutorialFlags>,
    writes: Vec<(UserId, FlagUpdate)>,
}

impl MemoryFlagStore {
    pub fn with_flags(user: UserId, flags: ScreenTutorialFlags) -> Self {
        let mut records = HashMap::new();
        records.insert(user, flags);
        Self {
            inner: Mutex::new(MemoryInner {
                records,
                writes: Vec::new(),
            }),
            fail_writes: AtomicBool::new(false),
        }
    }

    /// Make subsequent completion writes fail (simulates an unreachable backend).
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Every confirmed completion write, in order.
    pub async fn writes(&self) -> Vec<(UserId, FlagUpdate)> {
        self.inner.lock().await.writes.clone()
    }

    /// Overwrite a record out-of-band (another device finished a tour, etc.).
    pub async fn put(&self, user: UserId, flags: ScreenTutorialFlags) {
        self.inner.lock().await.records.insert(user, flags);
    }
}

#[async_trait]
impl FlagStore for MemoryFlagStore {
    async fn load(&self, user: &UserId) -> Result<ScreenTutorialFlags, StoreError> {
        let inner = self.inner.lock().await;
        Ok(inner.records.get(user).copied().unwrap_or_default())
    }

    async fn mark_complete(&self, user: &UserId, update: &FlagUpdate) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(
                "memory store is rejecting writes".to_string(),
            ));
        }
        let mut inner = self.inner.lock().await;
        inner.records.entry(user.clone()).or_default().apply(update);
        inner.writes.push((user.clone(), *update));
        Ok(())
    }

    async fn reset(&self, user: &UserId) -> Result<(), StoreError> {
        let mut inner = self.inner.lock().await;
        inner.records.remove(user);
        Ok(())
    }
}
