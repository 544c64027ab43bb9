// File-backed flag store
//
// One JSON document per user under a flags directory. Writes go to a temp file that is renamed
// over the record, so a crash mid-write leaves the previous record intact. Transient I/O
// failures (file locked by AV/indexers, interrupted syscalls) are retried with backoff.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use super::{FlagStore, StoreError, UserId};
use crate::models::flags::{FlagUpdate, ScreenTutorialFlags};
use crate::utils::validation::validate_user_id;

#[derive(Debug, Serialize, Deserialize)]
struct FlagRecord {
    flags: ScreenTutorialFlags,
    updated_at: DateTime<Utc>,
}

#[derive(Debug)]
pub struct JsonFileFlagStore {
    dir: PathBuf,
    // Serializes read-modify-write cycles.
    write_lock: Mutex<()>,
}

impl JsonFileFlagStore {
    pub fn new(dir: PathBuf) -> Self {
        Self {
            dir,
            write_lock: Mutex::new(()),
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn record_path(&self, user: &UserId) -> Result<PathBuf, StoreError> {
        validate_user_id(user.as_str()).map_err(|e| StoreError::InvalidUser(e.to_string()))?;
        Ok(self.dir.join(format!("{}.json", user.as_str())))
    }

    async fn read_flags(&self, path: &Path) -> Result<ScreenTutorialFlags, StoreError> {
        if !tokio::fs::try_exists(path).await.unwrap_or(false) {
            return Ok(ScreenTutorialFlags::default());
        }
        let bytes = tokio::fs::read(path).await?;
        let record: FlagRecord = serde_json::from_slice(&bytes)?;
        Ok(record.flags)
    }

    async fn write_flags(
        &self,
        path: &Path,
        flags: ScreenTutorialFlags,
    ) -> Result<(), StoreError> {
        let record = FlagRecord {
            flags,
            updated_at: Utc::now(),
        };
        let payload = serde_json::to_vec_pretty(&record)?;
        let tmp = path.with_extension("json.tmp");

        let (dir, tmp, payload) = (self.dir.as_path(), tmp.as_path(), payload.as_slice());
        let write_action = || async move {
            tokio::fs::create_dir_all(dir).await?;
            tokio::fs::write(tmp, payload).await?;
            tokio::fs::rename(tmp, path).await?;
            Ok::<(), StoreError>(())
        };

        let retry_strategy = ExponentialBackoff::from_millis(50)
            .factor(2)
            .max_delay(std::time::Duration::from_millis(750))
            .take(3)
            .map(jitter);

        RetryIf::spawn(retry_strategy, write_action, is_transient_io_error).await
    }
}

fn is_transient_io_error(err: &StoreError) -> bool {
    match err {
        StoreError::Io(e) => matches!(
            e.kind(),
            std::io::ErrorKind::Interrupted
                | std::io::ErrorKind::WouldBlock
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::PermissionDenied
        ),
        _ => false,
    }
}

#[async_trait]
impl FlagStore for JsonFileFlagStore {
    async fn load(&self, user: &UserId) -> Result<ScreenTutorialFlags, StoreError> {
        let path = self.record_path(user)?;
        let flags = self.read_flags(&path).await?;
        debug!(
            "[PHASE: persistence] [STEP: load] Loaded flags from file (user={}, flags={:?})",
            user, flags
        );
        Ok(flags)
    }

    async fn mark_complete(&self, user: &UserId, update: &FlagUpdate) -> Result<(), StoreError> {
        let path = self.record_path(user)?;
        let _guard = self.write_lock.lock().await;

        let mut flags = match self.read_flags(&path).await {
            Ok(flags) => flags,
            Err(StoreError::Serialization(e)) => {
                // A corrupt record must not block completion; rebuild it from this write.
                warn!(
                    "[PHASE: persistence] [STEP: mark_complete] Replacing unreadable flag record (user={}): {}",
                    user, e
                );
                ScreenTutorialFlags::default()
            }
            Err(e) => return Err(e),
        };
        flags.apply(update);
        self.write_flags(&path, flags).await
    }

    async fn reset(&self, user: &UserId) -> Result<(), StoreError> {
        let path = self.record_path(user)?;
        let _guard = self.write_lock.lock().await;
        self.write_flags(&path, ScreenTutorialFlags::default())
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::screen::Screen;

    #[tokio::test]
    async fn missing_record_reads_as_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileFlagStore::new(dir.path().to_path_buf());

        let flags = store.load(&UserId::new("user-1")).await.unwrap();

        assert_eq!(flags, ScreenTutorialFlags::default());
    }

    #[tokio::test]
    async fn completion_survives_a_new_store_instance() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("user-1");

        let store = JsonFileFlagStore::new(dir.path().to_path_buf());
        store
            .mark_complete(&user, &FlagUpdate::completion(Screen::Home))
            .await
            .unwrap();
        store
            .mark_complete(&user, &FlagUpdate::completion(Screen::Scanner))
            .await
            .unwrap();

        let reopened = JsonFileFlagStore::new(dir.path().to_path_buf());
        let flags = reopened.load(&user).await.unwrap();
        assert!(flags.home_done);
        assert!(flags.scanner_done);
        assert!(!flags.profile_done);
        assert!(!dir.path().join("user-1.json.tmp").exists());
    }

    #[tokio::test]
    async fn final_screen_write_sets_master_flag() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("user-1");
        let store = JsonFileFlagStore::new(dir.path().to_path_buf());

        store
            .mark_complete(&user, &FlagUpdate::completion(Screen::Profile))
            .await
            .unwrap();

        let flags = store.load(&user).await.unwrap();
        assert!(flags.profile_done);
        assert!(flags.tutorial_completed);
    }

    #[tokio::test]
    async fn reset_clears_flags_on_disk() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("user-1");
        let store = JsonFileFlagStore::new(dir.path().to_path_buf());
        store
            .mark_complete(&user, &FlagUpdate::completion(Screen::Home))
            .await
            .unwrap();

        store.reset(&user).await.unwrap();

        assert_eq!(
            store.load(&user).await.unwrap(),
            ScreenTutorialFlags::default()
        );
    }

    #[tokio::test]
    async fn path_traversal_user_ids_are_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileFlagStore::new(dir.path().to_path_buf());

        let err = store.load(&UserId::new("../etc/passwd")).await.unwrap_err();

        assert!(matches!(err, StoreError::InvalidUser(_)));
    }

    #[tokio::test]
    async fn corrupt_record_is_rebuilt_on_completion() {
        let dir = tempfile::tempdir().unwrap();
        let user = UserId::new("user-1");
        std::fs::write(dir.path().join("user-1.json"), b"{not json").unwrap();
        let store = JsonFileFlagStore::new(dir.path().to_path_buf());

        assert!(matches!(
            store.load(&user).await,
            Err(StoreError::Serialization(_))
        ));
        store
            .mark_complete(&user, &FlagUpdate::completion(Screen::Home))
            .await
            .unwrap();

        assert!(store.load(&user).await.unwrap().home_done);
    }
}
