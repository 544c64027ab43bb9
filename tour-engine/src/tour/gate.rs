// Persistence gate
//
// Sole owner of the durable tutorial flags. Decides at screen-focus time whether a tour should
// start and writes completion when a tour finishes. The in-memory cache only ever reflects
// writes the store has confirmed.

use log::{info, warn};
use std::sync::Arc;
use tokio::sync::Mutex;

use crate::models::flags::{FlagUpdate, ScreenTutorialFlags};
use crate::models::screen::{Screen, ONBOARDING_ORDER};
use crate::persistence::{FlagStore, StoreError, UserId};

/// A tour may start when its own flag is false and its upstream screen (if any) is done.
pub fn should_start(screen: Screen, flags: &ScreenTutorialFlags) -> bool {
    if flags.is_done(screen) {
        return false;
    }
    match screen.upstream() {
        None => true,
        Some(upstream) => flags.is_done(upstream),
    }
}

pub struct PersistenceGate {
    store: Arc<dyn FlagStore>,
    user: UserId,
    cache: Mutex<Option<ScreenTutorialFlags>>,
}

impl PersistenceGate {
    pub fn new(store: Arc<dyn FlagStore>, user: UserId) -> Self {
        Self {
            store,
            user,
            cache: Mutex::new(None),
        }
    }

    pub fn user(&self) -> &UserId {
        &self.user
    }

    /// Last flags read from or confirmed by the store.
    pub async fn cached(&self) -> Option<ScreenTutorialFlags> {
        *self.cache.lock().await
    }

    /// Fresh point read; refreshes the cache. Falls back to the cache when the read fails.
    pub async fn refresh(&self) -> Option<ScreenTutorialFlags> {
        match self.store.load(&self.user).await {
            Ok(flags) => {
                *self.cache.lock().await = Some(flags);
                Some(flags)
            }
            Err(e) => {
                warn!(
                    "[PHASE: persistence] [STEP: load] Failed to read tutorial flags (user={}): {}",
                    self.user, e
                );
                self.cached().await
            }
        }
    }

    /// Re-evaluated on every focus, since flags can change out-of-band.
    ///
    /// Unknown flags (first read failed, nothing cached) never start a tour.
    pub async fn evaluate(&self, screen: Screen) -> bool {
        let Some(flags) = self.refresh().await else {
            return false;
        };
        let start = should_start(screen, &flags);
        info!(
            "[PHASE: persistence] [STEP: evaluate] Gate decision (screen={}, start={}, flags={:?})",
            screen, start, flags
        );
        start
    }

    /// Write completion of `screen` in one point update. The cache is updated only after the
    /// store confirms, so a failed write makes the gate offer the tour again next time.
    pub async fn record_completion(&self, screen: Screen) -> Result<FlagUpdate, StoreError> {
        let mut update = FlagUpdate::completion(screen);
        if update.master {
            if let Some(flags) = self.cached().await {
                // The master flag implies every other screen is done too.
                update.master = ONBOARDING_ORDER
                    .iter()
                    .filter(|s| **s != screen)
                    .all(|s| flags.is_done(*s));
            }
        }

        self.store.mark_complete(&self.user, &update).await?;

        let mut cache = self.cache.lock().await;
        cache.get_or_insert_with(ScreenTutorialFlags::default).apply(&update);
        info!(
            "[PHASE: persistence] [STEP: mark_complete] Recorded tour completion (screen={}, master={})",
            screen, update.master
        );
        Ok(update)
    }

    /// Administrative reset; the only path that clears flags.
    pub async fn reset(&self) -> Result<(), StoreError> {
        self.store.reset(&self.user).await?;
        *self.cache.lock().await = Some(ScreenTutorialFlags::default());
        info!(
            "[PHASE: persistence] [STEP: reset] Tutorial flags reset (user={})",
            self.user
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::persistence::memory::MemoryFlagStore;

    fn flags(home: bool, scanner: bool, profile: bool) -> ScreenTutorialFlags {
        ScreenTutorialFlags {
            home_done: home,
            scanner_done: scanner,
            profile_done: profile,
            tutorial_completed: home && scanner && profile,
        }
    }

    #[test]
    fn scanner_waits_for_home() {
        assert!(!should_start(Screen::Scanner, &flags(false, false, false)));
        assert!(should_start(Screen::Scanner, &flags(true, false, false)));
    }

    #[test]
    fn upstream_false_blocks_regardless_of_own_flag() {
        for own in [false, true] {
            assert!(!should_start(Screen::Scanner, &flags(false, own, false)));
            assert!(!should_start(Screen::Profile, &flags(true, false, own)));
        }
    }

    #[test]
    fn completed_screens_never_start() {
        assert!(!should_start(Screen::Home, &flags(true, false, false)));
        assert!(!should_start(Screen::Profile, &flags(true, true, true)));
        assert!(should_start(Screen::Home, &flags(false, false, false)));
    }

    #[tokio::test]
    async fn evaluate_reads_fresh_flags_every_time() {
        let user = UserId::new("user-1");
        let store = Arc::new(MemoryFlagStore::default());
        let gate = PersistenceGate::new(store.clone(), user.clone());

        assert!(!gate.evaluate(Screen::Scanner).await);

        // Home finished elsewhere (another device, earlier run).
        store.put(user, flags(true, false, false)).await;

        assert!(gate.evaluate(Screen::Scanner).await);
    }

    #[tokio::test]
    async fn final_screen_writes_screen_and_master_together() {
        let user = UserId::new("user-1");
        let store = Arc::new(MemoryFlagStore::with_flags(
            user.clone(),
            flags(true, true, false),
        ));
        let gate = PersistenceGate::new(store.clone(), user.clone());
        assert!(gate.evaluate(Screen::Profile).await);

        let update = gate.record_completion(Screen::Profile).await.unwrap();

        assert!(update.master);
        let writes = store.writes().await;
        assert_eq!(writes.len(), 1, "one persistence write");
        assert_eq!(writes[0].1.screen, Screen::Profile);
        assert!(writes[0].1.master);
        let stored = store.load(&user).await.unwrap();
        assert!(stored.profile_done && stored.tutorial_completed);
    }

    #[tokio::test]
    async fn master_flag_not_stored_when_record_was_reset_after_evaluate() {
        let user = UserId::new("user-1");
        let store = Arc::new(MemoryFlagStore::with_flags(
            user.clone(),
            flags(true, true, false),
        ));
        let gate = PersistenceGate::new(store.clone(), user.clone());
        assert!(gate.evaluate(Screen::Profile).await);

        // Cleared out-of-band while the profile tour was running.
        store.reset(&user).await.unwrap();
        gate.record_completion(Screen::Profile).await.unwrap();

        let stored = store.load(&user).await.unwrap();
        assert!(stored.profile_done);
        assert!(!stored.tutorial_completed);
        assert!(!stored.home_done && !stored.scanner_done);
    }

    #[tokio::test]
    async fn master_flag_withheld_while_upstream_incomplete() {
        let user = UserId::new("user-1");
        let store = Arc::new(MemoryFlagStore::with_flags(
            user.clone(),
            flags(true, false, false),
        ));
        let gate = PersistenceGate::new(store.clone(), user);
        gate.refresh().await;

        let update = gate.record_completion(Screen::Profile).await.unwrap();

        assert!(!update.master);
    }

    #[tokio::test]
    async fn failed_write_does_not_touch_cache() {
        let user = UserId::new("user-1");
        let store = Arc::new(MemoryFlagStore::default());
        let gate = PersistenceGate::new(store.clone(), user);
        assert!(gate.evaluate(Screen::Home).await);
        store.set_fail_writes(true);

        assert!(gate.record_completion(Screen::Home).await.is_err());

        assert_eq!(gate.cached().await, Some(ScreenTutorialFlags::default()));
        assert!(gate.evaluate(Screen::Home).await, "tour offered again");
    }

    #[tokio::test]
    async fn reset_reopens_the_first_tour() {
        let user = UserId::new("user-1");
        let store = Arc::new(MemoryFlagStore::with_flags(
            user.clone(),
            flags(true, true, true),
        ));
        let gate = PersistenceGate::new(store, user);
        assert!(!gate.evaluate(Screen::Home).await);

        gate.reset().await.unwrap();

        assert!(gate.evaluate(Screen::Home).await);
        assert!(!gate.evaluate(Screen::Scanner).await);
    }
}
