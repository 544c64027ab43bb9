// Persisted per-user tutorial completion flags

use serde::{Deserialize, Serialize};

use super::screen::{Screen, ONBOARDING_ORDER};

/// One record per user. Per-screen flags only move from false to true in normal flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenTutorialFlags {
    pub home_done: bool,
    pub scanner_done: bool,
    pub profile_done: bool,
    /// Entire onboarding flow finished.
    pub tutorial_completed: bool,
}

impl ScreenTutorialFlags {
    pub fn is_done(&self, screen: Screen) -> bool {
        match screen {
            Screen::Home => self.home_done,
            Screen::Scanner => self.scanner_done,
            Screen::Profile => self.profile_done,
        }
    }

    pub fn all_screens_done(&self) -> bool {
        ONBOARDING_ORDER.iter().all(|s| self.is_done(*s))
    }

    /// Merge a confirmed completion write. Never clears a flag.
    ///
    /// The master flag is only taken when the merged record has every screen done, whatever the
    /// writer believed when it built the update.
    pub fn apply(&mut self, update: &FlagUpdate) {
        match update.screen {
            Screen::Home => self.home_done = true,
            Screen::Scanner => self.scanner_done = true,
            Screen::Profile => self.profile_done = true,
        }
        if update.master && self.all_screens_done() {
            self.tutorial_completed = true;
        }
    }
}

/// Single point update written when a screen's tour finishes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagUpdate {
    pub screen: Screen,
    /// Also set the master flag in the same write.
    pub master: bool,
}

impl FlagUpdate {
    /// Completion of `screen`; the last screen in the onboarding order carries the master flag.
    pub fn completion(screen: Screen) -> Self {
        Self {
            screen,
            master: screen.is_last(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn completing_last_screen_carries_master_flag() {
        assert!(!FlagUpdate::completion(Screen::Home).master);
        assert!(!FlagUpdate::completion(Screen::Scanner).master);
        assert!(FlagUpdate::completion(Screen::Profile).master);
    }

    #[test]
    fn apply_is_monotonic() {
        let mut flags = ScreenTutorialFlags {
            home_done: true,
            ..Default::default()
        };
        flags.apply(&FlagUpdate::completion(Screen::Scanner));
        assert!(flags.home_done);
        assert!(flags.scanner_done);
        assert!(!flags.tutorial_completed);

        flags.apply(&FlagUpdate::completion(Screen::Profile));
        assert!(flags.all_screens_done());
        assert!(flags.tutorial_completed);
    }

    #[test]
    fn master_flag_needs_every_screen_in_the_record() {
        let mut flags = ScreenTutorialFlags::default();
        flags.apply(&FlagUpdate::completion(Screen::Profile));
        assert!(flags.profile_done);
        assert!(!flags.tutorial_completed);
    }

    #[test]
    fn missing_fields_deserialize_as_false() {
        let flags: ScreenTutorialFlags = serde_json::from_str(r#"{"home_done":true}"#)
            .expect("partial flags should parse");
        assert!(flags.home_done);
        assert!(!flags.scanner_done);
        assert!(!flags.tutorial_completed);
    }
}
