// Per-screen step tables
//
// Order within a table is the order the tour plays; it is never rearranged at runtime.

use super::builder::{StaticAnchor, StepSpec};
use crate::models::screen::{Screen, TargetId};

/// Scanner modes.
pub const SCANNER_PHOTO_MODE: &str = "photo";
pub const SCANNER_BARCODE_MODE: &str = "barcode";

const CARD_GAP: f64 = 12.0;
const CARD_RADIUS: f64 = 16.0;
const SCREEN_MARGIN: f64 = 16.0;

/// Meal list position once the home screen has scrolled past the summary cards.
const HOME_MEAL_LIST_SCROLL: f64 = 420.0;
const HOME_MEAL_LIST_ANCHOR: StaticAnchor = StaticAnchor {
    top: 140.0,
    height: 320.0,
    horizontal_margin: SCREEN_MARGIN,
};

/// Barcode viewfinder geometry is fixed by the camera overlay, and only mounted in barcode mode.
const BARCODE_FRAME_ANCHOR: StaticAnchor = StaticAnchor {
    top: 260.0,
    height: 180.0,
    horizontal_margin: 48.0,
};

const PROFILE_SETTINGS_SCROLL: f64 = 640.0;
const PROFILE_SETTINGS_ANCHOR: StaticAnchor = StaticAnchor {
    top: 120.0,
    height: 360.0,
    horizontal_margin: SCREEN_MARGIN,
};

pub fn steps_for(screen: Screen) -> Vec<StepSpec> {
    match screen {
        Screen::Home => home_steps(),
        Screen::Scanner => scanner_steps(),
        Screen::Profile => profile_steps(),
    }
}

fn home_steps() -> Vec<StepSpec> {
    vec![
        StepSpec::direct("tutorial.home.summary", TargetId::DailySummary)
            .below()
            .radius(CARD_RADIUS),
        // Macro cards: two-column grid, only the first card exposes a handle.
        StepSpec::grid(
            "tutorial.home.macros",
            TargetId::MacroGrid,
            TargetId::MacroCard,
            2,
            CARD_GAP,
            4,
            0..2,
        )
        .below()
        .radius(CARD_RADIUS),
        StepSpec::grid(
            "tutorial.home.micros",
            TargetId::MacroGrid,
            TargetId::MacroCard,
            2,
            CARD_GAP,
            4,
            2..4,
        )
        .radius(CARD_RADIUS),
        StepSpec::direct("tutorial.home.add_meal", TargetId::AddMealButton)
            .above()
            .padded(6.0)
            .radius(34.0)
            .images(
                &[
                    "tutorial/add_meal_1.png",
                    "tutorial/add_meal_2.png",
                    "tutorial/add_meal_3.png",
                ],
                3,
                400,
            ),
        StepSpec::fixed("tutorial.home.meals", HOME_MEAL_LIST_ANCHOR)
            .after_scroll(HOME_MEAL_LIST_SCROLL, TargetId::MealList)
            .radius(CARD_RADIUS),
    ]
}

fn scanner_steps() -> Vec<StepSpec> {
    vec![
        StepSpec::direct("tutorial.scanner.capture", TargetId::CaptureButton)
            .above()
            .padded(8.0)
            .radius(44.0)
            .require_mode(SCANNER_PHOTO_MODE),
        // Advancing past the toggle flips the camera into barcode mode.
        StepSpec::direct("tutorial.scanner.mode_toggle", TargetId::ModeToggle)
            .below()
            .radius(20.0)
            .switch_mode_on_advance(),
        StepSpec::fixed("tutorial.scanner.barcode", BARCODE_FRAME_ANCHOR)
            .below()
            .radius(12.0)
            .require_mode(SCANNER_BARCODE_MODE)
            .images(
                &["tutorial/barcode_1.png", "tutorial/barcode_2.png"],
                2,
                600,
            ),
        StepSpec::direct("tutorial.scanner.quota", TargetId::ScanQuota)
            .below()
            .radius(12.0),
    ]
}

fn profile_steps() -> Vec<StepSpec> {
    vec![
        StepSpec::direct("tutorial.profile.goals", TargetId::GoalsCard)
            .below()
            .radius(CARD_RADIUS),
        StepSpec::grid(
            "tutorial.profile.stats",
            TargetId::StatsGrid,
            TargetId::StatCard,
            2,
            CARD_GAP,
            2,
            0..2,
        )
        .below()
        .radius(CARD_RADIUS),
        StepSpec::fixed("tutorial.profile.settings", PROFILE_SETTINGS_ANCHOR)
            .after_scroll(PROFILE_SETTINGS_SCROLL, TargetId::SettingsList)
            .radius(CARD_RADIUS),
        StepSpec::direct("tutorial.profile.navigation", TargetId::HomeTab)
            .above()
            .padded(4.0)
            .radius(24.0),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::screen::ONBOARDING_ORDER;
    use crate::tour::builder::Derivation;

    #[test]
    fn every_screen_has_a_tour() {
        for screen in ONBOARDING_ORDER {
            assert!(!steps_for(screen).is_empty(), "{} has no steps", screen);
        }
    }

    #[test]
    fn keys_are_unique_and_namespaced() {
        let mut seen = std::collections::HashSet::new();
        for screen in ONBOARDING_ORDER {
            for spec in steps_for(screen) {
                assert!(spec.key.starts_with(&format!("tutorial.{}.", screen.as_id())));
                assert!(seen.insert(spec.key), "duplicate key {}", spec.key);
            }
        }
    }

    #[test]
    fn scrolled_steps_always_name_a_target_to_remeasure() {
        for screen in ONBOARDING_ORDER {
            for spec in steps_for(screen) {
                if spec.scroll_target.is_some() {
                    assert!(spec.remeasure.is_some(), "{} scrolls blind", spec.key);
                    assert!(matches!(spec.derivation, Derivation::Static(_)));
                }
            }
        }
    }

    #[test]
    fn scanner_switches_mode_before_the_barcode_step() {
        let steps = steps_for(Screen::Scanner);
        let toggle = steps
            .iter()
            .position(|s| s.switch_mode_on_advance)
            .expect("mode toggle step");
        assert_eq!(steps[toggle + 1].require_mode, Some(SCANNER_BARCODE_MODE));
    }
}
