// Post-tour hint arrow
//
// Screen-local pointer at the control that leads to the next unfinished screen. Purely derived
// from the tutorial flags; it never writes them.

use log::{debug, info};
use std::f64::consts::PI;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::gate::should_start;
use crate::geometry::Rect;
use crate::host::ScreenHost;
use crate::measure::TargetMeasurer;
use crate::models::flags::ScreenTutorialFlags;
use crate::models::screen::{Screen, ONBOARDING_ORDER};
use crate::models::step::ArrowDirection;

pub const BOUNCE_AMPLITUDE: f64 = 8.0;
pub const BOUNCE_PERIOD: Duration = Duration::from_millis(1200);
/// Distance between the pointer tip and the control at rest.
pub const POINTER_GAP: f64 = 6.0;

/// The screen the user should visit next, once `current`'s own tour is done.
pub fn next_screen(flags: &ScreenTutorialFlags, current: Screen) -> Option<Screen> {
    if !flags.is_done(current) {
        return None;
    }
    ONBOARDING_ORDER
        .iter()
        .copied()
        .find(|s| *s != current && should_start(*s, flags))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HintDismissal {
    Skipped,
    NavigatedAway,
    TargetUsed,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HintView {
    pub target_screen: Screen,
    pub control: Rect,
    pub direction: ArrowDirection,
    /// Current bounce displacement, `0..=BOUNCE_AMPLITUDE`.
    pub bounce: f64,
    /// Vertical position of the pointer tip.
    pub tip_y: f64,
    pub tip_x: f64,
}

#[derive(Debug, Clone, Copy)]
struct ActiveHint {
    host_screen: Screen,
    target_screen: Screen,
    control: Rect,
    direction: ArrowDirection,
}

pub struct HintArrow {
    measurer: TargetMeasurer,
    active: Option<ActiveHint>,
}

impl HintArrow {
    pub fn new(measurer: TargetMeasurer) -> Self {
        Self {
            measurer,
            active: None,
        }
    }

    pub fn is_active(&self) -> bool {
        self.active.is_some()
    }

    pub fn target_screen(&self) -> Option<Screen> {
        self.active.map(|a| a.target_screen)
    }

    /// Measure the control on `host` that navigates to `target_screen` and show the pointer.
    /// Returns `false` (and stays hidden) when the control cannot be measured.
    pub async fn activate(
        &mut self,
        host: &dyn ScreenHost,
        target_screen: Screen,
        cancel: &CancellationToken,
    ) -> bool {
        let control_id = target_screen.entry_control();
        let Some(control) = self
            .measurer
            .measure_target(host, control_id, cancel)
            .await
        else {
            debug!(
                "[PHASE: hint] [STEP: activate] Entry control not measurable (screen={}, control={})",
                host.screen(),
                control_id
            );
            self.active = None;
            return false;
        };

        // Point down at controls in the lower half (tab bars), up at everything else.
        let direction = if control.top + control.height / 2.0 > host.viewport().height / 2.0 {
            ArrowDirection::Down
        } else {
            ArrowDirection::Up
        };
        self.active = Some(ActiveHint {
            host_screen: host.screen(),
            target_screen,
            control,
            direction,
        });
        info!(
            "[PHASE: hint] [STEP: activate] Hint arrow shown (screen={}, next={})",
            host.screen(),
            target_screen
        );
        true
    }

    /// Hide the pointer. Returns whether it was showing.
    pub fn deactivate(&mut self, reason: HintDismissal) -> bool {
        match self.active.take() {
            Some(hint) => {
                info!(
                    "[PHASE: hint] [STEP: deactivate] Hint arrow dismissed (screen={}, reason={:?})",
                    hint.host_screen, reason
                );
                true
            }
            None => false,
        }
    }

    /// Navigation left `screen`.
    pub fn on_blur(&mut self, screen: Screen) -> bool {
        match self.active {
            Some(hint) if hint.host_screen == screen => {
                self.deactivate(HintDismissal::NavigatedAway)
            }
            _ => false,
        }
    }

    /// The user tapped `control_for`'s entry control.
    pub fn on_navigate(&mut self, control_for: Screen) -> bool {
        match self.active {
            Some(hint) if hint.target_screen == control_for => {
                self.deactivate(HintDismissal::TargetUsed)
            }
            _ => false,
        }
    }

    /// Pointer geometry `elapsed` after activation.
    pub fn view(&self, elapsed: Duration) -> Option<HintView> {
        let hint = self.active?;
        let bounce = bounce_at(elapsed);
        let tip_y = match hint.direction {
            ArrowDirection::Down => hint.control.top - POINTER_GAP - bounce,
            ArrowDirection::Up => hint.control.bottom() + POINTER_GAP + bounce,
        };
        Some(HintView {
            target_screen: hint.target_screen,
            control: hint.control,
            direction: hint.direction,
            bounce,
            tip_y,
            tip_x: hint.control.center_x(),
        })
    }
}

fn bounce_at(elapsed: Duration) -> f64 {
    let phase = elapsed.as_secs_f64() / BOUNCE_PERIOD.as_secs_f64();
    BOUNCE_AMPLITUDE * (phase * PI).sin().abs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::screen::TargetId;
    use crate::sim::SimulatedScreen;

    fn flags(home: bool, scanner: bool, profile: bool) -> ScreenTutorialFlags {
        ScreenTutorialFlags {
            home_done: home,
            scanner_done: scanner,
            profile_done: profile,
            tutorial_completed: home && scanner && profile,
        }
    }

    fn arrow() -> HintArrow {
        HintArrow::new(TargetMeasurer::new(Duration::from_millis(300), 0.0, 3))
    }

    #[test]
    fn points_at_the_next_unlocked_screen() {
        assert_eq!(next_screen(&flags(true, false, false), Screen::Home), Some(Screen::Scanner));
        assert_eq!(
            next_screen(&flags(true, true, false), Screen::Scanner),
            Some(Screen::Profile)
        );
        assert_eq!(next_screen(&flags(true, true, true), Screen::Profile), None);
    }

    #[test]
    fn profile_hint_waits_for_home_and_scanner() {
        assert_eq!(next_screen(&flags(true, false, false), Screen::Home), Some(Screen::Scanner));
        assert_ne!(
            next_screen(&flags(true, false, false), Screen::Home),
            Some(Screen::Profile)
        );
        assert_eq!(next_screen(&flags(false, false, false), Screen::Home), None);
    }

    #[tokio::test(start_paused = true)]
    async fn activates_on_the_tab_bar_pointing_down() {
        let home = SimulatedScreen::home();
        let mut hint = arrow();

        assert!(hint.activate(&home, Screen::Scanner, &CancellationToken::new()).await);

        let view = hint.view(Duration::ZERO).expect("visible");
        assert_eq!(view.target_screen, Screen::Scanner);
        assert_eq!(view.direction, ArrowDirection::Down);
        assert_eq!(view.control.top, 784.0);
        assert_eq!(view.tip_y, 784.0 - POINTER_GAP);
        assert_eq!(view.tip_x, 140.0 + 55.0);
    }

    #[tokio::test(start_paused = true)]
    async fn unmeasurable_control_keeps_the_hint_hidden() {
        let home = SimulatedScreen::home().without_target(TargetId::ScannerTab);
        let mut hint = arrow();

        assert!(!hint.activate(&home, Screen::Scanner, &CancellationToken::new()).await);
        assert!(hint.view(Duration::ZERO).is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn dismissal_paths() {
        let home = SimulatedScreen::home();
        let mut hint = arrow();
        let cancel = CancellationToken::new();

        hint.activate(&home, Screen::Scanner, &cancel).await;
        assert!(!hint.on_blur(Screen::Profile));
        assert!(hint.on_blur(Screen::Home));
        assert!(!hint.is_active());

        hint.activate(&home, Screen::Scanner, &cancel).await;
        assert!(!hint.on_navigate(Screen::Profile));
        assert!(hint.on_navigate(Screen::Scanner));

        hint.activate(&home, Screen::Scanner, &cancel).await;
        assert!(hint.deactivate(HintDismissal::Skipped));
        assert!(!hint.deactivate(HintDismissal::Skipped));
    }

    #[test]
    fn bounce_stays_within_amplitude_and_repeats() {
        for ms in (0..2400).step_by(50) {
            let b = bounce_at(Duration::from_millis(ms));
            assert!((0.0..=BOUNCE_AMPLITUDE).contains(&b));
        }
        assert!(bounce_at(Duration::ZERO).abs() < 1e-9);
        assert!((bounce_at(BOUNCE_PERIOD / 2) - BOUNCE_AMPLITUDE).abs() < 1e-9);
        assert!(bounce_at(BOUNCE_PERIOD).abs() < 1e-9);
    }
}
