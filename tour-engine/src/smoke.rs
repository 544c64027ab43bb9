// Non-interactive tour runs against simulated screens.
//
// `tour_smoke` walks each requested screen the way a first-time user would: focus, step through
// every visible callout, finish, then follow the hint arrow to the next screen. `preview` stops
// at the first visible step and renders it.

use anyhow::{Context, Result};
use log::info;
use std::io::Write;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::host::ScreenHost;
use crate::measure::TargetMeasurer;
use crate::models::flags::ScreenTutorialFlags;
use crate::models::screen::Screen;
use crate::persistence::memory::MemoryFlagStore;
use crate::persistence::{FlagStore, UserId};
use crate::settings::TourSettings;
use crate::sim::{english_translations, SimulatedScreen};
use crate::tour::gate::PersistenceGate;
use crate::tour::hint::{next_screen, HintArrow, HintDismissal};
use crate::tour::session::{AdvanceOutcome, StartOutcome, TourCompletion, TutorialSession};
use crate::tui;

/// What happened on one screen.
#[derive(Debug, Clone, PartialEq)]
pub struct ScreenRun {
    pub screen: Screen,
    pub start: StartOutcome,
    /// Step keys in the order they became visible.
    pub shown: Vec<&'static str>,
    pub completion: Option<TourCompletion>,
    /// Screen the hint arrow pointed at afterwards.
    pub hint: Option<Screen>,
}

/// Flags under which `screen`'s tour is unlocked and not yet done.
pub fn unlocked_flags(screen: Screen) -> ScreenTutorialFlags {
    let mut flags = ScreenTutorialFlags::default();
    let mut upstream = screen.upstream();
    while let Some(s) = upstream {
        match s {
            Screen::Home => flags.home_done = true,
            Screen::Scanner => flags.scanner_done = true,
            Screen::Profile => flags.profile_done = true,
        }
        upstream = s.upstream();
    }
    flags
}

fn build_session(
    settings: &TourSettings,
    store: Arc<dyn FlagStore>,
    user: UserId,
) -> (TutorialSession, Arc<Mutex<Vec<TourCompletion>>>) {
    let completions = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&completions);
    let gate = Arc::new(PersistenceGate::new(store, user));
    let session =
        TutorialSession::from_settings(gate, Arc::new(english_translations()), settings)
            .with_completion_callback(Arc::new(move |c| {
                if let Ok(mut list) = sink.lock() {
                    list.push(c);
                }
            }));
    (session, completions)
}

macro_rules! log_step {
    ($out:expr, $($arg:tt)*) => {{
        let msg = format!($($arg)*);
        info!("[PHASE: smoke] [STEP: transcript] {}", msg);
        writeln!($out, "{}", msg).context("Failed to write smoke transcript")?;
    }};
}

/// Run the tours for `screens`, in order, writing a transcript to `out`.
pub async fn tour_smoke(
    settings: &TourSettings,
    store: Arc<dyn FlagStore>,
    user: UserId,
    screens: &[Screen],
    out: &mut dyn Write,
) -> Result<Vec<ScreenRun>> {
    let (session, completions) = build_session(settings, store, user.clone());
    let mut hint = HintArrow::new(TargetMeasurer::from_settings(settings));
    let mut runs = Vec::with_capacity(screens.len());

    log_step!(out, "=== Tour smoke (user={}) ===", user);
    log_step!(out, "Started: {}", chrono::Utc::now());

    for &screen in screens {
        if hint.on_navigate(screen) {
            log_step!(out, "  followed hint to {}", screen);
        }

        let host = Arc::new(SimulatedScreen::for_screen(screen));
        let start = session.on_focus(host.clone()).await;
        log_step!(out, "--- {} --- start: {:?}", screen, start);

        let mut shown = Vec::new();
        if let StartOutcome::Started { steps } = start {
            // One advance per step, plus slack for ignored calls.
            for _ in 0..=steps {
                if let Some(r) = session.render().await {
                    log_step!(out, "  [{}/{}] {}: {}", r.index + 1, r.total, r.step.key, r.step.title);
                    shown.push(r.step.key);
                }
                match session.advance().await {
                    AdvanceOutcome::Finished | AdvanceOutcome::Cancelled => break,
                    AdvanceOutcome::Moved { .. } | AdvanceOutcome::Ignored => {}
                }
            }
        }

        let completion = completions
            .lock()
            .ok()
            .and_then(|list| list.iter().rev().find(|c| c.screen == screen).copied());
        if let Some(c) = completion {
            log_step!(out, "  finished (skipped={}, persisted={})", c.skipped, c.persisted);
        }

        let mut pointed = None;
        if let Some(flags) = session.gate().cached().await {
            if let Some(next) = next_screen(&flags, screen) {
                if hint
                    .activate(host.as_ref(), next, &CancellationToken::new())
                    .await
                {
                    log_step!(out, "  hint arrow -> {}", next);
                    pointed = Some(next);
                }
            }
        }

        runs.push(ScreenRun {
            screen,
            start,
            shown,
            completion,
            hint: pointed,
        });

        session.on_blur(screen).await;
    }
    hint.deactivate(HintDismissal::Skipped);

    if let Some(flags) = session.gate().cached().await {
        log_step!(out, "Final flags: {:?}", flags);
    }
    Ok(runs)
}

/// Render the first visible step of `screen`'s tour. Uses a throwaway in-memory store with the
/// screen unlocked, so previews never touch real flags.
pub async fn preview(settings: &TourSettings, screen: Screen) -> Result<String> {
    let user = UserId::new("preview");
    let store = Arc::new(MemoryFlagStore::with_flags(
        user.clone(),
        unlocked_flags(screen),
    ));
    let (session, _) = build_session(settings, store, user);
    let host = Arc::new(SimulatedScreen::for_screen(screen));

    let start = session.start(host.clone()).await;
    if !matches!(start, StartOutcome::Started { .. }) {
        anyhow::bail!("Tour for {} did not start: {:?}", screen, start);
    }
    let shown = session.render().await;
    tui::render_frame(host.viewport(), shown.as_ref(), None, Duration::ZERO)
}
