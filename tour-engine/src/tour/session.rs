// Tutorial session
//
// One session per app instance, owned by the navigation layer. All transitions go through the
// inner mutex; the lock is never held across a host call or a wait. Every wait is tied to the
// current epoch's cancellation token, and results that come back after the epoch moved on are
// dropped, so a stale build or advance can never resurrect a session.

use log::{debug, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::builder::{retarget, StepBuilder, StepSpec};
use super::gate::PersistenceGate;
use super::screens;
use super::scroll::{ScrollCoordinator, ScrollOutcome};
use super::settle;
use crate::host::{ScreenHost, Translator};
use crate::measure::TargetMeasurer;
use crate::models::screen::{ModeTag, Screen, TargetId};
use crate::models::step::StepDescriptor;
use crate::settings::TourSettings;

/// Source of a screen's step table.
pub type StepTables = fn(Screen) -> Vec<StepSpec>;

/// Fired once per finished tour, after the completion write settled either way.
pub type CompletionCallback = Arc<dyn Fn(TourCompletion) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TourCompletion {
    pub screen: Screen,
    pub skipped: bool,
    /// Whether the completion flag reached the store.
    pub persisted: bool,
}

/// Externally visible session state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    /// The gate is reading flags for `screen`.
    Evaluating { screen: Screen },
    Building { screen: Screen },
    Active { screen: Screen, cursor: usize, len: usize },
    /// Completion is being written.
    Finished { screen: Screen },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started { steps: usize },
    /// Flags say this screen's tour is done or not yet unlocked.
    NotNeeded,
    /// Every step failed to build.
    NoSteps,
    AlreadyRunning,
    /// Focus was lost (or another screen took over) before the tour became active.
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdvanceOutcome {
    Moved { cursor: usize },
    Finished,
    /// No active tour, or another advance is still in flight.
    Ignored,
    /// The session was skipped or abandoned while this advance waited.
    Cancelled,
}

/// What the overlay should draw right now.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedStep {
    pub screen: Screen,
    pub index: usize,
    pub total: usize,
    pub step: StepDescriptor,
}

struct ActiveTour {
    screen: Screen,
    host: Arc<dyn ScreenHost>,
    steps: Vec<StepDescriptor>,
    cursor: usize,
    advancing: bool,
    scrolled: bool,
}

enum State {
    Idle,
    Evaluating(Screen),
    Building(Screen),
    Active(ActiveTour),
    Finished(Screen),
}

impl State {
    fn screen(&self) -> Option<Screen> {
        match self {
            State::Idle => None,
            State::Evaluating(s) | State::Building(s) | State::Finished(s) => Some(*s),
            State::Active(tour) => Some(tour.screen),
        }
    }
}

struct Inner {
    state: State,
    epoch: u64,
    cancel: CancellationToken,
    correlation_id: String,
}

impl Inner {
    /// Invalidate everything in flight and open a new epoch.
    fn next_epoch(&mut self) -> (u64, CancellationToken) {
        self.cancel.cancel();
        self.epoch += 1;
        self.cancel = CancellationToken::new();
        (self.epoch, self.cancel.clone())
    }
}

/// Work an advance does before the cursor moves. A mode switch runs first, then the scroll.
struct AdvancePlan {
    switch_mode: bool,
    scroll: Option<(f64, Option<TargetId>)>,
}

impl AdvancePlan {
    fn is_immediate(&self) -> bool {
        !self.switch_mode && self.scroll.is_none()
    }
}

pub struct TutorialSession {
    gate: Arc<PersistenceGate>,
    builder: StepBuilder,
    scroll: ScrollCoordinator,
    tables: StepTables,
    mode_settle: Duration,
    restore_scroll: bool,
    on_complete: Option<CompletionCallback>,
    inner: Mutex<Inner>,
}

impl TutorialSession {
    pub fn new(
        gate: Arc<PersistenceGate>,
        builder: StepBuilder,
        scroll: ScrollCoordinator,
        mode_settle: Duration,
    ) -> Self {
        Self {
            gate,
            builder,
            scroll,
            tables: screens::steps_for,
            mode_settle,
            restore_scroll: true,
            on_complete: None,
            inner: Mutex::new(Inner {
                state: State::Idle,
                epoch: 0,
                cancel: CancellationToken::new(),
                correlation_id: String::new(),
            }),
        }
    }

    pub fn from_settings(
        gate: Arc<PersistenceGate>,
        translator: Arc<dyn Translator>,
        settings: &TourSettings,
    ) -> Self {
        let builder = StepBuilder::new(
            TargetMeasurer::from_settings(settings),
            translator,
            settings.build_settle(),
        );
        let mut session = Self::new(
            gate,
            builder,
            ScrollCoordinator::new(settings.scroll_settle()),
            settings.mode_settle(),
        );
        session.restore_scroll = settings.restore_scroll_on_finish;
        session
    }

    pub fn with_tables(mut self, tables: StepTables) -> Self {
        self.tables = tables;
        self
    }

    pub fn with_completion_callback(mut self, callback: CompletionCallback) -> Self {
        self.on_complete = Some(callback);
        self
    }

    pub fn restore_scroll_on_finish(mut self, restore: bool) -> Self {
        self.restore_scroll = restore;
        self
    }

    pub fn gate(&self) -> &Arc<PersistenceGate> {
        &self.gate
    }

    pub async fn phase(&self) -> SessionPhase {
        let inner = self.inner.lock().await;
        match &inner.state {
            State::Idle => SessionPhase::Idle,
            State::Evaluating(screen) => SessionPhase::Evaluating { screen: *screen },
            State::Building(screen) => SessionPhase::Building { screen: *screen },
            State::Active(tour) => SessionPhase::Active {
                screen: tour.screen,
                cursor: tour.cursor,
                len: tour.steps.len(),
            },
            State::Finished(screen) => SessionPhase::Finished { screen: *screen },
        }
    }

    /// Called when `host`'s screen gains focus.
    pub async fn on_focus(&self, host: Arc<dyn ScreenHost>) -> StartOutcome {
        self.start(host).await
    }

    /// Try to start the tour for `host`'s screen.
    ///
    /// Reads the flags fresh, builds the steps after the layout settles, and activates the tour
    /// unless focus moved away in the meantime. A session still running for a different screen
    /// is abandoned first.
    pub async fn start(&self, host: Arc<dyn ScreenHost>) -> StartOutcome {
        let screen = host.screen();

        let (epoch, cancel, correlation_id) = {
            let mut inner = self.inner.lock().await;
            if let Some(current) = inner.state.screen() {
                if current == screen {
                    debug!(
                        "[PHASE: tour] [STEP: start] Session already running (screen={})",
                        screen
                    );
                    return StartOutcome::AlreadyRunning;
                }
                info!(
                    "[PHASE: tour] [STEP: start] Abandoning session for another screen (from={}, to={}, correlation_id={})",
                    current, screen, inner.correlation_id
                );
            }
            let (epoch, cancel) = inner.next_epoch();
            inner.state = State::Evaluating(screen);
            inner.correlation_id = Uuid::new_v4().to_string();
            (epoch, cancel, inner.correlation_id.clone())
        };

        if !self.gate.evaluate(screen).await {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return StartOutcome::Cancelled;
            }
            inner.state = State::Idle;
            return StartOutcome::NotNeeded;
        }

        {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return StartOutcome::Cancelled;
            }
            inner.state = State::Building(screen);
        }
        info!(
            "[PHASE: tour] [STEP: build] Building tour (screen={}, correlation_id={})",
            screen, correlation_id
        );

        let table = (self.tables)(screen);
        let built = self.builder.build(host.as_ref(), &table, &cancel).await;

        let mut inner = self.inner.lock().await;
        if inner.epoch != epoch {
            debug!(
                "[PHASE: tour] [STEP: build] Discarding stale build (screen={}, correlation_id={})",
                screen, correlation_id
            );
            return StartOutcome::Cancelled;
        }
        match built {
            None => {
                inner.state = State::Idle;
                StartOutcome::Cancelled
            }
            Some(steps) if steps.is_empty() => {
                warn!(
                    "[PHASE: tour] [STEP: build] No step could be built; staying idle (screen={}, correlation_id={})",
                    screen, correlation_id
                );
                inner.state = State::Idle;
                StartOutcome::NoSteps
            }
            Some(steps) => {
                let len = steps.len();
                inner.state = State::Active(ActiveTour {
                    screen,
                    host,
                    steps,
                    cursor: 0,
                    advancing: false,
                    scrolled: false,
                });
                info!(
                    "[PHASE: tour] [STEP: start] Tour active (screen={}, steps={}, correlation_id={})",
                    screen, len, correlation_id
                );
                StartOutcome::Started { steps: len }
            }
        }
    }

    /// Called when `screen` loses focus. Abandons a session that has not finished; nothing is
    /// persisted and the next focus re-evaluates from scratch.
    pub async fn on_blur(&self, screen: Screen) -> bool {
        let mut inner = self.inner.lock().await;
        let abandon = match &inner.state {
            State::Evaluating(s) | State::Building(s) => *s == screen,
            State::Active(tour) => tour.screen == screen,
            // The completion write runs to the end.
            State::Idle | State::Finished(_) => false,
        };
        if abandon {
            inner.next_epoch();
            inner.state = State::Idle;
            info!(
                "[PHASE: tour] [STEP: blur] Session abandoned on focus loss (screen={}, correlation_id={})",
                screen, inner.correlation_id
            );
        }
        abandon
    }

    /// Move to the next step.
    ///
    /// A step flagged to switch modes switches the host first and waits for the new mode to
    /// settle. When the next step carries a scroll target, scrolls once, waits, and re-measures
    /// that step's target before showing it. Advancing past the last step finishes the tour.
    pub async fn advance(&self) -> AdvanceOutcome {
        let (host, epoch, cancel, plan) = {
            let mut inner = self.inner.lock().await;
            let epoch = inner.epoch;
            let cancel = inner.cancel.clone();
            let State::Active(tour) = &mut inner.state else {
                return AdvanceOutcome::Ignored;
            };
            if tour.advancing {
                debug!(
                    "[PHASE: tour] [STEP: advance] Advance already in flight (screen={})",
                    tour.screen
                );
                return AdvanceOutcome::Ignored;
            }

            let plan = AdvancePlan {
                switch_mode: tour.steps[tour.cursor].switch_mode_on_advance,
                scroll: tour
                    .steps
                    .get(tour.cursor + 1)
                    .and_then(|next| next.scroll_target.map(|offset| (offset, next.remeasure))),
            };
            if !plan.is_immediate() {
                tour.advancing = true;
            }
            if plan.scroll.is_some() {
                // The host moves as soon as it is asked; restore it even if this advance is dropped.
                tour.scrolled = true;
            }
            (Arc::clone(&tour.host), epoch, cancel, plan)
        };

        if plan.switch_mode {
            host.switch_mode().await;
            if !settle(self.mode_settle, &cancel).await {
                return AdvanceOutcome::Cancelled;
            }
        }

        let mut remeasured = None;
        let mut scrolled = false;
        if let Some((offset, remeasure)) = plan.scroll {
            if self.scroll.scroll_to(host.as_ref(), offset, &cancel).await
                == ScrollOutcome::Cancelled
            {
                return AdvanceOutcome::Cancelled;
            }
            scrolled = true;
            if let Some(id) = remeasure {
                remeasured = self
                    .builder
                    .measurer()
                    .measure_target(host.as_ref(), id, &cancel)
                    .await;
                if cancel.is_cancelled() {
                    return AdvanceOutcome::Cancelled;
                }
            }
        }
        let viewport = host.viewport();

        let (tour, finish_epoch) = {
            let mut inner = self.inner.lock().await;
            if inner.epoch != epoch {
                return AdvanceOutcome::Cancelled;
            }
            let State::Active(tour) = &mut inner.state else {
                return AdvanceOutcome::Cancelled;
            };
            tour.advancing = false;

            let next = tour.cursor + 1;
            if let (Some(rect), Some(step)) = (remeasured, tour.steps.get_mut(next)) {
                retarget(step, rect, viewport);
            } else if scrolled {
                // Keep the static anchor when the re-measure failed.
                debug!(
                    "[PHASE: tour] [STEP: advance] Post-scroll measurement unavailable (screen={}, step={})",
                    tour.screen, next
                );
            }

            if next < tour.steps.len() {
                tour.cursor = next;
                debug!(
                    "[PHASE: tour] [STEP: advance] Step {} of {} (screen={})",
                    next + 1,
                    tour.steps.len(),
                    tour.screen
                );
                return AdvanceOutcome::Moved { cursor: next };
            }

            let screen = tour.screen;
            let State::Active(tour) = std::mem::replace(&mut inner.state, State::Finished(screen))
            else {
                return AdvanceOutcome::Cancelled;
            };
            (tour, inner.epoch)
        };

        self.finish(tour, false, finish_epoch).await;
        AdvanceOutcome::Finished
    }

    /// Dismiss the tour in one call. A skipped tour counts as completed.
    pub async fn skip(&self) -> bool {
        let (tour, epoch) = {
            let mut inner = self.inner.lock().await;
            let Some(screen) = (match &inner.state {
                State::Active(tour) => Some(tour.screen),
                _ => None,
            }) else {
                return false;
            };
            // Any advance still waiting on a scroll or mode switch is dropped.
            let (epoch, _) = inner.next_epoch();
            let State::Active(tour) = std::mem::replace(&mut inner.state, State::Finished(screen))
            else {
                return false;
            };
            info!(
                "[PHASE: tour] [STEP: skip] Tour skipped (screen={}, at_step={}, correlation_id={})",
                screen, tour.cursor, inner.correlation_id
            );
            (tour, epoch)
        };

        self.finish(tour, true, epoch).await;
        true
    }

    async fn finish(&self, tour: ActiveTour, skipped: bool, epoch: u64) {
        let screen = tour.screen;
        let persisted = match self.gate.record_completion(screen).await {
            Ok(_) => true,
            Err(e) => {
                // The tour will be offered again on the next focus.
                warn!(
                    "[PHASE: tour] [STEP: finish] Failed to persist completion (screen={}): {}",
                    screen, e
                );
                false
            }
        };

        if tour.scrolled && self.restore_scroll {
            tour.host.scroll_to(0.0);
        }

        {
            let mut inner = self.inner.lock().await;
            if inner.epoch == epoch {
                inner.state = State::Idle;
            }
            info!(
                "[PHASE: tour] [STEP: finish] Tour finished (screen={}, skipped={}, persisted={}, correlation_id={})",
                screen, skipped, persisted, inner.correlation_id
            );
        }

        if let Some(callback) = &self.on_complete {
            callback(TourCompletion {
                screen,
                skipped,
                persisted,
            });
        }
    }

    /// The step to draw, given the host's current mode.
    pub async fn render(&self) -> Option<RenderedStep> {
        let host = {
            let inner = self.inner.lock().await;
            match &inner.state {
                State::Active(tour) => Arc::clone(&tour.host),
                _ => return None,
            }
        };
        let mode = host.current_mode();
        self.render_in_mode(mode.as_ref()).await
    }

    /// The step to draw while the host is in `mode`.
    ///
    /// Nothing is drawn between steps, while the current step waits for a different mode, or
    /// when its title or body is empty.
    pub async fn render_in_mode(&self, mode: Option<&ModeTag>) -> Option<RenderedStep> {
        let inner = self.inner.lock().await;
        let State::Active(tour) = &inner.state else {
            return None;
        };
        if tour.advancing {
            return None;
        }
        let step = tour.steps.get(tour.cursor)?;
        if !step.matches_mode(mode) {
            return None;
        }
        if !step.has_valid_content() {
            debug!(
                "[PHASE: tour] [STEP: render] Step without content not rendered (step={})",
                step.key
            );
            return None;
        }
        Some(RenderedStep {
            screen: tour.screen,
            index: tour.cursor,
            total: tour.steps.len(),
            step: step.clone(),
        })
    }
}
