// Scripted screens for smoke runs, previews and tests
//
// Geometry mirrors a 390x844pt phone layout. Targets registered as scroll-bound move up by the
// current scroll offset, and the list containers land a few points away from the static anchors
// the step tables predict, the way real content reflows above them.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::geometry::{Viewport, WindowRect};
use crate::host::{MeasurableTarget, ScreenHost};
use crate::models::screen::{ModeTag, Screen, TargetId};
use crate::tour::screens::{SCANNER_BARCODE_MODE, SCANNER_PHOTO_MODE};

pub const PHONE_VIEWPORT: Viewport = Viewport {
    width: 390.0,
    height: 844.0,
};

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[derive(Debug, Default)]
struct ScrollState {
    offset: Mutex<f64>,
}

pub struct SimTarget {
    base: WindowRect,
    scroll: Option<Arc<ScrollState>>,
    zero_reads: AtomicU32,
    calls: AtomicU32,
}

impl SimTarget {
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MeasurableTarget for SimTarget {
    async fn measure_in_window(&self) -> WindowRect {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let pending = self.zero_reads.load(Ordering::SeqCst);
        if pending > 0 {
            self.zero_reads.store(pending - 1, Ordering::SeqCst);
            return WindowRect::ZERO;
        }
        let shift = self
            .scroll
            .as_ref()
            .map(|s| *lock(&s.offset))
            .unwrap_or(0.0);
        WindowRect {
            y: self.base.y - shift,
            ..self.base
        }
    }
}

pub struct SimulatedScreen {
    screen: Screen,
    targets: Mutex<HashMap<TargetId, Arc<SimTarget>>>,
    modes: Vec<ModeTag>,
    mode: Mutex<Option<ModeTag>>,
    scroll: Arc<ScrollState>,
    scroll_calls: AtomicU32,
    mode_switches: AtomicU32,
}

impl SimulatedScreen {
    fn new(screen: Screen, modes: &[&str]) -> Self {
        let modes: Vec<ModeTag> = modes.iter().map(|m| ModeTag::from(*m)).collect();
        let sim = Self {
            screen,
            targets: Mutex::new(HashMap::new()),
            mode: Mutex::new(modes.first().cloned()),
            modes,
            scroll: Arc::new(ScrollState::default()),
            scroll_calls: AtomicU32::new(0),
            mode_switches: AtomicU32::new(0),
        };
        sim.with_target(TargetId::HomeTab, WindowRect::new(10.0, 784.0, 110.0, 52.0))
            .with_target(TargetId::ScannerTab, WindowRect::new(140.0, 784.0, 110.0, 52.0))
            .with_target(TargetId::ProfileTab, WindowRect::new(270.0, 784.0, 110.0, 52.0))
    }

    pub fn home() -> Self {
        Self::new(Screen::Home, &[])
            .with_target(TargetId::DailySummary, WindowRect::new(16.0, 110.0, 358.0, 150.0))
            .with_target(TargetId::MacroGrid, WindowRect::new(16.0, 276.0, 358.0, 252.0))
            .with_target(TargetId::MacroCard, WindowRect::new(16.0, 276.0, 173.0, 120.0))
            .with_target(TargetId::AddMealButton, WindowRect::new(306.0, 700.0, 68.0, 68.0))
            .with_scroll_bound_target(TargetId::MealList, WindowRect::new(16.0, 575.0, 358.0, 600.0))
    }

    pub fn scanner() -> Self {
        Self::new(Screen::Scanner, &[SCANNER_PHOTO_MODE, SCANNER_BARCODE_MODE])
            .with_target(TargetId::ModeToggle, WindowRect::new(115.0, 96.0, 160.0, 40.0))
            .with_target(TargetId::ScanQuota, WindowRect::new(16.0, 150.0, 358.0, 36.0))
            .with_target(TargetId::CaptureButton, WindowRect::new(155.0, 680.0, 80.0, 80.0))
    }

    pub fn profile() -> Self {
        Self::new(Screen::Profile, &[])
            .with_target(TargetId::GoalsCard, WindowRect::new(16.0, 110.0, 358.0, 140.0))
            .with_target(TargetId::StatsGrid, WindowRect::new(16.0, 266.0, 358.0, 110.0))
            .with_target(TargetId::StatCard, WindowRect::new(16.0, 266.0, 173.0, 110.0))
            .with_scroll_bound_target(
                TargetId::SettingsList,
                WindowRect::new(16.0, 786.0, 358.0, 420.0),
            )
    }

    pub fn for_screen(screen: Screen) -> Self {
        match screen {
            Screen::Home => Self::home(),
            Screen::Scanner => Self::scanner(),
            Screen::Profile => Self::profile(),
        }
    }

    pub fn with_target(self, id: TargetId, rect: WindowRect) -> Self {
        self.insert(id, rect, None);
        self
    }

    pub fn with_scroll_bound_target(self, id: TargetId, rect: WindowRect) -> Self {
        let scroll = Arc::clone(&self.scroll);
        self.insert(id, rect, Some(scroll));
        self
    }

    /// The target reports zero rects for its first `reads` queries.
    pub fn settling(self, id: TargetId, reads: u32) -> Self {
        if let Some(t) = lock(&self.targets).get(&id) {
            t.zero_reads.store(reads, Ordering::SeqCst);
        }
        self
    }

    pub fn without_target(self, id: TargetId) -> Self {
        lock(&self.targets).remove(&id);
        self
    }

    fn insert(&self, id: TargetId, base: WindowRect, scroll: Option<Arc<ScrollState>>) {
        lock(&self.targets).insert(
            id,
            Arc::new(SimTarget {
                base,
                scroll,
                zero_reads: AtomicU32::new(0),
                calls: AtomicU32::new(0),
            }),
        );
    }

    pub fn set_mode(&self, mode: &str) {
        *lock(&self.mode) = Some(ModeTag::from(mode));
    }

    pub fn measure_calls(&self, id: TargetId) -> u32 {
        lock(&self.targets).get(&id).map(|t| t.calls()).unwrap_or(0)
    }

    pub fn scroll_calls(&self) -> u32 {
        self.scroll_calls.load(Ordering::SeqCst)
    }

    pub fn scroll_offset(&self) -> f64 {
        *lock(&self.scroll.offset)
    }

    pub fn mode_switches(&self) -> u32 {
        self.mode_switches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ScreenHost for SimulatedScreen {
    fn screen(&self) -> Screen {
        self.screen
    }

    fn viewport(&self) -> Viewport {
        PHONE_VIEWPORT
    }

    fn target(&self, id: TargetId) -> Option<Arc<dyn MeasurableTarget>> {
        lock(&self.targets)
            .get(&id)
            .map(|t| Arc::clone(t) as Arc<dyn MeasurableTarget>)
    }

    fn current_mode(&self) -> Option<ModeTag> {
        lock(&self.mode).clone()
    }

    async fn switch_mode(&self) {
        self.mode_switches.fetch_add(1, Ordering::SeqCst);
        if self.modes.is_empty() {
            return;
        }
        let mut mode = lock(&self.mode);
        let idx = mode
            .as_ref()
            .and_then(|m| self.modes.iter().position(|x| x == m))
            .map(|i| (i + 1) % self.modes.len())
            .unwrap_or(0);
        *mode = Some(self.modes[idx].clone());
    }

    fn scroll_to(&self, offset: f64) {
        self.scroll_calls.fetch_add(1, Ordering::SeqCst);
        *lock(&self.scroll.offset) = offset;
    }
}

/// English strings for every step key.
pub fn english_translations() -> HashMap<String, String> {
    let entries = [
        ("tutorial.home.summary", "Your day at a glance", "Calories eaten, burned and left for today."),
        ("tutorial.home.macros", "Macros", "Protein and carbs fill up as you log meals."),
        ("tutorial.home.micros", "More nutrients", "Fat and fiber are tracked here too."),
        ("tutorial.home.add_meal", "Log a meal", "Tap + to add food by search, photo or barcode."),
        ("tutorial.home.meals", "Today's meals", "Everything you logged today, grouped by meal."),
        ("tutorial.scanner.capture", "Snap your plate", "Take a photo and we'll estimate the nutrition."),
        ("tutorial.scanner.mode_toggle", "Switch modes", "Packaged food? Switch to barcode scanning."),
        ("tutorial.scanner.barcode", "Scan a barcode", "Line the barcode up inside the frame."),
        ("tutorial.scanner.quota", "Daily scans", "Your remaining scans for today."),
        ("tutorial.profile.goals", "Your goals", "Adjust calorie and macro targets any time."),
        ("tutorial.profile.stats", "Progress", "Streaks and weight trend at a glance."),
        ("tutorial.profile.settings", "Settings", "Units, reminders and account options."),
        ("tutorial.profile.navigation", "You're all set", "Head back home to log your first meal."),
    ];

    let mut map = HashMap::new();
    for (key, title, body) in entries {
        map.insert(format!("{key}.title"), title.to_string());
        map.insert(format!("{key}.body"), body.to_string());
    }
    map
}
