// Screens, targets and modes known to the tour engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Screens that carry an onboarding tour, in onboarding order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Screen {
    Home,
    Scanner,
    Profile,
}

/// Fixed sequence across which tours gate one another.
pub const ONBOARDING_ORDER: [Screen; 3] = [Screen::Home, Screen::Scanner, Screen::Profile];

impl Screen {
    pub fn as_id(&self) -> &'static str {
        match self {
            Screen::Home => "home",
            Screen::Scanner => "scanner",
            Screen::Profile => "profile",
        }
    }

    pub fn from_id(id: &str) -> Option<Self> {
        match id.trim().to_ascii_lowercase().as_str() {
            "home" => Some(Screen::Home),
            "scanner" => Some(Screen::Scanner),
            "profile" => Some(Screen::Profile),
            _ => None,
        }
    }

    /// Column / field name of this screen's completion flag.
    pub fn flag_column(&self) -> &'static str {
        match self {
            Screen::Home => "home_done",
            Screen::Scanner => "scanner_done",
            Screen::Profile => "profile_done",
        }
    }

    /// Screen whose tour must be complete before this one may auto-start.
    pub fn upstream(&self) -> Option<Screen> {
        let idx = self.order_index();
        idx.checked_sub(1).map(|i| ONBOARDING_ORDER[i])
    }

    pub fn next(&self) -> Option<Screen> {
        ONBOARDING_ORDER.get(self.order_index() + 1).copied()
    }

    pub fn is_last(&self) -> bool {
        self.next().is_none()
    }

    /// Navigation control that opens this screen.
    pub fn entry_control(&self) -> TargetId {
        match self {
            Screen::Home => TargetId::HomeTab,
            Screen::Scanner => TargetId::ScannerTab,
            Screen::Profile => TargetId::ProfileTab,
        }
    }

    fn order_index(&self) -> usize {
        match self {
            Screen::Home => 0,
            Screen::Scanner => 1,
            Screen::Profile => 2,
        }
    }
}

impl fmt::Display for Screen {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_id())
    }
}

/// Named UI elements the tour highlights.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TargetId {
    // Home
    DailySummary,
    MacroGrid,
    MacroCard,
    AddMealButton,
    MealList,
    // Scanner
    ModeToggle,
    CaptureButton,
    BarcodeFrame,
    ScanQuota,
    // Profile
    GoalsCard,
    StatsGrid,
    StatCard,
    SettingsList,
    // Navigation bar
    HomeTab,
    ScannerTab,
    ProfileTab,
}

impl TargetId {
    pub fn as_id(&self) -> &'static str {
        match self {
            TargetId::DailySummary => "daily_summary",
            TargetId::MacroGrid => "macro_grid",
            TargetId::MacroCard => "macro_card",
            TargetId::AddMealButton => "add_meal_button",
            TargetId::MealList => "meal_list",
            TargetId::ModeToggle => "mode_toggle",
            TargetId::CaptureButton => "capture_button",
            TargetId::BarcodeFrame => "barcode_frame",
            TargetId::ScanQuota => "scan_quota",
            TargetId::GoalsCard => "goals_card",
            TargetId::StatsGrid => "stats_grid",
            TargetId::StatCard => "stat_card",
            TargetId::SettingsList => "settings_list",
            TargetId::HomeTab => "home_tab",
            TargetId::ScannerTab => "scanner_tab",
            TargetId::ProfileTab => "profile_tab",
        }
    }
}

impl fmt::Display for TargetId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_id())
    }
}

/// Screen-local mode a step may require (e.g. the scanner's "photo" / "barcode").
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModeTag(String);

impl ModeTag {
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ModeTag {
    fn from(tag: &str) -> Self {
        Self::new(tag)
    }
}

impl fmt::Display for ModeTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
