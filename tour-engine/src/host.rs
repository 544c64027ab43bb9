// Collaborator interfaces the hosting app implements
//
// The engine never touches rendering, navigation or localization storage directly. Screens hand
// it these narrow capabilities instead.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

use crate::geometry::{Viewport, WindowRect};
use crate::models::screen::{ModeTag, Screen, TargetId};

/// Handle to a rendered UI element.
#[async_trait]
pub trait MeasurableTarget: Send + Sync {
    /// Absolute window rectangle. Returns a zero rect (not an error) before the element has
    /// been laid out.
    async fn measure_in_window(&self) -> WindowRect;
}

/// Localized string lookup.
pub trait Translator: Send + Sync {
    /// `None` means the key has no string value.
    fn lookup(&self, key: &str) -> Option<String>;
}

impl Translator for HashMap<String, String> {
    fn lookup(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// The screen currently hosting a tour.
#[async_trait]
pub trait ScreenHost: Send + Sync {
    fn screen(&self) -> Screen;

    fn viewport(&self) -> Viewport;

    /// Measurement handle for a named target, if that element is mounted.
    fn target(&self, id: TargetId) -> Option<Arc<dyn MeasurableTarget>>;

    fn current_mode(&self) -> Option<ModeTag>;

    /// Mode-change collaborator, invoked only for steps flagged `switch_mode_on_advance`.
    async fn switch_mode(&self);

    /// Issue a scroll command. There is no reliable completion signal.
    fn scroll_to(&self, offset: f64);
}
