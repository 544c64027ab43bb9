// Step descriptors produced by the step builder

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::screen::{ModeTag, TargetId};
use crate::geometry::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArrowDirection {
    Up,
    Down,
}

/// Pointer connecting the callout to its target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Arrow {
    pub direction: ArrowDirection,
    /// Horizontal offset from the bubble's left edge.
    pub offset: f64,
}

/// Placement of the explanatory callout.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BubblePosition {
    pub top: f64,
    pub left: f64,
    pub max_width: f64,
}

/// Looping illustrative animation shown inside the bubble.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageLoop {
    pub frames: Vec<String>,
    pub loop_count: u32,
    pub frame_interval: Duration,
}

impl ImageLoop {
    /// Frame visible after `elapsed`. Holds the last frame once all loops have played.
    pub fn frame_at(&self, elapsed: Duration) -> Option<&str> {
        if self.frames.is_empty() {
            return None;
        }
        let interval = self.frame_interval.as_millis().max(1);
        let tick = elapsed.as_millis() / interval;
        let total = self.frames.len() as u128 * u128::from(self.loop_count.max(1));
        if tick >= total {
            return self.frames.last().map(String::as_str);
        }
        let idx = (tick % self.frames.len() as u128) as usize;
        self.frames.get(idx).map(String::as_str)
    }
}

/// One unit of the guided tour.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepDescriptor {
    /// Translation key prefix; identifies the step in logs.
    pub key: &'static str,
    pub target_area: Option<Rect>,
    pub extra_highlights: Vec<Rect>,
    pub bubble: BubblePosition,
    pub arrow: Option<Arrow>,
    pub title: String,
    pub body: String,
    pub images: Option<ImageLoop>,
    pub require_mode: Option<ModeTag>,
    pub switch_mode_on_advance: bool,
    /// Viewport offset to scroll to when the session advances into this step.
    pub scroll_target: Option<f64>,
    /// Target re-measured after scrolling to `scroll_target`.
    pub remeasure: Option<TargetId>,
}

impl StepDescriptor {
    /// Title and body must both be non-empty for the step to render.
    pub fn has_valid_content(&self) -> bool {
        !self.title.trim().is_empty() && !self.body.trim().is_empty()
    }

    /// Whether the step is visible while the host is in `mode`.
    pub fn matches_mode(&self, mode: Option<&ModeTag>) -> bool {
        match &self.require_mode {
            None => true,
            Some(required) => mode == Some(required),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step() -> StepDescriptor {
        StepDescriptor {
            key: "tutorial.test",
            target_area: None,
            extra_highlights: Vec::new(),
            bubble: BubblePosition::default(),
            arrow: None,
            title: "Title".to_string(),
            body: "Body".to_string(),
            images: None,
            require_mode: None,
            switch_mode_on_advance: false,
            scroll_target: None,
            remeasure: None,
        }
    }

    #[test]
    fn empty_title_or_body_invalidates_content() {
        assert!(step().has_valid_content());

        let mut s = step();
        s.title = "  ".to_string();
        assert!(!s.has_valid_content());

        let mut s = step();
        s.body.clear();
        assert!(!s.has_valid_content());
    }

    #[test]
    fn mode_gate_only_applies_when_required() {
        let free = step();
        assert!(free.matches_mode(None));
        assert!(free.matches_mode(Some(&ModeTag::from("barcode"))));

        let mut gated = step();
        gated.require_mode = Some(ModeTag::from("barcode"));
        assert!(!gated.matches_mode(None));
        assert!(!gated.matches_mode(Some(&ModeTag::from("photo"))));
        assert!(gated.matches_mode(Some(&ModeTag::from("barcode"))));
    }

    #[test]
    fn image_loop_cycles_then_holds_last_frame() {
        let anim = ImageLoop {
            frames: vec!["a".into(), "b".into(), "c".into()],
            loop_count: 2,
            frame_interval: Duration::from_millis(100),
        };

        assert_eq!(anim.frame_at(Duration::ZERO), Some("a"));
        assert_eq!(anim.frame_at(Duration::from_millis(150)), Some("b"));
        assert_eq!(anim.frame_at(Duration::from_millis(350)), Some("a"));
        // 6 ticks played; afterwards the last frame stays.
        assert_eq!(anim.frame_at(Duration::from_millis(5_000)), Some("c"));
    }

    #[test]
    fn image_loop_without_frames_has_nothing_to_show() {
        let anim = ImageLoop {
            frames: Vec::new(),
            loop_count: 1,
            frame_interval: Duration::from_millis(100),
        };
        assert_eq!(anim.frame_at(Duration::ZERO), None);
    }
}
