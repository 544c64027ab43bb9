// Step construction
//
// Each screen declares its tour as an ordered table of `StepSpec`s. The builder turns that table
// into `StepDescriptor`s by measuring live targets (or using static anchors), then placing the
// callout bubble and arrow relative to the resulting rectangle.

use log::{debug, info, warn};
use std::collections::HashMap;
use std::ops::Range;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::settle;
use crate::geometry::{derive_grid, Rect, Viewport};
use crate::host::{ScreenHost, Translator};
use crate::measure::TargetMeasurer;
use crate::models::screen::{ModeTag, TargetId};
use crate::models::step::{Arrow, ArrowDirection, BubblePosition, ImageLoop, StepDescriptor};

pub const BUBBLE_MARGIN: f64 = 16.0;
pub const BUBBLE_GAP: f64 = 8.0;
pub const ARROW_SIZE: f64 = 12.0;
pub const BUBBLE_ESTIMATED_HEIGHT: f64 = 150.0;
pub const BUBBLE_IMAGE_HEIGHT: f64 = 120.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BubbleSide {
    Above,
    Below,
    /// Whichever side of the target has more free viewport space.
    Auto,
}

/// Fixed rectangle for targets that are only visible after a programmatically known change
/// (a scroll to a known offset, a mode switch).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StaticAnchor {
    pub top: f64,
    pub height: f64,
    pub horizontal_margin: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Derivation {
    /// Measure one target and highlight it.
    Direct { target: TargetId, padding: f64 },
    /// Measure a grid container and one child, derive the sibling cells, and highlight a slice.
    GridSlice {
        container: TargetId,
        reference: TargetId,
        columns: usize,
        gap: f64,
        cells: usize,
        highlight: Range<usize>,
    },
    /// No live measurement.
    Static(StaticAnchor),
}

/// One row of a screen's step table.
#[derive(Debug, Clone, PartialEq)]
pub struct StepSpec {
    pub key: &'static str,
    pub derivation: Derivation,
    pub bubble: BubbleSide,
    pub corner_radius: f64,
    pub require_mode: Option<&'static str>,
    pub switch_mode_on_advance: bool,
    pub scroll_target: Option<f64>,
    pub remeasure: Option<TargetId>,
    pub images: Option<ImageLoop>,
}

impl StepSpec {
    fn new(key: &'static str, derivation: Derivation) -> Self {
        Self {
            key,
            derivation,
            bubble: BubbleSide::Auto,
            corner_radius: 0.0,
            require_mode: None,
            switch_mode_on_advance: false,
            scroll_target: None,
            remeasure: None,
            images: None,
        }
    }

    pub fn direct(key: &'static str, target: TargetId) -> Self {
        Self::new(
            key,
            Derivation::Direct {
                target,
                padding: 0.0,
            },
        )
    }

    pub fn grid(
        key: &'static str,
        container: TargetId,
        reference: TargetId,
        columns: usize,
        gap: f64,
        cells: usize,
        highlight: Range<usize>,
    ) -> Self {
        Self::new(
            key,
            Derivation::GridSlice {
                container,
                reference,
                columns,
                gap,
                cells,
                highlight,
            },
        )
    }

    pub fn fixed(key: &'static str, anchor: StaticAnchor) -> Self {
        Self::new(key, Derivation::Static(anchor))
    }

    pub fn above(mut self) -> Self {
        self.bubble = BubbleSide::Above;
        self
    }

    pub fn below(mut self) -> Self {
        self.bubble = BubbleSide::Below;
        self
    }

    pub fn padded(mut self, padding: f64) -> Self {
        if let Derivation::Direct { padding: p, .. } = &mut self.derivation {
            *p = padding;
        }
        self
    }

    pub fn radius(mut self, radius: f64) -> Self {
        self.corner_radius = radius;
        self
    }

    pub fn require_mode(mut self, mode: &'static str) -> Self {
        self.require_mode = Some(mode);
        self
    }

    pub fn switch_mode_on_advance(mut self) -> Self {
        self.switch_mode_on_advance = true;
        self
    }

    /// Scroll to `offset` when the tour reaches this step, then re-measure `remeasure`.
    pub fn after_scroll(mut self, offset: f64, remeasure: TargetId) -> Self {
        self.scroll_target = Some(offset);
        self.remeasure = Some(remeasure);
        self
    }

    pub fn images(mut self, frames: &[&str], loop_count: u32, frame_interval_ms: u64) -> Self {
        self.images = Some(ImageLoop {
            frames: frames.iter().map(|f| f.to_string()).collect(),
            loop_count,
            frame_interval: Duration::from_millis(frame_interval_ms),
        });
        self
    }
}

/// Place the bubble beside `target`: above with a down arrow, or below with an up arrow.
pub fn place_bubble(
    target: &Rect,
    viewport: Viewport,
    side: BubbleSide,
    bubble_height: f64,
) -> (BubblePosition, Arrow) {
    let side = match side {
        BubbleSide::Auto => {
            let space_above = target.top;
            let space_below = viewport.height - target.bottom();
            if space_below >= space_above {
                BubbleSide::Below
            } else {
                BubbleSide::Above
            }
        }
        explicit => explicit,
    };

    let left = BUBBLE_MARGIN;
    let max_width = (viewport.width - BUBBLE_MARGIN * 2.0).max(0.0);
    let min_offset = ARROW_SIZE * 2.0;
    let max_offset = (max_width - ARROW_SIZE * 2.0).max(min_offset);
    let offset = (target.center_x() - left).clamp(min_offset, max_offset);

    match side {
        BubbleSide::Above => (
            BubblePosition {
                top: (target.top - ARROW_SIZE - BUBBLE_GAP - bubble_height).max(BUBBLE_MARGIN),
                left,
                max_width,
            },
            Arrow {
                direction: ArrowDirection::Down,
                offset,
            },
        ),
        _ => (
            BubblePosition {
                top: target.bottom() + ARROW_SIZE + BUBBLE_GAP,
                left,
                max_width,
            },
            Arrow {
                direction: ArrowDirection::Up,
                offset,
            },
        ),
    }
}

fn bubble_height(with_images: bool) -> f64 {
    if with_images {
        BUBBLE_ESTIMATED_HEIGHT + BUBBLE_IMAGE_HEIGHT
    } else {
        BUBBLE_ESTIMATED_HEIGHT
    }
}

/// Move an already built step onto a freshly measured `rect`, keeping its corner radius and the
/// side its bubble was placed on.
pub fn retarget(step: &mut StepDescriptor, rect: Rect, viewport: Viewport) {
    let radius = step.target_area.map(|r| r.corner_radius).unwrap_or(0.0);
    let target = rect.with_corner_radius(radius);
    let side = match step.arrow.map(|a| a.direction) {
        Some(ArrowDirection::Down) => BubbleSide::Above,
        Some(ArrowDirection::Up) => BubbleSide::Below,
        None => BubbleSide::Auto,
    };
    let (bubble, arrow) = place_bubble(
        &target,
        viewport,
        side,
        bubble_height(step.images.is_some()),
    );
    step.target_area = Some(target);
    step.bubble = bubble;
    step.arrow = Some(arrow);
}

pub struct StepBuilder {
    measurer: TargetMeasurer,
    translator: Arc<dyn Translator>,
    settle_delay: Duration,
}

impl StepBuilder {
    pub fn new(
        measurer: TargetMeasurer,
        translator: Arc<dyn Translator>,
        settle_delay: Duration,
    ) -> Self {
        Self {
            measurer,
            translator,
            settle_delay,
        }
    }

    pub fn measurer(&self) -> &TargetMeasurer {
        &self.measurer
    }

    /// Build the step list for `host` from `table`, in table order.
    ///
    /// Steps whose measurement fails are omitted. Returns `None` when cancelled; partial results
    /// are discarded.
    pub async fn build(
        &self,
        host: &dyn ScreenHost,
        table: &[StepSpec],
        cancel: &CancellationToken,
    ) -> Option<Vec<StepDescriptor>> {
        if !settle(self.settle_delay, cancel).await {
            return None;
        }

        let viewport = host.viewport();
        let mut measured: HashMap<TargetId, Option<Rect>> = HashMap::new();
        let mut steps = Vec::with_capacity(table.len());

        for spec in table {
            if cancel.is_cancelled() {
                return None;
            }

            let Some((target, extra)) = self
                .derive_areas(host, spec, viewport, &mut measured, cancel)
                .await
            else {
                info!(
                    "[PHASE: tour] [STEP: build] Omitting step without a measurable target (screen={}, step={})",
                    host.screen(),
                    spec.key
                );
                continue;
            };

            steps.push(self.describe(spec, target, extra, viewport));
        }

        if cancel.is_cancelled() {
            return None;
        }
        debug!(
            "[PHASE: tour] [STEP: build] Built {} of {} steps (screen={})",
            steps.len(),
            table.len(),
            host.screen()
        );
        Some(steps)
    }

    async fn derive_areas(
        &self,
        host: &dyn ScreenHost,
        spec: &StepSpec,
        viewport: Viewport,
        measured: &mut HashMap<TargetId, Option<Rect>>,
        cancel: &CancellationToken,
    ) -> Option<(Rect, Vec<Rect>)> {
        let radius = spec.corner_radius;
        match &spec.derivation {
            Derivation::Direct { target, padding } => {
                let rect = self.measure_once(host, *target, measured, cancel).await?;
                Some((rect.inflate(*padding).with_corner_radius(radius), Vec::new()))
            }
            Derivation::GridSlice {
                container,
                reference,
                columns,
                gap,
                cells,
                highlight,
            } => {
                let container = self.measure_once(host, *container, measured, cancel).await?;
                let reference = self.measure_once(host, *reference, measured, cancel).await?;
                let grid = derive_grid(container, reference, *columns, *gap, *cells);
                let Some(slice) = grid.get(highlight.clone()) else {
                    warn!(
                        "[PHASE: tour] [STEP: build] Highlight range {:?} outside a {}-cell grid (step={})",
                        highlight, cells, spec.key
                    );
                    return None;
                };
                let mut rects = slice.iter().map(|r| r.with_corner_radius(radius));
                let first = rects.next()?;
                Some((first, rects.collect()))
            }
            Derivation::Static(anchor) => {
                let rect = Rect::new(
                    anchor.top,
                    anchor.horizontal_margin,
                    (viewport.width - anchor.horizontal_margin * 2.0).max(0.0),
                    anchor.height,
                )
                .with_corner_radius(radius);
                Some((rect, Vec::new()))
            }
        }
    }

    async fn measure_once(
        &self,
        host: &dyn ScreenHost,
        id: TargetId,
        measured: &mut HashMap<TargetId, Option<Rect>>,
        cancel: &CancellationToken,
    ) -> Option<Rect> {
        if let Some(cached) = measured.get(&id) {
            return *cached;
        }
        let rect = self.measurer.measure_target(host, id, cancel).await;
        // A cancelled measurement must not poison the cache as a failure.
        if !cancel.is_cancelled() {
            measured.insert(id, rect);
        }
        rect
    }

    fn describe(
        &self,
        spec: &StepSpec,
        target: Rect,
        extra: Vec<Rect>,
        viewport: Viewport,
    ) -> StepDescriptor {
        let title = self.text(spec.key, "title");
        let body = self.text(spec.key, "body");
        let (bubble, arrow) = place_bubble(
            &target,
            viewport,
            spec.bubble,
            bubble_height(spec.images.is_some()),
        );

        StepDescriptor {
            key: spec.key,
            target_area: Some(target),
            extra_highlights: extra,
            bubble,
            arrow: Some(arrow),
            title,
            body,
            images: spec.images.clone(),
            require_mode: spec.require_mode.map(ModeTag::from),
            switch_mode_on_advance: spec.switch_mode_on_advance,
            scroll_target: spec.scroll_target,
            remeasure: spec.remeasure,
        }
    }

    fn text(&self, key: &str, part: &str) -> String {
        let full_key = format!("{}.{}", key, part);
        match self.translator.lookup(&full_key) {
            Some(s) => s,
            None => {
                warn!(
                    "[PHASE: tour] [STEP: build] Missing translation (key={})",
                    full_key
                );
                String::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::WindowRect;
    use crate::host::MeasurableTarget;
    use crate::models::screen::Screen;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU32, Ordering};

    struct FixedTarget {
        rect: WindowRect,
        calls: AtomicU32,
    }

    #[async_trait]
    impl MeasurableTarget for FixedTarget {
        async fn measure_in_window(&self) -> WindowRect {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.rect
        }
    }

    struct TableHost {
        targets: HashMap<TargetId, Arc<FixedTarget>>,
    }

    impl TableHost {
        fn new(entries: &[(TargetId, WindowRect)]) -> Self {
            Self {
                targets: entries
                    .iter()
                    .map(|(id, rect)| {
                        (
                            *id,
                            Arc::new(FixedTarget {
                                rect: *rect,
                                calls: AtomicU32::new(0),
                            }),
                        )
                    })
                    .collect(),
            }
        }

        fn calls(&self, id: TargetId) -> u32 {
            self.targets[&id].calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ScreenHost for TableHost {
        fn screen(&self) -> Screen {
            Screen::Home
        }

        fn viewport(&self) -> Viewport {
            Viewport::new(390.0, 844.0)
        }

        fn target(&self, id: TargetId) -> Option<Arc<dyn MeasurableTarget>> {
            self.targets
                .get(&id)
                .map(|t| Arc::clone(t) as Arc<dyn MeasurableTarget>)
        }

        fn current_mode(&self) -> Option<ModeTag> {
            None
        }

        async fn switch_mode(&self) {}

        fn scroll_to(&self, _offset: f64) {}
    }

    fn translations(keys: &[&str]) -> Arc<dyn Translator> {
        let mut map = HashMap::new();
        for key in keys {
            map.insert(format!("{key}.title"), format!("{key} title"));
            map.insert(format!("{key}.body"), format!("{key} body"));
        }
        Arc::new(map)
    }

    fn builder(keys: &[&str]) -> StepBuilder {
        StepBuilder::new(
            TargetMeasurer::new(Duration::from_millis(300), 0.0, 3),
            translations(keys),
            Duration::from_millis(500),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn failed_measurement_drops_only_that_step() {
        let host = TableHost::new(&[
            (TargetId::DailySummary, WindowRect::new(16.0, 100.0, 358.0, 120.0)),
            // Never settles.
            (TargetId::AddMealButton, WindowRect::ZERO),
            (TargetId::GoalsCard, WindowRect::new(16.0, 300.0, 358.0, 90.0)),
            (TargetId::ScanQuota, WindowRect::new(16.0, 420.0, 358.0, 40.0)),
        ]);
        let table = vec![
            StepSpec::direct("s1", TargetId::DailySummary),
            StepSpec::direct("s2", TargetId::AddMealButton),
            StepSpec::direct("s3", TargetId::GoalsCard),
            StepSpec::direct("s4", TargetId::ScanQuota),
        ];

        let steps = builder(&["s1", "s2", "s3", "s4"])
            .build(&host, &table, &CancellationToken::new())
            .await
            .expect("not cancelled");

        let keys: Vec<_> = steps.iter().map(|s| s.key).collect();
        assert_eq!(keys, vec!["s1", "s3", "s4"]);
        assert_eq!(host.calls(TargetId::AddMealButton), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn build_waits_for_layout_to_settle_first() {
        let host = TableHost::new(&[(
            TargetId::DailySummary,
            WindowRect::new(16.0, 100.0, 358.0, 120.0),
        )]);
        let started = tokio::time::Instant::now();

        builder(&["s1"])
            .build(
                &host,
                &[StepSpec::direct("s1", TargetId::DailySummary)],
                &CancellationToken::new(),
            )
            .await
            .expect("not cancelled");

        assert_eq!(started.elapsed(), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn grid_slices_share_one_measurement() {
        let host = TableHost::new(&[
            (TargetId::MacroGrid, WindowRect::new(16.0, 300.0, 358.0, 252.0)),
            (TargetId::MacroCard, WindowRect::new(16.0, 300.0, 173.0, 120.0)),
        ]);
        let table = vec![
            StepSpec::grid("top", TargetId::MacroGrid, TargetId::MacroCard, 2, 12.0, 4, 0..2)
                .radius(12.0),
            StepSpec::grid("bottom", TargetId::MacroGrid, TargetId::MacroCard, 2, 12.0, 4, 2..4),
        ];

        let steps = builder(&["top", "bottom"])
            .build(&host, &table, &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert_eq!(steps.len(), 2);
        let top = &steps[0];
        let first = top.target_area.expect("target");
        assert_eq!(first.width, 173.0);
        assert_eq!(first.corner_radius, 12.0);
        assert_eq!(top.extra_highlights.len(), 1);
        assert_eq!(top.extra_highlights[0].left, 16.0 + 173.0 + 12.0);

        let bottom = steps[1].target_area.expect("target");
        assert_eq!(bottom.top, 300.0 + 120.0 + 12.0);

        assert_eq!(host.calls(TargetId::MacroGrid), 1);
        assert_eq!(host.calls(TargetId::MacroCard), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn static_steps_need_no_targets() {
        let host = TableHost::new(&[]);
        let table = vec![StepSpec::fixed(
            "list",
            StaticAnchor {
                top: 140.0,
                height: 320.0,
                horizontal_margin: 16.0,
            },
        )
        .after_scroll(420.0, TargetId::MealList)];

        let steps = builder(&["list"])
            .build(&host, &table, &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].target_area, Some(Rect::new(140.0, 16.0, 358.0, 320.0)));
        assert_eq!(steps[0].scroll_target, Some(420.0));
        assert_eq!(steps[0].remeasure, Some(TargetId::MealList));
    }

    #[tokio::test(start_paused = true)]
    async fn mode_gated_steps_are_built_regardless_of_mode() {
        let host = TableHost::new(&[(
            TargetId::CaptureButton,
            WindowRect::new(155.0, 700.0, 80.0, 80.0),
        )]);
        let table = vec![StepSpec::direct("capture", TargetId::CaptureButton).require_mode("barcode")];

        let steps = builder(&["capture"])
            .build(&host, &table, &CancellationToken::new())
            .await
            .expect("not cancelled");

        assert_eq!(steps.len(), 1);
        assert_eq!(steps[0].require_mode, Some(ModeTag::from("barcode")));
    }

    #[tokio::test(start_paused = true)]
    async fn missing_translation_leaves_content_invalid() {
        let host = TableHost::new(&[(
            TargetId::DailySummary,
            WindowRect::new(16.0, 100.0, 358.0, 120.0),
        )]);

        let steps = builder(&[])
            .build(
                &host,
                &[StepSpec::direct("s1", TargetId::DailySummary)],
                &CancellationToken::new(),
            )
            .await
            .expect("not cancelled");

        assert_eq!(steps.len(), 1);
        assert!(!steps[0].has_valid_content());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_build_discards_results() {
        let host = TableHost::new(&[(
            TargetId::DailySummary,
            WindowRect::new(16.0, 100.0, 358.0, 120.0),
        )]);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let steps = builder(&["s1"])
            .build(&host, &[StepSpec::direct("s1", TargetId::DailySummary)], &cancel)
            .await;

        assert!(steps.is_none());
        assert_eq!(host.calls(TargetId::DailySummary), 0);
    }

    #[test]
    fn bubble_goes_below_targets_near_the_top() {
        let target = Rect::new(100.0, 16.0, 358.0, 120.0);
        let (bubble, arrow) =
            place_bubble(&target, Viewport::new(390.0, 844.0), BubbleSide::Auto, 150.0);

        assert_eq!(arrow.direction, ArrowDirection::Up);
        assert_eq!(bubble.top, 220.0 + ARROW_SIZE + BUBBLE_GAP);
        assert_eq!(bubble.max_width, 358.0);
        assert_eq!(arrow.offset, target.center_x() - BUBBLE_MARGIN);
    }

    #[test]
    fn bubble_goes_above_targets_near_the_bottom() {
        let target = Rect::new(700.0, 155.0, 80.0, 80.0);
        let (bubble, arrow) =
            place_bubble(&target, Viewport::new(390.0, 844.0), BubbleSide::Auto, 150.0);

        assert_eq!(arrow.direction, ArrowDirection::Down);
        assert_eq!(bubble.top, 700.0 - ARROW_SIZE - BUBBLE_GAP - 150.0);
    }

    #[tokio::test(start_paused = true)]
    async fn retarget_keeps_radius_and_bubble_side() {
        let host = TableHost::new(&[]);
        let anchor = StaticAnchor {
            top: 140.0,
            height: 320.0,
            horizontal_margin: 16.0,
        };
        let mut steps = builder(&["list"])
            .build(&host, &[StepSpec::fixed("list", anchor).radius(16.0)], &CancellationToken::new())
            .await
            .expect("not cancelled");
        let step = &mut steps[0];
        assert_eq!(step.arrow.map(|a| a.direction), Some(ArrowDirection::Up));

        retarget(step, Rect::new(155.0, 16.0, 358.0, 600.0), Viewport::new(390.0, 844.0));

        let area = step.target_area.expect("target");
        assert_eq!(area.top, 155.0);
        assert_eq!(area.corner_radius, 16.0);
        assert_eq!(step.arrow.map(|a| a.direction), Some(ArrowDirection::Up));
        assert_eq!(step.bubble.top, 755.0 + ARROW_SIZE + BUBBLE_GAP);
    }

    #[test]
    fn arrow_offset_stays_inside_the_bubble() {
        let target = Rect::new(100.0, 360.0, 20.0, 20.0);
        let (bubble, arrow) =
            place_bubble(&target, Viewport::new(390.0, 844.0), BubbleSide::Below, 150.0);
        assert!(arrow.offset <= bubble.max_width - ARROW_SIZE * 2.0);

        let target = Rect::new(100.0, 0.0, 4.0, 20.0);
        let (_, arrow) =
            place_bubble(&target, Viewport::new(390.0, 844.0), BubbleSide::Below, 150.0);
        assert_eq!(arrow.offset, ARROW_SIZE * 2.0);
    }
}
