// Target measurement with bounded retries
//
// Layout settles asynchronously, so a freshly mounted element may report a zero rect. Those
// reads are retried on a fixed interval; running out of retries is a normal outcome (the step
// is simply dropped), never an error.

use log::debug;
use std::time::Duration;
use tokio_retry::strategy::FixedInterval;
use tokio_retry::Retry;
use tokio_util::sync::CancellationToken;

use crate::geometry::Rect;
use crate::host::{MeasurableTarget, ScreenHost};
use crate::models::screen::TargetId;
use crate::settings::TourSettings;

#[derive(Debug, Clone)]
pub struct TargetMeasurer {
    retry_delay: Duration,
    top_inset: f64,
    default_retries: u32,
}

impl TargetMeasurer {
    pub fn new(retry_delay: Duration, top_inset: f64, default_retries: u32) -> Self {
        Self {
            retry_delay,
            top_inset,
            default_retries,
        }
    }

    pub fn from_settings(settings: &TourSettings) -> Self {
        Self::new(
            settings.measure_retry_delay(),
            settings.top_inset,
            settings.measure_retries,
        )
    }

    pub fn default_retries(&self) -> u32 {
        self.default_retries
    }

    /// Query `target` until it reports a non-degenerate rect.
    ///
    /// Makes at most `1 + max_retries` queries. Returns `None` when retries run out or
    /// `cancel` fires.
    pub async fn measure(
        &self,
        target: &dyn MeasurableTarget,
        max_retries: u32,
        cancel: &CancellationToken,
    ) -> Option<Rect> {
        let strategy = FixedInterval::new(self.retry_delay).take(max_retries as usize);
        let attempt = || async move {
            let raw = target.measure_in_window().await;
            if raw.is_degenerate() {
                Err(())
            } else {
                Ok(raw)
            }
        };

        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = Retry::spawn(strategy, attempt) => match result {
                Ok(raw) => Some(Rect::from_window(raw, self.top_inset)),
                Err(()) => None,
            },
        }
    }

    /// Measure a named target on `host`. An unmounted target counts as a failed measurement.
    pub async fn measure_target(
        &self,
        host: &dyn ScreenHost,
        id: TargetId,
        cancel: &CancellationToken,
    ) -> Option<Rect> {
        let Some(target) = host.target(id) else {
            debug!(
                "[PHASE: tour] [STEP: measure] Target not mounted (screen={}, target={})",
                host.screen(),
                id
            );
            return None;
        };

        let rect = self
            .measure(target.as_ref(), self.default_retries, cancel)
            .await;
        if rect.is_none() {
            debug!(
                "[PHASE: tour] [STEP: measure] No settled layout after {} retries (screen={}, target={})",
                self.default_retries,
                host.screen(),
                id
            );
        }
        rect
    }
}
