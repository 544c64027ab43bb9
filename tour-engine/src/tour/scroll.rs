// Scroll coordination
//
// Hosts offer no reliable "scroll finished" signal, so a scroll resolves after a fixed settle
// wait. Resolution means "probably settled": callers re-measure whatever they care about instead
// of trusting the requested offset, since content above the target may have reflowed.

use log::debug;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use super::settle;
use crate::host::ScreenHost;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollOutcome {
    Settled,
    Cancelled,
}

#[derive(Debug, Clone)]
pub struct ScrollCoordinator {
    settle_delay: Duration,
}

impl ScrollCoordinator {
    pub fn new(settle_delay: Duration) -> Self {
        Self { settle_delay }
    }

    pub async fn scroll_to(
        &self,
        host: &dyn ScreenHost,
        offset: f64,
        cancel: &CancellationToken,
    ) -> ScrollOutcome {
        debug!(
            "[PHASE: tour] [STEP: scroll] Scrolling (screen={}, offset={})",
            host.screen(),
            offset
        );
        host.scroll_to(offset);

        if settle(self.settle_delay, cancel).await {
            ScrollOutcome::Settled
        } else {
            ScrollOutcome::Cancelled
        }
    }
}
