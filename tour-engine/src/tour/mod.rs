// Guided-tour orchestration
//
// Leaf-first: builder (step tables -> descriptors), scroll coordination, the persistence gate,
// the session state machine, and the post-tour hint arrow.

pub mod builder;
pub mod gate;
pub mod hint;
pub mod screens;
pub mod scroll;
pub mod session;

use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Wait `delay` unless `cancel` fires first. Returns `false` when cancelled.
pub(crate) async fn settle(delay: Duration, cancel: &CancellationToken) -> bool {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => false,
        _ = tokio::time::sleep(delay) => true,
    }
}
