//! Operator fusion.
//!
//! Fusion lets a consumer pull values straight out of its producer instead of
//! paying for a request/emit round trip per element. It is negotiated once
//! per subscription, from inside `on_subscribe`, and never changes the
//! observable order of values or the single-terminal guarantee.
//!
//! - [`FusionMode::Sync`]: every value is ready. `poll` returns `Ok(None)`
//!   only when the source is exhausted, which stands in for `on_complete`.
//!   No demand accounting happens and the producer never calls `on_next`.
//! - [`FusionMode::Async`]: values arrive over time. The producer calls
//!   [`Subscriber::on_available`](super::Subscriber::on_available) when a
//!   drain is needed. `poll` returning `Ok(None)` only means "nothing yet";
//!   the stream is finished once [`QueueSubscription::is_done`] also holds.
//!
//! In both modes a failure surfaces as `poll` returning `Err`.

use super::subscription::Subscription;
use crate::error::Result;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Outcome (or request) of a fusion negotiation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionMode {
    /// Regular request/emit protocol.
    #[default]
    None,
    /// Synchronous draining via `poll`.
    Sync,
    /// Asynchronous draining via `poll` after `on_available`.
    Async,
    /// Request-only: accept whichever of `Sync` or `Async` the producer offers.
    Any,
}

impl FusionMode {
    /// Producer-side negotiation: pick the mode to grant for this request.
    ///
    /// `Sync` wins when both are possible. Anything the producer cannot honor
    /// downgrades to `None`, which is never an error.
    pub fn negotiate(self, supports_sync: bool, supports_async: bool) -> FusionMode {
        let granted = match self {
            FusionMode::Sync | FusionMode::Any if supports_sync => FusionMode::Sync,
            FusionMode::Async | FusionMode::Any if supports_async => FusionMode::Async,
            _ => FusionMode::None,
        };
        debug!(requested = ?self, granted = ?granted, "fusion negotiated");
        granted
    }

    /// Whether values bypass request/emit under this mode.
    pub fn is_fused(self) -> bool {
        matches!(self, FusionMode::Sync | FusionMode::Async)
    }
}

/// A subscription that can additionally be drained like a queue.
pub trait QueueSubscription<T>: Subscription {
    /// Negotiate the fusion mode. Only the first call has an effect; later
    /// calls return the mode granted first.
    fn request_fusion(&self, requested: FusionMode) -> FusionMode;

    /// Take the next value without blocking.
    fn poll(&self) -> Result<Option<T>>;

    /// Whether no value is currently available.
    fn is_empty(&self) -> bool;

    /// Whether the stream has terminated and nothing is left to poll.
    fn is_done(&self) -> bool;

    /// Discard anything buffered.
    fn clear(&self);
}

/// Result of a consumer drain pass.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DrainOutcome {
    /// The source is exhausted; treat as completion.
    Exhausted,
    /// Nothing more right now; wait for the next `on_available`.
    Pending,
}

/// Drain `queue` under the negotiated `mode`, handing every value to
/// `on_value`.
pub fn drain<T, F>(queue: &dyn QueueSubscription<T>, mode: FusionMode, mut on_value: F) -> Result<DrainOutcome>
where
    F: FnMut(T),
{
    loop {
        match queue.poll()? {
            Some(value) => on_value(value),
            None => {
                return Ok(match mode {
                    FusionMode::Async if !queue.is_done() => DrainOutcome::Pending,
                    _ => DrainOutcome::Exhausted,
                })
            }
        }
    }
}
