//! Demand accounting.
//!
//! Demand is a saturating, never-negative counter owned by the producer side
//! of a subscription. [`UNBOUNDED`] means the consumer opted out of
//! accounting: once reached it is sticky and emission never decrements it.

use crate::error::FlowError;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::warn;

/// Sentinel for "no further accounting needed".
pub const UNBOUNDED: u64 = u64::MAX;

/// Add two demand amounts, saturating at [`UNBOUNDED`].
pub fn add_cap(a: u64, b: u64) -> u64 {
    a.saturating_add(b)
}

/// Check that a request amount is positive.
pub fn validate(n: u64) -> Result<u64, FlowError> {
    if n == 0 {
        warn!(requested = n, "non-positive request rejected");
        Err(FlowError::InvalidRequest(n))
    } else {
        Ok(n)
    }
}

/// Outstanding demand for one subscription.
///
/// Safe under one emitting caller plus any number of concurrent requesters.
#[derive(Debug, Default)]
pub struct Demand {
    requested: AtomicU64,
}

impl Demand {
    /// Create a counter with no outstanding demand.
    pub const fn new() -> Self {
        Self {
            requested: AtomicU64::new(0),
        }
    }

    /// Current outstanding demand.
    pub fn get(&self) -> u64 {
        self.requested.load(Ordering::Acquire)
    }

    /// Whether demand reached [`UNBOUNDED`], after which accounting stops.
    pub fn is_unbounded(&self) -> bool {
        self.get() == UNBOUNDED
    }

    /// Grant `n` more units. Returns the demand before the grant.
    pub fn add(&self, n: u64) -> u64 {
        self.requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == UNBOUNDED {
                    None
                } else {
                    Some(add_cap(current, n))
                }
            })
            .unwrap_or_else(|previous| previous)
    }

    /// Account for `n` emitted values. Returns the remaining demand.
    pub fn produced(&self, n: u64) -> u64 {
        if n == 0 {
            return self.get();
        }

        let result = self
            .requested
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                if current == UNBOUNDED {
                    None
                } else {
                    Some(current.saturating_sub(n))
                }
            });

        match result {
            Ok(previous) => {
                if previous < n {
                    warn!(
                        requested = previous,
                        produced = n,
                        "more values produced than requested"
                    );
                }
                previous.saturating_sub(n)
            }
            Err(_) => UNBOUNDED,
        }
    }
}
