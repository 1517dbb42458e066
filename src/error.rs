//! Error types for stream signalling.

use std::error::Error as StdError;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use thiserror::Error;

/// Error type returned by user callbacks (predicates, handlers).
pub type BoxError = Box<dyn StdError + Send + Sync + 'static>;

/// Opaque failure cause. Stored and forwarded, never inspected.
pub type Cause = Arc<dyn StdError + Send + Sync + 'static>;

/// Terminal error carried by `on_error`.
#[derive(Debug, Clone, Error)]
pub enum FlowError {
    #[error("Request amount must be positive, got {0}")]
    InvalidRequest(u64),

    #[error("Subscription already set")]
    DuplicateSubscription,

    #[error("Publisher allows only a single subscriber")]
    AlreadySubscribed,

    #[error("Sink next called more than once for a single element")]
    MultipleEmission,

    /// The last element of a range does not fit in `i64`.
    #[error("Range overflows i64: start {start}, count {count}")]
    RangeOverflow { start: i64, count: u64 },

    /// A user callback returned an error.
    #[error("{0}")]
    Callback(Cause),

    /// An error explicitly emitted through a sink or emitter.
    #[error("{0}")]
    Signalled(Cause),
}

impl FlowError {
    /// Wrap the failure of a user callback.
    pub fn callback(err: BoxError) -> Self {
        FlowError::Callback(Arc::from(err))
    }

    /// Wrap an explicitly emitted failure.
    pub fn signalled(err: impl Into<BoxError>) -> Self {
        FlowError::Signalled(Arc::from(err.into()))
    }

    /// The wrapped cause, if this error carries one.
    pub fn cause(&self) -> Option<&Cause> {
        match self {
            FlowError::Callback(cause) | FlowError::Signalled(cause) => Some(cause),
            _ => None,
        }
    }

    /// Whether this error reports a misuse of the protocol itself.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            FlowError::InvalidRequest(_)
                | FlowError::DuplicateSubscription
                | FlowError::AlreadySubscribed
                | FlowError::MultipleEmission
        )
    }

    fn cause_addr(cause: &Cause) -> usize {
        Arc::as_ptr(cause) as *const () as usize
    }
}

// Causes compare by identity: the same failure forwarded twice is equal,
// two failures with the same message are not.
impl PartialEq for FlowError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (FlowError::InvalidRequest(a), FlowError::InvalidRequest(b)) => a == b,
            (
                FlowError::RangeOverflow { start, count },
                FlowError::RangeOverflow {
                    start: other_start,
                    count: other_count,
                },
            ) => start == other_start && count == other_count,
            (FlowError::DuplicateSubscription, FlowError::DuplicateSubscription)
            | (FlowError::AlreadySubscribed, FlowError::AlreadySubscribed)
            | (FlowError::MultipleEmission, FlowError::MultipleEmission) => true,
            (FlowError::Callback(a), FlowError::Callback(b))
            | (FlowError::Signalled(a), FlowError::Signalled(b)) => {
                Self::cause_addr(a) == Self::cause_addr(b)
            }
            _ => false,
        }
    }
}

impl Eq for FlowError {}

impl Hash for FlowError {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            FlowError::InvalidRequest(n) => n.hash(state),
            FlowError::RangeOverflow { start, count } => {
                start.hash(state);
                count.hash(state);
            }
            FlowError::Callback(cause) | FlowError::Signalled(cause) => {
                Self::cause_addr(cause).hash(state)
            }
            _ => {}
        }
    }
}

/// Result type for fused polling and other fallible protocol calls.
pub type Result<T> = std::result::Result<T, FlowError>;
