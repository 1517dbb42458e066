//! Materialized stream events.
//!
//! A [`Signal`] records exactly one of the four lifecycle events a subscriber
//! can observe. The possible order for one subscription is:
//! `on_subscribe on_next* (on_error | on_complete)?`.

use crate::error::FlowError;
use crate::protocol::{Subscriber, SubscriptionHandle};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::hash::{Hash, Hasher};

/// Discriminant of a [`Signal`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalType {
    OnSubscribe,
    OnNext,
    OnError,
    OnComplete,
}

impl fmt::Display for SignalType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SignalType::OnSubscribe => "onSubscribe",
            SignalType::OnNext => "onNext",
            SignalType::OnError => "onError",
            SignalType::OnComplete => "onComplete",
        };
        f.write_str(name)
    }
}

/// One lifecycle event. Immutable once built.
#[derive(Clone, Debug)]
pub enum Signal<T> {
    OnSubscribe(SubscriptionHandle<T>),
    OnNext(T),
    OnError(FlowError),
    OnComplete,
}

impl<T> Signal<T> {
    /// The shared completion signal. Carries no payload.
    pub const COMPLETE: Signal<T> = Signal::OnComplete;

    pub fn next(value: T) -> Self {
        Signal::OnNext(value)
    }

    pub fn error(error: FlowError) -> Self {
        Signal::OnError(error)
    }

    pub const fn complete() -> Self {
        Signal::OnComplete
    }

    pub fn subscribe(subscription: SubscriptionHandle<T>) -> Self {
        Signal::OnSubscribe(subscription)
    }

    pub fn signal_type(&self) -> SignalType {
        match self {
            Signal::OnSubscribe(_) => SignalType::OnSubscribe,
            Signal::OnNext(_) => SignalType::OnNext,
            Signal::OnError(_) => SignalType::OnError,
            Signal::OnComplete => SignalType::OnComplete,
        }
    }

    pub fn is_on_subscribe(&self) -> bool {
        matches!(self, Signal::OnSubscribe(_))
    }

    pub fn is_on_next(&self) -> bool {
        matches!(self, Signal::OnNext(_))
    }

    pub fn is_on_error(&self) -> bool {
        matches!(self, Signal::OnError(_))
    }

    pub fn is_on_complete(&self) -> bool {
        matches!(self, Signal::OnComplete)
    }

    /// Whether this is an `on_error` or `on_complete`.
    pub fn is_terminal(&self) -> bool {
        self.is_on_error() || self.is_on_complete()
    }

    /// True only for `OnNext`. Values cannot be absent, so this matches
    /// [`is_on_next`](Self::is_on_next).
    pub fn has_value(&self) -> bool {
        self.is_on_next()
    }

    /// True only for `OnError`, which always carries its cause.
    pub fn has_error(&self) -> bool {
        self.is_on_error()
    }

    pub fn value(&self) -> Option<&T> {
        match self {
            Signal::OnNext(value) => Some(value),
            _ => None,
        }
    }

    pub fn into_value(self) -> Option<T> {
        match self {
            Signal::OnNext(value) => Some(value),
            _ => None,
        }
    }

    pub fn error_ref(&self) -> Option<&FlowError> {
        match self {
            Signal::OnError(error) => Some(error),
            _ => None,
        }
    }

    pub fn subscription(&self) -> Option<&SubscriptionHandle<T>> {
        match self {
            Signal::OnSubscribe(subscription) => Some(subscription),
            _ => None,
        }
    }

    /// Deliver this event to `subscriber`.
    ///
    /// Every call delivers once more; callers are responsible for keeping the
    /// resulting sequence protocol-conformant.
    pub fn replay<S>(&self, subscriber: &mut S)
    where
        T: Clone,
        S: Subscriber<T> + ?Sized,
    {
        match self {
            Signal::OnSubscribe(subscription) => subscriber.on_subscribe(subscription.clone()),
            Signal::OnNext(value) => subscriber.on_next(value.clone()),
            Signal::OnError(error) => subscriber.on_error(error.clone()),
            Signal::OnComplete => subscriber.on_complete(),
        }
    }
}

impl<T: PartialEq> PartialEq for Signal<T> {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Signal::OnSubscribe(a), Signal::OnSubscribe(b)) => a == b,
            (Signal::OnNext(a), Signal::OnNext(b)) => a == b,
            (Signal::OnError(a), Signal::OnError(b)) => a == b,
            (Signal::OnComplete, Signal::OnComplete) => true,
            _ => false,
        }
    }
}

impl<T: Eq> Eq for Signal<T> {}

impl<T: Hash> Hash for Signal<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signal_type().hash(state);
        match self {
            Signal::OnSubscribe(subscription) => subscription.hash(state),
            Signal::OnNext(value) => value.hash(state),
            Signal::OnError(error) => error.hash(state),
            Signal::OnComplete => {}
        }
    }
}

impl<T: fmt::Debug> fmt::Display for Signal<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::OnSubscribe(subscription) => write!(f, "onSubscribe({:?})", subscription),
            Signal::OnNext(value) => write!(f, "onNext({:?})", value),
            Signal::OnError(error) => write!(f, "onError({})", error),
            Signal::OnComplete => f.write_str("onComplete()"),
        }
    }
}
