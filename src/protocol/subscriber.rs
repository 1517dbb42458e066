//! Event delivery interfaces.

use super::subscription::{EmptySubscription, SubscriptionHandle};
use crate::error::FlowError;
use tracing::debug;

/// Receives the signals of one subscription.
///
/// A conforming producer calls these methods serially: `on_subscribe` once,
/// then `on_next` at most as many times as demand was granted, then at most
/// one of `on_error` / `on_complete`.
pub trait Subscriber<T>: Send {
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>);

    fn on_next(&mut self, value: T);

    fn on_error(&mut self, error: FlowError);

    fn on_complete(&mut self);

    /// Drain-needed notification for an `Async` fused subscription.
    fn on_available(&mut self) {}

    /// Whether [`try_on_next`](Self::try_on_next) can reject values.
    ///
    /// Producers query this once at subscribe time and cache the answer.
    fn is_conditional(&self) -> bool {
        false
    }

    /// Deliver a value and report whether it was accepted.
    ///
    /// A rejected value does not consume a unit of demand, so the producer
    /// may immediately supply a replacement. Rejection is never an error.
    fn try_on_next(&mut self, value: T) -> bool {
        self.on_next(value);
        true
    }
}

impl<T, S> Subscriber<T> for Box<S>
where
    S: Subscriber<T> + ?Sized,
{
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        (**self).on_subscribe(subscription)
    }

    fn on_next(&mut self, value: T) {
        (**self).on_next(value)
    }

    fn on_error(&mut self, error: FlowError) {
        (**self).on_error(error)
    }

    fn on_complete(&mut self) {
        (**self).on_complete()
    }

    fn on_available(&mut self) {
        (**self).on_available()
    }

    fn is_conditional(&self) -> bool {
        (**self).is_conditional()
    }

    fn try_on_next(&mut self, value: T) -> bool {
        (**self).try_on_next(value)
    }
}

/// Something that can be subscribed to.
pub trait Publisher<T> {
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T> + 'static;
}

/// Terminate a subscriber that was never given a live subscription.
pub fn reject<T, S>(subscriber: &mut S, error: FlowError)
where
    S: Subscriber<T> + ?Sized,
{
    subscriber.on_subscribe(SubscriptionHandle::plain(EmptySubscription));
    subscriber.on_error(error);
}

pub(crate) fn next_dropped() {
    debug!("on_next dropped after termination");
}

pub(crate) fn error_dropped(error: &FlowError) {
    debug!(%error, "on_error dropped after termination");
}

pub(crate) fn complete_dropped() {
    debug!("on_complete dropped after termination");
}
