//! Demand and cancellation handles exposed by producers.

use super::fusion::{FusionMode, QueueSubscription};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

/// The consumer-facing control surface of a producer.
///
/// Both methods may be called concurrently with emission and with each
/// other, from any thread.
pub trait Subscription: Send + Sync {
    /// Grant `n` more units of demand. Zero is a protocol violation and is
    /// answered with a terminal `on_error`.
    fn request(&self, n: u64);

    /// Stop delivery. Idempotent.
    fn cancel(&self);
}

/// Subscription handed to `on_subscribe`, tagged with its capability.
pub enum SubscriptionHandle<T> {
    /// Supports only request/cancel.
    Plain(Arc<dyn Subscription>),
    /// Additionally supports fusion negotiation and polling.
    Fuseable(Arc<dyn QueueSubscription<T>>),
}

impl<T> SubscriptionHandle<T> {
    /// Wrap a plain subscription.
    pub fn plain<S: Subscription + 'static>(subscription: S) -> Self {
        SubscriptionHandle::Plain(Arc::new(subscription))
    }

    pub fn request(&self, n: u64) {
        match self {
            SubscriptionHandle::Plain(s) => s.request(n),
            SubscriptionHandle::Fuseable(q) => q.request(n),
        }
    }

    pub fn cancel(&self) {
        match self {
            SubscriptionHandle::Plain(s) => s.cancel(),
            SubscriptionHandle::Fuseable(q) => q.cancel(),
        }
    }

    /// The queue view, if the producer supports fusion.
    pub fn queue(&self) -> Option<&Arc<dyn QueueSubscription<T>>> {
        match self {
            SubscriptionHandle::Plain(_) => None,
            SubscriptionHandle::Fuseable(q) => Some(q),
        }
    }

    pub fn is_fuseable(&self) -> bool {
        matches!(self, SubscriptionHandle::Fuseable(_))
    }

    /// Negotiate fusion. Plain subscriptions always answer [`FusionMode::None`].
    pub fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        match self {
            SubscriptionHandle::Plain(_) => FusionMode::None,
            SubscriptionHandle::Fuseable(q) => q.request_fusion(requested),
        }
    }

    /// A plain handle controlling the same producer, with fusion masked.
    pub fn hide<U>(&self) -> SubscriptionHandle<U>
    where
        T: 'static,
    {
        match self {
            SubscriptionHandle::Plain(s) => SubscriptionHandle::Plain(Arc::clone(s)),
            SubscriptionHandle::Fuseable(q) => {
                SubscriptionHandle::Plain(Arc::new(Opaque(Arc::clone(q))))
            }
        }
    }

    fn addr(&self) -> usize {
        match self {
            SubscriptionHandle::Plain(s) => Arc::as_ptr(s) as *const () as usize,
            SubscriptionHandle::Fuseable(q) => Arc::as_ptr(q) as *const () as usize,
        }
    }
}

impl<T> Clone for SubscriptionHandle<T> {
    fn clone(&self) -> Self {
        match self {
            SubscriptionHandle::Plain(s) => SubscriptionHandle::Plain(Arc::clone(s)),
            SubscriptionHandle::Fuseable(q) => SubscriptionHandle::Fuseable(Arc::clone(q)),
        }
    }
}

// Handles are equal when they control the same producer instance.
impl<T> PartialEq for SubscriptionHandle<T> {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl<T> Eq for SubscriptionHandle<T> {}

impl<T> Hash for SubscriptionHandle<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl<T> fmt::Debug for SubscriptionHandle<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.is_fuseable() { "Fuseable" } else { "Plain" };
        write!(f, "SubscriptionHandle::{}({:#x})", kind, self.addr())
    }
}

/// Forwards request/cancel to a queue subscription without exposing `poll`.
struct Opaque<T>(Arc<dyn QueueSubscription<T>>);

impl<T> Subscription for Opaque<T> {
    fn request(&self, n: u64) {
        self.0.request(n);
    }

    fn cancel(&self) {
        self.0.cancel();
    }
}

/// A subscription that ignores everything. Handed out before an immediate
/// terminal signal.
#[derive(Clone, Copy, Debug, Default)]
pub struct EmptySubscription;

impl Subscription for EmptySubscription {
    fn request(&self, _n: u64) {}

    fn cancel(&self) {}
}
