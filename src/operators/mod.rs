//! Stages that sit between a producer and a consumer.
//!
//! Each operator subscribes upstream with its own subscriber and hands its
//! downstream a subscription that forwards demand and cancellation.

mod handle;
mod sink;
mod skip_while;

pub use handle::{Handle, HandleSubscriber};
pub use sink::SynchronousSink;
pub use skip_while::{SkipWhile, SkipWhileSubscriber};

use crate::error::BoxError;
use crate::protocol::Publisher;

/// Fluent operator constructors for any publisher.
pub trait PublisherExt<T>: Publisher<T> + Sized {
    /// Transform, filter or terminate per element through a sink.
    fn handle<R, F>(self, handler: F) -> Handle<Self, F, T, R>
    where
        F: Fn(T, &mut SynchronousSink<R>) -> Result<(), BoxError> + Send + Sync + 'static,
    {
        Handle::new(self, handler)
    }

    /// Drop elements while `predicate` holds.
    fn skip_while<F>(self, predicate: F) -> SkipWhile<Self, F, T>
    where
        F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
    {
        SkipWhile::new(self, predicate)
    }
}

impl<T, P: Publisher<T>> PublisherExt<T> for P {}
