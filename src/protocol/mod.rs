//! The publisher/subscriber protocol.
//!
//! A consumer subscribes to a producer and receives a [`SubscriptionHandle`]
//! through `on_subscribe`. It then grants demand with `request(n)`; the
//! producer answers with at most that many `on_next` calls followed by at
//! most one terminal `on_error` or `on_complete`. `cancel` stops delivery.
//!
//! Two optional capabilities ride on top:
//! - **Fusion**: a [`QueueSubscription`] lets the consumer drain values with
//!   `poll` instead of the request/emit round trip.
//! - **Conditional consumption**: [`Subscriber::try_on_next`] reports whether a
//!   value was accepted, so filtering stages do not burn demand on drops.
//!
//! Both are resolved once at subscribe time.

pub mod fusion;
mod subscriber;
mod subscription;

pub use fusion::{drain, DrainOutcome, FusionMode, QueueSubscription};
pub use subscriber::{reject, Publisher, Subscriber};
pub use subscription::{EmptySubscription, Subscription, SubscriptionHandle};

pub(crate) use subscriber::{complete_dropped, error_dropped, next_dropped};
