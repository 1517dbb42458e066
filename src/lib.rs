//! # demandflow
//!
//! Demand-driven push streams with operator fusion.
//!
//! ## Core Concepts
//!
//! - **Signals**: `on_subscribe on_next* (on_error | on_complete)?`, materialized as [`Signal`]
//! - **Demand**: consumers grant `request(n)`; producers never emit past it
//! - **Fusion**: `Sync` or `Async` queue draining negotiated once per subscription
//! - **Conditional subscribers**: `try_on_next` lets filters drop without burning demand
//! - **Operators**: [`operators::Handle`] and [`operators::SkipWhile`]
//!
//! ## Example
//!
//! ```ignore
//! use demandflow::prelude::*;
//!
//! let ts = TestSubscriber::new();
//! range(1, 10)
//!     .skip_while(|v| Ok(*v < 4))
//!     .handle(|v, sink| {
//!         if v % 2 == 0 {
//!             sink.next(v * 10);
//!         }
//!         Ok(())
//!     })
//!     .subscribe(ts.clone());
//!
//! ts.assert_values(&[40, 60, 80, 100]).assert_complete();
//! ```

pub mod demand;
pub mod error;
pub mod operators;
pub mod protocol;
pub mod signal;
pub mod sources;
pub mod testing;

// Re-exports
pub use demand::{Demand, UNBOUNDED};
pub use error::{BoxError, Cause, FlowError, Result};
pub use operators::{PublisherExt, SynchronousSink};
pub use protocol::{
    FusionMode, Publisher, QueueSubscription, Subscriber, Subscription, SubscriptionHandle,
};
pub use signal::{Signal, SignalType};
pub use sources::{channel, from_iter, range, try_range, ChannelConfig, Emitter};

/// Everything needed to build and observe a pipeline.
pub mod prelude {
    pub use crate::error::{BoxError, FlowError};
    pub use crate::operators::{PublisherExt, SynchronousSink};
    pub use crate::protocol::{FusionMode, Publisher, Subscriber, SubscriptionHandle};
    pub use crate::signal::Signal;
    pub use crate::sources::{channel, from_iter, range, try_range, ChannelConfig, Emitter};
    pub use crate::testing::TestSubscriber;
}
