//! Producers that originate values.

mod emitter;
mod iter;

pub use emitter::{channel, ChannelConfig, ChannelSource, EmitError, Emitter};
pub use iter::{from_iter, range, try_range, IterSource};
