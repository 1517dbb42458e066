//! Hot source fed by an [`Emitter`] handle.
//!
//! Values pushed through the emitter land in a bounded buffer and are
//! delivered as demand allows. The buffer doubles as the fused queue, so a
//! consumer that negotiates `Async` fusion polls it directly.

use crate::demand::{self, Demand};
use crate::error::{BoxError, FlowError, Result};
use crate::protocol::{
    reject, FusionMode, Publisher, QueueSubscription, Subscriber, Subscription,
    SubscriptionHandle,
};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use thiserror::Error;
use tracing::{debug, trace};

/// Configuration for [`channel`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Values buffered before [`Emitter::next`] reports `Full`.
    pub buffer_size: usize,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self { buffer_size: 256 }
    }
}

/// Why [`Emitter::next`] did not accept a value. The value is handed back.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError<T> {
    #[error("Channel buffer is full")]
    Full(T),

    #[error("Channel is closed")]
    Closed(T),
}

impl<T> EmitError<T> {
    pub fn into_inner(self) -> T {
        match self {
            EmitError::Full(value) | EmitError::Closed(value) => value,
        }
    }
}

/// Create a connected emitter/source pair.
pub fn channel<T>(config: ChannelConfig) -> (Emitter<T>, ChannelSource<T>)
where
    T: Send + 'static,
{
    let (sender, receiver) = bounded(config.buffer_size.max(1));
    let shared = Arc::new(Shared {
        receiver,
        demand: Demand::new(),
        wip: AtomicUsize::new(0),
        cancelled: AtomicBool::new(false),
        done: AtomicBool::new(false),
        error: Mutex::new(None),
        violation: Mutex::new(None),
        fusion: OnceLock::new(),
        subscribed: AtomicBool::new(false),
        conditional: AtomicBool::new(false),
        subscriber: Mutex::new(None),
    });
    let emitter = Emitter {
        sender,
        shared: Arc::clone(&shared),
    };
    (emitter, ChannelSource { shared })
}

/// Publisher side of a [`channel`]. Accepts a single subscriber.
pub struct ChannelSource<T> {
    shared: Arc<Shared<T>>,
}

impl<T> Publisher<T> for ChannelSource<T>
where
    T: Send + 'static,
{
    fn subscribe<S>(&self, mut subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        if self.shared.subscribed.swap(true, Ordering::AcqRel) {
            debug!("channel source rejected a second subscriber");
            reject(&mut subscriber, FlowError::AlreadySubscribed);
            return;
        }

        self.shared
            .conditional
            .store(subscriber.is_conditional(), Ordering::Release);
        let handle: SubscriptionHandle<T> = SubscriptionHandle::Fuseable(self.shared.clone());
        subscriber.on_subscribe(handle);

        if self.shared.cancelled.load(Ordering::Acquire) {
            return;
        }
        *self.shared.subscriber.lock() = Some(Box::new(subscriber));
        self.shared.drain();
    }
}

/// Producer side of a [`channel`].
pub struct Emitter<T> {
    sender: Sender<T>,
    shared: Arc<Shared<T>>,
}

impl<T> Clone for Emitter<T> {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
            shared: Arc::clone(&self.shared),
        }
    }
}

impl<T> Emitter<T>
where
    T: Send + 'static,
{
    /// Buffer a value for delivery.
    ///
    /// A value accepted here is always delivered ahead of a terminal set by a
    /// concurrent [`complete`](Self::complete) or [`error`](Self::error).
    pub fn next(&self, value: T) -> std::result::Result<(), EmitError<T>> {
        let sent = {
            let _terminal = self.shared.error.lock();
            if self.shared.done.load(Ordering::Acquire) || self.is_cancelled() {
                return Err(EmitError::Closed(value));
            }
            self.sender.try_send(value)
        };
        match sent {
            Ok(()) => {
                self.shared.drain();
                Ok(())
            }
            Err(TrySendError::Full(value)) => Err(EmitError::Full(value)),
            Err(TrySendError::Disconnected(value)) => Err(EmitError::Closed(value)),
        }
    }

    /// Complete after everything already buffered.
    pub fn complete(&self) {
        {
            let _terminal = self.shared.error.lock();
            if self.shared.done.swap(true, Ordering::AcqRel) {
                return;
            }
        }
        trace!("channel completed");
        self.shared.drain();
    }

    /// Fail after everything already buffered.
    pub fn error(&self, cause: impl Into<BoxError>) {
        let error = FlowError::signalled(cause);
        {
            let mut slot = self.shared.error.lock();
            if self.shared.done.load(Ordering::Acquire) {
                debug!(%error, "channel already terminated, error dropped");
                return;
            }
            *slot = Some(error);
            self.shared.done.store(true, Ordering::Release);
        }
        self.shared.drain();
    }

    /// Whether the subscriber cancelled.
    pub fn is_cancelled(&self) -> bool {
        self.shared.cancelled.load(Ordering::Acquire)
    }

    /// Outstanding demand from the subscriber.
    pub fn requested(&self) -> u64 {
        self.shared.demand.get()
    }
}

struct Shared<T> {
    receiver: Receiver<T>,
    demand: Demand,
    wip: AtomicUsize,
    cancelled: AtomicBool,
    /// No more values will be buffered.
    done: AtomicBool,
    /// Held while buffering a value and while setting `done`, so an accepted
    /// value is always in the buffer before the terminal becomes visible.
    error: Mutex<Option<FlowError>>,
    violation: Mutex<Option<FlowError>>,
    fusion: OnceLock<FusionMode>,
    subscribed: AtomicBool,
    conditional: AtomicBool,
    subscriber: Mutex<Option<Box<dyn Subscriber<T>>>>,
}

impl<T> Shared<T>
where
    T: Send + 'static,
{
    fn mode(&self) -> FusionMode {
        self.fusion.get().copied().unwrap_or_default()
    }

    fn drain(&self) {
        if self.wip.fetch_add(1, Ordering::AcqRel) != 0 {
            return;
        }

        let mut missed = 1;
        loop {
            {
                let mut slot = self.subscriber.lock();
                let finished = match slot.as_mut() {
                    Some(subscriber) if self.mode() == FusionMode::Async => {
                        self.signal_available(&mut **subscriber)
                    }
                    Some(subscriber) => self.emit(&mut **subscriber),
                    None => false,
                };
                if finished {
                    slot.take();
                }
            }

            missed = self.wip.fetch_sub(missed, Ordering::AcqRel) - missed;
            if missed == 0 {
                break;
            }
        }
    }

    fn signal_available(&self, subscriber: &mut dyn Subscriber<T>) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        // Read before notifying: a consumer drain that follows a set flag
        // observes everything buffered ahead of it.
        let done = self.done.load(Ordering::Acquire);
        subscriber.on_available();
        done || self.cancelled.load(Ordering::Acquire)
    }

    fn emit(&self, subscriber: &mut dyn Subscriber<T>) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        let violation = self.violation.lock().take();
        if let Some(error) = violation {
            self.cancelled.store(true, Ordering::Release);
            subscriber.on_error(error);
            return true;
        }

        let conditional = self.conditional.load(Ordering::Acquire);
        let requested = self.demand.get();
        let mut emitted = 0;
        while emitted != requested {
            if self.cancelled.load(Ordering::Acquire) {
                return true;
            }
            let Ok(value) = self.receiver.try_recv() else {
                break;
            };
            if conditional {
                if subscriber.try_on_next(value) {
                    emitted += 1;
                }
            } else {
                subscriber.on_next(value);
                emitted += 1;
            }
        }

        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        let done = self.done.load(Ordering::Acquire);
        if done && self.receiver.is_empty() {
            let error = self.error.lock().take();
            match error {
                Some(error) => subscriber.on_error(error),
                None => subscriber.on_complete(),
            }
            return true;
        }

        self.demand.produced(emitted);
        false
    }
}

impl<T> Subscription for Shared<T>
where
    T: Send + 'static,
{
    fn request(&self, n: u64) {
        match demand::validate(n) {
            Ok(n) => {
                self.demand.add(n);
            }
            Err(error) => {
                self.violation.lock().get_or_insert(error);
            }
        }
        if self.mode() != FusionMode::Async {
            self.drain();
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("channel subscription cancelled");
        self.drain();
    }
}

impl<T> QueueSubscription<T> for Shared<T>
where
    T: Send + 'static,
{
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        *self.fusion.get_or_init(|| requested.negotiate(false, true))
    }

    fn poll(&self) -> Result<Option<T>> {
        let violation = self.violation.lock().take();
        if let Some(error) = violation {
            self.cancelled.store(true, Ordering::Release);
            return Err(error);
        }
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(None);
        }
        let done = self.done.load(Ordering::Acquire);
        match self.receiver.try_recv() {
            Ok(value) => Ok(Some(value)),
            Err(_) if done => {
                let error = self.error.lock().clone();
                match error {
                    Some(error) => Err(error),
                    None => Ok(None),
                }
            }
            Err(_) => Ok(None),
        }
    }

    fn is_empty(&self) -> bool {
        self.receiver.is_empty()
    }

    fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::Acquire)
            || (self.done.load(Ordering::Acquire) && self.receiver.is_empty())
    }

    fn clear(&self) {
        while self.receiver.try_recv().is_ok() {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestSubscriber;

    #[test]
    fn test_buffered_until_requested() {
        let (emitter, source) = channel(ChannelConfig::default());
        let ts = TestSubscriber::with_request(1);
        source.subscribe(ts.clone());

        emitter.next(1).unwrap();
        emitter.next(2).unwrap();
        emitter.complete();
        ts.assert_values(&[1]).assert_not_complete();

        ts.request(5);
        ts.assert_values(&[1, 2]).assert_complete();
    }

    #[test]
    fn test_full_buffer_hands_value_back() {
        let (emitter, source) = channel(ChannelConfig { buffer_size: 1 });
        let ts = TestSubscriber::<u8>::with_request(0);
        source.subscribe(ts.clone());

        emitter.next(1).unwrap();
        assert_eq!(emitter.next(2), Err(EmitError::Full(2)));
    }

    #[test]
    fn test_closed_after_cancel() {
        let (emitter, source) = channel(ChannelConfig::default());
        let ts = TestSubscriber::new();
        source.subscribe(ts.clone());
        ts.cancel();

        assert!(emitter.is_cancelled());
        assert_eq!(emitter.next(7).unwrap_err().into_inner(), 7);
    }

    /// Pushes a late error into its own channel once completion arrives.
    struct ErrorsOnComplete {
        emitter: Emitter<u8>,
        inner: TestSubscriber<u8>,
    }

    impl Subscriber<u8> for ErrorsOnComplete {
        fn on_subscribe(&mut self, subscription: SubscriptionHandle<u8>) {
            self.inner.on_subscribe(subscription);
        }

        fn on_next(&mut self, value: u8) {
            self.inner.on_next(value);
        }

        fn on_error(&mut self, error: FlowError) {
            self.inner.on_error(error);
        }

        fn on_complete(&mut self) {
            self.emitter.error("late");
            self.emitter.complete();
            self.inner.on_complete();
        }
    }

    #[test]
    fn test_terminal_callback_can_reenter_the_emitter() {
        let (emitter, source) = channel(ChannelConfig::default());
        let ts = TestSubscriber::new();
        source.subscribe(ErrorsOnComplete {
            emitter: emitter.clone(),
            inner: ts.clone(),
        });

        emitter.next(1).unwrap();
        emitter.complete();

        ts.assert_values(&[1]).assert_complete().assert_no_error();
        assert_eq!(emitter.next(2), Err(EmitError::Closed(2)));
    }

    #[test]
    fn test_error_follows_buffered_values() {
        let (emitter, source) = channel(ChannelConfig::default());
        emitter.next("a").unwrap();
        emitter.error("boom");

        let ts = TestSubscriber::new();
        source.subscribe(ts.clone());
        ts.assert_values(&["a"]).assert_error_message("boom");
    }
}
