//! Recording subscriber and helpers for exercising publishers in tests.

use crate::demand::{self, UNBOUNDED};
use crate::error::FlowError;
use crate::protocol::fusion::{self, DrainOutcome};
use crate::protocol::{FusionMode, Publisher, Subscriber, SubscriptionHandle};
use crate::signal::Signal;
use parking_lot::Mutex;
use std::fmt::Debug;
use std::sync::Arc;
use tracing::debug;

type Filter<T> = Arc<dyn Fn(&T) -> bool + Send + Sync>;

struct Recorder<T> {
    signals: Vec<Signal<T>>,
    subscription: Option<SubscriptionHandle<T>>,
    initial_request: u64,
    requested_fusion: FusionMode,
    mode: FusionMode,
    filter: Option<Filter<T>>,
    /// Demand asked for before `on_subscribe` arrived.
    pending: u64,
    cancelled: bool,
    terminated: bool,
    rejected: Vec<T>,
}

/// A subscriber that records every signal it receives.
///
/// Clones share the same recording, so one clone can be handed to a
/// publisher while the test keeps another for assertions. By default it
/// requests unbounded demand on subscription.
pub struct TestSubscriber<T> {
    inner: Arc<Mutex<Recorder<T>>>,
}

impl<T> Clone for TestSubscriber<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> Default for TestSubscriber<T> {
    fn default() -> Self {
        Self::with_request(UNBOUNDED)
    }
}

impl<T> TestSubscriber<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request `n` on subscription instead of unbounded. Zero requests nothing.
    pub fn with_request(n: u64) -> Self {
        Self {
            inner: Arc::new(Mutex::new(Recorder {
                signals: Vec::new(),
                subscription: None,
                initial_request: n,
                requested_fusion: FusionMode::None,
                mode: FusionMode::None,
                filter: None,
                pending: 0,
                cancelled: false,
                terminated: false,
                rejected: Vec::new(),
            })),
        }
    }

    /// Ask for `mode` fusion when subscribed.
    pub fn fused(self, mode: FusionMode) -> Self {
        self.inner.lock().requested_fusion = mode;
        self
    }

    /// Become conditional, accepting only values for which `filter` holds.
    pub fn conditional<F>(self, filter: F) -> Self
    where
        F: Fn(&T) -> bool + Send + Sync + 'static,
    {
        self.inner.lock().filter = Some(Arc::new(filter));
        self
    }

    pub fn request(&self, n: u64) {
        let subscription = {
            let mut recorder = self.inner.lock();
            match &recorder.subscription {
                Some(subscription) => subscription.clone(),
                None => {
                    recorder.pending = demand::add_cap(recorder.pending, n);
                    return;
                }
            }
        };
        subscription.request(n);
    }

    pub fn cancel(&self) {
        let subscription = {
            let mut recorder = self.inner.lock();
            recorder.cancelled = true;
            recorder.subscription.clone()
        };
        if let Some(subscription) = subscription {
            subscription.cancel();
        }
    }

    /// The mode granted by the producer, `None` when fusion was not asked for.
    pub fn fusion_mode(&self) -> FusionMode {
        self.inner.lock().mode
    }

    pub fn is_complete(&self) -> bool {
        self.inner
            .lock()
            .signals
            .iter()
            .any(|signal| signal.is_on_complete())
    }

    /// The first error received.
    pub fn error(&self) -> Option<FlowError> {
        self.inner
            .lock()
            .signals
            .iter()
            .find_map(|signal| signal.error_ref().cloned())
    }

    fn record(&self, signal: Signal<T>) {
        let mut recorder = self.inner.lock();
        if signal.is_terminal() {
            recorder.terminated = true;
        }
        recorder.signals.push(signal);
    }

    fn drain_fused(&self) {
        let (queue, mode) = {
            let recorder = self.inner.lock();
            if recorder.terminated {
                return;
            }
            match recorder.subscription.as_ref().and_then(SubscriptionHandle::queue) {
                Some(queue) => (Arc::clone(queue), recorder.mode),
                None => return,
            }
        };

        let outcome = fusion::drain(queue.as_ref(), mode, |value| self.record(Signal::next(value)));
        match outcome {
            Ok(DrainOutcome::Pending) => {}
            Ok(DrainOutcome::Exhausted) => self.record(Signal::complete()),
            Err(error) => self.record(Signal::error(error)),
        }
    }
}

impl<T: Clone> TestSubscriber<T> {
    pub fn values(&self) -> Vec<T> {
        self.inner
            .lock()
            .signals
            .iter()
            .filter_map(|signal| signal.value().cloned())
            .collect()
    }

    pub fn signals(&self) -> Vec<Signal<T>> {
        self.inner.lock().signals.clone()
    }

    /// Values turned down through `try_on_next`.
    pub fn rejected(&self) -> Vec<T> {
        self.inner.lock().rejected.clone()
    }
}

impl<T: Clone + Debug + PartialEq> TestSubscriber<T> {
    #[track_caller]
    pub fn assert_values(&self, expected: &[T]) -> &Self {
        assert_eq!(self.values(), expected, "unexpected values");
        self
    }

    #[track_caller]
    pub fn assert_no_values(&self) -> &Self {
        assert_eq!(self.values(), Vec::<T>::new(), "expected no values");
        self
    }

    #[track_caller]
    pub fn assert_complete(&self) -> &Self {
        assert!(self.is_complete(), "expected completion, got {:?}", self.signals());
        self
    }

    #[track_caller]
    pub fn assert_not_complete(&self) -> &Self {
        assert!(!self.is_complete(), "unexpected completion");
        self
    }

    #[track_caller]
    pub fn assert_no_error(&self) -> &Self {
        assert_eq!(self.error(), None, "unexpected error");
        self
    }

    #[track_caller]
    pub fn assert_error_message(&self, message: &str) -> &Self {
        match self.error() {
            Some(error) => assert_eq!(error.to_string(), message),
            None => panic!("expected error {:?}, got {:?}", message, self.signals()),
        }
        self
    }
}

impl<T> Subscriber<T> for TestSubscriber<T>
where
    T: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        let (request, requested_fusion, cancelled) = {
            let mut recorder = self.inner.lock();
            if recorder.subscription.is_some() {
                drop(recorder);
                debug!("test subscriber received a second subscription");
                subscription.cancel();
                self.record(Signal::error(FlowError::DuplicateSubscription));
                return;
            }
            recorder.subscription = Some(subscription.clone());
            recorder.signals.push(Signal::subscribe(subscription.clone()));
            let request = demand::add_cap(recorder.initial_request, recorder.pending);
            recorder.pending = 0;
            (request, recorder.requested_fusion, recorder.cancelled)
        };

        if cancelled {
            subscription.cancel();
            return;
        }

        let mode = if requested_fusion == FusionMode::None {
            FusionMode::None
        } else {
            subscription.request_fusion(requested_fusion)
        };
        self.inner.lock().mode = mode;

        match mode {
            FusionMode::Sync => self.drain_fused(),
            FusionMode::Async => {
                if request != 0 {
                    subscription.request(request);
                }
                self.drain_fused();
            }
            _ => {
                if request != 0 {
                    subscription.request(request);
                }
            }
        }
    }

    fn on_next(&mut self, value: T) {
        self.record(Signal::next(value));
    }

    fn on_error(&mut self, error: FlowError) {
        self.record(Signal::error(error));
    }

    fn on_complete(&mut self) {
        self.record(Signal::complete());
    }

    fn on_available(&mut self) {
        self.drain_fused();
    }

    fn is_conditional(&self) -> bool {
        self.inner.lock().filter.is_some()
    }

    fn try_on_next(&mut self, value: T) -> bool {
        let filter = self.inner.lock().filter.clone();
        match filter {
            Some(filter) if !filter(&value) => {
                self.inner.lock().rejected.push(value);
                false
            }
            _ => {
                self.record(Signal::next(value));
                true
            }
        }
    }
}

/// Publisher wrapper that masks fusion and conditional delivery, forcing
/// the plain request/emit path through whatever it wraps.
pub struct Hide<P> {
    source: P,
}

pub fn hide<P>(source: P) -> Hide<P> {
    Hide { source }
}

impl<P, T> Publisher<T> for Hide<P>
where
    P: Publisher<T>,
    T: Send + 'static,
{
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        self.source.subscribe(HideSubscriber { downstream: subscriber });
    }
}

struct HideSubscriber<S> {
    downstream: S,
}

impl<T, S> Subscriber<T> for HideSubscriber<S>
where
    S: Subscriber<T>,
    T: 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        self.downstream.on_subscribe(subscription.hide());
    }

    fn on_next(&mut self, value: T) {
        self.downstream.on_next(value);
    }

    fn on_error(&mut self, error: FlowError) {
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        self.downstream.on_complete();
    }
}
