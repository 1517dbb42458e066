//! The `handle` operator: transform, filter or terminate per element.

use super::sink::{SynchronousSink, Terminal};
use crate::error::{BoxError, FlowError, Result};
use crate::protocol::{
    complete_dropped, error_dropped, next_dropped, FusionMode, Publisher, QueueSubscription,
    Subscriber, Subscription, SubscriptionHandle,
};
use parking_lot::Mutex;
use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, trace};

/// Publisher that runs `handler` on every element of `source`.
///
/// The handler may emit one value, emit nothing (the element is dropped and
/// a replacement is requested), or end the stream through the sink. If it
/// returns `Err`, upstream is cancelled and the error goes downstream.
pub struct Handle<P, F, T, R> {
    source: P,
    handler: Arc<F>,
    _marker: PhantomData<fn(T) -> R>,
}

impl<P, F, T, R> Handle<P, F, T, R>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError>,
{
    pub fn new(source: P, handler: F) -> Self {
        Self {
            source,
            handler: Arc::new(handler),
            _marker: PhantomData,
        }
    }
}

impl<P, F, T, R> Publisher<R> for Handle<P, F, T, R>
where
    P: Publisher<T>,
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<R> + 'static,
    {
        self.source
            .subscribe(HandleSubscriber::new(subscriber, Arc::clone(&self.handler)));
    }
}

/// Outcome of running the handler on one element.
enum Step<R> {
    Emit(R),
    Skip,
    Stop(Option<R>, Terminal),
}

fn apply<T, R, F>(handler: &F, value: T) -> Step<R>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError>,
{
    let mut sink = SynchronousSink::new();
    if let Err(cause) = handler(value, &mut sink) {
        return Step::Stop(None, Terminal::Error(FlowError::callback(cause)));
    }
    match sink.finish() {
        (value, Some(terminal)) => Step::Stop(value, terminal),
        (Some(value), None) => Step::Emit(value),
        (None, None) => Step::Skip,
    }
}

/// Upstream-facing half of the operator.
pub struct HandleSubscriber<T, R, F, S> {
    downstream: S,
    handler: Arc<F>,
    upstream: Option<SubscriptionHandle<T>>,
    /// Cached downstream capability.
    conditional: bool,
    done: bool,
    _marker: PhantomData<fn(R)>,
}

impl<T, R, F, S> HandleSubscriber<T, R, F, S>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    S: Subscriber<R>,
    T: Send + 'static,
    R: Send + 'static,
{
    fn new(downstream: S, handler: Arc<F>) -> Self {
        Self {
            downstream,
            handler,
            upstream: None,
            conditional: false,
            done: false,
            _marker: PhantomData,
        }
    }

    fn cancel_upstream(&self) {
        if let Some(upstream) = &self.upstream {
            upstream.cancel();
        }
    }

    fn terminate(&mut self, terminal: Terminal) {
        self.done = true;
        self.cancel_upstream();
        match terminal {
            Terminal::Complete => self.downstream.on_complete(),
            Terminal::Error(error) => self.downstream.on_error(error),
        }
    }

    fn forward(&mut self, value: R) -> bool {
        if self.conditional {
            self.downstream.try_on_next(value)
        } else {
            self.downstream.on_next(value);
            true
        }
    }

    /// Returns whether the element used up a unit of downstream demand.
    fn consume(&mut self, value: T) -> bool {
        if self.done {
            next_dropped();
            return true;
        }

        match apply(self.handler.as_ref(), value) {
            Step::Emit(result) => self.forward(result),
            Step::Skip => false,
            Step::Stop(result, terminal) => {
                if let Some(result) = result {
                    self.forward(result);
                }
                self.terminate(terminal);
                true
            }
        }
    }
}

impl<T, R, F, S> Subscriber<T> for HandleSubscriber<T, R, F, S>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    S: Subscriber<R>,
    T: Send + 'static,
    R: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        if self.upstream.is_some() {
            subscription.cancel();
            debug!("handle received a second subscription");
            if !self.done {
                self.terminate(Terminal::Error(FlowError::DuplicateSubscription));
            }
            return;
        }

        self.conditional = self.downstream.is_conditional();
        let fuseable = subscription.is_fuseable();
        self.upstream = Some(subscription.clone());

        let shared = Arc::new(HandleSubscription::<T, R, F>::new(
            subscription,
            Arc::clone(&self.handler),
        ));
        let handle: SubscriptionHandle<R> = if fuseable {
            SubscriptionHandle::Fuseable(shared)
        } else {
            SubscriptionHandle::Plain(shared)
        };
        self.downstream.on_subscribe(handle);
    }

    fn on_next(&mut self, value: T) {
        if !self.consume(value) {
            if let Some(upstream) = &self.upstream {
                upstream.request(1);
            }
        }
    }

    fn on_error(&mut self, error: FlowError) {
        if self.done {
            error_dropped(&error);
            return;
        }
        self.done = true;
        self.downstream.on_error(error);
    }

    fn on_complete(&mut self) {
        if self.done {
            complete_dropped();
            return;
        }
        self.done = true;
        self.downstream.on_complete();
    }

    fn on_available(&mut self) {
        self.downstream.on_available();
    }

    fn is_conditional(&self) -> bool {
        true
    }

    fn try_on_next(&mut self, value: T) -> bool {
        self.consume(value)
    }
}

/// Downstream-facing half of the operator; also the fused queue.
struct HandleSubscription<T, R, F> {
    upstream: SubscriptionHandle<T>,
    handler: Arc<F>,
    mode: OnceLock<FusionMode>,
    /// Set once a handler terminal was reached on the poll path.
    done: AtomicBool,
    /// Error to surface after a value emitted in the same handler call.
    pending: Mutex<Option<FlowError>>,
    _marker: PhantomData<fn() -> R>,
}

impl<T, R, F> HandleSubscription<T, R, F>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    fn new(upstream: SubscriptionHandle<T>, handler: Arc<F>) -> Self {
        Self {
            upstream,
            handler,
            mode: OnceLock::new(),
            done: AtomicBool::new(false),
            pending: Mutex::new(None),
            _marker: PhantomData,
        }
    }

    fn mode(&self) -> FusionMode {
        self.mode.get().copied().unwrap_or_default()
    }

    fn stop(&self) {
        if !self.done.swap(true, Ordering::AcqRel) {
            trace!("handle stopped on the fused path");
            self.upstream.cancel();
        }
    }

    /// Dropped elements still used up upstream demand in `Async` mode.
    fn replenish(&self, dropped: u64) {
        if dropped != 0 && self.mode() == FusionMode::Async {
            self.upstream.request(dropped);
        }
    }
}

impl<T, R, F> Subscription for HandleSubscription<T, R, F>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    fn request(&self, n: u64) {
        self.upstream.request(n);
    }

    fn cancel(&self) {
        self.upstream.cancel();
    }
}

impl<T, R, F> QueueSubscription<R> for HandleSubscription<T, R, F>
where
    F: Fn(T, &mut SynchronousSink<R>) -> std::result::Result<(), BoxError> + Send + Sync + 'static,
    T: Send + 'static,
    R: Send + 'static,
{
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        *self
            .mode
            .get_or_init(|| self.upstream.request_fusion(requested))
    }

    fn poll(&self) -> Result<Option<R>> {
        if let Some(error) = self.pending.lock().take() {
            return Err(error);
        }
        if self.done.load(Ordering::Acquire) {
            return Ok(None);
        }
        let Some(queue) = self.upstream.queue() else {
            return Ok(None);
        };

        let mut dropped = 0;
        loop {
            let Some(value) = queue.poll()? else {
                self.replenish(dropped);
                return Ok(None);
            };

            match apply(self.handler.as_ref(), value) {
                Step::Emit(result) => {
                    self.replenish(dropped);
                    return Ok(Some(result));
                }
                Step::Skip => dropped += 1,
                Step::Stop(result, terminal) => {
                    self.stop();
                    return match (result, terminal) {
                        (Some(result), Terminal::Error(error)) => {
                            *self.pending.lock() = Some(error);
                            Ok(Some(result))
                        }
                        (None, Terminal::Error(error)) => Err(error),
                        (result, Terminal::Complete) => Ok(result),
                    };
                }
            }
        }
    }

    fn is_empty(&self) -> bool {
        match self.upstream.queue() {
            Some(queue) => self.done.load(Ordering::Acquire) || queue.is_empty(),
            None => true,
        }
    }

    fn is_done(&self) -> bool {
        if self.pending.lock().is_some() {
            return false;
        }
        match self.upstream.queue() {
            Some(queue) => self.done.load(Ordering::Acquire) || queue.is_done(),
            None => self.done.load(Ordering::Acquire),
        }
    }

    fn clear(&self) {
        if let Some(queue) = self.upstream.queue() {
            queue.clear();
        }
    }
}
