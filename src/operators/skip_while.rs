//! The `skip_while` operator.

use crate::error::{BoxError, FlowError};
use crate::protocol::{
    complete_dropped, error_dropped, next_dropped, Publisher, Subscriber, SubscriptionHandle,
};
use std::marker::PhantomData;
use std::sync::Arc;
use tracing::debug;

/// Publisher that drops elements of `source` while `predicate` holds, then
/// relays everything after the first element it rejects.
///
/// Demand from downstream is forwarded unchanged. Every dropped element is
/// backfilled with one extra upstream request, so a long dropped prefix does
/// not eat into what downstream asked for.
pub struct SkipWhile<P, F, T> {
    source: P,
    predicate: Arc<F>,
    _marker: PhantomData<fn(T)>,
}

impl<P, F, T> SkipWhile<P, F, T>
where
    F: Fn(&T) -> Result<bool, BoxError>,
{
    pub fn new(source: P, predicate: F) -> Self {
        Self {
            source,
            predicate: Arc::new(predicate),
            _marker: PhantomData,
        }
    }
}

impl<P, F, T> Publisher<T> for SkipWhile<P, F, T>
where
    P: Publisher<T>,
    F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
    T: Send + 'static,
{
    fn subscribe<S>(&self, subscriber: S)
    where
        S: Subscriber<T> + 'static,
    {
        self.source
            .subscribe(SkipWhileSubscriber::new(subscriber, Arc::clone(&self.predicate)));
    }
}

pub struct SkipWhileSubscriber<T, F, S> {
    downstream: S,
    predicate: Arc<F>,
    upstream: Option<SubscriptionHandle<T>>,
    skipping: bool,
    conditional: bool,
    done: bool,
}

impl<T, F, S> SkipWhileSubscriber<T, F, S>
where
    F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
    S: Subscriber<T>,
    T: Send + 'static,
{
    fn new(downstream: S, predicate: Arc<F>) -> Self {
        Self {
            downstream,
            predicate,
            upstream: None,
            skipping: true,
            conditional: false,
            done: false,
        }
    }

    fn fail(&mut self, error: FlowError) {
        self.done = true;
        if let Some(upstream) = &self.upstream {
            upstream.cancel();
        }
        self.downstream.on_error(error);
    }
}

impl<T, F, S> Subscriber<T> for SkipWhileSubscriber<T, F, S>
where
    F: Fn(&T) -> Result<bool, BoxError> + Send + Sync + 'static,
    S: Subscriber<T>,
    T: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionHandle<T>) {
        if self.upstream.is_some() {
            subscription.cancel();
            debug!("skip_while received a second subscription");
            if !self.done {
                self.fail(FlowError::DuplicateSubscription);
            }
            return;
        }

        self.conditional = self.downstream.is_conditional();
        self.upstream = Some(subscription.clone());
        // Not fuseable: dropping needs the predicate on the emission path.
        self.downstream.on_subscribe(subscription.hide());
    }

    fn on_next(&mut self, value: T) {
        if !self.try_on_next(value) {
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

    fn is_conditional(&self) -> bool {
        true
    }

    fn try_on_next(&mut self, value: T) -> bool {
        if self.done {
            next_dropped();
            return true;
        }

        if self.skipping {
            match (self.predicate)(&value) {
                Ok(true) => return false,
                Ok(false) => self.skipping = false,
                Err(cause) => {
                    self.fail(FlowError::callback(cause));
                    return true;
                }
            }
        }

        if self.conditional {
            self.downstream.try_on_next(value)
        } else {
            self.downstream.on_next(value);
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestSubscriber;

    type Predicate = fn(&i32) -> Result<bool, BoxError>;

    fn below_three(v: &i32) -> Result<bool, BoxError> {
        Ok(*v < 3)
    }

    fn subscriber(ts: &TestSubscriber<i32>) -> SkipWhileSubscriber<i32, Predicate, TestSubscriber<i32>> {
        SkipWhileSubscriber::new(ts.clone(), Arc::new(below_three as Predicate))
    }

    #[test]
    fn test_predicate_not_evaluated_after_first_pass() {
        let ts = TestSubscriber::new();
        let mut skip = subscriber(&ts);
        skip.on_subscribe(SubscriptionHandle::plain(crate::protocol::EmptySubscription));

        assert!(!skip.try_on_next(1));
        assert!(skip.try_on_next(3));
        // Would be dropped if the predicate still ran
        assert!(skip.try_on_next(1));
        skip.on_complete();

        ts.assert_values(&[3, 1]).assert_complete();
    }

    #[test]
    fn test_terminal_passes_through_while_skipping() {
        let ts = TestSubscriber::new();
        let mut skip = subscriber(&ts);
        skip.on_subscribe(SubscriptionHandle::plain(crate::protocol::EmptySubscription));

        assert!(!skip.try_on_next(0));
        skip.on_error(FlowError::signalled("upstream failed"));
        skip.on_complete();

        ts.assert_no_values()
            .assert_not_complete()
            .assert_error_message("upstream failed");
    }
}
