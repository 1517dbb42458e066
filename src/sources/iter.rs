//! Cold sources over iterables.

use crate::demand::{self, Demand};
use crate::error::{FlowError, Result};
use crate::protocol::{
    FusionMode, Publisher, QueueSubscription, Subscriber, Subscription, SubscriptionHandle,
};
use parking_lot::Mutex;
use std::iter::Peekable;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::trace;

/// Publisher replaying an iterable to every subscriber.
///
/// Each subscription gets a fresh iterator. Completion is signalled as soon
/// as the iterator is exhausted, even with no outstanding demand. Supports
/// `Sync` fusion and uses `try_on_next` on conditional subscribers.
#[derive(Clone, Debug)]
pub struct IterSource<I> {
    iterable: I,
}

/// Publish the items of `iterable`.
pub fn from_iter<I>(iterable: I) -> IterSource<I>
where
    I: IntoIterator + Clone,
{
    IterSource { iterable }
}

/// Publish `count` consecutive integers starting at `start`.
///
/// # Panics
///
/// Panics when the last element, `start + count - 1`, does not fit in `i64`.
/// Use [`try_range`] to get the overflow back as an error.
pub fn range(start: i64, count: u64) -> IterSource<RangeInclusive<i64>> {
    match try_range(start, count) {
        Ok(source) => source,
        Err(error) => panic!("{}", error),
    }
}

/// Publish `count` consecutive integers starting at `start`, rejecting a
/// range whose last element overflows `i64`.
pub fn try_range(start: i64, count: u64) -> Result<IterSource<RangeInclusive<i64>>> {
    if count == 0 {
        return Ok(from_iter(RangeInclusive::new(1, 0)));
    }
    let last = i64::try_from(i128::from(start) + i128::from(count - 1))
        .map_err(|_| FlowError::RangeOverflow { start, count })?;
    Ok(from_iter(start..=last))
}

impl<I> Publisher<I::Item> for IterSource<I>
where
    I: IntoIterator + Clone,
    I::IntoIter: Send + 'static,
    I::Item: Send + 'static,
{
    fn subscribe<S>(&self, mut subscriber: S)
    where
        S: Subscriber<I::Item> + 'static,
    {
        let iter = self.iterable.clone().into_iter().peekable();
        let subscription = Arc::new(IterSubscription::new(iter, subscriber.is_conditional()));
        let handle: SubscriptionHandle<I::Item> = SubscriptionHandle::Fuseable(subscription.clone());
        subscriber.on_subscribe(handle);
        subscription.install(subscriber);
    }
}

struct IterSubscription<It: Iterator, S> {
    iter: Mutex<Option<Peekable<It>>>,
    /// Parked until `on_subscribe` returns; dropped on termination.
    subscriber: Mutex<Option<S>>,
    demand: Demand,
    /// Drain ticket: the caller that moves it off zero owns emission.
    wip: AtomicUsize,
    cancelled: AtomicBool,
    violation: Mutex<Option<FlowError>>,
    fusion: OnceLock<FusionMode>,
    conditional: bool,
}

impl<It, S> IterSubscription<It, S>
where
    It: Iterator + Send,
    It::Item: Send,
    S: Subscriber<It::Item>,
{
    fn new(iter: Peekable<It>, conditional: bool) -> Self {
        Self {
            iter: Mutex::new(Some(iter)),
            subscriber: Mutex::new(None),
            demand: Demand::new(),
            wip: AtomicUsize::new(0),
            cancelled: AtomicBool::new(false),
            violation: Mutex::new(None),
            fusion: OnceLock::new(),
            conditional,
        }
    }

    fn mode(&self) -> FusionMode {
        self.fusion.get().copied().unwrap_or_default()
    }

    fn install(&self, subscriber: S) {
        // A synchronously fused consumer only polls; nobody calls it again.
        if self.mode() == FusionMode::Sync || self.cancelled.load(Ordering::Acquire) {
            return;
        }
        *self.subscriber.lock() = Some(subscriber);
        self.drain();
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
                    Some(subscriber) => self.emit(subscriber),
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

    /// One emission pass. Returns true once the subscription is finished.
    fn emit(&self, subscriber: &mut S) -> bool {
        if self.cancelled.load(Ordering::Acquire) {
            return true;
        }
        let violation = self.violation.lock().take();
        if let Some(error) = violation {
            self.cancelled.store(true, Ordering::Release);
            subscriber.on_error(error);
            return true;
        }
        if self.iter.lock().is_none() {
            return true;
        }

        // The iterator lock is never held across a subscriber call.
        let requested = self.demand.get();
        let mut emitted = 0;
        while emitted != requested {
            if self.cancelled.load(Ordering::Acquire) {
                return true;
            }
            let next = self.iter.lock().as_mut().and_then(Iterator::next);
            let Some(value) = next else {
                break;
            };
            if self.conditional {
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
        let exhausted = self
            .iter
            .lock()
            .as_mut()
            .map_or(true, |iter| iter.peek().is_none());
        if exhausted {
            subscriber.on_complete();
            return true;
        }

        self.demand.produced(emitted);
        false
    }
}

impl<It, S> Subscription for IterSubscription<It, S>
where
    It: Iterator + Send,
    It::Item: Send,
    S: Subscriber<It::Item>,
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
        if self.mode() != FusionMode::Sync {
            self.drain();
        }
    }

    fn cancel(&self) {
        if self.cancelled.swap(true, Ordering::AcqRel) {
            return;
        }
        trace!("iterable subscription cancelled");
        if self.mode() == FusionMode::Sync {
            self.iter.lock().take();
        } else {
            self.drain();
        }
    }
}

impl<It, S> QueueSubscription<It::Item> for IterSubscription<It, S>
where
    It: Iterator + Send,
    It::Item: Send,
    S: Subscriber<It::Item>,
{
    fn request_fusion(&self, requested: FusionMode) -> FusionMode {
        *self.fusion.get_or_init(|| requested.negotiate(true, false))
    }

    fn poll(&self) -> Result<Option<It::Item>> {
        if self.cancelled.load(Ordering::Acquire) {
            return Ok(None);
        }
        Ok(self.iter.lock().as_mut().and_then(Iterator::next))
    }

    fn is_empty(&self) -> bool {
        self.iter
            .lock()
            .as_mut()
            .map_or(true, |iter| iter.peek().is_none())
    }

    fn is_done(&self) -> bool {
        self.cancelled.load(Ordering::Acquire) || self.is_empty()
    }

    fn clear(&self) {
        self.iter.lock().take();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::TestSubscriber;

    #[test]
    fn test_range_bounds() {
        let ts = TestSubscriber::new();
        range(5, 3).subscribe(ts.clone());
        ts.assert_values(&[5, 6, 7]).assert_complete();
    }

    #[test]
    fn test_range_reaching_i64_max() {
        let ts = TestSubscriber::new();
        range(i64::MAX - 1, 2).subscribe(ts.clone());
        ts.assert_values(&[i64::MAX - 1, i64::MAX]).assert_complete();
    }

    #[test]
    fn test_range_overflow_is_rejected() {
        let err = try_range(i64::MAX - 1, 3).unwrap_err();
        assert_eq!(
            err,
            FlowError::RangeOverflow {
                start: i64::MAX - 1,
                count: 3
            }
        );
        assert!(try_range(0, u64::MAX).is_err());
        assert!(try_range(i64::MIN, u64::MAX).is_ok());
        assert!(try_range(i64::MIN + 2, u64::MAX).is_err());
    }

    #[test]
    #[should_panic(expected = "Range overflows i64")]
    fn test_range_panics_on_overflow() {
        range(i64::MAX, 2);
    }

    #[test]
    fn test_empty_completes_without_demand() {
        let ts = TestSubscriber::<i64>::with_request(0);
        range(1, 0).subscribe(ts.clone());
        ts.assert_no_values().assert_complete();
    }

    #[test]
    fn test_each_subscriber_gets_a_fresh_iterator() {
        let source = from_iter(vec!["a", "b"]);
        let first = TestSubscriber::new();
        let second = TestSubscriber::new();
        source.subscribe(first.clone());
        source.subscribe(second.clone());
        first.assert_values(&["a", "b"]).assert_complete();
        second.assert_values(&["a", "b"]).assert_complete();
    }

    #[test]
    fn test_sync_fusion_never_signals_on_next() {
        let ts = TestSubscriber::new().fused(FusionMode::Sync);
        from_iter(vec![1, 2, 3]).subscribe(ts.clone());
        assert_eq!(ts.fusion_mode(), FusionMode::Sync);
        ts.assert_values(&[1, 2, 3]).assert_complete();
    }
}
