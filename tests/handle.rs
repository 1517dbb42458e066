//! Behavior of the `handle` operator.

use demandflow::prelude::*;
use demandflow::sources::EmitError;
use demandflow::testing::hide;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn init_tracing() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn evens(v: i64, sink: &mut SynchronousSink<i64>) -> Result<(), BoxError> {
    if v % 2 == 0 {
        sink.next(v);
    }
    Ok(())
}

// --- Transform and filter ---

#[test]
fn test_map() {
    init_tracing();
    let ts = TestSubscriber::new();
    range(1, 3)
        .handle(|v, sink| {
            sink.next(format!("#{}", v));
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&["#1".to_string(), "#2".to_string(), "#3".to_string()])
        .assert_complete();
}

#[test]
fn test_filter_evens() {
    let ts = TestSubscriber::new();
    range(1, 5).handle(evens).subscribe(ts.clone());

    ts.assert_values(&[2, 4]).assert_complete();
}

#[test]
fn test_filter_respects_demand() {
    let ts = TestSubscriber::with_request(1);
    range(1, 10).handle(evens).subscribe(ts.clone());

    ts.assert_values(&[2]).assert_not_complete();
    ts.request(2);
    ts.assert_values(&[2, 4, 6]).assert_not_complete();
}

#[test]
fn test_filter_hidden_replaces_dropped_elements() {
    let ts = TestSubscriber::with_request(2);
    hide(range(1, 6)).handle(evens).subscribe(ts.clone());

    ts.assert_values(&[2, 4]).assert_not_complete();
    ts.request(1);
    ts.assert_values(&[2, 4, 6]).assert_complete();
}

// --- Terminals from the handler ---

#[test]
fn test_complete_stops_upstream() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let ts = TestSubscriber::new();
    range(1, 5)
        .handle(move |v, sink| {
            counter.fetch_add(1, Ordering::SeqCst);
            if v == 3 {
                sink.complete();
            } else {
                sink.next(v);
            }
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[1, 2]).assert_complete().assert_no_error();
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

fn complete_on_three(v: u32, sink: &mut SynchronousSink<u32>) -> Result<(), BoxError> {
    if v == 3 {
        sink.complete();
    } else {
        sink.next(v);
    }
    Ok(())
}

#[test]
fn test_complete_cancels_channel_upstream() {
    let (emitter, source) = channel(ChannelConfig::default());
    let ts = TestSubscriber::new();
    source.handle(complete_on_three).subscribe(ts.clone());

    for v in 1..=3 {
        emitter.next(v).unwrap();
    }

    ts.assert_values(&[1, 2]).assert_complete().assert_no_error();
    assert!(emitter.is_cancelled());
    assert!(matches!(emitter.next(4), Err(EmitError::Closed(4))));
}

#[test]
fn test_complete_cancels_hidden_channel_upstream() {
    let (emitter, source) = channel(ChannelConfig::default());
    let ts = TestSubscriber::new();
    hide(source).handle(complete_on_three).subscribe(ts.clone());

    for v in 1..=3 {
        emitter.next(v).unwrap();
    }

    ts.assert_values(&[1, 2]).assert_complete().assert_no_error();
    assert!(emitter.is_cancelled());
}

#[test]
fn test_next_then_complete_emits_both() {
    let ts = TestSubscriber::new();
    range(1, 5)
        .handle(|v, sink| {
            sink.next(v);
            if v == 2 {
                sink.complete();
            }
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[1, 2]).assert_complete();
}

#[test]
fn test_sink_error() {
    let ts = TestSubscriber::new();
    range(1, 5)
        .handle(|v, sink: &mut SynchronousSink<i64>| {
            if v == 2 {
                sink.error("bad element");
            } else {
                sink.next(v);
            }
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[1])
        .assert_not_complete()
        .assert_error_message("bad element");
    assert!(matches!(ts.error(), Some(FlowError::Signalled(_))));
}

#[test]
fn test_handler_error_cancels_upstream() {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let ts = TestSubscriber::new();
    range(1, 5)
        .handle(move |v, sink: &mut SynchronousSink<i64>| {
            counter.fetch_add(1, Ordering::SeqCst);
            if v == 2 {
                return Err("handler failed".into());
            }
            sink.next(v);
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[1]).assert_error_message("handler failed");
    assert!(matches!(ts.error(), Some(FlowError::Callback(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_multiple_next_is_an_error() {
    let ts = TestSubscriber::new();
    range(1, 5)
        .handle(|v, sink| {
            sink.next(v);
            sink.next(v + 100);
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[1]).assert_not_complete();
    assert_eq!(ts.error(), Some(FlowError::MultipleEmission));
}

#[test]
fn test_upstream_error_passes_through() {
    let (emitter, source) = channel(ChannelConfig::default());
    let ts = TestSubscriber::new();
    source.handle(evens).subscribe(ts.clone());

    emitter.next(1).unwrap();
    emitter.next(2).unwrap();
    emitter.error("upstream broke");

    ts.assert_values(&[2]).assert_error_message("upstream broke");
    assert!(emitter.next(4).is_err());
}

// --- Conditional downstream ---

#[test]
fn test_conditional_downstream_rejection_gets_replacement() {
    let ts = TestSubscriber::with_request(2).conditional(|v: &i64| v % 2 == 0);
    range(1, 6)
        .handle(|v, sink| {
            sink.next(v);
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[2, 4]).assert_not_complete();
    assert_eq!(ts.rejected(), vec![1, 3]);

    ts.request(1);
    ts.assert_values(&[2, 4, 6]).assert_complete();
}

#[test]
fn test_conditional_downstream_hidden_source() {
    let ts = TestSubscriber::with_request(2).conditional(|v: &i64| *v > 3);
    hide(range(1, 6))
        .handle(|v, sink| {
            sink.next(v);
            Ok(())
        })
        .subscribe(ts.clone());

    ts.assert_values(&[4, 5]).assert_not_complete();
    assert_eq!(ts.rejected(), vec![1, 2, 3]);
}
