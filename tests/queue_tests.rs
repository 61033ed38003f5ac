//! Broadcast queue behavior tests
//!
//! Covers single-threaded delivery, lost-signal accounting, interruption and
//! the threaded publisher/subscriber interleaving guarantees.

use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;

use sigfs::{CallbackResult, DequeueEvent, Queue, ReadReady, SignalId, Subscriber};

/// Read exactly one signal, asserting the expected payload and loss count.
fn check_signal(sub: &Subscriber, wanted: &[u8], wanted_lost: u32) -> SignalId {
    let mut seen = None;
    let completed = sub.dequeue(|event| match event {
        DequeueEvent::Interrupted => panic!("unexpected interruption"),
        DequeueEvent::Signal(signal) => {
            assert_eq!(signal.payload, wanted, "payload mismatch for sid {}", signal.sid);
            assert_eq!(signal.lost_signals, wanted_lost, "lost count mismatch for sid {}", signal.sid);
            seen = Some(signal.sid);
            CallbackResult::Stop
        }
    });
    assert!(completed);
    seen.expect("no signal delivered")
}

#[test]
fn test_single_publish_single_read() {
    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();

    queue.publish(b"SIG000\0");

    assert_eq!(check_signal(&sub, b"SIG000\0", 0), 1);
    assert_eq!(sub.signal_available(), 0);
}

#[test]
fn test_two_sequential_publishes() {
    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();

    queue.publish(b"SIG001\0");
    queue.publish(b"SIG002\0");

    assert_eq!(check_signal(&sub, b"SIG001\0", 0), 1);
    assert_eq!(check_signal(&sub, b"SIG002\0", 0), 2);
    assert_eq!(sub.signal_available(), 0);
}

#[test]
fn test_every_subscriber_sees_every_signal() {
    let queue = Arc::new(Queue::new(4));
    let sub1 = queue.subscribe();
    let sub2 = queue.subscribe();

    queue.publish(b"SIG001\0");
    queue.publish(b"SIG002\0");

    assert_eq!(check_signal(&sub1, b"SIG001\0", 0), 1);
    assert_eq!(check_signal(&sub1, b"SIG002\0", 0), 2);
    assert_eq!(check_signal(&sub2, b"SIG001\0", 0), 1);
    assert_eq!(check_signal(&sub2, b"SIG002\0", 0), 2);
}

#[test]
fn test_late_subscriber_sees_only_new_signals() {
    let queue = Arc::new(Queue::new(4));
    for n in 3..=8 {
        queue.publish(format!("SIG{:03}\0", n).as_bytes());
    }

    // Attached after six publishes: nothing old is visible.
    let sub = queue.subscribe();
    assert_eq!(sub.signal_available(), 0);

    queue.publish(b"SIG009\0");
    assert_eq!(check_signal(&sub, b"SIG009\0", 0), 7);
}

#[test]
fn test_overflow_reports_lost_signals() {
    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();

    for n in 1..=6 {
        queue.publish(format!("SIG{:03}\0", n).as_bytes());
    }

    // Six publishes into four slots: sids 1-3 are gone, 4-6 remain.
    assert_eq!(check_signal(&sub, b"SIG004\0", 3), 4);
    assert_eq!(check_signal(&sub, b"SIG005\0", 0), 5);
    assert_eq!(check_signal(&sub, b"SIG006\0", 0), 6);
    assert_eq!(sub.signal_available(), 0);
}

#[test]
fn test_double_overflow() {
    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();

    for n in 1..=9 {
        queue.publish(format!("SIG{:03}\0", n).as_bytes());
    }

    assert_eq!(check_signal(&sub, b"SIG007\0", 6), 7);
    assert_eq!(check_signal(&sub, b"SIG008\0", 0), 8);
    assert_eq!(check_signal(&sub, b"SIG009\0", 0), 9);
}

#[test]
fn test_lost_accounting_balances() {
    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();

    let total = 10u64;
    for n in 1..=total {
        queue.publish(&n.to_le_bytes());
    }

    let mut delivered = 0u64;
    let mut lost = 0u64;
    let mut last_sid = 0;
    while sub.signal_available() > 0 {
        let completed = sub.dequeue(|event| match event {
            DequeueEvent::Interrupted => panic!("unexpected interruption"),
            DequeueEvent::Signal(signal) => {
                assert!(signal.sid > last_sid, "sids must be strictly increasing");
                last_sid = signal.sid;
                delivered += 1;
                lost += signal.lost_signals as u64;
                CallbackResult::CallAgain
            }
        });
        assert!(completed);
    }

    // Everything published is either delivered or accounted as lost.
    assert_eq!(delivered + lost, total);
    assert_eq!(last_sid, total);
}

#[test]
fn test_interrupt_unblocks_dequeue() {
    let queue = Arc::new(Queue::new(4));
    let sub = Arc::new(queue.subscribe());

    let reader_sub = Arc::clone(&sub);
    let reader = thread::spawn(move || {
        let mut calls = 0;
        let completed = reader_sub.dequeue(|event| {
            assert!(matches!(event, DequeueEvent::Interrupted));
            calls += 1;
            CallbackResult::NotProcessed
        });
        (completed, calls)
    });

    // Give the reader time to park on the condition variable.
    thread::sleep(Duration::from_millis(50));
    sub.interrupt();

    let (completed, calls) = reader.join().unwrap();
    assert!(!completed);
    assert_eq!(calls, 1);
    assert!(sub.is_interrupted());
    assert_eq!(sub.signal_available(), 0);

    // Nothing was consumed: a signal published now is still sid 1.
    sub.clear_interrupted();
    queue.publish(b"after");
    assert_eq!(check_signal(&sub, b"after", 0), 1);
}

#[test]
fn test_poll_readiness_fires_once() {
    struct Counter(AtomicU32);
    impl ReadReady for Counter {
        fn read_ready(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();
    let counter = Arc::new(Counter(AtomicU32::new(0)));

    sub.subscribe_readable(&counter);

    let publisher_queue = Arc::clone(&queue);
    thread::spawn(move || publisher_queue.publish(b"ready"))
        .join()
        .unwrap();
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);

    // The observer was dropped after firing; another publish is silent
    // until the subscriber re-arms.
    queue.publish(b"again");
    assert_eq!(counter.0.load(Ordering::SeqCst), 1);

    sub.subscribe_readable(&counter);
    queue.publish(b"rearmed");
    assert_eq!(counter.0.load(Ordering::SeqCst), 2);
}

/// Publish `count` signals whose payloads encode (publisher id, sequence).
fn publish_sequence(queue: &Queue, publisher_id: u32, count: u32) {
    let mut buf = [0u8; 8];
    for seq in 0..count {
        buf[0..4].copy_from_slice(&publisher_id.to_le_bytes());
        buf[4..8].copy_from_slice(&seq.to_le_bytes());
        queue.publish(&buf);
    }
}

/// Read `count` signals, asserting contiguous per-publisher sequences and no
/// losses; returns the observed (sid, publisher) interleaving.
fn check_sequence(sub: &Subscriber, publisher_count: u32, count: usize) -> Vec<(SignalId, u32)> {
    let mut expected = vec![0u32; publisher_count as usize];
    let mut observed = Vec::with_capacity(count);

    while observed.len() < count {
        let completed = sub.dequeue(|event| match event {
            DequeueEvent::Interrupted => panic!("unexpected interruption"),
            DequeueEvent::Signal(signal) => {
                assert_eq!(signal.lost_signals, 0, "lost signals during stress run");
                assert_eq!(signal.payload.len(), 8);

                let publisher =
                    u32::from_le_bytes(signal.payload[0..4].try_into().unwrap());
                let seq = u32::from_le_bytes(signal.payload[4..8].try_into().unwrap());
                assert!(publisher < publisher_count, "unknown publisher {}", publisher);
                assert_eq!(
                    seq, expected[publisher as usize],
                    "publisher {} out of order", publisher
                );

                expected[publisher as usize] += 1;
                observed.push((signal.sid, publisher));
                CallbackResult::CallAgain
            }
        });
        assert!(completed);
    }

    observed
}

#[test]
fn test_concurrent_publishers_and_subscribers() {
    const PUBLISHERS: u32 = 2;
    const SIGNALS_PER_PUBLISHER: u32 = 1200;
    const TOTAL: usize = (PUBLISHERS * SIGNALS_PER_PUBLISHER) as usize;

    let queue = Arc::new(Queue::new(2048));
    let barrier = Arc::new(Barrier::new((PUBLISHERS + 3) as usize));

    let subscribers: Vec<_> = (0..3)
        .map(|_| {
            let sub = queue.subscribe();
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                check_sequence(&sub, PUBLISHERS, TOTAL)
            })
        })
        .collect();

    let publishers: Vec<_> = (0..PUBLISHERS)
        .map(|publisher_id| {
            let queue = Arc::clone(&queue);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                publish_sequence(&queue, publisher_id, SIGNALS_PER_PUBLISHER);
            })
        })
        .collect();

    for publisher in publishers {
        publisher.join().unwrap();
    }
    let interleavings: Vec<_> = subscribers
        .into_iter()
        .map(|sub| sub.join().unwrap())
        .collect();

    // Total order: every subscriber observed the same publisher for the
    // same sid, in the same order.
    for other in &interleavings[1..] {
        assert_eq!(&interleavings[0], other);
    }
}

#[test]
fn test_queue_length_construction_limits() {
    for bad in [0u32, 1, 2, 3, 5, 6, 7, 9, 1000] {
        let result = std::panic::catch_unwind(|| Queue::new(bad));
        assert!(result.is_err(), "length {} must be rejected", bad);
    }
    for good in [4u32, 8, 16, 2048] {
        assert_eq!(Queue::new(good).length(), good);
    }
}

#[test]
fn test_blocked_reader_wakes_on_publish() {
    let queue = Arc::new(Queue::new(4));
    let sub = queue.subscribe();

    let publisher_queue = Arc::clone(&queue);
    let publisher = thread::spawn(move || {
        thread::sleep(Duration::from_millis(50));
        publisher_queue.publish(b"late");
    });

    // Blocks until the publisher thread delivers.
    assert_eq!(check_signal(&sub, b"late", 0), 1);
    publisher.join().unwrap();
}
