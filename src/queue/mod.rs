//! Broadcast signal queues
//!
//! A [`Queue`] is a bounded, multi-producer/multi-consumer broadcast channel
//! backed by a power-of-two ring of signal slots. Every subscriber sees every
//! signal published at or after its subscription; a subscriber that falls
//! behind the ring is told exactly how many signals it missed; publishers
//! never block on slow readers.
//!
//! All synchronization lives here: one mutex guards the ring and every
//! subscriber cursor, one condition variable parks blocked readers, and a
//! small observer list drives one-shot poll readiness callbacks.

mod ring;
mod subscriber;

pub use subscriber::{Subscriber, SubscriberId};

use std::collections::HashMap;
use std::sync::{Arc, Condvar, Mutex, Weak};

use log::{debug, trace};

use crate::defaults;
use ring::Ring;

/// Queue-local signal id: 64-bit, strictly monotone, assigned at publish,
/// starting at 1. Never reused for the lifetime of the queue.
pub type SignalId = u64;

/// Count of signals (available, lost, remaining).
pub type SignalCount = u32;

/// What the dequeue callback saw.
#[derive(Debug)]
pub enum DequeueEvent<'a> {
    /// The blocking dequeue was interrupted; no signal is carried.
    Interrupted,
    /// One signal, borrowed from the ring while the queue lock is held.
    Signal(SignalRef<'a>),
}

/// One delivered signal.
///
/// `payload` borrows the ring slot directly - valid only for the duration of
/// the callback invocation.
#[derive(Debug)]
pub struct SignalRef<'a> {
    pub sid: SignalId,
    pub payload: &'a [u8],
    /// Number of signals overwritten before this one could be read. Non-zero
    /// only on the first delivery of a dequeue call that had to catch up.
    pub lost_signals: SignalCount,
    /// Signals still readable after this one, at the moment of the callback.
    pub remaining: SignalCount,
}

/// Verdict returned by the dequeue callback for each delivered signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallbackResult {
    /// Signal processed; deliver the next one in the same call if available.
    CallAgain,
    /// Signal processed; return from the dequeue call.
    Stop,
    /// Signal not processed; the cursor stays put and the same signal is
    /// delivered again on the next dequeue call.
    NotProcessed,
}

/// Readiness observer installed by poll support.
///
/// Registered observers are invoked at most once, after the next publish
/// that gives their subscriber a readable signal, and are then dropped.
/// Re-arm by subscribing again.
pub trait ReadReady: Send + Sync {
    fn read_ready(&self);
}

/// Per-subscriber cursor state, guarded by the queue mutex.
#[derive(Debug)]
struct Cursor {
    /// Id of the next signal this subscriber expects to read.
    next_sid: SignalId,
    interrupted: bool,
}

struct QueueState {
    ring: Ring,
    cursors: HashMap<SubscriberId, Cursor>,
    observers: Vec<(SubscriberId, Weak<dyn ReadReady>)>,
}

impl QueueState {
    /// A signal is visible to a cursor when the ring is non-empty and the
    /// slot at the cursor's index holds the expected sid (ready) or a newer
    /// one (overwritten - catch-up required). A smaller sid means the slot
    /// still holds a previous lap's tenant and the reader must keep waiting.
    fn visible(&self, cursor: &Cursor) -> bool {
        if self.ring.is_empty() {
            return false;
        }
        self.ring.slot(self.ring.index_of(cursor.next_sid)).sid() >= cursor.next_sid
    }
}

/// Bounded broadcast queue backing one signal file.
pub struct Queue {
    state: Mutex<QueueState>,
    readable: Condvar,
    max_payload: usize,
}

impl std::fmt::Debug for Queue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Queue")
            .field("max_payload", &self.max_payload)
            .finish_non_exhaustive()
    }
}

impl Queue {
    /// Create a queue of `length` slots.
    ///
    /// Panics unless `length` is a power of two >= 4.
    pub fn new(length: u32) -> Self {
        Self::with_max_payload(length, defaults::MAX_PAYLOAD_SIZE)
    }

    /// Create a queue with a non-default payload size limit.
    pub fn with_max_payload(length: u32, max_payload: usize) -> Self {
        Self {
            state: Mutex::new(QueueState {
                ring: Ring::new(length),
                cursors: HashMap::new(),
                observers: Vec::new(),
            }),
            readable: Condvar::new(),
            max_payload,
        }
    }

    /// Number of slots in the ring.
    pub fn length(&self) -> u32 {
        self.state.lock().unwrap().ring.length()
    }

    /// Largest accepted payload, in bytes.
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Append one signal to the queue. Never blocks on readers.
    ///
    /// Panics if `payload` exceeds the configured maximum; callers on the
    /// filesystem surface validate sizes before reaching this point.
    pub fn publish(&self, payload: &[u8]) {
        assert!(
            payload.len() <= self.max_payload,
            "payload of {} bytes exceeds the queue maximum of {}",
            payload.len(),
            self.max_payload
        );

        let ready = {
            let mut state = self.state.lock().unwrap();
            let sid = state.ring.store_at_head(payload);
            trace!("publish: sid {} ({} bytes)", sid, payload.len());

            // Snapshot ripe observers; they are notified outside the lock.
            let observers = std::mem::take(&mut state.observers);
            let mut ready = Vec::new();
            let mut parked = Vec::new();
            for (id, weak) in observers {
                let visible = state
                    .cursors
                    .get(&id)
                    .map_or(false, |cursor| state.visible(cursor));
                match weak.upgrade() {
                    Some(observer) if visible => ready.push(observer),
                    Some(_) => parked.push((id, weak)),
                    None => {}
                }
            }
            state.observers = parked;
            ready
        };

        self.readable.notify_all();

        for observer in ready {
            observer.read_ready();
        }
    }

    /// Create a subscriber cursor bound to this queue.
    ///
    /// The cursor starts at the queue's next signal id, so the subscriber
    /// sees exactly the signals published at or after this call.
    pub fn subscribe(self: &Arc<Self>) -> Subscriber {
        let id = subscriber::next_subscriber_id();
        let mut state = self.state.lock().unwrap();
        let next_sid = state.ring.next_sid();
        state.cursors.insert(
            id,
            Cursor {
                next_sid,
                interrupted: false,
            },
        );
        debug!("subscribe: subscriber {} starts at sid {}", id, next_sid);
        drop(state);

        Subscriber::new(Arc::clone(self), id)
    }

    /// Deliver zero or more successive signals to `callback`, blocking until
    /// at least one signal is visible to the subscriber or the subscriber is
    /// interrupted.
    ///
    /// Returns `false` if the call was interrupted, in which case the
    /// callback has been invoked exactly once with
    /// [`DequeueEvent::Interrupted`] and the interrupted flag is left set
    /// for the caller to clear.
    ///
    /// The callback runs while the queue lock is held, which is what makes
    /// the zero-copy payload borrow sound. It must not call back into the
    /// same queue.
    pub(crate) fn dequeue_signals<F>(&self, id: SubscriberId, mut callback: F) -> bool
    where
        F: FnMut(DequeueEvent<'_>) -> CallbackResult,
    {
        let state = self.state.lock().unwrap();

        // Re-checked on every wakeup; spurious wakeups fall back to waiting.
        let mut state = self
            .readable
            .wait_while(state, |state| {
                let cursor = state
                    .cursors
                    .get(&id)
                    .expect("subscriber cursor released while dequeuing");
                !cursor.interrupted && !state.visible(cursor)
            })
            .unwrap();

        if state.cursors[&id].interrupted {
            debug!("dequeue: subscriber {} interrupted", id);
            let _ = callback(DequeueEvent::Interrupted);
            return false;
        }

        // Tail catch-up: the expected signal was overwritten, so account the
        // gap as losses and resynchronize on the oldest stored signal.
        let mut lost_signals: SignalCount = 0;
        let tail_sid = state.ring.tail_sid();
        let next_sid = state.cursors[&id].next_sid;
        if tail_sid > next_sid {
            lost_signals = clamped_count(tail_sid - next_sid);
            debug!(
                "dequeue: subscriber {} lost {} signals, catching up {} -> {}",
                id, lost_signals, next_sid, tail_sid
            );
            state.cursors.get_mut(&id).unwrap().next_sid = tail_sid;
        }

        loop {
            let sid = state.cursors[&id].next_sid;
            let remaining = clamped_count(state.ring.next_sid() - sid - 1);
            let slot = state.ring.slot(state.ring.index_of(sid));

            let result = callback(DequeueEvent::Signal(SignalRef {
                sid,
                payload: slot.payload(),
                lost_signals,
                remaining,
            }));
            lost_signals = 0;

            if result != CallbackResult::NotProcessed {
                state.cursors.get_mut(&id).unwrap().next_sid = sid + 1;
            }

            if result != CallbackResult::CallAgain {
                break;
            }
            let cursor = &state.cursors[&id];
            if !state.visible(cursor) {
                break;
            }
        }

        true
    }

    /// Interrupt any in-flight blocking dequeue for this subscriber.
    ///
    /// Idempotent: the flag stays set until the subscriber clears it, so an
    /// interrupt delivered between dequeue calls cancels the next one.
    pub(crate) fn interrupt(&self, id: SubscriberId) {
        {
            let mut state = self.state.lock().unwrap();
            if let Some(cursor) = state.cursors.get_mut(&id) {
                cursor.interrupted = true;
            }
        }
        self.readable.notify_all();
    }

    pub(crate) fn clear_interrupted(&self, id: SubscriberId) {
        let mut state = self.state.lock().unwrap();
        if let Some(cursor) = state.cursors.get_mut(&id) {
            cursor.interrupted = false;
        }
    }

    pub(crate) fn is_interrupted(&self, id: SubscriberId) -> bool {
        let state = self.state.lock().unwrap();
        state.cursors.get(&id).map_or(false, |c| c.interrupted)
    }

    /// Number of signals the subscriber could read without blocking.
    pub(crate) fn signal_available(&self, id: SubscriberId) -> SignalCount {
        let state = self.state.lock().unwrap();
        match state.cursors.get(&id) {
            Some(cursor) => clamped_count(state.ring.next_sid().saturating_sub(cursor.next_sid)),
            None => 0,
        }
    }

    /// Install a one-shot readiness observer for this subscriber, replacing
    /// any observer it had installed before.
    pub(crate) fn subscribe_readable(&self, id: SubscriberId, observer: Weak<dyn ReadReady>) {
        let mut state = self.state.lock().unwrap();
        state.observers.retain(|(oid, _)| *oid != id);
        state.observers.push((id, observer));
    }

    /// Remove this subscriber's readiness observer, if any. Idempotent.
    pub(crate) fn unsubscribe_readable(&self, id: SubscriberId) {
        let mut state = self.state.lock().unwrap();
        state.observers.retain(|(oid, _)| *oid != id);
    }

    /// Drop all per-subscriber state. Called from `Subscriber::drop`.
    pub(crate) fn release_subscriber(&self, id: SubscriberId) {
        let mut state = self.state.lock().unwrap();
        state.cursors.remove(&id);
        state.observers.retain(|(oid, _)| *oid != id);
        debug!("release: subscriber {} gone", id);
    }
}

#[inline]
fn clamped_count(value: u64) -> SignalCount {
    value.min(SignalCount::MAX as u64) as SignalCount
}
