//! Per-open subscriber cursors
//!
//! A [`Subscriber`] is created for every open of a signal file and owns that
//! open's position in the queue. The cursor state itself (next expected
//! signal id, interrupted flag) lives under the queue lock; this handle is
//! the capability to act on it, and deregisters on drop.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use super::{CallbackResult, DequeueEvent, Queue, ReadReady, SignalCount};

/// Process-wide unique subscriber id, used for diagnostics and to key the
/// cursor state inside the queue.
pub type SubscriberId = u64;

static NEXT_SUBSCRIBER_ID: AtomicU64 = AtomicU64::new(0);

pub(super) fn next_subscriber_id() -> SubscriberId {
    NEXT_SUBSCRIBER_ID.fetch_add(1, Ordering::Relaxed)
}

/// Cursor handle into one [`Queue`].
///
/// Created by [`Queue::subscribe`]; moves with the file handle that opened
/// the signal file. Dropping the subscriber releases its cursor and any
/// readiness observer it had installed.
#[derive(Debug)]
pub struct Subscriber {
    queue: Arc<Queue>,
    id: SubscriberId,
}

impl Subscriber {
    pub(super) fn new(queue: Arc<Queue>, id: SubscriberId) -> Self {
        Self { queue, id }
    }

    pub fn id(&self) -> SubscriberId {
        self.id
    }

    pub fn queue(&self) -> &Arc<Queue> {
        &self.queue
    }

    /// Deliver signals to `callback`, blocking until one is visible or the
    /// subscriber is interrupted. See [`Queue::dequeue_signals`].
    pub fn dequeue<F>(&self, callback: F) -> bool
    where
        F: FnMut(DequeueEvent<'_>) -> CallbackResult,
    {
        self.queue.dequeue_signals(self.id, callback)
    }

    /// Interrupt an in-flight blocking dequeue on this subscriber.
    pub fn interrupt(&self) {
        self.queue.interrupt(self.id);
    }

    /// Clear the interrupted flag; required before the next dequeue after an
    /// interruption.
    pub fn clear_interrupted(&self) {
        self.queue.clear_interrupted(self.id);
    }

    pub fn is_interrupted(&self) -> bool {
        self.queue.is_interrupted(self.id)
    }

    /// Number of signals immediately readable by this subscriber.
    pub fn signal_available(&self) -> SignalCount {
        self.queue.signal_available(self.id)
    }

    /// Arm a one-shot readable notification for this subscriber.
    pub fn subscribe_readable<O>(&self, observer: &Arc<O>)
    where
        O: ReadReady + 'static,
    {
        let weak: std::sync::Weak<O> = Arc::downgrade(observer);
        let weak: std::sync::Weak<dyn ReadReady> = weak;
        self.queue.subscribe_readable(self.id, weak);
    }

    /// Disarm the readable notification, if armed. Idempotent.
    pub fn unsubscribe_readable(&self) {
        self.queue.unsubscribe_readable(self.id);
    }
}

impl Drop for Subscriber {
    fn drop(&mut self) {
        self.queue.release_subscriber(self.id);
    }
}
