//! One-shot poll readiness forwarding
//!
//! The kernel hands every pending `poll` a handle that we must answer with a
//! poll notification once the file becomes readable. A [`PollWatcher`] parks
//! that handle and, when the queue reports readability, forwards it to the
//! session notifier exactly once. Each `poll` request re-arms the watcher.

use std::sync::{Arc, Mutex, OnceLock};

use fuser::Notifier;
use log::{debug, warn};

use crate::queue::ReadReady;

pub struct PollWatcher {
    notifier: Arc<OnceLock<Notifier>>,
    handle: Mutex<Option<u64>>,
}

impl PollWatcher {
    pub fn new(notifier: Arc<OnceLock<Notifier>>) -> Self {
        Self {
            notifier,
            handle: Mutex::new(None),
        }
    }

    /// Park a kernel poll handle, replacing any previous one.
    pub fn arm(&self, kh: u64) {
        *self.handle.lock().unwrap() = Some(kh);
    }

    pub fn disarm(&self) {
        *self.handle.lock().unwrap() = None;
    }
}

impl ReadReady for PollWatcher {
    fn read_ready(&self) {
        let Some(kh) = self.handle.lock().unwrap().take() else {
            debug!("poll watcher fired without a parked handle");
            return;
        };
        let Some(notifier) = self.notifier.get() else {
            warn!("poll watcher fired before the session notifier was set");
            return;
        };
        if let Err(err) = notifier.poll(kh) {
            warn!("poll notification failed: {}", err);
        }
    }
}
