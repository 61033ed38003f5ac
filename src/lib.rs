//! # sigfs - Signal Filesystem
//!
//! sigfs projects a configurable tree of named "signal files" into the host
//! filesystem namespace. Each signal file is a bounded, multi-producer /
//! multi-consumer broadcast queue: every process that opens the file for
//! reading receives the stream of discrete, record-framed signals written by
//! every process that opens it for writing, with explicit accounting of
//! signals dropped when a slow reader falls behind.
//!
//! Because the transport is the ordinary filesystem surface, any process
//! (including container-isolated ones) can publish and subscribe with plain
//! `open`/`read`/`write`/`poll` syscalls - no IPC library required.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────┐
//! │                 sigfs mount daemon               │
//! ├──────────────────────────────────────────────────┤
//! │  FUSE bridge        │  Filesystem tree           │
//! │  - open/read/write  │  - JSON-configured inodes  │
//! │  - poll readiness   │  - uid/gid access control  │
//! ├──────────────────────────────────────────────────┤
//! │              Broadcast signal queues             │
//! │  - bounded ring, monotone signal ids             │
//! │  - per-subscriber cursors, lost-signal counts    │
//! │  - publishers never block on slow readers        │
//! └──────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod filesystem;
pub mod fuse;
pub mod logging;
pub mod queue;
pub mod wire;

// Main API re-exports
pub use config::{AccessDirective, Config, EntryConfig};
pub use error::{Result, SigfsError};
pub use filesystem::{AccessFlags, Directory, File, FileSystem, INode, Ino};
pub use queue::{
    CallbackResult, DequeueEvent, Queue, ReadReady, SignalCount, SignalId, SignalRef, Subscriber,
    SubscriberId,
};

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default configuration constants
pub mod defaults {
    /// Queue length used when a file entry does not specify one (16 Mi slots)
    pub const DEFAULT_QUEUE_LENGTH: u32 = 16 * 1024 * 1024;

    /// Largest accepted signal payload, in bytes
    pub const MAX_PAYLOAD_SIZE: usize = 64 * 1024;

    /// Maximum number of signal records packed into one read reply
    pub const MAX_SIGNALS_PER_READ: usize = 20;

    /// Inode number of the configured root directory
    pub const ROOT_INODE: u64 = 1;
}
