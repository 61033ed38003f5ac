//! FUSE bridge
//!
//! Adapts kernel filesystem requests onto the tree and the signal queues:
//! `open` creates a subscriber, `write` parses payload records and publishes
//! them, `read` dequeues signal records, `poll` arms one-shot readiness
//! notifications.
//!
//! The session dispatches requests on a single thread, so a read that has to
//! wait for a signal moves its reply into a worker thread; the dispatch loop
//! stays free to serve the publisher that will unblock it.

mod watcher;

pub use watcher::PollWatcher;

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, SystemTime};

use fuser::{
    FileAttr, FileType, Filesystem, KernelConfig, Notifier, PollHandle, ReplyAttr, ReplyData,
    ReplyDirectory, ReplyEmpty, ReplyEntry, ReplyOpen, ReplyPoll, ReplyWrite, Request,
};
use log::{debug, info, warn};

use crate::defaults;
use crate::filesystem::{FileSystem, INode};
use crate::queue::{CallbackResult, DequeueEvent, Subscriber};
use crate::wire;

/// Attribute and entry validity reported to the kernel.
const TTL: Duration = Duration::from_secs(1);

/// One open file handle: the subscriber cursor plus its poll watcher.
struct OpenHandle {
    sub: Arc<Subscriber>,
    watcher: Arc<PollWatcher>,
}

/// The mounted signal filesystem.
pub struct SignalFs {
    fsys: Arc<FileSystem>,
    handles: HashMap<u64, OpenHandle>,
    next_fh: u64,
    notifier: Arc<OnceLock<Notifier>>,
}

impl SignalFs {
    pub fn new(fsys: Arc<FileSystem>) -> Self {
        Self {
            fsys,
            handles: HashMap::new(),
            next_fh: 1,
            notifier: Arc::new(OnceLock::new()),
        }
    }

    /// Cell to fill with the session notifier once the session exists.
    pub fn notifier_cell(&self) -> Arc<OnceLock<Notifier>> {
        Arc::clone(&self.notifier)
    }

    /// Synthesize attributes for an entry as seen by one caller: the caller
    /// appears as the owner, and the permission bits mirror its effective
    /// access.
    fn attr_for(&self, node: &INode, uid: u32, gid: u32) -> FileAttr {
        let (can_read, can_write) = self.fsys.effective_access(node.ino(), uid, gid);
        let now = SystemTime::now();

        let (kind, perm, nlink) = if node.is_directory() {
            let mut perm = 0o000;
            if can_read {
                perm |= 0o500;
            }
            if can_write {
                perm |= 0o200;
            }
            (FileType::Directory, perm, 2)
        } else {
            let mut perm = 0o000;
            if can_read {
                perm |= 0o400;
            }
            if can_write {
                perm |= 0o200;
            }
            (FileType::RegularFile, perm, 1)
        };

        FileAttr {
            ino: node.ino(),
            size: 0,
            blocks: 0,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            kind,
            perm,
            nlink,
            uid,
            gid,
            rdev: 0,
            blksize: 512,
            flags: 0,
        }
    }
}

impl Filesystem for SignalFs {
    fn init(&mut self, _req: &Request<'_>, _config: &mut KernelConfig) -> Result<(), libc::c_int> {
        info!("mounted {} inodes", self.fsys.len());
        Ok(())
    }

    fn destroy(&mut self) {
        debug!("unmounting; dropping {} open handles", self.handles.len());
        for handle in self.handles.values() {
            handle.sub.interrupt();
        }
        self.handles.clear();
    }

    fn lookup(&mut self, req: &Request<'_>, parent: u64, name: &OsStr, reply: ReplyEntry) {
        let Some(node) = self.fsys.lookup_inode(parent) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(dir) = node.as_directory() else {
            reply.error(libc::ENOTDIR);
            return;
        };
        let Some(name) = name.to_str() else {
            reply.error(libc::ENOENT);
            return;
        };

        match dir.lookup_entry(name) {
            Some(ino) => {
                let child = self
                    .fsys
                    .lookup_inode(ino)
                    .expect("directory entry points at a missing inode");
                reply.entry(&TTL, &self.attr_for(child, req.uid(), req.gid()), 0);
            }
            None => reply.error(libc::ENOENT),
        }
    }

    fn getattr(&mut self, req: &Request<'_>, ino: u64, _fh: Option<u64>, reply: ReplyAttr) {
        match self.fsys.lookup_inode(ino) {
            Some(node) => reply.attr(&TTL, &self.attr_for(node, req.uid(), req.gid())),
            None => reply.error(libc::ENOENT),
        }
    }

    fn readdir(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        _fh: u64,
        offset: i64,
        mut reply: ReplyDirectory,
    ) {
        let Some(node) = self.fsys.lookup_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(dir) = node.as_directory() else {
            reply.error(libc::ENOTDIR);
            return;
        };

        let mut entries: Vec<(u64, FileType, String)> = vec![
            (ino, FileType::Directory, ".".to_string()),
            (node.parent_ino(), FileType::Directory, "..".to_string()),
        ];
        dir.for_each_entry(|name, child_ino| {
            let kind = match self.fsys.lookup_inode(child_ino) {
                Some(child) if child.is_directory() => FileType::Directory,
                _ => FileType::RegularFile,
            };
            entries.push((child_ino, kind, name.to_string()));
        });

        for (index, (entry_ino, kind, name)) in
            entries.into_iter().enumerate().skip(offset as usize)
        {
            // The reported offset is the index of the next entry.
            if reply.add(entry_ino, (index + 1) as i64, kind, name) {
                break;
            }
        }
        reply.ok();
    }

    fn open(&mut self, req: &Request<'_>, ino: u64, flags: i32, reply: ReplyOpen) {
        let Some(node) = self.fsys.lookup_inode(ino) else {
            reply.error(libc::ENOENT);
            return;
        };
        let Some(file) = node.as_file() else {
            reply.error(libc::EISDIR);
            return;
        };

        let (can_read, can_write) = self.fsys.effective_access(ino, req.uid(), req.gid());
        match flags & libc::O_ACCMODE {
            // Mixing read and write on one handle is never allowed.
            libc::O_RDWR => {
                info!("open {:?}: O_RDWR refused", node.name());
                reply.error(libc::EACCES);
                return;
            }
            libc::O_RDONLY if !can_read => {
                debug!("open {:?}: read denied for uid {}", node.name(), req.uid());
                reply.error(libc::EACCES);
                return;
            }
            libc::O_WRONLY if !can_write => {
                debug!("open {:?}: write denied for uid {}", node.name(), req.uid());
                reply.error(libc::EACCES);
                return;
            }
            _ => {}
        }

        let sub = Arc::new(file.queue().subscribe());
        let watcher = Arc::new(PollWatcher::new(Arc::clone(&self.notifier)));
        let fh = self.next_fh;
        self.next_fh += 1;
        debug!(
            "open {:?}: fh {} subscriber {}",
            node.name(),
            fh,
            sub.id()
        );
        self.handles.insert(fh, OpenHandle { sub, watcher });

        reply.opened(fh, fuser::consts::FOPEN_DIRECT_IO | fuser::consts::FOPEN_NONSEEKABLE);
    }

    fn release(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _flags: i32,
        _lock_owner: Option<u64>,
        _flush: bool,
        reply: ReplyEmpty,
    ) {
        if let Some(handle) = self.handles.remove(&fh) {
            debug!("release fh {} subscriber {}", fh, handle.sub.id());
            // Unblock any worker still waiting in a dequeue; the subscriber
            // itself is dropped once the last worker lets go of it.
            handle.sub.interrupt();
            handle.watcher.disarm();
        }
        reply.ok();
    }

    fn read(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        _offset: i64,
        size: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyData,
    ) {
        let Some(handle) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let sub = Arc::clone(&handle.sub);

        // The dequeue may block until a publisher shows up; serve it off the
        // dispatch thread so publishes can still be processed.
        std::thread::spawn(move || serve_read(sub, size as usize, reply));
    }

    fn write(
        &mut self,
        _req: &Request<'_>,
        ino: u64,
        fh: u64,
        _offset: i64,
        data: &[u8],
        _write_flags: u32,
        _flags: i32,
        _lock_owner: Option<u64>,
        reply: ReplyWrite,
    ) {
        let Some(handle) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };
        let queue = Arc::clone(handle.sub.queue());

        let records = match wire::split_payload_records(data) {
            Ok(records) => records,
            Err(err) => {
                warn!("write to inode {}: {}", ino, err);
                reply.error(err.errno());
                return;
            }
        };
        if let Some(oversized) = records.iter().find(|r| r.len() > queue.max_payload()) {
            warn!(
                "write to inode {}: payload of {} bytes exceeds the maximum of {}",
                ino,
                oversized.len(),
                queue.max_payload()
            );
            reply.error(libc::EINVAL);
            return;
        }

        for record in &records {
            queue.publish(record);
        }
        debug!("write to inode {}: published {} signals", ino, records.len());
        reply.written(data.len() as u32);
    }

    fn poll(
        &mut self,
        _req: &Request<'_>,
        _ino: u64,
        fh: u64,
        ph: PollHandle,
        events: u32,
        _flags: u32,
        reply: ReplyPoll,
    ) {
        let Some(handle) = self.handles.get(&fh) else {
            reply.error(libc::EBADF);
            return;
        };

        let pollin = libc::POLLIN as u32;
        if events & pollin == 0 {
            handle.sub.unsubscribe_readable();
            handle.watcher.disarm();
            reply.poll(0);
            return;
        }

        if handle.sub.signal_available() > 0 {
            reply.poll(pollin);
            return;
        }

        // Nothing readable yet: park the kernel handle and arm a one-shot
        // notification on the next visible publish.
        handle.watcher.arm(ph.into());
        handle.sub.subscribe_readable(&handle.watcher);
        reply.poll(0);
    }
}

/// Pack dequeued signals into one read reply.
fn serve_read(sub: Arc<Subscriber>, budget: usize, reply: ReplyData) {
    let mut out: Vec<u8> = Vec::new();
    let mut delivered = 0usize;

    let completed = sub.dequeue(|event| {
        let signal = match event {
            DequeueEvent::Interrupted => return CallbackResult::NotProcessed,
            DequeueEvent::Signal(signal) => signal,
        };

        // Whole records only: a signal that does not fit is left queued.
        if out.len() + wire::SIGNAL_HEADER_SIZE + signal.payload.len() > budget {
            return CallbackResult::NotProcessed;
        }

        wire::encode_signal(&mut out, signal.lost_signals, signal.sid, signal.payload);
        delivered += 1;

        if delivered < defaults::MAX_SIGNALS_PER_READ && signal.remaining > 0 {
            CallbackResult::CallAgain
        } else {
            CallbackResult::Stop
        }
    });

    if completed {
        debug!(
            "read: subscriber {} got {} signals, {} bytes",
            sub.id(),
            delivered,
            out.len()
        );
        reply.data(&out);
    } else {
        sub.clear_interrupted();
        reply.error(libc::EINTR);
    }
}
