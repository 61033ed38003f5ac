//! Tree entries: directories and signal files
//!
//! The original design goal here is the replacement of an inheritance
//! hierarchy with a tagged union: an [`INode`] is either a [`Directory`] or
//! a [`File`], and callers pattern-match instead of downcasting. Nodes do
//! not own their children or parents; they reference them by inode id and
//! the arena in [`super::FileSystem`] resolves the ids.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, OnceLock};

use crate::config::{EntryConfig, GidAccessConfig, UidAccessConfig};
use crate::queue::Queue;

use super::access::AccessMap;
use super::Ino;

/// State shared by both node kinds.
#[derive(Debug)]
pub(super) struct NodeMeta {
    name: String,
    ino: Ino,
    parent: Ino,
    uid_access: AccessMap,
    gid_access: AccessMap,
    /// Resolved (read, write) per caller, filled on first access check.
    access_cache: Mutex<std::collections::HashMap<(u32, u32), (bool, bool)>>,
}

impl NodeMeta {
    fn new(config: &EntryConfig, ino: Ino, parent: Ino) -> Self {
        Self {
            name: config.name.clone(),
            ino,
            parent,
            uid_access: AccessMap::from_uid_config(&config.uid_access),
            gid_access: AccessMap::from_gid_config(&config.gid_access),
            access_cache: Mutex::new(std::collections::HashMap::new()),
        }
    }

    pub fn cached_access(&self, uid: u32, gid: u32) -> Option<(bool, bool)> {
        self.access_cache.lock().unwrap().get(&(uid, gid)).copied()
    }

    pub fn cache_access(&self, uid: u32, gid: u32, access: (bool, bool)) {
        self.access_cache.lock().unwrap().insert((uid, gid), access);
    }
}

/// One entry in the signal filesystem tree.
#[derive(Debug)]
pub enum INode {
    Directory(Directory),
    File(File),
}

impl INode {
    pub fn name(&self) -> &str {
        &self.meta().name
    }

    pub fn ino(&self) -> Ino {
        self.meta().ino
    }

    /// Inode of the containing directory; the root is its own parent.
    pub fn parent_ino(&self) -> Ino {
        self.meta().parent
    }

    pub fn is_directory(&self) -> bool {
        matches!(self, Self::Directory(_))
    }

    pub fn is_file(&self) -> bool {
        matches!(self, Self::File(_))
    }

    pub fn as_directory(&self) -> Option<&Directory> {
        match self {
            Self::Directory(dir) => Some(dir),
            Self::File(_) => None,
        }
    }

    pub fn as_file(&self) -> Option<&File> {
        match self {
            Self::Directory(_) => None,
            Self::File(file) => Some(file),
        }
    }

    pub fn uid_access(&self) -> &AccessMap {
        &self.meta().uid_access
    }

    pub fn gid_access(&self) -> &AccessMap {
        &self.meta().gid_access
    }

    pub(super) fn meta(&self) -> &NodeMeta {
        match self {
            Self::Directory(dir) => &dir.meta,
            Self::File(file) => &file.meta,
        }
    }

    /// Serialize back to the configuration shape, for diagnostics.
    pub(super) fn to_config(&self, arena: &[INode]) -> EntryConfig {
        let meta = self.meta();
        let uid_access = meta
            .uid_access
            .iter()
            .map(|(uid, flags)| UidAccessConfig {
                uid,
                access: flags.directives(),
            })
            .collect();
        let gid_access = meta
            .gid_access
            .iter()
            .map(|(gid, flags)| GidAccessConfig {
                gid,
                access: flags.directives(),
            })
            .collect();

        match self {
            Self::Directory(dir) => EntryConfig {
                name: meta.name.clone(),
                uid_access,
                gid_access,
                entries: Some(
                    dir.entries
                        .values()
                        .map(|ino| arena[(*ino - 1) as usize].to_config(arena))
                        .collect(),
                ),
                queue_length: None,
            },
            Self::File(file) => EntryConfig {
                name: meta.name.clone(),
                uid_access,
                gid_access,
                entries: None,
                queue_length: Some(file.queue_length),
            },
        }
    }
}

/// Directory entry: an ordered name -> inode map.
#[derive(Debug)]
pub struct Directory {
    pub(super) meta: NodeMeta,
    entries: BTreeMap<String, Ino>,
}

impl Directory {
    pub(super) fn new(config: &EntryConfig, ino: Ino, parent: Ino) -> Self {
        Self {
            meta: NodeMeta::new(config, ino, parent),
            entries: BTreeMap::new(),
        }
    }

    pub(super) fn insert(&mut self, name: String, ino: Ino) {
        self.entries.insert(name, ino);
    }

    /// Inode of the named child, if present.
    pub fn lookup_entry(&self, name: &str) -> Option<Ino> {
        self.entries.get(name).copied()
    }

    /// Visit every child in name order.
    pub fn for_each_entry(&self, mut f: impl FnMut(&str, Ino)) {
        for (name, ino) in &self.entries {
            f(name, *ino);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Signal file entry; its queue is created on first open and shared by every
/// subscriber afterwards.
#[derive(Debug)]
pub struct File {
    pub(super) meta: NodeMeta,
    queue_length: u32,
    queue: OnceLock<Arc<Queue>>,
}

impl File {
    pub(super) fn new(config: &EntryConfig, ino: Ino, parent: Ino, queue_length: u32) -> Self {
        Self {
            meta: NodeMeta::new(config, ino, parent),
            queue_length,
            queue: OnceLock::new(),
        }
    }

    pub fn queue_length(&self) -> u32 {
        self.queue_length
    }

    /// The file's queue, constructed lazily and idempotently.
    pub fn queue(&self) -> Arc<Queue> {
        self.queue
            .get_or_init(|| Arc::new(Queue::new(self.queue_length)))
            .clone()
    }

    /// Whether the queue has been constructed yet.
    pub fn has_queue(&self) -> bool {
        self.queue.get().is_some()
    }
}
