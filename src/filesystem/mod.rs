//! The configured tree of signal files
//!
//! A [`FileSystem`] is built once from the JSON configuration and is
//! read-only afterwards: a flat arena owns every node, inode ids double as
//! arena indices (offset by one), and children refer to their parent by
//! inode id so access inheritance can walk rootward without ownership
//! cycles. The root directory always has inode 1.

mod access;
mod node;

pub use access::{AccessFlags, AccessMap};
pub use node::{Directory, File, INode};

use log::debug;

use crate::config::{Config, EntryConfig};
use crate::defaults;
use crate::error::{Result, SigfsError};

/// Inode number; assigned depth-first at build time, starting at the root.
pub type Ino = u64;

/// Arena of tree entries plus the global access-inheritance switch.
#[derive(Debug)]
pub struct FileSystem {
    nodes: Vec<INode>,
    inherit_access_rights: bool,
}

impl FileSystem {
    /// Build the tree from a validated configuration.
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.root.is_directory() {
            return Err(SigfsError::config("root entry must be a directory"));
        }

        let mut nodes = Vec::new();
        add_entry(&mut nodes, defaults::ROOT_INODE, &config.root)?;
        debug!("filesystem: built {} inodes", nodes.len());

        Ok(Self {
            nodes,
            inherit_access_rights: config.inherit_access_rights,
        })
    }

    pub fn inherit_access_rights(&self) -> bool {
        self.inherit_access_rights
    }

    pub fn root(&self) -> &INode {
        &self.nodes[(defaults::ROOT_INODE - 1) as usize]
    }

    /// Resolve an inode id; `None` for ids never assigned.
    pub fn lookup_inode(&self, ino: Ino) -> Option<&INode> {
        if ino == 0 {
            return None;
        }
        self.nodes.get((ino - 1) as usize)
    }

    /// Number of entries in the tree.
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Effective `(can_read, can_write)` for a caller on one entry.
    ///
    /// The entry's own uid and gid grants always apply and are OR-merged.
    /// When `inherit_access_rights` is set, ancestors contribute the
    /// read/write bits of entries marked `cascade`; an entry marked `reset`
    /// (on the node itself or an ancestor) stops the walk there. A caller
    /// with no matching entry anywhere is denied. Results are cached on the
    /// node per `(uid, gid)`.
    pub fn effective_access(&self, ino: Ino, uid: u32, gid: u32) -> (bool, bool) {
        let Some(node) = self.lookup_inode(ino) else {
            return (false, false);
        };

        if let Some(cached) = node.meta().cached_access(uid, gid) {
            return cached;
        }

        let own = [node.uid_access().get(uid), node.gid_access().get(gid)];
        let mut can_read = false;
        let mut can_write = false;
        let mut halted = false;
        for flags in own.into_iter().flatten() {
            can_read |= flags.read;
            can_write |= flags.write;
            halted |= flags.reset;
        }

        if self.inherit_access_rights {
            let mut current = node;
            while !halted && current.ino() != current.parent_ino() {
                let parent = self
                    .lookup_inode(current.parent_ino())
                    .expect("parent inode missing from arena");
                let entries = [parent.uid_access().get(uid), parent.gid_access().get(gid)];
                for flags in entries.into_iter().flatten() {
                    if flags.cascade {
                        can_read |= flags.read;
                        can_write |= flags.write;
                    }
                    halted |= flags.reset;
                }
                current = parent;
            }
        }

        node.meta().cache_access(uid, gid, (can_read, can_write));
        (can_read, can_write)
    }

    /// Serialize the tree back to its configuration shape, for diagnostics.
    pub fn to_config(&self) -> Config {
        Config {
            root: self.root().to_config(&self.nodes),
            inherit_access_rights: self.inherit_access_rights,
        }
    }
}

/// Add `config` and its subtree to the arena, returning the assigned inode.
fn add_entry(nodes: &mut Vec<INode>, parent: Ino, config: &EntryConfig) -> Result<Ino> {
    let ino = nodes.len() as Ino + 1;

    match &config.entries {
        Some(children) => {
            nodes.push(INode::Directory(Directory::new(config, ino, parent)));
            for child in children {
                let child_ino = add_entry(nodes, ino, child)?;
                let INode::Directory(dir) = &mut nodes[(ino - 1) as usize] else {
                    unreachable!("directory node changed kind during build");
                };
                if dir.lookup_entry(&child.name).is_some() {
                    return Err(SigfsError::config(format!(
                        "duplicate entry {:?} in directory {:?}",
                        child.name, config.name
                    )));
                }
                dir.insert(child.name.clone(), child_ino);
            }
        }
        None => {
            let queue_length = config.queue_length.unwrap_or(defaults::DEFAULT_QUEUE_LENGTH);
            if queue_length < 4 || !queue_length.is_power_of_two() {
                return Err(SigfsError::config(format!(
                    "file {:?}: queue_length {} must be a power of 2 and at least 4",
                    config.name, queue_length
                )));
            }
            nodes.push(INode::File(File::new(config, ino, parent, queue_length)));
        }
    }

    Ok(ino)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;

    fn build(json: &str) -> FileSystem {
        FileSystem::from_config(&Config::from_json(json).unwrap()).unwrap()
    }

    #[test]
    fn test_root_is_inode_one() {
        let fsys = build(r#"{ "root": { "name": "/", "entries": [] } }"#);
        assert_eq!(fsys.root().ino(), 1);
        assert_eq!(fsys.root().parent_ino(), 1);
        assert!(fsys.root().is_directory());
    }

    #[test]
    fn test_depth_first_inode_assignment() {
        let fsys = build(
            r#"{ "root": { "name": "/", "entries": [
                { "name": "a", "entries": [ { "name": "x" } ] },
                { "name": "b" }
            ] } }"#,
        );
        assert_eq!(fsys.len(), 4);

        let root = fsys.root().as_directory().unwrap();
        let a = fsys.lookup_inode(root.lookup_entry("a").unwrap()).unwrap();
        assert_eq!(a.ino(), 2);
        let x = fsys
            .lookup_inode(a.as_directory().unwrap().lookup_entry("x").unwrap())
            .unwrap();
        assert_eq!(x.ino(), 3);
        assert_eq!(x.parent_ino(), 2);
        let b = fsys.lookup_inode(root.lookup_entry("b").unwrap()).unwrap();
        assert_eq!(b.ino(), 4);
        assert!(b.is_file());

        assert!(fsys.lookup_inode(0).is_none());
        assert!(fsys.lookup_inode(5).is_none());
    }

    #[test]
    fn test_duplicate_names_rejected() {
        let config = Config::from_json(
            r#"{ "root": { "name": "/", "entries": [
                { "name": "twice" },
                { "name": "twice" }
            ] } }"#,
        )
        .unwrap();
        assert!(FileSystem::from_config(&config).is_err());
    }
}
