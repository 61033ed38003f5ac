//! Access control primitives
//!
//! Every tree entry carries two maps: one keyed by uid, one by gid. Each
//! entry resolves to a set of [`AccessFlags`]; the effective access for a
//! caller is computed in [`super::FileSystem::effective_access`], which OR-
//! merges the uid and gid grants and optionally walks the ancestor chain for
//! cascaded bits.

use std::collections::HashMap;

use crate::config::{AccessDirective, GidAccessConfig, UidAccessConfig};

/// Decoded form of one `"access"` directive list.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub read: bool,
    pub write: bool,
    /// This entry's read/write bits also apply to descendant entries.
    pub cascade: bool,
    /// Inheritance from entries closer to the root stops here.
    pub reset: bool,
}

impl AccessFlags {
    pub fn from_directives(directives: &[AccessDirective]) -> Self {
        let mut flags = Self::default();
        for directive in directives {
            match directive {
                AccessDirective::Read => flags.read = true,
                AccessDirective::Write => flags.write = true,
                AccessDirective::Cascade => flags.cascade = true,
                AccessDirective::Reset => flags.reset = true,
            }
        }
        flags
    }

    pub fn directives(&self) -> Vec<AccessDirective> {
        let mut out = Vec::new();
        if self.read {
            out.push(AccessDirective::Read);
        }
        if self.write {
            out.push(AccessDirective::Write);
        }
        if self.cascade {
            out.push(AccessDirective::Cascade);
        }
        if self.reset {
            out.push(AccessDirective::Reset);
        }
        out
    }
}

/// Map from uid or gid to its access flags on one entry.
#[derive(Debug, Clone, Default)]
pub struct AccessMap {
    entries: HashMap<u32, AccessFlags>,
}

impl AccessMap {
    pub fn from_uid_config(config: &[UidAccessConfig]) -> Self {
        Self {
            entries: config
                .iter()
                .map(|entry| (entry.uid, AccessFlags::from_directives(&entry.access)))
                .collect(),
        }
    }

    pub fn from_gid_config(config: &[GidAccessConfig]) -> Self {
        Self {
            entries: config
                .iter()
                .map(|entry| (entry.gid, AccessFlags::from_directives(&entry.access)))
                .collect(),
        }
    }

    pub fn get(&self, id: u32) -> Option<AccessFlags> {
        self.entries.get(&id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, AccessFlags)> + '_ {
        self.entries.iter().map(|(id, flags)| (*id, *flags))
    }
}
