//! JSON configuration model
//!
//! The mount daemon loads one JSON document at startup describing the tree
//! of signal files and their access rules:
//!
//! ```json
//! {
//!   "inherit_access_rights": true,
//!   "root": {
//!     "name": "/",
//!     "uid_access": [ { "uid": 1000, "access": ["read", "write", "cascade"] } ],
//!     "entries": [
//!       { "name": "vehicle", "entries": [
//!         { "name": "speed", "queue_length": 2048 }
//!       ]}
//!     ]
//!   }
//! }
//! ```
//!
//! An entry with an `"entries"` key is a directory; without one it is a
//! signal file, optionally carrying a `queue_length` (power of two >= 4).

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::defaults;
use crate::error::{Result, SigfsError};

/// One directive in an `"access"` list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessDirective {
    /// Grant read access to the signal file or directory
    Read,
    /// Grant write access
    Write,
    /// Contribute this entry's read/write bits to descendant entries
    Cascade,
    /// Stop inheritance from entries closer to the root
    Reset,
}

/// Access entry for one user id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct UidAccessConfig {
    pub uid: u32,
    pub access: Vec<AccessDirective>,
}

/// Access entry for one group id.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GidAccessConfig {
    pub gid: u32,
    pub access: Vec<AccessDirective>,
}

/// One entry in the tree: a directory when `entries` is present, a signal
/// file otherwise.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EntryConfig {
    pub name: String,

    #[serde(default)]
    pub uid_access: Vec<UidAccessConfig>,

    #[serde(default)]
    pub gid_access: Vec<GidAccessConfig>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entries: Option<Vec<EntryConfig>>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue_length: Option<u32>,
}

impl EntryConfig {
    pub fn is_directory(&self) -> bool {
        self.entries.is_some()
    }
}

/// Top-level configuration document.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub root: EntryConfig,

    #[serde(default)]
    pub inherit_access_rights: bool,
}

impl Config {
    /// Parse and validate a configuration from a JSON string.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .map_err(|err| SigfsError::from_io(err, &path.display().to_string()))?;
        Self::from_json(&text)
    }

    fn validate(&self) -> Result<()> {
        if !self.root.is_directory() {
            return Err(SigfsError::config("root entry must be a directory"));
        }
        validate_entry(&self.root, "root", true)
    }
}

fn validate_entry(entry: &EntryConfig, context: &str, is_root: bool) -> Result<()> {
    if entry.name.is_empty() {
        return Err(SigfsError::config(format!("{}: empty entry name", context)));
    }
    // The root is conventionally named "/"; every other name becomes a
    // directory entry and must not contain a separator.
    if !is_root && entry.name.contains('/') {
        return Err(SigfsError::config(format!(
            "{}: entry name {:?} contains '/'",
            context, entry.name
        )));
    }

    match &entry.entries {
        Some(children) => {
            if entry.queue_length.is_some() {
                return Err(SigfsError::config(format!(
                    "{}: directory {:?} carries a queue_length",
                    context, entry.name
                )));
            }
            for child in children {
                validate_entry(child, &format!("{}/{}", context, child.name), false)?;
            }
        }
        None => {
            let length = entry.queue_length.unwrap_or(defaults::DEFAULT_QUEUE_LENGTH);
            if length < 4 || !length.is_power_of_two() {
                return Err(SigfsError::config(format!(
                    "{}: queue_length {} must be a power of 2 and at least 4",
                    context, length
                )));
            }
        }
    }

    Ok(())
}
