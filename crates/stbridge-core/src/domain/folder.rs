//! Folder-level values returned by the engine
//!
//! These are passed through the facade untouched. They exist as named
//! structs so embedding applications get a stable, serializable shape
//! independent of the engine's own types.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::file_info::{BlockInfo, FileInfo};
use super::newtypes::DeviceId;

// ============================================================================
// Accounting
// ============================================================================

/// Aggregate counts over a set of files
///
/// The zero value (`Counts::default()`) never stands in for a failed
/// query; sized operations return `Result<Counts, _>`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Counts {
    pub files: u64,
    pub directories: u64,
    pub symlinks: u64,
    pub deleted: u64,
    pub bytes: u64,
    pub sequence: i64,
    pub device_id: DeviceId,
    pub local_flags: u32,
}

impl Counts {
    /// Files, directories, symlinks and tombstones together
    pub fn total_items(&self) -> u64 {
        self.files + self.directories + self.symlinks + self.deleted
    }

    /// Adds one record to the tally
    pub fn add(&mut self, file: &FileInfo) {
        if file.is_deleted() {
            self.deleted += 1;
        } else if file.is_directory() {
            self.directories += 1;
        } else if file.is_symlink() {
            self.symlinks += 1;
        } else {
            self.files += 1;
        }
        self.bytes += file.file_size();
        self.sequence = self.sequence.max(file.sequence);
    }
}

// ============================================================================
// Folder status
// ============================================================================

/// Current state of a folder and when it last changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderState {
    /// Engine state name, e.g. `idle`, `scanning`, `syncing`, `error`
    pub state: String,
    pub changed_at: DateTime<Utc>,
}

/// Ignore file content and the patterns compiled from it
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct IgnorePatterns {
    /// Raw lines as written in the ignore file
    pub lines: Vec<String>,
    /// Effective patterns after comment stripping and includes
    pub patterns: Vec<String>,
}

/// Node of the global directory tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub mod_time: DateTime<Utc>,
    pub size: u64,
    pub entry_type: super::file_info::FileType,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<TreeEntry>,
}

/// A device able to serve a given block
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Availability {
    pub id: DeviceId,
    /// The block would come from the device's in-progress temporary file
    pub from_temporary: bool,
}

/// What a remote device reports about a shared folder
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RemoteFolderState {
    #[default]
    Unknown,
    NotSharing,
    Paused,
    Valid,
}

/// Sync completion of a folder on a device
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct FolderCompletion {
    pub completion_pct: f64,
    pub global_bytes: u64,
    pub need_bytes: u64,
    pub global_items: u64,
    pub need_items: u64,
    pub need_deletes: u64,
    pub remote_state: RemoteFolderState,
    pub sequence: i64,
}

/// Connection statistics for a device
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceStatistics {
    pub last_seen: DateTime<Utc>,
    pub last_connection_duration_secs: f64,
}

/// A folder offered by a remote device as seen at a point in time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObservedFolder {
    pub time: DateTime<Utc>,
    pub label: String,
    pub receive_encrypted: bool,
    pub remote_encrypted: bool,
}

/// A folder offered to us that we have not accepted yet
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PendingFolder {
    pub offered_by: HashMap<DeviceId, ObservedFolder>,
}

/// Per-file error reported by the puller
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileError {
    pub path: String,
    pub err: String,
}

/// Needed files split by puller stage
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct NeededFiles {
    /// Files currently being pulled
    pub progress: Vec<FileInfo>,
    /// Files queued for the current pull iteration
    pub queued: Vec<FileInfo>,
    /// Files to be queued on the next iteration
    pub rest: Vec<FileInfo>,
}

impl NeededFiles {
    pub fn len(&self) -> usize {
        self.progress.len() + self.queued.len() + self.rest.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// ============================================================================
// Block requests
// ============================================================================

/// A request for a single block of a globally known file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockRequest {
    /// Folder-relative path of the file
    pub name: String,
    /// Index of the block within the file
    pub block_no: usize,
    pub offset: u64,
    pub size: u32,
    pub hash: Vec<u8>,
    /// Accept data from the peer's in-progress temporary file
    pub from_temporary: bool,
}

impl BlockRequest {
    /// Builds a request for block `block_no` of `name` described by `block`
    pub fn new(
        name: impl Into<String>,
        block_no: usize,
        block: &BlockInfo,
        from_temporary: bool,
    ) -> Self {
        Self {
            name: name.into(),
            block_no,
            offset: block.offset,
            size: block.size,
            hash: block.hash.clone(),
            from_temporary,
        }
    }
}
