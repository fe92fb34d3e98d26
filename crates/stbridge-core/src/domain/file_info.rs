//! File records
//!
//! Two shapes of the same file exist at the engine boundary:
//!
//! - [`FileMetadata`] is what the streaming enumeration yields. It is cheap
//!   to produce even for very large folders and carries no block list.
//! - [`FileInfo`] is the full record (blocks, version vector, flags),
//!   resolved on demand by name.
//!
//! A `FileMetadata` observed during enumeration is not guaranteed to still
//! resolve to a `FileInfo`; the global index keeps moving underneath.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::newtypes::ShortId;

/// Kind of filesystem object a record describes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileType {
    #[default]
    File,
    Directory,
    Symlink,
}

/// One counter of a version vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Counter {
    pub id: ShortId,
    pub value: u64,
}

/// Version vector, counters kept sorted by device short ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Vector {
    pub counters: Vec<Counter>,
}

impl Vector {
    /// Creates an empty vector
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns a copy with the counter for `id` set to `value`
    #[must_use]
    pub fn with(mut self, id: ShortId, value: u64) -> Self {
        match self.counters.binary_search_by_key(&id, |c| c.id) {
            Ok(idx) => self.counters[idx].value = value,
            Err(idx) => self.counters.insert(idx, Counter { id, value }),
        }
        self
    }

    /// Counter value for `id`, zero when absent
    pub fn counter(&self, id: ShortId) -> u64 {
        self.counters
            .binary_search_by_key(&id, |c| c.id)
            .map(|idx| self.counters[idx].value)
            .unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.counters.is_empty()
    }
}

/// A single content block of a file
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct BlockInfo {
    /// Byte offset of the block within the file
    pub offset: u64,
    /// Block length in bytes
    pub size: u32,
    /// Content hash of the block
    pub hash: Vec<u8>,
}

/// Full description of a file as known to the engine's index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    /// Folder-relative path, `/`-separated
    pub name: String,
    pub file_type: FileType,
    pub size: u64,
    pub permissions: u32,
    pub modified: DateTime<Utc>,
    pub modified_by: ShortId,
    pub deleted: bool,
    /// Record was announced but is not valid for syncing (ignored, unsupported, ...)
    pub invalid: bool,
    pub no_permissions: bool,
    pub sequence: i64,
    pub version: Vector,
    pub block_size: u32,
    pub blocks: Vec<BlockInfo>,
    pub symlink_target: Option<String>,
    pub local_flags: u32,
}

impl FileInfo {
    /// Local flag: changed locally in a receive-only folder
    pub const FLAG_LOCAL_RECEIVE_ONLY: u32 = 1 << 3;

    /// Creates a regular file record with default attributes
    pub fn new_file(name: impl Into<String>, size: u64) -> Self {
        Self::with_type(name, FileType::File, size)
    }

    /// Creates a directory record
    pub fn new_directory(name: impl Into<String>) -> Self {
        let mut info = Self::with_type(name, FileType::Directory, 0);
        info.permissions = 0o755;
        info
    }

    /// Creates a symlink record pointing at `target`
    pub fn new_symlink(name: impl Into<String>, target: impl Into<String>) -> Self {
        let mut info = Self::with_type(name, FileType::Symlink, 0);
        info.symlink_target = Some(target.into());
        info
    }

    fn with_type(name: impl Into<String>, file_type: FileType, size: u64) -> Self {
        Self {
            name: name.into(),
            file_type,
            size,
            permissions: 0o644,
            modified: Utc::now(),
            modified_by: ShortId::new(0),
            deleted: false,
            invalid: false,
            no_permissions: false,
            sequence: 0,
            version: Vector::new(),
            block_size: 0,
            blocks: Vec::new(),
            symlink_target: None,
            local_flags: 0,
        }
    }

    /// Sets the version vector
    #[must_use]
    pub fn with_version(mut self, version: Vector) -> Self {
        self.version = version;
        self
    }

    /// Sets the block list; block size is taken from the first block
    #[must_use]
    pub fn with_blocks(mut self, blocks: Vec<BlockInfo>) -> Self {
        self.block_size = blocks.first().map(|b| b.size).unwrap_or(0);
        self.blocks = blocks;
        self
    }

    /// Sets the sequence number
    #[must_use]
    pub fn with_sequence(mut self, sequence: i64) -> Self {
        self.sequence = sequence;
        self
    }

    /// Marks the record as a deletion tombstone
    pub fn mark_deleted(&mut self) {
        self.deleted = true;
        self.size = 0;
        self.blocks.clear();
    }

    pub fn is_directory(&self) -> bool {
        self.file_type == FileType::Directory
    }

    pub fn is_symlink(&self) -> bool {
        self.file_type == FileType::Symlink
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    /// Local change in a receive-only folder, pending revert
    pub fn is_receive_only_changed(&self) -> bool {
        self.local_flags & Self::FLAG_LOCAL_RECEIVE_ONLY != 0
    }

    /// Size as counted in accounting: tombstones and directories have none
    pub fn file_size(&self) -> u64 {
        if self.deleted || self.is_directory() {
            0
        } else {
            self.size
        }
    }
}

/// Lightweight record yielded by the engine's streaming enumeration
///
/// Only `name` is meaningful to the facade; the remaining columns are the
/// ones the engine has at hand without loading the full record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileMetadata {
    pub name: String,
    pub sequence: i64,
    pub mod_nanos: i64,
    pub size: u64,
    pub local_flags: u32,
    pub file_type: FileType,
    pub deleted: bool,
}

impl FileMetadata {
    /// Metadata carrying only a name; other columns are zeroed
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sequence: 0,
            mod_nanos: 0,
            size: 0,
            local_flags: 0,
            file_type: FileType::File,
            deleted: false,
        }
    }
}

impl From<&FileInfo> for FileMetadata {
    fn from(info: &FileInfo) -> Self {
        Self {
            name: info.name.clone(),
            sequence: info.sequence,
            mod_nanos: info.modified.timestamp_nanos_opt().unwrap_or(0),
            size: info.size,
            local_flags: info.local_flags,
            file_type: info.file_type,
            deleted: info.deleted,
        }
    }
}
