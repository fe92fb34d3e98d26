//! Synchronization engine port (driven/secondary port)
//!
//! This module defines the narrow slice of the engine that the facade is
//! allowed to see. The engine's own interface changes from release to
//! release; only adapters implementing [`SyncEngine`] have to follow it.
//!
//! ## Design Notes
//!
//! - Operation names follow the engine's own naming so that adapters are
//!   mechanical.
//! - Errors are returned as [`EngineError`] and travel through the facade
//!   unchanged. Engine-specific failures that do not fit a named variant
//!   are carried in [`EngineError::Other`].
//! - Only block requests are async: they may go to the network and honour
//!   a [`CancellationToken`]. Everything else is a local index lookup.

use std::collections::HashMap;

use tokio_util::sync::CancellationToken;

use super::global_files::GlobalFiles;
use crate::domain::{
    Availability, BlockInfo, BlockRequest, Counts, DeviceId, DeviceStatistics, FileError,
    FileInfo, FolderCompletion, FolderId, FolderState, IgnorePatterns, NeededFiles,
    PendingFolder, TreeEntry,
};

// ============================================================================
// EngineError
// ============================================================================

/// Errors reported by the engine
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The folder is not configured
    #[error("folder missing: {0}")]
    FolderMissing(FolderId),

    /// The folder is paused and cannot perform the operation
    #[error("folder is paused: {0}")]
    FolderPaused(FolderId),

    /// The operation requires the folder to be paused first
    #[error("folder must be paused: {0}")]
    FolderNotPaused(FolderId),

    /// The device is not configured
    #[error("unknown device: {0}")]
    DeviceUnknown(DeviceId),

    /// The device is configured but not connected
    #[error("device not connected: {0}")]
    NotConnected(DeviceId),

    /// No such file in the index
    #[error("no such file: {folder}/{name}")]
    NoSuchFile {
        /// Folder that was queried
        folder: FolderId,
        /// Folder-relative name that was looked up
        name: String,
    },

    /// The ignore patterns could not be parsed
    #[error("invalid ignore pattern: {0}")]
    InvalidIgnores(String),

    /// The caller cancelled the operation
    #[error("operation cancelled")]
    Cancelled,

    /// Any other engine failure
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

// ============================================================================
// SyncEngine trait
// ============================================================================

/// Port trait for the synchronization engine
///
/// Implementations wrap a running engine. They must not add retries or
/// caching: the facade promises consumers the engine's own behaviour.
#[async_trait::async_trait]
pub trait SyncEngine: Send + Sync {
    // --- Folder state ---

    /// Current state name of the folder and when it changed
    fn state(&self, folder: &FolderId) -> Result<FolderState, EngineError>;

    /// Ignore patterns as currently written in the folder's ignore file
    fn load_ignores(&self, folder: &FolderId) -> Result<IgnorePatterns, EngineError>;

    /// Ignore patterns the folder is currently running with
    fn current_ignores(&self, folder: &FolderId) -> Result<IgnorePatterns, EngineError>;

    /// Replaces the folder's ignore file content and reloads it
    fn set_ignores(&self, folder: &FolderId, content: &[String]) -> Result<(), EngineError>;

    /// Errors the puller hit on individual files
    fn folder_errors(&self, folder: &FolderId) -> Result<Vec<FileError>, EngineError>;

    /// Bytes already transferred for files currently being pulled
    fn folder_progress_bytes_completed(&self, folder: &FolderId) -> u64;

    // --- Blocks ---

    /// Requests one block of a globally known file from `device`
    ///
    /// Implementations must return [`EngineError::Cancelled`] once `cancel`
    /// fires, without waiting for the transfer to finish.
    async fn request_global(
        &self,
        cancel: &CancellationToken,
        device: &DeviceId,
        folder: &FolderId,
        request: &BlockRequest,
    ) -> Result<Vec<u8>, EngineError>;

    /// Devices able to serve `block` of `file`
    fn availability(
        &self,
        folder: &FolderId,
        file: &FileInfo,
        block: &BlockInfo,
    ) -> Result<Vec<Availability>, EngineError>;

    // --- Index lookups ---

    /// Current global record for `name`, `None` when the index has no entry
    fn current_global_file(
        &self,
        folder: &FolderId,
        name: &str,
    ) -> Result<Option<FileInfo>, EngineError>;

    /// Current local record for `name`, `None` when the index has no entry
    fn current_folder_file(
        &self,
        folder: &FolderId,
        name: &str,
    ) -> Result<Option<FileInfo>, EngineError>;

    /// Global directory tree under `prefix`
    ///
    /// `levels` limits depth below `prefix` (0 = immediate children only,
    /// negative = unlimited).
    fn global_directory_tree(
        &self,
        folder: &FolderId,
        prefix: &str,
        levels: i32,
        dirs_only: bool,
    ) -> Result<Vec<TreeEntry>, EngineError>;

    /// Streams the folder's global listing
    ///
    /// Failures, including an unknown folder, are reported by the
    /// completion function of the returned cursor.
    fn all_global_files(&self, folder: &FolderId) -> GlobalFiles;

    // --- Accounting ---

    fn global_size(&self, folder: &FolderId) -> Result<Counts, EngineError>;

    fn local_size(&self, folder: &FolderId, device: &DeviceId) -> Result<Counts, EngineError>;

    fn need_size(&self, folder: &FolderId, device: &DeviceId) -> Result<Counts, EngineError>;

    /// Locally needed files, paginated (`page` starts at 1)
    fn need_folder_files(
        &self,
        folder: &FolderId,
        page: usize,
        per_page: usize,
    ) -> Result<NeededFiles, EngineError>;

    /// Files `device` needs from us, paginated (`page` starts at 1)
    fn remote_need_folder_files(
        &self,
        folder: &FolderId,
        device: &DeviceId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<FileInfo>, EngineError>;

    /// Local changes in a receive-only folder, paginated (`page` starts at 1)
    fn local_changed_folder_files(
        &self,
        folder: &FolderId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<FileInfo>, EngineError>;

    // --- Devices ---

    fn connected_to(&self, device: &DeviceId) -> bool;

    fn completion(
        &self,
        device: &DeviceId,
        folder: &FolderId,
    ) -> Result<FolderCompletion, EngineError>;

    fn device_statistics(&self) -> Result<HashMap<DeviceId, DeviceStatistics>, EngineError>;

    /// Folders offered by `device`, or by any device when `None`
    fn pending_folders(
        &self,
        device: Option<&DeviceId>,
    ) -> Result<HashMap<FolderId, PendingFolder>, EngineError>;

    // --- Mutations ---

    /// Scans every folder; the map holds the folders whose scan failed
    fn scan_folders(&self) -> HashMap<FolderId, EngineError>;

    fn scan_folder(&self, folder: &FolderId) -> Result<(), EngineError>;

    fn scan_folder_subdirs(
        &self,
        folder: &FolderId,
        subdirs: &[String],
    ) -> Result<(), EngineError>;

    /// Makes the local state of a send-only folder the global state
    fn override_folder(&self, folder: &FolderId);

    /// Discards local changes of a receive-only folder
    fn revert_folder(&self, folder: &FolderId);

    /// Drops the folder's index so it is rebuilt on next start
    fn reset_folder(&self, folder: &FolderId) -> Result<(), EngineError>;
}
