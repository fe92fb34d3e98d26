//! Internals facade
//!
//! A stable, narrow operation set over the engine. It is not meant as a
//! general purpose API, it is the boundary between the volatile engine
//! interface and applications that embed the engine (a mobile client
//! among them).
//!
//! Every method maps onto exactly one engine call. Nothing is retried,
//! cached or reinterpreted; engine errors come back as the same
//! [`EngineError`] value.

use std::collections::HashMap;
use std::sync::Arc;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::snapshot::SnapshotCompat;
use crate::domain::{
    Availability, BlockInfo, BlockRequest, Counts, DeviceId, DeviceStatistics, FileError,
    FileInfo, FolderCompletion, FolderId, FolderState, IgnorePatterns, NeededFiles,
    PendingFolder, TreeEntry,
};
use crate::ports::{EngineError, GlobalFiles, SyncEngine};

/// Stable facade over a [`SyncEngine`]
///
/// Cheap to clone; clones share the same engine.
#[derive(Clone)]
pub struct Internals {
    engine: Arc<dyn SyncEngine>,
}

impl Internals {
    /// Creates a facade over `engine`
    pub fn new(engine: Arc<dyn SyncEngine>) -> Self {
        Self { engine }
    }

    // --- Folder state and ignores ---

    pub fn folder_state(&self, folder: &FolderId) -> Result<FolderState, EngineError> {
        self.engine.state(folder)
    }

    /// Ignore patterns as written on disk, which may differ from the
    /// running set until the folder reloads them
    pub fn load_ignores(&self, folder: &FolderId) -> Result<IgnorePatterns, EngineError> {
        self.engine.load_ignores(folder)
    }

    /// Ignore patterns the folder is currently running with
    pub fn ignores(&self, folder: &FolderId) -> Result<IgnorePatterns, EngineError> {
        self.engine.current_ignores(folder)
    }

    #[tracing::instrument(level = "debug", skip(self, content), fields(lines = content.len()))]
    pub fn set_ignores(&self, folder: &FolderId, content: &[String]) -> Result<(), EngineError> {
        self.engine.set_ignores(folder, content)
    }

    pub fn folder_errors(&self, folder: &FolderId) -> Result<Vec<FileError>, EngineError> {
        self.engine.folder_errors(folder)
    }

    pub fn folder_progress_bytes_completed(&self, folder: &FolderId) -> u64 {
        self.engine.folder_progress_bytes_completed(folder)
    }

    // --- Blocks ---

    /// Downloads block `block_number` of `path` from `device`
    ///
    /// With `allow_from_temporary` the peer may serve the block from a file
    /// it is still downloading itself. Cancelling `cancel` aborts the
    /// request; the engine decides how quickly it notices.
    #[allow(clippy::too_many_arguments)]
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(device = %device, folder = %folder, path = %path, block_number = block_number)
    )]
    pub async fn download_block(
        &self,
        cancel: &CancellationToken,
        device: &DeviceId,
        folder: &FolderId,
        path: &str,
        block_number: usize,
        block: &BlockInfo,
        allow_from_temporary: bool,
    ) -> Result<Vec<u8>, EngineError> {
        let request = BlockRequest::new(path, block_number, block, allow_from_temporary);
        self.engine.request_global(cancel, device, folder, &request).await
    }

    pub fn block_availability(
        &self,
        folder: &FolderId,
        file: &FileInfo,
        block: &BlockInfo,
    ) -> Result<Vec<Availability>, EngineError> {
        self.engine.availability(folder, file, block)
    }

    // --- Index lookups ---

    /// Global record for `path`; `Ok(None)` when the index has no entry
    pub fn global_file_info(
        &self,
        folder: &FolderId,
        path: &str,
    ) -> Result<Option<FileInfo>, EngineError> {
        self.engine.current_global_file(folder, path)
    }

    /// Local record for `path`; `Ok(None)` when the index has no entry
    pub fn local_file_info(
        &self,
        folder: &FolderId,
        path: &str,
    ) -> Result<Option<FileInfo>, EngineError> {
        self.engine.current_folder_file(folder, path)
    }

    pub fn global_tree(
        &self,
        folder: &FolderId,
        prefix: &str,
        levels: i32,
        return_only_directories: bool,
    ) -> Result<Vec<TreeEntry>, EngineError> {
        self.engine.global_directory_tree(folder, prefix, levels, return_only_directories)
    }

    /// Raw streaming enumeration of the global listing
    ///
    /// The returned cursor releases its engine resources when finished or
    /// dropped. Prefer [`SnapshotCompat`] when full records are needed.
    pub fn all_global_files(&self, folder: &FolderId) -> GlobalFiles {
        self.engine.all_global_files(folder)
    }

    // --- Devices ---

    pub fn is_connected_to(&self, device: &DeviceId) -> bool {
        self.engine.connected_to(device)
    }

    pub fn completion(
        &self,
        device: &DeviceId,
        folder: &FolderId,
    ) -> Result<FolderCompletion, EngineError> {
        self.engine.completion(device, folder)
    }

    pub fn device_statistics(&self) -> Result<HashMap<DeviceId, DeviceStatistics>, EngineError> {
        self.engine.device_statistics()
    }

    /// Folders offered by `device`, or by any device when `None`
    pub fn pending_folders(
        &self,
        device: Option<&DeviceId>,
    ) -> Result<HashMap<FolderId, PendingFolder>, EngineError> {
        self.engine.pending_folders(device)
    }

    // --- Scanning and folder maintenance ---

    /// Scans all folders; returns the folders whose scan failed
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn scan_folders(&self) -> HashMap<FolderId, EngineError> {
        let failed = self.engine.scan_folders();
        if !failed.is_empty() {
            debug!(failed = failed.len(), "Some folders failed to scan");
        }
        failed
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn scan_folder(&self, folder: &FolderId) -> Result<(), EngineError> {
        self.engine.scan_folder(folder)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn scan_folder_subdirs(
        &self,
        folder: &FolderId,
        paths: &[String],
    ) -> Result<(), EngineError> {
        self.engine.scan_folder_subdirs(folder, paths)
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn override_folder(&self, folder: &FolderId) {
        self.engine.override_folder(folder);
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn revert_folder(&self, folder: &FolderId) {
        self.engine.revert_folder(folder);
    }

    #[tracing::instrument(level = "debug", skip(self))]
    pub fn reset_folder(&self, folder: &FolderId) -> Result<(), EngineError> {
        self.engine.reset_folder(folder)
    }

    // --- Accounting ---

    /// Size of the folder's global listing
    ///
    /// On error no count is returned at all; there is no partial tally.
    pub fn global_size(&self, folder: &FolderId) -> Result<Counts, EngineError> {
        self.engine.global_size(folder)
    }

    /// Size of what the local device has of the folder
    pub fn local_size(&self, folder: &FolderId) -> Result<Counts, EngineError> {
        self.engine.local_size(folder, &DeviceId::LOCAL)
    }

    /// Size of what `device` still needs of the folder
    pub fn need_size(&self, folder: &FolderId, device: &DeviceId) -> Result<Counts, EngineError> {
        self.engine.need_size(folder, device)
    }

    /// Currently needed files: in progress, queued, and to be queued on
    /// the next puller iteration
    pub fn need_folder_files(
        &self,
        folder: &FolderId,
        page: usize,
        per_page: usize,
    ) -> Result<NeededFiles, EngineError> {
        self.engine.need_folder_files(folder, page, per_page)
    }

    pub fn remote_need_folder_files(
        &self,
        folder: &FolderId,
        device: &DeviceId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<FileInfo>, EngineError> {
        self.engine.remote_need_folder_files(folder, device, page, per_page)
    }

    pub fn local_changed_folder_files(
        &self,
        folder: &FolderId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<FileInfo>, EngineError> {
        self.engine.local_changed_folder_files(folder, page, per_page)
    }

    // --- Legacy snapshot ---

    /// Opens a legacy walk handle for `folder`
    ///
    /// The folder must be known to the engine; a global size query is used
    /// as the liveness check and its error is returned unchanged.
    ///
    /// Despite the name the handle is not a snapshot, see
    /// [`SnapshotCompat`].
    #[tracing::instrument(level = "debug", skip(self))]
    pub fn db_snapshot(&self, folder: &FolderId) -> Result<SnapshotCompat, EngineError> {
        self.engine.global_size(folder)?;
        Ok(SnapshotCompat::new(Arc::clone(&self.engine), folder.clone()))
    }
}

impl std::fmt::Debug for Internals {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Internals").finish_non_exhaustive()
    }
}
