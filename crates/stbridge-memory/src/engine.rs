//! In-memory [`SyncEngine`] implementation
//!
//! State lives behind a single `std::sync::RwLock`. Port methods are
//! synchronous index lookups, so they never hold the lock across an await;
//! `request_global` copies what it needs out of the lock before sleeping.
//!
//! Global listings snapshot the folder's names when they are opened and
//! resolve nothing themselves, so entries may vanish between enumeration and
//! lookup exactly like in a live index.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

use anyhow::anyhow;
use async_trait::async_trait;
use stbridge_core::domain::{
    Availability, BlockInfo, BlockRequest, Counts, DeviceId, DeviceStatistics, FileError,
    FileInfo, FolderCompletion, FolderId, FolderState, IgnorePatterns, NeededFiles,
    ObservedFolder, PendingFolder, RemoteFolderState, TreeEntry,
};
use stbridge_core::{EngineError, GlobalFiles, SyncEngine};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace};

use crate::folder::{compile_ignores, paginate, MemoryFolder};

/// Mutation recorded against a folder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activity {
    Scan,
    ScanSubdirs(Vec<String>),
    SetIgnores,
    Override,
    Revert,
    Reset,
}

/// How many global listings were opened and how many were released
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct IterationStats {
    pub opened: usize,
    pub released: usize,
}

impl IterationStats {
    /// Listings opened but not yet released
    pub fn outstanding(&self) -> usize {
        self.opened.saturating_sub(self.released)
    }
}

#[derive(Debug, Default)]
struct IterationCounters {
    opened: AtomicUsize,
    released: AtomicUsize,
}

#[derive(Debug, Default)]
struct EngineState {
    folders: HashMap<FolderId, MemoryFolder>,
    devices: HashSet<DeviceId>,
    connected: HashSet<DeviceId>,
    statistics: HashMap<DeviceId, DeviceStatistics>,
    pending: HashMap<FolderId, PendingFolder>,
    blocks: HashMap<Vec<u8>, Vec<u8>>,
    temporary_blocks: HashMap<Vec<u8>, Vec<u8>>,
    request_delay: Option<Duration>,
}

/// Engine holding its whole index in memory
///
/// All methods take `&self`; share it as `Arc<MemoryEngine>`.
#[derive(Debug, Default)]
pub struct MemoryEngine {
    state: RwLock<EngineState>,
    iterations: Arc<IterationCounters>,
}

impl MemoryEngine {
    /// Creates an engine with no folders and no devices
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, EngineState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, EngineState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_folder<T>(
        &self,
        folder: &FolderId,
        f: impl FnOnce(&MemoryFolder) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let state = self.read();
        let entry = state
            .folders
            .get(folder)
            .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;
        f(entry)
    }

    fn with_folder_mut<T>(
        &self,
        folder: &FolderId,
        f: impl FnOnce(&mut MemoryFolder) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut state = self.write();
        let entry = state
            .folders
            .get_mut(folder)
            .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;
        f(entry)
    }

    fn require_device(state: &EngineState, device: &DeviceId) -> Result<(), EngineError> {
        if device.is_local() || state.devices.contains(device) {
            Ok(())
        } else {
            Err(EngineError::DeviceUnknown(*device))
        }
    }

    // --- Folders ---

    /// Configures `folder`; existing folders are left as they are
    pub fn add_folder(&self, folder: FolderId) {
        debug!(folder = %folder, "Adding folder");
        self.write()
            .folders
            .entry(folder)
            .or_insert_with(MemoryFolder::new);
    }

    /// Removes `folder` and everything known about it
    pub fn remove_folder(&self, folder: &FolderId) -> bool {
        self.write().folders.remove(folder).is_some()
    }

    /// Pauses or resumes `folder`
    pub fn pause_folder(&self, folder: &FolderId, paused: bool) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.paused = paused;
            f.set_state(if paused { "paused" } else { "idle" });
            Ok(())
        })
    }

    /// Announces `info` in the global index
    ///
    /// A record without a sequence number gets the folder's next one.
    pub fn put_global(&self, folder: &FolderId, info: FileInfo) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.insert_global(info);
            Ok(())
        })
    }

    /// Stores `info` as the local device's record
    pub fn put_local(&self, folder: &FolderId, info: FileInfo) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.local.insert(info.name.clone(), info);
            Ok(())
        })
    }

    /// Drops `name` from the global index
    pub fn remove_global(
        &self,
        folder: &FolderId,
        name: &str,
    ) -> Result<Option<FileInfo>, EngineError> {
        self.with_folder_mut(folder, |f| Ok(f.global.remove(name)))
    }

    /// Lists `name` in global enumerations without a record to resolve it to
    pub fn add_stale_entry(
        &self,
        folder: &FolderId,
        name: impl Into<String>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        self.with_folder_mut(folder, |f| {
            f.stale.insert(name);
            Ok(())
        })
    }

    /// Makes lookups of `name` fail with an engine error
    pub fn fail_lookup(
        &self,
        folder: &FolderId,
        name: impl Into<String>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        self.with_folder_mut(folder, |f| {
            f.broken.insert(name);
            Ok(())
        })
    }

    /// Makes global listings of `folder` report `message` when they complete
    pub fn fail_iteration(
        &self,
        folder: &FolderId,
        message: impl Into<String>,
    ) -> Result<(), EngineError> {
        let message = message.into();
        self.with_folder_mut(folder, |f| {
            f.iteration_error = Some(message);
            Ok(())
        })
    }

    /// Writes the folder's ignore file without reloading it
    pub fn write_ignore_file(
        &self,
        folder: &FolderId,
        lines: Vec<String>,
    ) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.ignore_file = lines;
            Ok(())
        })
    }

    /// Records a puller error on one file
    pub fn push_folder_error(
        &self,
        folder: &FolderId,
        error: FileError,
    ) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.errors.push(error);
            Ok(())
        })
    }

    /// Marks `name` as being pulled with `bytes_done` already transferred
    pub fn mark_pulling(
        &self,
        folder: &FolderId,
        name: impl Into<String>,
        bytes_done: u64,
    ) -> Result<(), EngineError> {
        let name = name.into();
        self.with_folder_mut(folder, |f| {
            f.pulling.insert(name, bytes_done);
            f.set_state("syncing");
            Ok(())
        })
    }

    /// Sets the files `device` needs from us in `folder`
    pub fn set_remote_need(
        &self,
        folder: &FolderId,
        device: DeviceId,
        files: Vec<FileInfo>,
    ) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.remote_need.insert(device, files);
            Ok(())
        })
    }

    /// Sets what `device` reports about `folder`
    pub fn set_remote_state(
        &self,
        folder: &FolderId,
        device: DeviceId,
        remote: RemoteFolderState,
    ) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            f.remote_state.insert(device, remote);
            Ok(())
        })
    }

    /// Sets the devices able to serve blocks of `name`
    pub fn set_availability(
        &self,
        folder: &FolderId,
        name: impl Into<String>,
        devices: Vec<Availability>,
    ) -> Result<(), EngineError> {
        let name = name.into();
        self.with_folder_mut(folder, |f| {
            f.availability.insert(name, devices);
            Ok(())
        })
    }

    /// Mutations recorded against `folder`, oldest first
    pub fn activity(&self, folder: &FolderId) -> Vec<Activity> {
        self.read()
            .folders
            .get(folder)
            .map(|f| f.activity.clone())
            .unwrap_or_default()
    }

    // --- Devices ---

    /// Configures `device` without connecting it
    pub fn add_device(&self, device: DeviceId) {
        self.write().devices.insert(device);
    }

    /// Configures and connects `device`
    pub fn connect(&self, device: DeviceId) {
        info!(device = %device, "Device connected");
        let mut state = self.write();
        state.devices.insert(device);
        state.connected.insert(device);
    }

    pub fn disconnect(&self, device: &DeviceId) {
        info!(device = %device, "Device disconnected");
        self.write().connected.remove(device);
    }

    pub fn set_device_statistics(&self, device: DeviceId, statistics: DeviceStatistics) {
        self.write().statistics.insert(device, statistics);
    }

    /// Records that `device` offers `folder` to us
    pub fn add_pending_folder(
        &self,
        folder: FolderId,
        device: DeviceId,
        observed: ObservedFolder,
    ) {
        self.write()
            .pending
            .entry(folder)
            .or_default()
            .offered_by
            .insert(device, observed);
    }

    // --- Blocks ---

    /// Makes `data` available to block requests for `hash`
    pub fn put_block(&self, hash: Vec<u8>, data: Vec<u8>) {
        self.write().blocks.insert(hash, data);
    }

    /// Makes `data` available only to requests accepting temporary files
    pub fn put_temporary_block(&self, hash: Vec<u8>, data: Vec<u8>) {
        self.write().temporary_blocks.insert(hash, data);
    }

    /// Delays every block request by `delay`
    pub fn set_request_delay(&self, delay: Option<Duration>) {
        self.write().request_delay = delay;
    }

    /// Counters of global listings opened and released so far
    pub fn iteration_stats(&self) -> IterationStats {
        IterationStats {
            opened: self.iterations.opened.load(Ordering::SeqCst),
            released: self.iterations.released.load(Ordering::SeqCst),
        }
    }
}

#[async_trait]
impl SyncEngine for MemoryEngine {
    fn state(&self, folder: &FolderId) -> Result<FolderState, EngineError> {
        self.with_folder(folder, |f| Ok(f.state.clone()))
    }

    fn load_ignores(&self, folder: &FolderId) -> Result<IgnorePatterns, EngineError> {
        self.with_folder(folder, |f| compile_ignores(&f.ignore_file))
    }

    fn current_ignores(&self, folder: &FolderId) -> Result<IgnorePatterns, EngineError> {
        self.with_folder(folder, |f| Ok(f.ignores.clone()))
    }

    fn set_ignores(&self, folder: &FolderId, content: &[String]) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            let compiled = compile_ignores(content)?;
            f.ignore_file = content.to_vec();
            f.ignores = compiled;
            f.activity.push(Activity::SetIgnores);
            Ok(())
        })
    }

    fn folder_errors(&self, folder: &FolderId) -> Result<Vec<FileError>, EngineError> {
        self.with_folder(folder, |f| Ok(f.errors.clone()))
    }

    fn folder_progress_bytes_completed(&self, folder: &FolderId) -> u64 {
        self.read()
            .folders
            .get(folder)
            .map(|f| f.pulling.values().sum())
            .unwrap_or(0)
    }

    async fn request_global(
        &self,
        cancel: &CancellationToken,
        device: &DeviceId,
        folder: &FolderId,
        request: &BlockRequest,
    ) -> Result<Vec<u8>, EngineError> {
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }

        let (data, delay) = {
            let state = self.read();
            Self::require_device(&state, device)?;
            if !state.connected.contains(device) {
                return Err(EngineError::NotConnected(*device));
            }
            let entry = state
                .folders
                .get(folder)
                .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;
            if !entry.global.contains_key(&request.name) {
                return Err(EngineError::NoSuchFile {
                    folder: folder.clone(),
                    name: request.name.clone(),
                });
            }
            let data = state.blocks.get(&request.hash).cloned().or_else(|| {
                request
                    .from_temporary
                    .then(|| state.temporary_blocks.get(&request.hash).cloned())
                    .flatten()
            });
            (data, state.request_delay)
        };

        if let Some(delay) = delay {
            tokio::select! {
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }
        }

        trace!(
            folder = %folder,
            name = %request.name,
            block = request.block_no,
            "Serving block request"
        );
        data.ok_or_else(|| {
            anyhow!(
                "block {} of {} not available from {}",
                request.block_no,
                request.name,
                device
            )
            .into()
        })
    }

    fn availability(
        &self,
        folder: &FolderId,
        file: &FileInfo,
        _block: &BlockInfo,
    ) -> Result<Vec<Availability>, EngineError> {
        self.with_folder(folder, |f| {
            Ok(f.availability.get(&file.name).cloned().unwrap_or_default())
        })
    }

    fn current_global_file(
        &self,
        folder: &FolderId,
        name: &str,
    ) -> Result<Option<FileInfo>, EngineError> {
        self.with_folder(folder, |f| {
            if f.broken.contains(name) {
                return Err(anyhow!("index lookup failed for {name}").into());
            }
            Ok(f.global.get(name).cloned())
        })
    }

    fn current_folder_file(
        &self,
        folder: &FolderId,
        name: &str,
    ) -> Result<Option<FileInfo>, EngineError> {
        self.with_folder(folder, |f| {
            if f.broken.contains(name) {
                return Err(anyhow!("index lookup failed for {name}").into());
            }
            Ok(f.local.get(name).cloned())
        })
    }

    fn global_directory_tree(
        &self,
        folder: &FolderId,
        prefix: &str,
        levels: i32,
        dirs_only: bool,
    ) -> Result<Vec<TreeEntry>, EngineError> {
        self.with_folder(folder, |f| Ok(f.tree(prefix, levels, dirs_only)))
    }

    fn all_global_files(&self, folder: &FolderId) -> GlobalFiles {
        let (listing, failure) = match self.with_folder(folder, |f| {
            Ok((f.listing(), f.iteration_error.clone()))
        }) {
            Ok(opened) => opened,
            Err(err) => return GlobalFiles::failed(err),
        };

        let counters = Arc::clone(&self.iterations);
        counters.opened.fetch_add(1, Ordering::SeqCst);
        debug!(folder = %folder, entries = listing.len(), "Opened global listing");

        GlobalFiles::new(listing.into_iter()).with_done(move || {
            counters.released.fetch_add(1, Ordering::SeqCst);
            match failure {
                Some(message) => Err(anyhow!(message).into()),
                None => Ok(()),
            }
        })
    }

    fn global_size(&self, folder: &FolderId) -> Result<Counts, EngineError> {
        self.with_folder(folder, |f| Ok(f.global_size()))
    }

    fn local_size(&self, folder: &FolderId, device: &DeviceId) -> Result<Counts, EngineError> {
        let state = self.read();
        Self::require_device(&state, device)?;
        let entry = state
            .folders
            .get(folder)
            .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;
        if !device.is_local() {
            return Err(anyhow!("local size of remote device {device} is not tracked").into());
        }
        Ok(entry.local_size())
    }

    fn need_size(&self, folder: &FolderId, device: &DeviceId) -> Result<Counts, EngineError> {
        let state = self.read();
        Self::require_device(&state, device)?;
        let entry = state
            .folders
            .get(folder)
            .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;
        let needed = if device.is_local() {
            entry.needed()
        } else {
            entry.remote_need.get(device).cloned().unwrap_or_default()
        };
        let mut counts = Counts {
            device_id: *device,
            ..Counts::default()
        };
        for file in &needed {
            counts.add(file);
        }
        Ok(counts)
    }

    fn need_folder_files(
        &self,
        folder: &FolderId,
        page: usize,
        per_page: usize,
    ) -> Result<NeededFiles, EngineError> {
        self.with_folder(folder, |f| Ok(f.needed_page(page, per_page)))
    }

    fn remote_need_folder_files(
        &self,
        folder: &FolderId,
        device: &DeviceId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<FileInfo>, EngineError> {
        let state = self.read();
        Self::require_device(&state, device)?;
        let entry = state
            .folders
            .get(folder)
            .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;
        let needed = entry.remote_need.get(device).cloned().unwrap_or_default();
        Ok(paginate(needed, page, per_page))
    }

    fn local_changed_folder_files(
        &self,
        folder: &FolderId,
        page: usize,
        per_page: usize,
    ) -> Result<Vec<FileInfo>, EngineError> {
        self.with_folder(folder, |f| Ok(paginate(f.local_changed(), page, per_page)))
    }

    fn connected_to(&self, device: &DeviceId) -> bool {
        self.read().connected.contains(device)
    }

    fn completion(
        &self,
        device: &DeviceId,
        folder: &FolderId,
    ) -> Result<FolderCompletion, EngineError> {
        let state = self.read();
        Self::require_device(&state, device)?;
        let entry = state
            .folders
            .get(folder)
            .ok_or_else(|| EngineError::FolderMissing(folder.clone()))?;

        let global = entry.global_size();
        let (needed, remote_state) = if device.is_local() {
            (entry.needed(), RemoteFolderState::Valid)
        } else {
            (
                entry.remote_need.get(device).cloned().unwrap_or_default(),
                entry.remote_state.get(device).copied().unwrap_or_default(),
            )
        };

        let mut completion = FolderCompletion {
            global_bytes: global.bytes,
            global_items: global.files + global.directories + global.symlinks,
            remote_state,
            sequence: global.sequence,
            ..FolderCompletion::default()
        };
        for file in &needed {
            if file.deleted {
                completion.need_deletes += 1;
            } else {
                completion.need_items += 1;
                completion.need_bytes += file.file_size();
            }
        }
        completion.completion_pct = completion_pct(&completion);
        Ok(completion)
    }

    fn device_statistics(&self) -> Result<HashMap<DeviceId, DeviceStatistics>, EngineError> {
        Ok(self.read().statistics.clone())
    }

    fn pending_folders(
        &self,
        device: Option<&DeviceId>,
    ) -> Result<HashMap<FolderId, PendingFolder>, EngineError> {
        let state = self.read();
        let Some(device) = device else {
            return Ok(state.pending.clone());
        };
        Ok(state
            .pending
            .iter()
            .filter_map(|(folder, pending)| {
                pending.offered_by.get(device).map(|observed| {
                    let mut offered_by = HashMap::new();
                    offered_by.insert(*device, observed.clone());
                    (folder.clone(), PendingFolder { offered_by })
                })
            })
            .collect())
    }

    fn scan_folders(&self) -> HashMap<FolderId, EngineError> {
        let mut state = self.write();
        let mut failed = HashMap::new();
        for (id, folder) in state.folders.iter_mut() {
            if folder.paused {
                failed.insert(id.clone(), EngineError::FolderPaused(id.clone()));
                continue;
            }
            folder.set_state("idle");
            folder.activity.push(Activity::Scan);
        }
        failed
    }

    fn scan_folder(&self, folder: &FolderId) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            if f.paused {
                return Err(EngineError::FolderPaused(folder.clone()));
            }
            f.set_state("idle");
            f.activity.push(Activity::Scan);
            Ok(())
        })
    }

    fn scan_folder_subdirs(
        &self,
        folder: &FolderId,
        subdirs: &[String],
    ) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            if f.paused {
                return Err(EngineError::FolderPaused(folder.clone()));
            }
            f.activity.push(Activity::ScanSubdirs(subdirs.to_vec()));
            Ok(())
        })
    }

    fn override_folder(&self, folder: &FolderId) {
        if let Some(f) = self.write().folders.get_mut(folder) {
            f.override_local();
        }
    }

    fn revert_folder(&self, folder: &FolderId) {
        if let Some(f) = self.write().folders.get_mut(folder) {
            f.revert_local();
        }
    }

    fn reset_folder(&self, folder: &FolderId) -> Result<(), EngineError> {
        self.with_folder_mut(folder, |f| {
            if !f.paused {
                return Err(EngineError::FolderNotPaused(folder.clone()));
            }
            f.reset();
            Ok(())
        })
    }
}

/// Completion by bytes; outstanding deletes cap it just below 100
fn completion_pct(completion: &FolderCompletion) -> f64 {
    if completion.need_items == 0 && completion.need_deletes == 0 {
        return 100.0;
    }
    let mut pct = if completion.global_bytes == 0 {
        100.0
    } else {
        100.0 * (1.0 - completion.need_bytes as f64 / completion.global_bytes as f64)
    };
    if completion.need_deletes > 0 && pct >= 100.0 {
        pct = 95.0;
    }
    pct.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn folder() -> FolderId {
        FolderId::new("docs").unwrap()
    }

    fn peer() -> DeviceId {
        DeviceId::from_bytes([7; 32])
    }

    #[test]
    fn test_unknown_folder_is_reported() {
        let engine = MemoryEngine::new();
        assert!(matches!(
            engine.global_size(&folder()),
            Err(EngineError::FolderMissing(_))
        ));
        assert!(matches!(
            engine.put_global(&folder(), FileInfo::new_file("a", 1)),
            Err(EngineError::FolderMissing(_))
        ));
        assert_eq!(engine.folder_progress_bytes_completed(&folder()), 0);
    }

    #[test]
    fn test_listing_counts_release() {
        let engine = MemoryEngine::new();
        engine.add_folder(folder());
        engine.put_global(&folder(), FileInfo::new_file("a", 1)).unwrap();

        let files = engine.all_global_files(&folder());
        assert_eq!(engine.iteration_stats().outstanding(), 1);
        let names: Vec<String> = files.map(|m| m.name).collect();
        assert_eq!(names, vec!["a"]);
        assert_eq!(
            engine.iteration_stats(),
            IterationStats {
                opened: 1,
                released: 1
            }
        );
    }

    #[test]
    fn test_listing_of_unknown_folder_opens_nothing() {
        let engine = MemoryEngine::new();
        let files = engine.all_global_files(&folder());
        assert!(matches!(files.finish(), Err(EngineError::FolderMissing(_))));
        assert_eq!(engine.iteration_stats().opened, 0);
    }

    #[test]
    fn test_listing_reports_iteration_failure() {
        let engine = MemoryEngine::new();
        engine.add_folder(folder());
        engine.fail_iteration(&folder(), "disk I/O error").unwrap();

        let err = engine.all_global_files(&folder()).finish().unwrap_err();
        assert_eq!(err.to_string(), "disk I/O error");
    }

    #[test]
    fn test_ignores_loaded_and_current_differ_until_set() {
        let engine = MemoryEngine::new();
        engine.add_folder(folder());
        engine
            .write_ignore_file(&folder(), vec!["*.tmp".to_string()])
            .unwrap();

        assert_eq!(engine.load_ignores(&folder()).unwrap().patterns, vec!["*.tmp"]);
        assert!(engine.current_ignores(&folder()).unwrap().patterns.is_empty());

        engine
            .set_ignores(&folder(), &["*.bak".to_string()])
            .unwrap();
        assert_eq!(engine.current_ignores(&folder()).unwrap().patterns, vec!["*.bak"]);
        assert_eq!(engine.activity(&folder()), vec![Activity::SetIgnores]);

        let err = engine
            .set_ignores(&folder(), &["#include x".to_string()])
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidIgnores(_)));
        assert_eq!(engine.current_ignores(&folder()).unwrap().patterns, vec!["*.bak"]);
    }

    #[test]
    fn test_paused_folder_rules() {
        let engine = MemoryEngine::new();
        engine.add_folder(folder());

        assert!(matches!(
            engine.reset_folder(&folder()),
            Err(EngineError::FolderNotPaused(_))
        ));

        engine.pause_folder(&folder(), true).unwrap();
        assert_eq!(engine.state(&folder()).unwrap().state, "paused");
        assert!(matches!(
            engine.scan_folder(&folder()),
            Err(EngineError::FolderPaused(_))
        ));
        assert!(engine.scan_folders().contains_key(&folder()));
        engine.reset_folder(&folder()).unwrap();
        assert_eq!(engine.activity(&folder()), vec![Activity::Reset]);
    }

    #[test]
    fn test_completion_for_remote_device() {
        let engine = MemoryEngine::new();
        engine.add_folder(folder());
        engine.put_global(&folder(), FileInfo::new_file("a", 300)).unwrap();
        engine.put_global(&folder(), FileInfo::new_file("b", 100)).unwrap();

        assert!(matches!(
            engine.completion(&peer(), &folder()),
            Err(EngineError::DeviceUnknown(_))
        ));

        engine.add_device(peer());
        engine
            .set_remote_need(&folder(), peer(), vec![FileInfo::new_file("b", 100)])
            .unwrap();
        engine
            .set_remote_state(&folder(), peer(), RemoteFolderState::Valid)
            .unwrap();

        let completion = engine.completion(&peer(), &folder()).unwrap();
        assert_eq!(completion.global_bytes, 400);
        assert_eq!(completion.need_bytes, 100);
        assert_eq!(completion.need_items, 1);
        assert_eq!(completion.completion_pct, 75.0);
        assert_eq!(completion.remote_state, RemoteFolderState::Valid);
    }

    #[test]
    fn test_completion_pct_with_only_deletes() {
        let completion = FolderCompletion {
            global_bytes: 10,
            need_deletes: 1,
            ..FolderCompletion::default()
        };
        assert_eq!(completion_pct(&completion), 95.0);
        assert_eq!(completion_pct(&FolderCompletion::default()), 100.0);
    }

    #[test]
    fn test_pending_folders_filtered_by_device() {
        let engine = MemoryEngine::new();
        let other = DeviceId::from_bytes([9; 32]);
        let observed = ObservedFolder {
            time: chrono::Utc::now(),
            label: "Docs".to_string(),
            receive_encrypted: false,
            remote_encrypted: false,
        };
        engine.add_pending_folder(folder(), peer(), observed.clone());
        engine.add_pending_folder(folder(), other, observed);

        assert_eq!(engine.pending_folders(None).unwrap()[&folder()].offered_by.len(), 2);
        let filtered = engine.pending_folders(Some(&peer())).unwrap();
        assert_eq!(filtered[&folder()].offered_by.len(), 1);
        assert!(filtered[&folder()].offered_by.contains_key(&peer()));
        let none = engine
            .pending_folders(Some(&DeviceId::from_bytes([1; 32])))
            .unwrap();
        assert!(none.is_empty());
    }

    #[tokio::test]
    async fn test_request_global_checks_connection() {
        let engine = MemoryEngine::new();
        engine.add_folder(folder());
        engine.put_global(&folder(), FileInfo::new_file("a", 4)).unwrap();
        engine.add_device(peer());
        let request = BlockRequest::new(
            "a",
            0,
            &BlockInfo {
                offset: 0,
                size: 4,
                hash: vec![1],
            },
            false,
        );
        let cancel = CancellationToken::new();

        let err = engine
            .request_global(&cancel, &peer(), &folder(), &request)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::NotConnected(_)));

        engine.connect(peer());
        engine.put_temporary_block(vec![1], b"temp".to_vec());
        assert!(engine
            .request_global(&cancel, &peer(), &folder(), &request)
            .await
            .is_err());

        let temporary = BlockRequest {
            from_temporary: true,
            ..request
        };
        let data = engine
            .request_global(&cancel, &peer(), &folder(), &temporary)
            .await
            .unwrap();
        assert_eq!(data, b"temp");
    }
}
