//! Legacy snapshot walks
//!
//! Older consumers walk a folder's global listing through a "snapshot":
//! a synchronous, callback-driven pass yielding full file records, with
//! optional prefix scoping and early termination when the callback
//! returns `false`.
//!
//! The engine no longer offers that shape. It streams name-only
//! [`FileMetadata`](crate::domain::FileMetadata) through a
//! [`GlobalFiles`] cursor, and full records have to be resolved by name.
//! [`GlobalRecords`] bridges the two:
//!
//! 1. entries are taken from the cursor in engine order, one at a time;
//! 2. entries outside the prefix are skipped before any lookup;
//! 3. each remaining name is resolved with `current_global_file`; a lookup
//!    that errors or finds nothing is skipped, since the index may have
//!    changed since the entry was enumerated;
//! 4. the cursor is released exactly once, when the sequence ends, when the
//!    walk finishes, or when the walk is dropped (including unwinding).
//!
//! Stopping and releasing are separate steps, like the engine's own stop
//! signal and completion call: a stopped [`GlobalRecords`] yields nothing
//! more but still holds the cursor until it is released or dropped.
//!
//! # Consistency
//!
//! A [`SnapshotCompat`] is **not** a point-in-time view. Every entry is
//! resolved against the live index at the moment it is pulled, and two
//! walks over the same handle can observe different listings. The name is
//! kept for API compatibility only.
//!
//! Errors reported by the cursor's completion function are logged and
//! otherwise dropped; a walk that ended early because the engine failed
//! looks the same to the consumer as one that ran to completion.

use std::iter::FusedIterator;
use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::domain::{FileInfo, FolderId};
use crate::ports::{GlobalFiles, SyncEngine};

/// Lifecycle of a single walk
///
/// Transitions only go forward: `Active` → `Stopped` → `Released`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkState {
    /// Pulling entries from the engine
    Active,
    /// No further entries will be pulled; the cursor is still open
    Stopped,
    /// The engine cursor has been released
    Released,
}

// ============================================================================
// SnapshotCompat
// ============================================================================

/// Legacy walk handle bound to one folder
///
/// Obtained from [`Internals::db_snapshot`](super::Internals::db_snapshot).
/// Holds no file data and no engine resources between walks; each walk
/// opens its own cursor.
#[derive(Clone)]
pub struct SnapshotCompat {
    engine: Arc<dyn SyncEngine>,
    folder: FolderId,
}

impl SnapshotCompat {
    pub(crate) fn new(engine: Arc<dyn SyncEngine>, folder: FolderId) -> Self {
        Self { engine, folder }
    }

    /// Folder this handle walks
    pub fn folder(&self) -> &FolderId {
        &self.folder
    }

    /// Pull-style walk over the global listing
    ///
    /// `None` or an empty prefix visits every entry. Dropping the iterator
    /// before it is exhausted releases the engine cursor.
    pub fn records(&self, prefix: Option<&str>) -> GlobalRecords {
        let prefix = prefix.filter(|p| !p.is_empty()).map(str::to_owned);
        GlobalRecords {
            files: Some(self.engine.all_global_files(&self.folder)),
            engine: Arc::clone(&self.engine),
            folder: self.folder.clone(),
            prefix,
            state: WalkState::Active,
        }
    }

    /// Callback-driven walk over the global listing
    ///
    /// `on_record` is called with each resolved record in engine order and
    /// returns `true` to continue or `false` to stop.
    pub fn walk<F>(&self, prefix: Option<&str>, mut on_record: F)
    where
        F: FnMut(FileInfo) -> bool,
    {
        let mut records = self.records(prefix);
        for info in records.by_ref() {
            if !on_record(info) {
                break;
            }
        }
        records.release();
    }

    /// Walks every global record
    pub fn with_global_truncated<F>(&self, on_record: F)
    where
        F: FnMut(FileInfo) -> bool,
    {
        self.walk(None, on_record);
    }

    /// Walks global records whose name starts with `prefix`
    ///
    /// An empty prefix walks everything.
    pub fn with_prefixed_global_truncated<F>(&self, prefix: &str, on_record: F)
    where
        F: FnMut(FileInfo) -> bool,
    {
        self.walk(Some(prefix), on_record);
    }

    /// Releases the handle
    ///
    /// Nothing is held between walks, so this only consumes `self`.
    pub fn release(self) {}
}

impl std::fmt::Debug for SnapshotCompat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCompat")
            .field("folder", &self.folder)
            .finish_non_exhaustive()
    }
}

// ============================================================================
// GlobalRecords
// ============================================================================

/// Iterator resolving the engine's metadata stream into full records
pub struct GlobalRecords {
    engine: Arc<dyn SyncEngine>,
    folder: FolderId,
    prefix: Option<String>,
    files: Option<GlobalFiles>,
    state: WalkState,
}

impl GlobalRecords {
    pub fn state(&self) -> WalkState {
        self.state
    }

    /// Stops pulling entries
    ///
    /// Later calls to `next` return `None`. The engine cursor stays open
    /// until [`release`](Self::release) or drop.
    pub fn stop(&mut self) {
        if self.state == WalkState::Active {
            self.state = WalkState::Stopped;
        }
    }

    /// Stops the walk and runs the cursor's completion function
    ///
    /// Idempotent; the completion function runs at most once.
    pub fn release(&mut self) {
        self.stop();
        if let Some(files) = self.files.take() {
            if let Err(err) = files.finish() {
                warn!(
                    folder = %self.folder,
                    error = %err,
                    "Global file enumeration failed, walk may be incomplete"
                );
            }
        }
        self.state = WalkState::Released;
    }

    fn matches_prefix(&self, name: &str) -> bool {
        match &self.prefix {
            Some(prefix) => name.starts_with(prefix.as_str()),
            None => true,
        }
    }
}

impl Iterator for GlobalRecords {
    type Item = FileInfo;

    fn next(&mut self) -> Option<FileInfo> {
        if self.state != WalkState::Active {
            return None;
        }

        loop {
            let Some(entry) = self.files.as_mut().and_then(Iterator::next) else {
                self.release();
                return None;
            };

            if !self.matches_prefix(&entry.name) {
                continue;
            }

            match self.engine.current_global_file(&self.folder, &entry.name) {
                Ok(Some(info)) => return Some(info),
                Ok(None) => {
                    trace!(
                        folder = %self.folder,
                        name = %entry.name,
                        "Entry vanished before resolve"
                    );
                }
                Err(err) => {
                    debug!(
                        folder = %self.folder,
                        name = %entry.name,
                        error = %err,
                        "Skipping entry that failed to resolve"
                    );
                }
            }
        }
    }
}

impl FusedIterator for GlobalRecords {}

impl Drop for GlobalRecords {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for GlobalRecords {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GlobalRecords")
            .field("folder", &self.folder)
            .field("prefix", &self.prefix)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{HashMap, HashSet};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use async_trait::async_trait;
    use tokio_util::sync::CancellationToken;

    use crate::domain::{
        Availability, BlockInfo, BlockRequest, Counts, DeviceId, DeviceStatistics, FileError,
        FileMetadata, FolderCompletion, FolderState, IgnorePatterns, NeededFiles,
        PendingFolder, TreeEntry,
    };
    use crate::facade::Internals;
    use crate::ports::EngineError;

    /// Engine stub with a scripted global listing
    ///
    /// `listing` is what enumeration yields; `index` is what lookups see.
    /// Names in `broken` fail to resolve with an error.
    struct ScriptedEngine {
        folder: FolderId,
        listing: Vec<String>,
        index: Mutex<HashMap<String, FileInfo>>,
        broken: HashSet<String>,
        done_error: bool,
        opened: AtomicUsize,
        released: Arc<AtomicUsize>,
        lookups: Mutex<Vec<String>>,
    }

    impl ScriptedEngine {
        fn new(names: &[&str]) -> Self {
            let index = names
                .iter()
                .map(|n| (n.to_string(), FileInfo::new_file(*n, 1)))
                .collect();
            Self {
                folder: folder(),
                listing: names.iter().map(|n| n.to_string()).collect(),
                index: Mutex::new(index),
                broken: HashSet::new(),
                done_error: false,
                opened: AtomicUsize::new(0),
                released: Arc::new(AtomicUsize::new(0)),
                lookups: Mutex::new(Vec::new()),
            }
        }

        fn forget(&self, name: &str) {
            self.index.lock().unwrap().remove(name);
        }

        fn released(&self) -> usize {
            self.released.load(Ordering::SeqCst)
        }

        fn lookups(&self) -> Vec<String> {
            self.lookups.lock().unwrap().clone()
        }

        fn check(&self, folder: &FolderId) -> Result<(), EngineError> {
            if *folder == self.folder {
                Ok(())
            } else {
                Err(EngineError::FolderMissing(folder.clone()))
            }
        }
    }

    #[async_trait]
    impl SyncEngine for ScriptedEngine {
        fn state(&self, _f: &FolderId) -> Result<FolderState, EngineError> {
            Err(anyhow::anyhow!("not scripted").into())
        }
        fn load_ignores(&self, _f: &FolderId) -> Result<IgnorePatterns, EngineError> {
            Ok(IgnorePatterns::default())
        }
        fn current_ignores(&self, _f: &FolderId) -> Result<IgnorePatterns, EngineError> {
            Ok(IgnorePatterns::default())
        }
        fn set_ignores(&self, _f: &FolderId, _c: &[String]) -> Result<(), EngineError> {
            Ok(())
        }
        fn folder_errors(&self, _f: &FolderId) -> Result<Vec<FileError>, EngineError> {
            Ok(vec![])
        }
        fn folder_progress_bytes_completed(&self, _f: &FolderId) -> u64 {
            0
        }
        async fn request_global(
            &self,
            _c: &CancellationToken,
            _d: &DeviceId,
            _f: &FolderId,
            _r: &BlockRequest,
        ) -> Result<Vec<u8>, EngineError> {
            Ok(vec![])
        }
        fn availability(
            &self,
            _f: &FolderId,
            _i: &FileInfo,
            _b: &BlockInfo,
        ) -> Result<Vec<Availability>, EngineError> {
            Ok(vec![])
        }
        fn current_global_file(
            &self,
            folder: &FolderId,
            name: &str,
        ) -> Result<Option<FileInfo>, EngineError> {
            self.check(folder)?;
            self.lookups.lock().unwrap().push(name.to_string());
            if self.broken.contains(name) {
                return Err(anyhow::anyhow!("index read failed").into());
            }
            Ok(self.index.lock().unwrap().get(name).cloned())
        }
        fn current_folder_file(
            &self,
            _f: &FolderId,
            _n: &str,
        ) -> Result<Option<FileInfo>, EngineError> {
            Ok(None)
        }
        fn global_directory_tree(
            &self,
            _f: &FolderId,
            _p: &str,
            _l: i32,
            _d: bool,
        ) -> Result<Vec<TreeEntry>, EngineError> {
            Ok(vec![])
        }
        fn all_global_files(&self, folder: &FolderId) -> GlobalFiles {
            if let Err(err) = self.check(folder) {
                return GlobalFiles::failed(err);
            }
            self.opened.fetch_add(1, Ordering::SeqCst);
            let entries: Vec<FileMetadata> =
                self.listing.iter().map(FileMetadata::named).collect();
            let released = Arc::clone(&self.released);
            let fail = self.done_error;
            GlobalFiles::new(entries.into_iter()).with_done(move || {
                released.fetch_add(1, Ordering::SeqCst);
                if fail {
                    Err(anyhow::anyhow!("iterator aborted").into())
                } else {
                    Ok(())
                }
            })
        }
        fn global_size(&self, folder: &FolderId) -> Result<Counts, EngineError> {
            self.check(folder)?;
            Ok(Counts::default())
        }
        fn local_size(&self, _f: &FolderId, _d: &DeviceId) -> Result<Counts, EngineError> {
            Ok(Counts::default())
        }
        fn need_size(&self, _f: &FolderId, _d: &DeviceId) -> Result<Counts, EngineError> {
            Ok(Counts::default())
        }
        fn need_folder_files(
            &self,
            _f: &FolderId,
            _p: usize,
            _pp: usize,
        ) -> Result<NeededFiles, EngineError> {
            Ok(NeededFiles::default())
        }
        fn remote_need_folder_files(
            &self,
            _f: &FolderId,
            _d: &DeviceId,
            _p: usize,
            _pp: usize,
        ) -> Result<Vec<FileInfo>, EngineError> {
            Ok(vec![])
        }
        fn local_changed_folder_files(
            &self,
            _f: &FolderId,
            _p: usize,
            _pp: usize,
        ) -> Result<Vec<FileInfo>, EngineError> {
            Ok(vec![])
        }
        fn connected_to(&self, _d: &DeviceId) -> bool {
            false
        }
        fn completion(
            &self,
            _d: &DeviceId,
            _f: &FolderId,
        ) -> Result<FolderCompletion, EngineError> {
            Ok(FolderCompletion::default())
        }
        fn device_statistics(&self) -> Result<HashMap<DeviceId, DeviceStatistics>, EngineError> {
            Ok(HashMap::new())
        }
        fn pending_folders(
            &self,
            _d: Option<&DeviceId>,
        ) -> Result<HashMap<FolderId, PendingFolder>, EngineError> {
            Ok(HashMap::new())
        }
        fn scan_folders(&self) -> HashMap<FolderId, EngineError> {
            HashMap::new()
        }
        fn scan_folder(&self, _f: &FolderId) -> Result<(), EngineError> {
            Ok(())
        }
        fn scan_folder_subdirs(&self, _f: &FolderId, _s: &[String]) -> Result<(), EngineError> {
            Ok(())
        }
        fn override_folder(&self, _f: &FolderId) {}
        fn revert_folder(&self, _f: &FolderId) {}
        fn reset_folder(&self, _f: &FolderId) -> Result<(), EngineError> {
            Ok(())
        }
    }

    fn folder() -> FolderId {
        FolderId::new("docs").unwrap()
    }

    fn snapshot(engine: &Arc<ScriptedEngine>) -> SnapshotCompat {
        let internals = Internals::new(Arc::clone(engine) as Arc<dyn SyncEngine>);
        internals.db_snapshot(&folder()).unwrap()
    }

    fn collect(snap: &SnapshotCompat, prefix: Option<&str>) -> Vec<String> {
        let mut seen = Vec::new();
        snap.walk(prefix, |fi| {
            seen.push(fi.name);
            true
        });
        seen
    }

    const DOCS: &[&str] = &["a.txt", "b/c.txt", "b/d.txt"];

    #[test]
    fn test_walk_visits_everything_in_engine_order() {
        let engine = Arc::new(ScriptedEngine::new(&["z", "a", "m"]));
        let snap = snapshot(&engine);
        assert_eq!(collect(&snap, None), vec!["z", "a", "m"]);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_prefix_filter_applies_before_lookup() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        assert_eq!(collect(&snap, Some("b/")), vec!["b/c.txt", "b/d.txt"]);
        assert_eq!(engine.lookups(), vec!["b/c.txt", "b/d.txt"]);
    }

    #[test]
    fn test_empty_prefix_means_no_filter() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);
        assert_eq!(collect(&snap, Some("")), DOCS.to_vec());
    }

    #[test]
    fn test_stop_after_first_record() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        let mut seen = Vec::new();
        snap.walk(None, |fi| {
            seen.push(fi.name);
            false
        });

        assert_eq!(seen, vec!["a.txt"]);
        assert_eq!(engine.lookups(), vec!["a.txt"]);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_stop_on_kth_record_visits_exactly_k() {
        let engine = Arc::new(ScriptedEngine::new(&["1", "2", "3", "4", "5"]));
        let snap = snapshot(&engine);

        let mut visited = 0;
        snap.walk(None, |_| {
            visited += 1;
            visited < 3
        });

        assert_eq!(visited, 3);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_vanished_entry_is_skipped() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        engine.forget("a.txt");
        let snap = snapshot(&engine);

        assert_eq!(collect(&snap, None), vec!["b/c.txt", "b/d.txt"]);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_lookup_error_is_skipped() {
        let mut scripted = ScriptedEngine::new(DOCS);
        scripted.broken.insert("b/c.txt".to_string());
        let engine = Arc::new(scripted);
        let snap = snapshot(&engine);

        assert_eq!(collect(&snap, None), vec!["a.txt", "b/d.txt"]);
    }

    #[test]
    fn test_done_error_is_not_surfaced() {
        let mut scripted = ScriptedEngine::new(DOCS);
        scripted.done_error = true;
        let engine = Arc::new(scripted);
        let snap = snapshot(&engine);

        // Gap: the walk has no channel for this error, the consumer only
        // sees the records that were delivered.
        assert_eq!(collect(&snap, None), DOCS.to_vec());
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_cleanup_runs_when_callback_panics() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            snap.walk(None, |_| panic!("consumer failure"));
        }));

        assert!(result.is_err());
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_each_walk_opens_its_own_cursor() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        collect(&snap, None);
        collect(&snap, Some("b/"));
        snap.with_global_truncated(|_| true);

        assert_eq!(engine.opened.load(Ordering::SeqCst), 3);
        assert_eq!(engine.released(), 3);
    }

    #[test]
    fn test_records_state_transitions() {
        let engine = Arc::new(ScriptedEngine::new(&["only"]));
        let snap = snapshot(&engine);

        let mut records = snap.records(None);
        assert_eq!(records.state(), WalkState::Active);
        assert_eq!(records.next().map(|fi| fi.name), Some("only".to_string()));
        assert_eq!(records.state(), WalkState::Active);
        assert!(records.next().is_none());
        assert_eq!(records.state(), WalkState::Released);
        assert!(records.next().is_none());
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_stopped_records_hold_cursor_until_release() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        let mut records = snap.records(None);
        assert!(records.next().is_some());
        records.stop();
        assert_eq!(records.state(), WalkState::Stopped);
        assert!(records.next().is_none());
        assert_eq!(engine.released(), 0);
        // Stopping skips the remaining entries without resolving them
        assert_eq!(engine.lookups(), vec!["a.txt"]);

        records.release();
        assert_eq!(records.state(), WalkState::Released);
        records.release();
        drop(records);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_completion_runs_after_last_record() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        let mut released_during_walk = Vec::new();
        snap.walk(None, |_| {
            released_during_walk.push(engine.released());
            true
        });

        assert_eq!(released_during_walk, vec![0, 0, 0]);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_release_handle_leaves_clones_usable() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);
        let other = snap.clone();

        snap.release();
        assert_eq!(engine.opened.load(Ordering::SeqCst), 0);
        assert_eq!(other.folder(), &folder());
        assert_eq!(collect(&other, Some("b/")), vec!["b/c.txt", "b/d.txt"]);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_dropping_records_releases_cursor() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        let mut records = snap.records(Some("b/"));
        assert!(records.next().is_some());
        assert_eq!(engine.released(), 0);
        drop(records);
        assert_eq!(engine.released(), 1);
    }

    #[test]
    fn test_records_match_callback_walk() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let snap = snapshot(&engine);

        let pulled: Vec<String> = snap.records(Some("b/")).map(|fi| fi.name).collect();
        let mut pushed = Vec::new();
        snap.with_prefixed_global_truncated("b/", |fi| {
            pushed.push(fi.name);
            true
        });
        assert_eq!(pulled, pushed);
    }

    #[test]
    fn test_unknown_folder_yields_no_handle() {
        let engine = Arc::new(ScriptedEngine::new(DOCS));
        let internals = Internals::new(engine.clone() as Arc<dyn SyncEngine>);

        let missing = FolderId::new("nope").unwrap();
        let result = internals.db_snapshot(&missing);
        assert!(matches!(result, Err(EngineError::FolderMissing(f)) if f == missing));
        assert_eq!(engine.opened.load(Ordering::SeqCst), 0);
    }
}
