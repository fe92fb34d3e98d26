//! Per-folder state of the in-memory engine

use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::Utc;
use stbridge_core::domain::{
    Availability, Counts, DeviceId, FileError, FileInfo, FileMetadata, FileType, FolderState,
    IgnorePatterns, NeededFiles, RemoteFolderState, TreeEntry,
};
use stbridge_core::EngineError;

use crate::engine::Activity;

/// Everything the engine knows about one folder
#[derive(Debug)]
pub(crate) struct MemoryFolder {
    pub state: FolderState,
    pub paused: bool,
    /// Ignore file content on disk
    pub ignore_file: Vec<String>,
    /// Patterns the folder is running with
    pub ignores: IgnorePatterns,
    pub global: BTreeMap<String, FileInfo>,
    pub local: BTreeMap<String, FileInfo>,
    /// Names enumerated by the global listing that no longer resolve
    pub stale: BTreeSet<String>,
    /// Names whose lookup fails outright
    pub broken: BTreeSet<String>,
    /// Error reported when a global listing completes
    pub iteration_error: Option<String>,
    pub errors: Vec<FileError>,
    /// Files being pulled and the bytes already transferred for each
    pub pulling: BTreeMap<String, u64>,
    pub remote_need: HashMap<DeviceId, Vec<FileInfo>>,
    pub remote_state: HashMap<DeviceId, RemoteFolderState>,
    pub availability: HashMap<String, Vec<Availability>>,
    pub activity: Vec<Activity>,
    next_sequence: i64,
}

impl MemoryFolder {
    pub fn new() -> Self {
        Self {
            state: FolderState {
                state: "idle".to_string(),
                changed_at: Utc::now(),
            },
            paused: false,
            ignore_file: Vec::new(),
            ignores: IgnorePatterns::default(),
            global: BTreeMap::new(),
            local: BTreeMap::new(),
            stale: BTreeSet::new(),
            broken: BTreeSet::new(),
            iteration_error: None,
            errors: Vec::new(),
            pulling: BTreeMap::new(),
            remote_need: HashMap::new(),
            remote_state: HashMap::new(),
            availability: HashMap::new(),
            activity: Vec::new(),
            next_sequence: 0,
        }
    }

    pub fn set_state(&mut self, state: &str) {
        if self.state.state != state {
            self.state = FolderState {
                state: state.to_string(),
                changed_at: Utc::now(),
            };
        }
    }

    /// Stores `info` in the global index, assigning a sequence when it has none
    pub fn insert_global(&mut self, mut info: FileInfo) {
        if info.sequence <= 0 {
            self.next_sequence += 1;
            info.sequence = self.next_sequence;
        } else {
            self.next_sequence = self.next_sequence.max(info.sequence);
        }
        self.stale.remove(&info.name);
        self.global.insert(info.name.clone(), info);
    }

    /// Snapshot of the global listing in name order, stale names included
    pub fn listing(&self) -> Vec<FileMetadata> {
        let mut listing: BTreeMap<&str, FileMetadata> = self
            .global
            .iter()
            .map(|(name, info)| (name.as_str(), FileMetadata::from(info)))
            .collect();
        for name in &self.stale {
            listing
                .entry(name.as_str())
                .or_insert_with(|| FileMetadata::named(name.clone()));
        }
        listing.into_values().collect()
    }

    pub fn global_size(&self) -> Counts {
        tally(self.global.values(), DeviceId::EMPTY)
    }

    pub fn local_size(&self) -> Counts {
        tally(self.local.values(), DeviceId::LOCAL)
    }

    /// Global records the local device does not have in the current version
    pub fn needed(&self) -> Vec<FileInfo> {
        self.global
            .values()
            .filter(|global| !global.invalid)
            .filter(|global| match self.local.get(&global.name) {
                Some(local) => local.version != global.version || local.deleted != global.deleted,
                None => !global.deleted,
            })
            .cloned()
            .collect()
    }

    /// Needed files for one page, split by puller stage
    pub fn needed_page(&self, page: usize, per_page: usize) -> NeededFiles {
        let (progress, rest): (Vec<FileInfo>, Vec<FileInfo>) = self
            .needed()
            .into_iter()
            .partition(|info| self.pulling.contains_key(&info.name));

        let skip = page.saturating_sub(1).saturating_mul(per_page);
        let mut needed = NeededFiles::default();
        let staged = progress
            .into_iter()
            .map(|info| (true, info))
            .chain(rest.into_iter().map(|info| (false, info)));
        for (in_progress, info) in staged.skip(skip).take(per_page) {
            if in_progress {
                needed.progress.push(info);
            } else {
                needed.rest.push(info);
            }
        }
        needed
    }

    pub fn local_changed(&self) -> Vec<FileInfo> {
        self.local
            .values()
            .filter(|info| info.is_receive_only_changed())
            .cloned()
            .collect()
    }

    /// Publishes local versions of every needed file as the global state
    pub fn override_local(&mut self) {
        for needed in self.needed() {
            match self.local.get(&needed.name).cloned() {
                Some(local) => self.insert_global(local),
                None => {
                    let mut tombstone = needed;
                    tombstone.mark_deleted();
                    tombstone.sequence = 0;
                    self.insert_global(tombstone);
                }
            }
        }
        self.activity.push(Activity::Override);
    }

    /// Drops local receive-only changes so the global versions are pulled again
    pub fn revert_local(&mut self) {
        self.local.retain(|_, info| !info.is_receive_only_changed());
        self.activity.push(Activity::Revert);
    }

    pub fn reset(&mut self) {
        self.global.clear();
        self.local.clear();
        self.stale.clear();
        self.errors.clear();
        self.pulling.clear();
        self.remote_need.clear();
        self.next_sequence = 0;
        self.activity.push(Activity::Reset);
    }

    /// Builds the global tree below `prefix`
    pub fn tree(&self, prefix: &str, levels: i32, dirs_only: bool) -> Vec<TreeEntry> {
        let prefix = prefix.trim_matches('/');
        let mut roots = Vec::new();

        for (name, info) in &self.global {
            if info.deleted || info.invalid {
                continue;
            }
            if dirs_only && !info.is_directory() {
                continue;
            }
            let relative = if prefix.is_empty() {
                name.as_str()
            } else {
                match name
                    .strip_prefix(prefix)
                    .and_then(|rest| rest.strip_prefix('/'))
                {
                    Some(rest) => rest,
                    None => continue,
                }
            };
            let parts: Vec<&str> = relative.split('/').filter(|p| !p.is_empty()).collect();
            let Some((leaf, parents)) = parts.split_last() else {
                continue;
            };
            if levels >= 0 && parents.len() > levels as usize {
                continue;
            }
            let entry = TreeEntry {
                name: (*leaf).to_string(),
                mod_time: info.modified,
                size: info.file_size(),
                entry_type: info.file_type,
                children: Vec::new(),
            };
            insert_entry(&mut roots, parents, entry);
        }
        roots
    }
}

fn tally<'a>(files: impl Iterator<Item = &'a FileInfo>, device_id: DeviceId) -> Counts {
    let mut counts = Counts {
        device_id,
        ..Counts::default()
    };
    for file in files {
        counts.add(file);
    }
    counts
}

/// Inserts `entry` below the directory chain `parents`; orphans are dropped
fn insert_entry(entries: &mut Vec<TreeEntry>, parents: &[&str], entry: TreeEntry) {
    match parents.split_first() {
        None => entries.push(entry),
        Some((head, rest)) => {
            if let Some(dir) = entries
                .iter_mut()
                .find(|e| e.name == *head && e.entry_type == FileType::Directory)
            {
                insert_entry(&mut dir.children, rest, entry);
            }
        }
    }
}

/// Compiles ignore file lines into patterns
///
/// Blank lines and `//` comments are dropped. Directives (`#include`,
/// `#escape`, ...) need a filesystem and are rejected.
pub(crate) fn compile_ignores(lines: &[String]) -> Result<IgnorePatterns, EngineError> {
    let mut patterns = Vec::new();
    for line in lines {
        let line = line.trim();
        if line.is_empty() || line.starts_with("//") {
            continue;
        }
        if line.starts_with('#') {
            return Err(EngineError::InvalidIgnores(format!(
                "{line}: directives are not supported"
            )));
        }
        patterns.push(line.to_string());
    }
    Ok(IgnorePatterns {
        lines: lines.to_vec(),
        patterns,
    })
}

/// Slice of `items` for a 1-based `page`
pub(crate) fn paginate(items: Vec<FileInfo>, page: usize, per_page: usize) -> Vec<FileInfo> {
    let skip = page.saturating_sub(1).saturating_mul(per_page);
    items.into_iter().skip(skip).take(per_page).collect()
}
