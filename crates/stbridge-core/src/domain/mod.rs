//! Domain types shared across the facade
//!
//! This module contains the value types that cross the engine boundary:
//! - Newtypes for folder and device identifiers
//! - Full file records and the lightweight metadata yielded by enumeration
//! - Folder-level accounting, state and status types
//! - Domain-specific error types

pub mod errors;
pub mod file_info;
pub mod folder;
pub mod newtypes;

// Re-export commonly used types
pub use errors::DomainError;
pub use file_info::{BlockInfo, Counter, FileInfo, FileMetadata, FileType, Vector};
pub use folder::{
    Availability, BlockRequest, Counts, DeviceStatistics, FileError, FolderCompletion,
    FolderState, IgnorePatterns, NeededFiles, ObservedFolder, PendingFolder, RemoteFolderState,
    TreeEntry,
};
pub use newtypes::{DeviceId, FolderId, ShortId};
