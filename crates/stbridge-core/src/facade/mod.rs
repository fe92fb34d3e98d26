//! Consumer-facing facade
//!
//! - [`Internals`] - Stable operation set over a [`crate::ports::SyncEngine`]
//! - [`SnapshotCompat`] - Legacy walk handle bound to one folder
//! - [`GlobalRecords`] - Pull-style iterator behind the legacy walk

pub mod internals;
pub mod snapshot;

pub use internals::Internals;
pub use snapshot::{GlobalRecords, SnapshotCompat, WalkState};
