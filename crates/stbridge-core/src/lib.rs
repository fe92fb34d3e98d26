//! stbridge Core - Stable boundary over the synchronization engine
//!
//! This crate contains the narrow surface that embedding applications
//! (desktop wrappers, mobile clients) program against:
//! - **Domain types** - `FolderId`, `DeviceId`, `FileInfo`, `FileMetadata`, `Counts`, ...
//! - **Port definition** - [`ports::SyncEngine`], the subset of engine operations we rely on
//! - **Facade** - [`facade::Internals`], a 1:1 pass-through over the port
//! - **Legacy walk** - [`facade::SnapshotCompat`], callback-driven walks over the global listing
//!
//! # Architecture
//!
//! The engine (scanning, indexing, peer protocol) lives outside this crate.
//! Its volatile interface is reduced to the [`ports::SyncEngine`] trait;
//! adapter crates implement that trait and consumers only ever see the
//! facade. Engine errors cross the facade unchanged.

pub mod config;
pub mod domain;
pub mod facade;
pub mod logging;
pub mod ports;

pub use facade::{GlobalRecords, Internals, SnapshotCompat, WalkState};
pub use ports::{EngineError, GlobalFiles, SyncEngine};
