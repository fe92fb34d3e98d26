//! Port definitions
//!
//! The facade depends on the engine only through the traits in this
//! module. Adapter crates implement them over a real engine, or over
//! in-memory state for tests.
//!
//! ## Ports Overview
//!
//! - [`SyncEngine`] - The subset of engine operations the facade exposes
//! - [`GlobalFiles`] - Cursor over the engine's streaming enumeration

pub mod global_files;
pub mod sync_engine;

pub use global_files::{DoneFn, GlobalFiles};
pub use sync_engine::{EngineError, SyncEngine};
