//! stbridge Memory - In-memory engine adapter
//!
//! Implements the [`SyncEngine`](stbridge_core::ports::SyncEngine) port
//! over plain in-memory state. It has no scanner, puller or network; state
//! is seeded and mutated through the inherent methods on [`MemoryEngine`].
//!
//! ## Uses
//!
//! - A substitutable engine for testing code written against
//!   [`Internals`](stbridge_core::Internals)
//! - A sandbox for embedding applications during development
//!
//! ## Usage
//!
//! ```
//! use std::sync::Arc;
//! use stbridge_core::domain::{FileInfo, FolderId};
//! use stbridge_core::Internals;
//! use stbridge_memory::MemoryEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let docs = FolderId::new("docs")?;
//! let engine = Arc::new(MemoryEngine::new());
//! engine.add_folder(docs.clone());
//! engine.put_global(&docs, FileInfo::new_file("a.txt", 12))?;
//!
//! let internals = Internals::new(engine);
//! let snapshot = internals.db_snapshot(&docs)?;
//! snapshot.with_global_truncated(|fi| {
//!     println!("{}", fi.name);
//!     true
//! });
//! # Ok(())
//! # }
//! ```

pub mod engine;
mod folder;

pub use engine::{Activity, IterationStats, MemoryEngine};
