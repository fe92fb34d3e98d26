//! Cursor over the engine's streaming enumeration
//!
//! The engine hands out a lazy, single-pass sequence of [`FileMetadata`]
//! together with an optional completion function that releases whatever
//! the engine holds open for the iteration (read transaction, cursor,
//! ...). The completion function also carries any error the enumeration
//! hit, since the sequence itself has no error channel.
//!
//! [`GlobalFiles`] owns both halves. The completion function runs exactly
//! once: explicitly through [`GlobalFiles::finish`], or from `Drop` when
//! the cursor goes out of scope on any other path (early return, panic
//! unwinding through a consumer callback).

use std::fmt;

use tracing::warn;

use super::sync_engine::EngineError;
use crate::domain::FileMetadata;

/// Completion function releasing an enumeration
pub type DoneFn = Box<dyn FnOnce() -> Result<(), EngineError> + Send>;

/// Lazy enumeration of a folder's global listing plus its release hook
pub struct GlobalFiles {
    entries: Box<dyn Iterator<Item = FileMetadata> + Send>,
    done: Option<DoneFn>,
}

impl GlobalFiles {
    /// Wraps an engine-provided sequence without a completion function
    pub fn new<I>(entries: I) -> Self
    where
        I: Iterator<Item = FileMetadata> + Send + 'static,
    {
        Self {
            entries: Box::new(entries),
            done: None,
        }
    }

    /// Attaches the completion function
    #[must_use]
    pub fn with_done<F>(mut self, done: F) -> Self
    where
        F: FnOnce() -> Result<(), EngineError> + Send + 'static,
    {
        self.done = Some(Box::new(done));
        self
    }

    /// An enumeration that yields nothing and reports `err` on completion
    ///
    /// This is how an engine signals that enumeration could not start,
    /// e.g. for an unknown folder.
    pub fn failed(err: EngineError) -> Self {
        Self::new(std::iter::empty()).with_done(move || Err(err))
    }

    /// Returns true while the completion function has not run yet
    pub fn is_open(&self) -> bool {
        self.done.is_some()
    }

    /// Runs the completion function and returns its result
    ///
    /// Stops the enumeration; remaining entries are discarded.
    pub fn finish(mut self) -> Result<(), EngineError> {
        self.release()
    }

    fn release(&mut self) -> Result<(), EngineError> {
        self.entries = Box::new(std::iter::empty());
        match self.done.take() {
            Some(done) => done(),
            None => Ok(()),
        }
    }
}

impl Iterator for GlobalFiles {
    type Item = FileMetadata;

    fn next(&mut self) -> Option<Self::Item> {
        self.entries.next()
    }
}

impl Drop for GlobalFiles {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            warn!(error = %err, "Global file enumeration ended with an error");
        }
    }
}

impl fmt::Debug for GlobalFiles {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GlobalFiles")
            .field("open", &self.is_open())
            .finish_non_exhaustive()
    }
}
