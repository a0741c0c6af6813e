//! Filesystem Facade (C9, §4.9): translates a host's read-only callback
//! set into cache operations.
//!
//! The shape here is grounded on the teacher crate's `Vfs` trait
//! (`src/vfs/mod.rs`): one module per operation, each with its own
//! `Args`/result types. The teacher's operations speak NFSv3 write
//! semantics (`create`, `write`, `rename`, ...); this facade keeps only the
//! read-only subset the spec calls for and drops the promise/callback
//! indirection in favor of returning a `Result` directly, since nothing in
//! this crate's concurrency model needs a second callback hop once
//! `Pending` already exists as a status.

mod close;
mod get_attributes;
mod open;
mod read;
mod read_directory;

pub use close::close;
pub use get_attributes::{get_attributes, FileAttributes};
pub use open::{open, AccessFlags, OpenHandle};
pub use read::{read, ReadOutcome};
pub use read_directory::{read_directory, DirEntry};

use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use tracing::trace;

use crate::context::Context;
use crate::entry::{CacheEntry, FileState};
use crate::error::{Error, Result};
use crate::path::VirtualPath;
use crate::policy::CachePolicy;

/// Stateless handle to a `Context`; clone freely, one per host mount.
#[derive(Clone)]
pub struct Facade {
    context: Arc<Context>,
}

impl Facade {
    pub fn new(context: Arc<Context>) -> Self {
        Facade { context }
    }

    pub fn context(&self) -> &Arc<Context> {
        &self.context
    }

    /// Looks up or lazily creates the `CacheEntry` for `path` (§4.8
    /// `get_or_create`). Falls back to a stub `Virtual`/`OnDemand` entry
    /// when no directory node exists, preserving host callback semantics
    /// even though the subsequent open will typically fail with
    /// `NotFound` (§4.8 point 3).
    fn entry_for(&self, vp: &VirtualPath) -> Arc<CacheEntry> {
        let policy = self.context.policy.policy_for(vp);
        if let Some(entry) = self.context.table.get_or_create(vp, &self.context.tree, policy) {
            return entry;
        }
        self.context.table.get_or_create_stub(vp, policy)
    }

    /// `ensure_available` from §4.9: never blocks on I/O. Returns `Ok(())`
    /// when the caller may proceed to read immediately, or
    /// `Err(Error::Pending)` when the host must retry after the
    /// in-flight/just-queued fetch completes.
    fn ensure_available(&self, entry: &Arc<CacheEntry>) -> Result<()> {
        match entry.state() {
            FileState::Cached | FileState::NetworkOnly => Ok(()),
            FileState::Fetching => Err(Error::Pending),
            FileState::Placeholder => Err(Error::UnexpectedPlaceholder),
            FileState::Virtual => {
                if entry.policy == CachePolicy::NeverCache {
                    entry.set_state(FileState::NetworkOnly);
                    return Ok(());
                }
                match self.context.downloads.queue_download(&entry.virtual_path, &self.context.table) {
                    crate::error::Status::Pending => Err(Error::Pending),
                    crate::error::Status::InProgress => Err(Error::InProgress),
                    crate::error::Status::Cancelled => Err(Error::Cancelled),
                    _ => Err(Error::Pending),
                }
            }
        }
    }

    fn touch(&self, entry: &CacheEntry) {
        let tick = self.context.table.tick();
        entry.touch(tick);
    }
}

fn system_time_secs(t: SystemTime) -> i64 {
    t.duration_since(UNIX_EPOCH).map(|d| d.as_secs() as i64).unwrap_or(0)
}

pub(crate) fn log_operation(op: &str, path: &VirtualPath) {
    trace!(op, path = %path, "facade operation");
}
