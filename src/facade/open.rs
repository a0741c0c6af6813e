//! `open(path, access_flags)` (§4.9).

use std::sync::Arc;
use std::time::Instant;

use crate::entry::CacheEntry;
use crate::error::{Error, Result};
use crate::path::VirtualPath;

use super::{log_operation, Facade};

/// Access requested by the host on open. This filesystem is read-only
/// end to end (§1 Non-goals): any flag beyond `read` is rejected.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct AccessFlags {
    pub read: bool,
    pub write: bool,
    pub delete: bool,
    pub modify: bool,
}

impl AccessFlags {
    pub fn read_only() -> Self {
        AccessFlags { read: true, write: false, delete: false, modify: false }
    }

    fn requests_mutation(&self) -> bool {
        self.write || self.delete || self.modify
    }
}

/// A handle returned by `open`. Holds a reference-counted pin on the
/// underlying `CacheEntry` for as long as it's open (§4.8 ref-pinning),
/// released by `close`.
pub struct OpenHandle {
    pub(crate) entry: Arc<CacheEntry>,
}

impl OpenHandle {
    pub fn virtual_path(&self) -> &VirtualPath {
        &self.entry.virtual_path
    }
}

/// Obtains a `CacheEntry` for `path`, ensures it is available or begins
/// fetching it, and returns a handle. Mutating access requests fail with
/// `AccessDenied` before any cache work happens.
pub fn open(facade: &Facade, path: &str, access: AccessFlags) -> Result<OpenHandle> {
    let started = Instant::now();
    let vp = VirtualPath::normalize(path);
    log_operation("open", &vp);
    facade.context().metrics.filesystem_operation("open");

    if access.requests_mutation() {
        return Err(Error::AccessDenied("read-only mount"));
    }

    let entry = facade.entry_for(&vp);
    entry.reference();

    let result = match facade.ensure_available(&entry) {
        Ok(()) => Ok(OpenHandle { entry }),
        Err(Error::Pending) | Err(Error::InProgress) => Ok(OpenHandle { entry }),
        Err(e) => {
            entry.unreference();
            Err(e)
        }
    };
    facade.context().metrics.open_duration(started.elapsed().as_millis() as u64);
    result
}
