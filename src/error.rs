//! Error and status vocabulary shared across the cache engine.

use thiserror::Error;

/// Status returned to a host filesystem callback (§4.9, §6).
///
/// `Pending` is not a failure: it tells the host to retry the call once the
/// in-flight work (a download, typically) has completed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Status {
    Ok,
    Pending,
    NotFound,
    AccessDenied,
    IoError,
    BufferTooSmall,
    NoMoreEntries,
    Cancelled,
    InProgress,
    OutOfCacheBudget,
}

/// Errors surfaced by the cache engine's internals.
///
/// This is the typed counterpart of [`Status`]: components that can fail in
/// more than one way return `Result<T, Error>`, and callers at the facade
/// boundary (§4.9) map an `Error` down to the `Status` vocabulary the host
/// understands.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no directory node or cache entry for path")]
    NotFound,

    #[error("access denied: {0}")]
    AccessDenied(&'static str),

    #[error("upstream I/O failed: {0}")]
    Io(String),

    #[error("fetch in progress, retry")]
    Pending,

    #[error("download cancelled")]
    Cancelled,

    #[error("download already in progress for this path")]
    InProgress,

    #[error("cache is over budget and strict eviction is configured")]
    OutOfCacheBudget,

    #[error("configuration error: {0}")]
    Config(String),

    #[error("observed FileState::Placeholder, which is unused by this engine")]
    UnexpectedPlaceholder,
}

impl Error {
    /// Maps an internal error onto the host-facing [`Status`] vocabulary.
    ///
    /// Any variant not explicitly listed collapses to `IoError`, matching
    /// §7: "Inside the read/open fast path, any unexpected error is mapped
    /// to IoError."
    pub fn to_status(&self) -> Status {
        match self {
            Error::NotFound => Status::NotFound,
            Error::AccessDenied(_) => Status::AccessDenied,
            Error::Pending => Status::Pending,
            Error::Cancelled => Status::Cancelled,
            Error::InProgress => Status::InProgress,
            Error::OutOfCacheBudget => Status::OutOfCacheBudget,
            Error::Io(_) | Error::Config(_) | Error::UnexpectedPlaceholder => Status::IoError,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
