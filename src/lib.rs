//! compiler-cache-fs — a read-only caching virtual filesystem for remote
//! compiler toolchains.
//!
//! Build tools read through a single mount point as though the toolchains
//! (MSVC, MinGW, Windows SDKs, Ninja, ...) were on local disk. Each path is
//! resolved against a configured compiler root, fetched from the upstream
//! network share on first access, and served out of RAM on every access
//! after that. The crate is organized leaf-first, mirroring §2 of the
//! design: path normalization and glob matching at the bottom, the
//! directory tree and cache policy above that, the memory cache and
//! download pipeline above that, and the Filesystem Facade at the top as
//! the single entry point a host runtime drives.

pub mod access;
pub mod config;
pub mod context;
pub mod dircache;
pub mod download;
pub mod entry;
pub mod error;
pub mod facade;
pub mod glob;
pub mod memcache;
pub mod metrics;
pub mod path;
pub mod policy;
pub mod tree;
pub mod upstream;

pub use context::Context;
pub use error::{Error, Result, Status};
pub use facade::{AccessFlags, DirEntry, Facade, FileAttributes, OpenHandle, ReadOutcome};
pub use path::VirtualPath;
