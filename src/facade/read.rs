//! `read(handle, offset, length)` (§4.9).

use std::time::Instant;

use crate::entry::FileState;
use crate::error::{Error, Result};

use super::{log_operation, Facade, OpenHandle};

/// What a read returned: either bytes, or a signal that the host must
/// retry (a fetch just got queued or is already in flight).
pub enum ReadOutcome {
    Bytes(Vec<u8>),
    Pending,
}

/// Serves `length` bytes starting at `offset` from `handle`.
///
/// - `Cached`: slices the in-memory buffer.
/// - `NetworkOnly`: streams the range directly from upstream, bypassing
///   the cache (§4.9, §9 design note on `NeverCache`).
/// - `Fetching`: returns `ReadOutcome::Pending` so the host retries.
/// - `Virtual` after a failed fetch: `Error::Io`.
pub async fn read(facade: &Facade, handle: &OpenHandle, offset: u64, length: u32) -> Result<ReadOutcome> {
    let vp = handle.virtual_path().clone();
    log_operation("read", &vp);
    facade.context().metrics.filesystem_operation("read");
    facade.touch(&handle.entry);

    match handle.entry.state() {
        FileState::Cached => {
            let context = facade.context();
            let started = Instant::now();
            let Some(bytes) = context.memcache.get(&vp) else {
                // Evicted between the state check and the read: this is a
                // miss, not a correctness bug — re-queue exactly as a first
                // read would.
                return facade.ensure_available(&handle.entry).map(|_| ReadOutcome::Pending).or_else(|e| match e {
                    Error::Pending | Error::InProgress => Ok(ReadOutcome::Pending),
                    other => Err(other),
                });
            };
            context.metrics.cache_hit(vp.as_str());
            context.access.record_access(
                &vp,
                &handle.entry.upstream_location,
                handle.entry.size(),
                handle.entry.state(),
                true,
                true,
                started.elapsed(),
                handle.entry.policy,
            );
            let start = (offset as usize).min(bytes.len());
            let end = (start + length as usize).min(bytes.len());
            Ok(ReadOutcome::Bytes(bytes[start..end].to_vec()))
        }
        FileState::NetworkOnly => {
            let context = facade.context();
            context.metrics.cache_miss(vp.as_str());
            let started = Instant::now();
            let bytes = match context.upstream.read_range(&handle.entry.upstream_location, offset, length).await {
                Ok(bytes) => {
                    context.metrics.network_operation("read_range", true);
                    bytes
                }
                Err(e) => {
                    context.metrics.network_operation("read_range", false);
                    return Err(e);
                }
            };
            let elapsed = started.elapsed();
            context.metrics.network_latency(elapsed.as_millis() as u64);
            context.access.record_access(
                &vp,
                &handle.entry.upstream_location,
                handle.entry.size(),
                handle.entry.state(),
                false,
                false,
                elapsed,
                handle.entry.policy,
            );
            Ok(ReadOutcome::Bytes(bytes))
        }
        FileState::Fetching => Ok(ReadOutcome::Pending),
        FileState::Placeholder => Err(Error::UnexpectedPlaceholder),
        FileState::Virtual => {
            // Either the entry never had `ensure_available` run against it
            // (host called `read` without `open`'s usual pattern) or a
            // previous fetch failed and reverted it. Re-trigger §4.9's
            // `ensure_available` decision rather than guessing which.
            match facade.ensure_available(&handle.entry) {
                Ok(()) => {
                    // `ensure_available` flipped a NeverCache entry straight
                    // to NetworkOnly; recurse once to actually serve it.
                    Box::pin(read(facade, handle, offset, length)).await
                }
                Err(Error::Pending) | Err(Error::InProgress) => Ok(ReadOutcome::Pending),
                Err(e) => Err(e),
            }
        }
    }
}
