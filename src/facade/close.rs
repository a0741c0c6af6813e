//! `close(handle)` (§4.9).

use super::{log_operation, Facade, OpenHandle};

/// Releases the pin `open` placed on the handle's entry. Idempotent from
/// the caller's point of view: the handle is consumed, so a double-close
/// isn't representable.
pub fn close(facade: &Facade, handle: OpenHandle) {
    log_operation("close", handle.virtual_path());
    facade.context().metrics.filesystem_operation("close");
    handle.entry.unreference();
}
