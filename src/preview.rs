//! Temporary local preview handles.
//!
//! Before an image is durably stored remotely, the host renders it through
//! a `preview://<uuid>` address backed by in-process bytes. This module
//! owns those handles end to end so they are released on every exit path
//! — supersession, finalization, user removal — without leaks and without
//! double-free.
//!
//! ## Contract
//!
//! - One handle is created per selected file at placeholder time; a new
//!   one is created only when a pipeline step actually changes the payload
//!   (then the *old* handle is revoked, never the new one).
//! - Revocation is idempotent: revoking an unknown or already-revoked
//!   handle is a guarded no-op, not an error. Misuse is made structurally
//!   impossible rather than detected at runtime.
//! - Callers must swap a record's `display_address` away from a handle
//!   before revoking it.
//!
//! The store keeps created/revoked/live counters; hosts can surface them
//! the way a build tool prints cache statistics.

use bytes::Bytes;
use std::collections::HashMap;
use std::fmt;
use std::sync::Mutex;
use uuid::Uuid;

/// Address scheme for temporary handles.
pub const PREVIEW_SCHEME: &str = "preview://";

/// True if the address is a temporary handle rather than a permanent
/// remote address.
pub fn is_preview(address: &str) -> bool {
    address.starts_with(PREVIEW_SCHEME)
}

/// Running handle accounting. `created == revoked` and `live == 0` once
/// every record has finalized or been removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewStats {
    pub created: u64,
    pub revoked: u64,
    pub live: usize,
}

impl fmt::Display for PreviewStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} revoked, {} live",
            self.created, self.revoked, self.live
        )
    }
}

#[derive(Debug, Default)]
struct StoreInner {
    live: HashMap<String, Bytes>,
    created: u64,
    revoked: u64,
}

/// Issues and revokes `preview://` handles.
///
/// Internally synchronized; safe to share behind an `Arc` across the
/// pipeline's concurrent per-image tasks.
#[derive(Debug, Default)]
pub struct PreviewStore {
    inner: Mutex<StoreInner>,
}

impl PreviewStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a handle for the given payload and return its address.
    pub fn create(&self, bytes: Bytes) -> String {
        let address = format!("{PREVIEW_SCHEME}{}", Uuid::new_v4());
        let mut inner = self.inner.lock().unwrap();
        inner.live.insert(address.clone(), bytes);
        inner.created += 1;
        address
    }

    /// The bytes behind a live handle, if any.
    pub fn resolve(&self, address: &str) -> Option<Bytes> {
        self.inner.lock().unwrap().live.get(address).cloned()
    }

    pub fn is_live(&self, address: &str) -> bool {
        self.inner.lock().unwrap().live.contains_key(address)
    }

    /// Release a handle. Revoking a handle that was never issued or was
    /// already revoked is a no-op.
    pub fn revoke(&self, address: &str) {
        let mut inner = self.inner.lock().unwrap();
        if inner.live.remove(address).is_some() {
            inner.revoked += 1;
        }
    }

    pub fn stats(&self) -> PreviewStats {
        let inner = self.inner.lock().unwrap();
        PreviewStats {
            created: inner.created,
            revoked: inner.revoked,
            live: inner.live.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_then_resolve_roundtrips() {
        let store = PreviewStore::new();
        let handle = store.create(Bytes::from_static(b"pixels"));
        assert!(is_preview(&handle));
        assert_eq!(store.resolve(&handle).unwrap(), Bytes::from_static(b"pixels"));
    }

    #[test]
    fn handles_are_distinct() {
        let store = PreviewStore::new();
        let a = store.create(Bytes::from_static(b"a"));
        let b = store.create(Bytes::from_static(b"a"));
        assert_ne!(a, b);
    }

    #[test]
    fn revoke_frees_exactly_once() {
        let store = PreviewStore::new();
        let handle = store.create(Bytes::from_static(b"x"));
        store.revoke(&handle);
        assert!(!store.is_live(&handle));

        // Double revocation is a guarded no-op
        store.revoke(&handle);
        let stats = store.stats();
        assert_eq!(stats.created, 1);
        assert_eq!(stats.revoked, 1);
        assert_eq!(stats.live, 0);
    }

    #[test]
    fn revoking_unknown_handle_is_noop() {
        let store = PreviewStore::new();
        store.revoke("preview://never-issued");
        assert_eq!(store.stats().revoked, 0);
    }

    #[test]
    fn permanent_addresses_are_not_previews() {
        assert!(!is_preview("https://cdn.test/listings/abc.jpg"));
        assert!(is_preview("preview://123"));
    }

    #[test]
    fn stats_display_reads_naturally() {
        let store = PreviewStore::new();
        let handle = store.create(Bytes::new());
        store.create(Bytes::new());
        store.revoke(&handle);
        assert_eq!(store.stats().to_string(), "2 created, 1 revoked, 1 live");
    }
}
