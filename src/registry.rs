//! The image registry — the authoritative mirror of the record list.
//!
//! Normalization, compression, and upload run concurrently across many
//! images, and each is itself multi-step async work. A naive
//! "read list, compute next list, write it back" would let two overlapping
//! completions capture the same stale snapshot and silently discard one
//! another's writes. The registry prevents that with one rule: every read
//! and every write goes through a single mutable mirror, and each write is
//! one synchronous critical section — read-mirror → compute → write-mirror
//! — so no other completion can interleave mid-update.
//!
//! After every write the registry broadcasts a fresh snapshot on a
//! [`watch`] channel; the host UI renders from those snapshots and never
//! holds a reference into the mirror.
//!
//! Writes addressed to a record id first check existence. There is no
//! cancellation primitive for in-flight work: removing a record simply
//! makes every later completion for its id a no-op.

use crate::types::{ImageId, ImageRecord};
use std::sync::Mutex;
use tokio::sync::watch;

pub struct Registry {
    mirror: Mutex<Vec<ImageRecord>>,
    changes: watch::Sender<Vec<ImageRecord>>,
}

impl Registry {
    /// A registry seeded with the host's current list (often empty).
    pub fn new(initial: Vec<ImageRecord>) -> Self {
        let (changes, _) = watch::channel(initial.clone());
        Self {
            mirror: Mutex::new(initial),
            changes,
        }
    }

    /// Observe snapshots: the receiver yields the list as of the latest
    /// write. This is the host UI's change callback.
    pub fn subscribe(&self) -> watch::Receiver<Vec<ImageRecord>> {
        self.changes.subscribe()
    }

    /// A clone of the current list.
    pub fn snapshot(&self) -> Vec<ImageRecord> {
        self.mirror.lock().unwrap().clone()
    }

    pub fn len(&self) -> usize {
        self.mirror.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: ImageId) -> bool {
        self.mirror.lock().unwrap().iter().any(|r| r.id == id)
    }

    /// A clone of one record, if it still exists.
    pub fn get(&self, id: ImageId) -> Option<ImageRecord> {
        self.mirror
            .lock()
            .unwrap()
            .iter()
            .find(|r| r.id == id)
            .cloned()
    }

    /// Apply an arbitrary transformation to the whole list in one critical
    /// section, then broadcast the result.
    pub fn update<R>(&self, apply: impl FnOnce(&mut Vec<ImageRecord>) -> R) -> R {
        let mut mirror = self.mirror.lock().unwrap();
        let result = apply(&mut mirror);
        self.changes.send_replace(mirror.clone());
        result
    }

    /// Rewrite a single record in place, by id. Returns `false` without
    /// broadcasting if the record no longer exists — the guard every async
    /// completion relies on.
    pub fn update_record(&self, id: ImageId, apply: impl FnOnce(&mut ImageRecord)) -> bool {
        let mut mirror = self.mirror.lock().unwrap();
        let Some(record) = mirror.iter_mut().find(|r| r.id == id) else {
            return false;
        };
        apply(record);
        self.changes.send_replace(mirror.clone());
        true
    }

    /// Append records (selection already validated against capacity).
    pub fn insert_all(&self, records: Vec<ImageRecord>) {
        self.update(|mirror| mirror.extend(records));
    }

    /// Remove a record, returning it so the caller can release its preview
    /// handle. `None` if it was already gone.
    pub fn remove(&self, id: ImageId) -> Option<ImageRecord> {
        self.update(|mirror| {
            let index = mirror.iter().position(|r| r.id == id)?;
            Some(mirror.remove(index))
        })
    }
}
