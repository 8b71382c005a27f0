//! Point-in-time read views.

use std::sync::{Arc, Mutex, PoisonError, Weak};

use common::StorageSnapshot;

use crate::codec::Data;
use crate::error::{Error, Result};
use crate::iterator::KeyValueIterator;
use crate::options::{IteratorOptions, ReadOptions};
use crate::session::{Session, SessionInner};

struct SnapshotInner {
    id: u64,
    session: Weak<SessionInner>,
    token: Mutex<Option<Arc<dyn StorageSnapshot>>>,
}

impl SnapshotInner {
    fn release(&self) -> bool {
        let token = self
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if token.is_none() {
            return false;
        }
        if let Some(session) = self.session.upgrade() {
            session.snapshot_released();
        }
        true
    }
}

impl Drop for SnapshotInner {
    fn drop(&mut self) {
        if self.release() {
            tracing::trace!(id = self.id, "released snapshot on drop");
        }
    }
}

/// An immutable view of a store as of the moment it was created.
///
/// Reads through a snapshot never observe writes made after it was taken.
/// Clones refer to the same view; releasing any of them releases it for
/// all. Dropping the last clone releases it as well.
#[derive(Clone)]
pub struct Snapshot {
    inner: Arc<SnapshotInner>,
}

impl Snapshot {
    pub(crate) fn new(id: u64, session: Weak<SessionInner>, token: Arc<dyn StorageSnapshot>) -> Self {
        Self {
            inner: Arc::new(SnapshotInner {
                id,
                session,
                token: Mutex::new(Some(token)),
            }),
        }
    }

    /// Identifier unique among the snapshots of one session.
    pub fn id(&self) -> u64 {
        self.inner.id
    }

    pub fn is_released(&self) -> bool {
        self.inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_none()
    }

    /// Releases the engine resources behind this view.
    ///
    /// Releasing twice is a no-op. Later reads through this snapshot fail
    /// with [`Error::InvalidState`].
    pub fn release(&self) {
        if self.inner.release() {
            tracing::trace!(id = self.inner.id, "released snapshot");
        }
    }

    /// Resolves the engine view for a read issued by `session`.
    pub(crate) fn token_for(&self, session: &Arc<SessionInner>) -> Result<Arc<dyn StorageSnapshot>> {
        if !std::ptr::eq(self.inner.session.as_ptr(), Arc::as_ptr(session)) {
            return Err(Error::InvalidOption(format!(
                "snapshot {} belongs to a different session",
                self.inner.id
            )));
        }
        self.inner
            .token
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or_else(|| {
                Error::InvalidState(format!("snapshot {} has been released", self.inner.id))
            })
    }

    fn session(&self) -> Result<Session> {
        match self.inner.session.upgrade() {
            Some(inner) if !inner.is_closed() => Ok(Session::from_inner(inner)),
            _ => Err(Error::session_closed()),
        }
    }

    /// Gets the value of `key` as of this snapshot.
    ///
    /// Any snapshot already set on `options` is replaced by this one.
    pub async fn get(&self, key: impl Into<Data>, options: ReadOptions) -> Result<Option<Data>> {
        let session = self.session()?;
        session.get(key, options.with_snapshot(self)).await
    }

    /// Opens an iterator over this snapshot.
    pub async fn new_iterator(&self, options: IteratorOptions) -> Result<KeyValueIterator> {
        let session = self.session()?;
        session.new_iterator(options.with_snapshot(self)).await
    }
}

impl std::fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Snapshot")
            .field("id", &self.inner.id)
            .field("released", &self.is_released())
            .finish()
    }
}
