//! Ordered, bidirectional cursors over the key space.

use std::sync::Weak;

use common::{BytesRange, Record, StorageCursor};

use crate::codec::{self, Data};
use crate::error::{Error, Result};
use crate::options::{IteratorOptions, bound_key};
use crate::session::SessionInner;

/// Where an iterator stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorState {
    /// Created but never sought.
    Unpositioned,
    /// At an entry; `key` and `value` are readable.
    Positioned,
    /// Moved past the last entry in the requested direction.
    Exhausted,
    /// Released; every operation fails.
    Released,
}

/// A cursor over the ordered key space.
///
/// An iterator starts [`Unpositioned`](IteratorState::Unpositioned); one of
/// the seek operations must run before `next`, `prev`, `key` or `value`.
/// Traversal is byte-lexicographic, ascending for `next` and descending for
/// `prev`, and never leaves `[lower_bound, upper_bound)` when bounds are set.
///
/// The view is fixed when the iterator is created, or pinned to the snapshot
/// it was created from. Release it with [`release`](Self::release) or by
/// dropping it.
pub struct KeyValueIterator {
    session: Weak<SessionInner>,
    cursor: Option<Box<dyn StorageCursor + Send>>,
    state: IteratorState,
    range: BytesRange,
    return_bytes: bool,
}

impl KeyValueIterator {
    pub(crate) fn new(
        session: Weak<SessionInner>,
        cursor: Box<dyn StorageCursor + Send>,
        options: IteratorOptions,
    ) -> Self {
        Self {
            session,
            cursor: Some(cursor),
            state: IteratorState::Unpositioned,
            range: options.key_range(),
            return_bytes: options.return_bytes,
        }
    }

    pub fn state(&self) -> IteratorState {
        self.state
    }

    /// True iff the iterator is at an entry.
    pub fn valid(&self) -> bool {
        self.state == IteratorState::Positioned && self.check_session().is_ok()
    }

    fn check_session(&self) -> Result<()> {
        match self.session.upgrade() {
            Some(session) if !session.is_closed() => Ok(()),
            _ => Err(Error::session_closed()),
        }
    }

    fn cursor_mut(&mut self) -> Result<&mut Box<dyn StorageCursor + Send>> {
        self.check_session()?;
        self.cursor.as_mut().ok_or_else(released)
    }

    fn current(&self) -> Result<&Record> {
        self.check_session()?;
        match self.state {
            IteratorState::Released => Err(released()),
            IteratorState::Positioned => self
                .cursor
                .as_ref()
                .and_then(|cursor| cursor.current())
                .ok_or_else(|| Error::InvalidState("iterator is not positioned".to_string())),
            IteratorState::Unpositioned => Err(Error::InvalidState(
                "iterator is not positioned; seek before reading".to_string(),
            )),
            IteratorState::Exhausted => {
                Err(Error::InvalidState("iterator is exhausted".to_string()))
            }
        }
    }

    /// Updates the state from the cursor's position and the bounds.
    fn settle(&mut self) -> bool {
        let positioned = self
            .cursor
            .as_ref()
            .and_then(|cursor| cursor.current())
            .is_some_and(|record| self.range.contains(&record.key));
        self.state = if positioned {
            IteratorState::Positioned
        } else {
            IteratorState::Exhausted
        };
        positioned
    }

    /// Moves to the first entry. Returns whether one exists.
    pub async fn seek_to_first(&mut self) -> Result<bool> {
        let lower = bound_key(&self.range.start);
        let cursor = self.cursor_mut()?;
        match lower {
            Some(lower) => cursor.seek(&lower).await?,
            None => cursor.seek_to_first().await?,
        }
        Ok(self.settle())
    }

    /// Moves to the last entry. Returns whether one exists.
    pub async fn seek_to_last(&mut self) -> Result<bool> {
        let upper = bound_key(&self.range.end);
        let cursor = self.cursor_mut()?;
        match upper {
            Some(upper) => {
                cursor.seek(&upper).await?;
                if cursor.current().is_some() {
                    cursor.prev().await?;
                } else {
                    cursor.seek_to_last().await?;
                }
            }
            None => cursor.seek_to_last().await?,
        }
        Ok(self.settle())
    }

    /// Moves to the first entry whose key is at or after `target`.
    ///
    /// A target below the lower bound seeks to the lower bound. Returns
    /// whether such an entry exists.
    pub async fn seek(&mut self, target: impl Into<Data>) -> Result<bool> {
        let mut target = codec::encode(target);
        if let Some(lower) = bound_key(&self.range.start)
            && target < lower
        {
            target = lower;
        }
        let cursor = self.cursor_mut()?;
        cursor.seek(&target).await?;
        Ok(self.settle())
    }

    /// Advances one entry. Returns `false` once the iterator is exhausted.
    ///
    /// # Errors
    ///
    /// Fails with [`Error::InvalidState`] before the first seek or after
    /// release.
    pub async fn next(&mut self) -> Result<bool> {
        if !self.ready_to_move()? {
            return Ok(false);
        }
        self.cursor_mut()?.next().await?;
        Ok(self.settle())
    }

    /// Retreats one entry. Returns `false` once the iterator is exhausted.
    pub async fn prev(&mut self) -> Result<bool> {
        if !self.ready_to_move()? {
            return Ok(false);
        }
        self.cursor_mut()?.prev().await?;
        Ok(self.settle())
    }

    fn ready_to_move(&self) -> Result<bool> {
        self.check_session()?;
        match self.state {
            IteratorState::Positioned => Ok(true),
            IteratorState::Exhausted => Ok(false),
            IteratorState::Unpositioned => Err(Error::InvalidState(
                "iterator is not positioned; seek before moving".to_string(),
            )),
            IteratorState::Released => Err(released()),
        }
    }

    /// The key at the current position.
    pub fn key(&self) -> Result<Data> {
        let record = self.current()?;
        Data::decode(record.key.clone(), self.return_bytes)
    }

    /// The value at the current position.
    pub fn value(&self) -> Result<Data> {
        let record = self.current()?;
        Data::decode(record.value.clone(), self.return_bytes)
    }

    /// The key and value at the current position.
    pub fn entry(&self) -> Result<(Data, Data)> {
        Ok((self.key()?, self.value()?))
    }

    /// Frees the engine cursor. Releasing twice is a no-op.
    pub fn release(&mut self) {
        if self.state == IteratorState::Released {
            return;
        }
        self.state = IteratorState::Released;
        self.cursor = None;
        if let Some(session) = self.session.upgrade() {
            session.iterator_released();
        }
    }
}

fn released() -> Error {
    Error::InvalidState("iterator has been released".to_string())
}

impl Drop for KeyValueIterator {
    fn drop(&mut self) {
        self.release();
    }
}

impl std::fmt::Debug for KeyValueIterator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyValueIterator")
            .field("state", &self.state)
            .field("range", &self.range)
            .finish()
    }
}
