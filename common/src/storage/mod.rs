pub mod config;
pub mod factory;
pub mod in_memory;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::BytesRange;
pub use config::OpenOptions;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Record {
    pub key: Bytes,
    pub value: Bytes,
}

impl Record {
    pub fn new(key: Bytes, value: Bytes) -> Self {
        Self { key, value }
    }
}

/// A single mutation inside an atomic write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RecordOp {
    Put(Record),
    Delete(Bytes),
}

/// Options for write operations.
///
/// Controls the durability behavior of [`Storage::apply`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriteOptions {
    /// Whether to wait for the write to be durable before returning.
    ///
    /// When `true`, the operation will not return until the write has been
    /// persisted past the engine's write-ahead log.
    ///
    /// When `false` (the default), the operation returns as soon as the data
    /// is in memory, providing lower latency but risking data loss on crash.
    pub sync: bool,
}

/// Options for the engine read path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadOptions {
    /// Verify block checksums on every read from persistent storage.
    pub verify_checksums: bool,
    /// Whether blocks read for this operation should populate the block cache.
    pub fill_cache: bool,
}

impl Default for ReadOptions {
    fn default() -> Self {
        Self {
            verify_checksums: false,
            fill_cache: true,
        }
    }
}

/// Error type for storage operations.
///
/// Variants mirror the status classes an embedded engine reports. The message
/// is carried verbatim so callers see exactly what the engine said.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// The requested key or store does not exist.
    NotFound(String),
    /// Persistent state failed an integrity check.
    Corruption(String),
    /// The engine does not support the requested operation.
    NotSupported(String),
    /// An argument or option was rejected by the engine.
    InvalidArgument(String),
    /// An I/O level failure, including lock contention.
    Io(String),
    /// Internal errors
    Internal(String),
}

impl std::error::Error for StorageError {}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            StorageError::NotFound(msg) => write!(f, "NotFound: {}", msg),
            StorageError::Corruption(msg) => write!(f, "Corruption: {}", msg),
            StorageError::NotSupported(msg) => write!(f, "Not implemented: {}", msg),
            StorageError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            StorageError::Io(msg) => write!(f, "IO error: {}", msg),
            StorageError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

/// Result type alias for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;

/// Bidirectional cursor over the ordered key space.
///
/// A cursor reads from the view that was current when it was created and
/// never observes later writes. After construction it is unpositioned;
/// [`current`](StorageCursor::current) returns `None` whenever the cursor is
/// not resting on an entry.
#[async_trait]
pub trait StorageCursor: Send {
    /// Positions at the smallest key.
    async fn seek_to_first(&mut self) -> StorageResult<()>;

    /// Positions at the largest key.
    async fn seek_to_last(&mut self) -> StorageResult<()>;

    /// Positions at the first key that is `>= target`.
    async fn seek(&mut self, target: &[u8]) -> StorageResult<()>;

    /// Moves to the next larger key. No-op when unpositioned.
    async fn next(&mut self) -> StorageResult<()>;

    /// Moves to the next smaller key. No-op when unpositioned.
    async fn prev(&mut self) -> StorageResult<()>;

    /// The entry the cursor rests on, if any.
    fn current(&self) -> Option<&Record>;
}

/// Common read operations supported by both Storage and StorageSnapshot.
///
/// This trait provides the core read methods that are shared between full storage
/// access and point-in-time snapshots, so the session layer can route a read to
/// either one without caring which it is.
#[async_trait]
pub trait StorageRead: Send + Sync {
    /// Returns the record for `key`, or `None` when the key is absent.
    ///
    /// Engines may also report absence as [`StorageError::NotFound`].
    async fn get(&self, key: Bytes, options: &ReadOptions) -> StorageResult<Option<Record>>;

    /// Opens a cursor over the view as of this call.
    ///
    /// The returned cursor is owned and does not borrow from the storage,
    /// allowing it to be stored in structs or passed across await points.
    async fn cursor(
        &self,
        options: &ReadOptions,
    ) -> StorageResult<Box<dyn StorageCursor + Send + 'static>>;
}

/// A point-in-time snapshot of the storage layer.
///
/// Snapshots provide a consistent read-only view of the database at the time
/// the snapshot was created. Reads from a snapshot will not see any subsequent
/// writes to the underlying storage.
#[async_trait]
pub trait StorageSnapshot: StorageRead {}

/// An open connection to one store.
#[async_trait]
pub trait Storage: StorageRead {
    /// Applies a batch of puts and deletes atomically.
    ///
    /// Operations are applied in order, so a later operation on the same key
    /// wins. Either every operation becomes visible or none does.
    async fn apply(&self, ops: Vec<RecordOp>, options: &WriteOptions) -> StorageResult<()>;

    /// Creates a point-in-time snapshot of the storage.
    async fn snapshot(&self) -> StorageResult<Arc<dyn StorageSnapshot>>;

    /// Answers a named introspection query, or `None` if the name is unknown.
    async fn property(&self, name: &str) -> StorageResult<Option<String>>;

    /// Estimates the bytes spanned by each range, in order.
    ///
    /// An empty or inverted range yields zero.
    async fn approximate_sizes(&self, ranges: &[BytesRange]) -> StorageResult<Vec<u64>>;

    /// Flushes all pending writes to durable storage.
    async fn flush(&self) -> StorageResult<()>;

    /// Closes the connection, releasing the store lock.
    async fn close(&self) -> StorageResult<()>;
}

/// Store lifecycle entry points of an engine.
#[async_trait]
pub trait StorageEngine: Send + Sync {
    /// Opens the store at `path`.
    async fn open(&self, path: &Path, options: &OpenOptions) -> StorageResult<Arc<dyn Storage>>;

    /// Removes the store at `path` and everything in it.
    async fn destroy(&self, path: &Path) -> StorageResult<()>;

    /// Attempts to salvage as much of the store at `path` as possible.
    async fn repair(&self, path: &Path) -> StorageResult<()>;
}
