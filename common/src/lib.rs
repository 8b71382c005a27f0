//! Storage engine capability layer.
//!
//! Defines the narrow interface an embedded, ordered, byte-keyed storage
//! engine exposes to the session layer, plus an in-memory reference engine.

pub mod bytes;
pub mod storage;

pub use bytes::BytesRange;
pub use storage::factory::StorageBuilder;
pub use storage::in_memory::{InMemoryEngine, InMemoryStorage};
pub use storage::{
    OpenOptions, ReadOptions, Record, RecordOp, Storage, StorageCursor, StorageEngine,
    StorageError, StorageRead, StorageResult, StorageSnapshot, WriteOptions,
};
