//! KV Session - A client session layer over an embedded, ordered key-value engine.
//!
//! The engine itself (storage format, compaction, recovery) sits behind the
//! [`common::StorageEngine`] capability traits. This crate owns everything a
//! caller touches: atomic batches, snapshot-isolated reads, bounded
//! bidirectional iteration and a uniform error model.
//!
//! # Key Concepts
//!
//! - **Session**: The owned connection to one open store, and the only
//!   component that calls into the engine.
//! - **Batch**: An ordered list of puts and deletes applied atomically.
//! - **Snapshot**: An immutable point-in-time view that reads can be pinned to.
//! - **KeyValueIterator**: A cursor over the ordered key space.
//! - **BlockingSession**: The same operations, blocking the calling thread.
//!
//! Every operation exists in three forms with identical results: an async
//! fn, a completion-sink dispatch ([`Session::dispatch`]) and a blocking
//! call. Keys and values may be text or raw bytes; see [`Data`].
//!
//! # Example
//!
//! ```ignore
//! use kvsession::{IteratorOptions, OpenOptions, ReadOptions, Session, WriteOptions};
//!
//! let session = Session::open("/data/users", OpenOptions::create()).await?;
//!
//! let mut batch = session.new_batch();
//! batch.put("user:1", "alice").put("user:2", "bob");
//! session.write(&batch, WriteOptions::default()).await?;
//!
//! let snapshot = session.new_snapshot().await?;
//! session.delete("user:1", WriteOptions::default()).await?;
//! assert!(snapshot.get("user:1", ReadOptions::default()).await?.is_some());
//! snapshot.release();
//!
//! let mut iter = session.new_iterator(IteratorOptions::prefix("user:")).await?;
//! let mut more = iter.seek_to_first().await?;
//! while more {
//!     println!("{:?}", iter.entry()?);
//!     more = iter.next().await?;
//! }
//! iter.release();
//!
//! session.close().await?;
//! ```

mod batch;
pub mod blocking;
mod codec;
mod error;
pub mod executor;
mod iterator;
#[cfg(feature = "metrics")]
mod metrics;
mod options;
mod session;
mod snapshot;

pub use batch::{Batch, BatchOp};
pub use blocking::{BlockingIterator, BlockingSession, BlockingSnapshot};
pub use codec::{Data, KeyRange, encode};
pub use common::{InMemoryEngine, OpenOptions, StorageEngine, StorageError};
pub use error::{Error, ErrorKind, Result};
pub use executor::Completion;
pub use iterator::{IteratorState, KeyValueIterator};
#[cfg(feature = "metrics")]
pub use metrics::SessionMetrics;
pub use options::{
    Config, IteratorOptions, ReadOptions, WriteOptions, from_json, validate_open,
};
pub use session::{Session, destroy, destroy_with_engine, repair, repair_with_engine};
pub use snapshot::Snapshot;
