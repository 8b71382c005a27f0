//! Synchronous facade over the session types.
//!
//! Each blocking type wraps its async counterpart and a runtime handle, and
//! blocks on exactly the futures the async API returns. Results and errors
//! are therefore the same in both modes.

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use common::{InMemoryEngine, OpenOptions, StorageEngine, StorageError};
use tokio::runtime::{Handle, Runtime};

use crate::batch::Batch;
use crate::codec::{Data, KeyRange};
use crate::error::{Error, Result};
use crate::executor;
use crate::iterator::{IteratorState, KeyValueIterator};
use crate::options::{IteratorOptions, ReadOptions, WriteOptions};
use crate::session::{self, Session};
use crate::snapshot::Snapshot;

/// A runtime owned by a blocking session.
///
/// Shut down in the background on drop so that dropping the last handle
/// from inside another runtime does not panic.
struct OwnedRuntime(Option<Runtime>);

impl Drop for OwnedRuntime {
    fn drop(&mut self) {
        if let Some(runtime) = self.0.take() {
            runtime.shutdown_background();
        }
    }
}

#[derive(Clone)]
struct Bridge {
    handle: Handle,
    _runtime: Option<Arc<OwnedRuntime>>,
}

impl Bridge {
    fn block_on<F: Future>(&self, fut: F) -> F::Output {
        executor::block_on(&self.handle, fut)
    }
}

fn runtime_error(e: std::io::Error) -> Error {
    Error::Engine(StorageError::Io(format!("failed to create runtime: {}", e)))
}

fn build_runtime() -> Result<Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .thread_name("kvsession-blocking")
        .enable_all()
        .build()
        .map_err(runtime_error)
}

/// Runs `fut` on a throwaway runtime.
fn block_on_detached<F: Future>(fut: F) -> Result<F::Output> {
    let run = || -> Result<F::Output> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(runtime_error)?;
        Ok(runtime.block_on(fut))
    };
    match Handle::try_current() {
        Ok(_) => tokio::task::block_in_place(run),
        Err(_) => run(),
    }
}

/// A [`Session`] whose operations block the calling thread.
///
/// # Example
///
/// ```ignore
/// use kvsession::{BlockingSession, OpenOptions, ReadOptions, WriteOptions};
///
/// let session = BlockingSession::open("/data/users", OpenOptions::create())?;
/// session.put("user:1", "alice", WriteOptions::default())?;
/// assert_eq!(session.get("user:1", ReadOptions::default())?.unwrap(), "alice");
/// session.close()?;
/// ```
#[derive(Clone)]
pub struct BlockingSession {
    session: Session,
    bridge: Bridge,
}

impl BlockingSession {
    /// Opens the store at `path` on the process-wide in-memory engine, on a
    /// runtime owned by the returned session.
    ///
    /// # Panics
    ///
    /// Panics when called from a current-thread tokio runtime, such as the
    /// one a default `#[tokio::test]` provides. Call it outside any runtime or
    /// from a multi-threaded one.
    pub fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        Self::open_with_engine(InMemoryEngine::global(), path, options)
    }

    /// Opens the store at `path` on `engine`, on a runtime owned by the
    /// returned session.
    ///
    /// # Panics
    ///
    /// Panics when called from a current-thread tokio runtime, such as the
    /// one a default `#[tokio::test]` provides. Call it outside any runtime or
    /// from a multi-threaded one.
    pub fn open_with_engine(
        engine: Arc<dyn StorageEngine>,
        path: impl AsRef<Path>,
        options: OpenOptions,
    ) -> Result<Self> {
        let runtime = build_runtime()?;
        let bridge = Bridge {
            handle: runtime.handle().clone(),
            _runtime: Some(Arc::new(OwnedRuntime(Some(runtime)))),
        };
        let session = bridge.block_on(Session::open_with_engine(engine, path, options))?;
        Ok(Self { session, bridge })
    }

    /// Wraps an existing session, driving it on `handle`.
    pub fn new(session: Session, handle: Handle) -> Self {
        Self {
            session,
            bridge: Bridge {
                handle,
                _runtime: None,
            },
        }
    }

    /// The async session behind this handle.
    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn get(&self, key: impl Into<Data>, options: ReadOptions) -> Result<Option<Data>> {
        self.bridge.block_on(self.session.get(key, options))
    }

    pub fn put(
        &self,
        key: impl Into<Data>,
        value: impl Into<Data>,
        options: WriteOptions,
    ) -> Result<()> {
        self.bridge.block_on(self.session.put(key, value, options))
    }

    pub fn delete(&self, key: impl Into<Data>, options: WriteOptions) -> Result<()> {
        self.bridge.block_on(self.session.delete(key, options))
    }

    pub fn write(&self, batch: &Batch, options: WriteOptions) -> Result<()> {
        self.bridge.block_on(self.session.write(batch, options))
    }

    pub fn new_batch(&self) -> Batch {
        self.session.new_batch()
    }

    pub fn new_iterator(&self, options: IteratorOptions) -> Result<BlockingIterator> {
        let iter = self.bridge.block_on(self.session.new_iterator(options))?;
        Ok(BlockingIterator {
            iter,
            bridge: self.bridge.clone(),
        })
    }

    pub fn new_snapshot(&self) -> Result<BlockingSnapshot> {
        let snapshot = self.bridge.block_on(self.session.new_snapshot())?;
        Ok(BlockingSnapshot {
            snapshot,
            bridge: self.bridge.clone(),
        })
    }

    pub fn property(&self, name: &str) -> Result<Option<String>> {
        self.bridge.block_on(self.session.property(name))
    }

    pub fn approximate_size(&self, start: impl Into<Data>, limit: impl Into<Data>) -> Result<u64> {
        self.bridge
            .block_on(self.session.approximate_size(start, limit))
    }

    pub fn approximate_sizes<I, R>(&self, ranges: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = R>,
        R: Into<KeyRange>,
    {
        self.bridge.block_on(self.session.approximate_sizes(ranges))
    }

    pub fn flush(&self) -> Result<()> {
        self.bridge.block_on(self.session.flush())
    }

    pub fn close(&self) -> Result<()> {
        self.bridge.block_on(self.session.close())
    }
}

/// A [`Snapshot`] whose reads block the calling thread.
#[derive(Clone)]
pub struct BlockingSnapshot {
    snapshot: Snapshot,
    bridge: Bridge,
}

impl BlockingSnapshot {
    /// The async snapshot, for use in [`ReadOptions::with_snapshot`].
    pub fn snapshot(&self) -> &Snapshot {
        &self.snapshot
    }

    pub fn id(&self) -> u64 {
        self.snapshot.id()
    }

    pub fn get(&self, key: impl Into<Data>, options: ReadOptions) -> Result<Option<Data>> {
        self.bridge.block_on(self.snapshot.get(key, options))
    }

    pub fn new_iterator(&self, options: IteratorOptions) -> Result<BlockingIterator> {
        let iter = self.bridge.block_on(self.snapshot.new_iterator(options))?;
        Ok(BlockingIterator {
            iter,
            bridge: self.bridge.clone(),
        })
    }

    pub fn is_released(&self) -> bool {
        self.snapshot.is_released()
    }

    pub fn release(&self) {
        self.snapshot.release();
    }
}

/// A [`KeyValueIterator`] whose moves block the calling thread.
pub struct BlockingIterator {
    iter: KeyValueIterator,
    bridge: Bridge,
}

impl BlockingIterator {
    pub fn seek_to_first(&mut self) -> Result<bool> {
        self.bridge.block_on(self.iter.seek_to_first())
    }

    pub fn seek_to_last(&mut self) -> Result<bool> {
        self.bridge.block_on(self.iter.seek_to_last())
    }

    pub fn seek(&mut self, target: impl Into<Data>) -> Result<bool> {
        self.bridge.block_on(self.iter.seek(target))
    }

    pub fn next(&mut self) -> Result<bool> {
        self.bridge.block_on(self.iter.next())
    }

    pub fn prev(&mut self) -> Result<bool> {
        self.bridge.block_on(self.iter.prev())
    }

    pub fn key(&self) -> Result<Data> {
        self.iter.key()
    }

    pub fn value(&self) -> Result<Data> {
        self.iter.value()
    }

    pub fn entry(&self) -> Result<(Data, Data)> {
        self.iter.entry()
    }

    pub fn valid(&self) -> bool {
        self.iter.valid()
    }

    pub fn state(&self) -> IteratorState {
        self.iter.state()
    }

    pub fn release(&mut self) {
        self.iter.release();
    }
}

/// Blocking form of [`crate::destroy`].
///
/// # Panics
///
/// Panics when called from a current-thread tokio runtime.
pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
    block_on_detached(session::destroy(path))?
}

/// Blocking form of [`crate::destroy_with_engine`].
///
/// # Panics
///
/// Panics when called from a current-thread tokio runtime.
pub fn destroy_with_engine(engine: Arc<dyn StorageEngine>, path: impl AsRef<Path>) -> Result<()> {
    block_on_detached(session::destroy_with_engine(engine, path))?
}

/// Blocking form of [`crate::repair`].
///
/// # Panics
///
/// Panics when called from a current-thread tokio runtime.
pub fn repair(path: impl AsRef<Path>) -> Result<()> {
    block_on_detached(session::repair(path))?
}

/// Blocking form of [`crate::repair_with_engine`].
///
/// # Panics
///
/// Panics when called from a current-thread tokio runtime.
pub fn repair_with_engine(engine: Arc<dyn StorageEngine>, path: impl AsRef<Path>) -> Result<()> {
    block_on_detached(session::repair_with_engine(engine, path))?
}
