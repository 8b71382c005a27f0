//! The session handle and its store lifecycle entry points.

use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use bytes::Bytes;
use common::{
    InMemoryEngine, OpenOptions, Storage, StorageBuilder, StorageCursor, StorageEngine,
    StorageError, StorageSnapshot,
};
use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use crate::batch::Batch;
use crate::codec::{self, Data, KeyRange};
use crate::error::{Error, Result};
use crate::executor::{self, Completion};
use crate::iterator::KeyValueIterator;
use crate::options::{self, Config, IteratorOptions, ReadOptions, WriteOptions};
use crate::snapshot::Snapshot;

/// State shared by a session and everything derived from it.
///
/// Batches, snapshots and iterators only hold a [`Weak`] reference, so they
/// never keep a closed session's connection alive.
pub(crate) struct SessionInner {
    path: PathBuf,
    storage: Arc<dyn Storage>,
    closed: AtomicBool,
    next_snapshot_id: AtomicU64,
    open_snapshots: AtomicUsize,
    open_iterators: AtomicUsize,
    #[cfg(feature = "metrics")]
    metrics: std::sync::OnceLock<crate::metrics::SessionMetrics>,
}

impl SessionInner {
    pub(crate) fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn snapshot_released(&self) {
        self.open_snapshots.fetch_sub(1, Ordering::AcqRel);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.open_snapshots.dec();
        }
    }

    pub(crate) fn iterator_released(&self) {
        self.open_iterators.fetch_sub(1, Ordering::AcqRel);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.open_iterators.dec();
        }
    }

    fn snapshot_opened(&self) -> u64 {
        self.open_snapshots.fetch_add(1, Ordering::AcqRel);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.open_snapshots.inc();
        }
        self.next_snapshot_id.fetch_add(1, Ordering::Relaxed)
    }

    fn iterator_opened(&self) {
        self.open_iterators.fetch_add(1, Ordering::AcqRel);
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.open_iterators.inc();
        }
    }

    fn record_read(&self) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.reads.inc();
        }
    }

    #[cfg_attr(not(feature = "metrics"), allow(unused_variables))]
    fn record_write(&self, ops: usize) {
        #[cfg(feature = "metrics")]
        if let Some(metrics) = self.metrics.get() {
            metrics.writes.inc();
            metrics.write_ops.inc_by(ops as u64);
        }
    }
}

/// Where a read is served from.
enum ReadView {
    Live(Arc<dyn Storage>),
    Snapshot(Arc<dyn StorageSnapshot>),
}

impl ReadView {
    async fn get(
        &self,
        key: Bytes,
        options: &common::ReadOptions,
    ) -> common::StorageResult<Option<common::Record>> {
        match self {
            ReadView::Live(storage) => storage.get(key, options).await,
            ReadView::Snapshot(snapshot) => snapshot.get(key, options).await,
        }
    }

    async fn cursor(
        &self,
        options: &common::ReadOptions,
    ) -> common::StorageResult<Box<dyn StorageCursor + Send + 'static>> {
        match self {
            ReadView::Live(storage) => storage.cursor(options).await,
            ReadView::Snapshot(snapshot) => snapshot.cursor(options).await,
        }
    }
}

/// An open connection to one store.
///
/// `Session` is the only component that talks to the engine. Every
/// operation comes in an asynchronous form (the methods here), a
/// completion-sink form ([`Session::dispatch`]) and a blocking form
/// ([`BlockingSession`](crate::BlockingSession)); all three drive the same
/// futures, so results and error classifications are identical.
///
/// Cloning a session is cheap and yields another handle to the same
/// connection. Closing any handle closes the connection for all of them.
///
/// # Example
///
/// ```ignore
/// use kvsession::{OpenOptions, ReadOptions, Session, WriteOptions};
///
/// let session = Session::open("/data/users", OpenOptions::create()).await?;
/// session.put("user:1", "alice", WriteOptions::default()).await?;
///
/// let value = session.get("user:1", ReadOptions::default()).await?;
/// assert_eq!(value.unwrap(), "alice");
///
/// session.close().await?;
/// ```
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    /// Opens the store at `path` on the process-wide in-memory engine.
    pub async fn open(path: impl AsRef<Path>, options: OpenOptions) -> Result<Self> {
        Self::open_with_engine(InMemoryEngine::global(), path, options).await
    }

    /// Opens the store described by `config`.
    pub async fn open_config(config: Config) -> Result<Self> {
        Self::open(&config.path, config.options).await
    }

    /// Opens the store at `path` on `engine`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidOption`] for options no engine can honor and
    /// [`Error::Engine`] for anything the engine rejects, such as a missing
    /// store without `create_if_missing`.
    pub async fn open_with_engine(
        engine: Arc<dyn StorageEngine>,
        path: impl AsRef<Path>,
        options: OpenOptions,
    ) -> Result<Self> {
        let path = path.as_ref();
        options::validate_open(&options)?;
        let storage = StorageBuilder::new(path)
            .with_engine(engine)
            .with_options(options)
            .build()
            .await?;
        tracing::debug!(path = %path.display(), "opened session");
        Ok(Self::with_path(path.to_path_buf(), storage))
    }

    /// Wraps a connection that was opened elsewhere.
    pub fn from_storage(storage: Arc<dyn Storage>) -> Self {
        Self::with_path(PathBuf::new(), storage)
    }

    fn with_path(path: PathBuf, storage: Arc<dyn Storage>) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                path,
                storage,
                closed: AtomicBool::new(false),
                next_snapshot_id: AtomicU64::new(1),
                open_snapshots: AtomicUsize::new(0),
                open_iterators: AtomicUsize::new(0),
                #[cfg(feature = "metrics")]
                metrics: std::sync::OnceLock::new(),
            }),
        }
    }

    pub(crate) fn from_inner(inner: Arc<SessionInner>) -> Self {
        Self { inner }
    }

    pub(crate) fn downgrade(&self) -> Weak<SessionInner> {
        Arc::downgrade(&self.inner)
    }

    /// The path this session was opened at.
    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    pub fn is_closed(&self) -> bool {
        self.inner.is_closed()
    }

    /// Snapshots created by this session and not yet released.
    pub fn open_snapshots(&self) -> usize {
        self.inner.open_snapshots.load(Ordering::Acquire)
    }

    /// Iterators created by this session and not yet released.
    pub fn open_iterators(&self) -> usize {
        self.inner.open_iterators.load(Ordering::Acquire)
    }

    fn check_open(&self) -> Result<()> {
        if self.inner.is_closed() {
            return Err(Error::session_closed());
        }
        Ok(())
    }

    fn read_view(&self, snapshot: Option<&Snapshot>) -> Result<ReadView> {
        match snapshot {
            Some(snapshot) => Ok(ReadView::Snapshot(snapshot.token_for(&self.inner)?)),
            None => Ok(ReadView::Live(Arc::clone(&self.inner.storage))),
        }
    }

    /// Gets the value for a key, or `None` if the key is absent.
    ///
    /// The value is decoded as text unless `options.return_bytes` is set.
    /// When `options.snapshot` is set the read is served from that snapshot.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn get(&self, key: impl Into<Data>, options: ReadOptions) -> Result<Option<Data>> {
        self.check_open()?;
        let key = codec::encode(key);
        let view = self.read_view(options.snapshot.as_ref())?;
        let engine_options =
            options::engine_read_options(options.verify_checksums, options.fill_cache);

        let record = match view.get(key, &engine_options).await {
            Ok(record) => record,
            Err(StorageError::NotFound(_)) => None,
            Err(e) => return Err(e.into()),
        };
        self.inner.record_read();

        record
            .map(|r| Data::decode(r.value, options.return_bytes))
            .transpose()
    }

    /// Puts a key-value pair, overwriting any existing value.
    ///
    /// Equivalent to writing a one-operation batch.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn put(
        &self,
        key: impl Into<Data>,
        value: impl Into<Data>,
        options: WriteOptions,
    ) -> Result<()> {
        let mut batch = Batch::new();
        batch.put(key, value);
        self.write(&batch, options).await
    }

    /// Deletes a key. No-op if the key does not exist.
    ///
    /// Equivalent to writing a one-operation batch.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn delete(&self, key: impl Into<Data>, options: WriteOptions) -> Result<()> {
        let mut batch = Batch::new();
        batch.delete(key);
        self.write(&batch, options).await
    }

    /// Applies every operation in `batch`, in order, as one atomic unit.
    ///
    /// The batch is left untouched and may be written again.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidInput`] if the batch was created by another
    /// session, and [`Error::Engine`] if the engine rejects the write, in
    /// which case none of the operations took effect.
    #[tracing::instrument(level = "trace", skip_all, fields(ops = batch.len()))]
    pub async fn write(&self, batch: &Batch, options: WriteOptions) -> Result<()> {
        self.check_open()?;
        batch.check_owner(&self.inner)?;
        let ops = batch.to_record_ops();
        let count = ops.len();

        self.inner
            .storage
            .apply(ops, &options::engine_write_options(options))
            .await?;
        self.inner.record_write(count);
        Ok(())
    }

    /// Creates an empty batch bound to this session.
    pub fn new_batch(&self) -> Batch {
        Batch::bound(self.downgrade())
    }

    /// Opens an iterator over the latest state, or over `options.snapshot`.
    ///
    /// The iterator starts unpositioned and must be released by the caller.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn new_iterator(&self, options: IteratorOptions) -> Result<KeyValueIterator> {
        self.check_open()?;
        let view = self.read_view(options.snapshot.as_ref())?;
        let engine_options =
            options::engine_read_options(options.verify_checksums, options.fill_cache);
        let cursor = view.cursor(&engine_options).await?;

        self.inner.iterator_opened();
        Ok(KeyValueIterator::new(self.downgrade(), cursor, options))
    }

    /// Captures the current state as an immutable view.
    #[tracing::instrument(level = "trace", skip_all)]
    pub async fn new_snapshot(&self) -> Result<Snapshot> {
        self.check_open()?;
        let token = self.inner.storage.snapshot().await?;
        let id = self.inner.snapshot_opened();
        Ok(Snapshot::new(id, self.downgrade(), token))
    }

    /// Forwards a named introspection query to the engine.
    ///
    /// Returns `None` if the engine does not recognize `name`.
    pub async fn property(&self, name: &str) -> Result<Option<String>> {
        self.check_open()?;
        Ok(self.inner.storage.property(name).await?)
    }

    /// Estimates the bytes spanned by the single range `[start, limit)`.
    pub async fn approximate_size(
        &self,
        start: impl Into<Data>,
        limit: impl Into<Data>,
    ) -> Result<u64> {
        let sizes = self
            .approximate_sizes([KeyRange::new(start, limit)])
            .await?;
        sizes.into_iter().next().ok_or_else(|| {
            Error::Engine(StorageError::Internal(
                "engine returned no size for the requested range".to_string(),
            ))
        })
    }

    /// Estimates the bytes spanned by each range, in order.
    ///
    /// Empty and inverted ranges yield zero. Use [`KeyRange::from_flat`] to
    /// pass ranges as a flat `[start, limit, start, limit, ...]` list.
    pub async fn approximate_sizes<I, R>(&self, ranges: I) -> Result<Vec<u64>>
    where
        I: IntoIterator<Item = R>,
        R: Into<KeyRange>,
    {
        self.check_open()?;
        let ranges: Vec<_> = ranges
            .into_iter()
            .map(|range| range.into().to_bytes_range())
            .collect();
        let sizes = self.inner.storage.approximate_sizes(&ranges).await?;
        if sizes.len() != ranges.len() {
            return Err(Error::Engine(StorageError::Internal(format!(
                "engine returned {} sizes for {} ranges",
                sizes.len(),
                ranges.len()
            ))));
        }
        Ok(sizes)
    }

    /// Flushes pending writes to durable storage.
    pub async fn flush(&self) -> Result<()> {
        self.check_open()?;
        Ok(self.inner.storage.flush().await?)
    }

    /// Closes the connection.
    ///
    /// Every later operation on this session, or on a snapshot or iterator
    /// created from it, fails with [`Error::InvalidState`]. Closing an
    /// already closed session is a no-op.
    pub async fn close(&self) -> Result<()> {
        if self.inner.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        let snapshots = self.open_snapshots();
        let iterators = self.open_iterators();
        if snapshots > 0 || iterators > 0 {
            tracing::warn!(
                path = %self.inner.path.display(),
                snapshots,
                iterators,
                "closing session with unreleased snapshots or iterators"
            );
        }
        self.inner.storage.close().await?;
        tracing::debug!(path = %self.inner.path.display(), "closed session");
        Ok(())
    }

    /// Runs `op` on a worker of the current tokio runtime and delivers its
    /// result to `completion`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] when called outside a tokio runtime.
    pub fn dispatch<T, F, Fut>(&self, op: F, completion: Completion<T>) -> Result<JoinHandle<()>>
    where
        F: FnOnce(Session) -> Fut,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let handle = Handle::try_current()
            .map_err(|e| Error::InvalidState(format!("no async runtime available: {}", e)))?;
        Ok(executor::dispatch(&handle, op(self.clone()), completion))
    }

    /// Registers this session's metrics into `registry`.
    ///
    /// Only the first registration takes effect.
    #[cfg(feature = "metrics")]
    pub fn register_metrics(&self, registry: &mut prometheus_client::registry::Registry) {
        if self.inner.metrics.get().is_none() {
            let metrics = crate::metrics::SessionMetrics::register(registry);
            metrics.open_snapshots.set(self.open_snapshots() as i64);
            metrics.open_iterators.set(self.open_iterators() as i64);
            let _ = self.inner.metrics.set(metrics);
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("path", &self.inner.path)
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// Removes the store at `path` on the process-wide in-memory engine.
pub async fn destroy(path: impl AsRef<Path>) -> Result<()> {
    destroy_with_engine(InMemoryEngine::global(), path).await
}

/// Removes the store at `path` on `engine`.
pub async fn destroy_with_engine(
    engine: Arc<dyn StorageEngine>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    engine.destroy(path).await?;
    tracing::debug!(path = %path.display(), "destroyed store");
    Ok(())
}

/// Repairs the store at `path` on the process-wide in-memory engine.
pub async fn repair(path: impl AsRef<Path>) -> Result<()> {
    repair_with_engine(InMemoryEngine::global(), path).await
}

/// Repairs the store at `path` on `engine`.
pub async fn repair_with_engine(
    engine: Arc<dyn StorageEngine>,
    path: impl AsRef<Path>,
) -> Result<()> {
    let path = path.as_ref();
    engine.repair(path).await?;
    tracing::debug!(path = %path.display(), "repaired store");
    Ok(())
}
