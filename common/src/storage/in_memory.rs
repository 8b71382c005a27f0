use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::ops::Bound;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, LazyLock, Mutex, RwLock};

use async_trait::async_trait;
use bytes::Bytes;

use super::{
    OpenOptions, ReadOptions, Storage, StorageCursor, StorageEngine, StorageSnapshot, WriteOptions,
};
use crate::storage::RecordOp;
use crate::{BytesRange, Record, StorageError, StorageRead, StorageResult};

/// Number of levels reported by the `kv.num-files-at-level<N>` property.
const NUM_LEVELS: u32 = 7;

const PROPERTY_PREFIX: &str = "kv.";

type Table = BTreeMap<Bytes, Bytes>;

static GLOBAL_ENGINE: LazyLock<Arc<InMemoryEngine>> =
    LazyLock::new(|| Arc::new(InMemoryEngine::new()));

/// Shared state of one named store.
///
/// The table is copy-on-write: snapshots and cursors hold an `Arc` to the
/// table that was current when they were taken, and a writer only clones the
/// table while such a reader is still alive.
#[derive(Debug, Default)]
struct StoreState {
    data: RwLock<Arc<Table>>,
    locked: AtomicBool,
    writes: AtomicU64,
    synced_writes: AtomicU64,
}

impl StoreState {
    fn current(&self) -> StorageResult<Arc<Table>> {
        let data = self
            .data
            .read()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire read lock: {}", e)))?;
        Ok(Arc::clone(&data))
    }
}

/// In-memory engine keeping a registry of stores keyed by path.
///
/// Paths are plain names; nothing touches the filesystem. A store may be open
/// through one connection at a time, mirroring the lock file of an on-disk
/// engine.
#[derive(Debug, Default)]
pub struct InMemoryEngine {
    stores: Mutex<HashMap<PathBuf, Arc<StoreState>>>,
}

impl InMemoryEngine {
    /// Creates an engine with an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the process-wide engine.
    pub fn global() -> Arc<InMemoryEngine> {
        Arc::clone(&GLOBAL_ENGINE)
    }

    /// Whether a store exists at `path`.
    pub fn exists(&self, path: &Path) -> bool {
        self.stores
            .lock()
            .map(|stores| stores.contains_key(path))
            .unwrap_or(false)
    }

    fn registry(&self) -> StorageResult<std::sync::MutexGuard<'_, HashMap<PathBuf, Arc<StoreState>>>> {
        self.stores
            .lock()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire registry lock: {}", e)))
    }
}

fn lock_held(path: &Path) -> StorageError {
    StorageError::Io(format!(
        "lock {}/LOCK: already held by process",
        path.display()
    ))
}

#[async_trait]
impl StorageEngine for InMemoryEngine {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn open(&self, path: &Path, options: &OpenOptions) -> StorageResult<Arc<dyn Storage>> {
        let mut stores = self.registry()?;

        let store = match stores.get(path) {
            Some(_) if options.error_if_exists => {
                return Err(StorageError::InvalidArgument(format!(
                    "{}: exists (error_if_exists is true)",
                    path.display()
                )));
            }
            Some(store) => Arc::clone(store),
            None if !options.create_if_missing => {
                return Err(StorageError::InvalidArgument(format!(
                    "{}: does not exist (create_if_missing is false)",
                    path.display()
                )));
            }
            None => {
                let store = Arc::new(StoreState::default());
                stores.insert(path.to_path_buf(), Arc::clone(&store));
                store
            }
        };

        if store.locked.swap(true, Ordering::AcqRel) {
            return Err(lock_held(path));
        }

        Ok(Arc::new(InMemoryStorage {
            path: path.to_path_buf(),
            store,
            options: options.clone(),
            closed: AtomicBool::new(false),
        }))
    }

    async fn destroy(&self, path: &Path) -> StorageResult<()> {
        let mut stores = self.registry()?;
        let locked = match stores.get(path) {
            Some(store) => store.locked.load(Ordering::Acquire),
            None => return Ok(()),
        };
        if locked {
            return Err(lock_held(path));
        }
        stores.remove(path);
        Ok(())
    }

    async fn repair(&self, path: &Path) -> StorageResult<()> {
        let stores = self.registry()?;
        match stores.get(path) {
            None => Err(StorageError::Io(format!(
                "{}: No such file or directory",
                path.display()
            ))),
            Some(store) if store.locked.load(Ordering::Acquire) => Err(lock_held(path)),
            // Nothing in memory can be torn, so there is nothing to salvage.
            Some(_) => Ok(()),
        }
    }
}

/// An open connection to an in-memory store.
///
/// Useful for testing or scenarios where durability is not required. Write
/// options are accepted but `sync` has no durable medium to wait for.
pub struct InMemoryStorage {
    path: PathBuf,
    store: Arc<StoreState>,
    options: OpenOptions,
    closed: AtomicBool,
}

impl InMemoryStorage {
    /// Creates a standalone store that is not registered with any engine.
    pub fn new() -> Self {
        Self {
            path: PathBuf::new(),
            store: Arc::new(StoreState {
                locked: AtomicBool::new(true),
                ..StoreState::default()
            }),
            options: OpenOptions::default(),
            closed: AtomicBool::new(false),
        }
    }

    fn check_open(&self) -> StorageResult<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StorageError::Io(format!(
                "{}: store is closed",
                self.path.display()
            )));
        }
        Ok(())
    }

    fn property_value(&self, table: &Table, name: &str) -> Option<String> {
        let name = name.strip_prefix(PROPERTY_PREFIX)?;
        match name {
            "num-entries" => Some(table.len().to_string()),
            "approximate-memory-usage" => Some(table_bytes(table).to_string()),
            "stats" => Some(self.stats(table)),
            _ => {
                let level: u32 = name.strip_prefix("num-files-at-level")?.parse().ok()?;
                (level < NUM_LEVELS).then(|| "0".to_string())
            }
        }
    }

    fn stats(&self, table: &Table) -> String {
        let mut out = String::new();
        let _ = writeln!(out, "entries: {}", table.len());
        let _ = writeln!(out, "bytes: {}", table_bytes(table));
        let _ = writeln!(
            out,
            "writes: {}",
            self.store.writes.load(Ordering::Relaxed)
        );
        let _ = writeln!(
            out,
            "synced writes: {}",
            self.store.synced_writes.load(Ordering::Relaxed)
        );
        let _ = writeln!(out, "write buffer size: {}", self.options.write_buffer_size);
        let _ = writeln!(out, "compression: {}", self.options.compression);
        out
    }
}

impl Default for InMemoryStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for InMemoryStorage {
    fn drop(&mut self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.store.locked.store(false, Ordering::Release);
        }
    }
}

fn table_bytes(table: &Table) -> u64 {
    table
        .iter()
        .map(|(k, v)| (k.len() + v.len()) as u64)
        .sum()
}

fn range_bytes(table: &Table, range: &BytesRange) -> u64 {
    if range.is_empty() {
        return 0;
    }
    table
        .range((range.start.clone(), range.end.clone()))
        .map(|(k, v)| (k.len() + v.len()) as u64)
        .sum()
}

#[async_trait]
impl StorageRead for InMemoryStorage {
    /// Retrieves a single record by key from the in-memory store.
    ///
    /// Returns `None` if the key does not exist.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes, _options: &ReadOptions) -> StorageResult<Option<Record>> {
        self.check_open()?;
        let table = self.store.current()?;
        Ok(table
            .get(&key)
            .map(|value| Record::new(key, value.clone())))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn cursor(
        &self,
        _options: &ReadOptions,
    ) -> StorageResult<Box<dyn StorageCursor + Send + 'static>> {
        self.check_open()?;
        Ok(Box::new(InMemoryCursor::new(self.store.current()?)))
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    /// Applies all operations under a single write lock acquisition.
    #[tracing::instrument(level = "trace", skip_all)]
    async fn apply(&self, ops: Vec<RecordOp>, options: &WriteOptions) -> StorageResult<()> {
        self.check_open()?;
        let mut data = self
            .store
            .data
            .write()
            .map_err(|e| StorageError::Internal(format!("Failed to acquire write lock: {}", e)))?;

        let table = Arc::make_mut(&mut data);
        for op in ops {
            match op {
                RecordOp::Put(record) => {
                    table.insert(record.key, record.value);
                }
                RecordOp::Delete(key) => {
                    table.remove(&key);
                }
            }
        }

        self.store.writes.fetch_add(1, Ordering::Relaxed);
        if options.sync {
            self.store.synced_writes.fetch_add(1, Ordering::Relaxed);
        }
        Ok(())
    }

    /// Creates a point-in-time snapshot sharing the current table.
    async fn snapshot(&self) -> StorageResult<Arc<dyn StorageSnapshot>> {
        self.check_open()?;
        Ok(Arc::new(InMemoryStorageSnapshot {
            data: self.store.current()?,
        }))
    }

    async fn property(&self, name: &str) -> StorageResult<Option<String>> {
        self.check_open()?;
        let table = self.store.current()?;
        Ok(self.property_value(&table, name))
    }

    async fn approximate_sizes(&self, ranges: &[BytesRange]) -> StorageResult<Vec<u64>> {
        self.check_open()?;
        let table = self.store.current()?;
        Ok(ranges
            .iter()
            .map(|range| range_bytes(&table, range))
            .collect())
    }

    async fn flush(&self) -> StorageResult<()> {
        // No-op for in-memory storage - all writes are immediately visible
        self.check_open()
    }

    async fn close(&self) -> StorageResult<()> {
        if !self.closed.swap(true, Ordering::AcqRel) {
            self.store.locked.store(false, Ordering::Release);
        }
        Ok(())
    }
}

/// In-memory snapshot pinned to the table that was current at creation.
pub struct InMemoryStorageSnapshot {
    data: Arc<Table>,
}

#[async_trait]
impl StorageRead for InMemoryStorageSnapshot {
    #[tracing::instrument(level = "trace", skip_all)]
    async fn get(&self, key: Bytes, _options: &ReadOptions) -> StorageResult<Option<Record>> {
        Ok(self
            .data
            .get(&key)
            .map(|value| Record::new(key, value.clone())))
    }

    #[tracing::instrument(level = "trace", skip_all)]
    async fn cursor(
        &self,
        _options: &ReadOptions,
    ) -> StorageResult<Box<dyn StorageCursor + Send + 'static>> {
        Ok(Box::new(InMemoryCursor::new(Arc::clone(&self.data))))
    }
}

#[async_trait]
impl StorageSnapshot for InMemoryStorageSnapshot {}

struct InMemoryCursor {
    data: Arc<Table>,
    current: Option<Record>,
}

impl InMemoryCursor {
    fn new(data: Arc<Table>) -> Self {
        Self {
            data,
            current: None,
        }
    }
}

fn to_record((key, value): (&Bytes, &Bytes)) -> Record {
    Record::new(key.clone(), value.clone())
}

#[async_trait]
impl StorageCursor for InMemoryCursor {
    async fn seek_to_first(&mut self) -> StorageResult<()> {
        self.current = self.data.iter().next().map(to_record);
        Ok(())
    }

    async fn seek_to_last(&mut self) -> StorageResult<()> {
        self.current = self.data.iter().next_back().map(to_record);
        Ok(())
    }

    async fn seek(&mut self, target: &[u8]) -> StorageResult<()> {
        self.current = self
            .data
            .range::<[u8], _>((Bound::Included(target), Bound::Unbounded))
            .next()
            .map(to_record);
        Ok(())
    }

    async fn next(&mut self) -> StorageResult<()> {
        let next = match &self.current {
            Some(current) => self
                .data
                .range::<[u8], _>((Bound::Excluded(current.key.as_ref()), Bound::Unbounded))
                .next()
                .map(to_record),
            None => return Ok(()),
        };
        self.current = next;
        Ok(())
    }

    async fn prev(&mut self) -> StorageResult<()> {
        let prev = match &self.current {
            Some(current) => self
                .data
                .range::<[u8], _>((Bound::Unbounded, Bound::Excluded(current.key.as_ref())))
                .next_back()
                .map(to_record),
            None => return Ok(()),
        };
        self.current = prev;
        Ok(())
    }

    fn current(&self) -> Option<&Record> {
        self.current.as_ref()
    }
}

/// Injected failure that fires either once or on every call.
#[cfg(feature = "test-utils")]
#[derive(Clone)]
enum Failure {
    /// Error is returned once, then automatically cleared.
    Once(super::StorageError),
    /// Error is returned on every subsequent call until explicitly cleared.
    Persistent(super::StorageError),
}

#[cfg(feature = "test-utils")]
type FailSlot = arc_swap::ArcSwap<Option<Failure>>;

/// Checks a [`FailSlot`] and returns an error if one is set.
///
/// For [`Failure::Once`], the slot is atomically swapped to `None` so the
/// error fires exactly once. For [`Failure::Persistent`], the slot is left
/// unchanged.
#[cfg(feature = "test-utils")]
fn check_failure(slot: &FailSlot) -> super::StorageResult<()> {
    let guard = slot.load();
    match guard.as_ref() {
        None => Ok(()),
        Some(Failure::Persistent(err)) => Err(err.clone()),
        Some(Failure::Once(_)) => {
            let prev = slot.swap(Arc::new(None));
            match prev.as_ref() {
                Some(Failure::Once(err)) => Err(err.clone()),
                _ => Ok(()),
            }
        }
    }
}

/// A storage wrapper that delegates to an inner [`Storage`] but can inject
/// failures into `get`, `cursor`, `apply`, `snapshot` and `flush` on demand.
/// It also remembers the options of the most recent read and write.
///
/// Failures can be *persistent* (returned on every call until cleared) or
/// *once* (returned on the next call, then automatically cleared).
///
/// Gated behind the `test-utils` feature.
///
/// # Example
///
/// ```ignore
/// let inner = Arc::new(InMemoryStorage::new());
/// let storage = FailingStorage::wrap(inner);
/// storage.fail_apply(StorageError::Io("disk full".into()));
/// // every apply call now returns Err(...)
///
/// storage.fail_get_once(StorageError::Corruption("bad block".into()));
/// // only the next get call returns Err(...), then auto-clears
/// ```
#[cfg(feature = "test-utils")]
pub struct FailingStorage {
    inner: Arc<dyn super::Storage>,
    fail_get: FailSlot,
    fail_cursor: FailSlot,
    fail_apply: FailSlot,
    fail_snapshot: FailSlot,
    fail_flush: FailSlot,
    last_read: arc_swap::ArcSwapOption<ReadOptions>,
    last_write: arc_swap::ArcSwapOption<WriteOptions>,
}

#[cfg(feature = "test-utils")]
impl FailingStorage {
    /// Wraps an existing storage, with all failure injections initially `None`.
    pub fn wrap(inner: Arc<dyn super::Storage>) -> Arc<Self> {
        Arc::new(Self {
            inner,
            fail_get: arc_swap::ArcSwap::from_pointee(None),
            fail_cursor: arc_swap::ArcSwap::from_pointee(None),
            fail_apply: arc_swap::ArcSwap::from_pointee(None),
            fail_snapshot: arc_swap::ArcSwap::from_pointee(None),
            fail_flush: arc_swap::ArcSwap::from_pointee(None),
            last_read: arc_swap::ArcSwapOption::empty(),
            last_write: arc_swap::ArcSwapOption::empty(),
        })
    }

    /// Options passed to the most recent `get` or `cursor`, failed or not.
    pub fn last_read_options(&self) -> Option<ReadOptions> {
        self.last_read.load_full().map(|options| *options)
    }

    /// Options passed to the most recent `apply`, failed or not.
    pub fn last_write_options(&self) -> Option<WriteOptions> {
        self.last_write.load_full().map(|options| *options)
    }

    /// Makes `get` return the given error on every subsequent call.
    pub fn fail_get(&self, err: super::StorageError) {
        self.fail_get.store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `get` return the given error on the next call only.
    pub fn fail_get_once(&self, err: super::StorageError) {
        self.fail_get.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `cursor` return the given error on every subsequent call.
    pub fn fail_cursor(&self, err: super::StorageError) {
        self.fail_cursor
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `apply` return the given error on every subsequent call.
    pub fn fail_apply(&self, err: super::StorageError) {
        self.fail_apply
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `apply` return the given error on the next call only.
    pub fn fail_apply_once(&self, err: super::StorageError) {
        self.fail_apply.store(Arc::new(Some(Failure::Once(err))));
    }

    /// Makes `snapshot` return the given error on every subsequent call.
    pub fn fail_snapshot(&self, err: super::StorageError) {
        self.fail_snapshot
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Makes `flush` return the given error on every subsequent call.
    pub fn fail_flush(&self, err: super::StorageError) {
        self.fail_flush
            .store(Arc::new(Some(Failure::Persistent(err))));
    }

    /// Clears every injected failure.
    pub fn clear(&self) {
        for slot in [
            &self.fail_get,
            &self.fail_cursor,
            &self.fail_apply,
            &self.fail_snapshot,
            &self.fail_flush,
        ] {
            slot.store(Arc::new(None));
        }
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl super::StorageRead for FailingStorage {
    async fn get(
        &self,
        key: Bytes,
        options: &ReadOptions,
    ) -> super::StorageResult<Option<crate::Record>> {
        self.last_read.store(Some(Arc::new(*options)));
        check_failure(&self.fail_get)?;
        self.inner.get(key, options).await
    }

    async fn cursor(
        &self,
        options: &ReadOptions,
    ) -> super::StorageResult<Box<dyn StorageCursor + Send + 'static>> {
        self.last_read.store(Some(Arc::new(*options)));
        check_failure(&self.fail_cursor)?;
        self.inner.cursor(options).await
    }
}

#[cfg(feature = "test-utils")]
#[async_trait]
impl super::Storage for FailingStorage {
    async fn apply(
        &self,
        ops: Vec<super::RecordOp>,
        options: &WriteOptions,
    ) -> super::StorageResult<()> {
        self.last_write.store(Some(Arc::new(*options)));
        check_failure(&self.fail_apply)?;
        self.inner.apply(ops, options).await
    }

    async fn snapshot(&self) -> super::StorageResult<Arc<dyn super::StorageSnapshot>> {
        check_failure(&self.fail_snapshot)?;
        self.inner.snapshot().await
    }

    async fn property(&self, name: &str) -> super::StorageResult<Option<String>> {
        self.inner.property(name).await
    }

    async fn approximate_sizes(&self, ranges: &[BytesRange]) -> super::StorageResult<Vec<u64>> {
        self.inner.approximate_sizes(ranges).await
    }

    async fn flush(&self) -> super::StorageResult<()> {
        check_failure(&self.fail_flush)?;
        self.inner.flush().await
    }

    async fn close(&self) -> super::StorageResult<()> {
        self.inner.close().await
    }
}
