//! Storage factory for opening connections from an engine and a path.
//!
//! [`StorageBuilder`] gathers everything needed to open one store. It
//! defaults to the process-wide [`InMemoryEngine`] so callers that do not
//! care about the backend only provide a path.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use super::in_memory::InMemoryEngine;
use super::{OpenOptions, Storage, StorageEngine, StorageResult};

/// Builder for opening storage connections with custom options.
///
/// # Example
///
/// ```rust,ignore
/// use common::storage::factory::StorageBuilder;
/// use common::storage::OpenOptions;
///
/// let storage = StorageBuilder::new("/data/users")
///     .with_options(OpenOptions::create())
///     .build()
///     .await?;
/// ```
pub struct StorageBuilder {
    path: PathBuf,
    options: OpenOptions,
    engine: Option<Arc<dyn StorageEngine>>,
}

impl StorageBuilder {
    /// Creates a new storage builder for the store at `path`.
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            options: OpenOptions::default(),
            engine: None,
        }
    }

    /// Sets the open-time options.
    pub fn with_options(mut self, options: OpenOptions) -> Self {
        self.options = options;
        self
    }

    /// Sets the engine to open the store with.
    ///
    /// When unset, the process-wide in-memory engine is used.
    pub fn with_engine(mut self, engine: Arc<dyn StorageEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Opens the store.
    pub async fn build(self) -> StorageResult<Arc<dyn Storage>> {
        let engine = match self.engine {
            Some(engine) => engine,
            None => InMemoryEngine::global(),
        };
        engine.open(&self.path, &self.options).await
    }
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;
    use crate::storage::{ReadOptions, RecordOp, WriteOptions};
    use crate::{Record, StorageError};

    #[tokio::test]
    async fn should_open_with_custom_engine_and_options() {
        // given
        let engine = Arc::new(InMemoryEngine::new());

        // when
        let storage = StorageBuilder::new("/builder/custom")
            .with_engine(engine.clone())
            .with_options(OpenOptions::create())
            .build()
            .await
            .unwrap();
        storage
            .apply(
                vec![RecordOp::Put(Record::new(Bytes::from("k"), Bytes::from("v")))],
                &WriteOptions::default(),
            )
            .await
            .unwrap();

        // then
        assert!(engine.exists(Path::new("/builder/custom")));
        let record = storage
            .get(Bytes::from("k"), &ReadOptions::default())
            .await
            .unwrap();
        assert_eq!(record.unwrap().value, Bytes::from("v"));
    }

    #[tokio::test]
    async fn should_propagate_engine_open_failure() {
        // given
        let engine = Arc::new(InMemoryEngine::new());

        // when
        let result = StorageBuilder::new("/builder/missing")
            .with_engine(engine)
            .build()
            .await;

        // then
        assert!(matches!(result, Err(StorageError::InvalidArgument(_))));
    }
}
