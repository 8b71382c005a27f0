//! Ordered collections of writes applied atomically.

use std::sync::{Arc, Weak};

use bytes::Bytes;
use common::{Record, RecordOp};

use crate::codec::{self, Data};
use crate::error::{Error, Result};
use crate::session::SessionInner;

/// A single queued write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOp {
    Put { key: Bytes, value: Bytes },
    Delete { key: Bytes },
}

/// An ordered list of puts and deletes.
///
/// Nothing touches the store until the batch is handed to
/// [`Session::write`](crate::Session::write), which applies every operation
/// in insertion order as one atomic unit. When the same key appears more
/// than once, the last operation wins.
///
/// ```ignore
/// let mut batch = session.new_batch();
/// batch.put("a", "1").put("b", "2").delete("a");
/// session.write(&batch, WriteOptions::default()).await?;
/// ```
#[derive(Clone, Default)]
pub struct Batch {
    ops: Vec<BatchOp>,
    owner: Option<Weak<SessionInner>>,
}

impl Batch {
    /// Creates a batch that any session may write.
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn bound(owner: Weak<SessionInner>) -> Self {
        Self {
            ops: Vec::new(),
            owner: Some(owner),
        }
    }

    pub fn put(&mut self, key: impl Into<Data>, value: impl Into<Data>) -> &mut Self {
        self.ops.push(BatchOp::Put {
            key: codec::encode(key),
            value: codec::encode(value),
        });
        self
    }

    pub fn delete(&mut self, key: impl Into<Data>) -> &mut Self {
        self.ops.push(BatchOp::Delete {
            key: codec::encode(key),
        });
        self
    }

    /// Drops every queued operation.
    pub fn clear(&mut self) -> &mut Self {
        self.ops.clear();
        self
    }

    pub fn len(&self) -> usize {
        self.ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// The queued operations, in insertion order.
    pub fn ops(&self) -> &[BatchOp] {
        &self.ops
    }

    pub(crate) fn check_owner(&self, session: &Arc<SessionInner>) -> Result<()> {
        match &self.owner {
            Some(owner) if !std::ptr::eq(owner.as_ptr(), Arc::as_ptr(session)) => Err(
                Error::InvalidInput("batch was created by a different session".to_string()),
            ),
            _ => Ok(()),
        }
    }

    pub(crate) fn to_record_ops(&self) -> Vec<RecordOp> {
        self.ops
            .iter()
            .map(|op| match op {
                BatchOp::Put { key, value } => {
                    RecordOp::Put(Record::new(key.clone(), value.clone()))
                }
                BatchOp::Delete { key } => RecordOp::Delete(key.clone()),
            })
            .collect()
    }
}

impl std::fmt::Debug for Batch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Batch")
            .field("ops", &self.ops)
            .field("bound", &self.owner.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn should_queue_operations_in_insertion_order() {
        // given
        let mut batch = Batch::new();

        // when
        batch.put("a", "1").delete("b").put(b"c", vec![0xFF]);

        // then
        assert_eq!(
            batch.ops(),
            &[
                BatchOp::Put {
                    key: Bytes::from("a"),
                    value: Bytes::from("1"),
                },
                BatchOp::Delete {
                    key: Bytes::from("b"),
                },
                BatchOp::Put {
                    key: Bytes::from("c"),
                    value: Bytes::from_static(&[0xFF]),
                },
            ]
        );
    }

    #[test]
    fn should_clear_queued_operations() {
        let mut batch = Batch::new();
        batch.put("a", "1").put("b", "2");

        batch.clear();

        assert!(batch.is_empty());
        assert_eq!(batch.len(), 0);
    }

    #[test]
    fn should_lower_to_record_ops() {
        // given
        let mut batch = Batch::new();
        batch.put("k", "v").delete("k");

        // when
        let ops = batch.to_record_ops();

        // then
        assert_eq!(
            ops,
            vec![
                RecordOp::Put(Record::new(Bytes::from("k"), Bytes::from("v"))),
                RecordOp::Delete(Bytes::from("k")),
            ]
        );
    }
}
