//! Chunked, fail-fast application of sheet writes.

use std::fmt;
use std::future::Future;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::errors::{Error, Result};

/// Kind of operation list being applied. Runs apply them in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Update,
    Create,
    Delete,
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Update => "update",
            Self::Create => "create",
            Self::Delete => "delete",
        })
    }
}

/// A chunk was rejected. Chunks before it stay applied.
#[derive(Debug, Error)]
#[error("{kind} chunk {chunk_index} failed after {applied} applied: {source}")]
pub struct BatchApplyError {
    pub kind: OperationKind,
    /// Operations applied by earlier chunks of this list.
    pub applied: usize,
    /// Zero-based index of the failing chunk.
    pub chunk_index: usize,
    pub source: Error,
}

/// Splits operation lists into contiguous chunks and applies them one at a time.
#[derive(Debug, Clone, Copy)]
pub struct BatchApplier {
    chunk_size: usize,
}

impl BatchApplier {
    pub fn new(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
        }
    }

    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    pub fn chunk_count(&self, operations: usize) -> usize {
        operations.div_ceil(self.chunk_size)
    }

    /// Applies `operations` in chunks of at most `chunk_size`, sequentially.
    ///
    /// Stops at the first failing chunk. Returns the number of operations
    /// applied; on failure the error carries the count applied before it.
    pub async fn apply<T, F, Fut>(
        &self,
        kind: OperationKind,
        operations: Vec<T>,
        mut apply_fn: F,
    ) -> std::result::Result<usize, BatchApplyError>
    where
        F: FnMut(Vec<T>) -> Fut,
        Fut: Future<Output = Result<()>>,
    {
        let total = operations.len();
        let mut remaining = operations.into_iter();
        let mut applied = 0;
        let mut chunk_index = 0;

        loop {
            let chunk: Vec<T> = remaining.by_ref().take(self.chunk_size).collect();
            if chunk.is_empty() {
                break;
            }
            let len = chunk.len();
            if let Err(source) = apply_fn(chunk).await {
                return Err(BatchApplyError {
                    kind,
                    applied,
                    chunk_index,
                    source,
                });
            }
            applied += len;
            debug!(
                "Applied {} chunk {} ({} ops, {}/{})",
                kind, chunk_index, len, applied, total
            );
            chunk_index += 1;
        }

        Ok(applied)
    }
}
