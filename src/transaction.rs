use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::database::Database;
use crate::error::VoidResult;

/// Opaque transaction identifier. Locks and before-images are indexed by
/// this id; it carries no other state of its own.
pub type TransactionId = u64;

static NEXT_TRANSACTION_ID: AtomicU64 = AtomicU64::new(1);

/// A handle to an in-flight transaction. Strictly two-phase: locks acquired
/// through the buffer pool on behalf of this id are held until `commit` or
/// `abort` is called (or a lock is released early via the buffer pool's
/// unsafe `release_page`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Transaction {
    id: TransactionId,
}

impl Transaction {
    /// Allocate a fresh transaction id. Does not itself take any locks.
    pub fn new() -> Self {
        Transaction {
            id: NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Flush this transaction's dirty pages to disk and release its locks.
    pub fn commit(&self) -> VoidResult {
        Database::global().buffer_pool().transaction_complete(self.id, true)
    }

    /// Roll back this transaction's dirty pages to their before-images and
    /// release its locks.
    pub fn abort(&self) -> VoidResult {
        Database::global().buffer_pool().transaction_complete(self.id, false)
    }
}

impl Default for Transaction {
    fn default() -> Self {
        Transaction::new()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}
