use std::fmt;
use std::io;

/// Closed set of failure kinds surfaced by the storage/buffer-pool/lock core.
///
/// Each variant is a distinct kind rather than a string, per the error
/// handling design: callers match on the kind instead of parsing messages.
#[derive(Debug)]
pub enum DbError {
    /// Page-id out of range for the backing file's current length.
    IllegalPage(String),
    /// A page's serialized bytes fail a structural check on decode.
    MalformedPage(String),
    /// `insert_tuple` found no free slot on the target page.
    PageFull,
    /// A delete's record-id does not name an occupied slot on that page.
    TupleNotOnPage(String),
    /// An inserted tuple's descriptor does not match the table's.
    SchemaMismatch(String),
    /// Eviction found no clean victim while the pool is at capacity.
    BufferFull,
    /// The calling transaction was aborted by deadlock detection.
    TransactionAborted,
    /// Underlying disk read/write failed.
    IoFailure(String),
    /// `next` was called on an iterator that `has_next` reported exhausted
    /// (or that was never opened).
    NoSuchElement,
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            DbError::IllegalPage(msg) => write!(f, "illegal page: {}", msg),
            DbError::MalformedPage(msg) => write!(f, "malformed page: {}", msg),
            DbError::PageFull => write!(f, "page full"),
            DbError::TupleNotOnPage(msg) => write!(f, "tuple not on page: {}", msg),
            DbError::SchemaMismatch(msg) => write!(f, "schema mismatch: {}", msg),
            DbError::BufferFull => write!(f, "buffer pool full, no clean victim to evict"),
            DbError::TransactionAborted => write!(f, "transaction aborted (deadlock detected)"),
            DbError::IoFailure(msg) => write!(f, "io failure: {}", msg),
            DbError::NoSuchElement => write!(f, "next called with no next element"),
        }
    }
}

impl std::error::Error for DbError {}

impl From<io::Error> for DbError {
    fn from(e: io::Error) -> Self {
        DbError::IoFailure(e.to_string())
    }
}

pub type DbResult<T> = Result<T, DbError>;
pub type VoidResult = Result<(), DbError>;
