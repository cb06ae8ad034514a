//! Paged heap-file storage, a bounded buffer pool, and a strict two-phase
//! lock manager for a small relational database engine.

pub mod buffer_pool;
pub mod catalog;
pub mod config;
pub mod database;
pub mod error;
pub mod field;
pub mod file;
mod lock_manager;
pub mod page;
pub mod page_id;
pub mod transaction;
pub mod tuple;
mod wait_for_graph;

pub use error::{DbError, DbResult, VoidResult};
pub use lock_manager::{LockMode, Permission};

/// Initialize `env_logger` from `RUST_LOG`, once per process. Call at the
/// top of a binary or test harness; safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(cfg!(test)).try_init();
}
