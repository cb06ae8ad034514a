use std::sync::{Arc, RwLock};

use once_cell::sync::OnceCell;

use crate::buffer_pool::BufferPool;
use crate::catalog::Catalog;
use crate::config::DEFAULT_BUFFER_POOL_PAGES;

static DB: OnceCell<Database> = OnceCell::new();

/// Process-wide handle to the catalog and buffer pool, mirroring the
/// teaching system's single global `Database` that every operator reaches
/// through rather than threading a connection object everywhere.
pub struct Database {
    catalog: Catalog,
    buffer_pool: RwLock<Arc<BufferPool>>,
}

impl Database {
    fn new() -> Self {
        Database {
            catalog: Catalog::new(),
            buffer_pool: RwLock::new(Arc::new(BufferPool::new(DEFAULT_BUFFER_POOL_PAGES))),
        }
    }

    pub fn global() -> &'static Database {
        DB.get_or_init(Database::new)
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn buffer_pool(&self) -> Arc<BufferPool> {
        self.buffer_pool.read().unwrap().clone()
    }

    /// Swap in a fresh, empty buffer pool of the given capacity, discarding
    /// whatever is currently cached. Test-only: lets a single process
    /// exercise small-capacity eviction scenarios without restarting.
    pub fn reset_buffer_pool(&self, capacity: usize) -> Arc<BufferPool> {
        let fresh = Arc::new(BufferPool::new(capacity));
        *self.buffer_pool.write().unwrap() = fresh.clone();
        fresh
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_returns_the_same_instance() {
        let a = Database::global() as *const Database;
        let b = Database::global() as *const Database;
        assert_eq!(a, b);
    }

    #[test]
    fn reset_buffer_pool_changes_capacity() {
        // asserts only on the handle this call just returned, not on
        // `db.buffer_pool()`, which other tests in this binary may have
        // since swapped again.
        let db = Database::global();
        let bp = db.reset_buffer_pool(3);
        assert_eq!(bp.capacity(), 3);
    }
}
