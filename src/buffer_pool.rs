use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use log::{debug, warn};

use crate::database::Database;
use crate::error::{DbError, DbResult, VoidResult};
use crate::lock_manager::{LockManager, Permission};
use crate::page::HeapPage;
use crate::page_id::HeapPageID;
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple};

struct PoolState {
    cache: HashMap<HeapPageID, Arc<RwLock<HeapPage>>>,
}

/// Bounded cache of pages backed by disk, with a no-steal eviction policy:
/// a dirty page is never written out except by an explicit flush or by a
/// transaction committing, so an evicted page is always clean and its
/// on-disk copy is already current.
///
/// Locking is layered underneath page access: `get_page` acquires the
/// appropriate shared/exclusive lock through the embedded `LockManager`
/// before returning the cached (or freshly loaded) page.
pub struct BufferPool {
    capacity: usize,
    state: Mutex<PoolState>,
    locks: LockManager,
}

impl BufferPool {
    pub fn new(capacity: usize) -> Self {
        BufferPool {
            capacity,
            state: Mutex::new(PoolState {
                cache: HashMap::new(),
            }),
            locks: LockManager::new(),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Acquire the appropriate lock for `perm` and return the cached page,
    /// loading it from its heap file on a cache miss, evicting a clean
    /// victim first if the pool is already at capacity.
    pub fn get_page(
        &self,
        tid: TransactionId,
        pid: HeapPageID,
        perm: Permission,
    ) -> DbResult<Arc<RwLock<HeapPage>>> {
        self.locks.acquire(tid, pid, perm.to_lock_mode())?;

        {
            let state = self.state.lock().unwrap();
            if let Some(page) = state.cache.get(&pid) {
                return Ok(page.clone());
            }
        }

        let file = Database::global()
            .catalog()
            .table(pid.table_id)
            .ok_or_else(|| DbError::IllegalPage(format!("no table registered for {}", pid)))?;
        let mut page = file.read_page(pid)?;
        page.set_before_image();

        let mut state = self.state.lock().unwrap();
        if let Some(existing) = state.cache.get(&pid) {
            return Ok(existing.clone());
        }
        if state.cache.len() >= self.capacity {
            self.evict_one(&mut state)?;
        }
        let entry = Arc::new(RwLock::new(page));
        state.cache.insert(pid, entry.clone());
        Ok(entry)
    }

    /// Evict the first clean page found. No-steal: a dirty page is never
    /// chosen, since doing so would write uncommitted data to disk.
    fn evict_one(&self, state: &mut PoolState) -> VoidResult {
        let victim = state
            .cache
            .iter()
            .find(|(_, page)| page.read().unwrap().is_dirty().is_none())
            .map(|(&pid, _)| pid);
        match victim {
            Some(pid) => {
                debug!("evicting clean page {}", pid);
                state.cache.remove(&pid);
                Ok(())
            }
            None => Err(DbError::BufferFull),
        }
    }

    /// Operator-facing entry point: resolve `table_id` through the catalog
    /// and delegate to its heap file, which acquires page locks and marks
    /// the landing page dirty through this same pool.
    pub fn insert_tuple(&self, tid: TransactionId, table_id: i32, tuple: Tuple) -> DbResult<RecordId> {
        let file = Database::global()
            .catalog()
            .table(table_id)
            .ok_or_else(|| DbError::IllegalPage(format!("no table registered for id {}", table_id)))?;
        file.insert_tuple(tid, tuple)
    }

    /// Operator-facing entry point: resolve the tuple's table through the
    /// catalog and delegate to its heap file.
    pub fn delete_tuple(&self, tid: TransactionId, rid: RecordId) -> VoidResult {
        let file = Database::global()
            .catalog()
            .table(rid.page_id.table_id)
            .ok_or_else(|| DbError::IllegalPage(format!("no table registered for {}", rid.page_id)))?;
        file.delete_tuple(tid, rid)
    }

    /// Release a single page's lock ahead of transaction end. Breaks strict
    /// two-phase locking and is only safe for read-only operators that are
    /// certain they will not revisit the page; not used by `insert_tuple`/
    /// `delete_tuple`/iteration in this crate.
    pub fn release_page(&self, tid: TransactionId, pid: HeapPageID) {
        self.locks.release(tid, pid);
    }

    /// True iff `tid` currently holds any lock (shared or exclusive) on
    /// `pid`.
    pub fn holds_lock(&self, tid: TransactionId, pid: HeapPageID) -> bool {
        self.locks.holds(tid, pid)
    }

    /// Write a single page to its backing file, regardless of dirty state.
    pub fn flush_page(&self, pid: HeapPageID) -> VoidResult {
        let entry = {
            let state = self.state.lock().unwrap();
            state.cache.get(&pid).cloned()
        };
        let entry = match entry {
            Some(e) => e,
            None => return Ok(()),
        };
        let mut page = entry.write().unwrap();
        let file = Database::global()
            .catalog()
            .table(pid.table_id)
            .ok_or_else(|| DbError::IllegalPage(format!("no table registered for {}", pid)))?;
        file.write_page(&page)?;
        page.mark_dirty(None);
        page.set_before_image();
        Ok(())
    }

    /// Write every page this transaction holds an exclusive lock on (its
    /// dirtied pages) to disk.
    fn flush_pages(&self, tid: TransactionId) -> VoidResult {
        for pid in self.locks.exclusive_pages_of(tid) {
            self.flush_page(pid)?;
        }
        Ok(())
    }

    /// Discard a page from the cache without writing it back.
    pub fn discard_page(&self, pid: HeapPageID) {
        self.state.lock().unwrap().cache.remove(&pid);
    }

    /// Roll every page this transaction dirtied back to its before-image,
    /// discarding the in-cache copy so the next reader reloads the
    /// on-disk (unmodified) version.
    fn rollback_pages(&self, tid: TransactionId) -> VoidResult {
        for pid in self.locks.exclusive_pages_of(tid) {
            let entry = {
                let state = self.state.lock().unwrap();
                state.cache.get(&pid).cloned()
            };
            if let Some(entry) = entry {
                let mut page = entry.write().unwrap();
                if page.is_dirty() == Some(tid) {
                    let before = page.get_before_image()?;
                    *page = before;
                    warn!("rolled back page {} for aborted tx_{}", pid, tid);
                }
            }
        }
        Ok(())
    }

    /// End a transaction: on commit, flush its dirtied pages and reset
    /// their before-images; on abort, roll them back to their
    /// before-images. Either way, release every lock it holds.
    pub fn transaction_complete(&self, tid: TransactionId, commit: bool) -> VoidResult {
        let result = if commit {
            self.flush_pages(tid)
        } else {
            self.rollback_pages(tid)
        };
        self.locks.release_all(tid);
        result
    }

    /// Flush every page currently cached, dirty or not. Intended for
    /// shutdown/checkpoint paths, not the per-transaction commit path.
    pub fn flush_all_pages(&self) -> VoidResult {
        let pids: Vec<HeapPageID> = self.state.lock().unwrap().cache.keys().copied().collect();
        for pid in pids {
            self.flush_page(pid)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::Database;
    use crate::field::Field;
    use crate::tuple::{simple_int_tuple_desc, Tuple};
    use once_cell::sync::Lazy;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex as StdMutex;

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    /// `Database::global()` is a single process-wide instance and
    /// `reset_buffer_pool` replaces it outright, so these tests cannot run
    /// concurrently with each other within this test binary.
    static SERIAL: Lazy<StdMutex<()>> = Lazy::new(|| StdMutex::new(()));

    fn temp_path(name: &str) -> std::path::PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("pagedb-bp-test-{}-{}-{}.db", std::process::id(), n, name))
    }

    #[test]
    fn insert_then_read_back_through_buffer_pool() {
        let _guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
        let path = temp_path("a");
        let desc = simple_int_tuple_desc(2, "f");
        let db = Database::global();
        let bp = db.reset_buffer_pool(10);
        let file = db.catalog().add_table(&path, "t", desc.clone()).unwrap();

        let tid = 100;
        let pid = file.add_empty_page().unwrap();
        let page_ref = bp.get_page(tid, pid, Permission::ReadWrite).unwrap();
        {
            let mut page = page_ref.write().unwrap();
            let mut tuple = Tuple::new(desc, vec![Field::Int(1), Field::Int(2)]).unwrap();
            page.insert_tuple(&mut tuple).unwrap();
            page.mark_dirty(Some(tid));
        }
        bp.transaction_complete(tid, true).unwrap();

        bp.discard_page(pid);
        let reloaded = bp.get_page(200, pid, Permission::ReadOnly).unwrap();
        assert_eq!(reloaded.read().unwrap().num_empty_slots(), reloaded.read().unwrap().num_slots() - 1);
        bp.transaction_complete(200, true).unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn abort_restores_before_image() {
        let _guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
        let path = temp_path("b");
        let desc = simple_int_tuple_desc(2, "f");
        let db = Database::global();
        let bp = db.reset_buffer_pool(10);
        let file = db.catalog().add_table(&path, "t2", desc.clone()).unwrap();

        let tid = 101;
        let pid = file.add_empty_page().unwrap();
        let page_ref = bp.get_page(tid, pid, Permission::ReadWrite).unwrap();
        {
            let mut page = page_ref.write().unwrap();
            let mut tuple = Tuple::new(desc, vec![Field::Int(9), Field::Int(9)]).unwrap();
            page.insert_tuple(&mut tuple).unwrap();
            page.mark_dirty(Some(tid));
        }
        bp.transaction_complete(tid, false).unwrap();

        let reloaded = bp.get_page(202, pid, Permission::ReadOnly).unwrap();
        assert_eq!(reloaded.read().unwrap().num_empty_slots(), reloaded.read().unwrap().num_slots());
        bp.transaction_complete(202, true).unwrap();
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn eviction_fails_when_every_page_is_dirty() {
        let _guard = SERIAL.lock().unwrap_or_else(|p| p.into_inner());
        let desc = simple_int_tuple_desc(2, "f");
        let db = Database::global();
        let bp = db.reset_buffer_pool(1);
        let path_a = temp_path("c1");
        let path_b = temp_path("c2");
        let file_a = db.catalog().add_table(&path_a, "ta", desc.clone()).unwrap();
        let file_b = db.catalog().add_table(&path_b, "tb", desc).unwrap();

        let tid = 300;
        let pid_a = file_a.add_empty_page().unwrap();
        let page_a = bp.get_page(tid, pid_a, Permission::ReadWrite).unwrap();
        page_a.write().unwrap().mark_dirty(Some(tid));

        let pid_b = file_b.add_empty_page().unwrap();
        let err = bp.get_page(tid, pid_b, Permission::ReadWrite).unwrap_err();
        assert!(matches!(err, DbError::BufferFull));

        bp.transaction_complete(tid, false).unwrap();
        let _ = std::fs::remove_file(&path_a);
        let _ = std::fs::remove_file(&path_b);
    }
}
