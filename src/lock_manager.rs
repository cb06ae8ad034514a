use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::thread::sleep;
use std::time::Duration;

use log::debug;

use crate::error::{DbError, DbResult};
use crate::page_id::HeapPageID;
use crate::transaction::TransactionId;
use crate::wait_for_graph::WaitForGraph;

const RETRY_INTERVAL: Duration = Duration::from_millis(5);

/// The permission an operator asks the buffer pool for; determines which
/// lock mode is requested underneath.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Permission {
    ReadOnly,
    ReadWrite,
}

impl Permission {
    pub fn to_lock_mode(self) -> LockMode {
        match self {
            Permission::ReadOnly => LockMode::Shared,
            Permission::ReadWrite => LockMode::Exclusive,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockMode {
    Shared,
    Exclusive,
}

struct LockTable {
    shared: HashMap<HeapPageID, HashSet<TransactionId>>,
    exclusive: HashMap<HeapPageID, TransactionId>,
    shared_pages: HashMap<TransactionId, HashSet<HeapPageID>>,
    exclusive_pages: HashMap<TransactionId, HashSet<HeapPageID>>,
    waits_for: WaitForGraph,
}

impl LockTable {
    fn new() -> Self {
        LockTable {
            shared: HashMap::new(),
            exclusive: HashMap::new(),
            shared_pages: HashMap::new(),
            exclusive_pages: HashMap::new(),
            waits_for: WaitForGraph::new(),
        }
    }

    /// Non-blocking attempt. Returns true iff the lock was granted.
    fn try_acquire(&mut self, tid: TransactionId, pid: HeapPageID, mode: LockMode) -> bool {
        match mode {
            LockMode::Shared => {
                if let Some(&holder) = self.exclusive.get(&pid) {
                    if holder != tid {
                        return false;
                    }
                    // tid already holds exclusive; shared is implied, nothing to add.
                    return true;
                }
                self.shared.entry(pid).or_insert_with(HashSet::new).insert(tid);
                self.shared_pages.entry(tid).or_insert_with(HashSet::new).insert(pid);
                true
            }
            LockMode::Exclusive => {
                if let Some(&holder) = self.exclusive.get(&pid) {
                    return holder == tid;
                }
                if let Some(holders) = self.shared.get(&pid) {
                    let other_holders = holders.iter().any(|&h| h != tid);
                    if other_holders {
                        return false;
                    }
                }

                // either no shared holders, or tid is the sole shared holder: upgrade.
                if let Some(holders) = self.shared.remove(&pid) {
                    debug_assert!(holders.len() <= 1);
                    if let Some(pages) = self.shared_pages.get_mut(&tid) {
                        pages.remove(&pid);
                    }
                }
                self.exclusive.insert(pid, tid);
                self.exclusive_pages.entry(tid).or_insert_with(HashSet::new).insert(pid);
                true
            }
        }
    }

    fn holders_other_than(&self, pid: HeapPageID, tid: TransactionId) -> HashSet<TransactionId> {
        let mut holders = HashSet::new();
        if let Some(&h) = self.exclusive.get(&pid) {
            if h != tid {
                holders.insert(h);
            }
        }
        if let Some(s) = self.shared.get(&pid) {
            holders.extend(s.iter().copied().filter(|&h| h != tid));
        }
        holders
    }

    fn release(&mut self, tid: TransactionId, pid: HeapPageID) {
        if let Some(holders) = self.shared.get_mut(&pid) {
            holders.remove(&tid);
            if holders.is_empty() {
                self.shared.remove(&pid);
            }
        }
        if let Some(pages) = self.shared_pages.get_mut(&tid) {
            pages.remove(&pid);
        }

        if self.exclusive.get(&pid) == Some(&tid) {
            self.exclusive.remove(&pid);
        }
        if let Some(pages) = self.exclusive_pages.get_mut(&tid) {
            pages.remove(&pid);
        }
    }

    fn release_all(&mut self, tid: TransactionId) {
        if let Some(pages) = self.shared_pages.remove(&tid) {
            for pid in pages {
                if let Some(holders) = self.shared.get_mut(&pid) {
                    holders.remove(&tid);
                    if holders.is_empty() {
                        self.shared.remove(&pid);
                    }
                }
            }
        }
        if let Some(pages) = self.exclusive_pages.remove(&tid) {
            for pid in pages {
                if self.exclusive.get(&pid) == Some(&tid) {
                    self.exclusive.remove(&pid);
                }
            }
        }
        self.waits_for.remove_transaction(tid);
    }

    fn holds(&self, tid: TransactionId, pid: HeapPageID) -> bool {
        self.exclusive.get(&pid) == Some(&tid)
            || self.shared.get(&pid).map_or(false, |s| s.contains(&tid))
    }

    fn exclusive_pages_of(&self, tid: TransactionId) -> HashSet<HeapPageID> {
        self.exclusive_pages.get(&tid).cloned().unwrap_or_default()
    }
}

/// Per-page shared/exclusive lock manager with upgrade support and
/// deadlock detection via a waits-for graph. All state mutation happens
/// under a single coarse lock so that acquisition decisions are atomic.
pub struct LockManager {
    table: Mutex<LockTable>,
}

impl LockManager {
    pub fn new() -> Self {
        LockManager {
            table: Mutex::new(LockTable::new()),
        }
    }

    /// Blocking acquire: retries until granted or a waits-for cycle
    /// including `tid` is detected, in which case `tid` aborts.
    pub fn acquire(&self, tid: TransactionId, pid: HeapPageID, mode: LockMode) -> DbResult<()> {
        loop {
            {
                let mut table = self.table.lock().unwrap();
                if table.try_acquire(tid, pid, mode) {
                    table.waits_for.clear_waiting(tid);
                    return Ok(());
                }

                let holders = table.holders_other_than(pid, tid);
                table.waits_for.set_waiting_on(tid, holders);
                if table.waits_for.has_cycle_through(tid) {
                    debug!("deadlock detected, aborting tx_{} on {:?}", tid, pid);
                    table.waits_for.clear_waiting(tid);
                    return Err(DbError::TransactionAborted);
                }
            }
            sleep(RETRY_INTERVAL);
        }
    }

    /// Documented unsafe: releases a single lock ahead of
    /// `transaction_complete`. Never used by the core pipeline itself.
    pub fn release(&self, tid: TransactionId, pid: HeapPageID) {
        self.table.lock().unwrap().release(tid, pid);
    }

    pub fn release_all(&self, tid: TransactionId) {
        self.table.lock().unwrap().release_all(tid);
    }

    pub fn holds(&self, tid: TransactionId, pid: HeapPageID) -> bool {
        self.table.lock().unwrap().holds(tid, pid)
    }

    pub fn exclusive_pages_of(&self, tid: TransactionId) -> HashSet<HeapPageID> {
        self.table.lock().unwrap().exclusive_pages_of(tid)
    }
}

impl Default for LockManager {
    fn default() -> Self {
        LockManager::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn pid(i: usize) -> HeapPageID {
        HeapPageID::new(0, i)
    }

    #[test]
    fn shared_locks_are_concurrent() {
        let lm = LockManager::new();
        lm.acquire(1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(2, pid(0), LockMode::Shared).unwrap();
        assert!(lm.holds(1, pid(0)));
        assert!(lm.holds(2, pid(0)));
    }

    #[test]
    fn exclusive_excludes_other_shared() {
        let lm = Arc::new(LockManager::new());
        lm.acquire(1, pid(0), LockMode::Exclusive).unwrap();

        let lm2 = Arc::clone(&lm);
        let t = thread::spawn(move || {
            // tx 2 would block forever on tx 1's exclusive lock; release it
            // first from this thread so the join below terminates.
            thread::sleep(Duration::from_millis(20));
            lm2.release_all(1);
        });
        lm.acquire(2, pid(0), LockMode::Shared).unwrap();
        t.join().unwrap();
        assert!(lm.holds(2, pid(0)));
    }

    #[test]
    fn sole_shared_holder_upgrades_without_blocking() {
        let lm = LockManager::new();
        lm.acquire(1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(1, pid(0), LockMode::Exclusive).unwrap();
        assert!(lm.holds(1, pid(0)));
        assert_eq!(lm.exclusive_pages_of(1).len(), 1);
    }

    #[test]
    fn release_all_frees_every_page() {
        let lm = LockManager::new();
        lm.acquire(1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(1, pid(1), LockMode::Exclusive).unwrap();
        lm.release_all(1);
        assert!(!lm.holds(1, pid(0)));
        assert!(!lm.holds(1, pid(1)));
    }

    #[test]
    fn two_transaction_deadlock_aborts_exactly_one() {
        let lm = Arc::new(LockManager::new());
        lm.acquire(1, pid(0), LockMode::Shared).unwrap();
        lm.acquire(2, pid(1), LockMode::Shared).unwrap();

        let lm2 = Arc::clone(&lm);
        let h = thread::spawn(move || lm2.acquire(2, pid(0), LockMode::Exclusive));

        // give tx2 a moment to register as waiting on pid(0) before tx1 asks for pid(1).
        thread::sleep(Duration::from_millis(20));
        let r1 = lm.acquire(1, pid(1), LockMode::Exclusive);
        let r2 = h.join().unwrap();

        let aborted = [&r1, &r2].iter().filter(|r| r.is_err()).count();
        assert_eq!(aborted, 1, "exactly one of the two transactions should abort");
    }
}
