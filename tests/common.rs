use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use once_cell::sync::Lazy;
use pagedb::database::Database;
use pagedb::field::Field;
use pagedb::tuple::{simple_int_tuple_desc, Tuple, TupleDesc};

static COUNTER: AtomicU64 = AtomicU64::new(0);

/// `Database::global()` is one process-wide singleton and `reset_buffer_pool`
/// swaps it out entirely, so tests in the same binary cannot run
/// concurrently against it. Acquire this for the duration of any test that
/// touches the global buffer pool; cargo runs each test file as its own
/// process, so this only needs to serialize within one file.
static SERIAL: Lazy<Mutex<()>> = Lazy::new(|| Mutex::new(()));

pub fn serialize() -> MutexGuard<'static, ()> {
    SERIAL.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A fresh, never-before-used on-disk path under the system temp dir. Each
/// test gets its own file rather than sharing one, so tests can run
/// concurrently without stepping on each other's pages.
pub fn temp_db_path(tag: &str) -> PathBuf {
    let n = COUNTER.fetch_add(1, Ordering::Relaxed);
    std::env::temp_dir().join(format!("pagedb-test-{}-{}-{}.db", std::process::id(), n, tag))
}

/// Reset the global buffer pool to `capacity` pages and register a fresh
/// table with `columns` int fields, backed by a brand new temp file.
///
/// `Database::global()` is one process-wide instance, so tests in the same
/// binary that call this race on the buffer pool's capacity if run
/// concurrently; run this file's tests with `--test-threads=1` if that
/// matters for a given assertion.
pub fn setup_table(tag: &str, columns: usize, capacity: usize) -> (Arc<pagedb::file::HeapFile>, Arc<TupleDesc>) {
    pagedb::init_logging();
    let path = temp_db_path(tag);
    let db = Database::global();
    db.reset_buffer_pool(capacity);
    let desc = simple_int_tuple_desc(columns, "f");
    let file = db.catalog().add_table(&path, tag, desc.clone()).unwrap();
    (file, desc)
}

pub fn int_tuple(desc: &Arc<TupleDesc>, values: &[i32]) -> Tuple {
    let fields = values.iter().map(|&v| Field::Int(v)).collect();
    Tuple::new(desc.clone(), fields).unwrap()
}

/// Drive a `HeapFileIter` to completion through its documented
/// `open`/`has_next`/`next` contract, collecting every tuple it yields.
pub fn scan_all(file: &pagedb::file::HeapFile, tid: u64) -> Vec<Tuple> {
    let mut iter = file.iterator(tid);
    iter.open().unwrap();
    let mut out = Vec::new();
    while iter.has_next().unwrap() {
        out.push(iter.next().unwrap());
    }
    iter.close();
    out
}
