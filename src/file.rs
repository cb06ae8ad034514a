use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use crate::config::page_size;
use crate::database::Database;
use crate::error::{DbError, DbResult, VoidResult};
use crate::lock_manager::Permission;
use crate::page::HeapPage;
use crate::page_id::HeapPageID;
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};

/// A table's on-disk representation: a flat sequence of fixed-size pages in
/// one file. All page access goes through the buffer pool; `HeapFile` itself
/// only knows how to read/write whole pages at a byte offset and how to grow
/// the file by one page.
pub struct HeapFile {
    path: PathBuf,
    table_id: i32,
    desc: Arc<TupleDesc>,
    io: Mutex<File>,
}

impl HeapFile {
    pub fn new(path: impl AsRef<Path>, table_id: i32, desc: Arc<TupleDesc>) -> DbResult<HeapFile> {
        let path = path.as_ref().to_path_buf();
        let io = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;
        Ok(HeapFile {
            path,
            table_id,
            desc,
            io: Mutex::new(io),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn table_id(&self) -> i32 {
        self.table_id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn num_pages(&self) -> DbResult<usize> {
        let io = self.io.lock().unwrap();
        let len = io.metadata()?.len() as usize;
        Ok(len / page_size())
    }

    /// Read a single page's bytes from disk and decode them. Page `k` is
    /// always at byte offset `k * page_size()` regardless of how few bytes
    /// its header and slot array actually occupy (spec.md §6).
    pub fn read_page(&self, id: HeapPageID) -> DbResult<HeapPage> {
        let width = page_size();
        let mut io = self.io.lock().unwrap();
        let offset = (id.page_index * width) as u64;
        let len = io.metadata()?.len();
        if offset + width as u64 > len {
            return Err(DbError::IllegalPage(format!(
                "page {} beyond current file length",
                id
            )));
        }
        io.seek(SeekFrom::Start(offset))?;
        let mut buf = vec![0u8; width];
        io.read_exact(&mut buf)?;
        HeapPage::from_bytes(id, self.desc.clone(), &buf)
    }

    /// Overwrite a single page's bytes on disk, growing the file if needed.
    pub fn write_page(&self, page: &HeapPage) -> VoidResult {
        let width = page_size();
        let mut io = self.io.lock().unwrap();
        let offset = (page.id().page_index * width) as u64;
        io.seek(SeekFrom::Start(offset))?;
        io.write_all(&page.to_bytes())?;
        io.flush()?;
        Ok(())
    }

    /// Append one freshly allocated empty page and return its id.
    pub fn add_empty_page(&self) -> DbResult<HeapPageID> {
        let width = page_size();
        let mut io = self.io.lock().unwrap();
        let len = io.metadata()?.len();
        let page_index = (len as usize) / width;
        let id = HeapPageID::new(self.table_id, page_index);
        io.seek(SeekFrom::Start(len))?;
        io.write_all(&HeapPage::create_empty(id, self.desc.clone()).to_bytes())?;
        io.flush()?;
        Ok(id)
    }

    /// Insert into the first page with a free slot, allocating a new page
    /// if every existing page is full.
    ///
    /// Each existing page is first fetched READ-ONLY just to check
    /// `num_empty_slots`; a full page is left at that permission so other
    /// readers aren't blocked by a scan that will never touch it, and only
    /// a page with room is escalated to READ-WRITE. Strict 2PL means the
    /// read lock on every page visited, not just the one written, is held
    /// until `tid` commits or aborts.
    pub fn insert_tuple(&self, tid: TransactionId, mut tuple: Tuple) -> DbResult<RecordId> {
        let num_pages = self.num_pages()?;
        let bp = Database::global().buffer_pool();

        for page_index in 0..num_pages {
            let pid = HeapPageID::new(self.table_id, page_index);
            let has_room = {
                let page_ref = bp.get_page(tid, pid, Permission::ReadOnly)?;
                page_ref.read().unwrap().num_empty_slots() > 0
            };
            if !has_room {
                continue;
            }
            let page_ref = bp.get_page(tid, pid, Permission::ReadWrite)?;
            let mut page = page_ref.write().unwrap();
            if page.num_empty_slots() > 0 {
                let rid = page.insert_tuple(&mut tuple)?;
                page.mark_dirty(Some(tid));
                return Ok(rid);
            }
            // lost the race to another writer between the read-only check
            // and the upgrade; move on to the next page.
        }

        let new_id = self.add_empty_page()?;
        let page_ref = bp.get_page(tid, new_id, Permission::ReadWrite)?;
        let mut page = page_ref.write().unwrap();
        let rid = page.insert_tuple(&mut tuple)?;
        page.mark_dirty(Some(tid));
        Ok(rid)
    }

    pub fn delete_tuple(&self, tid: TransactionId, rid: RecordId) -> VoidResult {
        let bp = Database::global().buffer_pool();
        let page_ref = bp.get_page(tid, rid.page_id, Permission::ReadWrite)?;
        let mut page = page_ref.write().unwrap();
        page.delete_tuple(rid)?;
        page.mark_dirty(Some(tid));
        Ok(())
    }

    /// A restartable, incremental iterator over every tuple `tid` can see,
    /// in ascending page-then-slot order. Must be `open()`ed before the
    /// first `has_next`/`next` call.
    pub fn iterator(&self, tid: TransactionId) -> HeapFileIter<'_> {
        HeapFileIter::new(self, tid)
    }
}

/// Pulls tuples from a `HeapFile` one page at a time, acquiring each page's
/// shared lock only when the scan actually reaches it rather than up front
/// — a transaction that abandons the scan early never locks pages it never
/// read. Mirrors spec.md §6's `open`/`close`/`has_next`/`next`/`rewind`
/// iterator interface.
pub struct HeapFileIter<'a> {
    file: &'a HeapFile,
    tid: TransactionId,
    opened: bool,
    next_page_index: usize,
    num_pages: usize,
    buffered: std::vec::IntoIter<Tuple>,
}

impl<'a> HeapFileIter<'a> {
    fn new(file: &'a HeapFile, tid: TransactionId) -> Self {
        HeapFileIter {
            file,
            tid,
            opened: false,
            next_page_index: 0,
            num_pages: 0,
            buffered: Vec::new().into_iter(),
        }
    }

    /// Reset the scan to the first page and mark it open. Does not itself
    /// acquire any lock; the first page is fetched lazily by `has_next`.
    pub fn open(&mut self) -> DbResult<()> {
        self.num_pages = self.file.num_pages()?;
        self.next_page_index = 0;
        self.buffered = Vec::new().into_iter();
        self.opened = true;
        Ok(())
    }

    /// Re-scan from the first page under the same transaction. Equivalent
    /// to `open` again.
    pub fn rewind(&mut self) -> DbResult<()> {
        self.open()
    }

    /// Drop the buffered page; locks already acquired through the buffer
    /// pool for `tid` are unaffected (strict 2PL releases them only at
    /// `transaction_complete`).
    pub fn close(&mut self) {
        self.opened = false;
        self.buffered = Vec::new().into_iter();
    }

    /// True iff another tuple is available, fetching and buffering the
    /// next page (under a READ-ONLY lock for `tid`) if the current page's
    /// tuples are exhausted.
    pub fn has_next(&mut self) -> DbResult<bool> {
        if !self.opened {
            return Ok(false);
        }
        while self.buffered.as_slice().is_empty() {
            if self.next_page_index >= self.num_pages {
                return Ok(false);
            }
            let pid = HeapPageID::new(self.file.table_id, self.next_page_index);
            let bp = Database::global().buffer_pool();
            let page_ref = bp.get_page(self.tid, pid, Permission::ReadOnly)?;
            let tuples = page_ref.read().unwrap().iterate()?;
            self.buffered = tuples.into_iter();
            self.next_page_index += 1;
        }
        Ok(true)
    }

    /// The next tuple in page-then-slot order. Fails with `NoSuchElement`
    /// if `has_next` would report `false`.
    pub fn next(&mut self) -> DbResult<Tuple> {
        if !self.has_next()? {
            return Err(DbError::NoSuchElement);
        }
        Ok(self.buffered.next().expect("has_next just confirmed a buffered tuple"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Field;
    use crate::tuple::simple_int_tuple_desc;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicU64, Ordering};

    static COUNTER: AtomicU64 = AtomicU64::new(0);

    fn temp_path(name: &str) -> PathBuf {
        let n = COUNTER.fetch_add(1, Ordering::Relaxed);
        std::env::temp_dir().join(format!("pagedb-test-{}-{}-{}.db", std::process::id(), n, name))
    }

    #[test]
    fn new_file_has_zero_pages() {
        let path = temp_path("empty");
        let desc = simple_int_tuple_desc(2, "f");
        let file = HeapFile::new(&path, 1, desc).unwrap();
        assert_eq!(file.num_pages().unwrap(), 0);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn write_then_read_page_round_trips() {
        let path = temp_path("rw");
        let desc = simple_int_tuple_desc(2, "f");
        let file = HeapFile::new(&path, 1, desc.clone()).unwrap();
        let id = file.add_empty_page().unwrap();
        let mut page = file.read_page(id).unwrap();
        let mut tuple = Tuple::new(desc, vec![Field::Int(7), Field::Int(8)]).unwrap();
        page.insert_tuple(&mut tuple).unwrap();
        file.write_page(&page).unwrap();

        let back = file.read_page(id).unwrap();
        assert_eq!(back.num_empty_slots(), back.num_slots() - 1);
        let _ = std::fs::remove_file(&path);
    }
}
