use std::sync::Arc;

use crate::config::page_size;
use crate::error::{DbError, DbResult};
use crate::page_id::HeapPageID;
use crate::transaction::TransactionId;
use crate::tuple::{RecordId, Tuple, TupleDesc};

/// Number of tuple slots a page of `page_size` bytes holds for tuples of
/// `tuple_width` bytes: each slot costs `tuple_width` bytes plus one header
/// bit, so `slots` is the largest value with
/// `slots * tuple_width + ceil(slots / 8) <= page_size`.
pub fn slots_per_page(tuple_width: usize) -> usize {
    (page_size() * 8) / (tuple_width * 8 + 1)
}

fn header_bytes(num_slots: usize) -> usize {
    (num_slots + 7) / 8
}

/// A single page of a heap file: a bitmap header (one bit per slot, occupied
/// iff set, least-significant bit of each byte first) followed by a
/// fixed-width slot array, stored and passed around as raw bytes so that
/// `to_bytes`/`from_bytes` round-trip exactly regardless of schema.
#[derive(Debug, Clone)]
pub struct HeapPage {
    id: HeapPageID,
    desc: Arc<TupleDesc>,
    num_slots: usize,
    header: Vec<u8>,
    slots: Vec<u8>,
    dirty_by: Option<TransactionId>,
    before_image: Vec<u8>,
}

impl HeapPage {
    /// A freshly allocated page: every slot empty.
    pub fn create_empty(id: HeapPageID, desc: Arc<TupleDesc>) -> HeapPage {
        let num_slots = slots_per_page(desc.width());
        let header = vec![0u8; header_bytes(num_slots)];
        let slots = vec![0u8; num_slots * desc.width()];
        let mut page = HeapPage {
            id,
            desc,
            num_slots,
            header,
            slots,
            dirty_by: None,
            before_image: Vec::new(),
        };
        page.before_image = page.to_bytes();
        page
    }

    /// Decode a page previously produced by `to_bytes`: exactly `page_size()`
    /// bytes, header followed by slots followed by reserved zero padding.
    pub fn from_bytes(id: HeapPageID, desc: Arc<TupleDesc>, bytes: &[u8]) -> DbResult<HeapPage> {
        let expected_len = page_size();
        if bytes.len() != expected_len {
            return Err(DbError::MalformedPage(format!(
                "page {} is {} bytes, expected {}",
                id,
                bytes.len(),
                expected_len
            )));
        }
        let num_slots = slots_per_page(desc.width());
        let hdr_len = header_bytes(num_slots);
        let slots_len = num_slots * desc.width();
        if hdr_len + slots_len > expected_len {
            return Err(DbError::MalformedPage(format!(
                "page {} layout ({} header + {} slots) exceeds page size {}",
                id, hdr_len, slots_len, expected_len
            )));
        }
        let header = bytes[..hdr_len].to_vec();
        let slots = bytes[hdr_len..hdr_len + slots_len].to_vec();
        let before_image = bytes.to_vec();
        Ok(HeapPage {
            id,
            desc,
            num_slots,
            header,
            slots,
            dirty_by: None,
            before_image,
        })
    }

    /// Serialize header followed by slots followed by zero padding out to
    /// `page_size()` bytes, byte-for-byte what `from_bytes` expects back.
    /// The reserved trailing bytes keep every page exactly one `page_size()`
    /// stride wide on disk regardless of how few bytes the header and slot
    /// array actually need.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(page_size());
        buf.extend_from_slice(&self.header);
        buf.extend_from_slice(&self.slots);
        buf.resize(page_size(), 0);
        buf
    }

    pub fn id(&self) -> HeapPageID {
        self.id
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    fn is_slot_used(&self, slot: usize) -> bool {
        let byte = self.header[slot / 8];
        (byte & (1 << (slot % 8))) != 0
    }

    fn set_slot_used(&mut self, slot: usize, used: bool) {
        let mask = 1 << (slot % 8);
        if used {
            self.header[slot / 8] |= mask;
        } else {
            self.header[slot / 8] &= !mask;
        }
    }

    pub fn num_slots(&self) -> usize {
        self.num_slots
    }

    pub fn num_empty_slots(&self) -> usize {
        (0..self.num_slots).filter(|&s| !self.is_slot_used(s)).count()
    }

    fn slot_bytes(&self, slot: usize) -> &[u8] {
        let w = self.desc.width();
        &self.slots[slot * w..(slot + 1) * w]
    }

    fn set_slot_bytes(&mut self, slot: usize, bytes: &[u8]) {
        let w = self.desc.width();
        self.slots[slot * w..(slot + 1) * w].copy_from_slice(bytes);
    }

    /// All occupied tuples on this page, each tagged with its record id.
    pub fn iterate(&self) -> DbResult<Vec<Tuple>> {
        let mut out = Vec::new();
        for slot in 0..self.num_slots {
            if self.is_slot_used(slot) {
                let mut tuple = Tuple::deserialize(self.desc.clone(), self.slot_bytes(slot))?;
                tuple.set_record_id(Some(RecordId::new(self.id, slot)));
                out.push(tuple);
            }
        }
        Ok(out)
    }

    /// Insert into the first empty slot. Returns the tuple's new record id.
    pub fn insert_tuple(&mut self, tuple: &mut Tuple) -> DbResult<RecordId> {
        if tuple.desc() != &self.desc {
            return Err(DbError::SchemaMismatch(format!(
                "tuple descriptor does not match page {}'s table descriptor",
                self.id
            )));
        }
        let slot = (0..self.num_slots)
            .find(|&s| !self.is_slot_used(s))
            .ok_or(DbError::PageFull)?;
        let bytes = tuple.serialize()?;
        self.set_slot_bytes(slot, &bytes);
        self.set_slot_used(slot, true);
        let rid = RecordId::new(self.id, slot);
        tuple.set_record_id(Some(rid));
        Ok(rid)
    }

    /// Clear the slot named by `rid`. Errors if that slot is not occupied.
    pub fn delete_tuple(&mut self, rid: RecordId) -> DbResult<()> {
        if rid.page_id != self.id {
            return Err(DbError::TupleNotOnPage(format!(
                "record id names page {}, this page is {}",
                rid.page_id, self.id
            )));
        }
        if rid.slot >= self.num_slots || !self.is_slot_used(rid.slot) {
            return Err(DbError::TupleNotOnPage(format!(
                "slot {} is not occupied on page {}",
                rid.slot, self.id
            )));
        }
        self.set_slot_used(rid.slot, false);
        Ok(())
    }

    pub fn is_dirty(&self) -> Option<TransactionId> {
        self.dirty_by
    }

    pub fn mark_dirty(&mut self, dirty_by: Option<TransactionId>) {
        self.dirty_by = dirty_by;
    }

    /// Snapshot the current on-disk representation as the before-image, to
    /// be restored on abort. Called by the buffer pool immediately after a
    /// page is read from disk or flushed.
    pub fn set_before_image(&mut self) {
        self.before_image = self.to_bytes();
    }

    /// The page as it looked at the last `set_before_image` call, decoded
    /// fresh so mutating it never disturbs the stored snapshot.
    pub fn get_before_image(&self) -> DbResult<HeapPage> {
        HeapPage::from_bytes(self.id, self.desc.clone(), &self.before_image)
    }
}
