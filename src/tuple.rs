use std::fmt;
use std::sync::Arc;

use crate::error::{DbError, DbResult};
use crate::field::{Field, FieldType};
use crate::page_id::HeapPageID;

/// Ordered list of `(field type, field name)` pairs. The serialized width of
/// any tuple bound to a descriptor is the sum of the fields' widths, and is
/// constant for the life of the table.
#[derive(Debug, Clone, PartialEq)]
pub struct TupleDesc {
    fields: Vec<(FieldType, String)>,
}

impl TupleDesc {
    pub fn new(fields: Vec<(FieldType, String)>) -> Self {
        TupleDesc { fields }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn field_type(&self, i: usize) -> FieldType {
        self.fields[i].0
    }

    pub fn field_name(&self, i: usize) -> &str {
        &self.fields[i].1
    }

    /// Sum of field widths; the constant serialized size of a tuple bound to
    /// this descriptor.
    pub fn width(&self) -> usize {
        self.fields.iter().map(|(t, _)| t.width()).sum()
    }

    /// Offset of field `i`'s bytes within a serialized tuple.
    fn offset_of(&self, i: usize) -> usize {
        self.fields[..i].iter().map(|(t, _)| t.width()).sum()
    }
}

/// A tuple's persisted address: the page holding it and the slot within
/// that page. Newly constructed tuples have none until inserted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RecordId {
    pub page_id: HeapPageID,
    pub slot: usize,
}

impl RecordId {
    pub fn new(page_id: HeapPageID, slot: usize) -> Self {
        RecordId { page_id, slot }
    }
}

/// A tuple value bound to a descriptor, with an optional record id once the
/// tuple has been persisted to a page.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuple {
    desc: Arc<TupleDesc>,
    fields: Vec<Field>,
    record_id: Option<RecordId>,
}

impl Tuple {
    pub fn new(desc: Arc<TupleDesc>, fields: Vec<Field>) -> DbResult<Tuple> {
        if fields.len() != desc.len() {
            return Err(DbError::SchemaMismatch(format!(
                "expected {} fields, got {}",
                desc.len(),
                fields.len()
            )));
        }
        Ok(Tuple {
            desc,
            fields,
            record_id: None,
        })
    }

    pub fn desc(&self) -> &Arc<TupleDesc> {
        &self.desc
    }

    pub fn field(&self, i: usize) -> &Field {
        &self.fields[i]
    }

    pub fn record_id(&self) -> Option<RecordId> {
        self.record_id
    }

    pub fn set_record_id(&mut self, rid: Option<RecordId>) {
        self.record_id = rid;
    }

    /// Serialize to exactly `desc.width()` bytes, in field order.
    pub fn serialize(&self) -> DbResult<Vec<u8>> {
        let mut buf = Vec::with_capacity(self.desc.width());
        for (i, field) in self.fields.iter().enumerate() {
            buf.extend_from_slice(&field.encode(self.desc.field_type(i))?);
        }
        Ok(buf)
    }

    /// Decode a tuple of the given descriptor from exactly `desc.width()`
    /// bytes. The resulting tuple has no record id.
    pub fn deserialize(desc: Arc<TupleDesc>, bytes: &[u8]) -> DbResult<Tuple> {
        if bytes.len() != desc.width() {
            return Err(DbError::MalformedPage(format!(
                "tuple byte slice is {} bytes, expected {}",
                bytes.len(),
                desc.width()
            )));
        }
        let mut fields = Vec::with_capacity(desc.len());
        for i in 0..desc.len() {
            let start = desc.offset_of(i);
            let end = start + desc.field_type(i).width();
            fields.push(Field::decode(desc.field_type(i), &bytes[start..end])?);
        }
        Ok(Tuple {
            desc,
            fields,
            record_id: None,
        })
    }
}

impl fmt::Display for Tuple {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(")?;
        for (i, field) in self.fields.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", field)?;
        }
        write!(f, ")")
    }
}

/// Convenience descriptor builder: `width` integer fields named
/// `"{prefix}-{i}"`, matching the all-int schemas most tests and the teacher
/// crate's fixtures use.
pub fn simple_int_tuple_desc(width: usize, name_prefix: &str) -> Arc<TupleDesc> {
    let fields = (0..width)
        .map(|i| (FieldType::Int, format!("{}-{}", name_prefix, i)))
        .collect();
    Arc::new(TupleDesc::new(fields))
}
