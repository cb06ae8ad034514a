use std::fmt;

use crate::error::{DbError, DbResult};

/// Closed set of field types. Every field's serialized width is fixed and
/// known from the type alone (a declared max length, for strings).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    Int,
    Varchar(usize),
}

impl FieldType {
    /// Serialized width in bytes.
    pub fn width(&self) -> usize {
        match self {
            FieldType::Int => 4,
            FieldType::Varchar(max_len) => 4 + max_len,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            FieldType::Int => write!(f, "INT"),
            FieldType::Varchar(n) => write!(f, "VARCHAR({})", n),
        }
    }
}

/// A single field value, bound to the `FieldType` it was declared with.
#[derive(Debug, Clone, PartialEq)]
pub enum Field {
    Int(i32),
    Varchar(String),
}

impl Field {
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Int(_) => FieldType::Int,
            // callers that need the declared max length read it from the
            // table's TupleDesc; the value itself only knows its content.
            Field::Varchar(s) => FieldType::Varchar(s.len()),
        }
    }

    /// Encode into exactly `field_type.width()` bytes.
    pub fn encode(&self, field_type: FieldType) -> DbResult<Vec<u8>> {
        match (self, field_type) {
            (Field::Int(v), FieldType::Int) => Ok(v.to_be_bytes().to_vec()),
            (Field::Varchar(s), FieldType::Varchar(max_len)) => {
                let bytes = s.as_bytes();
                if bytes.len() > max_len {
                    return Err(DbError::SchemaMismatch(format!(
                        "varchar value of length {} exceeds declared max {}",
                        bytes.len(),
                        max_len
                    )));
                }
                let mut buf = Vec::with_capacity(4 + max_len);
                buf.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
                buf.extend_from_slice(bytes);
                buf.resize(4 + max_len, 0);
                Ok(buf)
            }
            _ => Err(DbError::SchemaMismatch(
                "field value does not match declared field type".to_string(),
            )),
        }
    }

    /// Decode exactly `field_type.width()` bytes produced by `encode`.
    pub fn decode(field_type: FieldType, bytes: &[u8]) -> DbResult<Field> {
        match field_type {
            FieldType::Int => {
                if bytes.len() < 4 {
                    return Err(DbError::MalformedPage("int field truncated".to_string()));
                }
                let mut arr = [0u8; 4];
                arr.copy_from_slice(&bytes[0..4]);
                Ok(Field::Int(i32::from_be_bytes(arr)))
            }
            FieldType::Varchar(max_len) => {
                if bytes.len() < 4 + max_len {
                    return Err(DbError::MalformedPage("varchar field truncated".to_string()));
                }
                let mut len_bytes = [0u8; 4];
                len_bytes.copy_from_slice(&bytes[0..4]);
                let len = u32::from_be_bytes(len_bytes) as usize;
                if len > max_len {
                    return Err(DbError::MalformedPage(
                        "varchar length prefix exceeds declared max".to_string(),
                    ));
                }
                let content = &bytes[4..4 + len];
                let s = std::str::from_utf8(content)
                    .map_err(|e| DbError::MalformedPage(e.to_string()))?;
                Ok(Field::Varchar(s.to_string()))
            }
        }
    }
}

impl fmt::Display for Field {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Field::Int(v) => write!(f, "{}", v),
            Field::Varchar(s) => write!(f, "{}", s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn int_round_trips() {
        let f = Field::Int(-7);
        let bytes = f.encode(FieldType::Int).unwrap();
        assert_eq!(bytes.len(), FieldType::Int.width());
        assert_eq!(Field::decode(FieldType::Int, &bytes).unwrap(), f);
    }

    #[test]
    fn varchar_round_trips_with_padding() {
        let ft = FieldType::Varchar(10);
        let f = Field::Varchar("hi".to_string());
        let bytes = f.encode(ft).unwrap();
        assert_eq!(bytes.len(), ft.width());
        assert_eq!(Field::decode(ft, &bytes).unwrap(), f);
    }

    #[test]
    fn varchar_too_long_is_schema_mismatch() {
        let ft = FieldType::Varchar(2);
        let f = Field::Varchar("too long".to_string());
        assert!(matches!(f.encode(ft), Err(DbError::SchemaMismatch(_))));
    }
}
