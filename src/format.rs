//! Defines the persisted layout of a flattened value.
//!
//! # Table Layout
//! One table exists per (owner, group). Every row is one node of a flattened value:
//!
//! | column            | meaning                                                        |
//! |-------------------|----------------------------------------------------------------|
//! | `key_hash`        | set only on the root node of a key (`UNIQUE`)                  |
//! | `value`           | scalar payload of a leaf, `NULL` for composites                |
//! | `type_tag`        | [`TypeTag`] of the node                                        |
//! | `sequence_index`  | position inside an ordered parent, `NULL` under sets and roots |
//! | `local_id`        | id of a composite, unique within its key only                  |
//! | `parent_local_id` | `local_id` of the containing composite, `NULL` on the root     |
//! | `belongs_to_key`  | hash of the owning key, set on every node                      |
//!
//! # Scalar Encoding
//! `Int` and `Bool` are `INTEGER`, `Float` is `REAL`, `Str` is `TEXT`, `Bytes` is a
//! `BLOB` and `Complex` is a 16 byte `BLOB` (real then imaginary, little endian).
//! SQLite stores a NaN float as `NULL`, so a `NULL` under a float tag reads back as NaN.

use rusqlite::types::Value as SqlValue;

use crate::error::{Result, VaultError};
use crate::key::KeyHash;
use crate::value::Value;

/// Size of an encoded complex number.
const COMPLEX_SIZE: usize = 16;

/// Compact numeric tag for each value shape.
///
/// Tags 1-4 are composites, decomposed further when flattened; the rest are
/// scalars stored literally in the `value` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum TypeTag {
    /// Mutable sequence.
    List = 1,
    /// Immutable sequence.
    Tuple = 2,
    /// Unordered distinct members.
    Set = 3,
    /// Ordered key/value entries.
    Map = 4,
    /// Signed integer.
    Int = 5,
    /// Float.
    Float = 6,
    /// String.
    Str = 7,
    /// Boolean.
    Bool = 8,
    /// Complex pair.
    Complex = 9,
    /// Byte string.
    Bytes = 10,
}

impl TypeTag {
    /// Every tag, in numeric order.
    pub const ALL: [TypeTag; 10] = [
        Self::List,
        Self::Tuple,
        Self::Set,
        Self::Map,
        Self::Int,
        Self::Float,
        Self::Str,
        Self::Bool,
        Self::Complex,
        Self::Bytes,
    ];

    /// Resolves a stored tag. Unknown tags are a corrupt encoding.
    pub fn from_raw(raw: i64) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|tag| i64::from(tag.as_u8()) == raw)
            .ok_or_else(|| VaultError::corrupt(None, format!("Unknown type tag {raw}")))
    }

    /// Returns the numeric tag.
    pub fn as_u8(&self) -> u8 {
        *self as u8
    }

    /// True for list, tuple, set and map.
    pub fn is_composite(&self) -> bool {
        self.as_u8() <= Self::Map.as_u8()
    }

    /// True for composites whose children carry a sequence index.
    pub fn is_ordered(&self) -> bool {
        matches!(self, Self::List | Self::Tuple | Self::Map)
    }

    /// Short lowercase name used in logs and reports.
    pub fn name(&self) -> &'static str {
        match self {
            Self::List => "list",
            Self::Tuple => "tuple",
            Self::Set => "set",
            Self::Map => "map",
            Self::Int => "int",
            Self::Float => "float",
            Self::Str => "str",
            Self::Bool => "bool",
            Self::Complex => "complex",
            Self::Bytes => "bytes",
        }
    }
}

/// One persisted node, column for column.
///
/// Rows are what the store reads and writes; the tag is kept raw here so that a
/// table with an unknown tag can still be loaded and the damage confined to one key.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    /// Hash of the owning key, only on the root node.
    pub key_hash: Option<i64>,
    /// Scalar payload, `Null` for composites.
    pub value: SqlValue,
    /// Raw [`TypeTag`].
    pub type_tag: i64,
    /// Position inside an ordered parent.
    pub sequence_index: Option<i64>,
    /// Id of this composite within its key.
    pub local_id: Option<i64>,
    /// Id of the containing composite.
    pub parent_local_id: Option<i64>,
    /// Hash of the owning key, on every node.
    pub belongs_to_key: Option<i64>,
}

impl Row {
    /// Column list shared by every statement, in [`Row`] field order.
    pub const COLUMNS: &'static str =
        "key_hash, value, type_tag, sequence_index, local_id, parent_local_id, belongs_to_key";

    /// The key this row belongs to when rows from many keys are mixed.
    ///
    /// Root rows written by older tools may lack `belongs_to_key`, so the root's own
    /// `key_hash` is the fallback.
    pub fn group_key(&self) -> Option<KeyHash> {
        self.belongs_to_key
            .or(self.key_hash)
            .map(KeyHash::from_raw)
    }

    /// Reads a row from a query selecting [`Row::COLUMNS`].
    pub fn from_sql(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            key_hash: row.get(0)?,
            value: row.get(1)?,
            type_tag: row.get(2)?,
            sequence_index: row.get(3)?,
            local_id: row.get(4)?,
            parent_local_id: row.get(5)?,
            belongs_to_key: row.get(6)?,
        })
    }
}

/// Encodes a scalar into its column representation.
///
/// Composites have no column representation and encode as `NULL`.
pub fn encode_scalar(value: &Value) -> SqlValue {
    match value {
        Value::Int(v) => SqlValue::Integer(*v),
        Value::Float(v) => SqlValue::Real(*v),
        Value::Str(v) => SqlValue::Text(v.clone()),
        Value::Bool(v) => SqlValue::Integer(i64::from(*v)),
        Value::Bytes(v) => SqlValue::Blob(v.clone()),
        Value::Complex(re, im) => {
            let mut buf = Vec::with_capacity(COMPLEX_SIZE);
            buf.extend_from_slice(&re.to_le_bytes());
            buf.extend_from_slice(&im.to_le_bytes());
            SqlValue::Blob(buf)
        }
        Value::List(_) | Value::Tuple(_) | Value::Set(_) | Value::Map(_) => SqlValue::Null,
    }
}

/// Decodes a scalar column under `tag`.
///
/// Errors carry no key; the rebuilder attaches it.
pub fn decode_scalar(tag: TypeTag, column: SqlValue) -> Result<Value> {
    let value = match (tag, column) {
        (TypeTag::Int, SqlValue::Integer(v)) => Value::Int(v),
        (TypeTag::Float, SqlValue::Real(v)) => Value::Float(v),
        (TypeTag::Float, SqlValue::Integer(v)) => Value::Float(v as f64),
        (TypeTag::Float, SqlValue::Null) => Value::Float(f64::NAN),
        (TypeTag::Str, SqlValue::Text(v)) => Value::Str(v),
        (TypeTag::Bool, SqlValue::Integer(0)) => Value::Bool(false),
        (TypeTag::Bool, SqlValue::Integer(1)) => Value::Bool(true),
        (TypeTag::Bytes, SqlValue::Blob(v)) => Value::Bytes(v),
        (TypeTag::Complex, SqlValue::Blob(v)) if v.len() == COMPLEX_SIZE => {
            let mut re = [0u8; 8];
            let mut im = [0u8; 8];
            re.copy_from_slice(&v[..8]);
            im.copy_from_slice(&v[8..]);
            Value::Complex(f64::from_le_bytes(re), f64::from_le_bytes(im))
        }
        (tag, column) => {
            return Err(VaultError::corrupt(
                None,
                format!(
                    "Column {:?} cannot hold a {} value",
                    column.data_type(),
                    tag.name()
                ),
            ));
        }
    };
    Ok(value)
}
