//! Metadata value type.
//!
//! Caller-supplied metadata is a free-form `string -> scalar|list|map` object tree.
//! Represented here as an explicit tagged sum type, bounded in depth and size, that
//! round-trips JSON.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Maximum nesting depth accepted by [`Value::check_bounds`].
pub const MAX_DEPTH: usize = 8;
/// Maximum number of scalar leaves (strings, ints, floats, bools) a single value tree may
/// contain.
pub const MAX_LEAVES: usize = 4096;
/// Maximum byte length of any single `String` leaf.
pub const MAX_STRING_LEN: usize = 16 * 1024;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    List(Vec<Value>),
    Map(BTreeMap<String, Value>),
}

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ValueError {
    #[error("metadata value nested deeper than {max} levels")]
    TooDeep { max: usize },
    #[error("metadata value has more than {max} leaves")]
    TooManyLeaves { max: usize },
    #[error("metadata string exceeds {max} bytes")]
    StringTooLong { max: usize },
}

impl Value {
    pub fn check_bounds(&self) -> Result<(), ValueError> {
        let mut leaves = 0usize;
        self.check_bounds_inner(0, &mut leaves)
    }

    fn check_bounds_inner(&self, depth: usize, leaves: &mut usize) -> Result<(), ValueError> {
        if depth > MAX_DEPTH {
            return Err(ValueError::TooDeep { max: MAX_DEPTH });
        }
        match self {
            Value::Null | Value::Bool(_) | Value::Int(_) | Value::Float(_) => {
                *leaves += 1;
            }
            Value::String(s) => {
                if s.len() > MAX_STRING_LEN {
                    return Err(ValueError::StringTooLong { max: MAX_STRING_LEN });
                }
                *leaves += 1;
            }
            Value::List(items) => {
                for item in items {
                    item.check_bounds_inner(depth + 1, leaves)?;
                }
            }
            Value::Map(map) => {
                for value in map.values() {
                    value.check_bounds_inner(depth + 1, leaves)?;
                }
            }
        }
        if *leaves > MAX_LEAVES {
            return Err(ValueError::TooManyLeaves { max: MAX_LEAVES });
        }
        Ok(())
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    pub fn from_json(json: serde_json::Value) -> Self {
        serde_json::from_value(json).unwrap_or(Value::Null)
    }
}

/// A metadata map, keyed by caller-supplied attribute name.
pub type Metadata = BTreeMap<String, Value>;

/// Check the same depth/leaf/string bounds [`Value::check_bounds`] enforces, but across
/// every top-level entry of a metadata map, sharing one leaf counter so the bound applies
/// to the whole map rather than to each entry in isolation.
pub fn check_metadata_bounds(metadata: &Metadata) -> Result<(), ValueError> {
    let mut leaves = 0usize;
    for value in metadata.values() {
        value.check_bounds_inner(1, &mut leaves)?;
    }
    Ok(())
}
