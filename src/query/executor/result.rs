use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::CatalogError;
use crate::index::btree::BTreeError;
use crate::storage::buffer::BufferPoolError;
use crate::storage::heap::TableHeapError;
use crate::transaction::TransactionAbort;

/// Possible data types for values in a tuple
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DataValue {
    Null,
    Integer(i64),
    Float(f64),
    Text(String),
    Boolean(bool),
}

impl Eq for DataValue {}

impl Hash for DataValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        // Type discriminant first so values of different types never collide
        match self {
            DataValue::Null => 0u8.hash(state),
            DataValue::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            DataValue::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            DataValue::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            DataValue::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Null => write!(f, "NULL"),
            DataValue::Integer(i) => write!(f, "{}", i),
            DataValue::Float(fl) => write!(f, "{}", fl),
            DataValue::Text(s) => write!(f, "\"{}\"", s),
            DataValue::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl DataValue {
    pub fn is_null(&self) -> bool {
        matches!(self, DataValue::Null)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, DataValue::Boolean(true))
    }

    /// Total order over values: NULL sorts first, integers and floats
    /// compare numerically, otherwise values order by type then content.
    pub fn compare(&self, other: &DataValue) -> Ordering {
        use DataValue::*;
        match (self, other) {
            (Null, Null) => Ordering::Equal,
            (Null, _) => Ordering::Less,
            (_, Null) => Ordering::Greater,
            (Integer(a), Integer(b)) => a.cmp(b),
            (Float(a), Float(b)) => a.partial_cmp(b).unwrap_or(Ordering::Equal),
            (Integer(a), Float(b)) => (*a as f64).partial_cmp(b).unwrap_or(Ordering::Equal),
            (Float(a), Integer(b)) => a.partial_cmp(&(*b as f64)).unwrap_or(Ordering::Equal),
            (Text(a), Text(b)) => a.cmp(b),
            (Boolean(a), Boolean(b)) => a.cmp(b),
            _ => self.type_rank().cmp(&other.type_rank()),
        }
    }

    fn type_rank(&self) -> u8 {
        match self {
            DataValue::Null => 0,
            DataValue::Integer(_) | DataValue::Float(_) => 1,
            DataValue::Text(_) => 2,
            DataValue::Boolean(_) => 3,
        }
    }
}

/// A positional tuple of values
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tuple {
    pub values: Vec<DataValue>,
}

impl Tuple {
    pub fn new(values: Vec<DataValue>) -> Self {
        Self { values }
    }

    pub fn get(&self, index: usize) -> Option<&DataValue> {
        self.values.get(index)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn to_bytes(&self) -> QueryResult<Vec<u8>> {
        bincode::serialize(&self.values).map_err(|e| QueryError::Serialization(e.to_string()))
    }

    pub fn from_bytes(bytes: &[u8]) -> QueryResult<Self> {
        let values =
            bincode::deserialize(bytes).map_err(|e| QueryError::Serialization(e.to_string()))?;
        Ok(Self { values })
    }
}

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("{0}")]
    TransactionAborted(#[from] TransactionAbort),

    #[error("Heap error: {0}")]
    Heap(#[from] TableHeapError),

    #[error("Index error: {0}")]
    Index(#[from] BTreeError),

    #[error("Buffer pool error: {0}")]
    Buffer(#[from] BufferPoolError),

    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Index {0} not found")]
    IndexNotFound(String),

    #[error("Type error: {0}")]
    TypeError(String),

    #[error("Execution error: {0}")]
    ExecutionError(String),
}

pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_null_sorts_first() {
        assert_eq!(
            DataValue::Null.compare(&DataValue::Integer(-100)),
            Ordering::Less
        );
        assert_eq!(
            DataValue::Integer(0).compare(&DataValue::Null),
            Ordering::Greater
        );
        assert_eq!(DataValue::Null.compare(&DataValue::Null), Ordering::Equal);
    }

    #[test]
    fn test_numeric_cross_compare() {
        assert_eq!(
            DataValue::Integer(2).compare(&DataValue::Float(2.5)),
            Ordering::Less
        );
        assert_eq!(
            DataValue::Float(3.0).compare(&DataValue::Integer(3)),
            Ordering::Equal
        );
    }

    #[test]
    fn test_tuple_round_trip() {
        let tuple = Tuple::new(vec![
            DataValue::Integer(42),
            DataValue::Text("karst".to_string()),
            DataValue::Null,
            DataValue::Boolean(true),
        ]);
        let bytes = tuple.to_bytes().unwrap();
        assert_eq!(Tuple::from_bytes(&bytes).unwrap(), tuple);
    }
}
