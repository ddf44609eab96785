use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use thiserror::Error;

use crate::catalog::schema::Schema;
use crate::common::types::{IndexOid, TableOid};
use crate::index::btree::BTreeError;
use crate::index::{BTreeIndex, IndexDirectory};
use crate::query::executor::result::{DataValue, Tuple};
use crate::storage::buffer::BufferPoolManager;
use crate::storage::heap::{TableHeap, TableHeapError};

#[derive(Error, Debug)]
pub enum CatalogError {
    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} not found")]
    TableNotFound(String),

    #[error("Column {0} is not an integer key column")]
    InvalidKeyColumn(usize),

    #[error("Heap error: {0}")]
    Heap(#[from] TableHeapError),

    #[error("Index error: {0}")]
    Index(#[from] BTreeError),

    #[error("Tuple decode error: {0}")]
    TupleDecode(String),
}

/// A table known to the catalog
pub struct TableInfo {
    pub oid: TableOid,
    pub name: String,
    pub schema: Schema,
    pub heap: Arc<TableHeap>,
}

/// An index known to the catalog. Keys are the integer values of one
/// column of the indexed table.
pub struct IndexInfo {
    pub oid: IndexOid,
    pub name: String,
    pub table_name: String,
    pub key_column: usize,
    pub index: Arc<BTreeIndex<i64>>,
}

struct CatalogState {
    tables: HashMap<TableOid, Arc<TableInfo>>,
    table_names: HashMap<String, TableOid>,
    indexes: HashMap<IndexOid, Arc<IndexInfo>>,
    table_indexes: HashMap<String, Vec<IndexOid>>,
    next_table_oid: TableOid,
    next_index_oid: IndexOid,
}

/// Registry of tables and indexes, consumed by the execution engine
pub struct Catalog {
    buffer_pool: Arc<BufferPoolManager>,
    directory: Arc<IndexDirectory>,
    inner: RwLock<CatalogState>,
}

impl Catalog {
    pub fn new(buffer_pool: Arc<BufferPoolManager>, directory: Arc<IndexDirectory>) -> Self {
        Self {
            buffer_pool,
            directory,
            inner: RwLock::new(CatalogState {
                tables: HashMap::new(),
                table_names: HashMap::new(),
                indexes: HashMap::new(),
                table_indexes: HashMap::new(),
                next_table_oid: 0,
                next_index_oid: 0,
            }),
        }
    }

    /// Create a table with a fresh heap
    pub fn create_table(
        &self,
        name: impl Into<String>,
        schema: Schema,
    ) -> Result<Arc<TableInfo>, CatalogError> {
        let name = name.into();
        let mut state = self.inner.write();
        if state.table_names.contains_key(&name) {
            return Err(CatalogError::TableExists(name));
        }

        let heap = Arc::new(TableHeap::create(Arc::clone(&self.buffer_pool))?);
        let oid = state.next_table_oid;
        state.next_table_oid += 1;

        let info = Arc::new(TableInfo {
            oid,
            name: name.clone(),
            schema,
            heap,
        });
        state.tables.insert(oid, Arc::clone(&info));
        state.table_names.insert(name, oid);
        Ok(info)
    }

    pub fn get_table(&self, oid: TableOid) -> Option<Arc<TableInfo>> {
        self.inner.read().tables.get(&oid).cloned()
    }

    pub fn get_table_by_name(&self, name: &str) -> Option<Arc<TableInfo>> {
        let state = self.inner.read();
        let oid = state.table_names.get(name)?;
        state.tables.get(oid).cloned()
    }

    /// Create a B+Tree index over one integer column, backfilled from the
    /// table's existing tuples
    pub fn create_index(
        &self,
        index_name: impl Into<String>,
        table_name: &str,
        key_column: usize,
        leaf_max_size: usize,
        internal_max_size: usize,
    ) -> Result<Arc<IndexInfo>, CatalogError> {
        let index_name = index_name.into();
        let table = self
            .get_table_by_name(table_name)
            .ok_or_else(|| CatalogError::TableNotFound(table_name.to_string()))?;

        let index = BTreeIndex::create(
            Arc::clone(&self.directory),
            Arc::clone(&self.buffer_pool),
            index_name.clone(),
            leaf_max_size,
            internal_max_size,
        )?;

        for entry in table.heap.iter() {
            let (rid, bytes) = entry?;
            let tuple =
                Tuple::from_bytes(&bytes).map_err(|e| CatalogError::TupleDecode(e.to_string()))?;
            let key = Self::key_of(&tuple, key_column)?;
            index.insert(key, rid)?;
        }

        let mut state = self.inner.write();
        let oid = state.next_index_oid;
        state.next_index_oid += 1;

        let info = Arc::new(IndexInfo {
            oid,
            name: index_name,
            table_name: table_name.to_string(),
            key_column,
            index: Arc::new(index),
        });
        state.indexes.insert(oid, Arc::clone(&info));
        state
            .table_indexes
            .entry(table_name.to_string())
            .or_default()
            .push(oid);
        Ok(info)
    }

    pub fn get_index(&self, oid: IndexOid) -> Option<Arc<IndexInfo>> {
        self.inner.read().indexes.get(&oid).cloned()
    }

    /// Every index over the named table
    pub fn get_table_indexes(&self, table_name: &str) -> Vec<Arc<IndexInfo>> {
        let state = self.inner.read();
        state
            .table_indexes
            .get(table_name)
            .map(|oids| {
                oids.iter()
                    .filter_map(|oid| state.indexes.get(oid).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Integer key of `tuple` at `column`
    pub fn key_of(tuple: &Tuple, column: usize) -> Result<i64, CatalogError> {
        match tuple.values.get(column) {
            Some(DataValue::Integer(key)) => Ok(*key),
            _ => Err(CatalogError::InvalidKeyColumn(column)),
        }
    }
}
