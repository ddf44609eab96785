// Index Scan Operator
//
// Walks the B+Tree leaf chain in key order and fetches each tuple from the
// table heap by rid. Locking matches the sequential scan.

use std::sync::Arc;

use crate::catalog::TableInfo;
use crate::common::types::{IndexOid, Rid};
use crate::index::BTreeIterator;
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::Operator;
use crate::query::executor::result::{QueryError, QueryResult, Tuple};
use crate::storage::heap::TableHeapError;
use crate::storage::page::PageError;
use crate::transaction::{IsolationLevel, LockMode};

pub struct IndexScanOperator {
    ctx: ExecutorContext,
    index_oid: IndexOid,
    table: Option<Arc<TableInfo>>,
    iter: Option<BTreeIterator<i64>>,
    locked_table: bool,
    done: bool,
}

impl IndexScanOperator {
    pub fn new(ctx: ExecutorContext, index_oid: IndexOid) -> Self {
        Self {
            ctx,
            index_oid,
            table: None,
            iter: None,
            locked_table: false,
            done: false,
        }
    }

    fn isolation(&self) -> IsolationLevel {
        self.ctx.transaction.isolation_level()
    }
}

impl Operator for IndexScanOperator {
    fn init(&mut self) -> QueryResult<()> {
        let info = self
            .ctx
            .catalog
            .get_index(self.index_oid)
            .ok_or_else(|| QueryError::IndexNotFound(self.index_oid.to_string()))?;
        let table = self
            .ctx
            .catalog
            .get_table_by_name(&info.table_name)
            .ok_or_else(|| QueryError::TableNotFound(info.table_name.clone()))?;

        if self.isolation() != IsolationLevel::ReadUncommitted
            && self.ctx.transaction.table_lock_mode(table.oid).is_none()
        {
            self.ctx.lock_manager.lock_table(
                &self.ctx.transaction,
                LockMode::IntentionShared,
                table.oid,
            )?;
            self.locked_table = true;
        }

        self.iter = Some(info.index.begin()?);
        self.table = Some(table);
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let isolation = self.isolation();
        let table = Arc::clone(
            self.table
                .as_ref()
                .ok_or_else(|| QueryError::ExecutionError("scan not initialized".to_string()))?,
        );
        let iter = self
            .iter
            .as_mut()
            .ok_or_else(|| QueryError::ExecutionError("scan not initialized".to_string()))?;

        loop {
            let (_key, rid) = match iter.next() {
                Some(entry) => entry?,
                None => {
                    self.done = true;
                    if isolation == IsolationLevel::ReadCommitted
                        && self.locked_table
                        && self.ctx.transaction.table_lock_mode(table.oid)
                            == Some(LockMode::IntentionShared)
                    {
                        self.ctx
                            .lock_manager
                            .unlock_table(&self.ctx.transaction, table.oid)?;
                        self.locked_table = false;
                    }
                    return Ok(None);
                }
            };

            let mut locked_row = false;
            if isolation != IsolationLevel::ReadUncommitted
                && self.ctx.transaction.row_lock_mode(table.oid, rid).is_none()
            {
                self.ctx.lock_manager.lock_row(
                    &self.ctx.transaction,
                    LockMode::Shared,
                    table.oid,
                    rid,
                )?;
                locked_row = true;
            }

            // The index may still reference tuples tombstoned by an
            // in-flight delete; those are invisible here.
            let fetched = match table.heap.get_tuple(rid) {
                Ok(bytes) => Some(bytes),
                Err(TableHeapError::Page(PageError::RecordDeleted))
                | Err(TableHeapError::Page(PageError::RecordNotFound)) => None,
                Err(e) => return Err(e.into()),
            };

            if locked_row && isolation == IsolationLevel::ReadCommitted {
                self.ctx
                    .lock_manager
                    .unlock_row(&self.ctx.transaction, table.oid, rid)?;
            }

            if let Some(bytes) = fetched {
                return Ok(Some((Tuple::from_bytes(&bytes)?, rid)));
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.iter = None;
        self.done = true;
        Ok(())
    }
}
