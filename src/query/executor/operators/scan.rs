// Sequential Scan Operator
//
// Streams the live tuples of a table heap, acquiring the locks its
// transaction's isolation level demands: an IS table lock at init and an S
// lock per row, with read-committed releasing both as soon as the read is
// over. Read-uncommitted takes no read locks at all.

use crate::common::types::{Rid, TableOid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::Operator;
use crate::query::executor::result::{QueryError, QueryResult, Tuple};
use crate::query::expression::Expression;
use crate::storage::heap::TableIterator;
use crate::transaction::{IsolationLevel, LockMode};

pub struct SeqScanOperator {
    ctx: ExecutorContext,
    table_oid: TableOid,
    /// Optional predicate evaluated against each tuple
    predicate: Option<Expression>,
    iter: Option<TableIterator>,
    /// Did this operator take the IS table lock itself?
    locked_table: bool,
    done: bool,
}

impl SeqScanOperator {
    pub fn new(ctx: ExecutorContext, table_oid: TableOid, predicate: Option<Expression>) -> Self {
        Self {
            ctx,
            table_oid,
            predicate,
            iter: None,
            locked_table: false,
            done: false,
        }
    }

    fn isolation(&self) -> IsolationLevel {
        self.ctx.transaction.isolation_level()
    }
}

impl Operator for SeqScanOperator {
    fn init(&mut self) -> QueryResult<()> {
        let table = self
            .ctx
            .catalog
            .get_table(self.table_oid)
            .ok_or_else(|| QueryError::TableNotFound(self.table_oid.to_string()))?;

        // The table lock is skipped under read-uncommitted, and also when
        // the transaction already holds some table lock here (a stronger
        // mode never downgrades).
        if self.isolation() != IsolationLevel::ReadUncommitted
            && self
                .ctx
                .transaction
                .table_lock_mode(self.table_oid)
                .is_none()
        {
            self.ctx.lock_manager.lock_table(
                &self.ctx.transaction,
                LockMode::IntentionShared,
                self.table_oid,
            )?;
            self.locked_table = true;
        }

        self.iter = Some(table.heap.iter());
        self.done = false;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        let isolation = self.isolation();
        let iter = self
            .iter
            .as_mut()
            .ok_or_else(|| QueryError::ExecutionError("scan not initialized".to_string()))?;

        loop {
            let entry = match iter.next() {
                Some(entry) => entry?,
                None => {
                    self.done = true;
                    // Read-committed drops its table lock once the scan
                    // ends, unless a writer above upgraded it in the
                    // meantime.
                    if isolation == IsolationLevel::ReadCommitted
                        && self.locked_table
                        && self.ctx.transaction.table_lock_mode(self.table_oid)
                            == Some(LockMode::IntentionShared)
                    {
                        self.ctx
                            .lock_manager
                            .unlock_table(&self.ctx.transaction, self.table_oid)?;
                        self.locked_table = false;
                    }
                    return Ok(None);
                }
            };
            let (rid, bytes) = entry;

            let mut locked_row = false;
            if isolation != IsolationLevel::ReadUncommitted
                && self
                    .ctx
                    .transaction
                    .row_lock_mode(self.table_oid, rid)
                    .is_none()
            {
                self.ctx.lock_manager.lock_row(
                    &self.ctx.transaction,
                    LockMode::Shared,
                    self.table_oid,
                    rid,
                )?;
                locked_row = true;
            }

            let tuple = Tuple::from_bytes(&bytes)?;

            let passes = match &self.predicate {
                Some(predicate) => predicate.evaluate(&tuple)?.is_true(),
                None => true,
            };

            // Read-committed holds the row lock only for the read itself
            if locked_row && isolation == IsolationLevel::ReadCommitted {
                self.ctx
                    .lock_manager
                    .unlock_row(&self.ctx.transaction, self.table_oid, rid)?;
            }

            if passes {
                return Ok(Some((tuple, rid)));
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.iter = None;
        self.done = true;
        Ok(())
    }
}
