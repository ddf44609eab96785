// Delete Operator
//
// Consumes its child fully on the first call to next(), tombstoning each
// rid under an IX table lock and an X lock per row and removing the index
// entries. A failed row lock rolls every tombstone of this call back
// (heap and indexes) before the abort propagates; the tombstones become
// permanent only at commit.

use crate::catalog::Catalog;
use crate::common::types::{Rid, TableOid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Tuple};
use crate::transaction::LockMode;

pub struct DeleteOperator {
    ctx: ExecutorContext,
    table_oid: TableOid,
    child: BoxedOperator,
    done: bool,
}

impl DeleteOperator {
    pub fn new(ctx: ExecutorContext, table_oid: TableOid, child: BoxedOperator) -> Self {
        Self {
            ctx,
            table_oid,
            child,
            done: false,
        }
    }
}

impl Operator for DeleteOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.child.lock().unwrap().init()?;
        self.done = false;

        if !self.ctx.transaction.has_write_intent_on(self.table_oid) {
            self.ctx.lock_manager.lock_table(
                &self.ctx.transaction,
                LockMode::IntentionExclusive,
                self.table_oid,
            )?;
        }
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.done {
            return Ok(None);
        }
        self.done = true;

        let table = self
            .ctx
            .catalog
            .get_table(self.table_oid)
            .ok_or_else(|| QueryError::TableNotFound(self.table_oid.to_string()))?;
        let indexes = self.ctx.catalog.get_table_indexes(&table.name);

        let mut removed: Vec<(Rid, Tuple)> = Vec::new();
        let mut count: i64 = 0;

        loop {
            let row = self.child.lock().unwrap().next()?;
            let Some((tuple, rid)) = row else { break };

            if let Err(abort) = self.ctx.lock_manager.lock_row(
                &self.ctx.transaction,
                LockMode::Exclusive,
                self.table_oid,
                rid,
            ) {
                // Resurrect every tombstone of this call and restore the
                // index entries removed with them.
                for (prev_rid, prev_tuple) in &removed {
                    table.heap.rollback_delete(*prev_rid)?;
                    for index in &indexes {
                        let key = Catalog::key_of(prev_tuple, index.key_column)?;
                        index.index.insert(key, *prev_rid)?;
                    }
                }
                return Err(abort.into());
            }

            table.heap.mark_delete(rid)?;
            for index in &indexes {
                let key = Catalog::key_of(&tuple, index.key_column)?;
                index.index.remove(&key)?;
            }

            removed.push((rid, tuple));
            count += 1;
        }

        Ok(Some((
            Tuple::new(vec![DataValue::Integer(count)]),
            Rid::INVALID,
        )))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.child.lock().unwrap().close()?;
        self.done = true;
        Ok(())
    }
}
