// Insert Operator
//
// Consumes its child fully on the first call to next(), appending each
// tuple to the table heap under an IX table lock and an X lock per new
// rid, maintaining every index of the table. A failed row lock physically
// undoes everything this call inserted (heap and indexes) before the abort
// propagates.

use crate::catalog::Catalog;
use crate::common::types::{Rid, TableOid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Tuple};
use crate::transaction::LockMode;

pub struct InsertOperator {
    ctx: ExecutorContext,
    table_oid: TableOid,
    child: BoxedOperator,
    done: bool,
}

impl InsertOperator {
    pub fn new(ctx: ExecutorContext, table_oid: TableOid, child: BoxedOperator) -> Self {
        Self {
            ctx,
            table_oid,
            child,
            done: false,
        }
    }
}

impl Operator for InsertOperator {
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

        let mut inserted: Vec<(Rid, Tuple)> = Vec::new();
        let mut count: i64 = 0;

        loop {
            let row = self.child.lock().unwrap().next()?;
            let Some((tuple, _)) = row else { break };

            let bytes = tuple.to_bytes()?;
            let rid = table.heap.insert_tuple(&bytes)?;

            if let Err(abort) = self.ctx.lock_manager.lock_row(
                &self.ctx.transaction,
                LockMode::Exclusive,
                self.table_oid,
                rid,
            ) {
                // Undo this call's work: the unlocked row just written,
                // then every earlier row and its index entries.
                table.heap.apply_delete(rid)?;
                for (prev_rid, prev_tuple) in &inserted {
                    table.heap.apply_delete(*prev_rid)?;
                    for index in &indexes {
                        let key = Catalog::key_of(prev_tuple, index.key_column)?;
                        index.index.remove(&key)?;
                    }
                }
                return Err(abort.into());
            }

            for index in &indexes {
                let key = Catalog::key_of(&tuple, index.key_column)?;
                index.index.insert(key, rid)?;
            }

            inserted.push((rid, tuple));
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
