// Nested Index Join Operator
//
// For each outer row, evaluates the key expression and probes the inner
// table's B+Tree for matching rids; matching inner tuples are fetched from
// the heap. Buffered at init. Inner and left joins only.

use crate::common::types::{IndexOid, Rid};
use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::join::{concat, concat_nulls, JoinType};
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Tuple};
use crate::query::expression::Expression;
use crate::storage::heap::TableHeapError;
use crate::storage::page::PageError;

pub struct NestedIndexJoinOperator {
    ctx: ExecutorContext,
    child: BoxedOperator,
    index_oid: IndexOid,
    key_expression: Expression,
    join_type: JoinType,
    results: Vec<Tuple>,
    cursor: usize,
}

impl NestedIndexJoinOperator {
    pub fn new(
        ctx: ExecutorContext,
        child: BoxedOperator,
        index_oid: IndexOid,
        key_expression: Expression,
        join_type: JoinType,
    ) -> Self {
        Self {
            ctx,
            child,
            index_oid,
            key_expression,
            join_type,
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for NestedIndexJoinOperator {
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
        let inner_width = table.schema.len();

        self.results.clear();
        self.cursor = 0;

        let mut child = self.child.lock().unwrap();
        child.init()?;

        while let Some((outer, _)) = child.next()? {
            let key = match self.key_expression.evaluate(&outer)? {
                DataValue::Integer(key) => key,
                other => {
                    return Err(QueryError::TypeError(format!(
                        "index probe key must be an integer, got {}",
                        other
                    )))
                }
            };

            let mut matched = false;
            for rid in info.index.get(&key)? {
                match table.heap.get_tuple(rid) {
                    Ok(bytes) => {
                        let inner = Tuple::from_bytes(&bytes)?;
                        self.results.push(concat(&outer, &inner));
                        matched = true;
                    }
                    Err(TableHeapError::Page(PageError::RecordDeleted))
                    | Err(TableHeapError::Page(PageError::RecordNotFound)) => {}
                    Err(e) => return Err(e.into()),
                }
            }

            if !matched && self.join_type == JoinType::Left {
                self.results.push(concat_nulls(&outer, inner_width));
            }
        }
        child.close()?;

        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor < self.results.len() {
            let tuple = self.results[self.cursor].clone();
            self.cursor += 1;
            Ok(Some((tuple, Rid::INVALID)))
        } else {
            Ok(None)
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.results.clear();
        self.cursor = 0;
        Ok(())
    }
}
