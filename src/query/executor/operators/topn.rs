// Top-N Operator
//
// Keeps a bounded binary heap of the N smallest rows under the ordering
// (the heap's greatest element is discarded whenever it grows past N) and
// emits the survivors in ascending order.

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use std::sync::Arc;

use crate::common::types::Rid;
use crate::query::executor::operators::sort::{compare_sort_keys, sort_keys_of};
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{DataValue, QueryResult, Tuple};
use crate::query::expression::{Expression, OrderDirection};

struct HeapEntry {
    keys: Vec<DataValue>,
    tuple: Tuple,
    rid: Rid,
    order_by: Arc<Vec<(OrderDirection, Expression)>>,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> Ordering {
        compare_sort_keys(&self.keys, &other.keys, &self.order_by)
    }
}

pub struct TopNOperator {
    child: BoxedOperator,
    limit: usize,
    order_by: Arc<Vec<(OrderDirection, Expression)>>,
    results: Vec<(Tuple, Rid)>,
    cursor: usize,
}

impl TopNOperator {
    pub fn new(
        child: BoxedOperator,
        limit: usize,
        order_by: Vec<(OrderDirection, Expression)>,
    ) -> Self {
        Self {
            child,
            limit,
            order_by: Arc::new(order_by),
            results: Vec::new(),
            cursor: 0,
        }
    }
}

impl Operator for TopNOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.results.clear();
        self.cursor = 0;
        if self.limit == 0 {
            return Ok(());
        }

        let mut heap: BinaryHeap<HeapEntry> = BinaryHeap::with_capacity(self.limit + 1);
        {
            let mut child = self.child.lock().unwrap();
            child.init()?;
            while let Some((tuple, rid)) = child.next()? {
                let keys = sort_keys_of(&tuple, &self.order_by)?;
                heap.push(HeapEntry {
                    keys,
                    tuple,
                    rid,
                    order_by: Arc::clone(&self.order_by),
                });
                if heap.len() > self.limit {
                    heap.pop();
                }
            }
            child.close()?;
        }

        self.results = heap
            .into_sorted_vec()
            .into_iter()
            .map(|entry| (entry.tuple, entry.rid))
            .collect();
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor < self.results.len() {
            let row = self.results[self.cursor].clone();
            self.cursor += 1;
            Ok(Some(row))
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
