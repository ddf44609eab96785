// Sort Operator
//
// Pulls its child fully at init, evaluates the ordering expressions once
// per row and sorts on the precomputed keys. NULL sorts first; DESC
// reverses each key's comparison.

use std::cmp::Ordering;

use crate::common::types::Rid;
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{DataValue, QueryResult, Tuple};
use crate::query::expression::{Expression, OrderDirection};

/// Compare two precomputed key vectors under the given directions
pub(crate) fn compare_sort_keys(
    a: &[DataValue],
    b: &[DataValue],
    order_by: &[(OrderDirection, Expression)],
) -> Ordering {
    for (i, (direction, _)) in order_by.iter().enumerate() {
        let ordering = a[i].compare(&b[i]);
        let ordering = match direction {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        };
        if ordering != Ordering::Equal {
            return ordering;
        }
    }
    Ordering::Equal
}

pub(crate) fn sort_keys_of(
    tuple: &Tuple,
    order_by: &[(OrderDirection, Expression)],
) -> QueryResult<Vec<DataValue>> {
    order_by
        .iter()
        .map(|(_, expr)| expr.evaluate(tuple))
        .collect()
}

pub struct SortOperator {
    child: BoxedOperator,
    order_by: Vec<(OrderDirection, Expression)>,
    output: Option<std::vec::IntoIter<(Tuple, Rid)>>,
}

impl SortOperator {
    pub fn new(child: BoxedOperator, order_by: Vec<(OrderDirection, Expression)>) -> Self {
        Self {
            child,
            order_by,
            output: None,
        }
    }
}

impl Operator for SortOperator {
    fn init(&mut self) -> QueryResult<()> {
        let mut rows = Vec::new();
        {
            let mut child = self.child.lock().unwrap();
            child.init()?;
            while let Some((tuple, rid)) = child.next()? {
                let keys = sort_keys_of(&tuple, &self.order_by)?;
                rows.push((keys, tuple, rid));
            }
            child.close()?;
        }

        rows.sort_by(|a, b| compare_sort_keys(&a.0, &b.0, &self.order_by));

        self.output = Some(
            rows.into_iter()
                .map(|(_, tuple, rid)| (tuple, rid))
                .collect::<Vec<_>>()
                .into_iter(),
        );
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        Ok(self.output.as_mut().and_then(|output| output.next()))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.output = None;
        Ok(())
    }
}
