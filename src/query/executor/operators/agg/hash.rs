// Hash-based Aggregation Operator
//
// Builds a hash table keyed by the group-by tuple at init and combines
// each input row into the running aggregates of its group. The map keeps
// insertion order so output is deterministic.

use linked_hash_map::LinkedHashMap;

use crate::common::types::Rid;
use crate::query::executor::operators::agg::AggregateType;
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{DataValue, QueryError, QueryResult, Tuple};
use crate::query::expression::Expression;

/// One aggregate in the output: the function plus its argument
/// (COUNT(*) has none)
#[derive(Debug, Clone)]
pub struct AggregateExpression {
    pub agg_type: AggregateType,
    pub argument: Option<Expression>,
}

impl AggregateExpression {
    pub fn count_star() -> Self {
        Self {
            agg_type: AggregateType::CountStar,
            argument: None,
        }
    }

    pub fn new(agg_type: AggregateType, argument: Expression) -> Self {
        Self {
            agg_type,
            argument: Some(argument),
        }
    }
}

/// Running state of one aggregate within one group
#[derive(Debug, Clone)]
struct AggregateValue {
    agg_type: AggregateType,
    count: i64,
    accumulator: DataValue,
}

impl AggregateValue {
    fn new(agg_type: AggregateType) -> Self {
        Self {
            agg_type,
            count: 0,
            accumulator: Self::initial(agg_type),
        }
    }

    /// Starting value: 0 for the counts, NULL for SUM/MIN/MAX
    fn initial(agg_type: AggregateType) -> DataValue {
        match agg_type {
            AggregateType::CountStar | AggregateType::Count => DataValue::Integer(0),
            _ => DataValue::Null,
        }
    }

    fn update(&mut self, value: DataValue) -> QueryResult<()> {
        match self.agg_type {
            AggregateType::CountStar => {
                self.count += 1;
                self.accumulator = DataValue::Integer(self.count);
            }
            AggregateType::Count => {
                if !value.is_null() {
                    self.count += 1;
                    self.accumulator = DataValue::Integer(self.count);
                }
            }
            AggregateType::Sum => {
                if value.is_null() {
                    return Ok(());
                }
                self.accumulator = match (&self.accumulator, &value) {
                    (DataValue::Null, v) => v.clone(),
                    (DataValue::Integer(a), DataValue::Integer(b)) => {
                        DataValue::Integer(a.checked_add(*b).ok_or_else(|| {
                            QueryError::TypeError("integer overflow in SUM".to_string())
                        })?)
                    }
                    (DataValue::Float(a), DataValue::Float(b)) => DataValue::Float(a + b),
                    (DataValue::Integer(a), DataValue::Float(b)) => {
                        DataValue::Float(*a as f64 + b)
                    }
                    (DataValue::Float(a), DataValue::Integer(b)) => {
                        DataValue::Float(a + *b as f64)
                    }
                    (a, b) => {
                        return Err(QueryError::TypeError(format!(
                            "cannot SUM {} and {}",
                            a, b
                        )))
                    }
                };
            }
            AggregateType::Min => {
                if value.is_null() {
                    return Ok(());
                }
                if self.accumulator.is_null()
                    || value.compare(&self.accumulator) == std::cmp::Ordering::Less
                {
                    self.accumulator = value;
                }
            }
            AggregateType::Max => {
                if value.is_null() {
                    return Ok(());
                }
                if self.accumulator.is_null()
                    || value.compare(&self.accumulator) == std::cmp::Ordering::Greater
                {
                    self.accumulator = value;
                }
            }
        }
        Ok(())
    }

    fn result(&self) -> DataValue {
        self.accumulator.clone()
    }
}

type GroupKey = Vec<DataValue>;

pub struct HashAggregateOperator {
    child: BoxedOperator,
    group_by: Vec<Expression>,
    aggregates: Vec<AggregateExpression>,
    output: Option<std::vec::IntoIter<Tuple>>,
}

impl HashAggregateOperator {
    pub fn new(
        child: BoxedOperator,
        group_by: Vec<Expression>,
        aggregates: Vec<AggregateExpression>,
    ) -> Self {
        Self {
            child,
            group_by,
            aggregates,
            output: None,
        }
    }
}

impl Operator for HashAggregateOperator {
    fn init(&mut self) -> QueryResult<()> {
        let mut groups: LinkedHashMap<GroupKey, Vec<AggregateValue>> = LinkedHashMap::new();

        {
            let mut child = self.child.lock().unwrap();
            child.init()?;
            while let Some((tuple, _)) = child.next()? {
                let key: GroupKey = self
                    .group_by
                    .iter()
                    .map(|expr| expr.evaluate(&tuple))
                    .collect::<QueryResult<_>>()?;

                let aggregates = &self.aggregates;
                let values = groups.entry(key).or_insert_with(|| {
                    aggregates
                        .iter()
                        .map(|agg| AggregateValue::new(agg.agg_type))
                        .collect()
                });

                for (value, agg) in values.iter_mut().zip(self.aggregates.iter()) {
                    let input = match &agg.argument {
                        Some(expr) => expr.evaluate(&tuple)?,
                        None => DataValue::Integer(1),
                    };
                    value.update(input)?;
                }
            }
            child.close()?;
        }

        let mut rows = Vec::with_capacity(groups.len());
        if groups.is_empty() && self.group_by.is_empty() {
            // No input and nothing to group by: one row of initial values
            let values = self
                .aggregates
                .iter()
                .map(|agg| AggregateValue::initial(agg.agg_type))
                .collect();
            rows.push(Tuple::new(values));
        } else {
            for (key, values) in groups {
                let mut out = key;
                out.extend(values.iter().map(|v| v.result()));
                rows.push(Tuple::new(out));
            }
        }

        self.output = Some(rows.into_iter());
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        Ok(self
            .output
            .as_mut()
            .and_then(|output| output.next())
            .map(|tuple| (tuple, Rid::INVALID)))
    }

    fn close(&mut self) -> QueryResult<()> {
        self.output = None;
        Ok(())
    }
}
