use std::cmp::Ordering;

use crate::query::executor::result::{DataValue, QueryError, QueryResult, Tuple};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

/// Minimal expression tree over positional tuples
#[derive(Debug, Clone)]
pub enum Expression {
    /// Value of the column at this position
    Column(usize),
    Literal(DataValue),
    Compare {
        op: CompareOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    And(Box<Expression>, Box<Expression>),
    Or(Box<Expression>, Box<Expression>),
}

impl Expression {
    pub fn column(index: usize) -> Self {
        Expression::Column(index)
    }

    pub fn literal(value: DataValue) -> Self {
        Expression::Literal(value)
    }

    pub fn compare(op: CompareOp, left: Expression, right: Expression) -> Self {
        Expression::Compare {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// column == integer literal, the workhorse of the tests
    pub fn column_equals_int(index: usize, value: i64) -> Self {
        Self::compare(
            CompareOp::Eq,
            Expression::Column(index),
            Expression::Literal(DataValue::Integer(value)),
        )
    }

    pub fn evaluate(&self, tuple: &Tuple) -> QueryResult<DataValue> {
        match self {
            Expression::Column(index) => tuple.get(*index).cloned().ok_or_else(|| {
                QueryError::ExecutionError(format!("column {} out of bounds", index))
            }),
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Compare { op, left, right } => {
                let lv = left.evaluate(tuple)?;
                let rv = right.evaluate(tuple)?;
                Ok(Self::apply_compare(*op, &lv, &rv))
            }
            Expression::And(left, right) => {
                let lv = left.evaluate(tuple)?;
                let rv = right.evaluate(tuple)?;
                Ok(DataValue::Boolean(lv.is_true() && rv.is_true()))
            }
            Expression::Or(left, right) => {
                let lv = left.evaluate(tuple)?;
                let rv = right.evaluate(tuple)?;
                Ok(DataValue::Boolean(lv.is_true() || rv.is_true()))
            }
        }
    }

    /// Evaluate against the concatenation of a left and right tuple;
    /// column positions index the combined row.
    pub fn evaluate_join(&self, left: &Tuple, right: &Tuple) -> QueryResult<DataValue> {
        match self {
            Expression::Column(index) => {
                let value = if *index < left.len() {
                    left.get(*index)
                } else {
                    right.get(*index - left.len())
                };
                value.cloned().ok_or_else(|| {
                    QueryError::ExecutionError(format!("join column {} out of bounds", index))
                })
            }
            Expression::Literal(value) => Ok(value.clone()),
            Expression::Compare { op, left: l, right: r } => {
                let lv = l.evaluate_join(left, right)?;
                let rv = r.evaluate_join(left, right)?;
                Ok(Self::apply_compare(*op, &lv, &rv))
            }
            Expression::And(l, r) => {
                let lv = l.evaluate_join(left, right)?;
                let rv = r.evaluate_join(left, right)?;
                Ok(DataValue::Boolean(lv.is_true() && rv.is_true()))
            }
            Expression::Or(l, r) => {
                let lv = l.evaluate_join(left, right)?;
                let rv = r.evaluate_join(left, right)?;
                Ok(DataValue::Boolean(lv.is_true() || rv.is_true()))
            }
        }
    }

    /// NULL operands make every comparison NULL
    fn apply_compare(op: CompareOp, left: &DataValue, right: &DataValue) -> DataValue {
        if left.is_null() || right.is_null() {
            return DataValue::Null;
        }
        let ordering = left.compare(right);
        let result = match op {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        };
        DataValue::Boolean(result)
    }
}

/// Sort direction for order-by expressions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tuple(values: Vec<DataValue>) -> Tuple {
        Tuple::new(values)
    }

    #[test]
    fn test_column_and_literal() {
        let t = tuple(vec![DataValue::Integer(7), DataValue::Text("a".into())]);
        assert_eq!(
            Expression::column(0).evaluate(&t).unwrap(),
            DataValue::Integer(7)
        );
        assert_eq!(
            Expression::literal(DataValue::Boolean(true))
                .evaluate(&t)
                .unwrap(),
            DataValue::Boolean(true)
        );
        assert!(Expression::column(5).evaluate(&t).is_err());
    }

    #[test]
    fn test_comparisons() {
        let t = tuple(vec![DataValue::Integer(10)]);
        assert!(Expression::column_equals_int(0, 10)
            .evaluate(&t)
            .unwrap()
            .is_true());
        assert!(!Expression::column_equals_int(0, 11)
            .evaluate(&t)
            .unwrap()
            .is_true());

        let lt = Expression::compare(
            CompareOp::Lt,
            Expression::column(0),
            Expression::literal(DataValue::Integer(20)),
        );
        assert!(lt.evaluate(&t).unwrap().is_true());
    }

    #[test]
    fn test_null_comparison_is_null() {
        let t = tuple(vec![DataValue::Null]);
        let expr = Expression::column_equals_int(0, 1);
        let result = expr.evaluate(&t).unwrap();
        assert!(result.is_null());
        assert!(!result.is_true());
    }

    #[test]
    fn test_join_columns_span_both_sides() {
        let left = tuple(vec![DataValue::Integer(1), DataValue::Integer(2)]);
        let right = tuple(vec![DataValue::Integer(2), DataValue::Integer(9)]);

        // left.1 == right.0, i.e. combined columns 1 and 2
        let on = Expression::compare(
            CompareOp::Eq,
            Expression::column(1),
            Expression::column(2),
        );
        assert!(on.evaluate_join(&left, &right).unwrap().is_true());

        let off = Expression::compare(
            CompareOp::Eq,
            Expression::column(0),
            Expression::column(3),
        );
        assert!(!off.evaluate_join(&left, &right).unwrap().is_true());
    }

    #[test]
    fn test_and_or() {
        let t = tuple(vec![DataValue::Integer(5)]);
        let both = Expression::And(
            Box::new(Expression::column_equals_int(0, 5)),
            Box::new(Expression::literal(DataValue::Boolean(true))),
        );
        assert!(both.evaluate(&t).unwrap().is_true());

        let either = Expression::Or(
            Box::new(Expression::column_equals_int(0, 6)),
            Box::new(Expression::column_equals_int(0, 5)),
        );
        assert!(either.evaluate(&t).unwrap().is_true());
    }
}
