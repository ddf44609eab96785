use crate::common::types::Rid;
use crate::query::executor::operators::Operator;
use crate::query::executor::result::{QueryResult, Tuple};

/// Leaf source emitting a fixed list of literal rows; feeds the insert
/// operator and tests.
pub struct ValuesOperator {
    rows: Vec<Tuple>,
    cursor: usize,
}

impl ValuesOperator {
    pub fn new(rows: Vec<Tuple>) -> Self {
        Self { rows, cursor: 0 }
    }
}

impl Operator for ValuesOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.cursor = 0;
        Ok(())
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.cursor < self.rows.len() {
            let tuple = self.rows[self.cursor].clone();
            self.cursor += 1;
            Ok(Some((tuple, Rid::INVALID)))
        } else {
            Ok(None)
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.cursor = self.rows.len();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::executor::result::DataValue;

    #[test]
    fn test_values_emits_rows_in_order() {
        let rows = vec![
            Tuple::new(vec![DataValue::Integer(1)]),
            Tuple::new(vec![DataValue::Integer(2)]),
        ];
        let mut op = ValuesOperator::new(rows);
        op.init().unwrap();

        let (first, rid) = op.next().unwrap().unwrap();
        assert_eq!(first.values[0], DataValue::Integer(1));
        assert!(!rid.is_valid());
        let (second, _) = op.next().unwrap().unwrap();
        assert_eq!(second.values[0], DataValue::Integer(2));
        assert!(op.next().unwrap().is_none());
        op.close().unwrap();
    }
}
