// Nested Loop Join Operator
//
// Materializes the right side at init and streams the left side,
// evaluating the join predicate over the concatenated row. Inner and left
// joins only; locking is whatever the children do.

use crate::common::types::Rid;
use crate::query::executor::operators::join::{concat, concat_nulls, JoinType};
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{QueryResult, Tuple};
use crate::query::expression::Expression;

pub struct NestedLoopJoinOperator {
    left: BoxedOperator,
    right: BoxedOperator,
    predicate: Expression,
    join_type: JoinType,
    /// Column count of the right side, for NULL padding in left joins
    right_width: usize,
    right_rows: Vec<Tuple>,
    current_left: Option<Tuple>,
    right_cursor: usize,
    found_match: bool,
}

impl NestedLoopJoinOperator {
    pub fn new(
        left: BoxedOperator,
        right: BoxedOperator,
        predicate: Expression,
        join_type: JoinType,
        right_width: usize,
    ) -> Self {
        Self {
            left,
            right,
            predicate,
            join_type,
            right_width,
            right_rows: Vec::new(),
            current_left: None,
            right_cursor: 0,
            found_match: false,
        }
    }

    fn advance_left(&mut self) -> QueryResult<()> {
        self.current_left = self
            .left
            .lock()
            .unwrap()
            .next()?
            .map(|(tuple, _)| tuple);
        self.right_cursor = 0;
        self.found_match = false;
        Ok(())
    }
}

impl Operator for NestedLoopJoinOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.left.lock().unwrap().init()?;

        // Pull the inner side once; it is rescanned per outer row
        self.right_rows.clear();
        {
            let mut right = self.right.lock().unwrap();
            right.init()?;
            while let Some((tuple, _)) = right.next()? {
                self.right_rows.push(tuple);
            }
            right.close()?;
        }

        self.advance_left()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        loop {
            let Some(left_tuple) = &self.current_left else {
                return Ok(None);
            };

            if self.right_cursor < self.right_rows.len() {
                let right_tuple = &self.right_rows[self.right_cursor];
                self.right_cursor += 1;

                if self
                    .predicate
                    .evaluate_join(left_tuple, right_tuple)?
                    .is_true()
                {
                    self.found_match = true;
                    let joined = concat(left_tuple, right_tuple);
                    return Ok(Some((joined, Rid::INVALID)));
                }
                continue;
            }

            // Right side exhausted for this outer row
            let emit_padded = self.join_type == JoinType::Left && !self.found_match;
            let padded = if emit_padded {
                Some(concat_nulls(left_tuple, self.right_width))
            } else {
                None
            };

            self.advance_left()?;
            if let Some(padded) = padded {
                return Ok(Some((padded, Rid::INVALID)));
            }
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.left.lock().unwrap().close()?;
        self.right_rows.clear();
        self.current_left = None;
        Ok(())
    }
}
