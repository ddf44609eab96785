// Limit Operator
//
// Passes through at most `limit` rows from its child.

use crate::common::types::Rid;
use crate::query::executor::operators::{BoxedOperator, Operator};
use crate::query::executor::result::{QueryResult, Tuple};

pub struct LimitOperator {
    child: BoxedOperator,
    limit: usize,
    emitted: usize,
}

impl LimitOperator {
    pub fn new(child: BoxedOperator, limit: usize) -> Self {
        Self {
            child,
            limit,
            emitted: 0,
        }
    }
}

impl Operator for LimitOperator {
    fn init(&mut self) -> QueryResult<()> {
        self.emitted = 0;
        self.child.lock().unwrap().init()
    }

    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>> {
        if self.emitted >= self.limit {
            return Ok(None);
        }
        match self.child.lock().unwrap().next()? {
            Some(row) => {
                self.emitted += 1;
                Ok(Some(row))
            }
            None => Ok(None),
        }
    }

    fn close(&mut self) -> QueryResult<()> {
        self.child.lock().unwrap().close()
    }
}
