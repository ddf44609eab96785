// Query Operators Module
//
// Pull-based operators for the iterator execution model. Each operator
// produces (tuple, rid) pairs; rids matter because row locks and the
// insert/delete compensations key on them.

pub mod agg;
pub mod delete;
pub mod index_scan;
pub mod insert;
pub mod join;
pub mod limit;
pub mod scan;
pub mod sort;
pub mod topn;
pub mod values;

use std::sync::{Arc, Mutex};

use crate::common::types::Rid;
use crate::query::executor::result::{QueryResult, Tuple};

/// The Operator trait defines the interface for all query execution
/// operators: `init` once, then `next` until it yields `None`.
pub trait Operator: Send {
    /// Initialize the operator before execution
    fn init(&mut self) -> QueryResult<()>;

    /// Get the next (tuple, rid) pair from this operator
    fn next(&mut self) -> QueryResult<Option<(Tuple, Rid)>>;

    /// Close the operator and release any resources
    fn close(&mut self) -> QueryResult<()>;
}

/// Operators are shared as reference-counted trait objects so plan trees
/// can be assembled and handed between threads.
pub type BoxedOperator = Arc<Mutex<dyn Operator + Send>>;

pub fn boxed(op: impl Operator + 'static) -> BoxedOperator {
    Arc::new(Mutex::new(op))
}

/// Drain an operator into a vector: init, pull until exhausted, close
pub fn collect(op: &BoxedOperator) -> QueryResult<Vec<(Tuple, Rid)>> {
    let mut guard = op.lock().unwrap();
    guard.init()?;
    let mut rows = Vec::new();
    while let Some(row) = guard.next()? {
        rows.push(row);
    }
    guard.close()?;
    Ok(rows)
}
