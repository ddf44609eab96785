pub mod context;
pub mod operators;
pub mod result;

pub use context::ExecutorContext;
pub use operators::{BoxedOperator, Operator};
pub use result::{DataValue, QueryError, QueryResult, Tuple};
