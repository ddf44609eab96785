pub mod nested_index;
pub mod nested_loop;

pub use nested_index::NestedIndexJoinOperator;
pub use nested_loop::NestedLoopJoinOperator;

/// Supported join types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinType {
    Inner,
    Left,
}

use crate::query::executor::result::{DataValue, Tuple};

/// Combine a left and right tuple into one output row
pub(crate) fn concat(left: &Tuple, right: &Tuple) -> Tuple {
    let mut values = left.values.clone();
    values.extend(right.values.iter().cloned());
    Tuple::new(values)
}

/// Left tuple padded with NULLs for a missing right side
pub(crate) fn concat_nulls(left: &Tuple, right_width: usize) -> Tuple {
    let mut values = left.values.clone();
    values.extend(std::iter::repeat(DataValue::Null).take(right_width));
    Tuple::new(values)
}
