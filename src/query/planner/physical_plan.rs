use crate::common::types::{IndexOid, TableOid};
use crate::query::executor::operators::join::JoinType;
use crate::query::executor::result::Tuple;
use crate::query::expression::{Expression, OrderDirection};

/// Physical plan tree handed to the operator builder
#[derive(Debug, Clone)]
pub enum PhysicalPlan {
    SeqScan {
        table_oid: TableOid,
        predicate: Option<Expression>,
    },
    IndexScan {
        index_oid: IndexOid,
    },
    Values {
        rows: Vec<Tuple>,
    },
    Insert {
        table_oid: TableOid,
        input: Box<PhysicalPlan>,
    },
    Delete {
        table_oid: TableOid,
        input: Box<PhysicalPlan>,
    },
    NestedLoopJoin {
        left: Box<PhysicalPlan>,
        right: Box<PhysicalPlan>,
        predicate: Expression,
        join_type: JoinType,
        right_width: usize,
    },
    NestedIndexJoin {
        input: Box<PhysicalPlan>,
        index_oid: IndexOid,
        key_expression: Expression,
        join_type: JoinType,
    },
    Sort {
        input: Box<PhysicalPlan>,
        order_by: Vec<(OrderDirection, Expression)>,
    },
    Limit {
        input: Box<PhysicalPlan>,
        limit: usize,
    },
    TopN {
        input: Box<PhysicalPlan>,
        limit: usize,
        order_by: Vec<(OrderDirection, Expression)>,
    },
    Aggregate {
        input: Box<PhysicalPlan>,
        group_by: Vec<Expression>,
        aggregates: Vec<crate::query::executor::operators::agg::AggregateExpression>,
    },
}
