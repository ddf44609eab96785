// Operator Builder
//
// Turns a physical plan tree into the matching operator tree.

use crate::query::executor::context::ExecutorContext;
use crate::query::executor::operators::agg::HashAggregateOperator;
use crate::query::executor::operators::delete::DeleteOperator;
use crate::query::executor::operators::index_scan::IndexScanOperator;
use crate::query::executor::operators::insert::InsertOperator;
use crate::query::executor::operators::join::{NestedIndexJoinOperator, NestedLoopJoinOperator};
use crate::query::executor::operators::limit::LimitOperator;
use crate::query::executor::operators::scan::SeqScanOperator;
use crate::query::executor::operators::sort::SortOperator;
use crate::query::executor::operators::topn::TopNOperator;
use crate::query::executor::operators::values::ValuesOperator;
use crate::query::executor::operators::{boxed, BoxedOperator};
use crate::query::executor::result::QueryResult;
use crate::query::planner::physical_plan::PhysicalPlan;

/// Build the operator tree for `plan` inside `ctx`'s transaction
pub fn build_operator(plan: &PhysicalPlan, ctx: &ExecutorContext) -> QueryResult<BoxedOperator> {
    let operator = match plan {
        PhysicalPlan::SeqScan {
            table_oid,
            predicate,
        } => boxed(SeqScanOperator::new(
            ctx.clone(),
            *table_oid,
            predicate.clone(),
        )),
        PhysicalPlan::IndexScan { index_oid } => {
            boxed(IndexScanOperator::new(ctx.clone(), *index_oid))
        }
        PhysicalPlan::Values { rows } => boxed(ValuesOperator::new(rows.clone())),
        PhysicalPlan::Insert { table_oid, input } => {
            let child = build_operator(input, ctx)?;
            boxed(InsertOperator::new(ctx.clone(), *table_oid, child))
        }
        PhysicalPlan::Delete { table_oid, input } => {
            let child = build_operator(input, ctx)?;
            boxed(DeleteOperator::new(ctx.clone(), *table_oid, child))
        }
        PhysicalPlan::NestedLoopJoin {
            left,
            right,
            predicate,
            join_type,
            right_width,
        } => {
            let left = build_operator(left, ctx)?;
            let right = build_operator(right, ctx)?;
            boxed(NestedLoopJoinOperator::new(
                left,
                right,
                predicate.clone(),
                *join_type,
                *right_width,
            ))
        }
        PhysicalPlan::NestedIndexJoin {
            input,
            index_oid,
            key_expression,
            join_type,
        } => {
            let child = build_operator(input, ctx)?;
            boxed(NestedIndexJoinOperator::new(
                ctx.clone(),
                child,
                *index_oid,
                key_expression.clone(),
                *join_type,
            ))
        }
        PhysicalPlan::Sort { input, order_by } => {
            let child = build_operator(input, ctx)?;
            boxed(SortOperator::new(child, order_by.clone()))
        }
        PhysicalPlan::Limit { input, limit } => {
            let child = build_operator(input, ctx)?;
            boxed(LimitOperator::new(child, *limit))
        }
        PhysicalPlan::TopN {
            input,
            limit,
            order_by,
        } => {
            let child = build_operator(input, ctx)?;
            boxed(TopNOperator::new(child, *limit, order_by.clone()))
        }
        PhysicalPlan::Aggregate {
            input,
            group_by,
            aggregates,
        } => {
            let child = build_operator(input, ctx)?;
            boxed(HashAggregateOperator::new(
                child,
                group_by.clone(),
                aggregates.clone(),
            ))
        }
    };
    Ok(operator)
}
