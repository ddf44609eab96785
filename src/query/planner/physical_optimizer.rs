// Physical Optimizer
//
// A single rewrite is applied, bottom-up: a Limit directly over a Sort
// becomes a TopN, preserving the limit's row bound and the sort's
// orderings. Nothing else is touched.

use crate::query::planner::physical_plan::PhysicalPlan;

pub struct PhysicalOptimizer;

impl Default for PhysicalOptimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl PhysicalOptimizer {
    pub fn new() -> Self {
        PhysicalOptimizer
    }

    /// Optimize a physical plan
    pub fn optimize(&self, plan: PhysicalPlan) -> PhysicalPlan {
        self.rewrite_sort_limit_as_topn(plan)
    }

    fn rewrite_sort_limit_as_topn(&self, plan: PhysicalPlan) -> PhysicalPlan {
        // Children first, so nested limit/sort pairs collapse too
        let plan = match plan {
            PhysicalPlan::Insert { table_oid, input } => PhysicalPlan::Insert {
                table_oid,
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
            },
            PhysicalPlan::Delete { table_oid, input } => PhysicalPlan::Delete {
                table_oid,
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
            },
            PhysicalPlan::NestedLoopJoin {
                left,
                right,
                predicate,
                join_type,
                right_width,
            } => PhysicalPlan::NestedLoopJoin {
                left: Box::new(self.rewrite_sort_limit_as_topn(*left)),
                right: Box::new(self.rewrite_sort_limit_as_topn(*right)),
                predicate,
                join_type,
                right_width,
            },
            PhysicalPlan::NestedIndexJoin {
                input,
                index_oid,
                key_expression,
                join_type,
            } => PhysicalPlan::NestedIndexJoin {
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
                index_oid,
                key_expression,
                join_type,
            },
            PhysicalPlan::Sort { input, order_by } => PhysicalPlan::Sort {
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
                order_by,
            },
            PhysicalPlan::Limit { input, limit } => PhysicalPlan::Limit {
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
                limit,
            },
            PhysicalPlan::TopN {
                input,
                limit,
                order_by,
            } => PhysicalPlan::TopN {
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
                limit,
                order_by,
            },
            PhysicalPlan::Aggregate {
                input,
                group_by,
                aggregates,
            } => PhysicalPlan::Aggregate {
                input: Box::new(self.rewrite_sort_limit_as_topn(*input)),
                group_by,
                aggregates,
            },
            leaf => leaf,
        };

        // The rewrite itself
        if let PhysicalPlan::Limit { input, limit } = plan {
            if let PhysicalPlan::Sort { input, order_by } = *input {
                return PhysicalPlan::TopN {
                    input,
                    limit,
                    order_by,
                };
            }
            return PhysicalPlan::Limit { input, limit };
        }
        plan
    }
}
