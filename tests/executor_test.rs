use anyhow::Result;

mod common;
use common::{user_row, TestDb};

use karstdb::catalog::{Column, DataType, Schema};
use karstdb::query::executor::operators::agg::{AggregateExpression, AggregateType};
use karstdb::query::executor::operators::collect;
use karstdb::query::executor::operators::join::JoinType;
use karstdb::query::executor::result::{DataValue, Tuple};
use karstdb::query::expression::{CompareOp, Expression, OrderDirection};
use karstdb::query::planner::{build_operator, PhysicalOptimizer, PhysicalPlan};
use karstdb::transaction::{IsolationLevel, LockMode};

fn users_schema() -> Schema {
    Schema::new(vec![
        Column::new("id", DataType::Integer),
        Column::new("name", DataType::Text),
        Column::new("score", DataType::Integer),
    ])
}

/// Create the users table and insert the given rows through the insert
/// operator, committing the loading transaction.
fn setup_users(db: &TestDb, rows: Vec<Tuple>) -> Result<u32> {
    let table = db.catalog.create_table("users", users_schema())?;
    let expected = rows.len() as i64;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::Insert {
        table_oid: table.oid,
        input: Box::new(PhysicalPlan::Values { rows }),
    };
    let op = build_operator(&plan, &ctx)?;
    let result = collect(&op)?;
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].0.values[0], DataValue::Integer(expected));
    db.commit(&txn);
    Ok(table.oid)
}

fn default_rows() -> Vec<Tuple> {
    vec![
        user_row(1, "ada", 90),
        user_row(2, "grace", 70),
        user_row(3, "edsger", 85),
        user_row(4, "barbara", 95),
        user_row(5, "donald", 60),
    ]
}

#[test]
fn test_insert_then_seq_scan() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::SeqScan {
        table_oid,
        predicate: None,
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;

    assert_eq!(rows.len(), 5);
    let ids: Vec<i64> = rows
        .iter()
        .map(|(tuple, _)| match tuple.values[0] {
            DataValue::Integer(id) => id,
            _ => panic!("id must be an integer"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);

    // Repeatable read holds an IS table lock and an S lock per row
    assert_eq!(
        txn.table_lock_mode(table_oid),
        Some(LockMode::IntentionShared)
    );
    assert_eq!(txn.held_row_locks().len(), 5);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_seq_scan_with_predicate() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::SeqScan {
        table_oid,
        predicate: Some(Expression::compare(
            CompareOp::GtEq,
            Expression::column(2),
            Expression::literal(DataValue::Integer(85)),
        )),
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    let names: Vec<&str> = rows
        .iter()
        .map(|(tuple, _)| match &tuple.values[1] {
            DataValue::Text(name) => name.as_str(),
            _ => panic!("name must be text"),
        })
        .collect();
    assert_eq!(names, vec!["ada", "edsger", "barbara"]);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_read_committed_scan_releases_locks() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::SeqScan {
        table_oid,
        predicate: None,
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert_eq!(rows.len(), 5);

    // Row locks went as each read finished; the table lock at exhaustion
    assert!(txn.held_row_locks().is_empty());
    assert_eq!(txn.table_lock_mode(table_oid), None);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_read_uncommitted_scan_takes_no_locks() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let txn = db.begin(IsolationLevel::ReadUncommitted);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::SeqScan {
        table_oid,
        predicate: None,
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert_eq!(rows.len(), 5);
    assert!(txn.held_table_locks().is_empty());
    assert!(txn.held_row_locks().is_empty());
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_index_scan_returns_key_order() -> Result<()> {
    let db = TestDb::new(64)?;
    // Inserted out of id order on purpose
    let table_oid = setup_users(
        &db,
        vec![
            user_row(3, "edsger", 85),
            user_row(1, "ada", 90),
            user_row(2, "grace", 70),
        ],
    )?;
    let index = db.catalog.create_index("users_pk", "users", 0, 4, 5)?;
    assert_eq!(db.catalog.get_table_indexes("users").len(), 1);
    let _ = table_oid;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::IndexScan {
        index_oid: index.oid,
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    let ids: Vec<i64> = rows
        .iter()
        .map(|(tuple, _)| match tuple.values[0] {
            DataValue::Integer(id) => id,
            _ => panic!("id must be an integer"),
        })
        .collect();
    assert_eq!(ids, vec![1, 2, 3]);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_delete_with_predicate_and_index_maintenance() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;
    let index = db.catalog.create_index("users_pk", "users", 0, 4, 5)?;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::Delete {
        table_oid,
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid,
            predicate: Some(Expression::compare(
                CompareOp::Lt,
                Expression::column(2),
                Expression::literal(DataValue::Integer(80)),
            )),
        }),
    };
    let result = collect(&build_operator(&plan, &ctx)?)?;
    // grace (70) and donald (60) go
    assert_eq!(result[0].0.values[0], DataValue::Integer(2));
    db.commit(&txn);

    // A later transaction no longer sees them, in heap or index
    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let rows = collect(&build_operator(
        &PhysicalPlan::SeqScan {
            table_oid,
            predicate: None,
        },
        &ctx,
    )?)?;
    assert_eq!(rows.len(), 3);
    assert!(index.index.get(&2)?.is_empty());
    assert!(index.index.get(&5)?.is_empty());
    assert!(!index.index.get(&1)?.is_empty());
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_insert_visible_within_own_transaction() -> Result<()> {
    let db = TestDb::new(64)?;
    let table = db.catalog.create_table("users", users_schema())?;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);
    let insert = PhysicalPlan::Insert {
        table_oid: table.oid,
        input: Box::new(PhysicalPlan::Values {
            rows: vec![user_row(1, "ada", 90)],
        }),
    };
    collect(&build_operator(&insert, &ctx)?)?;

    // Same transaction scans its own write; the X row lock is already
    // held, so the scan must not self-block
    let rows = collect(&build_operator(
        &PhysicalPlan::SeqScan {
            table_oid: table.oid,
            predicate: None,
        },
        &ctx,
    )?)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        txn.table_lock_mode(table.oid),
        Some(LockMode::IntentionExclusive)
    );
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_nested_loop_join_inner_and_left() -> Result<()> {
    let db = TestDb::new(64)?;
    let users_oid = setup_users(
        &db,
        vec![
            user_row(1, "ada", 90),
            user_row(2, "grace", 70),
            user_row(3, "edsger", 85),
        ],
    )?;

    let orders = db.catalog.create_table(
        "orders",
        Schema::new(vec![
            Column::new("user_id", DataType::Integer),
            Column::new("total", DataType::Integer),
        ]),
    )?;
    {
        let txn = db.begin(IsolationLevel::RepeatableRead);
        let ctx = db.context(&txn);
        let plan = PhysicalPlan::Insert {
            table_oid: orders.oid,
            input: Box::new(PhysicalPlan::Values {
                rows: vec![
                    Tuple::new(vec![DataValue::Integer(1), DataValue::Integer(10)]),
                    Tuple::new(vec![DataValue::Integer(1), DataValue::Integer(20)]),
                    Tuple::new(vec![DataValue::Integer(3), DataValue::Integer(30)]),
                ],
            }),
        };
        collect(&build_operator(&plan, &ctx)?)?;
        db.commit(&txn);
    }

    // users.id == orders.user_id: combined columns 0 and 3
    let on = Expression::compare(CompareOp::Eq, Expression::column(0), Expression::column(3));

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let inner = PhysicalPlan::NestedLoopJoin {
        left: Box::new(PhysicalPlan::SeqScan {
            table_oid: users_oid,
            predicate: None,
        }),
        right: Box::new(PhysicalPlan::SeqScan {
            table_oid: orders.oid,
            predicate: None,
        }),
        predicate: on.clone(),
        join_type: JoinType::Inner,
        right_width: 2,
    };
    let rows = collect(&build_operator(&inner, &ctx)?)?;
    assert_eq!(rows.len(), 3);
    for (tuple, _) in &rows {
        assert_eq!(tuple.len(), 5);
        assert_eq!(tuple.values[0], tuple.values[3]);
    }

    let left = PhysicalPlan::NestedLoopJoin {
        left: Box::new(PhysicalPlan::SeqScan {
            table_oid: users_oid,
            predicate: None,
        }),
        right: Box::new(PhysicalPlan::SeqScan {
            table_oid: orders.oid,
            predicate: None,
        }),
        predicate: on,
        join_type: JoinType::Left,
        right_width: 2,
    };
    let rows = collect(&build_operator(&left, &ctx)?)?;
    // grace has no orders: one padded row extra
    assert_eq!(rows.len(), 4);
    let padded: Vec<_> = rows
        .iter()
        .filter(|(tuple, _)| tuple.values[3].is_null())
        .collect();
    assert_eq!(padded.len(), 1);
    assert_eq!(padded[0].0.values[1], DataValue::Text("grace".to_string()));
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_nested_index_join() -> Result<()> {
    let db = TestDb::new(64)?;
    setup_users(
        &db,
        vec![
            user_row(1, "ada", 90),
            user_row(2, "grace", 70),
            user_row(4, "barbara", 95),
        ],
    )?;
    let index = db.catalog.create_index("users_pk", "users", 0, 4, 5)?;

    let orders = db.catalog.create_table(
        "orders",
        Schema::new(vec![
            Column::new("user_id", DataType::Integer),
            Column::new("total", DataType::Integer),
        ]),
    )?;
    {
        let txn = db.begin(IsolationLevel::RepeatableRead);
        let ctx = db.context(&txn);
        let plan = PhysicalPlan::Insert {
            table_oid: orders.oid,
            input: Box::new(PhysicalPlan::Values {
                rows: vec![
                    Tuple::new(vec![DataValue::Integer(2), DataValue::Integer(11)]),
                    Tuple::new(vec![DataValue::Integer(4), DataValue::Integer(22)]),
                    Tuple::new(vec![DataValue::Integer(9), DataValue::Integer(33)]),
                ],
            }),
        };
        collect(&build_operator(&plan, &ctx)?)?;
        db.commit(&txn);
    }

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::NestedIndexJoin {
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid: orders.oid,
            predicate: None,
        }),
        index_oid: index.oid,
        // Probe the users index with orders.user_id
        key_expression: Expression::column(0),
        join_type: JoinType::Inner,
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert_eq!(rows.len(), 2);
    // orders tuple then the matched user tuple
    assert_eq!(rows[0].0.values[2], DataValue::Integer(2));
    assert_eq!(rows[0].0.values[3], DataValue::Text("grace".to_string()));

    // Left join keeps the unmatched order with NULL padding
    let plan = PhysicalPlan::NestedIndexJoin {
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid: orders.oid,
            predicate: None,
        }),
        index_oid: index.oid,
        key_expression: Expression::column(0),
        join_type: JoinType::Left,
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert_eq!(rows.len(), 3);
    let unmatched: Vec<_> = rows
        .iter()
        .filter(|(tuple, _)| tuple.values[2].is_null())
        .collect();
    assert_eq!(unmatched.len(), 1);
    assert_eq!(unmatched[0].0.values[0], DataValue::Integer(9));
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_sort_asc_and_desc() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);

    let by_score_desc = PhysicalPlan::Sort {
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid,
            predicate: None,
        }),
        order_by: vec![(OrderDirection::Desc, Expression::column(2))],
    };
    let rows = collect(&build_operator(&by_score_desc, &ctx)?)?;
    let scores: Vec<i64> = rows
        .iter()
        .map(|(tuple, _)| match tuple.values[2] {
            DataValue::Integer(score) => score,
            _ => panic!("score must be an integer"),
        })
        .collect();
    assert_eq!(scores, vec![95, 90, 85, 70, 60]);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_optimizer_pipeline_top_n() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    // limit(2) over sort(score desc) rewrites to top_n and returns the
    // two best scores
    let plan = PhysicalPlan::Limit {
        input: Box::new(PhysicalPlan::Sort {
            input: Box::new(PhysicalPlan::SeqScan {
                table_oid,
                predicate: None,
            }),
            order_by: vec![(OrderDirection::Desc, Expression::column(2))],
        }),
        limit: 2,
    };
    let optimized = PhysicalOptimizer::new().optimize(plan);
    assert!(matches!(&optimized, PhysicalPlan::TopN { .. }));

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let rows = collect(&build_operator(&optimized, &ctx)?)?;
    let names: Vec<&str> = rows
        .iter()
        .map(|(tuple, _)| match &tuple.values[1] {
            DataValue::Text(name) => name.as_str(),
            _ => panic!("name must be text"),
        })
        .collect();
    assert_eq!(names, vec!["barbara", "ada"]);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_top_n_ties_and_ascending() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::TopN {
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid,
            predicate: None,
        }),
        limit: 3,
        order_by: vec![(OrderDirection::Asc, Expression::column(2))],
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    let scores: Vec<i64> = rows
        .iter()
        .map(|(tuple, _)| match tuple.values[2] {
            DataValue::Integer(score) => score,
            _ => panic!("score must be an integer"),
        })
        .collect();
    assert_eq!(scores, vec![60, 70, 85]);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_aggregation_with_groups() -> Result<()> {
    let db = TestDb::new(64)?;
    let table = db.catalog.create_table(
        "points",
        Schema::new(vec![
            Column::new("bucket", DataType::Integer),
            Column::new("value", DataType::Integer),
        ]),
    )?;
    {
        let txn = db.begin(IsolationLevel::RepeatableRead);
        let ctx = db.context(&txn);
        let rows = vec![
            Tuple::new(vec![DataValue::Integer(0), DataValue::Integer(5)]),
            Tuple::new(vec![DataValue::Integer(1), DataValue::Integer(7)]),
            Tuple::new(vec![DataValue::Integer(0), DataValue::Integer(3)]),
            Tuple::new(vec![DataValue::Integer(1), DataValue::Integer(11)]),
            Tuple::new(vec![DataValue::Integer(0), DataValue::Null]),
        ];
        let plan = PhysicalPlan::Insert {
            table_oid: table.oid,
            input: Box::new(PhysicalPlan::Values { rows }),
        };
        collect(&build_operator(&plan, &ctx)?)?;
        db.commit(&txn);
    }

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let plan = PhysicalPlan::Aggregate {
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid: table.oid,
            predicate: None,
        }),
        group_by: vec![Expression::column(0)],
        aggregates: vec![
            AggregateExpression::count_star(),
            AggregateExpression::new(AggregateType::Count, Expression::column(1)),
            AggregateExpression::new(AggregateType::Sum, Expression::column(1)),
            AggregateExpression::new(AggregateType::Min, Expression::column(1)),
            AggregateExpression::new(AggregateType::Max, Expression::column(1)),
        ],
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert_eq!(rows.len(), 2);

    // Insertion order: bucket 0 first
    let bucket0 = &rows[0].0.values;
    assert_eq!(bucket0[0], DataValue::Integer(0));
    assert_eq!(bucket0[1], DataValue::Integer(3)); // count(*) sees the NULL row
    assert_eq!(bucket0[2], DataValue::Integer(2)); // count(value) does not
    assert_eq!(bucket0[3], DataValue::Integer(8));
    assert_eq!(bucket0[4], DataValue::Integer(3));
    assert_eq!(bucket0[5], DataValue::Integer(5));

    let bucket1 = &rows[1].0.values;
    assert_eq!(bucket1[0], DataValue::Integer(1));
    assert_eq!(bucket1[2], DataValue::Integer(2));
    assert_eq!(bucket1[3], DataValue::Integer(18));
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_aggregation_empty_input_emits_initial_values() -> Result<()> {
    let db = TestDb::new(64)?;
    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);

    let plan = PhysicalPlan::Aggregate {
        input: Box::new(PhysicalPlan::Values { rows: vec![] }),
        group_by: vec![],
        aggregates: vec![
            AggregateExpression::count_star(),
            AggregateExpression::new(AggregateType::Sum, Expression::column(0)),
            AggregateExpression::new(AggregateType::Min, Expression::column(0)),
        ],
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert_eq!(rows.len(), 1);
    assert_eq!(
        rows[0].0.values,
        vec![DataValue::Integer(0), DataValue::Null, DataValue::Null]
    );

    // With a group-by list, empty input yields no groups at all
    let plan = PhysicalPlan::Aggregate {
        input: Box::new(PhysicalPlan::Values { rows: vec![] }),
        group_by: vec![Expression::column(0)],
        aggregates: vec![AggregateExpression::count_star()],
    };
    let rows = collect(&build_operator(&plan, &ctx)?)?;
    assert!(rows.is_empty());
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_limit_without_sort_stays_limit() -> Result<()> {
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;

    let plan = PhysicalPlan::Limit {
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid,
            predicate: None,
        }),
        limit: 2,
    };
    let optimized = PhysicalOptimizer::new().optimize(plan);
    assert!(matches!(&optimized, PhysicalPlan::Limit { .. }));

    let txn = db.begin(IsolationLevel::ReadCommitted);
    let ctx = db.context(&txn);
    let rows = collect(&build_operator(&optimized, &ctx)?)?;
    assert_eq!(rows.len(), 2);
    db.commit(&txn);
    Ok(())
}

#[test]
fn test_update_like_delete_then_insert_via_index() -> Result<()> {
    // Exercises the full write path twice over the same keys
    let db = TestDb::new(64)?;
    let table_oid = setup_users(&db, default_rows())?;
    let index = db.catalog.create_index("users_pk", "users", 0, 4, 5)?;

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let ctx = db.context(&txn);

    let delete = PhysicalPlan::Delete {
        table_oid,
        input: Box::new(PhysicalPlan::SeqScan {
            table_oid,
            predicate: Some(Expression::column_equals_int(0, 3)),
        }),
    };
    collect(&build_operator(&delete, &ctx)?)?;

    let insert = PhysicalPlan::Insert {
        table_oid,
        input: Box::new(PhysicalPlan::Values {
            rows: vec![user_row(3, "edsger", 99)],
        }),
    };
    collect(&build_operator(&insert, &ctx)?)?;
    db.commit(&txn);

    let txn = db.begin(IsolationLevel::RepeatableRead);
    let rids = index.index.get(&3)?;
    assert_eq!(rids.len(), 1);
    let bytes = db.catalog.get_table(table_oid).unwrap().heap.get_tuple(rids[0])?;
    let tuple = Tuple::from_bytes(&bytes)?;
    assert_eq!(tuple.values[2], DataValue::Integer(99));
    db.commit(&txn);
    Ok(())
}
