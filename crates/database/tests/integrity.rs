//! Integration tests for constraints, relations and rollback.

mod common;

use common::*;
use marrow_core::schema::TableBuilder;
use marrow_core::{DataType, Error, Key, Row, Value};
use marrow_database::{
    Database, IndexRef, KeyConverter, LookupPlan, RangePlan, RelationOptions, ScanPlan, Table,
    Updater,
};
use marrow_storage::{FnConstraint, MaxLength};
use proptest::prelude::*;
use std::sync::Arc;

#[test]
fn test_duplicate_key_leaves_count_unchanged() {
    let (db, groups, _) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| ctx.executor().insert(&groups, group(1, "admins")))
        .unwrap();

    let err = db
        .transact(|ctx| ctx.executor().insert(&groups, group(1, "others")))
        .unwrap_err();
    assert!(matches!(err, Error::UniqueConstraint { .. }));
    assert_eq!(groups.len(), 1);
    assert_eq!(groups.index_len(0), 1);
    assert_eq!(groups.index_len(1), 1);
}

#[test]
fn test_secondary_unique_violation_undoes_primary_insert() {
    let (db, groups, _) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| ctx.executor().insert(&groups, group(1, "admins")))
        .unwrap();

    let ctx = db.context(db.begin());
    let err = ctx
        .executor()
        .insert(&groups, group(2, "admins"))
        .unwrap_err();
    match err {
        Error::UniqueConstraint { index, .. } => assert_eq!(index, "uq_group_name"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(groups.index_len(0), 1);
    assert!(!groups.contains_key(0, &Key::from(2i64)));

    // The failed insert does not poison the transaction.
    ctx.executor().insert(&groups, group(2, "users")).unwrap();
    ctx.transaction().commit().unwrap();
    assert_eq!(ids(&groups), vec![1, 2]);
}

#[test]
fn test_range_scans_over_ordered_index() {
    let db = database();
    let numbers = db
        .create_table(
            TableBuilder::new("numbers")
                .unwrap()
                .add_column("n", DataType::Int64)
                .unwrap()
                .add_primary_key(&["n"], false)
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
    db.transact(|ctx| {
        let rows = [1i64, 3, 5, 7]
            .iter()
            .map(|&n| Row::create(vec![Value::Int64(n)]))
            .collect();
        ctx.executor().insert_many(&numbers, rows)
    })
    .unwrap();

    let values = |rows: Vec<Arc<Row>>| -> Vec<i64> {
        rows.iter()
            .filter_map(|r| r.get(0).and_then(Value::as_i64))
            .collect()
    };
    db.transact(|ctx| {
        let exec = ctx.executor();
        let between = RangePlan::between(Arc::clone(&numbers), 0, 3i64, 7i64, false, true);
        assert_eq!(values(exec.query(&between)?), vec![3, 5]);
        let greater = RangePlan::greater(Arc::clone(&numbers), 0, 5i64, true);
        assert_eq!(values(exec.query(&greater)?), vec![7]);
        let less = RangePlan::less(Arc::clone(&numbers), 0, 3i64, false);
        assert_eq!(values(exec.query(&less)?), vec![1, 3]);
        Ok(())
    })
    .unwrap();
}

#[test]
fn test_foreign_key_enforced_on_insert() {
    let (db, groups, members) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        exec.insert(&groups, group(2, "users"))
    })
    .unwrap();

    let err = db
        .transact(|ctx| ctx.executor().insert(&members, member(Some(3), "ghost")))
        .unwrap_err();
    match err {
        Error::ForeignKeyViolation {
            relation,
            primary_table,
            foreign_table,
            key,
        } => {
            assert_eq!(relation, "group_members");
            assert_eq!(primary_table, GROUPS);
            assert_eq!(foreign_table, MEMBERS);
            assert_eq!(key, Key::from(3i64));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(members.len(), 0);
}

#[test]
fn test_cascaded_deletion() {
    let (db, groups, members) = groups_and_members(RelationOptions::cascading());
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        exec.insert(&groups, group(2, "users"))?;
        exec.insert(&members, member(Some(1), "ann"))?;
        exec.insert(&members, member(Some(1), "bob"))?;
        exec.insert(&members, member(Some(2), "cid"))
    })
    .unwrap();

    db.transact(|ctx| ctx.executor().delete_entity(&groups, &group(1, "admins")))
        .unwrap();
    assert_eq!(ids(&groups), vec![2]);
    assert_eq!(members.len(), 1);

    db.transact(|ctx| ctx.executor().delete_by_key(&groups, 2i64))
        .unwrap();
    assert_eq!(groups.len(), 0);
    assert_eq!(members.len(), 0);
}

#[test]
fn test_referenced_row_is_protected_without_cascade() {
    let (db, groups, members) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        exec.insert(&members, member(Some(1), "ann"))
    })
    .unwrap();

    let err = db
        .transact(|ctx| ctx.executor().delete_by_key(&groups, 1i64))
        .unwrap_err();
    assert!(matches!(err, Error::ForeignKeyViolation { .. }));
    assert_eq!(groups.len(), 1);
    assert_eq!(members.len(), 1);

    // Once nothing refers to it the row can go.
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.delete(&members, &ScanPlan::new(Arc::clone(&members)))?;
        exec.delete_by_key(&groups, 1i64)
    })
    .unwrap();
    assert!(groups.is_empty());
}

#[test]
fn test_cascade_follows_relation_chains() {
    let (db, groups, members) = groups_and_members(RelationOptions::cascading());
    let badges = db
        .create_table(
            TableBuilder::new("badges")
                .unwrap()
                .add_column("id", DataType::Int64)
                .unwrap()
                .add_column("member_id", DataType::Int64)
                .unwrap()
                .add_primary_key(&["id"], true)
                .unwrap()
                .add_index("idx_member", &["member_id"], false)
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
    db.relate("member_badges", MEMBERS, "badges", "idx_member", RelationOptions::cascading())
        .unwrap();

    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        let ann = exec.insert(&members, member(Some(1), "ann"))?;
        let ann_id = ann.get(0).cloned().unwrap_or(Value::Null);
        exec.insert(&badges, Row::create(vec![Value::Null, ann_id.clone()]))?;
        exec.insert(&badges, Row::create(vec![Value::Null, ann_id]))
    })
    .unwrap();
    assert_eq!(badges.len(), 2);

    db.transact(|ctx| ctx.executor().delete_by_key(&groups, 1i64))
        .unwrap();
    assert!(groups.is_empty());
    assert!(members.is_empty());
    assert!(badges.is_empty());
}

#[test]
fn test_protected_link_in_cascade_chain_aborts_everything() {
    let (db, groups, members) = groups_and_members(RelationOptions::cascading());
    let badges = db
        .create_table(
            TableBuilder::new("badges")
                .unwrap()
                .add_column("id", DataType::Int64)
                .unwrap()
                .add_column("member_id", DataType::Int64)
                .unwrap()
                .add_primary_key(&["id"], true)
                .unwrap()
                .add_index("idx_member", &["member_id"], false)
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
    db.relate("member_badges", MEMBERS, "badges", "idx_member", RelationOptions::default())
        .unwrap();

    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        let ann = exec.insert(&members, member(Some(1), "ann"))?;
        exec.insert(&members, member(Some(1), "bob"))?;
        let ann_id = ann.get(0).cloned().unwrap_or(Value::Null);
        exec.insert(&badges, Row::create(vec![Value::Null, ann_id]))
    })
    .unwrap();

    let err = db
        .transact(|ctx| ctx.executor().delete_by_key(&groups, 1i64))
        .unwrap_err();
    match err {
        Error::ForeignKeyViolation { relation, .. } => assert_eq!(relation, "member_badges"),
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(groups.len(), 1);
    assert_eq!(members.len(), 2);
    assert_eq!(badges.len(), 1);
    let idx_group = members.index_position("idx_group").unwrap();
    assert_eq!(members.index_len(idx_group), 2);
}

#[test]
fn test_self_referencing_cascade() {
    let db = database();
    let staff = db
        .create_table(
            TableBuilder::new("staff")
                .unwrap()
                .add_column("id", DataType::Int64)
                .unwrap()
                .add_column("manager", DataType::Int64)
                .unwrap()
                .add_nullable(&["manager"])
                .add_primary_key(&["id"], false)
                .unwrap()
                .add_index("idx_manager", &["manager"], false)
                .unwrap()
                .build()
                .unwrap(),
        )
        .unwrap();
    db.relate("reports_to", "staff", "staff", "idx_manager", RelationOptions::cascading())
        .unwrap();

    let person = |id: i64, manager: Option<i64>| {
        Row::create(vec![
            Value::Int64(id),
            manager.map_or(Value::Null, Value::Int64),
        ])
    };
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&staff, person(1, None))?;
        exec.insert(&staff, person(2, Some(1)))?;
        exec.insert(&staff, person(3, Some(2)))?;
        exec.insert(&staff, person(4, None))
    })
    .unwrap();

    db.transact(|ctx| ctx.executor().delete_by_key(&staff, 1i64))
        .unwrap();
    assert_eq!(ids(&staff), vec![4]);
}

#[test]
fn test_update_of_primary_key_checks_referring_rows() {
    let (db, groups, members) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        exec.insert(&groups, group(2, "users"))?;
        exec.insert(&members, member(Some(1), "ann"))
    })
    .unwrap();

    let err = db
        .transact(|ctx| {
            let updater = Updater::set(groups.schema(), "id", 10i64)?;
            let plan = LookupPlan::primary(Arc::clone(&groups), 1i64);
            ctx.executor().update(&groups, &plan, &updater)
        })
        .unwrap_err();
    assert!(matches!(err, Error::ForeignKeyViolation { .. }));
    assert_eq!(ids(&groups), vec![1, 2]);

    // An unreferenced group may change its key.
    db.transact(|ctx| {
        let updater = Updater::set(groups.schema(), "id", 20i64)?;
        let plan = LookupPlan::primary(Arc::clone(&groups), 2i64);
        ctx.executor().update(&groups, &plan, &updater)
    })
    .unwrap();
    assert_eq!(ids(&groups), vec![1, 20]);
}

#[test]
fn test_update_moves_member_between_groups() {
    let (db, groups, members) = groups_and_members(RelationOptions::default());
    let ann = db
        .transact(|ctx| {
            let exec = ctx.executor();
            exec.insert(&groups, group(1, "admins"))?;
            exec.insert(&groups, group(2, "users"))?;
            exec.insert(&members, member(Some(1), "ann"))
        })
        .unwrap();

    let moved = db
        .transact(|ctx| {
            let mut new = Row::clone(&ann);
            new.set(1, Value::Int64(2));
            ctx.executor().update_entity(&members, &ann, new)
        })
        .unwrap();
    assert_eq!(moved.get(1), Some(&Value::Int64(2)));
    let idx_group = members.index_position("idx_group").unwrap();
    assert!(members.select(idx_group, &Key::from(1i64)).unwrap().is_empty());
    assert_eq!(members.select(idx_group, &Key::from(2i64)).unwrap().len(), 1);

    let err = db
        .transact(|ctx| {
            let mut new = Row::clone(&moved);
            new.set(1, Value::Int64(3));
            ctx.executor().update_entity(&members, &moved, new)
        })
        .unwrap_err();
    assert!(matches!(err, Error::ForeignKeyViolation { .. }));
    assert_eq!(members.select(idx_group, &Key::from(2i64)).unwrap().len(), 1);
}

#[test]
fn test_key_converters_translate_between_sides() {
    let db = database();
    let groups = create_groups(&db);
    let members = create_members(&db);
    let shift = |delta: i64| -> KeyConverter {
        Arc::new(move |key: &Key| match key.get(0).and_then(Value::as_i64) {
            Some(v) => Key::from(v + delta),
            None => key.clone(),
        })
    };
    db.create_relation(
        "shifted_members",
        IndexRef::primary(Arc::clone(&groups)),
        IndexRef::by_name(Arc::clone(&members), "idx_group").unwrap(),
        shift(1000),
        shift(-1000),
        RelationOptions::cascading(),
    )
    .unwrap();

    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        exec.insert(&members, member(Some(1001), "ann"))
    })
    .unwrap();
    let err = db
        .transact(|ctx| ctx.executor().insert(&members, member(Some(1), "bob")))
        .unwrap_err();
    assert!(matches!(err, Error::ForeignKeyViolation { .. }));

    db.transact(|ctx| ctx.executor().delete_by_key(&groups, 1i64))
        .unwrap();
    assert!(members.is_empty());
}

#[test]
fn test_constraints_reject_and_normalize() {
    let (db, groups, _) = groups_and_members(RelationOptions::default());
    groups.add_constraint(Arc::new(MaxLength::new("name", 8)));
    groups.add_constraint(Arc::new(FnConstraint::new("lowercase", |_schema, row: &mut Row| {
        if let Some(Value::String(name)) = row.get_mut(1) {
            *name = name.to_lowercase();
        }
        Ok(())
    })));

    let err = db
        .transact(|ctx| ctx.executor().insert(&groups, group(1, "far too long")))
        .unwrap_err();
    assert!(matches!(err, Error::ConstraintViolation { .. }));
    assert!(groups.is_empty());

    let stored = db
        .transact(|ctx| ctx.executor().insert(&groups, group(1, "Admins")))
        .unwrap();
    assert_eq!(stored.get(1), Some(&Value::from("admins")));
}

#[test]
fn test_update_reindexes_columns_normalized_by_constraints() {
    let (db, groups, _) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| ctx.executor().insert(&groups, group(1, "Admins")))
        .unwrap();
    groups.add_constraint(Arc::new(FnConstraint::new("lowercase", |_schema, row: &mut Row| {
        if let Some(Value::String(name)) = row.get_mut(1) {
            *name = name.to_lowercase();
        }
        Ok(())
    })));

    db.transact(|ctx| {
        let updater = Updater::set(groups.schema(), "id", 2i64)?;
        let plan = LookupPlan::primary(Arc::clone(&groups), 1i64);
        ctx.executor().update(&groups, &plan, &updater)
    })
    .unwrap();

    let by_name = groups.index_position("uq_group_name").unwrap();
    let found = groups.select(by_name, &Key::from("admins")).unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].get(0), Some(&Value::Int64(2)));
    assert!(groups.select(by_name, &Key::from("Admins")).unwrap().is_empty());

    let err = db
        .transact(|ctx| ctx.executor().insert(&groups, group(3, "admins")))
        .unwrap_err();
    assert!(matches!(err, Error::UniqueConstraint { .. }));
    assert_eq!(ids(&groups), vec![2]);
}

#[test]
fn test_type_and_null_checks() {
    let (db, groups, members) = groups_and_members(RelationOptions::default());
    let err = db
        .transact(|ctx| {
            ctx.executor()
                .insert(&groups, Row::create(vec![Value::Int64(1), Value::Int64(5)]))
        })
        .unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { .. }));

    let err = db
        .transact(|ctx| {
            ctx.executor()
                .insert(&members, Row::create(vec![Value::Null, Value::Null, Value::Null]))
        })
        .unwrap_err();
    assert!(matches!(err, Error::NullConstraint { .. }));
    assert!(groups.is_empty());
    assert!(members.is_empty());
}

#[test]
fn test_rollback_restores_previous_state() {
    let (db, groups, members) = groups_and_members(RelationOptions::cascading());
    db.transact(|ctx| {
        let exec = ctx.executor();
        exec.insert(&groups, group(1, "admins"))?;
        exec.insert(&groups, group(2, "users"))?;
        exec.insert(&members, member(Some(1), "ann"))
    })
    .unwrap();
    let groups_before = ids(&groups);
    let members_before = ids(&members);

    let ctx = db.context(db.begin());
    let exec = ctx.executor();
    exec.insert(&groups, group(3, "guests")).unwrap();
    exec.update(
        &groups,
        &LookupPlan::primary(Arc::clone(&groups), 2i64),
        &Updater::set(groups.schema(), "name", "staff").unwrap(),
    )
    .unwrap();
    exec.delete_by_key(&groups, 1i64).unwrap();
    assert_eq!(ids(&groups), vec![2, 3]);
    assert!(members.is_empty());

    ctx.transaction().rollback().unwrap();
    assert_eq!(ids(&groups), groups_before);
    assert_eq!(ids(&members), members_before);
    let users = groups.find(&Key::from(2i64)).unwrap();
    assert_eq!(users.get(1), Some(&Value::from("users")));
    assert_eq!(users.version(), 1);

    // A second rollback changes nothing.
    ctx.transaction().rollback().unwrap();
    assert_eq!(ids(&groups), groups_before);
    assert!(matches!(
        ctx.transaction().commit(),
        Err(Error::TransactionAborted { .. })
    ));
}

#[test]
fn test_parameterized_lookup() {
    let (db, groups, _) = groups_and_members(RelationOptions::default());
    db.transact(|ctx| ctx.executor().insert(&groups, group(7, "lucky")))
        .unwrap();

    let txn = db.begin();
    let ctx = db
        .context(txn)
        .with_parameters(marrow_database::Parameters::new().with("group", 7i64));
    let plan = LookupPlan::parameterized(Arc::clone(&groups), 0, "group");
    let rows = ctx.executor().query(&plan).unwrap();
    assert_eq!(rows.len(), 1);
    ctx.transaction().commit().unwrap();
}

fn populated(keys: &[i64]) -> (Database, Arc<Table>) {
    let db = database();
    let groups = create_groups(&db);
    db.transact(|ctx| {
        let exec = ctx.executor();
        for &k in keys {
            exec.insert(&groups, group(k, &format!("g{k}")))?;
        }
        Ok(())
    })
    .unwrap();
    (db, groups)
}


#[derive(Clone, Debug)]
enum Op {
    Insert(i64),
    Delete(i64),
    Rename(i64),
}

fn ops() -> impl Strategy<Value = Vec<Op>> {
    prop::collection::vec(
        prop_oneof![
            2 => (0i64..40).prop_map(Op::Insert),
            1 => (0i64..40).prop_map(Op::Delete),
            1 => (0i64..40).prop_map(Op::Rename),
        ],
        1..60,
    )
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_rollback_restores_keys(
        initial in prop::collection::btree_set(0i64..40, 0..20),
        ops in ops(),
    ) {
        let initial: Vec<i64> = initial.into_iter().collect();
        let (db, groups) = populated(&initial);

        let ctx = db.context(db.begin());
        let exec = ctx.executor();
        for op in &ops {
            // Failures (duplicates, missing rows) are part of the workload.
            let _ = match op {
                Op::Insert(k) => exec.insert(&groups, group(*k, &format!("n{k}"))).map(|_| ()),
                Op::Delete(k) => exec.delete_by_key(&groups, *k).map(|_| ()),
                Op::Rename(k) => Updater::set(groups.schema(), "name", format!("r{k}"))
                    .and_then(|u| {
                        exec.update(&groups, &LookupPlan::primary(Arc::clone(&groups), *k), &u)
                    })
                    .map(|_| ()),
            };
        }
        ctx.transaction().rollback().unwrap();

        prop_assert_eq!(ids(&groups), initial.clone());
        prop_assert_eq!(groups.index_len(0), initial.len());
        prop_assert_eq!(groups.index_len(1), initial.len());
        for row in groups.rows() {
            prop_assert_eq!(row.version(), 1);
        }
    }
}
