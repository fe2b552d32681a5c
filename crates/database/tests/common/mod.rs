//! Shared fixtures: `groups` referred to by `members`.

#![allow(dead_code)]

use marrow_core::schema::TableBuilder;
use marrow_core::{DataType, Row, Value};
use marrow_database::{BackoffConfig, Database, DatabaseConfig, RelationOptions, Table};
use std::sync::Arc;
use std::time::Duration;

pub const GROUPS: &str = "groups";
pub const MEMBERS: &str = "members";

/// Database with fast lock backoff so blocked tests wake up quickly.
pub fn database() -> Database {
    Database::with_config(DatabaseConfig::new().backoff(BackoffConfig {
        spin_limit: 4,
        yield_limit: 8,
        sleep: Duration::from_micros(100),
    }))
}

/// `groups(id Int64 pk, name String unique)`
pub fn create_groups(db: &Database) -> Arc<Table> {
    db.create_table(
        TableBuilder::new(GROUPS)
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .add_primary_key(&["id"], false)
            .unwrap()
            .add_unique("uq_group_name", &["name"])
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap()
}

/// `members(id Int64 identity pk, group_id Int64 nullable, name String)`
pub fn create_members(db: &Database) -> Arc<Table> {
    db.create_table(
        TableBuilder::new(MEMBERS)
            .unwrap()
            .add_column("id", DataType::Int64)
            .unwrap()
            .add_column("group_id", DataType::Int64)
            .unwrap()
            .add_column("name", DataType::String)
            .unwrap()
            .add_nullable(&["group_id"])
            .add_primary_key(&["id"], true)
            .unwrap()
            .add_index("idx_group", &["group_id"], false)
            .unwrap()
            .build()
            .unwrap(),
    )
    .unwrap()
}

/// Groups and members related by `group_members`.
pub fn groups_and_members(options: RelationOptions) -> (Database, Arc<Table>, Arc<Table>) {
    let db = database();
    let groups = create_groups(&db);
    let members = create_members(&db);
    db.relate("group_members", GROUPS, MEMBERS, "idx_group", options)
        .unwrap();
    (db, groups, members)
}

pub fn group(id: i64, name: &str) -> Row {
    Row::create(vec![Value::Int64(id), name.into()])
}

pub fn member(group: Option<i64>, name: &str) -> Row {
    Row::create(vec![
        Value::Null,
        group.map_or(Value::Null, Value::Int64),
        name.into(),
    ])
}

/// Primary key values of `table`, ascending.
pub fn ids(table: &Table) -> Vec<i64> {
    table
        .rows()
        .iter()
        .filter_map(|r| r.get(0).and_then(Value::as_i64))
        .collect()
}
