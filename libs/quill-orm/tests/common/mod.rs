// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use quill_orm::{JoinTableKeys, Orm, RelationDef, TableDef};
use quill_sql::query::{AfterHook, QueryHooks};
use quill_sql::{ColumnType, DatabaseConfig, Table};

/// Statements that fired the hooks of the `profile` table, by kind.
#[derive(Debug, Default, Clone)]
pub struct Counters {
    pub creates: Arc<AtomicUsize>,
    pub updates: Arc<AtomicUsize>,
    pub deletes: Arc<AtomicUsize>,
}

impl Counters {
    pub fn get(&self) -> (usize, usize, usize) {
        (
            self.creates.load(Ordering::SeqCst),
            self.updates.load(Ordering::SeqCst),
            self.deletes.load(Ordering::SeqCst),
        )
    }
}

fn counter(count: &Arc<AtomicUsize>) -> AfterHook {
    let count = count.clone();
    Arc::new(move |_, _| {
        count.fetch_add(1, Ordering::SeqCst);
        Ok(())
    })
}

fn table(name: &str, columns: &[&str]) -> Table {
    columns.iter().fold(Table::new(name), |table, column| {
        let column_type = match *column {
            "id" => ColumnType::serial().primary_key(),
            "userId" => ColumnType::integer().nullable(),
            _ => ColumnType::text(),
        };
        table.column(*column, column_type)
    })
}

pub fn user() -> TableDef {
    TableDef::new(table("user", &["id", "name"]))
        .relation(RelationDef::has_one("profile", "profile", &["id"], &["userId"]))
        .relation(RelationDef::has_many("posts", "post", &["id"], &["userId"]))
}

pub fn profile(counters: &Counters) -> TableDef {
    let hooks = QueryHooks {
        after_create: vec![counter(&counters.creates)],
        after_update: vec![counter(&counters.updates)],
        after_delete: vec![counter(&counters.deletes)],
        ..Default::default()
    };
    TableDef::new(table("profile", &["id", "userId", "bio"]))
        .relation(RelationDef::belongs_to("user", "user", &["id"], &["userId"]))
        .hooks(hooks)
}

pub fn message() -> TableDef {
    TableDef::new(table("message", &["id", "userId", "text"]))
        .relation(RelationDef::belongs_to("user", "user", &["id"], &["userId"]))
        .relation(RelationDef::has_one_through("profile", "user", "profile"))
}

pub fn post() -> TableDef {
    TableDef::new(table("post", &["id", "userId", "title"])).relation(
        RelationDef::has_and_belongs_to_many(
            "tags",
            "tag",
            JoinTableKeys {
                join_table: "postTag".into(),
                primary_key: "id".into(),
                foreign_key: "postId".into(),
                association_primary_key: "id".into(),
                association_foreign_key: "tagId".into(),
            },
        ),
    )
}

pub fn tag() -> TableDef {
    TableDef::new(table("tag", &["id", "name"]))
}

pub fn tables(counters: &Counters) -> Vec<TableDef> {
    vec![user(), profile(counters), message(), post(), tag()]
}

pub fn orm() -> (Orm, Counters) {
    let counters = Counters::default();
    let orm = Orm::new(tables(&counters), &DatabaseConfig::default()).expect("tables should resolve");
    (orm, counters)
}
