// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Table declarations, as handed to [`Orm::new`](crate::Orm::new).

use std::sync::Arc;

use indexmap::IndexMap;
use quill_sql::query::{Injector, QueryHooks, UpdateItem, UpdateValue};
use quill_sql::{RawSql, Table};

/// Column set by the timestamps injector.
pub const UPDATED_AT: &str = "updatedAt";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    BelongsTo,
    HasOne,
    HasMany,
    HasAndBelongsToMany,
}

impl RelationKind {
    /// Whether the relation links a record to at most one related record.
    pub fn is_to_one(&self) -> bool {
        matches!(self, RelationKind::BelongsTo | RelationKind::HasOne)
    }

    pub fn name(&self) -> &'static str {
        match self {
            RelationKind::BelongsTo => "belongsTo",
            RelationKind::HasOne => "hasOne",
            RelationKind::HasMany => "hasMany",
            RelationKind::HasAndBelongsToMany => "hasAndBelongsToMany",
        }
    }
}

/// Join table columns of a many-to-many relation. Join table columns are database names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JoinTableKeys {
    pub join_table: String,
    /// Key of the declaring table
    pub primary_key: String,
    /// Join table column referencing `primary_key`
    pub foreign_key: String,
    /// Key of the target table
    pub association_primary_key: String,
    /// Join table column referencing `association_primary_key`
    pub association_foreign_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelationOptions {
    /// `primary_key` and `foreign_key` are column keys, paired positionally. For `belongsTo` the
    /// primary key is on the target and the foreign key on the declaring table; for `hasOne` and
    /// `hasMany` it is the other way around.
    Keys {
        target: String,
        primary_key: Vec<String>,
        foreign_key: Vec<String>,
    },
    JoinTable {
        target: String,
        keys: JoinTableKeys,
    },
    /// Composition of the `through` relation of the declaring table and the `source` relation of
    /// the through relation's target.
    Through { through: String, source: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDef {
    pub name: String,
    pub kind: RelationKind,
    pub options: RelationOptions,
}

fn keys(keys: &[&str]) -> Vec<String> {
    keys.iter().map(|key| key.to_string()).collect()
}

impl RelationDef {
    fn direct(
        kind: RelationKind,
        name: &str,
        target: &str,
        primary_key: &[&str],
        foreign_key: &[&str],
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            options: RelationOptions::Keys {
                target: target.to_string(),
                primary_key: keys(primary_key),
                foreign_key: keys(foreign_key),
            },
        }
    }

    fn through(kind: RelationKind, name: &str, through: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            options: RelationOptions::Through {
                through: through.to_string(),
                source: source.to_string(),
            },
        }
    }

    pub fn belongs_to(name: &str, target: &str, primary_key: &[&str], foreign_key: &[&str]) -> Self {
        Self::direct(RelationKind::BelongsTo, name, target, primary_key, foreign_key)
    }

    pub fn has_one(name: &str, target: &str, primary_key: &[&str], foreign_key: &[&str]) -> Self {
        Self::direct(RelationKind::HasOne, name, target, primary_key, foreign_key)
    }

    pub fn has_many(name: &str, target: &str, primary_key: &[&str], foreign_key: &[&str]) -> Self {
        Self::direct(RelationKind::HasMany, name, target, primary_key, foreign_key)
    }

    pub fn has_one_through(name: &str, through: &str, source: &str) -> Self {
        Self::through(RelationKind::HasOne, name, through, source)
    }

    pub fn has_many_through(name: &str, through: &str, source: &str) -> Self {
        Self::through(RelationKind::HasMany, name, through, source)
    }

    pub fn has_and_belongs_to_many(name: &str, target: &str, keys: JoinTableKeys) -> Self {
        Self {
            name: name.to_string(),
            kind: RelationKind::HasAndBelongsToMany,
            options: RelationOptions::JoinTable {
                target: target.to_string(),
                keys,
            },
        }
    }
}

/// A table together with its relations and lifecycle hooks.
#[derive(Debug, Clone)]
pub struct TableDef {
    pub(crate) table: Table,
    pub(crate) relations: IndexMap<String, RelationDef>,
    pub(crate) hooks: QueryHooks,
    pub(crate) timestamps: bool,
}

impl TableDef {
    pub fn new(table: Table) -> Self {
        Self {
            table,
            relations: IndexMap::new(),
            hooks: QueryHooks::default(),
            timestamps: false,
        }
    }

    pub fn relation(mut self, relation: RelationDef) -> Self {
        self.relations.insert(relation.name.clone(), relation);
        self
    }

    /// Hooks carried by every query on this table, including statements issued by nested writes.
    pub fn hooks(mut self, hooks: QueryHooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Set `updatedAt` to `now()` on every update that doesn't set it explicitly.
    pub fn timestamps(mut self) -> Self {
        self.timestamps = true;
        self
    }

    pub fn name(&self) -> &str {
        self.table.name()
    }
}

pub(crate) fn updated_at_injector() -> Injector {
    Injector(Arc::new(|items: &[UpdateItem]| {
        if items.iter().any(|item| item.sets(UPDATED_AT)) {
            return None;
        }
        Some(UpdateItem::Set(IndexMap::from([(
            UPDATED_AT.to_string(),
            UpdateValue::Raw(RawSql::new("now()")),
        )])))
    }))
}
