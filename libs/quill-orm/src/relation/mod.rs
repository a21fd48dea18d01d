// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Resolved relations and the conditions that tie related records together.
//!
//! A direct relation links `target.child = owner.parent` for every key pair. A many-to-many
//! relation goes through its join table, and a through relation composes two other relations.
//! Join tables and intermediate tables never appear in a result set: they are only referenced
//! from nested `EXISTS` conditions.

mod ext;
mod query;

use std::sync::Arc;

use quill_sql::query::{ColumnRef, Expression, Operator, WhereItem};
use quill_sql::{Query, RawSql, Record, Table, Value};

use crate::table_def::RelationKind;

pub use ext::{QueryRelationsExt, RelationSelect};
pub use query::RelationQuery;

/// A pair of linked columns: `child` is a key of the target table, `parent` a key of the table
/// declaring the relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPair {
    pub child: String,
    pub parent: String,
}

#[derive(Debug, Clone)]
pub enum RelationJoin {
    Direct(Vec<KeyPair>),
    /// `owner.child` / `target.child` are join table columns
    JoinTable {
        table: Arc<Table>,
        owner: KeyPair,
        target: KeyPair,
    },
    Through {
        through: Arc<Relation>,
        source: Arc<Relation>,
    },
}

/// What the related records are tied to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum Parent<'a> {
    /// Rows of a table or query in scope under this alias
    Alias(&'a str),
    /// A captured record; conditions are compiled in the scope of the related table
    Record(&'a Record),
}

fn qualified(alias: &str, column: &str) -> Expression {
    Expression::Qualified(ColumnRef::new(alias, column))
}

fn select_one(table: &Arc<Table>) -> Query {
    table.query().select_raw(RawSql::new("1"))
}

#[derive(Debug)]
pub struct Relation {
    pub(crate) name: String,
    pub(crate) kind: RelationKind,
    pub(crate) owner: Query,
    pub(crate) target: Query,
    pub(crate) join: RelationJoin,
}

impl Relation {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn is_to_one(&self) -> bool {
        self.kind.is_to_one()
    }

    pub fn is_through(&self) -> bool {
        matches!(self.join, RelationJoin::Through { .. })
    }

    pub fn join(&self) -> &RelationJoin {
        &self.join
    }

    /// Base query of the target table, carrying its hooks.
    pub fn target(&self) -> &Query {
        &self.target
    }

    /// Base query of the target table, aliased by the relation name when the table is the one
    /// in scope as `parent_alias` (a table related to itself).
    pub(crate) fn target_under(&self, parent_alias: &str) -> Query {
        if self.target.alias() == parent_alias {
            self.target.as_(self.name.as_str())
        } else {
            self.target.clone()
        }
    }

    /// Base query of the table declaring the relation.
    pub fn owner(&self) -> &Query {
        &self.owner
    }

    fn target_column(&self, key: &str) -> String {
        self.target.table().column_name(key).to_string()
    }

    fn owner_column(&self, key: &str) -> String {
        self.owner.table().column_name(key).to_string()
    }

    /// Keys of the declaring table a captured record needs to query this relation.
    pub fn parent_keys(&self) -> Vec<&str> {
        match &self.join {
            RelationJoin::Direct(pairs) => pairs.iter().map(|pair| pair.parent.as_str()).collect(),
            RelationJoin::JoinTable { owner, .. } => vec![owner.parent.as_str()],
            RelationJoin::Through { through, .. } => through.parent_keys(),
        }
    }

    /// Conditions selecting the target rows (in scope as `child`) related to `parent`.
    ///
    /// With `reversed`, direct equalities are written parent side first, which is how a parent
    /// query refers back to the related table.
    pub(crate) fn conditions(&self, child: &str, parent: Parent<'_>, reversed: bool) -> Vec<WhereItem> {
        match &self.join {
            RelationJoin::Direct(pairs) => pairs
                .iter()
                .map(|pair| match parent {
                    Parent::Alias(alias) => {
                        let child = qualified(child, &self.target_column(&pair.child));
                        let parent = qualified(alias, &self.owner_column(&pair.parent));
                        let (left, right) = if reversed {
                            (parent, child)
                        } else {
                            (child, parent)
                        };
                        WhereItem::Equals { left, right }
                    }
                    Parent::Record(record) => WhereItem::eq(
                        format!("{child}.{}", pair.child),
                        record.get(&pair.parent).cloned().unwrap_or(Value::Null),
                    ),
                })
                .collect(),
            RelationJoin::JoinTable {
                table,
                owner,
                target,
            } => {
                let join_alias = table.name();
                let owner_condition = match parent {
                    Parent::Alias(alias) => WhereItem::Equals {
                        left: qualified(join_alias, &owner.child),
                        right: qualified(alias, &self.owner_column(&owner.parent)),
                    },
                    Parent::Record(record) => WhereItem::eq(
                        owner.child.as_str(),
                        record.get(&owner.parent).cloned().unwrap_or(Value::Null),
                    ),
                };
                let exists = select_one(table)
                    .where_(WhereItem::Equals {
                        left: qualified(join_alias, &target.child),
                        right: qualified(child, &self.target_column(&target.parent)),
                    })
                    .where_(owner_condition)
                    .limit(1);
                vec![WhereItem::Exists(Arc::new(exists))]
            }
            RelationJoin::Through { through, source } => {
                let through_table = through.target.table_arc();
                let through_alias = through_table.name();
                let exists = select_one(through_table)
                    .where_all(source.conditions(child, Parent::Alias(through_alias), false))
                    .where_all(through.conditions(through_alias, parent, false))
                    .limit(1);
                vec![WhereItem::Exists(Arc::new(exists))]
            }
        }
    }

    /// Direct key pairs, for writes that set foreign keys.
    pub(crate) fn pairs(&self) -> &[KeyPair] {
        match &self.join {
            RelationJoin::Direct(pairs) => pairs,
            _ => &[],
        }
    }

    /// Condition on the target's foreign key matching any of `parents` (`hasOne` / `hasMany`).
    pub(crate) fn linked_to(&self, parents: &[Record]) -> WhereItem {
        match self.pairs() {
            [pair] => WhereItem::Column {
                column: pair.child.clone(),
                op: Operator::In(
                    parents
                        .iter()
                        .map(|parent| parent.get(&pair.parent).cloned().unwrap_or(Value::Null))
                        .collect(),
                ),
            },
            pairs => WhereItem::In {
                columns: pairs.iter().map(|pair| pair.child.clone()).collect(),
                values: parents
                    .iter()
                    .map(|parent| {
                        pairs
                            .iter()
                            .map(|pair| parent.get(&pair.parent).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect(),
            },
        }
    }

    /// Foreign key values linking a target record to `parent` (`hasOne` / `hasMany`).
    pub(crate) fn link_values(&self, parent: &Record) -> Record {
        self.pairs()
            .iter()
            .map(|pair| {
                let value = parent.get(&pair.parent).cloned().unwrap_or(Value::Null);
                (pair.child.clone(), value)
            })
            .collect()
    }

    /// Foreign key values of the declaring table pointing at `target` (`belongsTo`).
    pub(crate) fn reference_values(&self, target: &Record) -> Record {
        self.pairs()
            .iter()
            .map(|pair| {
                let value = target.get(&pair.child).cloned().unwrap_or(Value::Null);
                (pair.parent.clone(), value)
            })
            .collect()
    }

    /// Foreign key columns set to `NULL`: target side for `hasOne` / `hasMany`, declaring side
    /// for `belongsTo`.
    pub(crate) fn null_values(&self) -> Record {
        self.pairs()
            .iter()
            .map(|pair| {
                let key = match self.kind {
                    RelationKind::BelongsTo => &pair.parent,
                    _ => &pair.child,
                };
                (key.clone(), Value::Null)
            })
            .collect()
    }
}
