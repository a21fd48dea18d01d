// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use quill_sql::query::{Expression, ReturnType};
use quill_sql::{Executor, Query, QueryError, QueryOutput, RawSql, Record, Sql, Value};

use crate::table_def::RelationKind;

use super::{Parent, Relation, RelationJoin};

#[derive(Debug, Clone)]
enum RelationParent {
    Record(Record),
    Query(Query),
}

/// The related records of a captured record or of a parent query, queryable like a table.
///
/// To-one relations return a single record, to-many relations a list.
#[derive(Debug, Clone)]
pub struct RelationQuery {
    relation: Arc<Relation>,
    parent: RelationParent,
    query: Query,
}

fn relation_return_type(relation: &Relation) -> ReturnType {
    if relation.is_to_one() {
        ReturnType::OneOrThrow
    } else {
        ReturnType::All
    }
}

impl RelationQuery {
    /// `SELECT ... FROM related WHERE <link to record>`
    pub(crate) fn of_record(relation: Arc<Relation>, record: Record) -> Self {
        let target = relation.target().returning(relation_return_type(&relation));
        let mut query = target.where_all(relation.conditions(
            target.alias(),
            Parent::Record(&record),
            false,
        ));

        let missing: Vec<&str> = relation
            .parent_keys()
            .into_iter()
            .filter(|key| !record.contains_key(*key))
            .collect();
        if !missing.is_empty() {
            query.data_mut().invalid = Some(format!(
                "`{}` required to query the `{}` relation",
                missing.join("`, `"),
                relation.name()
            ));
        }

        Self {
            relation,
            parent: RelationParent::Record(record),
            query,
        }
    }

    /// `SELECT ... FROM related WHERE EXISTS (SELECT 1 FROM parent WHERE ... AND <link> LIMIT 1)`
    pub(crate) fn of_query(relation: Arc<Relation>, parent: Query) -> Self {
        let target = relation
            .target_under(parent.alias())
            .returning(relation_return_type(&relation));
        let link = relation.conditions(target.alias(), Parent::Alias(parent.alias()), true);
        let parent_exists = parent
            .clear_select()
            .select_raw(RawSql::new("1"))
            .where_all(link)
            .limit(1);
        let query = target.where_exists(parent_exists);

        Self {
            relation,
            parent: RelationParent::Query(parent),
            query,
        }
    }

    pub fn relation(&self) -> &Arc<Relation> {
        &self.relation
    }

    pub fn query(&self) -> &Query {
        &self.query
    }

    pub fn into_query(self) -> Query {
        self.query
    }

    /// Apply further builder calls to the related query.
    pub fn modify(&self, modify: impl FnOnce(&Query) -> Query) -> Self {
        Self {
            relation: self.relation.clone(),
            parent: self.parent.clone(),
            query: modify(&self.query),
        }
    }

    pub fn where_eq(&self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.modify(|query| query.where_eq(column, value))
    }

    pub fn to_sql(&self) -> Result<Sql, QueryError> {
        self.query.to_sql()
    }

    pub async fn execute(&self, executor: &dyn Executor) -> Result<QueryOutput, QueryError> {
        self.query.execute(executor).await
    }

    /// Insert a related record linked to the parent.
    ///
    /// For a parent query, the foreign key is selected from the parent in the same statement
    /// (`INSERT ... SELECT`). The parent query must target a single record: a query that may
    /// return several records fails with [`QueryError::MultipleRecords`] before anything is
    /// executed, and a parent that isn't found fails with [`QueryError::NotFound`] when the
    /// statement runs (unless the parent was looked up with an optional finder).
    pub fn create(&self, record: Record) -> Result<Query, QueryError> {
        let relation = &self.relation;
        let pairs = match (&relation.join, relation.kind) {
            (RelationJoin::Direct(pairs), RelationKind::HasOne | RelationKind::HasMany) => pairs,
            (RelationJoin::Through { .. }, _) => {
                return Err(QueryError::Unsupported(format!(
                    "`create` is not available on the `{}` relation defined with `through`",
                    relation.name()
                )));
            }
            (_, kind) => {
                return Err(QueryError::Unsupported(format!(
                    "`create` is not available on the `{}` {} relation",
                    relation.name(),
                    kind.name()
                )));
            }
        };

        match &self.parent {
            RelationParent::Record(parent) => {
                let mut values = relation.link_values(parent);
                values.extend(record);
                Ok(relation.target().create(values))
            }
            RelationParent::Query(parent) => {
                if !parent.returns_single() {
                    return Err(QueryError::MultipleRecords);
                }

                let keys = pairs.iter().fold(parent.clear_select(), |select, pair| {
                    select.select_as(pair.child.as_str(), Expression::Column(pair.parent.clone()))
                });
                let return_type = if parent.data().return_type.throws_on_not_found() {
                    ReturnType::OneOrThrow
                } else {
                    ReturnType::One
                };
                Ok(relation
                    .target()
                    .create_from(keys, record)
                    .returning(return_type))
            }
        }
    }

    /// Delete the related records, returning the row count.
    pub fn delete(&self) -> Query {
        self.query.all().delete()
    }
}

impl Relation {
    /// Query the records related to a captured record of the declaring table.
    pub fn of(self: &Arc<Self>, record: Record) -> RelationQuery {
        RelationQuery::of_record(self.clone(), record)
    }
}
