// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use quill_sql::query::{JoinKind, QueryKind, SelectItem, WhereItem};
use quill_sql::{Query, RawSql};

use super::{Parent, Relation, RelationQuery};

/// How a relation is selected next to the columns of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationSelect {
    /// `row_to_json` of the related record
    One,
    /// JSON array of the related records, `[]` when there are none
    Many,
    /// Whether any related record exists
    Exists,
}

impl RelationSelect {
    /// One or many, by the relation's cardinality.
    pub fn of(relation: &Relation) -> Self {
        if relation.is_to_one() {
            RelationSelect::One
        } else {
            RelationSelect::Many
        }
    }
}

/// Relation-aware clauses on a query of the table declaring the relation.
///
/// Each method receives the relation and a `modify` callback applied to the query of the
/// related table, to narrow it down further.
pub trait QueryRelationsExt {
    /// `WHERE EXISTS (SELECT 1 FROM related WHERE <link> AND <modify> LIMIT 1)`
    fn where_exists_relation(
        &self,
        relation: &Relation,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query;

    /// `JOIN related ON <link> AND <modify conditions>`
    fn join_relation(&self, relation: &Relation, modify: impl FnOnce(Query) -> Query) -> Query;

    fn left_join_relation(&self, relation: &Relation, modify: impl FnOnce(Query) -> Query)
    -> Query;

    /// `JOIN LATERAL (SELECT ... FROM related WHERE <modify> AND <link>) "alias" ON true`, the
    /// alias being the one of the modified related query.
    fn join_lateral_relation(
        &self,
        relation: &Relation,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query;

    /// Select the related record(s) under `key`, through a `LEFT JOIN LATERAL` named `key`.
    fn select_relation(
        &self,
        key: &str,
        relation: &Relation,
        select: RelationSelect,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query;

    /// Query the related records of every record this query matches.
    fn related(&self, relation: &Arc<Relation>) -> RelationQuery;
}

fn join_with_kind(
    query: &Query,
    kind: JoinKind,
    relation: &Relation,
    modify: impl FnOnce(Query) -> Query,
) -> Query {
    let related = modify(relation.target_under(query.alias()));
    let alias = related.alias().to_string();
    let mut conditions = relation.conditions(&alias, Parent::Alias(query.alias()), false);
    conditions.extend(related.data().and.iter().cloned());
    let groups: Vec<Vec<WhereItem>> = related
        .data()
        .or
        .iter()
        .filter(|group| !group.is_empty())
        .cloned()
        .collect();
    if !groups.is_empty() {
        conditions.push(WhereItem::Or(groups));
    }

    let table = related.table_arc();
    let table_alias = (alias != table.name()).then_some(alias.as_str());
    let mut joined = query.join_table(kind, table, table_alias, conditions);

    let invalid = related.data().invalid.clone().or_else(|| {
        unjoinable_clauses(&related).first().map(|clause| {
            format!(
                "`{clause}` of the `{}` relation query can't be applied to a join",
                relation.name()
            )
        })
    });
    if invalid.is_some() && joined.data().invalid.is_none() {
        joined.data_mut().invalid = invalid;
    }
    joined
}

/// Clauses of a related query that a join condition has no room for.
fn unjoinable_clauses(related: &Query) -> Vec<&'static str> {
    let data = related.data();
    let mut clauses = vec![];
    if !data.with.is_empty() {
        clauses.push("with");
    }
    if !data.select.is_empty() {
        clauses.push("select");
    }
    if data.from.is_some() {
        clauses.push("from");
    }
    match &data.kind {
        QueryKind::Select(select) => {
            let present = [
                ("distinct", select.distinct.is_some()),
                ("join", !select.join.is_empty()),
                ("group", !select.group.is_empty()),
                ("having", !select.having.is_empty() || !select.having_or.is_empty()),
                ("window", !select.window.is_empty()),
                ("union", !select.union.is_empty()),
                ("order", !select.order.is_empty()),
                ("limit", select.limit.is_some()),
                ("offset", select.offset.is_some()),
                ("for", select.lock.is_some()),
            ];
            clauses.extend(present.into_iter().filter(|(_, set)| *set).map(|(name, _)| name));
        }
        kind => clauses.push(kind.name()),
    }
    clauses
}

impl QueryRelationsExt for Query {
    fn where_exists_relation(
        &self,
        relation: &Relation,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query {
        let related = relation.target_under(self.alias());
        let related = related
            .select_raw(RawSql::new("1"))
            .where_all(relation.conditions(related.alias(), Parent::Alias(self.alias()), false));
        self.where_exists(modify(related).limit(1))
    }

    fn join_relation(&self, relation: &Relation, modify: impl FnOnce(Query) -> Query) -> Query {
        join_with_kind(self, JoinKind::Inner, relation, modify)
    }

    fn left_join_relation(
        &self,
        relation: &Relation,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query {
        join_with_kind(self, JoinKind::Left, relation, modify)
    }

    fn join_lateral_relation(
        &self,
        relation: &Relation,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query {
        let related = modify(relation.target_under(self.alias()));
        let alias = related.alias().to_string();
        let related =
            related.where_all(relation.conditions(&alias, Parent::Alias(self.alias()), false));
        self.join_lateral(related, alias)
    }

    fn select_relation(
        &self,
        key: &str,
        relation: &Relation,
        select: RelationSelect,
        modify: impl FnOnce(Query) -> Query,
    ) -> Query {
        let related = modify(relation.target_under(self.alias()));
        let related = related.where_all(relation.conditions(
            related.alias(),
            Parent::Alias(self.alias()),
            false,
        ));

        let (lateral, item) = match select {
            RelationSelect::One => (
                related,
                SelectItem::JsonRow {
                    alias: key.to_string(),
                },
            ),
            RelationSelect::Many => {
                let aggregate = related
                    .base()
                    .from_query(related, "t")
                    .select_raw(RawSql::new(r#"json_agg(row_to_json("t".*)) r"#));
                (
                    aggregate,
                    SelectItem::Coalesce {
                        alias: key.to_string(),
                        fallback: "'[]'".to_string(),
                    },
                )
            }
            RelationSelect::Exists => (
                related.clear_select().select_raw(RawSql::new("true r")),
                SelectItem::Coalesce {
                    alias: key.to_string(),
                    fallback: "false".to_string(),
                },
            ),
        };

        self.left_join_lateral(lateral, key).select_item(item)
    }

    fn related(&self, relation: &Arc<Relation>) -> RelationQuery {
        RelationQuery::of_query(relation.clone(), self.clone())
    }
}
