// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use crate::sql::RawSql;
use crate::value::{Record, Value};

use super::{Expression, Operator, Query, WhereItem};

impl Query {
    /// AND a condition onto the query.
    pub fn where_(&self, item: WhereItem) -> Self {
        self.derive(|data| data.and.push(item))
    }

    /// AND several conditions onto the query.
    pub fn where_all(&self, items: impl IntoIterator<Item = WhereItem>) -> Self {
        self.derive(|data| data.and.extend(items))
    }

    pub fn where_eq(&self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.where_(WhereItem::eq(column, value))
    }

    pub fn where_op(&self, column: impl Into<String>, op: Operator) -> Self {
        self.where_(WhereItem::Column {
            column: column.into(),
            op,
        })
    }

    /// Equality on every entry of `record`.
    pub fn where_record(&self, record: &Record) -> Self {
        self.where_all(WhereItem::from_record(record))
    }

    /// `left = right` for two columns or expressions.
    pub fn where_columns_eq(
        &self,
        left: impl Into<Expression>,
        right: impl Into<Expression>,
    ) -> Self {
        self.where_(WhereItem::Equals {
            left: left.into(),
            right: right.into(),
        })
    }

    pub fn where_raw(&self, raw: RawSql) -> Self {
        self.where_(WhereItem::Raw(raw))
    }

    /// `NOT (<items>)`
    pub fn where_not(&self, items: Vec<WhereItem>) -> Self {
        self.where_(WhereItem::Not(items))
    }

    /// `column IN (...)` for one column, `(a, b) IN ((...), ...)` for several.
    pub fn where_in(&self, columns: &[&str], values: Vec<Vec<Value>>) -> Self {
        match columns {
            [column] => self.where_op(
                *column,
                Operator::In(values.into_iter().flatten().collect()),
            ),
            _ => self.where_(WhereItem::In {
                columns: columns.iter().map(|column| column.to_string()).collect(),
                values,
            }),
        }
    }

    /// `column IN (<query>)`
    pub fn where_in_query(&self, column: impl Into<String>, query: Query) -> Self {
        self.where_op(column, Operator::InQuery(Arc::new(query)))
    }

    /// `EXISTS (<query>)`
    pub fn where_exists(&self, query: Query) -> Self {
        self.where_(WhereItem::Exists(Arc::new(query)))
    }

    /// Add an OR group: the query matches when its AND conditions hold and any OR group holds.
    pub fn or_where(&self, group: Vec<WhereItem>) -> Self {
        self.derive(|data| data.or.push(group))
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::query::ColumnRef;
    use crate::columns::ColumnType;
    use crate::table::Table;
    use crate::testing::assert_sql;

    fn user() -> Arc<Table> {
        Arc::new(
            Table::new("user")
                .column("id", ColumnType::serial().primary_key())
                .column("name", ColumnType::text())
                .column("groupId", ColumnType::integer().named("group_id").nullable()),
        )
    }

    #[test]
    fn filters_on_db_names() {
        assert_sql!(
            user()
                .query()
                .select(&["id"])
                .where_eq("groupId", 3)
                .where_op("name", Operator::StartsWith("jo".into())),
            r#"SELECT "user"."id" FROM "user" WHERE "user"."group_id" = $1 AND "user"."name" ILIKE $2 || '%'"#,
            3,
            "jo"
        );
    }

    #[test]
    fn or_groups_follow_and_items() {
        assert_sql!(
            user()
                .query()
                .select(&["id"])
                .where_eq("name", "a")
                .or_where(vec![WhereItem::eq("id", 1)])
                .or_where(vec![WhereItem::eq("id", 2)]),
            r#"SELECT "user"."id" FROM "user" WHERE "user"."name" = $1 AND ("user"."id" = $2 OR "user"."id" = $3)"#,
            "a",
            1,
            2
        );
    }

    #[test]
    fn in_single_and_tuple() {
        assert_sql!(
            user()
                .query()
                .select(&["id"])
                .where_in(&["id"], vec![vec![1.into()], vec![2.into()]]),
            r#"SELECT "user"."id" FROM "user" WHERE "user"."id" IN ($1, $2)"#,
            1,
            2
        );

        assert_sql!(
            user()
                .query()
                .select(&["id"])
                .where_in(&["id", "name"], vec![vec![1.into(), "a".into()]]),
            r#"SELECT "user"."id" FROM "user" WHERE ("user"."id", "user"."name") IN (($1, $2))"#,
            1,
            "a"
        );
    }

    #[test]
    fn not_and_exists() {
        let groups = Arc::new(Table::new("group").column("id", ColumnType::serial().primary_key()));
        let exists = groups
            .query()
            .select_raw(RawSql::new("1"))
            .where_columns_eq("id", Expression::Qualified(ColumnRef::new("user", "group_id")));

        assert_sql!(
            user()
                .query()
                .select(&["id"])
                .where_not(vec![WhereItem::eq("name", "x")])
                .where_exists(exists),
            r#"SELECT "user"."id" FROM "user" WHERE NOT ("user"."name" = $1) AND EXISTS (SELECT 1 FROM "group" WHERE "group"."id" = "user"."group_id")"#,
            "x"
        );
    }
}
