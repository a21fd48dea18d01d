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
use crate::table::Table;

use super::{
    Expression, HavingItem, JoinItem, JoinKind, JoinSource, LockSpec, LockStrength, LockTables,
    LockWait, OrderItem, Query, QueryOrRaw, SelectItem, SetOperation, SortDirection, UnionItem,
    WhereItem, WindowItem,
};

impl Query {
    /// Select columns by key (`Key` or `alias.Key` for joined tables).
    pub fn select(&self, columns: &[&str]) -> Self {
        self.derive(|data| {
            for column in columns {
                if let Some((alias, key)) = column.split_once('.') {
                    let parser = data
                        .joined_parsers
                        .get(alias)
                        .and_then(|shape| shape.get(key))
                        .cloned();
                    if let Some(parser) = parser {
                        data.parsers.insert(key.to_string(), parser);
                    }
                }
                data.select.push(SelectItem::Column(column.to_string()));
            }
        })
    }

    /// Select every column of the table, in addition to anything selected so far.
    pub fn select_all(&self) -> Self {
        self.derive(|data| data.select.push(SelectItem::All))
    }

    /// `<expr> AS "alias"`. Selecting a column under another name keeps its codec.
    pub fn select_as(&self, alias: impl Into<String>, expr: impl Into<Expression>) -> Self {
        let alias = alias.into();
        let expr = expr.into();
        let parser = match &expr {
            Expression::Column(key) => self.table.shape().get(key.as_str()).cloned(),
            _ => None,
        };
        self.derive(|data| {
            if let Some(parser) = parser {
                data.parsers.insert(alias.clone(), parser);
            }
            data.select.push(SelectItem::Aliased { alias, expr });
        })
    }

    pub fn select_raw(&self, raw: RawSql) -> Self {
        self.select_item(SelectItem::Raw(raw))
    }

    pub fn select_item(&self, item: SelectItem) -> Self {
        self.derive(|data| data.select.push(item))
    }

    /// Drop the select list, so that every column is returned.
    pub fn clear_select(&self) -> Self {
        self.derive(|data| data.select.clear())
    }

    /// Plain `DISTINCT`
    pub fn distinct(&self) -> Self {
        self.derive_select("distinct", |select| {
            select.distinct.get_or_insert_with(Vec::new);
        })
    }

    /// `DISTINCT ON (columns...)`
    pub fn distinct_on(&self, columns: &[&str]) -> Self {
        self.derive_select("distinct_on", |select| {
            select
                .distinct
                .get_or_insert_with(Vec::new)
                .extend(columns.iter().map(|column| Expression::from(*column)));
        })
    }

    pub fn distinct_raw(&self, raw: RawSql) -> Self {
        self.derive_select("distinct_raw", |select| {
            select
                .distinct
                .get_or_insert_with(Vec::new)
                .push(Expression::Raw(raw));
        })
    }

    pub fn join_item(&self, item: JoinItem) -> Self {
        let alias = item.alias().to_string();
        self.derive(|data| {
            match &item.source {
                JoinSource::Table { table, .. } => {
                    let shape = Arc::new(table.shape().clone());
                    data.joined_shapes.insert(alias.clone(), shape.clone());
                    data.joined_parsers.insert(alias, shape);
                }
                JoinSource::Query { query, .. } | JoinSource::Lateral { query, .. } => {
                    // Sub-query columns come out under their keys, so only the codecs are kept
                    data.joined_parsers
                        .insert(alias, Arc::new(query.table().shape().clone()));
                }
            }
            match &mut data.kind {
                super::QueryKind::Select(select) => select.join.push(item),
                super::QueryKind::Delete(delete) => delete.join.push(item),
                kind => {
                    data.invalid = Some(format!("`join` can't be applied to a {} query", kind.name()))
                }
            }
        })
    }

    /// `JOIN "table" ON <conditions>`, conditions being compiled against the joined table.
    pub fn join(&self, table: &Arc<Table>, conditions: Vec<WhereItem>) -> Self {
        self.join_table(JoinKind::Inner, table, None, conditions)
    }

    pub fn left_join(&self, table: &Arc<Table>, conditions: Vec<WhereItem>) -> Self {
        self.join_table(JoinKind::Left, table, None, conditions)
    }

    pub fn join_table(
        &self,
        kind: JoinKind,
        table: &Arc<Table>,
        alias: Option<&str>,
        conditions: Vec<WhereItem>,
    ) -> Self {
        self.join_item(JoinItem {
            kind,
            source: JoinSource::Table {
                table: table.clone(),
                alias: alias.map(str::to_string),
            },
            conditions,
        })
    }

    /// `JOIN (<query>) "alias" ON <conditions>`
    pub fn join_query(
        &self,
        kind: JoinKind,
        query: Query,
        alias: impl Into<String>,
        conditions: Vec<WhereItem>,
    ) -> Self {
        self.join_item(JoinItem {
            kind,
            source: JoinSource::Query {
                query: Arc::new(query),
                alias: alias.into(),
            },
            conditions,
        })
    }

    /// `JOIN LATERAL (<query>) "alias" ON true`
    pub fn join_lateral(&self, query: Query, alias: impl Into<String>) -> Self {
        self.lateral(JoinKind::Inner, query, alias)
    }

    /// `LEFT JOIN LATERAL (<query>) "alias" ON true`
    pub fn left_join_lateral(&self, query: Query, alias: impl Into<String>) -> Self {
        self.lateral(JoinKind::Left, query, alias)
    }

    fn lateral(&self, kind: JoinKind, query: Query, alias: impl Into<String>) -> Self {
        self.join_item(JoinItem {
            kind,
            source: JoinSource::Lateral {
                query: Arc::new(query),
                alias: alias.into(),
            },
            conditions: vec![],
        })
    }

    pub fn group(&self, columns: &[&str]) -> Self {
        self.derive_select("group", |select| {
            select
                .group
                .extend(columns.iter().map(|column| Expression::from(*column)))
        })
    }

    pub fn group_expr(&self, expr: Expression) -> Self {
        self.derive_select("group", |select| select.group.push(expr))
    }

    pub fn having(&self, item: HavingItem) -> Self {
        self.derive_select("having", |select| select.having.push(item))
    }

    pub fn having_or(&self, group: Vec<HavingItem>) -> Self {
        self.derive_select("having_or", |select| select.having_or.push(group))
    }

    pub fn window(&self, item: WindowItem) -> Self {
        self.derive_select("window", |select| select.window.push(item))
    }

    /// Append a set operation. `wrap` parenthesizes the operand.
    pub fn set_operation(
        &self,
        kind: SetOperation,
        operand: impl Into<QueryOrRaw>,
        wrap: bool,
    ) -> Self {
        let operand = operand.into();
        self.derive_select("union", |select| {
            select.union.push(UnionItem {
                operand,
                kind,
                wrap,
            })
        })
    }

    pub fn union(&self, operand: impl Into<QueryOrRaw>) -> Self {
        self.set_operation(SetOperation::Union, operand, false)
    }

    pub fn union_all(&self, operand: impl Into<QueryOrRaw>) -> Self {
        self.set_operation(SetOperation::UnionAll, operand, false)
    }

    pub fn intersect(&self, operand: impl Into<QueryOrRaw>) -> Self {
        self.set_operation(SetOperation::Intersect, operand, false)
    }

    pub fn intersect_all(&self, operand: impl Into<QueryOrRaw>) -> Self {
        self.set_operation(SetOperation::IntersectAll, operand, false)
    }

    pub fn except(&self, operand: impl Into<QueryOrRaw>) -> Self {
        self.set_operation(SetOperation::Except, operand, false)
    }

    pub fn except_all(&self, operand: impl Into<QueryOrRaw>) -> Self {
        self.set_operation(SetOperation::ExceptAll, operand, false)
    }

    pub fn order(&self, column: &str) -> Self {
        self.order_item(OrderItem {
            expr: column.into(),
            direction: None,
        })
    }

    pub fn order_by(&self, column: &str, direction: SortDirection) -> Self {
        self.order_item(OrderItem {
            expr: column.into(),
            direction: Some(direction),
        })
    }

    pub fn order_raw(&self, raw: RawSql) -> Self {
        self.order_item(OrderItem {
            expr: raw.into(),
            direction: None,
        })
    }

    pub fn order_item(&self, item: OrderItem) -> Self {
        self.derive_select("order", |select| select.order.push(item))
    }

    pub fn limit(&self, limit: u64) -> Self {
        self.derive_select("limit", |select| select.limit = Some(limit))
    }

    pub fn offset(&self, offset: u64) -> Self {
        self.derive_select("offset", |select| select.offset = Some(offset))
    }

    fn lock(&self, strength: LockStrength) -> Self {
        self.derive_select("for", |select| {
            select.lock = Some(LockSpec {
                strength,
                tables: None,
                wait: None,
            })
        })
    }

    pub fn for_update(&self) -> Self {
        self.lock(LockStrength::Update)
    }

    pub fn for_no_key_update(&self) -> Self {
        self.lock(LockStrength::NoKeyUpdate)
    }

    pub fn for_share(&self) -> Self {
        self.lock(LockStrength::Share)
    }

    pub fn for_key_share(&self) -> Self {
        self.lock(LockStrength::KeyShare)
    }

    fn modify_lock(&self, method: &str, modify: impl FnOnce(&mut LockSpec)) -> Self {
        self.derive(|data| {
            let lock = match &mut data.kind {
                super::QueryKind::Select(select) => select.lock.as_mut(),
                _ => None,
            };
            match lock {
                Some(lock) => modify(lock),
                None => data.invalid = Some(format!("`{method}` requires a row lock")),
            }
        })
    }

    /// `FOR ... OF "table", ...`
    pub fn lock_of(&self, tables: &[&str]) -> Self {
        let tables = tables.iter().map(|table| table.to_string()).collect();
        self.modify_lock("lock_of", |lock| lock.tables = Some(LockTables::Names(tables)))
    }

    pub fn lock_of_raw(&self, raw: RawSql) -> Self {
        self.modify_lock("lock_of_raw", |lock| lock.tables = Some(LockTables::Raw(raw)))
    }

    pub fn no_wait(&self) -> Self {
        self.modify_lock("no_wait", |lock| lock.wait = Some(LockWait::NoWait))
    }

    pub fn skip_locked(&self) -> Self {
        self.modify_lock("skip_locked", |lock| lock.wait = Some(LockWait::SkipLocked))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnType;
    use crate::query::Operator;
    use crate::testing::assert_sql;
    use crate::value::Value;

    fn user() -> Arc<Table> {
        Arc::new(
            Table::new("user")
                .column("id", ColumnType::serial().primary_key())
                .column("name", ColumnType::text()),
        )
    }

    fn profile() -> Arc<Table> {
        Arc::new(
            Table::new("profile")
                .column("id", ColumnType::serial().primary_key())
                .column("userId", ColumnType::integer().named("user_id"))
                .column("bio", ColumnType::text().nullable()),
        )
    }

    #[test]
    fn distinct_variants() {
        assert_sql!(
            user().query().as_("t").distinct(),
            r#"SELECT DISTINCT "t".* FROM "user" AS "t""#
        );
        assert_sql!(
            user().query().as_("t").distinct_on(&["id", "name"]),
            r#"SELECT DISTINCT ON ("t"."id", "t"."name") "t".* FROM "user" AS "t""#
        );
        assert_sql!(
            user().query().distinct_raw(RawSql::new("lower(name)")),
            r#"SELECT DISTINCT ON (lower(name)) "user".* FROM "user""#
        );
    }

    #[test]
    fn renamed_columns_are_selected_under_their_keys() {
        assert_sql!(
            profile().query(),
            r#"SELECT "profile"."id", "profile"."user_id" AS "userId", "profile"."bio" FROM "profile""#
        );
        assert_sql!(
            profile().query().select(&["userId"]).select_as("owner", "userId"),
            r#"SELECT "profile"."user_id" AS "userId", "profile"."user_id" AS "owner" FROM "profile""#
        );
    }

    #[test]
    fn joins_resolve_against_joined_table() {
        let query = user()
            .query()
            .as_("u")
            .join(
                &profile(),
                vec![
                    WhereItem::Equals {
                        left: "profile.userId".into(),
                        right: "u.id".into(),
                    },
                    WhereItem::eq("bio", "text"),
                ],
            )
            .select(&["name", "profile.bio"]);

        assert_sql!(
            query,
            r#"SELECT "u"."name", "profile"."bio" FROM "user" AS "u" JOIN "profile" ON "profile"."user_id" = "u"."id" AND "profile"."bio" = $1"#,
            "text"
        );
        assert!(query.data().parsers.contains_key("bio"));
    }

    #[test]
    fn lateral_join() {
        let sub = profile()
            .query()
            .as_("p")
            .select(&["bio"])
            .where_eq("bio", "x")
            .where_columns_eq("userId", Expression::from("user.id"));

        assert_sql!(
            user().query().join_lateral(sub, "p").select(&["name", "p.bio"]),
            r#"SELECT "user"."name", "p"."bio" FROM "user" JOIN LATERAL (SELECT "p"."bio" FROM "profile" AS "p" WHERE "p"."bio" = $1 AND "p"."user_id" = "user"."id") "p" ON true"#,
            "x"
        );
    }

    #[test]
    fn grouping_and_windows() {
        let query = profile()
            .query()
            .select_as("count", Expression::Function("count".into(), vec![Expression::Star]))
            .group(&["userId"])
            .having(HavingItem::Aggregate {
                function: "count".into(),
                arg: Expression::Star,
                op: Operator::Gt(Value::from(1)),
            })
            .window(WindowItem::Definition {
                name: "w".into(),
                partition_by: vec!["userId".into()],
                order: vec![OrderItem {
                    expr: "id".into(),
                    direction: Some(SortDirection::Desc),
                }],
            });

        assert_sql!(
            query,
            r#"SELECT count(*) AS "count" FROM "profile" GROUP BY "profile"."user_id" HAVING count(*) > $1 WINDOW "w" AS (PARTITION BY "profile"."user_id" ORDER BY "profile"."id" DESC)"#,
            1
        );
    }

    #[test]
    fn having_groups_follow_and_items() {
        let count = |op: Operator| HavingItem::Aggregate {
            function: "count".into(),
            arg: Expression::Star,
            op,
        };
        let query = profile()
            .query()
            .select(&["userId"])
            .or_where(vec![WhereItem::eq("bio", "a")])
            .or_where(vec![WhereItem::eq("bio", "b")])
            .group(&["userId"])
            .having(count(Operator::Gt(Value::from(1))))
            .having_or(vec![count(Operator::Lt(Value::from(5)))])
            .having_or(vec![count(Operator::Eq(Value::from(10)))]);

        assert_sql!(
            query,
            r#"SELECT "profile"."user_id" AS "userId" FROM "profile" WHERE "profile"."bio" = $1 OR "profile"."bio" = $2 GROUP BY "profile"."user_id" HAVING count(*) > $3 AND (count(*) < $4 OR count(*) = $5)"#,
            "a",
            "b",
            1,
            5,
            10
        );
    }

    #[test]
    fn set_operations_order_and_paging() {
        let other = user().query().select(&["id"]).where_eq("name", "b");
        let query = user()
            .query()
            .select(&["id"])
            .where_eq("name", "a")
            .union_all(other)
            .set_operation(SetOperation::Except, RawSql::new("SELECT $1").values(vec![3.into()]), true)
            .order_by("id", SortDirection::AscNullsLast)
            .limit(10)
            .offset(20);

        assert_sql!(
            query,
            r#"SELECT "user"."id" FROM "user" WHERE "user"."name" = $1 UNION ALL SELECT "user"."id" FROM "user" WHERE "user"."name" = $2 EXCEPT (SELECT $3) ORDER BY "user"."id" ASC NULLS LAST LIMIT 10 OFFSET 20"#,
            "a",
            "b",
            3
        );
    }

    #[test]
    fn row_locks() {
        assert_sql!(
            user().query().for_update().lock_of(&["user"]).skip_locked(),
            r#"SELECT "user".* FROM "user" FOR UPDATE OF "user" SKIP LOCKED"#
        );
        assert_sql!(
            user().query().for_key_share().no_wait(),
            r#"SELECT "user".* FROM "user" FOR KEY SHARE NOWAIT"#
        );

        let error = user().query().no_wait().to_sql().unwrap_err();
        assert!(matches!(error, crate::error::QueryError::Invalid(_)));
    }
}
