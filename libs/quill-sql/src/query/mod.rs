// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The fluent query builder.
//!
//! A [`Query`] is immutable from the caller's point of view: every builder method takes `&self`
//! and returns a derived query, so a base query can be extended in several directions without
//! the branches affecting each other.

mod data;
mod execute;
mod filter;
mod select;
mod types;
mod write;

use std::sync::{Arc, OnceLock};

use crate::error::QueryError;
use crate::logger::QueryLogger;
use crate::sql::{RawSql, Sql, compile};
use crate::table::Table;
use crate::value::Record;

pub use data::*;
pub use execute::{ColumnInfo, QueryOutput};
pub use types::*;

#[derive(Debug)]
pub struct Query {
    table: Arc<Table>,
    data: QueryData,
    /// Memoized compilation of `data`
    sql: OnceLock<Sql>,
}

impl Clone for Query {
    fn clone(&self) -> Self {
        Self {
            table: self.table.clone(),
            data: self.data.clone(),
            sql: OnceLock::new(),
        }
    }
}

impl From<Query> for QueryOrRaw {
    fn from(query: Query) -> Self {
        QueryOrRaw::Query(Arc::new(query))
    }
}

impl From<RawSql> for QueryOrRaw {
    fn from(raw: RawSql) -> Self {
        QueryOrRaw::Raw(raw)
    }
}

impl Query {
    /// A select query over every column of `table`.
    pub fn new(table: Arc<Table>) -> Self {
        Self {
            table,
            data: QueryData::default(),
            sql: OnceLock::new(),
        }
    }

    pub fn table(&self) -> &Table {
        &self.table
    }

    pub fn table_arc(&self) -> &Arc<Table> {
        &self.table
    }

    pub fn data(&self) -> &QueryData {
        &self.data
    }

    /// Mutable access to the data, dropping the memoized SQL.
    pub fn data_mut(&mut self) -> &mut QueryData {
        self.sql = OnceLock::new();
        &mut self.data
    }

    /// The alias columns are qualified with: the `as_` alias or the table name.
    pub fn alias(&self) -> &str {
        self.data.alias.as_deref().unwrap_or(self.table.name())
    }

    /// Whether the query is statically known to target at most one record.
    pub fn returns_single(&self) -> bool {
        self.data.return_type.is_single()
    }

    /// Compile the query. The result is memoized, so compiling the same query twice yields the
    /// same statement without walking the data again.
    pub fn to_sql(&self) -> Result<Sql, QueryError> {
        if let Some(sql) = self.sql.get() {
            return Ok(sql.clone());
        }
        let sql = compile(self)?;
        Ok(self.sql.get_or_init(|| sql).clone())
    }

    /// Derive a query with `modify` applied to a copy of the data.
    pub(crate) fn derive(&self, modify: impl FnOnce(&mut QueryData)) -> Self {
        let mut query = self.clone();
        modify(&mut query.data);
        query
    }

    /// Derive a query that must be a select, recording an invalid combination otherwise.
    pub(crate) fn derive_select(&self, method: &str, modify: impl FnOnce(&mut SelectData)) -> Self {
        self.derive(|data| match &mut data.kind {
            QueryKind::Select(select) => modify(select),
            kind => {
                data.invalid = Some(format!(
                    "`{method}` can't be applied to a {} query",
                    kind.name()
                ))
            }
        })
    }

    pub fn as_(&self, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.derive(|data| data.alias = Some(alias))
    }

    /// Select from another table or CTE by name, keeping this query's columns.
    pub fn from(&self, name: impl Into<String>) -> Self {
        let name = name.into();
        self.derive(|data| {
            if data.alias.is_none() {
                data.alias = Some(name.clone());
            }
            data.from = Some(FromSource::Name(name));
        })
    }

    /// `FROM (<query>) AS "alias"`. The alias also becomes this query's alias.
    pub fn from_query(&self, query: Query, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        self.derive(|data| {
            data.alias = Some(alias.clone());
            data.from = Some(FromSource::Query {
                query: Arc::new(query),
                alias,
            });
        })
    }

    pub fn from_raw(&self, raw: RawSql) -> Self {
        self.derive(|data| data.from = Some(FromSource::Raw(raw)))
    }

    /// `FROM ONLY`, excluding inheriting tables.
    pub fn only(&self) -> Self {
        self.derive_select("only", |select| select.only = true)
    }

    /// Add a CTE: `WITH "name" AS (<source>)`.
    pub fn with(&self, name: impl Into<String>, source: impl Into<QueryOrRaw>) -> Self {
        self.with_item(WithItem {
            name: name.into(),
            columns: None,
            recursive: false,
            materialized: None,
            source: source.into(),
        })
    }

    pub fn with_item(&self, item: WithItem) -> Self {
        self.derive(|data| data.with.push(item))
    }

    pub fn with_logger(&self, logger: Arc<dyn QueryLogger>) -> Self {
        self.derive(|data| data.logger = Some(logger))
    }

    pub fn before_query(
        &self,
        hook: impl Fn(&Query) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.before_query.push(Arc::new(hook)))
    }

    pub fn after_query(
        &self,
        hook: impl Fn(&Query, &[Record]) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.after_query.push(Arc::new(hook)))
    }

    pub fn before_create(
        &self,
        hook: impl Fn(&Query) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.before_create.push(Arc::new(hook)))
    }

    pub fn after_create(
        &self,
        hook: impl Fn(&Query, &[Record]) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.after_create.push(Arc::new(hook)))
    }

    pub fn before_update(
        &self,
        hook: impl Fn(&Query) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.before_update.push(Arc::new(hook)))
    }

    pub fn after_update(
        &self,
        hook: impl Fn(&Query, &[Record]) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.after_update.push(Arc::new(hook)))
    }

    pub fn before_delete(
        &self,
        hook: impl Fn(&Query) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.before_delete.push(Arc::new(hook)))
    }

    pub fn after_delete(
        &self,
        hook: impl Fn(&Query, &[Record]) -> Result<(), QueryError> + Send + Sync + 'static,
    ) -> Self {
        self.derive(|data| data.hooks.after_delete.push(Arc::new(hook)))
    }

    /// Merge hooks (e.g. a table's lifecycle hooks) into this query.
    pub fn with_hooks(&self, hooks: &QueryHooks) -> Self {
        self.derive(|data| {
            let target = &mut data.hooks;
            target.before_query.extend(hooks.before_query.iter().cloned());
            target.after_query.extend(hooks.after_query.iter().cloned());
            target.before_create.extend(hooks.before_create.iter().cloned());
            target.after_create.extend(hooks.after_create.iter().cloned());
            target.before_update.extend(hooks.before_update.iter().cloned());
            target.after_update.extend(hooks.after_update.iter().cloned());
            target.before_delete.extend(hooks.before_delete.iter().cloned());
            target.after_delete.extend(hooks.after_delete.iter().cloned());
        })
    }

    /// Append `injector`'s entry to every UPDATE derived from this query.
    pub fn with_injector(&self, injector: Injector) -> Self {
        self.derive(|data| data.injectors.push(injector))
    }

    /// A select over the same table that only keeps the hooks, logger and injectors, for
    /// statements issued on behalf of this query (e.g. by nested writes).
    pub fn base(&self) -> Self {
        let mut query = Query::new(self.table.clone());
        query.data.hooks = self.data.hooks.clone();
        query.data.logger = self.data.logger.clone();
        query.data.injectors = self.data.injectors.clone();
        query
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::columns::ColumnType;
    use crate::testing::assert_sql;

    fn user() -> Arc<Table> {
        Arc::new(
            Table::new("user")
                .column("id", ColumnType::serial().primary_key())
                .column("name", ColumnType::text()),
        )
    }

    #[test]
    fn derived_queries_are_independent() {
        let base = user().query().where_eq("name", "a");
        let base_sql = base.to_sql().unwrap();

        let derived = base.where_eq("id", 1);
        assert_sql!(
            derived,
            r#"SELECT "user".* FROM "user" WHERE "user"."name" = $1 AND "user"."id" = $2"#,
            "a",
            1
        );
        assert_eq!(base.to_sql().unwrap(), base_sql);
        assert_sql!(
            base,
            r#"SELECT "user".* FROM "user" WHERE "user"."name" = $1"#,
            "a"
        );
    }

    #[test]
    fn memoizes_compilation() {
        let query = user().query().where_eq("id", 1);
        assert_eq!(query.to_sql().unwrap(), query.to_sql().unwrap());
        assert!(query.sql.get().is_some());
        assert!(query.clone().sql.get().is_none());
    }

    #[test]
    fn alias_and_from() {
        assert_sql!(
            user().query().as_("u").select(&["name"]),
            r#"SELECT "u"."name" FROM "user" AS "u""#
        );

        let inner = user().query().select(&["id"]);
        assert_sql!(
            user().query().from_query(inner, "t").where_eq("id", 1),
            r#"SELECT "t".* FROM (SELECT "user"."id" FROM "user") AS "t" WHERE "t"."id" = $1"#,
            1
        );

        assert_sql!(
            user().query().only(),
            r#"SELECT "user".* FROM ONLY "user""#
        );
    }

    #[test]
    fn with_cte() {
        let query = user()
            .query()
            .with_item(WithItem {
                name: "named".into(),
                columns: Some(vec!["id".into()]),
                recursive: true,
                materialized: Some(false),
                source: RawSql::new("SELECT 1").into(),
            })
            .from("named");

        assert_sql!(
            query,
            r#"WITH RECURSIVE "named"("id") AS NOT MATERIALIZED (SELECT 1) SELECT "named".* FROM "named""#
        );
    }
}
