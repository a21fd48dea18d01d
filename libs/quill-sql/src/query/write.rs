// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use indexmap::IndexMap;

use crate::sql::RawSql;
use crate::value::{Record, Value};

use super::{
    ColumnInfoData, ConflictAction, ConflictTarget, CopyData, DeleteData, InsertData, InsertValue,
    InsertValues, MergeSpec, OnConflict, Query, QueryData, QueryKind, ReturnType, SelectItem,
    TruncateData, UpdateData, UpdateItem, UpdateValue,
};

/// What a write returns: the record for single-record queries, records when something was
/// selected, the row count otherwise.
fn write_return_type(data: &QueryData) -> ReturnType {
    match data.return_type {
        ReturnType::One | ReturnType::OneOrThrow => data.return_type,
        _ if !data.select.is_empty() => ReturnType::All,
        _ => ReturnType::RowCount,
    }
}

/// Column keys in first-seen order across `records`.
fn record_columns(records: &[Record]) -> Vec<String> {
    let mut columns: Vec<String> = vec![];
    for record in records {
        for key in record.keys() {
            if !columns.contains(key) {
                columns.push(key.clone());
            }
        }
    }
    columns
}

impl Query {
    fn into_insert(&self, columns: Vec<String>, values: InsertValues, return_type: ReturnType) -> Self {
        self.derive(|data| {
            data.kind = QueryKind::Insert(InsertData {
                columns,
                values,
                on_conflict: None,
            });
            data.return_type = return_type;
        })
    }

    fn insert_records(&self, records: Vec<Record>, return_type: ReturnType) -> Self {
        let columns = record_columns(&records);
        let rows = records
            .iter()
            .map(|record| {
                columns
                    .iter()
                    .map(|column| match record.get(column) {
                        Some(value) => InsertValue::Value(value.clone()),
                        None => InsertValue::Default,
                    })
                    .collect()
            })
            .collect();

        self.into_insert(columns, InsertValues::Matrix(rows), return_type)
    }

    /// Insert one record and return it.
    pub fn create(&self, record: Record) -> Self {
        self.insert_records(vec![record], ReturnType::OneOrThrow)
    }

    /// Insert records and return them. Columns missing from a record get their default.
    pub fn create_many(&self, records: Vec<Record>) -> Self {
        self.insert_records(records, ReturnType::All)
    }

    /// Insert one record and return the row count.
    pub fn insert(&self, record: Record) -> Self {
        self.insert_records(vec![record], ReturnType::RowCount)
    }

    pub fn insert_many(&self, records: Vec<Record>) -> Self {
        self.insert_records(records, ReturnType::RowCount)
    }

    /// `INSERT INTO "t"(columns) VALUES (<raw>)`, returning the record.
    pub fn create_raw(&self, columns: &[&str], values: RawSql) -> Self {
        self.create_many_raw(columns, vec![values])
            .derive(|data| data.return_type = ReturnType::OneOrThrow)
    }

    pub fn create_many_raw(&self, columns: &[&str], values: Vec<RawSql>) -> Self {
        let columns = columns.iter().map(|column| column.to_string()).collect();
        self.into_insert(columns, InsertValues::Raw(values), ReturnType::All)
    }

    /// `INSERT ... SELECT`: the columns selected by `query`, followed by `values` bound as
    /// constants, become the inserted row.
    pub fn create_from(&self, query: Query, values: Record) -> Self {
        let mut columns = vec![];
        let mut invalid = None;
        for item in &query.data().select {
            match item {
                SelectItem::Column(key) => {
                    columns.push(key.rsplit('.').next().unwrap_or(key).to_string())
                }
                SelectItem::Aliased { alias, .. } => columns.push(alias.clone()),
                _ => invalid = Some("`create_from` needs a query selecting named columns"),
            }
        }
        columns.extend(values.keys().cloned());

        let inserted = self.into_insert(
            columns,
            InsertValues::From {
                query: std::sync::Arc::new(query),
                values: values.into_values().collect(),
            },
            ReturnType::OneOrThrow,
        );
        match invalid {
            Some(reason) => inserted.derive(|data| data.invalid = Some(reason.to_string())),
            None => inserted,
        }
    }

    fn on_conflict(&self, on_conflict: OnConflict) -> Self {
        self.derive(|data| match &mut data.kind {
            QueryKind::Insert(insert) => insert.on_conflict = Some(on_conflict),
            kind => {
                data.invalid = Some(format!(
                    "`on_conflict` can't be applied to a {} query",
                    kind.name()
                ))
            }
        })
    }

    /// `ON CONFLICT [target] DO NOTHING`
    pub fn on_conflict_ignore(&self, target: Option<ConflictTarget>) -> Self {
        self.on_conflict(OnConflict {
            target,
            action: ConflictAction::Ignore,
        })
    }

    /// `ON CONFLICT target DO UPDATE SET ...`
    pub fn on_conflict_merge(&self, target: ConflictTarget, merge: MergeSpec) -> Self {
        self.on_conflict(OnConflict {
            target: Some(target),
            action: ConflictAction::Merge(merge),
        })
    }

    /// Add an update entry, turning a select into an UPDATE of the records it matches.
    pub fn update_item(&self, item: UpdateItem) -> Self {
        self.derive(|data| match &mut data.kind {
            QueryKind::Update(update) => update.items.push(item),
            QueryKind::Select(select) => {
                if !select.join.is_empty() {
                    data.invalid = Some("`update` can't be applied to a query with joins".into());
                }
                let mut items = vec![item];
                items.extend(data.injectors.iter().cloned().map(UpdateItem::Inject));

                data.kind = QueryKind::Update(UpdateData { items });
                data.return_type = write_return_type(data);
            }
            kind => {
                data.invalid = Some(format!("`update` can't be applied to a {} query", kind.name()))
            }
        })
    }

    pub fn update(&self, record: Record) -> Self {
        self.update_values(
            record
                .into_iter()
                .map(|(key, value)| (key, UpdateValue::Value(value)))
                .collect(),
        )
    }

    pub fn update_values(&self, values: IndexMap<String, UpdateValue>) -> Self {
        self.update_item(UpdateItem::Set(values))
    }

    pub fn update_raw(&self, raw: RawSql) -> Self {
        self.update_item(UpdateItem::Raw(raw))
    }

    /// `"column" = "column" + by`
    pub fn increment(&self, column: impl Into<String>, by: impl Into<Value>) -> Self {
        self.update_values(IndexMap::from([(
            column.into(),
            UpdateValue::Increment(by.into()),
        )]))
    }

    /// `"column" = "column" - by`
    pub fn decrement(&self, column: impl Into<String>, by: impl Into<Value>) -> Self {
        self.update_values(IndexMap::from([(
            column.into(),
            UpdateValue::Decrement(by.into()),
        )]))
    }

    /// Delete the records the query matches. Joins become `USING` sources.
    pub fn delete(&self) -> Self {
        self.derive(|data| match &mut data.kind {
            QueryKind::Select(select) => {
                let join = std::mem::take(&mut select.join);
                data.kind = QueryKind::Delete(DeleteData { join });
                data.return_type = write_return_type(data);
            }
            QueryKind::Delete(_) => {}
            kind => {
                data.invalid = Some(format!("`delete` can't be applied to a {} query", kind.name()))
            }
        })
    }

    pub fn truncate(&self, options: TruncateData) -> Self {
        self.derive(|data| {
            data.kind = QueryKind::Truncate(options);
            data.return_type = ReturnType::Void;
        })
    }

    /// Column metadata from `information_schema`, for one column or all of them.
    pub fn column_info(&self, column: Option<&str>) -> Self {
        let column = column.map(str::to_string);
        self.derive(|data| {
            data.kind = QueryKind::ColumnInfo(ColumnInfoData { column });
            data.return_type = ReturnType::All;
        })
    }

    pub fn copy(&self, copy: CopyData) -> Self {
        self.derive(|data| {
            data.kind = QueryKind::Copy(copy);
            data.return_type = ReturnType::Void;
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::columns::ColumnType;
    use crate::error::QueryError;
    use crate::query::{
        CopyDirection, CopyFormat, CopyHeader, CopyOptions, CopyTarget, ForceQuote, Injector,
    };
    use crate::record;
    use crate::table::Table;
    use crate::testing::assert_sql;

    fn user() -> Arc<Table> {
        Arc::new(
            Table::new("user")
                .column("id", ColumnType::serial().primary_key())
                .column("name", ColumnType::text())
                .column("age", ColumnType::integer().nullable())
                .column("meta", ColumnType::jsonb().nullable()),
        )
    }

    #[test]
    fn create_with_defaults_for_missing_cells() {
        let query = user()
            .query()
            .select(&["id"])
            .create_many(vec![record! { "name" => "a" }, record! { "age" => 3 }]);

        assert_sql!(
            query,
            r#"INSERT INTO "user"("name", "age") VALUES ($1, DEFAULT), (DEFAULT, $2) RETURNING "user"."id""#,
            "a",
            3
        );
    }

    #[test]
    fn insert_returns_row_count() {
        let query = user().query().insert(record! { "name" => "a" });
        assert_eq!(query.data().return_type, ReturnType::RowCount);
        assert_sql!(query, r#"INSERT INTO "user"("name") VALUES ($1)"#, "a");
    }

    #[test]
    fn create_encodes_json_columns() {
        let meta = serde_json::json!({ "a": 1 });
        let query = user()
            .query()
            .create(record! { "name" => "a", "meta" => meta.clone() });

        let sql = query.to_sql().unwrap();
        assert_eq!(
            sql.text,
            r#"INSERT INTO "user"("name", "meta") VALUES ($1, $2) RETURNING "user".*"#
        );
        assert_eq!(sql.values[1], Value::Json(meta));
    }

    #[test]
    fn create_from_query() {
        let source = user()
            .query()
            .select_as("ownerId", "id")
            .where_eq("id", 1)
            .limit(1);
        let query = user()
            .query()
            .select(&["id"])
            .create_from(source, record! { "name" => "copy" });

        assert_sql!(
            query,
            r#"INSERT INTO "user"("ownerId", "name") SELECT "user"."id" AS "ownerId", $1 FROM "user" WHERE "user"."id" = $2 LIMIT 1 RETURNING "user"."id""#,
            "copy",
            1
        );
    }

    #[test]
    fn on_conflict_variants() {
        let create = user().query().insert(record! { "id" => 1, "name" => "a" });

        assert_sql!(
            create.on_conflict_ignore(None),
            r#"INSERT INTO "user"("id", "name") VALUES ($1, $2) ON CONFLICT DO NOTHING"#,
            1,
            "a"
        );
        assert_sql!(
            create.on_conflict_merge(ConflictTarget::Columns(vec!["id".into()]), MergeSpec::All),
            r#"INSERT INTO "user"("id", "name") VALUES ($1, $2) ON CONFLICT ("id") DO UPDATE SET "name" = excluded."name""#,
            1,
            "a"
        );
        assert_sql!(
            create.on_conflict_merge(
                ConflictTarget::Constraint("user_pkey".into()),
                MergeSpec::Values(record! { "name" => "b" })
            ),
            r#"INSERT INTO "user"("id", "name") VALUES ($1, $2) ON CONFLICT ON CONSTRAINT "user_pkey" DO UPDATE SET "name" = $3"#,
            1,
            "a",
            "b"
        );

        let error = user().query().on_conflict_ignore(None).to_sql().unwrap_err();
        assert!(matches!(error, QueryError::Invalid(_)));
    }

    #[test]
    fn update_last_write_wins() {
        let query = user()
            .query()
            .where_eq("id", 1)
            .update(record! { "name" => "a", "age" => 1 })
            .increment("age", 2)
            .update_raw(RawSql::new("\"meta\" = NULL"));

        assert_eq!(query.data().return_type, ReturnType::RowCount);
        assert_sql!(
            query,
            r#"UPDATE "user" SET "name" = $1, "age" = "age" + $2, "meta" = NULL WHERE "user"."id" = $3"#,
            "a",
            2,
            1
        );
    }

    #[test]
    fn update_runs_injectors() {
        let injector = Injector(Arc::new(|items: &[UpdateItem]| {
            (!items.iter().any(|item| item.sets("age")))
                .then(|| UpdateItem::Raw(RawSql::new("\"age\" = 0")))
        }));
        let base = user().query().with_injector(injector);

        assert_sql!(
            base.update(record! { "name" => "a" }),
            r#"UPDATE "user" SET "name" = $1, "age" = 0"#,
            "a"
        );
        assert_sql!(
            base.update(record! { "age" => 5 }),
            r#"UPDATE "user" SET "age" = $1"#,
            5
        );
    }

    #[test]
    fn update_requires_values_and_no_joins() {
        let error = user().query().update(Record::new()).to_sql().unwrap_err();
        assert!(matches!(error, QueryError::Invalid(_)));

        let joined = user()
            .query()
            .join(&user(), vec![])
            .update(record! { "name" => "a" });
        assert!(matches!(joined.to_sql(), Err(QueryError::Invalid(_))));
    }

    #[test]
    fn delete_moves_joins_to_using_and_skips_lateral() {
        let other = Arc::new(
            Table::new("post")
                .column("id", ColumnType::serial().primary_key())
                .column("authorId", ColumnType::integer()),
        );
        let lateral = other.query().as_("l").where_eq("id", 5);

        let query = user()
            .query()
            .where_eq("name", "a")
            .join(
                &other,
                vec![crate::query::WhereItem::Equals {
                    left: "authorId".into(),
                    right: "user.id".into(),
                }],
            )
            .join_lateral(lateral, "l")
            .delete();

        assert_sql!(
            query,
            r#"DELETE FROM "user" USING "post" WHERE "user"."name" = $1 AND "post"."authorId" = "user"."id""#,
            "a"
        );

        assert_sql!(
            user().query().as_("u").select(&["id"]).delete(),
            r#"DELETE FROM "user" AS "u" RETURNING "u"."id""#
        );
    }

    #[test]
    fn delete_ands_join_conditions_onto_or_groups() {
        let other = Arc::new(
            Table::new("post")
                .column("id", ColumnType::serial().primary_key())
                .column("authorId", ColumnType::integer()),
        );

        let query = user()
            .query()
            .or_where(vec![crate::query::WhereItem::eq("name", "a")])
            .or_where(vec![crate::query::WhereItem::eq("name", "b")])
            .join(
                &other,
                vec![crate::query::WhereItem::Equals {
                    left: "authorId".into(),
                    right: "user.id".into(),
                }],
            )
            .delete();

        assert_sql!(
            query,
            r#"DELETE FROM "user" USING "post" WHERE ("user"."name" = $1 OR "user"."name" = $2) AND "post"."authorId" = "user"."id""#,
            "a",
            "b"
        );
    }

    #[test]
    fn truncate_and_column_info() {
        assert_sql!(
            user().query().truncate(TruncateData {
                restart_identity: true,
                cascade: true
            }),
            r#"TRUNCATE "user" RESTART IDENTITY CASCADE"#
        );
        assert_sql!(
            user().query().column_info(Some("name")),
            r#"SELECT column_name, column_default, data_type, character_maximum_length, is_nullable FROM information_schema.columns WHERE table_name = $1 AND table_catalog = current_database() AND table_schema = current_schema() AND column_name = $2"#,
            "user",
            "name"
        );
    }

    #[test]
    fn copy_options() {
        let query = user().query().copy(CopyData {
            direction: CopyDirection::To,
            columns: vec!["id".into(), "name".into()],
            target: CopyTarget::Path("/tmp/user's.csv".into()),
            options: CopyOptions {
                format: Some(CopyFormat::Csv),
                header: Some(CopyHeader::Enabled(true)),
                delimiter: Some(";".into()),
                force_quote: Some(ForceQuote::All),
                ..Default::default()
            },
        });

        assert_sql!(
            query,
            r#"COPY "user"("id", "name") TO '/tmp/user''s.csv' WITH (FORMAT csv, DELIMITER ';', HEADER true, FORCE_QUOTE *)"#
        );

        let stdin_to = user().query().copy(CopyData {
            direction: CopyDirection::To,
            columns: vec![],
            target: CopyTarget::Stdin,
            options: CopyOptions::default(),
        });
        assert!(matches!(stdin_to.to_sql(), Err(QueryError::Invalid(_))));
    }
}
