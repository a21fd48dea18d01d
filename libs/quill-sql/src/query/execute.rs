// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::time::Instant;

use indexmap::IndexMap;
use tracing::instrument;

use crate::adapter::{Executor, QueryResult};
use crate::columns::ColumnCodec;
use crate::error::QueryError;
use crate::logger::LogEvent;
use crate::sql::{RawSql, Sql};
use crate::value::{Record, Value};

use super::{AfterHook, BeforeHook, Expression, Query, QueryKind, ReturnType, SelectItem};

/// The result of executing a query, shaped by its [`ReturnType`].
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    All(Vec<Record>),
    One(Option<Record>),
    Rows(Vec<Vec<Value>>),
    Pluck(Vec<Value>),
    Value(Option<Value>),
    RowCount(u64),
    Void,
    /// Column metadata by column name
    ColumnInfo(IndexMap<String, ColumnInfo>),
}

impl QueryOutput {
    /// Records returned by the query (an empty list for non-record outputs).
    pub fn into_records(self) -> Vec<Record> {
        match self {
            QueryOutput::All(records) => records,
            QueryOutput::One(record) => record.into_iter().collect(),
            _ => vec![],
        }
    }

    pub fn into_record(self) -> Option<Record> {
        self.into_records().into_iter().next()
    }

    pub fn into_value(self) -> Option<Value> {
        match self {
            QueryOutput::Value(value) => value,
            QueryOutput::Pluck(values) => values.into_iter().next(),
            _ => None,
        }
    }

    pub fn row_count(&self) -> u64 {
        match self {
            QueryOutput::All(records) => records.len() as u64,
            QueryOutput::One(record) => record.is_some() as u64,
            QueryOutput::Rows(rows) => rows.len() as u64,
            QueryOutput::Pluck(values) => values.len() as u64,
            QueryOutput::Value(value) => value.is_some() as u64,
            QueryOutput::RowCount(count) => *count,
            QueryOutput::Void => 0,
            QueryOutput::ColumnInfo(columns) => columns.len() as u64,
        }
    }
}

/// One column as described by `information_schema.columns`.
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnInfo {
    pub default_value: Option<String>,
    pub data_type: String,
    pub max_length: Option<i64>,
    pub nullable: bool,
}

impl ColumnInfo {
    fn from_record(record: &Record) -> Option<(String, ColumnInfo)> {
        let name = record.get("column_name")?.as_str()?.to_string();
        let info = ColumnInfo {
            default_value: record
                .get("column_default")
                .and_then(Value::as_str)
                .map(str::to_string),
            data_type: record
                .get("data_type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            max_length: record
                .get("character_maximum_length")
                .and_then(Value::as_i64),
            nullable: record.get("is_nullable").and_then(Value::as_str) == Some("YES"),
        };
        Some((name, info))
    }
}

/// Finders and return type selection.
impl Query {
    /// Override what executing the query returns.
    pub fn returning(&self, return_type: ReturnType) -> Self {
        self.derive(|data| data.return_type = return_type)
    }

    fn primary_key(&self) -> Result<&str, QueryError> {
        match self.table.primary_keys() {
            [key] => Ok(key),
            keys => Err(QueryError::Invalid(format!(
                "`find` needs a single primary key column, `{}` has {}",
                self.table.name(),
                keys.len()
            ))),
        }
    }

    fn find_with(&self, value: Value, return_type: ReturnType) -> Self {
        match self.primary_key() {
            Ok(key) => self.where_eq(key, value).limit(1).returning(return_type),
            Err(error) => self.derive(|data| data.invalid = Some(error.to_string())),
        }
    }

    /// The record with the given primary key, failing with [`QueryError::NotFound`].
    pub fn find(&self, value: impl Into<Value>) -> Self {
        self.find_with(value.into(), ReturnType::OneOrThrow)
    }

    pub fn find_optional(&self, value: impl Into<Value>) -> Self {
        self.find_with(value.into(), ReturnType::One)
    }

    /// The first record matching every entry of `record`.
    pub fn find_by(&self, record: &Record) -> Self {
        self.where_record(record).take()
    }

    pub fn find_by_optional(&self, record: &Record) -> Self {
        self.where_record(record).take_optional()
    }

    /// The first matching record, failing with [`QueryError::NotFound`].
    pub fn take(&self) -> Self {
        self.limit(1).returning(ReturnType::OneOrThrow)
    }

    pub fn take_optional(&self) -> Self {
        self.limit(1).returning(ReturnType::One)
    }

    pub fn all(&self) -> Self {
        self.returning(ReturnType::All)
    }

    /// Rows as positional arrays
    pub fn rows(&self) -> Self {
        self.returning(ReturnType::Rows)
    }

    /// Execute without returning anything.
    pub fn exec(&self) -> Self {
        self.returning(ReturnType::Void)
    }

    /// `count(*)`, or `count("column")` for non-null values of a column.
    pub fn count(&self, column: Option<&str>) -> Self {
        let arg = column.map_or(Expression::Star, Expression::from);
        self.derive(|data| data.select = vec![])
            .select_item(SelectItem::Expr(Expression::Function("count".into(), vec![arg])))
            .returning(ReturnType::ValueOrThrow)
    }

    /// `true` when any record matches, nothing otherwise.
    pub fn exists(&self) -> Self {
        self.derive(|data| data.select = vec![])
            .select_raw(RawSql::new("true"))
            .limit(1)
            .returning(ReturnType::Value)
    }

    /// One column of every matching record.
    pub fn pluck(&self, column: &str) -> Self {
        self.derive(|data| data.select = vec![])
            .select(&[column])
            .returning(ReturnType::Pluck)
    }

    /// One column of the first matching record, failing with [`QueryError::NotFound`].
    pub fn get(&self, column: &str) -> Self {
        self.derive(|data| data.select = vec![])
            .select(&[column])
            .limit(1)
            .returning(ReturnType::ValueOrThrow)
    }

    pub fn get_optional(&self, column: &str) -> Self {
        self.derive(|data| data.select = vec![])
            .select(&[column])
            .limit(1)
            .returning(ReturnType::Value)
    }
}

fn first_value(record: Record) -> Option<Value> {
    record.into_values().next()
}

/// Execution.
impl Query {
    fn before_hooks(&self) -> impl Iterator<Item = &BeforeHook> {
        let hooks = &self.data.hooks;
        let kind: &[BeforeHook] = match self.data.kind {
            QueryKind::Insert(_) => &hooks.before_create,
            QueryKind::Update(_) => &hooks.before_update,
            QueryKind::Delete(_) => &hooks.before_delete,
            _ => &[],
        };
        hooks.before_query.iter().chain(kind)
    }

    fn after_hooks(&self) -> impl Iterator<Item = &AfterHook> {
        let hooks = &self.data.hooks;
        let kind: &[AfterHook] = match self.data.kind {
            QueryKind::Insert(_) => &hooks.after_create,
            QueryKind::Update(_) => &hooks.after_update,
            QueryKind::Delete(_) => &hooks.after_delete,
            _ => &[],
        };
        hooks.after_query.iter().chain(kind)
    }

    /// Decode a row with the codecs of the selected columns.
    fn parse_record(&self, record: Record) -> Record {
        let shape = self.table.shape();
        record
            .into_iter()
            .map(|(key, value)| {
                let value = match self.data.parsers.get(&key).or_else(|| shape.get(&key)) {
                    Some(column) => column.parse(value),
                    None => value,
                };
                (key, value)
            })
            .collect()
    }

    async fn run(&self, executor: &dyn Executor, sql: &Sql) -> Result<QueryResult, QueryError> {
        let start = Instant::now();
        let result = if self.data.return_type == ReturnType::Rows {
            executor.arrays(sql).await.map(|arrays| QueryResult {
                row_count: arrays.row_count,
                rows: arrays
                    .rows
                    .into_iter()
                    .map(|row| arrays.fields.iter().cloned().zip(row).collect())
                    .collect(),
                fields: arrays.fields,
            })
        } else {
            executor.query(sql).await
        };

        if let Some(logger) = &self.data.logger {
            let error = result.as_ref().err().map(|e| e.to_string());
            logger.log(&LogEvent {
                text: &sql.text,
                values: &sql.values,
                elapsed: start.elapsed(),
                error: error.as_deref(),
            });
        }

        result
    }

    /// Compile and run the query, firing its hooks and shaping the result by its return type.
    #[instrument(name = "Query::execute", skip_all, fields(kind = self.data.kind.name(), table = self.table.name()))]
    pub async fn execute(&self, executor: &dyn Executor) -> Result<QueryOutput, QueryError> {
        let sql = self.to_sql()?;

        for hook in self.before_hooks() {
            hook(self)?;
        }

        let result = self.run(executor, &sql).await?;
        let row_count = result.row_count;
        let fields = result.fields;
        let records: Vec<Record> = result
            .rows
            .into_iter()
            .map(|record| self.parse_record(record))
            .collect();

        for hook in self.after_hooks() {
            hook(self, &records)?;
        }

        if matches!(self.data.kind, QueryKind::ColumnInfo(_)) {
            return Ok(QueryOutput::ColumnInfo(
                records.iter().filter_map(ColumnInfo::from_record).collect(),
            ));
        }

        let return_type = self.data.return_type;
        let mut records = records.into_iter();
        let output = match return_type {
            ReturnType::All => QueryOutput::All(records.collect()),
            ReturnType::One => QueryOutput::One(records.next()),
            ReturnType::OneOrThrow => {
                QueryOutput::One(Some(records.next().ok_or(QueryError::NotFound)?))
            }
            ReturnType::Rows => QueryOutput::Rows(
                records
                    .map(|record| {
                        fields
                            .iter()
                            .map(|field| record.get(field).cloned().unwrap_or(Value::Null))
                            .collect()
                    })
                    .collect(),
            ),
            ReturnType::Pluck => QueryOutput::Pluck(records.filter_map(first_value).collect()),
            ReturnType::Value => QueryOutput::Value(records.next().and_then(first_value)),
            ReturnType::ValueOrThrow => QueryOutput::Value(Some(
                records
                    .next()
                    .and_then(first_value)
                    .ok_or(QueryError::NotFound)?,
            )),
            ReturnType::RowCount => QueryOutput::RowCount(row_count),
            ReturnType::Void => QueryOutput::Void,
        };

        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    use test_log::test;

    use super::*;
    use crate::columns::ColumnType;
    use crate::logger::QueryLogger;
    use crate::record;
    use crate::table::Table;
    use crate::testing::{RecordingExecutor, assert_sql};

    fn user() -> Arc<Table> {
        Arc::new(
            Table::new("user")
                .column("id", ColumnType::serial().primary_key())
                .column("name", ColumnType::text())
                .column("tags", ColumnType::array(ColumnType::text()).nullable()),
        )
    }

    #[test]
    fn finders() {
        assert_sql!(
            user().query().find(1),
            r#"SELECT "user".* FROM "user" WHERE "user"."id" = $1 LIMIT 1"#,
            1
        );
        assert_sql!(
            user().query().find_by(&record! { "name" => "a" }),
            r#"SELECT "user".* FROM "user" WHERE "user"."name" = $1 LIMIT 1"#,
            "a"
        );
        assert_sql!(
            user().query().where_eq("name", "a").count(None),
            r#"SELECT count(*) FROM "user" WHERE "user"."name" = $1"#,
            "a"
        );
        assert_sql!(
            user().query().exists(),
            r#"SELECT true FROM "user" LIMIT 1"#
        );
        assert_sql!(
            user().query().get("name"),
            r#"SELECT "user"."name" FROM "user" LIMIT 1"#
        );

        let keyless = Arc::new(Table::new("log"));
        assert!(matches!(
            keyless.query().find(1).to_sql(),
            Err(QueryError::Invalid(_))
        ));
    }

    #[test(tokio::test)]
    async fn shapes_results_by_return_type() {
        let executor = RecordingExecutor::new();
        executor.push_rows(vec![record! { "id" => 1, "name" => "a", "tags" => "{x,\"y z\"}" }]);

        let output = user().query().find(1).execute(&executor).await.unwrap();
        assert_eq!(
            output,
            QueryOutput::One(Some(record! {
                "id" => 1,
                "name" => "a",
                "tags" => vec!["x", "y z"],
            }))
        );

        executor.push_rows(vec![]);
        let error = user().query().find(2).execute(&executor).await.unwrap_err();
        assert!(error.is_not_found());

        executor.push_rows(vec![record! { "name" => "a" }, record! { "name" => "b" }]);
        let output = user().query().pluck("name").execute(&executor).await.unwrap();
        assert_eq!(output, QueryOutput::Pluck(vec!["a".into(), "b".into()]));

        executor.push_row_count(3);
        let output = user()
            .query()
            .update(record! { "name" => "c" })
            .execute(&executor)
            .await
            .unwrap();
        assert_eq!(output, QueryOutput::RowCount(3));
    }

    #[test(tokio::test)]
    async fn fires_hooks_of_the_statement_kind() {
        let queries = Arc::new(AtomicUsize::new(0));
        let creates = Arc::new(AtomicUsize::new(0));
        let base = {
            let queries = queries.clone();
            let creates = creates.clone();
            user()
                .query()
                .before_query(move |_| {
                    queries.fetch_add(1, Ordering::SeqCst);
                    Ok(())
                })
                .after_create(move |_, records| {
                    creates.fetch_add(records.len(), Ordering::SeqCst);
                    Ok(())
                })
        };

        let executor = RecordingExecutor::new();
        executor.push_rows(vec![record! { "id" => 1, "name" => "a" }]);
        base.create(record! { "name" => "a" })
            .execute(&executor)
            .await
            .unwrap();
        base.execute(&executor).await.unwrap();

        assert_eq!(queries.load(Ordering::SeqCst), 2);
        assert_eq!(creates.load(Ordering::SeqCst), 1);
    }

    #[test(tokio::test)]
    async fn hook_errors_stop_execution() {
        let executor = RecordingExecutor::new();
        let error = user()
            .query()
            .before_delete(|_| Err(QueryError::Unsupported("deletes are disabled".into())))
            .delete()
            .execute(&executor)
            .await
            .unwrap_err();

        assert!(matches!(error, QueryError::Unsupported(_)));
        assert!(executor.statements().is_empty());
    }

    #[derive(Debug, Default)]
    struct Collect(Mutex<Vec<(String, bool)>>);

    impl QueryLogger for Collect {
        fn log(&self, event: &LogEvent<'_>) {
            self.0
                .lock()
                .unwrap()
                .push((event.text.to_string(), event.error.is_some()));
        }
    }

    #[test(tokio::test)]
    async fn logs_statements_and_failures() {
        let logger = Arc::new(Collect::default());
        let query = user().query().with_logger(logger.clone());

        let executor = RecordingExecutor::new();
        query.execute(&executor).await.unwrap();

        executor.fail_on("DELETE");
        query.delete().execute(&executor).await.unwrap_err();

        let events = logger.0.lock().unwrap();
        assert_eq!(
            *events,
            vec![
                (r#"SELECT "user".* FROM "user""#.to_string(), false),
                (r#"DELETE FROM "user""#.to_string(), true),
            ]
        );
    }
}
