// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Test support: an in-memory executor that records statements and replays canned results.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use crate::adapter::{Adapter, Executor, QueryResult, Transaction};
use crate::error::QueryError;
use crate::sql::Sql;
use crate::value::Record;

/// Compare a query's compiled text and values.
///
/// ```ignore
/// assert_sql!(query, r#"SELECT "user".* FROM "user" WHERE "user"."id" = $1"#, 1);
/// ```
#[macro_export]
macro_rules! assert_sql {
    ($query:expr, $text:expr $(, $value:expr)* $(,)?) => {{
        let sql = $query.to_sql().expect("query should compile");
        assert_eq!(sql.text, $text);
        let expected: Vec<$crate::Value> = vec![$($crate::Value::from($value)),*];
        assert_eq!(sql.values, expected);
    }};
}

pub use crate::assert_sql;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Begin,
    Statement(Sql),
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct State {
    events: Vec<Event>,
    results: VecDeque<QueryResult>,
    fail_on: Option<String>,
}

/// Records every statement and transaction event. Results queued with `push_*` are returned in
/// order; once the queue is empty every statement returns no rows.
#[derive(Debug, Clone, Default)]
pub struct RecordingExecutor {
    state: Arc<Mutex<State>>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push_result(&self, result: QueryResult) {
        self.state().results.push_back(result);
    }

    pub fn push_rows(&self, rows: Vec<Record>) {
        self.push_result(QueryResult::from_rows(rows));
    }

    pub fn push_row_count(&self, row_count: u64) {
        self.push_result(QueryResult::from_row_count(row_count));
    }

    /// Fail the first statement whose text contains `pattern`.
    pub fn fail_on(&self, pattern: &str) {
        self.state().fail_on = Some(pattern.to_string());
    }

    pub fn events(&self) -> Vec<Event> {
        self.state().events.clone()
    }

    pub fn statements(&self) -> Vec<Sql> {
        self.state()
            .events
            .iter()
            .filter_map(|event| match event {
                Event::Statement(sql) => Some(sql.clone()),
                _ => None,
            })
            .collect()
    }

    /// Statement texts, in execution order.
    pub fn texts(&self) -> Vec<String> {
        self.statements().into_iter().map(|sql| sql.text).collect()
    }

    fn record(&self, event: Event) {
        self.state().events.push(event);
    }
}

#[async_trait]
impl Executor for RecordingExecutor {
    async fn query(&self, sql: &Sql) -> Result<QueryResult, QueryError> {
        let mut state = self.state();
        state.events.push(Event::Statement(sql.clone()));

        let fails = matches!(&state.fail_on, Some(pattern) if sql.text.contains(pattern.as_str()));
        if fails {
            state.fail_on = None;
            return Err(QueryError::Boxed(
                format!("statement failed: {}", sql.text).into(),
            ));
        }

        Ok(state.results.pop_front().unwrap_or_default())
    }
}

#[async_trait]
impl Adapter for RecordingExecutor {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, QueryError> {
        self.record(Event::Begin);
        Ok(Box::new(RecordingTransaction {
            executor: self.clone(),
        }))
    }
}

struct RecordingTransaction {
    executor: RecordingExecutor,
}

#[async_trait]
impl Executor for RecordingTransaction {
    async fn query(&self, sql: &Sql) -> Result<QueryResult, QueryError> {
        self.executor.query(sql).await
    }
}

#[async_trait]
impl Transaction for RecordingTransaction {
    fn executor(&self) -> &dyn Executor {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.executor.record(Event::Commit);
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        self.executor.record(Event::Rollback);
        Ok(())
    }
}
