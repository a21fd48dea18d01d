// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The connection layer queries are executed through.
//!
//! [`Executor`] is all a query needs to run. [`Adapter`] adds transactions, which the nested
//! write executor opens around multi-statement cascades.

mod postgres;

use async_trait::async_trait;

use crate::error::QueryError;
use crate::sql::Sql;
use crate::value::{Record, Value};

pub use postgres::PgAdapter;

/// Rows returned by a statement, keyed by output column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    /// Affected rows for writes, returned rows for selects
    pub row_count: u64,
    pub rows: Vec<Record>,
    /// Output column names, in order
    pub fields: Vec<String>,
}

impl QueryResult {
    pub fn from_rows(rows: Vec<Record>) -> Self {
        let fields = rows
            .first()
            .map(|row| row.keys().cloned().collect())
            .unwrap_or_default();
        Self {
            row_count: rows.len() as u64,
            rows,
            fields,
        }
    }

    pub fn from_row_count(row_count: u64) -> Self {
        Self {
            row_count,
            ..Default::default()
        }
    }
}

/// Rows returned by a statement as positional values.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryArrays {
    pub row_count: u64,
    pub rows: Vec<Vec<Value>>,
    pub fields: Vec<String>,
}

impl From<QueryResult> for QueryArrays {
    fn from(result: QueryResult) -> Self {
        Self {
            row_count: result.row_count,
            rows: result
                .rows
                .into_iter()
                .map(|row| row.into_values().collect())
                .collect(),
            fields: result.fields,
        }
    }
}

#[async_trait]
pub trait Executor: Send + Sync {
    async fn query(&self, sql: &Sql) -> Result<QueryResult, QueryError>;

    async fn arrays(&self, sql: &Sql) -> Result<QueryArrays, QueryError> {
        Ok(self.query(sql).await?.into())
    }
}

#[async_trait]
pub trait Transaction: Executor {
    /// This transaction as a plain executor, for running queries inside it.
    fn executor(&self) -> &dyn Executor;

    async fn commit(self: Box<Self>) -> Result<(), QueryError>;

    async fn rollback(self: Box<Self>) -> Result<(), QueryError>;
}

#[async_trait]
pub trait Adapter: Executor {
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, QueryError>;
}
