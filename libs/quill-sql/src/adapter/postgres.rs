// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::pin::pin;
use std::str::FromStr;

use async_trait::async_trait;
use deadpool_postgres::{Manager, ManagerConfig, Object, Pool, RecyclingMethod};
use futures::TryStreamExt;
use tokio_postgres::Config;
use tracing::{debug, error, instrument};

use crate::config::DatabaseConfig;
use crate::error::QueryError;
use crate::sql::Sql;
use crate::value::{Record, Value};

use super::{Adapter, Executor, QueryResult, Transaction};

/// Postgres over a `deadpool` connection pool.
pub struct PgAdapter {
    pool: Pool,
}

impl PgAdapter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    pub fn from_config(config: &DatabaseConfig) -> Result<Self, QueryError> {
        let pg_config = Config::from_str(config.url()?).map_err(|e| {
            QueryError::Delegate(e)
                .with_context("Failed to parse PostgreSQL connection string".into())
        })?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };
        let manager = Manager::from_config(pg_config, tokio_postgres::NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(config.pool_size)
            .build()
            .map_err(|e| QueryError::Config(format!("Failed to create DB pool: {e}")))?;

        Ok(Self { pool })
    }

    async fn client(&self) -> Result<Object, QueryError> {
        Ok(self.pool.get().await?)
    }
}

/// Run a statement, collecting rows and the affected row count.
async fn run(client: &tokio_postgres::Client, sql: &Sql) -> Result<QueryResult, QueryError> {
    debug!("Executing SQL operation: {}", sql.text);

    let stream = client
        .query_raw(sql.text.as_str(), sql.values.iter())
        .await
        .inspect_err(|e| error!("Failed to execute query: {e:?}"))?;
    let mut stream = pin!(stream);

    let mut fields: Vec<String> = vec![];
    let mut rows = vec![];
    while let Some(row) = stream.try_next().await? {
        if fields.is_empty() {
            fields = row
                .columns()
                .iter()
                .map(|column| column.name().to_string())
                .collect();
        }
        let mut record = Record::with_capacity(fields.len());
        for (index, field) in fields.iter().enumerate() {
            record.insert(field.clone(), row.try_get::<_, Value>(index)?);
        }
        rows.push(record);
    }

    let row_count = stream.rows_affected().unwrap_or(rows.len() as u64);
    Ok(QueryResult {
        row_count,
        rows,
        fields,
    })
}

#[async_trait]
impl Executor for PgAdapter {
    #[instrument(name = "PgAdapter::query", skip_all)]
    async fn query(&self, sql: &Sql) -> Result<QueryResult, QueryError> {
        let client = self.client().await?;
        run(&client, sql).await
    }
}

#[async_trait]
impl Adapter for PgAdapter {
    #[instrument(name = "PgAdapter::begin", skip_all)]
    async fn begin(&self) -> Result<Box<dyn Transaction + '_>, QueryError> {
        let client = self.client().await?;
        debug!("Executing SQL operation: BEGIN");
        client.batch_execute("BEGIN").await?;
        Ok(Box::new(PgTransaction {
            client: Some(client),
        }))
    }
}

/// A transaction on a pooled connection. A transaction dropped without commit or rollback
/// detaches its connection from the pool, so the open transaction dies with the connection.
struct PgTransaction {
    client: Option<Object>,
}

impl PgTransaction {
    async fn finish(mut self: Box<Self>, statement: &str) -> Result<(), QueryError> {
        let client = self
            .client
            .take()
            .ok_or_else(|| QueryError::Invalid("transaction already finished".into()))?;
        debug!("Executing SQL operation: {statement}");
        client.batch_execute(statement).await?;
        Ok(())
    }
}

impl Drop for PgTransaction {
    fn drop(&mut self) {
        if let Some(client) = self.client.take() {
            let _ = Object::take(client);
        }
    }
}

#[async_trait]
impl Executor for PgTransaction {
    async fn query(&self, sql: &Sql) -> Result<QueryResult, QueryError> {
        match &self.client {
            Some(client) => run(client, sql).await,
            None => Err(QueryError::Invalid("transaction already finished".into())),
        }
    }
}

#[async_trait]
impl Transaction for PgTransaction {
    fn executor(&self) -> &dyn Executor {
        self
    }

    async fn commit(self: Box<Self>) -> Result<(), QueryError> {
        self.finish("COMMIT").await
    }

    async fn rollback(self: Box<Self>) -> Result<(), QueryError> {
        self.finish("ROLLBACK").await
    }
}
