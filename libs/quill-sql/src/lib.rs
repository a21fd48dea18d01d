// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! A Postgres query builder.
//!
//! A [`Query`] starts from a [`Table`] and accumulates clauses through a fluent API in which
//! every call derives a new query. Compiling a query ([`Query::to_sql`]) produces SQL text with
//! `$n` placeholders and the matching values; values are never interpolated into the text.
//! Executing a query runs it through an [`Executor`] (such as [`PgAdapter`]), fires the query's
//! lifecycle hooks and decodes the rows with the table's column codecs.
//!
//! ```ignore
//! let user = Arc::new(
//!     Table::new("user")
//!         .column("id", ColumnType::serial().primary_key())
//!         .column("name", ColumnType::text()),
//! );
//! let sql = user.query().select(&["id"]).where_eq("name", "a").to_sql()?;
//! assert_eq!(sql.text, r#"SELECT "user"."id" FROM "user" WHERE "user"."name" = $1"#);
//! ```

pub mod adapter;
pub mod columns;
pub mod config;
pub mod error;
pub mod logger;
pub mod query;
pub mod sql;
mod table;
mod value;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use adapter::{Adapter, Executor, PgAdapter, QueryArrays, QueryResult, Transaction};
pub use columns::{ColumnCodec, ColumnKind, ColumnType, Shape};
pub use config::DatabaseConfig;
pub use error::{QueryError, WithContext};
pub use logger::{LogEvent, QueryLogger, TracingLogger};
pub use query::{Query, QueryOutput, ReturnType};
pub use sql::{RawSql, Sql};
pub use table::Table;
pub use value::{Record, Value};
