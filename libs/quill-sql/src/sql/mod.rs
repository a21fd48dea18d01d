// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Compilation of the query data model into parameterized SQL.
//!
//! Every clause type implements [`ExpressionBuilder`], which appends its SQL to a
//! [`SqlBuilder`]. Values are never interpolated: each one becomes a `$n` placeholder and is
//! appended to the builder's value list, so sub-queries compiled into the same builder keep a
//! single left-to-right placeholder order.

mod clauses;
mod column_info;
mod copy;
mod delete;
mod distinct;
mod expression;
mod insert;
mod join;
mod predicate;
mod select;
mod sql_builder;
mod to_sql;
mod truncate;
mod update;
mod with;

use std::sync::Arc;

use indexmap::IndexMap;

use crate::columns::Shape;
use crate::error::QueryError;
use crate::table::Table;
use crate::value::Value;

pub use sql_builder::SqlBuilder;
pub(crate) use to_sql::{build_query, compile};

/// A compiled statement: text with `$1, $2, ...` placeholders and the matching values.
#[derive(Debug, Clone, PartialEq)]
pub struct Sql {
    pub text: String,
    pub values: Vec<Value>,
}

impl Sql {
    pub fn new(text: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            text: text.into(),
            values,
        }
    }
}

impl std::fmt::Display for Sql {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.text)
    }
}

/// A raw SQL fragment. Its placeholders are numbered from `$1` relative to its own values and
/// get renumbered when the fragment is embedded.
#[derive(Debug, Clone, PartialEq)]
pub struct RawSql {
    pub sql: String,
    pub values: Vec<Value>,
}

impl RawSql {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            values: vec![],
        }
    }

    pub fn values(mut self, values: Vec<Value>) -> Self {
        self.values = values;
        self
    }
}

impl From<&str> for RawSql {
    fn from(sql: &str) -> Self {
        RawSql::new(sql)
    }
}

/// The table a clause is compiled against: its metadata, the alias columns are qualified
/// with, and the shapes of joined tables (for `alias.Key` references).
#[derive(Clone, Copy)]
pub struct Scope<'a> {
    pub(crate) table: &'a Table,
    pub(crate) alias: &'a str,
    pub(crate) joined: &'a IndexMap<String, Arc<Shape>>,
}

impl<'a> Scope<'a> {
    pub(crate) fn new(
        table: &'a Table,
        alias: &'a str,
        joined: &'a IndexMap<String, Arc<Shape>>,
    ) -> Self {
        Self {
            table,
            alias,
            joined,
        }
    }

    fn shape_for(&self, alias: &str) -> Option<&'a Shape> {
        if alias == self.alias {
            Some(self.table.shape())
        } else {
            self.joined.get(alias).map(|shape| shape.as_ref())
        }
    }

    /// Resolve a column key (`Key` or `alias.Key`) to its qualifying alias and database name.
    pub(crate) fn resolve<'k>(&self, key: &'k str) -> (&'k str, &'k str)
    where
        'a: 'k,
    {
        let (alias, key) = match key.split_once('.') {
            Some((alias, key)) => (alias, key),
            None => (self.alias, key),
        };

        let column = self
            .shape_for(alias)
            .and_then(|shape| shape.get(key))
            .map(|column| column.column_name(key))
            .unwrap_or(key);

        (alias, column)
    }

    pub(crate) fn push_column(&self, key: &str, builder: &mut SqlBuilder) {
        let (alias, column) = self.resolve(key);
        builder.push_column(alias, column);
    }
}

pub trait ExpressionBuilder {
    /// Append this element's SQL to `builder`.
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError>;
}

impl<T: ExpressionBuilder> ExpressionBuilder for Box<T> {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        self.as_ref().build(scope, builder)
    }
}

impl<T: ExpressionBuilder> ExpressionBuilder for Arc<T> {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        self.as_ref().build(scope, builder)
    }
}

impl ExpressionBuilder for RawSql {
    fn build(&self, _scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        builder.push_raw(self);
        Ok(())
    }
}
