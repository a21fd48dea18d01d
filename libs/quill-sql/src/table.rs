// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use crate::columns::{ColumnType, Shape};
use crate::query::Query;

/// Table metadata: name, schema, columns by key and primary key columns.
#[derive(Debug, Clone, PartialEq)]
pub struct Table {
    name: String,
    schema: Option<String>,
    shape: Shape,
    primary_keys: Vec<String>,
}

impl Table {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            schema: None,
            shape: Shape::new(),
            primary_keys: vec![],
        }
    }

    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = Some(schema.into());
        self
    }

    /// Add a column under `key`. Columns marked as primary keys form the primary key in
    /// declaration order.
    pub fn column(mut self, key: impl Into<String>, column: ColumnType) -> Self {
        let key = key.into();
        if column.data.primary_key {
            self.primary_keys.push(key.clone());
        }
        self.shape.insert(key, column);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schema(&self) -> Option<&str> {
        self.schema.as_deref()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn primary_keys(&self) -> &[String] {
        &self.primary_keys
    }

    pub fn has_column(&self, key: &str) -> bool {
        self.shape.contains_key(key)
    }

    /// Database column name for a column key (the key itself for unknown keys).
    pub fn column_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.shape
            .get(key)
            .map(|column| column.column_name(key))
            .unwrap_or(key)
    }

    /// A select query over every column of this table.
    pub fn query(self: &Arc<Self>) -> Query {
        Query::new(self.clone())
    }
}
