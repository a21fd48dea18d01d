// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use quill_sql::QueryError;
use thiserror::Error;

/// Errors raised while building the table registry.
#[derive(Error, Debug)]
pub enum OrmError {
    #[error(
        "Cannot define a `{relation}` relation on `{table}`: cannot find `{through}` relation required by the `through` option"
    )]
    ThroughNotFound {
        relation: String,
        table: String,
        through: String,
    },

    #[error(
        "Cannot define a `{relation}` relation on `{table}`: cannot find `{source_name}` relation in `{through_table}` required by the `source` option"
    )]
    SourceNotFound {
        relation: String,
        table: String,
        source_name: String,
        through_table: String,
    },

    #[error("ORM does not export a table named `{0}`")]
    TableNotFound(String),

    #[error("Cannot define a `{relation}` relation on `{table}`: unknown table `{target}`")]
    UnknownTable {
        relation: String,
        table: String,
        target: String,
    },

    #[error("Unknown column `{column}` in `{table}`, required by {context}")]
    UnknownColumn {
        column: String,
        table: String,
        context: String,
    },

    #[error(
        "Cannot define a `{relation}` relation on `{table}`: primary and foreign keys have different lengths"
    )]
    KeyMismatch { relation: String, table: String },

    #[error("Relation `{relation}` is not defined on `{table}`")]
    RelationNotFound { relation: String, table: String },

    #[error("Cannot resolve the `{relation}` relation on `{table}`: its `through` chain is cyclic")]
    CyclicThrough { relation: String, table: String },

    #[error(transparent)]
    Query(#[from] QueryError),
}
