// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use thiserror::Error;

use crate::config::EnvError;

#[derive(Error, Debug)]
pub enum QueryError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Env(#[from] EnvError),

    #[error("Record is not found")]
    NotFound,

    #[error("Cannot create based on a query which returns multiple records")]
    MultipleRecords,

    #[error("Cardinality: {0}")]
    Cardinality(String),

    #[error("Invalid query: {0}")]
    Invalid(String),

    #[error("Unsupported: {0}")]
    Unsupported(String),

    #[error("Delegate: {0}")]
    Delegate(#[from] tokio_postgres::Error),

    #[error("Pool: {0}")]
    Pool(#[from] deadpool_postgres::PoolError),

    #[error("{0} {1}")]
    WithContext(String, #[source] Box<QueryError>),

    #[error("{0}")]
    Boxed(#[from] Box<dyn std::error::Error + Send + Sync + 'static>),
}

impl QueryError {
    pub fn with_context(self, context: String) -> QueryError {
        QueryError::WithContext(context, Box::new(self))
    }

    /// Whether this error (or the error it wraps) is a "record not found" condition.
    pub fn is_not_found(&self) -> bool {
        match self {
            QueryError::NotFound => true,
            QueryError::WithContext(_, inner) => inner.is_not_found(),
            _ => false,
        }
    }
}

pub trait WithContext {
    fn with_context(self, context: String) -> Self;
}

impl<T> WithContext for Result<T, QueryError> {
    fn with_context(self, context: String) -> Result<T, QueryError> {
        self.map_err(|e| e.with_context(context))
    }
}
