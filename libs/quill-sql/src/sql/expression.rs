// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::{ColumnRef, Expression, QueryOrRaw};

use super::{ExpressionBuilder, Scope, SqlBuilder, build_query};

impl ExpressionBuilder for ColumnRef {
    fn build(&self, _scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        builder.push_column(&self.table, &self.column);
        Ok(())
    }
}

impl ExpressionBuilder for Expression {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        match self {
            Expression::Column(key) => {
                scope.push_column(key, builder);
                Ok(())
            }
            Expression::Qualified(column) => column.build(scope, builder),
            Expression::Raw(raw) => raw.build(scope, builder),
            Expression::Value(value) => {
                builder.push_param(value.clone());
                Ok(())
            }
            Expression::Star => {
                builder.push('*');
                Ok(())
            }
            Expression::Function(name, args) => {
                builder.push_str(name);
                builder.push('(');
                builder.push_elems(scope, args, ", ")?;
                builder.push(')');
                Ok(())
            }
            Expression::Query(query) => {
                builder.push('(');
                build_query(query, builder)?;
                builder.push(')');
                Ok(())
            }
        }
    }
}

impl ExpressionBuilder for QueryOrRaw {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        match self {
            QueryOrRaw::Query(query) => build_query(query, builder),
            QueryOrRaw::Raw(raw) => raw.build(scope, builder),
        }
    }
}
