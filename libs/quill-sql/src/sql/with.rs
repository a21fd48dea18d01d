// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::WithItem;

use super::{ExpressionBuilder, Scope, SqlBuilder};

impl ExpressionBuilder for WithItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        builder.push_identifier(&self.name);
        if let Some(columns) = &self.columns {
            builder.push('(');
            builder.push_iter(columns.iter(), ", ", |builder, column| {
                builder.push_identifier(column);
                Ok(())
            })?;
            builder.push(')');
        }
        builder.push_str(" AS ");
        match self.materialized {
            Some(true) => builder.push_str("MATERIALIZED "),
            Some(false) => builder.push_str("NOT MATERIALIZED "),
            None => {}
        }
        builder.push('(');
        self.source.build(scope, builder)?;
        builder.push(')');
        Ok(())
    }
}

/// Push `WITH ... ` (with a trailing space) when there are CTEs.
pub(super) fn push_with(
    with: &[WithItem],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    if with.is_empty() {
        return Ok(());
    }

    builder.push_str("WITH ");
    if with.iter().any(|item| item.recursive) {
        builder.push_str("RECURSIVE ");
    }
    builder.push_elems(scope, with, ", ")?;
    builder.push_space();
    Ok(())
}
