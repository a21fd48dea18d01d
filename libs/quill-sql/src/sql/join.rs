// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::{JoinItem, JoinKind, JoinSource, WhereItem};
use crate::table::Table;

use super::predicate::push_predicate;
use super::select::push_table_name;
use super::{Scope, SqlBuilder, build_query};

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Full => "FULL JOIN",
        }
    }
}

fn push_on(
    conditions: &[WhereItem],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    builder.push_str(" ON ");
    if !push_predicate(scope, conditions, &[], builder)? {
        builder.push_str("true");
    }
    Ok(())
}

/// Push the join source without the JOIN keyword. Shared by `JOIN` and `DELETE ... USING`.
pub(super) fn push_join_source(
    item: &JoinItem,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    match &item.source {
        JoinSource::Table { table, alias } => {
            push_table_name(table, builder);
            if let Some(alias) = alias {
                builder.push_str(" AS ");
                builder.push_identifier(alias);
            }
        }
        JoinSource::Query { query, alias } | JoinSource::Lateral { query, alias } => {
            if item.is_lateral() {
                builder.push_str("LATERAL ");
            }
            builder.push('(');
            build_query(query, builder)?;
            builder.push_str(") ");
            builder.push_identifier(alias);
        }
    }
    Ok(())
}

/// Push the join's ON conditions, compiled against the joined source.
pub(super) fn push_join_conditions(
    item: &JoinItem,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
    push: impl FnOnce(&[WhereItem], &Scope<'_>, &mut SqlBuilder) -> Result<(), QueryError>,
) -> Result<(), QueryError> {
    match &item.source {
        JoinSource::Table { table, .. } => {
            let target = Scope::new(table, item.alias(), scope.joined);
            push(&item.conditions, &target, builder)
        }
        JoinSource::Query { alias, .. } | JoinSource::Lateral { alias, .. } => {
            // Sub-query output columns are already named by key
            let output = Table::new(alias.as_str());
            let target = Scope::new(&output, alias, scope.joined);
            push(&item.conditions, &target, builder)
        }
    }
}

impl super::ExpressionBuilder for JoinItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        builder.push_str(self.kind.keyword());
        builder.push_space();
        push_join_source(self, builder)?;
        push_join_conditions(self, scope, builder, push_on)
    }
}
