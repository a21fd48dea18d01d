// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::{DeleteData, Query, WhereItem};

use super::insert::push_returning;
use super::join::{push_join_conditions, push_join_source};
use super::predicate::{is_disjunction, push_predicate};
use super::select::push_table_name;
use super::{Scope, SqlBuilder};

/// `DELETE FROM "t" USING <joined> WHERE <filters> AND <join conditions> RETURNING ...`
///
/// Lateral joins can't be expressed in `USING` and are left out.
pub(super) fn build_delete(
    query: &Query,
    data: &DeleteData,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    builder.push_str("DELETE FROM ");
    push_table_name(scope.table, builder);
    if scope.alias != scope.table.name() {
        builder.push_str(" AS ");
        builder.push_identifier(scope.alias);
    }

    let joins: Vec<_> = data.join.iter().filter(|join| !join.is_lateral()).collect();
    if !joins.is_empty() {
        builder.push_str(" USING ");
        builder.push_iter(joins.iter(), ", ", |builder, join| {
            push_join_source(join, builder)
        })?;
    }

    let and = &query.data().and;
    let or = &query.data().or;
    let filtered = !and.is_empty() || or.iter().any(|group| !group.is_empty());
    let joined = joins.iter().any(|join| !join.conditions.is_empty());

    if filtered || joined {
        builder.push_str(" WHERE ");
        let wrap = joined && is_disjunction(and, or);
        if wrap {
            builder.push('(');
        }
        push_predicate(scope, and, or, builder)?;
        if wrap {
            builder.push(')');
        }

        let mut first = !filtered;
        for join in &joins {
            push_join_conditions(join, scope, builder, |conditions: &[WhereItem], target, builder| {
                for condition in conditions {
                    if !first {
                        builder.push_str(" AND ");
                    }
                    first = false;
                    super::ExpressionBuilder::build(condition, target, builder)?;
                }
                Ok(())
            })?;
        }
    }

    push_returning(query, scope, builder)
}
