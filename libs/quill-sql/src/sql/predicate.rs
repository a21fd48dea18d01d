// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::{HavingItem, Operator, WhereItem};
use crate::value::Value;

use super::{ExpressionBuilder, Scope, SqlBuilder, build_query};

/// Push `and` items joined by AND, followed by the OR of the `or` groups.
/// Returns false (pushing nothing) when there are no conditions.
pub(super) fn push_predicate<T: ExpressionBuilder>(
    scope: &Scope<'_>,
    and: &[T],
    or: &[Vec<T>],
    builder: &mut SqlBuilder,
) -> Result<bool, QueryError> {
    if and.is_empty() && or.iter().all(|group| group.is_empty()) {
        return Ok(false);
    }

    builder.push_elems(scope, and, " AND ")?;

    let groups: Vec<_> = or.iter().filter(|group| !group.is_empty()).collect();
    if !groups.is_empty() {
        if !and.is_empty() {
            builder.push_str(" AND ");
        }

        let wrap = !and.is_empty() && groups.len() > 1;
        if wrap {
            builder.push('(');
        }
        push_or_groups(scope, &groups, builder)?;
        if wrap {
            builder.push(')');
        }
    }

    Ok(true)
}

/// Whether the predicate is a top-level OR, which needs parentheses before more conditions are
/// ANDed onto it.
pub(super) fn is_disjunction<T>(and: &[T], or: &[Vec<T>]) -> bool {
    and.is_empty() && or.iter().filter(|group| !group.is_empty()).count() > 1
}

fn push_or_groups<T: ExpressionBuilder>(
    scope: &Scope<'_>,
    groups: &[&Vec<T>],
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let several = groups.len() > 1;
    builder.push_iter(groups.iter(), " OR ", |builder, group| {
        let wrap = several && group.len() > 1;
        if wrap {
            builder.push('(');
        }
        builder.push_elems(scope, group, " AND ")?;
        if wrap {
            builder.push(')');
        }
        Ok(())
    })
}

/// Push ` WHERE <predicate>` if there is anything to filter on.
pub(super) fn push_where(
    scope: &Scope<'_>,
    and: &[WhereItem],
    or: &[Vec<WhereItem>],
    builder: &mut SqlBuilder,
) -> Result<bool, QueryError> {
    if and.is_empty() && or.iter().all(|group| group.is_empty()) {
        return Ok(false);
    }
    builder.push_str(" WHERE ");
    push_predicate(scope, and, or, builder)
}

fn push_operator(
    op: &Operator,
    builder: &mut SqlBuilder,
    lhs: impl Fn(&mut SqlBuilder) -> Result<(), QueryError>,
) -> Result<(), QueryError> {
    let comparison = |builder: &mut SqlBuilder,
                      sign: &str,
                      value: Value|
     -> Result<(), QueryError> {
        lhs(builder)?;
        builder.push_str(sign);
        builder.push_param(value);
        Ok(())
    };

    match op {
        Operator::Eq(value) if value.is_null() => {
            lhs(builder)?;
            builder.push_str(" IS NULL");
            Ok(())
        }
        Operator::NotEq(value) if value.is_null() => {
            lhs(builder)?;
            builder.push_str(" IS NOT NULL");
            Ok(())
        }
        Operator::Eq(value) => comparison(builder, " = ", value.clone()),
        Operator::NotEq(value) => comparison(builder, " <> ", value.clone()),
        Operator::Lt(value) => comparison(builder, " < ", value.clone()),
        Operator::Lte(value) => comparison(builder, " <= ", value.clone()),
        Operator::Gt(value) => comparison(builder, " > ", value.clone()),
        Operator::Gte(value) => comparison(builder, " >= ", value.clone()),
        Operator::In(values) | Operator::NotIn(values) if values.is_empty() => {
            // Nothing is in an empty list
            builder.push_str(if matches!(op, Operator::In(_)) {
                "false"
            } else {
                "true"
            });
            Ok(())
        }
        Operator::In(values) | Operator::NotIn(values) => {
            lhs(builder)?;
            builder.push_str(if matches!(op, Operator::In(_)) {
                " IN ("
            } else {
                " NOT IN ("
            });
            builder.push_iter(values.iter(), ", ", |builder, value| {
                builder.push_param(value.clone());
                Ok(())
            })?;
            builder.push(')');
            Ok(())
        }
        Operator::InQuery(query) => {
            lhs(builder)?;
            builder.push_str(" IN (");
            build_query(query, builder)?;
            builder.push(')');
            Ok(())
        }
        Operator::Contains(text) => {
            lhs(builder)?;
            builder.push_str(" ILIKE '%' || ");
            builder.push_param(text.as_str().into());
            builder.push_str(" || '%'");
            Ok(())
        }
        Operator::StartsWith(text) => {
            lhs(builder)?;
            builder.push_str(" ILIKE ");
            builder.push_param(text.as_str().into());
            builder.push_str(" || '%'");
            Ok(())
        }
        Operator::EndsWith(text) => {
            lhs(builder)?;
            builder.push_str(" ILIKE '%' || ");
            builder.push_param(text.as_str().into());
            Ok(())
        }
    }
}

impl ExpressionBuilder for WhereItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        match self {
            WhereItem::Column { column, op } => push_operator(op, builder, |builder| {
                scope.push_column(column, builder);
                Ok(())
            }),
            WhereItem::Equals { left, right } => {
                left.build(scope, builder)?;
                builder.push_str(" = ");
                right.build(scope, builder)
            }
            WhereItem::In { columns, values } => {
                if values.is_empty() {
                    builder.push_str("false");
                    return Ok(());
                }
                if columns.is_empty() || values.iter().any(|row| row.len() != columns.len()) {
                    return Err(QueryError::Invalid(format!(
                        "IN over {} columns got rows of a different length",
                        columns.len()
                    )));
                }

                let tuple = columns.len() > 1;
                if tuple {
                    builder.push('(');
                }
                builder.push_iter(columns.iter(), ", ", |builder, column| {
                    scope.push_column(column, builder);
                    Ok(())
                })?;
                if tuple {
                    builder.push(')');
                }

                builder.push_str(" IN (");
                builder.push_iter(values.iter(), ", ", |builder, row| {
                    if tuple {
                        builder.push('(');
                    }
                    builder.push_iter(row.iter(), ", ", |builder, value| {
                        builder.push_param(value.clone());
                        Ok(())
                    })?;
                    if tuple {
                        builder.push(')');
                    }
                    Ok(())
                })?;
                builder.push(')');
                Ok(())
            }
            WhereItem::Raw(raw) => raw.build(scope, builder),
            WhereItem::And(items) => match items.len() {
                0 => {
                    builder.push_str("true");
                    Ok(())
                }
                1 => items[0].build(scope, builder),
                _ => {
                    builder.push('(');
                    builder.push_elems(scope, items, " AND ")?;
                    builder.push(')');
                    Ok(())
                }
            },
            WhereItem::Or(groups) => {
                let groups: Vec<_> = groups.iter().filter(|group| !group.is_empty()).collect();
                if groups.is_empty() {
                    builder.push_str("false");
                    return Ok(());
                }
                let wrap = groups.len() > 1;
                if wrap {
                    builder.push('(');
                }
                push_or_groups(scope, &groups, builder)?;
                if wrap {
                    builder.push(')');
                }
                Ok(())
            }
            WhereItem::Not(items) => {
                builder.push_str("NOT ");
                match items.len() {
                    0 => builder.push_str("true"),
                    1 if !matches!(items[0], WhereItem::Column { .. }) => {
                        items[0].build(scope, builder)?
                    }
                    _ => {
                        builder.push('(');
                        builder.push_elems(scope, items, " AND ")?;
                        builder.push(')');
                    }
                }
                Ok(())
            }
            WhereItem::Exists(query) => {
                builder.push_str("EXISTS (");
                build_query(query, builder)?;
                builder.push(')');
                Ok(())
            }
        }
    }
}

impl ExpressionBuilder for HavingItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        match self {
            HavingItem::Aggregate { function, arg, op } => {
                push_operator(op, builder, |builder| {
                    builder.push_str(function);
                    builder.push('(');
                    arg.build(scope, builder)?;
                    builder.push(')');
                    Ok(())
                })
            }
            HavingItem::Raw(raw) => raw.build(scope, builder),
        }
    }
}
