// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::columns::ColumnCodec;
use crate::error::QueryError;
use crate::query::{
    ConflictAction, ConflictTarget, Expression, InsertData, InsertValue, InsertValues, MergeSpec,
    OnConflict, Query, ReturnType, SelectItem,
};
use crate::value::Value;

use super::select::{push_select_list, push_table_name};
use super::{ExpressionBuilder, Scope, SqlBuilder, build_query};

/// Push ` RETURNING <select list>` unless the query only reports a row count.
pub(super) fn push_returning(
    query: &Query,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    if matches!(
        query.data().return_type,
        ReturnType::RowCount | ReturnType::Void
    ) {
        return Ok(());
    }
    builder.push_str(" RETURNING ");
    push_select_list(query, scope, builder)
}

/// Bind a value through the column's codec, when the column is known.
pub(super) fn push_column_value(
    scope: &Scope<'_>,
    key: &str,
    value: &Value,
    builder: &mut SqlBuilder,
) {
    let value = match scope.table.shape().get(key) {
        Some(column) => column.encode(value.clone()),
        None => value.clone(),
    };
    builder.push_param(value);
}

fn push_insert_value(
    scope: &Scope<'_>,
    key: &str,
    value: &InsertValue,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    match value {
        InsertValue::Value(value) => push_column_value(scope, key, value, builder),
        InsertValue::Default => builder.push_str("DEFAULT"),
        InsertValue::Raw(raw) => raw.build(scope, builder)?,
        InsertValue::Query(query) => {
            builder.push('(');
            build_query(query, builder)?;
            builder.push(')');
        }
    }
    Ok(())
}

fn push_on_conflict(
    data: &InsertData,
    on_conflict: &OnConflict,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let table = scope.table;
    builder.push_str(" ON CONFLICT");

    match &on_conflict.target {
        Some(ConflictTarget::Columns(columns)) => {
            builder.push_str(" (");
            builder.push_iter(columns.iter(), ", ", |builder, key| {
                builder.push_identifier(table.column_name(key));
                Ok(())
            })?;
            builder.push(')');
        }
        Some(ConflictTarget::Constraint(name)) => {
            builder.push_str(" ON CONSTRAINT ");
            builder.push_identifier(name);
        }
        Some(ConflictTarget::Raw(raw)) => {
            builder.push_space();
            raw.build(scope, builder)?;
        }
        None => {}
    }

    let merge = match &on_conflict.action {
        ConflictAction::Ignore => {
            builder.push_str(" DO NOTHING");
            return Ok(());
        }
        ConflictAction::Merge(merge) => merge,
    };

    if on_conflict.target.is_none() {
        return Err(QueryError::Invalid(
            "ON CONFLICT ... DO UPDATE requires a conflict target".into(),
        ));
    }

    let push_excluded = |builder: &mut SqlBuilder, keys: &[&String]| {
        builder.push_iter(keys.iter(), ", ", |builder, key| {
            let column = table.column_name(key);
            builder.push_identifier(column);
            builder.push_str(" = excluded.");
            builder.push_identifier(column);
            Ok(())
        })
    };

    match merge {
        MergeSpec::All => {
            let target: &[String] = match &on_conflict.target {
                Some(ConflictTarget::Columns(columns)) => columns,
                _ => &[],
            };
            let keys: Vec<_> = data
                .columns
                .iter()
                .filter(|key| !target.contains(key))
                .collect();

            if keys.is_empty() {
                builder.push_str(" DO NOTHING");
            } else {
                builder.push_str(" DO UPDATE SET ");
                push_excluded(builder, &keys)?;
            }
        }
        MergeSpec::Columns(columns) => {
            builder.push_str(" DO UPDATE SET ");
            push_excluded(builder, &columns.iter().collect::<Vec<_>>())?;
        }
        MergeSpec::Values(values) => {
            builder.push_str(" DO UPDATE SET ");
            builder.push_iter(values.iter(), ", ", |builder, (key, value)| {
                builder.push_identifier(table.column_name(key));
                builder.push_str(" = ");
                push_column_value(scope, key, value, builder);
                Ok(())
            })?;
        }
        MergeSpec::Raw(raw) => {
            builder.push_str(" DO UPDATE SET ");
            raw.build(scope, builder)?;
        }
    }

    Ok(())
}

pub(super) fn build_insert(
    query: &Query,
    data: &InsertData,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let table = scope.table;

    builder.push_str("INSERT INTO ");
    push_table_name(table, builder);
    builder.push('(');
    builder.push_iter(data.columns.iter(), ", ", |builder, key| {
        builder.push_identifier(table.column_name(key));
        Ok(())
    })?;
    builder.push(')');

    match &data.values {
        InsertValues::Matrix(rows) => {
            if rows.is_empty() {
                return Err(QueryError::Invalid("INSERT without values".into()));
            }
            if let Some(row) = rows.iter().find(|row| row.len() != data.columns.len()) {
                return Err(QueryError::Invalid(format!(
                    "INSERT row has {} values for {} columns",
                    row.len(),
                    data.columns.len()
                )));
            }

            builder.push_str(" VALUES ");
            builder.push_iter(rows.iter(), ", ", |builder, row| {
                builder.push('(');
                builder.push_iter(data.columns.iter().zip(row), ", ", |builder, (key, value)| {
                    push_insert_value(scope, key, value, builder)
                })?;
                builder.push(')');
                Ok(())
            })?;
        }
        InsertValues::Raw(raws) => {
            builder.push_str(" VALUES ");
            builder.push_iter(raws.iter(), ", ", |builder, raw| {
                builder.push('(');
                raw.build(scope, builder)?;
                builder.push(')');
                Ok(())
            })?;
        }
        InsertValues::From { query: source, values } => {
            let mut source = (**source).clone();
            let select = &mut source.data_mut().select;
            if select.is_empty() && !values.is_empty() {
                select.push(SelectItem::All);
            }
            select.extend(
                values
                    .iter()
                    .map(|value| SelectItem::Expr(Expression::Value(value.clone()))),
            );

            builder.push_space();
            build_query(&source, builder)?;
        }
    }

    if let Some(on_conflict) = &data.on_conflict {
        push_on_conflict(data, on_conflict, scope, builder)?;
    }

    push_returning(query, scope, builder)
}
