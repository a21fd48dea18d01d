// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::columns::Shape;
use crate::error::QueryError;
use crate::query::{FromSource, Query, SelectData, SelectItem};
use crate::table::Table;

use super::clauses::{push_group, push_limit_offset, push_lock, push_order, push_union, push_window};
use super::distinct::build_distinct;
use super::predicate::{push_predicate, push_where};
use super::{ExpressionBuilder, Scope, SqlBuilder, build_query};

/// Push `"schema"."table"`
pub(super) fn push_table_name(table: &Table, builder: &mut SqlBuilder) {
    if let Some(schema) = table.schema() {
        builder.push_identifier(schema);
        builder.push('.');
    }
    builder.push_identifier(table.name());
}

fn push_key_alias(key: &str, column: &str, builder: &mut SqlBuilder) {
    if key != column {
        builder.push_str(" AS ");
        builder.push_identifier(key);
    }
}

/// Every column of `shape` under `alias`, renamed to its key where the names differ.
fn push_all_columns(shape: &Shape, alias: &str, builder: &mut SqlBuilder) -> Result<(), QueryError> {
    let renamed = shape
        .iter()
        .any(|(key, column)| column.column_name(key) != key);

    if shape.is_empty() || !renamed {
        builder.push_identifier(alias);
        builder.push_str(".*");
        return Ok(());
    }

    builder.push_iter(shape.iter(), ", ", |builder, (key, column)| {
        let name = column.column_name(key);
        builder.push_column(alias, name);
        push_key_alias(key, name, builder);
        Ok(())
    })
}

impl ExpressionBuilder for SelectItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        match self {
            SelectItem::All => push_all_columns(scope.table.shape(), scope.alias, builder),
            SelectItem::Column(key) => {
                let (alias, column) = scope.resolve(key);
                builder.push_column(alias, column);
                let output = key.rsplit('.').next().unwrap_or(key);
                push_key_alias(output, column, builder);
                Ok(())
            }
            SelectItem::Aliased { alias, expr } => {
                expr.build(scope, builder)?;
                builder.push_str(" AS ");
                builder.push_identifier(alias);
                Ok(())
            }
            SelectItem::Expr(expr) => expr.build(scope, builder),
            SelectItem::Raw(raw) => raw.build(scope, builder),
            SelectItem::JsonRow { alias } => {
                builder.push_str("row_to_json(");
                builder.push_identifier(alias);
                builder.push_str(".*) ");
                builder.push_identifier(alias);
                Ok(())
            }
            SelectItem::Coalesce { alias, fallback } => {
                builder.push_str("COALESCE(");
                builder.push_identifier(alias);
                builder.push_str(".r, ");
                builder.push_str(fallback);
                builder.push_str(") ");
                builder.push_identifier(alias);
                Ok(())
            }
        }
    }
}

/// The select list, or every column when nothing was selected explicitly.
pub(super) fn push_select_list(
    query: &Query,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let select = &query.data().select;
    if select.is_empty() {
        SelectItem::All.build(scope, builder)
    } else {
        builder.push_elems(scope, select, ", ")
    }
}

fn push_from(
    query: &Query,
    only: bool,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    builder.push_str(" FROM ");
    if only {
        builder.push_str("ONLY ");
    }

    let table = query.table();
    match &query.data().from {
        None => {
            push_table_name(table, builder);
            if scope.alias != table.name() {
                builder.push_str(" AS ");
                builder.push_identifier(scope.alias);
            }
        }
        Some(FromSource::Name(name)) => {
            builder.push_identifier(name);
            if scope.alias != name {
                builder.push_str(" AS ");
                builder.push_identifier(scope.alias);
            }
        }
        Some(FromSource::Query { query, alias }) => {
            builder.push('(');
            build_query(query, builder)?;
            builder.push_str(") AS ");
            builder.push_identifier(alias);
        }
        Some(FromSource::Raw(raw)) => raw.build(scope, builder)?,
    }

    Ok(())
}

pub(super) fn build_select(
    query: &Query,
    data: &SelectData,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    builder.push_str("SELECT ");

    if let Some(distinct) = &data.distinct {
        build_distinct(distinct, scope, builder)?;
        builder.push_space();
    }

    push_select_list(query, scope, builder)?;
    push_from(query, data.only, scope, builder)?;

    for join in &data.join {
        builder.push_space();
        join.build(scope, builder)?;
    }

    push_where(scope, &query.data().and, &query.data().or, builder)?;
    push_group(&data.group, scope, builder)?;

    if !data.having.is_empty() || !data.having_or.is_empty() {
        builder.push_str(" HAVING ");
        push_predicate(scope, &data.having, &data.having_or, builder)?;
    }

    push_window(&data.window, scope, builder)?;
    push_union(&data.union, scope, builder)?;
    push_order(&data.order, scope, builder)?;
    push_limit_offset(data.limit, data.offset, builder);
    push_lock(data.lock.as_ref(), scope, builder)?;

    Ok(())
}
