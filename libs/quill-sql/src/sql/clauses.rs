// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! GROUP BY, WINDOW, set operations, ORDER BY, LIMIT/OFFSET and row locking.

use crate::error::QueryError;
use crate::query::{
    Expression, LockSpec, LockStrength, LockTables, LockWait, OrderItem, SetOperation,
    SortDirection, UnionItem, WindowItem,
};

use super::{ExpressionBuilder, Scope, SqlBuilder};

pub(super) fn push_group(
    group: &[Expression],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    if group.is_empty() {
        return Ok(());
    }
    builder.push_str(" GROUP BY ");
    builder.push_elems(scope, group, ", ")
}

impl ExpressionBuilder for OrderItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        self.expr.build(scope, builder)?;
        if let Some(direction) = self.direction {
            builder.push_str(match direction {
                SortDirection::Asc => " ASC",
                SortDirection::Desc => " DESC",
                SortDirection::AscNullsFirst => " ASC NULLS FIRST",
                SortDirection::AscNullsLast => " ASC NULLS LAST",
                SortDirection::DescNullsFirst => " DESC NULLS FIRST",
                SortDirection::DescNullsLast => " DESC NULLS LAST",
            });
        }
        Ok(())
    }
}

impl ExpressionBuilder for WindowItem {
    fn build(&self, scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
        match self {
            WindowItem::Definition {
                name,
                partition_by,
                order,
            } => {
                builder.push_identifier(name);
                builder.push_str(" AS (");
                if !partition_by.is_empty() {
                    builder.push_str("PARTITION BY ");
                    builder.push_elems(scope, partition_by, ", ")?;
                }
                if !order.is_empty() {
                    if !partition_by.is_empty() {
                        builder.push_space();
                    }
                    builder.push_str("ORDER BY ");
                    builder.push_elems(scope, order, ", ")?;
                }
                builder.push(')');
                Ok(())
            }
            WindowItem::Raw { name, sql } => {
                builder.push_identifier(name);
                builder.push_str(" AS (");
                sql.build(scope, builder)?;
                builder.push(')');
                Ok(())
            }
        }
    }
}

pub(super) fn push_window(
    window: &[WindowItem],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    if window.is_empty() {
        return Ok(());
    }
    builder.push_str(" WINDOW ");
    builder.push_elems(scope, window, ", ")
}

pub(super) fn push_union(
    union: &[UnionItem],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    for item in union {
        builder.push_str(match item.kind {
            SetOperation::Union => " UNION ",
            SetOperation::UnionAll => " UNION ALL ",
            SetOperation::Intersect => " INTERSECT ",
            SetOperation::IntersectAll => " INTERSECT ALL ",
            SetOperation::Except => " EXCEPT ",
            SetOperation::ExceptAll => " EXCEPT ALL ",
        });
        if item.wrap {
            builder.push('(');
        }
        item.operand.build(scope, builder)?;
        if item.wrap {
            builder.push(')');
        }
    }
    Ok(())
}

pub(super) fn push_order(
    order: &[OrderItem],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    if order.is_empty() {
        return Ok(());
    }
    builder.push_str(" ORDER BY ");
    builder.push_elems(scope, order, ", ")
}

pub(super) fn push_limit_offset(limit: Option<u64>, offset: Option<u64>, builder: &mut SqlBuilder) {
    if let Some(limit) = limit {
        builder.push_str(" LIMIT ");
        builder.push_str(limit.to_string());
    }
    if let Some(offset) = offset {
        builder.push_str(" OFFSET ");
        builder.push_str(offset.to_string());
    }
}

pub(super) fn push_lock(
    lock: Option<&LockSpec>,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let Some(lock) = lock else {
        return Ok(());
    };

    builder.push_str(match lock.strength {
        LockStrength::Update => " FOR UPDATE",
        LockStrength::NoKeyUpdate => " FOR NO KEY UPDATE",
        LockStrength::Share => " FOR SHARE",
        LockStrength::KeyShare => " FOR KEY SHARE",
    });

    match &lock.tables {
        Some(LockTables::Names(names)) if !names.is_empty() => {
            builder.push_str(" OF ");
            builder.push_iter(names.iter(), ", ", |builder, name| {
                builder.push_identifier(name);
                Ok(())
            })?;
        }
        Some(LockTables::Raw(raw)) => {
            builder.push_str(" OF ");
            raw.build(scope, builder)?;
        }
        _ => {}
    }

    match lock.wait {
        Some(LockWait::NoWait) => builder.push_str(" NOWAIT"),
        Some(LockWait::SkipLocked) => builder.push_str(" SKIP LOCKED"),
        None => {}
    }

    Ok(())
}
