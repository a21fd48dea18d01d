// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::{Query, QueryKind};

use super::column_info::build_column_info;
use super::copy::build_copy;
use super::delete::build_delete;
use super::insert::build_insert;
use super::select::build_select;
use super::truncate::build_truncate;
use super::update::build_update;
use super::with::push_with;
use super::{Scope, Sql, SqlBuilder};

/// Compile a query into a standalone statement.
pub(crate) fn compile(query: &Query) -> Result<Sql, QueryError> {
    let mut builder = SqlBuilder::new();
    build_query(query, &mut builder)?;
    Ok(builder.into_sql())
}

/// Append a query's SQL to `builder`, numbering its placeholders after the values already bound.
pub(crate) fn build_query(query: &Query, builder: &mut SqlBuilder) -> Result<(), QueryError> {
    let data = query.data();
    if let Some(reason) = &data.invalid {
        return Err(QueryError::Invalid(reason.clone()));
    }

    let scope = Scope::new(query.table(), query.alias(), &data.joined_shapes);
    push_with(&data.with, &scope, builder)?;

    match &data.kind {
        QueryKind::Select(select) => build_select(query, select, &scope, builder),
        QueryKind::Insert(insert) => build_insert(query, insert, &scope, builder),
        QueryKind::Update(update) => build_update(query, update, &scope, builder),
        QueryKind::Delete(delete) => build_delete(query, delete, &scope, builder),
        QueryKind::Truncate(truncate) => {
            build_truncate(truncate, &scope, builder);
            Ok(())
        }
        QueryKind::ColumnInfo(info) => {
            build_column_info(info, &scope, builder);
            Ok(())
        }
        QueryKind::Copy(copy) => build_copy(copy, &scope, builder),
    }
}
