// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::query::ColumnInfoData;

use super::{Scope, SqlBuilder};

/// Columns reported by `information_schema.columns`, in the order [`ColumnInfo`] reads them.
///
/// [`ColumnInfo`]: crate::query::ColumnInfo
pub(crate) const COLUMN_INFO_FIELDS: [&str; 5] = [
    "column_name",
    "column_default",
    "data_type",
    "character_maximum_length",
    "is_nullable",
];

pub(super) fn build_column_info(data: &ColumnInfoData, scope: &Scope<'_>, builder: &mut SqlBuilder) {
    builder.push_str("SELECT ");
    builder.push_str(COLUMN_INFO_FIELDS.join(", "));
    builder.push_str(" FROM information_schema.columns WHERE table_name = ");
    builder.push_param(scope.table.name().into());
    builder.push_str(" AND table_catalog = current_database() AND table_schema = ");
    match scope.table.schema() {
        Some(schema) => builder.push_param(schema.into()),
        None => builder.push_str("current_schema()"),
    }

    if let Some(column) = &data.column {
        builder.push_str(" AND column_name = ");
        builder.push_param(scope.table.column_name(column).into());
    }
}
