// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::Expression;

use super::{Scope, SqlBuilder};

/// `DISTINCT` for an empty list, `DISTINCT ON (...)` otherwise.
pub(super) fn build_distinct(
    distinct: &[Expression],
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    builder.push_str("DISTINCT");

    if !distinct.is_empty() {
        builder.push_str(" ON (");
        builder.push_elems(scope, distinct, ", ")?;
        builder.push(')');
    }

    Ok(())
}
