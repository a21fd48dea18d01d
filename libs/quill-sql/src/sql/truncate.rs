// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::query::TruncateData;

use super::select::push_table_name;
use super::{Scope, SqlBuilder};

pub(super) fn build_truncate(data: &TruncateData, scope: &Scope<'_>, builder: &mut SqlBuilder) {
    builder.push_str("TRUNCATE ");
    push_table_name(scope.table, builder);
    if data.restart_identity {
        builder.push_str(" RESTART IDENTITY");
    }
    if data.cascade {
        builder.push_str(" CASCADE");
    }
}
