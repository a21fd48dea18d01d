// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use indexmap::IndexMap;

use crate::error::QueryError;
use crate::query::{Query, UpdateData, UpdateItem, UpdateValue};
use crate::sql::RawSql;

use super::insert::{push_column_value, push_returning};
use super::predicate::push_where;
use super::select::push_table_name;
use super::{ExpressionBuilder, Scope, SqlBuilder, build_query};

/// Entries produced by the injectors, which see every entry given by the caller.
fn inject(items: &[UpdateItem]) -> Vec<UpdateItem> {
    items
        .iter()
        .filter_map(|item| match item {
            UpdateItem::Inject(injector) => (injector.0)(items),
            _ => None,
        })
        .collect()
}

/// Collapse update entries into one assignment per column (the last write wins, keeping the
/// position of the first) plus raw assignments.
fn collect_assignments<'a>(
    items: impl IntoIterator<Item = &'a UpdateItem>,
) -> (IndexMap<&'a str, &'a UpdateValue>, Vec<&'a RawSql>) {
    let mut columns = IndexMap::new();
    let mut raws = vec![];

    for item in items {
        match item {
            UpdateItem::Set(values) => {
                for (key, value) in values {
                    columns.insert(key.as_str(), value);
                }
            }
            UpdateItem::Raw(raw) => raws.push(raw),
            UpdateItem::Inject(_) => {}
        }
    }

    (columns, raws)
}

fn push_assignment(
    key: &str,
    value: &UpdateValue,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let column = scope.table.column_name(key);
    builder.push_identifier(column);
    builder.push_str(" = ");

    match value {
        UpdateValue::Value(value) => push_column_value(scope, key, value, builder),
        UpdateValue::Raw(raw) => raw.build(scope, builder)?,
        UpdateValue::Increment(by) | UpdateValue::Decrement(by) => {
            builder.push_identifier(column);
            builder.push_str(if matches!(value, UpdateValue::Increment(_)) {
                " + "
            } else {
                " - "
            });
            builder.push_param(by.clone());
        }
        UpdateValue::Query(query) => {
            builder.push('(');
            build_query(query, builder)?;
            builder.push(')');
        }
    }
    Ok(())
}

pub(super) fn build_update(
    query: &Query,
    data: &UpdateData,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let injected = inject(&data.items);
    let (columns, raws) = collect_assignments(data.items.iter().chain(&injected));

    if columns.is_empty() && raws.is_empty() {
        return Err(QueryError::Invalid("UPDATE without values to set".into()));
    }

    builder.push_str("UPDATE ");
    push_table_name(scope.table, builder);
    if scope.alias != scope.table.name() {
        builder.push_str(" AS ");
        builder.push_identifier(scope.alias);
    }

    builder.push_str(" SET ");
    builder.push_iter(columns.iter(), ", ", |builder, (key, value)| {
        push_assignment(key, value, scope, builder)
    })?;
    if !raws.is_empty() {
        if !columns.is_empty() {
            builder.push_str(", ");
        }
        builder.push_iter(raws.iter(), ", ", |builder, raw| raw.build(scope, builder))?;
    }

    push_where(scope, &query.data().and, &query.data().or, builder)?;
    push_returning(query, scope, builder)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use indexmap::IndexMap;

    use super::*;
    use crate::query::Injector;
    use crate::value::Value;

    fn set(key: &str, value: impl Into<Value>) -> UpdateItem {
        UpdateItem::Set(IndexMap::from([(
            key.to_string(),
            UpdateValue::Value(value.into()),
        )]))
    }

    #[test]
    fn last_write_wins_in_first_position() {
        let items = vec![set("name", "a"), set("age", 1), set("name", "b")];
        let (columns, raws) = collect_assignments(&items);

        assert_eq!(columns.keys().copied().collect::<Vec<_>>(), vec!["name", "age"]);
        assert!(matches!(
            columns.get("name"),
            Some(UpdateValue::Value(Value::Text(text))) if text == "b"
        ));
        assert!(raws.is_empty());
    }

    #[test]
    fn injector_sees_caller_entries() {
        let injector = Injector(Arc::new(|items: &[UpdateItem]| {
            if items.iter().any(|item| item.sets("updatedAt")) {
                None
            } else {
                Some(UpdateItem::Raw(RawSql::new("\"updatedAt\" = now()")))
            }
        }));

        let items = vec![set("name", "a"), UpdateItem::Inject(injector.clone())];
        assert_eq!(inject(&items).len(), 1);

        let items = vec![
            set("updatedAt", "2024-01-01"),
            UpdateItem::Inject(injector),
        ];
        assert!(inject(&items).is_empty());
    }
}
