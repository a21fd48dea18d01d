// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use quill_sql::query::{Expression, Operator, WhereItem};
use quill_sql::{Executor, Query, QueryError, QueryOutput, Record, Table, Value};
use tracing::{debug, instrument};

use crate::orm::OrmTable;
use crate::relation::{KeyPair, Relation, RelationJoin};
use crate::table_def::RelationKind;

use super::create::{Link, check_to_one, link_records, resolve_references};
use super::{NestedWrite, UpdateData, filter_items};

/// Every statement of a nested update. The records to update are selected first so that
/// relation writes can refer to their keys.
#[instrument(skip_all, fields(table = table.name()))]
pub(super) async fn run(
    table: &OrmTable,
    query: &Query,
    executor: &dyn Executor,
    data: UpdateData,
) -> Result<QueryOutput, QueryError> {
    let rows = query
        .clear_select()
        .all()
        .execute(executor)
        .await?
        .into_records();
    if rows.is_empty() {
        if query.data().return_type.throws_on_not_found() {
            return Err(QueryError::NotFound);
        }
        return Ok(unchanged(query, rows));
    }
    debug!("Updating {} record(s) with nested writes", rows.len());

    let mut writes = vec![];
    for (name, write) in &data.relations {
        let relation = table
            .relation(name)
            .map_err(|e| QueryError::Invalid(e.to_string()))?;
        check_to_one(relation, Some(write))?;
        writes.push((relation, write));
    }

    let mut values = data.values;
    let mut deleted_references = vec![];
    for (relation, write) in writes.iter().filter(|(r, _)| r.kind() == RelationKind::BelongsTo) {
        if write_references(relation, executor, &rows, write, &mut values).await? {
            deleted_references.push(*relation);
        }
    }

    let output = if values.is_empty() {
        unchanged(query, rows.clone())
    } else {
        query.update(values).execute(executor).await?
    };

    for relation in deleted_references {
        relation
            .target()
            .where_(relation.linked_to(&rows))
            .delete()
            .execute(executor)
            .await?;
    }

    for (relation, write) in writes.iter().filter(|(r, _)| r.kind() != RelationKind::BelongsTo) {
        match relation.join() {
            RelationJoin::Direct(_) => write_linked(relation, executor, &rows, write).await?,
            RelationJoin::JoinTable {
                table: join_table,
                owner,
                target,
            } => {
                let join = JoinTableWrite {
                    relation,
                    table: join_table,
                    owner,
                    target,
                };
                join.write(executor, &rows, write).await?
            }
            RelationJoin::Through { .. } => {
                return Err(QueryError::Unsupported(format!(
                    "Nested writes are not available on the `{}` relation defined with `through`",
                    relation.name()
                )));
            }
        }
    }

    Ok(output)
}

/// What an update without values to set returns: the record for single-record queries, the
/// number of matched records otherwise.
fn unchanged(query: &Query, rows: Vec<Record>) -> QueryOutput {
    if query.returns_single() {
        QueryOutput::One(rows.into_iter().next())
    } else {
        QueryOutput::RowCount(rows.len() as u64)
    }
}

/// Writes to a `belongsTo` relation, which change the foreign keys set on the updated records.
/// Returns whether the referenced records are to be deleted once the foreign keys are cleared.
async fn write_references(
    relation: &Relation,
    executor: &dyn Executor,
    rows: &[Record],
    write: &NestedWrite,
    values: &mut Record,
) -> Result<bool, QueryError> {
    let referenced = || relation.target().where_(relation.linked_to(rows));

    if write.disconnect.is_some() {
        values.extend(relation.null_values());
    }
    if let Some(filter) = &write.set {
        let found = relation
            .target()
            .where_all(filter_items(filter))
            .take()
            .execute(executor)
            .await?;
        if let Some(reference) = found.into_record() {
            values.extend(relation.reference_values(&reference));
        }
    }
    if let Some(update) = write.update.as_ref().filter(|u| !u.values.is_empty()) {
        referenced()
            .where_all(filter_items(&update.filter))
            .update(update.values.clone())
            .execute(executor)
            .await?;
    }
    if let Some(upsert) = &write.upsert {
        let linked = rows.iter().any(|row| {
            relation
                .pairs()
                .iter()
                .all(|pair| row.get(&pair.parent).is_some_and(|value| !value.is_null()))
        });
        if !linked {
            let created = relation
                .target()
                .create(upsert.create.clone())
                .execute(executor)
                .await?;
            if let Some(reference) = created.into_record() {
                values.extend(relation.reference_values(&reference));
            }
        } else if !upsert.update.is_empty() {
            referenced()
                .update(upsert.update.clone())
                .execute(executor)
                .await?;
        }
    }

    let link = Link::of(write).into_iter().next();
    if link.is_some() {
        let references = resolve_references(relation, executor, vec![link]).await?;
        if let Some(Some(reference)) = references.into_iter().next() {
            values.extend(relation.reference_values(&reference));
        }
    }

    let delete = write.delete.is_some();
    if delete {
        values.extend(relation.null_values());
    }
    Ok(delete)
}

/// Writes to a `hasOne` / `hasMany` relation, whose foreign keys live on the related records.
async fn write_linked(
    relation: &Relation,
    executor: &dyn Executor,
    rows: &[Record],
    write: &NestedWrite,
) -> Result<(), QueryError> {
    let linked = || relation.target().where_(relation.linked_to(rows));

    if let Some(filter) = &write.disconnect {
        linked()
            .where_all(filter_items(filter))
            .update(relation.null_values())
            .execute(executor)
            .await?;
    }
    if let Some(filter) = &write.set {
        linked()
            .update(relation.null_values())
            .execute(executor)
            .await?;
        if !filter.is_empty() {
            relation
                .target()
                .where_all(filter_items(filter))
                .update(relation.link_values(&rows[0]))
                .execute(executor)
                .await?;
        }
    }
    if let Some(filter) = &write.delete {
        linked()
            .where_all(filter_items(filter))
            .delete()
            .execute(executor)
            .await?;
    }
    if let Some(update) = write.update.as_ref().filter(|u| !u.values.is_empty()) {
        linked()
            .where_all(filter_items(&update.filter))
            .update(update.values.clone())
            .execute(executor)
            .await?;
    }
    if let Some(upsert) = &write.upsert {
        let found = if upsert.update.is_empty() {
            linked().exists().execute(executor).await?.row_count()
        } else {
            linked()
                .update(upsert.update.clone())
                .execute(executor)
                .await?
                .row_count()
        };
        if found == 0 {
            let mut values = relation.link_values(&rows[0]);
            values.extend(upsert.create.clone());
            relation.target().insert(values).execute(executor).await?;
        }
    }

    // A new record replaces the one linked by a to-one relation
    if relation.is_to_one() && !write.create.is_empty() {
        linked()
            .update(relation.null_values())
            .execute(executor)
            .await?;
    }

    let links = Link::of(write);
    if !links.is_empty() {
        let pending = rows.iter().map(|row| (row.clone(), links.clone())).collect();
        link_records(relation, executor, pending).await?;
    }
    Ok(())
}

/// Writes to a many-to-many relation, which add or remove rows of its join table.
struct JoinTableWrite<'a> {
    relation: &'a Relation,
    table: &'a Arc<Table>,
    /// Join table column referring to the updated records
    owner: &'a KeyPair,
    /// Join table column referring to the related records
    target: &'a KeyPair,
}

impl JoinTableWrite<'_> {
    fn join_rows(&self, rows: &[Record]) -> Query {
        let keys = rows
            .iter()
            .map(|row| row.get(&self.owner.parent).cloned().unwrap_or(Value::Null))
            .collect();
        Query::new(self.table.clone()).where_(WhereItem::Column {
            column: self.owner.child.clone(),
            op: Operator::In(keys),
        })
    }

    /// Related records of `rows` matching `filter`.
    fn related(&self, rows: &[Record], filter: &[Record]) -> Query {
        let linked = self.join_rows(rows).select(&[self.target.child.as_str()]);
        self.relation
            .target()
            .where_in_query(self.target.parent.as_str(), linked)
            .where_all(filter_items(filter))
    }

    /// Keys of the records matching `filter`.
    fn matching(&self, filter: &[Record]) -> Query {
        self.relation
            .target()
            .where_all(filter_items(filter))
            .select(&[self.target.parent.as_str()])
    }

    async fn write(
        &self,
        executor: &dyn Executor,
        rows: &[Record],
        write: &NestedWrite,
    ) -> Result<(), QueryError> {
        if let Some(filter) = &write.disconnect {
            let mut unlinked = self.join_rows(rows);
            if !filter.is_empty() {
                unlinked = unlinked.where_in_query(self.target.child.as_str(), self.matching(filter));
            }
            unlinked.delete().execute(executor).await?;
        }
        if let Some(filter) = &write.set {
            self.join_rows(rows).delete().execute(executor).await?;
            if !filter.is_empty() {
                let keys = self
                    .relation
                    .target()
                    .where_all(filter_items(filter))
                    .clear_select()
                    .select_as(
                        self.target.child.as_str(),
                        Expression::Column(self.target.parent.clone()),
                    );
                let mut owner = Record::new();
                owner.insert(
                    self.owner.child.clone(),
                    rows[0].get(&self.owner.parent).cloned().unwrap_or(Value::Null),
                );
                Query::new(self.table.clone())
                    .create_from(keys, owner)
                    .returning(quill_sql::ReturnType::RowCount)
                    .execute(executor)
                    .await?;
            }
        }
        if let Some(filter) = &write.delete {
            let keys = match self
                .related(rows, filter)
                .pluck(&self.target.parent)
                .execute(executor)
                .await?
            {
                QueryOutput::Pluck(keys) => keys,
                _ => vec![],
            };
            if !keys.is_empty() {
                self.join_rows(rows)
                    .where_(WhereItem::Column {
                        column: self.target.child.clone(),
                        op: Operator::In(keys.clone()),
                    })
                    .delete()
                    .execute(executor)
                    .await?;
                self.relation
                    .target()
                    .where_(WhereItem::Column {
                        column: self.target.parent.clone(),
                        op: Operator::In(keys),
                    })
                    .delete()
                    .execute(executor)
                    .await?;
            }
        }
        if let Some(update) = write.update.as_ref().filter(|u| !u.values.is_empty()) {
            self.related(rows, &update.filter)
                .update(update.values.clone())
                .execute(executor)
                .await?;
        }

        let links = Link::of(write);
        if !links.is_empty() {
            let pending = rows.iter().map(|row| (row.clone(), links.clone())).collect();
            link_records(self.relation, executor, pending).await?;
        }
        Ok(())
    }
}
