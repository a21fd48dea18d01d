// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Nested writes: creating or updating records together with their related records.
//!
//! A [`NestedWrite`] attached to a relation is applied in a fixed order: disconnect, set,
//! delete, update, upsert, create, connect, connect-or-create. Every statement of one call runs
//! in a single transaction, rolled back on the first failure, with the failure returned as is.
//!
//! Statements are batched across base records where the payload allows it (creates,
//! disconnects, deletes and updates), while connects run once per base record. Table hooks fire
//! once per executed statement, so they follow the batching.

mod create;
mod update;

use indexmap::IndexMap;
use quill_sql::query::WhereItem;
use quill_sql::{Adapter, Query, QueryError, Record, Transaction};
use tracing::error;

use crate::orm::OrmTable;
use crate::relation::Relation;

use std::sync::Arc;

/// Values of a record to create, with writes to its relations by relation name.
#[derive(Debug, Clone, Default)]
pub struct CreateData {
    pub values: Record,
    pub relations: IndexMap<String, NestedWrite>,
}

/// Values to set on the updated records, with writes to their relations by relation name.
#[derive(Debug, Clone, Default)]
pub struct UpdateData {
    pub values: Record,
    pub relations: IndexMap<String, NestedWrite>,
}

impl CreateData {
    pub fn new(values: Record) -> Self {
        Self {
            values,
            relations: IndexMap::new(),
        }
    }

    pub fn with(mut self, relation: &str, write: NestedWrite) -> Self {
        self.relations.insert(relation.to_string(), write);
        self
    }
}

impl UpdateData {
    pub fn new(values: Record) -> Self {
        Self {
            values,
            relations: IndexMap::new(),
        }
    }

    pub fn with(mut self, relation: &str, write: NestedWrite) -> Self {
        self.relations.insert(relation.to_string(), write);
        self
    }
}

/// Conditions picking related records: any of the records matches (an empty filter matches
/// every linked record).
pub type Filter = Vec<Record>;

#[derive(Debug, Clone, Default)]
pub struct NestedUpdate {
    pub filter: Filter,
    pub values: Record,
}

#[derive(Debug, Clone, Default)]
pub struct Upsert {
    pub update: Record,
    pub create: Record,
}

#[derive(Debug, Clone, Default)]
pub struct ConnectOrCreate {
    pub filter: Record,
    pub create: Record,
}

/// Writes applied to one relation of a created or updated record.
#[derive(Debug, Clone, Default)]
pub struct NestedWrite {
    /// Unlink the linked records matching the filter
    pub disconnect: Option<Filter>,
    /// Replace the linked records with the records matching the filter
    pub set: Option<Filter>,
    /// Delete the linked records matching the filter
    pub delete: Option<Filter>,
    pub update: Option<NestedUpdate>,
    /// Update the linked record, or create and link one when there is none
    pub upsert: Option<Upsert>,
    /// Create records and link them (replacing the linked record of a to-one relation)
    pub create: Vec<Record>,
    /// Link existing records, one filter per record
    pub connect: Vec<Record>,
    pub connect_or_create: Vec<ConnectOrCreate>,
}

impl NestedWrite {
    pub fn disconnect(mut self) -> Self {
        self.disconnect = Some(vec![]);
        self
    }

    pub fn disconnect_where(mut self, filter: Filter) -> Self {
        self.disconnect = Some(filter);
        self
    }

    pub fn set(mut self, filter: Filter) -> Self {
        self.set = Some(filter);
        self
    }

    pub fn delete(mut self) -> Self {
        self.delete = Some(vec![]);
        self
    }

    pub fn delete_where(mut self, filter: Filter) -> Self {
        self.delete = Some(filter);
        self
    }

    pub fn update(self, values: Record) -> Self {
        self.update_where(vec![], values)
    }

    pub fn update_where(mut self, filter: Filter, values: Record) -> Self {
        self.update = Some(NestedUpdate { filter, values });
        self
    }

    pub fn upsert(mut self, update: Record, create: Record) -> Self {
        self.upsert = Some(Upsert { update, create });
        self
    }

    pub fn create(mut self, record: Record) -> Self {
        self.create.push(record);
        self
    }

    pub fn connect(mut self, filter: Record) -> Self {
        self.connect.push(filter);
        self
    }

    pub fn connect_or_create(mut self, filter: Record, create: Record) -> Self {
        self.connect_or_create.push(ConnectOrCreate { filter, create });
        self
    }

    /// Names of the operations that need a single base record.
    fn single_record_operations(&self) -> Vec<&'static str> {
        let mut operations = vec![];
        if self.set.is_some() {
            operations.push("set");
        }
        if self.upsert.is_some() {
            operations.push("upsert");
        }
        if !self.create.is_empty() {
            operations.push("create");
        }
        operations
    }

    /// Names of the operations that can't be applied while creating the base record.
    fn update_operations(&self) -> Vec<&'static str> {
        let mut operations = vec![];
        if self.disconnect.is_some() {
            operations.push("disconnect");
        }
        if self.set.is_some() {
            operations.push("set");
        }
        if self.delete.is_some() {
            operations.push("delete");
        }
        if self.update.is_some() {
            operations.push("update");
        }
        if self.upsert.is_some() {
            operations.push("upsert");
        }
        operations
    }
}

/// `WHERE` items for a filter: one record is ANDed in, several become alternatives.
pub(crate) fn filter_items(filter: &[Record]) -> Vec<WhereItem> {
    match filter {
        [] => vec![],
        [record] => WhereItem::from_record(record),
        records => vec![WhereItem::Or(
            records.iter().map(WhereItem::from_record).collect(),
        )],
    }
}

/// Resolve the relations written to, in first-use order.
fn written_relations<'a, 'b>(
    table: &'a OrmTable,
    writes: impl Iterator<Item = &'b IndexMap<String, NestedWrite>>,
) -> Result<Vec<&'a Arc<Relation>>, QueryError> {
    let mut relations: Vec<&Arc<Relation>> = vec![];
    for names in writes {
        for name in names.keys() {
            let relation = table
                .relation(name)
                .map_err(|e| QueryError::Invalid(e.to_string()))?;
            if relation.is_through() {
                return Err(QueryError::Unsupported(format!(
                    "Nested writes are not available on the `{name}` relation defined with `through`"
                )));
            }
            if !relations.iter().any(|known| Arc::ptr_eq(known, relation)) {
                relations.push(relation);
            }
        }
    }
    Ok(relations)
}

/// Commit when `result` is a success, roll back otherwise. A failure to roll back is logged and
/// the original error is returned.
async fn finish<T>(
    transaction: Box<dyn Transaction + '_>,
    result: Result<T, QueryError>,
) -> Result<T, QueryError> {
    match result {
        Ok(value) => {
            transaction.commit().await?;
            Ok(value)
        }
        Err(e) => {
            if let Err(rollback) = transaction.rollback().await {
                error!("Failed to roll back a nested write: {rollback}");
            }
            Err(e)
        }
    }
}

impl OrmTable {
    /// Create a record with its nested relation writes and return it.
    pub async fn create(
        &self,
        adapter: &dyn Adapter,
        data: CreateData,
    ) -> Result<Record, QueryError> {
        self.create_many(adapter, vec![data])
            .await?
            .into_iter()
            .next()
            .ok_or(QueryError::NotFound)
    }

    /// Create records with their nested relation writes and return them, in order.
    pub async fn create_many(
        &self,
        adapter: &dyn Adapter,
        data: Vec<CreateData>,
    ) -> Result<Vec<Record>, QueryError> {
        let relations = written_relations(self, data.iter().map(|data| &data.relations))?;
        for (name, write) in data.iter().flat_map(|data| &data.relations) {
            if let [operation, ..] = write.update_operations()[..] {
                return Err(QueryError::Invalid(format!(
                    "`{operation}` of the `{name}` relation is only available when updating"
                )));
            }
        }

        if relations.is_empty() {
            let records = data.into_iter().map(|data| data.values).collect();
            let output = self.query().create_many(records).execute(adapter).await?;
            return Ok(output.into_records());
        }

        let transaction = adapter.begin().await?;
        let result = create::run(self, &relations, transaction.executor(), data).await;
        finish(transaction, result).await
    }

    /// Update the records matched by `query` (a query of this table) and apply the nested
    /// relation writes to them.
    ///
    /// `set`, `upsert` and `create` need a single base record: they fail with
    /// [`QueryError::Cardinality`] before anything runs unless `query` targets one record.
    pub async fn update(
        &self,
        adapter: &dyn Adapter,
        query: &Query,
        data: UpdateData,
    ) -> Result<quill_sql::QueryOutput, QueryError> {
        if query.table().name() != self.name() {
            return Err(QueryError::Invalid(format!(
                "Cannot update `{}` with a query of `{}`",
                self.name(),
                query.table().name()
            )));
        }

        let relations = written_relations(self, std::iter::once(&data.relations))?;
        if !query.returns_single() {
            for (name, write) in &data.relations {
                if let [operation, ..] = write.single_record_operations()[..] {
                    return Err(QueryError::Cardinality(format!(
                        "`{operation}` of the `{name}` relation can't be applied to a query updating multiple records"
                    )));
                }
            }
        }
        for (name, write) in &data.relations {
            let relation = self
                .relation(name)
                .map_err(|e| QueryError::Invalid(e.to_string()))?;
            if write.upsert.is_some() && !relation.is_to_one() {
                return Err(QueryError::Invalid(format!(
                    "`upsert` is only available on to-one relations, `{name}` is not one"
                )));
            }
        }

        if relations.is_empty() {
            return query.update(data.values).execute(adapter).await;
        }

        let transaction = adapter.begin().await?;
        let result = update::run(self, query, transaction.executor(), data).await;
        finish(transaction, result).await
    }
}
