// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::sync::Arc;

use quill_sql::{Executor, Query, QueryError, Record, Value};
use tracing::{debug, instrument};

use crate::orm::OrmTable;
use crate::relation::{KeyPair, Relation, RelationJoin};
use crate::table_def::RelationKind;

use super::{ConnectOrCreate, CreateData, NestedWrite, filter_items};

/// A related record to link to a parent record.
#[derive(Debug, Clone)]
pub(super) enum Link {
    Create(Record),
    /// An existing record, by filter
    Connect(Record),
    ConnectOrCreate(ConnectOrCreate),
}

impl Link {
    /// The links a nested write asks for: creates, then connects, then connect-or-creates.
    pub(super) fn of(write: &NestedWrite) -> Vec<Link> {
        let created = write.create.iter().cloned().map(Link::Create);
        let connected = write.connect.iter().cloned().map(Link::Connect);
        let or_created = write
            .connect_or_create
            .iter()
            .cloned()
            .map(Link::ConnectOrCreate);
        created.chain(connected).chain(or_created).collect()
    }
}

/// `belongsTo` relations write the foreign keys of the base record, so they run before it is
/// inserted; every other relation runs after.
#[instrument(skip_all, fields(table = table.name()))]
pub(super) async fn run(
    table: &OrmTable,
    relations: &[&Arc<Relation>],
    executor: &dyn Executor,
    mut data: Vec<CreateData>,
) -> Result<Vec<Record>, QueryError> {
    for relation in relations {
        for data in &data {
            check_to_one(relation, data.relations.get(relation.name()))?;
        }
    }

    for relation in relations.iter().filter(|r| r.kind() == RelationKind::BelongsTo) {
        let links: Vec<Option<Link>> = data
            .iter()
            .map(|data| {
                data.relations
                    .get(relation.name())
                    .and_then(|write| Link::of(write).into_iter().next())
            })
            .collect();
        let references = resolve_references(relation, executor, links).await?;
        for (data, reference) in data.iter_mut().zip(references) {
            if let Some(reference) = reference {
                data.values.extend(relation.reference_values(&reference));
            }
        }
    }

    let values = data.iter().map(|data| data.values.clone()).collect();
    let records = table
        .query()
        .create_many(values)
        .execute(executor)
        .await?
        .into_records();
    debug!("Created {} base record(s)", records.len());

    for relation in relations.iter().filter(|r| r.kind() != RelationKind::BelongsTo) {
        let pending = records
            .iter()
            .zip(&data)
            .filter_map(|(record, data)| {
                let write = data.relations.get(relation.name())?;
                Some((record.clone(), Link::of(write)))
            })
            .collect();
        link_records(relation, executor, pending).await?;
    }

    Ok(records)
}

/// A to-one relation links at most one record per parent.
pub(super) fn check_to_one(relation: &Relation, write: Option<&NestedWrite>) -> Result<(), QueryError> {
    let Some(write) = write else {
        return Ok(());
    };
    let count = write.create.len() + write.connect.len() + write.connect_or_create.len();
    if relation.is_to_one() && count > 1 {
        return Err(QueryError::Invalid(format!(
            "The `{}` relation links a single record",
            relation.name()
        )));
    }
    Ok(())
}

/// The record each link of a `belongsTo` relation refers to, creating the new ones in one
/// statement.
pub(super) async fn resolve_references(
    relation: &Relation,
    executor: &dyn Executor,
    links: Vec<Option<Link>>,
) -> Result<Vec<Option<Record>>, QueryError> {
    let mut references = vec![None; links.len()];
    let mut to_create = vec![];

    for (index, link) in links.into_iter().enumerate() {
        match link {
            None => {}
            Some(Link::Create(record)) => to_create.push((index, record)),
            Some(Link::Connect(filter)) => {
                let found = relation
                    .target()
                    .where_all(filter_items(std::slice::from_ref(&filter)))
                    .take()
                    .execute(executor)
                    .await?;
                references[index] = found.into_record();
            }
            Some(Link::ConnectOrCreate(entry)) => {
                let found = relation
                    .target()
                    .where_all(filter_items(std::slice::from_ref(&entry.filter)))
                    .take_optional()
                    .execute(executor)
                    .await?
                    .into_record();
                match found {
                    Some(record) => references[index] = Some(record),
                    None => to_create.push((index, entry.create)),
                }
            }
        }
    }

    if !to_create.is_empty() {
        let records = to_create.iter().map(|(_, record)| record.clone()).collect();
        let created = relation
            .target()
            .create_many(records)
            .execute(executor)
            .await?
            .into_records();
        for ((index, _), record) in to_create.into_iter().zip(created) {
            references[index] = Some(record);
        }
    }

    Ok(references)
}

/// Link related records to parent records of a `hasOne`, `hasMany` or many-to-many relation.
/// New related records are created in one statement across parents.
pub(super) async fn link_records(
    relation: &Relation,
    executor: &dyn Executor,
    pending: Vec<(Record, Vec<Link>)>,
) -> Result<(), QueryError> {
    match relation.join() {
        RelationJoin::Direct(_) => link_direct(relation, executor, pending).await,
        RelationJoin::JoinTable { table, owner, target } => {
            link_join_table(relation, executor, table, (owner, target), pending).await
        }
        RelationJoin::Through { .. } => Err(QueryError::Unsupported(format!(
            "Nested writes are not available on the `{}` relation defined with `through`",
            relation.name()
        ))),
    }
}

async fn link_direct(
    relation: &Relation,
    executor: &dyn Executor,
    pending: Vec<(Record, Vec<Link>)>,
) -> Result<(), QueryError> {
    let mut to_create = vec![];
    for (parent, links) in pending {
        let link_values = relation.link_values(&parent);
        for link in links {
            let (filter, fallback) = match link {
                Link::Create(record) => {
                    to_create.push(with_values(&link_values, record));
                    continue;
                }
                Link::Connect(filter) => (filter, None),
                Link::ConnectOrCreate(entry) => (entry.filter, Some(entry.create)),
            };

            let updated = relation
                .target()
                .where_all(filter_items(std::slice::from_ref(&filter)))
                .update(link_values.clone())
                .execute(executor)
                .await?;
            if updated.row_count() == 0 {
                match fallback {
                    Some(record) => to_create.push(with_values(&link_values, record)),
                    None => return Err(QueryError::NotFound),
                }
            }
        }
    }

    if !to_create.is_empty() {
        relation
            .target()
            .insert_many(to_create)
            .execute(executor)
            .await?;
    }
    Ok(())
}

fn with_values(values: &Record, record: Record) -> Record {
    let mut values = values.clone();
    values.extend(record);
    values
}

async fn link_join_table(
    relation: &Relation,
    executor: &dyn Executor,
    join_table: &Arc<quill_sql::Table>,
    (owner, target): (&KeyPair, &KeyPair),
    pending: Vec<(Record, Vec<Link>)>,
) -> Result<(), QueryError> {
    let mut rows = vec![];
    // (parent index, record), created in one statement
    let mut to_create = vec![];

    for (index, (parent, links)) in pending.iter().enumerate() {
        for link in links {
            let (filter, fallback) = match link {
                Link::Create(record) => {
                    to_create.push((index, record.clone()));
                    continue;
                }
                Link::Connect(filter) => (filter, None),
                Link::ConnectOrCreate(entry) => (&entry.filter, Some(&entry.create)),
            };

            let lookup = relation
                .target()
                .where_all(filter_items(std::slice::from_ref(filter)));
            let lookup = match fallback {
                Some(_) => lookup.get_optional(&target.parent),
                None => lookup.get(&target.parent),
            };
            match (lookup.execute(executor).await?.into_value(), fallback) {
                (Some(key), _) => rows.push(join_row(owner, target, parent, key)),
                (None, Some(record)) => to_create.push((index, record.clone())),
                (None, None) => return Err(QueryError::NotFound),
            }
        }
    }

    if !to_create.is_empty() {
        let records = to_create.iter().map(|(_, record)| record.clone()).collect();
        let created = relation
            .target()
            .create_many(records)
            .execute(executor)
            .await?
            .into_records();
        for ((index, _), record) in to_create.iter().zip(created) {
            let key = record.get(&target.parent).cloned().unwrap_or(Value::Null);
            rows.push(join_row(owner, target, &pending[*index].0, key));
        }
    }

    if !rows.is_empty() {
        Query::new(join_table.clone())
            .insert_many(rows)
            .execute(executor)
            .await?;
    }
    Ok(())
}

/// A join table row linking `parent` to the target record with key `key`.
pub(super) fn join_row(owner: &KeyPair, target: &KeyPair, parent: &Record, key: Value) -> Record {
    let mut row = Record::new();
    row.insert(
        owner.child.clone(),
        parent.get(&owner.parent).cloned().unwrap_or(Value::Null),
    );
    row.insert(target.child.clone(), key);
    row
}

#[cfg(test)]
mod tests {
    use quill_sql::record;

    use super::*;

    #[test]
    fn links_in_order() {
        let write = NestedWrite::default()
            .connect_or_create(record! { "Id" => 1 }, record! { "Bio" => "a" })
            .connect(record! { "Id" => 2 })
            .create(record! { "Bio" => "b" });

        let links = Link::of(&write);
        assert!(matches!(
            &links[..],
            [Link::Create(_), Link::Connect(_), Link::ConnectOrCreate(_)]
        ));
    }

    #[test]
    fn join_rows() {
        let owner = KeyPair {
            child: "postId".into(),
            parent: "Id".into(),
        };
        let target = KeyPair {
            child: "tagId".into(),
            parent: "Id".into(),
        };
        assert_eq!(
            join_row(&owner, &target, &record! { "Id" => 1 }, Value::from(5)),
            record! { "postId" => 1, "tagId" => 5 }
        );
    }
}
