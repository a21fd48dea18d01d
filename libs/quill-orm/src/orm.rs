// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! The table registry.

use std::sync::Arc;

use indexmap::IndexMap;
use quill_sql::{DatabaseConfig, Query, Record, Table, TracingLogger};
use tracing::debug;

use crate::error::OrmError;
use crate::relation::{KeyPair, Relation, RelationJoin, RelationQuery};
use crate::table_def::{
    RelationDef, RelationKind, RelationOptions, TableDef, UPDATED_AT, updated_at_injector,
};

/// A registered table: its base query and resolved relations.
#[derive(Debug)]
pub struct OrmTable {
    query: Query,
    relations: IndexMap<String, Arc<Relation>>,
}

impl OrmTable {
    /// A query over every column of the table, carrying the table's hooks, logger and injectors.
    pub fn query(&self) -> Query {
        self.query.clone()
    }

    pub fn table(&self) -> &Arc<Table> {
        self.query.table_arc()
    }

    pub fn name(&self) -> &str {
        self.query.table().name()
    }

    pub fn relation(&self, name: &str) -> Result<&Arc<Relation>, OrmError> {
        self.relations
            .get(name)
            .ok_or_else(|| OrmError::RelationNotFound {
                relation: name.to_string(),
                table: self.name().to_string(),
            })
    }

    /// Relations in declaration order.
    pub fn relations(&self) -> impl Iterator<Item = &Arc<Relation>> {
        self.relations.values()
    }

    /// Records of `relation` related to a captured record of this table.
    pub fn related(&self, relation: &str, record: Record) -> Result<RelationQuery, OrmError> {
        Ok(self.relation(relation)?.of(record))
    }
}

/// Every table of an application, with relations resolved across tables.
#[derive(Debug)]
pub struct Orm {
    tables: IndexMap<String, OrmTable>,
}

impl Orm {
    /// Register `tables` and resolve their relations.
    ///
    /// Fails when a relation refers to an unknown table or column, or when a `through` or
    /// `source` name can't be resolved.
    pub fn new(tables: Vec<TableDef>, config: &DatabaseConfig) -> Result<Self, OrmError> {
        let mut bases = IndexMap::new();
        let mut defs = IndexMap::new();
        for def in tables {
            let query = base_query(&def, config)?;
            bases.insert(def.name().to_string(), query);
            defs.insert(def.name().to_string(), def.relations);
        }

        let mut resolver = Resolver {
            bases: &bases,
            defs: &defs,
            config,
            resolved: IndexMap::new(),
            resolving: vec![],
        };

        let mut tables = IndexMap::new();
        for (name, relations) in &defs {
            let mut resolved = IndexMap::new();
            for relation in relations.keys() {
                resolved.insert(relation.clone(), resolver.resolve(name, relation)?);
            }
            debug!("Resolved {} relation(s) of `{name}`", resolved.len());
            tables.insert(
                name.clone(),
                OrmTable {
                    query: bases[name].clone(),
                    relations: resolved,
                },
            );
        }

        Ok(Self { tables })
    }

    pub fn table(&self, name: &str) -> Option<&OrmTable> {
        self.tables.get(name)
    }

    /// Like [`Orm::table`], failing with [`OrmError::TableNotFound`].
    pub fn get_table(&self, name: &str) -> Result<&OrmTable, OrmError> {
        self.table(name)
            .ok_or_else(|| OrmError::TableNotFound(name.to_string()))
    }

    pub fn relation(&self, table: &str, relation: &str) -> Result<&Arc<Relation>, OrmError> {
        self.get_table(table)?.relation(relation)
    }

    pub fn tables(&self) -> impl Iterator<Item = &OrmTable> {
        self.tables.values()
    }
}

fn apply_schema(table: Table, config: &DatabaseConfig) -> Table {
    match (&config.schema, table.schema()) {
        (Some(schema), None) => table.with_schema(schema.as_str()),
        _ => table,
    }
}

fn base_query(def: &TableDef, config: &DatabaseConfig) -> Result<Query, OrmError> {
    let table = Arc::new(apply_schema(def.table.clone(), config));
    let mut query = table.query().with_hooks(&def.hooks);

    if def.timestamps {
        if !table.has_column(UPDATED_AT) {
            return Err(OrmError::UnknownColumn {
                column: UPDATED_AT.to_string(),
                table: table.name().to_string(),
                context: "timestamps".to_string(),
            });
        }
        query = query.with_injector(updated_at_injector());
    }
    if config.log {
        query = query.with_logger(Arc::new(TracingLogger));
    }

    Ok(query)
}

struct Resolver<'a> {
    bases: &'a IndexMap<String, Query>,
    defs: &'a IndexMap<String, IndexMap<String, RelationDef>>,
    config: &'a DatabaseConfig,
    /// By (table, relation)
    resolved: IndexMap<(String, String), Arc<Relation>>,
    /// Through relations being resolved, to detect cycles
    resolving: Vec<(String, String)>,
}

impl Resolver<'_> {
    fn resolve(&mut self, table: &str, name: &str) -> Result<Arc<Relation>, OrmError> {
        let key = (table.to_string(), name.to_string());
        if let Some(relation) = self.resolved.get(&key) {
            return Ok(relation.clone());
        }
        if self.resolving.contains(&key) {
            return Err(OrmError::CyclicThrough {
                relation: name.to_string(),
                table: table.to_string(),
            });
        }

        let def = self
            .defs
            .get(table)
            .and_then(|relations| relations.get(name))
            .ok_or_else(|| OrmError::RelationNotFound {
                relation: name.to_string(),
                table: table.to_string(),
            })?;

        self.resolving.push(key.clone());
        let relation = self.resolve_def(table, def);
        self.resolving.pop();

        let relation = Arc::new(relation?);
        self.resolved.insert(key, relation.clone());
        Ok(relation)
    }

    fn base(&self, relation: &RelationDef, table: &str, target: &str) -> Result<Query, OrmError> {
        self.bases
            .get(target)
            .cloned()
            .ok_or_else(|| OrmError::UnknownTable {
                relation: relation.name.clone(),
                table: table.to_string(),
                target: target.to_string(),
            })
    }

    fn resolve_def(&mut self, table: &str, def: &RelationDef) -> Result<Relation, OrmError> {
        let owner = self.bases[table].clone();

        let (target, join) = match &def.options {
            RelationOptions::Keys {
                target,
                primary_key,
                foreign_key,
            } => {
                let target = self.base(def, table, target)?;
                if primary_key.len() != foreign_key.len() || primary_key.is_empty() {
                    return Err(OrmError::KeyMismatch {
                        relation: def.name.clone(),
                        table: table.to_string(),
                    });
                }

                // `child` keys live on the target, `parent` keys on the declaring table
                let (child_keys, parent_keys) = match def.kind {
                    RelationKind::BelongsTo => (primary_key, foreign_key),
                    _ => (foreign_key, primary_key),
                };
                check_columns(def, target.table(), child_keys)?;
                check_columns(def, owner.table(), parent_keys)?;

                let pairs = child_keys
                    .iter()
                    .zip(parent_keys)
                    .map(|(child, parent)| KeyPair {
                        child: child.clone(),
                        parent: parent.clone(),
                    })
                    .collect();
                (target, RelationJoin::Direct(pairs))
            }
            RelationOptions::JoinTable { target, keys } => {
                let target = self.base(def, table, target)?;
                check_columns(def, owner.table(), std::slice::from_ref(&keys.primary_key))?;
                check_columns(
                    def,
                    target.table(),
                    std::slice::from_ref(&keys.association_primary_key),
                )?;

                let join_table = Arc::new(apply_schema(Table::new(&keys.join_table), self.config));
                let join = RelationJoin::JoinTable {
                    table: join_table,
                    owner: KeyPair {
                        child: keys.foreign_key.clone(),
                        parent: keys.primary_key.clone(),
                    },
                    target: KeyPair {
                        child: keys.association_foreign_key.clone(),
                        parent: keys.association_primary_key.clone(),
                    },
                };
                (target, join)
            }
            RelationOptions::Through { through, source } => {
                let has_through = self
                    .defs
                    .get(table)
                    .is_some_and(|relations| relations.contains_key(through));
                if !has_through {
                    return Err(OrmError::ThroughNotFound {
                        relation: def.name.clone(),
                        table: table.to_string(),
                        through: through.clone(),
                    });
                }
                let through = self.resolve(table, through)?;

                let through_table = through.target().table().name().to_string();
                let has_source = self
                    .defs
                    .get(&through_table)
                    .is_some_and(|relations| relations.contains_key(source));
                if !has_source {
                    return Err(OrmError::SourceNotFound {
                        relation: def.name.clone(),
                        table: table.to_string(),
                        source_name: source.clone(),
                        through_table,
                    });
                }
                let source = self.resolve(&through_table, source)?;

                (source.target().clone(), RelationJoin::Through { through, source })
            }
        };

        Ok(Relation {
            name: def.name.clone(),
            kind: def.kind,
            owner,
            target,
            join,
        })
    }
}

fn check_columns(def: &RelationDef, table: &Table, keys: &[String]) -> Result<(), OrmError> {
    match keys.iter().find(|key| !table.has_column(key)) {
        Some(key) => Err(OrmError::UnknownColumn {
            column: key.clone(),
            table: table.name().to_string(),
            context: format!("the `{}` relation", def.name),
        }),
        None => Ok(()),
    }
}
