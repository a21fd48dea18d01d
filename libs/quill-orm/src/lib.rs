// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Tables with relations on top of `quill-sql`.
//!
//! Tables are declared with [`TableDef`] and registered together in an [`Orm`], which resolves
//! the relations between them. A resolved [`Relation`] can then be queried from a captured
//! record ([`Relation::of`]) or from a parent query ([`QueryRelationsExt::related`]), used in
//! `EXISTS`, join and lateral select clauses, and written to through nested creates and
//! updates ([`OrmTable::create`], [`OrmTable::update`]).
//!
//! ```ignore
//! let orm = Orm::new(
//!     vec![
//!         TableDef::new(user).relation(RelationDef::has_one("profile", "profile", &["Id"], &["UserId"])),
//!         TableDef::new(profile).relation(RelationDef::belongs_to("user", "user", &["Id"], &["UserId"])),
//!     ],
//!     &DatabaseConfig::default(),
//! )?;
//! let profile = orm.relation("user", "profile")?;
//! let sql = orm.get_table("user")?.query().find(1).related(profile).to_sql()?;
//! ```

mod error;
mod nested;
mod orm;
pub mod relation;
pub mod table_def;

pub use error::OrmError;
pub use nested::{ConnectOrCreate, CreateData, Filter, NestedUpdate, NestedWrite, UpdateData, Upsert};
pub use orm::{Orm, OrmTable};
pub use relation::{QueryRelationsExt, Relation, RelationQuery, RelationSelect};
pub use table_def::{JoinTableKeys, RelationDef, RelationKind, RelationOptions, TableDef};
