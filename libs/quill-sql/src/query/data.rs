// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::columns::{ColumnType, Shape};
use crate::error::QueryError;
use crate::logger::QueryLogger;
use crate::value::Record;

use super::Query;
use super::types::*;

/// What the caller gets back when a query is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReturnType {
    #[default]
    All,
    /// First record, if any
    One,
    /// First record, failing with [`QueryError::NotFound`] when there is none
    OneOrThrow,
    /// Rows as positional arrays
    Rows,
    /// First column of every row
    Pluck,
    /// First column of the first row, if any
    Value,
    ValueOrThrow,
    RowCount,
    Void,
}

impl ReturnType {
    /// Whether the query is statically known to target at most one record.
    pub fn is_single(&self) -> bool {
        matches!(
            self,
            ReturnType::One | ReturnType::OneOrThrow | ReturnType::Value | ReturnType::ValueOrThrow
        )
    }

    pub fn throws_on_not_found(&self) -> bool {
        matches!(self, ReturnType::OneOrThrow | ReturnType::ValueOrThrow)
    }
}

pub type BeforeHook = Arc<dyn Fn(&Query) -> Result<(), QueryError> + Send + Sync>;
pub type AfterHook = Arc<dyn Fn(&Query, &[Record]) -> Result<(), QueryError> + Send + Sync>;

#[derive(Clone, Default)]
pub struct QueryHooks {
    pub before_query: Vec<BeforeHook>,
    pub after_query: Vec<AfterHook>,
    pub before_create: Vec<BeforeHook>,
    pub after_create: Vec<AfterHook>,
    pub before_update: Vec<BeforeHook>,
    pub after_update: Vec<AfterHook>,
    pub before_delete: Vec<BeforeHook>,
    pub after_delete: Vec<AfterHook>,
}

impl Debug for QueryHooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryHooks")
            .field("before_query", &self.before_query.len())
            .field("after_query", &self.after_query.len())
            .field("before_create", &self.before_create.len())
            .field("after_create", &self.after_create.len())
            .field("before_update", &self.before_update.len())
            .field("after_update", &self.after_update.len())
            .field("before_delete", &self.before_delete.len())
            .field("after_delete", &self.after_delete.len())
            .finish()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SelectData {
    /// `None`: no DISTINCT; empty: plain DISTINCT; otherwise DISTINCT ON
    pub distinct: Option<Vec<Expression>>,
    /// `FROM ONLY`
    pub only: bool,
    pub join: Vec<JoinItem>,
    pub group: Vec<Expression>,
    pub having: Vec<HavingItem>,
    pub having_or: Vec<Vec<HavingItem>>,
    pub window: Vec<WindowItem>,
    pub union: Vec<UnionItem>,
    pub order: Vec<OrderItem>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
    pub lock: Option<LockSpec>,
}

#[derive(Debug, Clone)]
pub struct InsertData {
    /// Column keys, in value order
    pub columns: Vec<String>,
    pub values: InsertValues,
    pub on_conflict: Option<OnConflict>,
}

#[derive(Debug, Clone, Default)]
pub struct UpdateData {
    /// Applied left to right; a later entry overrides an earlier one for the same column
    pub items: Vec<UpdateItem>,
}

#[derive(Debug, Clone, Default)]
pub struct DeleteData {
    /// USING sources (lateral joins are skipped)
    pub join: Vec<JoinItem>,
}

#[derive(Debug, Clone, Default)]
pub struct TruncateData {
    pub restart_identity: bool,
    pub cascade: bool,
}

#[derive(Debug, Clone, Default)]
pub struct ColumnInfoData {
    pub column: Option<String>,
}

#[derive(Debug, Clone)]
pub struct CopyData {
    pub direction: CopyDirection,
    pub columns: Vec<String>,
    pub target: CopyTarget,
    pub options: CopyOptions,
}

#[derive(Debug, Clone)]
pub enum QueryKind {
    Select(SelectData),
    Insert(InsertData),
    Update(UpdateData),
    Delete(DeleteData),
    Truncate(TruncateData),
    ColumnInfo(ColumnInfoData),
    Copy(CopyData),
}

impl Default for QueryKind {
    fn default() -> Self {
        QueryKind::Select(SelectData::default())
    }
}

impl QueryKind {
    pub fn name(&self) -> &'static str {
        match self {
            QueryKind::Select(_) => "select",
            QueryKind::Insert(_) => "insert",
            QueryKind::Update(_) => "update",
            QueryKind::Delete(_) => "delete",
            QueryKind::Truncate(_) => "truncate",
            QueryKind::ColumnInfo(_) => "columnInfo",
            QueryKind::Copy(_) => "copy",
        }
    }
}

/// Everything a query carries. Cloning copies each clause list one level deep, so a derived
/// query never shares a list with the query it was derived from.
#[derive(Debug, Clone, Default)]
pub struct QueryData {
    pub kind: QueryKind,
    pub return_type: ReturnType,
    pub with: Vec<WithItem>,
    pub select: Vec<SelectItem>,
    pub and: Vec<WhereItem>,
    pub or: Vec<Vec<WhereItem>>,
    pub alias: Option<String>,
    pub from: Option<FromSource>,
    /// Shapes of joined sources by alias, for resolving `alias.Key`
    pub joined_shapes: IndexMap<String, Arc<Shape>>,
    /// Codecs for values selected from joined sources, by alias
    pub joined_parsers: IndexMap<String, Arc<Shape>>,
    /// Codecs for aliased selections, by output key
    pub parsers: IndexMap<String, ColumnType>,
    pub hooks: QueryHooks,
    /// Update entries appended to every UPDATE derived from this query
    pub injectors: Vec<Injector>,
    pub logger: Option<Arc<dyn QueryLogger>>,
    /// Set when a builder call produced a combination that can't be compiled
    pub invalid: Option<String>,
}

impl QueryData {
    pub fn select_data(&self) -> Option<&SelectData> {
        match &self.kind {
            QueryKind::Select(data) => Some(data),
            _ => None,
        }
    }
}
