// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Clause items stored in [`QueryData`](super::QueryData).
//!
//! Nested queries are held behind `Arc`: deriving a query copies the clause lists but shares the
//! (never mutated) nested queries.

use std::fmt::Debug;
use std::sync::Arc;

use indexmap::IndexMap;

use crate::sql::RawSql;
use crate::table::Table;
use crate::value::{Record, Value};

use super::Query;

/// A column reference already resolved to a table alias and a database column name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub table: String,
    pub column: String,
}

impl ColumnRef {
    pub fn new(table: impl Into<String>, column: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            column: column.into(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expression {
    /// Column key, optionally prefixed with a table alias (`alias.Key`)
    Column(String),
    Qualified(ColumnRef),
    Raw(RawSql),
    Value(Value),
    /// `*`
    Star,
    /// `name(args...)`
    Function(String, Vec<Expression>),
    Query(Arc<Query>),
}

impl From<&str> for Expression {
    fn from(column: &str) -> Self {
        Expression::Column(column.to_string())
    }
}

impl From<RawSql> for Expression {
    fn from(raw: RawSql) -> Self {
        Expression::Raw(raw)
    }
}

#[derive(Debug, Clone)]
pub enum SelectItem {
    /// Every column of the table's shape
    All,
    /// Column key (or `alias.Key`), returned under its key
    Column(String),
    Aliased { alias: String, expr: Expression },
    /// Unaliased expression (e.g. a bound value in `INSERT ... SELECT`)
    Expr(Expression),
    Raw(RawSql),
    /// `row_to_json("alias".*) "alias"`
    JsonRow { alias: String },
    /// `COALESCE("alias".r, <fallback>) "alias"`
    Coalesce { alias: String, fallback: String },
}

#[derive(Debug, Clone)]
pub enum Operator {
    /// `= value`, `IS NULL` for null
    Eq(Value),
    /// `<> value`, `IS NOT NULL` for null
    NotEq(Value),
    Lt(Value),
    Lte(Value),
    Gt(Value),
    Gte(Value),
    In(Vec<Value>),
    NotIn(Vec<Value>),
    InQuery(Arc<Query>),
    /// Case-insensitive substring match
    Contains(String),
    StartsWith(String),
    EndsWith(String),
}

#[derive(Debug, Clone)]
pub enum WhereItem {
    Column { column: String, op: Operator },
    /// `left = right`
    Equals { left: Expression, right: Expression },
    /// `("a", "b") IN (($1, $2), ...)`
    In {
        columns: Vec<String>,
        values: Vec<Vec<Value>>,
    },
    Raw(RawSql),
    And(Vec<WhereItem>),
    Or(Vec<Vec<WhereItem>>),
    Not(Vec<WhereItem>),
    /// `EXISTS (<query>)`
    Exists(Arc<Query>),
}

impl WhereItem {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        WhereItem::Column {
            column: column.into(),
            op: Operator::Eq(value.into()),
        }
    }

    /// Equality on every entry of `record`, in order.
    pub fn from_record(record: &Record) -> Vec<WhereItem> {
        record
            .iter()
            .map(|(column, value)| WhereItem::eq(column, value.clone()))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

#[derive(Debug, Clone)]
pub enum JoinSource {
    Table {
        table: Arc<Table>,
        alias: Option<String>,
    },
    Query {
        query: Arc<Query>,
        alias: String,
    },
    Lateral {
        query: Arc<Query>,
        alias: String,
    },
}

#[derive(Debug, Clone)]
pub struct JoinItem {
    pub kind: JoinKind,
    pub source: JoinSource,
    /// ON conditions, compiled against the joined source
    pub conditions: Vec<WhereItem>,
}

impl JoinItem {
    pub fn is_lateral(&self) -> bool {
        matches!(self.source, JoinSource::Lateral { .. })
    }

    /// The alias the joined source is referenced by
    pub fn alias(&self) -> &str {
        match &self.source {
            JoinSource::Table { table, alias } => alias.as_deref().unwrap_or(table.name()),
            JoinSource::Query { alias, .. } | JoinSource::Lateral { alias, .. } => alias,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
    AscNullsFirst,
    AscNullsLast,
    DescNullsFirst,
    DescNullsLast,
}

#[derive(Debug, Clone)]
pub struct OrderItem {
    pub expr: Expression,
    pub direction: Option<SortDirection>,
}

#[derive(Debug, Clone)]
pub enum HavingItem {
    /// `function(arg) <op>`
    Aggregate {
        function: String,
        arg: Expression,
        op: Operator,
    },
    Raw(RawSql),
}

#[derive(Debug, Clone)]
pub enum WindowItem {
    Definition {
        name: String,
        partition_by: Vec<Expression>,
        order: Vec<OrderItem>,
    },
    Raw { name: String, sql: RawSql },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOperation {
    Union,
    UnionAll,
    Intersect,
    IntersectAll,
    Except,
    ExceptAll,
}

#[derive(Debug, Clone)]
pub enum QueryOrRaw {
    Query(Arc<Query>),
    Raw(RawSql),
}

#[derive(Debug, Clone)]
pub struct UnionItem {
    pub operand: QueryOrRaw,
    pub kind: SetOperation,
    /// Parenthesize the operand
    pub wrap: bool,
}

#[derive(Debug, Clone)]
pub struct WithItem {
    pub name: String,
    pub columns: Option<Vec<String>>,
    pub recursive: bool,
    pub materialized: Option<bool>,
    pub source: QueryOrRaw,
}

#[derive(Debug, Clone)]
pub enum FromSource {
    /// Another table (or CTE) by name
    Name(String),
    Query { query: Arc<Query>, alias: String },
    Raw(RawSql),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockStrength {
    Update,
    NoKeyUpdate,
    Share,
    KeyShare,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockWait {
    NoWait,
    SkipLocked,
}

#[derive(Debug, Clone)]
pub enum LockTables {
    Names(Vec<String>),
    Raw(RawSql),
}

#[derive(Debug, Clone)]
pub struct LockSpec {
    pub strength: LockStrength,
    pub tables: Option<LockTables>,
    pub wait: Option<LockWait>,
}

#[derive(Debug, Clone)]
pub enum InsertValue {
    Value(Value),
    Default,
    Raw(RawSql),
    Query(Arc<Query>),
}

impl From<Value> for InsertValue {
    fn from(value: Value) -> Self {
        InsertValue::Value(value)
    }
}

#[derive(Debug, Clone)]
pub enum InsertValues {
    Matrix(Vec<Vec<InsertValue>>),
    Raw(Vec<RawSql>),
    /// `INSERT ... SELECT`, with `values` appended to the sub-query's select list
    From { query: Arc<Query>, values: Vec<Value> },
}

#[derive(Debug, Clone)]
pub enum ConflictTarget {
    Columns(Vec<String>),
    Constraint(String),
    Raw(RawSql),
}

#[derive(Debug, Clone)]
pub enum MergeSpec {
    /// Every inserted column (excluding the conflict target)
    All,
    Columns(Vec<String>),
    Values(Record),
    Raw(RawSql),
}

#[derive(Debug, Clone)]
pub enum ConflictAction {
    Ignore,
    Merge(MergeSpec),
}

#[derive(Debug, Clone)]
pub struct OnConflict {
    pub target: Option<ConflictTarget>,
    pub action: ConflictAction,
}

#[derive(Debug, Clone)]
pub enum UpdateValue {
    Value(Value),
    Raw(RawSql),
    Increment(Value),
    Decrement(Value),
    Query(Arc<Query>),
}

impl From<Value> for UpdateValue {
    fn from(value: Value) -> Self {
        UpdateValue::Value(value)
    }
}

/// Produces an extra update entry from the entries seen so far (e.g. a timestamp that is only
/// set when the caller didn't set it).
#[derive(Clone)]
pub struct Injector(pub Arc<dyn Fn(&[UpdateItem]) -> Option<UpdateItem> + Send + Sync>);

impl Debug for Injector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Injector")
    }
}

#[derive(Debug, Clone)]
pub enum UpdateItem {
    Set(IndexMap<String, UpdateValue>),
    Raw(RawSql),
    Inject(Injector),
}

impl UpdateItem {
    /// Whether this entry sets `column` explicitly
    pub fn sets(&self, column: &str) -> bool {
        matches!(self, UpdateItem::Set(values) if values.contains_key(column))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyDirection {
    From,
    To,
}

#[derive(Debug, Clone)]
pub enum CopyTarget {
    Path(String),
    Program(String),
    Stdin,
    Stdout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyFormat {
    Text,
    Csv,
    Binary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CopyHeader {
    Enabled(bool),
    Match,
}

#[derive(Debug, Clone)]
pub enum ForceQuote {
    All,
    Columns(Vec<String>),
}

#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub format: Option<CopyFormat>,
    pub freeze: Option<bool>,
    pub delimiter: Option<String>,
    pub null: Option<String>,
    pub header: Option<CopyHeader>,
    pub quote: Option<String>,
    pub escape: Option<String>,
    pub force_quote: Option<ForceQuote>,
    pub force_not_null: Vec<String>,
    pub force_null: Vec<String>,
    pub encoding: Option<String>,
}
