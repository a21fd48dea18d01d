// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Column types: the SQL type of a column, how its values are sent to and read from the
//! database, and how it describes itself in generated table definitions.

mod array;
mod number;

use chrono::{DateTime, NaiveDate, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::value::Value;

pub use array::parse_array;
pub use number::NumberKind;

/// Column key to column type, in declaration order.
pub type Shape = IndexMap<String, ColumnType>;

/// Per-column codec.
pub trait ColumnCodec {
    /// SQL type name, e.g. `decimal(10, 2)` or `text[]`
    fn to_sql(&self) -> String;

    /// Builder expression for generated table definitions, `t` being the builder variable.
    fn to_code(&self, t: &str) -> String;

    /// Value to bind for this column.
    fn encode(&self, value: Value) -> Value;

    /// Decode a single element of a textual array literal.
    fn parse_item(&self, text: &str) -> Value;

    /// Decode a value returned by the database.
    fn parse(&self, value: Value) -> Value;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ColumnKind {
    Number(NumberKind),
    Text,
    Varchar(Option<u32>),
    Boolean,
    Json { binary: bool },
    Uuid,
    Timestamp { time_zone: bool },
    Date,
    Array(Box<ColumnType>),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    /// `GENERATED ALWAYS` rather than `GENERATED BY DEFAULT`
    pub always: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ColumnData {
    /// Database column name when it differs from the column key.
    pub name: Option<String>,
    pub nullable: bool,
    pub primary_key: bool,
    /// Raw SQL default.
    pub default: Option<String>,
    pub identity: Option<Identity>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnType {
    pub kind: ColumnKind,
    pub data: ColumnData,
}

impl ColumnType {
    pub fn new(kind: ColumnKind) -> Self {
        Self {
            kind,
            data: ColumnData::default(),
        }
    }

    pub fn smallint() -> Self {
        Self::new(ColumnKind::Number(NumberKind::SmallInt))
    }

    pub fn integer() -> Self {
        Self::new(ColumnKind::Number(NumberKind::Integer))
    }

    pub fn bigint() -> Self {
        Self::new(ColumnKind::Number(NumberKind::BigInt))
    }

    pub fn smallserial() -> Self {
        Self::new(ColumnKind::Number(NumberKind::SmallSerial))
    }

    pub fn serial() -> Self {
        Self::new(ColumnKind::Number(NumberKind::Serial))
    }

    pub fn bigserial() -> Self {
        Self::new(ColumnKind::Number(NumberKind::BigSerial))
    }

    pub fn decimal(precision: Option<u32>, scale: Option<u32>) -> Self {
        Self::new(ColumnKind::Number(NumberKind::Decimal { precision, scale }))
    }

    pub fn real() -> Self {
        Self::new(ColumnKind::Number(NumberKind::Real))
    }

    pub fn double_precision() -> Self {
        Self::new(ColumnKind::Number(NumberKind::DoublePrecision))
    }

    pub fn text() -> Self {
        Self::new(ColumnKind::Text)
    }

    pub fn varchar(limit: Option<u32>) -> Self {
        Self::new(ColumnKind::Varchar(limit))
    }

    pub fn boolean() -> Self {
        Self::new(ColumnKind::Boolean)
    }

    pub fn json() -> Self {
        Self::new(ColumnKind::Json { binary: false })
    }

    pub fn jsonb() -> Self {
        Self::new(ColumnKind::Json { binary: true })
    }

    pub fn uuid() -> Self {
        Self::new(ColumnKind::Uuid)
    }

    pub fn timestamp() -> Self {
        Self::new(ColumnKind::Timestamp { time_zone: false })
    }

    pub fn timestamptz() -> Self {
        Self::new(ColumnKind::Timestamp { time_zone: true })
    }

    pub fn date() -> Self {
        Self::new(ColumnKind::Date)
    }

    pub fn array(item: ColumnType) -> Self {
        Self::new(ColumnKind::Array(Box::new(item)))
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.data.name = Some(name.into());
        self
    }

    pub fn nullable(mut self) -> Self {
        self.data.nullable = true;
        self
    }

    pub fn primary_key(mut self) -> Self {
        self.data.primary_key = true;
        self
    }

    pub fn default_raw(mut self, sql: impl Into<String>) -> Self {
        self.data.default = Some(sql.into());
        self
    }

    pub fn identity(mut self, always: bool) -> Self {
        self.data.identity = Some(Identity { always });
        self
    }

    /// Database name of the column stored under `key`.
    pub fn column_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.data.name.as_deref().unwrap_or(key)
    }

    fn is_serial(&self) -> bool {
        matches!(&self.kind, ColumnKind::Number(kind) if kind.is_serial())
    }
}

impl ColumnCodec for ColumnType {
    fn to_sql(&self) -> String {
        match &self.kind {
            ColumnKind::Number(kind) => kind.to_sql(),
            ColumnKind::Text => "text".into(),
            ColumnKind::Varchar(Some(limit)) => format!("varchar({limit})"),
            ColumnKind::Varchar(None) => "varchar".into(),
            ColumnKind::Boolean => "boolean".into(),
            ColumnKind::Json { binary: false } => "json".into(),
            ColumnKind::Json { binary: true } => "jsonb".into(),
            ColumnKind::Uuid => "uuid".into(),
            ColumnKind::Timestamp { time_zone: false } => "timestamp".into(),
            ColumnKind::Timestamp { time_zone: true } => "timestamptz".into(),
            ColumnKind::Date => "date".into(),
            ColumnKind::Array(item) => format!("{}[]", item.to_sql()),
        }
    }

    fn to_code(&self, t: &str) -> String {
        let mut code = match &self.kind {
            ColumnKind::Number(kind) => format!("{t}.{}", kind.code()),
            ColumnKind::Text => format!("{t}.text()"),
            ColumnKind::Varchar(Some(limit)) => format!("{t}.varchar({limit})"),
            ColumnKind::Varchar(None) => format!("{t}.varchar()"),
            ColumnKind::Boolean => format!("{t}.boolean()"),
            ColumnKind::Json { binary: false } => format!("{t}.json()"),
            ColumnKind::Json { binary: true } => format!("{t}.jsonb()"),
            ColumnKind::Uuid => format!("{t}.uuid()"),
            ColumnKind::Timestamp { time_zone: false } => format!("{t}.timestamp()"),
            ColumnKind::Timestamp { time_zone: true } => format!("{t}.timestamptz()"),
            ColumnKind::Date => format!("{t}.date()"),
            ColumnKind::Array(item) => format!("{t}.array({})", item.to_code(t)),
        };

        let data = &self.data;
        if let Some(name) = &data.name {
            code.push_str(&format!(".named(\"{name}\")"));
        }
        if let Some(identity) = &data.identity {
            if identity.always {
                code.push_str(".identity(true)");
            } else {
                code.push_str(".identity(false)");
            }
        }
        if data.primary_key {
            code.push_str(".primary_key()");
        }
        if data.nullable {
            code.push_str(".nullable()");
        }
        match &data.default {
            Some(default) if !self.is_serial() => {
                code.push_str(&format!(".default_raw(\"{}\")", default.replace('"', "\\\"")));
            }
            _ => {}
        }

        code
    }

    fn encode(&self, value: Value) -> Value {
        match (&self.kind, value) {
            (_, Value::Null) => Value::Null,
            (ColumnKind::Json { .. }, Value::Json(json)) => Value::Json(json),
            (ColumnKind::Json { .. }, value) => {
                serde_json::to_value(&value).map_or(value, Value::Json)
            }
            (ColumnKind::Array(item), Value::Array(items)) => {
                Value::Array(items.into_iter().map(|v| item.encode(v)).collect())
            }
            (_, value) => value,
        }
    }

    fn parse_item(&self, text: &str) -> Value {
        let text_value = || Value::Text(text.to_string());

        match &self.kind {
            ColumnKind::Number(kind) => kind.parse_item(text),
            ColumnKind::Boolean => match text {
                "t" | "true" => Value::Bool(true),
                "f" | "false" => Value::Bool(false),
                _ => text_value(),
            },
            ColumnKind::Json { .. } => serde_json::from_str(text).map_or_else(|_| text_value(), Value::Json),
            ColumnKind::Uuid => Uuid::parse_str(text).map_or_else(|_| text_value(), Value::Uuid),
            ColumnKind::Date => text
                .parse::<NaiveDate>()
                .map_or_else(|_| text_value(), Value::Date),
            ColumnKind::Timestamp { time_zone: true } => DateTime::parse_from_rfc3339(text)
                .map_or_else(|_| text_value(), |ts| Value::Timestamp(ts.with_timezone(&Utc))),
            ColumnKind::Array(item) => item.parse_item(text),
            _ => text_value(),
        }
    }

    fn parse(&self, value: Value) -> Value {
        match (&self.kind, value) {
            (ColumnKind::Array(item), Value::Text(text)) => Value::Array(parse_array(&text, item)),
            (ColumnKind::Array(item), Value::Array(items)) => {
                Value::Array(items.into_iter().map(|v| item.parse(v)).collect())
            }
            (ColumnKind::Number(kind), Value::Text(text)) if !kind.is_textual() => {
                kind.parse_item(&text)
            }
            (ColumnKind::Json { .. } | ColumnKind::Boolean, Value::Text(text)) => {
                self.parse_item(&text)
            }
            (_, value) => value,
        }
    }
}
