// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use serde::{Deserialize, Serialize};

use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum NumberKind {
    SmallInt,
    Integer,
    BigInt,
    SmallSerial,
    Serial,
    BigSerial,
    Decimal {
        precision: Option<u32>,
        scale: Option<u32>,
    },
    Real,
    DoublePrecision,
}

impl NumberKind {
    pub fn to_sql(&self) -> String {
        match self {
            NumberKind::SmallInt => "smallint".into(),
            NumberKind::Integer => "integer".into(),
            NumberKind::BigInt => "bigint".into(),
            NumberKind::SmallSerial => "smallserial".into(),
            NumberKind::Serial => "serial".into(),
            NumberKind::BigSerial => "bigserial".into(),
            NumberKind::Decimal { precision, scale } => match (precision, scale) {
                (Some(precision), Some(scale)) => format!("decimal({precision}, {scale})"),
                (Some(precision), None) => format!("decimal({precision})"),
                _ => "decimal".into(),
            },
            NumberKind::Real => "real".into(),
            NumberKind::DoublePrecision => "double precision".into(),
        }
    }

    /// Builder call for generated table definitions, without the `t.` prefix.
    pub fn code(&self) -> String {
        match self {
            NumberKind::SmallInt => "smallint()".into(),
            NumberKind::Integer => "integer()".into(),
            NumberKind::BigInt => "bigint()".into(),
            NumberKind::SmallSerial => "smallserial()".into(),
            NumberKind::Serial => "serial()".into(),
            NumberKind::BigSerial => "bigserial()".into(),
            NumberKind::Decimal { precision, scale } => match (precision, scale) {
                (Some(precision), Some(scale)) => format!("decimal({precision}, {scale})"),
                (Some(precision), None) => format!("decimal({precision})"),
                _ => "decimal()".into(),
            },
            NumberKind::Real => "real()".into(),
            NumberKind::DoublePrecision => "double_precision()".into(),
        }
    }

    /// Serial columns carry an implicit sequence default.
    pub fn is_serial(&self) -> bool {
        matches!(
            self,
            NumberKind::SmallSerial | NumberKind::Serial | NumberKind::BigSerial
        )
    }

    /// Kinds whose values don't fit a float losslessly stay textual.
    pub fn is_textual(&self) -> bool {
        matches!(
            self,
            NumberKind::BigInt
                | NumberKind::BigSerial
                | NumberKind::Decimal { .. }
                | NumberKind::DoublePrecision
        )
    }

    pub fn parse_item(&self, text: &str) -> Value {
        if self.is_textual() {
            return Value::Text(text.to_string());
        }

        match self {
            NumberKind::Real => text
                .parse::<f64>()
                .map(Value::Float)
                .unwrap_or_else(|_| Value::Text(text.to_string())),
            _ => text
                .parse::<i64>()
                .map(Value::Int)
                .unwrap_or_else(|_| Value::Text(text.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decimal_sql() {
        let decimal = |precision, scale| NumberKind::Decimal { precision, scale };

        assert_eq!(decimal(None, None).to_sql(), "decimal");
        assert_eq!(decimal(Some(10), None).to_sql(), "decimal(10)");
        assert_eq!(decimal(Some(10), Some(2)).to_sql(), "decimal(10, 2)");
        assert_eq!(decimal(Some(10), Some(2)).code(), "decimal(10, 2)");
    }

    #[test]
    fn parse_items() {
        assert_eq!(NumberKind::Integer.parse_item("12"), Value::Int(12));
        assert_eq!(NumberKind::SmallInt.parse_item("-3"), Value::Int(-3));
        assert_eq!(NumberKind::Real.parse_item("1.5"), Value::Float(1.5));
        assert_eq!(
            NumberKind::BigInt.parse_item("9007199254740993"),
            Value::Text("9007199254740993".into())
        );
        assert_eq!(
            NumberKind::DoublePrecision.parse_item("1.5"),
            Value::Text("1.5".into())
        );
    }
}
