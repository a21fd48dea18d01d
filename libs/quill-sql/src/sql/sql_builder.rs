// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::value::Value;

use super::{ExpressionBuilder, RawSql, Scope, Sql};
use crate::error::QueryError;

pub struct SqlBuilder {
    /// The SQL being built with placeholders for each parameter
    sql: String,
    /// Bound values, in placeholder order
    values: Vec<Value>,
}

impl Default for SqlBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl SqlBuilder {
    pub fn new() -> Self {
        Self {
            sql: String::new(),
            values: Vec::new(),
        }
    }

    /// Push a string
    pub fn push_str<T: AsRef<str>>(&mut self, s: T) {
        self.sql.push_str(s.as_ref());
    }

    /// Push a character
    pub fn push(&mut self, c: char) {
        self.sql.push(c);
    }

    /// Push a string surrounded by double quotes. Embedded quotes are doubled.
    pub fn push_identifier<T: AsRef<str>>(&mut self, s: T) {
        self.sql.push('"');
        self.sql.push_str(&s.as_ref().replace('"', "\"\""));
        self.sql.push('"');
    }

    /// Push `"table"."column"`
    pub fn push_column<T: AsRef<str>, U: AsRef<str>>(&mut self, table: T, column: U) {
        self.push_identifier(table);
        self.push('.');
        self.push_identifier(column);
    }

    /// Push a single-quoted string literal (for the few places where Postgres doesn't accept a
    /// placeholder, such as COPY options).
    pub fn push_literal<T: AsRef<str>>(&mut self, s: T) {
        self.sql.push('\'');
        self.sql.push_str(&s.as_ref().replace('\'', "''"));
        self.sql.push('\'');
    }

    /// Push a space. This is a common operation, so it is provided as a separate method.
    pub fn push_space(&mut self) {
        self.sql.push(' ');
    }

    /// Push a value, which will be replaced with a placeholder in the SQL string.
    pub fn push_param(&mut self, value: Value) {
        self.values.push(value);
        self.push('$');
        self.push_str(self.values.len().to_string());
    }

    /// Push a raw fragment, renumbering its own `$1..$n` placeholders to follow the values
    /// bound so far. Quoted strings, quoted identifiers and dollar-quoted bodies are copied as
    /// they are.
    pub fn push_raw(&mut self, raw: &RawSql) {
        let offset = self.values.len();
        let text = raw.sql.as_str();
        let mut i = 0;

        while let Some(c) = text[i..].chars().next() {
            let rest = &text[i..];
            if let Some(len) = quoted_len(rest) {
                self.push_str(&rest[..len]);
                i += len;
            } else if let Some((index, len)) = placeholder(rest) {
                self.push('$');
                self.push_str((index + offset).to_string());
                i += len;
            } else {
                self.push(c);
                i += c.len_utf8();
            }
        }

        self.values.extend(raw.values.iter().cloned());
    }

    /// Push elements of an iterator, separated by `sep`.
    pub fn push_iter<T>(
        &mut self,
        iter: impl IntoIterator<Item = T>,
        sep: &str,
        mut push_elem: impl FnMut(&mut Self, T) -> Result<(), QueryError>,
    ) -> Result<(), QueryError> {
        for (i, item) in iter.into_iter().enumerate() {
            if i > 0 {
                self.sql.push_str(sep);
            }
            push_elem(self, item)?;
        }
        Ok(())
    }

    /// Push elements that implement [`ExpressionBuilder`], separated by `sep`.
    pub fn push_elems<T: ExpressionBuilder>(
        &mut self,
        scope: &Scope<'_>,
        elems: &[T],
        sep: &str,
    ) -> Result<(), QueryError> {
        self.push_iter(elems.iter(), sep, |builder, elem| elem.build(scope, builder))
    }

    /// Get the SQL string and the bound values. Calling this method should be the final step
    /// in building an SQL expression, and thus this builder consumes the `self`.
    pub fn into_sql(self) -> Sql {
        Sql {
            text: self.sql,
            values: self.values,
        }
    }
}

/// Length of the quoted string (`'...'`), identifier (`"..."`) or dollar-quoted body
/// (`$$...$$`, `$tag$...$tag$`) at the start of `sql`. An unterminated one runs to the end.
fn quoted_len(sql: &str) -> Option<usize> {
    match sql.chars().next()? {
        quote @ ('\'' | '"') => Some(sql[1..].find(quote).map_or(sql.len(), |end| end + 2)),
        '$' => {
            let tag_len = sql[1..].find('$')? + 2;
            let tag = &sql[..tag_len];
            let name = &tag[1..tag_len - 1];
            let valid = !name.starts_with(|c: char| c.is_ascii_digit())
                && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_');
            if !valid {
                return None;
            }
            let body = &sql[tag_len..];
            Some(body.find(tag).map_or(sql.len(), |end| tag_len + end + tag_len))
        }
        _ => None,
    }
}

/// The `$n` placeholder (n from 1) at the start of `sql`, with its length.
fn placeholder(sql: &str) -> Option<(usize, usize)> {
    let digits = sql.strip_prefix('$')?;
    let len = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    let index = digits[..len].parse::<usize>().ok().filter(|index| *index > 0)?;
    Some((index, len + 1))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renumbers_raw_placeholders() {
        let mut builder = SqlBuilder::new();
        builder.push_param(Value::from(1));
        builder.push_str(" AND ");
        builder.push_raw(&RawSql::new("a = $1 OR b = $2 OR c = '$1'").values(vec![
            Value::from("x"),
            Value::from("y"),
        ]));

        let sql = builder.into_sql();
        assert_eq!(sql.text, "$1 AND a = $2 OR b = $3 OR c = '$1'");
        assert_eq!(
            sql.values,
            vec![Value::from(1), Value::from("x"), Value::from("y")]
        );
    }

    #[test]
    fn keeps_dollar_quoted_bodies() {
        let mut builder = SqlBuilder::new();
        builder.push_param(Value::from(1));
        builder.push_space();
        builder.push_raw(
            &RawSql::new("f($$ $1 $$, $fn$ it's $2 $fn$, $1, $0, \"$1\")").values(vec![Value::from(2)]),
        );

        let sql = builder.into_sql();
        assert_eq!(sql.text, "$1 f($$ $1 $$, $fn$ it's $2 $fn$, $2, $0, \"$1\")");
        assert_eq!(sql.values, vec![Value::from(1), Value::from(2)]);
    }

    #[test]
    fn escapes_identifiers_and_literals() {
        let mut builder = SqlBuilder::new();
        builder.push_identifier(r#"we"ird"#);
        builder.push_space();
        builder.push_literal("it's");
        assert_eq!(builder.into_sql().text, r#""we""ird" 'it''s'"#);
    }
}
