// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Parsing of Postgres array literals such as `{1,2,NULL}` or `[0:1]={"a b","c\"d"}`.

use std::iter::Peekable;
use std::str::Chars;

use crate::value::Value;

use super::{ColumnCodec, ColumnKind, ColumnType};

/// Parse an array literal into values, decoding each element with `item`.
///
/// An unquoted `NULL` is null while a quoted `"NULL"` is the text `NULL`; `""` is the empty
/// string. Nested braces produce nested arrays, decoded with the item's own element codec when
/// `item` is itself an array.
pub fn parse_array(input: &str, item: &ColumnType) -> Vec<Value> {
    let mut chars = input.chars().peekable();

    // Explicit bounds decoration, e.g. `[1:3]={...}`
    if input.starts_with('[') {
        while let Some(c) = chars.next() {
            match c {
                '\\' => {
                    chars.next();
                }
                '=' => break,
                _ => {}
            }
        }
    }

    while chars.next_if(|c| c.is_whitespace()).is_some() {}

    match chars.next() {
        Some('{') => parse_elements(&mut chars, item),
        _ => vec![],
    }
}

fn nested_item(item: &ColumnType) -> &ColumnType {
    match &item.kind {
        ColumnKind::Array(inner) => inner,
        _ => item,
    }
}

/// Parse elements up to (and including) the closing brace.
fn parse_elements(chars: &mut Peekable<Chars<'_>>, item: &ColumnType) -> Vec<Value> {
    let mut entries = vec![];

    while let Some(&c) = chars.peek() {
        match c {
            '}' => {
                chars.next();
                break;
            }
            ',' => {
                chars.next();
            }
            '{' => {
                chars.next();
                entries.push(Value::Array(parse_elements(chars, nested_item(item))));
            }
            '"' => {
                chars.next();
                let text = read_quoted(chars);
                entries.push(item.parse_item(&text));
            }
            c if c.is_whitespace() => {
                chars.next();
            }
            _ => {
                let text = read_unquoted(chars);
                if text == "NULL" {
                    entries.push(Value::Null);
                } else {
                    entries.push(item.parse_item(&text));
                }
            }
        }
    }

    entries
}

fn read_quoted(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut text = String::new();

    while let Some(c) = chars.next() {
        match c {
            '\\' => {
                if let Some(escaped) = chars.next() {
                    text.push(escaped);
                }
            }
            '"' => break,
            _ => text.push(c),
        }
    }

    text
}

fn read_unquoted(chars: &mut Peekable<Chars<'_>>) -> String {
    let mut text = String::new();

    while let Some(&c) = chars.peek() {
        match c {
            ',' | '}' => break,
            '\\' => {
                chars.next();
                if let Some(escaped) = chars.next() {
                    text.push(escaped);
                }
            }
            _ => {
                chars.next();
                text.push(c);
            }
        }
    }

    text.trim_end().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(values: &[&str]) -> Vec<Value> {
        values.iter().map(|v| Value::from(*v)).collect()
    }

    #[test]
    fn flat_integers() {
        let item = ColumnType::integer();
        assert_eq!(
            parse_array("{1,2,3}", &item),
            vec![Value::Int(1), Value::Int(2), Value::Int(3)]
        );
        assert_eq!(parse_array("{}", &item), vec![]);
    }

    #[test]
    fn null_versus_quoted_text() {
        let item = ColumnType::text();
        assert_eq!(
            parse_array(r#"{NULL,"NULL","",a}"#, &item),
            vec![
                Value::Null,
                Value::from("NULL"),
                Value::from(""),
                Value::from("a")
            ]
        );
    }

    #[test]
    fn quotes_and_escapes() {
        let item = ColumnType::text();
        assert_eq!(
            parse_array(r#"{"a,b","c\"d","e\\f",g\,h}"#, &item),
            texts(&["a,b", "c\"d", "e\\f", "g,h"])
        );
        assert_eq!(
            parse_array(r#"{"{braces}","x}"}"#, &item),
            texts(&["{braces}", "x}"])
        );
    }

    #[test]
    fn nested_arrays_use_nested_item_codec() {
        let item = ColumnType::array(ColumnType::integer());
        assert_eq!(
            parse_array("{{1,2},{3,NULL}}", &item),
            vec![
                Value::Array(vec![Value::Int(1), Value::Int(2)]),
                Value::Array(vec![Value::Int(3), Value::Null]),
            ]
        );

        // A multi-dimensional literal for a one-dimensional column keeps the same item codec
        assert_eq!(
            parse_array("{{1},{2}}", &ColumnType::integer()),
            vec![Value::Array(vec![Value::Int(1)]), Value::Array(vec![Value::Int(2)])]
        );
    }

    #[test]
    fn skips_dimension_decoration() {
        assert_eq!(
            parse_array("[0:1]={5,6}", &ColumnType::integer()),
            vec![Value::Int(5), Value::Int(6)]
        );
    }
}
