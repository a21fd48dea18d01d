// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use crate::error::QueryError;
use crate::query::{CopyData, CopyDirection, CopyFormat, CopyHeader, CopyOptions, CopyTarget, ForceQuote};

use super::select::push_table_name;
use super::{Scope, SqlBuilder};

fn push_columns(columns: &[String], scope: &Scope<'_>, builder: &mut SqlBuilder) -> Result<(), QueryError> {
    builder.push('(');
    builder.push_iter(columns.iter(), ", ", |builder, key| {
        builder.push_identifier(scope.table.column_name(key));
        Ok(())
    })?;
    builder.push(')');
    Ok(())
}

fn push_options(
    options: &CopyOptions,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    let mut parts = SqlBuilder::new();
    let mut first = true;
    let mut next = |parts: &mut SqlBuilder, name: &str| {
        if !first {
            parts.push_str(", ");
        }
        first = false;
        parts.push_str(name);
        parts.push_space();
    };

    if let Some(format) = options.format {
        next(&mut parts, "FORMAT");
        parts.push_str(match format {
            CopyFormat::Text => "text",
            CopyFormat::Csv => "csv",
            CopyFormat::Binary => "binary",
        });
    }
    if let Some(freeze) = options.freeze {
        next(&mut parts, "FREEZE");
        parts.push_str(freeze.to_string());
    }
    if let Some(delimiter) = &options.delimiter {
        next(&mut parts, "DELIMITER");
        parts.push_literal(delimiter);
    }
    if let Some(null) = &options.null {
        next(&mut parts, "NULL");
        parts.push_literal(null);
    }
    if let Some(header) = options.header {
        next(&mut parts, "HEADER");
        parts.push_str(match header {
            CopyHeader::Enabled(true) => "true",
            CopyHeader::Enabled(false) => "false",
            CopyHeader::Match => "match",
        });
    }
    if let Some(quote) = &options.quote {
        next(&mut parts, "QUOTE");
        parts.push_literal(quote);
    }
    if let Some(escape) = &options.escape {
        next(&mut parts, "ESCAPE");
        parts.push_literal(escape);
    }
    match &options.force_quote {
        Some(ForceQuote::All) => {
            next(&mut parts, "FORCE_QUOTE");
            parts.push('*');
        }
        Some(ForceQuote::Columns(columns)) => {
            next(&mut parts, "FORCE_QUOTE");
            push_columns(columns, scope, &mut parts)?;
        }
        None => {}
    }
    if !options.force_not_null.is_empty() {
        next(&mut parts, "FORCE_NOT_NULL");
        push_columns(&options.force_not_null, scope, &mut parts)?;
    }
    if !options.force_null.is_empty() {
        next(&mut parts, "FORCE_NULL");
        push_columns(&options.force_null, scope, &mut parts)?;
    }
    if let Some(encoding) = &options.encoding {
        next(&mut parts, "ENCODING");
        parts.push_literal(encoding);
    }

    let parts = parts.into_sql();
    if !parts.text.is_empty() {
        builder.push_str(" WITH (");
        builder.push_str(parts.text);
        builder.push(')');
    }
    Ok(())
}

pub(super) fn build_copy(
    data: &CopyData,
    scope: &Scope<'_>,
    builder: &mut SqlBuilder,
) -> Result<(), QueryError> {
    builder.push_str("COPY ");
    push_table_name(scope.table, builder);
    if !data.columns.is_empty() {
        push_columns(&data.columns, scope, builder)?;
    }

    builder.push_str(match data.direction {
        CopyDirection::From => " FROM ",
        CopyDirection::To => " TO ",
    });

    match (&data.target, data.direction) {
        (CopyTarget::Path(path), _) => builder.push_literal(path),
        (CopyTarget::Program(program), _) => {
            builder.push_str("PROGRAM ");
            builder.push_literal(program);
        }
        (CopyTarget::Stdin, CopyDirection::From) => builder.push_str("STDIN"),
        (CopyTarget::Stdout, CopyDirection::To) => builder.push_str("STDOUT"),
        (CopyTarget::Stdin, CopyDirection::To) | (CopyTarget::Stdout, CopyDirection::From) => {
            return Err(QueryError::Invalid(
                "COPY FROM reads STDIN and COPY TO writes STDOUT".into(),
            ));
        }
    }

    push_options(&data.options, scope, builder)
}
