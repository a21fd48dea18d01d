// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

use std::fmt::Debug;
use std::time::Duration;

use tracing::{debug, error};

use crate::value::Value;

/// One executed (or failed) statement.
#[derive(Debug)]
pub struct LogEvent<'a> {
    pub text: &'a str,
    pub values: &'a [Value],
    pub elapsed: Duration,
    pub error: Option<&'a str>,
}

/// Sink for statements executed through a query.
///
/// Queries without a logger don't log anything themselves (the adapter still emits its own
/// `tracing` events).
pub trait QueryLogger: Send + Sync + Debug {
    fn log(&self, event: &LogEvent<'_>);
}

/// Forwards query events to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl QueryLogger for TracingLogger {
    fn log(&self, event: &LogEvent<'_>) {
        match event.error {
            None => debug!(
                target: "quill::query",
                elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
                values = ?event.values,
                "{}",
                event.text
            ),
            Some(error) => error!(
                target: "quill::query",
                elapsed_ms = event.elapsed.as_secs_f64() * 1000.0,
                values = ?event.values,
                error,
                "{}",
                event.text
            ),
        }
    }
}
