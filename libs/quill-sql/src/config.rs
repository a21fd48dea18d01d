// Copyright Exograph, Inc. All rights reserved.
//
// Use of this software is governed by the Business Source License
// included in the LICENSE file at the root of this repository.
//
// As of the Change Date specified in that file, in accordance with
// the Business Source License, use of this software will be governed
// by the Apache License, Version 2.0.

//! Configuration read from the process environment (or any other key-value source).

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::QueryError;

pub const QUILL_DATABASE_URL: &str = "QUILL_DATABASE_URL";
pub const QUILL_POOL_SIZE: &str = "QUILL_POOL_SIZE";
pub const QUILL_LOG: &str = "QUILL_LOG";
pub const QUILL_SCHEMA: &str = "QUILL_SCHEMA";

const DEFAULT_POOL_SIZE: usize = 10;

pub trait Environment: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;

    fn enabled(&self, key: &str, default_value: bool) -> Result<bool, EnvError> {
        match self.get(key) {
            Some(value) => match value.to_lowercase().as_str() {
                "true" | "1" | "yes" | "on" | "enabled" | "enable" => Ok(true),
                "false" | "0" | "no" | "off" | "disabled" | "disable" => Ok(false),
                _ => Err(EnvError::InvalidBoolean {
                    key: key.to_string(),
                    value,
                }),
            },
            None => Ok(default_value),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EnvError {
    #[error(
        "Invalid value for {key}: {value}. Expected true, 1, yes, on, enabled, enable OR false, 0, no, off, disabled, disable"
    )]
    InvalidBoolean { key: String, value: String },

    #[error("Invalid value for {key}: {value} ({message})")]
    InvalidNumber {
        key: String,
        value: String,
        message: String,
    },
}

pub struct SystemEnvironment;

impl Environment for SystemEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

#[derive(Clone, Default)]
pub struct MapEnvironment {
    values: HashMap<String, String>,
    fallback: Option<Arc<dyn Environment>>,
}

impl Environment for MapEnvironment {
    fn get(&self, key: &str) -> Option<String> {
        self.values
            .get(key)
            .cloned()
            .or_else(|| self.fallback.as_ref().and_then(|fb| fb.get(key)))
    }
}

impl<const N: usize> From<[(&str, &str); N]> for MapEnvironment {
    fn from(values: [(&str, &str); N]) -> Self {
        Self {
            values: values
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            fallback: None,
        }
    }
}

impl MapEnvironment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn new_with_fallback(fallback: Arc<dyn Environment>) -> Self {
        Self {
            values: HashMap::new(),
            fallback: Some(fallback),
        }
    }

    pub fn set(&mut self, key: &str, value: &str) {
        self.values.insert(key.to_string(), value.to_string());
    }
}

/// Settings shared by the adapter and the ORM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    /// Connection string. Only the Postgres adapter requires it.
    pub url: Option<String>,
    pub pool_size: usize,
    /// Attach a [`TracingLogger`](crate::TracingLogger) to every table query.
    pub log: bool,
    /// Schema applied to tables that don't declare one.
    pub schema: Option<String>,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: None,
            pool_size: DEFAULT_POOL_SIZE,
            log: false,
            schema: None,
        }
    }
}

impl DatabaseConfig {
    pub fn from_env(env: &dyn Environment) -> Result<Self, QueryError> {
        let pool_size = match env.get(QUILL_POOL_SIZE) {
            Some(value) => match value.parse::<usize>() {
                Ok(0) => {
                    return Err(QueryError::Config(format!(
                        "{QUILL_POOL_SIZE} must be greater than zero"
                    )));
                }
                Ok(size) => size,
                Err(e) => {
                    return Err(EnvError::InvalidNumber {
                        key: QUILL_POOL_SIZE.to_string(),
                        value,
                        message: e.to_string(),
                    }
                    .into());
                }
            },
            None => DEFAULT_POOL_SIZE,
        };

        Ok(Self {
            url: env.get(QUILL_DATABASE_URL),
            pool_size,
            log: env.enabled(QUILL_LOG, false)?,
            schema: env.get(QUILL_SCHEMA).filter(|schema| !schema.is_empty()),
        })
    }

    pub fn url(&self) -> Result<&str, QueryError> {
        self.url.as_deref().ok_or_else(|| {
            QueryError::Config(format!("Env {QUILL_DATABASE_URL} must be provided"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_env() {
        let config = DatabaseConfig::from_env(&MapEnvironment::new()).unwrap();
        assert_eq!(config, DatabaseConfig::default());
        assert!(matches!(config.url(), Err(QueryError::Config(_))));
    }

    #[test]
    fn reads_all_keys() {
        let env = MapEnvironment::from([
            (QUILL_DATABASE_URL, "postgres://localhost/app"),
            (QUILL_POOL_SIZE, "4"),
            (QUILL_LOG, "on"),
            (QUILL_SCHEMA, "geo"),
        ]);
        let config = DatabaseConfig::from_env(&env).unwrap();

        assert_eq!(config.url().unwrap(), "postgres://localhost/app");
        assert_eq!(config.pool_size, 4);
        assert!(config.log);
        assert_eq!(config.schema.as_deref(), Some("geo"));
    }

    #[test]
    fn rejects_bad_values() {
        let env = MapEnvironment::from([(QUILL_LOG, "maybe")]);
        assert!(matches!(
            DatabaseConfig::from_env(&env),
            Err(QueryError::Env(EnvError::InvalidBoolean { .. }))
        ));

        let env = MapEnvironment::from([(QUILL_POOL_SIZE, "many")]);
        assert!(matches!(
            DatabaseConfig::from_env(&env),
            Err(QueryError::Env(EnvError::InvalidNumber { .. }))
        ));

        let env = MapEnvironment::from([(QUILL_POOL_SIZE, "0")]);
        assert!(matches!(
            DatabaseConfig::from_env(&env),
            Err(QueryError::Config(_))
        ));
    }

    #[test]
    fn falls_back_to_parent_environment() {
        let parent = Arc::new(MapEnvironment::from([(QUILL_SCHEMA, "parent")]));
        let mut env = MapEnvironment::new_with_fallback(parent);
        assert_eq!(env.get(QUILL_SCHEMA).as_deref(), Some("parent"));

        env.set(QUILL_SCHEMA, "child");
        assert_eq!(env.get(QUILL_SCHEMA).as_deref(), Some("child"));
        assert_eq!(env.get("MISSING"), None);
    }
}
