//! Configuration lookup
//!
//! The resolver reads configuration through [`ConfigSource`], a synchronous
//! lookup of dotted keys over a hierarchical namespace. [`JsonConfig`] keeps
//! the tree in memory; [`EnvOverlay`] lets environment variables override
//! individual values of another source.

use super::connection_leaf_keys;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::Arc;

/// Hierarchical key/value configuration lookup.
///
/// Keys are dotted paths (`rabbitmq.connections.orders`). A key that is not
/// present yields `Ok(None)`; `Err` is reserved for a backend that cannot
/// answer at all.
pub trait ConfigSource: Send + Sync {
    /// Look up the value or subtree at `key`
    fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Look up `key`, falling back to `default` when absent
    fn get_or(&self, key: &str, default: Value) -> Result<Value> {
        Ok(self.get(key)?.unwrap_or(default))
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for Arc<T> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key)
    }
}

impl<T: ConfigSource + ?Sized> ConfigSource for Box<T> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        (**self).get(key)
    }
}

/// In-memory configuration tree.
///
/// # Examples
///
/// ```
/// use amqp_resolver::config::{ConfigSource, JsonConfig};
/// use serde_json::json;
///
/// let config = JsonConfig::from_value(json!({
///     "rabbitmq": { "connections": { "orders": { "host": "broker.internal" } } }
/// }));
/// assert_eq!(
///     config.get("rabbitmq.connections.orders.host").unwrap(),
///     Some(json!("broker.internal"))
/// );
/// assert_eq!(config.get("rabbitmq.defaultConnection").unwrap(), None);
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JsonConfig {
    root: Value,
}

impl JsonConfig {
    /// Empty configuration
    pub fn new() -> Self {
        Self::from_value(Value::Object(Map::new()))
    }

    /// Wrap an existing JSON tree
    pub fn from_value(root: Value) -> Self {
        Self { root }
    }

    /// Parse a JSON document
    pub fn from_json_str(s: &str) -> Result<Self> {
        serde_json::from_str(s)
            .map(Self::from_value)
            .map_err(|e| Error::Config(format!("invalid configuration document: {}", e)))
    }

    /// Read and parse a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "failed to read configuration file '{}': {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json_str(&contents)
    }

    /// Set `key` to `value`, creating intermediate mappings as needed.
    ///
    /// Intermediate values that are not mappings are replaced.
    pub fn set(&mut self, key: &str, value: Value) {
        set_path(&mut self.root, key, value);
    }

    /// Builder-style [`set`](Self::set)
    pub fn with(mut self, key: &str, value: Value) -> Self {
        self.set(key, value);
        self
    }

    /// The whole tree
    pub fn as_value(&self) -> &Value {
        &self.root
    }
}

fn set_path(root: &mut Value, key: &str, value: Value) {
    let mut node = root;
    for segment in key.split('.') {
        if !node.is_object() {
            *node = Value::Object(Map::new());
        }
        node = &mut node[segment];
    }
    *node = value;
}

impl ConfigSource for JsonConfig {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        let mut node = &self.root;
        for segment in key.split('.') {
            match node.get(segment) {
                Some(next) => node = next,
                None => return Ok(None),
            }
        }
        Ok(Some(node.clone()))
    }
}

/// Environment-variable overlay over another source.
///
/// The variable for key `rabbitmq.connections.orders.host` under prefix
/// `APP` is `APP_RABBITMQ_CONNECTIONS_ORDERS_HOST`. A variable set for the
/// requested key replaces the inner value entirely. Otherwise the scalar
/// leaves of a mapping returned by the inner source are individually
/// overridable, and connection settings (`host`, `port`,
/// `ssl_options.cafile`, `options.heartbeat`, ...) are added below the key
/// even when the inner source lacks them. Variable contents that parse as a
/// JSON object or array are used as such, everything else is taken as a
/// string.
#[derive(Debug, Clone)]
pub struct EnvOverlay<S> {
    prefix: String,
    inner: S,
}

impl<S: ConfigSource> EnvOverlay<S> {
    /// Overlay `inner` with variables starting with `prefix`
    pub fn new(prefix: impl Into<String>, inner: S) -> Self {
        Self {
            prefix: prefix.into(),
            inner,
        }
    }

    /// Environment variable name consulted for `key`
    pub fn var_name(&self, key: &str) -> String {
        let key = key.replace(['.', '-'], "_").to_ascii_uppercase();
        if self.prefix.is_empty() {
            key
        } else {
            format!("{}_{}", self.prefix.to_ascii_uppercase(), key)
        }
    }

    fn lookup(&self, key: &str) -> Option<Value> {
        let raw = std::env::var(self.var_name(key)).ok()?;
        let trimmed = raw.trim_start();
        if trimmed.starts_with('{') || trimmed.starts_with('[') {
            if let Ok(value) = serde_json::from_str(&raw) {
                return Some(value);
            }
        }
        Some(Value::String(raw))
    }

    fn overlay(&self, key: &str, value: &mut Value) {
        if let Value::Object(map) = value {
            for (field, child) in map.iter_mut() {
                let child_key = format!("{}.{}", key, field);
                match self.lookup(&child_key) {
                    Some(replacement) => *child = replacement,
                    None => self.overlay(&child_key, child),
                }
            }
        }
    }
}

impl<S: ConfigSource> ConfigSource for EnvOverlay<S> {
    fn get(&self, key: &str) -> Result<Option<Value>> {
        if let Some(value) = self.lookup(key) {
            return Ok(Some(value));
        }
        let mut value = self.inner.get(key)?;
        if let Some(value) = value.as_mut() {
            self.overlay(key, value);
        }

        for leaf in connection_leaf_keys() {
            let Some(replacement) = self.lookup(&format!("{}.{}", key, leaf)) else {
                continue;
            };
            let node = value.get_or_insert_with(|| Value::Object(Map::new()));
            if node.is_null() {
                *node = Value::Object(Map::new());
            }
            // A scalar at `key` has no leaves
            if !node.is_object() {
                break;
            }
            set_path(node, &leaf, replacement);
        }
        Ok(value)
    }
}
