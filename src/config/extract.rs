//! Typed field extraction from raw configuration values
//!
//! Missing keys and explicit `null`s fall back to the caller's default.
//! Present keys of the wrong shape are reported with their full dotted path.

use crate::{Error, Result};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::time::Duration;

/// Read-only view over one configuration mapping
pub(crate) struct Fields<'a> {
    path: String,
    map: Option<&'a Map<String, Value>>,
}

impl<'a> Fields<'a> {
    /// Wrap `value`, which must be a mapping or `null`
    pub(crate) fn new(path: impl Into<String>, value: &'a Value) -> Result<Self> {
        let path = path.into();
        match value {
            Value::Null => Ok(Self { path, map: None }),
            Value::Object(map) => Ok(Self {
                path,
                map: Some(map),
            }),
            _ => Err(Error::InvalidValue {
                key: if path.is_empty() {
                    "<root>".to_string()
                } else {
                    path
                },
                expected: "a mapping",
            }),
        }
    }

    /// Full dotted path of `key` below this mapping
    pub(crate) fn key(&self, key: &str) -> String {
        if self.path.is_empty() {
            key.to_string()
        } else {
            format!("{}.{}", self.path, key)
        }
    }

    fn get(&self, key: &str) -> Option<&'a Value> {
        self.map
            .and_then(|map| map.get(key))
            .filter(|value| !value.is_null())
    }

    fn invalid(&self, key: &str, expected: &'static str) -> Error {
        Error::InvalidValue {
            key: self.key(key),
            expected,
        }
    }

    pub(crate) fn string(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .opt_string(key)?
            .unwrap_or_else(|| default.to_string()))
    }

    pub(crate) fn opt_string(&self, key: &str) -> Result<Option<String>> {
        match self.get(key) {
            None => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.clone())),
            Some(_) => Err(self.invalid(key, "a string")),
        }
    }

    /// TCP port; integers and numeric strings are accepted
    pub(crate) fn port(&self, key: &str, default: u16) -> Result<u16> {
        const EXPECTED: &str = "an integer between 1 and 65535";
        let port = match self.get(key) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        match port {
            Some(p) if (1..=u64::from(u16::MAX)).contains(&p) => Ok(p as u16),
            _ => Err(self.invalid(key, EXPECTED)),
        }
    }

    pub(crate) fn u16(&self, key: &str, default: u16) -> Result<u16> {
        const EXPECTED: &str = "an integer between 0 and 65535";
        let value = match self.get(key) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_u64(),
            Some(Value::String(s)) => s.trim().parse::<u64>().ok(),
            Some(_) => None,
        };
        value
            .and_then(|v| u16::try_from(v).ok())
            .ok_or_else(|| self.invalid(key, EXPECTED))
    }

    /// Booleans, plus the usual string spellings environment values arrive in
    pub(crate) fn bool(&self, key: &str, default: bool) -> Result<bool> {
        match self.get(key) {
            None => Ok(default),
            Some(Value::Bool(b)) => Ok(*b),
            Some(Value::Number(n)) if n.as_u64() == Some(0) => Ok(false),
            Some(Value::Number(n)) if n.as_u64() == Some(1) => Ok(true),
            Some(Value::String(s)) => match s.trim().to_ascii_lowercase().as_str() {
                "true" | "1" | "yes" | "on" => Ok(true),
                "false" | "0" | "no" | "off" => Ok(false),
                _ => Err(self.invalid(key, "a boolean")),
            },
            Some(_) => Err(self.invalid(key, "a boolean")),
        }
    }

    /// Non-negative number of seconds, fractional values allowed
    pub(crate) fn seconds(&self, key: &str, default: Duration) -> Result<Duration> {
        const EXPECTED: &str = "a non-negative number of seconds";
        let secs = match self.get(key) {
            None => return Ok(default),
            Some(Value::Number(n)) => n.as_f64(),
            Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
            Some(_) => None,
        };
        secs.and_then(|s| Duration::try_from_secs_f64(s).ok())
            .ok_or_else(|| self.invalid(key, EXPECTED))
    }

    /// Nested mapping below `key`; absent keys yield an empty view
    pub(crate) fn nested(&self, key: &str) -> Result<Fields<'a>> {
        match self.get(key) {
            None => Ok(Fields {
                path: self.key(key),
                map: None,
            }),
            Some(value) => Fields::new(self.key(key), value),
        }
    }

    /// Entries not named in `known`, kept verbatim
    pub(crate) fn rest(&self, known: &[&str]) -> BTreeMap<String, Value> {
        self.map
            .map(|map| {
                map.iter()
                    .filter(|(k, _)| !known.contains(&k.as_str()))
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}
