//! Parameter dictionary: shared frozen tuples of extra command parameters.
//!
//! Many commands carry an identical set of extra parameters; the archive
//! stores each distinct tuple once and commands reference it by integer
//! `idx`. The on-disk form is the forward mapping (tuple, idx); the reverse
//! mapping (idx to tuple) is built at load time for O(1) row access.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use crate::CmdsError;

/// A tagged scalar parameter value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            ParamValue::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            ParamValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            ParamValue::Float(f) => Some(*f),
            ParamValue::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Uppercase string values in place (attribute comparisons are
    /// case-insensitive with values uppercased).
    pub fn uppercased(self) -> Self {
        match self {
            ParamValue::Str(s) => ParamValue::Str(s.to_uppercase()),
            other => other,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(i) => write!(f, "{i}"),
            ParamValue::Float(x) => write!(f, "{x}"),
            ParamValue::Str(s) => f.write_str(s),
        }
    }
}

impl From<i64> for ParamValue {
    fn from(v: i64) -> Self {
        ParamValue::Int(v)
    }
}

impl From<f64> for ParamValue {
    fn from(v: f64) -> Self {
        ParamValue::Float(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
    }
}

/// One frozen parameter tuple (name/value pairs in archive order).
pub type ParamTuple = Vec<(String, ParamValue)>;

/// The loaded parameter dictionary with both directions of the mapping.
#[derive(Debug, Default)]
pub struct ParsDict {
    entries: Vec<(ParamTuple, u32)>,
    reverse: HashMap<u32, usize>,
}

impl ParsDict {
    pub fn load(path: &Path) -> Result<Self, CmdsError> {
        let text = std::fs::read_to_string(path).map_err(|e| CmdsError::Io {
            path: path.to_path_buf(),
            source: e,
        })?;
        let entries: Vec<(ParamTuple, u32)> =
            serde_json::from_str(&text).map_err(|e| CmdsError::Json {
                path: path.to_path_buf(),
                source: e,
            })?;
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: Vec<(ParamTuple, u32)>) -> Self {
        let reverse = entries
            .iter()
            .enumerate()
            .map(|(pos, (_, idx))| (*idx, pos))
            .collect();
        Self { entries, reverse }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parameter tuple for a command `idx`, if present.
    pub fn params_for(&self, idx: u32) -> Option<&ParamTuple> {
        self.reverse.get(&idx).map(|&pos| &self.entries[pos].0)
    }

    /// Look up one named parameter for a command `idx` (names compared
    /// case-insensitively).
    pub fn param(&self, idx: u32, name: &str) -> Option<&ParamValue> {
        self.params_for(idx)?
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }

    /// All `idx` values whose tuple contains `name` equal to `val`. This is
    /// the fallback scan behind attribute filters on non-column keys.
    pub fn scan(&self, name: &str, val: &ParamValue) -> Vec<u32> {
        self.entries
            .iter()
            .filter(|(tuple, _)| {
                tuple
                    .iter()
                    .any(|(k, v)| k.eq_ignore_ascii_case(name) && v == val)
            })
            .map(|(_, idx)| *idx)
            .collect()
    }
}
