//! Canonical cache keys for query parameters

use serde::Serialize;
use std::collections::BTreeMap;

const PAIR_SEPARATOR: &str = "|";
/// 2^53, the largest range where every integer is an exact f64
const MAX_EXACT_INT: f64 = 9_007_199_254_740_992.0;

/// Scalar filter value
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ParamValue {
    Str(String),
    Int(i64),
    Float(f64),
    Bool(bool),
}

impl ParamValue {
    /// JSON rendering used inside keys
    fn to_json(&self) -> String {
        match self {
            ParamValue::Str(s) => serde_json::Value::String(s.clone()).to_string(),
            ParamValue::Int(i) => i.to_string(),
            // Whole floats render like integers, so 1.0 and 1 share a key
            ParamValue::Float(f) if f.fract() == 0.0 && f.abs() < MAX_EXACT_INT => {
                (*f as i64).to_string()
            }
            ParamValue::Float(f) => serde_json::Number::from_f64(*f)
                .map(|n| n.to_string())
                .unwrap_or_else(|| "null".to_string()),
            ParamValue::Bool(b) => b.to_string(),
        }
    }
}

impl From<String> for ParamValue {
    fn from(v: String) -> Self {
        ParamValue::Str(v)
    }
}

impl From<&str> for ParamValue {
    fn from(v: &str) -> Self {
        ParamValue::Str(v.to_string())
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

impl From<bool> for ParamValue {
    fn from(v: bool) -> Self {
        ParamValue::Bool(v)
    }
}

/// Filter parameters, kept sorted by name
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct QueryParams(BTreeMap<String, ParamValue>);

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: impl Into<ParamValue>) {
        self.0.insert(name.into(), value.into());
    }

    /// Insert only when set, so "unset" and "absent" share a key
    pub fn insert_opt<V: Into<ParamValue>>(&mut self, name: &str, value: Option<V>) {
        if let Some(value) = value {
            self.insert(name, value);
        }
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<ParamValue>) -> Self {
        self.insert(name, value);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl<K: Into<String>, V: Into<ParamValue>> FromIterator<(K, V)> for QueryParams {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut params = QueryParams::new();
        for (k, v) in iter {
            params.insert(k, v);
        }
        params
    }
}

/// `name:JSON(value)` pairs in lexicographic name order, joined by `|`
pub fn generate_key(params: &QueryParams) -> String {
    params
        .0
        .iter()
        .map(|(name, value)| format!("{}:{}", name, value.to_json()))
        .collect::<Vec<_>>()
        .join(PAIR_SEPARATOR)
}
