//! Lenient serde adapters for trait options.
//!
//! Expression values are coerced before the trait they belong to is known, so
//! `container.request-cpu=1` arrives as an integer and a single `env.vars=A=1`
//! arrives as a scalar. These adapters accept every shape the grammar can
//! produce for a field. A list given where a scalar is expected resolves to
//! its last element (the last expression wins).

use std::collections::BTreeMap;

use serde::de::Error as _;
use serde::{Deserialize, Deserializer};
use serde_json::Value;

fn last(v: Value) -> Value {
    match v {
        Value::Array(mut items) => items.pop().unwrap_or(Value::Null),
        other => other,
    }
}

fn scalar_text(v: &Value) -> Option<String> {
    match v {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

pub fn opt_string<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    match Option::<Value>::deserialize(d)?.map(last) {
        None | Some(Value::Null) => Ok(None),
        Some(v) => scalar_text(&v).map(Some).ok_or_else(|| D::Error::custom("expected a scalar value")),
    }
}

pub fn opt_bool<'de, D: Deserializer<'de>>(d: D) -> Result<Option<bool>, D::Error> {
    match Option::<Value>::deserialize(d)?.map(last) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Bool(b)) => Ok(Some(b)),
        Some(Value::String(s)) => match s.to_ascii_lowercase().as_str() {
            "true" => Ok(Some(true)),
            "false" => Ok(Some(false)),
            _ => Err(D::Error::custom(format!("expected a boolean, got `{}`", s))),
        },
        Some(other) => Err(D::Error::custom(format!("expected a boolean, got `{}`", other))),
    }
}

pub fn opt_i64<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i64>, D::Error> {
    match Option::<Value>::deserialize(d)?.map(last) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n.as_i64().map(Some).ok_or_else(|| D::Error::custom(format!("expected an integer, got `{}`", n))),
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map(Some)
            .map_err(|_| D::Error::custom(format!("expected an integer, got `{}`", s))),
        Some(other) => Err(D::Error::custom(format!("expected an integer, got `{}`", other))),
    }
}

pub fn opt_i32<'de, D: Deserializer<'de>>(d: D) -> Result<Option<i32>, D::Error> {
    match opt_i64(d)? {
        None => Ok(None),
        Some(v) => i32::try_from(v).map(Some).map_err(|_| D::Error::custom(format!("value {} out of range", v))),
    }
}

/// A list, or a single scalar read as a one-element list.
pub fn string_list<'de, D: Deserializer<'de>>(d: D) -> Result<Vec<String>, D::Error> {
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|v| scalar_text(v).ok_or_else(|| D::Error::custom("expected a list of scalars")))
            .collect(),
        Some(v) => scalar_text(&v).map(|s| vec![s]).ok_or_else(|| D::Error::custom("expected a list of scalars")),
    }
}

/// A map, or `key=value` scalars (single or listed).
pub fn string_map<'de, D: Deserializer<'de>>(d: D) -> Result<BTreeMap<String, String>, D::Error> {
    fn pair<E: serde::de::Error>(out: &mut BTreeMap<String, String>, v: &Value) -> Result<(), E> {
        let text = scalar_text(v).ok_or_else(|| E::custom("expected key=value"))?;
        let (k, val) = text.split_once('=').ok_or_else(|| E::custom(format!("expected key=value, got `{}`", text)))?;
        out.insert(k.to_string(), val.to_string());
        Ok(())
    }
    let mut out = BTreeMap::new();
    match Option::<Value>::deserialize(d)? {
        None | Some(Value::Null) => {}
        Some(Value::Object(map)) => {
            for (k, v) in map {
                let text = scalar_text(&v).ok_or_else(|| D::Error::custom("expected scalar map values"))?;
                out.insert(k, text);
            }
        }
        Some(Value::Array(items)) => {
            for v in items.iter() {
                pair::<D::Error>(&mut out, v)?;
            }
        }
        Some(v) => pair::<D::Error>(&mut out, &v)?,
    }
    Ok(out)
}
