//! The `{isSuccess, status, dataBundle}` wrapper every upstream call returns,
//! plus the small JSON accessors the payload extractors share.

use serde::Serialize;
use serde_json::{Map, Value};

use crate::error::{ClientError, ClientResult};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub is_success: bool,
    pub status: Option<String>,
    pub data_bundle: Value,
}

impl Envelope {
    /// Builds an envelope from a decoded response body. A missing or
    /// non-boolean `isSuccess` is treated as failure.
    pub fn from_value(root: Value) -> Self {
        let is_success = root
            .get("isSuccess")
            .and_then(parse_bool_value)
            .unwrap_or(false);
        let status = value_as_string(root.get("status"));
        let data_bundle = match root {
            Value::Object(mut map) => map
                .remove("dataBundle")
                .filter(|value| !value.is_null())
                .unwrap_or_else(|| Value::Object(Map::new())),
            _ => Value::Object(Map::new()),
        };
        Self {
            is_success,
            status,
            data_bundle,
        }
    }

    pub fn from_json(raw: &str) -> ClientResult<Self> {
        let root: Value = serde_json::from_str(raw)
            .map_err(|err| ClientError::DataShape(format!("response is not JSON: {}", err)))?;
        Ok(Self::from_value(root))
    }

    /// Returns the data bundle, or a `DataShape` error naming `context` when
    /// the upstream reported failure.
    pub fn require_success(&self, context: &str) -> ClientResult<&Value> {
        if !self.is_success {
            return Err(ClientError::DataShape(format!(
                "{} response unsuccessful (status: {})",
                context,
                self.status.as_deref().unwrap_or("unknown")
            )));
        }
        Ok(&self.data_bundle)
    }
}

pub(crate) fn get_path_value<'a>(root: &'a Value, path: &[&str]) -> Option<&'a Value> {
    let mut current = root;
    for segment in path {
        current = current.get(*segment)?;
    }
    Some(current)
}

pub(crate) fn value_as_string(value: Option<&Value>) -> Option<String> {
    match value {
        Some(Value::String(raw)) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    }
}

pub(crate) fn value_as_f64(value: &Value) -> Option<f64> {
    let parsed = match value {
        Value::Number(number) => number.as_f64(),
        Value::String(raw) => raw.trim().parse::<f64>().ok(),
        _ => None,
    };
    parsed.filter(|value| value.is_finite())
}

fn parse_bool_value(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(flag) => Some(*flag),
        Value::String(raw) => match raw.trim().to_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}
