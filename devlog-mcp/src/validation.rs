use anyhow::{anyhow, Result};
use serde_json::Value;

use crate::schema::{known_arguments, ASK_QUESTION};

/// Checks argument types before a tool runs. Every tool argument is a string;
/// `null` is treated as absent. Domain rules (formats, ranges, lookups) are
/// left to the query validator so callers see one consistent message.
pub fn validate_tool_params(tool_name: &str, params: &Value) -> Result<()> {
    let known = known_arguments(tool_name).ok_or_else(|| anyhow!("Unknown tool: {}", tool_name))?;

    let map = match params {
        Value::Object(map) => map,
        Value::Null => return check_required(tool_name, &serde_json::Map::new()),
        _ => return Err(anyhow!("Parameters must be an object")),
    };

    for name in &known {
        match map.get(name) {
            None | Some(Value::Null) | Some(Value::String(_)) => {}
            Some(other) => {
                return Err(anyhow!(
                    "{} must be a string, found: {}",
                    name,
                    other
                ))
            }
        }
    }

    for name in map.keys().filter(|k| !known.contains(*k)) {
        tracing::debug!("Ignoring unknown argument '{}' for tool {}", name, tool_name);
    }

    check_required(tool_name, map)
}

fn check_required(tool_name: &str, map: &serde_json::Map<String, Value>) -> Result<()> {
    if tool_name == ASK_QUESTION {
        let question = map.get("question").and_then(Value::as_str).unwrap_or_default();
        if question.trim().is_empty() {
            return Err(anyhow!("question is required"));
        }
    }
    Ok(())
}
