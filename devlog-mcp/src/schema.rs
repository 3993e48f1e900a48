use serde_json::{json, Map, Value};

pub const QUERY_DEVICE_LOGS: &str = "query_device_logs_by_time";
pub const LIST_ENVIRONMENTS: &str = "list_environments";
pub const LIST_LOG_SOURCES: &str = "list_log_sources";
pub const ASK_QUESTION: &str = "ask_question";

fn object(value: Value) -> Map<String, Value> {
    match value {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// JSON schema for query_device_logs_by_time tool
pub fn query_device_logs_schema() -> Map<String, Value> {
    object(json!({
        "type": "object",
        "properties": {
            "environment": {
                "type": "string",
                "description": "Environment name, e.g. dev, test, staging, prod"
            },
            "log_type": {
                "type": "string",
                "description": "Log source name or alias, e.g. blackhole, oms"
            },
            "device_id": {
                "type": "string",
                "description": "Device ID to search for (letters, digits, '_' and '-', at most 50 characters)"
            },
            "keyword": {
                "type": "string",
                "description": "Optional case-insensitive keyword, at most 100 characters"
            },
            "lines": {
                "type": "string",
                "description": "How many of the most recent matching lines to keep, 1-99999 (default 2000)"
            },
            "start_time": {
                "type": "string",
                "description": "Window start, 'YYYY-MM-DD HH:MM:SS' or 'YYYY-MM-DD HH:MM:SS.mmm'"
            },
            "end_time": {
                "type": "string",
                "description": "Window end, same format as start_time; inclusive"
            },
            "model": {
                "type": "string",
                "description": "AI model used for the analysis (optional)"
            }
        },
        "required": ["environment", "log_type", "device_id"]
    }))
}

/// JSON schema for list_environments tool
pub fn list_environments_schema() -> Map<String, Value> {
    object(json!({
        "type": "object",
        "properties": {}
    }))
}

/// JSON schema for list_log_sources tool
pub fn list_log_sources_schema() -> Map<String, Value> {
    object(json!({
        "type": "object",
        "properties": {
            "environment": {
                "type": "string",
                "description": "Optional environment used to show the resolved file paths"
            }
        }
    }))
}

/// JSON schema for ask_question tool
pub fn ask_question_schema() -> Map<String, Value> {
    object(json!({
        "type": "object",
        "properties": {
            "question": { "type": "string" },
            "context": {
                "type": "string",
                "description": "Optional background information for the question"
            },
            "model": {
                "type": "string",
                "description": "AI model to use (optional)"
            }
        },
        "required": ["question"]
    }))
}

/// Every argument name a tool accepts.
pub fn known_arguments(tool_name: &str) -> Option<Vec<String>> {
    let schema = match tool_name {
        QUERY_DEVICE_LOGS => query_device_logs_schema(),
        LIST_ENVIRONMENTS => list_environments_schema(),
        LIST_LOG_SOURCES => list_log_sources_schema(),
        ASK_QUESTION => ask_question_schema(),
        _ => return None,
    };
    let names = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| props.keys().cloned().collect())
        .unwrap_or_default();
    Some(names)
}
