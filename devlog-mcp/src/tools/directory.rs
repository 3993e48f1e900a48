use anyhow::Result;
use devlog_core::LogQueryService;
use serde::Serialize;
use serde_json::Value;
use std::path::PathBuf;

#[derive(Debug, Serialize)]
struct LogSourceEntry<'a> {
    name: &'a str,
    description: &'a str,
    aliases: &'a [String],
    path_template: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<PathBuf>,
}

/// List configured environments. Credential references are never included.
pub async fn list_environments(service: &LogQueryService) -> Result<Value> {
    let environments: Vec<_> = service.directory().environments().collect();
    Ok(serde_json::to_value(environments)?)
}

/// List log sources, with resolved paths when an environment is given.
pub async fn list_log_sources(service: &LogQueryService, params: Value) -> Result<Value> {
    let directory = service.directory();
    let environment = match params.get("environment").and_then(Value::as_str) {
        Some(name) if !name.is_empty() => Some(directory.environment(name)?),
        _ => None,
    };

    let entries: Vec<LogSourceEntry> = directory
        .log_sources()
        .map(|source| LogSourceEntry {
            name: &source.name,
            description: &source.description,
            aliases: &source.aliases,
            path_template: &source.path_template,
            path: environment.map(|env| directory.resolver().path_for(source, env)),
        })
        .collect();

    Ok(serde_json::to_value(entries)?)
}
