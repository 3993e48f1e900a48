use serde::Serialize;
use std::collections::BTreeMap;
use std::path::PathBuf;
use thiserror::Error;

use crate::error::SourceResolutionError;

const ROOT_PLACEHOLDER: &str = "{root}";
const ENV_PLACEHOLDER: &str = "{env}";
const SOURCE_PLACEHOLDER: &str = "{source}";

/// A named deployment target. The connection fields are carried as data only;
/// nothing in this crate connects to the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnvironmentRef {
    pub name: String,
    pub display_name: String,
    pub host: String,
    pub user: String,
    pub port: u16,
    #[serde(skip_serializing)]
    pub credential_ref: Option<String>,
}

/// A named category of log file, addressable by name or alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogSourceRef {
    pub name: String,
    pub description: String,
    pub aliases: Vec<String>,
    pub path_template: String,
}

impl LogSourceRef {
    pub fn answers_to(&self, name: &str) -> bool {
        self.name == name || self.aliases.iter().any(|alias| alias == name)
    }
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum DirectoryError {
    #[error("path template for log source '{source_name}' must contain {{env}}: {template}")]
    TemplateMissingEnvironment { source_name: String, template: String },
    #[error("alias '{alias}' is claimed by both '{first}' and '{second}'")]
    DuplicateAlias {
        alias: String,
        first: String,
        second: String,
    },
}

/// Turns `(log source, environment)` into a concrete file path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathResolver {
    root: PathBuf,
}

impl PathResolver {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &PathBuf {
        &self.root
    }

    pub fn path_for(&self, source: &LogSourceRef, environment: &EnvironmentRef) -> PathBuf {
        let root = self.root.to_string_lossy();
        let rendered = source
            .path_template
            .replace(ROOT_PLACEHOLDER, &root)
            .replace(ENV_PLACEHOLDER, &environment.name)
            .replace(SOURCE_PLACEHOLDER, &source.name);
        PathBuf::from(rendered)
    }
}

/// Everything the validator needs to know about one query target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedSource {
    pub environment: EnvironmentRef,
    pub source: LogSourceRef,
    pub path: PathBuf,
}

/// Immutable table of environments and log sources, built once at startup and
/// shared by reference.
#[derive(Debug, Clone)]
pub struct Directory {
    environments: BTreeMap<String, EnvironmentRef>,
    sources: BTreeMap<String, LogSourceRef>,
    resolver: PathResolver,
}

impl Directory {
    pub fn new(
        environments: impl IntoIterator<Item = EnvironmentRef>,
        sources: impl IntoIterator<Item = LogSourceRef>,
        resolver: PathResolver,
    ) -> Result<Self, DirectoryError> {
        let environments: BTreeMap<_, _> = environments
            .into_iter()
            .map(|env| (env.name.clone(), env))
            .collect();

        let mut by_name: BTreeMap<String, LogSourceRef> = BTreeMap::new();
        for source in sources {
            if !source.path_template.contains(ENV_PLACEHOLDER) {
                return Err(DirectoryError::TemplateMissingEnvironment {
                    source_name: source.name,
                    template: source.path_template,
                });
            }
            by_name.insert(source.name.clone(), source);
        }

        let mut claimed: BTreeMap<&str, &str> = BTreeMap::new();
        for source in by_name.values() {
            for alias in &source.aliases {
                if let Some(first) = claimed.insert(alias.as_str(), source.name.as_str()) {
                    return Err(DirectoryError::DuplicateAlias {
                        alias: alias.clone(),
                        first: first.to_string(),
                        second: source.name.clone(),
                    });
                }
            }
        }

        Ok(Self {
            environments,
            sources: by_name,
            resolver,
        })
    }

    pub fn environments(&self) -> impl Iterator<Item = &EnvironmentRef> {
        self.environments.values()
    }

    pub fn log_sources(&self) -> impl Iterator<Item = &LogSourceRef> {
        self.sources.values()
    }

    pub fn resolver(&self) -> &PathResolver {
        &self.resolver
    }

    pub fn environment(&self, name: &str) -> Result<&EnvironmentRef, SourceResolutionError> {
        self.environments
            .get(name)
            .ok_or_else(|| SourceResolutionError::UnknownEnvironment(name.to_string()))
    }

    /// Exact name wins over an alias.
    pub fn log_source(&self, name_or_alias: &str) -> Option<&LogSourceRef> {
        self.sources
            .get(name_or_alias)
            .or_else(|| self.sources.values().find(|s| s.answers_to(name_or_alias)))
    }

    /// Pure lookup; never touches the file system.
    pub fn resolve(
        &self,
        log_source: &str,
        environment: &str,
    ) -> Result<ResolvedSource, SourceResolutionError> {
        let environment = self.environment(environment)?;
        let source = self.log_source(log_source).ok_or_else(|| {
            SourceResolutionError::UnknownLogSource {
                name: log_source.to_string(),
                environment: environment.name.clone(),
            }
        })?;

        Ok(ResolvedSource {
            path: self.resolver.path_for(source, environment),
            environment: environment.clone(),
            source: source.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn env(name: &str) -> EnvironmentRef {
        EnvironmentRef {
            name: name.to_string(),
            display_name: format!("{} environment", name),
            host: "localhost".to_string(),
            user: "ops".to_string(),
            port: 22,
            credential_ref: None,
        }
    }

    fn source(name: &str, aliases: &[&str]) -> LogSourceRef {
        LogSourceRef {
            name: name.to_string(),
            description: format!("{} log", name),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            path_template: "{root}/{env}/{source}.log".to_string(),
        }
    }

    fn directory() -> Directory {
        Directory::new(
            vec![env("dev"), env("prod")],
            vec![source("blackhole", &["黑洞", "bh"]), source("oms", &[])],
            PathResolver::new("/var/log/devices"),
        )
        .unwrap()
    }

    #[test]
    fn test_resolve_by_name() {
        let resolved = directory().resolve("oms", "prod").unwrap();
        assert_eq!(resolved.path, PathBuf::from("/var/log/devices/prod/oms.log"));
        assert_eq!(resolved.source.name, "oms");
        assert_eq!(resolved.environment.name, "prod");
    }

    #[test]
    fn test_resolve_by_alias_uses_canonical_name_in_path() {
        let resolved = directory().resolve("黑洞", "dev").unwrap();
        assert_eq!(resolved.source.name, "blackhole");
        assert_eq!(
            resolved.path,
            PathBuf::from("/var/log/devices/dev/blackhole.log")
        );
    }

    #[test]
    fn test_unknown_environment_checked_first() {
        let err = directory().resolve("nope", "qa").unwrap_err();
        assert_eq!(err, SourceResolutionError::UnknownEnvironment("qa".into()));
    }

    #[test]
    fn test_unknown_log_source() {
        let err = directory().resolve("nginx", "dev").unwrap_err();
        assert_eq!(
            err,
            SourceResolutionError::UnknownLogSource {
                name: "nginx".into(),
                environment: "dev".into()
            }
        );
    }

    #[test]
    fn test_template_without_env_rejected() {
        let mut bad = source("oms", &[]);
        bad.path_template = "/var/log/oms.log".to_string();
        let err = Directory::new(vec![env("dev")], vec![bad], PathResolver::new("/")).unwrap_err();
        assert!(matches!(err, DirectoryError::TemplateMissingEnvironment { .. }));
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let err = Directory::new(
            vec![env("dev")],
            vec![source("a", &["shared"]), source("b", &["shared"])],
            PathResolver::new("/"),
        )
        .unwrap_err();
        assert!(matches!(err, DirectoryError::DuplicateAlias { .. }));
    }
}
