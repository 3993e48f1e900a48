use anyhow::{ensure, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::ai_provider::prompts::{PromptBuilder, DEFAULT_RESPONSE_LANGUAGE};
use crate::directory::{Directory, DirectoryError, EnvironmentRef, LogSourceRef, PathResolver};
use crate::validation::{QueryValidator, SingleBoundPolicy, DEFAULT_LINES, MAX_LINES_LIMIT};

pub const CONFIG_PATH_ENV: &str = "DEVLOG_CONFIG";
pub const BASE_URL_ENV: &str = "DEVLOG_AI_BASE_URL";
pub const MODEL_ENV: &str = "DEVLOG_AI_MODEL";

pub const DEFAULT_BASE_URL: &str = "http://localhost:11434";
pub const DEFAULT_MODEL: &str = "gemma3:27b";
pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_LOGS_ROOT: &str = "./logs";
pub const DEFAULT_PATH_TEMPLATE: &str = "{root}/{env}/{source}.log";
const DEFAULT_SSH_PORT: u16 = 22;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub ai: AiSettings,
    #[serde(default)]
    pub query: QuerySettings,
    #[serde(default)]
    pub logs: LogSettings,
    #[serde(default)]
    pub environments: BTreeMap<String, EnvironmentSettings>,
    #[serde(default)]
    pub log_sources: BTreeMap<String, LogSourceSettings>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AiSettings {
    pub base_url: Option<String>,
    pub default_model: Option<String>,
    pub timeout_secs: Option<u64>,
    pub response_language: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuerySettings {
    pub default_lines: Option<u32>,
    pub single_bound_window: Option<SingleBoundPolicy>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSettings {
    pub root: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentSettings {
    pub display_name: Option<String>,
    pub host: Option<String>,
    pub user: Option<String>,
    pub port: Option<u16>,
    pub credential_ref: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LogSourceSettings {
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub path_template: Option<String>,
}

fn environment(display_name: &str, host: &str, user: &str) -> EnvironmentSettings {
    EnvironmentSettings {
        display_name: Some(display_name.to_string()),
        host: Some(host.to_string()),
        user: Some(user.to_string()),
        port: Some(DEFAULT_SSH_PORT),
        credential_ref: None,
    }
}

fn log_source(description: &str, aliases: &[&str]) -> LogSourceSettings {
    LogSourceSettings {
        description: Some(description.to_string()),
        aliases: aliases.iter().map(|a| a.to_string()).collect(),
        path_template: Some(DEFAULT_PATH_TEMPLATE.to_string()),
    }
}

impl Default for Config {
    fn default() -> Self {
        let environments = BTreeMap::from([
            ("dev".to_string(), environment("Development", "localhost", "local")),
            ("test".to_string(), environment("Test", "test.example.com", "testuser")),
            ("staging".to_string(), environment("Staging", "staging.example.com", "staginguser")),
            ("prod".to_string(), environment("Production", "prod.example.com", "produser")),
        ]);
        let log_sources = BTreeMap::from([
            ("blackhole".to_string(), log_source("Blackhole service log", &["黑洞"])),
            ("oms".to_string(), log_source("OMS system log", &[])),
        ]);

        Self {
            ai: AiSettings {
                base_url: Some(DEFAULT_BASE_URL.to_string()),
                default_model: Some(DEFAULT_MODEL.to_string()),
                timeout_secs: Some(DEFAULT_TIMEOUT_SECS),
                response_language: Some(DEFAULT_RESPONSE_LANGUAGE.to_string()),
            },
            query: QuerySettings {
                default_lines: Some(DEFAULT_LINES),
                single_bound_window: Some(SingleBoundPolicy::Ignore),
            },
            logs: LogSettings {
                root: Some(PathBuf::from(DEFAULT_LOGS_ROOT)),
            },
            environments,
            log_sources,
        }
    }
}

impl Config {
    /// Loads the first config file found and applies environment overrides.
    /// Falls back to the built-in defaults when no file exists.
    pub fn load() -> Result<Self> {
        let mut config = match Self::get_config_path() {
            Some(path) => Self::load_from_path(&path)?,
            None => Config::default(),
        };
        config.apply_overrides(|key| env::var(key).ok());
        Ok(config)
    }

    pub fn load_from_path(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(content)?;
        config.merge_with_defaults(&Config::default());
        config.check_query_settings()?;
        Ok(config)
    }

    fn check_query_settings(&self) -> Result<()> {
        let lines = self.default_lines();
        ensure!(
            (1..=MAX_LINES_LIMIT).contains(&lines),
            "query.default_lines must be between 1 and {}, found {}",
            MAX_LINES_LIMIT,
            lines
        );
        Ok(())
    }

    fn get_config_path() -> Option<PathBuf> {
        // An explicit path is returned even when missing so that load fails loudly.
        if let Ok(explicit) = env::var(CONFIG_PATH_ENV) {
            if !explicit.trim().is_empty() {
                return Some(PathBuf::from(explicit));
            }
        }

        if let Ok(current_dir) = env::current_dir() {
            let project_config = current_dir.join(".devlog.toml");
            if project_config.exists() {
                return Some(project_config);
            }
        }

        if let Some(home_dir) = dirs::home_dir() {
            let user_config = home_dir.join(".config").join("devlog").join("config.toml");
            if user_config.exists() {
                return Some(user_config);
            }
        }

        None
    }

    fn merge_with_defaults(&mut self, defaults: &Config) {
        if self.ai.base_url.is_none() {
            self.ai.base_url = defaults.ai.base_url.clone();
        }
        if self.ai.default_model.is_none() {
            self.ai.default_model = defaults.ai.default_model.clone();
        }
        if self.ai.timeout_secs.is_none() {
            self.ai.timeout_secs = defaults.ai.timeout_secs;
        }
        if self.ai.response_language.is_none() {
            self.ai.response_language = defaults.ai.response_language.clone();
        }

        if self.query.default_lines.is_none() {
            self.query.default_lines = defaults.query.default_lines;
        }
        if self.query.single_bound_window.is_none() {
            self.query.single_bound_window = defaults.query.single_bound_window;
        }

        if self.logs.root.is_none() {
            self.logs.root = defaults.logs.root.clone();
        }

        if self.environments.is_empty() {
            self.environments = defaults.environments.clone();
        }
        if self.log_sources.is_empty() {
            self.log_sources = defaults.log_sources.clone();
        }
    }

    /// Applies `DEVLOG_AI_BASE_URL` / `DEVLOG_AI_MODEL` style overrides.
    pub fn apply_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(BASE_URL_ENV).filter(|v| !v.trim().is_empty()) {
            self.ai.base_url = Some(url);
        }
        if let Some(model) = lookup(MODEL_ENV).filter(|v| !v.trim().is_empty()) {
            self.ai.default_model = Some(model);
        }
    }

    pub fn base_url(&self) -> &str {
        self.ai.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL)
    }

    pub fn default_model(&self) -> &str {
        self.ai.default_model.as_deref().unwrap_or(DEFAULT_MODEL)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.ai.timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS).max(1))
    }

    pub fn response_language(&self) -> &str {
        self.ai
            .response_language
            .as_deref()
            .unwrap_or(DEFAULT_RESPONSE_LANGUAGE)
    }

    pub fn default_lines(&self) -> u32 {
        self.query.default_lines.unwrap_or(DEFAULT_LINES)
    }

    pub fn single_bound_policy(&self) -> SingleBoundPolicy {
        self.query.single_bound_window.unwrap_or_default()
    }

    pub fn logs_root(&self) -> PathBuf {
        self.logs
            .root
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_LOGS_ROOT))
    }

    /// Builds the immutable directory used for every query.
    pub fn directory(&self) -> Result<Directory, DirectoryError> {
        let environments = self.environments.iter().map(|(name, settings)| EnvironmentRef {
            name: name.clone(),
            display_name: settings.display_name.clone().unwrap_or_else(|| name.clone()),
            host: settings.host.clone().unwrap_or_else(|| "localhost".to_string()),
            user: settings.user.clone().unwrap_or_default(),
            port: settings.port.unwrap_or(DEFAULT_SSH_PORT),
            credential_ref: settings.credential_ref.clone(),
        });

        let sources = self.log_sources.iter().map(|(name, settings)| LogSourceRef {
            name: name.clone(),
            description: settings.description.clone().unwrap_or_default(),
            aliases: settings.aliases.clone(),
            path_template: settings
                .path_template
                .clone()
                .unwrap_or_else(|| DEFAULT_PATH_TEMPLATE.to_string()),
        });

        Directory::new(environments, sources, PathResolver::new(self.logs_root()))
    }

    pub fn validator(&self) -> QueryValidator {
        QueryValidator::new(
            self.default_lines(),
            self.default_model(),
            self.single_bound_policy(),
        )
    }

    pub fn prompt_builder(&self) -> PromptBuilder {
        PromptBuilder::new(self.response_language())
    }
}
