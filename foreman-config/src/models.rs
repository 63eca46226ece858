use std::path::{Path, PathBuf};

use foreman_model::RepoRef;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

pub const DEFAULT_PORT: u16 = 3847;
pub const DEFAULT_DEBOUNCE_MS: u64 = 300;
pub const DEFAULT_THROTTLE_MS: u64 = 2000;

fn default_port() -> u16 {
    DEFAULT_PORT
}

fn default_debounce_ms() -> u64 {
    DEFAULT_DEBOUNCE_MS
}

fn default_throttle_ms() -> u64 {
    DEFAULT_THROTTLE_MS
}

fn default_host() -> String {
    "0.0.0.0".to_owned()
}

fn default_browse_root() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("."))
}

/// The persisted `config.json` document.
///
/// Unknown fields are rejected so a typo'd key fails loudly at startup
/// instead of being silently ignored.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub repos: Vec<RepoRef>,
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,
    /// Minimum separation between successive refresh emissions per repo.
    #[serde(default = "default_throttle_ms")]
    pub throttle_ms: u64,
    /// Directory the browse endpoint is rooted at; requests outside it
    /// are rejected.
    #[serde(default = "default_browse_root")]
    pub browse_root: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            repos: Vec::new(),
            debounce_ms: default_debounce_ms(),
            throttle_ms: default_throttle_ms(),
            browse_root: default_browse_root(),
        }
    }
}

impl Config {
    /// Structural validation beyond what serde enforces.
    pub fn validate(&self) -> Result<()> {
        let mut seen = std::collections::HashSet::new();
        for repo in &self.repos {
            if repo.name.trim().is_empty() {
                return Err(ConfigError::Invalid(
                    "repo with empty name".to_owned(),
                ));
            }
            if !seen.insert(repo.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate repo name: {}",
                    repo.name
                )));
            }
        }
        if self.debounce_ms == 0 {
            return Err(ConfigError::Invalid(
                "debounceMs must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn repo(&self, name: &str) -> Option<&RepoRef> {
        self.repos.iter().find(|r| r.name == name)
    }

    pub fn has_repo(&self, name: &str) -> bool {
        self.repo(name).is_some()
    }

    pub fn browse_root(&self) -> &Path {
        &self.browse_root
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_missing_fields() {
        let config: Config =
            serde_json::from_str(r#"{"repos":[]}"#).unwrap();
        assert_eq!(config.port, DEFAULT_PORT);
        assert_eq!(config.debounce_ms, DEFAULT_DEBOUNCE_MS);
        assert_eq!(config.throttle_ms, DEFAULT_THROTTLE_MS);
    }

    #[test]
    fn rejects_unknown_fields() {
        let result = serde_json::from_str::<Config>(
            r#"{"port":3847,"debounce":300}"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn duplicate_repo_names_fail_validation() {
        let config: Config = serde_json::from_str(
            r#"{"repos":[
                {"name":"a","path":"/tmp/a"},
                {"name":"a","path":"/tmp/b"}
            ]}"#,
        )
        .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn wire_keys_are_camel_case() {
        let json = serde_json::to_value(Config::default()).unwrap();
        assert!(json.get("debounceMs").is_some());
        assert!(json.get("browseRoot").is_some());
    }
}
