use std::fs;
use std::path::{Path, PathBuf};

use foreman_model::RepoRef;
use tracing::info;

use crate::error::{ConfigError, Result};
use crate::models::Config;

/// Owns the on-disk `config.json` and its in-memory image.
///
/// Every mutation rewrites the whole document via write-then-rename so a
/// crash mid-save never leaves a torn file behind.
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    config: Config,
}

impl ConfigStore {
    /// Load from `path`, falling back to defaults when the file does not
    /// exist. A present-but-malformed file is a hard error.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let config = match fs::read_to_string(&path) {
            Ok(raw) => serde_json::from_str(&raw).map_err(|source| {
                ConfigError::Malformed {
                    path: path.clone(),
                    source,
                }
            })?,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                info!(path = %path.display(), "no config file, using defaults");
                Config::default()
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.clone(),
                    source,
                });
            }
        };
        config.validate()?;
        Ok(Self { path, config })
    }

    pub fn from_config(path: impl Into<PathBuf>, config: Config) -> Self {
        Self {
            path: path.into(),
            config,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist the current document atomically.
    pub fn save(&self) -> Result<()> {
        let json = serde_json::to_string_pretty(&self.config)
            .expect("config serialization is infallible");
        let tmp = self.path.with_extension("json.tmp");
        fs::write(&tmp, json).map_err(|source| ConfigError::Write {
            path: tmp.clone(),
            source,
        })?;
        fs::rename(&tmp, &self.path).map_err(|source| {
            ConfigError::Write {
                path: self.path.clone(),
                source,
            }
        })
    }

    /// Append a repo and persist. The caller has already validated the
    /// path on disk.
    pub fn add_repo(&mut self, repo: RepoRef) -> Result<()> {
        if self.config.has_repo(&repo.name) {
            return Err(ConfigError::Invalid(format!(
                "repo already configured: {}",
                repo.name
            )));
        }
        self.config.repos.push(repo);
        self.save()
    }

    /// Drop a repo and persist. Unknown names are a no-op save.
    pub fn remove_repo(&mut self, name: &str) -> Result<()> {
        self.config.repos.retain(|r| r.name != name);
        self.save()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn load_save_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");

        let mut store = ConfigStore::load(&path).unwrap();
        store
            .add_repo(RepoRef {
                name: "_pyrite".into(),
                path: "/tmp/_pyrite".into(),
            })
            .unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert!(reloaded.config().has_repo("_pyrite"));
        assert_eq!(reloaded.config().port, store.config().port);
    }

    #[test]
    fn malformed_file_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{not json").unwrap();
        assert!(matches!(
            ConfigStore::load(&path),
            Err(ConfigError::Malformed { .. })
        ));
    }

    #[test]
    fn duplicate_add_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::load(&path).unwrap();
        let repo = RepoRef {
            name: "a".into(),
            path: "/tmp/a".into(),
        };
        store.add_repo(repo.clone()).unwrap();
        assert!(store.add_repo(repo).is_err());
    }

    #[test]
    fn remove_persists_immediately() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.json");
        let mut store = ConfigStore::load(&path).unwrap();
        store
            .add_repo(RepoRef {
                name: "a".into(),
                path: "/tmp/a".into(),
            })
            .unwrap();
        store.remove_repo("a").unwrap();

        let reloaded = ConfigStore::load(&path).unwrap();
        assert!(reloaded.config().repos.is_empty());
    }
}
