//! Engine settings.
//!
//! Settings live in a JSON file next to the rest of the persisted UI state.
//! Every field is optional on disk; missing fields take their defaults.
//! `LZGIT_*` environment variables (also read from a `.env` file) override
//! the file.

use serde::{Deserialize, Serialize};
use std::{fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("invalid config {path}: {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid value for {key}: {value}")]
    Env { key: &'static str, value: String },
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum LogOrder {
    #[default]
    TopoOrder,
    DateOrder,
    AuthorDateOrder,
}

impl LogOrder {
    pub fn as_flag(self) -> &'static str {
        match self {
            LogOrder::TopoOrder => "--topo-order",
            LogOrder::DateOrder => "--date-order",
            LogOrder::AuthorDateOrder => "--author-date-order",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Number of commits loaded while the history limit is active.
    pub commit_limit: usize,
    pub reflog_limit: usize,
    pub show_whole_graph: bool,
    pub log_order: LogOrder,
    pub stash_prefix: String,
    pub summary_cache_size: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            commit_limit: 300,
            reflog_limit: 1000,
            show_whole_graph: false,
            log_order: LogOrder::TopoOrder,
            stash_prefix: "Auto-stashing changes for ".to_string(),
            summary_cache_size: 256,
        }
    }
}

impl EngineConfig {
    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = match fs::read_to_string(path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.display().to_string(),
                    source,
                });
            }
        };

        serde_json::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    /// Load from `path` and apply environment overrides.
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        let mut config = Self::load(path)?;
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> std::io::Result<()> {
        let content = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("tmp");
        if let Err(e) = fs::write(&tmp, content).and_then(|_| fs::rename(&tmp, path)) {
            let _ = fs::remove_file(&tmp);
            return Err(e);
        }
        Ok(())
    }

    fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        fn parse<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::Env { key, value })
        }

        if let Some(v) = lookup("LZGIT_COMMIT_LIMIT") {
            self.commit_limit = parse("LZGIT_COMMIT_LIMIT", v)?;
        }
        if let Some(v) = lookup("LZGIT_REFLOG_LIMIT") {
            self.reflog_limit = parse("LZGIT_REFLOG_LIMIT", v)?;
        }
        if let Some(v) = lookup("LZGIT_SHOW_WHOLE_GRAPH") {
            self.show_whole_graph = parse("LZGIT_SHOW_WHOLE_GRAPH", v)?;
        }
        if let Some(v) = lookup("LZGIT_STASH_PREFIX") {
            self.stash_prefix = v;
        }
        Ok(())
    }
}
