use std::path::{Path, PathBuf};
use std::time::Duration;

use relay_core::storage::StoreConfig;
use relay_core::workflow::RunnerConfig;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

fn default_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    8787
}

fn default_event_timeout_secs() -> u64 {
    300
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
            port: default_port(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunsConfig {
    /// How long an `input` or `confirm` waits for its answer.
    #[serde(default = "default_event_timeout_secs")]
    pub event_timeout_secs: u64,
}

impl Default for RunsConfig {
    fn default() -> Self {
        Self {
            event_timeout_secs: default_event_timeout_secs(),
        }
    }
}

impl RunsConfig {
    pub fn runner_config(&self) -> RunnerConfig {
        RunnerConfig {
            event_timeout: Duration::from_secs(self.event_timeout_secs),
        }
    }
}

/// Contents of `~/.relay/config.toml`. Missing sections take their defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelayConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub runs: RunsConfig,
}

impl RelayConfig {
    pub fn default_path() -> Result<PathBuf> {
        let home_dir = dirs::home_dir()
            .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
        Ok(home_dir.join(".relay").join("config.toml"))
    }

    /// Loads `path`, or the default location when `None`. A missing file
    /// yields the defaults; a malformed one is an error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!(path = %path.display(), "No configuration file, using defaults");
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(&path)?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> Result<Self> {
        Ok(toml::from_str(contents)?)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(path, contents)?;

        Ok(())
    }

    /// Applies CLI overrides on top of the file contents.
    pub fn with_overrides(
        mut self,
        bind: Option<String>,
        port: Option<u16>,
        run_db: Option<PathBuf>,
        ephemeral: bool,
    ) -> Self {
        if let Some(bind) = bind {
            self.server.bind = bind;
        }
        if let Some(port) = port {
            self.server.port = port;
        }
        if let Some(path) = run_db {
            self.store = StoreConfig::sqlite(path);
        }
        if ephemeral {
            self.store = StoreConfig::Memory;
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_defaults() {
        let config = RelayConfig::from_toml(
            r#"
            [server]
            port = 9000

            [store]
            type = "memory"
            "#,
        )
        .unwrap();

        assert_eq!(config.server.port, 9000);
        assert_eq!(config.server.bind, "127.0.0.1");
        assert_eq!(config.store, StoreConfig::Memory);
        assert_eq!(config.runs.event_timeout_secs, 300);
    }

    #[test]
    fn save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");

        let config = RelayConfig {
            store: StoreConfig::sqlite(dir.path().join("runs.db")),
            runs: RunsConfig {
                event_timeout_secs: 60,
            },
            ..Default::default()
        };
        config.save(&path).unwrap();

        assert_eq!(RelayConfig::load(Some(&path)).unwrap(), config);
    }

    #[test]
    fn missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = RelayConfig::load(Some(&dir.path().join("absent.toml"))).unwrap();
        assert_eq!(config.server, ServerConfig::default());
    }

    #[test]
    fn ephemeral_wins_over_run_db() {
        let config = RelayConfig::default().with_overrides(
            None,
            Some(1234),
            Some(PathBuf::from("/tmp/runs.db")),
            true,
        );
        assert_eq!(config.server.port, 1234);
        assert_eq!(config.store, StoreConfig::Memory);
    }

    #[test]
    fn runner_config_uses_timeout() {
        let runs = RunsConfig {
            event_timeout_secs: 10,
        };
        assert_eq!(runs.runner_config().event_timeout, Duration::from_secs(10));
    }
}
