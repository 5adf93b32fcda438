use crate::{Result, Ti1Error};
use serde::Deserialize;
use std::fmt;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_CONFIG_PATH: &str = "config/conf.json";

/// Service configuration: JSON file first, then environment overrides.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub pool: PoolConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { port: 8080 }
    }
}

#[derive(Clone, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub host: String,
    pub port: String,
    pub user: String,
    pub password: String,
    pub dbname: String,
    pub sslmode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: "5432".to_string(),
            user: "postgres".to_string(),
            password: String::new(),
            dbname: "postgres".to_string(),
            sslmode: "disable".to_string(),
        }
    }
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let password = if self.password.is_empty() { "" } else { "***" };
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &password)
            .field("dbname", &self.dbname)
            .field("sslmode", &self.sslmode)
            .finish()
    }
}

/// Connection pool bounds.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub max_lifetime_secs: u64,
    pub idle_timeout_secs: u64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 50,
            max_lifetime_secs: 60 * 60,
            idle_timeout_secs: 5 * 60,
        }
    }
}

impl PoolConfig {
    pub fn max_lifetime(&self) -> Duration {
        Duration::from_secs(self.max_lifetime_secs)
    }

    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout_secs)
    }
}

impl Config {
    /// Load `path` (a missing file falls back to defaults) and apply the process
    /// environment on top.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        Self::load_with(path, |key| std::env::var(key).ok())
    }

    /// [`load`](Self::load) with environment lookups served by `lookup`.
    pub fn load_with<F>(path: impl AsRef<Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let path = path.as_ref();
        let mut config = match std::fs::read_to_string(path) {
            Ok(text) => Self::from_json(&text)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!(path = %path.display(), "config file not found, using defaults");
                Self::default()
            }
            Err(e) => {
                return Err(Ti1Error::Config(format!(
                    "failed to open config file {}: {e}",
                    path.display()
                )))
            }
        };
        config.apply_env(lookup)?;
        info!(config = ?config, "configuration loaded");
        Ok(config)
    }

    pub fn from_json(text: &str) -> Result<Self> {
        serde_json::from_str(text)
            .map_err(|e| Ti1Error::Config(format!("failed to parse config file: {e}")))
    }

    /// Override fields from `DB_*` and `PORT` variables. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.is_empty());

        let db = &mut self.database;
        for (key, field) in [
            ("DB_HOST", &mut db.host),
            ("DB_PORT", &mut db.port),
            ("DB_USER", &mut db.user),
            ("DB_PASSWORD", &mut db.password),
            ("DB_NAME", &mut db.dbname),
            ("DB_SSLMODE", &mut db.sslmode),
        ] {
            if let Some(value) = var(key) {
                *field = value;
            }
        }

        if let Some(port) = var("PORT") {
            self.server.port = port
                .parse()
                .map_err(|_| Ti1Error::Config(format!("invalid PORT: {port}")))?;
        }
        Ok(())
    }
}
