use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Default config file name looked up in the working directory.
pub const CONFIG_FILE: &str = "tensordb.toml";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub http_port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            http_port: 8080,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub default_dtype: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data"),
            default_dtype: crate::core::schema::DEFAULT_DTYPE.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// Engine configuration, loaded from `tensordb.toml` with environment
/// overrides (`TENSORDB_DATA_DIR`, `TENSORDB_HTTP_PORT`, `TENSORDB_LOG_LEVEL`).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl EngineConfig {
    /// Load from the default config file if present, else defaults.
    pub fn load() -> Self {
        match std::fs::read_to_string(CONFIG_FILE) {
            Ok(content) => match toml::from_str::<EngineConfig>(&content) {
                Ok(cfg) => cfg.with_env_overrides(),
                Err(e) => {
                    tracing::warn!(error = %e, "malformed {}, using defaults", CONFIG_FILE);
                    Self::default().with_env_overrides()
                }
            },
            Err(_) => Self::default().with_env_overrides(),
        }
    }

    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        let mut cfg = Self::default();
        cfg.storage.data_dir = data_dir.into();
        cfg
    }

    fn with_env_overrides(mut self) -> Self {
        if let Ok(dir) = std::env::var("TENSORDB_DATA_DIR") {
            self.storage.data_dir = PathBuf::from(dir);
        }
        if let Ok(port) = std::env::var("TENSORDB_HTTP_PORT") {
            if let Ok(port) = port.parse() {
                self.server.http_port = port;
            }
        }
        if let Ok(level) = std::env::var("TENSORDB_LOG_LEVEL") {
            self.logging.level = level;
        }
        self
    }

    /// Rendered default config, written by `tensordb init`.
    pub fn default_toml() -> String {
        let cfg = Self::default();
        // Default config always serializes.
        toml::to_string_pretty(&cfg).unwrap_or_default()
    }
}
