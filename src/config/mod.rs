/// Configuration management for the socialway back end
///
/// Handles server binding, the SQLite database location, and the push
/// delivery parameters of the presence dispatcher.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    pub server: ServerConfig,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Real-time push configuration
    pub dispatch: DispatchConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Server bind address (e.g., "0.0.0.0")
    pub host: String,
    /// Server port number
    pub port: u16,
}

/// SQLite storage location
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Directory holding the database file (default: "data")
    pub data_dir: String,
    /// Database file name inside `data_dir` (default: "socialway.db")
    pub file_name: String,
}

/// Push delivery tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DispatchConfig {
    /// Upper bound on waiting for a slow connection to accept one push
    pub push_timeout_ms: u64,
    /// Outbound queue depth per live connection
    pub connection_buffer: usize,
}

impl DatabaseConfig {
    pub fn path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(&self.file_name)
    }
}

impl DispatchConfig {
    pub fn push_timeout(&self) -> Duration {
        Duration::from_millis(self.push_timeout_ms)
    }
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            push_timeout_ms: env_or("SOCIALWAY_PUSH_TIMEOUT_MS", 500),
            connection_buffer: env_or("SOCIALWAY_CONNECTION_BUFFER", 64),
        }
    }
}

impl Default for Config {
    /// Default configuration with ENV_VAR support for container deployment
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: std::env::var("SOCIALWAY_HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
                port: env_or("SOCIALWAY_PORT", 3004),
            },
            database: DatabaseConfig {
                data_dir: std::env::var("SOCIALWAY_DATA_DIR")
                    .unwrap_or_else(|_| "data".to_string()),
                file_name: std::env::var("SOCIALWAY_DB_FILE")
                    .unwrap_or_else(|_| "socialway.db".to_string()),
            },
            dispatch: DispatchConfig::default(),
        }
    }
}

/// Parse an environment variable, falling back on absence or bad input
fn env_or<T: std::str::FromStr>(key: &str, fallback: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_path_joins_dir_and_file() {
        let db = DatabaseConfig {
            data_dir: "data".to_string(),
            file_name: "social.db".to_string(),
        };
        assert_eq!(db.path(), PathBuf::from("data").join("social.db"));
    }

    #[test]
    fn env_or_falls_back_on_garbage() {
        std::env::set_var("SOCIALWAY_TEST_GARBAGE_PORT", "not-a-number");
        assert_eq!(env_or("SOCIALWAY_TEST_GARBAGE_PORT", 3004u16), 3004);
    }
}
