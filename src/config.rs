use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_DB_PATH: &str = "HIERARCHY_DB_PATH";
pub const ENV_MAX_CONNECTIONS: &str = "HIERARCHY_MAX_CONNECTIONS";
pub const ENV_LOG: &str = "HIERARCHY_LOG";

pub const DEFAULT_LOG_FILTER: &str = "hierarchy=info,sqlx=warn";

/// Error type for loading configuration
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: &'static str, value: String },
}

/// Runtime configuration for the hierarchy hub
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    /// Path to SQLite database
    pub db_path: PathBuf,

    /// Upper bound on pooled SQLite connections
    pub max_connections: u32,

    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset
    pub log_filter: String,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            db_path: data_dir().join("hierarchy.db"),
            max_connections: 5,
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl HubConfig {
    /// Read a TOML file. Missing keys keep their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Defaults or `path`, then `HIERARCHY_*` environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.with_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides looked up through `lookup`
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(path) = lookup(ENV_DB_PATH) {
            self.db_path = PathBuf::from(path);
        }
        if let Some(raw) = lookup(ENV_MAX_CONNECTIONS) {
            self.max_connections = match raw.trim().parse::<u32>() {
                Ok(n) if n > 0 => n,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: ENV_MAX_CONNECTIONS,
                        value: raw,
                    })
                }
            };
        }
        if let Some(filter) = lookup(ENV_LOG) {
            self.log_filter = filter;
        }
        Ok(self)
    }
}

/// `.hierarchy/` in the working directory, or under the platform data
/// directory when the working directory is unavailable
pub fn data_dir() -> PathBuf {
    match std::env::current_dir() {
        Ok(cwd) => cwd.join(".hierarchy"),
        Err(_) => dirs::data_dir()
            .unwrap_or_else(std::env::temp_dir)
            .join("hierarchy"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use tempfile::tempdir;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn defaults_point_into_data_dir() {
        let config = HubConfig::default();
        assert!(config.db_path.ends_with("hierarchy.db"));
        assert_eq!(config.max_connections, 5);
        assert_eq!(config.log_filter, DEFAULT_LOG_FILTER);
    }

    #[test]
    fn file_keeps_defaults_for_missing_keys() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, "db_path = \"/tmp/places.db\"\n").unwrap();

        let config = HubConfig::from_file(&path).unwrap();
        assert_eq!(config.db_path, PathBuf::from("/tmp/places.db"));
        assert_eq!(config.max_connections, 5);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("hub.toml");
        std::fs::write(&path, "max_connections = \"lots\"\n").unwrap();

        let err = HubConfig::from_file(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_a_read_error() {
        let dir = tempdir().unwrap();
        let err = HubConfig::from_file(&dir.path().join("absent.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = HubConfig::default()
            .with_overrides(lookup(&[
                (ENV_DB_PATH, "/var/lib/hub.db"),
                (ENV_MAX_CONNECTIONS, "12"),
                (ENV_LOG, "hierarchy=debug"),
            ]))
            .unwrap();

        assert_eq!(config.db_path, PathBuf::from("/var/lib/hub.db"));
        assert_eq!(config.max_connections, 12);
        assert_eq!(config.log_filter, "hierarchy=debug");
    }

    #[test]
    fn zero_connections_rejected() {
        let err = HubConfig::default()
            .with_overrides(lookup(&[(ENV_MAX_CONNECTIONS, "0")]))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { key: ENV_MAX_CONNECTIONS, .. }
        ));
    }
}
