//! Configuration for Fathom.
//!
//! Values are layered, later sources winning:
//! 1. built-in defaults
//! 2. a TOML file (`--config <path>`, else `<config dir>/fathom/config.toml` if present)
//! 3. environment variables `FATHOM__<SECTION>__<KEY>`, e.g. `FATHOM__TRAVERSAL__DEPTH_CEILING=12`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use config::{Config, Environment, File, FileFormat};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Environment variable prefix.
pub const ENV_PREFIX: &str = "FATHOM";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("Invalid value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },

    #[error("Failed to expand path {path:?}: {reason}")]
    Expand { path: String, reason: String },

    #[error("No data directory configured and no platform default available")]
    NoDataDir,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FathomConfig {
    pub store: StoreConfig,
    pub traversal: TraversalSettings,
    pub resolver: ResolverSettings,
    pub logging: LoggingConfig,
}

/// Graph store settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Snapshot directory; `~` and `$VARS` are expanded
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_dir: Option<String>,
    /// Write a snapshot after every ingest
    pub persist: bool,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            data_dir: None,
            persist: true,
        }
    }
}

impl StoreConfig {
    /// Resolved snapshot directory.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => expand_path(dir),
            None => default_data_dir().ok_or(ConfigError::NoDataDir),
        }
    }
}

/// Traversal limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraversalSettings {
    /// Largest depth a traversal may request
    pub depth_ceiling: usize,
    /// Depth used when the caller gives none
    pub default_depth: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_nodes: Option<usize>,
}

impl Default for TraversalSettings {
    fn default() -> Self {
        Self {
            depth_ceiling: 10,
            default_depth: 3,
            timeout_ms: None,
            max_nodes: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverSettings {
    pub max_results: usize,
}

impl Default for ResolverSettings {
    fn default() -> Self {
        Self { max_results: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// `tracing` filter directive, e.g. `info` or `fathom_index=debug`
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl FathomConfig {
    /// Load configuration from defaults, a file and the environment.
    ///
    /// An explicit `path` must exist; the default location is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(
            path,
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
    }

    fn load_with_env(path: Option<&Path>, env: Environment) -> Result<Self, ConfigError> {
        let mut builder = Config::builder().add_source(Config::try_from(&FathomConfig::default())?);

        match path {
            Some(path) => {
                builder = builder.add_source(File::from(path).format(FileFormat::Toml).required(true));
            }
            None => {
                if let Some(default) = default_config_path() {
                    builder = builder
                        .add_source(File::from(default).format(FileFormat::Toml).required(false));
                }
            }
        }

        let config: FathomConfig = builder.add_source(env).build()?.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Check cross-field constraints.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.traversal.depth_ceiling == 0 {
            return Err(ConfigError::InvalidValue {
                field: "traversal.depth_ceiling",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.traversal.default_depth > self.traversal.depth_ceiling {
            return Err(ConfigError::InvalidValue {
                field: "traversal.default_depth",
                reason: format!(
                    "{} exceeds depth_ceiling {}",
                    self.traversal.default_depth, self.traversal.depth_ceiling
                ),
            });
        }
        if self.traversal.max_nodes == Some(0) {
            return Err(ConfigError::InvalidValue {
                field: "traversal.max_nodes",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.resolver.max_results == 0 {
            return Err(ConfigError::InvalidValue {
                field: "resolver.max_results",
                reason: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }

    /// Write the default configuration as TOML. Refuses to overwrite.
    pub fn write_default(path: &Path) -> anyhow::Result<()> {
        if path.exists() {
            anyhow::bail!("Config file already exists: {:?}", path);
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {:?}", parent))?;
        }
        let content = toml::to_string_pretty(&FathomConfig::default())
            .context("Failed to serialize default config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {:?}", path))?;
        Ok(())
    }
}

/// `<config dir>/fathom/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("fathom").join("config.toml"))
}

/// `<data dir>/fathom/graphs`.
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|dir| dir.join("fathom").join("graphs"))
}

/// Expand `~` and environment variables in a configured path.
pub fn expand_path(path: &str) -> Result<PathBuf, ConfigError> {
    shellexpand::full(path)
        .map(|expanded| PathBuf::from(expanded.as_ref()))
        .map_err(|e| ConfigError::Expand {
            path: path.to_string(),
            reason: e.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(vars: &[(&str, &str)]) -> Environment {
        let source: config::Map<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("__")
            .separator("__")
            .try_parsing(true)
            .source(Some(source))
    }

    fn write(dir: &TempDir, content: &str) -> PathBuf {
        let path = dir.path().join("config.toml");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_defaults() {
        let config = FathomConfig::default();
        assert_eq!(config.traversal.depth_ceiling, 10);
        assert_eq!(config.traversal.default_depth, 3);
        assert_eq!(config.resolver.max_results, 50);
        assert_eq!(config.logging.level, "info");
        assert!(config.store.persist);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = TempDir::new().unwrap();
        let path = write(
            &dir,
            r#"
[store]
data_dir = "/var/lib/fathom"
persist = false

[traversal]
depth_ceiling = 6
timeout_ms = 2000
"#,
        );
        let config = FathomConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(config.store.data_dir.as_deref(), Some("/var/lib/fathom"));
        assert!(!config.store.persist);
        assert_eq!(config.traversal.depth_ceiling, 6);
        assert_eq!(config.traversal.timeout_ms, Some(2000));
        // Untouched keys keep their defaults.
        assert_eq!(config.traversal.default_depth, 3);
        assert_eq!(config.resolver.max_results, 50);
    }

    #[test]
    fn test_environment_overrides_file() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[resolver]\nmax_results = 5\n");
        let config = FathomConfig::load_with_env(
            Some(&path),
            env(&[
                ("FATHOM__RESOLVER__MAX_RESULTS", "7"),
                ("FATHOM__LOGGING__LEVEL", "debug"),
            ]),
        )
        .unwrap();
        assert_eq!(config.resolver.max_results, 7);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let missing = dir.path().join("nope.toml");
        assert!(matches!(
            FathomConfig::load_with_env(Some(&missing), env(&[])),
            Err(ConfigError::Load(_))
        ));
    }

    #[test]
    fn test_invalid_depths_rejected() {
        let dir = TempDir::new().unwrap();
        let path = write(&dir, "[traversal]\ndepth_ceiling = 2\ndefault_depth = 4\n");
        let err = FathomConfig::load_with_env(Some(&path), env(&[])).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue {
                field: "traversal.default_depth",
                ..
            }
        ));
    }

    #[test]
    fn test_write_default_then_load() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        FathomConfig::write_default(&path).unwrap();
        assert!(FathomConfig::write_default(&path).is_err());

        let loaded = FathomConfig::load_with_env(Some(&path), env(&[])).unwrap();
        assert_eq!(loaded, FathomConfig::default());
    }

    #[test]
    fn test_data_dir_expansion() {
        let store = StoreConfig {
            data_dir: Some("/srv/fathom".to_string()),
            persist: true,
        };
        assert_eq!(store.data_dir().unwrap(), PathBuf::from("/srv/fathom"));

        if let Some(home) = dirs::home_dir() {
            let store = StoreConfig {
                data_dir: Some("~/fathom-graphs".to_string()),
                persist: true,
            };
            assert_eq!(store.data_dir().unwrap(), home.join("fathom-graphs"));
        }
    }

    #[test]
    fn test_json_shape() {
        let json = serde_json::to_value(FathomConfig::default()).unwrap();
        assert_eq!(json["traversal"]["depth_ceiling"], 10);
        assert!(json["store"].get("data_dir").is_none());
    }
}
