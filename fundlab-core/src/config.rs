//! Engine configuration, read from TOML.
//!
//! Every field has a default, so an empty file (or no file) is valid:
//!
//! ```toml
//! root_dir = "data"
//! category_column = "tosyo_33category"
//! name_column = "company_name_en"
//! default_point_size = 20.0
//! fetch_threads = 1
//! ```

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::plot::{PlotOptions, DEFAULT_CATEGORY_COLUMN, DEFAULT_NAME_COLUMN, DEFAULT_POINT_SIZE};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Directory holding one subdirectory per data kind.
    pub root_dir: PathBuf,
    /// Company column naming the sector of a ticker.
    pub category_column: String,
    /// Company column shown as the display name of a plot point.
    pub name_column: String,
    /// Marker size when a plot has no size expression.
    pub default_point_size: f64,
    /// Worker threads of a fetch run.
    pub fetch_threads: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            root_dir: PathBuf::from("data"),
            category_column: DEFAULT_CATEGORY_COLUMN.to_string(),
            name_column: DEFAULT_NAME_COLUMN.to_string(),
            default_point_size: DEFAULT_POINT_SIZE,
            fetch_threads: 1,
        }
    }
}

impl EngineConfig {
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.root_dir.as_os_str().is_empty() {
            return Err(ConfigError::Invalid("root_dir must not be empty".into()));
        }
        if self.category_column.trim().is_empty() || self.name_column.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "category_column and name_column must not be empty".into(),
            ));
        }
        if !self.default_point_size.is_finite() || self.default_point_size <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "default_point_size must be positive, got {}",
                self.default_point_size
            )));
        }
        if self.fetch_threads == 0 {
            return Err(ConfigError::Invalid("fetch_threads must be at least 1".into()));
        }
        Ok(())
    }

    pub fn plot_options(&self) -> PlotOptions {
        PlotOptions {
            default_point_size: self.default_point_size,
            name_column: self.name_column.clone(),
            category_column: self.category_column.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_config_uses_defaults() {
        let config = EngineConfig::from_toml("").unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.root_dir, PathBuf::from("data"));
        assert_eq!(config.category_column, "tosyo_33category");
        assert_eq!(config.name_column, "company_name_en");
        assert_eq!(config.default_point_size, 20.0);
        assert_eq!(config.fetch_threads, 1);
    }

    #[test]
    fn partial_config_overrides_fields() {
        let config = EngineConfig::from_toml(
            r#"
            root_dir = "/var/lib/fundlab"
            fetch_threads = 4
            "#,
        )
        .unwrap();
        assert_eq!(config.root_dir, PathBuf::from("/var/lib/fundlab"));
        assert_eq!(config.fetch_threads, 4);
        assert_eq!(config.name_column, "company_name_en");
    }

    #[test]
    fn rejects_bad_values() {
        assert!(matches!(
            EngineConfig::from_toml("fetch_threads = 0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("default_point_size = -1.0"),
            Err(ConfigError::Invalid(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("unknown_key = 1"),
            Err(ConfigError::Parse(_))
        ));
        assert!(matches!(
            EngineConfig::from_toml("fetch_threads = \"many\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn reads_from_file() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("fundlab.toml");
        fs::write(&path, "name_column = \"company_name\"\n").unwrap();
        assert_eq!(EngineConfig::from_file(&path).unwrap().name_column, "company_name");
        assert!(matches!(
            EngineConfig::from_file(&tmp.path().join("missing.toml")),
            Err(ConfigError::Io { .. })
        ));
    }
}
