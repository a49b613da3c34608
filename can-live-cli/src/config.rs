//! Configuration loading and merging
//!
//! Settings come from three layers: built-in defaults, an optional TOML file,
//! and command-line flags, each overriding the one before.

use anyhow::{Context, Result};
use can_live_analyzer::AnalyzerConfig;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Main application configuration (loaded from a TOML file)
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct AppConfig {
    #[serde(default)]
    pub analyzer: AnalyzerConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// File that receives log output
    pub file: Option<PathBuf>,
}

/// Values given on the command line that override the file
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub frame_summary_limit: Option<i64>,
    pub refresh_interval_ms: Option<u64>,
    pub log_file: Option<PathBuf>,
}

impl AppConfig {
    /// Apply command-line overrides on top of this configuration
    pub fn merge(mut self, overrides: Overrides) -> Self {
        if let Some(limit) = overrides.frame_summary_limit {
            self.analyzer.frame_summary_limit = limit;
        }
        if let Some(interval) = overrides.refresh_interval_ms {
            self.analyzer.refresh_interval_ms = interval;
        }
        if overrides.log_file.is_some() {
            self.logging.file = overrides.log_file;
        }
        self
    }
}

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<AppConfig> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    let config: AppConfig = toml::from_str(&content)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use can_live_analyzer::SortKey;
    use std::io::Write;

    #[test]
    fn test_config_deserialization() {
        let toml_content = r#"
            [analyzer]
            frame_summary_limit = 64
            default_sort = "count"
            default_reverse = false

            [logging]
            file = "analyzer.log"
        "#;

        let config: AppConfig = toml::from_str(toml_content).unwrap();
        assert_eq!(config.analyzer.frame_summary_limit, 64);
        assert_eq!(config.analyzer.refresh_interval_ms, 100);
        assert_eq!(config.analyzer.default_sort, SortKey::Count);
        assert!(!config.analyzer.default_reverse);
        assert_eq!(config.logging.file, Some(PathBuf::from("analyzer.log")));
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.analyzer, AnalyzerConfig::default());
        assert!(config.logging.file.is_none());
    }

    #[test]
    fn test_flags_override_file() {
        let config: AppConfig = toml::from_str(
            "[analyzer]\nframe_summary_limit = 5\nrefresh_interval_ms = 500\n",
        )
        .unwrap();
        let merged = config.merge(Overrides {
            frame_summary_limit: Some(50),
            refresh_interval_ms: None,
            log_file: Some(PathBuf::from("run.log")),
        });

        assert_eq!(merged.analyzer.frame_summary_limit, 50);
        assert_eq!(merged.analyzer.refresh_interval_ms, 500);
        assert_eq!(merged.logging.file, Some(PathBuf::from("run.log")));
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analyzer]\nrefresh_interval_ms = 250").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.analyzer.refresh_interval_ms, 250);
    }

    #[test]
    fn test_load_config_errors() {
        assert!(load_config(Path::new("does-not-exist.toml")).is_err());

        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[analyzer]\nframe_summary_limit = \"many\"").unwrap();
        assert!(load_config(file.path()).is_err());
    }
}
