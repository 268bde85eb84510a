use std::{
    fs,
    path::{Path, PathBuf},
};

use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

/// Default location of the configuration file, relative to the project root.
pub const DEFAULT_CONFIG_PATH: &str = "config/config.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("configuration file not found at {}", path.display())]
    NotFound { path: PathBuf },
    #[error("could not read configuration file {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid configuration: {0}")]
    Syntax(#[from] serde_yaml::Error),
    #[error("`{key}` must be a non-empty relative path, got {value:?}")]
    InvalidPath { key: &'static str, value: PathBuf },
    #[error("unknown log level {0:?}")]
    UnknownLevel(String),
}

/// Validated run configuration. Paths are stored relative to `project_root`
/// and resolved on access.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Settings {
    #[serde(skip)]
    project_root: PathBuf,
    raw_data_path: PathBuf,
    processed_data_path: PathBuf,
    log_file_path: PathBuf,
    #[serde(default)]
    pub logging: LoggingSettings,
    #[serde(default)]
    pub transform: TransformSettings,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingSettings {
    #[serde(default)]
    pub level: LogLevel,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TransformSettings {
    #[serde(default)]
    pub invalid_rows: InvalidRows,
    #[serde(default = "default_drop_duplicates")]
    pub drop_duplicates: bool,
}

fn default_drop_duplicates() -> bool {
    true
}

impl Default for TransformSettings {
    fn default() -> Self {
        Self {
            invalid_rows: InvalidRows::default(),
            drop_duplicates: default_drop_duplicates(),
        }
    }
}

/// What the transform stage does with rows whose `quantity` or `price` is not
/// numeric.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvalidRows {
    /// Abort the run.
    #[default]
    Reject,
    /// Exclude the rows and log how many were excluded.
    Drop,
}

/// Log level accepting both tracing (`warn`) and Python-style (`WARNING`)
/// names, case-insensitively.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub struct LogLevel(LevelFilter);

impl LogLevel {
    pub fn filter(&self) -> LevelFilter {
        self.0
    }
}

impl Default for LogLevel {
    fn default() -> Self {
        Self(LevelFilter::INFO)
    }
}

impl TryFrom<String> for LogLevel {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let filter = match value.to_ascii_lowercase().as_str() {
            "trace" => LevelFilter::TRACE,
            "debug" => LevelFilter::DEBUG,
            "info" => LevelFilter::INFO,
            "warn" | "warning" => LevelFilter::WARN,
            "error" | "critical" => LevelFilter::ERROR,
            "off" => LevelFilter::OFF,
            _ => return Err(ConfigError::UnknownLevel(value)),
        };
        Ok(Self(filter))
    }
}

impl Settings {
    /// Load and validate the configuration at `project_root / config_path`.
    pub fn load(
        project_root: impl Into<PathBuf>,
        config_path: impl AsRef<Path>,
    ) -> Result<Self, ConfigError> {
        let project_root = project_root.into();
        let path = project_root.join(config_path);

        let text = fs::read_to_string(&path).map_err(|source| match source.kind() {
            std::io::ErrorKind::NotFound => ConfigError::NotFound { path: path.clone() },
            _ => ConfigError::Read {
                path: path.clone(),
                source,
            },
        })?;

        Self::from_yaml(project_root, &text)
    }

    /// Parse and validate a YAML document against `project_root`.
    pub fn from_yaml(project_root: impl Into<PathBuf>, text: &str) -> Result<Self, ConfigError> {
        let mut settings: Self = serde_yaml::from_str(text)?;
        settings.project_root = project_root.into();
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("raw_data_path", &self.raw_data_path),
            ("processed_data_path", &self.processed_data_path),
            ("log_file_path", &self.log_file_path),
        ] {
            if value.as_os_str().is_empty() || value.is_absolute() {
                return Err(ConfigError::InvalidPath {
                    key,
                    value: value.clone(),
                });
            }
        }

        if self.log_file_path.file_name().is_none() {
            return Err(ConfigError::InvalidPath {
                key: "log_file_path",
                value: self.log_file_path.clone(),
            });
        }

        Ok(())
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn raw_data_path(&self) -> PathBuf {
        self.project_root.join(&self.raw_data_path)
    }

    pub fn processed_data_dir(&self) -> PathBuf {
        self.project_root.join(&self.processed_data_path)
    }

    pub fn log_file_path(&self) -> PathBuf {
        self.project_root.join(&self.log_file_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = "
raw_data_path: data/raw/sales.csv
processed_data_path: data/processed
log_file_path: logs/etl.log
";

    #[test]
    fn minimal_document_gets_defaults() {
        let settings = Settings::from_yaml("/srv/etl", MINIMAL).unwrap();

        assert_eq!(settings.logging.level.filter(), LevelFilter::INFO);
        assert_eq!(settings.transform.invalid_rows, InvalidRows::Reject);
        assert!(settings.transform.drop_duplicates);
        assert_eq!(
            settings.raw_data_path(),
            Path::new("/srv/etl/data/raw/sales.csv")
        );
        assert_eq!(settings.processed_data_dir(), Path::new("/srv/etl/data/processed"));
    }

    #[test]
    fn python_style_levels_are_accepted() {
        let text = format!("{MINIMAL}logging:\n  level: WARNING\n");

        let settings = Settings::from_yaml(".", &text).unwrap();

        assert_eq!(settings.logging.level.filter(), LevelFilter::WARN);
    }

    #[test]
    fn unknown_level_fails_at_load() {
        let text = format!("{MINIMAL}logging:\n  level: loud\n");

        assert!(matches!(
            Settings::from_yaml(".", &text),
            Err(ConfigError::Syntax(_))
        ));
    }

    #[test]
    fn missing_key_fails_at_load() {
        let text = "raw_data_path: data/raw/sales.csv\nlog_file_path: logs/etl.log\n";

        let err = Settings::from_yaml(".", text).unwrap_err();

        assert!(err.to_string().contains("processed_data_path"));
    }

    #[test]
    fn absolute_paths_are_rejected() {
        let text = MINIMAL.replace("data/processed", "/tmp/processed");

        assert!(matches!(
            Settings::from_yaml(".", &text),
            Err(ConfigError::InvalidPath {
                key: "processed_data_path",
                ..
            })
        ));
    }

    #[test]
    fn drop_policy_is_parsed() {
        let text =
            format!("{MINIMAL}transform:\n  invalid_rows: drop\n  drop_duplicates: false\n");

        let settings = Settings::from_yaml(".", &text).unwrap();

        assert_eq!(settings.transform.invalid_rows, InvalidRows::Drop);
        assert!(!settings.transform.drop_duplicates);
    }

    #[test]
    fn missing_file_is_reported_with_its_path() {
        let err = Settings::load("/nonexistent-root", DEFAULT_CONFIG_PATH).unwrap_err();

        assert!(matches!(
            err,
            ConfigError::NotFound { path } if path.ends_with("config/config.yaml")
        ));
    }
}
