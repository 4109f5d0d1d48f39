use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use slicecfg_upgrade::DocumentKind;
use thiserror::Error;

/// File looked up in the data directory when `--config` is not given.
pub const DEFAULT_CONFIG_FILE: &str = "slicecfg.toml";

/// Top-level configuration parsed from `slicecfg.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Per-kind source directory, relative to the data directory, keyed by
    /// kind name.
    pub sources: BTreeMap<String, PathBuf>,
    /// Which files are picked up.
    pub output: OutputConfig,
}

/// File selection settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputConfig {
    /// Extension of documents considered for upgrade.
    pub extension: String,
    /// File name holding preferences inside the preferences source directory.
    pub preferences_file: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            extension: "cfg".to_string(),
            preferences_file: "cura.cfg".to_string(),
        }
    }
}

/// Error loading the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {message}")]
    Parse { path: PathBuf, message: String },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load `explicit` if given, else `<root>/slicecfg.toml` if present, else defaults.
    pub fn load(explicit: Option<&Path>, root: &Path) -> Result<Self, ConfigError> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => {
                let candidate = root.join(DEFAULT_CONFIG_FILE);
                if !candidate.is_file() {
                    tracing::debug!("no {DEFAULT_CONFIG_FILE} found, using defaults");
                    return Ok(Self::default());
                }
                candidate
            }
        };

        let content = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|e| match e {
            ConfigError::Parse { message, .. } => ConfigError::Parse { path, message },
            other => other,
        })?;
        Ok(config)
    }

    /// Parse and validate a TOML string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: PathBuf::from("<string>"),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Source directory for `kind`, relative to the data directory.
    pub fn location(&self, kind: DocumentKind) -> PathBuf {
        self.sources
            .get(kind.as_str())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(kind.default_location()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.output.extension.is_empty() {
            return Err(ConfigError::Invalid(
                "output.extension must not be empty".into(),
            ));
        }
        if self.output.preferences_file.is_empty() {
            return Err(ConfigError::Invalid(
                "output.preferences_file must not be empty".into(),
            ));
        }
        for (kind, path) in &self.sources {
            if let Err(e) = kind.parse::<DocumentKind>() {
                return Err(ConfigError::Invalid(format!("sources: {e}")));
            }
            if path.is_absolute() {
                return Err(ConfigError::Invalid(format!(
                    "sources.{kind} must be relative, got {}",
                    path.display()
                )));
            }
        }
        Ok(())
    }
}
