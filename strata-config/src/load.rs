use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::shared::IngestConfig;

/// Supported extensions for configuration files.
const CONFIG_FILE_EXTENSIONS: &[&str] = &["yaml", "yml", "json"];

/// Errors that can occur while discovering and loading configuration files.
#[derive(Debug, Error)]
pub enum LoadConfigError {
    /// The configuration directory does not exist.
    #[error("configuration directory `{0}` does not exist")]
    MissingConfigurationDirectory(PathBuf),

    /// The configuration directory exists but contains no configuration files.
    #[error("no configuration files (.yaml, .yml or .json) found in `{0}`")]
    NoConfigurationFiles(PathBuf),

    /// The configuration directory could not be read.
    #[error("failed to read configuration directory `{directory}`: {source}")]
    DirectoryRead {
        directory: PathBuf,
        source: std::io::Error,
    },

    /// A configuration file existed but could not be parsed.
    #[error("failed to load configuration from `{path}`: {source}")]
    ConfigurationFileLoad {
        path: PathBuf,
        source: config::ConfigError,
    },

    /// The configuration file was parsed but deserialization failed.
    #[error("failed to deserialize configuration from `{path}`: {source}")]
    Deserialization {
        path: PathBuf,
        source: config::ConfigError,
    },

    /// The configuration deserialized but failed semantic validation.
    #[error("invalid configuration in `{path}`: {source}")]
    Validation {
        path: PathBuf,
        source: crate::shared::ValidationError,
    },
}

/// Finds every configuration file in `directory`, sorted by path.
///
/// Only files with a supported extension are returned. The sort keeps run
/// order deterministic across machines.
pub fn discover_config_files(directory: &Path) -> Result<Vec<PathBuf>, LoadConfigError> {
    if !directory.is_dir() {
        return Err(LoadConfigError::MissingConfigurationDirectory(
            directory.to_path_buf(),
        ));
    }

    let entries = std::fs::read_dir(directory).map_err(|source| LoadConfigError::DirectoryRead {
        directory: directory.to_path_buf(),
        source,
    })?;

    let mut files = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| LoadConfigError::DirectoryRead {
            directory: directory.to_path_buf(),
            source,
        })?;

        let path = entry.path();
        let supported = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| CONFIG_FILE_EXTENSIONS.contains(&ext));
        if path.is_file() && supported {
            files.push(path);
        }
    }

    if files.is_empty() {
        return Err(LoadConfigError::NoConfigurationFiles(
            directory.to_path_buf(),
        ));
    }

    files.sort();

    Ok(files)
}

/// Loads and deserializes a single configuration file.
pub fn load_config_file<T>(path: &Path) -> Result<T, LoadConfigError>
where
    T: DeserializeOwned,
{
    let settings = config::Config::builder()
        .add_source(config::File::from(path.to_path_buf()))
        .build()
        .map_err(|source| LoadConfigError::ConfigurationFileLoad {
            path: path.to_path_buf(),
            source,
        })?;

    settings
        .try_deserialize::<T>()
        .map_err(|source| LoadConfigError::Deserialization {
            path: path.to_path_buf(),
            source,
        })
}

/// Loads and validates every [`IngestConfig`] found in `directory`.
///
/// Validation runs before any configuration is returned, so a broken file
/// aborts the run before any warehouse mutation is attempted.
pub fn load_config_dir(directory: &Path) -> Result<Vec<IngestConfig>, LoadConfigError> {
    let files = discover_config_files(directory)?;

    let mut configs = Vec::with_capacity(files.len());
    for path in files {
        let config: IngestConfig = load_config_file(&path)?;
        config
            .validate()
            .map_err(|source| LoadConfigError::Validation {
                path: path.clone(),
                source,
            })?;
        configs.push(config);
    }

    Ok(configs)
}
