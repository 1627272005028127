//! Configuration file loading for the CLI
//!
//! This module handles finding and loading TOML configuration files
//! from various locations (explicit path, local directory, system directory).

use std::{
    fs, io,
    path::{Path, PathBuf},
};

use directories::ProjectDirs;
use log::{debug, info};
use thiserror::Error;

use corgi::{CorgiError, config::CompilerConfig};

/// Configuration-related errors for CLI
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse TOML configuration: {0}")]
    Parse(String),

    #[error("Missing configuration file: {0}")]
    MissingFile(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl From<ConfigError> for CorgiError {
    fn from(err: ConfigError) -> Self {
        CorgiError::Io(io::Error::other(err.to_string()))
    }
}

/// Find and load configuration from various locations
///
/// Search order:
/// 1. Explicit path if provided
/// 2. Local project directory (corgi/config.toml)
/// 3. Platform-specific config directory
/// 4. Default config if none found
///
/// # Errors
///
/// Returns error if:
/// - Explicit path is provided but file doesn't exist
/// - Config file exists but cannot be parsed
pub fn load_config(explicit_path: Option<impl AsRef<Path>>) -> Result<CompilerConfig, CorgiError> {
    if let Some(path) = explicit_path {
        let path = path.as_ref();
        info!(path = path.display().to_string(); "Loading configuration from explicit path");
        return load_config_file(path);
    }

    let local_config = Path::new("corgi/config.toml");
    if local_config.exists() {
        info!(path = local_config.display().to_string(); "Loading configuration from local path");
        return load_config_file(local_config);
    }

    if let Some(proj_dirs) = ProjectDirs::from("com", "corgi", "corgi") {
        let system_config = proj_dirs.config_dir().join("config.toml");

        if system_config.exists() {
            info!(
                path = system_config.display().to_string();
                "Loading configuration from system path"
            );
            return load_config_file(system_config);
        }

        debug!(path = system_config.display().to_string(); "System configuration file not found");
    } else {
        debug!("Could not determine platform-specific config directory");
    }

    debug!("No configuration file found, using default configuration");
    Ok(CompilerConfig::default())
}

/// Replace the roots of `config` with `roots` given on the command line.
///
/// Without command-line roots, a configuration without roots gets
/// `fallback`, the directory holding the input.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] for a root that is not a directory.
pub fn with_roots(
    config: CompilerConfig,
    roots: &[PathBuf],
    fallback: &Path,
) -> Result<CompilerConfig, ConfigError> {
    let config = if !roots.is_empty() {
        config.with_roots(roots.to_vec())
    } else if config.roots().is_empty() {
        config.with_roots(vec![fallback.to_path_buf()])
    } else {
        config
    };

    if let Some(root) = config.roots().iter().find(|root| !root.is_dir()) {
        return Err(ConfigError::Validation(format!(
            "root `{}` is not a directory",
            root.display()
        )));
    }
    debug!(roots:? = config.roots(); "Using roots");
    Ok(config)
}

/// Load configuration from a TOML file
///
/// # Errors
///
/// Returns error if:
/// - File doesn't exist
/// - File cannot be read
/// - TOML parsing fails
fn load_config_file(path: impl AsRef<Path>) -> Result<CompilerConfig, CorgiError> {
    let path = path.as_ref();

    if !path.exists() {
        return Err(ConfigError::MissingFile(path.to_path_buf()).into());
    }

    let content = fs::read_to_string(path)?;
    let config: CompilerConfig =
        toml::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use tempfile::tempdir;

    use super::*;

    #[test]
    fn test_explicit_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corgi.toml");
        fs::write(
            &path,
            "module = \"example.com/site\"\n\n[[intrinsics]]\nname = \"Svg\"\nkind = \"element\"\n",
        )
        .unwrap();

        let config = load_config(Some(&path)).unwrap();
        assert_eq!(config.module(), "example.com/site");
        assert_eq!(config.intrinsics().len(), 1);
    }

    #[test]
    fn test_missing_explicit_config() {
        let dir = tempdir().unwrap();
        let err = load_config(Some(dir.path().join("nope.toml"))).unwrap_err();
        assert!(err.to_string().contains("Missing configuration file"));
    }

    #[test]
    fn test_malformed_config() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("corgi.toml");
        fs::write(&path, "roots = 3").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(err.to_string().contains("Failed to parse TOML configuration"));
    }

    #[test]
    fn test_roots() {
        let dir = tempdir().unwrap();
        let fallback = dir.path().join("site");
        fs::create_dir(&fallback).unwrap();

        let config = with_roots(CompilerConfig::default(), &[], &fallback).unwrap();
        assert_eq!(config.roots(), [fallback.clone()]);

        let configured = CompilerConfig::new("m", vec![dir.path().to_path_buf()]);
        let config = with_roots(configured, &[], &fallback).unwrap();
        assert_eq!(config.roots(), [dir.path().to_path_buf()]);

        let err = with_roots(
            CompilerConfig::default(),
            &[dir.path().join("missing")],
            &fallback,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Validation(_)));
    }
}
