//! Configuration loading from disk.

use std::path::Path;
use std::fs;
use crate::config::schema::WalletConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(toml::de::Error),
    Serialize(toml::ser::Error),
    Validation(Vec<ValidationError>),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(e) => write!(f, "IO error: {}", e),
            ConfigError::Parse(e) => write!(f, "Parse error: {}", e),
            ConfigError::Serialize(e) => write!(f, "Serialize error: {}", e),
            ConfigError::Validation(errors) => {
                write!(f, "Validation failed: ")?;
                for (i, err) in errors.iter().enumerate() {
                    if i > 0 { write!(f, ", ")?; }
                    write!(f, "{}", err)?;
                }
                Ok(())
            }
        }
    }
}

impl std::error::Error for ConfigError {}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<WalletConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(ConfigError::Io)?;
    let config: WalletConfig = toml::from_str(&content).map_err(ConfigError::Parse)?;
    
    validate_config(&config).map_err(ConfigError::Validation)?;
    
    Ok(config)
}

/// Load the configuration, writing the defaults to `path` first if no file
/// exists there yet.
pub fn load_or_init_config(path: &Path) -> Result<WalletConfig, ConfigError> {
    if !path.exists() {
        let config = WalletConfig::default();
        save_config(path, &config)?;
        tracing::info!(path = ?path, "Wrote default configuration");
        return Ok(config);
    }
    load_config(path)
}

/// Write the configuration as TOML, creating parent directories.
pub fn save_config(path: &Path, config: &WalletConfig) -> Result<(), ConfigError> {
    let text = toml::to_string_pretty(config).map_err(ConfigError::Serialize)?;
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(ConfigError::Io)?;
    }
    fs::write(path, text).map_err(ConfigError::Io)
}
