//! Loading configuration and declarations from disk.
//!
//! The configuration lives in `.config/tabula.styx`, found in the current
//! directory or any parent directory.

use crate::{Config, DeclarationFile};
use camino::{Utf8Path, Utf8PathBuf};

/// Location of the configuration file relative to a project root.
pub const CONFIG_FILE: &str = ".config/tabula.styx";

/// Load configuration from `.config/tabula.styx`, searching up the directory tree.
pub fn load() -> Result<(Config, Utf8PathBuf), ConfigError> {
    let cwd = std::env::current_dir().map_err(|e| ConfigError::Io(e.to_string()))?;
    let cwd = Utf8PathBuf::from_path_buf(cwd)
        .map_err(|p| ConfigError::Io(format!("non UTF-8 working directory: {}", p.display())))?;
    load_from(&cwd)
}

/// Load configuration starting from a specific directory.
pub fn load_from(start: &Utf8Path) -> Result<(Config, Utf8PathBuf), ConfigError> {
    let config_path = find_config_file(start)?;
    let content =
        std::fs::read_to_string(&config_path).map_err(|e| ConfigError::Io(e.to_string()))?;

    let config = parse_config(&content)?;
    Ok((config, config_path))
}

/// Parse and validate configuration source.
pub fn parse_config(source: &str) -> Result<Config, ConfigError> {
    let config: Config =
        facet_styx::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))?;
    config.validate()?;
    Ok(config)
}

/// Load a declaration document.
pub fn load_declarations(path: &Utf8Path) -> Result<DeclarationFile, ConfigError> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| ConfigError::Io(format!("{}: {}", path, e)))?;
    parse_declarations(&content).map_err(|e| match e {
        ConfigError::Parse(msg) => ConfigError::Parse(format!("{}: {}", path, msg)),
        other => other,
    })
}

/// Parse declaration source.
pub fn parse_declarations(source: &str) -> Result<DeclarationFile, ConfigError> {
    facet_styx::from_str(source).map_err(|e| ConfigError::Parse(e.to_string()))
}

/// Find `.config/tabula.styx` by searching up the directory tree.
fn find_config_file(start: &Utf8Path) -> Result<Utf8PathBuf, ConfigError> {
    let mut current = start.to_path_buf();

    loop {
        let config_path = current.join(CONFIG_FILE);
        if config_path.exists() {
            return Ok(config_path);
        }

        if !current.pop() {
            return Err(ConfigError::NotFound);
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug)]
pub enum ConfigError {
    /// No `.config/tabula.styx` found in any parent directory
    NotFound,
    /// I/O error reading a file
    Io(String),
    /// Parse error in a Styx file
    Parse(String),
    /// Well-formed but inconsistent configuration
    Invalid(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::NotFound => {
                write!(
                    f,
                    "No {} found in current directory or any parent",
                    CONFIG_FILE
                )
            }
            ConfigError::Io(e) => write!(f, "Failed to read configuration: {}", e),
            ConfigError::Parse(e) => write!(f, "Failed to parse configuration: {}", e),
            ConfigError::Invalid(e) => write!(f, "Invalid configuration: {}", e),
        }
    }
}

impl std::error::Error for ConfigError {}
