//! Configuration loader with environment variable expansion

use super::{Config, ConfigError};
use lazy_static::lazy_static;
use regex_lite::Regex;
use std::path::Path;

lazy_static! {
    static ref ENV_VAR: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
    pub(super) static ref ENV_VAR_WITH_DEFAULT: Regex =
        Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)(?::-([^}]+))?\}").unwrap();
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Config, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
    }

    /// Parse and validate configuration from YAML text
    pub fn from_yaml(content: &str) -> Result<Config, ConfigError> {
        let expanded = Self::expand_env_vars(content);
        let config: Config = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    /// Expand environment variables in the format ${VAR_NAME}
    fn expand_env_vars(content: &str) -> String {
        let mut result = content.to_string();

        for cap in ENV_VAR.captures_iter(content) {
            let var_name = &cap[1];
            if let Ok(value) = std::env::var(var_name) {
                result = result.replace(&cap[0], &value);
            }
        }

        result
    }
}
