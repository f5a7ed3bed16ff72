use super::types::IndexerConfig;
use std::fs;
use std::path::Path;

const VALID_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];
const VALID_FORMATS: [&str; 2] = ["compact", "json"];

impl IndexerConfig {
    /// Load configuration from a TOML file
    ///
    /// Environment overrides are applied before validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| anyhow::anyhow!("Failed to read config file: {}", e))?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Parse configuration from TOML text without touching the environment
    pub fn from_toml_str(content: &str) -> anyhow::Result<Self> {
        toml::from_str(content).map_err(|e| anyhow::anyhow!("Failed to parse config file: {}", e))
    }

    /// Apply environment variable overrides
    ///
    /// Supported environment variables:
    /// - KALAMDB_SCHEMA_MAX_COLUMNS: Override schema.max_columns
    /// - KALAMDB_SCHEMA_MAX_DEPTH: Override schema.max_depth
    /// - KALAMDB_ARRAY_LENGTH_MIN_VERSION: Override indexing.array_length_min_version
    /// - KALAMDB_LOG_LEVEL: Override logging.level
    pub fn apply_env_overrides(&mut self) -> anyhow::Result<()> {
        use std::env;

        if let Ok(value) = env::var("KALAMDB_SCHEMA_MAX_COLUMNS") {
            self.schema.max_columns = value.parse().map_err(|_| {
                anyhow::anyhow!("Invalid KALAMDB_SCHEMA_MAX_COLUMNS value: {}", value)
            })?;
        }

        if let Ok(value) = env::var("KALAMDB_SCHEMA_MAX_DEPTH") {
            self.schema.max_depth = value.parse().map_err(|_| {
                anyhow::anyhow!("Invalid KALAMDB_SCHEMA_MAX_DEPTH value: {}", value)
            })?;
        }

        if let Ok(value) = env::var("KALAMDB_ARRAY_LENGTH_MIN_VERSION") {
            self.indexing.array_length_min_version = value.parse().map_err(|_| {
                anyhow::anyhow!("Invalid KALAMDB_ARRAY_LENGTH_MIN_VERSION value: {}", value)
            })?;
        }

        if let Ok(level) = env::var("KALAMDB_LOG_LEVEL") {
            self.logging.level = level.to_lowercase();
        }

        Ok(())
    }

    /// Validate configuration settings
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.schema.max_columns == 0 {
            return Err(anyhow::anyhow!("schema.max_columns cannot be 0"));
        }

        if self.schema.max_depth == 0 {
            return Err(anyhow::anyhow!("schema.max_depth cannot be 0"));
        }

        if !VALID_LEVELS.contains(&self.logging.level.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log level '{}'. Must be one of: {}",
                self.logging.level,
                VALID_LEVELS.join(", ")
            ));
        }

        if !VALID_FORMATS.contains(&self.logging.format.as_str()) {
            return Err(anyhow::anyhow!(
                "Invalid log format '{}'. Must be one of: {}",
                self.logging.format,
                VALID_FORMATS.join(", ")
            ));
        }

        for (target, level) in &self.logging.targets {
            if !VALID_LEVELS.contains(&level.as_str()) {
                return Err(anyhow::anyhow!(
                    "Invalid log level '{}' for target '{}'. Must be one of: {}",
                    level,
                    target,
                    VALID_LEVELS.join(", ")
                ));
            }
        }

        Ok(())
    }
}
