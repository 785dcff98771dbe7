//! # Configuration Management Module
//!
//! ## Purpose
//! Centralized configuration for the statute retrieval engine, loaded from
//! TOML files with environment variable overrides and validation.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration files (TOML), environment variables
//! - **Output**: Validated configuration structs with defaults and overrides
//! - **Validation**: Type checking, range validation
//!
//! ## Configuration Sources (in order of precedence)
//! 1. Environment variables (`STATUTE_KG_*`)
//! 2. Configuration file
//! 3. Default values
//!
//! ## Usage
//! ```rust,no_run
//! use statute_kg_search::config::Config;
//!
//! let config = Config::from_file("config.toml").unwrap();
//! println!("Graph store path: {:?}", config.storage.db_path);
//! ```

use crate::errors::{KgError, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main configuration structure containing all system settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Graph store settings
    pub storage: StorageConfig,
    /// Document extraction and ingestion settings
    pub ingestion: IngestionConfig,
    /// Vector index configuration
    pub vector: VectorConfig,
    /// Retrieval engine behavior
    pub retrieval: RetrievalConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
    /// Performance tuning
    pub performance: PerformanceConfig,
}

/// Graph store configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Database file path
    pub db_path: PathBuf,
    /// Compress node text above this many bytes (0 disables compression)
    pub compression_threshold_bytes: usize,
}

/// Document extraction and ingestion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    /// Jurisdiction prefix prepended to normalized article numbers
    pub jurisdiction_prefix: String,
    /// Fail on malformed statute/case blocks instead of skipping them
    pub strict: bool,
}

/// Vector index configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VectorConfig {
    /// HNSW graph parameters
    pub hnsw: HnswConfig,
    /// Expected embedding dimension (0 = inferred from the first vector)
    pub dimension: usize,
    /// Directory holding the persisted index and its side-table
    pub index_dir: PathBuf,
}

/// HNSW (Hierarchical Navigable Small World) configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HnswConfig {
    /// Number of bi-directional links for each node (M parameter)
    pub m: usize,
    /// Size of the dynamic candidate list during construction
    pub ef_construction: usize,
    /// Size of the dynamic candidate list during search
    pub ef_search: usize,
}

/// Retrieval engine configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Default number of nearest facts fetched per query
    pub top_k: usize,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
    /// Enable structured JSON logging
    pub json_format: bool,
}

/// Performance tuning configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    /// Number of worker threads for the async runtime
    pub worker_threads: usize,
}

impl Config {
    /// Load configuration from the default location
    pub fn load() -> Result<Self> {
        Self::from_file("config.toml")
    }

    /// Load configuration from a specific file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if !path.exists() {
            tracing::warn!("Configuration file not found: {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| KgError::Config {
            message: format!("Failed to read config file {:?}: {}", path, e),
        })?;

        let mut config: Config = toml::from_str(&content).map_err(|e| KgError::Config {
            message: format!("Failed to parse config file {:?}: {}", path, e),
        })?;

        config.apply_env_overrides()?;
        config.validate()?;

        Ok(config)
    }

    /// Apply environment variable overrides
    fn apply_env_overrides(&mut self) -> Result<()> {
        if let Ok(db_path) = std::env::var("STATUTE_KG_DB_PATH") {
            self.storage.db_path = PathBuf::from(db_path);
        }
        if let Ok(index_dir) = std::env::var("STATUTE_KG_INDEX_DIR") {
            self.vector.index_dir = PathBuf::from(index_dir);
        }
        if let Ok(level) = std::env::var("STATUTE_KG_LOG_LEVEL") {
            self.logging.level = level;
        }
        if let Ok(top_k) = std::env::var("STATUTE_KG_TOP_K") {
            self.retrieval.top_k = top_k.parse().map_err(|_| KgError::Config {
                message: "Invalid value in STATUTE_KG_TOP_K".to_string(),
            })?;
        }
        Ok(())
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.vector.hnsw.m == 0 {
            return Err(KgError::ValidationFailed {
                field: "vector.hnsw.m".to_string(),
                reason: "HNSW M parameter must be greater than zero".to_string(),
            });
        }

        if self.vector.hnsw.ef_construction < self.vector.hnsw.m {
            return Err(KgError::ValidationFailed {
                field: "vector.hnsw.ef_construction".to_string(),
                reason: "ef_construction must be at least M".to_string(),
            });
        }

        if self.retrieval.top_k == 0 {
            return Err(KgError::ValidationFailed {
                field: "retrieval.top_k".to_string(),
                reason: "top_k must be greater than zero".to_string(),
            });
        }

        if self.ingestion.jurisdiction_prefix.is_empty() {
            return Err(KgError::ValidationFailed {
                field: "ingestion.jurisdiction_prefix".to_string(),
                reason: "jurisdiction prefix cannot be empty".to_string(),
            });
        }

        Ok(())
    }

    /// Get configuration as TOML string
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| KgError::Config {
            message: format!("Failed to serialize config to TOML: {}", e),
        })
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            storage: StorageConfig {
                db_path: PathBuf::from("./data/statute_kg.db"),
                compression_threshold_bytes: 4096,
            },
            ingestion: IngestionConfig {
                jurisdiction_prefix: "民法第".to_string(),
                strict: false,
            },
            vector: VectorConfig {
                hnsw: HnswConfig {
                    m: 32,
                    ef_construction: 200,
                    ef_search: 100,
                },
                dimension: 0,
                index_dir: PathBuf::from("./data/fact_index"),
            },
            retrieval: RetrievalConfig { top_k: 5 },
            logging: LoggingConfig {
                level: "info".to_string(),
                json_format: false,
            },
            performance: PerformanceConfig {
                worker_threads: num_cpus::get(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.vector.hnsw.m, 32);
        assert_eq!(config.vector.hnsw.ef_construction, 200);
        assert_eq!(config.vector.hnsw.ef_search, 100);
        assert_eq!(config.retrieval.top_k, 5);
    }

    #[test]
    fn zero_top_k_rejected() {
        let mut config = Config::default();
        config.retrieval.top_k = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn roundtrips_through_toml() {
        let config = Config::default();
        let text = config.to_toml().unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.vector.hnsw.ef_search, config.vector.hnsw.ef_search);
    }
}
