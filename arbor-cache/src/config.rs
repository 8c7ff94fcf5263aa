use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::core::error::{ArborError, Result};

/// Depth ceiling applied to every request when the config does not
/// override it.
pub const DEFAULT_MAX_DEPTH: u32 = 100;

/// Cache adapter configuration.
///
/// Every field has a working default, so partial YAML files only need
/// the keys they override.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Master switch for the bounded-memory protections. Off means no
    /// entry or memory caps, no persistence guards, no LRU upkeep.
    pub enable_oom_protection: bool,
    /// Maximum number of cached entries; 0 disables persistence.
    pub max_entries: usize,
    /// Memory budget for cached data, in megabytes.
    pub max_memory_mb: f64,
    /// Deepest finite scan depth the store will persist.
    pub max_cache_depth: u32,
    /// Deepest target nesting (path segments) the store will persist.
    pub max_path_depth: u32,
    /// Bound on the visit tracker.
    pub max_tracked_nodes: usize,
    /// Seconds a timestamped entry is served before it gets re-validated
    /// against the source; negative disables validation entirely.
    pub validation_ttl_seconds: f64,
    /// Ceiling on requested depths; deeper requests are clamped down.
    pub max_depth: u32,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enable_oom_protection: true,
            max_entries: 10_000,
            max_memory_mb: 64.0,
            max_cache_depth: 15,
            max_path_depth: 30,
            max_tracked_nodes: 100_000,
            validation_ttl_seconds: 5.0,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl CacheConfig {
    /// Load configuration from YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> anyhow::Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: CacheConfig = serde_yaml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Check the cross-field invariants.
    pub fn validate(&self) -> Result<()> {
        if self.max_depth == 0 {
            return Err(ArborError::Configuration(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.max_cache_depth > self.max_depth {
            return Err(ArborError::Configuration(format!(
                "max_cache_depth ({}) cannot exceed max_depth ({})",
                self.max_cache_depth, self.max_depth
            )));
        }
        if !self.max_memory_mb.is_finite() || self.max_memory_mb < 0.0 {
            return Err(ArborError::Configuration(format!(
                "max_memory_mb must be a non-negative number, got {}",
                self.max_memory_mb
            )));
        }
        if !self.validation_ttl_seconds.is_finite() {
            return Err(ArborError::Configuration(
                "validation_ttl_seconds must be finite".to_string(),
            ));
        }
        if self.max_path_depth == 0 {
            return Err(ArborError::Configuration(
                "max_path_depth must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Memory budget in bytes.
    pub fn max_memory_bytes(&self) -> usize {
        (self.max_memory_mb * 1_048_576.0) as usize
    }
}
