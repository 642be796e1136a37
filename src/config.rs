//! Configuration
//!
//! Typed YAML configuration with the defaults of a stock deployment. Every
//! field may be omitted; an empty document yields [`Config::default`].
//!
//! ```yaml
//! node_url: https://mainnet.massa.net/api/v2
//! cache:
//!   enabled: true
//!   max_ram_entries: 1000
//!   max_disk_entries: 10000
//!   disk_cache_dir: ./websitesCache/
//!   file_list_cache_ttl_seconds: 60
//! name_resolution:
//!   ttl_seconds: 16
//!   cache_size: 1000
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

// =============================================================================
// Cache
// =============================================================================

/// Two-tier cache and path-list cache settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Master switch; when false every request goes to the remote store
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Capacity of the RAM tier, in entries
    #[serde(default = "default_max_ram_entries")]
    pub max_ram_entries: usize,

    /// Capacity of the disk tier, in entries
    #[serde(default = "default_max_disk_entries")]
    pub max_disk_entries: usize,

    /// Directory holding the disk tier
    #[serde(default = "default_disk_cache_dir")]
    pub disk_cache_dir: PathBuf,

    /// How long a website's file path list is reused before it is re-read
    #[serde(default = "default_file_list_cache_ttl")]
    pub file_list_cache_ttl_seconds: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_ram_entries: default_max_ram_entries(),
            max_disk_entries: default_max_disk_entries(),
            disk_cache_dir: default_disk_cache_dir(),
            file_list_cache_ttl_seconds: default_file_list_cache_ttl(),
        }
    }
}

impl CacheConfig {
    /// Path list TTL as a [`Duration`]
    pub fn file_list_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.file_list_cache_ttl_seconds)
    }

    /// Check the tier bounds
    pub fn validate(&self) -> Result<()> {
        if self.max_ram_entries == 0 {
            return Err(Error::Config("max_ram_entries must be at least 1".into()));
        }
        if self.max_disk_entries == 0 {
            return Err(Error::Config("max_disk_entries must be at least 1".into()));
        }
        Ok(())
    }
}

// =============================================================================
// Name resolution
// =============================================================================

/// Name → address cache settings. Zero selects the default.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameResolutionConfig {
    #[serde(default = "default_name_ttl")]
    pub ttl_seconds: u64,

    #[serde(default = "default_name_cache_size")]
    pub cache_size: usize,
}

impl Default for NameResolutionConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_name_ttl(),
            cache_size: default_name_cache_size(),
        }
    }
}

impl NameResolutionConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_secs(self.ttl_seconds)
    }
}

// =============================================================================
// Top level
// =============================================================================

/// Full configuration document
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// JSON-RPC endpoint of the node serving the datastore
    #[serde(default)]
    pub node_url: Option<String>,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default)]
    pub name_resolution: NameResolutionConfig,
}

impl Config {
    /// Parse and validate a YAML document
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a YAML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let yaml = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&yaml)
    }

    /// Validate all sections
    pub fn validate(&self) -> Result<()> {
        if self.cache.enabled {
            self.cache.validate()?;
        }
        Ok(())
    }
}

// =============================================================================
// Defaults
// =============================================================================

fn default_enabled() -> bool {
    true
}

fn default_max_ram_entries() -> usize {
    1000
}

fn default_max_disk_entries() -> usize {
    10_000
}

fn default_disk_cache_dir() -> PathBuf {
    PathBuf::from("./websitesCache/")
}

fn default_file_list_cache_ttl() -> u64 {
    60
}

fn default_name_ttl() -> u64 {
    16
}

fn default_name_cache_size() -> usize {
    1000
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert!(config.cache.enabled);
        assert_eq!(config.cache.max_ram_entries, 1000);
        assert_eq!(config.cache.max_disk_entries, 10_000);
        assert_eq!(config.cache.disk_cache_dir, PathBuf::from("./websitesCache/"));
        assert_eq!(config.cache.file_list_cache_ttl(), Duration::from_secs(60));
        assert_eq!(config.name_resolution.ttl(), Duration::from_secs(16));
        assert_eq!(config.name_resolution.cache_size, 1000);
        assert!(config.node_url.is_none());
    }

    #[test]
    fn test_empty_document_is_default() {
        assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
    }

    #[test]
    fn test_partial_document_keeps_defaults() {
        let yaml = r#"
node_url: http://localhost:33035
cache:
  max_ram_entries: 5
  disk_cache_dir: /tmp/deweb
"#;
        let config = Config::from_yaml_str(yaml).unwrap();
        assert_eq!(config.node_url.as_deref(), Some("http://localhost:33035"));
        assert_eq!(config.cache.max_ram_entries, 5);
        assert_eq!(config.cache.max_disk_entries, 10_000);
        assert_eq!(config.cache.disk_cache_dir, PathBuf::from("/tmp/deweb"));
        assert_eq!(config.name_resolution, NameResolutionConfig::default());
    }

    #[test]
    fn test_zero_bound_rejected() {
        let err = Config::from_yaml_str("cache:\n  max_disk_entries: 0\n").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_zero_bound_allowed_when_disabled() {
        let config =
            Config::from_yaml_str("cache:\n  enabled: false\n  max_ram_entries: 0\n").unwrap();
        assert!(!config.cache.enabled);
    }

    #[test]
    fn test_malformed_yaml() {
        let err = Config::from_yaml_str("cache: [not, a, map").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "name_resolution:\n  ttl_seconds: 30\n").unwrap();
        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.name_resolution.ttl_seconds, 30);

        let missing = Config::from_file(&dir.path().join("nope.yaml")).unwrap_err();
        assert!(matches!(missing, Error::Io(_)));
    }
}
