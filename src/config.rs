use serde::Deserialize;
use std::path::{Path, PathBuf};

use crate::version::platform::Platform;

// =============================================================================
// Release index constants
// =============================================================================

/// Default base URL for the release index API
pub const DEFAULT_RELEASES_URL: &str = "https://api.releases.hashicorp.com/v1/releases";

/// Number of releases requested per page
pub const RELEASES_PAGE_SIZE: u32 = 20;

/// Timeout for release listing requests in milliseconds (5 seconds)
pub const LIST_TIMEOUT_MS: u64 = 5_000;

// =============================================================================
// Configuration file constants
// =============================================================================

/// Suffix of declarative configuration files
pub const CONFIG_FILE_SUFFIX: &str = ".tf";

/// Dependency lock file removed whenever a provider requirement is rewritten
pub const LOCK_FILE_NAME: &str = ".terraform.lock.hcl";

/// Label matching every module block
pub const MODULE_WILDCARD: &str = "*";

/// Name of the package metadata file discovered by the catalog
pub const METADATA_FILE_NAME: &str = "metadata.json";

/// Organisation used when a metadata file doesn't declare one
pub const DEFAULT_ORGANISATION: &str = "ovotech";

/// Registry host used in the plugin cache layout
pub const DEFAULT_REGISTRY_HOST: &str = "registry.terraform.io";

/// Release name of the tool binary
pub const TOOL_NAME: &str = "terraform";

/// Release name prefix of provider plugins
pub const PROVIDER_RELEASE_PREFIX: &str = "terraform-provider-";

/// Matrix configuration structure
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct MatrixConfig {
    pub releases: ReleasesConfig,
    pub cache: CacheConfig,
    pub versions: VersionsConfig,
    pub catalog: CatalogConfig,
    pub log: LogConfig,
}

/// Release index configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct ReleasesConfig {
    pub base_url: String,
    pub page_size: u32,
    /// Timeout for listing and descriptor requests in milliseconds
    pub list_timeout_ms: u64,
    /// Timeout for artifact downloads in milliseconds, unbounded when unset
    pub download_timeout_ms: Option<u64>,
}

impl Default for ReleasesConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELEASES_URL.to_string(),
            page_size: RELEASES_PAGE_SIZE,
            list_timeout_ms: LIST_TIMEOUT_MS,
            download_timeout_ms: None,
        }
    }
}

/// Artifact cache configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CacheConfig {
    pub binary_dir: Option<PathBuf>,
    pub plugin_dir: Option<PathBuf>,
    pub registry_host: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            binary_dir: None,
            plugin_dir: None,
            registry_host: DEFAULT_REGISTRY_HOST.to_string(),
        }
    }
}

impl CacheConfig {
    /// Root directory for tool binaries
    pub fn binary_root(&self) -> PathBuf {
        self.binary_dir.clone().unwrap_or_else(binary_cache_dir)
    }

    /// Root directory for provider plugins
    pub fn plugin_root(&self) -> PathBuf {
        self.plugin_dir.clone().unwrap_or_else(plugin_cache_dir)
    }
}

/// Version set derivation options
#[derive(Debug, Clone, Deserialize, Default, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct VersionsConfig {
    /// Exact version strings that are never tested
    pub blocked: Vec<String>,
    /// Collapse matching versions to one `major.minor.0` entry per minor line
    pub group_by_minor: bool,
    /// Upper bound on concurrently running version units
    pub max_parallel: Option<usize>,
}

/// Metadata catalog configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct CatalogConfig {
    pub root: Option<PathBuf>,
    pub default_organisation: String,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            root: None,
            default_organisation: DEFAULT_ORGANISATION.to_string(),
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    pub level: String,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

/// Error returned when a configuration file cannot be loaded
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(#[from] serde_json::Error),
}

impl MatrixConfig {
    /// Parse a configuration from JSON text, missing fields use defaults
    pub fn from_json_str(content: &str) -> Result<Self, ConfigError> {
        Ok(serde_json::from_str(content)?)
    }

    /// Load a configuration from a JSON file
    pub fn from_json_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json_str(&content)
    }
}

/// Returns the directory holding downloaded tool binaries (`~/.terraform.versions`).
pub fn binary_cache_dir() -> PathBuf {
    binary_cache_dir_with_home(dirs::home_dir())
}

/// Returns the directory holding downloaded provider plugins (`~/.terraform.d/plugin-cache`).
pub fn plugin_cache_dir() -> PathBuf {
    plugin_cache_dir_with_home(dirs::home_dir())
}

fn binary_cache_dir_with_home(home_dir: Option<PathBuf>) -> PathBuf {
    home_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".terraform.versions")
}

fn plugin_cache_dir_with_home(home_dir: Option<PathBuf>) -> PathBuf {
    home_dir
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".terraform.d")
        .join("plugin-cache")
}

/// Cache entry path of a tool binary version
pub fn tool_entry_path(binary_root: &Path, name: &str, version: &str) -> PathBuf {
    binary_root.join(format!("{name}_{version}"))
}

/// Cache entry path of a provider plugin version:
/// `<root>/<registry-host>/<source-address>/<version>/<os>_<arch>`
pub fn provider_entry_path(
    plugin_root: &Path,
    registry_host: &str,
    source_address: &str,
    version: &str,
    platform: &Platform,
) -> PathBuf {
    let mut path = plugin_root.join(registry_host);
    for segment in source_address.split('/').filter(|s| !s.is_empty()) {
        path.push(segment);
    }
    path.join(version).join(platform.triplet())
}
