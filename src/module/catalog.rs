//! Catalog of locally available modules
//!
//! The catalog is built by scanning a repository for `metadata.json` files
//! describing where each module is published. Registry-style module
//! addresses (`host/organisation/name/provider`) that match a catalog entry
//! can then be redirected to the local copy.

use std::fmt;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::sync::RwLock;

use serde::Deserialize;
use tracing::{debug, info};
use walkdir::WalkDir;

use crate::config::{CatalogConfig, DEFAULT_ORGANISATION, METADATA_FILE_NAME};
use crate::module::error::CatalogError;

/// Identity of a published module
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleKey {
    pub organisation: String,
    pub name: String,
    pub provider: String,
}

impl fmt::Display for ModuleKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.organisation, self.name, self.provider)
    }
}

/// A module discovered in the repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleMetadata {
    pub organisation: String,
    pub name: String,
    pub provider: String,
    /// Directory holding the module's `metadata.json`
    pub local_path: PathBuf,
}

impl ModuleMetadata {
    pub fn key(&self) -> ModuleKey {
        ModuleKey {
            organisation: self.organisation.clone(),
            name: self.name.clone(),
            provider: self.provider.clone(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct MetadataFile {
    #[serde(default)]
    publish: Publish,
}

#[derive(Debug, Default, Deserialize)]
struct Publish {
    #[serde(default)]
    name: String,
    #[serde(default)]
    provider: String,
    #[serde(default)]
    organisation: String,
}

#[derive(Debug, Default)]
struct CatalogState {
    modules: Vec<ModuleMetadata>,
    initialized: bool,
}

/// Shared, lazily scanned module catalog.
///
/// Lookups take the read lock. The scan takes the write lock and runs at
/// most once unless [`MetadataCatalog::init`] is called explicitly.
#[derive(Debug)]
pub struct MetadataCatalog {
    root: PathBuf,
    default_organisation: String,
    state: RwLock<CatalogState>,
}

impl MetadataCatalog {
    pub fn new(root: impl Into<PathBuf>, default_organisation: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            default_organisation: default_organisation.into(),
            state: RwLock::new(CatalogState::default()),
        }
    }

    /// Catalog rooted at the configured directory, or at the enclosing git
    /// repository, or at the current directory.
    pub fn discover(config: &CatalogConfig) -> Self {
        let root = config
            .root
            .clone()
            .or_else(repository_root)
            .or_else(|| std::env::current_dir().ok())
            .unwrap_or_else(|| PathBuf::from("."));
        debug!(root = %root.display(), "Using module catalog root");
        Self::new(root, config.default_organisation.clone())
    }

    /// Catalog with a fixed set of modules and no scanning
    pub fn with_modules(modules: Vec<ModuleMetadata>) -> Self {
        Self {
            root: PathBuf::new(),
            default_organisation: DEFAULT_ORGANISATION.to_string(),
            state: RwLock::new(CatalogState {
                modules,
                initialized: true,
            }),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Rescan the root, replacing the current entries. Returns the number of
    /// modules found.
    pub fn init(&self) -> Result<usize, CatalogError> {
        let mut state = self.state.write().map_err(|_| CatalogError::LockPoisoned)?;
        self.scan_into(&mut state)
    }

    /// Local module for a `host/organisation/name/provider` source address.
    ///
    /// Surrounding spaces and quotes are ignored. Any other shape is simply
    /// not found, without scanning.
    pub fn resolve(&self, source: &str) -> Result<Option<ModuleMetadata>, CatalogError> {
        let parts: Vec<&str> = source.trim_matches(|c| c == ' ' || c == '"').split('/').collect();
        let [_, organisation, name, provider] = parts.as_slice() else {
            return Ok(None);
        };

        self.ensure_initialized()?;

        let state = self.state.read().map_err(|_| CatalogError::LockPoisoned)?;
        Ok(state
            .modules
            .iter()
            .find(|m| m.organisation == *organisation && m.name == *name && m.provider == *provider)
            .cloned())
    }

    /// Snapshot of all catalog entries, scanning first if needed
    pub fn modules(&self) -> Result<Vec<ModuleMetadata>, CatalogError> {
        self.ensure_initialized()?;
        let state = self.state.read().map_err(|_| CatalogError::LockPoisoned)?;
        Ok(state.modules.clone())
    }

    fn ensure_initialized(&self) -> Result<(), CatalogError> {
        {
            let state = self.state.read().map_err(|_| CatalogError::LockPoisoned)?;
            if state.initialized {
                return Ok(());
            }
        }

        let mut state = self.state.write().map_err(|_| CatalogError::LockPoisoned)?;
        if !state.initialized {
            self.scan_into(&mut state)?;
        }
        Ok(())
    }

    fn scan_into(&self, state: &mut CatalogState) -> Result<usize, CatalogError> {
        let modules = scan(&self.root, &self.default_organisation)?;
        info!(
            root = %self.root.display(),
            modules = modules.len(),
            "Scanned module catalog"
        );
        let count = modules.len();
        state.modules = modules;
        state.initialized = true;
        Ok(count)
    }
}

fn scan(root: &Path, default_organisation: &str) -> Result<Vec<ModuleMetadata>, CatalogError> {
    let mut modules = Vec::new();

    let walker = WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| entry.depth() == 0 || !is_hidden(entry.file_name()));

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() || entry.file_name() != METADATA_FILE_NAME {
            continue;
        }

        let path = entry.path();
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let metadata: MetadataFile =
            serde_json::from_str(&content).map_err(|source| CatalogError::Decode {
                path: path.to_path_buf(),
                source,
            })?;

        let Publish {
            name,
            provider,
            mut organisation,
        } = metadata.publish;
        if organisation.is_empty() {
            organisation = default_organisation.to_string();
        }

        let local_path = path.parent().map(Path::to_path_buf).unwrap_or_default();
        debug!(
            module = %format!("{organisation}/{name}/{provider}"),
            path = %local_path.display(),
            "Found module metadata"
        );
        modules.push(ModuleMetadata {
            organisation,
            name,
            provider,
            local_path,
        });
    }

    Ok(modules)
}

fn is_hidden(name: &std::ffi::OsStr) -> bool {
    name.to_string_lossy().starts_with('.')
}

/// Top-level directory of the enclosing git repository
fn repository_root() -> Option<PathBuf> {
    let output = Command::new("git")
        .args(["rev-parse", "--show-toplevel"])
        .output()
        .ok()?;
    if !output.status.success() {
        return None;
    }

    let root = String::from_utf8(output.stdout).ok()?;
    let root = root.trim();
    (!root.is_empty()).then(|| PathBuf::from(root))
}
