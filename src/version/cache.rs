//! On-disk artifact cache for tool binaries and provider plugins
//!
//! Entries are keyed by a deterministic directory derived from the artifact,
//! version and platform. A provider entry is a hit when the directory exists;
//! a tool entry additionally needs its executable inside. Anything else found
//! at the entry path, such as a bare binary file left by an older layout, is
//! replaced. A miss resolves the build URL, downloads the archive to a
//! temporary file, extracts it into a staging directory next to the final
//! path and renames the staging directory into place.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tracing::{debug, info, warn};

use crate::config::{CacheConfig, PROVIDER_RELEASE_PREFIX, provider_entry_path, tool_entry_path};
use crate::version::archive::extract_zip;
use crate::version::error::ArtifactError;
use crate::version::platform::Platform;
use crate::version::registry::{ArtifactDownloader, ReleaseIndex};

/// What to fetch into the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// Tool executable released as `<name>`
    Tool { name: String },
    /// Provider plugin released as `terraform-provider-<name>`, stored under
    /// its registry source address (e.g., "hashicorp/aws")
    Provider { name: String, source_address: String },
}

impl Artifact {
    pub fn tool(name: &str) -> Self {
        Artifact::Tool {
            name: name.to_string(),
        }
    }

    pub fn provider(name: &str, source_address: &str) -> Self {
        Artifact::Provider {
            name: name.to_string(),
            source_address: source_address.to_string(),
        }
    }

    /// Name of the artifact in the release index
    pub fn release_name(&self) -> String {
        match self {
            Artifact::Tool { name } => name.clone(),
            Artifact::Provider { name, .. } => format!("{PROVIDER_RELEASE_PREFIX}{name}"),
        }
    }
}

pub struct ArtifactCache {
    index: Arc<dyn ReleaseIndex>,
    downloader: Arc<dyn ArtifactDownloader>,
    binary_root: PathBuf,
    plugin_root: PathBuf,
    registry_host: String,
    platform: Platform,
    locks: Mutex<HashMap<PathBuf, Arc<tokio::sync::Mutex<()>>>>,
}

impl ArtifactCache {
    pub fn new(
        index: Arc<dyn ReleaseIndex>,
        downloader: Arc<dyn ArtifactDownloader>,
        config: &CacheConfig,
    ) -> Self {
        Self {
            index,
            downloader,
            binary_root: config.binary_root(),
            plugin_root: config.plugin_root(),
            registry_host: config.registry_host.clone(),
            platform: Platform::current(),
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Override the platform used for build selection and cache keys
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Plugin cache root, suitable for `TF_PLUGIN_CACHE_DIR`
    pub fn plugin_root(&self) -> &Path {
        &self.plugin_root
    }

    /// Whether `entry` holds a complete copy of `artifact`
    fn is_cached(artifact: &Artifact, entry: &Path) -> bool {
        match artifact {
            Artifact::Tool { name } => entry.join(executable_name(name)).is_file(),
            Artifact::Provider { .. } => entry.is_dir(),
        }
    }

    /// Deterministic cache entry directory of an artifact version
    pub fn entry_path(&self, artifact: &Artifact, version: &str) -> PathBuf {
        match artifact {
            Artifact::Tool { name } => tool_entry_path(&self.binary_root, name, version),
            Artifact::Provider { source_address, .. } => provider_entry_path(
                &self.plugin_root,
                &self.registry_host,
                source_address,
                version,
                &self.platform,
            ),
        }
    }

    /// Path of a ready-to-execute tool binary, downloading it on a miss
    pub async fn ensure_tool(&self, name: &str, version: &str) -> Result<PathBuf, ArtifactError> {
        let entry = self.ensure(&Artifact::tool(name), version).await?;
        Ok(entry.join(executable_name(name)))
    }

    /// Plugin directory of a provider version, downloading it on a miss
    pub async fn ensure_provider(
        &self,
        name: &str,
        version: &str,
        source_address: &str,
    ) -> Result<PathBuf, ArtifactError> {
        self.ensure(&Artifact::provider(name, source_address), version)
            .await
    }

    /// Return the cache entry of `artifact` at `version`, populating it on a miss.
    ///
    /// Concurrent callers for the same entry are serialized in-process, so
    /// only the first one downloads.
    pub async fn ensure(&self, artifact: &Artifact, version: &str) -> Result<PathBuf, ArtifactError> {
        let entry = self.entry_path(artifact, version);

        if Self::is_cached(artifact, &entry) {
            debug!(?entry, "Artifact already cached");
            return Ok(entry);
        }

        let lock = self.key_lock(&entry);
        let result = {
            let _guard = lock.lock().await;
            self.populate(artifact, version, &entry).await
        };
        self.release_key_lock(&entry, lock);
        result
    }

    async fn populate(
        &self,
        artifact: &Artifact,
        version: &str,
        entry: &Path,
    ) -> Result<PathBuf, ArtifactError> {
        if Self::is_cached(artifact, entry) {
            debug!(?entry, "Artifact cached by a concurrent caller");
            return Ok(entry.to_path_buf());
        }
        if let Ok(metadata) = std::fs::symlink_metadata(entry) {
            warn!(?entry, "Replacing incomplete cache entry");
            let removed = if metadata.is_dir() {
                std::fs::remove_dir_all(entry)
            } else {
                std::fs::remove_file(entry)
            };
            removed.map_err(|e| ArtifactError::io(entry, e))?;
        }

        let release_name = artifact.release_name();
        info!(
            artifact = %release_name,
            %version,
            platform = %self.platform,
            "Downloading artifact"
        );

        let url = self
            .index
            .resolve_build_url(&release_name, version, &self.platform)
            .await?;

        let parent = entry
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        std::fs::create_dir_all(&parent).map_err(|e| ArtifactError::io(&parent, e))?;

        // Both guards delete their path on drop unless kept.
        let archive = tempfile::Builder::new()
            .prefix(".download-")
            .suffix(".zip")
            .tempfile_in(&parent)
            .map_err(|e| ArtifactError::io(&parent, e))?;
        let staging = tempfile::Builder::new()
            .prefix(".staging-")
            .tempdir_in(&parent)
            .map_err(|e| ArtifactError::io(&parent, e))?;

        let bytes = self.downloader.download(&url, archive.path()).await?;
        debug!(%url, bytes, "Downloaded archive");

        let archive_path = archive.path().to_path_buf();
        let staging_path = staging.path().to_path_buf();
        tokio::task::spawn_blocking(move || -> Result<(), ArtifactError> {
            let file = std::fs::File::open(&archive_path)
                .map_err(|e| ArtifactError::io(&archive_path, e))?;
            extract_zip(std::io::BufReader::new(file), &staging_path)
        })
        .await??;

        if let Artifact::Tool { name } = artifact {
            let executable = executable_name(name);
            if !staging.path().join(&executable).is_file() {
                return Err(ArtifactError::MissingExecutable {
                    artifact: release_name,
                    version: version.to_string(),
                    executable,
                });
            }
        }

        let staged = staging.keep();
        if let Err(e) = std::fs::rename(&staged, entry) {
            let _ = std::fs::remove_dir_all(&staged);
            if Self::is_cached(artifact, entry) {
                warn!(?entry, "Cache entry appeared during extraction, keeping existing");
                return Ok(entry.to_path_buf());
            }
            return Err(ArtifactError::io(entry, e));
        }

        info!(?entry, "Artifact cached");
        Ok(entry.to_path_buf())
    }

    fn key_lock(&self, entry: &Path) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        locks.entry(entry.to_path_buf()).or_default().clone()
    }

    /// Drop the per-entry lock once no other caller holds or awaits it
    fn release_key_lock(&self, entry: &Path, lock: Arc<tokio::sync::Mutex<()>>) {
        let mut locks = self
            .locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // One reference in the map, one held here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(entry);
        }
    }
}

fn executable_name(name: &str) -> String {
    if cfg!(windows) {
        format!("{name}.exe")
    } else {
        name.to_string()
    }
}
