//! Release index traits for listing versions and fetching artifacts

use std::path::Path;

#[cfg(test)]
use mockall::automock;

use crate::version::error::RegistryError;
use crate::version::platform::Platform;

/// One published release as reported by the index
#[derive(Debug, Clone, PartialEq, Eq, serde::Deserialize)]
pub struct ReleaseEntry {
    pub version: String,
    /// Pagination cursor for the following page
    #[serde(rename = "timestamp_created")]
    pub created_at: String,
}

/// Trait for querying an external release index
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ReleaseIndex: Send + Sync {
    /// Lists every published release of an artifact
    ///
    /// # Arguments
    /// * `artifact_name` - Release name (e.g., "terraform", "terraform-provider-aws")
    ///
    /// # Returns
    /// * `Ok(Vec<ReleaseEntry>)` - Releases in the order the index paginates them
    /// * `Err(RegistryError)` - If any page fails; nothing is returned partially
    async fn list_releases(&self, artifact_name: &str) -> Result<Vec<ReleaseEntry>, RegistryError>;

    /// Resolves the archive URL of the build matching `platform` exactly
    async fn resolve_build_url(
        &self,
        artifact_name: &str,
        version: &str,
        platform: &Platform,
    ) -> Result<String, RegistryError>;

    /// Lists every published version string of an artifact
    async fn list_versions(&self, artifact_name: &str) -> Result<Vec<String>, RegistryError> {
        Ok(self
            .list_releases(artifact_name)
            .await?
            .into_iter()
            .map(|release| release.version)
            .collect())
    }
}

/// Trait for fetching artifact archives
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait ArtifactDownloader: Send + Sync {
    /// Streams the resource at `url` into `dest`, returning the number of bytes written
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, RegistryError>;
}
