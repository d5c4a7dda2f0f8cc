//! HashiCorp releases API implementation

use std::path::Path;
use std::time::Duration;

use serde::Deserialize;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::{DEFAULT_RELEASES_URL, LIST_TIMEOUT_MS, RELEASES_PAGE_SIZE, ReleasesConfig};
use crate::version::error::RegistryError;
use crate::version::platform::Platform;
use crate::version::registry::{ArtifactDownloader, ReleaseEntry, ReleaseIndex};

/// Response from the per-version build descriptor endpoint
#[derive(Debug, Deserialize)]
struct ReleaseDescriptor {
    #[serde(default)]
    builds: Vec<Build>,
}

#[derive(Debug, Deserialize)]
struct Build {
    arch: String,
    os: String,
    url: String,
}

/// Release index implementation for the HashiCorp releases API
pub struct HashicorpReleases {
    client: reqwest::Client,
    base_url: String,
    page_size: u32,
    list_timeout: Duration,
    download_timeout: Option<Duration>,
}

impl HashicorpReleases {
    /// Creates a new HashicorpReleases with a custom base URL
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::builder()
                .user_agent("tfmatrix")
                .build()
                .expect("Failed to create HTTP client"),
            base_url: base_url.trim_end_matches('/').to_string(),
            page_size: RELEASES_PAGE_SIZE,
            list_timeout: Duration::from_millis(LIST_TIMEOUT_MS),
            download_timeout: None,
        }
    }

    pub fn from_config(config: &ReleasesConfig) -> Self {
        Self {
            page_size: config.page_size.max(1),
            list_timeout: Duration::from_millis(config.list_timeout_ms),
            download_timeout: config.download_timeout_ms.map(Duration::from_millis),
            ..Self::new(&config.base_url)
        }
    }

    async fn fetch_page(
        &self,
        artifact_name: &str,
        cursor: Option<&str>,
    ) -> Result<Vec<ReleaseEntry>, RegistryError> {
        let base = format!("{}/{}", self.base_url, artifact_name);
        let mut params = vec![("limit", self.page_size.to_string())];
        if let Some(after) = cursor {
            params.push(("after", after.to_string()));
        }
        let url = reqwest::Url::parse_with_params(&base, &params)
            .map_err(|e| RegistryError::InvalidUrl(format!("{base}: {e}")))?
            .to_string();

        let response = self
            .client
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(artifact_name.to_string()));
        }

        if !status.is_success() {
            warn!("Release index returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let body = response.text().await?;
        serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse release listing: {}", e);
            RegistryError::Decode {
                url,
                message: e.to_string(),
            }
        })
    }
}

impl Default for HashicorpReleases {
    fn default() -> Self {
        Self::new(DEFAULT_RELEASES_URL)
    }
}

#[async_trait::async_trait]
impl ReleaseIndex for HashicorpReleases {
    async fn list_releases(&self, artifact_name: &str) -> Result<Vec<ReleaseEntry>, RegistryError> {
        let mut releases: Vec<ReleaseEntry> = Vec::new();
        let mut cursor: Option<String> = None;

        loop {
            let page = self.fetch_page(artifact_name, cursor.as_deref()).await?;

            let Some(last) = page.last() else {
                break;
            };
            cursor = Some(last.created_at.clone());

            debug!(
                artifact = %artifact_name,
                count = page.len(),
                "Fetched release page"
            );
            releases.extend(page);
        }

        debug!(
            artifact = %artifact_name,
            total = releases.len(),
            "Listed releases"
        );
        Ok(releases)
    }

    async fn resolve_build_url(
        &self,
        artifact_name: &str,
        version: &str,
        platform: &Platform,
    ) -> Result<String, RegistryError> {
        let url = format!("{}/{}/{}", self.base_url, artifact_name, version);

        let response = self
            .client
            .get(&url)
            .timeout(self.list_timeout)
            .send()
            .await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(format!("{artifact_name} {version}")));
        }

        if !status.is_success() {
            warn!("Release index returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let body = response.text().await?;
        let descriptor: ReleaseDescriptor = serde_json::from_str(&body).map_err(|e| {
            warn!("Failed to parse release descriptor: {}", e);
            RegistryError::Decode {
                url: url.clone(),
                message: e.to_string(),
            }
        })?;

        descriptor
            .builds
            .into_iter()
            .find(|build| build.os == platform.os && build.arch == platform.arch)
            .map(|build| build.url)
            .ok_or_else(|| {
                RegistryError::NotFound(format!(
                    "no {artifact_name} {version} build for {platform}"
                ))
            })
    }
}

#[async_trait::async_trait]
impl ArtifactDownloader for HashicorpReleases {
    async fn download(&self, url: &str, dest: &Path) -> Result<u64, RegistryError> {
        debug!(%url, ?dest, "Downloading artifact");

        let mut request = self.client.get(url);
        if let Some(timeout) = self.download_timeout {
            request = request.timeout(timeout);
        }

        let mut response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::NOT_FOUND {
            return Err(RegistryError::NotFound(url.to_string()));
        }

        if !status.is_success() {
            warn!("Artifact download returned status {}: {}", status, url);
            return Err(RegistryError::InvalidResponse(format!(
                "Unexpected status: {}",
                status
            )));
        }

        let mut file = tokio::fs::File::create(dest).await?;
        let mut written = 0u64;
        while let Some(chunk) = response.chunk().await? {
            file.write_all(&chunk).await?;
            written += chunk.len() as u64;
        }
        file.flush().await?;

        Ok(written)
    }
}
