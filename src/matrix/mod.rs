//! Per-version test driver
//!
//! A [`VersionMatrix`] turns a module's declared constraints into a list of
//! versions and runs one independent unit per version. Each unit gets its
//! own localized working copy and hands it to a [`TestHarness`]. A failing
//! unit is reported in the [`MatrixReport`] without affecting its siblings.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use indexmap::IndexMap;
#[cfg(test)]
use mockall::automock;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::config::{MatrixConfig, PROVIDER_RELEASE_PREFIX, TOOL_NAME, VersionsConfig};
use crate::error::Error;
use crate::module::{MetadataCatalog, ModuleLocalizer, copy_module_to_temp};
use crate::parser::ConfigRewriter;
use crate::version::cache::ArtifactCache;
use crate::version::matcher::matching;
use crate::version::registries::HashicorpReleases;
use crate::version::registry::ReleaseIndex;
use crate::version::semver::{filter_blocked, group_by_minor};

/// Everything a harness needs to run one version
#[derive(Debug, Clone, PartialEq)]
pub struct TestRun {
    /// `<test name>/<version>`
    pub name: String,
    pub version: String,
    /// Localized working copy of the module
    pub working_dir: PathBuf,
    /// Tool binary to run, when the unit pins the tool version
    pub binary: Option<PathBuf>,
    /// Shared plugin cache, when the unit pins a provider version
    pub plugin_cache_dir: Option<PathBuf>,
    pub vars: IndexMap<String, serde_json::Value>,
    pub env: IndexMap<String, String>,
}

/// External workflow run against a prepared working copy
#[cfg_attr(test, automock)]
#[async_trait::async_trait]
pub trait TestHarness: Send + Sync {
    /// Initialize the working directory and produce a plan
    async fn init_and_plan(&self, run: &TestRun) -> anyhow::Result<()>;
}

/// Options shared by every unit of a matrix run
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Prefix of each unit's name; the version is appended
    pub test_name: String,
    pub vars: IndexMap<String, serde_json::Value>,
    pub env: IndexMap<String, String>,
    /// Where working copies are created (system temp directory by default)
    pub temp_root: Option<PathBuf>,
}

/// Result of one version unit
#[derive(Debug, Clone, PartialEq)]
pub struct UnitOutcome {
    pub version: String,
    pub working_dir: Option<PathBuf>,
    pub error: Option<String>,
}

impl UnitOutcome {
    pub fn passed(&self) -> bool {
        self.error.is_none()
    }
}

/// Outcomes of a matrix run, in version order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MatrixReport {
    pub outcomes: Vec<UnitOutcome>,
}

impl MatrixReport {
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(UnitOutcome::passed)
    }

    pub fn failures(&self) -> impl Iterator<Item = &UnitOutcome> {
        self.outcomes.iter().filter(|o| !o.passed())
    }
}

#[derive(Debug, Clone)]
enum UnitKind {
    Tool,
    Provider { name: String, source: String },
}

/// Version matrix driver
#[derive(Clone)]
pub struct VersionMatrix {
    index: Arc<dyn ReleaseIndex>,
    cache: Arc<ArtifactCache>,
    catalog: Arc<MetadataCatalog>,
    rewriter: ConfigRewriter,
    versions: VersionsConfig,
}

impl VersionMatrix {
    pub fn new(
        index: Arc<dyn ReleaseIndex>,
        cache: Arc<ArtifactCache>,
        catalog: Arc<MetadataCatalog>,
        versions: VersionsConfig,
    ) -> Self {
        Self {
            index,
            cache,
            catalog,
            rewriter: ConfigRewriter::default(),
            versions,
        }
    }

    /// Driver backed by the public release index
    pub fn from_config(config: &MatrixConfig) -> Self {
        let releases = Arc::new(HashicorpReleases::from_config(&config.releases));
        let cache = ArtifactCache::new(releases.clone(), releases.clone(), &config.cache);
        Self::new(
            releases,
            Arc::new(cache),
            Arc::new(MetadataCatalog::discover(&config.catalog)),
            config.versions.clone(),
        )
    }

    pub fn catalog(&self) -> &Arc<MetadataCatalog> {
        &self.catalog
    }

    pub fn cache(&self) -> &Arc<ArtifactCache> {
        &self.cache
    }

    /// Released tool versions satisfying the module's `required_version`
    pub async fn tool_versions(&self, dir: &Path) -> Result<Vec<String>, Error> {
        let constraint = self.rewriter.required_version(dir)?;
        self.versions_for(TOOL_NAME, &constraint).await
    }

    /// Released versions of `provider` satisfying the module's requirement
    pub async fn provider_versions(&self, dir: &Path, provider: &str) -> Result<Vec<String>, Error> {
        let constraint = self.rewriter.provider_constraint(dir, provider)?;
        self.versions_for(&format!("{PROVIDER_RELEASE_PREFIX}{provider}"), &constraint)
            .await
    }

    async fn versions_for(&self, release: &str, constraint: &str) -> Result<Vec<String>, Error> {
        let available = self.index.list_versions(release).await?;
        let matched = matching(constraint, &available)?;
        let mut versions = filter_blocked(&matched, &self.versions.blocked);
        if self.versions.group_by_minor {
            versions = group_by_minor(&versions)?;
        }

        info!(
            release,
            constraint,
            available = available.len(),
            selected = versions.len(),
            "Resolved version matrix"
        );
        Ok(versions)
    }

    /// Download every provider version the module accepts into the plugin cache
    pub async fn download_required_providers(
        &self,
        dir: &Path,
        provider: &str,
    ) -> Result<Vec<PathBuf>, Error> {
        let versions = self.provider_versions(dir, provider).await?;
        let source = self.rewriter.provider_source(dir, provider)?;

        let downloads = versions
            .iter()
            .map(|version| self.cache.ensure_provider(provider, version, &source));
        Ok(futures::future::try_join_all(downloads).await?)
    }

    /// Run the module against every matching tool version
    pub async fn run_tool_matrix(
        &self,
        src: &Path,
        harness: Arc<dyn TestHarness>,
        options: &RunOptions,
    ) -> Result<MatrixReport, Error> {
        let versions = self.tool_versions(src).await?;
        Ok(self.run_units(versions, UnitKind::Tool, src, harness, options).await)
    }

    /// Run the module against every matching version of `provider`, pinning
    /// it to `source` in each working copy
    pub async fn run_provider_matrix(
        &self,
        src: &Path,
        provider: &str,
        source: &str,
        harness: Arc<dyn TestHarness>,
        options: &RunOptions,
    ) -> Result<MatrixReport, Error> {
        let versions = self.provider_versions(src, provider).await?;
        let kind = UnitKind::Provider {
            name: provider.to_string(),
            source: source.to_string(),
        };
        Ok(self.run_units(versions, kind, src, harness, options).await)
    }

    async fn run_units(
        &self,
        versions: Vec<String>,
        kind: UnitKind,
        src: &Path,
        harness: Arc<dyn TestHarness>,
        options: &RunOptions,
    ) -> MatrixReport {
        let semaphore = self
            .versions
            .max_parallel
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));

        let mut units = JoinSet::new();
        let mut pending = HashMap::new();

        for (position, version) in versions.iter().enumerate() {
            let matrix = self.clone();
            let kind = kind.clone();
            let src = src.to_path_buf();
            let harness = Arc::clone(&harness);
            let options = options.clone();
            let semaphore = semaphore.clone();
            let unit_version = version.clone();

            let handle = units.spawn(async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                info!(version = %unit_version, "Starting unit");
                let result = matrix
                    .run_unit(&kind, &unit_version, &src, harness.as_ref(), &options)
                    .await;

                let outcome = match result {
                    Ok(working_dir) => {
                        info!(version = %unit_version, "Unit passed");
                        UnitOutcome {
                            version: unit_version,
                            working_dir: Some(working_dir),
                            error: None,
                        }
                    }
                    Err(e) => {
                        warn!(version = %unit_version, "Unit failed: {}", e);
                        UnitOutcome {
                            version: unit_version,
                            working_dir: None,
                            error: Some(e.to_string()),
                        }
                    }
                };
                (position, outcome)
            });
            pending.insert(handle.id(), (position, version.clone()));
        }

        let mut outcomes = Vec::with_capacity(versions.len());
        while let Some(joined) = units.join_next_with_id().await {
            match joined {
                Ok((id, result)) => {
                    pending.remove(&id);
                    outcomes.push(result);
                }
                Err(e) => {
                    if let Some((position, version)) = pending.remove(&e.id()) {
                        warn!(%version, "Unit aborted: {}", e);
                        outcomes.push((
                            position,
                            UnitOutcome {
                                version,
                                working_dir: None,
                                error: Some(e.to_string()),
                            },
                        ));
                    }
                }
            }
        }

        outcomes.sort_by_key(|(position, _)| *position);
        MatrixReport {
            outcomes: outcomes.into_iter().map(|(_, outcome)| outcome).collect(),
        }
    }

    async fn run_unit(
        &self,
        kind: &UnitKind,
        version: &str,
        src: &Path,
        harness: &dyn TestHarness,
        options: &RunOptions,
    ) -> Result<PathBuf, Error> {
        let name = format!("{}/{}", options.test_name, version);
        let temp_root = options.temp_root.clone().unwrap_or_else(std::env::temp_dir);

        let working_dir = {
            let src = src.to_path_buf();
            let name = name.clone();
            let catalog = Arc::clone(&self.catalog);
            let rewriter = self.rewriter.clone();
            let kind = kind.clone();
            let version = version.to_string();

            tokio::task::spawn_blocking(move || -> Result<PathBuf, Error> {
                let dst = copy_module_to_temp(&src, &name, &temp_root)?;
                ModuleLocalizer::new(catalog, name, temp_root)
                    .with_rewriter(rewriter.clone())
                    .localize(&dst)?;
                if let UnitKind::Provider { name, source } = &kind {
                    rewriter.set_required_provider_version(&dst, name, &version, source)?;
                }
                Ok(dst)
            })
            .await??
        };
        debug!(%version, working_dir = %working_dir.display(), "Prepared working copy");

        let (binary, plugin_cache_dir) = match kind {
            UnitKind::Tool => (Some(self.cache.ensure_tool(TOOL_NAME, version).await?), None),
            UnitKind::Provider { .. } => (None, Some(self.cache.plugin_root().to_path_buf())),
        };

        let run = TestRun {
            name,
            version: version.to_string(),
            working_dir: working_dir.clone(),
            binary,
            plugin_cache_dir,
            vars: options.vars.clone(),
            env: options.env.clone(),
        };
        harness.init_and_plan(&run).await.map_err(Error::Harness)?;

        Ok(working_dir)
    }
}
