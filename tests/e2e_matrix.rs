//! Release index to test harness, end to end against a mock index

mod helper;

use std::path::Path;
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use helper::{ReleaseServer, build_zip, write_file, write_metadata};
use tfmatrix::config::{CacheConfig, DEFAULT_ORGANISATION, VersionsConfig};
use tfmatrix::matrix::{RunOptions, TestHarness, TestRun, VersionMatrix};
use tfmatrix::module::MetadataCatalog;
use tfmatrix::parser::ConfigRewriter;
use tfmatrix::version::cache::ArtifactCache;
use tfmatrix::version::platform::Platform;
use tfmatrix::version::registries::HashicorpReleases;

fn platform() -> Platform {
    Platform::new("linux", "amd64")
}

fn cache_config(root: &Path) -> CacheConfig {
    CacheConfig {
        binary_dir: Some(root.join("versions")),
        plugin_dir: Some(root.join("plugin-cache")),
        registry_host: "registry.terraform.io".to_string(),
    }
}

fn build_matrix(url: &str, cache_root: &Path, catalog: MetadataCatalog) -> VersionMatrix {
    let releases = Arc::new(HashicorpReleases::new(url));
    let cache = ArtifactCache::new(releases.clone(), releases.clone(), &cache_config(cache_root))
        .with_platform(platform());
    VersionMatrix::new(
        releases,
        Arc::new(cache),
        Arc::new(catalog),
        VersionsConfig::default(),
    )
}

/// Harness recording every run it receives
#[derive(Default)]
struct RecordingHarness {
    runs: Mutex<Vec<TestRun>>,
}

#[async_trait::async_trait]
impl TestHarness for RecordingHarness {
    async fn init_and_plan(&self, run: &TestRun) -> anyhow::Result<()> {
        anyhow::ensure!(
            run.binary.as_ref().is_some_and(|b| b.is_file()),
            "missing binary for {}",
            run.version
        );
        self.runs.lock().unwrap().push(run.clone());
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn ensure_tool_downloads_once_and_then_hits_cache() {
    let mut server = ReleaseServer::start().await;
    let (descriptor, archive) = server
        .with_build(
            "terraform",
            "1.5.7",
            &platform(),
            build_zip(&[("terraform", "#!/bin/sh\necho 1.5.7\n")]),
        )
        .await;

    let cache_root = TempDir::new().unwrap();
    let releases = Arc::new(HashicorpReleases::new(&server.url()));
    let cache = ArtifactCache::new(releases.clone(), releases, &cache_config(cache_root.path()))
        .with_platform(platform());

    let first = cache.ensure_tool("terraform", "1.5.7").await.unwrap();
    let second = cache.ensure_tool("terraform", "1.5.7").await.unwrap();

    assert_eq!(first, second);
    assert_eq!(
        first,
        cache_root.path().join("versions/terraform_1.5.7/terraform")
    );
    assert!(first.is_file());
    descriptor.assert_async().await;
    archive.assert_async().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn ensure_provider_uses_plugin_cache_layout() {
    let mut server = ReleaseServer::start().await;
    let _build = server
        .with_build(
            "terraform-provider-aws",
            "5.31.0",
            &platform(),
            build_zip(&[("terraform-provider-aws_v5.31.0_x5", "binary")]),
        )
        .await;

    let cache_root = TempDir::new().unwrap();
    let releases = Arc::new(HashicorpReleases::new(&server.url()));
    let cache = ArtifactCache::new(releases.clone(), releases, &cache_config(cache_root.path()))
        .with_platform(platform());

    let entry = cache
        .ensure_provider("aws", "5.31.0", "hashicorp/aws")
        .await
        .unwrap();

    assert_eq!(
        entry,
        cache_root
            .path()
            .join("plugin-cache/registry.terraform.io/hashicorp/aws/5.31.0/linux_amd64")
    );
    assert!(entry.join("terraform-provider-aws_v5.31.0_x5").is_file());
}

#[tokio::test(flavor = "multi_thread")]
async fn run_tool_matrix_localizes_and_runs_every_matching_version() {
    let mut server = ReleaseServer::start().await;
    let _listing = server
        .with_listing("terraform", &["1.6.0", "1.5.7", "1.4.6", "1.3.9"])
        .await;
    let mut _builds = Vec::new();
    for version in ["1.5.7", "1.4.6"] {
        let build = server
            .with_build(
                "terraform",
                version,
                &platform(),
                build_zip(&[("terraform", version)]),
            )
            .await;
        _builds.push(build);
    }

    let repo = TempDir::new().unwrap();
    write_metadata(repo.path(), "modules/network", "network", "aws", "acme");
    write_file(
        repo.path(),
        "modules/network/main.tf",
        "variable \"cidr\" {}\n",
    );
    write_file(
        repo.path(),
        "stacks/app/main.tf",
        r#"terraform {
  required_version = ">= 1.4.0, < 1.6.0"
}

module "network" {
  source  = "app.terraform.io/acme/network/aws"
  version = "~> 1.0"
}
"#,
    );
    let src = repo.path().join("stacks/app");
    let original = std::fs::read_to_string(src.join("main.tf")).unwrap();

    let cache_root = TempDir::new().unwrap();
    let temp_root = TempDir::new().unwrap();
    let matrix = build_matrix(
        &server.url(),
        cache_root.path(),
        MetadataCatalog::new(repo.path(), DEFAULT_ORGANISATION),
    );
    let harness = Arc::new(RecordingHarness::default());
    let options = RunOptions {
        test_name: "TestStack".to_string(),
        temp_root: Some(temp_root.path().to_path_buf()),
        ..Default::default()
    };

    let report = matrix
        .run_tool_matrix(&src, harness.clone(), &options)
        .await
        .unwrap();

    assert!(report.is_success(), "{:?}", report);
    let versions: Vec<&str> = report.outcomes.iter().map(|o| o.version.as_str()).collect();
    assert_eq!(versions, vec!["1.4.6", "1.5.7"]);

    let rewriter = ConfigRewriter::default();
    let runs = harness.runs.lock().unwrap();
    assert_eq!(runs.len(), 2);
    for run in runs.iter() {
        assert!(run.working_dir.starts_with(temp_root.path()));
        let source = rewriter
            .extract_attribute(&run.working_dir, &["module"], "source", None)
            .unwrap();
        assert!(Path::new(&source).starts_with(temp_root.path()));
        assert!(Path::new(&source).join("main.tf").is_file());
    }

    assert_eq!(
        std::fs::read_to_string(src.join("main.tf")).unwrap(),
        original
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn listing_failure_aborts_before_any_unit() {
    let mut server = ReleaseServer::start().await;
    let _failure = server
        .server
        .mock("GET", "/terraform")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let repo = TempDir::new().unwrap();
    write_file(
        repo.path(),
        "main.tf",
        "terraform {\n  required_version = \">= 1.0.0\"\n}\n",
    );

    let cache_root = TempDir::new().unwrap();
    let matrix = build_matrix(
        &server.url(),
        cache_root.path(),
        MetadataCatalog::with_modules(Vec::new()),
    );
    let harness = Arc::new(RecordingHarness::default());

    let result = matrix
        .run_tool_matrix(repo.path(), harness.clone(), &RunOptions::default())
        .await;

    assert!(result.is_err());
    assert!(harness.runs.lock().unwrap().is_empty());
}
