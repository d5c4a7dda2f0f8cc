//! Module localization against an on-disk catalog

mod helper;

use std::fs;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use helper::{write_file, write_metadata};
use tfmatrix::config::DEFAULT_ORGANISATION;
use tfmatrix::module::{LocalizeError, MetadataCatalog, ModuleLocalizer, copy_module_to_temp};
use tfmatrix::parser::ConfigRewriter;

fn catalog(root: &Path) -> Arc<MetadataCatalog> {
    Arc::new(MetadataCatalog::new(root, DEFAULT_ORGANISATION))
}

#[test]
fn local_only_tree_is_left_unchanged() {
    let repo = TempDir::new().unwrap();
    write_metadata(repo.path(), "modules/vpc", "vpc", "aws", "acme");
    let content = r#"module "vpc" {
  source = "../modules/vpc"
}

module "other_registry" {
  source  = "terraform-aws-modules/vpc/aws"
  version = "5.0.0"
}
"#;
    write_file(repo.path(), "stack/main.tf", content);

    let temp_root = TempDir::new().unwrap();
    let localizer = ModuleLocalizer::new(catalog(repo.path()), "TestLocal", temp_root.path());

    let written = localizer.localize(&repo.path().join("stack")).unwrap();

    assert_eq!(written, 0);
    assert_eq!(
        fs::read_to_string(repo.path().join("stack/main.tf")).unwrap(),
        content
    );
    assert_eq!(fs::read_dir(temp_root.path()).unwrap().count(), 0);
}

#[test]
fn working_copy_is_localized_without_touching_the_source() {
    let repo = TempDir::new().unwrap();
    write_metadata(repo.path(), "modules/dns", "dns", "cloudflare", "");
    write_file(repo.path(), "modules/dns/main.tf", "variable \"zone\" {}\n");
    let content = r#"module "dns" {
  source  = "app.terraform.io/ovotech/dns/cloudflare"
  version = "2.1.0"
  zone    = "example.com"
}
"#;
    write_file(repo.path(), "stack/main.tf", content);

    let temp_root = TempDir::new().unwrap();
    let work = copy_module_to_temp(
        &repo.path().join("stack"),
        "TestDns/1.5.0",
        temp_root.path(),
    )
    .unwrap();
    let localizer = ModuleLocalizer::new(catalog(repo.path()), "TestDns/1.5.0", temp_root.path());

    assert_eq!(localizer.localize(&work).unwrap(), 1);

    let rewritten = fs::read_to_string(work.join("main.tf")).unwrap();
    assert!(!rewritten.contains("version"));
    assert!(rewritten.contains("  zone    = \"example.com\"\n"));

    let source = ConfigRewriter::default()
        .extract_attribute(&work, &["module"], "source", None)
        .unwrap();
    let copy = Path::new(&source);
    assert!(copy.starts_with(temp_root.path()));
    assert!(
        copy.file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with("1.5.0-")
    );
    assert!(copy.join("main.tf").is_file());

    assert_eq!(
        fs::read_to_string(repo.path().join("stack/main.tf")).unwrap(),
        content
    );
}

#[test]
fn cyclic_catalog_fails_fast() {
    let repo = TempDir::new().unwrap();
    write_metadata(repo.path(), "modules/loop", "loop", "aws", "acme");
    write_file(
        repo.path(),
        "modules/loop/main.tf",
        "module \"again\" {\n  source = \"app.terraform.io/acme/loop/aws\"\n}\n",
    );
    write_file(
        repo.path(),
        "stack/main.tf",
        "module \"loop\" {\n  source = \"app.terraform.io/acme/loop/aws\"\n}\n",
    );

    let temp_root = TempDir::new().unwrap();
    let localizer = ModuleLocalizer::new(catalog(repo.path()), "TestLoop", temp_root.path());

    let result = localizer.localize(&repo.path().join("stack"));

    assert!(matches!(result, Err(LocalizeError::CycleDetected { .. })));
}

#[test]
fn unparsable_module_aborts_localization() {
    let repo = TempDir::new().unwrap();
    write_file(repo.path(), "stack/main.tf", "module \"broken\" {\n  source = \n");

    let temp_root = TempDir::new().unwrap();
    let localizer = ModuleLocalizer::new(catalog(repo.path()), "TestBroken", temp_root.path());

    let result = localizer.localize(&repo.path().join("stack"));

    assert!(matches!(result, Err(LocalizeError::Rewrite(_))));
}
