//! Redirects registry module references to isolated local copies

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::module::catalog::{MetadataCatalog, ModuleKey};
use crate::module::copy::copy_module_to_temp;
use crate::module::error::LocalizeError;
use crate::parser::rewriter::ConfigRewriter;

/// Localizes the module references of one test's working copy.
///
/// Every `module` block whose source resolves in the catalog is pointed at
/// a fresh copy of the local module, which is localized in turn. Any error
/// aborts the whole localization.
pub struct ModuleLocalizer {
    catalog: Arc<MetadataCatalog>,
    rewriter: ConfigRewriter,
    test_name: String,
    temp_root: PathBuf,
}

impl ModuleLocalizer {
    pub fn new(
        catalog: Arc<MetadataCatalog>,
        test_name: impl Into<String>,
        temp_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            catalog,
            rewriter: ConfigRewriter::default(),
            test_name: test_name.into(),
            temp_root: temp_root.into(),
        }
    }

    pub fn with_rewriter(mut self, rewriter: ConfigRewriter) -> Self {
        self.rewriter = rewriter;
        self
    }

    /// Localize `dir` and every module copied on its behalf. Returns the
    /// number of files rewritten across the whole tree.
    pub fn localize(&self, dir: &Path) -> Result<usize, LocalizeError> {
        let mut chain = Vec::new();
        self.localize_dir(dir, &mut chain)
    }

    fn localize_dir(&self, dir: &Path, chain: &mut Vec<ModuleKey>) -> Result<usize, LocalizeError> {
        let mut nested_written = 0;

        let written = self.rewriter.for_each_file(dir, |_, file| {
            for block in file.blocks_of_kind_mut("module") {
                if block.labels().len() != 1 {
                    continue;
                }
                let Some(source) = block.attribute("source").map(|a| a.expression().to_string())
                else {
                    continue;
                };
                let Some(metadata) = self.catalog.resolve(&source)? else {
                    continue;
                };

                let key = metadata.key();
                if chain.contains(&key) {
                    let mut cycle: Vec<String> = chain.iter().map(ToString::to_string).collect();
                    cycle.push(key.to_string());
                    return Err(LocalizeError::CycleDetected {
                        chain: cycle.join(" -> "),
                    });
                }

                let target =
                    copy_module_to_temp(&metadata.local_path, &self.test_name, &self.temp_root)?;

                chain.push(key);
                let nested = self.localize_dir(&target, chain);
                chain.pop();
                nested_written += nested?;

                info!(
                    module = %block.labels()[0],
                    from = %source.trim_matches('"'),
                    to = %target.display(),
                    "Localized module reference"
                );
                block.set_attribute_string("source", &target.to_string_lossy());
                block.remove_attribute("version");
            }
            Ok(())
        })?;

        Ok(written + nested_written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::catalog::ModuleMetadata;
    use std::fs;
    use tempfile::TempDir;

    fn module(name: &str, local_path: &Path) -> ModuleMetadata {
        ModuleMetadata {
            organisation: "acme".to_string(),
            name: name.to_string(),
            provider: "aws".to_string(),
            local_path: local_path.to_path_buf(),
        }
    }

    fn write_tf(dir: &Path, content: &str) {
        fs::create_dir_all(dir).unwrap();
        fs::write(dir.join("main.tf"), content).unwrap();
    }

    #[test]
    fn rewrites_resolved_references_recursively() {
        let repo = TempDir::new().unwrap();
        let vpc = repo.path().join("vpc");
        let subnet = repo.path().join("subnet");
        write_tf(
            &vpc,
            "module \"subnet\" {\n  source  = \"app.terraform.io/acme/subnet/aws\"\n  version = \"0.1.0\"\n}\n",
        );
        write_tf(&subnet, "variable \"cidr\" {}\n");

        let work = repo.path().join("work");
        write_tf(
            &work,
            "module \"vpc\" {\n  source  = \"app.terraform.io/acme/vpc/aws\"\n  version = \"1.0.0\"\n}\n\nmodule \"local\" {\n  source = \"./local\"\n}\n",
        );

        let catalog = Arc::new(MetadataCatalog::with_modules(vec![
            module("vpc", &vpc),
            module("subnet", &subnet),
        ]));
        let temp_root = TempDir::new().unwrap();
        let localizer = ModuleLocalizer::new(catalog, "TestModule/1.5.0", temp_root.path());

        let written = localizer.localize(&work).unwrap();
        assert_eq!(written, 2);

        let rewriter = ConfigRewriter::default();
        let vpc_copy = PathBuf::from(
            rewriter
                .extract_attribute(&work, &["module"], "source", None)
                .unwrap(),
        );
        assert!(vpc_copy.starts_with(temp_root.path()));
        assert_ne!(vpc_copy, vpc);

        let main = fs::read_to_string(work.join("main.tf")).unwrap();
        assert!(!main.contains("version"));
        assert!(main.contains("source = \"./local\""));

        let subnet_copy = rewriter
            .extract_attribute(&vpc_copy, &["module"], "source", None)
            .unwrap();
        assert!(PathBuf::from(subnet_copy).join("main.tf").is_file());

        // The catalog's own sources stay untouched.
        assert!(
            fs::read_to_string(vpc.join("main.tf"))
                .unwrap()
                .contains("app.terraform.io/acme/subnet/aws")
        );
    }

    #[test]
    fn tree_without_registry_references_is_untouched() {
        let repo = TempDir::new().unwrap();
        let content = "module \"local\" {\n  source = \"../local\"\n}\n";
        write_tf(repo.path(), content);

        let catalog = Arc::new(MetadataCatalog::with_modules(Vec::new()));
        let localizer = ModuleLocalizer::new(catalog, "Test", repo.path().join("tmp"));

        assert_eq!(localizer.localize(repo.path()).unwrap(), 0);
        assert_eq!(
            fs::read_to_string(repo.path().join("main.tf")).unwrap(),
            content
        );
    }

    #[test]
    fn self_reference_is_a_cycle() {
        let repo = TempDir::new().unwrap();
        let a = repo.path().join("a");
        let b = repo.path().join("b");
        write_tf(&a, "module \"b\" {\n  source = \"host/acme/b/aws\"\n}\n");
        write_tf(&b, "module \"a\" {\n  source = \"host/acme/a/aws\"\n}\n");

        let work = repo.path().join("work");
        write_tf(&work, "module \"a\" {\n  source = \"host/acme/a/aws\"\n}\n");

        let catalog = Arc::new(MetadataCatalog::with_modules(vec![
            module("a", &a),
            module("b", &b),
        ]));
        let localizer = ModuleLocalizer::new(catalog, "Test", repo.path().join("tmp"));

        match localizer.localize(&work) {
            Err(LocalizeError::CycleDetected { chain }) => {
                assert_eq!(chain, "acme/a/aws -> acme/b/aws -> acme/a/aws");
            }
            other => panic!("expected cycle, got {other:?}"),
        }
    }

    #[test]
    fn shared_dependency_is_not_a_cycle() {
        let repo = TempDir::new().unwrap();
        let shared = repo.path().join("shared");
        write_tf(&shared, "variable \"x\" {}\n");

        let work = repo.path().join("work");
        write_tf(
            &work,
            "module \"one\" {\n  source = \"host/acme/shared/aws\"\n}\n\nmodule \"two\" {\n  source = \"host/acme/shared/aws\"\n}\n",
        );

        let catalog = Arc::new(MetadataCatalog::with_modules(vec![module("shared", &shared)]));
        let localizer = ModuleLocalizer::new(catalog, "Test", repo.path().join("tmp"));

        assert_eq!(localizer.localize(&work).unwrap(), 1);
    }

    #[test]
    fn missing_local_module_aborts() {
        let repo = TempDir::new().unwrap();
        write_tf(repo.path(), "module \"gone\" {\n  source = \"host/acme/gone/aws\"\n}\n");

        let catalog = Arc::new(MetadataCatalog::with_modules(vec![module(
            "gone",
            &repo.path().join("does-not-exist"),
        )]));
        let localizer = ModuleLocalizer::new(catalog, "Test", repo.path().join("tmp"));

        assert!(matches!(
            localizer.localize(repo.path()),
            Err(LocalizeError::Io { .. })
        ));
    }
}
