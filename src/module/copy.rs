//! Isolated working copies of module trees

use std::path::{Path, PathBuf};

use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::config::LOCK_FILE_NAME;
use crate::module::error::LocalizeError;

/// Hidden files that belong to the module and are copied anyway
const KEPT_HIDDEN_FILES: [&str; 2] = [LOCK_FILE_NAME, ".terraform-version"];

/// Last `/`-separated segment of a test name
pub fn clean_name(test_name: &str) -> &str {
    test_name.rsplit('/').next().unwrap_or(test_name)
}

/// Copy the module at `src` into a fresh directory under `temp_root` and
/// return its path.
///
/// The directory name starts with the last segment of `test_name`. Hidden
/// entries (such as `.terraform` or `.git`), state files and variable files
/// are left behind. The copy is not removed automatically.
pub fn copy_module_to_temp(
    src: &Path,
    test_name: &str,
    temp_root: &Path,
) -> Result<PathBuf, LocalizeError> {
    let metadata = std::fs::metadata(src).map_err(|e| LocalizeError::io(src, e))?;
    if !metadata.is_dir() {
        return Err(LocalizeError::io(
            src,
            std::io::Error::new(std::io::ErrorKind::NotADirectory, "module source is not a directory"),
        ));
    }
    std::fs::create_dir_all(temp_root).map_err(|e| LocalizeError::io(temp_root, e))?;

    let dest = tempfile::Builder::new()
        .prefix(&format!("{}-", clean_name(test_name)))
        .tempdir_in(temp_root)
        .map_err(|e| LocalizeError::io(temp_root, e))?
        .keep();

    let walker = WalkDir::new(src)
        .min_depth(1)
        .follow_links(true)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !is_excluded(entry));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| src.to_path_buf());
            LocalizeError::io(path, e.into())
        })?;

        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|_| {
                LocalizeError::io(
                    entry.path(),
                    std::io::Error::other("entry outside of the copied module"),
                )
            })?;
        let target = dest.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| LocalizeError::io(&target, e))?;
        } else {
            std::fs::copy(entry.path(), &target).map_err(|e| LocalizeError::io(&target, e))?;
        }
    }

    debug!(
        src = %src.display(),
        dest = %dest.display(),
        "Copied module to working directory"
    );
    Ok(dest)
}

fn is_excluded(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();

    if entry.file_type().is_dir() {
        return name.starts_with('.');
    }

    if KEPT_HIDDEN_FILES.iter().any(|kept| *kept == name) {
        return false;
    }

    name.starts_with('.')
        || name.ends_with(".tfstate")
        || name.ends_with(".tfstate.backup")
        || name == "terraform.tfvars"
        || name == "terraform.tfvars.json"
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::fs;
    use tempfile::TempDir;

    #[rstest]
    #[case("TestVersions/1.5.7", "1.5.7")]
    #[case("TestVersions", "TestVersions")]
    #[case("a/b/", "")]
    fn clean_name_keeps_last_segment(#[case] name: &str, #[case] expected: &str) {
        assert_eq!(clean_name(name), expected);
    }

    #[test]
    fn copies_module_files_and_skips_local_state() {
        let src = TempDir::new().unwrap();
        let root = src.path();
        fs::write(root.join("main.tf"), "module \"x\" {}\n").unwrap();
        fs::write(root.join(LOCK_FILE_NAME), "# lock\n").unwrap();
        fs::write(root.join("terraform.tfstate"), "{}").unwrap();
        fs::write(root.join("terraform.tfvars"), "a = 1").unwrap();
        fs::write(root.join(".envrc"), "export X=1").unwrap();
        fs::create_dir_all(root.join(".terraform/providers")).unwrap();
        fs::write(root.join(".terraform/providers/p"), "bin").unwrap();
        fs::create_dir_all(root.join("submodule")).unwrap();
        fs::write(root.join("submodule/variables.tf"), "variable \"a\" {}\n").unwrap();

        let temp_root = TempDir::new().unwrap();
        let dest = copy_module_to_temp(root, "TestVersions/1.5.7", temp_root.path()).unwrap();

        assert!(dest.starts_with(temp_root.path()));
        assert!(
            dest.file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("1.5.7-")
        );
        assert!(dest.join("main.tf").is_file());
        assert!(dest.join(LOCK_FILE_NAME).is_file());
        assert!(dest.join("submodule/variables.tf").is_file());
        assert!(!dest.join("terraform.tfstate").exists());
        assert!(!dest.join("terraform.tfvars").exists());
        assert!(!dest.join(".envrc").exists());
        assert!(!dest.join(".terraform").exists());
    }

    #[test]
    fn each_copy_gets_its_own_directory() {
        let src = TempDir::new().unwrap();
        fs::write(src.path().join("main.tf"), "").unwrap();
        let temp_root = TempDir::new().unwrap();

        let first = copy_module_to_temp(src.path(), "Test", temp_root.path()).unwrap();
        let second = copy_module_to_temp(src.path(), "Test", temp_root.path()).unwrap();

        assert_ne!(first, second);
    }

    #[test]
    fn missing_source_is_an_io_error() {
        let temp_root = TempDir::new().unwrap();

        let result = copy_module_to_temp(
            &temp_root.path().join("missing"),
            "Test",
            temp_root.path(),
        );

        assert!(matches!(result, Err(LocalizeError::Io { .. })));
    }
}
