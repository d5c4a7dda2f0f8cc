//! Safe zip extraction
//!
//! Every entry path is validated against the destination before anything is
//! written, so a crafted archive cannot place files outside of it.

use std::fs;
use std::io::{Read, Seek};
use std::path::{Component, Path, PathBuf};

use tracing::debug;

use crate::version::error::ArtifactError;

/// Extract every entry of a zip archive into `dest_dir`.
///
/// Fails with [`ArtifactError::PathTraversal`] on the first entry whose path
/// is absolute or climbs out of `dest_dir`.
pub fn extract_zip<R: Read + Seek>(reader: R, dest_dir: &Path) -> Result<(), ArtifactError> {
    let mut archive = zip::ZipArchive::new(reader)?;

    fs::create_dir_all(dest_dir).map_err(|e| ArtifactError::io(dest_dir, e))?;

    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let target = validate_entry_path(entry.name(), dest_dir)?;

        if entry.is_dir() {
            fs::create_dir_all(&target).map_err(|e| ArtifactError::io(&target, e))?;
            continue;
        }

        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| ArtifactError::io(parent, e))?;
        }

        let mut file = fs::File::create(&target).map_err(|e| ArtifactError::io(&target, e))?;
        std::io::copy(&mut entry, &mut file).map_err(|e| ArtifactError::io(&target, e))?;

        #[cfg(unix)]
        if let Some(mode) = entry.unix_mode() {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(&target, fs::Permissions::from_mode(mode))
                .map_err(|e| ArtifactError::io(&target, e))?;
        }

        debug!(entry = %entry.name(), "Extracted archive entry");
    }

    Ok(())
}

/// Resolve an entry name below `dest_dir`, rejecting traversal.
fn validate_entry_path(name: &str, dest_dir: &Path) -> Result<PathBuf, ArtifactError> {
    let normalized = name.replace('\\', "/");
    let mut target = dest_dir.to_path_buf();
    let mut depth = 0usize;

    for component in Path::new(&normalized).components() {
        match component {
            Component::Normal(part) => {
                target.push(part);
                depth += 1;
            }
            Component::CurDir => {}
            Component::ParentDir => {
                if depth == 0 {
                    return Err(ArtifactError::PathTraversal(name.to_string()));
                }
                target.pop();
                depth -= 1;
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(ArtifactError::PathTraversal(name.to_string()));
            }
        }
    }

    if depth == 0 || !target.starts_with(dest_dir) {
        return Err(ArtifactError::PathTraversal(name.to_string()));
    }

    Ok(target)
}
