//! Filesystem fixtures

use std::fs;
use std::path::Path;

/// Write `content` to `root/relative`, creating parent directories
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}

/// Publish metadata for a module directory under `root`
pub fn write_metadata(root: &Path, dir: &str, name: &str, provider: &str, organisation: &str) {
    let body = serde_json::json!({
        "publish": {
            "name": name,
            "provider": provider,
            "organisation": organisation,
        }
    });
    write_file(root, &format!("{dir}/metadata.json"), &body.to_string());
}
