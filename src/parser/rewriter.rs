//! Directory-level configuration rewriting
//!
//! Every operation here works on the immediate `.tf` files of one directory.
//! Files are parsed, edited in memory and written back only when an edit
//! actually changed something.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use tracing::{debug, info};

use crate::config::{LOCK_FILE_NAME, MODULE_WILDCARD};
use crate::parser::hcl::HclParser;
use crate::parser::traits::{ConfigParser, ParseError};
use crate::parser::types::{Attribute, Block, ConfigFile};

/// Error type for rewriting operations
#[derive(Debug, thiserror::Error)]
pub enum RewriteError {
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: ParseError,
    },

    #[error("Not found: {0}")]
    NotFound(String),
}

impl RewriteError {
    fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

static QUOTED_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"([A-Za-z_][A-Za-z0-9_-]*)\s*=\s*"([^"]+)""#)
        .expect("assignment pattern is valid")
});

/// `name = "value"` matcher over raw attribute text
fn quoted_value(name: &str, text: &str) -> Option<String> {
    QUOTED_ASSIGNMENT
        .captures_iter(text)
        .find(|caps| &caps[1] == name)
        .map(|caps| caps[2].to_string())
}

/// Rewrites module and provider references in configuration directories
#[derive(Clone)]
pub struct ConfigRewriter {
    parser: Arc<dyn ConfigParser>,
}

impl Default for ConfigRewriter {
    fn default() -> Self {
        Self::new(Arc::new(HclParser::new()))
    }
}

impl ConfigRewriter {
    pub fn new(parser: Arc<dyn ConfigParser>) -> Self {
        Self { parser }
    }

    /// Parse every config file directly inside `dir` and hand it to `visit`.
    ///
    /// Files are visited in name order. A file is written back only when the
    /// visitor left it modified. The first error aborts the remaining files.
    /// Returns the number of files written.
    pub fn for_each_file<F, E>(&self, dir: &Path, mut visit: F) -> Result<usize, E>
    where
        F: FnMut(&Path, &mut ConfigFile) -> Result<(), E>,
        E: From<RewriteError>,
    {
        let mut paths = Vec::new();
        let entries = std::fs::read_dir(dir).map_err(|e| RewriteError::io(dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| RewriteError::io(dir, e))?;
            let file_type = entry.file_type().map_err(|e| RewriteError::io(entry.path(), e))?;
            if !file_type.is_file() {
                continue;
            }
            let name = entry.file_name();
            if self.parser.can_parse(&name.to_string_lossy()) {
                paths.push(entry.path());
            }
        }
        paths.sort();

        let mut written = 0;
        for path in paths {
            let content =
                std::fs::read_to_string(&path).map_err(|e| RewriteError::io(&path, e))?;
            let mut file = self
                .parser
                .parse(&path, &content)
                .map_err(|source| RewriteError::Parse {
                    path: path.clone(),
                    source,
                })?;

            visit(&path, &mut file)?;

            if file.is_modified() {
                std::fs::write(&path, file.render()).map_err(|e| RewriteError::io(&path, e))?;
                debug!("Rewrote {}", path.display());
                written += 1;
            }
        }

        Ok(written)
    }

    /// Point matching module blocks at `source`, setting `version` or
    /// removing it when `version` is empty. `module` may be the wildcard.
    pub fn set_module_source_and_version(
        &self,
        dir: &Path,
        module: &str,
        source: &str,
        version: &str,
    ) -> Result<usize, RewriteError> {
        let source = if source == ".." { "../" } else { source };

        let written = self.for_each_file(dir, |_, file| {
            for block in file.blocks_of_kind_mut("module") {
                let selected = module == MODULE_WILDCARD
                    || block.labels().first().map(String::as_str) == Some(module);
                if !selected {
                    continue;
                }
                block.set_attribute_string("source", source);
                if version.is_empty() {
                    block.remove_attribute("version");
                } else {
                    block.set_attribute_string("version", version);
                }
            }
            Ok::<_, RewriteError>(())
        })?;

        info!(
            dir = %dir.display(),
            module,
            source,
            version,
            "Set module source in {} file(s)",
            written
        );
        Ok(written)
    }

    /// Point matching module blocks at a local path and drop their version
    pub fn set_module_source_to_path(
        &self,
        dir: &Path,
        module: &str,
        path: &Path,
    ) -> Result<usize, RewriteError> {
        self.set_module_source_and_version(dir, module, &path.to_string_lossy(), "")
    }

    /// Like [`Self::set_module_source_to_path`] with `path` made absolute first
    pub fn set_module_source_to_absolute_path(
        &self,
        dir: &Path,
        module: &str,
        path: &Path,
    ) -> Result<usize, RewriteError> {
        let absolute = std::path::absolute(path).map_err(|e| RewriteError::io(path, e))?;
        self.set_module_source_to_path(dir, module, &absolute)
    }

    /// Pin `provider` in every `terraform.required_providers` block to
    /// `{ version, source }` and remove the dependency lock file.
    pub fn set_required_provider_version(
        &self,
        dir: &Path,
        provider: &str,
        version: &str,
        source: &str,
    ) -> Result<usize, RewriteError> {
        let mut found = false;
        let written = self.for_each_file(dir, |_, file| {
            for terraform in file.blocks_of_kind_mut("terraform") {
                for providers in terraform.blocks_of_kind_mut("required_providers") {
                    providers.set_attribute_object(
                        provider,
                        &[("version", version), ("source", source)],
                    );
                    found = true;
                }
            }
            Ok::<_, RewriteError>(())
        })?;

        if !found {
            return Err(RewriteError::NotFound(format!(
                "required_providers block in {}",
                dir.display()
            )));
        }

        let lock_file = dir.join(LOCK_FILE_NAME);
        match std::fs::remove_file(&lock_file) {
            Ok(()) => debug!("Removed {}", lock_file.display()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => return Err(RewriteError::io(lock_file, e)),
        }

        info!(
            dir = %dir.display(),
            provider,
            version,
            "Pinned required provider"
        );
        Ok(written)
    }

    /// Read a single string value from the first attribute found under the
    /// nested block kinds `block_path`.
    ///
    /// With `key`, the attribute must be an object and the value is taken
    /// from that element. Plain string literals are decoded from the parse
    /// tree; anything else falls back to matching `name = "..."` in the
    /// attribute's raw text.
    pub fn extract_attribute(
        &self,
        dir: &Path,
        block_path: &[&str],
        attribute: &str,
        key: Option<&str>,
    ) -> Result<String, RewriteError> {
        let mut value: Option<String> = None;
        self.for_each_file(dir, |_, file| {
            if value.is_none() {
                value = find_attribute(file.blocks(), block_path, attribute)
                    .into_iter()
                    .find_map(|attr| read_value(attr, key));
            }
            Ok::<_, RewriteError>(())
        })?;

        value.ok_or_else(|| {
            let name = match key {
                Some(key) => format!("{attribute}.{key}"),
                None => attribute.to_string(),
            };
            RewriteError::NotFound(format!(
                "{} {} in {}",
                block_path.join("."),
                name,
                dir.display()
            ))
        })
    }

    /// The tool version constraint (`terraform.required_version`)
    pub fn required_version(&self, dir: &Path) -> Result<String, RewriteError> {
        self.extract_attribute(dir, &["terraform"], "required_version", None)
    }

    /// Version constraint of a required provider, accepting the legacy
    /// `name = "constraint"` form.
    pub fn provider_constraint(&self, dir: &Path, provider: &str) -> Result<String, RewriteError> {
        match self.extract_attribute(dir, REQUIRED_PROVIDERS, provider, Some("version")) {
            Err(RewriteError::NotFound(_)) => {
                self.extract_attribute(dir, REQUIRED_PROVIDERS, provider, None)
            }
            result => result,
        }
    }

    /// Source address of a required provider
    pub fn provider_source(&self, dir: &Path, provider: &str) -> Result<String, RewriteError> {
        self.extract_attribute(dir, REQUIRED_PROVIDERS, provider, Some("source"))
    }
}

const REQUIRED_PROVIDERS: &[&str] = &["terraform", "required_providers"];

fn find_attribute<'a>(blocks: &'a [Block], path: &[&str], name: &str) -> Vec<&'a Attribute> {
    let Some((kind, rest)) = path.split_first() else {
        return Vec::new();
    };

    let mut found = Vec::new();
    for block in blocks.iter().filter(|b| b.kind() == *kind) {
        if rest.is_empty() {
            found.extend(block.attribute(name));
        } else {
            found.extend(find_attribute(block.blocks(), rest, name));
        }
    }
    found
}

fn read_value(attr: &Attribute, key: Option<&str>) -> Option<String> {
    match key {
        Some(key) => attr
            .entry_string(key)
            .or_else(|| quoted_value(key, attr.expression())),
        None => attr
            .string_value()
            .or_else(|| quoted_value(attr.name(), attr.source_text())),
    }
}
