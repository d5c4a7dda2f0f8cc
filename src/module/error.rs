use std::path::PathBuf;

use crate::parser::rewriter::RewriteError;

/// Error type for metadata catalog operations
#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid metadata in {path}: {source}")]
    Decode {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to scan catalog root: {0}")]
    Walk(#[from] walkdir::Error),

    #[error("Catalog lock poisoned")]
    LockPoisoned,
}

/// Error type for module localization
#[derive(Debug, thiserror::Error)]
pub enum LocalizeError {
    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A module resolved to a copy that references it again
    #[error("Module reference cycle: {chain}")]
    CycleDetected { chain: String },
}

impl LocalizeError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
