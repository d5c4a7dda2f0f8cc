//! Crate-level error type

use crate::config::ConfigError;
use crate::logging::LoggingError;
use crate::module::error::{CatalogError, LocalizeError};
use crate::parser::rewriter::RewriteError;
use crate::parser::traits::ParseError;
use crate::version::error::{ArtifactError, RegistryError, VersionError};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Version(#[from] VersionError),

    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Artifact(#[from] ArtifactError),

    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Rewrite(#[from] RewriteError),

    #[error(transparent)]
    Catalog(#[from] CatalogError),

    #[error(transparent)]
    Localize(#[from] LocalizeError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Logging(#[from] LoggingError),

    #[error("Test harness failed: {0:#}")]
    Harness(anyhow::Error),

    #[error("Task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}
