//! Parser trait definition

use std::path::Path;

use crate::parser::types::ConfigFile;

/// Trait for parsing declarative configuration files into an editable tree
pub trait ConfigParser: Send + Sync {
    /// Check if this parser can handle the given file name
    fn can_parse(&self, file_name: &str) -> bool;

    /// Parse the content of `path` into a block/attribute tree
    fn parse(&self, path: &Path, content: &str) -> Result<ConfigFile, ParseError>;
}

/// Error type for parsing operations
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// Failed to parse the file structure
    #[error("Failed to parse file: {0}")]
    ParseFailed(String),

    /// Invalid syntax in the file
    #[error("Invalid syntax: {0}")]
    InvalidSyntax(String),

    /// Tree-sitter related error
    #[error("Tree-sitter error: {0}")]
    TreeSitter(String),
}
