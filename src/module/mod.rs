//! Module localization layer
//!
//! # Modules
//!
//! - [`catalog`]: repository scan for `metadata.json` and address lookup
//! - [`copy`]: isolated working copies of module trees
//! - [`localizer`]: recursive rewrite of module sources to local copies
//! - [`error`]: error types for this layer

pub mod catalog;
pub mod copy;
pub mod error;
pub mod localizer;

pub use catalog::{MetadataCatalog, ModuleKey, ModuleMetadata};
pub use copy::{clean_name, copy_module_to_temp};
pub use error::{CatalogError, LocalizeError};
pub use localizer::ModuleLocalizer;
