//! Parser layer
//! - traits.rs: ConfigParser trait definition
//! - types.rs: Editable block/attribute tree (ConfigFile, Block, Attribute)
//! - hcl.rs: tree-sitter based `.tf` parser
//! - rewriter.rs: directory-level rewrites and attribute extraction

pub mod hcl;
pub mod rewriter;
pub mod traits;
pub mod types;

pub use hcl::HclParser;
pub use rewriter::{ConfigRewriter, RewriteError};
pub use traits::{ConfigParser, ParseError};
pub use types::{Attribute, Block, ConfigFile};
