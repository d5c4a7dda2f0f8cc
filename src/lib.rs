//! Version matrix resolution and module localization for infrastructure-as-code
//! compatibility testing.
//!
//! Given a module's declared version constraints, the crate resolves which
//! released tool/provider versions satisfy them, acquires the matching
//! executables into an on-disk cache, and produces isolated, locally
//! resolvable copies of the module tree so every version can be exercised in
//! parallel.
//!
//! # Modules
//!
//! - [`version`]: version parsing, constraint matching, release index and artifact cache
//! - [`parser`]: HCL configuration parsing and in-place attribute rewriting
//! - [`module`]: metadata catalog and module localization
//! - [`matrix`]: per-version test driver
//! - [`config`]: configuration and cache locations
//! - [`logging`]: tracing subscriber setup

pub mod config;
pub mod error;
pub mod logging;
pub mod matrix;
pub mod module;
pub mod parser;
pub mod version;

pub use error::Error;
