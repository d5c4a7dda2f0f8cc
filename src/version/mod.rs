//! Version resolution layer
//!
//! This module answers "which released versions satisfy a constraint" and
//! "is a local copy of this version available".
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────┐     ┌─────────────┐     ┌──────────────┐
//! │ ReleaseIndex │────▶│   Matcher   │────▶│  version set │
//! │  (listing)   │     │ (constraint)│     │ (block/group)│
//! └──────────────┘     └─────────────┘     └──────────────┘
//!        │
//!        ▼
//! ┌──────────────┐     ┌─────────────┐
//! │ArtifactCache │────▶│   Archive   │
//! │  (on disk)   │     │ (extraction)│
//! └──────────────┘     └─────────────┘
//! ```
//!
//! # Modules
//!
//! - [`semver`]: `major.minor` versions, minor grouping and blocklist filtering
//! - [`matcher`]: constraint parsing and evaluation
//! - [`registry`]: release index and downloader traits
//! - [`registries`]: concrete release index implementations
//! - [`cache`]: content-keyed artifact cache
//! - [`archive`]: zip extraction with path validation
//! - [`platform`]: OS/architecture naming
//! - [`error`]: error types for this layer

pub mod archive;
pub mod cache;
pub mod error;
pub mod matcher;
pub mod platform;
pub mod registries;
pub mod registry;
pub mod semver;
