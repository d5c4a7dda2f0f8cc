//! Shared fixtures for integration tests

#![allow(dead_code)]

pub mod fixture;
pub mod registry;

pub use fixture::{write_file, write_metadata};
pub use registry::{ReleaseServer, build_zip};
