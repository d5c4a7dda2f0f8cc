//! Release index implementations

pub mod hashicorp;

pub use hashicorp::HashicorpReleases;
