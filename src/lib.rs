//! # Semver Compatibility
//!
//! lading's versioning tracks compatibility for the binary, not the API. We
//! upload to crates.io to distribute the binary. If using this as a
//! library, pin the version with a `=` version requirement operator.

pub mod args;
pub mod config;
pub mod error;
pub mod graph;
pub mod manifest;
pub mod ops;
pub mod plan;
pub mod preflight;
pub mod publish;
pub mod staging;
pub mod version;
