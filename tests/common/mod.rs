//! Shared utilities for integration tests.

use std::io::Write;

use tempfile::NamedTempFile;
use vcms::config::EnvVars;

/// Write a configuration file the resolver can load. The file lives as
/// long as the returned handle.
#[allow(dead_code)]
pub fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file
}

/// An empty environment snapshot, keeping tests independent of the
/// process environment.
pub fn empty_env() -> EnvVars {
    EnvVars::default()
}
