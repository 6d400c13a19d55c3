//! Access to the process execution environment.
//!
//! Credential resolution consults env vars and reads credential files. Both go
//! through the [`BootstrapSource`] trait so tests can inject a fake
//! environment instead of mutating process state; production code uses
//! [`ProcessEnvironment`].

use std::io;
use std::path::Path;

/// Source of env vars and credential file contents used during resolution.
pub trait BootstrapSource: Send + Sync {
    /// Returns the value of `name`, or `None` if unset or empty.
    fn env_var(&self, name: &str) -> Option<String>;

    /// Reads the full contents of `path`.
    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>>;
}

/// [`BootstrapSource`] backed by the real process environment and filesystem.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessEnvironment;

impl BootstrapSource for ProcessEnvironment {
    fn env_var(&self, name: &str) -> Option<String> {
        std::env::var(name).ok().filter(|value| !value.is_empty())
    }

    fn read_file(&self, path: &Path) -> io::Result<Vec<u8>> {
        std::fs::read(path)
    }
}
