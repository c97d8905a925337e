//! Environment variable layer.

use std::collections::HashMap;
use std::env;

use crate::config::error::ConfigError;

/// Name of the variable holding the substitute address for the
/// `DOCKER_HOST` sentinel.
const DOCKER_HOST: &str = "DOCKER_HOST";

/// Snapshot of the process environment consulted during resolution.
///
/// Captured once per resolution so every field sees the same view.
/// Tests build snapshots from explicit pairs instead of mutating the
/// process environment. Empty values count as unset.
#[derive(Debug, Clone, Default)]
pub struct EnvVars {
    vars: HashMap<String, String>,
}

impl EnvVars {
    /// Capture the current process environment.
    pub fn from_process() -> Self {
        Self {
            vars: env::vars().collect(),
        }
    }

    /// Build a snapshot from explicit pairs.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: pairs
                .into_iter()
                .map(|(key, value)| (key.into(), value.into()))
                .collect(),
        }
    }

    /// Raw lookup. Empty strings are treated as unset.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.vars
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }

    /// Boolean lookup: only a case-insensitive `"true"` enables a flag,
    /// any other value disables it.
    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.get(name).map(|value| value.eq_ignore_ascii_case("true"))
    }

    /// Integer lookup. A value that does not parse is ignored with a
    /// warning rather than overriding the field.
    pub fn get_u16(&self, name: &str) -> Option<u16> {
        let raw = self.get(name)?;
        match raw.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(
                    var = name,
                    value = raw,
                    "ignoring non-numeric environment value"
                );
                None
            }
        }
    }

    /// Host lookup honoring the sentinel: a value equal to
    /// `DOCKER_HOST` stands for the address in the `DOCKER_HOST`
    /// variable, and that variable missing is fatal.
    pub fn get_host(&self, name: &str) -> Result<Option<String>, ConfigError> {
        match self.get(name) {
            None => Ok(None),
            Some(value) if value == DOCKER_HOST => match self.get(DOCKER_HOST) {
                Some(host) => Ok(Some(host.to_string())),
                None => Err(ConfigError::DockerHostUndefined),
            },
            Some(value) => Ok(Some(value.to_string())),
        }
    }
}
