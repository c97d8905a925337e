//! Configuration error definitions.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while resolving the layered configuration.
///
/// All of these are fatal to startup. Each is logged once where it is
/// detected; outer layers must not log it a second time (see
/// [`crate::server::VcmsError::already_reported`]).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An explicitly requested configuration file does not exist.
    /// The implicit default path is exempt; it is skipped when absent.
    #[error("configuration file \"{}\" couldn't be found", .path.display())]
    FileNotFound { path: PathBuf },

    /// The configuration file exists but could not be read.
    #[error("failed to read configuration file \"{}\": {source}", .path.display())]
    FileRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML of the expected shape.
    #[error("failed to parse configuration file \"{}\": {source}", .path.display())]
    FileParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// A host field used the `DOCKER_HOST` sentinel but the variable
    /// itself is unset.
    #[error("DOCKER_HOST is not defined")]
    DockerHostUndefined,

    /// The database module is enabled but no user was resolved.
    #[error("no database user specified")]
    MissingDbUser,

    /// The session module is enabled but no redis host was resolved.
    #[error("no redis host specified")]
    MissingRedisHost,

    /// A slash-delimited static route does not compile as a pattern.
    #[error("invalid static route pattern \"{route}\": {source}")]
    InvalidRoutePattern {
        route: String,
        #[source]
        source: regex::Error,
    },

    /// A literal static route does not begin with `/`.
    #[error("static route \"{route}\" must start with \"/\"")]
    InvalidStaticRoute { route: String },
}
