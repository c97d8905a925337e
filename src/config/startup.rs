//! Startup hook layer.
//!
//! The hook is the one programmable source: embedding applications use
//! it to register routers, middlewares and the session init function,
//! and to override any plain field. It runs once per resolution and
//! must return a fresh [`StartupConfig`] each time so re-resolution
//! stays reproducible.

use std::path::PathBuf;

use axum::Router;

use crate::config::options::{Environment, InitSession, Middleware};
use crate::config::statics::RawStaticRoute;

/// Overrides produced by a startup hook. Every field is optional;
/// absent fields leave the earlier layers untouched.
///
/// Fields consumed by the per-field resolution pass are taken out of
/// this object, so the final merge of leftovers cannot clobber a value
/// that a later source (environment variable, command line) overrode.
#[derive(Default)]
pub struct StartupConfig {
    pub environment: Option<Environment>,
    pub port: Option<u16>,
    pub local_hostname: Option<String>,

    pub http2_required: Option<bool>,
    pub http2_key: Option<String>,
    pub http2_cert: Option<String>,

    pub database_required: Option<bool>,
    pub db_type: Option<String>,
    pub db_host: Option<String>,
    pub db_port: Option<u16>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,

    pub session_required: Option<bool>,
    pub redis_host: Option<String>,
    pub session_cookie_domain: Option<String>,

    pub public_directory: Option<String>,
    pub statics: Option<Vec<RawStaticRoute>>,

    /// Replaces the config file path given to the resolver. The file
    /// must exist once this is set.
    pub config_file: Option<PathBuf>,

    /// Routers mounted at their base paths, in order.
    pub routers: Vec<(String, Router)>,
    pub middlewares: Vec<Middleware>,
    pub init_session: Option<InitSession>,
}

/// Configuration-shaping callback, invoked once per resolution with the
/// tentatively resolved environment.
pub trait StartupHook: Send + Sync {
    fn startup(&self, environment: Environment) -> StartupConfig;
}

impl<F> StartupHook for F
where
    F: Fn(Environment) -> StartupConfig + Send + Sync,
{
    fn startup(&self, environment: Environment) -> StartupConfig {
        self(environment)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closures_are_hooks() {
        let hook = |environment: Environment| StartupConfig {
            port: Some(9000),
            local_hostname: Some(environment.to_string()),
            ..Default::default()
        };

        let config = hook.startup(Environment::Development);
        assert_eq!(config.port, Some(9000));
        assert_eq!(config.local_hostname.as_deref(), Some("development"));
        assert!(config.routers.is_empty());
    }
}
