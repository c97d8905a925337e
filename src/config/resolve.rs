//! Layered configuration resolution.
//!
//! # Precedence
//! ```text
//! built-in default
//!     < config file, root keys
//!     < config file, [environment] section
//!     < startup hook
//!     < environment variable
//!     < command line
//! ```
//!
//! Resolution runs in two passes: `environment` first (default → hook →
//! `VCMS_ENV`), because it picks the file section every other field
//! consults; then every remaining field through the same generic source
//! chain. A source only overrides a field it actually defines.
//!
//! # Design Decisions
//! - One generic [`Sources::field`] routine replaces per-field
//!   copy-paste; the call sites form the per-field descriptor table
//! - Hook values consumed by the per-field pass are taken out of the
//!   hook object, so the final merge of leftovers keeps routers,
//!   middlewares and skipped-group fields without clobbering anything a
//!   later source decided
//! - Database and session option groups resolve only when their module
//!   is enabled, like the collaterals they parameterize

use std::path::PathBuf;
use std::sync::Arc;

use crate::config::cli::CliArgs;
use crate::config::env::EnvVars;
use crate::config::error::ConfigError;
use crate::config::file::{FileConfig, FileSection};
use crate::config::options::{DbType, Environment, VcmsConfig};
use crate::config::startup::{StartupConfig, StartupHook};
use crate::config::statics;

/// Path probed when neither the caller nor the hook names a config
/// file. Missing is fine here; everywhere else it is fatal.
pub const DEFAULT_CONFIG_FILE: &str = ".vcms.toml";

/// Environment variable selecting the deployment mode.
pub const ENVIRONMENT_VAR: &str = "VCMS_ENV";

/// Builder over the four optional source layers.
///
/// `resolve` borrows the builder, so one `Resolver` can produce any
/// number of configurations; identical inputs resolve to equal results.
#[derive(Default)]
pub struct Resolver {
    hook: Option<Arc<dyn StartupHook>>,
    config_file: Option<PathBuf>,
    env: Option<EnvVars>,
    cli: CliArgs,
}

impl Resolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the startup hook.
    pub fn with_hook(mut self, hook: impl StartupHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Name an explicit config file. The file must exist at resolution
    /// time.
    pub fn with_config_file(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_file = Some(path.into());
        self
    }

    /// Substitute an environment snapshot. Without this the process
    /// environment is captured fresh on every `resolve` call.
    pub fn with_env(mut self, env: EnvVars) -> Self {
        self.env = Some(env);
        self
    }

    /// Supply parsed command-line arguments.
    pub fn with_cli(mut self, cli: CliArgs) -> Self {
        self.cli = cli;
        self
    }

    /// Run the full resolution. Failures are logged here, once.
    pub fn resolve(&self) -> Result<VcmsConfig, ConfigError> {
        match self.resolve_inner() {
            Ok(config) => Ok(config),
            Err(error) => {
                tracing::error!(%error, "configuration resolution failed");
                Err(error)
            }
        }
    }

    fn resolve_inner(&self) -> Result<VcmsConfig, ConfigError> {
        let env = match &self.env {
            Some(snapshot) => snapshot.clone(),
            None => EnvVars::from_process(),
        };

        let mut config = VcmsConfig::default();

        // First pass: environment. The hook sees the tentative value and
        // may override it, but the variable keeps the last word.
        let tentative = environment_override(&env).unwrap_or(config.environment);

        let mut hook_config = match &self.hook {
            Some(hook) => Some(hook.startup(tentative)),
            None => {
                tracing::info!("no startup hook provided");
                None
            }
        };

        config.environment = tentative;
        if let Some(hook) = hook_config.as_mut() {
            if let Some(environment) = hook.environment.take() {
                config.environment = environment;
            }
        }
        if let Some(environment) = environment_override(&env) {
            config.environment = environment;
        }

        // Config file: a hook-requested path replaces the caller's, and
        // either one is mandatory. Only the implicit default may be
        // silently absent.
        let mut path = self.config_file.clone();
        let mut explicit = path.is_some();
        if let Some(hook) = hook_config.as_mut() {
            if let Some(requested) = hook.config_file.take() {
                path = Some(requested);
                explicit = true;
            }
        }
        let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE));

        let mut file = None;
        if path.exists() {
            tracing::info!(path = %path.display(), "configuration file resolved");
            file = Some(FileConfig::load(&path)?);
            config.config_file = Some(path);
        } else if explicit {
            return Err(ConfigError::FileNotFound { path });
        } else {
            tracing::debug!(path = %path.display(), "no configuration file");
        }

        let mut src = Sources {
            file: file.as_ref(),
            environment: config.environment,
            hook: hook_config.as_mut(),
            env: &env,
            cli: &self.cli,
        };

        if let Some(v) = src.field(
            |f| f.port,
            |h| h.port.take(),
            |e| Ok(e.get_u16("PORT")),
            |c| c.port,
        )? {
            config.port = v;
        }

        if let Some(v) = src.field(
            |f| f.local_hostname.clone(),
            |h| h.local_hostname.take(),
            |e| Ok(e.get("LOCAL_HOSTNAME").map(str::to_string)),
            |c| c.local_hostname.clone(),
        )? {
            config.local_hostname = v;
        }

        if let Some(v) = src.field(
            |f| f.http2,
            |h| h.http2_required.take(),
            |e| Ok(e.get_bool("HTTP2_REQUIRED")),
            |c| c.http2.then_some(true),
        )? {
            config.http2_required = v;
        }

        if let Some(v) = src.field(
            |f| f.http2_key.clone(),
            |h| h.http2_key.take(),
            |e| Ok(e.get("HTTP2_KEY").map(str::to_string)),
            |c| c.http2_key.clone(),
        )? {
            config.http2_key = PathBuf::from(v);
        }

        if let Some(v) = src.field(
            |f| f.http2_cert.clone(),
            |h| h.http2_cert.take(),
            |e| Ok(e.get("HTTP2_CERT").map(str::to_string)),
            |c| c.http2_cert.clone(),
        )? {
            config.http2_cert = PathBuf::from(v);
        }

        if let Some(v) = src.field(
            |f| f.database,
            |h| h.database_required.take(),
            |e| Ok(e.get_bool("DATABASE_REQUIRED")),
            |c| c.enable_database.then_some(true),
        )? {
            config.database_required = v;
        }

        if config.database_required {
            if let Some(v) = src.field(
                |f| f.db_type.clone(),
                |h| h.db_type.take(),
                |e| Ok(e.get("DB_TYPE").map(str::to_string)),
                |c| c.db_type.clone(),
            )? {
                config.db_type = DbType::from_name(&v);
            }

            if let Some(v) = src.field(
                |f| f.db_host.clone(),
                |h| h.db_host.take(),
                |e| e.get_host("DB_HOST"),
                |c| c.db_host.clone(),
            )? {
                config.db_host = v;
            }

            // A combined host:port splits; segments past the port are
            // dropped. The port half only counts if nothing resolved
            // db-port explicitly below; it still beats the type default.
            let mut split_port = None;
            if config.db_host.contains(':') {
                let mut segments = config.db_host.split(':');
                let host = segments.next().unwrap_or_default().to_string();
                if let Some(port) = segments.next() {
                    match port.parse::<u16>() {
                        Ok(parsed) => split_port = Some(parsed),
                        Err(_) => {
                            tracing::warn!(value = port, "ignoring non-numeric port in db-host")
                        }
                    }
                }
                config.db_host = host;
            }

            if let Some(v) = src.field(
                |f| f.db_port,
                |h| h.db_port.take(),
                |e| Ok(e.get_u16("DB_PORT")),
                |c| c.db_port,
            )? {
                config.db_port = Some(v);
            }
            if config.db_port.is_none() {
                config.db_port = split_port;
            }
            if config.db_port.is_none() {
                config.db_port = config.db_type.default_port();
            }

            if let Some(v) = src.field(
                |f| f.db_name.clone(),
                |h| h.db_name.take(),
                |e| Ok(e.get("DB_NAME").map(str::to_string)),
                |c| c.db_name.clone(),
            )? {
                config.db_name = Some(v);
            }

            if let Some(v) = src.field(
                |f| f.db_user.clone(),
                |h| h.db_user.take(),
                |e| Ok(e.get("DB_USER").map(str::to_string)),
                |c| c.db_user.clone(),
            )? {
                config.db_user = Some(v);
            }

            if let Some(v) = src.field(
                |f| f.db_password.clone(),
                |h| h.db_password.take(),
                |e| Ok(e.get("DB_PASSWORD").map(str::to_string)),
                |_| None,
            )? {
                config.db_password = Some(v);
            }

            if config.db_user.is_none() {
                return Err(ConfigError::MissingDbUser);
            }
        }

        if let Some(v) = src.field(
            |f| f.session,
            |h| h.session_required.take(),
            |e| Ok(e.get_bool("SESSION_REQUIRED")),
            |c| c.enable_session.then_some(true),
        )? {
            config.session_required = v;
        }

        if config.session_required {
            if let Some(v) = src.field(
                |f| f.redis_host.clone(),
                |h| h.redis_host.take(),
                |e| e.get_host("REDIS_HOST"),
                |c| c.redis_host.clone(),
            )? {
                config.redis_host = v;
            }
            if config.redis_host.is_empty() {
                return Err(ConfigError::MissingRedisHost);
            }

            if let Some(v) = src.field(
                |f| f.session_cookie_domain.clone(),
                |h| h.session_cookie_domain.take(),
                |e| Ok(e.get("SESSION_COOKIE_DOMAIN").map(str::to_string)),
                |c| c.session_cookie_domain.clone(),
            )? {
                config.session_cookie_domain = Some(v);
            }
        }

        if let Some(v) = src.field(
            |f| f.public_directory.clone(),
            |h| h.public_directory.take(),
            |e| Ok(e.get("PUBLIC_DIRECTORY").map(str::to_string)),
            |c| c.public_directory.clone(),
        )? {
            config.public_directory = Some(v);
        }

        if let Some(raw) = src.field(
            |f| f.statics.clone(),
            |h| h.statics.take(),
            |_| Ok(None),
            |_| None,
        )? {
            config.statics = statics::normalize(&raw)?;
        }

        // Whatever the hook still carries lands last: the opaque
        // passthrough fields plus anything a disabled group skipped.
        if let Some(hook) = hook_config {
            merge_remaining(hook, &mut config)?;
        }

        tracing::debug!(config = ?config, "configuration resolved");
        Ok(config)
    }
}

/// One field's walk through the ordered sources.
struct Sources<'a> {
    file: Option<&'a FileConfig>,
    environment: Environment,
    hook: Option<&'a mut StartupConfig>,
    env: &'a EnvVars,
    cli: &'a CliArgs,
}

impl Sources<'_> {
    fn field<T>(
        &mut self,
        from_file: impl Fn(&FileSection) -> Option<T>,
        from_hook: impl Fn(&mut StartupConfig) -> Option<T>,
        from_env: impl Fn(&EnvVars) -> Result<Option<T>, ConfigError>,
        from_cli: impl Fn(&CliArgs) -> Option<T>,
    ) -> Result<Option<T>, ConfigError> {
        let mut value = None;

        if let Some(file) = self.file {
            if let Some(v) = from_file(&file.root) {
                value = Some(v);
            }
            if let Some(section) = file.section(self.environment) {
                if let Some(v) = from_file(section) {
                    value = Some(v);
                }
            }
        }

        if let Some(hook) = self.hook.as_deref_mut() {
            if let Some(v) = from_hook(hook) {
                value = Some(v);
            }
        }

        if let Some(v) = from_env(self.env)? {
            value = Some(v);
        }

        if let Some(v) = from_cli(self.cli) {
            value = Some(v);
        }

        Ok(value)
    }
}

fn environment_override(env: &EnvVars) -> Option<Environment> {
    env.get(ENVIRONMENT_VAR).and_then(Environment::parse)
}

/// Final merge of hook fields the per-field pass did not consume.
fn merge_remaining(hook: StartupConfig, config: &mut VcmsConfig) -> Result<(), ConfigError> {
    let StartupConfig {
        // Consumed during the first pass.
        environment: _,
        config_file: _,
        port,
        local_hostname,
        http2_required,
        http2_key,
        http2_cert,
        database_required,
        db_type,
        db_host,
        db_port,
        db_name,
        db_user,
        db_password,
        session_required,
        redis_host,
        session_cookie_domain,
        public_directory,
        statics: raw_statics,
        routers,
        middlewares,
        init_session,
    } = hook;

    if let Some(v) = port {
        config.port = v;
    }
    if let Some(v) = local_hostname {
        config.local_hostname = v;
    }
    if let Some(v) = http2_required {
        config.http2_required = v;
    }
    if let Some(v) = http2_key {
        config.http2_key = PathBuf::from(v);
    }
    if let Some(v) = http2_cert {
        config.http2_cert = PathBuf::from(v);
    }
    if let Some(v) = database_required {
        config.database_required = v;
    }
    if let Some(v) = db_type {
        config.db_type = DbType::from_name(&v);
    }
    if let Some(v) = db_host {
        config.db_host = v;
    }
    if let Some(v) = db_port {
        config.db_port = Some(v);
    }
    if let Some(v) = db_name {
        config.db_name = Some(v);
    }
    if let Some(v) = db_user {
        config.db_user = Some(v);
    }
    if let Some(v) = db_password {
        config.db_password = Some(v);
    }
    if let Some(v) = session_required {
        config.session_required = v;
    }
    if let Some(v) = redis_host {
        config.redis_host = v;
    }
    if let Some(v) = session_cookie_domain {
        config.session_cookie_domain = Some(v);
    }
    if let Some(v) = public_directory {
        config.public_directory = Some(v);
    }
    if let Some(raw) = raw_statics {
        config.statics = statics::normalize(&raw)?;
    }

    config.routers = routers;
    config.middlewares = middlewares;
    if init_session.is_some() {
        config.init_session = init_session;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use tempfile::NamedTempFile;

    use super::*;

    fn no_env() -> EnvVars {
        EnvVars::default()
    }

    fn write_config(contents: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_without_sources() {
        let config = Resolver::new().with_env(no_env()).resolve().unwrap();
        assert_eq!(config, VcmsConfig::default());
    }

    #[test]
    fn test_hook_beats_file_env_beats_hook() {
        let file = write_config("port = 8080\n");

        let resolver = Resolver::new()
            .with_config_file(file.path())
            .with_hook(|_: Environment| StartupConfig {
                port: Some(9000),
                ..Default::default()
            })
            .with_env(no_env());
        assert_eq!(resolver.resolve().unwrap().port, 9000);

        let resolver = Resolver::new()
            .with_config_file(file.path())
            .with_hook(|_: Environment| StartupConfig {
                port: Some(9000),
                ..Default::default()
            })
            .with_env(EnvVars::from_pairs([("PORT", "321")]));
        assert_eq!(resolver.resolve().unwrap().port, 321);
    }

    #[test]
    fn test_environment_variable_re_overrides_hook_environment() {
        let seen = std::sync::Arc::new(std::sync::Mutex::new(None));
        let seen_by_hook = seen.clone();

        let resolver = Resolver::new()
            .with_hook(move |environment: Environment| {
                *seen_by_hook.lock().unwrap() = Some(environment);
                StartupConfig {
                    environment: Some(Environment::Development),
                    ..Default::default()
                }
            })
            .with_env(EnvVars::from_pairs([(ENVIRONMENT_VAR, "test")]));

        let config = resolver.resolve().unwrap();
        assert_eq!(config.environment, Environment::Test);
        // the hook already saw the variable's tentative value
        assert_eq!(*seen.lock().unwrap(), Some(Environment::Test));
    }

    #[test]
    fn test_hook_environment_wins_without_variable() {
        let resolver = Resolver::new()
            .with_hook(|_: Environment| StartupConfig {
                environment: Some(Environment::Development),
                ..Default::default()
            })
            .with_env(no_env());
        assert_eq!(
            resolver.resolve().unwrap().environment,
            Environment::Development
        );
    }

    #[test]
    fn test_invalid_environment_value_is_ignored() {
        let resolver =
            Resolver::new().with_env(EnvVars::from_pairs([(ENVIRONMENT_VAR, "staging")]));
        assert_eq!(
            resolver.resolve().unwrap().environment,
            Environment::Production
        );
    }

    #[test]
    fn test_explicit_file_missing_is_fatal() {
        let err = Resolver::new()
            .with_config_file("/nonexistent/.vcms.toml")
            .with_env(no_env())
            .resolve()
            .unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_hook_config_file_override_is_mandatory() {
        let resolver = Resolver::new()
            .with_hook(|_: Environment| StartupConfig {
                config_file: Some(PathBuf::from("/nonexistent/.vcms.toml")),
                ..Default::default()
            })
            .with_env(no_env());
        let err = resolver.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::FileNotFound { .. }));
    }

    #[test]
    fn test_hook_config_file_override_replaces_callers() {
        let callers = write_config("port = 1111\n");
        let hooks = write_config("port = 2222\n");
        let hook_path = hooks.path().to_path_buf();

        let resolver = Resolver::new()
            .with_config_file(callers.path())
            .with_hook(move |_: Environment| StartupConfig {
                config_file: Some(hook_path.clone()),
                ..Default::default()
            })
            .with_env(no_env());

        let config = resolver.resolve().unwrap();
        assert_eq!(config.port, 2222);
        assert_eq!(config.config_file.as_deref(), Some(hooks.path()));
    }

    #[test]
    fn test_db_group_skipped_when_database_disabled() {
        let file = write_config("db-host = \"ignored:9\"\ndb-user = \"ignored\"\n");
        let config = Resolver::new()
            .with_config_file(file.path())
            .with_env(no_env())
            .resolve()
            .unwrap();

        // untouched defaults, host not split
        assert_eq!(config.db_host, "localhost:5432");
        assert_eq!(config.db_port, None);
        assert_eq!(config.db_user, None);
    }

    #[test]
    fn test_db_host_split_and_port_precedence() {
        let file = write_config("database = true\ndb-user = \"app\"\ndb-host = \"myhost:1234\"\n");

        let config = Resolver::new()
            .with_config_file(file.path())
            .with_env(no_env())
            .resolve()
            .unwrap();
        assert_eq!(config.db_host, "myhost");
        assert_eq!(config.db_port, Some(1234));

        // an explicit port beats the split half
        let config = Resolver::new()
            .with_config_file(file.path())
            .with_env(EnvVars::from_pairs([("DB_PORT", "8999")]))
            .resolve()
            .unwrap();
        assert_eq!(config.db_host, "myhost");
        assert_eq!(config.db_port, Some(8999));
    }

    #[test]
    fn test_db_host_split_drops_extra_segments() {
        let file = write_config(
            "database = true\ndb-user = \"app\"\ndb-host = \"myhost:1234:replica\"\n",
        );

        let config = Resolver::new()
            .with_config_file(file.path())
            .with_env(no_env())
            .resolve()
            .unwrap();
        assert_eq!(config.db_host, "myhost");
        assert_eq!(config.db_port, Some(1234));
    }

    #[test]
    fn test_db_port_defaults_by_type() {
        let file = write_config("database = true\ndb-user = \"app\"\ndb-host = \"myhost\"\n");
        let config = Resolver::new()
            .with_config_file(file.path())
            .with_env(no_env())
            .resolve()
            .unwrap();
        assert_eq!(config.db_port, Some(5432));

        let file = write_config(
            "database = true\ndb-user = \"app\"\ndb-host = \"myhost\"\ndb-type = \"sqlite\"\n",
        );
        let config = Resolver::new()
            .with_config_file(file.path())
            .with_env(no_env())
            .resolve()
            .unwrap();
        assert_eq!(config.db_type, DbType::Other("sqlite".to_string()));
        assert_eq!(config.db_port, None);
    }

    #[test]
    fn test_missing_db_user_is_fatal() {
        let resolver = Resolver::new()
            .with_env(EnvVars::from_pairs([("DATABASE_REQUIRED", "true")]));
        let err = resolver.resolve().unwrap_err();
        assert!(matches!(err, ConfigError::MissingDbUser));
    }

    #[test]
    fn test_sentinel_in_db_host() {
        let resolver = Resolver::new().with_env(EnvVars::from_pairs([
            ("DATABASE_REQUIRED", "true"),
            ("DB_USER", "app"),
            ("DB_HOST", "DOCKER_HOST"),
            ("DOCKER_HOST", "10.0.0.5"),
        ]));
        let config = resolver.resolve().unwrap();
        assert_eq!(config.db_host, "10.0.0.5");

        let resolver = Resolver::new().with_env(EnvVars::from_pairs([
            ("DATABASE_REQUIRED", "true"),
            ("DB_USER", "app"),
            ("DB_HOST", "DOCKER_HOST"),
        ]));
        assert!(matches!(
            resolver.resolve().unwrap_err(),
            ConfigError::DockerHostUndefined
        ));
    }

    #[test]
    fn test_hook_leftovers_merge_when_group_disabled() {
        // database stays disabled, so the db fields skip the per-field
        // pass and arrive through the final merge, unsplit
        let resolver = Resolver::new()
            .with_hook(|_: Environment| StartupConfig {
                db_user: Some("carried".to_string()),
                db_host: Some("myhost:1234".to_string()),
                ..Default::default()
            })
            .with_env(no_env());

        let config = resolver.resolve().unwrap();
        assert!(!config.database_required);
        assert_eq!(config.db_user.as_deref(), Some("carried"));
        assert_eq!(config.db_host, "myhost:1234");
        assert_eq!(config.db_port, None);
    }

    #[test]
    fn test_hook_passthrough_fields() {
        let resolver = Resolver::new()
            .with_hook(|_: Environment| StartupConfig {
                routers: vec![("/api".to_string(), axum::Router::new())],
                init_session: Some(Arc::new(|_: &mut crate::session::SessionData| {})),
                ..Default::default()
            })
            .with_env(no_env());

        let config = resolver.resolve().unwrap();
        assert_eq!(config.routers.len(), 1);
        assert_eq!(config.routers[0].0, "/api");
        assert!(config.init_session.is_some());
    }

    #[test]
    fn test_hook_statics_are_normalized() {
        use crate::config::statics::{RawStaticRoute, RoutePattern};

        let resolver = Resolver::new()
            .with_hook(|_: Environment| StartupConfig {
                statics: Some(vec![RawStaticRoute {
                    route: r"/\/test/".to_string(),
                    serve: "public2".to_string(),
                }]),
                ..Default::default()
            })
            .with_env(no_env());

        let config = resolver.resolve().unwrap();
        assert_eq!(config.statics.len(), 1);
        match &config.statics[0].route {
            RoutePattern::Pattern(pattern) => assert!(pattern.is_match("/test")),
            RoutePattern::Literal(route) => panic!("expected a pattern, got {route}"),
        }
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let file = write_config(
            "port = 8080\nsession = true\nredis-host = \"cache\"\n\n[development]\nport = 3001\n",
        );
        let resolver = Resolver::new()
            .with_config_file(file.path())
            .with_hook(|_: Environment| StartupConfig {
                environment: Some(Environment::Development),
                routers: vec![("/api".to_string(), axum::Router::new())],
                ..Default::default()
            })
            .with_env(no_env());

        let first = resolver.resolve().unwrap();
        let second = resolver.resolve().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.port, 3001);
    }
}
