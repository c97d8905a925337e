//! Resolved configuration and its value types.
//!
//! [`VcmsConfig`] is the terminal object of resolution: every field
//! carries a built-in default, and the resolver overwrites fields as the
//! layered sources define them. Once returned it is treated as
//! immutable; a reload produces a brand-new object (see
//! [`crate::config::holder::ConfigHandle`]).

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use axum::Router;

use crate::config::statics::{RoutePattern, StaticRoute};
use crate::session::SessionData;

/// Middleware supplied by the startup hook, applied to the assembled
/// application. The first registered transform runs closest to the
/// routes.
pub type Middleware = Arc<dyn Fn(Router) -> Router + Send + Sync>;

/// Hook run once against every freshly created session.
pub type InitSession = Arc<dyn Fn(&mut SessionData) + Send + Sync>;

/// Deployment mode. Selects which section of the configuration file
/// applies and gates request logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Test,
    Development,
    Production,
}

impl Environment {
    /// Parse a `VCMS_ENV` value. Anything but the three known names is
    /// ignored by the resolver.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "test" => Some(Environment::Test),
            "development" => Some(Environment::Development),
            "production" => Some(Environment::Production),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Environment::Test => "test",
            Environment::Development => "development",
            Environment::Production => "production",
        }
    }
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Production
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Database flavour. Only postgres has first-class support; other names
/// are carried through so the error surfaces at connection time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DbType {
    Pg,
    Other(String),
}

impl DbType {
    pub fn from_name(name: &str) -> Self {
        match name {
            "pg" => DbType::Pg,
            other => DbType::Other(other.to_string()),
        }
    }

    pub fn name(&self) -> &str {
        match self {
            DbType::Pg => "pg",
            DbType::Other(name) => name,
        }
    }

    /// Conventional port for the database type, used when no source
    /// resolved a port.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DbType::Pg => Some(5432),
            DbType::Other(_) => None,
        }
    }
}

impl fmt::Display for DbType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// The fully-resolved configuration.
#[derive(Clone)]
pub struct VcmsConfig {
    pub environment: Environment,
    pub port: u16,
    pub local_hostname: String,

    pub http2_required: bool,
    pub http2_key: PathBuf,
    pub http2_cert: PathBuf,

    pub database_required: bool,
    pub db_type: DbType,
    /// Host of the database server. The default keeps the combined
    /// `host:port` form; it is split during resolution when the database
    /// module is enabled.
    pub db_host: String,
    pub db_port: Option<u16>,
    pub db_name: Option<String>,
    pub db_user: Option<String>,
    pub db_password: Option<String>,

    pub session_required: bool,
    /// Redis server as `host[:port]`; split by the session layer with
    /// 6379 as the fallback port.
    pub redis_host: String,
    pub session_cookie_domain: Option<String>,

    /// Directory served at the application root, ahead of `statics`.
    pub public_directory: Option<String>,
    pub statics: Vec<StaticRoute>,

    /// Path the file layer actually loaded from, if any.
    pub config_file: Option<PathBuf>,

    /// User routers mounted at their base paths, in registration order.
    pub routers: Vec<(String, Router)>,
    pub middlewares: Vec<Middleware>,
    pub init_session: Option<InitSession>,
}

impl Default for VcmsConfig {
    fn default() -> Self {
        Self {
            environment: Environment::default(),
            port: 8000,
            local_hostname: "localhost".to_string(),

            http2_required: false,
            http2_key: PathBuf::from("./server.key"),
            http2_cert: PathBuf::from("./server.crt"),

            database_required: false,
            db_type: DbType::Pg,
            db_host: "localhost:5432".to_string(),
            db_port: None,
            db_name: None,
            db_user: None,
            db_password: None,

            session_required: false,
            redis_host: "localhost:6379".to_string(),
            session_cookie_domain: None,

            public_directory: None,
            statics: Vec::new(),

            config_file: None,

            routers: Vec::new(),
            middlewares: Vec::new(),
            init_session: None,
        }
    }
}

impl VcmsConfig {
    /// Static mounts in serving order: the public directory (at `/`)
    /// first when present, followed by the `statics` entries in source
    /// order.
    pub fn static_routes(&self) -> Vec<StaticRoute> {
        let mut routes = Vec::new();
        if let Some(dir) = &self.public_directory {
            routes.push(StaticRoute {
                route: RoutePattern::Literal("/".to_string()),
                serve: dir.clone(),
            });
        }
        routes.extend(self.statics.iter().cloned());
        routes
    }
}

impl fmt::Debug for VcmsConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VcmsConfig")
            .field("environment", &self.environment)
            .field("port", &self.port)
            .field("local_hostname", &self.local_hostname)
            .field("http2_required", &self.http2_required)
            .field("http2_key", &self.http2_key)
            .field("http2_cert", &self.http2_cert)
            .field("database_required", &self.database_required)
            .field("db_type", &self.db_type)
            .field("db_host", &self.db_host)
            .field("db_port", &self.db_port)
            .field("db_name", &self.db_name)
            .field("db_user", &self.db_user)
            .field("db_password", &self.db_password.as_ref().map(|_| "***"))
            .field("session_required", &self.session_required)
            .field("redis_host", &self.redis_host)
            .field("session_cookie_domain", &self.session_cookie_domain)
            .field("public_directory", &self.public_directory)
            .field("statics", &self.statics)
            .field("config_file", &self.config_file)
            .field(
                "routers",
                &self.routers.iter().map(|(base, _)| base).collect::<Vec<_>>(),
            )
            .field("middlewares", &self.middlewares.len())
            .field("init_session", &self.init_session.is_some())
            .finish()
    }
}

/// Equality over the data fields. Opaque handles compare by shape only
/// (router bases, middleware count, presence of the session init hook),
/// which is what re-resolving from identical sources reproduces.
impl PartialEq for VcmsConfig {
    fn eq(&self, other: &Self) -> bool {
        self.environment == other.environment
            && self.port == other.port
            && self.local_hostname == other.local_hostname
            && self.http2_required == other.http2_required
            && self.http2_key == other.http2_key
            && self.http2_cert == other.http2_cert
            && self.database_required == other.database_required
            && self.db_type == other.db_type
            && self.db_host == other.db_host
            && self.db_port == other.db_port
            && self.db_name == other.db_name
            && self.db_user == other.db_user
            && self.db_password == other.db_password
            && self.session_required == other.session_required
            && self.redis_host == other.redis_host
            && self.session_cookie_domain == other.session_cookie_domain
            && self.public_directory == other.public_directory
            && self.statics == other.statics
            && self.config_file == other.config_file
            && self
                .routers
                .iter()
                .map(|(base, _)| base)
                .eq(other.routers.iter().map(|(base, _)| base))
            && self.middlewares.len() == other.middlewares.len()
            && self.init_session.is_some() == other.init_session.is_some()
    }
}
