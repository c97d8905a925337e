//! Configuration-driven web server bootstrap.
//!
//! Resolves a layered configuration (built-in defaults, a TOML config
//! file with per-environment sections, a programmatic startup hook,
//! environment variables, command-line flags) into one immutable
//! [`VcmsConfig`], then assembles and runs the application it
//! describes: an Axum router with the embedder's routers, middlewares
//! and static mounts, plus optional database and session modules.
//!
//! ```no_run
//! use vcms::config::{Environment, Resolver, StartupConfig};
//! use vcms::Router;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), vcms::VcmsError> {
//!     let resolver = Resolver::new().with_hook(|_: Environment| StartupConfig {
//!         routers: vec![("/api".to_string(), Router::new())],
//!         ..Default::default()
//!     });
//!     vcms::start(resolver).await
//! }
//! ```

pub mod app;
pub mod config;
pub mod database;
pub mod server;
pub mod session;

pub use axum::Router;

pub use app::build_app;
pub use config::{
    CliArgs, ConfigError, ConfigHandle, Environment, Resolver, StartupConfig, StartupHook,
    VcmsConfig,
};
pub use server::{get_structure, start, Structure, VcmsError};
pub use session::{Session, SessionData, SessionLayer, SessionStore};
