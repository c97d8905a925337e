//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! built-in defaults
//!     → file.rs (TOML: root keys + [environment] section)
//!     → startup.rs (programmatic hook overrides)
//!     → env.rs (environment variables)
//!     → cli.rs (command-line flags)
//!     → resolve.rs folds the layers, later source wins per field
//!     → VcmsConfig (resolved, immutable)
//!     → shared via Arc to all subsystems
//!
//! On explicit reload:
//!     holder.rs re-runs resolve.rs over the same sources
//!     → atomic swap of Arc<VcmsConfig>
//!     → old snapshots stay valid until dropped
//! ```
//!
//! # Design Decisions
//! - Config is immutable once resolved; changes require full re-resolution
//! - All fields have defaults, so every source layer is optional
//! - The environment resolves first because it selects the file section
//! - A source overrides a field only by defining it; absence never clears

pub mod cli;
pub mod env;
pub mod error;
pub mod file;
pub mod holder;
pub mod options;
pub mod resolve;
pub mod startup;
pub mod statics;

pub use cli::CliArgs;
pub use env::EnvVars;
pub use error::ConfigError;
pub use holder::ConfigHandle;
pub use options::{DbType, Environment, InitSession, Middleware, VcmsConfig};
pub use resolve::Resolver;
pub use startup::{StartupConfig, StartupHook};
pub use statics::{RawStaticRoute, RoutePattern, StaticRoute};
