//! Server bootstrap.
//!
//! # Data Flow
//! ```text
//! Resolver
//!     → resolve() → VcmsConfig
//!     → get_structure(): database pool + session layer + router
//!     → Structure::serve(): bind and run until shutdown
//! ```
//!
//! # Design Decisions
//! - Configuration and database errors are logged where they are
//!   detected; [`VcmsError::already_reported`] keeps the outer layers
//!   from logging them twice
//! - With `http2_required` the listener is TLS through axum-server
//!   (HTTP/2 negotiated via ALPN); otherwise plain HTTP, and HTTP/2
//!   stays off like the system this replaces
//! - Both listeners stop on ctrl-c; the TLS path drains connections for
//!   up to ten seconds

use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_server::tls_rustls::RustlsConfig;
use axum_server::Handle;
use sqlx::PgPool;
use thiserror::Error;
use tokio::net::TcpListener;

use crate::app::build_app;
use crate::config::{ConfigError, Resolver, VcmsConfig};
use crate::database::{self, DatabaseError};
use crate::session::SessionLayer;

/// Errors raised while standing up the listener.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("the key for the https server can't be found (\"{}\")", .path.display())]
    KeyNotFound { path: PathBuf },

    #[error("the certificate for the https server can't be found (\"{}\")", .path.display())]
    CertNotFound { path: PathBuf },

    #[error("failed to load the https certificate or key: {source}")]
    Tls {
        #[source]
        source: std::io::Error,
    },

    #[error("failed to bind port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    #[error("server error: {source}")]
    Serve {
        #[source]
        source: std::io::Error,
    },
}

/// Anything that can stop the bootstrap.
#[derive(Debug, Error)]
pub enum VcmsError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Database(#[from] DatabaseError),

    #[error(transparent)]
    Server(#[from] ServerError),
}

impl VcmsError {
    /// Whether the error was already logged at its origin.
    /// Configuration and database failures report themselves.
    pub fn already_reported(&self) -> bool {
        matches!(self, VcmsError::Config(_) | VcmsError::Database(_))
    }
}

/// The assembled application: resolved configuration, optional modules
/// and the router they parameterize.
pub struct Structure {
    pub config: Arc<VcmsConfig>,
    pub database: Option<PgPool>,
    pub session: Option<SessionLayer>,
    pub app: Router,
}

/// Bring up the modules the configuration enables and assemble the
/// router.
pub async fn get_structure(config: VcmsConfig) -> Result<Structure, VcmsError> {
    tracing::info!(environment = %config.environment, "environment resolved");

    let database = if config.database_required {
        Some(database::connect(&config).await?)
    } else {
        None
    };

    let session = config
        .session_required
        .then(|| SessionLayer::from_config(&config));

    let app = build_app(&config, session.clone());

    Ok(Structure {
        config: Arc::new(config),
        database,
        session,
        app,
    })
}

impl Structure {
    /// Run the server until shutdown, then release the modules.
    pub async fn serve(self) -> Result<(), VcmsError> {
        let addr = SocketAddr::from(([0, 0, 0, 0], self.config.port));

        if self.config.http2_required {
            let tls = tls_config(&self.config).await?;
            tracing::info!(
                "listening on https://{}:{}",
                self.config.local_hostname,
                self.config.port
            );

            let handle = Handle::new();
            tokio::spawn(graceful_shutdown(handle.clone()));
            axum_server::bind_rustls(addr, tls)
                .handle(handle)
                .serve(self.app.clone().into_make_service())
                .await
                .map_err(|source| ServerError::Serve { source })?;
        } else {
            let listener = TcpListener::bind(addr)
                .await
                .map_err(|source| ServerError::Bind {
                    port: self.config.port,
                    source,
                })?;
            tracing::info!(
                "listening on http://{}:{}",
                self.config.local_hostname,
                self.config.port
            );

            axum::serve(listener, self.app.clone())
                .with_graceful_shutdown(shutdown_signal())
                .await
                .map_err(|source| ServerError::Serve { source })?;
        }

        tracing::info!("server stopped");
        self.shutdown().await;
        Ok(())
    }

    /// Release held resources, currently the database pool.
    pub async fn shutdown(&self) {
        if let Some(pool) = &self.database {
            pool.close().await;
            tracing::info!("database pool closed");
        }
    }
}

/// One-call bootstrap: resolve, assemble, serve.
pub async fn start(resolver: Resolver) -> Result<(), VcmsError> {
    let config = resolver.resolve()?;
    let structure = get_structure(config).await?;
    structure.serve().await
}

async fn tls_config(config: &VcmsConfig) -> Result<RustlsConfig, ServerError> {
    if !config.http2_key.exists() {
        return Err(ServerError::KeyNotFound {
            path: config.http2_key.clone(),
        });
    }
    if !config.http2_cert.exists() {
        return Err(ServerError::CertNotFound {
            path: config.http2_cert.clone(),
        });
    }
    RustlsConfig::from_pem_file(&config.http2_cert, &config.http2_key)
        .await
        .map_err(|source| ServerError::Tls { source })
}

async fn shutdown_signal() {
    tokio::signal::ctrl_c()
        .await
        .expect("Failed to install Ctrl+C handler");
    tracing::info!("shutdown signal received");
}

async fn graceful_shutdown(handle: Handle) {
    shutdown_signal().await;
    handle.graceful_shutdown(Some(Duration::from_secs(10)));
}
