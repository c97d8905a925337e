//! Database bootstrap.
//!
//! Builds a postgres pool from the resolved configuration and verifies
//! it with a round-trip before the server starts taking requests.

use sqlx::postgres::{PgConnectOptions, PgPoolOptions};
use sqlx::PgPool;
use thiserror::Error;

use crate::config::{DbType, VcmsConfig};

/// Errors raised while bringing the database up. Logged once where they
/// are detected, like configuration errors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// The database module is enabled but the configuration carries no
    /// user.
    #[error("no database user specified")]
    MissingUser,

    /// Only postgres has first-class support.
    #[error("unsupported database type \"{0}\"")]
    UnsupportedType(String),

    #[error("failed to connect to the database: {source}")]
    Connect {
        #[source]
        source: sqlx::Error,
    },

    #[error("database connection test failed: {source}")]
    Ping {
        #[source]
        source: sqlx::Error,
    },
}

/// Connection parameters derived from the configuration. The database
/// name falls back to the user name when not configured.
pub fn connect_options(config: &VcmsConfig) -> Result<PgConnectOptions, DatabaseError> {
    if let DbType::Other(name) = &config.db_type {
        return Err(DatabaseError::UnsupportedType(name.clone()));
    }
    let user = config.db_user.as_deref().ok_or(DatabaseError::MissingUser)?;

    let name = match &config.db_name {
        Some(name) => name.clone(),
        None => {
            tracing::info!(user, "no database name configured, using the user name");
            user.to_string()
        }
    };

    let mut options = PgConnectOptions::new()
        .host(&config.db_host)
        .username(user)
        .database(&name);
    if let Some(port) = config.db_port {
        options = options.port(port);
    }
    if let Some(password) = &config.db_password {
        options = options.password(password);
    }
    Ok(options)
}

/// Open the pool and verify it answers. Failures are logged here, once.
pub async fn connect(config: &VcmsConfig) -> Result<PgPool, DatabaseError> {
    match connect_inner(config).await {
        Ok(pool) => Ok(pool),
        Err(error) => {
            tracing::error!(%error, "database startup failed");
            Err(error)
        }
    }
}

async fn connect_inner(config: &VcmsConfig) -> Result<PgPool, DatabaseError> {
    let options = connect_options(config)?;

    tracing::info!(
        host = %config.db_host,
        port = config.db_port,
        "connecting to postgres"
    );
    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .map_err(|source| DatabaseError::Connect { source })?;

    sqlx::query("SELECT 1")
        .execute(&pool)
        .await
        .map_err(|source| DatabaseError::Ping { source })?;
    tracing::info!("database connection verified");

    Ok(pool)
}
