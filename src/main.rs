//! vcms server binary.
//!
//! Resolves the configuration from the default file, the process
//! environment and the command line, then runs the server. Embedding
//! applications with their own routers and hooks call [`vcms::start`]
//! instead.

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vcms::config::{CliArgs, Resolver};

#[tokio::main]
async fn main() {
    // Initialize tracing subscriber
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "vcms=info,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("vcms starting");

    let resolver = Resolver::new().with_cli(CliArgs::parse());

    if let Err(error) = vcms::start(resolver).await {
        if !error.already_reported() {
            tracing::error!(%error, "startup failed");
        }
        eprintln!("Something went wrong. exiting.");
        std::process::exit(1);
    }
}
