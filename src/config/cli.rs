//! Command-line layer.

use clap::Parser;

/// Command-line options, highest-precedence source.
///
/// Boolean flags only override when actually given; their absence never
/// clears a value from an earlier layer. The generated help flag is
/// disabled because `-h` belongs to `--local-hostname`.
#[derive(Debug, Clone, Default, Parser)]
#[command(name = "vcms", disable_help_flag = true)]
pub struct CliArgs {
    /// Port for the HTTP(S) listener.
    #[arg(short = 'p', long)]
    pub port: Option<u16>,

    /// Advertised hostname, used in startup logs.
    #[arg(short = 'h', long = "local-hostname")]
    pub local_hostname: Option<String>,

    /// Serve over HTTPS with HTTP/2.
    #[arg(long)]
    pub http2: bool,

    #[arg(long = "http2-key")]
    pub http2_key: Option<String>,

    #[arg(long = "http2-cert")]
    pub http2_cert: Option<String>,

    /// Enable the database module.
    #[arg(short = 'd', long = "enable-database")]
    pub enable_database: bool,

    #[arg(long = "db-type")]
    pub db_type: Option<String>,

    #[arg(long = "db-host")]
    pub db_host: Option<String>,

    #[arg(long = "db-port")]
    pub db_port: Option<u16>,

    #[arg(long = "db-name")]
    pub db_name: Option<String>,

    #[arg(long = "db-user")]
    pub db_user: Option<String>,

    /// Enable the session module.
    #[arg(short = 's', long = "enable-session")]
    pub enable_session: bool,

    #[arg(long = "redis-host")]
    pub redis_host: Option<String>,

    #[arg(long = "session-cookie-domain")]
    pub session_cookie_domain: Option<String>,

    /// Directory served at the application root.
    #[arg(long = "public-directory")]
    pub public_directory: Option<String>,
}
