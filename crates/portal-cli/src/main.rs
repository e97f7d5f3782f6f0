//! Portal CLI - log in, inspect the session and call the API with automatic
//! token renewal.

mod commands;
mod runtime;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use portal_config_and_utils::{init_logging, parse_level, Config, Paths};
use runtime::Runtime;
use tracing::warn;

/// Portal command-line interface.
#[derive(Parser)]
#[command(name = "portal")]
#[command(about = "Portal API client with managed authentication")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Log level (trace, debug, info, warn, error). Overrides the config file
    #[arg(short, long, global = true)]
    log_level: Option<String>,

    /// Base directory for config, credentials and logs. Defaults to ~/.portal
    #[arg(long, global = true)]
    base_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Log in with email and password
    Login {
        #[arg(long)]
        email: String,

        #[arg(long, env = "PORTAL_PASSWORD", hide_env_values = true)]
        password: String,

        /// Keep the session across runs
        #[arg(long)]
        remember_me: bool,
    },
    /// Log in through the browser
    Oauth {
        /// Keep the session across runs
        #[arg(long)]
        remember_me: bool,
    },
    /// Log out and forget stored credentials
    Logout,
    /// Show the current session
    Status,
    /// Send an API request
    Request {
        /// HTTP method (GET, POST, PUT, DELETE, ...)
        method: String,

        /// Path relative to the API base URL
        path: String,

        /// JSON request body
        #[arg(long)]
        body: Option<String>,

        /// Send without credentials
        #[arg(long)]
        skip_auth: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let paths = match cli.base_dir {
        Some(base) => Paths::with_base_dir(base),
        None => Paths::new()?,
    };
    paths.ensure_dirs()?;

    let (mut config, ignored_overrides) = Config::load(&paths)?;
    if let Some(level) = cli.log_level {
        config.log_level = parse_level(&level).as_str().to_ascii_lowercase();
    }
    init_logging("portal-cli", &config.log_level, Some(paths.log_file()));
    for ignored in &ignored_overrides {
        warn!(
            variable = ignored.variable,
            value = %ignored.value,
            "Ignoring invalid environment override"
        );
    }

    let runtime = Runtime::build(config, paths)?;

    match cli.command {
        Commands::Login {
            email,
            password,
            remember_me,
        } => commands::login::run(&runtime, &email, &password, remember_me).await,
        Commands::Oauth { remember_me } => commands::login::run_oauth(&runtime, remember_me).await,
        Commands::Logout => commands::logout::run(&runtime).await,
        Commands::Status => commands::status::run(&runtime),
        Commands::Request {
            method,
            path,
            body,
            skip_auth,
        } => commands::request::run(&runtime, &method, &path, body.as_deref(), skip_auth).await,
    }
}
