//! CLI entry and dispatch.

use anyhow::{Context, Result};
use authflow_core::config::{self, Config};
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "authflow")]
#[command(version)]
#[command(about = "Log in to and out of a token-authenticated API")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override the API base URL from config
    #[arg(long, global = true, value_name = "URL")]
    base_url: Option<String>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Log in and store the issued token
    Login {
        /// Account username
        #[arg(short, long)]
        username: String,

        /// Account password (read from stdin when omitted)
        #[arg(short, long, env = "AUTHFLOW_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Log out (discard the stored token)
    Logout,

    /// Show the current session
    Status,

    /// Manage configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

#[derive(clap::Subcommand)]
enum ConfigCommands {
    /// Show the path to the config file
    Path,
    /// Initialize a default config file (if not present)
    Init,
}

pub fn run() -> Result<()> {
    let cli = Cli::parse();

    // one tokio runtime for everything
    let rt = tokio::runtime::Runtime::new().context("create tokio runtime")?;
    rt.block_on(async move { dispatch(cli).await })
}

async fn dispatch(cli: Cli) -> Result<()> {
    let Cli { command, base_url } = cli;

    match command {
        // Config commands must work even when the config file is broken.
        Commands::Config { command } => {
            init_tracing(None);
            match command {
                ConfigCommands::Path => {
                    commands::config::path();
                    Ok(())
                }
                ConfigCommands::Init => commands::config::init(),
            }
        }

        Commands::Login { username, password } => {
            let config = load_config(base_url)?;
            commands::auth::login(&config, &username, password).await
        }

        Commands::Logout => {
            let config = load_config(base_url)?;
            commands::auth::logout(&config)
        }

        Commands::Status => {
            load_config(base_url)?;
            commands::auth::status()
        }
    }
}

/// Loads config, applies the `--base-url` flag and sets up logging.
fn load_config(base_url: Option<String>) -> Result<Config> {
    let mut config = Config::load().context("load config")?;
    if let Some(url) = base_url {
        config.api.base_url = url;
        config.validate()?;
    }
    init_tracing(Some(&config));
    Ok(config)
}

/// Installs a stderr subscriber; `RUST_LOG` wins over the configured level.
fn init_tracing(config: Option<&Config>) {
    let fallback = config.map_or_else(
        || Config::default().log_level,
        |config| config.log_level.clone(),
    );
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();

    tracing::debug!(config = %config::paths::config_path().display(), "Logging initialised");
}
