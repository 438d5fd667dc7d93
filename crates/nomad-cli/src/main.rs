//! `nomad` CLI: run the HTTP gateway, chat from the terminal, or inspect the
//! effective configuration.
//!
//! Logging: set `RUST_LOG` (e.g. `nomad_agents=debug`) to adjust verbosity.

mod repl;

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand, ValueEnum};
use nomad_config::{AppConfig, ConfigLoader};
use nomad_gateway::{AppState, GatewayServer};
use nomad_security::RedactingWriter;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "nomad", version, about = "NomadAI hotel concierge")]
struct Cli {
    /// Path to the TOML config file
    #[arg(short, long, global = true, default_value = "nomad.toml", env = "NOMAD_CONFIG")]
    config: PathBuf,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP gateway
    Serve {
        /// Override gateway.host
        #[arg(long)]
        host: Option<String>,
        /// Override gateway.port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Chat with the concierge from the terminal
    Chat {
        /// Hotel profile to answer for
        #[arg(long)]
        hotel: Option<String>,
        /// Reply language code
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// Print the effective configuration with secrets masked
    Config,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_level = match cli.command {
        Command::Chat { .. } => "warn",
        _ => "info",
    };
    init_tracing(cli.log_format, default_level);

    let config = ConfigLoader::new(&cli.config)
        .load()
        .with_context(|| format!("failed to load config from {}", cli.config.display()))?;

    match cli.command {
        Command::Serve { host, port } => serve(config, host, port).await,
        Command::Chat { hotel, language } => {
            let state = AppState::from_config(config).context("failed to build runtime")?;
            repl::run(state.into_shared(), hotel, language).await
        }
        Command::Config => {
            let rendered = toml::to_string_pretty(&masked(config))
                .context("failed to render config")?;
            println!("{rendered}");
            Ok(())
        }
    }
}

fn init_tracing(format: LogFormat, default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(RedactingWriter::stderr());
    let _ = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
}

async fn serve(
    mut config: AppConfig,
    host: Option<String>,
    port: Option<u16>,
) -> anyhow::Result<()> {
    if let Some(host) = host {
        config.gateway.host = host;
    }
    if let Some(port) = port {
        config.gateway.port = port;
    }

    let state = AppState::from_config(config).context("failed to build gateway state")?;
    GatewayServer::new(state.into_shared())
        .run()
        .await
        .context("gateway exited with an error")
}

/// Copy of `config` safe to print.
fn masked(mut config: AppConfig) -> AppConfig {
    const MASK: &str = "********";
    if config.llm.api_key.is_some() {
        config.llm.api_key = Some(MASK.to_string());
    }
    if config.speech.api_key.is_some() {
        config.speech.api_key = Some(MASK.to_string());
    }
    for profile in config.hotels.values_mut() {
        if !profile.wifi_password.is_empty() {
            profile.wifi_password = MASK.to_string();
        }
    }
    config
}
