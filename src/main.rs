//! boatview headless receiver.

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info, Level};

use boatview::config::ReceiverConfig;
use boatview::logger::{init_tracing, LogFormat};
use boatview::peer::ServerConfig;
use boatview::{ReceiverBuilder, Result};

/// Receives the boat camera stream and keeps the latest frame.
#[derive(Debug, Parser)]
#[command(name = "boatview")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to a TOML configuration file
    #[arg(long, short, env = "BOATVIEW_CONFIG")]
    config: Option<PathBuf>,

    /// Relay base url; `/signaling` is appended
    #[arg(long, env = "BOATVIEW_WS_URL")]
    base_url: Option<String>,

    /// Write the latest frame to this file
    #[arg(long, env = "BOATVIEW_FRAME_OUT")]
    frame_out: Option<PathBuf>,

    /// STUN/TURN url, replaces the configured list (can be repeated)
    #[arg(long = "ice-server", action = clap::ArgAction::Append)]
    ice_servers: Vec<String>,

    /// Delay before redialing the relay, in milliseconds
    #[arg(long)]
    reconnect_ms: Option<u64>,

    /// Give up on a relay handshake after this many milliseconds
    #[arg(long)]
    dial_timeout_ms: Option<u64>,

    #[arg(long, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    /// Enable debug output
    #[arg(long, short = 'v')]
    debug: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let level = if cli.debug { Level::DEBUG } else { Level::INFO };
    if let Err(e) = init_tracing(cli.log_format, level) {
        eprintln!("error: {e}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = load_config(&cli)?;
    info!(
        base_url = %config.base_url,
        frame_output = ?config.frame_output,
        "starting receiver"
    );

    let receiver = ReceiverBuilder::new(config).spawn()?;

    tokio::signal::ctrl_c().await?;
    info!("interrupted, shutting down");
    receiver.shutdown().await;
    Ok(())
}

fn load_config(cli: &Cli) -> Result<ReceiverConfig> {
    let mut config = match &cli.config {
        Some(path) => ReceiverConfig::load(path)?,
        None => ReceiverConfig::default(),
    };

    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url.clone());
    }
    if let Some(ms) = cli.reconnect_ms {
        config = config.with_reconnect_delay(Duration::from_millis(ms));
    }
    if let Some(ms) = cli.dial_timeout_ms {
        config = config.with_dial_timeout(Duration::from_millis(ms));
    }
    if cli.frame_out.is_some() {
        config.frame_output = cli.frame_out.clone();
    }
    if !cli.ice_servers.is_empty() {
        let servers = cli
            .ice_servers
            .iter()
            .enumerate()
            .map(|(i, url)| ServerConfig {
                id: format!("cli-{i}"),
                r#type: if url.starts_with("turn") { "turn" } else { "stun" }.to_string(),
                url: url.clone(),
                username: None,
                credential: None,
            })
            .collect();
        config = config.with_ice_servers(servers);
    }

    config.validate()?;
    Ok(config)
}
