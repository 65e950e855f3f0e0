//! push-session - command line entry point
//!
//! `demo` runs a session against the in-memory push server and logs every
//! status change and MPN notification until interrupted. `config` validates
//! a configuration file.

use clap::{Parser, Subcommand};
use push_session::config::ClientConfig;
use push_session::observability::{init_default_logging, init_logging, LogFormat};
use push_session::protocol::{ConnectionStatus, LoggingTableListener, Subscription};
use push_session::testing::MockTransport;
use push_session::PushClient;
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info, Level};

/// Push session client
#[derive(Parser)]
#[command(name = "push-session")]
#[command(about = "Client-side push session coordinator")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", env = "PUSH_SESSION_CONFIG")]
    config: Option<PathBuf>,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a session against the in-memory push server
    Demo,
    /// Validate the configuration
    Config {
        /// Print the parsed configuration
        #[arg(long)]
        show: bool,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, LogFormat::Compact, false),
        _ => init_logging(Level::TRACE, LogFormat::Compact, true),
    }

    let config = match load_configuration(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Failed to load configuration: {}", e);
            process::exit(1);
        }
    };

    let result = match cli.command {
        Commands::Demo => run_demo(config).await,
        Commands::Config { show } => handle_config_command(&config, show),
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(
    config_path: &Option<PathBuf>,
) -> Result<ClientConfig, Box<dyn std::error::Error>> {
    if let Some(path) = config_path {
        info!("Loading configuration from: {}", path.display());
        return Ok(ClientConfig::load_from_file(path)?);
    }

    for path_str in ["push-session.toml", "config/push-session.toml"] {
        let path = PathBuf::from(path_str);
        if path.exists() {
            info!("Loading configuration from: {}", path.display());
            return Ok(ClientConfig::load_from_file(&path)?);
        }
    }

    Err("no configuration file found, pass -c/--config or create push-session.toml".into())
}

fn handle_config_command(
    config: &ClientConfig,
    show: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    info!(
        server_url = %config.server.url,
        subscriptions = config.subscriptions.len(),
        "Configuration is valid"
    );
    if show {
        println!("{}", toml::to_string_pretty(config)?);
    }
    Ok(())
}

async fn run_demo(config: ClientConfig) -> Result<(), Box<dyn std::error::Error>> {
    let transport = Arc::new(MockTransport::new());
    let client = PushClient::from_config(transport, &config)?;

    client.set_status_listener(|status: ConnectionStatus| {
        info!(
            status = %status,
            code = status.code(),
            active = status.is_session_active(),
            "Status"
        );
    });

    let trigger_format = config.trigger_format();
    let mut subscriptions = Vec::new();
    for entry in &config.subscriptions {
        let group = entry.group.clone();
        let mut subscription =
            Subscription::new(entry.table_info(), Arc::new(LoggingTableListener)).with_mpn_listener(
                Arc::new(move |activated: bool, trigger: f64| {
                    info!(group = %group, activated, trigger, "MPN status");
                }),
            );
        if let Some(threshold) = entry.trigger {
            subscription = subscription.with_mpn_trigger(trigger_format.greater_than(threshold));
        }

        let subscription = Arc::new(subscription);
        client.add_subscription(&subscription);
        if entry.trigger.is_some() {
            client.activate_mpn(&subscription);
        }
        subscriptions.push(subscription);
    }

    client.start();
    info!(
        subscriptions = subscriptions.len(),
        "Session running, press Ctrl-C to stop"
    );

    let mut sigterm = signal::unix::signal(signal::unix::SignalKind::terminate())?;
    tokio::select! {
        _ = signal::ctrl_c() => info!("Received SIGINT, shutting down gracefully..."),
        _ = sigterm.recv() => info!("Received SIGTERM, shutting down gracefully..."),
    }

    client.stop(false);
    client.shutdown().await?;
    info!("Shutdown complete");
    Ok(())
}
