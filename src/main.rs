//! rtm-client - real-time messaging gateway client
//!
//! Operator binary around the `rtm_client` library: connects to a gateway URL,
//! logs the events it receives and exits when the connection ends or on Ctrl-C.

mod cli;

use clap::Parser;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use rtm_client::config::{self, AppConfig};
use rtm_client::error::{Error, ErrorCode, Result};
use rtm_client::session::CLOSE_HANDSHAKE_TIMEOUT;
use rtm_client::{logging, version, CloseReason, RtmClient};

use crate::cli::{Cli, Commands, ConfigSubcommand, DEFAULT_EVENTS};

fn main() {
    let cli = Cli::parse();

    let exit_code = match run_command(cli) {
        Ok(code) => code,
        Err(e) => {
            eprint!("{}", e.format_for_terminal());
            e.exit_code()
        }
    };

    std::process::exit(exit_code);
}

/// Execute the selected command; returns the process exit code
fn run_command(cli: Cli) -> Result<i32> {
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(0)
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)?;
            Ok(0)
        }
        Commands::Run { config, url, events } => {
            let mut app_config = AppConfig::load(config.as_deref())?;
            if let Some(url) = url {
                app_config.gateway.url = url;
                app_config.validate()?;
            }

            let _log_guards = logging::init_logging(&app_config.logging, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                target = %build.target,
                profile = %build.profile,
                "Starting rtm-client"
            );

            let events = if events.is_empty() {
                DEFAULT_EVENTS.iter().map(|s| s.to_string()).collect()
            } else {
                events
            };

            let runtime = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(num_cpus::get().clamp(1, 4))
                .enable_all()
                .build()
                .map_err(|e| Error::Internal(format!("Failed to create runtime: {}", e)))?;

            runtime.block_on(run_client(app_config, events))
        }
    }
}

/// How a `run` session ended
enum Ended {
    Interrupted,
    Closed(CloseReason),
    Failed { code: ErrorCode, message: String },
}

/// Connect, log events until the session ends, then close
async fn run_client(app_config: AppConfig, events: Vec<String>) -> Result<i32> {
    let client_config = app_config.gateway.to_client_config()?;
    let client = RtmClient::new(client_config);

    for event_type in &events {
        let name = event_type.clone();
        client.add_listener(event_type.as_str(), move |document| {
            info!(event_type = %name, payload = %document, "Event received");
            Ok(())
        });
    }

    let (ended_tx, mut ended_rx) = mpsc::unbounded_channel();

    let tx = ended_tx.clone();
    client.add_close_listener(move |reason| {
        let _ = tx.send(Ended::Closed(reason.clone()));
        Ok(())
    });
    client.add_failure_listener(move |error| {
        let _ = ended_tx.send(Ended::Failed {
            code: error.code(),
            message: error.to_string(),
        });
        Ok(())
    });

    client.connect()?;
    info!(events = ?events, "Listening for events, press Ctrl-C to stop");

    let ended = tokio::select! {
        result = tokio::signal::ctrl_c() => {
            if let Err(e) = result {
                warn!(error = %e, "Failed to listen for Ctrl-C");
            }
            Ended::Interrupted
        }
        Some(ended) = ended_rx.recv() => ended,
    };

    client.close();
    if let Some(session) = client.session() {
        let grace = CLOSE_HANDSHAKE_TIMEOUT * 2;
        if tokio::time::timeout(grace, session.released()).await.is_err() {
            warn!(session = %session.id(), "Socket not released before shutdown");
        }
    }

    match ended {
        Ended::Interrupted => {
            info!("Shutdown signal received, connection closed");
            Ok(0)
        }
        Ended::Closed(reason) => Err(Error::TransportClosed {
            code: reason.code,
            reason: reason.reason,
        }),
        Ended::Failed { code, message } => {
            error!(code = %code, error = %message, "Connection failed");
            eprintln!("Error [{}]: {}", code, message);
            Ok(code.exit_code())
        }
    }
}

fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = AppConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration file created: {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            AppConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}
