//! CLI argument parsing using clap v4

use clap::{Parser, Subcommand};

/// rtm-client - real-time messaging gateway client
///
/// Connects to a messaging gateway over WebSocket, keeps the connection alive
/// with heartbeats and logs the events it receives.
#[derive(Parser, Debug)]
#[command(name = "rtm-client")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Connect to the gateway and log incoming events until interrupted
    Run {
        /// Path to configuration file
        #[arg(short, long, env = "RTM_CONFIG")]
        config: Option<String>,

        /// Gateway WebSocket URL (overrides the configuration)
        #[arg(short, long)]
        url: Option<String>,

        /// Event type to log; repeat for several (default: hello, message)
        #[arg(short, long = "event", value_name = "TYPE")]
        events: Vec<String>,
    },

    /// Display version and build information
    Version,

    /// Configuration management
    Config {
        #[command(subcommand)]
        subcommand: ConfigSubcommand,
    },
}

#[derive(Subcommand, Debug, Clone)]
pub enum ConfigSubcommand {
    /// Display the effective configuration
    Show {
        /// Path to configuration file
        #[arg(short, long, env = "RTM_CONFIG")]
        config: Option<String>,
    },

    /// Write a default configuration file
    Init {
        /// Where to create the file (default: ~/.rtm/client.toml)
        #[arg(short, long)]
        path: Option<String>,

        /// Overwrite an existing file
        #[arg(short, long)]
        force: bool,
    },

    /// Validate a configuration file
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long, env = "RTM_CONFIG")]
        config: Option<String>,
    },
}

/// Event types logged by `run` when none are given
pub const DEFAULT_EVENTS: [&str; 2] = ["hello", "message"];
