//! Huddle CLI entry point.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use eyre::Result;
use huddle_observability::{LogArgs, init_logging};

use crate::config::HuddleConfig;
use crate::simulate;

/// Huddle - nearby multiplayer lobby orchestration
#[derive(Debug, Parser)]
#[command(author, version, about, long_about = None)]
pub(crate) struct HuddleCli {
    /// Logging configuration (applies to all subcommands).
    #[command(flatten)]
    pub(crate) logs: LogArgs,

    #[command(subcommand)]
    pub(crate) command: HuddleCommands,
}

/// Available commands.
#[derive(Debug, Subcommand)]
pub(crate) enum HuddleCommands {
    /// Run a host and several players over an in-process radio.
    Simulate(SimulateArgs),
    /// Print the effective configuration as TOML.
    Config(SimulateArgs),
}

#[derive(Debug, Clone, Default, Args)]
pub(crate) struct SimulateArgs {
    /// Path to a TOML config file.
    #[arg(long, value_name = "FILE")]
    pub(crate) config: Option<PathBuf>,

    /// Service id to advertise and discover under.
    #[arg(long, value_name = "ID")]
    pub(crate) service: Option<String>,

    /// Room name the host advertises.
    #[arg(long)]
    pub(crate) room: Option<String>,

    /// Number of joining players.
    #[arg(long, short = 'n')]
    pub(crate) players: Option<usize>,

    /// Message rounds after everyone joined.
    #[arg(long)]
    pub(crate) rounds: Option<u32>,

    /// Cap on connected peers per device.
    #[arg(long = "max-peers", value_name = "N")]
    pub(crate) max_peers: Option<usize>,
}

impl SimulateArgs {
    fn resolve(&self) -> Result<HuddleConfig> {
        let mut config = HuddleConfig::load(self.config.as_deref())?;
        config.apply_args(self);
        Ok(config)
    }
}

pub(crate) async fn run() -> Result<()> {
    let cli = HuddleCli::parse();
    init_logging(&cli.logs)?;

    match cli.command {
        HuddleCommands::Simulate(args) => {
            let config = args.resolve()?;
            let summary = simulate::run(&config).await?;
            println!("{summary}");
        }
        HuddleCommands::Config(args) => {
            print!("{}", args.resolve()?.to_toml()?);
        }
    }
    Ok(())
}
