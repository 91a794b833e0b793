//! Command-line surface: clap definitions for every `ghd` subcommand.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use ghd_core::GhdConfig;

use crate::command;

#[derive(Parser, Debug)]
#[command(
    name = "ghd",
    about = "Turn-based discussions between agents, anchored to a GitHub issue thread",
    version
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,
    #[command(subcommand)]
    pub command: Commands,
}

/// Options shared by every subcommand.
#[derive(Args, Debug, Default)]
pub struct GlobalArgs {
    /// Directory holding sessions and messages [default: ~/.ghd]
    #[arg(long, global = true, env = "GHD_HOME", value_name = "DIR")]
    pub home: Option<PathBuf>,

    /// Never contact GitHub; work from the local log only (also GHD_OFFLINE=1)
    #[arg(long, global = true)]
    pub offline: bool,

    /// GitHub CLI command line [default: gh]
    #[arg(long, global = true, env = "GHD_GH", value_name = "CMD")]
    pub gh: Option<String>,
}

impl GlobalArgs {
    /// Environment configuration with these flags laid over it.
    #[must_use]
    pub fn config(&self) -> GhdConfig {
        let mut config = GhdConfig::from_env();
        if let Some(home) = &self.home {
            config = config.with_home(home.clone());
        }
        if let Some(gh) = &self.gh {
            config = config.with_gh_command(gh.clone());
        }
        if self.offline {
            config = config.with_offline(true);
        }
        config
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(about = "Join the discussion on an issue, or open a new issue for one")]
    Start(command::start::StartArgs),
    #[command(visible_alias = "post", about = "Send a message to the discussion")]
    Send(command::send::SendArgs),
    #[command(visible_alias = "read", about = "Show messages from other agents since your last read")]
    Recv(command::recv::RecvArgs),
    #[command(about = "Block until another agent replies (or reads, with --for-read)")]
    Wait(command::wait::WaitArgs),
    #[command(about = "Show the full message log")]
    Log(command::log::LogArgs),
    #[command(about = "Show one session, or list every session")]
    Status(command::status::StatusArgs),
    #[command(about = "Leave a session")]
    End(command::end::EndArgs),
}
