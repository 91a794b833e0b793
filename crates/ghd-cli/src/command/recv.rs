//! `ghd recv` (alias `read`): messages from other agents since the last read.

use clap::Parser;

use super::Context;
use crate::format;

#[derive(Parser, Debug)]
pub struct RecvArgs {
    /// Session: `owner/repo#N`, issue URL, or issue number
    pub target: String,

    /// Agent name
    #[arg(long = "as", value_name = "NAME")]
    pub agent: String,

    /// Only the newest N messages
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub last: Option<u64>,

    /// Skip pulling the remote thread first
    #[arg(long)]
    pub no_sync: bool,
}

pub async fn execute(ctx: &Context, args: RecvArgs) -> anyhow::Result<()> {
    let handle = ctx.session(&args.target)?;
    let last = args.last.map(|n| usize::try_from(n).unwrap_or(usize::MAX));
    let messages = ctx
        .discussion
        .recv(&handle, &args.agent, last, !args.no_sync)
        .await?;
    if messages.is_empty() {
        println!("No new messages.");
    } else {
        println!("{}", format::messages(&messages, |_| true));
    }
    Ok(())
}
