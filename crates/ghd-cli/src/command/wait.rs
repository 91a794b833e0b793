//! `ghd wait`: block until another agent replies or reads.

use std::time::Duration;

use clap::Parser;
use ghd_core::LocalMessage;
use ghd_session::SessionHandle;

use super::Context;
use crate::format;

pub const DEFAULT_TIMEOUT: u64 = 300;
pub const DEFAULT_INTERVAL: u64 = 10;

#[derive(Parser, Debug)]
pub struct WaitArgs {
    /// Session: `owner/repo#N`, issue URL, or issue number
    pub target: String,

    /// Agent name
    #[arg(long = "as", value_name = "NAME")]
    pub agent: String,

    /// Seconds to wait before giving up
    #[arg(long, default_value_t = DEFAULT_TIMEOUT, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Seconds between remote polls
    #[arg(long, default_value_t = DEFAULT_INTERVAL, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,

    /// Wait for another agent to read instead of reply
    #[arg(long)]
    pub for_read: bool,
}

pub async fn execute(ctx: &Context, args: WaitArgs) -> anyhow::Result<()> {
    let handle = ctx.session(&args.target)?;
    if args.for_read {
        eprintln!("Waiting for another agent to read (timeout: {}s)...", args.timeout);
        let cursors = ctx
            .discussion
            .wait_for_read(&handle, &args.agent, Duration::from_secs(args.timeout))
            .await?;
        for (agent, cursor) in cursors {
            println!("@{agent} has read up to #{cursor}");
        }
        return Ok(());
    }

    let messages = wait_for_reply(ctx, &handle, &args.agent, args.timeout, args.interval).await?;
    println!("{}", render(&messages));
    Ok(())
}

/// Shared with `send --wait`.
pub(crate) async fn wait_for_reply(
    ctx: &Context,
    handle: &SessionHandle,
    agent: &str,
    timeout: u64,
    interval: u64,
) -> anyhow::Result<Vec<LocalMessage>> {
    eprintln!("Waiting for new reply (timeout: {timeout}s, interval: {interval}s)...");
    Ok(ctx
        .discussion
        .wait(
            handle,
            agent,
            Duration::from_secs(timeout),
            Duration::from_secs(interval),
        )
        .await?)
}

pub(crate) fn render(messages: &[LocalMessage]) -> String {
    let header = format!("{} new message(s):\n\n", messages.len());
    header + &format::messages(messages, |_| true)
}
