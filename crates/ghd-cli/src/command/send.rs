//! `ghd send` (alias `post`): append a message and push it to the thread.

use std::io::{IsTerminal, Read};

use anyhow::Context as _;
use clap::Parser;
use ghd_sync::{SendReport, SyncError};

use super::{
    Context,
    wait::{self, DEFAULT_INTERVAL, DEFAULT_TIMEOUT},
};

#[derive(Parser, Debug)]
pub struct SendArgs {
    /// Session: `owner/repo#N`, issue URL, or issue number
    pub target: String,

    /// Agent name
    #[arg(long = "as", value_name = "NAME")]
    pub agent: String,

    /// Role for this message [default: the agent's registered role]
    #[arg(long)]
    pub role: Option<String>,

    /// Message text; read from stdin when omitted
    #[arg(short, long)]
    pub message: Option<String>,

    /// Wait for a reply after sending
    #[arg(long)]
    pub wait: bool,

    /// Seconds to wait for a reply (with --wait)
    #[arg(long, default_value_t = DEFAULT_TIMEOUT, value_parser = clap::value_parser!(u64).range(1..))]
    pub timeout: u64,

    /// Seconds between remote polls (with --wait)
    #[arg(long, default_value_t = DEFAULT_INTERVAL, value_parser = clap::value_parser!(u64).range(1..))]
    pub interval: u64,
}

pub async fn execute(ctx: &Context, args: SendArgs) -> anyhow::Result<()> {
    let handle = ctx.session(&args.target)?;
    let body = match args.message {
        Some(message) => message,
        None => read_stdin()?,
    };

    let report = ctx
        .discussion
        .send(&handle, &args.agent, args.role.as_deref(), &body)
        .await?;
    println!("{}", render(&report));

    if args.wait {
        let messages =
            wait::wait_for_reply(ctx, &handle, &args.agent, args.timeout, args.interval).await?;
        println!("{}", wait::render(&messages));
    }
    Ok(())
}

fn read_stdin() -> anyhow::Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(SyncError::InvalidArguments(
            "No message provided. Pass --message or pipe it on stdin.".into(),
        )
        .into());
    }
    let mut body = String::new();
    stdin
        .read_to_string(&mut body)
        .context("reading message from stdin")?;
    Ok(body.trim().to_string())
}

fn render(report: &SendReport) -> String {
    let seq = report.message.seq;
    match &report.remote_url {
        Some(url) => format!("Sent #{seq}: {url}"),
        None => format!("Sent #{seq} (local only, not posted to the issue)"),
    }
}
