//! `ghd log`: the session's full message log.

use clap::Parser;

use super::Context;
use crate::format;

#[derive(Parser, Debug)]
pub struct LogArgs {
    /// Session: `owner/repo#N`, issue URL, or issue number
    pub target: String,

    /// Mark messages this agent has not read yet
    #[arg(long = "as", value_name = "NAME")]
    pub agent: Option<String>,

    /// Only the newest N messages
    #[arg(long, value_name = "N", value_parser = clap::value_parser!(u64).range(1..))]
    pub last: Option<u64>,
}

pub fn execute(ctx: &Context, args: &LogArgs) -> anyhow::Result<()> {
    let handle = ctx.session(&args.target)?;
    let session = ctx.discussion.status(&handle)?;
    let last = args.last.map(|n| usize::try_from(n).unwrap_or(usize::MAX));
    let messages = ctx.discussion.log(&handle, last)?;

    if last.is_none() {
        println!("{}", format::issue(&session));
    }
    let unread = |msg: &ghd_core::LocalMessage| match &args.agent {
        Some(agent) => !msg.is_from(agent) && msg.seq > session.cursor(agent),
        None => false,
    };
    println!("{}", format::messages(&messages, unread));
    Ok(())
}
