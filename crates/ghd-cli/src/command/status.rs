//! `ghd status`: one session in detail, or every session.

use clap::Parser;

use super::Context;
use crate::format;

#[derive(Parser, Debug)]
pub struct StatusArgs {
    /// Session: `owner/repo#N`, issue URL, or issue number [default: list all]
    pub target: Option<String>,
}

pub fn execute(ctx: &Context, args: &StatusArgs) -> anyhow::Result<()> {
    match &args.target {
        Some(target) => {
            let handle = ctx.session(target)?;
            let session = ctx.discussion.status(&handle)?;
            let messages = handle.messages()?.last_seq()?;
            println!("{}", format::session(&session));
            println!("\nMessages: {messages}");
        }
        None => {
            let sessions = ctx.discussion.list()?;
            eprintln!("Store: {}", ctx.config.home.display());
            println!("{}", format::session_list(&sessions));
        }
    }
    Ok(())
}
