//! `ghd end`: leave a session. The message log is kept.

use clap::Parser;

use super::Context;

#[derive(Parser, Debug)]
pub struct EndArgs {
    /// Session: `owner/repo#N`, issue URL, or issue number
    pub target: String,

    /// Agent name
    #[arg(long = "as", value_name = "NAME")]
    pub agent: String,
}

pub fn execute(ctx: &Context, args: &EndArgs) -> anyhow::Result<()> {
    let handle = ctx.session(&args.target)?;
    if ctx.discussion.end(&handle, &args.agent)? {
        println!("Session ended for @{}: {}", args.agent, handle.key());
    } else {
        println!("@{} was not part of {}", args.agent, handle.key());
    }
    Ok(())
}
