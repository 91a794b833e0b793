//! `ghd start`: join the discussion on an issue, or open a new issue.

use clap::Parser;
use ghd_session::{RegistryError, SessionIdent, SessionKey, ident::split_repo};
use ghd_sync::{StartReport, SyncError};

use super::Context;

#[derive(Parser, Debug)]
pub struct StartArgs {
    /// `owner/repo` (with --issue or --title), `owner/repo#N`, or an issue URL
    pub target: String,

    /// Issue number on `owner/repo`
    #[arg(long, value_parser = clap::value_parser!(u64).range(1..))]
    pub issue: Option<u64>,

    /// Agent name
    #[arg(long = "as", value_name = "NAME")]
    pub agent: String,

    /// Role shown next to the agent name
    #[arg(long)]
    pub role: Option<String>,

    /// Open a new issue with this title
    #[arg(long, conflicts_with = "issue")]
    pub title: Option<String>,

    /// Body of the new issue
    #[arg(long, requires = "title")]
    pub body: Option<String>,
}

/// Where `start` should go.
#[derive(Debug, PartialEq, Eq)]
enum StartTarget<'a> {
    Existing(SessionKey),
    NewIssue { owner: &'a str, repo: &'a str },
}

fn resolve(args: &StartArgs) -> Result<StartTarget<'_>, SyncError> {
    if let Some(issue) = args.issue {
        return Ok(StartTarget::Existing(SessionKey::from_repo(&args.target, issue)?));
    }
    match args.target.parse::<SessionIdent>() {
        Ok(SessionIdent::Full(key)) if args.title.is_none() => Ok(StartTarget::Existing(key)),
        Ok(SessionIdent::Full(_)) => Err(SyncError::InvalidArguments(
            "--title opens a new issue; pass only owner/repo with it".into(),
        )),
        Ok(SessionIdent::Issue(_)) => Err(SyncError::InvalidArguments(
            "start needs the repository: use owner/repo#N or owner/repo --issue N".into(),
        )),
        Err(RegistryError::InvalidIdentifier(_)) if args.title.is_some() => {
            let (owner, repo) = split_repo(&args.target)?;
            Ok(StartTarget::NewIssue { owner, repo })
        }
        Err(RegistryError::InvalidIdentifier(_)) => Err(SyncError::InvalidArguments(format!(
            "No issue given for {:?}: pass --issue N, use owner/repo#N, or pass --title to open a new issue",
            args.target
        ))),
        Err(err) => Err(err.into()),
    }
}

pub async fn execute(ctx: &Context, args: StartArgs) -> anyhow::Result<()> {
    let role = args.role.as_deref();
    let report = match resolve(&args)? {
        StartTarget::Existing(key) => ctx.discussion.start(&key, &args.agent, role).await?,
        StartTarget::NewIssue { owner, repo } => {
            let title = args.title.as_deref().unwrap_or_default();
            let body = args.body.as_deref().unwrap_or_default();
            ctx.discussion
                .start_new_issue(owner, repo, title, body, &args.agent, role)
                .await?
        }
    };
    print!("{}", render(&report, &args.agent));
    Ok(())
}

fn render(report: &StartReport, agent: &str) -> String {
    let key = report.handle.key();
    let role = report
        .agent
        .role
        .as_deref()
        .map(|r| format!(" ({r})"))
        .unwrap_or_default();
    let verb = if report.created { "Session started" } else { "Joined session" };

    let mut out = format!("{verb}: {key} as @{agent}{role}\n");
    if !report.session.issue_title.is_empty() {
        out.push_str(&format!("Issue: {}\n", report.session.issue_title));
    }
    if !report.session.issue_url.is_empty() {
        out.push_str(&format!("URL: {}\n", report.session.issue_url));
    }
    if report.imported > 0 {
        out.push_str(&format!("Imported {} remote comment(s)\n", report.imported));
    }
    if let Some(warning) = &report.remote_warning {
        out.push_str(&format!("Remote not synced: {warning}\n"));
    }
    out.push_str(&format!(
        "Reading from message #{}\n",
        report.agent.cursor + 1
    ));
    out
}
