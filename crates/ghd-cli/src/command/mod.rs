//! One module per subcommand, each exposing `XxxArgs` and `execute`.

use std::sync::Arc;

use ghd_core::{GhdConfig, IssueTracker};
use ghd_remote::{GhClient, OfflineTracker};
use ghd_session::{SessionHandle, SessionIdent, SessionRegistry};
use ghd_sync::Discussion;

use crate::cli::{Cli, Commands};

pub mod end;
pub mod log;
pub mod recv;
pub mod send;
pub mod start;
pub mod status;
pub mod wait;

/// Tracker chosen at runtime.
pub type Tracker = Arc<dyn IssueTracker>;

/// What every command runs against.
pub struct Context {
    pub config: GhdConfig,
    pub discussion: Discussion<Tracker>,
}

impl Context {
    #[must_use]
    pub fn new(config: GhdConfig) -> Self {
        let tracker: Tracker = if config.offline {
            Arc::new(OfflineTracker)
        } else {
            Arc::new(GhClient::from_config(&config))
        };
        tracing::debug!(home = %config.home.display(), offline = config.offline, "Opening store");
        Self {
            discussion: Discussion::new(SessionRegistry::from_config(&config), tracker),
            config,
        }
    }

    /// Resolve a session target (`owner/repo#N`, URL, or issue number).
    ///
    /// # Errors
    /// Returns error if the target is malformed, unknown or ambiguous.
    pub fn session(&self, target: &str) -> anyhow::Result<SessionHandle> {
        let ident: SessionIdent = target.parse()?;
        Ok(self.discussion.find(&ident)?)
    }
}

/// Run the parsed command line.
///
/// # Errors
/// Returns the command's error, with a stable code somewhere in its chain.
pub async fn execute(cli: Cli) -> anyhow::Result<()> {
    let ctx = Context::new(cli.global.config());
    match cli.command {
        Commands::Start(args) => start::execute(&ctx, args).await,
        Commands::Send(args) => send::execute(&ctx, args).await,
        Commands::Recv(args) => recv::execute(&ctx, args).await,
        Commands::Wait(args) => wait::execute(&ctx, args).await,
        Commands::Log(args) => log::execute(&ctx, &args),
        Commands::Status(args) => status::execute(&ctx, &args),
        Commands::End(args) => end::execute(&ctx, &args),
    }
}
