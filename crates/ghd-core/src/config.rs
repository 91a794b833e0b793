//! Runtime configuration shared by every ghd invocation.

use std::{path::PathBuf, time::Duration};

/// Environment variable overriding the store location.
pub const HOME_ENV: &str = "GHD_HOME";
/// Environment variable overriding the `gh` command line.
pub const GH_ENV: &str = "GHD_GH";
/// Environment variable forcing offline mode.
pub const OFFLINE_ENV: &str = "GHD_OFFLINE";

const DEFAULT_DIR: &str = ".ghd";
const DEFAULT_GH: &str = "gh";
const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(10);

/// Configuration for the local store and the remote client.
///
/// Every field has an environment override; the CLI layers its own flags
/// on top of [`GhdConfig::from_env`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GhdConfig {
    /// Root directory holding every session.
    pub home: PathBuf,

    /// Command line used to reach the GitHub CLI (split shell-style).
    pub gh_command: String,

    /// Skip every remote call.
    pub offline: bool,

    /// Upper bound on waiting for a store or session lock.
    pub lock_timeout: Duration,
}

impl Default for GhdConfig {
    fn default() -> Self {
        Self::new(default_home())
    }
}

impl GhdConfig {
    /// Create a configuration rooted at `home` with default settings.
    #[must_use]
    pub fn new(home: PathBuf) -> Self {
        Self {
            home,
            gh_command: DEFAULT_GH.to_string(),
            offline: false,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
        }
    }

    /// Build a configuration from `GHD_HOME`, `GHD_GH` and `GHD_OFFLINE`.
    #[must_use]
    pub fn from_env() -> Self {
        let home = std::env::var_os(HOME_ENV)
            .filter(|v| !v.is_empty())
            .map_or_else(default_home, PathBuf::from);

        let mut config = Self::new(home);
        if let Ok(gh) = std::env::var(GH_ENV) {
            if !gh.trim().is_empty() {
                config.gh_command = gh;
            }
        }
        config.offline = std::env::var(OFFLINE_ENV).is_ok_and(|v| parse_flag(&v));
        config
    }

    /// Override the store location.
    #[must_use]
    pub fn with_home(mut self, home: impl Into<PathBuf>) -> Self {
        self.home = home.into();
        self
    }

    /// Override the `gh` command line.
    #[must_use]
    pub fn with_gh_command(mut self, command: impl Into<String>) -> Self {
        self.gh_command = command.into();
        self
    }

    /// Enable or disable offline mode.
    #[must_use]
    pub const fn with_offline(mut self, offline: bool) -> Self {
        self.offline = offline;
        self
    }

    /// Override the lock timeout.
    #[must_use]
    pub const fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }
}

fn default_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(DEFAULT_DIR)
}

fn parse_flag(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}
