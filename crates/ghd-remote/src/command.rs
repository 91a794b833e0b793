//! `gh api` command lines.

use std::path::PathBuf;

use thiserror::Error;

/// Failure to turn the configured `gh` command into a process.
#[derive(Debug, Error)]
pub enum CommandBuildError {
    #[error("GitHub CLI command {0:?} cannot be split into words")]
    UnparsableBase(String),
    #[error("GitHub CLI command is empty")]
    EmptyBase,
    #[error("GitHub CLI not found: {0} (install gh or set GHD_GH)")]
    NotInstalled(String),
}

/// The configured `gh` command line, e.g. `gh` or `gh --hostname ghe.example.com`.
#[derive(Debug, Clone)]
pub struct GhCommand {
    base: String,
}

impl GhCommand {
    #[must_use]
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }

    #[must_use]
    pub fn base(&self) -> &str {
        &self.base
    }

    /// Program and arguments for one request.
    ///
    /// # Errors
    /// Returns error if the base command is unparsable or empty.
    pub fn invocation(&self, request: &ApiRequest) -> Result<Invocation, CommandBuildError> {
        let mut words = shlex::split(&self.base)
            .ok_or_else(|| CommandBuildError::UnparsableBase(self.base.clone()))?;
        if words.is_empty() {
            return Err(CommandBuildError::EmptyBase);
        }
        let program = words.remove(0);
        words.extend(request.args());
        Ok(Invocation {
            program,
            args: words,
        })
    }
}

/// A ready-to-run `gh` process description.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
}

impl Invocation {
    /// Locate the program.
    ///
    /// # Errors
    /// Returns `NotInstalled` if it is neither an existing path nor on `PATH`.
    pub async fn resolve(self) -> Result<(PathBuf, Vec<String>), CommandBuildError> {
        match find_executable(&self.program).await {
            Some(path) => Ok((path, self.args)),
            None => Err(CommandBuildError::NotInstalled(self.program)),
        }
    }
}

/// One `gh api` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiRequest {
    endpoint: String,
    post: bool,
    fields: Vec<(String, String)>,
    paginate: bool,
}

impl ApiRequest {
    #[must_use]
    pub fn get(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            post: false,
            fields: Vec::new(),
            paginate: false,
        }
    }

    #[must_use]
    pub fn post(endpoint: impl Into<String>) -> Self {
        Self {
            post: true,
            ..Self::get(endpoint)
        }
    }

    /// Add a string field, sent verbatim (`-f key=value`).
    #[must_use]
    pub fn field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Follow every page of a list response.
    #[must_use]
    pub const fn paginate(mut self) -> Self {
        self.paginate = true;
        self
    }

    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Arguments after the base command: `api <endpoint> [--method POST] [--paginate] [-f k=v]...`
    #[must_use]
    pub fn args(&self) -> Vec<String> {
        let mut args = vec!["api".to_string(), self.endpoint.clone()];
        if self.post {
            args.extend(["--method".to_string(), "POST".to_string()]);
        }
        if self.paginate {
            args.push("--paginate".to_string());
        }
        for (key, value) in &self.fields {
            args.push("-f".to_string());
            args.push(format!("{key}={value}"));
        }
        args
    }
}

/// Find an executable: absolute paths must exist, anything else goes
/// through a `PATH` search.
pub async fn find_executable(name: &str) -> Option<PathBuf> {
    let name = name.trim();
    if name.is_empty() {
        return None;
    }
    let candidate = PathBuf::from(name);
    if candidate.is_absolute() {
        return candidate.is_file().then_some(candidate);
    }
    let name = name.to_string();
    tokio::task::spawn_blocking(move || which::which(name).ok())
        .await
        .ok()
        .flatten()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_invocation() {
        let invocation = GhCommand::new("gh")
            .invocation(&ApiRequest::get("repos/acme/widgets/issues/7"))
            .unwrap();
        assert_eq!(invocation.program, "gh");
        assert_eq!(invocation.args, vec!["api", "repos/acme/widgets/issues/7"]);
    }

    #[test]
    fn test_post_with_fields_on_enterprise_host() {
        let request = ApiRequest::post("repos/acme/widgets/issues")
            .field("title", "A title")
            .field("body", "line 1\nline=2")
            .paginate();
        let invocation = GhCommand::new("gh --hostname ghe.example.com")
            .invocation(&request)
            .unwrap();

        assert_eq!(invocation.program, "gh");
        assert_eq!(
            invocation.args,
            vec![
                "--hostname",
                "ghe.example.com",
                "api",
                "repos/acme/widgets/issues",
                "--method",
                "POST",
                "--paginate",
                "-f",
                "title=A title",
                "-f",
                "body=line 1\nline=2",
            ]
        );
    }

    #[test]
    fn test_bad_base_commands() {
        let request = ApiRequest::get("user");
        let err = GhCommand::new("gh 'unterminated").invocation(&request).unwrap_err();
        assert!(matches!(err, CommandBuildError::UnparsableBase(_)));

        let err = GhCommand::new("   ").invocation(&request).unwrap_err();
        assert!(matches!(err, CommandBuildError::EmptyBase));
    }

    #[tokio::test]
    async fn test_missing_executable() {
        assert!(find_executable("").await.is_none());
        assert!(find_executable("definitely-not-a-real-ghd-binary").await.is_none());
        assert!(find_executable("/definitely/not/here/gh").await.is_none());

        let err = Invocation {
            program: "definitely-not-a-real-ghd-binary".into(),
            args: Vec::new(),
        }
        .resolve()
        .await
        .unwrap_err();
        assert!(err.to_string().contains("GHD_GH"));
    }
}
