//! TOML-based configuration for rebasebot.
//!
//! Secrets (the GitHub token, the Slack webhook URL) are never stored in the
//! file. The file names environment variables through `*_env` fields, and
//! [`AppConfig::resolve_env_vars`] reads them at runtime.
//!
//! Every table is optional so the CLI can build a complete configuration
//! from flags alone.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conflict::FileDispositions;
use crate::errors::ConfigError;
use crate::models::{GitHubBranch, GitRef};

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Upstream repository and reference to merge from.
    #[serde(default)]
    pub source: SourceConfig,

    /// Downstream branch that receives the merge.
    #[serde(default)]
    pub dest: BranchConfig,

    /// Branch the merge result is pushed to and the PR is opened from.
    #[serde(default)]
    pub rebase: BranchConfig,

    #[serde(default)]
    pub git: GitConfig,

    #[serde(default)]
    pub github: GitHubConfig,

    /// Conflict dispositions and PR title.
    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub notifications: NotificationConfig,

    #[serde(default)]
    pub run: RunConfig,
}

// ---------------------------------------------------------------------------
// Coordinates
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    /// `<git url>:<reference>`.
    #[serde(default)]
    pub reference: Option<GitRef>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BranchConfig {
    /// `<namespace>/<name>:<branch>`.
    #[serde(default)]
    pub branch: Option<GitHubBranch>,
}

// ---------------------------------------------------------------------------
// Git
// ---------------------------------------------------------------------------

/// Local working copy and commit identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitConfig {
    /// Where the working copy lives (default `.rebase`).
    #[serde(default = "default_working_dir")]
    pub working_dir: PathBuf,

    /// Commit author name. Empty leaves git's own configuration in effect.
    #[serde(default)]
    pub username: String,

    /// Commit author email. Empty leaves git's own configuration in effect.
    #[serde(default)]
    pub email: String,
}

fn default_working_dir() -> PathBuf {
    PathBuf::from(".rebase")
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            working_dir: default_working_dir(),
            username: String::new(),
            email: String::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// GitHub
// ---------------------------------------------------------------------------

/// GitHub API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GitHubConfig {
    /// GitHub API base URL (default `https://api.github.com`).
    #[serde(default = "default_github_api_url")]
    pub api_url: String,

    /// Environment variable holding the access token (default `GITHUB_TOKEN`).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Resolved token (populated at runtime, never serialized).
    #[serde(skip)]
    pub token: Option<String>,
}

fn default_github_api_url() -> String {
    "https://api.github.com".into()
}
fn default_token_env() -> String {
    "GITHUB_TOKEN".into()
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_url: default_github_api_url(),
            token_env: default_token_env(),
            token: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MergeConfig {
    /// Paths or globs resolved with `git checkout --ours`.
    #[serde(default)]
    pub ours: Vec<String>,

    /// Paths or globs resolved with `git checkout --theirs`.
    #[serde(default)]
    pub theirs: Vec<String>,

    /// PR title; defaults to `Merge <source>`.
    #[serde(default)]
    pub pr_title: Option<String>,
}

impl MergeConfig {
    pub fn dispositions(&self) -> FileDispositions {
        FileDispositions::new(self.ours.clone(), self.theirs.clone())
    }
}

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NotificationConfig {
    /// Environment variable holding the Slack incoming webhook URL.
    #[serde(default)]
    pub slack_webhook_url_env: Option<String>,

    /// Resolved Slack webhook URL (populated at runtime).
    #[serde(skip)]
    pub slack_webhook_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Run
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunConfig {
    /// Merge locally but push nothing and open no PR.
    #[serde(default)]
    pub dry_run: bool,

    /// Upper bound on working-dir preparation plus merge, in seconds.
    /// 0 disables the limit.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Fallback log filter when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_timeout_secs() -> u64 {
    1800
}
fn default_log_level() -> String {
    "info".into()
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            dry_run: false,
            timeout_secs: default_timeout_secs(),
            log_level: default_log_level(),
        }
    }
}

// ---------------------------------------------------------------------------
// Loading, env resolution, validation
// ---------------------------------------------------------------------------

impl AppConfig {
    /// Load configuration from a TOML file on disk.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        info!(path = %path.display(), "loading configuration");

        if !path.exists() {
            return Err(ConfigError::FileNotFound(path.display().to_string()));
        }

        let contents = std::fs::read_to_string(path)?;
        let config: AppConfig =
            toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))?;

        debug!("configuration parsed successfully");
        Ok(config)
    }

    /// Resolve all `*_env` fields from environment variables.
    ///
    /// Missing variables are logged, not fatal; [`AppConfig::validate`]
    /// decides what is required.
    pub fn resolve_env_vars(&mut self) -> Result<(), ConfigError> {
        info!("resolving environment variable references in config");

        self.github.token = resolve_optional_env(&self.github.token_env, "github.token_env");

        if let Some(ref env_name) = self.notifications.slack_webhook_url_env {
            self.notifications.slack_webhook_url =
                resolve_optional_env(env_name, "notifications.slack_webhook_url_env");
        }

        debug!("environment variable resolution complete");
        Ok(())
    }

    /// Validate that all required fields are present and sane.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.dest.branch.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "dest.branch".into(),
                detail: "destination branch is required".into(),
            });
        }
        if self.rebase.branch.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "rebase.branch".into(),
                detail: "rebase branch is required".into(),
            });
        }
        if self.git.working_dir.as_os_str().is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "git.working_dir".into(),
                detail: "working directory must not be empty".into(),
            });
        }
        if self.github.token_env.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.token_env".into(),
                detail: "token environment variable name must not be empty".into(),
            });
        }
        if self.github.api_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                field: "github.api_url".into(),
                detail: "GitHub API URL must not be empty".into(),
            });
        }
        Ok(())
    }

    /// Extra checks for the `merge` command.
    pub fn validate_for_merge(&self) -> Result<(), ConfigError> {
        self.validate()?;
        if self.source.reference.is_none() {
            return Err(ConfigError::InvalidValue {
                field: "source.reference".into(),
                detail: "source reference is required to merge".into(),
            });
        }
        Ok(())
    }

    /// Convenience: load, resolve, and validate in one call.
    pub fn load_and_resolve<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let mut config = Self::load_from_file(path)?;
        config.resolve_env_vars()?;
        config.validate()?;
        Ok(config)
    }

    /// Title for a newly created PR.
    pub fn pr_title(&self) -> String {
        match (&self.merge.pr_title, &self.source.reference) {
            (Some(title), _) => title.clone(),
            (None, Some(source)) => format!("Merge {source}"),
            (None, None) => "Merge upstream".into(),
        }
    }
}

/// Read an environment variable by name; `None` (with a warning) when it is
/// unset or empty.
fn resolve_optional_env(env_name: &str, field: &str) -> Option<String> {
    match std::env::var(env_name) {
        Ok(val) if !val.is_empty() => {
            debug!(field, env_name, "resolved env var");
            Some(val)
        }
        Ok(_) => {
            warn!(field, env_name, "env var is set but empty");
            None
        }
        Err(_) => {
            warn!(field, env_name, "env var not set");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_toml() -> &'static str {
        r#"
[source]
reference = "https://github.com/kubernetes/autoscaler:master"

[dest]
branch = "openshift/kubernetes-autoscaler:master"

[rebase]
branch = "rebasebot/kubernetes-autoscaler:rebase-bot-master"

[git]
working_dir = "/tmp/rebase"
username = "rebasebot"
email = "rebasebot@example.com"

[github]
api_url = "https://github.example.com/api/v3"
token_env = "REBASEBOT_TOKEN"

[merge]
ours = ["go.mod", "go.sum"]
theirs = ["vendor/**"]
pr_title = "Merge upstream autoscaler"

[notifications]
slack_webhook_url_env = "REBASEBOT_SLACK"

[run]
dry_run = true
timeout_secs = 600
log_level = "debug"
"#
    }

    #[test]
    fn test_parse_full_config() {
        let config: AppConfig = toml::from_str(sample_toml()).expect("failed to parse toml");
        let source = config.source.reference.as_ref().unwrap();
        assert_eq!(source.reference, "master");
        assert_eq!(config.dest.branch.as_ref().unwrap().ns, "openshift");
        assert_eq!(
            config.rebase.branch.as_ref().unwrap().branch,
            "rebase-bot-master"
        );
        assert_eq!(config.git.working_dir, PathBuf::from("/tmp/rebase"));
        assert_eq!(config.merge.theirs, vec!["vendor/**"]);
        assert!(config.run.dry_run);
        assert_eq!(config.run.timeout_secs, 600);
        assert_eq!(config.pr_title(), "Merge upstream autoscaler");
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rebasebot.toml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(sample_toml().as_bytes()).unwrap();

        let config = AppConfig::load_from_file(&path).expect("load_from_file failed");
        assert_eq!(config.run.log_level, "debug");
    }

    #[test]
    fn test_file_not_found() {
        let result = AppConfig::load_from_file("/nonexistent/rebasebot.toml");
        assert!(matches!(result, Err(ConfigError::FileNotFound(_))));
    }

    #[test]
    fn test_bad_coordinates_are_parse_errors() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rebasebot.toml");
        std::fs::write(&path, "[dest]\nbranch = \"no-colon\"\n").unwrap();
        assert!(matches!(
            AppConfig::load_from_file(&path),
            Err(ConfigError::ParseError(_))
        ));
    }

    #[test]
    fn test_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config.git.working_dir, PathBuf::from(".rebase"));
        assert!(config.git.username.is_empty());
        assert_eq!(config.github.api_url, "https://api.github.com");
        assert_eq!(config.github.token_env, "GITHUB_TOKEN");
        assert_eq!(config.run.timeout_secs, 1800);
        assert_eq!(config.run.log_level, "info");
        assert!(!config.run.dry_run);
        assert!(config.merge.dispositions().is_empty());
    }

    #[test]
    fn test_validate_requires_coordinates() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.validate_for_merge().unwrap();

        config.source.reference = None;
        assert!(config.validate().is_ok());
        assert!(matches!(
            config.validate_for_merge(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "source.reference"
        ));

        config.rebase.branch = None;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "rebase.branch"
        ));

        let empty = AppConfig::default();
        assert!(matches!(
            empty.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "dest.branch"
        ));
    }

    #[test]
    fn test_validate_rejects_empty_working_dir() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.git.working_dir = PathBuf::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { ref field, .. }) if field == "git.working_dir"
        ));
    }

    #[test]
    fn test_resolve_env_vars() {
        std::env::set_var("REBASEBOT_TEST_TOKEN", "ghp_abc");
        std::env::set_var("REBASEBOT_TEST_SLACK", "https://hooks.slack.com/x");

        let toml_str = r#"
[github]
token_env = "REBASEBOT_TEST_TOKEN"
[notifications]
slack_webhook_url_env = "REBASEBOT_TEST_SLACK"
"#;
        let mut config: AppConfig = toml::from_str(toml_str).unwrap();
        config.resolve_env_vars().unwrap();

        assert_eq!(config.github.token.as_deref(), Some("ghp_abc"));
        assert_eq!(
            config.notifications.slack_webhook_url.as_deref(),
            Some("https://hooks.slack.com/x")
        );

        std::env::remove_var("REBASEBOT_TEST_TOKEN");
        std::env::remove_var("REBASEBOT_TEST_SLACK");
    }

    #[test]
    fn test_default_pr_title_names_source() {
        let mut config: AppConfig = toml::from_str(sample_toml()).unwrap();
        config.merge.pr_title = None;
        assert_eq!(
            config.pr_title(),
            "Merge https://github.com/kubernetes/autoscaler:master"
        );
    }
}
