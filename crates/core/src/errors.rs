//! Error types for the rebasebot core library.
//!
//! Each subsystem has its own error type derived with `thiserror`. The
//! integration engine itself only ever surfaces [`EscalationError`], and the
//! run driver wraps everything in [`BotError`].

use std::fmt;

use thiserror::Error;

// ---------------------------------------------------------------------------
// Git errors
// ---------------------------------------------------------------------------

/// Errors from working-copy operations (`git` CLI and `git2`).
#[derive(Debug, Error)]
pub enum GitError {
    /// The `git` binary was not found on `$PATH`.
    #[error("git binary not found: {0}")]
    BinaryNotFound(String),

    /// A `git` command exited with a non-zero status.
    #[error("`{command}` failed (exit {exit_code}): {stderr}")]
    CommandFailed {
        command: String,
        exit_code: i32,
        stderr: String,
    },

    /// A `git` command was still running when the run deadline passed and
    /// was killed.
    #[error("`{command}` was killed at the run deadline")]
    TimedOut { command: String },

    /// The repository path does not exist or is not a git repo.
    #[error("git repository not found at '{0}'")]
    RepositoryNotFound(String),

    /// A ref (branch, tag, SHA) could not be resolved.
    #[error("git ref not found: {0}")]
    RefNotFound(String),

    /// A `git2` library error.
    #[error("git2 error: {0}")]
    Git2Error(#[from] git2::Error),

    /// Generic I/O wrapper.
    #[error("git I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// GitHub API errors
// ---------------------------------------------------------------------------

/// Errors from GitHub REST API interactions.
#[derive(Debug, Error)]
pub enum GitHubError {
    /// HTTP-level transport error (network, TLS, etc.).
    #[error("GitHub HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    /// The API returned a non-success status code.
    #[error("GitHub API error (HTTP {status}): {body}")]
    ApiError { status: u16, body: String },

    /// Authentication token is missing or invalid.
    #[error("GitHub authentication failed: {0}")]
    AuthenticationFailed(String),

    /// Rate limit exceeded.
    #[error("GitHub rate limit exceeded, resets at {reset_at}")]
    RateLimited { reset_at: String },
}

// ---------------------------------------------------------------------------
// Classification errors
// ---------------------------------------------------------------------------

/// Errors from parsing and classifying porcelain status output.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClassifyError {
    /// A status line is too short to carry a code and a path.
    #[error("malformed status line: {0:?}")]
    Malformed(String),

    /// A quoted path contains an escape sequence git never emits.
    #[error("invalid escape sequence in quoted path {0:?}")]
    BadEscape(String),

    /// A status code outside the known benign / resolvable sets.
    #[error("unrecognized conflict status {code:?} on '{path}'")]
    Unrecognized { code: String, path: String },
}

/// A resolution strategy could not apply its action to a path.
#[derive(Debug, Error)]
#[error("{strategy} resolution failed on '{path}': {source}")]
pub struct StrategyError {
    pub strategy: &'static str,
    pub path: String,
    #[source]
    pub source: GitError,
}

// ---------------------------------------------------------------------------
// Escalation
// ---------------------------------------------------------------------------

/// Why an integration attempt needs a human.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EscalationKind {
    /// No candidate form of the source reference exists.
    RefNotFound,
    /// A version-control primitive failed hard.
    ToolFailure,
    /// A status code the classifier refuses to guess about.
    UnrecognizedConflict,
    /// Strategies ran but a conflicted path was never staged.
    ResidualConflict,
    /// The external run timeout elapsed.
    Timeout,
}

impl fmt::Display for EscalationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::RefNotFound => write!(f, "ref_not_found"),
            Self::ToolFailure => write!(f, "tool_failure"),
            Self::UnrecognizedConflict => write!(f, "unrecognized_conflict"),
            Self::ResidualConflict => write!(f, "residual_conflict"),
            Self::Timeout => write!(f, "timeout"),
        }
    }
}

/// The single error type the integration engine raises.
///
/// Carries the source (`url:ref`) and destination (`ns/name:branch`)
/// coordinates so the message can be handed straight to a notifier.
#[derive(Debug, Error)]
#[error("{} {} into {}: {}", headline(.kind), .upstream, .destination, .cause)]
pub struct EscalationError {
    pub kind: EscalationKind,
    pub upstream: String,
    pub destination: String,
    /// Paths involved in the failing step (empty when not path-specific).
    pub paths: Vec<String>,
    pub cause: String,
}

impl EscalationError {
    pub fn new(
        kind: EscalationKind,
        upstream: impl Into<String>,
        destination: impl Into<String>,
        cause: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            upstream: upstream.into(),
            destination: destination.into(),
            paths: Vec::new(),
            cause: cause.into(),
        }
    }

    pub fn with_paths(mut self, paths: Vec<String>) -> Self {
        self.paths = paths;
        self
    }
}

fn headline(kind: &EscalationKind) -> &'static str {
    match kind {
        EscalationKind::ToolFailure | EscalationKind::Timeout => "I got an error trying to merge",
        _ => "Manual intervention is needed to merge",
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

/// Errors from configuration loading and validation.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Config file not found.
    #[error("configuration file not found: {0}")]
    FileNotFound(String),

    /// TOML parse error.
    #[error("configuration parse error: {0}")]
    ParseError(String),

    /// A config value is invalid.
    #[error("invalid configuration value for '{field}': {detail}")]
    InvalidValue { field: String, detail: String },

    /// Generic I/O error reading the config file.
    #[error("configuration I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// ---------------------------------------------------------------------------
// Notification errors
// ---------------------------------------------------------------------------

/// Errors from the Slack notification channel.
#[derive(Debug, Error)]
pub enum NotificationError {
    /// Slack webhook delivery failed.
    #[error("Slack notification failed: {0}")]
    SlackError(String),

    /// HTTP error during notification delivery.
    #[error("notification HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
}

// ---------------------------------------------------------------------------
// Run driver errors
// ---------------------------------------------------------------------------

/// Errors from the end-to-end run (working dir, merge, push, PR).
#[derive(Debug, Error)]
pub enum BotError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("I got an error initializing the git directory: {0}")]
    WorkingDir(#[source] GitError),

    #[error(transparent)]
    Escalation(#[from] EscalationError),

    #[error("I got an error pushing to {target}: {source}")]
    Push {
        target: String,
        #[source]
        source: GitError,
    },

    #[error("I got an error checking the pushed state of {target}: {source}")]
    PushCheck {
        target: String,
        #[source]
        source: GitError,
    },

    #[error("I got an error looking up pull requests: {0}")]
    PrLookup(#[source] GitHubError),

    #[error("I got an error creating a PR: {0}")]
    PrCreate(#[source] GitHubError),

    #[error("the integration worker stopped unexpectedly: {0}")]
    Worker(String),
}
