//! End-to-end run: prepare the working copy, integrate, publish.
//!
//! Working-dir preparation and the merge are blocking git work and run on a
//! `spawn_blocking` thread under one optional timeout. The same deadline is
//! handed to the git client, so a hung `git` is killed rather than left
//! running after the timeout is reported. Everything after the merge (push,
//! PR lookup and creation) happens only when the run is not a dry run.

use std::fmt;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use tracing::{info, instrument};

use crate::config::AppConfig;
use crate::conflict::FileDispositions;
use crate::errors::{BotError, ConfigError, EscalationError, EscalationKind, GitError};
use crate::git::{
    head_matches_remote_branch, init_working_dir, GitCli, GitHubClient, WorkdirSpec,
};
use crate::integration::{IntegrationOutcome, IntegrationRequest, Integrator};
use crate::models::{GitHubBranch, GitRef};

/// What a completed run did, phrased for humans.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunReport {
    /// Pushed and opened a new PR.
    Created(String),
    /// Pushed to the branch of an already open PR.
    Updated(String),
    /// The open PR already carries the merge result.
    UpToDate(String),
    /// No push needed and no PR open; the destination URL.
    NothingToDo(String),
    DryRun,
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Created(url) => write!(f, "I created a new PR: {url}"),
            Self::Updated(url) => write!(f, "I updated existing PR: {url}"),
            Self::UpToDate(url) => write!(f, "PR {url} already contains all latest changes."),
            Self::NothingToDo(url) => {
                write!(f, "Destination repo {url} already contains all latest changes.")
            }
            Self::DryRun => write!(f, "Dry run mode is enabled. Do not create a PR."),
        }
    }
}

/// Result of the blocking half of a run.
struct Integrated {
    cli: GitCli,
    outcome: IntegrationOutcome,
    push_required: bool,
}

/// Execute one full run for a validated configuration.
#[instrument(skip_all)]
pub async fn run(config: &AppConfig) -> Result<RunReport, BotError> {
    config.validate_for_merge()?;
    let (source, dest, rebase) = coordinates(config)?;

    let token = match (&config.github.token, config.run.dry_run) {
        (Some(token), _) => Some(token.clone()),
        (None, true) => None,
        (None, false) => {
            return Err(ConfigError::InvalidValue {
                field: "github.token_env".into(),
                detail: format!("environment variable {} is not set", config.github.token_env),
            }
            .into())
        }
    };

    let job = IntegrationJob {
        working_dir: config.git.working_dir.clone(),
        source: source.clone(),
        dest: dest.clone(),
        rebase: rebase.clone(),
        git_username: config.git.username.clone(),
        git_email: config.git.email.clone(),
        token_env: config.github.token_env.clone(),
        dispositions: config.merge.dispositions(),
        timeout_secs: config.run.timeout_secs,
    };
    let Integrated {
        cli,
        outcome,
        push_required,
    } = run_blocking(job).await?;
    info!(?outcome, push_required, "integration complete");

    if config.run.dry_run {
        return Ok(RunReport::DryRun);
    }
    let Some(token) = token else {
        return Ok(RunReport::DryRun);
    };

    let github = GitHubClient::new(&config.github.api_url, token).map_err(BotError::PrLookup)?;
    info!("checking for existing pull request");
    let existing = github
        .find_open_pull_request(&dest.repo_path(), &rebase.pr_head())
        .await
        .map_err(BotError::PrLookup)?;

    if push_required {
        info!(target = %rebase, "rebase branch needs to be updated");
        push(cli.with_deadline(None), rebase.clone()).await?;
    }

    let created = match (&existing, push_required) {
        (None, true) => {
            info!("creating a pull request");
            let pr = github
                .create_pull_request(
                    &dest.repo_path(),
                    &config.pr_title(),
                    &rebase.pr_head(),
                    &dest.branch,
                )
                .await
                .map_err(BotError::PrCreate)?;
            Some(pr.html_url)
        }
        _ => None,
    };

    Ok(decide_report(
        push_required,
        existing.map(|pr| pr.html_url),
        created,
        &dest.url,
    ))
}

fn coordinates(config: &AppConfig) -> Result<(GitRef, GitHubBranch, GitHubBranch), BotError> {
    let missing = |field: &str| ConfigError::InvalidValue {
        field: field.into(),
        detail: "required".into(),
    };
    let source = config
        .source
        .reference
        .clone()
        .ok_or_else(|| missing("source.reference"))?;
    let dest = config.dest.branch.clone().ok_or_else(|| missing("dest.branch"))?;
    let rebase = config
        .rebase
        .branch
        .clone()
        .ok_or_else(|| missing("rebase.branch"))?;
    Ok((source, dest, rebase))
}

/// Owned inputs for the blocking thread.
struct IntegrationJob {
    working_dir: PathBuf,
    source: GitRef,
    dest: GitHubBranch,
    rebase: GitHubBranch,
    git_username: String,
    git_email: String,
    token_env: String,
    dispositions: FileDispositions,
    timeout_secs: u64,
}

impl IntegrationJob {
    fn execute(self, deadline: Option<Instant>) -> Result<Integrated, BotError> {
        let spec = WorkdirSpec {
            path: &self.working_dir,
            source: Some(&self.source),
            dest: &self.dest,
            rebase: &self.rebase,
            git_username: &self.git_username,
            git_email: &self.git_email,
            token_env: &self.token_env,
            deadline,
        };
        let cli = init_working_dir(&spec).map_err(|e| match e {
            GitError::TimedOut { .. } => self.timed_out().into(),
            other => BotError::WorkingDir(other),
        })?;

        let request = IntegrationRequest {
            source: self.source.clone(),
            destination: self.dest.clone(),
            dispositions: self.dispositions,
        };
        let outcome = Integrator::new(&cli, &request).run()?;

        let up_to_date = head_matches_remote_branch(cli.repo_path(), "rebase", &self.rebase.branch)
            .map_err(|source| BotError::PushCheck {
                target: self.rebase.to_string(),
                source,
            })?;
        if up_to_date {
            info!("existing rebase branch already contains source");
        }
        Ok(Integrated {
            cli,
            outcome,
            push_required: !up_to_date,
        })
    }

    fn timed_out(&self) -> EscalationError {
        EscalationError::new(
            EscalationKind::Timeout,
            self.source.to_string(),
            self.dest.to_string(),
            format!("run did not finish within {}s", self.timeout_secs),
        )
    }
}

async fn run_blocking(job: IntegrationJob) -> Result<Integrated, BotError> {
    if job.timeout_secs == 0 {
        return tokio::task::spawn_blocking(move || job.execute(None))
            .await
            .map_err(|e| BotError::Worker(e.to_string()))?;
    }

    let limit = Duration::from_secs(job.timeout_secs);
    let timed_out = job.timed_out();
    let deadline = Instant::now() + limit;
    let handle = tokio::task::spawn_blocking(move || job.execute(Some(deadline)));

    match tokio::time::timeout(limit, handle).await {
        Ok(joined) => joined.map_err(|e| BotError::Worker(e.to_string()))?,
        Err(_) => Err(timed_out.into()),
    }
}

async fn push(cli: GitCli, rebase: GitHubBranch) -> Result<(), BotError> {
    let refspec = format!("HEAD:refs/heads/{}", rebase.branch);
    tokio::task::spawn_blocking(move || {
        cli.push("rebase", &refspec, true)
            .map_err(|source| BotError::Push {
                target: rebase.to_string(),
                source,
            })
    })
    .await
    .map_err(|e| BotError::Worker(e.to_string()))?
}

fn decide_report(
    push_required: bool,
    existing: Option<String>,
    created: Option<String>,
    dest_url: &str,
) -> RunReport {
    match (push_required, existing, created) {
        (true, None, Some(url)) => RunReport::Created(url),
        (true, Some(url), _) => RunReport::Updated(url),
        (false, Some(url), _) => RunReport::UpToDate(url),
        _ => RunReport::NothingToDo(dest_url.to_string()),
    }
}
