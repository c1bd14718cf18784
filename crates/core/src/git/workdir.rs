//! Working-directory preparation via `git2`.
//!
//! Every run starts from the same state: remotes `dest`, `rebase` and
//! (optionally) `source` pointing at the configured URLs, no merge in
//! progress, `rebase/<branch>` tracking the remote only while the branch
//! exists there, and local branch `rebase` hard-reset onto `dest/<branch>`.

use std::path::Path;
use std::time::Instant;

use git2::{build::CheckoutBuilder, ErrorCode, Repository, ResetType};
use tracing::{debug, info, instrument};

use super::client::GitCli;
use super::working_copy::{FetchTarget, WorkingCopy};
use crate::errors::GitError;
use crate::models::{GitHubBranch, GitRef};

/// Name of the local branch the merge result is built on.
pub const INTEGRATION_BRANCH: &str = "rebase";

/// Everything needed to prepare the working directory.
#[derive(Debug, Clone)]
pub struct WorkdirSpec<'a> {
    pub path: &'a Path,
    pub source: Option<&'a GitRef>,
    pub dest: &'a GitHubBranch,
    pub rebase: &'a GitHubBranch,
    pub git_username: &'a str,
    pub git_email: &'a str,
    /// Environment variable the credential helper reads the token from.
    pub token_env: &'a str,
    /// Deadline handed to the returned client's git commands.
    pub deadline: Option<Instant>,
}

/// Create or reuse the working directory and reset it for a fresh run.
#[instrument(skip(spec), fields(path = %spec.path.display()))]
pub fn init_working_dir(spec: &WorkdirSpec<'_>) -> Result<GitCli, GitError> {
    std::fs::create_dir_all(spec.path)?;
    let repo = match Repository::open(spec.path) {
        Ok(repo) => {
            debug!("reusing existing working directory");
            repo
        }
        Err(_) => {
            info!("initializing working directory");
            Repository::init(spec.path)?
        }
    };

    let mut remotes = vec![("dest", spec.dest.url.as_str()), ("rebase", spec.rebase.url.as_str())];
    if let Some(source) = spec.source {
        remotes.push(("source", source.url.as_str()));
    }
    for (name, url) in remotes {
        set_remote(&repo, name, url)?;
    }

    write_local_config(&repo, spec)?;

    // A previous run may have died mid-merge.
    repo.cleanup_state()?;

    let cli = GitCli::new(spec.path)?.with_deadline(spec.deadline);

    info!(branch = %spec.dest.branch, "fetching dest branch");
    cli.fetch("dest", FetchTarget::Ref(&spec.dest.branch))?;

    info!(branch = %spec.rebase.branch, url = %spec.rebase.url, "checking for existing rebase branch");
    if cli.remote_branch_exists("rebase", &spec.rebase.branch)? {
        info!("fetching existing rebase branch");
        cli.fetch("rebase", FetchTarget::Ref(&spec.rebase.branch))?;
    } else {
        drop_tracking_ref(&repo, "rebase", &spec.rebase.branch)?;
    }

    let dest_ref = format!("refs/remotes/dest/{}", spec.dest.branch);
    let target = repo
        .find_reference(&dest_ref)
        .map_err(|_| GitError::RefNotFound(dest_ref.clone()))?
        .peel_to_commit()?;

    // The integration branch may be HEAD; detach before force-moving it.
    repo.set_head_detached(target.id())?;
    repo.branch(INTEGRATION_BRANCH, &target, true)?;
    repo.set_head(&format!("refs/heads/{INTEGRATION_BRANCH}"))?;
    let mut checkout = CheckoutBuilder::new();
    checkout.force().remove_untracked(true);
    repo.reset(target.as_object(), ResetType::Hard, Some(&mut checkout))?;
    info!(head = %target.id(), "checked out {} at dest/{}", INTEGRATION_BRANCH, spec.dest.branch);

    Ok(cli)
}

fn set_remote(repo: &Repository, name: &str, url: &str) -> Result<(), GitError> {
    match repo.find_remote(name) {
        Ok(_) => repo.remote_set_url(name, url)?,
        Err(e) if e.code() == ErrorCode::NotFound => {
            repo.remote(name, url)?;
        }
        Err(e) => return Err(e.into()),
    }
    debug!(name, url, "configured remote");
    Ok(())
}

fn write_local_config(repo: &Repository, spec: &WorkdirSpec<'_>) -> Result<(), GitError> {
    let mut config = repo.config()?;
    config.set_str("credential.username", "x-access-token")?;
    config.set_bool("credential.useHttpPath", true)?;
    let helper = credential_helper(spec.token_env);
    for url in [&spec.dest.url, &spec.rebase.url] {
        config.set_str(&format!("credential.{url}.helper"), &helper)?;
    }
    if !spec.git_email.is_empty() {
        config.set_str("user.email", spec.git_email)?;
    }
    if !spec.git_username.is_empty() {
        config.set_str("user.name", spec.git_username)?;
    }
    config.set_i32("merge.renameLimit", 999_999)?;
    config.set_str("core.editor", "true")?;
    Ok(())
}

/// Delete `refs/remotes/<remote>/<branch>` left over from an earlier run.
fn drop_tracking_ref(repo: &Repository, remote: &str, branch: &str) -> Result<(), GitError> {
    let name = format!("refs/remotes/{remote}/{branch}");
    match repo.find_reference(&name) {
        Ok(mut reference) => {
            info!(%name, "branch is gone from the remote, dropping stale tracking ref");
            reference.delete()?;
            Ok(())
        }
        Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

/// Shell credential helper that answers with the token from `token_env`.
fn credential_helper(token_env: &str) -> String {
    format!("!f() {{ echo \"password=${{{token_env}}}\"; }}; f")
}

/// Whether HEAD's tree is identical to `refs/remotes/<remote>/<branch>`.
///
/// `false` when the remote-tracking ref does not exist.
pub fn head_matches_remote_branch(
    repo_path: &Path,
    remote: &str,
    branch: &str,
) -> Result<bool, GitError> {
    let repo = Repository::open(repo_path)?;
    let remote_ref = match repo.find_reference(&format!("refs/remotes/{remote}/{branch}")) {
        Ok(r) => r,
        Err(e) if e.code() == ErrorCode::NotFound => return Ok(false),
        Err(e) => return Err(e.into()),
    };
    let remote_tree = remote_ref.peel_to_tree()?.id();
    let head_tree = repo.head()?.peel_to_tree()?.id();
    Ok(remote_tree == head_tree)
}
