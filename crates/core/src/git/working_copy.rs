//! The version-control primitives the integration engine drives.
//!
//! [`WorkingCopy`] is the seam between the decision logic and the `git`
//! binary. Every primitive blocks until the underlying command finishes and
//! never retries.

use std::fmt;

use crate::errors::GitError;

/// What to fetch from a remote.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchTarget<'a> {
    /// A single branch, tag, or commit.
    Ref(&'a str),
    /// Every tag the remote advertises.
    AllTags,
}

/// Which side of a conflicted merge a path is checked out from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    /// The branch being merged into (the downstream fork).
    Ours,
    /// The incoming upstream side.
    Theirs,
}

impl Side {
    pub fn as_flag(&self) -> &'static str {
        match self {
            Self::Ours => "--ours",
            Self::Theirs => "--theirs",
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ours => write!(f, "ours"),
            Self::Theirs => write!(f, "theirs"),
        }
    }
}

/// Result of a merge invocation that did not fail hard.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeOutcome {
    /// The merge finished (possibly as a no-op when already up to date).
    Merged,
    /// Git stopped with conflicts and left the merge in progress.
    Conflicted,
}

/// Blocking version-control primitives over a single working copy.
pub trait WorkingCopy {
    /// Fetch from a named remote.
    fn fetch(&self, remote: &str, target: FetchTarget<'_>) -> Result<(), GitError>;

    /// Merge `reference` into the current branch.
    ///
    /// Returns [`MergeOutcome::Conflicted`] only when git reports the
    /// documented conflict condition; every other failure is an error.
    fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError>;

    /// Replace `path` in the worktree with the given side's version.
    fn checkout_side(&self, path: &str, side: Side) -> Result<(), GitError>;

    /// Stage `path` in the index.
    fn stage(&self, path: &str) -> Result<(), GitError>;

    /// Delete `path` from worktree and index, staging the removal.
    fn remove(&self, path: &str) -> Result<(), GitError>;

    /// Create a commit. `None` keeps the prepared merge message unedited.
    fn commit(&self, message: Option<&str>, allow_empty: bool) -> Result<(), GitError>;

    /// Abort the merge currently in progress.
    fn abort_merge(&self) -> Result<(), GitError>;

    /// Whether a merge is in progress (MERGE_HEAD present).
    fn merge_in_progress(&self) -> Result<bool, GitError>;

    /// Raw `git status --porcelain` output.
    fn status_porcelain(&self) -> Result<String, GitError>;

    /// Whether `candidate` names an existing commit.
    fn resolve_ref(&self, candidate: &str) -> Result<bool, GitError>;

    /// SHA of the current HEAD commit.
    fn head(&self) -> Result<String, GitError>;
}
