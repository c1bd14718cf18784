//! Git operations for rebasebot.

pub mod client;
pub mod github;
#[cfg(test)]
pub(crate) mod mock;
pub mod workdir;
pub mod working_copy;

pub use client::GitCli;
pub use github::{GitHubClient, PullRequest};
pub use workdir::{head_matches_remote_branch, init_working_dir, WorkdirSpec, INTEGRATION_BRANCH};
pub use working_copy::{FetchTarget, MergeOutcome, Side, WorkingCopy};
