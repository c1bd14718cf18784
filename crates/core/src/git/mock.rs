//! Recording [`WorkingCopy`] used by unit tests.

use std::cell::{Cell, RefCell};
use std::collections::BTreeSet;

use super::working_copy::{FetchTarget, MergeOutcome, Side, WorkingCopy};
use crate::conflict::parse_porcelain;
use crate::errors::GitError;

/// How the mock answers `merge`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockMerge {
    /// Already up to date; HEAD stays put.
    UpToDate,
    /// A merge commit is created.
    Commit,
    /// Stops with the configured status listing.
    Conflict,
}

/// In-memory working copy that records every mutating call.
///
/// Calls are logged as git-like strings (`"checkout --theirs b.txt"`,
/// `"rm a.txt"`). Any call whose logged form, or whose first word, is in the
/// failure list returns [`GitError::CommandFailed`]; the timeout list works
/// the same way with [`GitError::TimedOut`].
#[derive(Debug)]
pub struct MockWorkingCopy {
    refs: Vec<String>,
    merge: MockMerge,
    status: String,
    fail_on: Vec<String>,
    time_out_on: Vec<String>,
    calls: RefCell<Vec<String>>,
    head: RefCell<String>,
    in_merge: Cell<bool>,
    unresolved: RefCell<BTreeSet<String>>,
}

impl Default for MockWorkingCopy {
    fn default() -> Self {
        Self::new()
    }
}

impl MockWorkingCopy {
    pub fn new() -> Self {
        Self {
            refs: Vec::new(),
            merge: MockMerge::UpToDate,
            status: String::new(),
            fail_on: Vec::new(),
            time_out_on: Vec::new(),
            calls: RefCell::new(Vec::new()),
            head: RefCell::new("base".into()),
            in_merge: Cell::new(false),
            unresolved: RefCell::new(BTreeSet::new()),
        }
    }

    pub fn with_ref(mut self, reference: &str) -> Self {
        self.refs.push(reference.to_string());
        self
    }

    pub fn with_merge(mut self, merge: MockMerge) -> Self {
        self.merge = merge;
        self
    }

    /// Status listing reported while a conflicted merge is in progress.
    pub fn with_conflicts(mut self, status: &str) -> Self {
        self.merge = MockMerge::Conflict;
        self.status = status.to_string();
        self
    }

    pub fn failing(mut self, call: &str) -> Self {
        self.fail_on.push(call.to_string());
        self
    }

    pub fn timing_out(mut self, call: &str) -> Self {
        self.time_out_on.push(call.to_string());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    pub fn called(&self, prefix: &str) -> bool {
        self.calls.borrow().iter().any(|c| c.starts_with(prefix))
    }

    fn record(&self, call: String) -> Result<(), GitError> {
        let op = call.split(' ').next().unwrap_or_default().to_string();
        let matches = |list: &[String]| list.iter().any(|f| *f == call || *f == op);
        let fails = matches(&self.fail_on);
        let times_out = matches(&self.time_out_on);
        self.calls.borrow_mut().push(call.clone());
        if times_out {
            return Err(GitError::TimedOut {
                command: format!("git {call}"),
            });
        }
        if fails {
            return Err(GitError::CommandFailed {
                command: format!("git {call}"),
                exit_code: 128,
                stderr: "simulated failure".into(),
            });
        }
        Ok(())
    }

    fn settle(&self, path: &str) {
        self.unresolved.borrow_mut().remove(path);
    }
}

impl WorkingCopy for MockWorkingCopy {
    fn fetch(&self, remote: &str, target: FetchTarget<'_>) -> Result<(), GitError> {
        match target {
            FetchTarget::Ref(r) => self.record(format!("fetch {remote} {r}")),
            FetchTarget::AllTags => self.record(format!("fetch --tags {remote}")),
        }
    }

    fn merge(&self, reference: &str) -> Result<MergeOutcome, GitError> {
        self.record(format!("merge {reference}"))?;
        match self.merge {
            MockMerge::UpToDate => Ok(MergeOutcome::Merged),
            MockMerge::Commit => {
                *self.head.borrow_mut() = "merged".into();
                Ok(MergeOutcome::Merged)
            }
            MockMerge::Conflict => {
                self.in_merge.set(true);
                let entries = parse_porcelain(&self.status).unwrap_or_default();
                *self.unresolved.borrow_mut() = entries
                    .into_iter()
                    .filter(|e| e.class().is_conflict())
                    .map(|e| e.path)
                    .collect();
                Ok(MergeOutcome::Conflicted)
            }
        }
    }

    fn checkout_side(&self, path: &str, side: Side) -> Result<(), GitError> {
        self.record(format!("checkout {} {path}", side.as_flag()))
    }

    fn stage(&self, path: &str) -> Result<(), GitError> {
        self.record(format!("add {path}"))?;
        self.settle(path);
        Ok(())
    }

    fn remove(&self, path: &str) -> Result<(), GitError> {
        self.record(format!("rm {path}"))?;
        self.settle(path);
        Ok(())
    }

    fn commit(&self, message: Option<&str>, allow_empty: bool) -> Result<(), GitError> {
        let mut call = String::from("commit");
        if let Some(msg) = message {
            call.push_str(&format!(" -m {msg}"));
        }
        if allow_empty {
            call.push_str(" --allow-empty");
        }
        self.record(call)?;
        if self.in_merge.get() && !self.unresolved.borrow().is_empty() {
            return Err(GitError::CommandFailed {
                command: "git commit --no-edit".into(),
                exit_code: 128,
                stderr: "error: Committing is not possible because you have unmerged files."
                    .into(),
            });
        }
        self.in_merge.set(false);
        *self.head.borrow_mut() = "resolved".into();
        Ok(())
    }

    fn abort_merge(&self) -> Result<(), GitError> {
        self.record("merge --abort".into())?;
        self.in_merge.set(false);
        self.unresolved.borrow_mut().clear();
        Ok(())
    }

    fn merge_in_progress(&self) -> Result<bool, GitError> {
        Ok(self.in_merge.get())
    }

    fn status_porcelain(&self) -> Result<String, GitError> {
        if self.in_merge.get() {
            Ok(self.status.clone())
        } else {
            Ok(String::new())
        }
    }

    fn resolve_ref(&self, candidate: &str) -> Result<bool, GitError> {
        Ok(self.refs.iter().any(|r| r == candidate))
    }

    fn head(&self) -> Result<String, GitError> {
        Ok(self.head.borrow().clone())
    }
}
