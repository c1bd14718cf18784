//! Integration orchestrator.
//!
//! [`Integrator`] drives one attempt to merge an upstream reference into the
//! checked-out destination branch:
//!
//! 1. Fetch the reference and all tags from the `source` remote.
//! 2. Resolve the reference (`<ref>`, then `source/<ref>`).
//! 3. Merge it into the current branch.
//! 4. On conflicts, build a [`ResolutionPlan`], apply it and commit.
//!
//! Any failure ends in [`IntegrationState::Escalated`]; before returning the
//! error the orchestrator aborts a merge left in progress.

use std::fmt;

use tracing::{debug, info, instrument, warn};

use crate::conflict::{apply_plan, parse_porcelain, FileDispositions, ResolutionPlan, StatusEntry};
use crate::errors::{ClassifyError, EscalationError, EscalationKind, GitError};
use crate::git::{FetchTarget, MergeOutcome, Side, WorkingCopy};
use crate::models::{GitHubBranch, GitRef};

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

/// States of one integration attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IntegrationState {
    Start,
    ResolvingRef,
    Merging,
    Clean,
    Conflicted,
    ResolvingConflicts,
    Resolved,
    Escalated,
}

impl fmt::Display for IntegrationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::ResolvingRef => write!(f, "resolving_ref"),
            Self::Merging => write!(f, "merging"),
            Self::Clean => write!(f, "clean"),
            Self::Conflicted => write!(f, "conflicted"),
            Self::ResolvingConflicts => write!(f, "resolving_conflicts"),
            Self::Resolved => write!(f, "resolved"),
            Self::Escalated => write!(f, "escalated"),
        }
    }
}

/// Successful end of an integration attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrationOutcome {
    /// Nothing to integrate; HEAD did not move.
    Clean,
    /// Git merged without conflicts and created a commit.
    MergedClean,
    /// Conflicts were settled by the strategies and committed.
    MergedResolved {
        checked_out: Vec<(String, Side)>,
        removed: Vec<String>,
    },
}

impl IntegrationOutcome {
    /// Whether a new commit was created on the integration branch.
    pub fn committed(&self) -> bool {
        !matches!(self, Self::Clean)
    }
}

/// What to integrate, where, and the caller's per-path policy.
#[derive(Debug, Clone)]
pub struct IntegrationRequest {
    pub source: GitRef,
    pub destination: GitHubBranch,
    pub dispositions: FileDispositions,
}

// ---------------------------------------------------------------------------
// Integrator
// ---------------------------------------------------------------------------

/// Runs one integration attempt over a [`WorkingCopy`].
pub struct Integrator<'a, W: WorkingCopy> {
    wc: &'a W,
    request: &'a IntegrationRequest,
    state: IntegrationState,
    history: Vec<IntegrationState>,
}

impl<'a, W: WorkingCopy> Integrator<'a, W> {
    pub fn new(wc: &'a W, request: &'a IntegrationRequest) -> Self {
        Self {
            wc,
            request,
            state: IntegrationState::Start,
            history: vec![IntegrationState::Start],
        }
    }

    pub fn state(&self) -> IntegrationState {
        self.state
    }

    /// Every state visited so far, `Start` first.
    pub fn history(&self) -> &[IntegrationState] {
        &self.history
    }

    /// Drive the state machine to a terminal state.
    #[instrument(skip(self), fields(source = %self.request.source, dest = %self.request.destination))]
    pub fn run(&mut self) -> Result<IntegrationOutcome, EscalationError> {
        match self.drive() {
            Ok(outcome) => {
                info!(state = %self.state, ?outcome, "integration finished");
                Ok(outcome)
            }
            Err(err) => {
                self.transition(IntegrationState::Escalated);
                self.cleanup();
                warn!(kind = %err.kind, paths = ?err.paths, "integration escalated: {}", err.cause);
                Err(err)
            }
        }
    }

    fn drive(&mut self) -> Result<IntegrationOutcome, EscalationError> {
        self.transition(IntegrationState::ResolvingRef);
        let source = &self.request.source;
        info!(reference = %source.reference, "fetching reference and all tags from source");
        self.wc
            .fetch("source", FetchTarget::Ref(&source.reference))
            .map_err(|e| self.git_failure(EscalationKind::ToolFailure, e))?;
        self.wc
            .fetch("source", FetchTarget::AllTags)
            .map_err(|e| self.git_failure(EscalationKind::ToolFailure, e))?;
        let resolved = self.resolve_reference()?;

        self.transition(IntegrationState::Merging);
        let before = self.head()?;
        let outcome = self
            .wc
            .merge(&resolved)
            .map_err(|e| self.git_failure(EscalationKind::ToolFailure, e))?;

        match outcome {
            MergeOutcome::Merged => {
                self.transition(IntegrationState::Clean);
                if self.head()? == before {
                    info!("already up to date");
                    Ok(IntegrationOutcome::Clean)
                } else {
                    Ok(IntegrationOutcome::MergedClean)
                }
            }
            MergeOutcome::Conflicted => {
                self.transition(IntegrationState::Conflicted);
                self.resolve_conflicts()
            }
        }
    }

    fn resolve_reference(&self) -> Result<String, EscalationError> {
        for candidate in self.request.source.candidates() {
            let found = self
                .wc
                .resolve_ref(&candidate)
                .map_err(|e| self.git_failure(EscalationKind::ToolFailure, e))?;
            if found {
                debug!(%candidate, "resolved source reference");
                return Ok(candidate);
            }
        }
        Err(self.escalation(
            EscalationKind::RefNotFound,
            format!("reference '{}' not found", self.request.source.reference),
        ))
    }

    fn resolve_conflicts(&mut self) -> Result<IntegrationOutcome, EscalationError> {
        self.transition(IntegrationState::ResolvingConflicts);
        let status = self
            .wc
            .status_porcelain()
            .map_err(|e| self.git_failure(EscalationKind::ToolFailure, e))?;
        let entries = parse_porcelain(&status).map_err(|e| self.unrecognized(e))?;
        let plan = ResolutionPlan::build(&entries, &self.request.dispositions)
            .map_err(|e| self.unrecognized(e))?;
        debug!(?plan, "resolution plan");

        apply_plan(self.wc, &plan).map_err(|e| {
            let kind = kind_for(&e.source, EscalationKind::ToolFailure);
            let path = e.path.clone();
            self.escalation(kind, e).with_paths(vec![path])
        })?;

        self.wc.commit(None, false).map_err(|e| {
            self.git_failure(EscalationKind::ResidualConflict, e)
                .with_paths(residual_paths(&entries, &plan))
        })?;

        self.transition(IntegrationState::Resolved);
        Ok(IntegrationOutcome::MergedResolved {
            checked_out: plan.checkouts,
            removed: plan.removals,
        })
    }

    fn head(&self) -> Result<String, EscalationError> {
        self.wc
            .head()
            .map_err(|e| self.git_failure(EscalationKind::ToolFailure, e))
    }

    /// Abort a merge left in progress. Failures are logged, never raised.
    fn cleanup(&self) {
        match self.wc.merge_in_progress() {
            Ok(true) => match self.wc.abort_merge() {
                Ok(()) => info!("aborted in-progress merge"),
                Err(e) => warn!(error = %e, "failed to abort merge"),
            },
            Ok(false) => {}
            Err(e) => warn!(error = %e, "could not determine merge state"),
        }
    }

    fn transition(&mut self, next: IntegrationState) {
        debug!(from = %self.state, to = %next, "state transition");
        self.state = next;
        self.history.push(next);
    }

    fn escalation(&self, kind: EscalationKind, cause: impl fmt::Display) -> EscalationError {
        EscalationError::new(
            kind,
            self.request.source.to_string(),
            self.request.destination.to_string(),
            cause.to_string(),
        )
    }

    fn git_failure(&self, kind: EscalationKind, err: GitError) -> EscalationError {
        self.escalation(kind_for(&err, kind), err)
    }

    fn unrecognized(&self, err: ClassifyError) -> EscalationError {
        let paths = match &err {
            ClassifyError::Unrecognized { path, .. } => vec![path.clone()],
            ClassifyError::Malformed(_) | ClassifyError::BadEscape(_) => Vec::new(),
        };
        self.escalation(EscalationKind::UnrecognizedConflict, err)
            .with_paths(paths)
    }
}

/// A git command killed at the run deadline reports as a timeout.
fn kind_for(err: &GitError, otherwise: EscalationKind) -> EscalationKind {
    match err {
        GitError::TimedOut { .. } => EscalationKind::Timeout,
        _ => otherwise,
    }
}

/// Conflicted paths the plan does not touch.
fn residual_paths(entries: &[StatusEntry], plan: &ResolutionPlan) -> Vec<String> {
    let touched = plan.paths();
    entries
        .iter()
        .filter(|e| e.class().is_conflict() && !touched.contains(&e.path))
        .map(|e| e.path.clone())
        .collect()
}
