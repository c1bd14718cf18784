//! Resolution plan and the strategies that carry it out.
//!
//! The plan is computed from the full status listing before anything is
//! touched, so an unrecognized code aborts with the tree exactly as the
//! merge left it.

use tracing::{debug, info, instrument};

use super::classifier::deletion_candidates;
use super::dispositions::FileDispositions;
use super::status::StatusEntry;
use crate::errors::{ClassifyError, StrategyError};
use crate::git::{Side, WorkingCopy};

/// What the strategies will do to a conflicted tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolutionPlan {
    /// Conflicted paths pinned to a side, in status order.
    pub checkouts: Vec<(String, Side)>,
    /// Paths whose deletion is accepted.
    pub removals: Vec<String>,
}

impl ResolutionPlan {
    pub fn build(
        entries: &[StatusEntry],
        dispositions: &FileDispositions,
    ) -> Result<Self, ClassifyError> {
        let removals = deletion_candidates(entries, dispositions)?;
        let checkouts = entries
            .iter()
            .filter(|e| e.class().is_conflict())
            .filter_map(|e| dispositions.side_for(&e.path).map(|side| (e.path.clone(), side)))
            .collect();
        Ok(Self {
            checkouts,
            removals,
        })
    }

    /// Every path the plan touches.
    pub fn paths(&self) -> Vec<String> {
        self.checkouts
            .iter()
            .map(|(p, _)| p.clone())
            .chain(self.removals.iter().cloned())
            .collect()
    }
}

/// One step of conflict resolution.
pub trait ResolutionStrategy {
    fn name(&self) -> &'static str;

    fn apply(&self, wc: &dyn WorkingCopy, plan: &ResolutionPlan) -> Result<(), StrategyError>;
}

/// Checks out the pinned side of every conflicted path and stages it.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExplicitDisposition;

impl ResolutionStrategy for ExplicitDisposition {
    fn name(&self) -> &'static str {
        "explicit disposition"
    }

    fn apply(&self, wc: &dyn WorkingCopy, plan: &ResolutionPlan) -> Result<(), StrategyError> {
        for (path, side) in &plan.checkouts {
            wc.checkout_side(path, *side)
                .and_then(|()| wc.stage(path))
                .map_err(|source| StrategyError {
                    strategy: self.name(),
                    path: path.clone(),
                    source,
                })?;
            debug!(path = %path, %side, "resolved from disposition");
        }
        Ok(())
    }
}

/// Accepts the deletion side of modify/delete and rename/delete conflicts.
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptDeletion;

impl ResolutionStrategy for AcceptDeletion {
    fn name(&self) -> &'static str {
        "deletion"
    }

    fn apply(&self, wc: &dyn WorkingCopy, plan: &ResolutionPlan) -> Result<(), StrategyError> {
        for path in &plan.removals {
            wc.remove(path).map_err(|source| StrategyError {
                strategy: self.name(),
                path: path.clone(),
                source,
            })?;
            debug!(path = %path, "accepted deletion");
        }
        Ok(())
    }
}

/// Strategies in the order they run.
pub const STRATEGIES: [&dyn ResolutionStrategy; 2] = [&ExplicitDisposition, &AcceptDeletion];

/// Run every strategy in order, stopping at the first failure.
#[instrument(skip_all, fields(checkouts = plan.checkouts.len(), removals = plan.removals.len()))]
pub fn apply_plan(wc: &dyn WorkingCopy, plan: &ResolutionPlan) -> Result<(), StrategyError> {
    for strategy in STRATEGIES {
        strategy.apply(wc, plan)?;
    }
    info!("resolution plan applied");
    Ok(())
}
