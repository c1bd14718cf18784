//! Conflict classification and resolution.
//!
//! 1. **Parsing** -- porcelain status lines into [`StatusEntry`] values.
//! 2. **Classification** -- each code into a closed [`StatusClass`].
//! 3. **Resolution** -- a [`ResolutionPlan`] applied by the strategies in
//!    [`strategy::STRATEGIES`] order.

pub mod classifier;
pub mod dispositions;
pub mod status;
pub mod strategy;

pub use classifier::{deletion_candidates, StatusClass};
pub use dispositions::FileDispositions;
pub use status::{parse_porcelain, StatusEntry};
pub use strategy::{apply_plan, ResolutionPlan, ResolutionStrategy};
