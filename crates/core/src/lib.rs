//! rebasebot core library.
//!
//! This crate merges an upstream reference into a downstream fork: working
//! copy preparation, the integration state machine with its conflict
//! classifier and resolution strategies, configuration, GitHub PR handling,
//! and Slack notifications.

pub mod bot;
pub mod config;
pub mod conflict;
pub mod errors;
pub mod git;
pub mod integration;
pub mod models;
pub mod notify;

// Re-exports for convenience.
pub use bot::RunReport;
pub use config::AppConfig;
pub use integration::{IntegrationOutcome, IntegrationRequest, IntegrationState, Integrator};
pub use notify::Notifier;
