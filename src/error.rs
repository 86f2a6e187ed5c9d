//! Scheduler error types

use thiserror::Error;

/// Errors raised at trigger construction or registration
///
/// Runtime job failures are not represented here; they are routed to the
/// trigger's error handler as [`eyre::Report`] values.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("trigger must have a name")]
    MissingName,

    #[error("trigger name already scheduled: {0}")]
    DuplicateName(String),

    #[error("trigger execute count must be >= 0, got {0}")]
    InvalidTimes(i64),

    #[error("trigger interval must be >= 0")]
    NegativeInterval,

    #[error("weekly trigger needs at least one weekday")]
    EmptyWeekdays,
}
