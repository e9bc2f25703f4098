//! Effects (side effects as data).
//!
//! Effects describe what should happen as a result of a phase transition.
//! They are pure data - the driver executes them against the gateway.
//! This separation enables testing the transition logic without a store.

use survey_core::{UserId, UserRecord};

/// All effects that can be produced by phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Write the session's outcome to the record store.
    ///
    /// Emitted exactly once, by the finish transition. The phase change
    /// that accompanies it never depends on whether this write succeeds;
    /// the driver attempts it, logs a failure, and discards the result.
    PersistOutcome { id: UserId, record: UserRecord },

    /// Log a message (for debugging/tracing).
    Log { level: LogLevel, message: String },
}

/// Log level for logging effects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
