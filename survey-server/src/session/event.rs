//! Events that trigger session phase transitions.
//!
//! Events represent things that happened - the gateway resolved a record,
//! the participant tapped a reaction or a navigation control. They are
//! inputs to the pure transition function.

use survey_core::{Group, ScenarioStep, UserId};

/// All events that can trigger phase transitions.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// The gateway resolved the entered identifier to an existing record.
    ///
    /// An unknown identifier never reaches the machine: the driver
    /// surfaces it as a retryable error and the phase stays put, without
    /// retaining the identifier.
    RecordResolved {
        id: UserId,
        /// Absent when the stored group was missing or unrecognized; the
        /// transition substitutes the default.
        group: Option<Group>,
        locked: bool,
    },

    /// A reaction button was activated for the given step.
    ReactionTapped { step: ScenarioStep },

    /// The participant asked to move to the next scenario.
    AdvanceRequested,

    /// The participant ended the survey from the final scenario.
    FinishRequested,
}
