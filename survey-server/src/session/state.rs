//! Phase types for the session state machine.
//!
//! Following the principle of "make illegal states unrepresentable", the
//! scenario phase always carries the resolved identifier, group, and
//! tally. A session that could reach the final write without an
//! identifier cannot be constructed.

use survey_core::{Group, ReactionCounts, ScenarioStep, UserId};

/// Where a session currently is.
///
/// Progression is strictly linear: prologue, scenario steps 1 through 4,
/// epilogue. There is exactly one entry path and one exit path, and no
/// back-transitions exist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionPhase {
    /// Waiting for the participant to enter an identifier.
    Prologue,

    /// Working through the scenario sequence, accumulating reactions.
    Scenario {
        step: ScenarioStep,
        identifier: UserId,
        group: Group,
        tally: ReactionCounts,
    },

    /// The survey is over for this identifier (terminal).
    ///
    /// The identifier is absent when the session never left the prologue
    /// path that resolves one - which entering the epilogue requires - so
    /// in practice it is always present; it stays optional because the
    /// epilogue itself has no further use for it beyond display.
    Epilogue { identifier: Option<UserId> },
}

impl SessionPhase {
    /// The current scenario step, if the session is mid-sequence.
    pub fn step(&self) -> Option<ScenarioStep> {
        match self {
            Self::Scenario { step, .. } => Some(*step),
            _ => None,
        }
    }

    /// The resolved identifier, if one has been established.
    pub fn identifier(&self) -> Option<&UserId> {
        match self {
            Self::Prologue => None,
            Self::Scenario { identifier, .. } => Some(identifier),
            Self::Epilogue { identifier } => identifier.as_ref(),
        }
    }

    /// The presentation group, if the session has resolved one.
    pub fn group(&self) -> Option<Group> {
        match self {
            Self::Scenario { group, .. } => Some(*group),
            _ => None,
        }
    }

    /// The accumulated tally, if the session is mid-sequence.
    pub fn tally(&self) -> Option<&ReactionCounts> {
        match self {
            Self::Scenario { tally, .. } => Some(tally),
            _ => None,
        }
    }

    /// True exactly while reactions have been collected but not yet
    /// written anywhere. The presentation layer keys its navigate-away
    /// warning off this, and the server logs when it prunes such a
    /// session; the prologue and epilogue have nothing to lose.
    pub fn has_unsaved_progress(&self) -> bool {
        matches!(self, Self::Scenario { .. })
    }

    /// True once the session has reached its terminal phase.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Epilogue { .. })
    }
}

impl Default for SessionPhase {
    fn default() -> Self {
        Self::Prologue
    }
}

/// What `submit_identifier` hands back to the caller: the resolved
/// record's group (already defaulted) and whether it was locked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionEntry {
    pub group: Group,
    pub locked: bool,
}
