//! Pure phase transition function.
//!
//! The transition function is the core of the session machine. It takes
//! the current phase and an event, and returns the new phase and a list
//! of effects. This function has NO side effects - it is pure and
//! deterministic.
//!
//! Anything not covered by an explicit rule leaves the phase unchanged
//! and emits a log effect: a mistimed tap or navigation request must
//! never corrupt the tally or move the session somewhere illegal.

use survey_core::{ReactionCounts, ScenarioStep, UserRecord};

use super::effect::{Effect, LogLevel};
use super::event::Event;
use super::state::SessionPhase;

/// Result of a phase transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransitionResult {
    /// The new phase after the transition.
    pub phase: SessionPhase,
    /// Effects to execute.
    pub effects: Vec<Effect>,
}

impl TransitionResult {
    pub fn new(phase: SessionPhase, effects: Vec<Effect>) -> Self {
        Self { phase, effects }
    }
}

/// Pure phase transition function.
///
/// Given the current phase and an event, returns the new phase and the
/// effects to execute. All side effects are returned as data.
pub fn transition(phase: SessionPhase, event: Event) -> TransitionResult {
    match &phase {
        SessionPhase::Prologue => prologue(phase, event),
        SessionPhase::Scenario { .. } => scenario(phase, event),
        SessionPhase::Epilogue { .. } => epilogue(phase, event),
    }
}

/// Transitions out of the prologue.
///
/// The only way forward is a resolved record: locked records jump
/// straight to the epilogue (and will never produce a write), unlocked
/// records enter the scenario sequence at step 1 with a zero tally.
fn prologue(phase: SessionPhase, event: Event) -> TransitionResult {
    match event {
        Event::RecordResolved {
            id, locked: true, ..
        } => TransitionResult::new(
            SessionPhase::Epilogue {
                identifier: Some(id),
            },
            vec![],
        ),

        Event::RecordResolved {
            id,
            group,
            locked: false,
        } => TransitionResult::new(
            SessionPhase::Scenario {
                step: ScenarioStep::first(),
                identifier: id,
                group: group.unwrap_or_default(),
                tally: ReactionCounts::zero(),
            },
            vec![],
        ),

        event => ignore(&phase, event),
    }
}

/// Transitions within and out of the scenario sequence.
fn scenario(phase: SessionPhase, event: Event) -> TransitionResult {
    match (&phase, event) {
        // Reaction for the currently displayed scenario -> count it.
        (
            SessionPhase::Scenario {
                step,
                identifier,
                group,
                tally,
            },
            Event::ReactionTapped { step: tapped },
        ) if tapped == *step => {
            let mut tally = *tally;
            tally.increment(tapped);
            TransitionResult::new(
                SessionPhase::Scenario {
                    step: *step,
                    identifier: identifier.clone(),
                    group: *group,
                    tally,
                },
                vec![],
            )
        }

        // A reaction is only valid for the scenario on screen; anything
        // else mutates no counter.
        (SessionPhase::Scenario { step, .. }, Event::ReactionTapped { step: tapped }) => {
            let message = format!(
                "Ignoring reaction for step {} while step {} is current",
                tapped, step
            );
            TransitionResult::new(
                phase.clone(),
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message,
                }],
            )
        }

        // Advance through steps 1-3. No tally flush happens here; only
        // the in-memory tally travels forward.
        (
            SessionPhase::Scenario {
                step,
                identifier,
                group,
                tally,
            },
            Event::AdvanceRequested,
        ) => match step.next() {
            Some(next) => TransitionResult::new(
                SessionPhase::Scenario {
                    step: next,
                    identifier: identifier.clone(),
                    group: *group,
                    tally: *tally,
                },
                vec![],
            ),
            None => TransitionResult::new(
                phase.clone(),
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message: "Ignoring advance at the final step; finishing is the only exit"
                        .to_string(),
                }],
            ),
        },

        // Finish from the final step: the phase moves to the epilogue
        // unconditionally, and the accumulated tally goes out as a single
        // atomic record replacement whose outcome the driver discards.
        (
            SessionPhase::Scenario {
                step,
                identifier,
                group,
                tally,
            },
            Event::FinishRequested,
        ) if step.is_last() => TransitionResult::new(
            SessionPhase::Epilogue {
                identifier: Some(identifier.clone()),
            },
            vec![Effect::PersistOutcome {
                id: identifier.clone(),
                record: UserRecord::completed(*group, *tally),
            }],
        ),

        (SessionPhase::Scenario { step, .. }, Event::FinishRequested) => {
            let message = format!("Ignoring finish request at step {}", step);
            TransitionResult::new(
                phase.clone(),
                vec![Effect::Log {
                    level: LogLevel::Warn,
                    message,
                }],
            )
        }

        (_, event) => ignore(&phase, event),
    }
}

/// The epilogue is terminal: every event is ignored.
///
/// In particular a second finish request finds no scenario to leave and
/// no tally to write, which is what makes double submission structurally
/// unreachable rather than checked at the gateway.
fn epilogue(phase: SessionPhase, event: Event) -> TransitionResult {
    ignore(&phase, event)
}

/// Leave the phase unchanged and log the event.
fn ignore(phase: &SessionPhase, event: Event) -> TransitionResult {
    let message = format!("Ignoring event {:?} in phase {:?}", event, phase);
    TransitionResult::new(
        phase.clone(),
        vec![Effect::Log {
            level: LogLevel::Warn,
            message,
        }],
    )
}
