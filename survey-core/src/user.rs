//! Domain types for participant records.
//!
//! A participant is identified by a self-reported string id and owns a
//! single record in the store. The record carries the presentation group
//! assigned at creation time, a terminal lock flag, and the per-step
//! reaction counts once the survey has been completed.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Number of scenario screens in the survey.
pub const STEP_COUNT: usize = 4;

/// Newtype for participant identifiers to prevent mixing with other strings.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub String);

impl UserId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for UserId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for UserId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

/// Presentation group assigned when a record is created.
///
/// Selects the reaction-animation mode shown to the participant. Fixed at
/// record-creation time and read-only for the rest of the record's life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Group {
    #[serde(rename = "plain")]
    Plain,
    #[serde(rename = "with-motion")]
    WithMotion,
}

impl Group {
    /// Parse the stored string form. Unknown values yield `None`; callers
    /// treat an unparseable group as absent rather than as an error.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "plain" => Some(Self::Plain),
            "with-motion" => Some(Self::WithMotion),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::WithMotion => "with-motion",
        }
    }
}

impl Default for Group {
    fn default() -> Self {
        Self::Plain
    }
}

impl fmt::Display for Group {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One reaction counter per scenario step, in step order.
///
/// Used both as the in-session tally and as the persisted `reactions`
/// value, so the exactly-one-entry-per-step invariant holds by
/// construction rather than by runtime checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReactionCounts(pub [u32; STEP_COUNT]);

impl ReactionCounts {
    pub fn zero() -> Self {
        Self::default()
    }

    /// Increment the counter for the given step by exactly one.
    ///
    /// There is no upper bound; repeated activation is the survey's core
    /// data-collection mechanism (magnitude of reaction, not a binary).
    pub fn increment(&mut self, step: ScenarioStep) {
        self.0[step.index()] = self.0[step.index()].saturating_add(1);
    }

    pub fn get(&self, step: ScenarioStep) -> u32 {
        self.0[step.index()]
    }

    pub fn as_array(&self) -> [u32; STEP_COUNT] {
        self.0
    }
}

/// A scenario step, 1 through 4.
///
/// Construction is validated so a step outside the survey's range cannot
/// address a tally slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScenarioStep(u8);

impl ScenarioStep {
    /// Create a step from its 1-based display number.
    pub fn new(n: u8) -> Option<Self> {
        if (1..=STEP_COUNT as u8).contains(&n) {
            Some(Self(n))
        } else {
            None
        }
    }

    pub fn first() -> Self {
        Self(1)
    }

    /// The following step, or `None` at the final step. Leaving the final
    /// step is not an advance; it is the session's finish path.
    pub fn next(&self) -> Option<Self> {
        Self::new(self.0 + 1)
    }

    /// 0-based index into a `ReactionCounts` array.
    pub fn index(&self) -> usize {
        (self.0 - 1) as usize
    }

    pub fn number(&self) -> u8 {
        self.0
    }

    pub fn is_last(&self) -> bool {
        self.0 == STEP_COUNT as u8
    }
}

impl fmt::Display for ScenarioStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One participant's record, keyed by a self-reported identifier.
///
/// A record is either `locked` with fully populated reactions, or unlocked
/// with no session outcome recorded. An abandoned session leaves the
/// record untouched; there is no partial state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<Group>,
    #[serde(default)]
    pub locked: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reactions: Option<ReactionCounts>,
}

impl UserRecord {
    /// A freshly provisioned record: assigned group, not yet taken.
    pub fn fresh(group: Group) -> Self {
        Self {
            group: Some(group),
            locked: false,
            reactions: None,
        }
    }

    /// The terminal form written once at session end.
    pub fn completed(group: Group, reactions: ReactionCounts) -> Self {
        Self {
            group: Some(group),
            locked: true,
            reactions: Some(reactions),
        }
    }

    /// The group used to drive presentation, defaulting to `Plain` when
    /// the stored value is absent or was unparseable.
    pub fn effective_group(&self) -> Group {
        self.group.unwrap_or_default()
    }
}
