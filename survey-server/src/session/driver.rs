//! Session driver: executes the state machine against a gateway.
//!
//! The driver is the boundary between the pure transition function and
//! the impure world of the record store. It owns one session's phase,
//! feeds events through `transition`, and executes the returned effects.
//!
//! Every operation takes `&mut self`, so overlapping calls on one session
//! are impossible at the type level; the HTTP layer adds the runtime half
//! of that guard by refusing re-entrant requests for a session token.

use std::fmt;
use std::sync::Arc;

use tracing::warn;

use survey_core::{GatewayError, ScenarioStep, UserGateway, UserId};

use super::effect::{Effect, LogLevel};
use super::event::Event;
use super::state::{SessionEntry, SessionPhase};
use super::transition::transition;

/// Upper bound on identifier length, matching the entry field.
pub const MAX_IDENTIFIER_CHARS: usize = 20;

/// Why `submit_identifier` refused to start the scenario sequence.
///
/// Every variant leaves the session at the prologue; the entered
/// identifier is not retained, so recovery is re-entry, not retry.
#[derive(Debug)]
pub enum SubmitError {
    /// The identifier was empty after trimming surrounding whitespace.
    EmptyIdentifier,
    /// The identifier exceeds the entry field's length bound.
    IdentifierTooLong { chars: usize },
    /// The session has already left the prologue.
    SessionStarted,
    /// No record exists for the identifier. This is the retryable,
    /// user-facing outcome.
    NotFound,
    /// The store could not be reached or failed.
    Gateway(GatewayError),
}

impl fmt::Display for SubmitError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EmptyIdentifier => write!(f, "identifier must not be empty"),
            Self::IdentifierTooLong { chars } => write!(
                f,
                "identifier is too long: {} characters (limit {})",
                chars, MAX_IDENTIFIER_CHARS
            ),
            Self::SessionStarted => write!(f, "a survey is already in progress for this session"),
            Self::NotFound => write!(f, "no record exists for that identifier"),
            Self::Gateway(e) => write!(f, "record lookup failed: {}", e),
        }
    }
}

impl std::error::Error for SubmitError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Gateway(e) => Some(e),
            _ => None,
        }
    }
}

/// One participant's survey session.
pub struct Session<G> {
    phase: SessionPhase,
    gateway: Arc<G>,
}

impl<G: UserGateway> Session<G> {
    /// A new session at the prologue.
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            phase: SessionPhase::Prologue,
            gateway,
        }
    }

    pub fn phase(&self) -> &SessionPhase {
        &self.phase
    }

    /// Resolve the entered identifier and enter the survey.
    ///
    /// On success the session moves to step 1 (or straight to the
    /// epilogue for a locked record, which will never produce a write).
    /// On any error the phase is untouched and the identifier is not
    /// retained.
    pub async fn submit_identifier(&mut self, raw: &str) -> Result<SessionEntry, SubmitError> {
        if !matches!(self.phase, SessionPhase::Prologue) {
            return Err(SubmitError::SessionStarted);
        }

        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(SubmitError::EmptyIdentifier);
        }
        let chars = trimmed.chars().count();
        if chars > MAX_IDENTIFIER_CHARS {
            return Err(SubmitError::IdentifierTooLong { chars });
        }

        let id = UserId::from(trimmed);
        let record = self
            .gateway
            .fetch_by_id(&id)
            .await
            .map_err(SubmitError::Gateway)?
            .ok_or(SubmitError::NotFound)?;

        let entry = SessionEntry {
            group: record.effective_group(),
            locked: record.locked,
        };
        self.apply(Event::RecordResolved {
            id,
            group: record.group,
            locked: record.locked,
        });
        Ok(entry)
    }

    /// Count a reaction for the given step.
    ///
    /// A reaction is only valid for the scenario currently on screen;
    /// mismatched taps are logged and mutate nothing.
    pub fn react(&mut self, step: ScenarioStep) {
        let leftover = self.apply(Event::ReactionTapped { step });
        debug_assert!(leftover.is_empty(), "reactions produce no store effects");
    }

    /// Move to the next scenario. Valid for steps 1 through 3; the final
    /// step is left through `finish` alone.
    pub fn advance(&mut self) {
        let leftover = self.apply(Event::AdvanceRequested);
        debug_assert!(leftover.is_empty(), "advancing produces no store effects");
    }

    /// End the survey from the final step.
    ///
    /// The phase moves to the epilogue first; the accumulated tally is
    /// then written to the store as a single record replacement. A failed
    /// write is logged and discarded - the participant is never blocked
    /// on persistence, at the documented cost of possible silent data
    /// loss. Called anywhere other than step 4, this is a logged no-op.
    pub async fn finish(&mut self) {
        let effects = self.apply(Event::FinishRequested);

        for effect in effects {
            if let Effect::PersistOutcome { id, record } = effect {
                if let Err(e) = self.gateway.write_by_id(&id, record).await {
                    warn!("Discarding failed session write for '{}': {}", id, e);
                }
            }
        }
    }

    /// Run the transition, execute log effects inline, and hand back
    /// whatever store effects remain for the caller to execute.
    fn apply(&mut self, event: Event) -> Vec<Effect> {
        let result = transition(std::mem::take(&mut self.phase), event);
        self.phase = result.phase;

        let mut store_effects = Vec::new();
        for effect in result.effects {
            match effect {
                Effect::Log { level, message } => emit_log(level, &message),
                other => store_effects.push(other),
            }
        }
        store_effects
    }
}

fn emit_log(level: LogLevel, message: &str) {
    match level {
        LogLevel::Debug => tracing::debug!("{}", message),
        LogLevel::Info => tracing::info!("{}", message),
        LogLevel::Warn => tracing::warn!("{}", message),
        LogLevel::Error => tracing::error!("{}", message),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use survey_core::{Group, MemoryGateway, ReactionCounts, UserRecord};

    fn step(n: u8) -> ScenarioStep {
        ScenarioStep::new(n).unwrap()
    }

    async fn seeded_gateway() -> Arc<MemoryGateway> {
        let gateway = MemoryGateway::new();
        gateway
            .insert(UserId::from("u1"), UserRecord::fresh(Group::Plain))
            .await;
        gateway
            .insert(
                UserId::from("u2"),
                UserRecord::completed(Group::WithMotion, ReactionCounts([1, 1, 1, 1])),
            )
            .await;
        Arc::new(gateway)
    }

    /// Gateway wrapper that counts writes, for asserting at-most-once
    /// persistence.
    struct CountingGateway {
        inner: MemoryGateway,
        writes: AtomicUsize,
    }

    #[async_trait]
    impl UserGateway for CountingGateway {
        async fn fetch_by_id(
            &self,
            id: &UserId,
        ) -> Result<Option<UserRecord>, survey_core::GatewayError> {
            self.inner.fetch_by_id(id).await
        }

        async fn write_by_id(
            &self,
            id: &UserId,
            record: UserRecord,
        ) -> Result<(), survey_core::GatewayError> {
            self.writes.fetch_add(1, Ordering::SeqCst);
            self.inner.write_by_id(id, record).await
        }
    }

    /// Gateway whose writes always fail, for the swallow-and-continue
    /// policy test.
    struct WriteFailingGateway;

    #[async_trait]
    impl UserGateway for WriteFailingGateway {
        async fn fetch_by_id(
            &self,
            _id: &UserId,
        ) -> Result<Option<UserRecord>, survey_core::GatewayError> {
            Ok(Some(UserRecord::fresh(Group::Plain)))
        }

        async fn write_by_id(
            &self,
            _id: &UserId,
            _record: UserRecord,
        ) -> Result<(), survey_core::GatewayError> {
            Err(survey_core::GatewayError::storage("write", "store is down"))
        }
    }

    #[tokio::test]
    async fn test_unknown_identifier_stays_on_prologue() {
        let mut session = Session::new(seeded_gateway().await);

        let err = session.submit_identifier("abc").await.unwrap_err();
        assert!(matches!(err, SubmitError::NotFound));
        assert_eq!(session.phase(), &SessionPhase::Prologue);

        // Nothing was retained; a second attempt behaves identically.
        let err = session.submit_identifier("abc").await.unwrap_err();
        assert!(matches!(err, SubmitError::NotFound));
    }

    #[tokio::test]
    async fn test_identifier_validation() {
        let mut session = Session::new(seeded_gateway().await);

        assert!(matches!(
            session.submit_identifier("").await.unwrap_err(),
            SubmitError::EmptyIdentifier
        ));
        assert!(matches!(
            session.submit_identifier("   ").await.unwrap_err(),
            SubmitError::EmptyIdentifier
        ));
        assert!(matches!(
            session
                .submit_identifier("abcdefghijklmnopqrstu")
                .await
                .unwrap_err(),
            SubmitError::IdentifierTooLong { chars: 21 }
        ));
        assert_eq!(session.phase(), &SessionPhase::Prologue);
    }

    #[tokio::test]
    async fn test_full_session_writes_final_tally() {
        let gateway = seeded_gateway().await;
        let mut session = Session::new(gateway.clone());

        let entry = session.submit_identifier("u1").await.unwrap();
        assert_eq!(
            entry,
            SessionEntry {
                group: Group::Plain,
                locked: false,
            }
        );
        assert_eq!(session.phase().step(), Some(step(1)));

        session.react(step(1));
        session.react(step(1));
        session.react(step(1));
        session.advance();
        assert_eq!(session.phase().step(), Some(step(2)));
        session.advance();
        session.advance();
        session.finish().await;

        assert!(session.phase().is_terminal());
        let written = gateway
            .fetch_by_id(&UserId::from("u1"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(
            written,
            UserRecord::completed(Group::Plain, ReactionCounts([3, 0, 0, 0]))
        );
    }

    #[tokio::test]
    async fn test_locked_record_goes_straight_to_epilogue_without_write() {
        let gateway = Arc::new(CountingGateway {
            inner: MemoryGateway::new(),
            writes: AtomicUsize::new(0),
        });
        gateway
            .inner
            .insert(
                UserId::from("u2"),
                UserRecord::completed(Group::Plain, ReactionCounts([2, 0, 0, 0])),
            )
            .await;
        let mut session = Session::new(gateway.clone());

        let entry = session.submit_identifier("u2").await.unwrap();
        assert!(entry.locked);
        assert!(session.phase().is_terminal());
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 0);

        // Visiting the epilogue again changes nothing.
        session.finish().await;
        assert_eq!(gateway.writes.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_finish_writes_exactly_once() {
        let gateway = Arc::new(CountingGateway {
            inner: MemoryGateway::new(),
            writes: AtomicUsize::new(0),
        });
        gateway
            .inner
            .insert(UserId::from("u1"), UserRecord::fresh(Group::Plain))
            .await;
        let mut session = Session::new(gateway.clone());

        session.submit_identifier("u1").await.unwrap();
        session.advance();
        session.advance();
        session.advance();
        session.finish().await;
        session.finish().await;

        assert_eq!(gateway.writes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_write_still_reaches_epilogue() {
        let mut session = Session::new(Arc::new(WriteFailingGateway));

        session.submit_identifier("anyone").await.unwrap();
        session.react(step(1));
        session.advance();
        session.advance();
        session.advance();
        session.finish().await;

        // The swallow policy: persistence failed, the participant still
        // sees the epilogue.
        assert!(session.phase().is_terminal());
    }

    #[tokio::test]
    async fn test_mismatched_react_leaves_tally_untouched() {
        let mut session = Session::new(seeded_gateway().await);
        session.submit_identifier("u1").await.unwrap();

        session.react(step(2));
        session.react(step(4));
        assert_eq!(
            session.phase().tally().unwrap().as_array(),
            [0, 0, 0, 0]
        );
    }

    #[tokio::test]
    async fn test_resubmission_after_start_is_rejected() {
        let mut session = Session::new(seeded_gateway().await);
        session.submit_identifier("u1").await.unwrap();

        let err = session.submit_identifier("u2").await.unwrap_err();
        assert!(matches!(err, SubmitError::SessionStarted));
        assert_eq!(session.phase().step(), Some(step(1)));
    }

    #[tokio::test]
    async fn test_gateway_failure_surfaces_and_keeps_prologue() {
        struct FetchFailingGateway;

        #[async_trait]
        impl UserGateway for FetchFailingGateway {
            async fn fetch_by_id(
                &self,
                _id: &UserId,
            ) -> Result<Option<UserRecord>, survey_core::GatewayError> {
                Err(survey_core::GatewayError::storage("fetch", "store is down"))
            }

            async fn write_by_id(
                &self,
                _id: &UserId,
                _record: UserRecord,
            ) -> Result<(), survey_core::GatewayError> {
                Ok(())
            }
        }

        let mut session = Session::new(Arc::new(FetchFailingGateway));
        let err = session.submit_identifier("u1").await.unwrap_err();
        assert!(matches!(err, SubmitError::Gateway(_)));
        assert_eq!(session.phase(), &SessionPhase::Prologue);
    }
}
