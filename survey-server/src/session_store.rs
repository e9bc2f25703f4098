//! Store for active participant sessions.
//!
//! One `Session` exists per participant browser context, keyed by an
//! opaque token handed out at creation. Each session sits behind its own
//! mutex: handlers acquire it with `try_lock`, so a second request
//! arriving while one is in flight is rejected rather than queued. That
//! is the runtime half of the re-entrancy guard; the driver's `&mut self`
//! operations are the type-level half.
//!
//! Sessions have no persisted form. An abandoned session is pruned after
//! an idle TTL and its accumulated reactions are discarded; the remote
//! record stays untouched by design.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};
use uuid::Uuid;

use survey_core::UserGateway;

use crate::session::Session;

/// How often the background loop looks for idle sessions.
const PRUNE_INTERVAL_SECS: u64 = 60;

/// Opaque handle for one participant session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionToken(Uuid);

impl SessionToken {
    fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse the path-parameter form. `None` for anything that is not a
    /// token we could have issued.
    pub fn parse(s: &str) -> Option<Self> {
        Uuid::parse_str(s).ok().map(Self)
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One tracked session plus its idle clock.
pub struct SessionSlot<G> {
    /// Handlers must `try_lock` this; a held lock means a request is in
    /// flight and concurrent activation is refused.
    pub session: Arc<Mutex<Session<G>>>,
    last_seen: AtomicI64,
}

impl<G> SessionSlot<G> {
    fn touch(&self) {
        self.last_seen.store(now_secs(), Ordering::Relaxed);
    }
}

/// Thread-safe store of active sessions.
pub struct SessionStore<G> {
    sessions: RwLock<HashMap<SessionToken, Arc<SessionSlot<G>>>>,
    gateway: Arc<G>,
}

impl<G: UserGateway> SessionStore<G> {
    pub fn new(gateway: Arc<G>) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            gateway,
        }
    }

    /// Create a session at the prologue and return its token.
    pub async fn create(&self) -> SessionToken {
        let token = SessionToken::generate();
        let slot = Arc::new(SessionSlot {
            session: Arc::new(Mutex::new(Session::new(self.gateway.clone()))),
            last_seen: AtomicI64::new(now_secs()),
        });
        let mut sessions = self.sessions.write().await;
        sessions.insert(token, slot);
        token
    }

    /// Look up a session, refreshing its idle clock.
    pub async fn get(&self, token: &SessionToken) -> Option<Arc<SessionSlot<G>>> {
        let sessions = self.sessions.read().await;
        let slot = sessions.get(token).cloned();
        if let Some(ref slot) = slot {
            slot.touch();
        }
        slot
    }

    /// Number of tracked sessions.
    pub async fn len(&self) -> usize {
        let sessions = self.sessions.read().await;
        sessions.len()
    }

    /// Drop sessions idle for longer than `ttl_seconds`.
    ///
    /// A session whose mutex is currently held has a request in flight
    /// and survives regardless of its clock. Returns the number removed.
    pub async fn prune_idle(&self, ttl_seconds: i64) -> usize {
        let cutoff = now_secs() - ttl_seconds;

        let mut sessions = self.sessions.write().await;
        let mut removed = 0;
        sessions.retain(|token, slot| {
            if slot.last_seen.load(Ordering::Relaxed) > cutoff {
                return true;
            }
            let Ok(session) = slot.session.try_lock() else {
                return true;
            };
            if session.phase().has_unsaved_progress() {
                warn!(
                    "Pruning idle session {} mid-scenario; accumulated reactions are discarded",
                    token
                );
            }
            removed += 1;
            false
        });
        removed
    }
}

/// Background loop that prunes idle sessions until the process exits.
pub async fn session_pruning_loop<G: UserGateway + 'static>(
    store: Arc<SessionStore<G>>,
    ttl_seconds: i64,
) {
    let mut interval = tokio::time::interval(Duration::from_secs(PRUNE_INTERVAL_SECS));

    loop {
        interval.tick().await;

        let removed = store.prune_idle(ttl_seconds).await;
        if removed > 0 {
            info!("Pruned {} idle sessions", removed);
        }
    }
}

/// Current unix timestamp in seconds.
fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}
