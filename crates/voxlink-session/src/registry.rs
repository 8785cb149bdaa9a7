//! Session registry — the process-wide map from session id to handle.
//!
//! A session is either absent, pending (answer returned, pipeline not yet
//! running), active, closing, or closed. The registry owns the handle from
//! insert until close; the orchestrator only borrows it while running.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use uuid::Uuid;

use voxlink_core::candidate::ResolvedCandidate;

use crate::transport::PeerTransport;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Pending,
    Active,
    Closing,
    Closed,
}

/// One negotiated session.
///
/// The candidate queue and the frame pipeline are independent mutation
/// surfaces: candidates are guarded here, frames flow through the stage
/// channels, and neither blocks the other.
pub struct Session {
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub transport: Arc<dyn PeerTransport>,
    /// Cooperative cancellation signal observed by every pipeline stage.
    pub cancel: CancellationToken,
    state: Mutex<SessionState>,
    candidates: Mutex<Vec<ResolvedCandidate>>,
}

impl Session {
    pub fn new(transport: Arc<dyn PeerTransport>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            created_at: Utc::now(),
            transport,
            cancel: CancellationToken::new(),
            state: Mutex::new(SessionState::Pending),
            candidates: Mutex::new(Vec::new()),
        }
    }

    pub async fn state(&self) -> SessionState {
        *self.state.lock().await
    }

    /// Transition pending → active. Returns false if the session was not
    /// pending (already started or closing).
    pub async fn mark_active(&self) -> bool {
        let mut state = self.state.lock().await;
        if *state == SessionState::Pending {
            *state = SessionState::Active;
            true
        } else {
            false
        }
    }

    /// Transition into closing. Returns true only for the caller that wins;
    /// closing an already-closing or closed session is a no-op.
    pub(crate) async fn begin_close(&self) -> bool {
        let mut state = self.state.lock().await;
        match *state {
            SessionState::Pending | SessionState::Active => {
                *state = SessionState::Closing;
                true
            }
            SessionState::Closing | SessionState::Closed => false,
        }
    }

    pub(crate) async fn mark_closed(&self) {
        *self.state.lock().await = SessionState::Closed;
    }

    /// Append a resolved candidate to the session's queue.
    pub async fn push_candidate(&self, candidate: ResolvedCandidate) {
        self.candidates.lock().await.push(candidate);
    }

    /// The resolved candidate queue, in arrival order.
    pub async fn candidate_queue(&self) -> Vec<ResolvedCandidate> {
        self.candidates.lock().await.clone()
    }
}

/// Process-wide session map. Held in memory only; cleared at shutdown.
#[derive(Default)]
pub struct SessionRegistry {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, session: Arc<Session>) {
        debug!(session_id = %session.id, "Session registered");
        self.sessions
            .write()
            .await
            .insert(session.id.clone(), session);
    }

    pub async fn get(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(id).cloned()
    }

    pub async fn remove(&self, id: &str) -> Option<Arc<Session>> {
        self.sessions.write().await.remove(id)
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.sessions.read().await.is_empty()
    }

    /// Close one session: cancel its pipeline, release the transport, and
    /// remove the registry entry. Idempotent — only the first caller does
    /// the work; later calls observe closing/closed and return.
    pub async fn close_session(&self, session: &Arc<Session>) {
        if !session.begin_close().await {
            return;
        }

        session.cancel.cancel();
        session.transport.close().await;
        self.remove(&session.id).await;
        session.mark_closed().await;

        info!(session_id = %session.id, "Session closed");
    }

    /// Force-close every session. Called once at process shutdown.
    pub async fn shutdown_all(&self) {
        let sessions: Vec<Arc<Session>> =
            self.sessions.read().await.values().cloned().collect();
        if !sessions.is_empty() {
            info!(count = sessions.len(), "Closing all sessions");
        }
        for session in sessions {
            self.close_session(&session).await;
        }
    }
}
