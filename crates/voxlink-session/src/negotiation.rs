//! Negotiation service — the public entry surface for session creation,
//! candidate attachment, and pipeline start.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use voxlink_core::candidate::{self, CandidateDescriptor};
use voxlink_core::config::Config;
use voxlink_core::context::ConversationContext;
use voxlink_core::error::{Result, VoxlinkError};
use voxlink_engines::EngineFactory;

use crate::orchestrator::SessionOrchestrator;
use crate::registry::{Session, SessionRegistry};
use crate::stages::build_stage_chain;
use crate::transport::TransportFactory;

/// What the negotiation caller gets back: the session id plus the local
/// answer description.
#[derive(Debug, Clone)]
pub struct AnswerDescriptor {
    pub session_id: String,
    pub answer_sdp: String,
    pub answer_type: String,
}

pub struct NegotiationService {
    registry: Arc<SessionRegistry>,
    transports: Arc<dyn TransportFactory>,
    engines: Arc<dyn EngineFactory>,
    config: Arc<Config>,
}

impl NegotiationService {
    pub fn new(
        registry: Arc<SessionRegistry>,
        transports: Arc<dyn TransportFactory>,
        engines: Arc<dyn EngineFactory>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            transports,
            engines,
            config,
        }
    }

    pub fn registry(&self) -> &Arc<SessionRegistry> {
        &self.registry
    }

    /// Validate the offer, negotiate an answer, and register the session as
    /// pending. Synchronous up to the answer; streaming starts separately.
    ///
    /// On failure nothing is registered — the caller re-negotiates from
    /// scratch.
    pub async fn create_session(
        &self,
        offer_sdp: &str,
        offer_type: &str,
    ) -> Result<AnswerDescriptor> {
        if offer_sdp.trim().is_empty() {
            return Err(VoxlinkError::Negotiation("empty offer SDP".into()));
        }
        if offer_type != "offer" {
            return Err(VoxlinkError::Negotiation(format!(
                "expected an offer, got `{offer_type}`"
            )));
        }

        let transport = self.transports.create(&self.config.ice_servers()).await?;
        let answer = transport.negotiate(offer_sdp, offer_type).await?;

        let session = Arc::new(Session::new(transport));
        let session_id = session.id.clone();
        self.registry.insert(session).await;

        info!(session_id, "Session negotiated");
        Ok(AnswerDescriptor {
            session_id,
            answer_sdp: answer.sdp,
            answer_type: answer.kind,
        })
    }

    /// Resolve and apply a batch of trickled candidates.
    ///
    /// Invalid entries are skipped, and per-candidate application errors are
    /// logged and swallowed — the batch itself succeeds as long as the
    /// session exists. Runs concurrently with the frame pipeline without
    /// touching it.
    pub async fn attach_candidates(
        &self,
        session_id: &str,
        raw_candidates: &[CandidateDescriptor],
    ) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| VoxlinkError::SessionNotFound(session_id.to_string()))?;

        for raw in raw_candidates {
            let Some(resolved) = candidate::resolve(raw) else {
                continue;
            };
            session.push_candidate(resolved.clone()).await;
            if let Err(e) = session.transport.add_remote_candidate(&resolved).await {
                warn!(session_id, %e, "Failed to apply candidate");
            }
        }

        debug!(session_id, count = raw_candidates.len(), "Candidate batch processed");
        Ok(())
    }

    /// Transition pending → active and hand the session to an orchestrator
    /// task. Fire-and-forget: returns as soon as the task is spawned.
    pub async fn start_session(
        &self,
        session_id: &str,
        display_name: Option<String>,
    ) -> Result<()> {
        let session = self
            .registry
            .get(session_id)
            .await
            .ok_or_else(|| VoxlinkError::SessionNotFound(session_id.to_string()))?;

        if !session.mark_active().await {
            return Err(VoxlinkError::Negotiation(format!(
                "session {session_id} is not pending"
            )));
        }

        let context = Arc::new(Mutex::new(ConversationContext::seeded(
            &self.config.persona_prompt(),
            &self.config.greeting_instruction(),
            display_name.as_deref(),
        )));

        let stages = build_stage_chain(
            session.transport.clone(),
            self.engines.as_ref(),
            context,
            self.config.assume_final(),
        );

        let orchestrator = SessionOrchestrator::new(self.registry.clone(), session);
        let capacity = self.config.channel_capacity();
        tokio::spawn(orchestrator.run(stages, capacity));

        Ok(())
    }
}
