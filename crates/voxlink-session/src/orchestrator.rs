//! Session orchestrator — drives one pipeline for the lifetime of its
//! connection.
//!
//! The orchestrator consumes the transport's typed event stream in its own
//! task: a connect event injects the greeting run trigger at the pipeline
//! head, a disconnect (graceful or not) or the first stage failure tears the
//! session down. Teardown goes through the registry's idempotent close path,
//! so racing with process shutdown is harmless.

use std::sync::Arc;

use tracing::{debug, error, info};

use voxlink_core::frame::{ControlSignal, Frame};

use crate::pipeline::{PipelineBuilder, PipelineStage};
use crate::registry::{Session, SessionRegistry};
use crate::transport::TransportEvent;

pub struct SessionOrchestrator {
    registry: Arc<SessionRegistry>,
    session: Arc<Session>,
}

impl SessionOrchestrator {
    pub fn new(registry: Arc<SessionRegistry>, session: Arc<Session>) -> Self {
        Self { registry, session }
    }

    /// Run the stage chain to completion. Resolves only once the session is
    /// fully closed and its registry entry removed.
    pub async fn run(self, stages: Vec<Box<dyn PipelineStage>>, channel_capacity: usize) {
        let session_id = self.session.id.clone();
        let cancel = self.session.cancel.clone();

        let mut builder = PipelineBuilder::new(channel_capacity);
        for stage in stages {
            builder = builder.stage_boxed(stage);
        }
        let (handle, mut join) = builder.spawn(&cancel);

        let Some(mut events) = self.session.transport.take_events().await else {
            error!(session_id, "Transport event stream already consumed");
            self.registry.close_session(&self.session).await;
            join.shutdown().await;
            return;
        };

        info!(session_id, "Session pipeline started");

        loop {
            tokio::select! {
                result = join.wait() => {
                    match result {
                        Ok(()) => info!(session_id, "Pipeline finished"),
                        Err(e) => error!(session_id, %e, "Pipeline stage failed"),
                    }
                    break;
                }
                event = events.recv() => match event {
                    Some(TransportEvent::Connected) => {
                        debug!(session_id, "Peer connected; requesting greeting");
                        let trigger = Frame::Control(ControlSignal::RunLanguageGeneration);
                        if !handle.inject(trigger).await {
                            break;
                        }
                    }
                    Some(TransportEvent::AppMessage(message)) => {
                        debug!(session_id, ?message, "Inbound app message");
                    }
                    Some(TransportEvent::Disconnected) | None => {
                        info!(session_id, "Peer disconnected");
                        break;
                    }
                },
            }
        }

        self.registry.close_session(&self.session).await;
        drop(handle);
        join.shutdown().await;
        debug!(session_id, "Session resources released");
    }
}
