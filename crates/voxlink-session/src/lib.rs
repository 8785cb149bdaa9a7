//! Session layer — negotiation, registry, frame pipeline, and orchestration.
//!
//! A session is born at the signaling endpoint: the negotiation service
//! validates the peer's offer, produces an answer through the transport, and
//! registers the session as pending. Starting the session assembles the
//! stage chain (audio in → speech-to-text → taps/aggregators → generation →
//! synthesis → audio out) and hands it to the orchestrator, which drives the
//! stream until the peer disconnects or a stage fails.

pub mod negotiation;
pub mod orchestrator;
pub mod pipeline;
pub mod registry;
pub mod stages;
pub mod transport;

pub use negotiation::{AnswerDescriptor, NegotiationService};
pub use orchestrator::SessionOrchestrator;
pub use pipeline::{PipelineBuilder, PipelineHandle, PipelineJoin, PipelineStage};
pub use registry::{Session, SessionRegistry, SessionState};
pub use transport::{
    AnswerSdp, LoopbackClient, LoopbackTransport, LoopbackTransportFactory, PeerTransport,
    TransportEvent, TransportFactory,
};
