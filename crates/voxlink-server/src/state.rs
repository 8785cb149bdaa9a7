//! Shared server state.

use std::sync::Arc;

use voxlink_core::config::Config;
use voxlink_session::{NegotiationService, SessionRegistry};

use crate::auth::IdentityVerifier;

/// Shared state accessible from all route handlers.
pub struct AppState {
    pub config: Arc<Config>,
    pub negotiation: NegotiationService,
    pub registry: Arc<SessionRegistry>,
    /// Absent when the `auth` config section is missing; offers are then
    /// accepted without a token.
    pub verifier: Option<Arc<dyn IdentityVerifier>>,
}

impl AppState {
    pub fn new(
        config: Arc<Config>,
        negotiation: NegotiationService,
        verifier: Option<Arc<dyn IdentityVerifier>>,
    ) -> Self {
        let registry = negotiation.registry().clone();
        Self {
            config,
            negotiation,
            registry,
            verifier,
        }
    }
}
