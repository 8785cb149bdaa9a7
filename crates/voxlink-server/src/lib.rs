//! Axum-based signaling server: offer/answer negotiation, candidate
//! trickling, and health/connection-info endpoints.

pub mod auth;
pub mod routes;
pub mod server;
pub mod state;

pub use auth::{HttpIdentityVerifier, Identity, IdentityVerifier};
pub use server::{build_router, start_server};
pub use state::AppState;
