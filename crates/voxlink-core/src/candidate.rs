//! Connectivity-candidate normalization.
//!
//! Browsers trickle ICE candidates to the signaling endpoint as they are
//! discovered. Not every entry can be applied: the end-of-candidates marker
//! arrives as an empty candidate string, and some stacks omit both the media
//! line id and index. Those are observed-but-ignored outcomes, never errors.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Raw candidate as received from the client, field names matching the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CandidateDescriptor {
    #[serde(default)]
    pub candidate: String,
    #[serde(default)]
    pub sdp_mid: Option<String>,
    #[serde(default)]
    pub sdp_mline_index: Option<u16>,
}

/// A candidate that passed validation and can be applied to a live handshake.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedCandidate {
    pub candidate: String,
    pub sdp_mid: Option<String>,
    pub sdp_mline_index: Option<u16>,
}

/// Normalize a raw candidate descriptor.
///
/// Returns `None` (skip, not failure) when:
/// 1. the candidate string is empty — end-of-candidates marker;
/// 2. both `sdp_mid` and `sdp_mline_index` are absent — the candidate
///    cannot be attached to a media line.
pub fn resolve(raw: &CandidateDescriptor) -> Option<ResolvedCandidate> {
    if raw.candidate.is_empty() {
        return None;
    }

    if raw.sdp_mid.is_none() && raw.sdp_mline_index.is_none() {
        debug!("Skipping candidate without sdp_mid or sdp_mline_index");
        return None;
    }

    Some(ResolvedCandidate {
        candidate: raw.candidate.clone(),
        sdp_mid: raw.sdp_mid.clone(),
        sdp_mline_index: raw.sdp_mline_index,
    })
}
