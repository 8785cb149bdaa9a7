//! Signaling API tests driven through the router with `tower::oneshot`.

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::{Value, json};
use tokio::sync::mpsc;
use tower::ServiceExt;

use voxlink_core::config::Config;
use voxlink_core::context::ContextMessage;
use voxlink_core::error::{Result, VoxlinkError};
use voxlink_engines::{
    EngineFactory, LanguageGeneration, SpeechToText, TextToSpeech, Transcript,
};
use voxlink_server::{AppState, Identity, IdentityVerifier, build_router};
use voxlink_session::{LoopbackTransportFactory, NegotiationService, SessionRegistry};

/// Engines that never produce anything; negotiation does not need them to.
struct SilentEngines;

struct SilentStt;

#[async_trait]
impl SpeechToText for SilentStt {
    async fn feed(&mut self, _pcm: &[u8]) -> Result<Vec<Transcript>> {
        Ok(Vec::new())
    }

    async fn flush(&mut self) -> Result<Vec<Transcript>> {
        Ok(Vec::new())
    }
}

struct SilentLlm;

#[async_trait]
impl LanguageGeneration for SilentLlm {
    async fn generate(&self, _context: &[ContextMessage]) -> Result<String> {
        Ok("ok".into())
    }
}

struct SilentTts;

#[async_trait]
impl TextToSpeech for SilentTts {
    async fn synthesize(
        &self,
        _text: &str,
        _chunk_tx: mpsc::UnboundedSender<Vec<u8>>,
    ) -> Result<()> {
        Ok(())
    }
}

impl EngineFactory for SilentEngines {
    fn speech_to_text(&self) -> Box<dyn SpeechToText> {
        Box::new(SilentStt)
    }

    fn language_generation(&self) -> Arc<dyn LanguageGeneration> {
        Arc::new(SilentLlm)
    }

    fn text_to_speech(&self) -> Arc<dyn TextToSpeech> {
        Arc::new(SilentTts)
    }
}

/// Accepts exactly one token.
struct StaticVerifier;

#[async_trait]
impl IdentityVerifier for StaticVerifier {
    async fn verify(&self, token: &str) -> Result<Identity> {
        if token == "valid-token" {
            Ok(Identity {
                id: "u1".into(),
                email: Some("alice@example.com".into()),
                display_name: Some("Alice".into()),
            })
        } else {
            Err(VoxlinkError::Auth("token rejected".into()))
        }
    }
}

fn test_app(verifier: Option<Arc<dyn IdentityVerifier>>) -> (Router, Arc<SessionRegistry>) {
    let config = Arc::new(Config::default());
    let registry = Arc::new(SessionRegistry::new());
    let negotiation = NegotiationService::new(
        registry.clone(),
        Arc::new(LoopbackTransportFactory::detached()),
        Arc::new(SilentEngines),
        config.clone(),
    );
    let state = Arc::new(AppState::new(config, negotiation, verifier));
    (build_router(state), registry)
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::post(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn offer_returns_answer_and_registers_session() {
    let (app, registry) = test_app(None);

    let response = app
        .oneshot(post_json("/api/offer", json!({"sdp": "v=0", "type": "offer"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["type"], "answer");
    assert!(body["sdp"].as_str().unwrap().starts_with("v=0"));

    let pc_id = body["pc_id"].as_str().unwrap();
    assert!(registry.get(pc_id).await.is_some());
}

#[tokio::test]
async fn empty_offer_fails_without_registering() {
    let (app, registry) = test_app(None);

    let response = app
        .oneshot(post_json("/api/offer", json!({"sdp": "", "type": "offer"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn candidates_for_unknown_session_are_not_found() {
    let (app, registry) = test_app(None);

    let response = app
        .oneshot(post_json(
            "/api/candidate",
            json!({
                "pc_id": "no-such-session",
                "candidates": [{"candidate": "candidate:1", "sdp_mid": "0"}],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn skippable_candidates_still_report_ok() {
    let (app, registry) = test_app(None);

    let response = app
        .clone()
        .oneshot(post_json("/api/offer", json!({"sdp": "v=0", "type": "offer"})))
        .await
        .unwrap();
    let pc_id = json_body(response).await["pc_id"]
        .as_str()
        .unwrap()
        .to_string();

    // An end-of-candidates marker and an unattributable entry: both skipped,
    // the batch still succeeds.
    let response = app
        .oneshot(post_json(
            "/api/candidate",
            json!({
                "pc_id": pc_id,
                "candidates": [
                    {"candidate": ""},
                    {"candidate": "candidate:9"},
                ],
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["status"], "ok");

    let session = registry.get(&pc_id).await.unwrap();
    assert!(session.candidate_queue().await.is_empty());
}

#[tokio::test]
async fn offer_without_token_is_unauthorized() {
    let (app, registry) = test_app(Some(Arc::new(StaticVerifier)));

    let response = app
        .oneshot(post_json("/api/offer", json!({"sdp": "v=0", "type": "offer"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn offer_with_bad_token_is_unauthorized() {
    let (app, registry) = test_app(Some(Arc::new(StaticVerifier)));

    let request = Request::post("/api/offer")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer wrong")
        .body(Body::from(json!({"sdp": "v=0", "type": "offer"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(registry.is_empty().await);
}

#[tokio::test]
async fn offer_with_valid_token_succeeds() {
    let (app, registry) = test_app(Some(Arc::new(StaticVerifier)));

    let request = Request::post("/api/offer")
        .header(header::CONTENT_TYPE, "application/json")
        .header(header::AUTHORIZATION, "Bearer valid-token")
        .body(Body::from(json!({"sdp": "v=0", "type": "offer"}).to_string()))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(registry.len().await, 1);
}

#[tokio::test]
async fn connection_info_advertises_transport() {
    let (app, _registry) = test_app(None);

    let response = app
        .oneshot(Request::get("/").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["transport"], "webrtc");
    let ice = body["ice_servers"].as_array().unwrap();
    assert!(!ice.is_empty());
    assert!(ice[0]["urls"].as_str().unwrap().starts_with("stun:"));
}

#[tokio::test]
async fn health_reports_session_count() {
    let (app, _registry) = test_app(None);

    let response = app
        .clone()
        .oneshot(post_json("/api/offer", json!({"sdp": "v=0", "type": "offer"})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = app
        .oneshot(Request::get("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    let body = json_body(response).await;
    assert_eq!(body["status"], "ok");
    assert_eq!(body["sessions"], 1);
    assert!(body["version"].is_string());
}
