use std::{convert::Infallible, net::SocketAddr, sync::Arc, time::Duration};

use axum::{
    Json, Router,
    extract::{
        DefaultBodyLimit, Path, Query, Request, State,
        rejection::{JsonRejection, PathRejection},
    },
    http::StatusCode,
    middleware::{self, Next},
    response::{
        IntoResponse, Response,
        sse::{Event, KeepAlive, Sse},
    },
    routing::{delete, get, post, put},
};
use futures_util::stream::{Stream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_stream::wrappers::BroadcastStream;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::warn;
use uuid::Uuid;

use crate::{
    capabilities::{BatchRequest, EditRequest, FusionRequest, GenerateRequest, InlineImage},
    config::AuthConfig,
    errors::{Result, StudioError},
    events::BroadcastSender,
    options::AspectRatio,
    orchestrator::Studio,
};

#[derive(Clone)]
pub struct SignatureAuth {
    access_key: String,
    secret_key: String,
    max_age: Duration,
}

impl SignatureAuth {
    pub fn new(access_key: String, secret_key: String, max_age: Duration) -> Self {
        Self {
            access_key,
            secret_key,
            max_age,
        }
    }

    pub fn from_config(config: &AuthConfig) -> Self {
        Self::new(
            config.access_key.clone(),
            config.secret_key.clone(),
            config.signature_ttl,
        )
    }

    /// Checks `hex(hmac_sha256(secret, "<access_key>:<timestamp>:<nonce>"))` and the
    /// timestamp age.
    pub fn verify_params(&self, params: &AuthParams) -> bool {
        if params.access_key != self.access_key {
            return false;
        }

        let now = chrono::Utc::now().timestamp();
        let diff = now.abs_diff(params.timestamp);
        if diff > self.max_age.as_secs() {
            return false;
        }

        let canonical = format!("{}:{}:{}", params.access_key, params.timestamp, params.nonce);
        let signature_bytes = match hex::decode(&params.signature) {
            Ok(bytes) => bytes,
            Err(_) => return false,
        };

        use hmac::{Hmac, Mac};
        use sha2::Sha256;

        let mut mac = match Hmac::<Sha256>::new_from_slice(self.secret_key.as_bytes()) {
            Ok(mac) => mac,
            Err(_) => return false,
        };
        mac.update(canonical.as_bytes());
        mac.verify_slice(&signature_bytes).is_ok()
    }
}

#[derive(Debug, Deserialize)]
pub struct AuthParams {
    access_key: String,
    timestamp: i64,
    nonce: String,
    signature: String,
}

#[derive(Clone)]
pub struct AppState {
    studio: Arc<Studio>,
    auth: Option<Arc<SignatureAuth>>,
    broadcaster: BroadcastSender,
    max_body_bytes: usize,
}

impl AppState {
    pub fn new(
        studio: Arc<Studio>,
        auth: Option<Arc<SignatureAuth>>,
        broadcaster: BroadcastSender,
        max_body_bytes: usize,
    ) -> Self {
        Self {
            studio,
            auth,
            broadcaster,
            max_body_bytes,
        }
    }
}

/// Failure body shared by every action: `{ "success": false, "error": "..." }`.
pub struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<StudioError> for ApiError {
    fn from(err: StudioError) -> Self {
        let status = match &err {
            StudioError::InvalidInput(_) => StatusCode::BAD_REQUEST,
            StudioError::SessionNotFound(_) => StatusCode::NOT_FOUND,
            StudioError::Provider(_) | StudioError::EmptyResult(_) | StudioError::Reqwest(_) => {
                StatusCode::BAD_GATEWAY
            }
            StudioError::Io(_) | StudioError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            warn!(target: "api", error = %err, "action failed");
        }
        Self::new(status, err.to_string())
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        let status = match rejection.status() {
            StatusCode::PAYLOAD_TOO_LARGE => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::BAD_REQUEST,
        };
        Self::new(status, rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        Self::new(StatusCode::BAD_REQUEST, rejection.body_text())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (
            self.status,
            Json(json!({ "success": false, "error": self.message })),
        )
            .into_response()
    }
}

#[derive(Serialize)]
struct Success<T> {
    success: bool,
    #[serde(flatten)]
    data: T,
}

type ApiResult = std::result::Result<Response, ApiError>;

fn success<T: Serialize>(data: T) -> ApiResult {
    Ok(Json(Success {
        success: true,
        data,
    })
    .into_response())
}

pub fn router(state: AppState) -> Router {
    let api = Router::new()
        .route("/optimize", post(optimize_handler))
        .route("/generate", post(generate_handler))
        .route("/edit", post(edit_handler))
        .route("/batch", post(batch_handler))
        .route("/fuse", post(fuse_handler))
        .route("/sessions", post(create_session_handler))
        .route("/sessions/{id}", delete(delete_session_handler))
        .route("/sessions/{id}/history", get(history_handler))
        .route("/sessions/{id}/style-reference", put(style_reference_handler))
        .route("/events", get(events_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_signature))
        .layer(DefaultBodyLimit::max(state.max_body_bytes));

    Router::new()
        .route("/health", get(|| async { Json(json!({ "status": "ok" })) }))
        .nest("/api", api)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

pub async fn run_server(addr: SocketAddr, state: AppState) -> Result<()> {
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(target: "api", %addr, "HTTP server listening");

    axum::serve(listener, app)
        .await
        .map_err(|err| StudioError::other(format!("HTTP server error: {err}")))?;

    Ok(())
}

async fn require_signature(State(state): State<AppState>, request: Request, next: Next) -> Response {
    if let Some(auth) = &state.auth {
        let verified = Query::<AuthParams>::try_from_uri(request.uri())
            .map(|Query(params)| auth.verify_params(&params))
            .unwrap_or(false);
        if !verified {
            return ApiError::new(StatusCode::UNAUTHORIZED, "invalid or expired signature")
                .into_response();
        }
    }
    next.run(request).await
}

#[derive(Debug, Deserialize)]
struct OptimizeBody {
    #[serde(default)]
    prompt: String,
    #[serde(default)]
    aspect_ratio: AspectRatio,
    #[serde(default)]
    images: Vec<InlineImage>,
}

#[derive(Debug, Deserialize)]
struct GenerateBody {
    #[serde(flatten)]
    request: GenerateRequest,
    #[serde(default)]
    session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct EditBody {
    #[serde(flatten)]
    request: EditRequest,
    #[serde(default)]
    session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct FuseBody {
    #[serde(flatten)]
    request: FusionRequest,
    #[serde(default)]
    session_id: Option<Uuid>,
}

#[derive(Debug, Deserialize)]
struct StyleReferenceBody {
    #[serde(default)]
    index: Option<usize>,
}

async fn optimize_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<OptimizeBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let optimized = state
        .studio
        .optimize(&body.prompt, body.aspect_ratio, &body.images)
        .await?;
    success(optimized)
}

async fn generate_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<GenerateBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let outcome = state.studio.generate(body.request, body.session_id).await?;
    success(json!({
        "image": outcome.image,
        "prompt": outcome.prompt,
        "aspect_ratio": outcome.aspect_ratio,
        "history_entry": outcome.history_entry,
    }))
}

async fn edit_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<EditBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let outcome = state.studio.edit(body.request, body.session_id).await?;
    success(json!({
        "image": outcome.image,
        "prompt": outcome.prompt,
        "aspect_ratio": outcome.aspect_ratio,
        "history_entry": outcome.history_entry,
    }))
}

async fn batch_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<BatchRequest>, JsonRejection>,
) -> ApiResult {
    let Json(request) = body?;
    let outcome = state.studio.batch(request).await?;
    success(outcome)
}

async fn fuse_handler(
    State(state): State<AppState>,
    body: std::result::Result<Json<FuseBody>, JsonRejection>,
) -> ApiResult {
    let Json(body) = body?;
    let (outcome, history_entry) = state.studio.fuse(body.request, body.session_id).await?;
    success(json!({
        "image": outcome.image,
        "description": outcome.description,
        "analysis": outcome.analysis,
        "technical_details": outcome.technical_details,
        "history_entry": history_entry,
    }))
}

async fn create_session_handler(State(state): State<AppState>) -> ApiResult {
    let id = state.studio.create_session().await;
    success(json!({ "session_id": id }))
}

async fn delete_session_handler(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    state.studio.delete_session(id).await?;
    success(json!({ "deleted": true }))
}

async fn history_handler(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let page = state.studio.history(id).await?;
    success(page)
}

async fn style_reference_handler(
    State(state): State<AppState>,
    id: std::result::Result<Path<Uuid>, PathRejection>,
    body: std::result::Result<Json<StyleReferenceBody>, JsonRejection>,
) -> ApiResult {
    let Path(id) = id?;
    let Json(body) = body?;
    let selected = state.studio.select_style_reference(id, body.index).await?;
    success(json!({ "selected": selected }))
}

async fn events_handler(
    State(state): State<AppState>,
) -> Sse<impl Stream<Item = std::result::Result<Event, Infallible>>> {
    let rx = state.broadcaster.subscribe();
    let stream = BroadcastStream::new(rx).filter_map(|result| async move {
        match result {
            Ok(message) => Some(Ok(Event::default().data(message))),
            Err(_) => None,
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        capabilities::testing::{Scripted, ScriptedProvider, png},
        config::DEFAULT_MAX_BODY_BYTES,
        events::message_bus,
    };
    use axum::body::{Body, to_bytes};
    use hmac::{Hmac, Mac};
    use serde_json::Value;
    use sha2::Sha256;
    use tower::ServiceExt;

    fn app(script: Vec<Scripted>, auth: Option<SignatureAuth>) -> (Router, Arc<ScriptedProvider>) {
        app_with_body_limit(script, auth, DEFAULT_MAX_BODY_BYTES)
    }

    fn app_with_body_limit(
        script: Vec<Scripted>,
        auth: Option<SignatureAuth>,
        max_body_bytes: usize,
    ) -> (Router, Arc<ScriptedProvider>) {
        let provider = ScriptedProvider::new(script);
        let (broadcaster, _) = message_bus();
        let studio = Studio::with_limits(provider.clone(), 4, 6, 16, Some(broadcaster.clone()));
        let state = AppState::new(
            Arc::new(studio),
            auth.map(Arc::new),
            broadcaster,
            max_body_bytes,
        );
        (router(state), provider)
    }

    async fn call(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = axum::http::Request::builder().method(method).uri(uri);
        let request = match body {
            Some(body) => builder
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let value = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, value)
    }

    #[tokio::test]
    async fn health_is_open() {
        let (app, _) = app(vec![], None);
        let (status, body) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
    }

    #[tokio::test]
    async fn optimize_falls_back_and_reports_success() {
        let (app, _) = app(vec![Scripted::Fail("down".to_string())], None);
        let (status, body) = call(
            &app,
            "POST",
            "/api/optimize",
            Some(json!({ "prompt": "red car on a beach", "aspect_ratio": "1:1" })),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["fallback"], true);
        assert!(body["optimized_prompt"].as_str().unwrap().contains("1:1"));
    }

    #[tokio::test]
    async fn generate_returns_data_uri_and_records_history() {
        let (app, _) = app(vec![Scripted::Image(Some(png(5)))], None);

        let (_, created) = call(&app, "POST", "/api/sessions", None).await;
        let session_id = created["session_id"].as_str().unwrap().to_string();

        let (status, body) = call(
            &app,
            "POST",
            "/api/generate",
            Some(json!({
                "prompt": "retro synthwave logo",
                "aspect_ratio": "16:9",
                "session_id": session_id,
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["image"], png(5).to_data_uri());
        assert_eq!(body["history_entry"]["aspect_ratio"], "16:9");

        let (status, history) = call(
            &app,
            "GET",
            &format!("/api/sessions/{session_id}/history"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(history["total"], 1);
        assert_eq!(history["entries"][0]["prompt"], "retro synthwave logo");
    }

    #[tokio::test]
    async fn empty_image_maps_to_failure_shape() {
        let (app, _) = app(vec![Scripted::Image(None)], None);
        let (status, body) = call(
            &app,
            "POST",
            "/api/generate",
            Some(json!({ "prompt": "anything" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["success"], false);
        assert!(body["error"].as_str().unwrap().contains("no image"));
    }

    #[tokio::test]
    async fn validation_errors_never_reach_provider() {
        let (app, provider) = app(vec![], None);

        let (status, body) = call(
            &app,
            "POST",
            "/api/fuse",
            Some(json!({ "images": [png(1).to_data_uri()] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = call(
            &app,
            "POST",
            "/api/edit",
            Some(json!({ "instruction": "brighter" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        let (status, body) = call(
            &app,
            "POST",
            "/api/generate",
            Some(json!({ "prompt": "x", "images": ["not a data uri"] })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);

        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn batch_reports_partial_success() {
        let (app, _) = app(
            vec![
                Scripted::Image(Some(png(1))),
                Scripted::Fail("boom".to_string()),
            ],
            None,
        );
        let (status, body) = call(
            &app,
            "POST",
            "/api/batch",
            Some(json!({
                "prompts": ["episode 1", "episode 2"],
                "base_prompt": "true crime podcast",
                "consistency_mode": "theme",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
        assert_eq!(body["results"].as_array().unwrap().len(), 1);
        assert_eq!(body["results"][0]["index"], 0);
        assert_eq!(body["failed_indices"], json!([1]));
        assert_eq!(body["consistency_score"], 0.5);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let (app, _) = app(vec![], None);
        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/sessions/{}/history", Uuid::new_v4()),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = call(&app, "GET", "/api/sessions/not-a-uuid/history", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn edit_accepts_full_resolution_base_image() {
        let (app, provider) = app(vec![Scripted::Image(Some(png(2)))], None);
        let base = InlineImage::new("image/png", vec![0x5a; 3_000_000]);

        let (status, body) = call(
            &app,
            "POST",
            "/api/edit",
            Some(json!({
                "base_image": base.to_data_uri(),
                "instruction": "make the title yellow",
                "aspect_ratio": "16:9",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].1.images[0].data.len(), 3_000_000);
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_in_failure_shape() {
        let (app, provider) = app_with_body_limit(vec![], None, 64 * 1024);
        let base = InlineImage::new("image/png", vec![0x5a; 200_000]);

        let (status, body) = call(
            &app,
            "POST",
            "/api/edit",
            Some(json!({
                "base_image": base.to_data_uri(),
                "instruction": "brighter",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::PAYLOAD_TOO_LARGE);
        assert_eq!(body["success"], false);
        assert!(provider.calls().is_empty());
    }

    #[tokio::test]
    async fn deleted_session_is_not_found() {
        let (app, _) = app(vec![], None);
        let (_, created) = call(&app, "POST", "/api/sessions", None).await;
        let session_id = created["session_id"].as_str().unwrap().to_string();

        let (status, body) = call(&app, "DELETE", &format!("/api/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);

        let (status, body) = call(
            &app,
            "GET",
            &format!("/api/sessions/{session_id}/history"),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["success"], false);

        let (status, _) = call(&app, "DELETE", &format!("/api/sessions/{session_id}"), None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    fn sign(secret: &str, access_key: &str, timestamp: i64, nonce: &str) -> String {
        let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes()).unwrap();
        mac.update(format!("{access_key}:{timestamp}:{nonce}").as_bytes());
        hex::encode(mac.finalize().into_bytes())
    }

    #[tokio::test]
    async fn signature_guards_api_routes() {
        let auth = SignatureAuth::new("ak".into(), "sk".into(), Duration::from_secs(300));
        let (app, _) = app(vec![], Some(auth));

        let (status, body) = call(&app, "POST", "/api/sessions", None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
        assert_eq!(body["success"], false);

        let now = chrono::Utc::now().timestamp();
        let signature = sign("sk", "ak", now, "n1");
        let uri = format!("/api/sessions?access_key=ak&timestamp={now}&nonce=n1&signature={signature}");
        let (status, body) = call(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);

        let stale = now - 3600;
        let signature = sign("sk", "ak", stale, "n2");
        let uri = format!("/api/sessions?access_key=ak&timestamp={stale}&nonce=n2&signature={signature}");
        let (status, _) = call(&app, "POST", &uri, None).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = call(&app, "GET", "/health", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[test]
    fn rejects_tampered_signature() {
        let auth = SignatureAuth::new("ak".into(), "sk".into(), Duration::from_secs(300));
        let now = chrono::Utc::now().timestamp();
        let params = AuthParams {
            access_key: "ak".into(),
            timestamp: now,
            nonce: "n".into(),
            signature: sign("other", "ak", now, "n"),
        };
        assert!(!auth.verify_params(&params));

        let params = AuthParams {
            signature: sign("sk", "ak", now, "n"),
            ..params
        };
        assert!(auth.verify_params(&params));
    }
}
