use std::path::Path;
use std::sync::Arc;

use axum::{
    body::Bytes,
    extract::{Host, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::services::{ServeDir, ServeFile};
use tracing::{error, warn};

use crate::config::OAuthConfig;
use crate::error::RelayError;
use crate::relay::{TokenRelay, UpstreamResponse};

/// Service identifier reported by the health endpoint.
pub const SERVICE: &str = "rebekko-attendance";

/// Application state shared by all handlers.
#[derive(Clone)]
pub struct AppState {
    pub oauth: Arc<OAuthConfig>,
    pub relay: TokenRelay,
}

impl AppState {
    pub fn new(oauth: OAuthConfig) -> Self {
        let relay = TokenRelay::new(&oauth);
        Self {
            oauth: Arc::new(oauth),
            relay,
        }
    }
}

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: &'static str,
}

/// Body of `POST /api/oauth/token`.
#[derive(Debug, Deserialize)]
pub struct TokenExchangeRequest {
    pub code: String,
    pub code_verifier: String,
    pub redirect_uri: String,
}

/// Body of `POST /api/oauth/refresh`.
#[derive(Debug, Deserialize)]
pub struct TokenRefreshRequest {
    pub refresh_token: String,
}

/// Health check handler - always 200, independent of credential state
async fn health_handler() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            status: "healthy",
            service: SERVICE,
        }),
    )
}

/// Public OAuth configuration for the browser. Never contains the secret;
/// the projection type has no field for it.
async fn oauth_config_handler(
    State(state): State<AppState>,
    host: Option<Host>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let redirect_uri = format!("{}/oauth-callback", request_origin(host, &headers));
    Json(state.oauth.public(redirect_uri))
}

/// Origin as seen by the caller, the server-side stand-in for the front
/// end's `window.location.origin`. `Host` resolves `X-Forwarded-Host`, the
/// `Host` header, then the request URI's authority, in that order.
fn request_origin(host: Option<Host>, headers: &HeaderMap) -> String {
    let scheme = headers
        .get("x-forwarded-proto")
        .and_then(|v| v.to_str().ok())
        .unwrap_or("http");
    let host = host
        .map(|Host(h)| h)
        .unwrap_or_else(|| "localhost".to_string());
    format!("{}://{}", scheme, host)
}

/// Handle `POST /api/oauth/token`: attach the server-held secret and relay
/// the exchange to Google.
async fn exchange_token_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TokenExchangeRequest = parse_json(&body)?;

    require_field("code", &request.code)?;
    require_field("code_verifier", &request.code_verifier)?;
    require_field("redirect_uri", &request.redirect_uri)?;

    let upstream = state
        .relay
        .exchange_code(&request.code, &request.code_verifier, &request.redirect_uri)
        .await?;

    Ok(passthrough(upstream))
}

/// Handle `POST /api/oauth/refresh`.
async fn refresh_token_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let request: TokenRefreshRequest = parse_json(&body)?;

    require_field("refresh_token", &request.refresh_token)?;

    let upstream = state.relay.refresh(&request.refresh_token).await?;

    Ok(passthrough(upstream))
}

/// Parse a JSON request body. Malformed JSON and missing fields answer with
/// the same OAuth-shaped 400 as empty fields.
fn parse_json<T: DeserializeOwned>(body: &[u8]) -> Result<T, ApiError> {
    serde_json::from_slice(body)
        .map_err(|e| RelayError::InvalidRequest(format!("Invalid JSON body: {}", e)).into())
}

/// Presence check only; anything beyond that is Google's call.
fn require_field(name: &str, value: &str) -> Result<(), ApiError> {
    if value.is_empty() {
        return Err(
            RelayError::InvalidRequest(format!("'{}' must be a non-empty string", name)).into(),
        );
    }
    Ok(())
}

/// Relay the provider's status, content type and body without touching them.
fn passthrough(upstream: UpstreamResponse) -> Response {
    (
        upstream.status,
        [(header::CONTENT_TYPE, upstream.content_type)],
        upstream.body,
    )
        .into_response()
}

/// Error type for relay responses.
#[derive(Debug)]
pub struct ApiError(RelayError);

impl From<RelayError> for ApiError {
    fn from(err: RelayError) -> Self {
        Self(err)
    }
}

/// Error response body in the OAuth error shape; the front end renders
/// `error_description`, falling back to `error`.
#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub error_description: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code) = match &self.0 {
            RelayError::SecretMissing => {
                (StatusCode::INTERNAL_SERVER_ERROR, "relay_not_configured")
            }
            RelayError::Transport(_) => (StatusCode::INTERNAL_SERVER_ERROR, "upstream_unreachable"),
            RelayError::InvalidRequest(_) => (StatusCode::BAD_REQUEST, "invalid_request"),
        };

        let message = self.0.to_string();
        match &self.0 {
            RelayError::InvalidRequest(_) => {
                warn!(status = %status, code, error = %message, "Rejected relay request");
            }
            _ => {
                error!(status = %status, code, error = %message, "Relay failure");
            }
        }

        let body = ErrorResponse {
            error: code.to_string(),
            error_description: message,
        };

        (status, Json(body)).into_response()
    }
}

/// Build the full application router.
///
/// `static_dir` holds the front-end bundle: `index.html` is the entry
/// document and `oauth-callback.html` the popup landing page, mirroring the
/// `/static` mount of the original deployment.
pub fn app_router(state: AppState, static_dir: &Path) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/api/oauth/config", get(oauth_config_handler))
        .route("/api/oauth/token", post(exchange_token_handler))
        .route("/api/oauth/refresh", post(refresh_token_handler))
        .route_service("/", ServeFile::new(static_dir.join("index.html")))
        .route_service(
            "/oauth-callback",
            ServeFile::new(static_dir.join("oauth-callback.html")),
        )
        .nest_service("/static", ServeDir::new(static_dir))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use std::path::PathBuf;
    use tower::ServiceExt;

    fn static_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("static")
    }

    fn test_router(secret: Option<&str>) -> Router {
        let state = AppState::new(OAuthConfig::google(secret.map(|s| s.to_string())));
        app_router(state, &static_dir())
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_health_endpoint() {
        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["status"], "healthy");
        assert_eq!(json["service"], "rebekko-attendance");
    }

    #[tokio::test]
    async fn test_health_ignores_credential_state() {
        let response = test_router(None)
            .oneshot(
                Request::builder()
                    .uri("/health")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
    }

    #[tokio::test]
    async fn test_config_endpoint_uses_request_host() {
        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .uri("/api/oauth/config")
                    .header("host", "rebekko.example.com")
                    .header("x-forwarded-proto", "https")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            json["redirectUri"],
            "https://rebekko.example.com/oauth-callback"
        );
        assert_eq!(json["clientId"], crate::config::GOOGLE_CLIENT_ID);
        assert_eq!(json["usePKCE"], true);
    }

    #[tokio::test]
    async fn test_config_host_from_request_uri() {
        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .uri("http://app.rebekko.example/api/oauth/config")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(
            json["redirectUri"],
            "http://app.rebekko.example/oauth-callback"
        );
    }

    #[tokio::test]
    async fn test_config_endpoint_never_leaks_secret() {
        for secret in [None, Some("shh-very-secret")] {
            let response = test_router(secret)
                .oneshot(
                    Request::builder()
                        .uri("/api/oauth/config")
                        .header("host", "localhost:8080")
                        .body(Body::empty())
                        .unwrap(),
                )
                .await
                .unwrap();

            assert_eq!(response.status(), StatusCode::OK);
            let text = body_text(response).await;
            assert!(!text.contains("shh-very-secret"));
            assert!(!text.to_lowercase().contains("secret"));
        }
    }

    #[tokio::test]
    async fn test_exchange_rejects_empty_code() {
        let body = serde_json::json!({
            "code": "",
            "code_verifier": "v",
            "redirect_uri": "http://localhost:8080/oauth-callback"
        });

        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/oauth/token")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "invalid_request");
        assert!(json["error_description"].as_str().unwrap().contains("code"));
    }

    #[tokio::test]
    async fn test_exchange_rejects_missing_field() {
        let body = serde_json::json!({
            "code_verifier": "v",
            "redirect_uri": "http://localhost:8080/oauth-callback"
        });

        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/oauth/token")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "invalid_request");
        assert!(json["error_description"]
            .as_str()
            .unwrap()
            .contains("missing field"));
    }

    #[tokio::test]
    async fn test_exchange_rejects_malformed_json() {
        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/oauth/token")
                    .header("content-type", "application/json")
                    .body(Body::from("not json"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_refresh_rejects_missing_field() {
        let response = test_router(Some("shh"))
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/oauth/refresh")
                    .header("content-type", "application/json")
                    .body(Body::from("{}"))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "invalid_request");
    }

    #[tokio::test]
    async fn test_refresh_without_secret_is_permanent_failure() {
        let body = serde_json::json!({ "refresh_token": "rt" });

        let response = test_router(None)
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/oauth/refresh")
                    .header("content-type", "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json: serde_json::Value = serde_json::from_str(&body_text(response).await).unwrap();
        assert_eq!(json["error"], "relay_not_configured");
    }

    #[tokio::test]
    async fn test_root_serves_entry_document() {
        let response = test_router(None)
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("Rebekko"));
    }

    #[tokio::test]
    async fn test_callback_page_posts_code_to_opener() {
        let response = test_router(None)
            .oneshot(
                Request::builder()
                    .uri("/oauth-callback")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let text = body_text(response).await;
        assert!(text.contains("oauth_code"));
        assert!(text.contains("oauth_error"));
    }
}
