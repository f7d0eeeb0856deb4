use std::time::{Duration, Instant};

use axum::body::Bytes;
use reqwest::{Client, StatusCode};
use tracing::{debug, warn};

use crate::config::OAuthConfig;
use crate::error::{RelayError, Result};
use crate::telemetry::get_metrics;

/// A provider response relayed verbatim to the caller.
///
/// Non-2xx statuses are still the Ok path: the provider's rejection belongs
/// to the caller, not to the relay.
#[derive(Debug, Clone)]
pub struct UpstreamResponse {
    pub status: StatusCode,
    pub content_type: String,
    pub body: Bytes,
}

/// Performs token exchanges against Google on behalf of the browser client.
///
/// Holds the confidential client secret so it never reaches the front end.
/// One outbound `reqwest` client is shared across all calls; the struct is
/// cheap to clone and safe for concurrent use.
#[derive(Clone)]
pub struct TokenRelay {
    client: Client,
    token_endpoint: String,
    client_id: String,
    client_secret: Option<String>,
}

impl TokenRelay {
    /// Create a new relay from the startup configuration.
    pub fn new(config: &OAuthConfig) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .expect("Failed to create HTTP client");

        Self {
            client,
            token_endpoint: config.token_endpoint.clone(),
            client_id: config.client_id.clone(),
            client_secret: config.client_secret.clone(),
        }
    }

    /// Exchange an authorization code (plus its PKCE verifier) for tokens.
    ///
    /// Sends exactly one form-encoded POST to the token endpoint; the
    /// provider's status and body come back untouched.
    pub async fn exchange_code(
        &self,
        code: &str,
        code_verifier: &str,
        redirect_uri: &str,
    ) -> Result<UpstreamResponse> {
        let client_secret = self.secret()?;
        if let Some(metrics) = get_metrics() {
            metrics.token_exchanges.add(1, &[]);
        }

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", client_secret),
            ("code", code),
            ("code_verifier", code_verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        self.post_form(&form).await
    }

    /// Trade a refresh token for a fresh access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<UpstreamResponse> {
        let client_secret = self.secret()?;
        if let Some(metrics) = get_metrics() {
            metrics.token_refreshes.add(1, &[]);
        }

        let form = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", client_secret),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        self.post_form(&form).await
    }

    /// The confidential credential, or the permanent degraded-mode failure.
    fn secret(&self) -> Result<&str> {
        self.client_secret
            .as_deref()
            .ok_or(RelayError::SecretMissing)
    }

    /// Single-attempt POST with status/body passthrough. No retry, no backoff.
    async fn post_form(&self, form: &[(&str, &str)]) -> Result<UpstreamResponse> {
        let start = Instant::now();

        let response = self
            .client
            .post(&self.token_endpoint)
            .form(form)
            .send()
            .await
            .map_err(|e| {
                if let Some(metrics) = get_metrics() {
                    metrics.transport_faults.add(1, &[]);
                }
                RelayError::Transport(format!("token endpoint request failed: {}", e))
            })?;

        let status = response.status();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or("application/json")
            .to_string();

        let body = response.bytes().await.map_err(|e| {
            if let Some(metrics) = get_metrics() {
                metrics.transport_faults.add(1, &[]);
            }
            RelayError::Transport(format!("failed to read token endpoint response: {}", e))
        })?;

        if let Some(metrics) = get_metrics() {
            metrics
                .upstream_duration_seconds
                .record(start.elapsed().as_secs_f64(), &[]);
            if !status.is_success() {
                metrics.upstream_errors.add(1, &[]);
            }
        }

        if status.is_success() {
            debug!(status = %status, "Token endpoint call succeeded");
        } else {
            warn!(status = %status, "Token endpoint rejected the request");
        }

        Ok(UpstreamResponse {
            status,
            content_type,
            body,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn relay_with(secret: Option<&str>) -> TokenRelay {
        TokenRelay::new(&OAuthConfig::google(secret.map(|s| s.to_string())))
    }

    #[test]
    fn test_token_endpoint_from_config() {
        let relay = relay_with(Some("s"));
        assert_eq!(relay.token_endpoint, "https://oauth2.googleapis.com/token");
    }

    #[tokio::test]
    async fn test_exchange_without_secret_fails_fast() {
        let relay = relay_with(None);
        let result = relay
            .exchange_code("c", "v", "http://localhost:8080/oauth-callback")
            .await;
        assert!(matches!(result, Err(RelayError::SecretMissing)));
    }

    #[tokio::test]
    async fn test_refresh_without_secret_fails_fast() {
        let relay = relay_with(None);
        let result = relay.refresh("rt").await;
        assert!(matches!(result, Err(RelayError::SecretMissing)));
    }
}
