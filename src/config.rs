use std::env;
use std::fmt;

use serde::Serialize;

/// Google OAuth client ID for the Rebekko attendance app. Public identifier,
/// safe to serve to the browser.
pub const GOOGLE_CLIENT_ID: &str =
    "572268474022-54j1dba72gm26n00oi42ijrhv3ielep1.apps.googleusercontent.com";

/// Google authorization endpoint (user-facing consent screen).
pub const GOOGLE_AUTHORIZATION_ENDPOINT: &str = "https://accounts.google.com/o/oauth2/v2/auth";

/// Google token endpoint (authorization-code exchange and refresh).
pub const GOOGLE_TOKEN_ENDPOINT: &str = "https://oauth2.googleapis.com/token";

/// Requested scopes (read-only calendar access).
pub const GOOGLE_SCOPES: &[&str] = &["https://www.googleapis.com/auth/calendar.readonly"];

/// Environment variable holding the confidential client secret.
pub const CLIENT_SECRET_ENV: &str = "GOOGLE_CLIENT_SECRET";

/// OAuth configuration, built once at startup and immutable afterwards.
///
/// Everything except the client secret is a fixed constant of the deployed
/// Google app. The secret comes from the environment and may be absent, in
/// which case the relay endpoints fail permanently while the rest of the
/// server (static pages, health, public config) keeps working.
#[derive(Clone)]
pub struct OAuthConfig {
    pub client_id: String,
    /// Confidential. Never serialized, never logged.
    pub client_secret: Option<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub scopes: Vec<String>,
    pub use_pkce: bool,
}

impl OAuthConfig {
    /// Config for the Google app with the given secret.
    pub fn google(client_secret: Option<String>) -> Self {
        Self {
            client_id: GOOGLE_CLIENT_ID.to_string(),
            client_secret,
            authorization_endpoint: GOOGLE_AUTHORIZATION_ENDPOINT.to_string(),
            token_endpoint: GOOGLE_TOKEN_ENDPOINT.to_string(),
            scopes: GOOGLE_SCOPES.iter().map(|s| s.to_string()).collect(),
            use_pkce: true,
        }
    }

    /// Build the configuration from the environment.
    ///
    /// An empty `GOOGLE_CLIENT_SECRET` counts as missing.
    pub fn from_env() -> Self {
        let client_secret = env::var(CLIENT_SECRET_ENV).ok().filter(|s| !s.is_empty());
        Self::google(client_secret)
    }

    /// Whether the confidential credential is available to the relay.
    pub fn has_secret(&self) -> bool {
        self.client_secret.is_some()
    }

    /// The caller-visible projection served by `/api/oauth/config`.
    ///
    /// `redirect_uri` is the caller's origin plus `/oauth-callback`; the
    /// handler derives it per request so the same build works on localhost
    /// and behind the Render proxy.
    pub fn public(&self, redirect_uri: String) -> PublicOAuthConfig {
        PublicOAuthConfig {
            client_id: self.client_id.clone(),
            scopes: self.scopes.clone(),
            authorization_endpoint: self.authorization_endpoint.clone(),
            token_endpoint: self.token_endpoint.clone(),
            redirect_uri,
            use_pkce: self.use_pkce,
        }
    }
}

impl fmt::Debug for OAuthConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OAuthConfig")
            .field("client_id", &self.client_id)
            .field(
                "client_secret",
                &self.client_secret.as_ref().map(|_| "****"),
            )
            .field("authorization_endpoint", &self.authorization_endpoint)
            .field("token_endpoint", &self.token_endpoint)
            .field("scopes", &self.scopes)
            .field("use_pkce", &self.use_pkce)
            .finish()
    }
}

/// OAuth configuration as exposed to the browser.
///
/// Has no field for the client secret.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicOAuthConfig {
    pub client_id: String,
    pub scopes: Vec<String>,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub redirect_uri: String,
    #[serde(rename = "usePKCE")]
    pub use_pkce: bool,
}
