pub mod config;
pub mod error;
pub mod relay;
pub mod server;
pub mod telemetry;

pub use config::{OAuthConfig, PublicOAuthConfig};
pub use error::{RelayError, Result};
pub use relay::{TokenRelay, UpstreamResponse};
pub use server::{app_router, AppState};
