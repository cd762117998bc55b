use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::config::ClientConfig;
use crate::error::Error;
use crate::request::{decorate_request, RequestOptions};

/// How the credential-acquisition capability failed.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthErrorKind {
    /// No credentials are available in the environment. Some endpoints (for
    /// example publicly readable resources) do not require authorization, so
    /// the pipeline treats this as a warning and lets the request through
    /// undecorated, relying on the upstream service to reject it with a
    /// clearer error if auth was actually required.
    CredentialsUnavailable,
    /// Any other acquisition failure. Always fatal, never retried.
    Failed,
}

#[derive(Clone, Debug, Error)]
#[error("{message}")]
pub struct AuthError {
    pub kind: AuthErrorKind,
    pub message: String,
}

impl AuthError {
    pub fn credentials_unavailable(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::CredentialsUnavailable,
            message: message.into(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            kind: AuthErrorKind::Failed,
            message: message.into(),
        }
    }
}

/// Snapshot of the current credentials, obtainable without issuing a request.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Credentials {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    /// Expiry as seconds since the Unix epoch, when the issuer reports one.
    pub expires_at: Option<u64>,
}

/// Credential-acquisition capability. Implementations attach whatever
/// authorization material the service expects (typically an `Authorization`
/// header) to the request options in place.
#[async_trait]
pub trait Authorizer: Send + Sync {
    async fn authorize(&self, options: &mut RequestOptions) -> Result<(), AuthError>;

    async fn credentials(&self) -> Result<Credentials, AuthError>;
}

/// Runs the authorization step for one request: bypass for custom endpoints,
/// best-effort auth otherwise, decoration always applied last.
pub(crate) async fn authorize_request(
    config: &ClientConfig,
    options: &mut RequestOptions,
) -> Result<(), Error> {
    if config.custom_endpoint() {
        // Custom API override, e.g. a local emulator. The credential
        // capability is not consulted at all.
        decorate_request(options);
        return Ok(());
    }

    match config.authorizer().authorize(options).await {
        Ok(()) => {}
        Err(auth_error) if auth_error.kind == AuthErrorKind::CredentialsUnavailable => {
            warn!(error = %auth_error, "credentials unavailable, proceeding unauthenticated");
        }
        Err(auth_error) => {
            return Err(Error::Authorization {
                message: auth_error.message,
            });
        }
    }

    decorate_request(options);
    Ok(())
}
