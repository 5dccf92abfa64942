//! Authentication gate for tool calls.
//!
//! The dispatcher consults an [`AuthProvider`] between tool lookup and
//! execution, for tools whose metadata requires it. The provider is a seam:
//! credential strategies live behind the trait and are swappable without
//! touching dispatch.

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ServerError;

/// Credential strategy consulted before dispatching guarded tools.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Returns whether a usable credential is currently held.
    fn is_authenticated(&self) -> bool;

    /// Acquires a credential, returning an opaque token.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::Authentication`] if no credential can be
    /// acquired.
    async fn authenticate(&mut self) -> Result<String, ServerError>;

    /// Releases any held credential. Called during server shutdown.
    async fn logout(&mut self);

    /// Returns a read-only status snapshot for diagnostics.
    ///
    /// Must never contain credential material.
    fn status(&self) -> Value;
}

/// Authenticates with a statically configured API key.
pub struct ApiKeyAuth {
    api_key: String,
    authenticated: bool,
}

impl ApiKeyAuth {
    /// Creates a provider around a configured key.
    #[must_use]
    pub const fn new(api_key: String) -> Self {
        Self {
            api_key,
            authenticated: false,
        }
    }
}

#[async_trait]
impl AuthProvider for ApiKeyAuth {
    fn is_authenticated(&self) -> bool {
        self.authenticated
    }

    async fn authenticate(&mut self) -> Result<String, ServerError> {
        if self.api_key.is_empty() {
            return Err(ServerError::Authentication(
                "configured API key is empty".to_string(),
            ));
        }

        self.authenticated = true;
        debug!("authenticated with configured API key");
        Ok(self.api_key.clone())
    }

    async fn logout(&mut self) {
        self.authenticated = false;
        debug!("API key session released");
    }

    fn status(&self) -> Value {
        json!({
            "method": "api_key",
            "authenticated": self.authenticated,
        })
    }
}

/// Provider used when no credentials are configured.
///
/// Never authenticates; calls to tools requiring auth fail at the gate.
#[derive(Default)]
pub struct AnonymousAuth;

#[async_trait]
impl AuthProvider for AnonymousAuth {
    fn is_authenticated(&self) -> bool {
        false
    }

    async fn authenticate(&mut self) -> Result<String, ServerError> {
        Err(ServerError::Authentication(
            "no credentials configured".to_string(),
        ))
    }

    async fn logout(&mut self) {}

    fn status(&self) -> Value {
        json!({
            "method": "anonymous",
            "authenticated": false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn api_key_authenticates_once() {
        let mut auth = ApiKeyAuth::new("secret-key".to_string());
        assert!(!auth.is_authenticated());

        let token = auth.authenticate().await.unwrap();
        assert_eq!(token, "secret-key");
        assert!(auth.is_authenticated());

        auth.logout().await;
        assert!(!auth.is_authenticated());
    }

    #[tokio::test]
    async fn empty_api_key_fails() {
        let mut auth = ApiKeyAuth::new(String::new());
        let err = auth.authenticate().await.unwrap_err();
        assert!(matches!(err, ServerError::Authentication(_)));
    }

    #[tokio::test]
    async fn anonymous_never_authenticates() {
        let mut auth = AnonymousAuth;
        assert!(!auth.is_authenticated());
        assert!(auth.authenticate().await.is_err());
    }

    #[test]
    fn status_snapshots_exclude_credentials() {
        let auth = ApiKeyAuth::new("secret-key".to_string());
        let status = auth.status().to_string();
        assert!(!status.contains("secret-key"));
    }
}
