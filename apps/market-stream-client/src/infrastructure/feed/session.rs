//! Feed Session Handshake
//!
//! Before a socket can be opened, the client authenticates against an HTTP
//! control endpoint with the credential supplied by the application's
//! session provider. A successful handshake returns a time-limited
//! connection URL; the URL itself is the socket-level credential, so no
//! further authentication happens on the WebSocket.
//!
//! # Handshake Flow
//!
//! 1. `POST <control_url>` with a bearer token
//! 2. Receive `{"url": "wss://...", "expiresAt": "..."}` or an HTTP error
//! 3. Open the WebSocket against the granted URL
//!
//! A 401/403 response means the credential was rejected; the session
//! provider may refresh it between reconnect attempts, so rejection is not
//! treated as terminal by the retry machinery.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::application::ports::ConnectError;
use crate::infrastructure::config::Credentials;

/// Errors from the handshake.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The control endpoint rejected the credential.
    #[error("handshake rejected with status {status}")]
    Rejected {
        /// HTTP status returned by the control endpoint.
        status: u16,
    },

    /// HTTP-level failure reaching the control endpoint.
    #[error("handshake request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// The endpoint answered with something that is not a session grant.
    #[error("invalid handshake response: {0}")]
    InvalidResponse(String),
}

impl From<SessionError> for ConnectError {
    fn from(err: SessionError) -> Self {
        match err {
            SessionError::Rejected { .. } => Self::Auth(err.to_string()),
            SessionError::Http(_) | SessionError::InvalidResponse(_) => {
                Self::Socket(err.to_string())
            }
        }
    }
}

/// A granted feed session: where to connect, and for how long the URL is
/// valid.
#[derive(Debug, Clone)]
pub struct SessionGrant {
    /// Connection URL for the WebSocket.
    pub url: String,
    /// Expiry of the granted URL, when the venue reports one.
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct HandshakeResponse {
    url: String,
    #[serde(rename = "expiresAt")]
    expires_at: Option<DateTime<Utc>>,
}

/// Client for the control-endpoint handshake.
#[derive(Debug, Clone)]
pub struct SessionClient {
    http: reqwest::Client,
    control_url: String,
    credentials: Credentials,
}

impl SessionClient {
    /// Create a new session client.
    #[must_use]
    pub fn new(control_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            http: reqwest::Client::new(),
            control_url: control_url.into(),
            credentials,
        }
    }

    /// Perform the handshake and return the granted session.
    ///
    /// # Errors
    ///
    /// [`SessionError::Rejected`] on 401/403, [`SessionError::Http`] on
    /// transport failures, [`SessionError::InvalidResponse`] when the body
    /// does not parse or the granted URL is empty.
    pub async fn open_session(&self) -> Result<SessionGrant, SessionError> {
        let response = self
            .http
            .post(&self.control_url)
            .bearer_auth(self.credentials.token())
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN
        {
            return Err(SessionError::Rejected {
                status: status.as_u16(),
            });
        }
        if !status.is_success() {
            return Err(SessionError::InvalidResponse(format!(
                "unexpected status {status}"
            )));
        }

        let body: HandshakeResponse = response
            .json()
            .await
            .map_err(|e| SessionError::InvalidResponse(e.to_string()))?;

        if body.url.is_empty() {
            return Err(SessionError::InvalidResponse(
                "empty connection url".to_string(),
            ));
        }

        Ok(SessionGrant {
            url: body.url,
            expires_at: body.expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_maps_to_auth_error() {
        let err = ConnectError::from(SessionError::Rejected { status: 401 });
        assert!(matches!(err, ConnectError::Auth(_)));
    }

    #[test]
    fn invalid_response_maps_to_socket_error() {
        let err = ConnectError::from(SessionError::InvalidResponse("bad body".to_string()));
        assert!(matches!(err, ConnectError::Socket(_)));
    }

    #[test]
    fn handshake_response_parses_expiry() {
        let body = r#"{"url":"wss://feed.example.net/s/abc","expiresAt":"2026-01-05T10:00:00Z"}"#;
        let parsed: HandshakeResponse = serde_json::from_str(body).unwrap();
        assert_eq!(parsed.url, "wss://feed.example.net/s/abc");
        assert!(parsed.expires_at.is_some());
    }

    #[test]
    fn handshake_response_expiry_is_optional() {
        let body = r#"{"url":"wss://feed.example.net/s/abc"}"#;
        let parsed: HandshakeResponse = serde_json::from_str(body).unwrap();
        assert!(parsed.expires_at.is_none());
    }
}
