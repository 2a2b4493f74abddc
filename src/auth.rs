//! Connection Authentication
//!
//! Verifies bearer tokens presented at WebSocket handshake time against
//! the shared secret issued by the identity service. Verification is
//! synchronous and must succeed before a connection is admitted to the
//! hub; an unauthenticated socket never reaches the broadcast path.

use jsonwebtoken::{decode, errors::ErrorKind, Algorithm, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Claims carried by tokens from the identity service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject - user ID or username
    pub sub: String,

    /// Expiration timestamp (Unix epoch seconds)
    pub exp: usize,

    /// Issued-at timestamp (Unix epoch seconds)
    #[serde(default)]
    pub iat: usize,

    /// Optional email for operator-facing logs
    #[serde(skip_serializing_if = "Option::is_none")]
    pub email: Option<String>,
}

/// Identity extracted from a verified token
///
/// Owned by the connection it authenticates; never mutated after creation.
#[derive(Debug, Clone, PartialEq)]
pub struct Identity {
    pub subject: String,
    pub email: Option<String>,
}

impl Identity {
    /// Label for log lines: email when present, subject otherwise
    pub fn display(&self) -> &str {
        self.email.as_deref().unwrap_or(&self.subject)
    }
}

/// Handshake rejection reasons
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no token supplied at handshake")]
    MissingToken,

    #[error("token signature or format invalid")]
    InvalidToken,

    #[error("token expired")]
    ExpiredToken,
}

impl AuthError {
    /// Human-readable reason sent in the close frame
    pub fn close_reason(&self) -> &'static str {
        match self {
            AuthError::MissingToken => "No token provided",
            AuthError::InvalidToken | AuthError::ExpiredToken => "Invalid or expired token",
        }
    }
}

/// Token verifier shared by all handshake handlers
#[derive(Clone)]
pub struct TokenVerifier {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenVerifier {
    /// Create a verifier for the given shared secret
    pub fn new(secret: impl AsRef<[u8]>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 60; // 60 second clock skew tolerance
        validation.validate_exp = true;

        Self {
            decoding_key: DecodingKey::from_secret(secret.as_ref()),
            validation,
        }
    }

    /// Authenticate a candidate token from the handshake
    ///
    /// Returns the identity claims on success, or the typed rejection
    /// reason. CPU-bound; completes before any registry admission.
    pub fn authenticate(&self, token: Option<&str>) -> Result<Identity, AuthError> {
        let token = match token {
            Some(t) if !t.is_empty() => t,
            _ => return Err(AuthError::MissingToken),
        };

        let data = decode::<Claims>(token, &self.decoding_key, &self.validation).map_err(|e| {
            match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::ExpiredToken,
                _ => AuthError::InvalidToken,
            }
        })?;

        Ok(Identity {
            subject: data.claims.sub,
            email: data.claims.email,
        })
    }
}
