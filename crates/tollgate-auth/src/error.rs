//! Authentication error types.
//!
//! Every [`AuthError`] carries the request-correlation id, plus the offending
//! `kid` where one exists, so the gateway can log it once at the boundary.
//! None of these conditions are retried by this crate.

use thiserror::Error;

use crate::engine::SignatureError;
use crate::resolver::KeySetError;
use crate::token::TokenFormatError;

/// Verification and issuance errors
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AuthError {
    /// Token is not a three-segment base64url token with JSON header and payload
    #[error("[{request_id}] Malformed token: {source}")]
    MalformedToken {
        /// Request-correlation id
        request_id: String,
        /// What was wrong with the token
        #[source]
        source: TokenFormatError,
    },

    /// Token names a `kid` that neither the key-set resolver nor the store knows
    #[error("[{request_id}] No secret with kid '{kid}' found")]
    UnknownKeyIdentifier {
        /// Request-correlation id
        request_id: String,
        /// Key identifier from the token header
        kid: String,
    },

    /// Token has no `kid` and no configured secret verifies it
    #[error("[{request_id}] Token did not verify against any configured secret")]
    NoMatchingSecret {
        /// Request-correlation id
        request_id: String,
    },

    /// A kid-addressed local secret rejected the token
    #[error("[{request_id}] Verification with secret '{kid}' failed: {source}")]
    VerificationFailed {
        /// Request-correlation id
        request_id: String,
        /// Key identifier of the secret that was tried
        kid: String,
        /// Engine failure
        #[source]
        source: SignatureError,
    },

    /// Secret algorithm cannot be used for the requested operation
    #[error("[{request_id}] Unsupported algorithm ({algorithm}) for secret '{kid}'")]
    UnsupportedAlgorithm {
        /// Request-correlation id
        request_id: String,
        /// Key identifier of the secret
        kid: String,
        /// Configured algorithm tag
        algorithm: String,
    },

    /// Primary RS256 private key is missing or unparsable
    #[error("[{request_id}] Invalid private key for secret '{kid}': {reason}")]
    InvalidPrivateKey {
        /// Request-correlation id
        request_id: String,
        /// Key identifier of the primary secret
        kid: String,
        /// Parser message
        reason: String,
    },

    /// Signing failed with otherwise valid key material
    #[error("[{request_id}] Signing with secret '{kid}' failed: {source}")]
    SigningFailed {
        /// Request-correlation id
        request_id: String,
        /// Key identifier of the primary secret
        kid: String,
        /// Engine failure
        #[source]
        source: SignatureError,
    },

    /// No secret is marked primary
    #[error("[{request_id}] No primary secret provided")]
    NoPrimarySecret {
        /// Request-correlation id
        request_id: String,
    },

    /// Key-set resolution was interrupted or could not complete
    #[error("[{request_id}] Key set resolution for kid '{kid}' failed: {source}")]
    KeySetResolutionFailed {
        /// Request-correlation id
        request_id: String,
        /// Key identifier from the token header
        kid: String,
        /// Resolver failure
        #[source]
        source: KeySetError,
    },
}

impl AuthError {
    /// Request-correlation id of the failed call
    pub fn request_id(&self) -> &str {
        match self {
            Self::MalformedToken { request_id, .. }
            | Self::UnknownKeyIdentifier { request_id, .. }
            | Self::NoMatchingSecret { request_id }
            | Self::VerificationFailed { request_id, .. }
            | Self::UnsupportedAlgorithm { request_id, .. }
            | Self::InvalidPrivateKey { request_id, .. }
            | Self::SigningFailed { request_id, .. }
            | Self::NoPrimarySecret { request_id }
            | Self::KeySetResolutionFailed { request_id, .. } => request_id,
        }
    }

    /// Offending key identifier, if the failure is tied to one
    pub fn kid(&self) -> Option<&str> {
        match self {
            Self::UnknownKeyIdentifier { kid, .. }
            | Self::VerificationFailed { kid, .. }
            | Self::UnsupportedAlgorithm { kid, .. }
            | Self::InvalidPrivateKey { kid, .. }
            | Self::SigningFailed { kid, .. }
            | Self::KeySetResolutionFailed { kid, .. } => Some(kid),
            Self::MalformedToken { .. } | Self::NoMatchingSecret { .. } | Self::NoPrimarySecret { .. } => None,
        }
    }

    /// Whether this is a server-side configuration problem rather than a bad token.
    ///
    /// Gateways map `true` to a server error and `false` to an authentication
    /// rejection.
    pub fn is_configuration_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidPrivateKey { .. }
                | Self::SigningFailed { .. }
                | Self::NoPrimarySecret { .. }
                | Self::UnsupportedAlgorithm { .. }
        )
    }

    /// Short stable label for logs and metrics
    pub fn category(&self) -> &'static str {
        match self {
            Self::MalformedToken { .. } => "malformed_token",
            Self::UnknownKeyIdentifier { .. } => "unknown_kid",
            Self::NoMatchingSecret { .. } => "no_matching_secret",
            Self::VerificationFailed { .. } => "verification_failed",
            Self::UnsupportedAlgorithm { .. } => "unsupported_algorithm",
            Self::InvalidPrivateKey { .. } => "invalid_private_key",
            Self::SigningFailed { .. } => "signing_failed",
            Self::NoPrimarySecret { .. } => "no_primary_secret",
            Self::KeySetResolutionFailed { .. } => "key_set_resolution_failed",
        }
    }
}

/// Result type alias for authentication operations
pub type AuthResult<T> = std::result::Result<T, AuthError>;
