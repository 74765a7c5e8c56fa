//! Secret resolution for tokens that carry a `kid`.
//!
//! Resolution is an ordered chain of [`SecretResolver`] strategies. Each one
//! either verifies the token, declines it with [`Resolution::Unresolved`] so
//! the next strategy runs, or ends the chain with an error. The default chain
//! is:
//!
//! 1. [`KeySetStrategy`]: asks an external [`KeySetResolver`] (e.g. a JWKS
//!    endpoint). Ordinary resolver failures decline; caller cancellation ends
//!    the chain.
//! 2. [`LocalStoreStrategy`]: looks the `kid` up in the
//!    [`SecretStore`]. A found secret is final: its verification result is
//!    returned as-is.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;
use tracing::{debug, warn};

use crate::Claims;
use crate::context::{Interrupted, RequestContext};
use crate::engine::{SignatureEngine, SignatureError};
use crate::error::{AuthError, AuthResult};
use crate::store::SecretStore;

/// Failures reported by a key-set resolver
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum KeySetError {
    /// Endpoint could not be reached or returned an error status
    #[error("JWKS fetch failed: {0}")]
    Fetch(String),

    /// Endpoint is not HTTPS and not a loopback address
    #[error("JWKS endpoint must use HTTPS (HTTP only allowed for loopback): {0}")]
    InsecureEndpoint(String),

    /// Response body is not a JWK set
    #[error("Invalid JWKS document: {0}")]
    InvalidDocument(String),

    /// No published key has the requested `kid`
    #[error("Key ID '{0}' not found in any key set")]
    KeyNotFound(String),

    /// Published key cannot be turned into a verification key
    #[error("Invalid JWK: {0}")]
    InvalidKey(String),

    /// Token header names an algorithm the resolver does not accept
    #[error("Algorithm {0} not allowed for key set verification")]
    AlgorithmNotAllowed(String),

    /// Key was found but the token did not verify
    #[error("Verification failed: {0}")]
    Verification(#[from] SignatureError),

    /// HTTP client could not be built
    #[error("HTTP client error: {0}")]
    Client(String),

    /// Caller cancelled or the deadline passed while resolving
    #[error("Resolution interrupted: {0}")]
    Interrupted(Interrupted),
}

/// External collaborator mapping a `kid` to a third-party verification key.
///
/// Implementations own their caching, retry and backoff policy. They may
/// perform network I/O; callers bound them with the request's cancellation
/// signal.
#[async_trait]
pub trait KeySetResolver: Send + Sync + fmt::Debug {
    /// Verify `token` with the published key named `kid` and return its claims
    async fn resolve(
        &self,
        ctx: &RequestContext,
        kid: &str,
        token: &str,
    ) -> Result<Claims, KeySetError>;
}

/// Outcome of one strategy
#[derive(Debug, Clone, PartialEq)]
pub enum Resolution {
    /// Token verified; stop the chain
    Verified(Claims),
    /// This strategy does not know the `kid`; try the next one
    Unresolved,
}

/// One link in the resolution chain
#[async_trait]
pub trait SecretResolver: Send + Sync + fmt::Debug {
    /// Name used in logs
    fn name(&self) -> &'static str;

    /// Try to verify `token` whose header carries `kid`
    async fn resolve(&self, ctx: &RequestContext, kid: &str, token: &str) -> AuthResult<Resolution>;
}

/// Strategy backed by an external [`KeySetResolver`]
#[derive(Debug, Clone)]
pub struct KeySetStrategy {
    resolver: Arc<dyn KeySetResolver>,
}

impl KeySetStrategy {
    /// Wrap `resolver`
    pub fn new(resolver: Arc<dyn KeySetResolver>) -> Self {
        Self { resolver }
    }
}

#[async_trait]
impl SecretResolver for KeySetStrategy {
    fn name(&self) -> &'static str {
        "key_set"
    }

    async fn resolve(&self, ctx: &RequestContext, kid: &str, token: &str) -> AuthResult<Resolution> {
        let interrupted = |reason: Interrupted| AuthError::KeySetResolutionFailed {
            request_id: ctx.request_id().to_string(),
            kid: kid.to_string(),
            source: KeySetError::Interrupted(reason),
        };

        match ctx
            .run_cancellable(self.resolver.resolve(ctx, kid, token))
            .await
        {
            Ok(Ok(claims)) => {
                debug!(request_id = ctx.request_id(), kid, "Token verified by key set");
                Ok(Resolution::Verified(claims))
            }
            Ok(Err(KeySetError::Interrupted(reason))) | Err(reason) => {
                warn!(request_id = ctx.request_id(), kid, %reason, "Key set resolution interrupted");
                Err(interrupted(reason))
            }
            Ok(Err(error)) => {
                debug!(
                    request_id = ctx.request_id(),
                    kid,
                    error = %error,
                    "Key set did not resolve kid, falling back"
                );
                Ok(Resolution::Unresolved)
            }
        }
    }
}

/// Strategy backed by the local [`SecretStore`]
#[derive(Debug, Clone)]
pub struct LocalStoreStrategy {
    store: Arc<SecretStore>,
    engine: SignatureEngine,
}

impl LocalStoreStrategy {
    /// Look secrets up in `store` and verify with `engine`
    pub fn new(store: Arc<SecretStore>, engine: SignatureEngine) -> Self {
        Self { store, engine }
    }
}

#[async_trait]
impl SecretResolver for LocalStoreStrategy {
    fn name(&self) -> &'static str {
        "local_store"
    }

    async fn resolve(&self, ctx: &RequestContext, kid: &str, token: &str) -> AuthResult<Resolution> {
        let Some(secret) = self.store.lookup(kid).await else {
            return Ok(Resolution::Unresolved);
        };

        let normalized = secret.normalize();
        debug!(
            request_id = ctx.request_id(),
            kid,
            algorithm = %normalized.algorithm,
            "Verifying with local secret"
        );

        match self.engine.verify(token, &normalized) {
            Ok(claims) => Ok(Resolution::Verified(claims)),
            Err(SignatureError::UnsupportedAlgorithm(algorithm)) => {
                Err(AuthError::UnsupportedAlgorithm {
                    request_id: ctx.request_id().to_string(),
                    kid: kid.to_string(),
                    algorithm,
                })
            }
            Err(source) => Err(AuthError::VerificationFailed {
                request_id: ctx.request_id().to_string(),
                kid: kid.to_string(),
                source,
            }),
        }
    }
}
