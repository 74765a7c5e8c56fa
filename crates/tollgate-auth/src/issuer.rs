//! First-party token issuance with the primary secret.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use jsonwebtoken::Header;
use serde_json::Value;
use tracing::{debug, warn};

use crate::Claims;
use crate::context::RequestContext;
use crate::engine::{SignatureEngine, SignatureError};
use crate::error::{AuthError, AuthResult};
use crate::secret::{Secret, SecretAlgorithm};
use crate::store::SecretStore;

/// Lifetime of every issued token
pub const TOKEN_LIFETIME: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Signs claim sets with the store's primary secret
#[derive(Debug, Clone)]
pub struct TokenIssuer {
    store: Arc<SecretStore>,
    engine: SignatureEngine,
}

impl TokenIssuer {
    /// Issuer over `store`
    pub fn new(store: Arc<SecretStore>) -> Self {
        Self {
            store,
            engine: SignatureEngine::new(),
        }
    }

    /// Sign `claims` with the primary secret.
    ///
    /// `exp` is always set to now plus [`TOKEN_LIFETIME`], replacing any value
    /// the caller supplied. The header carries the primary's `kid`.
    ///
    /// # Errors
    ///
    /// - [`AuthError::NoPrimarySecret`] if no secret is primary
    /// - [`AuthError::UnsupportedAlgorithm`] if the primary is verification-only
    ///   or has an unknown algorithm tag
    /// - [`AuthError::InvalidPrivateKey`] if an RS256 primary has no usable
    ///   private key
    /// - [`AuthError::SigningFailed`] for any other signing failure
    #[tracing::instrument(skip(self, ctx, claims), fields(request_id = %ctx.request_id()))]
    pub async fn create_token(&self, ctx: &RequestContext, claims: Claims) -> AuthResult<String> {
        let result = self.issue(ctx, claims).await;
        match &result {
            Ok(_) => debug!("Token issued"),
            Err(e) => warn!(category = e.category(), kid = e.kid(), error = %e, "Token issuance failed"),
        }
        result
    }

    async fn issue(&self, ctx: &RequestContext, mut claims: Claims) -> AuthResult<String> {
        let expires_at = Utc::now().timestamp() + TOKEN_LIFETIME.as_secs() as i64;
        claims.insert("exp".to_string(), Value::from(expires_at));

        let set = self.store.snapshot().await;
        let primary = set.primary().ok_or_else(|| AuthError::NoPrimarySecret {
            request_id: ctx.request_id().to_string(),
        })?;

        self.sign_with(ctx, primary, &claims)
    }

    fn sign_with(&self, ctx: &RequestContext, secret: &Secret, claims: &Claims) -> AuthResult<String> {
        let request_id = || ctx.request_id().to_string();
        let kid = || secret.kid().to_string();

        let mut header = Header::default();
        header.typ = Some("JWT".to_string());
        header.kid = Some(secret.kid().to_string());

        match secret.algorithm() {
            SecretAlgorithm::Rs256 => {
                if secret.material().private_pem().is_none() {
                    return Err(AuthError::InvalidPrivateKey {
                        request_id: request_id(),
                        kid: kid(),
                        reason: "no private key configured".to_string(),
                    });
                }
                self.engine
                    .sign(header, claims, &secret.normalize())
                    .map_err(|e| match e {
                        SignatureError::InvalidKey(reason) => AuthError::InvalidPrivateKey {
                            request_id: request_id(),
                            kid: kid(),
                            reason,
                        },
                        source => AuthError::SigningFailed {
                            request_id: request_id(),
                            kid: kid(),
                            source,
                        },
                    })
            }
            SecretAlgorithm::Hs256 | SecretAlgorithm::Unset => self
                .engine
                .sign(header, claims, &secret.normalize())
                .map_err(|source| AuthError::SigningFailed {
                    request_id: request_id(),
                    kid: kid(),
                    source,
                }),
            other @ (SecretAlgorithm::Rs256Public | SecretAlgorithm::Other(_)) => {
                Err(AuthError::UnsupportedAlgorithm {
                    request_id: request_id(),
                    kid: kid(),
                    algorithm: other.to_string(),
                })
            }
        }
    }
}
