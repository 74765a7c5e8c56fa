//! Token verification.
//!
//! [`TokenVerifier::parse_token`] parses the token structurally, then picks the
//! path by whether the header carries a `kid`:
//!
//! - **with `kid`**: the resolver chain runs in order (key set first, local
//!   store second) and the first strategy that recognises the `kid` decides;
//! - **without `kid`**: every configured secret is tried in store order and
//!   the first that verifies wins.

use std::sync::Arc;

use tracing::{debug, trace, warn};

use crate::Claims;
use crate::context::RequestContext;
use crate::engine::SignatureEngine;
use crate::error::{AuthError, AuthResult};
use crate::resolver::{KeySetResolver, KeySetStrategy, LocalStoreStrategy, Resolution, SecretResolver};
use crate::store::SecretStore;
use crate::token::parse_unverified;

/// Verifies inbound tokens against the store and an optional key set
#[derive(Debug, Clone)]
pub struct TokenVerifier {
    store: Arc<SecretStore>,
    engine: SignatureEngine,
    key_set: Option<Arc<dyn KeySetResolver>>,
    chain: Vec<Arc<dyn SecretResolver>>,
    custom_chain: bool,
}

impl TokenVerifier {
    /// Verifier over `store` only
    pub fn new(store: Arc<SecretStore>) -> Self {
        let mut verifier = Self {
            store,
            engine: SignatureEngine::new(),
            key_set: None,
            chain: Vec::new(),
            custom_chain: false,
        };
        verifier.rebuild_chain();
        verifier
    }

    /// Consult `resolver` before the local store for kid-addressed tokens
    #[must_use]
    pub fn with_key_set_resolver(mut self, resolver: Arc<dyn KeySetResolver>) -> Self {
        self.key_set = Some(resolver);
        self.rebuild_chain();
        self
    }

    /// Tolerate `leeway_secs` of clock skew on `exp`/`nbf` for local secrets
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.engine = self.engine.with_leeway(leeway_secs);
        self.rebuild_chain();
        self
    }

    /// Replace the kid resolution chain outright.
    ///
    /// The kid-less path is unaffected and always walks the store. Once set,
    /// the chain is kept as given: later [`with_key_set_resolver`] and
    /// [`with_leeway`] calls only affect the kid-less path.
    ///
    /// [`with_key_set_resolver`]: TokenVerifier::with_key_set_resolver
    /// [`with_leeway`]: TokenVerifier::with_leeway
    #[must_use]
    pub fn with_strategies(mut self, chain: Vec<Arc<dyn SecretResolver>>) -> Self {
        self.chain = chain;
        self.custom_chain = true;
        self
    }

    /// Store this verifier reads from
    pub fn store(&self) -> &Arc<SecretStore> {
        &self.store
    }

    fn rebuild_chain(&mut self) {
        if self.custom_chain {
            return;
        }
        let mut chain: Vec<Arc<dyn SecretResolver>> = Vec::with_capacity(2);
        if let Some(resolver) = &self.key_set {
            chain.push(Arc::new(KeySetStrategy::new(Arc::clone(resolver))));
        }
        chain.push(Arc::new(LocalStoreStrategy::new(Arc::clone(&self.store), self.engine)));
        self.chain = chain;
    }

    /// Verify `token` and return its claims.
    ///
    /// # Errors
    ///
    /// - [`AuthError::MalformedToken`] if the token is structurally invalid
    /// - [`AuthError::KeySetResolutionFailed`] if the caller cancelled during
    ///   key-set resolution
    /// - [`AuthError::VerificationFailed`] or [`AuthError::UnsupportedAlgorithm`]
    ///   if the local secret named by `kid` rejects the token
    /// - [`AuthError::UnknownKeyIdentifier`] if nothing knows the `kid`
    /// - [`AuthError::NoMatchingSecret`] if the token has no `kid` and no
    ///   secret verifies it
    #[tracing::instrument(skip(self, ctx, token), fields(request_id = %ctx.request_id()))]
    pub async fn parse_token(&self, ctx: &RequestContext, token: &str) -> AuthResult<Claims> {
        let result = self.verify(ctx, token).await;
        match &result {
            Ok(_) => debug!("Token verified"),
            Err(e) => warn!(
                category = e.category(),
                kid = e.kid(),
                error = %e,
                "Token verification failed"
            ),
        }
        result
    }

    async fn verify(&self, ctx: &RequestContext, token: &str) -> AuthResult<Claims> {
        let parsed = parse_unverified(token).map_err(|source| AuthError::MalformedToken {
            request_id: ctx.request_id().to_string(),
            source,
        })?;

        match parsed.kid() {
            Some(kid) => self.resolve_kid(ctx, kid, token).await,
            None => self.first_match(ctx, token).await,
        }
    }

    async fn resolve_kid(&self, ctx: &RequestContext, kid: &str, token: &str) -> AuthResult<Claims> {
        for strategy in &self.chain {
            match strategy.resolve(ctx, kid, token).await? {
                Resolution::Verified(claims) => {
                    debug!(kid, strategy = strategy.name(), "Kid resolved");
                    return Ok(claims);
                }
                Resolution::Unresolved => {
                    trace!(kid, strategy = strategy.name(), "Strategy did not resolve kid");
                }
            }
        }

        Err(AuthError::UnknownKeyIdentifier {
            request_id: ctx.request_id().to_string(),
            kid: kid.to_string(),
        })
    }

    async fn first_match(&self, ctx: &RequestContext, token: &str) -> AuthResult<Claims> {
        let set = self.store.snapshot().await;
        for secret in set.all() {
            match self.engine.verify(token, &secret.normalize()) {
                Ok(claims) => {
                    debug!(kid = secret.kid(), "Kid-less token matched secret");
                    return Ok(claims);
                }
                Err(e) => trace!(kid = secret.kid(), error = %e, "Secret did not verify token"),
            }
        }

        Err(AuthError::NoMatchingSecret {
            request_id: ctx.request_id().to_string(),
        })
    }
}
