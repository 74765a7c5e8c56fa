//! JWKS-backed key-set resolver
//!
//! Third-party issuers publish their verification keys as a JSON Web Key Set.
//! [`JwksClient`] fetches one endpoint and caches the set:
//!
//! - **TTL-based caching**: default 10 minutes
//! - **Refresh on unknown kid**: a `kid` missing from the cached set forces one
//!   refresh, which picks up rotated keys
//! - **Rate limiting**: forced refreshes at most every 5 seconds by default
//!
//! [`JwksKeySetResolver`] tries each configured client in order and verifies
//! the token with the first published key whose `kid` matches.
//!
//! # Security Considerations
//!
//! - Endpoints must use HTTPS; plain HTTP is accepted only for loopback hosts
//! - Only asymmetric header algorithms are accepted, so a published RSA key can
//!   never be used as an HMAC secret

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, decode, decode_header};
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};
use url::{Host, Url};

use crate::Claims;
use crate::context::RequestContext;
use crate::engine::{SignatureEngine, SignatureError};
use crate::resolver::{KeySetError, KeySetResolver};

/// Default cache TTL
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(600);
/// Default minimum interval between forced refreshes
pub const DEFAULT_MIN_REFRESH_INTERVAL: Duration = Duration::from_secs(5);
/// Default HTTP request timeout
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Tuning for a [`JwksClient`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct JwksOptions {
    /// How long a fetched set is served from cache
    pub cache_ttl: Duration,
    /// Minimum interval between forced refreshes
    pub min_refresh_interval: Duration,
    /// HTTP request timeout
    pub request_timeout: Duration,
}

impl Default for JwksOptions {
    fn default() -> Self {
        Self {
            cache_ttl: DEFAULT_CACHE_TTL,
            min_refresh_interval: DEFAULT_MIN_REFRESH_INTERVAL,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }
}

#[derive(Debug, Clone)]
struct CachedJwks {
    jwks: JwkSet,
    cached_at: Instant,
    ttl: Duration,
}

impl CachedJwks {
    fn is_valid(&self) -> bool {
        self.cached_at.elapsed() < self.ttl
    }
}

/// Fetches and caches one JWKS endpoint
#[derive(Debug, Clone)]
pub struct JwksClient {
    jwks_uri: String,
    cache: Arc<RwLock<Option<CachedJwks>>>,
    http_client: reqwest::Client,
    options: JwksOptions,
    last_refresh: Arc<RwLock<Option<Instant>>>,
    last_failure: Arc<RwLock<Option<Instant>>>,
}

impl JwksClient {
    /// Client with default settings.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::InsecureEndpoint`] for a non-HTTPS, non-loopback
    /// URI and [`KeySetError::Client`] if the HTTP client cannot be built.
    pub fn new(jwks_uri: impl Into<String>) -> Result<Self, KeySetError> {
        Self::with_options(jwks_uri, JwksOptions::default())
    }

    /// Client with custom cache and timeout settings.
    ///
    /// # Errors
    ///
    /// Same as [`JwksClient::new`].
    pub fn with_options(jwks_uri: impl Into<String>, options: JwksOptions) -> Result<Self, KeySetError> {
        let jwks_uri = jwks_uri.into();
        check_endpoint(&jwks_uri)?;

        let http_client = reqwest::Client::builder()
            .timeout(options.request_timeout)
            .build()
            .map_err(|e| KeySetError::Client(e.to_string()))?;

        Ok(Self {
            jwks_uri,
            cache: Arc::new(RwLock::new(None)),
            http_client,
            options,
            last_refresh: Arc::new(RwLock::new(None)),
            last_failure: Arc::new(RwLock::new(None)),
        })
    }

    /// JWKS endpoint URI
    pub fn jwks_uri(&self) -> &str {
        &self.jwks_uri
    }

    /// Cache and refresh settings
    pub fn options(&self) -> JwksOptions {
        self.options
    }

    /// Key set from cache, fetching it if the cache is empty or stale.
    ///
    /// After a failed fetch the endpoint is not contacted again until the
    /// minimum refresh interval has passed; calls in between fail at once.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::Fetch`] when the endpoint is unreachable,
    /// answers with an error status, or failed within the minimum refresh
    /// interval, and [`KeySetError::InvalidDocument`] when the body is not a
    /// JWK set.
    pub async fn get_jwks(&self) -> Result<JwkSet, KeySetError> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.as_ref()
                && cached.is_valid()
            {
                debug!(jwks_uri = %self.jwks_uri, "Using cached JWKS");
                return Ok(cached.jwks.clone());
            }
        }

        if let Some(failed_at) = *self.last_failure.read().await {
            let since_failure = failed_at.elapsed();
            if since_failure < self.options.min_refresh_interval {
                debug!(
                    jwks_uri = %self.jwks_uri,
                    since_failure_ms = since_failure.as_millis(),
                    "JWKS endpoint failed recently, not fetching"
                );
                return Err(KeySetError::Fetch(format!(
                    "endpoint failed {}ms ago",
                    since_failure.as_millis()
                )));
            }
        }

        self.fetch_and_cache().await
    }

    /// Fetch the key set ignoring the cache, subject to the refresh rate limit.
    ///
    /// When called again within the minimum refresh interval this falls back
    /// to [`JwksClient::get_jwks`].
    ///
    /// # Errors
    ///
    /// Same as [`JwksClient::get_jwks`].
    pub async fn refresh(&self) -> Result<JwkSet, KeySetError> {
        {
            let last_refresh = self.last_refresh.read().await;
            if let Some(last) = *last_refresh {
                let since_last = last.elapsed();
                if since_last < self.options.min_refresh_interval {
                    warn!(
                        jwks_uri = %self.jwks_uri,
                        since_last_ms = since_last.as_millis(),
                        "JWKS refresh rate limited, using cache"
                    );
                    return self.get_jwks().await;
                }
            }
        }

        self.fetch_and_cache().await
    }

    /// Published key named `kid`, refreshing once if the cached set lacks it.
    ///
    /// # Errors
    ///
    /// Returns [`KeySetError::KeyNotFound`] when no published key has `kid`,
    /// or a fetch error from [`JwksClient::get_jwks`].
    pub async fn find_key(&self, kid: &str) -> Result<Jwk, KeySetError> {
        if let Some(jwk) = self.get_jwks().await?.find(kid) {
            return Ok(jwk.clone());
        }

        debug!(jwks_uri = %self.jwks_uri, kid, "Kid not in cached JWKS, refreshing");
        self.refresh()
            .await?
            .find(kid)
            .cloned()
            .ok_or_else(|| KeySetError::KeyNotFound(kid.to_string()))
    }

    /// Drop the cached set
    pub async fn clear_cache(&self) {
        let mut cache = self.cache.write().await;
        *cache = None;
        debug!(jwks_uri = %self.jwks_uri, "JWKS cache cleared");
    }

    async fn fetch_and_cache(&self) -> Result<JwkSet, KeySetError> {
        info!(jwks_uri = %self.jwks_uri, "Fetching JWKS from endpoint");

        *self.last_refresh.write().await = Some(Instant::now());

        match self.fetch().await {
            Ok(jwks) => {
                *self.last_failure.write().await = None;
                *self.cache.write().await = Some(CachedJwks {
                    jwks: jwks.clone(),
                    cached_at: Instant::now(),
                    ttl: self.options.cache_ttl,
                });
                Ok(jwks)
            }
            Err(e) => {
                // A dead endpoint is not hammered on every token.
                *self.last_failure.write().await = Some(Instant::now());
                Err(e)
            }
        }
    }

    async fn fetch(&self) -> Result<JwkSet, KeySetError> {
        let response = self
            .http_client
            .get(&self.jwks_uri)
            .send()
            .await
            .map_err(|e| {
                error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to fetch JWKS");
                KeySetError::Fetch(e.to_string())
            })?;

        let status = response.status();
        if !status.is_success() {
            error!(jwks_uri = %self.jwks_uri, %status, "JWKS endpoint returned error status");
            return Err(KeySetError::Fetch(format!("endpoint returned status {status}")));
        }

        let jwks: JwkSet = response.json().await.map_err(|e| {
            error!(jwks_uri = %self.jwks_uri, error = %e, "Failed to parse JWKS JSON");
            KeySetError::InvalidDocument(e.to_string())
        })?;

        info!(
            jwks_uri = %self.jwks_uri,
            key_count = jwks.keys.len(),
            "Successfully fetched JWKS"
        );

        Ok(jwks)
    }
}

/// Reject endpoints that are neither HTTPS nor plain HTTP on a loopback host
fn check_endpoint(jwks_uri: &str) -> Result<(), KeySetError> {
    let url = Url::parse(jwks_uri).map_err(|e| KeySetError::InsecureEndpoint(format!("{jwks_uri}: {e}")))?;

    let loopback = match url.host() {
        Some(Host::Domain(domain)) => domain.eq_ignore_ascii_case("localhost"),
        Some(Host::Ipv4(addr)) => addr.is_loopback(),
        Some(Host::Ipv6(addr)) => addr.is_loopback(),
        None => false,
    };

    match url.scheme() {
        "https" => Ok(()),
        "http" if loopback => Ok(()),
        _ => Err(KeySetError::InsecureEndpoint(jwks_uri.to_string())),
    }
}

fn is_allowed_algorithm(algorithm: Algorithm) -> bool {
    matches!(
        algorithm,
        Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512
            | Algorithm::ES256
            | Algorithm::ES384
    )
}

/// [`KeySetResolver`] over one or more JWKS endpoints
#[derive(Debug, Clone)]
pub struct JwksKeySetResolver {
    clients: Vec<Arc<JwksClient>>,
    engine: SignatureEngine,
}

impl JwksKeySetResolver {
    /// Resolver trying `clients` in order
    pub fn new(clients: impl IntoIterator<Item = JwksClient>) -> Self {
        Self {
            clients: clients.into_iter().map(Arc::new).collect(),
            engine: SignatureEngine::new(),
        }
    }

    /// Resolver for `endpoints` sharing one set of options.
    ///
    /// # Errors
    ///
    /// Fails on the first endpoint [`JwksClient::with_options`] rejects.
    pub fn from_endpoints<I, S>(endpoints: I, options: JwksOptions) -> Result<Self, KeySetError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let clients = endpoints
            .into_iter()
            .map(|uri| JwksClient::with_options(uri, options))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(clients))
    }

    /// Tolerate `leeway_secs` of clock skew on `exp`/`nbf`
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.engine = self.engine.with_leeway(leeway_secs);
        self
    }

    /// Configured clients in resolution order
    pub fn clients(&self) -> &[Arc<JwksClient>] {
        &self.clients
    }

    async fn find_key(&self, kid: &str) -> Result<Jwk, KeySetError> {
        let mut last_error = KeySetError::KeyNotFound(kid.to_string());
        for client in &self.clients {
            match client.find_key(kid).await {
                Ok(jwk) => return Ok(jwk),
                Err(KeySetError::KeyNotFound(_)) => {}
                Err(e) => {
                    warn!(jwks_uri = client.jwks_uri(), kid, error = %e, "JWKS endpoint unavailable");
                    last_error = e;
                }
            }
        }
        Err(last_error)
    }
}

#[async_trait]
impl KeySetResolver for JwksKeySetResolver {
    async fn resolve(
        &self,
        ctx: &RequestContext,
        kid: &str,
        token: &str,
    ) -> Result<Claims, KeySetError> {
        let header = decode_header(token).map_err(SignatureError::from)?;
        if !is_allowed_algorithm(header.alg) {
            return Err(KeySetError::AlgorithmNotAllowed(format!("{:?}", header.alg)));
        }

        let jwk = self.find_key(kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| KeySetError::InvalidKey(e.to_string()))?;

        let data = decode::<Claims>(token, &key, &self.engine.validation(header.alg))
            .map_err(SignatureError::from)?;

        debug!(request_id = ctx.request_id(), kid, "Token verified against JWKS");
        Ok(data.claims)
    }
}
