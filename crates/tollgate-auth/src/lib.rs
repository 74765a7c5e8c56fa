//! # Tollgate Auth - Gateway Token Authentication
//!
//! Verifies bearer tokens presented to an API gateway and issues first-party
//! tokens on the gateway's behalf.
//!
//! Tokens may be signed by any of several independently configured trust
//! anchors: shared HS256 secrets, RS256 key pairs, RS256 public keys, and
//! third-party keys published through JWKS endpoints. New tokens are signed
//! with exactly one primary secret.
//!
//! ## Architecture
//!
//! - [`store`] - [`SecretStore`], the current trust anchors behind a read-write lock
//! - [`engine`] - [`SignatureEngine`], HS256/RS256 sign and verify
//! - [`verifier`] - [`TokenVerifier`], secret resolution and verification
//! - [`issuer`] - [`TokenIssuer`], signing with the primary secret
//! - [`resolver`] - the `kid` resolution chain and the key-set contract
//! - [`jwks`] - default JWKS-backed key-set resolver
//! - [`config`] - file + environment configuration
//!
//! ## Secret resolution
//!
//! A token whose header names a `kid` is resolved by key identifier: the
//! key-set resolver is asked first, then the local store. A token without a
//! `kid` is tried against every configured secret in configuration order and
//! the first one that verifies wins.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use tollgate_auth::{Claims, RequestContext, Secret, SecretStore, TokenIssuer, TokenVerifier};
//!
//! # tokio_test::block_on(async {
//! let store = Arc::new(SecretStore::from_secrets([
//!     Secret::hs256("gateway", "change-me").primary(),
//! ])?);
//!
//! let issuer = TokenIssuer::new(Arc::clone(&store));
//! let verifier = TokenVerifier::new(store);
//!
//! let mut claims = Claims::new();
//! claims.insert("sub".into(), "alice".into());
//!
//! let ctx = RequestContext::generate();
//! let token = issuer.create_token(&ctx, claims).await?;
//! let verified = verifier.parse_token(&ctx, &token).await?;
//! assert_eq!(verified["sub"], "alice");
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! # });
//! ```

#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod context;
pub mod engine;
pub mod error;
pub mod issuer;
pub mod jwks;
pub mod resolver;
pub mod secret;
pub mod store;
pub mod token;
pub mod verifier;

/// JSON claim set carried by a token
pub type Claims = serde_json::Map<String, serde_json::Value>;

pub use config::{AuthConfig, ConfigError, JwksConfig, LoggingConfig, SecretConfig};
pub use context::{Interrupted, RequestContext};
pub use engine::{SignatureEngine, SignatureError};
pub use error::{AuthError, AuthResult};
pub use issuer::{TOKEN_LIFETIME, TokenIssuer};
pub use jwks::{JwksClient, JwksKeySetResolver, JwksOptions};
pub use resolver::{KeySetError, KeySetResolver, KeySetStrategy, LocalStoreStrategy, Resolution, SecretResolver};
pub use secret::{KeyMaterial, NormalizedSecret, Secret, SecretAlgorithm, VerificationKeyCache};
pub use store::{SecretSet, SecretStore, StoreError};
pub use token::{ParsedToken, TokenFormatError, TokenHeader, parse_unverified};
pub use verifier::TokenVerifier;
