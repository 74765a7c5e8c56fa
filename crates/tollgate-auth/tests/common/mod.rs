//! Common test utilities for integration tests
//!
//! Key generation, claim builders and a mock JWKS endpoint shared by the
//! verification, issuance and configuration tests.

#![allow(dead_code)]

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::{Algorithm, EncodingKey, Header, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::traits::PublicKeyParts;
use serde_json::{Value, json};
use std::sync::OnceLock;
use tollgate_auth::Claims;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{method, path},
};

/// RSA key pair in the PEM encodings the store accepts
pub struct TestKeyPair {
    pub private_key: RsaPrivateKey,
    /// PKCS#8 private key
    pub private_pem: String,
    /// PKCS#1 private key
    pub private_pkcs1_pem: String,
    /// SPKI public key
    pub public_pem: String,
}

impl TestKeyPair {
    /// Generate a fresh 2048-bit key pair
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let private_key = RsaPrivateKey::new(&mut rng, 2048).expect("Failed to generate RSA key");

        let private_pem = private_key
            .to_pkcs8_pem(LineEnding::LF)
            .expect("Failed to encode private key")
            .to_string();
        let private_pkcs1_pem = private_key
            .to_pkcs1_pem(LineEnding::LF)
            .expect("Failed to encode PKCS#1 private key")
            .to_string();
        let public_pem = private_key
            .to_public_key()
            .to_public_key_pem(LineEnding::LF)
            .expect("Failed to encode public key");

        Self {
            private_key,
            private_pem,
            private_pkcs1_pem,
            public_pem,
        }
    }

    /// Public half as a JWK with the given `kid`
    pub fn jwk(&self, kid: &str) -> Value {
        let public = self.private_key.to_public_key();
        json!({
            "kty": "RSA",
            "kid": kid,
            "use": "sig",
            "alg": "RS256",
            "n": URL_SAFE_NO_PAD.encode(public.n().to_bytes_be()),
            "e": URL_SAFE_NO_PAD.encode(public.e().to_bytes_be()),
        })
    }

    /// Sign `claims` with RS256, optionally embedding `kid`
    pub fn sign(&self, claims: &Value, kid: Option<&str>) -> String {
        let mut header = Header::new(Algorithm::RS256);
        header.kid = kid.map(str::to_string);
        let key = EncodingKey::from_rsa_pem(self.private_pem.as_bytes()).expect("Invalid RSA key");
        encode(&header, claims, &key).expect("Failed to encode test JWT")
    }
}

/// Key generation is slow in debug builds; most tests share these two pairs.
pub fn shared_keypair() -> &'static TestKeyPair {
    static KEYS: OnceLock<TestKeyPair> = OnceLock::new();
    KEYS.get_or_init(TestKeyPair::generate)
}

/// Second key pair, distinct from [`shared_keypair`]
pub fn other_keypair() -> &'static TestKeyPair {
    static KEYS: OnceLock<TestKeyPair> = OnceLock::new();
    KEYS.get_or_init(TestKeyPair::generate)
}

/// Sign `claims` with HS256, optionally embedding `kid`
pub fn sign_hs256(secret: &str, claims: &Value, kid: Option<&str>) -> String {
    let mut header = Header::new(Algorithm::HS256);
    header.kid = kid.map(str::to_string);
    encode(&header, claims, &EncodingKey::from_secret(secret.as_bytes())).expect("Failed to encode test JWT")
}

/// JSON object as a claim set
pub fn claims(value: Value) -> Claims {
    value.as_object().cloned().expect("claims must be a JSON object")
}

/// Current Unix timestamp
pub fn now() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Mock JWKS endpoint
pub struct MockJwksServer {
    pub server: MockServer,
    pub jwks_endpoint: String,
}

impl MockJwksServer {
    /// Start a mock server; nothing is mounted yet
    pub async fn start() -> Self {
        let server = MockServer::start().await;
        let jwks_endpoint = format!("{}/jwks", server.uri());
        Self { server, jwks_endpoint }
    }

    /// Serve `keys` at `/jwks`
    pub async fn mock_jwks(&self, keys: Vec<Value>) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .mount(&self.server)
            .await;
    }

    /// Serve `keys` at `/jwks` for the first `times` requests only
    pub async fn mock_jwks_times(&self, keys: Vec<Value>, times: u64) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": keys })))
            .up_to_n_times(times)
            .mount(&self.server)
            .await;
    }

    /// Answer `/jwks` with `status`
    pub async fn mock_status(&self, status: u16) {
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(status))
            .mount(&self.server)
            .await;
    }

    /// Number of requests the server has received
    pub async fn request_count(&self) -> usize {
        self.server.received_requests().await.map_or(0, |r| r.len())
    }
}
