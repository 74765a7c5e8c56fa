//! Key-set resolution through a mock JWKS endpoint
//!
//! Tests cover:
//! - kid-addressed tokens verified by published keys
//! - fallback to the local store when the key set does not know the kid
//! - caching, forced refresh on key rotation, and refresh rate limiting
//! - caller cancellation and deadlines during resolution

mod common;

use common::{MockJwksServer, TestKeyPair, now, other_keypair, shared_keypair, sign_hs256};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tollgate_auth::{
    AuthError, Interrupted, JwksClient, JwksKeySetResolver, JwksOptions, KeySetError, RequestContext, Secret,
    SecretStore, SignatureError, TokenVerifier,
};
use wiremock::{
    Mock, ResponseTemplate,
    matchers::{method, path},
};

fn verifier_with(server: &MockJwksServer, options: JwksOptions, secrets: Vec<Secret>) -> TokenVerifier {
    let client = JwksClient::with_options(server.jwks_endpoint.clone(), options).expect("loopback endpoint");
    let store = Arc::new(SecretStore::from_secrets(secrets).expect("valid secret set"));
    TokenVerifier::new(store).with_key_set_resolver(Arc::new(JwksKeySetResolver::new([client])))
}

fn no_rate_limit() -> JwksOptions {
    JwksOptions {
        min_refresh_interval: Duration::ZERO,
        ..JwksOptions::default()
    }
}

#[tokio::test]
async fn test_published_key_verifies_token() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![keys.jwk("idp-1")]).await;

    let verifier = verifier_with(&server, JwksOptions::default(), vec![]);
    let token = keys.sign(&json!({"sub": "federated", "exp": now() + 60}), Some("idp-1"));

    let claims = verifier.parse_token(&RequestContext::new("r"), &token).await.unwrap();
    assert_eq!(claims["sub"], "federated");
}

#[tokio::test]
async fn test_key_set_is_cached() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![keys.jwk("idp-1")]).await;

    let verifier = verifier_with(&server, JwksOptions::default(), vec![]);
    let token = keys.sign(&json!({"sub": "x"}), Some("idp-1"));

    for _ in 0..5 {
        verifier.parse_token(&RequestContext::generate(), &token).await.unwrap();
    }
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_key_set_wins_over_local_secret_with_same_kid() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![keys.jwk("shared-kid")]).await;

    // The local HS256 secret would reject an RS256 token outright.
    let verifier = verifier_with(&server, JwksOptions::default(), vec![Secret::hs256("shared-kid", "s")]);
    let token = keys.sign(&json!({"sub": "from-idp"}), Some("shared-kid"));

    let claims = verifier.parse_token(&RequestContext::new("r"), &token).await.unwrap();
    assert_eq!(claims["sub"], "from-idp");
}

#[tokio::test]
async fn test_unknown_kid_falls_back_to_local_store() {
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![shared_keypair().jwk("idp-1")]).await;

    let verifier = verifier_with(&server, JwksOptions::default(), vec![Secret::hs256("local", "s")]);
    let token = sign_hs256("s", &json!({"sub": "local-user"}), Some("local"));

    let claims = verifier.parse_token(&RequestContext::new("r"), &token).await.unwrap();
    assert_eq!(claims["sub"], "local-user");
}

#[tokio::test]
async fn test_endpoint_failure_falls_back_to_local_store() {
    let server = MockJwksServer::start().await;
    server.mock_status(503).await;

    let verifier = verifier_with(&server, JwksOptions::default(), vec![Secret::hs256("local", "s")]);
    let token = sign_hs256("s", &json!({}), Some("local"));
    assert!(verifier.parse_token(&RequestContext::new("r"), &token).await.is_ok());

    let stranger = sign_hs256("s", &json!({}), Some("stranger"));
    let err = verifier.parse_token(&RequestContext::new("r"), &stranger).await.unwrap_err();
    assert!(matches!(err, AuthError::UnknownKeyIdentifier { .. }));
}

#[tokio::test]
async fn test_bad_signature_from_key_set_ends_as_unknown_kid() {
    // Published key exists but the token was signed by someone else.
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![shared_keypair().jwk("idp-1")]).await;

    let verifier = verifier_with(&server, JwksOptions::default(), vec![]);
    let forged = other_keypair().sign(&json!({"sub": "mallory"}), Some("idp-1"));

    let err = verifier.parse_token(&RequestContext::new("r"), &forged).await.unwrap_err();
    assert!(matches!(&err, AuthError::UnknownKeyIdentifier { kid, .. } if kid == "idp-1"));
}

#[tokio::test]
async fn test_rotated_key_picked_up_by_forced_refresh() {
    let old = shared_keypair();
    let new = TestKeyPair::generate();
    let server = MockJwksServer::start().await;
    server.mock_jwks_times(vec![old.jwk("2025-old")], 1).await;
    server.mock_jwks(vec![old.jwk("2025-old"), new.jwk("2025-new")]).await;

    let verifier = verifier_with(&server, no_rate_limit(), vec![]);

    let old_token = old.sign(&json!({"v": 1}), Some("2025-old"));
    verifier.parse_token(&RequestContext::new("r1"), &old_token).await.unwrap();

    let new_token = new.sign(&json!({"v": 2}), Some("2025-new"));
    let claims = verifier.parse_token(&RequestContext::new("r2"), &new_token).await.unwrap();
    assert_eq!(claims["v"], 2);
    assert_eq!(server.request_count().await, 2);
}

#[tokio::test]
async fn test_forced_refresh_is_rate_limited() {
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![shared_keypair().jwk("idp-1")]).await;

    let client = JwksClient::new(server.jwks_endpoint.clone()).unwrap();
    for _ in 0..3 {
        assert!(matches!(
            client.find_key("missing").await,
            Err(KeySetError::KeyNotFound(_))
        ));
    }
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_cancelled_request_does_not_fall_through() {
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![]).await;

    // The store knows the kid, but cancellation ends verification first.
    let verifier = verifier_with(&server, JwksOptions::default(), vec![Secret::hs256("local", "s")]);
    let token = sign_hs256("s", &json!({}), Some("local"));

    let ctx = RequestContext::new("cancelled");
    ctx.cancellation().cancel();

    let err = verifier.parse_token(&ctx, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::KeySetResolutionFailed {
            source: KeySetError::Interrupted(Interrupted::Cancelled),
            ..
        }
    ));
    assert_eq!(err.request_id(), "cancelled");
}

/// Serve an empty key set after `delay`
async fn mount_slow_jwks(server: &MockJwksServer, delay: Duration) {
    Mock::given(method("GET"))
        .and(path("/jwks"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"keys": []}))
                .set_delay(delay),
        )
        .mount(&server.server)
        .await;
}

#[tokio::test]
async fn test_deadline_during_slow_fetch() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    mount_slow_jwks(&server, Duration::from_secs(2)).await;

    // RS256 so the resolver actually goes to the network.
    let verifier = verifier_with(
        &server,
        JwksOptions::default(),
        vec![Secret::rs256_public("local", keys.public_pem.clone())],
    );
    let token = keys.sign(&json!({}), Some("local"));
    let ctx = RequestContext::new("slow").with_timeout(Duration::from_millis(100));

    let err = verifier.parse_token(&ctx, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::KeySetResolutionFailed {
            source: KeySetError::Interrupted(Interrupted::DeadlineExceeded),
            ..
        }
    ));
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_cancelled_while_fetch_in_flight() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    mount_slow_jwks(&server, Duration::from_secs(2)).await;

    let verifier = verifier_with(
        &server,
        JwksOptions::default(),
        vec![Secret::rs256_public("local", keys.public_pem.clone())],
    );
    let token = keys.sign(&json!({}), Some("local"));

    let cancel = CancellationToken::new();
    let ctx = RequestContext::new("in-flight").with_cancellation(cancel.clone());
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();
    });

    let err = verifier.parse_token(&ctx, &token).await.unwrap_err();
    assert!(matches!(
        err,
        AuthError::KeySetResolutionFailed {
            source: KeySetError::Interrupted(Interrupted::Cancelled),
            ..
        }
    ));
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_dead_endpoint_not_refetched_within_refresh_interval() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    server.mock_status(503).await;

    let options = JwksOptions {
        min_refresh_interval: Duration::from_secs(1),
        ..JwksOptions::default()
    };
    let verifier = verifier_with(&server, options, vec![Secret::rs256_public("local", keys.public_pem.clone())]);
    let token = keys.sign(&json!({"sub": "local-user"}), Some("local"));

    for _ in 0..5 {
        let claims = verifier.parse_token(&RequestContext::generate(), &token).await.unwrap();
        assert_eq!(claims["sub"], "local-user");
    }
    assert_eq!(server.request_count().await, 1);

    // Retried once the interval has passed.
    tokio::time::sleep(Duration::from_millis(1100)).await;
    verifier.parse_token(&RequestContext::generate(), &token).await.unwrap();
    assert_eq!(server.request_count().await, 2);
}

#[tokio::test]
async fn test_recent_failure_reported_without_network_call() {
    let server = MockJwksServer::start().await;
    server.mock_status(500).await;

    let client = JwksClient::new(server.jwks_endpoint.clone()).unwrap();
    assert!(matches!(client.get_jwks().await, Err(KeySetError::Fetch(_))));
    assert!(matches!(client.get_jwks().await, Err(KeySetError::Fetch(_))));
    assert_eq!(server.request_count().await, 1);
}

#[tokio::test]
async fn test_expired_federated_token_rejected_by_resolver() {
    let keys = shared_keypair();
    let server = MockJwksServer::start().await;
    server.mock_jwks(vec![keys.jwk("idp-1")]).await;

    let resolver = JwksKeySetResolver::new([JwksClient::new(server.jwks_endpoint.clone()).unwrap()]);
    let token = keys.sign(&json!({"exp": now() - 120}), Some("idp-1"));

    let err = tollgate_auth::KeySetResolver::resolve(&resolver, &RequestContext::new("r"), "idp-1", &token)
        .await
        .unwrap_err();
    assert_eq!(err, KeySetError::Verification(SignatureError::Expired));

    let lenient = resolver.with_leeway(300);
    assert!(
        tollgate_auth::KeySetResolver::resolve(&lenient, &RequestContext::new("r"), "idp-1", &token)
            .await
            .is_ok()
    );
}

#[tokio::test]
async fn test_second_endpoint_consulted_when_first_lacks_kid() {
    let keys = shared_keypair();
    let first = MockJwksServer::start().await;
    first.mock_jwks(vec![other_keypair().jwk("other")]).await;
    let second = MockJwksServer::start().await;
    second.mock_jwks(vec![keys.jwk("idp-2")]).await;

    let resolver = JwksKeySetResolver::from_endpoints(
        [first.jwks_endpoint.clone(), second.jwks_endpoint.clone()],
        JwksOptions::default(),
    )
    .unwrap();
    let verifier = TokenVerifier::new(Arc::new(SecretStore::default())).with_key_set_resolver(Arc::new(resolver));

    let token = keys.sign(&json!({"iss": "second"}), Some("idp-2"));
    let claims = verifier.parse_token(&RequestContext::new("r"), &token).await.unwrap();
    assert_eq!(claims["iss"], "second");
}
