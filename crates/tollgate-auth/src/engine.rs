//! Signature engine: HS256 and RS256 over the compact JWT serialization.
//!
//! The engine knows exactly two canonical algorithms. Callers hand it a
//! [`NormalizedSecret`], so configuration-only tags never reach this module;
//! anything else fails with [`SignatureError::UnsupportedAlgorithm`].
//!
//! Verification is delegated to `jsonwebtoken`, which recomputes the MAC or
//! checks the RSA signature over `header.payload` (HMAC comparison is constant
//! time) and then applies the registered-claim checks configured here.

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rsa::RsaPrivateKey;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePublicKey, LineEnding};
use thiserror::Error;

use crate::Claims;
use crate::secret::{NormalizedSecret, SecretAlgorithm};

/// Errors produced by the signature engine
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SignatureError {
    /// The secret's algorithm is not HS256 or RS256
    #[error("Unsupported algorithm: {0}")]
    UnsupportedAlgorithm(String),

    /// Key material is missing or cannot be parsed
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Signature does not match
    #[error("Invalid signature")]
    InvalidSignature,

    /// Token header names a different algorithm than the secret
    #[error("Token algorithm does not match the secret algorithm")]
    AlgorithmMismatch,

    /// `exp` is in the past
    #[error("Token expired")]
    Expired,

    /// `nbf` is in the future
    #[error("Token not yet valid")]
    NotYetValid,

    /// Any other failure reported by the JWT library
    #[error("JWT error: {0}")]
    Other(String),
}

impl From<jsonwebtoken::errors::Error> for SignatureError {
    fn from(err: jsonwebtoken::errors::Error) -> Self {
        use jsonwebtoken::errors::ErrorKind;

        match err.kind() {
            ErrorKind::InvalidSignature => Self::InvalidSignature,
            ErrorKind::InvalidAlgorithm => Self::AlgorithmMismatch,
            ErrorKind::ExpiredSignature => Self::Expired,
            ErrorKind::ImmatureSignature => Self::NotYetValid,
            ErrorKind::InvalidRsaKey(reason) => Self::InvalidKey(reason.clone()),
            ErrorKind::InvalidKeyFormat => Self::InvalidKey("invalid key format".into()),
            _ => Self::Other(err.to_string()),
        }
    }
}

/// HS256/RS256 signer and verifier
#[derive(Debug, Clone, Copy, Default)]
pub struct SignatureEngine {
    leeway_secs: u64,
}

impl SignatureEngine {
    /// Engine with no clock skew tolerance
    pub fn new() -> Self {
        Self::default()
    }

    /// Tolerate `leeway_secs` of clock skew on `exp`/`nbf`
    #[must_use]
    pub fn with_leeway(mut self, leeway_secs: u64) -> Self {
        self.leeway_secs = leeway_secs;
        self
    }

    /// Configured clock skew tolerance in seconds
    pub fn leeway(&self) -> u64 {
        self.leeway_secs
    }

    /// Verify `token` with `secret` and return its claims.
    ///
    /// `exp` and `nbf` are enforced when present; neither is required.
    ///
    /// # Errors
    ///
    /// Returns an error when the algorithm is unsupported, the key material is
    /// unusable, the header algorithm differs from the secret's, the signature
    /// does not match, or a time-based claim rejects the token.
    pub fn verify(&self, token: &str, secret: &NormalizedSecret<'_>) -> Result<Claims, SignatureError> {
        let algorithm = canonical_algorithm(&secret.algorithm)?;
        let key = match secret.verification_key.get_or_init(|| decoding_key(algorithm, secret)) {
            Ok(key) => key,
            Err(e) => return Err(e.clone()),
        };
        let data = decode::<Claims>(token, key, &self.validation(algorithm))?;
        Ok(data.claims)
    }

    /// Claim checks shared by every verification path: `exp` and `nbf` when
    /// present, no required claims, no audience
    pub(crate) fn validation(&self, algorithm: Algorithm) -> Validation {
        let mut validation = Validation::new(algorithm);
        validation.required_spec_claims.clear();
        validation.validate_aud = false;
        validation.validate_nbf = true;
        validation.leeway = self.leeway_secs;
        validation
    }

    /// Sign `claims` under `header` and return the compact token.
    ///
    /// The header's `alg` is overwritten with the secret's algorithm.
    ///
    /// # Errors
    ///
    /// Returns an error when the algorithm is unsupported or the signing key
    /// material is missing or unparsable.
    pub fn sign(
        &self,
        mut header: Header,
        claims: &Claims,
        secret: &NormalizedSecret<'_>,
    ) -> Result<String, SignatureError> {
        let algorithm = canonical_algorithm(&secret.algorithm)?;
        let key = encoding_key(algorithm, secret)?;
        header.alg = algorithm;
        Ok(encode(&header, claims, &key)?)
    }
}

fn canonical_algorithm(algorithm: &SecretAlgorithm) -> Result<Algorithm, SignatureError> {
    match algorithm {
        SecretAlgorithm::Hs256 => Ok(Algorithm::HS256),
        SecretAlgorithm::Rs256 => Ok(Algorithm::RS256),
        other => Err(SignatureError::UnsupportedAlgorithm(other.to_string())),
    }
}

fn decoding_key(algorithm: Algorithm, secret: &NormalizedSecret<'_>) -> Result<DecodingKey, SignatureError> {
    let material = secret.material;
    match algorithm {
        Algorithm::HS256 => material
            .shared_bytes()
            .map(DecodingKey::from_secret)
            .ok_or_else(|| SignatureError::InvalidKey("HS256 requires a shared secret".into())),
        _ => {
            if let Some(public_pem) = material.public_pem() {
                return Ok(DecodingKey::from_rsa_pem(public_pem.as_bytes())?);
            }
            let private_pem = material.private_pem().ok_or_else(|| {
                SignatureError::InvalidKey("RS256 requires a public or private key".into())
            })?;
            let derived = derive_public_pem(private_pem)?;
            Ok(DecodingKey::from_rsa_pem(derived.as_bytes())?)
        }
    }
}

fn encoding_key(algorithm: Algorithm, secret: &NormalizedSecret<'_>) -> Result<EncodingKey, SignatureError> {
    let material = secret.material;
    match algorithm {
        Algorithm::HS256 => material
            .shared_bytes()
            .map(EncodingKey::from_secret)
            .ok_or_else(|| SignatureError::InvalidKey("HS256 requires a shared secret".into())),
        _ => {
            let private_pem = material
                .private_pem()
                .ok_or_else(|| SignatureError::InvalidKey("RS256 signing requires a private key".into()))?;
            Ok(EncodingKey::from_rsa_pem(private_pem.as_bytes())?)
        }
    }
}

/// Derive the SPKI public key PEM from a PKCS#8 or PKCS#1 private key PEM
fn derive_public_pem(private_pem: &str) -> Result<String, SignatureError> {
    let private_key = RsaPrivateKey::from_pkcs8_pem(private_pem)
        .or_else(|_| RsaPrivateKey::from_pkcs1_pem(private_pem))
        .map_err(|e| SignatureError::InvalidKey(format!("unparsable RSA private key: {e}")))?;
    private_key
        .to_public_key()
        .to_public_key_pem(LineEnding::LF)
        .map_err(|e| SignatureError::InvalidKey(format!("cannot encode RSA public key: {e}")))
}
