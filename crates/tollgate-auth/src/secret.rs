//! Trust anchors and their normalized signing view.

use std::fmt;
use std::sync::OnceLock;

use jsonwebtoken::DecodingKey;
use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::engine::SignatureError;

/// Algorithm tag attached to a configured secret.
///
/// `Unset` and `Rs256Public` exist only at configuration level; the engine
/// sees them through [`Secret::normalize`] as `Hs256` and `Rs256`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub enum SecretAlgorithm {
    /// No tag configured, treated as HS256
    #[default]
    Unset,
    /// HMAC-SHA256 with a shared secret
    Hs256,
    /// RSA-SHA256 with a private key (and optionally its public half)
    Rs256,
    /// RSA-SHA256 verification only, with a public key
    Rs256Public,
    /// Any other tag, rejected with `UnsupportedAlgorithm` when used
    Other(String),
}

impl SecretAlgorithm {
    /// Parse a configuration tag
    pub fn from_tag(tag: &str) -> Self {
        match tag {
            "" => Self::Unset,
            "HS256" => Self::Hs256,
            "RS256" => Self::Rs256,
            "RS256_PUBLIC" => Self::Rs256Public,
            other => Self::Other(other.to_string()),
        }
    }

    /// Configuration tag for this algorithm
    pub fn as_tag(&self) -> &str {
        match self {
            Self::Unset => "",
            Self::Hs256 => "HS256",
            Self::Rs256 => "RS256",
            Self::Rs256Public => "RS256_PUBLIC",
            Self::Other(tag) => tag,
        }
    }

    /// Rewrite the configuration-only tags into the two canonical algorithms
    pub fn normalized(&self) -> Self {
        match self {
            Self::Unset => Self::Hs256,
            Self::Rs256Public => Self::Rs256,
            other => other.clone(),
        }
    }
}

impl fmt::Display for SecretAlgorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unset => f.write_str("<unset>"),
            other => f.write_str(other.as_tag()),
        }
    }
}

impl Serialize for SecretAlgorithm {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_tag())
    }
}

impl<'de> Deserialize<'de> for SecretAlgorithm {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let tag = String::deserialize(deserializer)?;
        Ok(Self::from_tag(&tag))
    }
}

/// Key material held by a secret
#[derive(Clone)]
pub enum KeyMaterial {
    /// Shared symmetric secret (raw bytes of the configured string)
    Shared(SecretString),
    /// RSA key material in PEM form
    Rsa {
        /// PKCS#1 or PKCS#8 private key, required for signing
        private_pem: Option<SecretString>,
        /// SPKI or PKCS#1 public key, used for verification when present
        public_pem: Option<String>,
    },
}

impl fmt::Debug for KeyMaterial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Shared(_) => f.write_str("Shared([REDACTED])"),
            Self::Rsa {
                private_pem,
                public_pem,
            } => f
                .debug_struct("Rsa")
                .field("private_pem", &private_pem.as_ref().map(|_| "[REDACTED]"))
                .field("public_pem", &public_pem.is_some())
                .finish(),
        }
    }
}

impl KeyMaterial {
    /// Shared secret bytes, if this is symmetric material
    pub fn shared_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Shared(secret) => Some(secret.expose_secret().as_bytes()),
            Self::Rsa { .. } => None,
        }
    }

    /// Private key PEM, if configured
    pub fn private_pem(&self) -> Option<&str> {
        match self {
            Self::Rsa {
                private_pem: Some(pem),
                ..
            } => Some(pem.expose_secret().as_str()),
            _ => None,
        }
    }

    /// Public key PEM, if configured
    pub fn public_pem(&self) -> Option<&str> {
        match self {
            Self::Rsa {
                public_pem: Some(pem),
                ..
            } => Some(pem.as_str()),
            _ => None,
        }
    }
}

/// Verification key built from the key material on first use.
///
/// An RS256 secret without a public PEM derives its public key from the
/// private key; doing that once per secret keeps the kid-less path from
/// re-parsing every private key for every token.
#[derive(Clone, Default)]
pub struct VerificationKeyCache(OnceLock<Result<DecodingKey, SignatureError>>);

impl VerificationKeyCache {
    pub(crate) fn get_or_init(
        &self,
        init: impl FnOnce() -> Result<DecodingKey, SignatureError>,
    ) -> &Result<DecodingKey, SignatureError> {
        self.0.get_or_init(init)
    }

    /// Whether the key has been built (or failed to build) already
    pub fn is_ready(&self) -> bool {
        self.0.get().is_some()
    }
}

impl fmt::Debug for VerificationKeyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("VerificationKeyCache")
            .field(&self.is_ready())
            .finish()
    }
}

/// A configured trust anchor.
///
/// Secrets are immutable once built; a configuration reload replaces the
/// whole set held by [`SecretStore`](crate::store::SecretStore).
#[derive(Debug, Clone)]
pub struct Secret {
    kid: String,
    algorithm: SecretAlgorithm,
    material: KeyMaterial,
    is_primary: bool,
    verification_key: VerificationKeyCache,
}

impl Secret {
    /// Build a secret from its parts
    pub fn new(
        kid: impl Into<String>,
        algorithm: SecretAlgorithm,
        material: KeyMaterial,
        is_primary: bool,
    ) -> Self {
        Self {
            kid: kid.into(),
            algorithm,
            material,
            is_primary,
            verification_key: VerificationKeyCache::default(),
        }
    }

    /// HS256 secret with a shared key
    pub fn hs256(kid: impl Into<String>, shared: impl Into<String>) -> Self {
        Self::new(
            kid,
            SecretAlgorithm::Hs256,
            KeyMaterial::Shared(SecretString::new(shared.into())),
            false,
        )
    }

    /// RS256 secret holding a private key and, optionally, its public half
    pub fn rs256(
        kid: impl Into<String>,
        private_pem: impl Into<String>,
        public_pem: Option<String>,
    ) -> Self {
        Self::new(
            kid,
            SecretAlgorithm::Rs256,
            KeyMaterial::Rsa {
                private_pem: Some(SecretString::new(private_pem.into())),
                public_pem,
            },
            false,
        )
    }

    /// Verification-only RS256 secret holding a public key
    pub fn rs256_public(kid: impl Into<String>, public_pem: impl Into<String>) -> Self {
        Self::new(
            kid,
            SecretAlgorithm::Rs256Public,
            KeyMaterial::Rsa {
                private_pem: None,
                public_pem: Some(public_pem.into()),
            },
            false,
        )
    }

    /// Mark this secret as the primary signing credential
    #[must_use]
    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }

    /// Key identifier
    pub fn kid(&self) -> &str {
        &self.kid
    }

    /// Configured algorithm tag
    pub fn algorithm(&self) -> &SecretAlgorithm {
        &self.algorithm
    }

    /// Key material
    pub fn material(&self) -> &KeyMaterial {
        &self.material
    }

    /// Whether this is the primary signing credential
    pub fn is_primary(&self) -> bool {
        self.is_primary
    }

    /// Ephemeral view handed to the signature engine
    pub fn normalize(&self) -> NormalizedSecret<'_> {
        NormalizedSecret {
            kid: &self.kid,
            algorithm: self.algorithm.normalized(),
            material: &self.material,
            verification_key: &self.verification_key,
        }
    }
}

/// Secret view with the configuration-only tags rewritten.
///
/// `algorithm` is never `Unset` or `Rs256Public`.
#[derive(Debug, Clone)]
pub struct NormalizedSecret<'a> {
    /// Key identifier of the originating secret
    pub kid: &'a str,
    /// Canonical algorithm
    pub algorithm: SecretAlgorithm,
    /// Borrowed key material
    pub material: &'a KeyMaterial,
    /// Verification key shared with the originating secret
    pub verification_key: &'a VerificationKeyCache,
}
