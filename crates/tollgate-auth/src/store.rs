//! Secret store: the configured trust anchors behind a read-write lock.
//!
//! The set is an ordered list plus a `kid` index, so "first secret in store
//! order" is insertion order and nothing else. A reload builds a complete new
//! [`SecretSet`] off to the side and swaps it in under the write lock; readers
//! clone an `Arc` to the current set and never observe a half-applied reload.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::RwLock;
use tracing::info;

use crate::secret::Secret;

/// Invariant violations detected while building a [`SecretSet`]
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// A secret has an empty key identifier
    #[error("secret at position {0} has an empty kid")]
    EmptyKeyId(usize),

    /// Two secrets share a key identifier
    #[error("duplicate kid: {0}")]
    DuplicateKeyId(String),

    /// More than one secret is marked primary
    #[error("multiple primary secrets: '{first}' and '{second}'")]
    MultiplePrimarySecrets {
        /// First primary in store order
        first: String,
        /// Second primary in store order
        second: String,
    },
}

/// Immutable, insertion-ordered set of secrets
#[derive(Debug, Default)]
pub struct SecretSet {
    secrets: Vec<Arc<Secret>>,
    by_kid: HashMap<String, usize>,
}

impl SecretSet {
    /// Build a set, enforcing unique non-empty kids and at most one primary.
    ///
    /// # Errors
    ///
    /// Returns [`StoreError`] naming the first violation in input order.
    pub fn new(secrets: impl IntoIterator<Item = Secret>) -> Result<Self, StoreError> {
        let mut set = Self::default();
        let mut primary: Option<String> = None;

        for (position, secret) in secrets.into_iter().enumerate() {
            if secret.kid().is_empty() {
                return Err(StoreError::EmptyKeyId(position));
            }
            if set.by_kid.contains_key(secret.kid()) {
                return Err(StoreError::DuplicateKeyId(secret.kid().to_string()));
            }
            if secret.is_primary() {
                if let Some(first) = &primary {
                    return Err(StoreError::MultiplePrimarySecrets {
                        first: first.clone(),
                        second: secret.kid().to_string(),
                    });
                }
                primary = Some(secret.kid().to_string());
            }
            set.by_kid.insert(secret.kid().to_string(), set.secrets.len());
            set.secrets.push(Arc::new(secret));
        }

        Ok(set)
    }

    /// Secret with the given key identifier
    pub fn lookup(&self, kid: &str) -> Option<&Arc<Secret>> {
        self.by_kid.get(kid).map(|&index| &self.secrets[index])
    }

    /// All secrets in insertion order
    pub fn all(&self) -> &[Arc<Secret>] {
        &self.secrets
    }

    /// First primary secret in store order
    pub fn primary(&self) -> Option<&Arc<Secret>> {
        self.secrets.iter().find(|s| s.is_primary())
    }

    /// Number of secrets
    pub fn len(&self) -> usize {
        self.secrets.len()
    }

    /// Whether the set holds no secrets
    pub fn is_empty(&self) -> bool {
        self.secrets.is_empty()
    }
}

/// Shared owner of the current [`SecretSet`]
#[derive(Debug, Default)]
pub struct SecretStore {
    current: RwLock<Arc<SecretSet>>,
}

impl SecretStore {
    /// Store holding `set`
    pub fn new(set: SecretSet) -> Self {
        Self {
            current: RwLock::new(Arc::new(set)),
        }
    }

    /// Convenience constructor validating `secrets` first.
    ///
    /// # Errors
    ///
    /// Same as [`SecretSet::new`].
    pub fn from_secrets(secrets: impl IntoIterator<Item = Secret>) -> Result<Self, StoreError> {
        Ok(Self::new(SecretSet::new(secrets)?))
    }

    /// Current set; stays consistent for as long as the caller holds it
    pub async fn snapshot(&self) -> Arc<SecretSet> {
        Arc::clone(&*self.current.read().await)
    }

    /// Secret with the given key identifier
    pub async fn lookup(&self, kid: &str) -> Option<Arc<Secret>> {
        self.current.read().await.lookup(kid).cloned()
    }

    /// All secrets in insertion order
    pub async fn all(&self) -> Vec<Arc<Secret>> {
        self.current.read().await.all().to_vec()
    }

    /// Atomically swap in `set`, waiting for in-flight readers to finish
    pub async fn replace(&self, set: SecretSet) {
        let incoming = set.len();
        let mut current = self.current.write().await;
        let previous = current.len();
        *current = Arc::new(set);
        info!(previous, current = incoming, "Secret set replaced");
    }
}
