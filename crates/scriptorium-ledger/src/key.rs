use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Deterministic dedup key for one semantic request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IdempotencyKey(String);

impl IdempotencyKey {
    /// Derive the key from `(operation, scope, target)`.
    ///
    /// Components are joined with a unit separator before hashing so that
    /// `("a:b", "c")` and `("a", "b:c")` never collide.
    pub fn derive(operation: &str, scope: &str, target: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(operation.as_bytes());
        hasher.update([0x1f]);
        hasher.update(scope.as_bytes());
        hasher.update([0x1f]);
        hasher.update(target.as_bytes());
        Self(format!("idk_{:x}", hasher.finalize()))
    }

    pub fn from_raw(raw: impl Into<String>) -> Self {
        Self(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IdempotencyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
